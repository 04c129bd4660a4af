// Copyright 2022 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! A radix trie over byte-string keys, stored in a [`Base`] arena.
//!
//! The trie is a compressed Patricia tree. Each node holds a sparse
//! array of child selectors indexed by the first distinguishing byte
//! (after subtracting the node's `offset`); each selector additionally
//! carries an *edge string*, the bytes that must match after that
//! first byte before the child node is reached. A node may carry a
//! user element in addition to internal branching, so an ancestor key
//! (which is always a strict prefix of its descendants' keys) can
//! coexist with them.
//!
//! A node and its selector array are separate chunks: the array is
//! resized frequently, and keeping it separate leaves references to
//! the node itself stable. The array chunk stores the selectors
//! followed by a string bank; selector `i`'s edge string occupies
//! `str_cap` bytes starting at `bank + i * str_cap`.
//!
//! Keys are arbitrary byte strings of up to 65,535 octets, ordered
//! lexicographically with shorter-is-smaller on equal prefix. In the
//! zone database the keys are owner names in canonical wire form, so
//! ordered traversal yields owner names in canonical order.

use super::{
    Base, Error, Ref, CHUNK_TYPE_RADARRAY, CHUNK_TYPE_RADNODE, CHUNK_TYPE_RADTREE, REL_PTR_SIZE,
};

////////////////////////////////////////////////////////////////////////
// CHUNK LAYOUTS                                                      //
////////////////////////////////////////////////////////////////////////

// Tree object: element count and the root node pointer.
const TREE_COUNT: u64 = 0;
const TREE_ROOT: u64 = 8;
const TREE_SIZE: u64 = 8 + REL_PTR_SIZE;

// Node: element, parent, and lookup-array pointers, the node's slot
// index within its parent's array, and the byte value of its first
// child slot.
const NODE_ELEM: u64 = 0;
const NODE_PARENT: u64 = REL_PTR_SIZE;
const NODE_LOOKUP: u64 = 2 * REL_PTR_SIZE;
const NODE_PIDX: u64 = 3 * REL_PTR_SIZE;
const NODE_OFFSET: u64 = 3 * REL_PTR_SIZE + 1;
const NODE_SIZE: u64 = 3 * REL_PTR_SIZE + 2;

// Lookup array: populated span, capacity, and string-bank stride,
// followed by `capacity` selectors and the string bank.
const ARRAY_LEN: u64 = 0;
const ARRAY_CAP: u64 = 2;
const ARRAY_STR_CAP: u64 = 4;
const ARRAY_HEADER: u64 = 6;
const SEL_NODE: u64 = 0;
const SEL_LEN: u64 = REL_PTR_SIZE;
const SEL_SIZE: u64 = REL_PTR_SIZE + 2;

const MAX_KEY_LEN: usize = u16::MAX as usize;

fn array_size(cap: u64, str_cap: u64) -> u64 {
    ARRAY_HEADER + cap * (SEL_SIZE + str_cap)
}

/// Enumerates the relative-pointer fields in the radix trie's chunk
/// types, for the embedder's [walk dispatch](super::WalkRelptrs).
pub fn walk_relptrs(base: &Base, chunk_type: u8, data: Ref, _data_size: u64, out: &mut Vec<u64>) {
    match chunk_type {
        CHUNK_TYPE_RADTREE => out.push(data.offset() + TREE_ROOT),
        CHUNK_TYPE_RADNODE => {
            out.push(data.offset() + NODE_ELEM);
            out.push(data.offset() + NODE_PARENT);
            out.push(data.offset() + NODE_LOOKUP);
        }
        CHUNK_TYPE_RADARRAY => {
            let len = base.get_u16(data.offset() + ARRAY_LEN) as u64;
            for idx in 0..len {
                out.push(data.offset() + ARRAY_HEADER + idx * SEL_SIZE + SEL_NODE);
            }
        }
        _ => (),
    }
}

////////////////////////////////////////////////////////////////////////
// THE TREE HANDLE                                                    //
////////////////////////////////////////////////////////////////////////

/// A handle to a radix trie stored in an arena.
///
/// The handle itself is just the reference to the tree chunk; all
/// operations borrow the [`Base`], mutably for mutation (the writer's
/// exclusive lease) and immutably for queries and traversal.
#[derive(Clone, Copy, Debug)]
pub struct RadTree {
    tree: Ref,
}

impl RadTree {
    /// Allocates a new, empty tree in the arena.
    pub fn create(base: &mut Base) -> Result<Self, Error> {
        let tree = base.alloc(CHUNK_TYPE_RADTREE, TREE_SIZE)?;
        Ok(Self { tree })
    }

    /// Wraps an existing tree chunk (e.g. the arena's root object).
    pub fn from_ref(base: &Base, tree: Ref) -> Result<Self, Error> {
        if tree.is_null() || base.chunk_type(tree) != CHUNK_TYPE_RADTREE {
            Err(Error::Corrupt("not a radix tree chunk"))
        } else {
            Ok(Self { tree })
        }
    }

    /// Returns the reference to the tree chunk.
    pub fn as_ref(&self) -> Ref {
        self.tree
    }

    /// Returns the number of elements in the tree.
    pub fn count(&self, base: &Base) -> u64 {
        base.get_u64(self.tree.offset() + TREE_COUNT)
    }

    fn set_count(&self, base: &mut Base, count: u64) {
        base.put_u64(self.tree.offset() + TREE_COUNT, count);
    }

    fn root(&self, base: &Base) -> Ref {
        base.ptr_data(self.tree.offset() + TREE_ROOT)
    }
}

////////////////////////////////////////////////////////////////////////
// NODE AND ARRAY ACCESSORS                                           //
////////////////////////////////////////////////////////////////////////

fn node_elem(base: &Base, node: Ref) -> Ref {
    base.ptr_data(node.offset() + NODE_ELEM)
}

fn node_parent(base: &Base, node: Ref) -> Ref {
    base.ptr_data(node.offset() + NODE_PARENT)
}

fn node_lookup(base: &Base, node: Ref) -> Ref {
    base.ptr_data(node.offset() + NODE_LOOKUP)
}

fn node_pidx(base: &Base, node: Ref) -> u64 {
    base.get_u8(node.offset() + NODE_PIDX) as u64
}

fn node_offset(base: &Base, node: Ref) -> u8 {
    base.get_u8(node.offset() + NODE_OFFSET)
}

/// Returns the populated span of a node's array (0 if it has none).
fn node_array_len(base: &Base, node: Ref) -> u64 {
    let array = node_lookup(base, node);
    if array.is_null() {
        0
    } else {
        base.get_u16(array.offset() + ARRAY_LEN) as u64
    }
}

fn array_cap(base: &Base, array: Ref) -> u64 {
    base.get_u16(array.offset() + ARRAY_CAP) as u64
}

fn array_str_cap(base: &Base, array: Ref) -> u64 {
    base.get_u16(array.offset() + ARRAY_STR_CAP) as u64
}

/// The offset of selector `idx`'s fields in an array chunk.
fn sel_field(array: Ref, idx: u64) -> u64 {
    array.offset() + ARRAY_HEADER + idx * SEL_SIZE
}

/// The child node in slot `idx` of `node`'s array.
fn child_at(base: &Base, node: Ref, idx: u64) -> Ref {
    let array = node_lookup(base, node);
    base.ptr_data(sel_field(array, idx) + SEL_NODE)
}

/// The edge string of slot `idx` of `node`'s array.
fn edge_at<'a>(base: &'a Base, node: Ref, idx: u64) -> &'a [u8] {
    let array = node_lookup(base, node);
    let len = base.get_u16(sel_field(array, idx) + SEL_LEN) as u64;
    let cap = array_cap(base, array);
    let str_cap = array_str_cap(base, array);
    let bank = array.offset() + ARRAY_HEADER + cap * SEL_SIZE;
    base.bytes(bank + idx * str_cap, len)
}

////////////////////////////////////////////////////////////////////////
// ARRAY RESHAPING                                                    //
////////////////////////////////////////////////////////////////////////

/// Rebuilds a node's selector array with new geometry, moving each
/// populated slot `i` to slot `i + shift`. Selector pointers are moved
/// through the pointer barrier and child back-links (`pidx`) are
/// updated. The old array (if any) is freed.
///
/// On allocation failure the node and its old array are untouched.
fn array_reshape(
    base: &mut Base,
    node: Ref,
    new_len: u64,
    new_cap: u64,
    new_str_cap: u64,
    shift: i64,
) -> Result<(), Error> {
    debug_assert!(new_len <= new_cap && new_cap <= 256);
    let old = node_lookup(base, node);
    let new = base.alloc(CHUNK_TYPE_RADARRAY, array_size(new_cap, new_str_cap))?;
    base.put_u16(new.offset() + ARRAY_LEN, new_len as u16);
    base.put_u16(new.offset() + ARRAY_CAP, new_cap as u16);
    base.put_u16(new.offset() + ARRAY_STR_CAP, new_str_cap as u16);
    let new_bank = new.offset() + ARRAY_HEADER + new_cap * SEL_SIZE;

    if !old.is_null() {
        let old_len = base.get_u16(old.offset() + ARRAY_LEN) as u64;
        for idx in 0..old_len {
            let child = base.ptr_data(sel_field(old, idx) + SEL_NODE);
            if child.is_null() {
                continue;
            }
            let new_idx = (idx as i64 + shift) as u64;
            debug_assert!(new_idx < new_len);
            let edge = edge_at(base, node, idx).to_vec();
            debug_assert!(edge.len() as u64 <= new_str_cap);
            base.ptr_set(sel_field(new, new_idx) + SEL_NODE, child);
            base.put_u16(sel_field(new, new_idx) + SEL_LEN, edge.len() as u16);
            base.write_bytes(new_bank + new_idx * new_str_cap, &edge);
            base.put_u8(child.offset() + NODE_PIDX, new_idx as u8);
            base.ptr_zero(sel_field(old, idx) + SEL_NODE);
        }
    }

    base.ptr_set(node.offset() + NODE_LOOKUP, new);
    if !old.is_null() {
        base.free(old);
    }
    Ok(())
}

/// Ensures that `node`'s array has a slot for first-byte `byte`,
/// growing or shifting the array as needed, and returns the slot
/// index. A newly covered slot is left empty.
fn ensure_slot(base: &mut Base, node: Ref, byte: u8) -> Result<u64, Error> {
    let byte = byte as u64;
    let len = node_array_len(base, node);
    if len == 0 {
        array_reshape(base, node, 1, 1, 0, 0)?;
        base.put_u8(node.offset() + NODE_OFFSET, byte as u8);
        return Ok(0);
    }
    let offset = node_offset(base, node) as u64;
    let array = node_lookup(base, node);
    let cap = array_cap(base, array);
    let str_cap = array_str_cap(base, array);
    if byte < offset {
        // Grow the span downward; every existing slot shifts up.
        let shift = offset - byte;
        let need = len + shift;
        if need > cap {
            array_reshape(base, node, need, grow_cap(cap, need), str_cap, shift as i64)?;
        } else {
            // Capacity suffices, but selectors still move; rebuild at
            // the same geometry.
            array_reshape(base, node, need, cap, str_cap, shift as i64)?;
        }
        base.put_u8(node.offset() + NODE_OFFSET, byte as u8);
        Ok(0)
    } else if byte - offset >= len {
        let need = byte - offset + 1;
        if need > cap {
            array_reshape(base, node, need, grow_cap(cap, need), str_cap, 0)?;
        } else {
            let array = node_lookup(base, node);
            base.put_u16(array.offset() + ARRAY_LEN, need as u16);
        }
        Ok(need - 1)
    } else {
        Ok(byte - offset)
    }
}

/// Doubles the capacity (or jumps straight to `need`), bounded by 256.
fn grow_cap(cap: u64, need: u64) -> u64 {
    (cap * 2).max(need).min(256)
}

/// Ensures that `node`'s string bank can hold an edge of `edge_len`
/// octets.
fn reserve_edge(base: &mut Base, node: Ref, edge_len: u64) -> Result<(), Error> {
    let array = node_lookup(base, node);
    debug_assert!(!array.is_null());
    let str_cap = array_str_cap(base, array);
    if edge_len > str_cap {
        let len = base.get_u16(array.offset() + ARRAY_LEN) as u64;
        let cap = array_cap(base, array);
        array_reshape(base, node, len, cap, edge_len, 0)?;
    }
    Ok(())
}

/// Writes slot `idx`'s edge string. The bank must already be large
/// enough (see [`reserve_edge`]).
fn write_edge(base: &mut Base, node: Ref, idx: u64, edge: &[u8]) {
    let array = node_lookup(base, node);
    let cap = array_cap(base, array);
    let str_cap = array_str_cap(base, array);
    debug_assert!(edge.len() as u64 <= str_cap);
    base.put_u16(sel_field(array, idx) + SEL_LEN, edge.len() as u16);
    let bank = array.offset() + ARRAY_HEADER + cap * SEL_SIZE;
    base.write_bytes(bank + idx * str_cap, edge);
}

/// Links a child into slot `idx` of `node`'s array and sets the
/// child's back-links. Infallible; all space must have been reserved.
fn link_child(base: &mut Base, node: Ref, idx: u64, edge: &[u8], child: Ref) {
    write_edge(base, node, idx, edge);
    let array = node_lookup(base, node);
    base.ptr_set(sel_field(array, idx) + SEL_NODE, child);
    base.ptr_set(child.offset() + NODE_PARENT, node);
    base.put_u8(child.offset() + NODE_PIDX, idx as u8);
}

/// Shrinks a node's array after a removal: trailing and leading empty
/// slots are trimmed, the capacity is halved while the span fits in
/// half of it, and the string bank is recompacted when the longest
/// edge has dropped below half the stride. An empty array is freed
/// outright.
///
/// Allocation failure here is swallowed: the array is merely left
/// larger than it needs to be.
fn array_compact(base: &mut Base, node: Ref) {
    let array = node_lookup(base, node);
    if array.is_null() {
        return;
    }
    let len = base.get_u16(array.offset() + ARRAY_LEN) as u64;

    let mut first = None;
    let mut last = None;
    let mut max_edge = 0;
    for idx in 0..len {
        if child_at(base, node, idx).is_null() {
            continue;
        }
        first.get_or_insert(idx);
        last = Some(idx);
        max_edge = max_edge.max(edge_at(base, node, idx).len() as u64);
    }

    let (first, last) = match (first, last) {
        (Some(first), Some(last)) => (first, last),
        _ => {
            // No children remain.
            base.ptr_zero(node.offset() + NODE_LOOKUP);
            base.free(array);
            base.put_u8(node.offset() + NODE_OFFSET, 0);
            return;
        }
    };

    let span = last - first + 1;
    let cap = array_cap(base, array);
    let str_cap = array_str_cap(base, array);
    let mut new_cap = cap;
    while new_cap >= 2 && span <= new_cap / 2 {
        new_cap /= 2;
    }
    let new_str_cap = if max_edge < str_cap / 2 { max_edge } else { str_cap };

    if first == 0 && new_cap == cap && new_str_cap == str_cap {
        // Only the span length changes; no selector moves.
        base.put_u16(array.offset() + ARRAY_LEN, span as u16);
        return;
    }
    if array_reshape(base, node, span, new_cap, new_str_cap, -(first as i64)).is_ok() {
        let offset = node_offset(base, node) as u64 + first;
        base.put_u8(node.offset() + NODE_OFFSET, offset as u8);
    }
}

////////////////////////////////////////////////////////////////////////
// INSERTION                                                          //
////////////////////////////////////////////////////////////////////////

impl RadTree {
    /// Inserts `elem` under `key`.
    ///
    /// On success, the node now holding the element is returned; the
    /// caller typically records it in the element (so that deletion
    /// and traversal can connect the two). If an element is already
    /// present under `key`, `Ok(None)` is returned. On allocation
    /// failure the tree is unchanged.
    pub fn insert(&self, base: &mut Base, key: &[u8], elem: Ref) -> Result<Option<Ref>, Error> {
        if key.len() > MAX_KEY_LEN {
            return Err(Error::Corrupt("key too long"));
        }

        if self.root(base).is_null() {
            let root = base.alloc(CHUNK_TYPE_RADNODE, NODE_SIZE)?;
            base.ptr_set(self.tree.offset() + TREE_ROOT, root);
        }

        let (node, pos) = self.find_prefix(base, key);
        let target = if pos == key.len() {
            if !node_elem(base, node).is_null() {
                return Ok(None);
            }
            node
        } else {
            let byte = key[pos];
            let rest = &key[pos + 1..];
            let offset = node_offset(base, node) as u64;
            let len = node_array_len(base, node);
            let in_span = len > 0 && (byte as u64) >= offset && (byte as u64) - offset < len;
            if !in_span {
                self.add_child(base, node, byte, rest)?
            } else if child_at(base, node, (byte as u64) - offset).is_null() {
                self.fill_slot(base, node, (byte as u64) - offset, rest)?
            } else {
                self.split_edge(base, node, (byte as u64) - offset, rest)?
            }
        };

        base.ptr_set(target.offset() + NODE_ELEM, elem);
        self.set_count(base, self.count(base) + 1);
        Ok(Some(target))
    }

    /// Descends as far as whole selectors match, returning the deepest
    /// node reached and the number of key bytes consumed. The root
    /// must exist.
    fn find_prefix(&self, base: &Base, key: &[u8]) -> (Ref, usize) {
        let mut node = self.root(base);
        let mut pos = 0;
        loop {
            if pos == key.len() {
                return (node, pos);
            }
            let byte = key[pos] as u64;
            let offset = node_offset(base, node) as u64;
            let len = node_array_len(base, node);
            if len == 0 || byte < offset || byte - offset >= len {
                return (node, pos);
            }
            let idx = byte - offset;
            let child = child_at(base, node, idx);
            if child.is_null() {
                return (node, pos);
            }
            let edge = edge_at(base, node, idx);
            if !edge.is_empty() {
                if pos + 1 + edge.len() > key.len() || &key[pos + 1..pos + 1 + edge.len()] != edge {
                    return (node, pos);
                }
            }
            pos += 1 + edge.len();
            node = child;
        }
    }

    /// Adds a child for a first-byte outside the node's current span.
    fn add_child(&self, base: &mut Base, node: Ref, byte: u8, rest: &[u8]) -> Result<Ref, Error> {
        let child = base.alloc(CHUNK_TYPE_RADNODE, NODE_SIZE)?;
        let idx = match ensure_slot(base, node, byte) {
            Ok(idx) => idx,
            Err(e) => {
                base.free(child);
                return Err(e);
            }
        };
        if let Err(e) = reserve_edge(base, node, rest.len() as u64) {
            base.free(child);
            return Err(e);
        }
        link_child(base, node, idx, rest, child);
        Ok(child)
    }

    /// Fills an existing empty slot.
    fn fill_slot(&self, base: &mut Base, node: Ref, idx: u64, rest: &[u8]) -> Result<Ref, Error> {
        let child = base.alloc(CHUNK_TYPE_RADNODE, NODE_SIZE)?;
        if let Err(e) = reserve_edge(base, node, rest.len() as u64) {
            base.free(child);
            return Err(e);
        }
        link_child(base, node, idx, rest, child);
        Ok(child)
    }

    /// Splits the selector at `idx` of `node`, whose edge diverges from
    /// the remaining key bytes `rest`.
    fn split_edge(&self, base: &mut Base, node: Ref, idx: u64, rest: &[u8]) -> Result<Ref, Error> {
        let old_child = child_at(base, node, idx);
        let edge = edge_at(base, node, idx).to_vec();
        debug_assert!(rest.len() < edge.len() || rest[..edge.len().min(rest.len())] != edge[..]);

        let common = rest
            .iter()
            .zip(edge.iter())
            .take_while(|(a, b)| a == b)
            .count();

        if common == rest.len() {
            // The new key ends inside the edge: insert an intermediate
            // node holding the element, with the old child below it.
            let split_byte = edge[common];
            let split_rest = &edge[common + 1..];
            let mid = base.alloc(CHUNK_TYPE_RADNODE, NODE_SIZE)?;
            if let Err(e) = array_reshape(base, mid, 1, 1, split_rest.len() as u64, 0) {
                base.free(mid);
                return Err(e);
            }
            base.put_u8(mid.offset() + NODE_OFFSET, split_byte);
            link_child(base, mid, 0, split_rest, old_child);
            link_child(base, node, idx, rest, mid);
            Ok(mid)
        } else {
            // The keys diverge inside the edge: insert a split node
            // with two children, the old subtree and a new leaf.
            let old_byte = edge[common] as u64;
            let new_byte = rest[common] as u64;
            let old_rest = &edge[common + 1..];
            let new_rest = &rest[common + 1..];
            let span_offset = old_byte.min(new_byte);
            let span = old_byte.max(new_byte) - span_offset + 1;
            let str_cap = old_rest.len().max(new_rest.len()) as u64;

            let mid = base.alloc(CHUNK_TYPE_RADNODE, NODE_SIZE)?;
            let leaf = match base.alloc(CHUNK_TYPE_RADNODE, NODE_SIZE) {
                Ok(leaf) => leaf,
                Err(e) => {
                    base.free(mid);
                    return Err(e);
                }
            };
            if let Err(e) = array_reshape(base, mid, span, span, str_cap, 0) {
                base.free(mid);
                base.free(leaf);
                return Err(e);
            }
            base.put_u8(mid.offset() + NODE_OFFSET, span_offset as u8);
            link_child(base, mid, old_byte - span_offset, old_rest, old_child);
            link_child(base, mid, new_byte - span_offset, new_rest, leaf);
            link_child(base, node, idx, &rest[..common], mid);
            Ok(leaf)
        }
    }
}

////////////////////////////////////////////////////////////////////////
// LOOKUP                                                             //
////////////////////////////////////////////////////////////////////////

impl RadTree {
    /// Exact-match lookup: returns the node holding an element under
    /// `key`, or null.
    pub fn search(&self, base: &Base, key: &[u8]) -> Ref {
        let mut node = self.root(base);
        if node.is_null() {
            return Ref::NULL;
        }
        let mut pos = 0;
        loop {
            if pos == key.len() {
                return if node_elem(base, node).is_null() {
                    Ref::NULL
                } else {
                    node
                };
            }
            let byte = key[pos] as u64;
            let offset = node_offset(base, node) as u64;
            let len = node_array_len(base, node);
            if len == 0 || byte < offset || byte - offset >= len {
                return Ref::NULL;
            }
            let idx = byte - offset;
            let child = child_at(base, node, idx);
            if child.is_null() {
                return Ref::NULL;
            }
            let edge = edge_at(base, node, idx);
            if !edge.is_empty() {
                if pos + 1 + edge.len() > key.len() || &key[pos + 1..pos + 1 + edge.len()] != edge {
                    return Ref::NULL;
                }
            }
            pos += 1 + edge.len();
            node = child;
        }
    }

    /// Returns the element-bearing node with the largest key less than
    /// or equal to `key` (null if none), plus an exact-match flag.
    pub fn find_less_equal(&self, base: &Base, key: &[u8]) -> (Ref, bool) {
        let mut node = self.root(base);
        if node.is_null() {
            return (Ref::NULL, false);
        }
        let mut pos = 0;
        loop {
            if pos == key.len() {
                return if !node_elem(base, node).is_null() {
                    (node, true)
                } else {
                    (before_position(base, node), false)
                };
            }
            let byte = key[pos] as u64;
            let offset = node_offset(base, node) as u64;
            let len = node_array_len(base, node);
            if len == 0 || byte < offset {
                // Everything below this node is greater; the node's own
                // key is a strict prefix of the search key, so smaller.
                return (at_or_before(base, node), false);
            }
            if byte - offset >= len {
                // Greater than every child's first byte.
                return (below_or_at(base, node, len), false);
            }
            let idx = byte - offset;
            let child = child_at(base, node, idx);
            if child.is_null() {
                return (below_or_at(base, node, idx), false);
            }
            let edge = edge_at(base, node, idx);
            let rest = &key[pos + 1..];
            let cmp_len = edge.len().min(rest.len());
            match rest[..cmp_len].cmp(&edge[..cmp_len]) {
                std::cmp::Ordering::Less => {
                    // The child subtree is entirely greater.
                    return (below_or_at(base, node, idx), false);
                }
                std::cmp::Ordering::Greater => {
                    // The child subtree is entirely smaller.
                    return (last_in_subtree_incl_self(base, child), false);
                }
                std::cmp::Ordering::Equal => {
                    if rest.len() < edge.len() {
                        // The key ends inside the edge, so the child
                        // subtree is entirely greater.
                        return (below_or_at(base, node, idx), false);
                    }
                    pos += 1 + edge.len();
                    node = child;
                }
            }
        }
    }
}

/// The largest element in slots `0..idx` of `node`, then `node`'s own
/// element, then the largest element before `node`'s position.
fn below_or_at(base: &Base, node: Ref, idx: u64) -> Ref {
    if let Some(found) = last_elem_in_slots(base, node, idx) {
        return found;
    }
    at_or_before(base, node)
}

/// `node`'s own element, or else the largest element strictly before
/// `node`'s position.
fn at_or_before(base: &Base, node: Ref) -> Ref {
    if !node_elem(base, node).is_null() {
        node
    } else {
        before_position(base, node)
    }
}

/// The largest element strictly before `node`'s position (and not in
/// its subtree); null if there is none.
fn before_position(base: &Base, node: Ref) -> Ref {
    let mut node = node;
    loop {
        let parent = node_parent(base, node);
        if parent.is_null() {
            return Ref::NULL;
        }
        if let Some(found) = last_elem_in_slots(base, parent, node_pidx(base, node)) {
            return found;
        }
        if !node_elem(base, parent).is_null() {
            return parent;
        }
        node = parent;
    }
}

/// The largest element in the subtrees rooted in slots `0..limit` of
/// `node`.
fn last_elem_in_slots(base: &Base, node: Ref, limit: u64) -> Option<Ref> {
    for idx in (0..limit).rev() {
        let child = child_at(base, node, idx);
        if !child.is_null() {
            let found = last_in_subtree_incl_self(base, child);
            if !found.is_null() {
                return Some(found);
            }
        }
    }
    None
}

/// The largest element in `node`'s subtree, including `node` itself.
/// In a valid tree this never returns null for an existing node,
/// since every leaf holds an element.
fn last_in_subtree_incl_self(base: &Base, node: Ref) -> Ref {
    let len = node_array_len(base, node);
    if let Some(found) = last_elem_in_slots(base, node, len) {
        return found;
    }
    if !node_elem(base, node).is_null() {
        node
    } else {
        Ref::NULL
    }
}

/// The smallest element in the subtrees rooted in slots
/// `from..len` of `node`.
fn first_elem_in_slots(base: &Base, node: Ref, from: u64) -> Option<Ref> {
    let len = node_array_len(base, node);
    for idx in from..len {
        let child = child_at(base, node, idx);
        if !child.is_null() {
            let found = first_in_subtree_incl_self(base, child);
            if !found.is_null() {
                return Some(found);
            }
        }
    }
    None
}

/// The smallest element in `node`'s subtree, including `node` itself.
/// An element-bearing node precedes its descendants, since its key is
/// a strict prefix of theirs.
fn first_in_subtree_incl_self(base: &Base, node: Ref) -> Ref {
    if !node_elem(base, node).is_null() {
        return node;
    }
    first_elem_in_slots(base, node, 0).unwrap_or(Ref::NULL)
}

////////////////////////////////////////////////////////////////////////
// ORDERED TRAVERSAL                                                  //
////////////////////////////////////////////////////////////////////////

impl RadTree {
    /// Returns the element-bearing node with the smallest key, or
    /// null for an empty tree.
    pub fn first(&self, base: &Base) -> Ref {
        let root = self.root(base);
        if root.is_null() {
            Ref::NULL
        } else {
            first_in_subtree_incl_self(base, root)
        }
    }

    /// Returns the element-bearing node with the largest key, or null
    /// for an empty tree.
    pub fn last(&self, base: &Base) -> Ref {
        let root = self.root(base);
        if root.is_null() {
            Ref::NULL
        } else {
            last_in_subtree_incl_self(base, root)
        }
    }

    /// Returns the element-bearing node following `node` in key order,
    /// or null.
    pub fn next(base: &Base, node: Ref) -> Ref {
        if let Some(found) = first_elem_in_slots(base, node, 0) {
            return found;
        }
        let mut node = node;
        loop {
            let parent = node_parent(base, node);
            if parent.is_null() {
                return Ref::NULL;
            }
            if let Some(found) = first_elem_in_slots(base, parent, node_pidx(base, node) + 1) {
                return found;
            }
            node = parent;
        }
    }

    /// Returns the element-bearing node preceding `node` in key order,
    /// or null.
    pub fn prev(base: &Base, node: Ref) -> Ref {
        before_position(base, node)
    }

    /// Returns the element attached to a node.
    pub fn elem(base: &Base, node: Ref) -> Ref {
        node_elem(base, node)
    }

    /// Swaps the element attached to a node for another. The node must
    /// already hold an element (so the count is unaffected); the old
    /// element chunk remains the caller's to free.
    pub fn replace_elem(base: &mut Base, node: Ref, elem: Ref) {
        debug_assert!(!node_elem(base, node).is_null());
        debug_assert!(!elem.is_null());
        base.ptr_set(node.offset() + NODE_ELEM, elem);
    }
}

////////////////////////////////////////////////////////////////////////
// DELETION                                                           //
////////////////////////////////////////////////////////////////////////

impl RadTree {
    /// Removes the element from `node` and restructures the trie:
    /// element-less leaves are unlinked, and an element-less node left
    /// with a single child is merged into its parent's selector.
    ///
    /// Any reference from the element chunk back to the node must be
    /// cleared by the caller before this is called; the element chunk
    /// itself remains the caller's to free.
    pub fn delete(&self, base: &mut Base, node: Ref) {
        debug_assert!(!node_elem(base, node).is_null());
        base.ptr_zero(node.offset() + NODE_ELEM);
        self.set_count(base, self.count(base) - 1);
        self.cleanup(base, node);
    }

    fn cleanup(&self, base: &mut Base, start: Ref) {
        let mut node = start;
        loop {
            if !node_elem(base, node).is_null() {
                return;
            }
            let len = node_array_len(base, node);
            let mut children = 0;
            let mut only_idx = 0;
            for idx in 0..len {
                if !child_at(base, node, idx).is_null() {
                    children += 1;
                    only_idx = idx;
                }
            }
            let parent = node_parent(base, node);

            match children {
                0 => {
                    if parent.is_null() {
                        // The tree is now empty.
                        base.ptr_zero(self.tree.offset() + TREE_ROOT);
                        free_node(base, node);
                        return;
                    }
                    let pidx = node_pidx(base, node);
                    let parent_array = node_lookup(base, parent);
                    base.ptr_zero(sel_field(parent_array, pidx) + SEL_NODE);
                    base.put_u16(sel_field(parent_array, pidx) + SEL_LEN, 0);
                    free_node(base, node);
                    array_compact(base, parent);
                    node = parent;
                }
                1 => {
                    if parent.is_null() {
                        // The root stands for the empty key and cannot
                        // be merged away.
                        return;
                    }
                    self.merge_through(base, node, only_idx);
                    return;
                }
                _ => return,
            }
        }
    }

    /// Merges the single child of element-less `node` upward: the
    /// parent's selector absorbs the branching byte and the child's
    /// edge, and `node` is freed.
    fn merge_through(&self, base: &mut Base, node: Ref, child_idx: u64) {
        let parent = node_parent(base, node);
        let pidx = node_pidx(base, node);
        let child = child_at(base, node, child_idx);
        let branch_byte = node_offset(base, node) + child_idx as u8;

        let mut merged = edge_at(base, parent, pidx).to_vec();
        merged.push(branch_byte);
        merged.extend_from_slice(edge_at(base, node, child_idx));
        if merged.len() > MAX_KEY_LEN {
            return;
        }
        if reserve_edge(base, parent, merged.len() as u64).is_err() {
            // Out of space; leaving the chain uncompressed is valid.
            return;
        }

        // Detach the child from node, splice it into the parent's
        // selector, and free node.
        let node_array = node_lookup(base, node);
        base.ptr_zero(sel_field(node_array, child_idx) + SEL_NODE);
        link_child(base, parent, pidx, &merged, child);
        free_node(base, node);
    }
}

/// Frees a node and its array. All selector slots must already be
/// empty and nothing may reference the node.
fn free_node(base: &mut Base, node: Ref) {
    let array = node_lookup(base, node);
    if !array.is_null() {
        base.ptr_zero(node.offset() + NODE_LOOKUP);
        base.free(array);
    }
    base.ptr_zero(node.offset() + NODE_PARENT);
    base.free(node);
}

////////////////////////////////////////////////////////////////////////
// WHOLE-TREE TEARDOWN                                                //
////////////////////////////////////////////////////////////////////////

impl RadTree {
    /// Removes every node from the tree. Element chunks are not freed
    /// (the tree does not own them), but the references to them are
    /// unlinked; the caller must have cleared any back-references from
    /// the elements to their nodes.
    pub fn clear(&self, base: &mut Base) {
        let root = self.root(base);
        if !root.is_null() {
            base.ptr_zero(self.tree.offset() + TREE_ROOT);
            free_subtree(base, root);
        }
        self.set_count(base, 0);
    }

    /// Clears the tree and frees the tree chunk itself. The handle
    /// must not be used afterward.
    pub fn delete_tree(self, base: &mut Base) {
        self.clear(base);
        base.free(self.tree);
    }
}

fn free_subtree(base: &mut Base, node: Ref) {
    let array = node_lookup(base, node);
    if !array.is_null() {
        let len = base.get_u16(array.offset() + ARRAY_LEN) as u64;
        for idx in 0..len {
            let child = base.ptr_data(sel_field(array, idx) + SEL_NODE);
            if !child.is_null() {
                base.ptr_zero(sel_field(array, idx) + SEL_NODE);
                free_subtree(base, child);
            }
        }
    }
    base.ptr_zero(node.offset() + NODE_ELEM);
    free_node(base, node);
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
