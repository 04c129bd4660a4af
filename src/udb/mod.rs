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

//! The file-backed arena underlying the zone database.
//!
//! A [`Base`] is a single contiguous memory region, loaded from and
//! flushed to a database file, in which all structures are addressed
//! by 64-bit offsets rather than native pointers. The region is carved
//! into *chunks*, each carrying a type tag so that a dispatch function
//! supplied by the embedder (see [`WalkRelptrs`]) can enumerate every
//! pointer field in any chunk.
//!
//! Pointers between chunks are [relative pointers](REL_PTR_SIZE):
//! 24-byte structures holding the target's offset plus links in a
//! doubly-linked chain rooted at the target chunk. Every assignment to
//! a pointer field goes through the [`Base::ptr_set`] barrier, which
//! maintains that chain; in return, [`Base::relocate`] can move a
//! chunk and rewrite every live reference to it by walking the chain.
//!
//! Concurrency follows a single-writer, multiple-reader discipline:
//! mutation requires `&mut Base` (the writer's exclusive lease), and
//! readers hold `&Base`. Readers only ever follow the offset word of a
//! pointer field, never the chain links.

use std::fmt;
use std::fs;
use std::io::{self, Read as _, Write as _};
use std::path::{Path, PathBuf};

pub mod radtree;
pub use radtree::RadTree;

////////////////////////////////////////////////////////////////////////
// LAYOUT CONSTANTS                                                   //
////////////////////////////////////////////////////////////////////////

const MAGIC: [u8; 8] = *b"mdrn-udb";
const VERSION: u64 = 1;

/// The size of the file header. The header holds the magic, version,
/// used size, allocation statistics, and the root pointer field.
const BASE_HEADER_SIZE: u64 = 64;
const OFF_VERSION: u64 = 8;
const OFF_END: u64 = 16;
const OFF_STAT_DATA: u64 = 24;
const OFF_STAT_CHUNKS: u64 = 32;
const OFF_ROOT_PTR: u64 = 40;

/// The size of a chunk header: the requested data size, the head of
/// the back-pointer chain, the type tag, the free flag, and the
/// power-of-two exponent of the chunk's total size.
const CHUNK_HEADER_SIZE: u64 = 24;
const CHUNK_OFF_DATA_SIZE: u64 = 24; // behind the data pointer
const CHUNK_OFF_PTRLIST: u64 = 16;
const CHUNK_OFF_TYPE: u64 = 8;
const CHUNK_OFF_FLAGS: u64 = 7;
const CHUNK_OFF_EXP: u64 = 6;

const CHUNK_FLAG_FREE: u8 = 1;

/// The smallest chunk is 2⁵ = 32 octets (24 of header).
const MIN_CHUNK_EXP: u32 = 5;
const MAX_CHUNK_EXP: u32 = 47;

/// The size of a relative-pointer field: the target data offset,
/// followed by the offsets of the previous and next pointer fields in
/// the target's back-pointer chain.
pub const REL_PTR_SIZE: u64 = 24;

/// Chunk types 0 through 15 are reserved for the arena and the radix
/// trie; embedders define their own types starting here.
pub const CHUNK_TYPE_USER: u8 = 16;
pub(crate) const CHUNK_TYPE_RADTREE: u8 = 1;
pub(crate) const CHUNK_TYPE_RADNODE: u8 = 2;
pub(crate) const CHUNK_TYPE_RADARRAY: u8 = 3;

////////////////////////////////////////////////////////////////////////
// ARENA REFERENCES                                                   //
////////////////////////////////////////////////////////////////////////

/// A reference to a chunk in the arena: the offset of the chunk's data
/// (its header sits immediately before). The null reference is offset
/// zero.
#[derive(Clone, Copy, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct Ref(u64);

impl Ref {
    pub const NULL: Self = Self(0);

    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    pub fn offset(self) -> u64 {
        self.0
    }
}

impl From<u64> for Ref {
    fn from(offset: u64) -> Self {
        Self(offset)
    }
}

impl fmt::Debug for Ref {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Ref({})", self.0)
    }
}

/// The dispatch function an embedder supplies so the arena can find
/// every relative-pointer field in a chunk. Given a chunk's type tag,
/// data reference, and data size, it pushes the absolute offset of
/// each pointer field in the chunk onto `out`.
///
/// The radix trie's chunk types are handled by
/// [`radtree::walk_relptrs`]; an embedder's dispatch function should
/// defer to it for any type it does not define itself.
pub type WalkRelptrs = fn(base: &Base, chunk_type: u8, data: Ref, data_size: u64, out: &mut Vec<u64>);

////////////////////////////////////////////////////////////////////////
// THE BASE                                                           //
////////////////////////////////////////////////////////////////////////

/// A file-backed arena.
///
/// See the [module documentation](self) for an overview.
pub struct Base {
    buf: Vec<u8>,
    path: Option<PathBuf>,
    walk: WalkRelptrs,
    size_limit: u64,
    free_bins: Vec<Vec<u64>>,
}

impl Base {
    /// Creates a new arena that will be flushed to the given file by
    /// [`Base::sync`].
    pub fn create(path: &Path, walk: WalkRelptrs) -> Self {
        let mut base = Self::in_memory(walk);
        base.path = Some(path.to_owned());
        base
    }

    /// Creates a new arena with no backing file.
    pub fn in_memory(walk: WalkRelptrs) -> Self {
        let mut buf = vec![0; BASE_HEADER_SIZE as usize];
        buf[0..8].copy_from_slice(&MAGIC);
        let mut base = Self {
            buf,
            path: None,
            walk,
            size_limit: u64::MAX,
            free_bins: vec![Vec::new(); (MAX_CHUNK_EXP + 1) as usize],
        };
        base.put_u64(OFF_VERSION, VERSION);
        base.put_u64(OFF_END, BASE_HEADER_SIZE);
        base
    }

    /// Opens an existing arena file.
    pub fn open(path: &Path, walk: WalkRelptrs) -> Result<Self, Error> {
        let mut buf = Vec::new();
        fs::File::open(path)?.read_to_end(&mut buf)?;
        if buf.len() < BASE_HEADER_SIZE as usize || buf[0..8] != MAGIC {
            return Err(Error::Corrupt("bad magic"));
        }
        let mut base = Self {
            buf,
            path: Some(path.to_owned()),
            walk,
            size_limit: u64::MAX,
            free_bins: vec![Vec::new(); (MAX_CHUNK_EXP + 1) as usize],
        };
        if base.get_u64(OFF_VERSION) != VERSION {
            return Err(Error::Corrupt("unsupported version"));
        }
        let end = base.get_u64(OFF_END);
        if end < BASE_HEADER_SIZE || end as usize > base.buf.len() {
            return Err(Error::Corrupt("bad used size"));
        }
        base.rebuild_free_bins()?;
        Ok(base)
    }

    /// Writes the used portion of the arena back to its file. This is
    /// a no-op for an in-memory arena.
    pub fn sync(&self) -> io::Result<()> {
        if let Some(ref path) = self.path {
            let end = self.get_u64(OFF_END) as usize;
            let mut file = fs::File::create(path)?;
            file.write_all(&self.buf[..end])?;
            file.sync_all()?;
        }
        Ok(())
    }

    /// Caps the total size of the arena. Allocations that would grow
    /// the arena past the limit fail with [`Error::Full`].
    pub fn set_size_limit(&mut self, limit: u64) {
        self.size_limit = limit;
    }

    /// Returns the sum of the data sizes of all live chunks.
    pub fn stat_data(&self) -> u64 {
        self.get_u64(OFF_STAT_DATA)
    }

    /// Returns the number of live chunks.
    pub fn chunk_count(&self) -> u64 {
        self.get_u64(OFF_STAT_CHUNKS)
    }

    /// Returns the target of the arena's root pointer field.
    pub fn root(&self) -> Ref {
        self.ptr_data(OFF_ROOT_PTR)
    }

    /// Points the arena's root pointer field at `target`.
    pub fn set_root(&mut self, target: Ref) {
        self.ptr_set(OFF_ROOT_PTR, target);
    }

    /// Scans all chunks to reconstruct the in-memory free lists.
    fn rebuild_free_bins(&mut self) -> Result<(), Error> {
        let end = self.get_u64(OFF_END);
        let mut offset = BASE_HEADER_SIZE;
        while offset < end {
            let data = Ref(offset + CHUNK_HEADER_SIZE);
            let exp = self.get_u8(data.0 - CHUNK_OFF_EXP) as u32;
            if !(MIN_CHUNK_EXP..=MAX_CHUNK_EXP).contains(&exp) || offset + (1 << exp) > end {
                return Err(Error::Corrupt("bad chunk size"));
            }
            if self.get_u8(data.0 - CHUNK_OFF_FLAGS) & CHUNK_FLAG_FREE != 0 {
                self.free_bins[exp as usize].push(offset);
            }
            offset += 1 << exp;
        }
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////
// RAW MEMORY ACCESS                                                  //
////////////////////////////////////////////////////////////////////////

/// All multi-octet values in the arena are little-endian.
impl Base {
    pub(crate) fn get_u8(&self, offset: u64) -> u8 {
        self.buf[offset as usize]
    }

    pub(crate) fn put_u8(&mut self, offset: u64, value: u8) {
        self.buf[offset as usize] = value;
    }

    pub(crate) fn get_u16(&self, offset: u64) -> u16 {
        let offset = offset as usize;
        u16::from_le_bytes(self.buf[offset..offset + 2].try_into().unwrap())
    }

    pub(crate) fn put_u16(&mut self, offset: u64, value: u16) {
        let offset = offset as usize;
        self.buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
    }

    pub(crate) fn get_u64(&self, offset: u64) -> u64 {
        let offset = offset as usize;
        u64::from_le_bytes(self.buf[offset..offset + 8].try_into().unwrap())
    }

    pub(crate) fn put_u64(&mut self, offset: u64, value: u64) {
        let offset = offset as usize;
        self.buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
    }

    pub(crate) fn bytes(&self, offset: u64, len: u64) -> &[u8] {
        &self.buf[offset as usize..(offset + len) as usize]
    }

    pub(crate) fn write_bytes(&mut self, offset: u64, data: &[u8]) {
        self.buf[offset as usize..offset as usize + data.len()].copy_from_slice(data);
    }

    pub(crate) fn copy_within(&mut self, src: u64, dst: u64, len: u64) {
        self.buf
            .copy_within(src as usize..(src + len) as usize, dst as usize);
    }
}

////////////////////////////////////////////////////////////////////////
// CHUNK ALLOCATION                                                   //
////////////////////////////////////////////////////////////////////////

impl Base {
    /// Allocates a chunk with `data_size` octets of zeroed data and
    /// the given type tag.
    pub fn alloc(&mut self, chunk_type: u8, data_size: u64) -> Result<Ref, Error> {
        let total_needed = data_size + CHUNK_HEADER_SIZE;
        let exp = total_needed
            .next_power_of_two()
            .trailing_zeros()
            .max(MIN_CHUNK_EXP);
        if exp > MAX_CHUNK_EXP {
            return Err(Error::Full);
        }

        let chunk_offset = if let Some(offset) = self.free_bins[exp as usize].pop() {
            // Reused chunks must be re-zeroed.
            let total = 1u64 << exp;
            self.buf[offset as usize..(offset + total) as usize].fill(0);
            offset
        } else {
            let end = self.get_u64(OFF_END);
            let new_end = end + (1 << exp);
            if new_end > self.size_limit {
                return Err(Error::Full);
            }
            if new_end as usize > self.buf.len() {
                let new_len = (self.buf.len() * 2).max(new_end as usize);
                self.buf.resize(new_len.min(self.size_limit as usize), 0);
            }
            self.put_u64(OFF_END, new_end);
            end
        };

        let data = Ref(chunk_offset + CHUNK_HEADER_SIZE);
        self.put_u64(data.0 - CHUNK_OFF_DATA_SIZE, data_size);
        self.put_u8(data.0 - CHUNK_OFF_TYPE, chunk_type);
        self.put_u8(data.0 - CHUNK_OFF_EXP, exp as u8);
        self.put_u64(OFF_STAT_DATA, self.stat_data() + data_size);
        self.put_u64(OFF_STAT_CHUNKS, self.chunk_count() + 1);
        Ok(data)
    }

    /// Frees a chunk. No pointer field may still reference it.
    pub fn free(&mut self, data: Ref) {
        debug_assert_eq!(
            self.get_u64(data.0 - CHUNK_OFF_PTRLIST),
            0,
            "freeing a chunk that is still referenced",
        );
        let data_size = self.data_size(data);
        let exp = self.get_u8(data.0 - CHUNK_OFF_EXP) as u32;
        self.put_u8(data.0 - CHUNK_OFF_FLAGS, CHUNK_FLAG_FREE);
        self.put_u64(OFF_STAT_DATA, self.stat_data() - data_size);
        self.put_u64(OFF_STAT_CHUNKS, self.chunk_count() - 1);
        self.free_bins[exp as usize].push(data.0 - CHUNK_HEADER_SIZE);
    }

    /// Returns the type tag of a chunk.
    pub fn chunk_type(&self, data: Ref) -> u8 {
        self.get_u8(data.0 - CHUNK_OFF_TYPE)
    }

    /// Returns the data size of a chunk.
    pub fn data_size(&self, data: Ref) -> u64 {
        self.get_u64(data.0 - CHUNK_OFF_DATA_SIZE)
    }
}

////////////////////////////////////////////////////////////////////////
// RELATIVE POINTER FIELDS                                            //
////////////////////////////////////////////////////////////////////////

/// A pointer field at offset `field` consists of the target data
/// offset at `field`, the previous chain member at `field + 8`, and
/// the next chain member at `field + 16`. The chain of all fields
/// referencing a chunk is rooted at the chunk header's ptrlist word.
impl Base {
    /// Reads the target of a pointer field.
    pub fn ptr_data(&self, field: u64) -> Ref {
        Ref(self.get_u64(field))
    }

    /// The write barrier for pointer fields: unlinks the field from
    /// its old target's chain, stores the new target, and links the
    /// field into the new target's chain.
    pub fn ptr_set(&mut self, field: u64, target: Ref) {
        self.ptr_unlink(field);
        self.put_u64(field, target.0);
        if !target.is_null() {
            let head = self.get_u64(target.0 - CHUNK_OFF_PTRLIST);
            self.put_u64(field + 8, 0);
            self.put_u64(field + 16, head);
            if head != 0 {
                self.put_u64(head + 8, field);
            }
            self.put_u64(target.0 - CHUNK_OFF_PTRLIST, field);
        } else {
            self.put_u64(field + 8, 0);
            self.put_u64(field + 16, 0);
        }
    }

    /// Clears a pointer field, unlinking it from its target's chain.
    pub fn ptr_zero(&mut self, field: u64) {
        self.ptr_set(field, Ref::NULL);
    }

    /// Removes a pointer field from its current target's chain without
    /// touching the field's own contents.
    fn ptr_unlink(&mut self, field: u64) {
        let target = self.get_u64(field);
        if target == 0 {
            return;
        }
        let prev = self.get_u64(field + 8);
        let next = self.get_u64(field + 16);
        if prev == 0 {
            self.put_u64(Ref(target).0 - CHUNK_OFF_PTRLIST, next);
        } else {
            self.put_u64(prev + 16, next);
        }
        if next != 0 {
            self.put_u64(next + 8, prev);
        }
    }

    /// Moves a chunk to a newly allocated location, rewriting every
    /// live reference to it via its back-pointer chain, and frees the
    /// old location. Returns the new data reference.
    ///
    /// This is the relocating allocator's primitive; defragmentation
    /// is a sequence of such moves.
    pub fn relocate(&mut self, data: Ref) -> Result<Ref, Error> {
        let data_size = self.data_size(data);
        let chunk_type = self.chunk_type(data);

        // Unlink the chunk's own outgoing pointer fields, remembering
        // their targets; their chain neighbors hold our old offsets.
        let mut fields = Vec::new();
        (self.walk)(self, chunk_type, data, data_size, &mut fields);
        let targets: Vec<Ref> = fields.iter().map(|&f| self.ptr_data(f)).collect();
        for &field in &fields {
            self.ptr_unlink(field);
        }

        let new_data = match self.alloc(chunk_type, data_size) {
            Ok(new_data) => new_data,
            Err(e) => {
                // Roll back: relink the outgoing fields.
                for (&field, &target) in fields.iter().zip(&targets) {
                    self.put_u64(field, 0);
                    self.ptr_set(field, target);
                }
                return Err(e);
            }
        };
        self.copy_within(data.0, new_data.0, data_size);

        // Rewrite incoming references. The chain members are fields
        // outside this chunk, so their offsets are unchanged; the
        // chain itself moves with the header.
        let chain = self.get_u64(data.0 - CHUNK_OFF_PTRLIST);
        self.put_u64(new_data.0 - CHUNK_OFF_PTRLIST, chain);
        self.put_u64(data.0 - CHUNK_OFF_PTRLIST, 0);
        let mut member = chain;
        while member != 0 {
            self.put_u64(member, new_data.0);
            member = self.get_u64(member + 16);
        }

        // Relink the outgoing fields at their new offsets.
        for (&field, &target) in fields.iter().zip(&targets) {
            let new_field = new_data.0 + (field - data.0);
            self.put_u64(new_field, 0);
            self.ptr_set(new_field, target);
        }

        self.free(data);
        Ok(new_data)
    }
}

////////////////////////////////////////////////////////////////////////
// STRUCTURE CHECKING (FOR TESTS)                                     //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
impl Base {
    /// Exhaustively validates the arena: chunk layout, allocation
    /// statistics, and the exact correspondence between pointer fields
    /// (as enumerated by the walk dispatch) and back-pointer chains.
    pub(crate) fn check_structure(&self) {
        use std::collections::{HashMap, HashSet};

        let end = self.get_u64(OFF_END);
        let mut live = Vec::new();
        let mut live_data = 0;
        let mut offset = BASE_HEADER_SIZE;
        while offset < end {
            let data = Ref(offset + CHUNK_HEADER_SIZE);
            let exp = self.get_u8(data.0 - CHUNK_OFF_EXP) as u32;
            assert!((MIN_CHUNK_EXP..=MAX_CHUNK_EXP).contains(&exp), "bad exp");
            let data_size = self.data_size(data);
            if self.get_u8(data.0 - CHUNK_OFF_FLAGS) & CHUNK_FLAG_FREE == 0 {
                assert!(data_size + CHUNK_HEADER_SIZE <= 1 << exp, "chunk overflow");
                live.push(data);
                live_data += data_size;
            }
            offset += 1 << exp;
        }
        assert_eq!(offset, end, "chunks do not tile the arena");
        assert_eq!(live_data, self.stat_data(), "stat_data mismatch");
        assert_eq!(live.len() as u64, self.chunk_count(), "chunk count mismatch");

        // Fields found by walking chunk contents (plus the root field).
        let mut expected: HashMap<Ref, HashSet<u64>> = HashMap::new();
        let mut note = |base: &Base, field: u64| {
            let target = base.ptr_data(field);
            if !target.is_null() {
                expected.entry(target).or_default().insert(field);
            }
        };
        note(self, OFF_ROOT_PTR);
        for &data in &live {
            let mut fields = Vec::new();
            (self.walk)(self, self.chunk_type(data), data, self.data_size(data), &mut fields);
            for field in fields {
                note(self, field);
            }
        }

        // Fields found by following back-pointer chains.
        for &data in &live {
            let mut chain = HashSet::new();
            let mut member = self.get_u64(data.0 - CHUNK_OFF_PTRLIST);
            let mut prev = 0;
            while member != 0 {
                assert_eq!(self.get_u64(member + 8), prev, "broken chain prev link");
                assert_eq!(self.ptr_data(member), data, "chain member points elsewhere");
                assert!(chain.insert(member), "chain cycle");
                prev = member;
                member = self.get_u64(member + 16);
            }
            let empty = HashSet::new();
            let expected_fields = expected.get(&data).unwrap_or(&empty);
            assert_eq!(
                &chain, expected_fields,
                "chain does not match walked fields for {:?}",
                data,
            );
        }
    }
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error arising from arena operations.
#[derive(Debug)]
pub enum Error {
    /// The arena's size limit has been reached.
    Full,

    /// The database file is not a valid arena.
    Corrupt(&'static str),

    /// An I/O error on the backing file.
    Io(io::Error),
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Full => f.write_str("arena is full"),
            Self::Corrupt(what) => write!(f, "database file is corrupt: {}", what),
            Self::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for Error {}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    /// A test chunk type holding two pointer fields at offsets 0 and
    /// 24 of its data.
    const TEST_TYPE: u8 = CHUNK_TYPE_USER;

    fn test_walk(_base: &Base, chunk_type: u8, data: Ref, _size: u64, out: &mut Vec<u64>) {
        if chunk_type == TEST_TYPE {
            out.push(data.offset());
            out.push(data.offset() + REL_PTR_SIZE);
        }
    }

    #[test]
    fn alloc_and_free_maintain_statistics() {
        let mut base = Base::in_memory(test_walk);
        let a = base.alloc(TEST_TYPE, 48).unwrap();
        let b = base.alloc(TEST_TYPE, 48).unwrap();
        assert_eq!(base.stat_data(), 96);
        assert_eq!(base.chunk_count(), 2);
        base.check_structure();
        base.free(a);
        assert_eq!(base.stat_data(), 48);
        assert_eq!(base.chunk_count(), 1);
        base.check_structure();
        // The freed chunk is reused.
        let c = base.alloc(TEST_TYPE, 48).unwrap();
        assert_eq!(c, a);
        base.free(b);
        base.free(c);
        assert_eq!(base.stat_data(), 0);
        base.check_structure();
    }

    #[test]
    fn size_limit_is_enforced() {
        let mut base = Base::in_memory(test_walk);
        base.set_size_limit(256);
        assert!(base.alloc(TEST_TYPE, 64).is_ok());
        assert!(matches!(base.alloc(TEST_TYPE, 4096), Err(Error::Full)));
    }

    #[test]
    fn ptr_set_maintains_chains() {
        let mut base = Base::in_memory(test_walk);
        let a = base.alloc(TEST_TYPE, 48).unwrap();
        let b = base.alloc(TEST_TYPE, 48).unwrap();
        let c = base.alloc(TEST_TYPE, 48).unwrap();
        // a.field0 -> c, b.field0 -> c, b.field1 -> c
        base.ptr_set(a.offset(), c);
        base.ptr_set(b.offset(), c);
        base.ptr_set(b.offset() + REL_PTR_SIZE, c);
        base.check_structure();
        // Retarget b.field0 -> a.
        base.ptr_set(b.offset(), a);
        base.check_structure();
        // Tear down.
        base.ptr_zero(a.offset());
        base.ptr_zero(b.offset());
        base.ptr_zero(b.offset() + REL_PTR_SIZE);
        base.check_structure();
        base.free(a);
        base.free(b);
        base.free(c);
        base.check_structure();
    }

    #[test]
    fn relocate_rewrites_references() {
        let mut base = Base::in_memory(test_walk);
        let a = base.alloc(TEST_TYPE, 48).unwrap();
        let b = base.alloc(TEST_TYPE, 48).unwrap();
        let c = base.alloc(TEST_TYPE, 48).unwrap();
        base.ptr_set(a.offset(), b); // a -> b
        base.ptr_set(b.offset(), c); // b -> c
        base.set_root(a);
        base.check_structure();

        // Move b; a's reference and b's outgoing reference must both
        // survive.
        let new_b = base.relocate(b).unwrap();
        assert_ne!(new_b, b);
        assert_eq!(base.ptr_data(a.offset()), new_b);
        assert_eq!(base.ptr_data(new_b.offset()), c);
        base.check_structure();
    }

    #[test]
    fn sync_and_open_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.udb");
        let (a, b);
        {
            let mut base = Base::create(&path, test_walk);
            a = base.alloc(TEST_TYPE, 40).unwrap();
            b = base.alloc(TEST_TYPE, 40).unwrap();
            base.ptr_set(a.offset(), b);
            base.set_root(a);
            base.sync().unwrap();
        }
        let reopened = Base::open(&path, test_walk).unwrap();
        assert_eq!(reopened.root(), a);
        assert_eq!(reopened.ptr_data(a.offset()), b);
        assert_eq!(reopened.stat_data(), 80);
        reopened.check_structure();
    }

    #[test]
    fn open_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.udb");
        fs::write(&path, b"not a database").unwrap();
        assert!(matches!(
            Base::open(&path, test_walk),
            Err(Error::Corrupt(_)),
        ));
    }
}
