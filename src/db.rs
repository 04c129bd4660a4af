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

//! The on-disk zone database.
//!
//! A [`ZoneDb`] is a [`udb`] arena holding one radix trie that indexes
//! zone data by owner name in canonical wire form. Each element chunk
//! is a *domain*: a back-pointer to its trie node, the owner name as
//! received, and the wire data of every record at that owner. The
//! database implements [`RecordSink`], so an AXFR stream can be
//! materialized into it directly; records arrive in stream order and
//! are appended to their owner's domain chunk.
//!
//! Because owner names are keyed in canonical form, iterating the
//! database yields owners in canonical order regardless of the order
//! the master sent them in.

use std::io;
use std::path::Path;

use crate::name::Name;
use crate::rr::{Rdata, Record, Ttl, Type};
use crate::udb::{self, radtree, Base, RadTree, Ref, CHUNK_TYPE_USER, REL_PTR_SIZE};
use crate::xfr::RecordSink;

/// The chunk type tag of domain chunks.
pub const CHUNK_TYPE_DOMAIN: u8 = CHUNK_TYPE_USER;

// Domain chunk layout: the trie-node back-pointer, the owner name
// length, the record count, the length of the record region, the owner
// name, and then the records.
const DOM_NODE: u64 = 0;
const DOM_NAME_LEN: u64 = REL_PTR_SIZE;
const DOM_RR_COUNT: u64 = REL_PTR_SIZE + 2;
const DOM_DATA_LEN: u64 = REL_PTR_SIZE + 4;
const DOM_NAME: u64 = REL_PTR_SIZE + 8;

/// The chunk-walk dispatch for a zone database: domain chunks carry
/// one pointer field; everything else belongs to the radix trie.
fn walk_chunks(base: &Base, chunk_type: u8, data: Ref, data_size: u64, out: &mut Vec<u64>) {
    if chunk_type == CHUNK_TYPE_DOMAIN {
        out.push(data.offset() + DOM_NODE);
    } else {
        radtree::walk_relptrs(base, chunk_type, data, data_size, out);
    }
}

/// An on-disk zone database.
pub struct ZoneDb {
    base: Base,
    tree: RadTree,
}

impl ZoneDb {
    /// Creates a new database that will be flushed to the given file
    /// by [`ZoneDb::sync`].
    pub fn create(path: &Path) -> Result<Self, udb::Error> {
        let mut base = Base::create(path, walk_chunks);
        let tree = RadTree::create(&mut base)?;
        base.set_root(tree.as_ref());
        Ok(Self { base, tree })
    }

    /// Creates a new database with no backing file.
    pub fn in_memory() -> Result<Self, udb::Error> {
        let mut base = Base::in_memory(walk_chunks);
        let tree = RadTree::create(&mut base)?;
        base.set_root(tree.as_ref());
        Ok(Self { base, tree })
    }

    /// Opens an existing database file.
    pub fn open(path: &Path) -> Result<Self, udb::Error> {
        let base = Base::open(path, walk_chunks)?;
        let tree = RadTree::from_ref(&base, base.root())?;
        Ok(Self { base, tree })
    }

    /// Flushes the database to its backing file.
    pub fn sync(&self) -> io::Result<()> {
        self.base.sync()
    }

    /// Returns the number of distinct owner names in the database.
    pub fn owner_count(&self) -> u64 {
        self.tree.count(&self.base)
    }

    /// Inserts a record, creating or extending its owner's domain
    /// chunk. On allocation failure the database is unchanged.
    pub fn insert_record(&mut self, record: &Record) -> Result<(), udb::Error> {
        let key = record.owner.key();
        let entry = encode_record(record);

        let node = self.tree.search(&self.base, &key);
        if node.is_null() {
            let name = record.owner.wire_repr();
            let domain = self.base.alloc(
                CHUNK_TYPE_DOMAIN,
                DOM_NAME + name.len() as u64 + entry.len() as u64,
            )?;
            self.base.put_u16(domain.offset() + DOM_NAME_LEN, name.len() as u16);
            self.base.put_u16(domain.offset() + DOM_RR_COUNT, 1);
            self.base
                .put_u64(domain.offset() + DOM_DATA_LEN, entry.len() as u64);
            self.base.write_bytes(domain.offset() + DOM_NAME, name);
            self.base
                .write_bytes(domain.offset() + DOM_NAME + name.len() as u64, &entry);

            match self.tree.insert(&mut self.base, &key, domain) {
                Ok(Some(node)) => {
                    self.base.ptr_set(domain.offset() + DOM_NODE, node);
                    Ok(())
                }
                Ok(None) => {
                    // Unreachable given the search above, but do not
                    // leak the chunk.
                    self.base.free(domain);
                    Ok(())
                }
                Err(e) => {
                    self.base.free(domain);
                    Err(e)
                }
            }
        } else {
            // Append: a fresh chunk with the old contents plus the new
            // record replaces the old chunk.
            let old = RadTree::elem(&self.base, node);
            let name_len = self.base.get_u16(old.offset() + DOM_NAME_LEN) as u64;
            let rr_count = self.base.get_u16(old.offset() + DOM_RR_COUNT);
            let data_len = self.base.get_u64(old.offset() + DOM_DATA_LEN);
            let old_size = DOM_NAME + name_len + data_len;

            let new = self
                .base
                .alloc(CHUNK_TYPE_DOMAIN, old_size + entry.len() as u64)?;
            let old_body = self
                .base
                .bytes(old.offset() + DOM_NAME_LEN, old_size - DOM_NAME_LEN)
                .to_vec();
            self.base
                .write_bytes(new.offset() + DOM_NAME_LEN, &old_body);
            self.base.put_u16(new.offset() + DOM_RR_COUNT, rr_count + 1);
            self.base
                .put_u64(new.offset() + DOM_DATA_LEN, data_len + entry.len() as u64);
            self.base.write_bytes(new.offset() + old_size, &entry);
            self.base.ptr_set(new.offset() + DOM_NODE, node);

            RadTree::replace_elem(&mut self.base, node, new);
            self.base.ptr_zero(old.offset() + DOM_NODE);
            self.base.free(old);
            Ok(())
        }
    }

    /// Returns the records stored under `owner`, or [`None`] if the
    /// owner is not in the database.
    pub fn records(&self, owner: &Name) -> Option<Vec<Record>> {
        let node = self.tree.search(&self.base, &owner.key());
        if node.is_null() {
            None
        } else {
            Some(self.domain_records(RadTree::elem(&self.base, node)))
        }
    }

    /// Returns an iterator over (owner, records) pairs in canonical
    /// owner order.
    pub fn domains(&self) -> Domains {
        Domains {
            db: self,
            node: self.tree.first(&self.base),
        }
    }

    /// Decodes all records of a domain chunk.
    fn domain_records(&self, domain: Ref) -> Vec<Record> {
        let name_len = self.base.get_u16(domain.offset() + DOM_NAME_LEN) as u64;
        let rr_count = self.base.get_u16(domain.offset() + DOM_RR_COUNT);
        let data_len = self.base.get_u64(domain.offset() + DOM_DATA_LEN);
        let name_octets = self.base.bytes(domain.offset() + DOM_NAME, name_len);
        let (owner, _) = Name::try_from_uncompressed(name_octets)
            .expect("corrupt owner name in domain chunk");
        let mut records = Vec::with_capacity(rr_count as usize);
        let mut data = self
            .base
            .bytes(domain.offset() + DOM_NAME + name_len, data_len);
        for _ in 0..rr_count {
            let (record, rest) = decode_record(&owner, data);
            records.push(record);
            data = rest;
        }
        records
    }
}

/// An iterator over the domains of a [`ZoneDb`] in canonical owner
/// order.
pub struct Domains<'a> {
    db: &'a ZoneDb,
    node: Ref,
}

impl Iterator for Domains<'_> {
    type Item = (Box<Name>, Vec<Record>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.node.is_null() {
            return None;
        }
        let domain = RadTree::elem(&self.db.base, self.node);
        let records = self.db.domain_records(domain);
        let owner = records[0].owner.clone();
        self.node = RadTree::next(&self.db.base, self.node);
        Some((owner, records))
    }
}

////////////////////////////////////////////////////////////////////////
// RECORD ENCODING                                                    //
////////////////////////////////////////////////////////////////////////

// A record in a domain chunk: type, class, TTL, RDLENGTH, RDATA. The
// owner is stored once per domain.

fn encode_record(record: &Record) -> Vec<u8> {
    let rdata = record.rdata.octets();
    let mut entry = Vec::with_capacity(10 + rdata.len());
    entry.extend_from_slice(&u16::from(record.rr_type).to_le_bytes());
    entry.extend_from_slice(&u16::from(record.class).to_le_bytes());
    entry.extend_from_slice(&u32::from(record.ttl).to_le_bytes());
    entry.extend_from_slice(&(rdata.len() as u16).to_le_bytes());
    entry.extend_from_slice(rdata);
    entry
}

fn decode_record<'a>(owner: &Name, data: &'a [u8]) -> (Record, &'a [u8]) {
    let rr_type = Type::from(u16::from_le_bytes(data[0..2].try_into().unwrap()));
    let class = u16::from_le_bytes(data[2..4].try_into().unwrap()).into();
    let ttl = Ttl::from(u32::from_le_bytes(data[4..8].try_into().unwrap()));
    let rdlength = u16::from_le_bytes(data[8..10].try_into().unwrap()) as usize;
    let rdata: &Rdata = data[10..10 + rdlength].try_into().unwrap();
    let record = Record {
        owner: owner.to_owned(),
        rr_type,
        class,
        ttl,
        rdata: rdata.to_owned(),
    };
    (record, &data[10 + rdlength..])
}

impl RecordSink for ZoneDb {
    fn record(&mut self, record: &Record) -> io::Result<()> {
        self.insert_record(record)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::Class;

    fn record(owner: &str, rr_type: Type, rdata: &[u8]) -> Record {
        Record {
            owner: owner.parse().unwrap(),
            rr_type,
            class: Class::IN,
            ttl: Ttl::from(3600),
            rdata: rdata.to_vec().try_into().unwrap(),
        }
    }

    fn populate(db: &mut ZoneDb) {
        for record in [
            record("example.test.", Type::SOA, &[0, 0, 0, 0]),
            record("WWW.example.test.", Type::A, b"\x7f\x00\x00\x01"),
            record("www.example.test.", Type::A, b"\x7f\x00\x00\x02"),
            record("mail.example.test.", Type::A, b"\x7f\x00\x00\x03"),
        ] {
            db.insert_record(&record).unwrap();
        }
    }

    #[test]
    fn insert_and_lookup_work() {
        let mut db = ZoneDb::in_memory().unwrap();
        populate(&mut db);
        assert_eq!(db.owner_count(), 3);

        // Lookup is case-insensitive, and records at one owner
        // accumulate in arrival order.
        let owner: Box<Name> = "www.EXAMPLE.test.".parse().unwrap();
        let records = db.records(&owner).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].rdata.octets(), b"\x7f\x00\x00\x01");
        assert_eq!(records[1].rdata.octets(), b"\x7f\x00\x00\x02");

        let absent: Box<Name> = "absent.example.test.".parse().unwrap();
        assert!(db.records(&absent).is_none());
    }

    #[test]
    fn iteration_is_in_canonical_order() {
        let mut db = ZoneDb::in_memory().unwrap();
        populate(&mut db);
        // Keys are canonical wire form compared lexicographically, so
        // shorter first labels sort first.
        let owners: Vec<String> = db.domains().map(|(owner, _)| owner.to_string()).collect();
        assert_eq!(
            owners,
            vec![
                "WWW.example.test.",
                "mail.example.test.",
                "example.test.",
            ],
        );
    }

    #[test]
    fn sync_and_open_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zone.udb");
        {
            let mut db = ZoneDb::create(&path).unwrap();
            populate(&mut db);
            db.sync().unwrap();
        }
        let db = ZoneDb::open(&path).unwrap();
        assert_eq!(db.owner_count(), 3);
        let owner: Box<Name> = "mail.example.test.".parse().unwrap();
        assert_eq!(db.records(&owner).unwrap().len(), 1);
    }

    #[test]
    fn domain_chunks_survive_relocation() {
        let mut db = ZoneDb::in_memory().unwrap();
        populate(&mut db);
        let owner: Box<Name> = "www.example.test.".parse().unwrap();
        let node = db.tree.search(&db.base, &owner.key());
        let domain = RadTree::elem(&db.base, node);
        let moved = db.base.relocate(domain).unwrap();
        assert_ne!(moved, domain);
        assert_eq!(RadTree::elem(&db.base, node), moved);
        assert_eq!(db.records(&owner).unwrap().len(), 2);
    }
}
