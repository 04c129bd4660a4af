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

//! Writing of zone data in zone-file text form.
//!
//! The [`Writer`] is a [record sink](crate::xfr::RecordSink) that
//! renders each record as `owner ttl class type rdata`. Output is
//! grouped under `$ORIGIN` directives: whenever the owner's parent
//! domain changes, a new directive is emitted and subsequent owners
//! are written relative to it; repeated owners are elided entirely.

use std::io::{self, Write};

use chrono::Local;

use crate::name::{LowercaseName, Name};
use crate::rr::Record;
use crate::xfr::RecordSink;

/// A zone-file text writer.
pub struct Writer<W: Write> {
    out: W,
    origin: Option<Box<Name>>,
    previous_owner: Option<Box<Name>>,
}

impl<W: Write> Writer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            origin: None,
            previous_owner: None,
        }
    }

    /// Writes the comment header identifying the transfer: the tool
    /// version, the zone, the serial we held before (or "first
    /// transfer"), the master the zone came from, a timestamp, and
    /// whether the transfer was TSIG-verified.
    pub fn write_header(
        &mut self,
        zone: &Name,
        last_serial: Option<u32>,
        source: &str,
        tsig_key: Option<&LowercaseName>,
    ) -> io::Result<()> {
        writeln!(self.out, "; madrone-xfer version {}", env!("CARGO_PKG_VERSION"))?;
        match last_serial {
            Some(serial) => writeln!(self.out, "; zone '{}'   last serial {}", zone, serial)?,
            None => writeln!(self.out, "; zone '{}'   first transfer", zone)?,
        }
        writeln!(
            self.out,
            "; from {} using AXFR at {}",
            source,
            Local::now().to_rfc2822(),
        )?;
        match tsig_key {
            Some(key_name) => writeln!(self.out, "; TSIG verified with key '{}'", key_name)?,
            None => writeln!(self.out, "; NOT TSIG verified")?,
        }
        Ok(())
    }

    /// Flushes the underlying stream.
    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }

    /// Returns the origin a record owner is grouped under: the owner's
    /// parent domain (or the root, for a root owner).
    fn origin_of(owner: &Name) -> &Name {
        owner.parent().unwrap_or_else(|| Name::root())
    }
}

impl<W: Write> RecordSink for Writer<W> {
    fn record(&mut self, record: &Record) -> io::Result<()> {
        let owner_changed = self
            .previous_owner
            .as_deref()
            .map_or(true, |previous| previous != record.owner.as_ref());
        if owner_changed {
            let origin = Self::origin_of(&record.owner);
            let origin_changed = self
                .origin
                .as_deref()
                .map_or(true, |current| current != origin);
            if origin_changed {
                writeln!(self.out, "$ORIGIN {}", origin)?;
                self.origin = Some(origin.to_owned());
            }
            let origin = self.origin.as_deref().unwrap();
            write!(self.out, "{}", record.owner.display_relative(origin))?;
            self.previous_owner = Some(record.owner.clone());
        }
        writeln!(
            self.out,
            "\t{}\t{}\t{}\t{}",
            record.ttl,
            record.class,
            record.rr_type,
            record.rdata.zone_display(record.rr_type),
        )
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::Class;
    use crate::rr::{Rdata, Ttl, Type};

    fn record(owner: &str, rr_type: Type, rdata: &[u8]) -> Record {
        Record {
            owner: owner.parse().unwrap(),
            rr_type,
            class: Class::IN,
            ttl: Ttl::from(3600),
            rdata: rdata.to_vec().try_into().unwrap(),
        }
    }

    #[test]
    fn records_are_grouped_under_origins() {
        let mut writer = Writer::new(Vec::new());
        for record in [
            record("example.test.", Type::NS, b"\x03ns1\x07example\x04test\x00"),
            record("example.test.", Type::MX, b"\x00\x0a\x04mail\x07example\x04test\x00"),
            record("www.example.test.", Type::A, b"\x7f\x00\x00\x01"),
            record("mail.example.test.", Type::A, b"\x7f\x00\x00\x02"),
            record("a.b.example.test.", Type::A, b"\x7f\x00\x00\x03"),
        ] {
            writer.record(&record).unwrap();
        }
        let output = String::from_utf8(writer.out).unwrap();
        assert_eq!(
            output,
            "$ORIGIN test.\n\
             example\t3600\tIN\tNS\tns1.example.test.\n\
             \t3600\tIN\tMX\t10 mail.example.test.\n\
             $ORIGIN example.test.\n\
             www\t3600\tIN\tA\t127.0.0.1\n\
             mail\t3600\tIN\tA\t127.0.0.2\n\
             $ORIGIN b.example.test.\n\
             a\t3600\tIN\tA\t127.0.0.3\n",
        );
    }

    #[test]
    fn header_mentions_transfer_details() {
        let zone: Box<Name> = "example.test.".parse().unwrap();
        let key: Box<LowercaseName> = "xfer.key.".parse().unwrap();
        let mut writer = Writer::new(Vec::new());
        writer
            .write_header(&zone, Some(41), "192.0.2.1", Some(&key))
            .unwrap();
        let output = String::from_utf8(writer.out).unwrap();
        assert!(output.contains("zone 'example.test.'"));
        assert!(output.contains("last serial 41"));
        assert!(output.contains("from 192.0.2.1 using AXFR"));
        assert!(output.contains("TSIG verified with key 'xfer.key.'"));

        let mut writer = Writer::new(Vec::new());
        writer.write_header(&zone, None, "192.0.2.1", None).unwrap();
        let output = String::from_utf8(writer.out).unwrap();
        assert!(output.contains("first transfer"));
        assert!(output.contains("NOT TSIG verified"));
    }
}
