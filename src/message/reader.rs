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

//! Implementation of the [`Reader`] type to read on-the-wire DNS
//! messages.

use std::borrow::Cow;
use std::convert::TryFrom;
use std::fmt;

use super::constants::*;
use super::Question;
use crate::class::Class;
use crate::name::{self, Name};
use crate::rr::rdata::{Rdata, ReadRdataError};
use crate::rr::{Ttl, Type};

////////////////////////////////////////////////////////////////////////
// READER                                                             //
////////////////////////////////////////////////////////////////////////

/// A "frame" around a buffer containing a DNS message that enables
/// reading the message data.
///
/// A `Reader` is constructed using its [`TryFrom`] implementation. Any
/// underlying buffer for a reader must contain at least a full DNS
/// message header of 12 octets; otherwise the construction will fail.
///
/// Since header information is in a fixed position, it can be read at
/// any time through the appropriate `Reader` methods. Questions and
/// records are read sequentially through a cursor, which starts at the
/// first octet after the header. The cursor's byte position is exposed
/// through [`Reader::cursor`]; TSIG processing records the position at
/// which the TSIG RR begins, since the digest covers the message up to
/// exactly that point.
#[derive(Eq, PartialEq)]
pub struct Reader<'a> {
    octets: &'a [u8],
    cursor: usize,
}

impl<'a> Reader<'a> {
    /// Returns the 16-bit ID of the message.
    pub fn id(&self) -> u16 {
        u16::from_be_bytes(self.octets[ID_START..ID_END].try_into().unwrap())
    }

    /// Returns whether the QR (query response) bit is set.
    pub fn qr(&self) -> bool {
        (self.octets[QR_BYTE] & QR_MASK) != 0
    }

    /// Returns whether the TC (truncation) bit is set.
    pub fn tc(&self) -> bool {
        (self.octets[TC_BYTE] & TC_MASK) != 0
    }

    /// Returns the RCODE of the message.
    pub fn rcode(&self) -> super::Rcode {
        (self.octets[RCODE_BYTE] & RCODE_MASK).into()
    }

    /// Returns the number of questions in the message.
    pub fn qdcount(&self) -> u16 {
        u16::from_be_bytes(self.octets[QDCOUNT_START..QDCOUNT_END].try_into().unwrap())
    }

    /// Returns the number of answers in the message.
    pub fn ancount(&self) -> u16 {
        u16::from_be_bytes(self.octets[ANCOUNT_START..ANCOUNT_END].try_into().unwrap())
    }

    /// Returns the number of authority records in the message.
    pub fn nscount(&self) -> u16 {
        u16::from_be_bytes(self.octets[NSCOUNT_START..NSCOUNT_END].try_into().unwrap())
    }

    /// Returns the number of additional records in the message.
    pub fn arcount(&self) -> u16 {
        u16::from_be_bytes(self.octets[ARCOUNT_START..ARCOUNT_END].try_into().unwrap())
    }

    /// Reads a [`Question`] starting at the current cursor.
    ///
    /// This method is atomic, in that the cursor is not changed on
    /// failure.
    pub fn read_question(&mut self) -> Result<Question> {
        let (qname, qname_len) =
            Name::try_from_compressed(self.octets, self.cursor).map_err(Error::InvalidOwner)?;
        let qname_end = self.cursor + qname_len;
        let qtype = read_u16(self.octets, qname_end)?.into();
        let qclass = read_u16(self.octets, qname_end + 2)?.into();
        self.cursor = qname_end + 4;
        Ok(Question {
            qname,
            qtype,
            qclass,
        })
    }

    /// Skips a question starting at the current cursor.
    pub fn skip_question(&mut self) -> Result<()> {
        let qname_len =
            Name::skip_compressed(self.octets, self.cursor).map_err(Error::InvalidOwner)?;
        let end = self.cursor + qname_len + 4;
        if end > self.octets.len() {
            return Err(Error::UnexpectedEomInField);
        }
        self.cursor = end;
        Ok(())
    }

    /// Reads a resource record at the current cursor.
    ///
    /// Embedded domain names in the RDATA of well-known types are
    /// decompressed, so the returned RDATA is self-contained.
    ///
    /// This method is atomic, in that the cursor is not changed on
    /// failure.
    pub fn read_rr(&mut self) -> Result<ReadRr<'a>> {
        let (owner, owner_len) =
            Name::try_from_compressed(self.octets, self.cursor).map_err(Error::InvalidOwner)?;
        let owner_end = self.cursor + owner_len;
        let rr_type = Type::from(read_u16(self.octets, owner_end)?);
        let class = Class::from(read_u16(self.octets, owner_end + 2)?);
        let ttl = Ttl::from(read_u32(self.octets, owner_end + 4)?);
        let rdlength = read_u16(self.octets, owner_end + 8)?;
        let rdata = Rdata::read(rr_type, self.octets, owner_end + 10, rdlength)?;
        self.cursor = owner_end + 10 + rdlength as usize;
        Ok(ReadRr {
            owner,
            rr_type,
            class,
            ttl,
            rdata,
        })
    }

    /// Skips a resource record at the current cursor without parsing
    /// its RDATA.
    pub fn skip_rr(&mut self) -> Result<()> {
        let owner_len =
            Name::skip_compressed(self.octets, self.cursor).map_err(Error::InvalidOwner)?;
        let owner_end = self.cursor + owner_len;
        let rdlength = read_u16(self.octets, owner_end + 8)?;
        let end = owner_end + 10 + rdlength as usize;
        if end > self.octets.len() {
            return Err(Error::UnexpectedEomInField);
        }
        self.cursor = end;
        Ok(())
    }

    /// Returns the cursor's byte position within the message.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Returns the portion of the message before the current cursor.
    pub fn message_to_cursor(&self) -> &'a [u8] {
        &self.octets[..self.cursor]
    }

    /// Returns whether the `Reader`'s cursor has reached the end of the
    /// message.
    pub fn at_eom(&self) -> bool {
        self.cursor >= self.octets.len()
    }
}

impl<'a> TryFrom<&'a [u8]> for Reader<'a> {
    type Error = Error;

    fn try_from(octets: &'a [u8]) -> Result<Self> {
        if octets.len() >= HEADER_SIZE {
            Ok(Self {
                octets,
                cursor: HEADER_SIZE,
            })
        } else {
            Err(Error::HeaderTooShort)
        }
    }
}

impl fmt::Debug for Reader<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Reader")
            .field("id", &self.id())
            .field("qr", &self.qr())
            .field("tc", &self.tc())
            .field("rcode", &self.rcode())
            .field("qdcount", &self.qdcount())
            .field("ancount", &self.ancount())
            .field("nscount", &self.nscount())
            .field("arcount", &self.arcount())
            .field("cursor", &self.cursor)
            .finish()
    }
}

////////////////////////////////////////////////////////////////////////
// HELPERS FOR READING MULTI-BYTE INTEGERS                            //
////////////////////////////////////////////////////////////////////////

/// Reads a network-byte-order `u16` at index `at` of `octets`.
fn read_u16(octets: &[u8], at: usize) -> Result<u16> {
    let array = octets
        .get(at..at + 2)
        .ok_or(Error::UnexpectedEomInField)?
        .try_into()
        .unwrap();
    Ok(u16::from_be_bytes(array))
}

/// Reads a network-byte-order `u32` at index `at` of `octets`.
fn read_u32(octets: &[u8], at: usize) -> Result<u32> {
    let array = octets
        .get(at..at + 4)
        .ok_or(Error::UnexpectedEomInField)?
        .try_into()
        .unwrap();
    Ok(u32::from_be_bytes(array))
}

////////////////////////////////////////////////////////////////////////
// READ RR STRUCTURE                                                  //
////////////////////////////////////////////////////////////////////////

/// A structure containing RR data as returned by [`Reader::read_rr`].
///
/// The RDATA borrows from the message when no decompression was
/// required and is owned otherwise.
#[derive(Clone, Eq, PartialEq)]
pub struct ReadRr<'a> {
    pub owner: Box<Name>,
    pub rr_type: Type,
    pub class: Class,
    pub ttl: Ttl,
    pub rdata: Cow<'a, Rdata>,
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error signaling that a [`Question`] or resource record could not
/// be read.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Error {
    HeaderTooShort,
    UnexpectedEomInField,
    InvalidOwner(name::Error),
    InvalidRdata(ReadRdataError),
}

impl From<ReadRdataError> for Error {
    fn from(err: ReadRdataError) -> Self {
        Self::InvalidRdata(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::HeaderTooShort => f.write_str("header too short"),
            Self::UnexpectedEomInField => f.write_str("unexpected end of message in field"),
            Self::InvalidOwner(err) => write!(f, "invalid owner: {}", err),
            Self::InvalidRdata(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {}

/// The type returned by fallible [`Reader`] methods.
pub type Result<T> = std::result::Result<T, Error>;

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::super::{Qclass, Qtype, Rcode};
    use super::*;

    /// This is a reply to a query for example.com. IN NS to a recursive
    /// server, made on January 7, 2022.
    const EXAMPLE_COM_NS_MESSAGE: &[u8] =
        b"\xe2\xd7\x81\x80\x00\x01\x00\x02\x00\x00\x00\x01\x07\x65\x78\x61\
          \x6d\x70\x6c\x65\x03\x63\x6f\x6d\x00\x00\x02\x00\x01\xc0\x0c\x00\
          \x02\x00\x01\x00\x01\x50\xa2\x00\x14\x01\x61\x0c\x69\x61\x6e\x61\
          \x2d\x73\x65\x72\x76\x65\x72\x73\x03\x6e\x65\x74\x00\xc0\x0c\x00\
          \x02\x00\x01\x00\x01\x50\xa2\x00\x04\x01\x62\xc0\x2b\x00\x00\x29\
          \x10\x00\x00\x00\x00\x00\x00\x00";

    #[test]
    fn reader_works() {
        let mut reader = Reader::try_from(EXAMPLE_COM_NS_MESSAGE).unwrap();
        let expected_qname = "example.com.".parse().unwrap();
        let expected_ns_a: Box<Name> = "a.iana-servers.net.".parse().unwrap();
        let expected_ns_b: Box<Name> = "b.iana-servers.net.".parse().unwrap();

        // Check the header.
        assert_eq!(reader.id(), 0xe2d7);
        assert!(reader.qr());
        assert!(!reader.tc());
        assert_eq!(reader.rcode(), Rcode::NOERROR);
        assert_eq!(reader.qdcount(), 1);
        assert_eq!(reader.ancount(), 2);
        assert_eq!(reader.nscount(), 0);
        assert_eq!(reader.arcount(), 1);

        // Check the question.
        let question = reader.read_question().unwrap();
        assert_eq!(question.qname, expected_qname);
        assert_eq!(question.qtype, Qtype::from(Type::NS));
        assert_eq!(question.qclass, Qclass::from(Class::IN));

        // Check the answers. The second NS RDATA uses a compression
        // pointer, which read_rr resolves.
        let answer_1 = reader.read_rr().unwrap();
        assert_eq!(answer_1.owner, expected_qname);
        assert_eq!(answer_1.rr_type, Type::NS);
        assert_eq!(answer_1.class, Class::IN);
        assert_eq!(answer_1.ttl, Ttl::from(86178));
        assert_eq!(answer_1.rdata.octets(), expected_ns_a.wire_repr());
        let answer_2 = reader.read_rr().unwrap();
        assert_eq!(answer_2.owner, expected_qname);
        assert_eq!(answer_2.rdata.octets(), expected_ns_b.wire_repr());

        // Check the OPT record.
        let opt = reader.read_rr().unwrap();
        assert_eq!(opt.owner.as_ref(), Name::root());
        assert_eq!(opt.rr_type, Type::OPT);
        assert!(opt.rdata.is_empty());

        // And that should be it!
        assert!(reader.at_eom());
    }

    #[test]
    fn skip_rr_matches_read_rr() {
        let mut reading = Reader::try_from(EXAMPLE_COM_NS_MESSAGE).unwrap();
        let mut skipping = Reader::try_from(EXAMPLE_COM_NS_MESSAGE).unwrap();
        reading.read_question().unwrap();
        skipping.skip_question().unwrap();
        assert_eq!(reading.cursor(), skipping.cursor());
        for _ in 0..3 {
            reading.read_rr().unwrap();
            skipping.skip_rr().unwrap();
            assert_eq!(reading.cursor(), skipping.cursor());
        }
    }

    #[test]
    fn reader_constructor_rejects_short_message() {
        for size in 0..HEADER_SIZE {
            let buf = vec![0; size];
            assert_eq!(Reader::try_from(buf.as_slice()), Err(Error::HeaderTooShort));
        }
    }
}
