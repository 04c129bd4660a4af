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

//! Implementation of the [`QueryWriter`] type for building query
//! messages.

use super::constants::*;
use super::Question;

/// A builder for DNS query messages.
///
/// The transfer client only ever sends queries of a single shape: a
/// header with the AA bit set, exactly one question, and (when a TSIG
/// key is configured) a trailing TSIG RR. The `QueryWriter` builds the
/// header and question; the TSIG engine appends its RR directly to the
/// [packet buffer](QueryWriter::packet_mut), after which the caller
/// fixes up the ARCOUNT.
pub struct QueryWriter {
    octets: Vec<u8>,
}

impl QueryWriter {
    /// Creates a new query with the given message ID. The AA bit is
    /// set and all other flags and counts are zero.
    pub fn new(id: u16) -> Self {
        let mut octets = vec![0; HEADER_SIZE];
        octets[ID_START..ID_END].copy_from_slice(&id.to_be_bytes());
        octets[AA_BYTE] |= AA_MASK;
        Self { octets }
    }

    /// Returns the message ID.
    pub fn id(&self) -> u16 {
        u16::from_be_bytes(self.octets[ID_START..ID_END].try_into().unwrap())
    }

    /// Appends a question and increments the QDCOUNT. The QNAME is
    /// written in uncompressed form.
    pub fn add_question(&mut self, question: &Question) {
        self.octets.extend_from_slice(question.qname.wire_repr());
        self.octets
            .extend_from_slice(&u16::from(question.qtype).to_be_bytes());
        self.octets
            .extend_from_slice(&u16::from(question.qclass).to_be_bytes());
        let qdcount = self.qdcount() + 1;
        self.octets[QDCOUNT_START..QDCOUNT_END].copy_from_slice(&qdcount.to_be_bytes());
    }

    /// Overwrites the ARCOUNT field.
    pub fn set_arcount(&mut self, arcount: u16) {
        self.octets[ARCOUNT_START..ARCOUNT_END].copy_from_slice(&arcount.to_be_bytes());
    }

    /// Returns the current length of the message in octets.
    pub fn len(&self) -> usize {
        self.octets.len()
    }

    /// Returns whether the message is empty. (It never is; this exists
    /// for the sake of the `len` convention.)
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Returns the message built so far.
    pub fn octets(&self) -> &[u8] {
        &self.octets
    }

    /// Returns the underlying packet buffer for appending records.
    pub fn packet_mut(&mut self) -> &mut Vec<u8> {
        &mut self.octets
    }

    /// Consumes the writer, returning the finished message.
    pub fn finish(self) -> Vec<u8> {
        self.octets
    }

    fn qdcount(&self) -> u16 {
        u16::from_be_bytes(self.octets[QDCOUNT_START..QDCOUNT_END].try_into().unwrap())
    }
}

#[cfg(test)]
mod tests {
    use super::super::{Qclass, Qtype};
    use super::*;
    use crate::class::Class;
    use crate::rr::Type;

    #[test]
    fn query_writer_builds_soa_query() {
        let mut writer = QueryWriter::new(0x1234);
        writer.add_question(&Question {
            qname: "example.test.".parse().unwrap(),
            qtype: Qtype::from(Type::SOA),
            qclass: Qclass::from(Class::IN),
        });
        assert_eq!(
            writer.octets(),
            b"\x12\x34\x04\x00\x00\x01\x00\x00\x00\x00\x00\x00\
              \x07example\x04test\x00\x00\x06\x00\x01"
        );
    }
}
