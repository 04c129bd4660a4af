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

//! Implementation of reading and writing of DNS messages.

pub mod constants;
mod question;
mod rcode;
pub mod reader;
pub mod writer;
pub use question::{Qclass, Qtype, Question};
pub use rcode::{ExtendedRcode, Rcode};
pub use reader::Reader;
pub use writer::QueryWriter;

use constants::{ARCOUNT_END, ARCOUNT_START};

/// Overwrites the ARCOUNT field of a raw DNS message.
///
/// TSIG processing removes the TSIG RR from the record accounting of a
/// received message (see [RFC 2845 § 3.4.1]), which requires mutating
/// the header in place before the message is digested.
///
/// [RFC 2845 § 3.4.1]: https://datatracker.ietf.org/doc/html/rfc2845#section-3.4.1
pub fn set_arcount(message: &mut [u8], arcount: u16) {
    message[ARCOUNT_START..ARCOUNT_END].copy_from_slice(&arcount.to_be_bytes());
}
