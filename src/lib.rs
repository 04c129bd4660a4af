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

//! The transfer and storage core of the Madrone authoritative DNS
//! server.
//!
//! This crate implements the three subsystems through which zone data
//! enters and persists in the server:
//!
//! * the [`tsig`] module, which signs outgoing queries and verifies
//!   streamed responses using the TSIG pseudo-RR ([RFC 2845]);
//! * the [`xfr`] module, an AXFR client ([RFC 5936]) that probes a
//!   master's SOA serial and, when the zone is out of date, streams
//!   the full zone to a [record sink](xfr::RecordSink); and
//! * the [`udb`] module, a file-backed arena holding a radix trie
//!   that indexes zone data by owner name in canonical wire form.
//!
//! The [`db`] module ties the three together: a [`db::ZoneDb`] is a
//! record sink that materializes an AXFR stream into the on-disk trie.
//! The [`zone_file`] module provides the other standard sink, a text
//! zone-file writer. Supporting modules ([`name`], [`message`],
//! [`rr`], [`class`]) supply the DNS plumbing all of this rests on.
//!
//! The `madrone-xfer` binary drives a transfer from the command line.
//!
//! [RFC 2845]: https://datatracker.ietf.org/doc/html/rfc2845
//! [RFC 5936]: https://datatracker.ietf.org/doc/html/rfc5936

pub mod class;
pub mod db;
pub mod message;
pub mod name;
pub mod rr;
pub mod tsig;
pub mod udb;
pub mod xfr;
pub mod zone_file;

mod util;
