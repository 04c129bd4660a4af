// Copyright 2021 Matthew Ingwersen.
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

//! Data structures and routines for handling DNS resource record data.

use crate::class::Class;
use crate::name::Name;

mod fmt;
pub mod rdata;
mod rr_type;
mod ttl;
pub use fmt::ZoneDisplay;
pub use rdata::Rdata;
pub use rr_type::Type;
pub use ttl::Ttl;

/// An owned resource record.
///
/// This is the unit in which the AXFR client delivers zone data to its
/// consumers (see [`RecordSink`](crate::xfr::RecordSink)).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Record {
    pub owner: Box<Name>,
    pub rr_type: Type,
    pub class: Class,
    pub ttl: Ttl,
    pub rdata: Box<Rdata>,
}
