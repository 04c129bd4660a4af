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

//! Implementation of the [`Rcode`] and [`ExtendedRcode`] types.

use std::fmt;

////////////////////////////////////////////////////////////////////////
// RCODES                                                             //
////////////////////////////////////////////////////////////////////////

/// The RCODE value of the DNS message header.
///
/// [RFC 1035 § 4.1.1] defines the RCODE field as a four-bit field
/// indicating success or failure in a DNS response. This type wraps the
/// raw four-bit value with constants for the codes the transfer client
/// cares about.
///
/// [RFC 1035 § 4.1.1]: https://datatracker.ietf.org/doc/html/rfc1035#section-4.1.1
#[derive(Copy, Clone, Eq, Hash, PartialEq)]
pub struct Rcode(u8);

impl Rcode {
    pub const NOERROR: Self = Self(0);
    pub const FORMERR: Self = Self(1);
    pub const SERVFAIL: Self = Self(2);
    pub const NXDOMAIN: Self = Self(3);
    pub const NOTIMP: Self = Self(4);
    pub const REFUSED: Self = Self(5);
    pub const NOTAUTH: Self = Self(9);
}

impl From<u8> for Rcode {
    fn from(raw: u8) -> Self {
        Self(raw & 0x0f)
    }
}

impl From<Rcode> for u8 {
    fn from(rcode: Rcode) -> Self {
        rcode.0
    }
}

impl fmt::Display for Rcode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::NOERROR => f.write_str("NOERROR"),
            Self::FORMERR => f.write_str("FORMERR"),
            Self::SERVFAIL => f.write_str("SERVFAIL"),
            Self::NXDOMAIN => f.write_str("NXDOMAIN"),
            Self::NOTIMP => f.write_str("NOTIMP"),
            Self::REFUSED => f.write_str("REFUSED"),
            Self::NOTAUTH => f.write_str("NOTAUTH"),
            Self(value) => write!(f, "RCODE{}", value),
        }
    }
}

impl fmt::Debug for Rcode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}

////////////////////////////////////////////////////////////////////////
// EXTENDED RCODES                                                    //
////////////////////////////////////////////////////////////////////////

/// An extended RCODE: the 16-bit code space used by the TSIG error
/// field ([RFC 2845 § 2.3]).
///
/// [RFC 2845 § 2.3]: https://datatracker.ietf.org/doc/html/rfc2845#section-2.3
#[derive(Copy, Clone, Eq, Hash, PartialEq)]
pub struct ExtendedRcode(u16);

impl ExtendedRcode {
    pub const NOERROR: Self = Self(0);
    pub const FORMERR: Self = Self(1);
    pub const SERVFAIL: Self = Self(2);
    pub const NOTAUTH: Self = Self(9);

    // RFC 2845
    pub const BADSIG: Self = Self(16);
    pub const BADKEY: Self = Self(17);
    pub const BADTIME: Self = Self(18);
}

impl From<u16> for ExtendedRcode {
    fn from(raw: u16) -> Self {
        Self(raw)
    }
}

impl From<ExtendedRcode> for u16 {
    fn from(rcode: ExtendedRcode) -> Self {
        rcode.0
    }
}

impl From<Rcode> for ExtendedRcode {
    fn from(rcode: Rcode) -> Self {
        Self(u8::from(rcode) as u16)
    }
}

impl fmt::Display for ExtendedRcode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::NOERROR => f.write_str("NOERROR"),
            Self::FORMERR => f.write_str("FORMERR"),
            Self::SERVFAIL => f.write_str("SERVFAIL"),
            Self::NOTAUTH => f.write_str("NOTAUTH"),
            Self::BADSIG => f.write_str("BADSIG"),
            Self::BADKEY => f.write_str("BADKEY"),
            Self::BADTIME => f.write_str("BADTIME"),
            Self(value) => write!(f, "RCODE{}", value),
        }
    }
}

impl fmt::Debug for ExtendedRcode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}
