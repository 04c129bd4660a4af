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

//! Implementation of the [`Rdata`] type.

use std::borrow::Cow;
use std::fmt;

use crate::name::{self, Name};

use super::Type;

////////////////////////////////////////////////////////////////////////
// RDATA STRUCTURE                                                    //
////////////////////////////////////////////////////////////////////////

/// The RDATA of a resource record.
///
/// This is a dynamically sized type, used through `&Rdata`,
/// `Box<Rdata>`, and `Cow<Rdata>`. It wraps the on-the-wire RDATA
/// octets, guaranteed not to exceed the 65,535-octet limit imposed by
/// the 16-bit RDLENGTH field.
///
/// RDATA stored in an `Rdata` is always *self-contained*: when a
/// record is [read](Rdata::read) from a message, any compressed domain
/// names embedded in the RDATA of well-known types are replaced by
/// their uncompressed form. The RDATA of types this module does not
/// know are kept verbatim, per [RFC 3597 § 4].
///
/// [RFC 3597 § 4]: https://datatracker.ietf.org/doc/html/rfc3597#section-4
#[derive(Debug, Eq, Hash, PartialEq)]
#[repr(transparent)]
pub struct Rdata([u8]);

impl Rdata {
    /// Returns the underlying octets.
    pub fn octets(&self) -> &[u8] {
        &self.0
    }

    /// Returns the length of the RDATA in octets.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns whether the RDATA is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Wraps a borrowed octet slice without checking its length.
    fn from_unchecked(octets: &[u8]) -> &Rdata {
        // SAFETY: Rdata is a repr(transparent) wrapper around [u8].
        unsafe { &*(octets as *const [u8] as *const Rdata) }
    }

    /// Boxes an octet vector without checking its length.
    fn from_vec_unchecked(octets: Vec<u8>) -> Box<Rdata> {
        let boxed: Box<[u8]> = octets.into_boxed_slice();
        // SAFETY: Rdata is a repr(transparent) wrapper around [u8].
        unsafe { Box::from_raw(Box::into_raw(boxed) as *mut Rdata) }
    }
}

impl<'a> TryFrom<&'a [u8]> for &'a Rdata {
    type Error = RdataTooLongError;

    fn try_from(octets: &'a [u8]) -> Result<Self, Self::Error> {
        if octets.len() > u16::MAX as usize {
            Err(RdataTooLongError)
        } else {
            Ok(Rdata::from_unchecked(octets))
        }
    }
}

impl TryFrom<Vec<u8>> for Box<Rdata> {
    type Error = RdataTooLongError;

    fn try_from(octets: Vec<u8>) -> Result<Self, Self::Error> {
        if octets.len() > u16::MAX as usize {
            Err(RdataTooLongError)
        } else {
            Ok(Rdata::from_vec_unchecked(octets))
        }
    }
}

impl ToOwned for Rdata {
    type Owned = Box<Rdata>;

    fn to_owned(&self) -> Self::Owned {
        Rdata::from_vec_unchecked(self.0.to_vec())
    }
}

impl Clone for Box<Rdata> {
    fn clone(&self) -> Self {
        self.as_ref().to_owned()
    }
}

////////////////////////////////////////////////////////////////////////
// READING RDATA FROM MESSAGES                                        //
////////////////////////////////////////////////////////////////////////

impl Rdata {
    /// Reads the RDATA of a record of type `rr_type` from `message`,
    /// starting at index `start` and declared to be `rdlength` octets
    /// long.
    ///
    /// For the well-known types that embed domain names (NS, CNAME,
    /// PTR, SOA, MX, SRV), compressed names are resolved against the
    /// whole message and the RDATA is rebuilt with the names in
    /// uncompressed form; in that case an owned value is returned.
    /// The RDATA of other types is borrowed verbatim.
    pub fn read(
        rr_type: Type,
        message: &[u8],
        start: usize,
        rdlength: u16,
    ) -> Result<Cow<Rdata>, ReadRdataError> {
        let end = start + rdlength as usize;
        if end > message.len() {
            return Err(ReadRdataError::Truncated);
        }
        match rr_type {
            Type::NS | Type::CNAME | Type::PTR => {
                let (target, len) = Name::try_from_compressed(message, start)?;
                if len != rdlength as usize {
                    return Err(ReadRdataError::LengthMismatch);
                }
                Ok(Cow::Owned(Rdata::from_vec_unchecked(
                    target.wire_repr().to_vec(),
                )))
            }
            Type::SOA => {
                let (mname, mname_len) = Name::try_from_compressed(message, start)?;
                let (rname, rname_len) = Name::try_from_compressed(message, start + mname_len)?;
                let fixed_start = start + mname_len + rname_len;
                if fixed_start + 20 != end {
                    return Err(ReadRdataError::LengthMismatch);
                }
                let mut octets =
                    Vec::with_capacity(mname.wire_repr().len() + rname.wire_repr().len() + 20);
                octets.extend_from_slice(mname.wire_repr());
                octets.extend_from_slice(rname.wire_repr());
                octets.extend_from_slice(&message[fixed_start..end]);
                Ok(Cow::Owned(Rdata::from_vec_unchecked(octets)))
            }
            Type::MX => Self::read_with_name_suffix(message, start, end, 2),
            Type::SRV => Self::read_with_name_suffix(message, start, end, 6),
            _ => Ok(Cow::Borrowed(Rdata::from_unchecked(&message[start..end]))),
        }
    }

    /// Reads RDATA consisting of `fixed` octets followed by a single
    /// (possibly compressed) domain name.
    fn read_with_name_suffix(
        message: &[u8],
        start: usize,
        end: usize,
        fixed: usize,
    ) -> Result<Cow<'_, Rdata>, ReadRdataError> {
        if start + fixed > end {
            return Err(ReadRdataError::LengthMismatch);
        }
        let (target, len) = Name::try_from_compressed(message, start + fixed)?;
        if start + fixed + len != end {
            return Err(ReadRdataError::LengthMismatch);
        }
        let mut octets = Vec::with_capacity(fixed + target.wire_repr().len());
        octets.extend_from_slice(&message[start..start + fixed]);
        octets.extend_from_slice(target.wire_repr());
        Ok(Cow::Owned(Rdata::from_vec_unchecked(octets)))
    }
}

////////////////////////////////////////////////////////////////////////
// SOA FIELD ACCESS                                                   //
////////////////////////////////////////////////////////////////////////

impl Rdata {
    /// Extracts the zone serial from this RDATA, assuming that it is
    /// of type SOA. The serial is the 32-bit integer in the third
    /// RDATA field, immediately after the MNAME and RNAME.
    ///
    /// This returns [`None`] when the RDATA is not well-formed SOA
    /// RDATA.
    pub fn soa_serial(&self) -> Option<u32> {
        let mname_len = Name::validate_uncompressed(&self.0).ok()?;
        let rname_len = Name::validate_uncompressed(&self.0[mname_len..]).ok()?;
        let serial_start = mname_len + rname_len;
        let octets = self.0.get(serial_start..serial_start + 4)?;
        Some(u32::from_be_bytes(octets.try_into().unwrap()))
    }
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error signaling that RDATA could not be read from a message.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ReadRdataError {
    /// The RDATA runs past the end of the message.
    Truncated,

    /// An embedded domain name is invalid.
    InvalidName(name::Error),

    /// The parsed fields do not occupy exactly the declared RDLENGTH.
    LengthMismatch,
}

impl From<name::Error> for ReadRdataError {
    fn from(err: name::Error) -> Self {
        Self::InvalidName(err)
    }
}

impl fmt::Display for ReadRdataError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Truncated => f.write_str("RDATA is truncated"),
            Self::InvalidName(err) => write!(f, "invalid name in RDATA: {}", err),
            Self::LengthMismatch => f.write_str("RDATA does not match its declared length"),
        }
    }
}

impl std::error::Error for ReadRdataError {}

/// An error signaling that RDATA would exceed the 65,535-octet limit.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct RdataTooLongError;

impl fmt::Display for RdataTooLongError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("RDATA exceeds 65,535 octets")
    }
}

impl std::error::Error for RdataTooLongError {}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    // A message-like buffer with "ns1.example.test." at offset 12.
    const MESSAGE: &[u8] = b"\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\
                             \x03ns1\x07example\x04test\x00";

    #[test]
    fn read_decompresses_ns_rdata() {
        // NS RDATA that is just a pointer to offset 12.
        let mut message = MESSAGE.to_vec();
        let rdata_start = message.len();
        message.extend_from_slice(b"\xc0\x0c");
        let rdata = Rdata::read(Type::NS, &message, rdata_start, 2).unwrap();
        assert_eq!(rdata.octets(), b"\x03ns1\x07example\x04test\x00");
        assert!(matches!(rdata, Cow::Owned(_)));
    }

    #[test]
    fn read_borrows_opaque_rdata() {
        let message = b"\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x7f\x00\x00\x01";
        let rdata = Rdata::read(Type::A, message, 12, 4).unwrap();
        assert_eq!(rdata.octets(), b"\x7f\x00\x00\x01");
        assert!(matches!(rdata, Cow::Borrowed(_)));
    }

    #[test]
    fn read_rejects_truncated_rdata() {
        let message = b"\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x7f\x00";
        assert_eq!(
            Rdata::read(Type::A, message, 12, 4).unwrap_err(),
            ReadRdataError::Truncated,
        );
    }

    #[test]
    fn read_rejects_ns_rdata_with_trailing_garbage() {
        let mut message = MESSAGE.to_vec();
        let rdata_start = message.len();
        message.extend_from_slice(b"\xc0\x0c\xff");
        assert_eq!(
            Rdata::read(Type::NS, &message, rdata_start, 3).unwrap_err(),
            ReadRdataError::LengthMismatch,
        );
    }

    #[test]
    fn soa_serial_works() {
        let mut octets = Vec::new();
        octets.extend_from_slice(b"\x03ns1\x04test\x00"); // MNAME
        octets.extend_from_slice(b"\x05admin\x04test\x00"); // RNAME
        octets.extend_from_slice(&2022010701u32.to_be_bytes()); // SERIAL
        octets.extend_from_slice(&[0; 16]); // REFRESH .. MINIMUM
        let rdata: Box<Rdata> = octets.try_into().unwrap();
        assert_eq!(rdata.soa_serial(), Some(2022010701));
    }

    #[test]
    fn soa_serial_rejects_malformed_rdata() {
        let rdata: Box<Rdata> = b"\x00\x00".to_vec().try_into().unwrap();
        assert_eq!(rdata.soa_serial(), None);
    }
}
