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

//! Implementation of parsing and validation of on-the-wire names.

use arrayvec::ArrayVec;

use super::{Error, Name, MAX_LABEL_LEN, MAX_WIRE_LEN};

////////////////////////////////////////////////////////////////////////
// VALIDATION AND PARSING OF UNCOMPRESSED ON-THE-WIRE NAMES           //
////////////////////////////////////////////////////////////////////////

/// Validates an uncompressed name present at the beginning of `octets`.
/// The parameter `use_all` controls whether to expect the name to
/// occupy the entire buffer. On success, the length of the name in
/// octets is returned. This is the implementation of
/// [`Name::validate_uncompressed`] and
/// [`Name::validate_uncompressed_all`].
pub fn validate_uncompressed_name(octets: &[u8], use_all: bool) -> Result<usize, Error> {
    let mut offset = 0;
    let mut finished = false;
    while !finished && offset < octets.len() {
        let label_len = octets[offset];
        if label_len > (MAX_LABEL_LEN as u8) {
            return Err(Error::LabelTooLong);
        } else if label_len == 0 {
            finished = true;
        }
        offset += label_len as usize + 1;
        if offset > MAX_WIRE_LEN {
            return Err(Error::NameTooLong);
        }
    }

    if !finished {
        Err(Error::UnexpectedEom)
    } else if use_all && offset < octets.len() {
        Err(Error::ExtraData)
    } else {
        Ok(offset)
    }
}

/// Parses an uncompressed name present at the beginning of `octets`.
/// This is the implementation of [`Name::try_from_uncompressed`].
pub fn parse_uncompressed_name(octets: &[u8]) -> Result<(Box<Name>, usize), Error> {
    let wire_len = validate_uncompressed_name(octets, false)?;
    Ok((Name::from_wire_unchecked(&octets[..wire_len]), wire_len))
}

////////////////////////////////////////////////////////////////////////
// PARSING OF COMPRESSED ON-THE-WIRE NAMES                            //
////////////////////////////////////////////////////////////////////////

/// Parses a compressed name starting at index `start` of `octets`.
/// Pointers are followed. Indices given in pointers are treated as
/// indices of `octets`, so the intention is for an entire DNS message
/// to be passed in `octets`. Pointers must point strictly backward;
/// combined with the 255-octet bound on the accumulated name, this
/// guarantees termination on malicious input.
///
/// On success, this returns the parsed name and the number of
/// contiguous octets the name occupies at `start` (i.e., the number of
/// octets to skip to read the next message field).
pub fn parse_compressed_name(octets: &[u8], start: usize) -> Result<(Box<Name>, usize), Error> {
    let mut wire: ArrayVec<u8, MAX_WIRE_LEN> = ArrayVec::new();
    let mut index = start;
    let mut contiguous_len = None;

    loop {
        let len = *octets.get(index).ok_or(Error::UnexpectedEom)?;
        if len & 0xc0 == 0xc0 {
            let second = *octets.get(index + 1).ok_or(Error::UnexpectedEom)?;
            let target = ((len & 0x3f) as usize) << 8 | second as usize;
            if target >= index {
                return Err(Error::BadPointer);
            }
            if contiguous_len.is_none() {
                contiguous_len = Some(index + 2 - start);
            }
            index = target;
        } else if len > (MAX_LABEL_LEN as u8) {
            return Err(Error::LabelTooLong);
        } else {
            let label_end = index + 1 + len as usize;
            if label_end > octets.len() {
                return Err(Error::UnexpectedEom);
            }
            wire.try_extend_from_slice(&octets[index..label_end])
                .or(Err(Error::NameTooLong))?;
            if len == 0 {
                let contiguous_len = contiguous_len.unwrap_or_else(|| label_end - start);
                return Ok((Name::from_wire_unchecked(&wire), contiguous_len));
            }
            index = label_end;
        }
    }
}

/// Skips a compressed name at index `start` of `octets`, without
/// following pointers, and returns the number of contiguous octets it
/// occupies. Only the portion read is validated; a terminating
/// pointer's target is not checked.
pub fn skip_compressed_name(octets: &[u8], start: usize) -> Result<usize, Error> {
    let mut index = start;
    loop {
        let len = *octets.get(index).ok_or(Error::UnexpectedEom)?;
        if len & 0xc0 == 0xc0 {
            if index + 2 > octets.len() {
                return Err(Error::UnexpectedEom);
            }
            return Ok(index + 2 - start);
        } else if len > (MAX_LABEL_LEN as u8) {
            return Err(Error::LabelTooLong);
        } else if len == 0 {
            return Ok(index + 1 - start);
        } else {
            index += 1 + len as usize;
            if index - start > MAX_WIRE_LEN {
                return Err(Error::NameTooLong);
            }
        }
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_accepts_a_valid_name() {
        assert_eq!(
            validate_uncompressed_name(b"\x07example\x04test\x00", true),
            Ok(14),
        );
    }

    #[test]
    fn validation_rejects_truncated_names() {
        assert_eq!(
            validate_uncompressed_name(b"\x07example", false),
            Err(Error::UnexpectedEom),
        );
    }

    #[test]
    fn validation_rejects_extra_data_when_asked() {
        assert_eq!(
            validate_uncompressed_name(b"\x01a\x00extra", true),
            Err(Error::ExtraData),
        );
        assert_eq!(validate_uncompressed_name(b"\x01a\x00extra", false), Ok(3));
    }

    #[test]
    fn compressed_parsing_follows_pointers() {
        // A message-like buffer: "test." at offset 0, then "example"
        // plus a pointer to offset 0 at offset 6.
        let buf = b"\x04test\x00\x07example\xc0\x00";
        let (name, skip) = parse_compressed_name(buf, 6).unwrap();
        assert_eq!(name.wire_repr(), b"\x07example\x04test\x00");
        assert_eq!(skip, 10);
    }

    #[test]
    fn compressed_parsing_rejects_forward_pointers() {
        let buf = b"\xc0\x02\x01a\x00";
        assert_eq!(parse_compressed_name(buf, 0), Err(Error::BadPointer));
    }

    #[test]
    fn compressed_parsing_rejects_self_pointers() {
        let buf = b"\x01a\x00\xc0\x03";
        assert_eq!(parse_compressed_name(buf, 3), Err(Error::BadPointer));
    }

    #[test]
    fn skip_stops_at_pointers() {
        assert_eq!(skip_compressed_name(b"\x01a\xc0\x00", 0), Ok(4));
        assert_eq!(skip_compressed_name(b"\x01a\x00", 0), Ok(3));
    }
}
