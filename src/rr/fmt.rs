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

//! Zone-file presentation of RDATA.

use std::fmt::{self, Write};
use std::net::{Ipv4Addr, Ipv6Addr};

use crate::name::Name;
use crate::util::nibble_to_ascii_hex_digit;

use super::{Rdata, Type};

////////////////////////////////////////////////////////////////////////
// GENERIC RDATA DISPLAY                                              //
////////////////////////////////////////////////////////////////////////

/// The [`Display`](fmt::Display) implementation for bare [`Rdata`]
/// uses the [RFC 3597 § 5] format for RDATA of unknown type.
///
/// [RFC 3597 § 5]: https://datatracker.ietf.org/doc/html/rfc3597#section-5
impl fmt::Display for Rdata {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "\\# {}", self.len())?;
        if !self.is_empty() {
            f.write_char(' ')?;
            for octet in self.octets() {
                f.write_char(char::from(nibble_to_ascii_hex_digit((octet & 0xf0) >> 4)))?;
                f.write_char(char::from(nibble_to_ascii_hex_digit(octet & 0xf)))?;
            }
        }
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////
// TYPED ZONE-FILE DISPLAY                                            //
////////////////////////////////////////////////////////////////////////

impl Rdata {
    /// Returns an object that [`Display`](fmt::Display)s this RDATA in
    /// zone-file text form for the given RR type.
    ///
    /// The common types (A, NS, CNAME, SOA, PTR, MX, TXT, AAAA, SRV)
    /// are rendered with their type-specific syntax; all other types,
    /// and RDATA that fails to parse under its type-specific syntax,
    /// fall back to the generic [RFC 3597 § 5] form.
    ///
    /// [RFC 3597 § 5]: https://datatracker.ietf.org/doc/html/rfc3597#section-5
    pub fn zone_display(&self, rr_type: Type) -> ZoneDisplay {
        ZoneDisplay {
            rdata: self,
            rr_type,
        }
    }
}

/// Helper returned by [`Rdata::zone_display`].
pub struct ZoneDisplay<'a> {
    rdata: &'a Rdata,
    rr_type: Type,
}

impl fmt::Display for ZoneDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        // The typed renderers are all-or-nothing: they write into a
        // scratch buffer so that a parse failure partway through can
        // still fall back to the generic form.
        let mut buf = String::new();
        let ok = match self.rr_type {
            Type::A => fmt_a(self.rdata.octets(), &mut buf),
            Type::AAAA => fmt_aaaa(self.rdata.octets(), &mut buf),
            Type::NS | Type::CNAME | Type::PTR => {
                fmt_name(self.rdata.octets(), &mut buf).map(|_| ())
            }
            Type::SOA => fmt_soa(self.rdata.octets(), &mut buf),
            Type::MX => fmt_u16s_and_name(self.rdata.octets(), 1, &mut buf),
            Type::SRV => fmt_u16s_and_name(self.rdata.octets(), 3, &mut buf),
            Type::TXT => fmt_txt(self.rdata.octets(), &mut buf),
            _ => None,
        }
        .is_some();
        if ok {
            f.write_str(&buf)
        } else {
            self.rdata.fmt(f)
        }
    }
}

fn fmt_a(octets: &[u8], buf: &mut String) -> Option<()> {
    let array: [u8; 4] = octets.try_into().ok()?;
    write!(buf, "{}", Ipv4Addr::from(array)).unwrap();
    Some(())
}

fn fmt_aaaa(octets: &[u8], buf: &mut String) -> Option<()> {
    let array: [u8; 16] = octets.try_into().ok()?;
    write!(buf, "{}", Ipv6Addr::from(array)).unwrap();
    Some(())
}

/// Renders a single uncompressed name occupying all of `octets`, and
/// returns its length.
fn fmt_name(octets: &[u8], buf: &mut String) -> Option<usize> {
    let len = Name::validate_uncompressed(octets).ok()?;
    let (name, _) = Name::try_from_uncompressed(octets).unwrap();
    write!(buf, "{}", name).unwrap();
    Some(len)
}

fn fmt_soa(octets: &[u8], buf: &mut String) -> Option<()> {
    let mname_len = fmt_name(octets, buf)?;
    buf.push(' ');
    let rname_len = fmt_name(&octets[mname_len..], buf)?;
    let mut rest = &octets[mname_len + rname_len..];
    if rest.len() != 20 {
        return None;
    }
    for _ in 0..5 {
        let value = u32::from_be_bytes(rest[..4].try_into().unwrap());
        write!(buf, " {}", value).unwrap();
        rest = &rest[4..];
    }
    Some(())
}

fn fmt_u16s_and_name(octets: &[u8], n_u16s: usize, buf: &mut String) -> Option<()> {
    if octets.len() < n_u16s * 2 {
        return None;
    }
    for i in 0..n_u16s {
        let value = u16::from_be_bytes(octets[i * 2..i * 2 + 2].try_into().unwrap());
        write!(buf, "{} ", value).unwrap();
    }
    fmt_name(&octets[n_u16s * 2..], buf)?;
    Some(())
}

fn fmt_txt(octets: &[u8], buf: &mut String) -> Option<()> {
    let mut rest = octets;
    let mut first = true;
    if rest.is_empty() {
        return None;
    }
    while !rest.is_empty() {
        let len = rest[0] as usize;
        let string = rest.get(1..1 + len)?;
        if !first {
            buf.push(' ');
        }
        first = false;
        buf.push('"');
        for &octet in string {
            if octet == b'"' || octet == b'\\' {
                buf.push('\\');
                buf.push(char::from(octet));
            } else if (0x20..=0x7e).contains(&octet) {
                buf.push(char::from(octet));
            } else {
                write!(buf, "\\{:03}", octet).unwrap();
            }
        }
        buf.push('"');
        rest = &rest[1 + len..];
    }
    Some(())
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    fn rdata(octets: &[u8]) -> Box<Rdata> {
        octets.to_vec().try_into().unwrap()
    }

    #[test]
    fn generic_display_works() {
        assert_eq!(rdata(b"\x7f\x00\x00\x01").to_string(), "\\# 4 7f000001");
        assert_eq!(rdata(b"").to_string(), "\\# 0");
    }

    #[test]
    fn a_display_works() {
        assert_eq!(
            rdata(b"\x7f\x00\x00\x01").zone_display(Type::A).to_string(),
            "127.0.0.1",
        );
    }

    #[test]
    fn aaaa_display_works() {
        let octets = b"\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x01";
        assert_eq!(rdata(octets).zone_display(Type::AAAA).to_string(), "::1");
    }

    #[test]
    fn ns_display_works() {
        assert_eq!(
            rdata(b"\x03ns1\x04test\x00")
                .zone_display(Type::NS)
                .to_string(),
            "ns1.test.",
        );
    }

    #[test]
    fn soa_display_works() {
        let mut octets = Vec::new();
        octets.extend_from_slice(b"\x03ns1\x04test\x00");
        octets.extend_from_slice(b"\x05admin\x04test\x00");
        for value in [7u32, 3600, 300, 86400, 60] {
            octets.extend_from_slice(&value.to_be_bytes());
        }
        assert_eq!(
            rdata(&octets).zone_display(Type::SOA).to_string(),
            "ns1.test. admin.test. 7 3600 300 86400 60",
        );
    }

    #[test]
    fn mx_display_works() {
        assert_eq!(
            rdata(b"\x00\x0a\x04mail\x04test\x00")
                .zone_display(Type::MX)
                .to_string(),
            "10 mail.test.",
        );
    }

    #[test]
    fn txt_display_works() {
        assert_eq!(
            rdata(b"\x05hello\x02\"\\")
                .zone_display(Type::TXT)
                .to_string(),
            "\"hello\" \"\\\"\\\\\"",
        );
    }

    #[test]
    fn malformed_typed_rdata_falls_back_to_generic() {
        assert_eq!(
            rdata(b"\x7f\x00").zone_display(Type::A).to_string(),
            "\\# 2 7f00",
        );
    }
}
