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

//! Implementation of data structures related to domain names.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

mod error;
mod lowercase;
mod wire;
pub use error::Error;
pub use lowercase::LowercaseName;

/// The maximum length of the uncompressed on-the-wire representation of
/// a domain name.
const MAX_WIRE_LEN: usize = 255;

/// The maximum length of a label in a domain name (not including the
/// octet that provides the length).
const MAX_LABEL_LEN: usize = 63;

////////////////////////////////////////////////////////////////////////
// NAME STRUCTURE                                                     //
////////////////////////////////////////////////////////////////////////

/// A structure to represent a domain name.
///
/// This is a dynamically sized type, generally used through the `&Name`
/// and `Box<Name>` types. It is a transparent wrapper around the
/// uncompressed on-the-wire representation of the name: a sequence of
/// length-prefixed labels terminated by the null label. The wrapper is
/// only ever constructed around validated data, so every `Name` is a
/// well-formed domain name.
///
/// Because the wire representation is stored contiguously, a name's
/// [`parent`](Name::parent) is simply a suffix of the same buffer and
/// can be borrowed without allocation; this is used heavily when
/// grouping zone-file output under `$ORIGIN` directives.
///
/// Boxed `Name`s can be constructed
///
/// * through the [`FromStr`] implementation;
/// * from uncompressed on-the-wire names through
///   [`Name::try_from_uncompressed`]; and
/// * from compressed on-the-wire names through
///   [`Name::try_from_compressed`].
///
/// Comparison of `Name`s is ASCII-case-insensitive. The [`Ord`]
/// implementation compares the case-folded wire octets
/// lexicographically, with a shorter name sorting before any name it
/// prefixes. This is exactly the order of the canonical
/// [keys](Name::key) under which names are indexed in the zone
/// database, so iterating the database yields names in `Ord` order.
#[repr(transparent)]
pub struct Name([u8]);

/// Private construction helpers for use within this module.
impl Name {
    /// Wraps a borrowed wire representation in a `Name` without
    /// validation. The caller must ensure the octets are a well-formed
    /// uncompressed domain name.
    fn from_slice_unchecked(wire: &[u8]) -> &Name {
        // SAFETY: Name is a repr(transparent) wrapper around [u8].
        unsafe { &*(wire as *const [u8] as *const Name) }
    }

    /// Copies a wire representation into a new boxed `Name` without
    /// validation. The caller must ensure the octets are a well-formed
    /// uncompressed domain name.
    fn from_wire_unchecked(wire: &[u8]) -> Box<Name> {
        let boxed: Box<[u8]> = wire.into();
        // SAFETY: Name is a repr(transparent) wrapper around [u8].
        unsafe { Box::from_raw(Box::into_raw(boxed) as *mut Name) }
    }
}

////////////////////////////////////////////////////////////////////////
// NAME PUBLIC API                                                    //
////////////////////////////////////////////////////////////////////////

impl Name {
    /// Returns the (uncompressed) on-the-wire representation of the
    /// `Name`.
    pub fn wire_repr(&self) -> &[u8] {
        &self.0
    }

    /// Returns whether the `Name` is the DNS root `.`.
    pub fn is_root(&self) -> bool {
        self.0.len() == 1
    }

    /// Returns the number of labels in the `Name`, including the
    /// terminating null label.
    pub fn label_count(&self) -> usize {
        self.labels().count()
    }

    /// Returns an iterator over the labels of the `Name`, each as a
    /// slice of the label's content octets. The final item is the
    /// empty null label.
    pub fn labels(&self) -> Labels {
        Labels { wire: &self.0 }
    }

    /// Returns the canonical key under which this name is indexed: the
    /// wire representation with all ASCII letters folded to lowercase.
    pub fn key(&self) -> Vec<u8> {
        self.0.to_ascii_lowercase()
    }

    /// Returns the name obtained by removing the leftmost label, or
    /// [`None`] for the root.
    ///
    /// The parent is a suffix of this `Name`'s buffer, so no
    /// allocation occurs.
    pub fn parent(&self) -> Option<&Name> {
        if self.is_root() {
            None
        } else {
            let first_len = self.0[0] as usize;
            Some(Name::from_slice_unchecked(&self.0[first_len + 1..]))
        }
    }

    /// Returns whether this `Name` is equal to or a subdomain of
    /// `other`.
    pub fn eq_or_subdomain_of(&self, other: &Name) -> bool {
        if self.0.len() < other.0.len() {
            return false;
        }
        let suffix_start = self.0.len() - other.0.len();
        if !self.0[suffix_start..].eq_ignore_ascii_case(&other.0) {
            return false;
        }
        // The match must fall on a label boundary.
        self.label_offsets().contains(&suffix_start)
    }

    /// Makes all ASCII letters in this `Name` lowercase.
    ///
    /// Length octets are at most 63 and therefore never in the ASCII
    /// letter range, so the whole buffer can be folded at once.
    pub fn make_ascii_lowercase(&mut self) {
        self.0.make_ascii_lowercase();
    }

    /// Returns a reference to a `Name` representing the DNS root, `.`.
    pub fn root() -> &'static Name {
        static ROOT_WIRE_REPR: [u8; 1] = [0];
        Name::from_slice_unchecked(&ROOT_WIRE_REPR)
    }

    /// Tries to parse an uncompressed name present at the start of the
    /// provided buffer. The name need not occupy the entire buffer;
    /// extra data is ignored. If the name is valid, a new boxed `Name`
    /// is returned along with the length of the name in octets.
    pub fn try_from_uncompressed(octets: &[u8]) -> Result<(Box<Self>, usize), Error> {
        wire::parse_uncompressed_name(octets)
    }

    /// Tries to parse a compressed name present at index `start` of the
    /// provided buffer. Pointers are followed; indices given in
    /// pointers are treated as indices into `octets` (so generally one
    /// will pass an entire DNS message in `octets`). On success, this
    /// returns the new boxed `Name` and the number of contiguous octets
    /// the name occupies at `start`.
    pub fn try_from_compressed(octets: &[u8], start: usize) -> Result<(Box<Self>, usize), Error> {
        wire::parse_compressed_name(octets, start)
    }

    /// Validates an uncompressed name at the start of the provided
    /// buffer, returning its length in octets. Extra data after the
    /// name is ignored.
    pub fn validate_uncompressed(octets: &[u8]) -> Result<usize, Error> {
        wire::validate_uncompressed_name(octets, false)
    }

    /// Like [`Name::validate_uncompressed`], but in addition fails if
    /// there is data in the buffer after the name.
    pub fn validate_uncompressed_all(octets: &[u8]) -> Result<(), Error> {
        wire::validate_uncompressed_name(octets, true).and(Ok(()))
    }

    /// Skips a compressed name at index `start` of `octets` without
    /// following pointers, returning the number of contiguous octets it
    /// occupies.
    pub fn skip_compressed(octets: &[u8], start: usize) -> Result<usize, Error> {
        wire::skip_compressed_name(octets, start)
    }

    /// Returns an object that [`Display`](fmt::Display)s this name
    /// relative to `origin`: `@` when the name equals the origin, the
    /// leading labels without a trailing dot when the name is a
    /// subdomain of the origin, and the absolute form otherwise.
    pub fn display_relative<'a>(&'a self, origin: &'a Name) -> RelativeDisplay<'a> {
        RelativeDisplay { name: self, origin }
    }

    /// Returns the offsets of the starts of this name's labels in its
    /// wire representation.
    fn label_offsets(&self) -> Vec<usize> {
        let mut offsets = Vec::new();
        let mut offset = 0;
        loop {
            offsets.push(offset);
            let len = self.0[offset] as usize;
            if len == 0 {
                return offsets;
            }
            offset += len + 1;
        }
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Eq for Name {}

impl PartialOrd for Name {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Name {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .iter()
            .map(u8::to_ascii_lowercase)
            .cmp(other.0.iter().map(u8::to_ascii_lowercase))
    }
}

impl Hash for Name {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for octet in self.0.iter() {
            octet.to_ascii_lowercase().hash(state);
        }
    }
}

impl ToOwned for Name {
    type Owned = Box<Name>;

    fn to_owned(&self) -> Self::Owned {
        Name::from_wire_unchecked(&self.0)
    }
}

impl Clone for Box<Name> {
    fn clone(&self) -> Self {
        self.as_ref().to_owned()
    }
}

////////////////////////////////////////////////////////////////////////
// ITERATION OVER A NAME'S LABELS                                     //
////////////////////////////////////////////////////////////////////////

/// An iterator over the labels of a [`Name`], produced by
/// [`Name::labels`].
#[derive(Clone, Debug)]
pub struct Labels<'a> {
    wire: &'a [u8],
}

impl<'a> Iterator for Labels<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        if self.wire.is_empty() {
            None
        } else {
            let len = self.wire[0] as usize;
            let label = &self.wire[1..1 + len];
            self.wire = if len == 0 { &[] } else { &self.wire[1 + len..] };
            Some(label)
        }
    }
}

////////////////////////////////////////////////////////////////////////
// TEXTUAL DISPLAY                                                    //
////////////////////////////////////////////////////////////////////////

/// Writes a label in zone-file text form, escaping `.`, `\`, and
/// non-printable octets as specified by [RFC 4343 § 2.1].
///
/// [RFC 4343 § 2.1]: https://datatracker.ietf.org/doc/html/rfc4343#section-2.1
fn fmt_label(label: &[u8], f: &mut fmt::Formatter) -> fmt::Result {
    for &octet in label {
        if octet == b'.' || octet == b'\\' {
            write!(f, "\\{}", char::from(octet))?;
        } else if (0x21..=0x7e).contains(&octet) {
            write!(f, "{}", char::from(octet))?;
        } else {
            write!(f, "\\{:03}", octet)?;
        }
    }
    Ok(())
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_root() {
            return f.write_str(".");
        }
        for label in self.labels() {
            if !label.is_empty() {
                fmt_label(label, f)?;
                f.write_str(".")?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "\"{}\"", self)
    }
}

/// Helper returned by [`Name::display_relative`].
pub struct RelativeDisplay<'a> {
    name: &'a Name,
    origin: &'a Name,
}

impl fmt::Display for RelativeDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.name == self.origin {
            f.write_str("@")
        } else if self.name.eq_or_subdomain_of(self.origin) {
            let n_relative = self.name.label_count() - self.origin.label_count();
            for (i, label) in self.name.labels().take(n_relative).enumerate() {
                if i > 0 {
                    f.write_str(".")?;
                }
                fmt_label(label, f)?;
            }
            Ok(())
        } else {
            self.name.fmt(f)
        }
    }
}

////////////////////////////////////////////////////////////////////////
// PARSING OF NAMES FROM RUST STRINGS                                 //
////////////////////////////////////////////////////////////////////////

/// Allows for conversion of a Rust [`str`] into a boxed [`Name`]. The
/// passed string must be strictly ASCII. Escape sequences as defined by
/// [RFC 4343 § 2.1] are supported. A name without a trailing dot is
/// accepted and treated as absolute.
///
/// [RFC 4343 § 2.1]: https://datatracker.ietf.org/doc/html/rfc4343#section-2.1
impl FromStr for Box<Name> {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(Error::StrEmpty);
        } else if s == "." {
            return Ok(Name::root().to_owned());
        }

        let mut wire = Vec::with_capacity(s.len() + 2);
        let mut label_start = 0;
        wire.push(0);

        let mut remaining: &[u8] = s.as_ref();
        let mut at_label_boundary = false;
        while let Some(&octet) = remaining.first() {
            let value = if octet == b'\\' {
                let (value, consumed) = parse_escape(&remaining[1..])?;
                remaining = &remaining[consumed + 1..];
                value
            } else if octet == b'.' {
                if at_label_boundary || wire.len() == label_start + 1 {
                    // An empty label is only allowed as the final
                    // (root) label, i.e. for the string ".", which was
                    // handled above.
                    return Err(Error::NullNonTerminal);
                }
                remaining = &remaining[1..];
                at_label_boundary = true;
                continue;
            } else if !octet.is_ascii() {
                return Err(Error::StrNotAscii);
            } else {
                remaining = &remaining[1..];
                octet
            };

            if at_label_boundary {
                label_start = wire.len();
                wire.push(0);
                at_label_boundary = false;
            }
            let label_len = wire.len() - label_start;
            if label_len > MAX_LABEL_LEN {
                return Err(Error::LabelTooLong);
            }
            wire[label_start] = label_len as u8;
            wire.push(value);
        }

        wire.push(0);
        if wire.len() > MAX_WIRE_LEN {
            return Err(Error::NameTooLong);
        }
        Ok(Name::from_wire_unchecked(&wire))
    }
}

/// Parses an escape sequence. We expect `remaining_octets` to start
/// with the octet immediately *after* the backslash that introduces the
/// escape sequence.
fn parse_escape(remaining_octets: &[u8]) -> Result<(u8, usize), Error> {
    if remaining_octets.is_empty() {
        Err(Error::InvalidEscape)
    } else if remaining_octets[0].is_ascii_digit() {
        if remaining_octets.len() < 3
            || !remaining_octets[1].is_ascii_digit()
            || !remaining_octets[2].is_ascii_digit()
        {
            Err(Error::InvalidEscape)
        } else {
            let hundreds = (remaining_octets[0] - b'0') as usize;
            let tens = (remaining_octets[1] - b'0') as usize;
            let ones = (remaining_octets[2] - b'0') as usize;
            let value = 100 * hundreds + 10 * tens + ones;
            if value > 255 {
                Err(Error::InvalidEscape)
            } else {
                Ok((value as u8, 3))
            }
        }
    } else {
        Ok((remaining_octets[0], 1))
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_has_expected_characteristics() {
        let root = Name::root();
        assert!(root.is_root());
        assert_eq!(root.label_count(), 1);
        assert_eq!(root.wire_repr(), &[0]);
        assert_eq!(root.parent(), None);
    }

    #[test]
    fn fromstr_works() {
        let name: Box<Name> = "example.test.".parse().unwrap();
        assert_eq!(name.wire_repr(), b"\x07example\x04test\x00");
    }

    #[test]
    fn fromstr_accepts_missing_trailing_dot() {
        let with_dot: Box<Name> = "example.test.".parse().unwrap();
        let without_dot: Box<Name> = "example.test".parse().unwrap();
        assert_eq!(with_dot, without_dot);
    }

    #[test]
    fn fromstr_works_for_root() {
        let name: Box<Name> = ".".parse().unwrap();
        assert_eq!(name.as_ref(), Name::root());
    }

    #[test]
    fn fromstr_rejects_empty() {
        assert_eq!("".parse::<Box<Name>>(), Err(Error::StrEmpty));
    }

    #[test]
    fn fromstr_rejects_non_ascii() {
        assert_eq!("✈.aero.".parse::<Box<Name>>(), Err(Error::StrNotAscii));
    }

    #[test]
    fn fromstr_rejects_null_non_terminal() {
        assert_eq!("a.b..c.".parse::<Box<Name>>(), Err(Error::NullNonTerminal));
        assert_eq!(".a.".parse::<Box<Name>>(), Err(Error::NullNonTerminal));
    }

    #[test]
    fn fromstr_rejects_long_label() {
        assert_eq!(
            "xxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx."
                .parse::<Box<Name>>(),
            Err(Error::LabelTooLong)
        );
    }

    #[test]
    fn fromstr_rejects_long_name() {
        assert_eq!(
            "x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.\
             x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.\
             x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.\
             x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x.x."
                .parse::<Box<Name>>(),
            Err(Error::NameTooLong)
        );
    }

    #[test]
    fn fromstr_escaping_works() {
        let escaped: Box<Name> = "\\000.\\\\\\..".parse().unwrap();
        assert_eq!(escaped.wire_repr(), b"\x01\x00\x02\\.\x00");
    }

    #[test]
    fn fromstr_rejects_invalid_escapes() {
        assert_eq!("\\00".parse::<Box<Name>>(), Err(Error::InvalidEscape));
        assert_eq!("\\00x.".parse::<Box<Name>>(), Err(Error::InvalidEscape));
        assert_eq!("\\256.".parse::<Box<Name>>(), Err(Error::InvalidEscape));
    }

    #[test]
    fn equality_is_case_insensitive() {
        let upper: Box<Name> = "EXAMPLE.Test.".parse().unwrap();
        let lower: Box<Name> = "example.test.".parse().unwrap();
        assert_eq!(upper, lower);
    }

    #[test]
    fn ord_matches_key_order() {
        let names: Vec<Box<Name>> = ["a.", "A.b.", "a.b.c.", "ab.", "b."]
            .iter()
            .map(|s| s.parse().unwrap())
            .collect();
        let mut sorted = names.clone();
        sorted.sort();
        let mut by_key = names.clone();
        by_key.sort_by(|a, b| a.key().cmp(&b.key()));
        assert_eq!(sorted, by_key);
    }

    #[test]
    fn parent_works() {
        let name: Box<Name> = "a.example.test.".parse().unwrap();
        let parent = name.parent().unwrap();
        assert_eq!(parent.wire_repr(), b"\x07example\x04test\x00");
        assert_eq!(parent.parent().unwrap().parent().unwrap(), Name::root());
    }

    #[test]
    fn eq_or_subdomain_of_works() {
        let subdomain: Box<Name> = "subdomain.example.test.".parse().unwrap();
        let domain: Box<Name> = "example.test.".parse().unwrap();
        let other: Box<Name> = "other.test.".parse().unwrap();
        assert!(subdomain.eq_or_subdomain_of(&domain));
        assert!(domain.eq_or_subdomain_of(&domain));
        assert!(subdomain.eq_or_subdomain_of(Name::root()));
        assert!(!domain.eq_or_subdomain_of(&subdomain));
        assert!(!domain.eq_or_subdomain_of(&other));
    }

    #[test]
    fn eq_or_subdomain_of_requires_label_boundary() {
        // "example.test." ends with the octets of "e.test." only off a
        // label boundary, so it must not count as a subdomain.
        let domain: Box<Name> = "example.test.".parse().unwrap();
        let tricky: Box<Name> = "e.test.".parse().unwrap();
        assert!(!domain.eq_or_subdomain_of(&tricky));
    }

    #[test]
    fn display_works() {
        let name: Box<Name> = "a.example.test.".parse().unwrap();
        assert_eq!(name.to_string(), "a.example.test.");
        assert_eq!(Name::root().to_string(), ".");
    }

    #[test]
    fn display_escapes_special_octets() {
        let name: Box<Name> = "\\000.\\..".parse().unwrap();
        assert_eq!(name.to_string(), "\\000.\\..");
    }

    #[test]
    fn display_relative_works() {
        let name: Box<Name> = "www.example.test.".parse().unwrap();
        let origin: Box<Name> = "example.test.".parse().unwrap();
        let unrelated: Box<Name> = "other.test.".parse().unwrap();
        assert_eq!(name.display_relative(&origin).to_string(), "www");
        assert_eq!(origin.display_relative(&origin).to_string(), "@");
        assert_eq!(
            name.display_relative(&unrelated).to_string(),
            "www.example.test."
        );
    }
}
