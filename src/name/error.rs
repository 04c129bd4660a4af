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

//! Errors related to domain name processing.

use std::fmt;

/// An error that occurs when parsing or validating a domain name.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Error {
    /// A label exceeds 63 octets.
    LabelTooLong,

    /// The name's wire representation exceeds 255 octets.
    NameTooLong,

    /// A null label appears somewhere other than the end of the name.
    NullNonTerminal,

    /// The name ran past the end of the available data.
    UnexpectedEom,

    /// A compression pointer does not point backward, or is truncated.
    BadPointer,

    /// The buffer contains data after the name.
    ExtraData,

    /// A textual name was empty.
    StrEmpty,

    /// A textual name contained a non-ASCII character.
    StrNotAscii,

    /// A textual name contained an invalid escape sequence.
    InvalidEscape,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::LabelTooLong => f.write_str("label exceeds 63 octets"),
            Self::NameTooLong => f.write_str("name exceeds 255 octets"),
            Self::NullNonTerminal => f.write_str("null label in non-terminal position"),
            Self::UnexpectedEom => f.write_str("unexpected end of data in name"),
            Self::BadPointer => f.write_str("invalid compression pointer"),
            Self::ExtraData => f.write_str("extra data after name"),
            Self::StrEmpty => f.write_str("empty string"),
            Self::StrNotAscii => f.write_str("string is not ASCII"),
            Self::InvalidEscape => f.write_str("invalid escape sequence"),
        }
    }
}

impl std::error::Error for Error {}
