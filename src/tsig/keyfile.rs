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

//! Reading of TSIG key files.
//!
//! A key file is a newline-delimited text file containing, in order,
//! the master server's IP address (numeric), the key name (a textual
//! DNS name), the algorithm mnemonic, and the base-64 encoded secret.
//! Because the file carries key material, it is removed after a
//! successful read.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use log::warn;

use super::{Algorithm, Key};

/// Reads a TSIG key file and removes it.
///
/// Removal failure is logged as a warning but does not fail the read;
/// the key has already been recovered at that point.
pub fn read(path: &Path) -> Result<Key, Error> {
    let file = File::open(path).map_err(Error::Io)?;
    let key = read_from(BufReader::new(file))?;
    if let Err(e) = fs::remove_file(path) {
        warn!("failed to remove TSIG key file {}: {}", path.display(), e);
    }
    Ok(key)
}

/// Reads TSIG key data from any buffered reader.
pub fn read_from(reader: impl BufRead) -> Result<Key, Error> {
    let mut lines = reader.lines();
    let mut next_line = |field: &'static str| -> Result<String, Error> {
        match lines.next() {
            Some(Ok(line)) => Ok(line.trim().to_owned()),
            Some(Err(e)) => Err(Error::Io(e)),
            None => Err(Error::MissingField(field)),
        }
    };

    let server = next_line("server address")?
        .parse()
        .or(Err(Error::BadAddress))?;
    let name = next_line("key name")?.parse().or(Err(Error::BadName))?;
    let algorithm_mnemonic = next_line("algorithm")?;
    let algorithm =
        Algorithm::from_mnemonic(&algorithm_mnemonic).ok_or(Error::UnknownAlgorithm)?;
    let secret = BASE64_STANDARD
        .decode(next_line("secret")?)
        .or(Err(Error::BadSecret))?;

    Ok(Key {
        name,
        algorithm,
        secret,
        server,
    })
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error that occurs when reading a TSIG key file.
#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    MissingField(&'static str),
    BadAddress,
    BadName,
    UnknownAlgorithm,
    BadSecret,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {}", e),
            Self::MissingField(field) => write!(f, "missing field: {}", field),
            Self::BadAddress => f.write_str("cannot parse server address"),
            Self::BadName => f.write_str("cannot parse key name"),
            Self::UnknownAlgorithm => f.write_str("unknown TSIG algorithm"),
            Self::BadSecret => f.write_str("cannot decode base-64 secret"),
        }
    }
}

impl std::error::Error for Error {}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::net::IpAddr;

    use super::*;

    const KEY_FILE: &str = "192.0.2.1\nxfer.key.\nhmac-md5\ndG9wc2VjcmV0\n";

    #[test]
    fn read_from_works() {
        let key = read_from(KEY_FILE.as_bytes()).unwrap();
        assert_eq!(key.server, "192.0.2.1".parse::<IpAddr>().unwrap());
        assert_eq!(key.name, "xfer.key.".parse().unwrap());
        assert_eq!(key.algorithm, Algorithm::HmacMd5);
        assert_eq!(key.secret, b"topsecret");
    }

    #[test]
    fn read_from_rejects_truncated_files() {
        assert!(matches!(
            read_from("192.0.2.1\nxfer.key.\n".as_bytes()),
            Err(Error::MissingField("algorithm")),
        ));
    }

    #[test]
    fn read_from_rejects_bad_secrets() {
        assert!(matches!(
            read_from("192.0.2.1\nxfer.key.\nhmac-md5\n!!!\n".as_bytes()),
            Err(Error::BadSecret),
        ));
    }

    #[test]
    fn read_removes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("xfer.tsiginfo");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(KEY_FILE.as_bytes()).unwrap();
        drop(file);
        let key = read(&path).unwrap();
        assert_eq!(key.algorithm, Algorithm::HmacMd5);
        assert!(!path.exists());
    }
}
