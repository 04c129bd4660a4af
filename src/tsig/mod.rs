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

//! Implementation of Secret Key Transaction Authentication for DNS
//! (TSIG), as specified by [RFC 2845].
//!
//! TSIG authenticates a DNS transaction by appending a pseudo-RR
//! carrying an HMAC over the message and a small set of meta-fields.
//! For zone transfers, the protocol is stateful: the MAC of each
//! signed message seeds the digest of the next, and a server may sign
//! only every so many packets of a multi-packet response, with each
//! signature covering everything since the previous one.
//!
//! The [`TsigState`] type is that state machine. A transfer creates
//! one per [`Key`] and drives it through the cycle
//! [`init_query`](TsigState::init_query) →
//! [`prepare`](TsigState::prepare) → [`update`](TsigState::update) →
//! [`sign`](TsigState::sign)/[`verify`](TsigState::verify); the
//! AXFR client (see [`crate::xfr`]) owns the per-packet protocol
//! rules built on top.
//!
//! [RFC 2845]: https://datatracker.ietf.org/doc/html/rfc2845

use std::fmt;
use std::net::IpAddr;
use std::time::SystemTime;

use hmac::{Hmac, Mac};
use lazy_static::lazy_static;
use md5::Md5;
use sha1::Sha1;
use sha2::Sha256;

use crate::message::{ExtendedRcode, Qclass, Reader};
use crate::name::{LowercaseName, Name};
use crate::rr::Type;
use crate::util::Caseless;

pub mod keyfile;

////////////////////////////////////////////////////////////////////////
// TSIG ALGORITHMS                                                    //
////////////////////////////////////////////////////////////////////////

lazy_static! {
    static ref HMAC_MD5_NAME: Box<LowercaseName> =
        "hmac-md5.sig-alg.reg.int.".parse().unwrap();
    static ref HMAC_SHA1_NAME: Box<LowercaseName> = "hmac-sha1.".parse().unwrap();
    static ref HMAC_SHA256_NAME: Box<LowercaseName> = "hmac-sha256.".parse().unwrap();
}

/// A supported TSIG algorithm.
///
/// HMAC-MD5 is the original mandatory algorithm of [RFC 2845 § 6] and
/// remains what most transfer setups deploy; HMAC-SHA1 and HMAC-SHA256
/// are the additional algorithms of [RFC 4635].
///
/// [RFC 2845 § 6]: https://datatracker.ietf.org/doc/html/rfc2845#section-6
/// [RFC 4635]: https://datatracker.ietf.org/doc/html/rfc4635
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Algorithm {
    HmacMd5,
    HmacSha1,
    HmacSha256,
}

impl Algorithm {
    /// Returns the domain name assigned to identify this algorithm on
    /// the wire.
    pub fn wire_name(&self) -> &'static LowercaseName {
        match self {
            Self::HmacMd5 => &HMAC_MD5_NAME,
            Self::HmacSha1 => &HMAC_SHA1_NAME,
            Self::HmacSha256 => &HMAC_SHA256_NAME,
        }
    }

    /// Returns the short mnemonic used for this algorithm in key files.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Self::HmacMd5 => "hmac-md5",
            Self::HmacSha1 => "hmac-sha1",
            Self::HmacSha256 => "hmac-sha256",
        }
    }

    /// Returns the size of the MAC produced by this algorithm.
    pub fn output_size(&self) -> usize {
        match self {
            Self::HmacMd5 => 16,
            Self::HmacSha1 => 20,
            Self::HmacSha256 => 32,
        }
    }

    /// Finds an algorithm by its on-the-wire domain name. This returns
    /// `None` if the algorithm is not supported.
    pub fn from_wire_name(name: &Name) -> Option<Self> {
        [Self::HmacMd5, Self::HmacSha1, Self::HmacSha256]
            .into_iter()
            .find(|algorithm| name == algorithm.wire_name().as_ref())
    }

    /// Finds an algorithm by its key-file mnemonic. This returns
    /// `None` if the algorithm is not supported.
    pub fn from_mnemonic(mnemonic: &str) -> Option<Self> {
        [Self::HmacMd5, Self::HmacSha1, Self::HmacSha256]
            .into_iter()
            .find(|algorithm| Caseless(mnemonic) == Caseless(algorithm.mnemonic()))
    }

    /// Creates a MAC authenticator to compute a MAC with this
    /// algorithm and the given key.
    fn make_authenticator(&self, key: &[u8]) -> Box<dyn Authenticator> {
        match self {
            Self::HmacMd5 => Box::new(Hmac::<Md5>::new_from_slice(key).unwrap()),
            Self::HmacSha1 => Box::new(Hmac::<Sha1>::new_from_slice(key).unwrap()),
            Self::HmacSha256 => Box::new(Hmac::<Sha256>::new_from_slice(key).unwrap()),
        }
    }
}

/// An abstraction over different MAC implementations. Basically, this
/// wraps the `digest` crate's [`Mac`] trait to give us an object-safe
/// trait (so that we can use `Box<dyn Authenticator>`).
trait Authenticator {
    fn update(&mut self, data: &[u8]);
    fn finalize(self: Box<Self>) -> Box<[u8]>;
}

impl<M> Authenticator for M
where
    M: Mac,
{
    fn update(&mut self, data: &[u8]) {
        <Self as Mac>::update(self, data);
    }

    fn finalize(self: Box<Self>) -> Box<[u8]> {
        <Self as Mac>::finalize(*self)
            .into_bytes()
            .to_vec()
            .into_boxed_slice()
    }
}

/// Compares two MACs without early exit, so that comparison time does
/// not depend on where the MACs first differ. (The lengths are
/// public.)
fn macs_equal(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b.iter()).fold(0, |acc, (x, y)| acc | (x ^ y)) == 0
}

////////////////////////////////////////////////////////////////////////
// TSIG KEYS                                                          //
////////////////////////////////////////////////////////////////////////

/// A TSIG key: a shared secret, the algorithm it is used with, and the
/// master server it authenticates.
#[derive(Clone, Debug)]
pub struct Key {
    pub name: Box<LowercaseName>,
    pub algorithm: Algorithm,
    pub secret: Vec<u8>,
    pub server: IpAddr,
}

////////////////////////////////////////////////////////////////////////
// THE TIME-SIGNED FIELD                                              //
////////////////////////////////////////////////////////////////////////

/// A convenience type for working with the TSIG "time signed" field:
/// an unsigned 48-bit big-endian count of seconds since the Unix
/// epoch.
#[derive(Clone, Copy, Eq, Hash, PartialEq)]
pub struct TimeSigned([u8; 6]);

impl TimeSigned {
    /// Converts Unix time expressed as a [`u64`] into a `TimeSigned`.
    /// This fails if the conversion would truncate the time.
    pub fn try_from_unix_time(seconds: u64) -> Result<Self, UnrepresentableTimeError> {
        let octets = seconds.to_be_bytes();
        if octets[0] != 0 || octets[1] != 0 {
            Err(UnrepresentableTimeError)
        } else {
            Ok(Self(octets[2..8].try_into().unwrap()))
        }
    }

    /// Returns a `TimeSigned` for the current system time.
    pub fn now() -> Self {
        let since_epoch = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default();
        // 48 bits of seconds runs out in the year 8,921,556.
        Self::try_from_unix_time(since_epoch.as_secs()).unwrap()
    }

    /// Converts a `TimeSigned` into Unix time expressed as a [`u64`].
    pub fn to_unix_time(self) -> u64 {
        let mut octets = [0; 8];
        octets[2..8].copy_from_slice(self.0.as_slice());
        u64::from_be_bytes(octets)
    }

    /// Borrows the internal representation (an unsigned 48-bit
    /// big-endian integer) as a slice.
    pub fn as_slice(&self) -> &[u8] {
        self.0.as_slice()
    }
}

impl From<[u8; 6]> for TimeSigned {
    fn from(octets: [u8; 6]) -> Self {
        Self(octets)
    }
}

impl fmt::Debug for TimeSigned {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_unix_time())
    }
}

/// An error signifying that a time does not fit in the 48-bit "time
/// signed" field.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub struct UnrepresentableTimeError;

impl fmt::Display for UnrepresentableTimeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("time is not representable in the TSIG time-signed field")
    }
}

impl std::error::Error for UnrepresentableTimeError {}

/// The fudge value written into signed messages, per the RFC 2845
/// recommendation.
const DEFAULT_FUDGE: u16 = 300;

////////////////////////////////////////////////////////////////////////
// THE TSIG RECORD STATE MACHINE                                      //
////////////////////////////////////////////////////////////////////////

/// The status of TSIG processing for the current packet, as determined
/// by [`TsigState::find_rr`] and [`TsigState::verify`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Status {
    /// The packet carries a well-formed TSIG RR for our key (and, after
    /// [`verify`](TsigState::verify), the MAC checked out).
    Ok,

    /// The packet carries no TSIG RR.
    NotPresent,

    /// The packet carries a TSIG RR that is unacceptable: it names an
    /// unknown key or algorithm, or its MAC failed verification. The
    /// specific problem is recorded in the
    /// [`error_code`](TsigState::error_code).
    Error,
}

/// Per-transaction TSIG state.
///
/// One `TsigState` covers one query and all of its responses. The
/// lifecycle, following [RFC 2845 § 4]:
///
/// 1. [`init_query`](Self::init_query) binds the state to a query ID
///    and resets all rolling state.
/// 2. [`prepare`](Self::prepare) opens a digest window. The first
///    window covers the pending query; each later window begins with
///    the previous MAC, length-prefixed.
/// 3. [`update`](Self::update) feeds a packet prefix into the window,
///    substituting the original query ID for the packet's ID field.
/// 4. [`sign`](Self::sign) closes the window over the query;
///    [`append_rr`](Self::append_rr) then serializes the TSIG RR.
/// 5. For each response, [`find_rr`](Self::find_rr) locates and parses
///    the TSIG RR (if any), and [`verify`](Self::verify) closes the
///    window and checks the MAC. On success the caller re-opens the
///    next window with [`prepare`](Self::prepare).
///
/// The variables digested with the message are the full TSIG variable
/// set for the query and the first response, and the timers only for
/// subsequent responses of the same transaction ([RFC 2845 § 4.2–4.4]).
///
/// [RFC 2845 § 4]: https://datatracker.ietf.org/doc/html/rfc2845#section-4
/// [RFC 2845 § 4.2–4.4]: https://datatracker.ietf.org/doc/html/rfc2845#section-4.2
pub struct TsigState {
    key: Key,
    query_id: u16,
    status: Status,
    error_code: ExtendedRcode,
    response_count: u64,
    updates_since_last_prepare: usize,
    position: usize,

    // Fields of the TSIG RR most recently read by find_rr (or written
    // by sign).
    time_signed: TimeSigned,
    fudge: u16,
    other: Vec<u8>,

    /// The MAC read from the current packet by `find_rr`.
    mac: Vec<u8>,

    /// The rolling MAC: the last MAC we produced (`sign`) or checked
    /// (`verify`); digested at the start of the next window.
    prior_mac: Vec<u8>,

    /// The HMAC context of the current digest window.
    context: Option<Box<dyn Authenticator>>,
}

impl TsigState {
    /// Creates a state machine bound to the given key.
    pub fn new(key: Key) -> Self {
        Self {
            key,
            query_id: 0,
            status: Status::Ok,
            error_code: ExtendedRcode::NOERROR,
            response_count: 0,
            updates_since_last_prepare: 0,
            position: 0,
            time_signed: TimeSigned([0; 6]),
            fudge: DEFAULT_FUDGE,
            other: Vec::new(),
            mac: Vec::new(),
            prior_mac: Vec::new(),
            context: None,
        }
    }

    /// Returns the key this state machine is bound to.
    pub fn key(&self) -> &Key {
        &self.key
    }

    /// Returns the status of the current packet.
    pub fn status(&self) -> Status {
        self.status
    }

    /// Returns the TSIG error code of the current packet.
    pub fn error_code(&self) -> ExtendedRcode {
        self.error_code
    }

    /// Returns the number of responses digested so far.
    pub fn response_count(&self) -> u64 {
        self.response_count
    }

    /// Returns the number of packets digested since the last
    /// [`prepare`](Self::prepare).
    pub fn updates_since_last_prepare(&self) -> usize {
        self.updates_since_last_prepare
    }

    /// Returns the byte offset at which the current packet's TSIG RR
    /// begins (0 if the packet carries none).
    pub fn position(&self) -> usize {
        self.position
    }

    /// Resets the state machine for a new transaction with the given
    /// query ID.
    pub fn init_query(&mut self, query_id: u16) {
        self.query_id = query_id;
        self.status = Status::Ok;
        self.error_code = ExtendedRcode::NOERROR;
        self.response_count = 0;
        self.updates_since_last_prepare = 0;
        self.position = 0;
        self.other.clear();
        self.mac.clear();
        self.prior_mac.clear();
        self.context = None;
    }

    /// Opens a new digest window. If a prior MAC exists, it is digested
    /// first, prefixed with its 16-bit length ([RFC 2845 § 4.4]).
    ///
    /// [RFC 2845 § 4.4]: https://datatracker.ietf.org/doc/html/rfc2845#section-4.4
    pub fn prepare(&mut self) {
        let mut context = self.key.algorithm.make_authenticator(&self.key.secret);
        if !self.prior_mac.is_empty() {
            context.update(&(self.prior_mac.len() as u16).to_be_bytes());
            context.update(&self.prior_mac);
        }
        self.context = Some(context);
        self.updates_since_last_prepare = 0;
    }

    /// Feeds `packet[..len]` into the current digest window. The
    /// packet's ID field is replaced by the original query ID as it is
    /// digested. Must be called between [`prepare`](Self::prepare) and
    /// [`sign`](Self::sign)/[`verify`](Self::verify).
    pub fn update(&mut self, packet: &[u8], len: usize) {
        let context = self.context.as_mut().expect("no digest window is open");
        context.update(&self.query_id.to_be_bytes());
        context.update(&packet[2..len]);
        if packet[2] & 0x80 != 0 {
            // A response (QR set).
            self.response_count += 1;
        }
        self.updates_since_last_prepare += 1;
    }

    /// Closes the current digest window over a query, producing the MAC
    /// that [`append_rr`](Self::append_rr) will serialize.
    pub fn sign(&mut self, now: TimeSigned) {
        self.time_signed = now;
        self.fudge = DEFAULT_FUDGE;
        let timers_only = self.response_count > 1;
        let mut context = self.context.take().expect("no digest window is open");
        self.digest_variables(context.as_mut(), timers_only);
        self.prior_mac = context.finalize().into_vec();
    }

    /// Serializes the TSIG RR for the most recent [`sign`](Self::sign)
    /// and appends it to `packet`. The caller is responsible for
    /// incrementing the packet's ARCOUNT.
    pub fn append_rr(&self, packet: &mut Vec<u8>) {
        let algorithm_name = self.key.algorithm.wire_name();
        packet.extend_from_slice(self.key.name.wire_repr());
        packet.extend_from_slice(&u16::from(Type::TSIG).to_be_bytes());
        packet.extend_from_slice(&u16::from(Qclass::ANY).to_be_bytes());
        packet.extend_from_slice(&0u32.to_be_bytes()); // TTL
        let rdlength = algorithm_name.wire_repr().len() + 16 + self.prior_mac.len();
        packet.extend_from_slice(&(rdlength as u16).to_be_bytes());
        packet.extend_from_slice(algorithm_name.wire_repr());
        packet.extend_from_slice(self.time_signed.as_slice());
        packet.extend_from_slice(&self.fudge.to_be_bytes());
        packet.extend_from_slice(&(self.prior_mac.len() as u16).to_be_bytes());
        packet.extend_from_slice(&self.prior_mac);
        packet.extend_from_slice(&self.query_id.to_be_bytes());
        packet.extend_from_slice(&u16::from(self.error_code).to_be_bytes());
        packet.extend_from_slice(&0u16.to_be_bytes()); // other length
    }

    /// Scans `packet` for a TSIG RR in the last position of the
    /// additional section.
    ///
    /// If one is found, its fields are parsed into the state machine:
    /// [`position`](Self::position) records where in the packet the RR
    /// begins, and the [`status`](Self::status) is set to [`Status::Ok`]
    /// or, if the RR names a different key or algorithm,
    /// [`Status::Error`] with error code BADKEY. If the packet carries
    /// no TSIG RR, the status is set to [`Status::NotPresent`] and the
    /// position to 0.
    ///
    /// An error is returned only when the packet itself is malformed.
    pub fn find_rr(&mut self, packet: &[u8]) -> Result<(), FindRrError> {
        self.status = Status::NotPresent;
        self.position = 0;

        let mut reader = Reader::try_from(packet).or(Err(FindRrError))?;
        let arcount = reader.arcount();
        if arcount == 0 {
            return Ok(());
        }
        for _ in 0..reader.qdcount() {
            reader.skip_question().or(Err(FindRrError))?;
        }
        let rrs_before_last = reader.ancount() as usize + reader.nscount() as usize
            + arcount as usize
            - 1;
        for _ in 0..rrs_before_last {
            reader.skip_rr().or(Err(FindRrError))?;
        }

        let position = reader.cursor();
        let rr = reader.read_rr().or(Err(FindRrError))?;
        if rr.rr_type != Type::TSIG {
            return Ok(());
        }
        if rr.class != Qclass::ANY.into() || u32::from(rr.ttl) != 0 {
            return Err(FindRrError);
        }
        self.position = position;
        self.parse_rdata(&rr.owner, rr.rdata.octets())
    }

    /// Parses the fields of a TSIG RDATA into the state machine and
    /// checks the key and algorithm names.
    fn parse_rdata(&mut self, owner: &Name, rdata: &[u8]) -> Result<(), FindRrError> {
        let algorithm_len = Name::validate_uncompressed(rdata).or(Err(FindRrError))?;
        let (algorithm_name, _) = Name::try_from_uncompressed(rdata).unwrap();
        let fixed = rdata
            .get(algorithm_len..algorithm_len + 10)
            .ok_or(FindRrError)?;
        self.time_signed = TimeSigned(fixed[0..6].try_into().unwrap());
        self.fudge = u16::from_be_bytes(fixed[6..8].try_into().unwrap());
        let mac_size = u16::from_be_bytes(fixed[8..10].try_into().unwrap()) as usize;
        let mac_start = algorithm_len + 10;
        self.mac = rdata
            .get(mac_start..mac_start + mac_size)
            .ok_or(FindRrError)?
            .to_vec();
        let tail = rdata.get(mac_start + mac_size..).ok_or(FindRrError)?;
        if tail.len() < 6 {
            return Err(FindRrError);
        }
        self.error_code = u16::from_be_bytes(tail[2..4].try_into().unwrap()).into();
        let other_len = u16::from_be_bytes(tail[4..6].try_into().unwrap()) as usize;
        if tail.len() != 6 + other_len {
            return Err(FindRrError);
        }
        self.other = tail[6..].to_vec();

        if owner != self.key.name.as_ref().as_ref()
            || Algorithm::from_wire_name(&algorithm_name) != Some(self.key.algorithm)
        {
            self.status = Status::Error;
            self.error_code = ExtendedRcode::BADKEY;
        } else {
            self.status = Status::Ok;
        }
        Ok(())
    }

    /// Closes the current digest window over a response and compares
    /// the computed MAC with the one read by [`find_rr`](Self::find_rr).
    ///
    /// On success, the computed MAC becomes the prior MAC for the next
    /// window and `true` is returned. On mismatch, the status becomes
    /// [`Status::Error`] with error code BADSIG and `false` is
    /// returned.
    pub fn verify(&mut self) -> bool {
        let timers_only = self.response_count > 1;
        let mut context = self.context.take().expect("no digest window is open");
        self.digest_variables(context.as_mut(), timers_only);
        let computed = context.finalize();
        if macs_equal(&computed, &self.mac) {
            self.prior_mac = computed.into_vec();
            self.status = Status::Ok;
            true
        } else {
            self.status = Status::Error;
            self.error_code = ExtendedRcode::BADSIG;
            false
        }
    }

    /// Digests the TSIG variables of [RFC 2845 § 3.4.2]: the full set,
    /// or (for the second and later responses of a transaction) the
    /// timers only.
    ///
    /// [RFC 2845 § 3.4.2]: https://datatracker.ietf.org/doc/html/rfc2845#section-3.4.2
    fn digest_variables(&self, context: &mut dyn Authenticator, timers_only: bool) {
        if !timers_only {
            context.update(self.key.name.wire_repr());
            context.update(&u16::from(Qclass::ANY).to_be_bytes());
            context.update(&0u32.to_be_bytes()); // TTL
            context.update(self.key.algorithm.wire_name().wire_repr());
        }
        context.update(self.time_signed.as_slice());
        context.update(&self.fudge.to_be_bytes());
        if !timers_only {
            context.update(&u16::from(self.error_code).to_be_bytes());
            context.update(&(self.other.len() as u16).to_be_bytes());
            context.update(&self.other);
        }
    }
}

impl fmt::Debug for TsigState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("TsigState")
            .field("key_name", &self.key.name)
            .field("algorithm", &self.key.algorithm)
            .field("query_id", &self.query_id)
            .field("status", &self.status)
            .field("error_code", &self.error_code)
            .field("response_count", &self.response_count)
            .field(
                "updates_since_last_prepare",
                &self.updates_since_last_prepare,
            )
            .field("position", &self.position)
            .finish()
    }
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error signaling that a packet was too malformed for
/// [`TsigState::find_rr`] to scan.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct FindRrError;

impl fmt::Display for FindRrError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("malformed packet while looking for TSIG RR")
    }
}

impl std::error::Error for FindRrError {}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::Class;
    use crate::message::constants::HEADER_SIZE;
    use crate::message::{set_arcount, QueryWriter, Qtype, Question};

    const QUERY_ID: u16 = 0xa2e0;
    const NOW: u64 = 1663798730;

    fn test_key() -> Key {
        Key {
            name: "a.tsig.key.".parse().unwrap(),
            algorithm: Algorithm::HmacMd5,
            secret: b"topsecret".to_vec(),
            server: "127.0.0.1".parse().unwrap(),
        }
    }

    fn now() -> TimeSigned {
        TimeSigned::try_from_unix_time(NOW).unwrap()
    }

    /// Builds a signed query for `zone SOA IN`, returning the packet
    /// and the client state machine ready to check responses.
    fn signed_query() -> (Vec<u8>, TsigState) {
        let mut client = TsigState::new(test_key());
        let mut writer = QueryWriter::new(QUERY_ID);
        writer.add_question(&Question {
            qname: "example.test.".parse().unwrap(),
            qtype: Qtype::from(Type::SOA),
            qclass: Qclass::from(Class::IN),
        });
        client.init_query(QUERY_ID);
        client.prepare();
        client.update(writer.octets(), writer.len());
        client.sign(now());
        client.append_rr(writer.packet_mut());
        writer.set_arcount(1);
        (writer.finish(), client)
    }

    /// Simulates the master's side: verifies the query and returns a
    /// state machine ready to sign responses.
    fn server_accepting(query: &[u8]) -> TsigState {
        let mut server = TsigState::new(test_key());
        server.init_query(QUERY_ID);
        let mut copy = query.to_vec();
        server.find_rr(&copy).unwrap();
        assert_eq!(server.status(), Status::Ok);
        set_arcount(&mut copy, 0);
        server.prepare();
        let position = server.position();
        server.update(&copy, position);
        assert!(server.verify());
        server.prepare();
        server
    }

    /// Builds an (unsigned) response packet with the given ID and a
    /// one-RR answer section.
    fn response_packet(answer_octets: &[u8]) -> Vec<u8> {
        let mut packet = vec![0; HEADER_SIZE];
        packet[0..2].copy_from_slice(&QUERY_ID.to_be_bytes());
        packet[2] = 0x84; // QR and AA
        packet[7] = 1; // ANCOUNT
        packet.extend_from_slice(answer_octets);
        packet
    }

    /// An A record for example.test., uncompressed.
    const ANSWER_RR: &[u8] =
        b"\x07example\x04test\x00\x00\x01\x00\x01\x00\x00\x0e\x10\x00\x04\x7f\x00\x00\x01";

    /// Signs `packet` with `server`, fixes up its ARCOUNT, and opens
    /// the server's next digest window.
    fn sign_response(server: &mut TsigState, packet: &mut Vec<u8>) {
        let len = packet.len();
        server.update(packet, len);
        server.sign(now());
        server.append_rr(packet);
        set_arcount(packet, 1);
        server.prepare();
    }

    /// Runs the client-side packet check: find, strip, digest, verify.
    fn client_accepts(client: &mut TsigState, packet: &mut Vec<u8>) -> bool {
        client.find_rr(packet).unwrap();
        match client.status() {
            Status::NotPresent => {
                let len = packet.len();
                client.update(packet, len);
                true
            }
            Status::Ok => {
                let arcount = u16::from_be_bytes(packet[10..12].try_into().unwrap());
                set_arcount(packet, arcount - 1);
                let position = client.position();
                client.update(packet, position);
                let ok = client.verify();
                if ok {
                    client.prepare();
                }
                ok
            }
            Status::Error => false,
        }
    }

    #[test]
    fn algorithm_lookup_works() {
        let md5_name: Box<Name> = "HMAC-MD5.SIG-ALG.REG.INT.".parse().unwrap();
        assert_eq!(
            Algorithm::from_wire_name(&md5_name),
            Some(Algorithm::HmacMd5)
        );
        assert_eq!(
            Algorithm::from_mnemonic("hmac-sha256"),
            Some(Algorithm::HmacSha256)
        );
        assert_eq!(Algorithm::from_mnemonic("hmac-sha512"), None);
    }

    #[test]
    fn single_response_sign_and_verify_work() {
        let (query, mut client) = signed_query();
        let mut server = server_accepting(&query);

        client.prepare();
        let mut response = response_packet(ANSWER_RR);
        sign_response(&mut server, &mut response);
        assert!(client_accepts(&mut client, &mut response));
        assert_eq!(client.response_count(), 1);
    }

    #[test]
    fn verification_rejects_corrupted_response() {
        let (query, mut client) = signed_query();
        let mut server = server_accepting(&query);

        client.prepare();
        let mut response = response_packet(ANSWER_RR);
        sign_response(&mut server, &mut response);
        // Tamper with the answer section.
        response[HEADER_SIZE + 2] ^= 0xff;
        assert!(!client_accepts(&mut client, &mut response));
        assert_eq!(client.status(), Status::Error);
        assert_eq!(client.error_code(), ExtendedRcode::BADSIG);
    }

    #[test]
    fn verification_rejects_wrong_key_name() {
        let (query, mut client) = signed_query();
        let mut server = server_accepting(&query);
        server.key.name = "b.tsig.key.".parse().unwrap();

        client.prepare();
        let mut response = response_packet(ANSWER_RR);
        sign_response(&mut server, &mut response);
        assert!(!client_accepts(&mut client, &mut response));
        assert_eq!(client.status(), Status::Error);
        assert_eq!(client.error_code(), ExtendedRcode::BADKEY);
    }

    #[test]
    fn multi_packet_digest_verifies() {
        // TSIG on packets 1 and 4; packets 2 and 3 ride on the rolling
        // digest.
        let (query, mut client) = signed_query();
        let mut server = server_accepting(&query);

        client.prepare();
        let mut first = response_packet(ANSWER_RR);
        sign_response(&mut server, &mut first);
        assert!(client_accepts(&mut client, &mut first));

        for _ in 0..2 {
            let mut middle = response_packet(ANSWER_RR);
            let len = middle.len();
            server.update(&middle, len);
            assert!(client_accepts(&mut client, &mut middle));
        }

        let mut last = response_packet(ANSWER_RR);
        sign_response(&mut server, &mut last);
        assert!(client_accepts(&mut client, &mut last));
        assert_eq!(client.response_count(), 4);
        assert_eq!(client.updates_since_last_prepare(), 0);
    }

    #[test]
    fn find_rr_reports_absence() {
        let (_, mut client) = signed_query();
        let response = response_packet(ANSWER_RR);
        client.find_rr(&response).unwrap();
        assert_eq!(client.status(), Status::NotPresent);
        assert_eq!(client.position(), 0);
    }

    #[test]
    fn find_rr_rejects_garbage() {
        let (_, mut client) = signed_query();
        let mut response = response_packet(b"\xff\xff");
        response[11] = 1; // claim an additional record
        assert_eq!(client.find_rr(&response), Err(FindRrError));
    }
}
