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

//! The AXFR client ([RFC 5936]).
//!
//! An [`XfrState`] wraps a TCP connection to one master server. The
//! typical sequence is [`check_serial`](XfrState::check_serial) — a
//! SOA probe comparing the master's zone serial against the last one
//! we hold — followed, if the zone is out of date, by
//! [`axfr`](XfrState::axfr), which streams the full zone and hands
//! each resource record to a [`RecordSink`]. The stream is bracketed
//! by the zone's SOA record: the opening SOA is delivered, and a
//! repeat of it terminates the transfer (the terminator itself is not
//! delivered, and anything after it is discarded).
//!
//! When a [TSIG state machine](crate::tsig::TsigState) is attached,
//! every query is signed and every response participates in the
//! rolling verification digest; see [`crate::tsig`] for the protocol
//! rules. Authentication failures are fatal to the transfer.
//!
//! All socket reads run under a deadline rather than a signal-based
//! watchdog: the read timeout is re-armed before each system call and
//! expiry surfaces as [`Error::Timeout`]. Interrupted system calls
//! are retried; an EOF in the middle of a message is the fatal
//! "connection closed by peer".
//!
//! [RFC 5936]: https://datatracker.ietf.org/doc/html/rfc5936

use std::fmt;
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::{Duration, Instant};

use log::{debug, info};

use crate::class::Class;
use crate::message::constants::HEADER_SIZE;
use crate::message::{self, QueryWriter, Qtype, Question, Rcode, Reader};
use crate::name::Name;
use crate::rr::{Record, Type};
use crate::tsig::{Status, TimeSigned, TsigState};

////////////////////////////////////////////////////////////////////////
// RECORD SINKS                                                       //
////////////////////////////////////////////////////////////////////////

/// A consumer of the records of an AXFR stream.
///
/// The standard sinks are the [zone-file
/// writer](crate::zone_file::Writer) and the [zone
/// database](crate::db::ZoneDb).
pub trait RecordSink {
    fn record(&mut self, record: &Record) -> io::Result<()>;
}

////////////////////////////////////////////////////////////////////////
// CONFIGURATION                                                      //
////////////////////////////////////////////////////////////////////////

/// Tunables for the transfer client.
#[derive(Clone, Debug)]
pub struct XfrConfig {
    /// How long to wait for data from the master before giving up.
    pub timeout: Duration,

    /// The largest response message we are willing to buffer.
    pub max_message_size: usize,

    /// How many consecutive response packets may ride on the rolling
    /// TSIG digest without carrying a TSIG RR themselves.
    pub max_untagged: usize,
}

impl Default for XfrConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            max_message_size: u16::MAX as usize,
            max_untagged: 100,
        }
    }
}

/// The result of a SOA probe.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Probe {
    /// Our serial is current; no transfer is needed.
    UpToDate,

    /// The master has a newer serial (or this is the first transfer).
    Newer,
}

////////////////////////////////////////////////////////////////////////
// TRANSFER STATE                                                     //
////////////////////////////////////////////////////////////////////////

/// The state of a transfer over one TCP connection.
pub struct XfrState {
    socket: TcpStream,
    config: XfrConfig,
    zone: Box<Name>,
    first_transfer: bool,
    last_serial: u32,
    zone_serial: u32,
    tsig: Option<TsigState>,
    query_id: u16,
    qtype: Qtype,
    packet: Vec<u8>,
    done: bool,
    rr_count: u64,
    packets_received: u64,
    bytes_received: u64,
}

impl XfrState {
    /// Creates transfer state over a connected socket. `last_serial`
    /// of [`None`] means this is the zone's first transfer, so any
    /// serial the master offers is newer.
    pub fn new(
        socket: TcpStream,
        zone: Box<Name>,
        last_serial: Option<u32>,
        tsig: Option<TsigState>,
        config: XfrConfig,
    ) -> Self {
        Self {
            socket,
            config,
            zone,
            first_transfer: last_serial.is_none(),
            last_serial: last_serial.unwrap_or(0),
            zone_serial: 0,
            tsig,
            query_id: 0,
            qtype: Qtype::from(Type::SOA),
            packet: Vec::new(),
            done: false,
            rr_count: 0,
            packets_received: 0,
            bytes_received: 0,
        }
    }

    /// Returns the serial the master reported in the SOA probe.
    pub fn zone_serial(&self) -> u32 {
        self.zone_serial
    }

    /// Returns whether this is the zone's first transfer.
    pub fn first_transfer(&self) -> bool {
        self.first_transfer
    }

    /// Returns the serial we held before the transfer.
    pub fn last_serial(&self) -> u32 {
        self.last_serial
    }

    /// Returns the zone name.
    pub fn zone(&self) -> &Name {
        &self.zone
    }

    /// Returns the TSIG state, if a key is attached.
    pub fn tsig(&self) -> Option<&TsigState> {
        self.tsig.as_ref()
    }

    /// Returns (records delivered, response packets, response bytes).
    pub fn stats(&self) -> (u64, u64, u64) {
        (self.rr_count, self.packets_received, self.bytes_received)
    }

    ////////////////////////////////////////////////////////////////////
    // THE SOA PROBE                                                  //
    ////////////////////////////////////////////////////////////////////

    /// Queries the master for the zone's SOA record and compares its
    /// serial against ours.
    pub fn check_serial(&mut self) -> Result<Probe, Error> {
        self.send_query(Qtype::from(Type::SOA))?;
        self.receive_response()?;
        self.validate_response_header(true)?;
        self.check_response_tsig()?;

        let mut reader = Reader::try_from(self.packet.as_slice()).unwrap();
        for _ in 0..reader.qdcount() {
            let question = reader.read_question().map_err(|_| Error::BadRr)?;
            self.check_question(&question)?;
        }
        for _ in 0..reader.ancount() {
            let rr = reader.read_rr().map_err(|_| Error::BadRr)?;
            if rr.rr_type == Type::SOA && rr.class == Class::IN && rr.owner.as_ref() == &*self.zone
            {
                self.zone_serial = rr
                    .rdata
                    .soa_serial()
                    .ok_or(Error::Protocol("malformed SOA RDATA"))?;
                debug!(
                    "zone {} serial at master is {}",
                    self.zone, self.zone_serial
                );
                return if self.first_transfer || self.zone_serial > self.last_serial {
                    Ok(Probe::Newer)
                } else {
                    Ok(Probe::UpToDate)
                };
            }
        }
        Err(Error::Protocol("SOA not found in answer"))
    }

    ////////////////////////////////////////////////////////////////////
    // THE TRANSFER PROPER                                            //
    ////////////////////////////////////////////////////////////////////

    /// Requests a full zone transfer and delivers every record of the
    /// stream (including the opening SOA, excluding the terminating
    /// one) to `sink`.
    pub fn axfr(&mut self, sink: &mut dyn RecordSink) -> Result<(), Error> {
        self.send_query(Qtype::AXFR)?;
        self.done = false;
        self.rr_count = 0;

        while !self.done {
            self.receive_response()?;
            self.validate_response_header(false)?;
            self.check_response_tsig()?;
            self.parse_response(sink)?;
        }

        // The stream is complete, but the rolling digest must not have
        // unverified packets left in it.
        if let Some(ref tsig) = self.tsig {
            if tsig.updates_since_last_prepare() > 0 {
                return Err(Error::Auth(AuthError::MissingTsig));
            }
        }
        info!(
            "transfer of {} complete: {} RRs in {} bytes ({} response packets)",
            self.zone, self.rr_count, self.bytes_received, self.packets_received,
        );
        Ok(())
    }

    /// Reads the answer section of the current packet, delivering
    /// records until the terminating SOA.
    fn parse_response(&mut self, sink: &mut dyn RecordSink) -> Result<(), Error> {
        let packet = std::mem::take(&mut self.packet);
        let result = self.parse_response_inner(&packet, sink);
        self.packet = packet;
        result
    }

    fn parse_response_inner(
        &mut self,
        packet: &[u8],
        sink: &mut dyn RecordSink,
    ) -> Result<(), Error> {
        let mut reader = Reader::try_from(packet).unwrap();
        for _ in 0..reader.qdcount() {
            let question = reader.read_question().map_err(|_| Error::BadRr)?;
            self.check_question(&question)?;
        }

        for _ in 0..reader.ancount() {
            let rr = reader.read_rr().map_err(|_| Error::BadRr)?;
            let is_zone_soa = rr.rr_type == Type::SOA
                && rr.class == Class::IN
                && rr.owner.as_ref() == &*self.zone;
            if self.rr_count == 0 {
                if !is_zone_soa {
                    return Err(Error::Protocol("first RR is not the zone's SOA record"));
                }
            } else if is_zone_soa {
                // The terminating SOA. It is not delivered, and
                // anything after it is discarded.
                self.done = true;
                return Ok(());
            }
            let record = Record {
                owner: rr.owner,
                rr_type: rr.rr_type,
                class: rr.class,
                ttl: rr.ttl,
                rdata: rr.rdata.into_owned(),
            };
            sink.record(&record).map_err(Error::Sink)?;
            self.rr_count += 1;
        }
        Ok(())
    }

    ////////////////////////////////////////////////////////////////////
    // QUERY CONSTRUCTION                                             //
    ////////////////////////////////////////////////////////////////////

    /// Builds, signs, and sends a query for the zone with the given
    /// QTYPE, leaving the TSIG state ready to check responses.
    fn send_query(&mut self, qtype: Qtype) -> Result<(), Error> {
        self.query_id = rand::random();
        self.qtype = qtype;
        let mut writer = QueryWriter::new(self.query_id);
        writer.add_question(&Question {
            qname: self.zone.clone(),
            qtype,
            qclass: Class::IN.into(),
        });
        if let Some(ref mut tsig) = self.tsig {
            tsig.init_query(self.query_id);
            tsig.prepare();
            tsig.update(writer.octets(), writer.len());
            tsig.sign(TimeSigned::now());
            tsig.append_rr(writer.packet_mut());
            writer.set_arcount(1);
        }

        let octets = writer.finish();
        let size = (octets.len() as u16).to_be_bytes();
        self.socket.write_all(&size)?;
        self.socket.write_all(&octets)?;

        if let Some(ref mut tsig) = self.tsig {
            tsig.prepare();
        }
        Ok(())
    }

    ////////////////////////////////////////////////////////////////////
    // RESPONSE RECEPTION AND VALIDATION                              //
    ////////////////////////////////////////////////////////////////////

    /// Reads one length-prefixed response message into the packet
    /// buffer, under the configured deadline.
    fn receive_response(&mut self) -> Result<(), Error> {
        let deadline = Instant::now() + self.config.timeout;
        let mut size_buf = [0; 2];
        read_full(&mut self.socket, &mut size_buf, deadline)?;
        let size = u16::from_be_bytes(size_buf) as usize;
        if size > self.config.max_message_size {
            return Err(Error::OversizedResponse(size));
        }
        self.packet.resize(size, 0);
        read_full(&mut self.socket, &mut self.packet, deadline)?;
        self.packets_received += 1;
        self.bytes_received += 2 + size as u64;
        Ok(())
    }

    /// Validates the current packet's header per the rules shared by
    /// the SOA probe and AXFR responses.
    fn validate_response_header(&self, probe: bool) -> Result<(), Error> {
        if self.packet.len() <= HEADER_SIZE {
            return Err(Error::Protocol("response is too small"));
        }
        let reader = Reader::try_from(self.packet.as_slice()).unwrap();
        if !reader.qr() {
            return Err(Error::Protocol("response is not a response"));
        }
        if reader.tc() {
            return Err(Error::Protocol("response is truncated"));
        }
        if reader.id() != self.query_id {
            return Err(Error::Protocol("response has the wrong ID"));
        }
        if reader.rcode() != Rcode::NOERROR {
            return Err(Error::ErrorResponse(reader.rcode()));
        }
        if probe {
            if reader.qdcount() != 1 {
                return Err(Error::Protocol("question section count not equal to 1"));
            }
        } else if reader.qdcount() > 1 {
            return Err(Error::Protocol("question section count greater than 1"));
        }
        if reader.ancount() == 0 {
            return Err(Error::Protocol("answer section is empty"));
        }
        Ok(())
    }

    /// Checks that an echoed question matches the one we asked.
    fn check_question(&self, question: &Question) -> Result<(), Error> {
        if question.qname.as_ref() != &*self.zone
            || question.qtype != self.qtype
            || question.qclass != Class::IN.into()
        {
            Err(Error::Protocol("response does not match query"))
        } else {
            Ok(())
        }
    }

    /// Runs the per-packet TSIG protocol: packets without a TSIG RR
    /// ride on the rolling digest (up to the configured cap), packets
    /// with one are verified and re-open the digest window. The first
    /// response of a transaction must carry a TSIG RR.
    fn check_response_tsig(&mut self) -> Result<(), Error> {
        let tsig = match self.tsig {
            Some(ref mut tsig) => tsig,
            None => return Ok(()),
        };

        tsig.find_rr(&self.packet)
            .map_err(|_| Error::Protocol("error parsing response"))?;

        if tsig.status() == Status::NotPresent {
            if tsig.response_count() == 0 {
                return Err(Error::Auth(AuthError::MissingTsig));
            }
            if tsig.updates_since_last_prepare() >= self.config.max_untagged {
                return Err(Error::Auth(AuthError::TooManyUntagged));
            }
            let len = self.packet.len();
            tsig.update(&self.packet, len);
            return Ok(());
        }

        // Remove the TSIG RR from the record accounting before the
        // packet is digested.
        let reader = Reader::try_from(self.packet.as_slice()).unwrap();
        let arcount = reader.arcount();
        message::set_arcount(&mut self.packet, arcount - 1);

        if tsig.status() == Status::Error {
            return Err(Error::Auth(AuthError::BadRecord(tsig.error_code())));
        }
        if tsig.error_code() != crate::message::ExtendedRcode::NOERROR {
            return Err(Error::Auth(AuthError::ErrorCode(tsig.error_code())));
        }
        let position = tsig.position();
        tsig.update(&self.packet, position);
        if !tsig.verify() {
            return Err(Error::Auth(AuthError::BadSignature));
        }
        tsig.prepare();
        Ok(())
    }
}

/// Fills `buf` from the socket, retrying interrupts and re-arming the
/// read timeout from the deadline before each read.
fn read_full(socket: &mut TcpStream, buf: &mut [u8], deadline: Instant) -> Result<(), Error> {
    let mut filled = 0;
    while filled < buf.len() {
        let remaining = deadline
            .checked_duration_since(Instant::now())
            .filter(|remaining| !remaining.is_zero())
            .ok_or(Error::Timeout)?;
        socket.set_read_timeout(Some(remaining))?;
        match socket.read(&mut buf[filled..]) {
            Ok(0) => return Err(Error::ConnectionClosed),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Err(Error::Timeout),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => return Err(Error::Timeout),
            Err(e) => return Err(Error::Io(e)),
        }
    }
    Ok(())
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An authentication failure. These are fatal: the transfer is
/// aborted and not retried against the same master.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AuthError {
    /// A required TSIG RR is missing (on the first response of a
    /// transaction, or at the end of the stream).
    MissingTsig,

    /// Too many response packets rode on the rolling digest without a
    /// TSIG RR.
    TooManyUntagged,

    /// The TSIG RR is not acceptable (unknown key or algorithm).
    BadRecord(crate::message::ExtendedRcode),

    /// The MAC did not verify.
    BadSignature,

    /// The master reported a TSIG error.
    ErrorCode(crate::message::ExtendedRcode),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::MissingTsig => f.write_str("required TSIG not present"),
            Self::TooManyUntagged => f.write_str("too many response packets without TSIG"),
            Self::BadRecord(code) => write!(f, "TSIG record is not correct ({})", code),
            Self::BadSignature => f.write_str("TSIG record did not authenticate"),
            Self::ErrorCode(code) => write!(f, "TSIG error code: {}", code),
        }
    }
}

/// An error that aborts the current transfer attempt.
#[derive(Debug)]
pub enum Error {
    /// A fatal socket error.
    Io(io::Error),

    /// No data from the master within the configured timeout.
    Timeout,

    /// The master closed the connection in the middle of a message.
    ConnectionClosed,

    /// The master announced a message larger than we accept.
    OversizedResponse(usize),

    /// The response violates the DNS or AXFR protocol.
    Protocol(&'static str),

    /// A question or record in the response failed to parse.
    BadRr,

    /// The master answered with a non-zero RCODE.
    ErrorResponse(Rcode),

    /// TSIG authentication failed.
    Auth(AuthError),

    /// The record sink failed.
    Sink(io::Error),
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "network error: {}", e),
            Self::Timeout => f.write_str("timeout reading response, server unreachable?"),
            Self::ConnectionClosed => f.write_str("connection closed by peer"),
            Self::OversizedResponse(size) => write!(f, "response size ({}) exceeds maximum", size),
            Self::Protocol(what) => f.write_str(what),
            Self::BadRr => f.write_str("bad RR in response"),
            Self::ErrorResponse(rcode) => write!(f, "error response {}", rcode),
            Self::Auth(e) => e.fmt(f),
            Self::Sink(e) => write!(f, "failed to write zone data: {}", e),
        }
    }
}

impl std::error::Error for Error {}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::net::{TcpListener, TcpStream};
    use std::thread::JoinHandle;

    use super::*;
    use crate::message::constants::*;
    use crate::message::set_arcount;
    use crate::tsig::{Algorithm, Key};

    ////////////////////////////////////////////////////////////////////
    // A SCRIPTED MOCK MASTER                                         //
    ////////////////////////////////////////////////////////////////////

    /// What the mock master does after reading one query.
    enum Step {
        /// Send these answer RRs in one response packet.
        Answer(Vec<Vec<u8>>),

        /// Close the connection after sending the given raw bytes.
        CloseAfterRaw(Vec<u8>),
    }

    struct MockMaster {
        steps: Vec<Vec<Step>>,
        tsig: Option<(Key, Vec<bool>)>,
    }

    /// Runs the mock master on a listener thread and returns the
    /// client's connected socket.
    fn start_master(master: MockMaster) -> (TcpStream, JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = std::thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            let mut tsig = master
                .tsig
                .as_ref()
                .map(|(key, _)| TsigState::new(key.clone()));
            let mut sign_script = master
                .tsig
                .map(|(_, script)| script)
                .unwrap_or_default()
                .into_iter();

            for query_steps in master.steps {
                // Read one query.
                let mut size_buf = [0; 2];
                if socket.read_exact(&mut size_buf).is_err() {
                    return;
                }
                let size = u16::from_be_bytes(size_buf) as usize;
                let mut query = vec![0; size];
                socket.read_exact(&mut query).unwrap();
                let query_id = u16::from_be_bytes(query[0..2].try_into().unwrap());
                let qname_len = Name::skip_compressed(&query, HEADER_SIZE).unwrap();
                let question = query[HEADER_SIZE..HEADER_SIZE + qname_len + 4].to_vec();
                let mut first_packet = true;

                // Accept its TSIG, if we are doing TSIG.
                if let Some(ref mut tsig) = tsig {
                    tsig.init_query(query_id);
                    tsig.find_rr(&query).unwrap();
                    assert_eq!(tsig.status(), Status::Ok);
                    let arcount = u16::from_be_bytes(query[10..12].try_into().unwrap());
                    set_arcount(&mut query, arcount - 1);
                    tsig.prepare();
                    let position = tsig.position();
                    tsig.update(&query, position);
                    assert!(tsig.verify());
                    tsig.prepare();
                }

                for step in query_steps {
                    match step {
                        Step::Answer(answers) => {
                            let mut packet = vec![0; HEADER_SIZE];
                            packet[0..2].copy_from_slice(&query_id.to_be_bytes());
                            packet[QR_BYTE] |= QR_MASK | AA_MASK;
                            // The question is echoed on the first
                            // response packet only; continuation
                            // packets carry none.
                            if first_packet {
                                packet[QDCOUNT_START..QDCOUNT_END]
                                    .copy_from_slice(&1u16.to_be_bytes());
                                packet.extend_from_slice(&question);
                                first_packet = false;
                            }
                            packet[ANCOUNT_START..ANCOUNT_END]
                                .copy_from_slice(&(answers.len() as u16).to_be_bytes());
                            for answer in answers {
                                packet.extend_from_slice(&answer);
                            }
                            if let Some(ref mut tsig) = tsig {
                                if sign_script.next().unwrap_or(true) {
                                    let len = packet.len();
                                    tsig.update(&packet, len);
                                    tsig.sign(TimeSigned::now());
                                    tsig.append_rr(&mut packet);
                                    set_arcount(&mut packet, 1);
                                    tsig.prepare();
                                } else {
                                    let len = packet.len();
                                    tsig.update(&packet, len);
                                }
                            }
                            let size = (packet.len() as u16).to_be_bytes();
                            socket.write_all(&size).unwrap();
                            socket.write_all(&packet).unwrap();
                        }
                        Step::CloseAfterRaw(raw) => {
                            socket.write_all(&raw).unwrap();
                            return;
                        }
                    }
                }
            }
        });
        let socket = TcpStream::connect(addr).unwrap();
        (socket, handle)
    }

    ////////////////////////////////////////////////////////////////////
    // RR BUILDERS                                                    //
    ////////////////////////////////////////////////////////////////////

    const ZONE: &str = "example.test.";

    fn rr(owner: &str, rr_type: Type, rdata: &[u8]) -> Vec<u8> {
        let owner: Box<Name> = owner.parse().unwrap();
        let mut octets = owner.wire_repr().to_vec();
        octets.extend_from_slice(&u16::from(rr_type).to_be_bytes());
        octets.extend_from_slice(&u16::from(Class::IN).to_be_bytes());
        octets.extend_from_slice(&3600u32.to_be_bytes());
        octets.extend_from_slice(&(rdata.len() as u16).to_be_bytes());
        octets.extend_from_slice(rdata);
        octets
    }

    fn soa_rdata(serial: u32) -> Vec<u8> {
        let mut octets = Vec::new();
        octets.extend_from_slice(b"\x03ns1\x07example\x04test\x00");
        octets.extend_from_slice(b"\x05admin\x07example\x04test\x00");
        octets.extend_from_slice(&serial.to_be_bytes());
        octets.extend_from_slice(&[0; 16]);
        octets
    }

    fn soa_rr(serial: u32) -> Vec<u8> {
        rr(ZONE, Type::SOA, &soa_rdata(serial))
    }

    fn a_rr() -> Vec<u8> {
        rr("www.example.test.", Type::A, b"\x7f\x00\x00\x01")
    }

    fn ns_rr() -> Vec<u8> {
        rr(ZONE, Type::NS, b"\x03ns1\x07example\x04test\x00")
    }

    /// A sink that collects delivered records.
    #[derive(Default)]
    struct Collector(Vec<Record>);

    impl RecordSink for Collector {
        fn record(&mut self, record: &Record) -> io::Result<()> {
            self.0.push(record.clone());
            Ok(())
        }
    }

    fn state(socket: TcpStream, last_serial: Option<u32>, tsig: Option<TsigState>) -> XfrState {
        XfrState::new(
            socket,
            ZONE.parse().unwrap(),
            last_serial,
            tsig,
            XfrConfig {
                timeout: Duration::from_secs(5),
                ..XfrConfig::default()
            },
        )
    }

    fn test_key() -> Key {
        Key {
            name: "xfer.key.".parse().unwrap(),
            algorithm: Algorithm::HmacMd5,
            secret: b"sosecret".to_vec(),
            server: "127.0.0.1".parse().unwrap(),
        }
    }

    ////////////////////////////////////////////////////////////////////
    // SCENARIOS                                                      //
    ////////////////////////////////////////////////////////////////////

    #[test]
    fn probe_detects_up_to_date_zone() {
        let (socket, handle) = start_master(MockMaster {
            steps: vec![vec![Step::Answer(vec![soa_rr(5)])]],
            tsig: None,
        });
        let mut state = state(socket, Some(5), None);
        assert_eq!(state.check_serial().unwrap(), Probe::UpToDate);
        assert_eq!(state.zone_serial(), 5);
        drop(state);
        handle.join().unwrap();
    }

    #[test]
    fn newer_serial_transfers_and_consumes_trailing_soa() {
        let (socket, handle) = start_master(MockMaster {
            steps: vec![
                vec![Step::Answer(vec![soa_rr(7)])],
                vec![Step::Answer(vec![soa_rr(7), a_rr(), ns_rr(), soa_rr(7)])],
            ],
            tsig: None,
        });
        let mut state = state(socket, Some(5), None);
        assert_eq!(state.check_serial().unwrap(), Probe::Newer);

        let mut collector = Collector::default();
        state.axfr(&mut collector).unwrap();
        let types: Vec<Type> = collector.0.iter().map(|r| r.rr_type).collect();
        assert_eq!(types, vec![Type::SOA, Type::A, Type::NS]);
        handle.join().unwrap();
    }

    #[test]
    fn stream_not_opening_with_soa_fails() {
        let (socket, handle) = start_master(MockMaster {
            steps: vec![vec![Step::Answer(vec![
                a_rr(),
                soa_rr(7),
                ns_rr(),
                soa_rr(7),
            ])]],
            tsig: None,
        });
        let mut state = state(socket, None, None);
        let mut collector = Collector::default();
        assert!(matches!(
            state.axfr(&mut collector),
            Err(Error::Protocol("first RR is not the zone's SOA record")),
        ));
        drop(state);
        let _ = handle.join();
    }

    #[test]
    fn connection_closed_mid_message_is_fatal() {
        // The master announces a 100-octet message but sends only a
        // header's worth before closing.
        let mut raw = 100u16.to_be_bytes().to_vec();
        raw.extend_from_slice(&[0; 12]);
        let (socket, handle) = start_master(MockMaster {
            steps: vec![vec![Step::CloseAfterRaw(raw)]],
            tsig: None,
        });
        let mut state = state(socket, None, None);
        let mut collector = Collector::default();
        assert!(matches!(
            state.axfr(&mut collector),
            Err(Error::ConnectionClosed),
        ));
        drop(state);
        let _ = handle.join();
    }

    #[test]
    fn missing_tsig_on_first_response_fails() {
        // The master knows the key (the query verifies) but never
        // signs its responses.
        let (socket, handle) = start_master(MockMaster {
            steps: vec![vec![Step::Answer(vec![
                soa_rr(7),
                a_rr(),
                soa_rr(7),
            ])]],
            tsig: Some((test_key(), vec![false])),
        });
        let tsig = TsigState::new(test_key());
        let mut state = state(socket, None, Some(tsig));
        let mut collector = Collector::default();
        assert!(matches!(
            state.axfr(&mut collector),
            Err(Error::Auth(AuthError::MissingTsig)),
        ));
        drop(state);
        let _ = handle.join();
    }

    #[test]
    fn tsig_on_first_and_last_packet_only_verifies() {
        let (socket, handle) = start_master(MockMaster {
            steps: vec![vec![
                Step::Answer(vec![soa_rr(7), a_rr()]),
                Step::Answer(vec![a_rr()]),
                Step::Answer(vec![ns_rr(), soa_rr(7)]),
            ]],
            // Sign packets 1 and 3 but not 2.
            tsig: Some((test_key(), vec![true, false, true])),
        });
        let tsig = TsigState::new(test_key());
        let mut state = state(socket, None, Some(tsig));
        let mut collector = Collector::default();
        state.axfr(&mut collector).unwrap();
        assert_eq!(collector.0.len(), 4);
        handle.join().unwrap();
    }

    #[test]
    fn unsigned_final_packet_fails() {
        let (socket, handle) = start_master(MockMaster {
            steps: vec![vec![
                Step::Answer(vec![soa_rr(7), a_rr()]),
                Step::Answer(vec![ns_rr(), soa_rr(7)]),
            ]],
            tsig: Some((test_key(), vec![true, false])),
        });
        let tsig = TsigState::new(test_key());
        let mut state = state(socket, None, Some(tsig));
        let mut collector = Collector::default();
        assert!(matches!(
            state.axfr(&mut collector),
            Err(Error::Auth(AuthError::MissingTsig)),
        ));
        drop(state);
        let _ = handle.join();
    }

    #[test]
    fn untagged_packet_cap_is_enforced() {
        // With a cap of 2, a third consecutive unsigned packet is
        // rejected even though the digest would still verify.
        let (socket, handle) = start_master(MockMaster {
            steps: vec![vec![
                Step::Answer(vec![soa_rr(7), a_rr()]),
                Step::Answer(vec![a_rr()]),
                Step::Answer(vec![a_rr()]),
                Step::Answer(vec![a_rr()]),
                Step::Answer(vec![ns_rr(), soa_rr(7)]),
            ]],
            tsig: Some((test_key(), vec![true, false, false, false, true])),
        });
        let tsig = TsigState::new(test_key());
        let mut state = XfrState::new(
            socket,
            ZONE.parse().unwrap(),
            None,
            Some(tsig),
            XfrConfig {
                timeout: Duration::from_secs(5),
                max_untagged: 2,
                ..XfrConfig::default()
            },
        );
        let mut collector = Collector::default();
        assert!(matches!(
            state.axfr(&mut collector),
            Err(Error::Auth(AuthError::TooManyUntagged)),
        ));
        drop(state);
        let _ = handle.join();
    }

    #[test]
    fn error_rcode_fails_the_probe() {
        let mut packet = vec![0; HEADER_SIZE + 1];
        let (socket, handle) = {
            // Craft a REFUSED response by hand.
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            let addr = listener.local_addr().unwrap();
            let handle = std::thread::spawn(move || {
                let (mut socket, _) = listener.accept().unwrap();
                let mut size_buf = [0; 2];
                socket.read_exact(&mut size_buf).unwrap();
                let mut query = vec![0; u16::from_be_bytes(size_buf) as usize];
                socket.read_exact(&mut query).unwrap();
                packet[0..2].copy_from_slice(&query[0..2]);
                packet[QR_BYTE] |= QR_MASK;
                packet[RCODE_BYTE] |= u8::from(Rcode::REFUSED);
                let size = (packet.len() as u16).to_be_bytes();
                socket.write_all(&size).unwrap();
                socket.write_all(&packet).unwrap();
            });
            (TcpStream::connect(addr).unwrap(), handle)
        };
        let mut state = state(socket, None, None);
        assert!(matches!(
            state.check_serial(),
            Err(Error::ErrorResponse(Rcode::REFUSED)),
        ));
        drop(state);
        handle.join().unwrap();
    }
}
