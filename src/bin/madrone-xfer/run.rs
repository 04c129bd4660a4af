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

//! Implements the transfer driver: each master server is tried in
//! turn until one of them answers the SOA probe and, if the zone is
//! out of date, serves the transfer.

use std::fmt::Write as _;
use std::fs::File;
use std::io::{self, BufWriter};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::process;

use anyhow::{Context, Result};
use env_logger::Env;
use log::{error, info, warn};

use madrone::db::ZoneDb;
use madrone::rr::Record;
use madrone::tsig::{keyfile, Key, TsigState};
use madrone::xfr::{Probe, RecordSink, XfrConfig, XfrState};
use madrone::zone_file;

use crate::args::Args;

/// Exit codes, following the convention of the BIND 8 named-xfer
/// tool.
const XFER_UP_TO_DATE: i32 = 0;
const XFER_SUCCESS: i32 = 1;
const XFER_FAIL: i32 = 3;

/// Runs the transfer and exits.
pub fn run(args: Args) -> ! {
    let default_level = match args.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::init_from_env(Env::new().default_filter_or(default_level));

    let code = match try_running(&args) {
        Ok(code) => code,
        Err(e) => {
            let mut message = String::from("Failed to run:");
            for (i, cause) in e.chain().enumerate() {
                write!(message, "\n[{}] {}", i + 1, cause).unwrap();
            }
            error!("{}", message);
            XFER_FAIL
        }
    };
    process::exit(code);
}

fn try_running(args: &Args) -> Result<i32> {
    let key = args
        .tsig_info
        .as_deref()
        .map(keyfile::read)
        .transpose()
        .context("failed to read TSIG key file")?;

    for server in &args.servers {
        let addrs = match resolve(server, args) {
            Ok(addrs) => addrs,
            Err(e) => {
                warn!("skipping bad address {}: {}", server, e);
                continue;
            }
        };
        for addr in addrs {
            match try_master(server, addr, args, key.as_ref()) {
                Ok(code) => return Ok(code),
                Err(e) => {
                    warn!("transfer from {} ({}) failed: {}", server, addr, e);
                }
            }
        }
    }

    error!("cannot contact an authoritative server, zone NOT transferred");
    Ok(XFER_FAIL)
}

/// Resolves a server name to socket addresses, honoring the address
/// family options.
fn resolve(server: &str, args: &Args) -> io::Result<Vec<SocketAddr>> {
    let addrs = (server, args.port).to_socket_addrs()?;
    Ok(addrs
        .filter(|addr| {
            if args.ipv4 {
                addr.is_ipv4()
            } else if args.ipv6 {
                addr.is_ipv6()
            } else {
                true
            }
        })
        .collect())
}

/// Attempts the probe-then-transfer sequence against one master
/// address.
fn try_master(server: &str, addr: SocketAddr, args: &Args, key: Option<&Key>) -> Result<i32> {
    let socket = TcpStream::connect(addr)
        .with_context(|| format!("cannot connect to {}", server))?;
    let tsig = key.cloned().map(TsigState::new);
    let mut state = XfrState::new(
        socket,
        args.zone.clone(),
        args.serial,
        tsig,
        XfrConfig::default(),
    );

    match state.check_serial().context("SOA probe failed")? {
        Probe::UpToDate => {
            info!(
                "zone {} is up to date (serial {})",
                args.zone,
                state.zone_serial(),
            );
            Ok(XFER_UP_TO_DATE)
        }
        Probe::Newer => {
            info!(
                "send AXFR query to {} for {} (serial {})",
                server,
                args.zone,
                state.zone_serial(),
            );
            let mut sink = open_sinks(&state, server, args)?;
            state.axfr(&mut sink).context("AXFR failed")?;
            sink.finish().context("failed to finish zone output")?;

            let (rr_count, packets, bytes) = state.stats();
            info!(
                "received {} RRs in {} bytes (using {} response packets)",
                rr_count, bytes, packets,
            );
            Ok(XFER_SUCCESS)
        }
    }
}

/// Opens the zone-file writer (and the zone database, if requested)
/// and writes the file header.
fn open_sinks(state: &XfrState, server: &str, args: &Args) -> Result<Sinks> {
    let file = File::create(&args.file).with_context(|| {
        format!(
            "cannot open or create zone file '{}' for writing",
            args.file.display(),
        )
    })?;
    let mut writer = zone_file::Writer::new(BufWriter::new(file));
    writer
        .write_header(
            &args.zone,
            args.serial,
            server,
            state.tsig().map(|tsig| &*tsig.key().name),
        )
        .context("failed to write zone file header")?;

    let db = args
        .db
        .as_deref()
        .map(ZoneDb::create)
        .transpose()
        .context("failed to create zone database")?;

    Ok(Sinks { writer, db })
}

/// The transfer tool's record sink: the zone file, plus optionally the
/// zone database.
struct Sinks {
    writer: zone_file::Writer<BufWriter<File>>,
    db: Option<ZoneDb>,
}

impl Sinks {
    fn finish(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        if let Some(ref db) = self.db {
            db.sync()?;
        }
        Ok(())
    }
}

impl RecordSink for Sinks {
    fn record(&mut self, record: &Record) -> io::Result<()> {
        self.writer.record(record)?;
        if let Some(ref mut db) = self.db {
            db.record(record)?;
        }
        Ok(())
    }
}
