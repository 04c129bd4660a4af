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

//! Implements command-line argument parsing.

use std::path::PathBuf;

use clap::{ArgAction, Parser};

use madrone::name::Name;

/// Parses the command line arguments.
pub fn parse() -> Args {
    Args::parse()
}

/// The Madrone AXFR client
#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Args {
    /// The name of the zone to transfer
    #[arg(short, long, value_name = "NAME")]
    pub zone: Box<Name>,

    /// The output zone file name
    #[arg(short, long, value_name = "FILE")]
    pub file: PathBuf,

    /// Also materialize the zone into an on-disk zone database
    #[arg(long, value_name = "FILE")]
    pub db: Option<PathBuf>,

    /// The port to connect to
    #[arg(short, long, default_value_t = 53, value_name = "PORT")]
    pub port: u16,

    /// The current zone serial; omit for a first transfer
    #[arg(short, long, value_name = "SERIAL")]
    pub serial: Option<u32>,

    /// The TSIG key file name. The file is removed after reading the
    /// key
    #[arg(short = 'T', long = "tsig-info", value_name = "FILE")]
    pub tsig_info: Option<PathBuf>,

    /// Only use IPv4 connections
    #[arg(short = '4', conflicts_with = "ipv6")]
    pub ipv4: bool,

    /// Only use IPv6 connections
    #[arg(short = '6')]
    pub ipv6: bool,

    /// Verbose output (repeat for more)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// The name or IP address of the master server(s), tried in order
    #[arg(required = true, value_name = "SERVER")]
    pub servers: Vec<String>,
}
