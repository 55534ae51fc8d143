//! Library for recovering EBU teletext services from MPEG transport stream recordings.
//!
//! The pipeline peels teletext data out of a recorded transport stream layer by layer:
//! 188-byte TS packets on a chosen PID, PES packets reassembled from their payloads, EBU
//! teletext data units inside the PES, and finally bit-reversed 42-byte teletext line
//! packets. A [`teletext::ServiceDecoder`] folds the typed line packets into the full
//! service model of magazines, page carousels, subpages and broadcast service data.
//!
//! # Usage
//! Simply add this crate as a dependency in your `Cargo.toml`.
//!
//! ```toml
//! [dependencies]
//! teletext-io = "~0.1.0"
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::fs::File;
//! use std::io::Read;
//! use teletext_io::output::NullSink;
//! use teletext_io::{Pipeline, PipelineOptions};
//!
//! let mut file = File::open("recording.ts").expect("unable to open!");
//! let mut pipeline = Pipeline::new(PipelineOptions::with_pid(0x893));
//! let mut sink = NullSink::default();
//! let mut chunk = [0_u8; 8192];
//! loop {
//!     let len = file.read(&mut chunk).expect("IO error!");
//!     if len == 0 {
//!         break;
//!     }
//!     pipeline.push(&chunk[..len], &mut sink).expect("sink error!");
//! }
//! let service = pipeline.finish(&mut sink).expect("not a teletext stream!");
//! println!("initial page: {}", service.initial_page());
//! ```

#![deny(missing_docs, unsafe_code)]

use crc::{Crc, Digest, CRC_32_MPEG_2};
use modular_bitfield_msb::prelude::*;
use std::fmt::{self, Display, Formatter};
use std::result;

mod slice_reader;
pub use slice_reader::SliceReader;

mod ts;
pub use ts::{TsPacket, TsReader};

mod pes;
pub use pes::{PesAssembler, PesPacket};

mod psi;
pub use psi::{ScanOutcome, ServiceScanner};

pub mod teletext;

pub mod output;

mod pipeline;
pub use pipeline::{Pipeline, PipelineError, PipelineOptions, PipelineStats};

const CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_MPEG_2);
type CrcDigest = Digest<'static, u32>;

/// Errors that may be encountered while parsing structures out of the transport stream.
///
/// These never escape the pipeline: a failed parse drops the enclosing unit with a
/// one-shot warning, per the recovery rules of the decoder. They are public so that
/// callers driving the low-level parsers directly can inspect failures.
#[derive(Debug)]
pub enum ErrorDetails {
    /// Encountered when a [`SliceReader`] reads out of bounds.
    /// The [`usize`] parameter is the length of the offending read.
    PacketOverrun(usize),
    /// Encountered for inconsistent PSI section parses.
    BadPsiHeader,
    /// Encountered for inconsistent PES header parses.
    BadPesHeader,
    /// Encountered when a PSI section fails CRC check.
    PsiCrcMismatch,
}

/// Error type encapsulating all possible parser errors.
#[derive(Debug)]
pub struct Error {
    /// Byte index within the packet that the error was encountered.
    pub location: usize,
    /// Information about the error.
    pub details: ErrorDetails,
}

/// [`std::result::Result`] alias that uses [`Error`].
pub type Result<T> = result::Result<T, Error>;

/// Fatal conditions reported once the input is exhausted.
///
/// Everything below the stream boundary recovers by dropping data; these are the cases
/// where the run as a whole produced nothing usable and the process exit code should
/// say so.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamError {
    /// No sync-aligned packets were found; the input is not a transport stream.
    NotTransportStream,
    /// The stream was valid but no packet carried the selected PID.
    PidNotMatched(u16),
    /// The PAT pre-pass finished without finding the requested service identifier.
    SidNotFound(u16),
    /// The PMT for the requested service has no teletext elementary stream.
    TeletextPidNotFound(u16),
}

impl Display for StreamError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            StreamError::NotTransportStream => {
                write!(f, "input does not contain a valid transport stream")
            }
            StreamError::PidNotMatched(pid) => {
                write!(f, "no packets found with PID {:#x}", pid)
            }
            StreamError::SidNotFound(sid) => {
                write!(f, "service {} not found in the program association table", sid)
            }
            StreamError::TeletextPidNotFound(sid) => {
                write!(f, "service {} does not carry a teletext stream", sid)
            }
        }
    }
}

impl std::error::Error for StreamError {}

/// TSC information used in a packet's payload.
#[repr(u8)]
#[derive(Debug, PartialEq, Eq, BitfieldSpecifier)]
#[bits = 2]
pub enum TransportScramblingControl {
    /// Not scrambled.
    NotScrambled,
    /// Do not use.
    Reserved,
    /// Scrambled with even key.
    ScrambledEvenKey,
    /// Scrambled with odd key.
    ScrambledOddKey,
}

/// Link-layer header found at the start of every 188-byte MPEG-TS packet.
#[bitfield]
#[derive(Debug)]
pub struct PacketHeader {
    pub sync_byte: B8,
    pub tei: bool,
    pub pusi: bool,
    pub priority: bool,
    pub pid: B13,
    pub tsc: TransportScramblingControl,
    pub has_adaptation_field: bool,
    pub has_payload: bool,
    pub continuity_counter: B4,
}

/// Packets may contain adaptation meta data in addition or in lieu of payload data. This header
/// specifies the particular type(s) of meta-data contained.
#[bitfield]
#[derive(Debug)]
pub struct AdaptationFieldHeader {
    pub length: B8,
    pub discontinuity: bool,
    pub random_access: bool,
    pub priority: bool,
    pub has_pcr: bool,
    pub has_opcr: bool,
    pub has_splice_countdown: bool,
    pub has_transport_private_data: bool,
    pub has_adaptation_field_extension: bool,
}
