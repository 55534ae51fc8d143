//! Output sinks consuming the recovered service.
//!
//! Streaming sinks see every raw teletext packet in arrival order; serialising sinks
//! work from the finished [`Service`] model handed over when the input is exhausted.

use crate::teletext::{RawTeletextPacket, Service};
use enum_dispatch::enum_dispatch;
use std::fs::File;
use std::io::{self, Stdout};

mod t42;
pub use t42::T42Sink;

mod tti;
pub use tti::TtiSink;

/// Consumer of the decode pipeline's output.
#[enum_dispatch]
pub trait Sink {
    /// Receives one raw packet as it is extracted from the stream.
    fn packet(&mut self, packet: &RawTeletextPacket) -> io::Result<()>;

    /// Marks the end of one PES packet, i.e. one transmitted field of lines.
    fn unit_end(&mut self) -> io::Result<()>;

    /// Receives the finished service once the input is exhausted.
    fn finish(&mut self, service: &Service) -> io::Result<()>;
}

/// Sink that discards everything; used when only the decoded model is wanted.
#[derive(Debug, Default)]
pub struct NullSink {
    packets: u64,
}

impl NullSink {
    /// Count of packets that passed through.
    pub fn packets(&self) -> u64 {
        self.packets
    }
}

impl Sink for NullSink {
    fn packet(&mut self, _packet: &RawTeletextPacket) -> io::Result<()> {
        self.packets += 1;
        Ok(())
    }

    fn unit_end(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn finish(&mut self, _service: &Service) -> io::Result<()> {
        Ok(())
    }
}

/// Line streaming sink backed by a file.
pub type FileLineSink = T42Sink<File>;
/// Line streaming sink backed by standard output.
pub type StdoutLineSink = T42Sink<Stdout>;

/// The runtime-selected output sink.
#[enum_dispatch(Sink)]
pub enum Output {
    /// TTI page files, one per carousel.
    Tti(TtiSink),
    /// Raw 40-byte lines to a file.
    T42(FileLineSink),
    /// Raw 40-byte lines to standard output.
    StdOut(StdoutLineSink),
    /// Discard.
    Null(NullSink),
}
