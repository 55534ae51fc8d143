//! The complete decode pipeline, from raw stream bytes to the service model.

use super::{PesAssembler, StreamError, TsReader};
use crate::output::Sink;
use crate::teletext::{DataUnitExtractor, Service, ServiceDecoder};
use std::fmt::{self, Display, Formatter};
use std::io;

/// Configuration for a decode run.
#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    /// PID carrying the teletext elementary stream.
    pub pid: u16,
    /// Whether subtitle data units are decoded alongside the page service.
    pub include_subtitles: bool,
}

impl PipelineOptions {
    /// Options for a PID with subtitles excluded.
    pub fn with_pid(pid: u16) -> Self {
        Self {
            pid,
            include_subtitles: false,
        }
    }

    /// Enables or disables subtitle data units.
    pub fn include_subtitles(mut self, include: bool) -> Self {
        self.include_subtitles = include;
        self
    }
}

/// Packet totals of a finished run, for diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct PipelineStats {
    /// Sync-aligned packets seen on any PID.
    pub received: u64,
    /// Packets delivered on the teletext PID.
    pub matched: u64,
}

/// Error type for a decode run: either the stream produced nothing usable, or a sink
/// failed to write.
#[derive(Debug)]
pub enum PipelineError {
    /// The input produced no usable packets; see [`StreamError`].
    Stream(StreamError),
    /// A sink failed.
    Io(io::Error),
}

impl Display for PipelineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Stream(error) => Display::fmt(error, f),
            PipelineError::Io(error) => Display::fmt(error, f),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<StreamError> for PipelineError {
    fn from(error: StreamError) -> Self {
        PipelineError::Stream(error)
    }
}

impl From<io::Error> for PipelineError {
    fn from(error: io::Error) -> Self {
        PipelineError::Io(error)
    }
}

/// Synchronous decode pipeline: transport packets on one PID, PES reassembly, data unit
/// extraction, then service assembly, with raw packets forwarded to the sink as they
/// appear.
pub struct Pipeline {
    pid: u16,
    reader: TsReader,
    assembler: PesAssembler,
    extractor: DataUnitExtractor,
    decoder: ServiceDecoder,
}

impl Pipeline {
    /// Creates a pipeline for one teletext PID.
    pub fn new(options: PipelineOptions) -> Self {
        Self {
            pid: options.pid,
            reader: TsReader::new(Some(options.pid)),
            assembler: PesAssembler::new(),
            extractor: DataUnitExtractor::new(options.include_subtitles),
            decoder: ServiceDecoder::new(),
        }
    }

    /// Feeds one chunk of the input stream, forwarding extracted packets to the sink.
    pub fn push<S: Sink>(&mut self, chunk: &[u8], sink: &mut S) -> io::Result<()> {
        self.reader.push(chunk);
        while let Some(ts_packet) = self.reader.next_packet() {
            for pes in self.assembler.push(&ts_packet) {
                for raw in self.extractor.extract(&pes) {
                    self.decoder.push_raw(&raw);
                    sink.packet(&raw)?;
                }
                sink.unit_end()?;
            }
        }
        Ok(())
    }

    /// Packet totals so far.
    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            received: self.reader.received(),
            matched: self.reader.matched(),
        }
    }

    /// A look at the service recovered so far.
    pub fn service(&self) -> &Service {
        self.decoder.service()
    }

    /// Ends the input, validates that the stream was usable, hands the finished service
    /// to the sink and returns it.
    pub fn finish<S: Sink>(mut self, sink: &mut S) -> Result<Service, PipelineError> {
        if let Some(pes) = self.assembler.finish() {
            for raw in self.extractor.extract(&pes) {
                self.decoder.push_raw(&raw);
                sink.packet(&raw)?;
            }
            sink.unit_end()?;
        }

        if self.reader.received() == 0 {
            return Err(StreamError::NotTransportStream.into());
        }
        if self.reader.matched() == 0 {
            return Err(StreamError::PidNotMatched(self.pid).into());
        }

        let service = self.decoder.finish();
        sink.finish(&service)?;
        Ok(service)
    }
}
