//! Raw line streaming sink.

use super::Sink;
use crate::teletext::{RawTeletextPacket, Service};
use std::io::{self, Write};

/// Lines per transmitted field.
const FIELD_LINES: u64 = 16;
/// A blank line: the payload of an all-zero packet.
const BLANK_LINE: [u8; 40] = [0; 40];

/// Writes the 40-byte payload of every packet in arrival order.
///
/// With field padding enabled, each PES packet's lines are topped up to a full 16-line
/// field with blank lines so that downstream inserters see a continuous frame cadence.
pub struct T42Sink<W: Write> {
    writer: W,
    pad_fields: bool,
    lines: u64,
}

impl<W: Write> T42Sink<W> {
    /// Creates a sink over any writer.
    pub fn new(writer: W, pad_fields: bool) -> Self {
        Self {
            writer,
            pad_fields,
            lines: 0,
        }
    }

    /// Lines written, including padding.
    pub fn lines(&self) -> u64 {
        self.lines
    }
}

impl<W: Write> Sink for T42Sink<W> {
    fn packet(&mut self, packet: &RawTeletextPacket) -> io::Result<()> {
        self.writer.write_all(packet.line())?;
        self.lines += 1;
        Ok(())
    }

    fn unit_end(&mut self) -> io::Result<()> {
        if self.pad_fields {
            while self.lines % FIELD_LINES != 0 {
                self.writer.write_all(&BLANK_LINE)?;
                self.lines += 1;
            }
        }
        Ok(())
    }

    fn finish(&mut self, _service: &Service) -> io::Result<()> {
        self.writer.flush()
    }
}
