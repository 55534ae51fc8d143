//! PSI section parsing for the service-id pre-pass.
//!
//! With a DVB service identifier instead of a PID, the file is scanned once for the
//! program association table, then for the service's program map table, looking for an
//! elementary stream carrying a teletext descriptor. The stream is then rewound and
//! decoded with the discovered PID.

use super::{CrcDigest, ErrorDetails, Result, SliceReader, StreamError, TsReader, CRC};
use crate::read_bitfield;
use log::{debug, warn};
use modular_bitfield_msb::prelude::*;
use smallvec::SmallVec;
use std::collections::HashMap;

/// PAT table id.
const TABLE_PAT: u8 = 0x00;
/// PMT table id.
const TABLE_PMT: u8 = 0x02;
/// PES packets containing private data.
const STREAM_TYPE_PRIVATE_PES: u8 = 0x06;
/// EN 300 468 teletext descriptor tag.
const DESCRIPTOR_TELETEXT: u8 = 0x56;

#[bitfield]
#[derive(Debug)]
pub struct PsiHeader {
    pub table_id: B8,
    pub section_syntax_indicator: bool,
    pub private_bit: bool,
    pub reserved_bits: B2,
    #[skip]
    pub unused_bits: B2,
    pub section_length: B10,
}

#[bitfield]
#[derive(Debug)]
pub struct PsiTableSyntax {
    pub table_id_extension: B16,
    pub reserved_bits: B2,
    pub version: B5,
    pub current_next_indicator: bool,
    pub section_num: B8,
    pub last_section_num: B8,
}

#[bitfield]
#[derive(Debug)]
pub struct PatEntry {
    pub program_num: B16,
    pub reserved: B3,
    pub program_map_pid: B13,
}

#[bitfield]
#[derive(Debug)]
pub struct PmtHeader {
    pub reserved: B3,
    pub pcr_pid: B13,
    pub reserved2: B4,
    #[skip]
    pub unused_bits: B2,
    pub program_info_length: B10,
}

#[bitfield]
#[derive(Debug)]
pub struct ElementaryStreamInfoHeader {
    pub stream_type: B8,
    pub reserved: B3,
    pub elementary_pid: B13,
    pub reserved2: B4,
    #[skip]
    pub unused_bits: B2,
    pub es_info_length: B10,
}

#[derive(Debug)]
pub struct Descriptor {
    pub tag: u8,
    pub data: SmallVec<[u8; 8]>,
}

impl Descriptor {
    pub fn new_from_reader(reader: &mut SliceReader) -> Result<Self> {
        let tag_len = reader.read_array_ref::<2>()?;
        let mut data = SmallVec::<[u8; 8]>::new();
        data.extend_from_slice(reader.read(tag_len[1] as usize)?);
        Ok(Self {
            tag: tag_len[0],
            data,
        })
    }
}

struct SectionBuilder {
    header: PsiHeader,
    table_syntax: Option<PsiTableSyntax>,
    data: Vec<u8>,
    remaining: usize,
    hasher: CrcDigest,
}

impl SectionBuilder {
    fn start(reader: &mut SliceReader) -> Result<Self> {
        let pointer_field = reader.read_u8()?;
        reader.skip(pointer_field as usize)?;

        let mut hasher = CRC.digest();
        let header_bytes = reader.read_array_ref::<3>()?;
        hasher.update(header_bytes);
        let header = PsiHeader::from_bytes(*header_bytes);
        let section_length = header.section_length();

        if section_length == 0 {
            return Err(reader.make_error(ErrorDetails::BadPsiHeader));
        }
        let syntax_bytes = reader.read_array_ref::<5>()?;
        hasher.update(syntax_bytes);
        let table_syntax = PsiTableSyntax::from_bytes(*syntax_bytes);

        let table_length = (section_length - 5) as usize;
        if table_length < 4 {
            // Must have length to read at least the CRC32.
            return Err(reader.make_error(ErrorDetails::BadPsiHeader));
        }

        Ok(Self {
            header,
            table_syntax: Some(table_syntax),
            data: Vec::with_capacity(table_length),
            remaining: table_length,
            hasher,
        })
    }

    fn append(&mut self, reader: &mut SliceReader) -> Result<bool> {
        let take = self.remaining.min(reader.remaining_len());
        self.data.extend_from_slice(reader.read(take)?);
        self.remaining -= take;
        Ok(self.remaining == 0)
    }

    fn finish(mut self) -> Result<Vec<u8>> {
        let len_minus_crc = self.data.len() - 4;
        self.hasher.update(&self.data[..len_minus_crc]);
        let actual_hash = self.hasher.finalize();
        let expected_hash = u32::from_be_bytes(
            *SliceReader::new(&self.data[len_minus_crc..]).read_array_ref::<4>()?,
        );
        if expected_hash != actual_hash {
            return Err(crate::Error {
                location: len_minus_crc,
                details: ErrorDetails::PsiCrcMismatch,
            });
        }
        self.data.truncate(len_minus_crc);
        Ok(self.data)
    }

    fn table_id(&self) -> u8 {
        self.header.table_id()
    }

    fn table_id_extension(&self) -> u16 {
        self.table_syntax
            .as_ref()
            .map(|syntax| syntax.table_id_extension())
            .unwrap_or(0)
    }
}

/// Outcome of a completed pre-pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// The service carries teletext on this PID.
    TeletextPid(u16),
    /// The service id never appeared in a program association table.
    SidNotFound,
    /// The service exists but its map table lists no teletext stream.
    TeletextNotFound,
}

/// Pre-pass scanner resolving a DVB service id to its teletext PID.
pub struct ServiceScanner {
    sid: u16,
    reader: TsReader,
    pending: HashMap<u16, SectionBuilder>,
    pmt_pid: Option<u16>,
    teletext_pid: Option<u16>,
    warned_bad_section: bool,
}

impl ServiceScanner {
    /// Creates a scanner for one service id.
    pub fn new(sid: u16) -> Self {
        Self {
            sid,
            reader: TsReader::new(None),
            pending: HashMap::new(),
            pmt_pid: None,
            teletext_pid: None,
            warned_bad_section: false,
        }
    }

    /// Feeds a chunk of the stream. Returns the teletext PID as soon as it is known.
    pub fn push(&mut self, chunk: &[u8]) -> Option<u16> {
        self.reader.push(chunk);
        loop {
            if self.teletext_pid.is_some() {
                return self.teletext_pid;
            }
            let (pid, pusi, payload) = {
                let packet = self.reader.next_packet()?;
                (
                    packet.pid(),
                    packet.payload_unit_start(),
                    packet.payload().to_vec(),
                )
            };
            if pid != 0 && Some(pid) != self.pmt_pid {
                continue;
            }
            if let Err(error) = self.section_data(pid, pusi, &payload) {
                if !self.warned_bad_section {
                    self.warned_bad_section = true;
                    warn!("dropping undecodable PSI section: {:?}", error);
                }
                self.pending.remove(&pid);
            }
        }
    }

    /// Resolves the scan once the input is exhausted.
    pub fn outcome(&self) -> ScanOutcome {
        match (self.teletext_pid, self.pmt_pid) {
            (Some(pid), _) => ScanOutcome::TeletextPid(pid),
            (None, Some(_)) => ScanOutcome::TeletextNotFound,
            (None, None) => ScanOutcome::SidNotFound,
        }
    }

    /// Maps the outcome to the fatal error for this scan, if any.
    pub fn result(&self) -> std::result::Result<u16, StreamError> {
        match self.outcome() {
            ScanOutcome::TeletextPid(pid) => Ok(pid),
            ScanOutcome::SidNotFound => Err(StreamError::SidNotFound(self.sid)),
            ScanOutcome::TeletextNotFound => Err(StreamError::TeletextPidNotFound(self.sid)),
        }
    }

    fn section_data(&mut self, pid: u16, pusi: bool, payload: &[u8]) -> Result<()> {
        let mut reader = SliceReader::new(payload);
        let complete = if pusi {
            // A unit start discards any half-collected section on this PID.
            let mut builder = SectionBuilder::start(&mut reader)?;
            let complete = builder.append(&mut reader)?;
            self.pending.insert(pid, builder);
            complete
        } else {
            match self.pending.get_mut(&pid) {
                Some(builder) => builder.append(&mut reader)?,
                None => return Ok(()),
            }
        };

        if complete {
            let builder = self.pending.remove(&pid).unwrap();
            let table_id = builder.table_id();
            let extension = builder.table_id_extension();
            let data = builder.finish()?;
            if pid == 0 && table_id == TABLE_PAT {
                self.parse_pat(&data)?;
            } else if Some(pid) == self.pmt_pid && table_id == TABLE_PMT && extension == self.sid {
                self.parse_pmt(&data)?;
            }
        }
        Ok(())
    }

    fn parse_pat(&mut self, data: &[u8]) -> Result<()> {
        let mut reader = SliceReader::new(data);
        while reader.remaining_len() >= 4 {
            let entry = PatEntry::from_bytes(*reader.read_array_ref::<4>()?);
            if entry.program_num() == self.sid {
                self.pmt_pid = Some(entry.program_map_pid());
            }
        }
        Ok(())
    }

    fn parse_pmt(&mut self, data: &[u8]) -> Result<()> {
        let mut reader = SliceReader::new(data);
        let header = read_bitfield!(reader, PmtHeader);
        reader.skip(header.program_info_length() as usize)?;
        while reader.remaining_len() > 0 {
            let es_header = read_bitfield!(reader, ElementaryStreamInfoHeader);
            let mut es_reader = reader.new_sub_reader(es_header.es_info_length() as usize)?;
            while es_reader.remaining_len() > 0 {
                let descriptor = Descriptor::new_from_reader(&mut es_reader)?;
                if es_header.stream_type() == STREAM_TYPE_PRIVATE_PES
                    && descriptor.tag == DESCRIPTOR_TELETEXT
                {
                    if descriptor.data.len() >= 3 {
                        debug!(
                            "teletext descriptor language: {}",
                            String::from_utf8_lossy(&descriptor.data[..3])
                        );
                    }
                    self.teletext_pid = Some(es_header.elementary_pid());
                }
            }
        }
        Ok(())
    }
}
