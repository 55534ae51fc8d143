//! PES packet reassembly from transport stream payloads on one PID.

use super::{ErrorDetails, Result, SliceReader, TsPacket};
use crate::read_bitfield;
use log::warn;
use modular_bitfield_msb::prelude::*;
use smallvec::SmallVec;
use std::fmt::{Debug, Formatter};

/// Fixed header beginning every PES packet.
#[bitfield]
#[derive(Debug)]
pub struct PesHeader {
    pub start_code: B24,
    pub stream_id: B8,
    pub packet_length: B16,
}

/// Optional header extension present for most stream ids.
#[bitfield]
#[derive(Debug)]
pub struct PesOptionalHeader {
    pub marker_bits: B2,
    pub scrambling_control: B2,
    pub priority: bool,
    pub data_alignment_indicator: bool,
    pub copyright: bool,
    pub original: bool,
    pub has_pts: bool,
    pub has_dts: bool,
    pub escr: bool,
    pub es_rate: bool,
    pub dsm_trick_mode: bool,
    pub has_additional_copy_info: bool,
    pub has_crc: bool,
    pub has_extension: bool,
    pub additional_header_length: B8,
}

/// One fully reassembled PES packet.
pub struct PesPacket {
    stream_id: u8,
    declared_length: u16,
    optional_header_length: Option<usize>,
    data: Vec<u8>,
}

impl PesPacket {
    /// Stream id from the PES header, e.g. 0xBD for private stream 1.
    pub fn stream_id(&self) -> u8 {
        self.stream_id
    }

    /// `PES_packet_length` as declared in the header; 0 means unbounded.
    pub fn declared_length(&self) -> u16 {
        self.declared_length
    }

    /// True when the optional header is present.
    pub fn optional_header_present(&self) -> bool {
        self.optional_header_length.is_some()
    }

    /// Length of the variable part of the optional header.
    pub fn optional_header_length(&self) -> usize {
        self.optional_header_length.unwrap_or(0)
    }

    /// Complete packet bytes, including the 6-byte header.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Elementary stream bytes following all headers.
    pub fn elementary_data(&self) -> &[u8] {
        let offset = match self.optional_header_length {
            Some(length) => 9 + length,
            None => 6,
        };
        &self.data[offset..]
    }
}

impl Debug for PesPacket {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PesPacket")
            .field("stream_id", &self.stream_id)
            .field("declared_length", &self.declared_length)
            .field("optional_header_length", &self.optional_header_length)
            .field("data.len()", &self.data.len())
            .finish()
    }
}

pub(crate) fn parse_pes(data: Vec<u8>) -> Result<PesPacket> {
    let mut reader = SliceReader::new(&data);
    let header = read_bitfield!(reader, PesHeader);
    if header.start_code() != 0x000001 {
        return Err(reader.make_error(ErrorDetails::BadPesHeader));
    }

    // ITU-T H.222.0 §2.4.3.6: marker bits of binary 10 at offset 6 introduce the optional
    // header, whose variable length is at offset 8.
    let mut optional_header_length = None;
    if reader.remaining_len() >= 3 {
        let optional = PesOptionalHeader::from_bytes(*reader.peek_array_ref::<3>()?);
        if optional.marker_bits() == 0b10 {
            let length = optional.additional_header_length() as usize;
            if 9 + length > data.len() {
                return Err(reader.make_error(ErrorDetails::BadPesHeader));
            }
            optional_header_length = Some(length);
        }
    }

    Ok(PesPacket {
        stream_id: header.stream_id(),
        declared_length: header.packet_length(),
        optional_header_length,
        data,
    })
}

/// Reassembles PES packets from the payloads of one PID's transport packets.
///
/// A packet with the payload unit start indicator begins a new PES packet, committing any
/// packet still in progress; a bounded PES completes as soon as its declared length has
/// accumulated, while an unbounded one (declared length 0) is closed by the next unit
/// start.
#[derive(Default)]
pub struct PesAssembler {
    pending: Option<Vec<u8>>,
    warned_truncated: bool,
    warned_not_pes: bool,
    warned_orphan: bool,
}

impl PesAssembler {
    /// Creates an idle assembler.
    pub fn new() -> Self {
        Self::default()
    }

    fn commit(&mut self, data: Vec<u8>, out: &mut SmallVec<[PesPacket; 2]>) {
        match parse_pes(data) {
            Ok(pes) => out.push(pes),
            Err(_) => {
                if !self.warned_not_pes {
                    self.warned_not_pes = true;
                    warn!("discarding payload that is not a valid PES packet");
                }
            }
        }
    }

    /// Feeds one transport packet, returning any PES packets completed by it.
    pub fn push(&mut self, packet: &TsPacket) -> SmallVec<[PesPacket; 2]> {
        let mut out = SmallVec::new();

        if packet.payload_unit_start() {
            if let Some(pending) = self.pending.take() {
                if declared_length(&pending) == Some(0) {
                    // Unbounded packets are only delimited by the next unit start.
                    self.commit(pending, &mut out);
                } else if !self.warned_truncated {
                    self.warned_truncated = true;
                    warn!("discarding truncated PES packet");
                }
            }
            self.pending = Some(packet.payload().to_vec());
        } else if let Some(pending) = self.pending.as_mut() {
            pending.extend_from_slice(packet.payload());
        } else if !packet.payload().is_empty() {
            if !self.warned_orphan {
                self.warned_orphan = true;
                warn!("discarding PES continuation with no packet in progress");
            }
        }

        if let Some(pending) = self.pending.as_ref() {
            if let Some(declared) = declared_length(pending) {
                let total = 6 + declared as usize;
                if declared != 0 && pending.len() >= total {
                    let mut data = self.pending.take().unwrap();
                    // Anything beyond the declared length is transport stuffing.
                    data.truncate(total);
                    self.commit(data, &mut out);
                }
            }
        }

        out
    }

    /// Closes out an unbounded PES packet at end of input.
    pub fn finish(&mut self) -> Option<PesPacket> {
        let pending = self.pending.take()?;
        if declared_length(&pending) == Some(0) {
            parse_pes(pending).ok()
        } else {
            // The input ended mid-packet; same truncation class as a unit start
            // arriving early.
            if !self.warned_truncated {
                self.warned_truncated = true;
                warn!("discarding truncated PES packet");
            }
            None
        }
    }
}

fn declared_length(data: &[u8]) -> Option<u16> {
    if data.len() >= 6 {
        Some(u16::from_be_bytes([data[4], data[5]]))
    } else {
        None
    }
}
