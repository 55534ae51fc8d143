//! Transport stream packet recovery from an append-only byte stream.

use super::{AdaptationFieldHeader, PacketHeader, TransportScramblingControl};
use log::warn;

/// Size of one transport stream packet.
pub const PACKET_LEN: usize = 188;
/// Sync byte beginning every packet.
const SYNC_BYTE: u8 = 0x47;
/// Bytes following the 4-byte link-layer header.
const BODY_LEN: usize = PACKET_LEN - 4;
/// PID reserved for null stuffing packets.
const NULL_PID: u16 = 0x1fff;

/// One recovered 188-byte transport stream packet.
///
/// The payload borrows from the reader's internal buffer and is only valid until the next
/// call into the reader.
#[derive(Debug)]
pub struct TsPacket<'a> {
    header: PacketHeader,
    transport_error: bool,
    adaptation_field_size: usize,
    payload: &'a [u8],
}

impl<'a> TsPacket<'a> {
    /// Packet link-layer header.
    pub fn header(&self) -> &PacketHeader {
        &self.header
    }

    /// Packet identifier.
    pub fn pid(&self) -> u16 {
        self.header.pid()
    }

    /// True when a payload unit (PES packet or PSI section) starts in this packet.
    pub fn payload_unit_start(&self) -> bool {
        self.header.pusi()
    }

    /// 4-bit continuity counter.
    pub fn continuity(&self) -> u8 {
        self.header.continuity_counter()
    }

    /// True when the packet arrived with the error indicator set or its adaptation field
    /// was inconsistent with the packet size.
    pub fn transport_error(&self) -> bool {
        self.transport_error
    }

    /// Size of the adaptation field including its length byte, or zero.
    pub fn adaptation_field_size(&self) -> usize {
        self.adaptation_field_size
    }

    /// Payload bytes following the header and any adaptation field.
    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }
}

fn parse_packet(raw: &[u8]) -> TsPacket<'_> {
    let mut header_bytes = [0_u8; 4];
    header_bytes.copy_from_slice(&raw[..4]);
    let header = PacketHeader::from_bytes(header_bytes);

    let mut transport_error = header.tei();
    let mut adaptation_field_size = 0;
    if header.has_adaptation_field() {
        let length = raw[4] as usize;
        adaptation_field_size = 1 + length;
        // An adaptation field at least as large as the packet body leaves no room for the
        // payload the header promises; treat as stream corruption.
        if adaptation_field_size >= BODY_LEN {
            transport_error = true;
            adaptation_field_size = BODY_LEN;
        } else if length >= 1 {
            let adaptation = AdaptationFieldHeader::from_bytes([raw[4], raw[5]]);
            if adaptation.has_pcr() && length < 7 {
                transport_error = true;
            }
            // The PCR value itself is ignored; this pipeline is not real-time.
        }
    }

    let payload = if !transport_error && header.has_payload() {
        &raw[4 + adaptation_field_size..]
    } else {
        &[]
    };

    TsPacket {
        header,
        transport_error,
        adaptation_field_size,
        payload,
    }
}

/// Recovers aligned transport stream packets from arbitrarily sized reads.
///
/// [`TsReader::push`] accepts any chunk size; trailing bytes that do not form a complete
/// packet are carried over to the next call. Synchronisation is found by scanning for the
/// 0x47 sync byte; if a running stream loses sync mid-buffer, the reader falls back to
/// scanning rather than skipping a presumed packet, so no alignable data is lost.
///
/// Only clean packets are yielded: packets with the transport error indicator set and
/// scrambled packets are dropped (each reported once per run), null packets are dropped,
/// and when a target PID is configured every other PID is dropped silently.
pub struct TsReader {
    buf: Vec<u8>,
    pos: usize,
    synced: bool,
    pid: Option<u16>,
    received: u64,
    matched: u64,
    warned_errors: bool,
    warned_scrambled: bool,
}

impl TsReader {
    /// Creates a reader delivering packets for one PID, or all PIDs when `pid` is `None`.
    pub fn new(pid: Option<u16>) -> Self {
        Self {
            buf: Vec::new(),
            pos: 0,
            synced: false,
            pid,
            received: 0,
            matched: 0,
            warned_errors: false,
            warned_scrambled: false,
        }
    }

    /// Appends a chunk of the input stream.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Total count of sync-aligned packets seen, before any filtering.
    pub fn received(&self) -> u64 {
        self.received
    }

    /// Count of packets delivered on the target PID.
    pub fn matched(&self) -> u64 {
        self.matched
    }

    fn compact(&mut self) {
        if self.pos > 0 {
            self.buf.drain(..self.pos);
            self.pos = 0;
        }
    }

    /// Yields the next clean packet, or `None` once the buffered data is exhausted.
    ///
    /// Returning `None` compacts the internal buffer down to the unconsumed residual.
    pub fn next_packet(&mut self) -> Option<TsPacket<'_>> {
        let start = loop {
            if !self.synced {
                match self.buf[self.pos..].iter().position(|&b| b == SYNC_BYTE) {
                    Some(offset) => {
                        self.pos += offset;
                        if self.buf.len() - self.pos < PACKET_LEN {
                            self.compact();
                            return None;
                        }
                        self.synced = true;
                    }
                    None => {
                        // No sync byte anywhere in the residue; nothing worth keeping.
                        self.pos = self.buf.len();
                        self.compact();
                        return None;
                    }
                }
            }

            if self.buf.len() - self.pos < PACKET_LEN {
                self.compact();
                return None;
            }
            if self.buf[self.pos] != SYNC_BYTE {
                // Sync lost mid-stream; rescan instead of skipping a presumed packet.
                self.synced = false;
                continue;
            }

            let start = self.pos;
            self.pos += PACKET_LEN;
            self.received += 1;

            let accepted = {
                let packet = parse_packet(&self.buf[start..start + PACKET_LEN]);

                if packet.transport_error() {
                    if !self.warned_errors {
                        self.warned_errors = true;
                        warn!("dropping packets with the transport error indicator set");
                    }
                    false
                } else if packet.header().tsc() != TransportScramblingControl::NotScrambled {
                    if !self.warned_scrambled {
                        self.warned_scrambled = true;
                        warn!("dropping scrambled packets");
                    }
                    false
                } else if packet.pid() == NULL_PID {
                    false
                } else if let Some(target) = self.pid {
                    packet.pid() == target
                } else {
                    true
                }
            };

            if accepted {
                break start;
            }
        };

        self.matched += 1;
        Some(parse_packet(&self.buf[start..start + PACKET_LEN]))
    }
}
