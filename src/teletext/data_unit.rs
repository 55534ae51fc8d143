//! EBU teletext data unit extraction from PES payloads.

use super::coding::reverse;
use crate::PesPacket;
use log::warn;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

/// Stream id carrying DVB teletext (private stream 1).
const STREAM_ID_PRIVATE_1: u8 = 0xbd;
/// Length of one raw teletext packet.
const RAW_PACKET_LEN: usize = 42;

/// Data unit types of interest, per EN 300 472.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
enum DataUnitId {
    NonSubtitle = 0x02,
    Subtitle = 0x03,
}

/// One 42-byte teletext line with every byte bit-reversed into conventional order.
///
/// The line is transmitted least significant bit first; after reversal the most
/// significant bit of each byte is the one that was transmitted first, which is the
/// order all further decoding expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawTeletextPacket([u8; 42]);

impl RawTeletextPacket {
    /// Wraps 42 bytes that are already in bit-reversed order.
    pub fn new(bytes: [u8; 42]) -> Self {
        Self(bytes)
    }

    /// The full 42 bytes.
    pub fn as_bytes(&self) -> &[u8; 42] {
        &self.0
    }

    /// The 40-byte line payload handed to passthrough sinks, skipping the two
    /// metadata bytes in front of the magazine/row address.
    pub fn line(&self) -> &[u8] {
        &self.0[2..]
    }
}

/// Walks PES payloads and isolates the teletext data units within.
pub struct DataUnitExtractor {
    include_subtitles: bool,
    warned_not_teletext: bool,
    warned_identifier: bool,
    warned_overrun: bool,
}

impl DataUnitExtractor {
    /// Creates an extractor; subtitle data units are only passed through when enabled.
    pub fn new(include_subtitles: bool) -> Self {
        Self {
            include_subtitles,
            warned_not_teletext: false,
            warned_identifier: false,
            warned_overrun: false,
        }
    }

    /// Extracts every teletext packet carried by one PES packet.
    pub fn extract(&mut self, pes: &PesPacket) -> Vec<RawTeletextPacket> {
        if pes.stream_id() != STREAM_ID_PRIVATE_1 {
            if !self.warned_not_teletext {
                self.warned_not_teletext = true;
                warn!("the selected PID is not a teletext service");
            }
            return Vec::new();
        }

        let data = pes.elementary_data();
        if data.is_empty() || !(0x10..=0x1f).contains(&data[0]) {
            if !self.warned_identifier {
                self.warned_identifier = true;
                warn!("PES payload does not carry an EBU data identifier");
            }
            return Vec::new();
        }

        let mut packets = Vec::new();
        let mut remaining = &data[1..];
        while remaining.len() >= 2 {
            let unit_length = remaining[1] as usize;
            if unit_length > remaining.len() - 2 {
                if !self.warned_overrun {
                    self.warned_overrun = true;
                    warn!("data unit length exceeds its PES payload");
                }
                break;
            }
            let wanted = match DataUnitId::from_u8(remaining[0]) {
                Some(DataUnitId::NonSubtitle) => true,
                Some(DataUnitId::Subtitle) => self.include_subtitles,
                None => false,
            };
            if wanted && unit_length >= RAW_PACKET_LEN {
                let mut bytes = [0_u8; RAW_PACKET_LEN];
                for (out, &byte) in bytes.iter_mut().zip(&remaining[2..2 + RAW_PACKET_LEN]) {
                    *out = reverse(byte);
                }
                packets.push(RawTeletextPacket(bytes));
            }
            remaining = &remaining[2 + unit_length..];
        }
        packets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pes::parse_pes;

    fn pes_with_units(stream_id: u8, identifier: u8, units: &[(u8, Vec<u8>)]) -> PesPacket {
        let mut body = vec![0x80, 0x00, 0x00, identifier];
        for (id, payload) in units {
            body.push(*id);
            body.push(payload.len() as u8);
            body.extend_from_slice(payload);
        }
        let mut data = vec![0x00, 0x00, 0x01, stream_id];
        data.extend_from_slice(&(body.len() as u16).to_be_bytes());
        data.extend_from_slice(&body);
        parse_pes(data).unwrap()
    }

    fn line_unit() -> Vec<u8> {
        // Field/line byte, framing code, then an arbitrary 42-byte line padded to the
        // conventional 44-byte unit length.
        let mut unit = vec![0x00, 0xe4];
        unit.extend((0..42_u8).map(|v| v.wrapping_add(1)));
        unit
    }

    #[test]
    fn extracts_and_reverses_lines() {
        let mut extractor = DataUnitExtractor::new(false);
        let pes = pes_with_units(0xbd, 0x10, &[(0x02, line_unit())]);
        let packets = extractor.extract(&pes);
        assert_eq!(packets.len(), 1);
        // The framing code 0xE4 reads 0x27 once reversed.
        assert_eq!(packets[0].as_bytes()[1], 0x27);
        assert_eq!(packets[0].line().len(), 40);
    }

    #[test]
    fn subtitle_units_are_opt_in() {
        let units = [(0x03, line_unit())];
        let pes = pes_with_units(0xbd, 0x10, &units);
        assert!(DataUnitExtractor::new(false).extract(&pes).is_empty());
        assert_eq!(DataUnitExtractor::new(true).extract(&pes).len(), 1);
    }

    #[test]
    fn unknown_units_are_skipped() {
        let mut extractor = DataUnitExtractor::new(true);
        let pes = pes_with_units(
            0xbd,
            0x10,
            &[(0xc3, vec![0xff; 10]), (0x02, line_unit())],
        );
        assert_eq!(extractor.extract(&pes).len(), 1);
    }

    #[test]
    fn overrunning_unit_stops_the_walk() {
        let mut extractor = DataUnitExtractor::new(false);
        let mut truncated = line_unit();
        truncated.truncate(20);
        let mut body = vec![0x80, 0x00, 0x00, 0x10, 0x02, 44];
        body.extend_from_slice(&truncated);
        let mut data = vec![0x00, 0x00, 0x01, 0xbd];
        data.extend_from_slice(&(body.len() as u16).to_be_bytes());
        data.extend_from_slice(&body);
        let pes = parse_pes(data).unwrap();
        assert!(extractor.extract(&pes).is_empty());
    }

    #[test]
    fn non_teletext_stream_yields_nothing() {
        let mut extractor = DataUnitExtractor::new(false);
        let video = pes_with_units(0xe0, 0x10, &[(0x02, line_unit())]);
        assert!(extractor.extract(&video).is_empty());
        let wrong_identifier = pes_with_units(0xbd, 0x47, &[(0x02, line_unit())]);
        assert!(extractor.extract(&wrong_identifier).is_empty());
    }
}
