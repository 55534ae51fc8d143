//! Typed view of a raw 42-byte teletext packet.

use super::coding::hamming_8_4;
use super::data_unit::RawTeletextPacket;

/// Framing code expected at byte 1 of every line, after bit reversal.
const FRAMING_CODE: u8 = 0x27;

/// Classification of a teletext packet derived from its row address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    /// Row 0: page header, starts a new page.
    Header,
    /// Rows 1-23: displayable page rows.
    PageBody,
    /// Row 24: fastext prompt row.
    Fastext,
    /// Row 25: TOP commentary row.
    TopCommentary,
    /// Row 26: page replacement/enhancement triplets (X/26).
    PageReplacements,
    /// Row 27: fastext and enhancement page links (X/27).
    LinkedPages,
    /// Row 28: page-level enhancement data (X/28).
    PageEnhancements,
    /// Row 29: magazine-level enhancement data (X/29).
    MagazineEnhancements,
    /// Row 30 on magazine 8: broadcast service data (packet 8/30).
    BroadcastServiceData,
    /// Independent data lines and anything else the decoder does not interpret.
    Unspecified,
}

/// One teletext packet parsed out of its 42-byte raw form.
///
/// The framing code and the Hamming-protected magazine/row address are decoded here;
/// the 38 data bytes are kept raw for the downstream page assembly to interpret.
#[derive(Debug, Clone)]
pub struct TeletextPacket {
    packet_type: PacketType,
    magazine: Option<u8>,
    row: Option<u8>,
    data: [u8; 38],
    raw: [u8; 42],
    decoding_error: bool,
}

impl TeletextPacket {
    /// Parses the framing code and magazine/row address of a raw packet.
    pub fn parse(raw: &RawTeletextPacket) -> Self {
        let bytes = raw.as_bytes();
        let mut data = [0_u8; 38];
        data.copy_from_slice(&bytes[4..42]);

        let address1 = hamming_8_4(bytes[2]);
        let address2 = hamming_8_4(bytes[3]);
        if bytes[1] != FRAMING_CODE || address1 == 0xff || address2 == 0xff {
            return Self {
                packet_type: PacketType::Unspecified,
                magazine: None,
                row: None,
                data,
                raw: *bytes,
                decoding_error: true,
            };
        }

        let mut magazine = address1 & 0x07;
        if magazine == 0 {
            magazine = 8;
        }
        let row = (address1 >> 3) | (address2 << 1);

        let packet_type = match row {
            0 => PacketType::Header,
            1..=23 => PacketType::PageBody,
            24 => PacketType::Fastext,
            25 => PacketType::TopCommentary,
            26 => PacketType::PageReplacements,
            27 => PacketType::LinkedPages,
            28 => PacketType::PageEnhancements,
            29 => PacketType::MagazineEnhancements,
            30 if magazine == 8 => PacketType::BroadcastServiceData,
            _ => PacketType::Unspecified,
        };

        Self {
            packet_type,
            magazine: Some(magazine),
            row: Some(row),
            data,
            raw: *bytes,
            decoding_error: false,
        }
    }

    /// Packet classification.
    pub fn packet_type(&self) -> PacketType {
        self.packet_type
    }

    /// Magazine number 1..8, or `None` when the address failed to decode.
    pub fn magazine(&self) -> Option<u8> {
        self.magazine
    }

    /// Row number 0..31, or `None` when the address failed to decode.
    pub fn row(&self) -> Option<u8> {
        self.row
    }

    /// The 38 data bytes following the address.
    pub fn data(&self) -> &[u8; 38] {
        &self.data
    }

    /// The complete 42-byte packet, retained for passthrough sinks.
    pub fn full_packet(&self) -> &[u8; 42] {
        &self.raw
    }

    /// True when the framing code or address could not be decoded.
    pub fn decoding_error(&self) -> bool {
        self.decoding_error
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing;
    use super::*;

    #[test]
    fn parses_magazine_and_row() {
        let packet = testing::packet(3, 7, &[0; 38]);
        assert_eq!(packet.magazine(), Some(3));
        assert_eq!(packet.row(), Some(7));
        assert_eq!(packet.packet_type(), PacketType::PageBody);
        assert!(!packet.decoding_error());
    }

    #[test]
    fn magazine_zero_is_eight() {
        let packet = testing::packet(0, 0, &[0; 38]);
        assert_eq!(packet.magazine(), Some(8));
        assert_eq!(packet.packet_type(), PacketType::Header);
    }

    #[test]
    fn broadcast_service_data_is_magazine_eight_only() {
        let on_eight = testing::packet(0, 30, &[0; 38]);
        assert_eq!(on_eight.packet_type(), PacketType::BroadcastServiceData);
        let elsewhere = testing::packet(2, 30, &[0; 38]);
        assert_eq!(elsewhere.packet_type(), PacketType::Unspecified);
        assert!(!elsewhere.decoding_error());
    }

    fn corrupted(magazine: u8, row: u8, index: usize, mask: u8) -> RawTeletextPacket {
        let mut bytes = *testing::raw_packet(magazine, row, &[0; 38]).as_bytes();
        bytes[index] ^= mask;
        RawTeletextPacket::new(bytes)
    }

    #[test]
    fn bad_framing_is_an_error() {
        let packet = TeletextPacket::parse(&corrupted(1, 1, 1, 0x01));
        assert!(packet.decoding_error());
        assert_eq!(packet.magazine(), None);
    }

    #[test]
    fn single_bit_address_error_is_corrected() {
        let packet = TeletextPacket::parse(&corrupted(5, 12, 2, 0x10));
        assert_eq!(packet.magazine(), Some(5));
        assert_eq!(packet.row(), Some(12));
    }

    #[test]
    fn unrecoverable_address_is_an_error() {
        let packet = TeletextPacket::parse(&corrupted(5, 12, 3, 0x11));
        assert!(packet.decoding_error());
        assert_eq!(packet.row(), None);
    }
}
