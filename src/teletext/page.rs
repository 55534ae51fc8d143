//! Assembly of a single teletext page from its typed packets.

use super::coding::hamming_8_4;
use super::packet::{PacketType, TeletextPacket};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

/// Data bytes carried by one packet after the magazine/row address.
pub const ROW_LEN: usize = 38;
/// Bytes of triplet data following a designation code.
pub const TRIPLET_LEN: usize = ROW_LEN - 1;

/// Page number value meaning "no page"; used as a sentinel for undecodable numbers and
/// time filler headers.
pub const NO_PAGE: &str = "FF";

/// National option character subset selected by the header control bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum NationalOptionSubset {
    /// English (default).
    English,
    /// German.
    German,
    /// Swedish, Finnish and Hungarian.
    SwedishFinnishHungarian,
    /// Italian.
    Italian,
    /// French.
    French,
    /// Portuguese and Spanish.
    PortugueseSpanish,
    /// Czech and Slovak.
    CzechSlovak,
}

impl Default for NationalOptionSubset {
    fn default() -> Self {
        NationalOptionSubset::English
    }
}

/// One fastext link: a three-digit page number and a subcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLink {
    /// Magazine digit plus two-digit page number, e.g. "100".
    pub page: String,
    /// Four-digit hexadecimal subcode; "3F7F" links to any subpage.
    pub subcode: String,
}

/// Subcode wildcard used when a link does not target a specific subpage.
const ANY_SUBCODE: &str = "3F7F";

/// A single teletext page under assembly or stored in a carousel.
///
/// Rows are kept as raw packet data; parity and enhancement decoding is the consuming
/// sink's business.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    magazine: u8,
    number: String,
    subcode: String,
    erase: bool,
    newsflash: bool,
    subtitles: bool,
    suppress_header: bool,
    update: bool,
    interrupted_sequence: bool,
    inhibit_display: bool,
    magazine_serial: bool,
    national_option: NationalOptionSubset,
    rows: [Option<[u8; ROW_LEN]>; 26],
    links: Option<[PageLink; 6]>,
    display_row24: bool,
    enhancement_data: [Option<[u8; TRIPLET_LEN]>; 5],
    replacement_data: [Option<[u8; TRIPLET_LEN]>; 16],
    enhancement_links: [Option<[u8; TRIPLET_LEN]>; 2],
}

impl Page {
    /// Creates an empty page belonging to a magazine.
    pub fn new(magazine: u8) -> Self {
        Self {
            magazine,
            number: NO_PAGE.to_string(),
            subcode: "0000".to_string(),
            erase: false,
            newsflash: false,
            subtitles: false,
            suppress_header: false,
            update: false,
            interrupted_sequence: false,
            inhibit_display: false,
            magazine_serial: false,
            national_option: NationalOptionSubset::default(),
            rows: [None; 26],
            links: None,
            display_row24: false,
            enhancement_data: [None; 5],
            replacement_data: [None; 16],
            enhancement_links: [None; 2],
        }
    }

    /// Magazine this page belongs to, 1..8.
    pub fn magazine(&self) -> u8 {
        self.magazine
    }

    /// Two-digit hexadecimal page number within the magazine.
    pub fn number(&self) -> &str {
        &self.number
    }

    /// Four-digit hexadecimal subcode.
    pub fn subcode(&self) -> &str {
        &self.subcode
    }

    /// Erase flag (C4): the page is to be rebuilt rather than updated.
    pub fn erase(&self) -> bool {
        self.erase
    }

    /// Newsflash flag (C5).
    pub fn newsflash(&self) -> bool {
        self.newsflash
    }

    /// Subtitle flag (C6).
    pub fn subtitles(&self) -> bool {
        self.subtitles
    }

    /// Suppress header flag (C7).
    pub fn suppress_header(&self) -> bool {
        self.suppress_header
    }

    /// Update flag (C8).
    pub fn update(&self) -> bool {
        self.update
    }

    /// Interrupted sequence flag (C9).
    pub fn interrupted_sequence(&self) -> bool {
        self.interrupted_sequence
    }

    /// Inhibit display flag (C10).
    pub fn inhibit_display(&self) -> bool {
        self.inhibit_display
    }

    /// Magazine serial flag (C11) as transmitted in this page's header.
    pub fn magazine_serial(&self) -> bool {
        self.magazine_serial
    }

    /// National option character subset for this page.
    pub fn national_option_subset(&self) -> NationalOptionSubset {
        self.national_option
    }

    /// Raw data of one row, if it has been received.
    pub fn row(&self, row: usize) -> Option<&[u8; ROW_LEN]> {
        self.rows.get(row).and_then(|row| row.as_ref())
    }

    /// All received rows with their row numbers, in row order.
    pub fn rows(&self) -> impl Iterator<Item = (usize, &[u8; ROW_LEN])> {
        self.rows
            .iter()
            .enumerate()
            .filter_map(|(index, row)| row.as_ref().map(|data| (index, data)))
    }

    /// Count of received rows, not counting the header row.
    pub fn used_rows(&self) -> usize {
        self.rows[1..].iter().filter(|row| row.is_some()).count()
    }

    /// The six fastext links, when an X/27/0 packet has been received.
    pub fn links(&self) -> Option<&[PageLink; 6]> {
        self.links.as_ref()
    }

    /// Whether row 24 should be displayed, from the X/27/0 link control byte.
    pub fn display_row24(&self) -> bool {
        self.display_row24
    }

    /// X/28 enhancement triplets for one designation code 0..4.
    pub fn enhancement_data(&self, designation: usize) -> Option<&[u8; TRIPLET_LEN]> {
        self.enhancement_data
            .get(designation)
            .and_then(|data| data.as_ref())
    }

    /// X/26 replacement triplets for one designation code 0..15.
    pub fn replacement_data(&self, designation: usize) -> Option<&[u8; TRIPLET_LEN]> {
        self.replacement_data
            .get(designation)
            .and_then(|data| data.as_ref())
    }

    /// X/27/4 and X/27/5 enhancement link triplets.
    pub fn enhancement_links(&self, index: usize) -> Option<&[u8; TRIPLET_LEN]> {
        self.enhancement_links
            .get(index)
            .and_then(|data| data.as_ref())
    }

    /// Folds one typed packet into the page.
    pub fn add_packet(&mut self, packet: &TeletextPacket) {
        match packet.packet_type() {
            PacketType::Header => self.decode_header(packet),
            PacketType::PageBody | PacketType::Fastext | PacketType::TopCommentary => {
                if let Some(row) = packet.row() {
                    self.rows[row as usize] = Some(*packet.data());
                }
            }
            PacketType::PageReplacements => {
                let designation = hamming_8_4(packet.data()[0]);
                if designation != 0xff {
                    self.replacement_data[designation as usize] =
                        Some(triplet_data(packet.data()));
                }
            }
            PacketType::LinkedPages => match hamming_8_4(packet.data()[0]) {
                0 => self.decode_fastext_links(packet),
                4 => self.enhancement_links[0] = Some(triplet_data(packet.data())),
                5 => self.enhancement_links[1] = Some(triplet_data(packet.data())),
                _ => {}
            },
            PacketType::PageEnhancements => {
                let designation = hamming_8_4(packet.data()[0]);
                if designation <= 4 {
                    self.enhancement_data[designation as usize] =
                        Some(triplet_data(packet.data()));
                }
            }
            _ => {}
        }
    }

    fn decode_header(&mut self, packet: &TeletextPacket) {
        let data = packet.data();

        self.number = page_number(data[0], data[1]);

        let s1 = hamming_8_4(data[2]);
        let s2 = hamming_8_4(data[3]);
        let s3 = hamming_8_4(data[4]);
        let s4 = hamming_8_4(data[5]);
        if let Some(subcode) = subcode_value(s1, s2, s3, s4) {
            self.subcode = format!("{:04X}", subcode);
        }

        // The erase, newsflash and subtitle bits ride inside the subcode nibbles.
        if s2 != 0xff {
            self.erase = s2 & 0x08 != 0;
        }
        if s4 != 0xff {
            self.newsflash = s4 & 0x04 != 0;
            self.subtitles = s4 & 0x08 != 0;
        }

        let control = hamming_8_4(data[6]);
        if control != 0xff {
            self.suppress_header = control & 0x01 != 0;
            self.update = control & 0x02 != 0;
            self.interrupted_sequence = control & 0x04 != 0;
            self.inhibit_display = control & 0x08 != 0;
        }

        let control = hamming_8_4(data[7]);
        if control != 0xff {
            self.magazine_serial = control & 0x01 != 0;
            // The subset index arrives with its first and third bits swapped.
            let subset = (control >> 3) | ((control & 0x04) >> 1) | ((control & 0x02) << 1);
            if let Some(subset) = NationalOptionSubset::from_u8(subset) {
                self.national_option = subset;
            }
        }

        // Blank the eight clock/page-number columns so sinks can overlay their own.
        let mut header_row = *data;
        for byte in header_row[..8].iter_mut() {
            *byte = 0x04;
        }
        self.rows[0] = Some(header_row);
    }

    fn decode_fastext_links(&mut self, packet: &TeletextPacket) {
        let data = packet.data();
        let mut links: [PageLink; 6] = Default::default();
        for (index, link) in links.iter_mut().enumerate() {
            let record = &data[1 + index * 6..7 + index * 6];
            let number = page_number(record[0], record[1]);
            let s1 = hamming_8_4(record[2]);
            let s2 = hamming_8_4(record[3]);
            let s3 = hamming_8_4(record[4]);
            let s4 = hamming_8_4(record[5]);

            // The link magazine is transmitted relative to this page's own magazine.
            let mut magazine = if s2 != 0xff && s4 != 0xff {
                ((s2 >> 3) | ((s4 & 0x0c) >> 1)) ^ (self.magazine % 8)
            } else {
                self.magazine % 8
            };
            if magazine == 0 {
                magazine = 8;
            }

            link.page = format!("{}{}", magazine, number);
            link.subcode = match subcode_value(s1, s2, s3, s4) {
                Some(subcode) => format!("{:04X}", subcode),
                None => ANY_SUBCODE.to_string(),
            };
        }
        self.links = Some(links);

        let control = hamming_8_4(data[37]);
        if control != 0xff {
            self.display_row24 = control & 0x08 != 0;
        }
    }

    /// Overlays another transmission of this page onto the stored one.
    ///
    /// Scalar flags and link arrays are adopted wholesale from the newer page; rows and
    /// designation-indexed data are overwritten only where the newer page has content.
    pub fn merge(&mut self, other: Page) {
        self.number = other.number;
        self.subcode = other.subcode;
        self.erase = other.erase;
        self.newsflash = other.newsflash;
        self.subtitles = other.subtitles;
        self.suppress_header = other.suppress_header;
        self.update = other.update;
        self.interrupted_sequence = other.interrupted_sequence;
        self.inhibit_display = other.inhibit_display;
        self.magazine_serial = other.magazine_serial;
        self.national_option = other.national_option;
        self.links = other.links;
        self.display_row24 = other.display_row24;
        self.enhancement_links = other.enhancement_links;
        for (row, incoming) in self.rows.iter_mut().zip(other.rows.iter()) {
            if incoming.is_some() {
                *row = *incoming;
            }
        }
        for (data, incoming) in self
            .enhancement_data
            .iter_mut()
            .zip(other.enhancement_data.iter())
        {
            if incoming.is_some() {
                *data = *incoming;
            }
        }
        for (data, incoming) in self
            .replacement_data
            .iter_mut()
            .zip(other.replacement_data.iter())
        {
            if incoming.is_some() {
                *data = *incoming;
            }
        }
    }
}

impl Default for PageLink {
    fn default() -> Self {
        Self {
            page: NO_PAGE.to_string(),
            subcode: ANY_SUBCODE.to_string(),
        }
    }
}

fn triplet_data(data: &[u8; ROW_LEN]) -> [u8; TRIPLET_LEN] {
    let mut triplets = [0_u8; TRIPLET_LEN];
    triplets.copy_from_slice(&data[1..]);
    triplets
}

/// Decodes a two-nibble page number; any Hamming failure yields the "FF" sentinel.
pub(crate) fn page_number(units_byte: u8, tens_byte: u8) -> String {
    let units = hamming_8_4(units_byte);
    let tens = hamming_8_4(tens_byte);
    if units == 0xff || tens == 0xff {
        NO_PAGE.to_string()
    } else {
        format!("{:02X}", (tens << 4) | units)
    }
}

/// Combines four subcode nibbles, masking off the control bits they carry.
fn subcode_value(s1: u8, s2: u8, s3: u8, s4: u8) -> Option<u16> {
    if s1 == 0xff || s2 == 0xff || s3 == 0xff || s4 == 0xff {
        return None;
    }
    Some(
        (u16::from(s4 & 0x03) << 12)
            | (u16::from(s3) << 8)
            | (u16::from(s2 & 0x07) << 4)
            | u16::from(s1),
    )
}

#[cfg(test)]
mod tests {
    use super::super::testing::{self, HeaderFlags};
    use super::*;

    #[test]
    fn header_sets_number_and_subcode() {
        let mut page = Page::new(1);
        page.add_packet(&testing::header(1, 0x0, 0x1, 0x0000, HeaderFlags::default()));
        assert_eq!(page.number(), "10");
        assert_eq!(page.subcode(), "0000");
    }

    #[test]
    fn header_sets_control_flags() {
        let mut page = Page::new(2);
        let flags = HeaderFlags {
            erase: true,
            newsflash: true,
            subtitles: true,
            suppress_header: true,
            update: true,
            interrupted_sequence: true,
            inhibit_display: true,
            magazine_serial: true,
            national_option: 4,
        };
        page.add_packet(&testing::header(2, 0x3, 0x2, 0x3f7f, flags));
        assert!(page.erase());
        assert!(page.newsflash());
        assert!(page.subtitles());
        assert!(page.suppress_header());
        assert!(page.update());
        assert!(page.interrupted_sequence());
        assert!(page.inhibit_display());
        assert!(page.magazine_serial());
        assert_eq!(page.national_option_subset(), NationalOptionSubset::French);
        assert_eq!(page.subcode(), "3F7F");
        assert_eq!(page.number(), "23");
    }

    #[test]
    fn header_blanks_clock_columns() {
        let mut page = Page::new(1);
        let data = testing::header_data(0x0, 0x1, 0, HeaderFlags::default(), b"HEADLINE");
        page.add_packet(&testing::packet(1, 0, &data));
        let header = page.row(0).expect("header row");
        assert!(header[..8].iter().all(|&byte| byte == 0x04));
        assert_eq!(&header[8..16], b"HEADLINE");
    }

    #[test]
    fn unrecoverable_control_byte_leaves_flags_alone() {
        let mut page = Page::new(1);
        let mut data = testing::header_data(0x0, 0x1, 0, HeaderFlags::default(), b"");
        // Two flipped bits make the serial/subset byte undecodable.
        data[7] ^= 0x11;
        page.add_packet(&testing::packet(1, 0, &data));
        assert!(!page.magazine_serial());
        assert_eq!(page.national_option_subset(), NationalOptionSubset::English);
        assert_eq!(page.number(), "10");
    }

    #[test]
    fn undecodable_page_number_is_sentinel() {
        let mut page = Page::new(1);
        let mut data = testing::header_data(0x4, 0x2, 0, HeaderFlags::default(), b"");
        data[0] ^= 0x11;
        page.add_packet(&testing::packet(1, 0, &data));
        assert_eq!(page.number(), NO_PAGE);
    }

    #[test]
    fn body_rows_are_stored_raw() {
        let mut page = Page::new(1);
        let mut row = [0_u8; 38];
        row[0] = 0xde;
        row[37] = 0xad;
        page.add_packet(&testing::packet(1, 5, &row));
        assert_eq!(page.row(5), Some(&row));
        assert_eq!(page.used_rows(), 1);
    }

    #[test]
    fn fastext_links_resolve_relative_magazines() {
        let mut page = Page::new(1);
        let mut data = [0_u8; 38];
        data[0] = testing::encode_nibble(0);
        // First link: page 0x45, relative magazine bits 0 (same magazine).
        let link = testing::link_record(0x5, 0x4, 0x3f7f, 0);
        data[1..7].copy_from_slice(&link);
        // Remaining links left as zero bytes decode to the filler page.
        for index in 1..6 {
            data[1 + index * 6..7 + index * 6]
                .copy_from_slice(&testing::link_record(0xf, 0xf, 0x3f7f, 0));
        }
        data[37] = testing::encode_nibble(0x08);
        page.add_packet(&testing::packet(1, 27, &data));
        let links = page.links().expect("links");
        assert_eq!(links[0].page, "145");
        assert_eq!(links[0].subcode, "3F7F");
        assert_eq!(links[1].page, "1FF");
        assert!(page.display_row24());
    }

    #[test]
    fn fastext_relative_magazine_crosses_magazines() {
        let mut page = Page::new(8);
        let mut data = [0_u8; 38];
        data[0] = testing::encode_nibble(0);
        // Magazine bits 1 relative to magazine 8 (0 modulo 8) select magazine 1.
        data[1..7].copy_from_slice(&testing::link_record(0x0, 0x0, 0x0000, 1));
        for index in 1..6 {
            data[1 + index * 6..7 + index * 6]
                .copy_from_slice(&testing::link_record(0xf, 0xf, 0x3f7f, 0));
        }
        data[37] = testing::encode_nibble(0);
        page.add_packet(&testing::packet(8, 27, &data));
        assert_eq!(page.links().unwrap()[0].page, "100");
    }

    #[test]
    fn enhancement_designations_are_indexed() {
        let mut page = Page::new(1);
        let mut data = [0xaa_u8; 38];
        data[0] = testing::encode_nibble(2);
        page.add_packet(&testing::packet(1, 28, &data));
        assert!(page.enhancement_data(2).is_some());
        assert!(page.enhancement_data(0).is_none());

        let mut replacement = [0xbb_u8; 38];
        replacement[0] = testing::encode_nibble(15);
        page.add_packet(&testing::packet(1, 26, &replacement));
        assert_eq!(page.replacement_data(15), Some(&[0xbb; 37]));

        let mut link = [0xcc_u8; 38];
        link[0] = testing::encode_nibble(4);
        page.add_packet(&testing::packet(1, 27, &link));
        assert!(page.enhancement_links(0).is_some());
        assert!(page.enhancement_links(1).is_none());
    }

    #[test]
    fn merge_overlays_rows_and_adopts_flags() {
        let mut first = Page::new(1);
        first.add_packet(&testing::header(1, 0x0, 0x1, 0x0001, HeaderFlags::default()));
        first.add_packet(&testing::packet(1, 1, &[0x11; 38]));
        first.add_packet(&testing::packet(1, 2, &[0x22; 38]));

        let mut second = Page::new(1);
        second.add_packet(&testing::header(
            1,
            0x0,
            0x1,
            0x0001,
            HeaderFlags {
                newsflash: true,
                ..HeaderFlags::default()
            },
        ));
        second.add_packet(&testing::packet(1, 2, &[0x33; 38]));

        first.merge(second);
        assert!(first.newsflash());
        assert_eq!(first.row(1), Some(&[0x11; 38]));
        assert_eq!(first.row(2), Some(&[0x33; 38]));
    }

    #[test]
    fn merge_is_associative() {
        let make = |row: u8, fill: u8, newsflash: bool| {
            let mut page = Page::new(1);
            page.add_packet(&testing::header(
                1,
                0x0,
                0x1,
                0x0001,
                HeaderFlags {
                    newsflash,
                    ..HeaderFlags::default()
                },
            ));
            page.add_packet(&testing::packet(1, row, &[fill; 38]));
            page
        };
        let (p, q, r) = (make(1, 0x11, false), make(2, 0x22, true), make(1, 0x33, false));

        let mut left = p.clone();
        left.merge(q.clone());
        left.merge(r.clone());

        let mut right_tail = q;
        right_tail.merge(r);
        let mut right = p;
        right.merge(right_tail);

        assert_eq!(left, right);
    }
}
