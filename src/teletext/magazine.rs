//! Per-magazine page stream assembly and navigation table interpretation.

use super::carousel::Carousel;
use super::coding::hamming_8_4;
use super::packet::{PacketType, TeletextPacket};
use super::page::{self, Page, NO_PAGE, ROW_LEN, TRIPLET_LEN};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use std::collections::BTreeSet;

/// Page number of the magazine organisation table.
const MOT_PAGE: &str = "FE";
/// Page number of the basic TOP table.
const BTT_PAGE: &str = "F0";

/// Rows of a MOT page carrying object page links, 10 bytes per link.
const MOT_OBJECT_ROWS: [usize; 4] = [19, 20, 22, 23];
/// Rows of a MOT page carrying DRCS page links, 4 bytes per link.
const MOT_DRCS_ROWS: [usize; 2] = [21, 24];
/// Rows of a BTT page carrying table page records, 8 bytes per record.
const BTT_ROWS: [usize; 2] = [21, 22];

/// Record types in the basic TOP table link rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
enum TopPageKind {
    MultiPage = 1,
    AdditionalInformation = 2,
    MultiPageExtension = 3,
}

/// Sets of pages a magazine's MOT and TOP tables classify for navigation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopClassification {
    gpop: BTreeSet<String>,
    pop: BTreeSet<String>,
    gdrcs: BTreeSet<String>,
    drcs: BTreeSet<String>,
    mpt: BTreeSet<String>,
    ait: BTreeSet<String>,
    mpt_ex: BTreeSet<String>,
}

impl TopClassification {
    /// Global public object pages.
    pub fn gpop(&self) -> &BTreeSet<String> {
        &self.gpop
    }

    /// Public object pages.
    pub fn pop(&self) -> &BTreeSet<String> {
        &self.pop
    }

    /// Global dynamically redefinable character set pages.
    pub fn gdrcs(&self) -> &BTreeSet<String> {
        &self.gdrcs
    }

    /// Dynamically redefinable character set pages.
    pub fn drcs(&self) -> &BTreeSet<String> {
        &self.drcs
    }

    /// TOP multi-page table pages.
    pub fn mpt(&self) -> &BTreeSet<String> {
        &self.mpt
    }

    /// TOP additional information table pages.
    pub fn ait(&self) -> &BTreeSet<String> {
        &self.ait
    }

    /// TOP multi-page extension table pages.
    pub fn mpt_ex(&self) -> &BTreeSet<String> {
        &self.mpt_ex
    }

    /// True when a page number appears in any object or DRCS set.
    pub fn is_object_page(&self, page: &str) -> bool {
        self.gpop.contains(page)
            || self.pop.contains(page)
            || self.gdrcs.contains(page)
            || self.drcs.contains(page)
    }
}

/// One of the eight magazines of a teletext service.
///
/// Owns the carousels committed so far plus the transient page under assembly, and
/// interprets the magazine-level X/29 enhancements and the MOT/TOP tables carried on the
/// reserved page numbers FE and F0.
#[derive(Debug)]
pub struct Magazine {
    number: u8,
    current: Option<Page>,
    carousels: Vec<Carousel>,
    enhancements: [Option<[u8; TRIPLET_LEN]>; 5],
    top: TopClassification,
    btt_seen: bool,
}

impl Magazine {
    /// Creates an empty magazine numbered 1..8.
    pub fn new(number: u8) -> Self {
        Self {
            number,
            current: None,
            carousels: Vec::new(),
            enhancements: [None; 5],
            top: TopClassification::default(),
            btt_seen: false,
        }
    }

    /// Magazine number 1..8.
    pub fn number(&self) -> u8 {
        self.number
    }

    /// Committed carousels in the order their page numbers first appeared.
    pub fn carousels(&self) -> &[Carousel] {
        &self.carousels
    }

    /// Looks up the carousel for one page number.
    pub fn carousel(&self, number: &str) -> Option<&Carousel> {
        self.carousels
            .iter()
            .find(|carousel| carousel.number() == number)
    }

    /// X/29 magazine enhancement triplets for one designation code 0..4.
    pub fn enhancement_data(&self, designation: usize) -> Option<&[u8; TRIPLET_LEN]> {
        self.enhancements
            .get(designation)
            .and_then(|data| data.as_ref())
    }

    /// Page classifications gathered from MOT and TOP tables.
    pub fn top_classification(&self) -> &TopClassification {
        &self.top
    }

    /// True once a basic TOP table page has been committed in this magazine.
    pub fn initial_top_seen(&self) -> bool {
        self.btt_seen
    }

    /// Folds one packet routed to this magazine.
    pub fn add_packet(&mut self, packet: &TeletextPacket) {
        match packet.packet_type() {
            PacketType::Header => {
                self.commit_current();
                let mut page = Page::new(self.number);
                page.add_packet(packet);
                self.current = Some(page);
            }
            PacketType::MagazineEnhancements => self.store_magazine_enhancement(packet),
            _ => {
                // Rows arriving before any header have no page to belong to.
                if let Some(page) = self.current.as_mut() {
                    page.add_packet(packet);
                }
            }
        }
    }

    /// Called when any other magazine transmits a header while the service is in serial
    /// mode: the rows for this magazine have ended.
    pub fn serial_header_received(&mut self) {
        self.commit_current();
    }

    /// Commits the page under assembly into its carousel, if there is one worth keeping.
    pub fn commit_current(&mut self) {
        let page = match self.current.take() {
            Some(page) => page,
            None => return,
        };
        if page.number() == NO_PAGE {
            // Time filler or undecodable number.
            return;
        }
        if page.number() == MOT_PAGE {
            self.decode_mot(&page);
        }
        if page.number() == BTT_PAGE {
            self.decode_top_btt(&page);
            self.btt_seen = true;
        }

        let number = page.number().to_string();
        match self
            .carousels
            .iter_mut()
            .find(|carousel| carousel.number() == number)
        {
            Some(carousel) => carousel.add_page(page),
            None => {
                let mut carousel = Carousel::new(number);
                carousel.add_page(page);
                self.carousels.push(carousel);
            }
        }
    }

    fn store_magazine_enhancement(&mut self, packet: &TeletextPacket) {
        let designation = hamming_8_4(packet.data()[0]);
        if designation > 4 {
            return;
        }
        let mut triplets = [0_u8; TRIPLET_LEN];
        triplets.copy_from_slice(&packet.data()[1..]);
        self.enhancements[designation as usize] = Some(triplets);
    }

    /// Magazine organisation table: object and DRCS page links on page xFE.
    fn decode_mot(&mut self, page: &Page) {
        for &row in MOT_OBJECT_ROWS.iter() {
            // Broadcasts differ on which of these rows they fill; missing rows are fine.
            if let Some(data) = page.row(row) {
                for index in 0..4 {
                    let offset = index * 10;
                    if offset + 3 > ROW_LEN {
                        break;
                    }
                    if let Some(linked) = link_page(&data[offset..offset + 3]) {
                        if index == 0 {
                            self.top.gpop.insert(linked);
                        } else {
                            self.top.pop.insert(linked);
                        }
                    }
                }
            }
        }
        for &row in MOT_DRCS_ROWS.iter() {
            if let Some(data) = page.row(row) {
                for index in 0..8 {
                    let offset = index * 4;
                    if offset + 3 > ROW_LEN {
                        break;
                    }
                    if let Some(linked) = link_page(&data[offset..offset + 3]) {
                        if index == 0 {
                            self.top.gdrcs.insert(linked);
                        } else {
                            self.top.drcs.insert(linked);
                        }
                    }
                }
            }
        }
    }

    /// Basic TOP table: typed page records on page xF0.
    fn decode_top_btt(&mut self, page: &Page) {
        for &row in BTT_ROWS.iter() {
            if let Some(data) = page.row(row) {
                for index in 0..5 {
                    let offset = index * 8;
                    if offset + 8 > ROW_LEN {
                        break;
                    }
                    let linked = match link_page(&data[offset..offset + 3]) {
                        Some(linked) => linked,
                        None => continue,
                    };
                    match TopPageKind::from_u8(hamming_8_4(data[offset + 7])) {
                        Some(TopPageKind::MultiPage) => {
                            self.top.mpt.insert(linked);
                        }
                        Some(TopPageKind::AdditionalInformation) => {
                            self.top.ait.insert(linked);
                        }
                        Some(TopPageKind::MultiPageExtension) => {
                            self.top.mpt_ex.insert(linked);
                        }
                        // Remaining types are informational only.
                        None => {}
                    }
                }
            }
        }
    }
}

/// Decodes a magazine/tens/units link into a three-digit page number.
///
/// Returns `None` for undecodable links and for the FF filler number.
fn link_page(record: &[u8]) -> Option<String> {
    let magazine = hamming_8_4(record[0]);
    if magazine == 0xff {
        return None;
    }
    // Bit 3 of the magazine nibble is a flag, not part of the number.
    let mut magazine = magazine & 0x07;
    if magazine == 0 {
        magazine = 8;
    }
    let number = page::page_number(record[2], record[1]);
    if number == NO_PAGE {
        return None;
    }
    Some(format!("{}{}", magazine, number))
}

#[cfg(test)]
mod tests {
    use super::super::testing::{self, HeaderFlags};
    use super::*;

    fn header(magazine: u8, units: u8, tens: u8) -> TeletextPacket {
        testing::header(magazine, units, tens, 0x0000, HeaderFlags::default())
    }

    #[test]
    fn pages_commit_on_next_header() {
        let mut magazine = Magazine::new(1);
        magazine.add_packet(&header(1, 0x0, 0x0));
        magazine.add_packet(&testing::packet(1, 1, &[0x11; 38]));
        assert!(magazine.carousels().is_empty());
        magazine.add_packet(&header(1, 0x1, 0x0));
        let carousel = magazine.carousel("00").expect("committed page");
        assert_eq!(carousel.pages()[0].row(1), Some(&[0x11; 38]));
    }

    #[test]
    fn repeated_header_commits_one_page() {
        let mut magazine = Magazine::new(1);
        magazine.add_packet(&header(1, 0x0, 0x1));
        magazine.add_packet(&header(1, 0x0, 0x1));
        magazine.commit_current();
        let carousel = magazine.carousel("10").expect("carousel");
        assert_eq!(carousel.pages().len(), 1);
    }

    #[test]
    fn filler_pages_are_discarded() {
        let mut magazine = Magazine::new(1);
        magazine.add_packet(&header(1, 0xf, 0xf));
        magazine.add_packet(&header(1, 0x0, 0x1));
        magazine.commit_current();
        assert!(magazine.carousel("FF").is_none());
        assert!(magazine.carousel("10").is_some());
    }

    #[test]
    fn orphan_rows_are_dropped() {
        let mut magazine = Magazine::new(1);
        magazine.add_packet(&testing::packet(1, 3, &[0x33; 38]));
        magazine.add_packet(&header(1, 0x0, 0x1));
        magazine.commit_current();
        assert_eq!(magazine.carousel("10").unwrap().pages()[0].used_rows(), 0);
    }

    #[test]
    fn magazine_enhancements_do_not_touch_the_page() {
        let mut magazine = Magazine::new(1);
        magazine.add_packet(&header(1, 0x0, 0x1));
        let mut data = [0x5a_u8; 38];
        data[0] = testing::encode_nibble(1);
        magazine.add_packet(&testing::packet(1, 29, &data));
        magazine.commit_current();
        assert_eq!(magazine.enhancement_data(1), Some(&[0x5a; 37]));
        assert!(magazine
            .carousel("10")
            .unwrap()
            .pages()[0]
            .enhancement_data(1)
            .is_none());
    }

    fn mot_link(magazine: u8, tens: u8, units: u8) -> [u8; 3] {
        [
            testing::encode_nibble(magazine),
            testing::encode_nibble(tens),
            testing::encode_nibble(units),
        ]
    }

    #[test]
    fn mot_page_classifies_object_and_drcs_links() {
        let mut magazine = Magazine::new(1);
        magazine.add_packet(&header(1, 0xe, 0xf));

        let mut object_row = [0_u8; 38];
        object_row[..3].copy_from_slice(&mot_link(1, 0xf, 0xe));
        object_row[10..13].copy_from_slice(&mot_link(2, 0x3, 0x4));
        object_row[20..23].copy_from_slice(&mot_link(0xf, 0xf, 0xf));
        object_row[30..33].copy_from_slice(&mot_link(0, 0x5, 0x6));
        magazine.add_packet(&testing::packet(1, 19, &object_row));

        let mut drcs_row = [0_u8; 38];
        drcs_row[..3].copy_from_slice(&mot_link(3, 0x2, 0x1));
        drcs_row[4..7].copy_from_slice(&mot_link(4, 0x7, 0x8));
        magazine.add_packet(&testing::packet(1, 21, &drcs_row));

        magazine.commit_current();
        let top = magazine.top_classification();
        assert!(top.gpop().contains("1FE"));
        assert!(top.pop().contains("234"));
        assert!(top.pop().contains("856"));
        assert_eq!(top.pop().len(), 2);
        assert!(top.gdrcs().contains("321"));
        assert!(top.drcs().contains("478"));
        assert!(top.is_object_page("234"));
    }

    #[test]
    fn btt_page_collects_table_pages() {
        let mut magazine = Magazine::new(1);
        magazine.add_packet(&header(1, 0x0, 0xf));

        let mut row = [0_u8; 38];
        row[..3].copy_from_slice(&mot_link(1, 0xf, 0x1));
        row[7] = testing::encode_nibble(1);
        row[8..11].copy_from_slice(&mot_link(1, 0xf, 0x2));
        row[15] = testing::encode_nibble(2);
        row[16..19].copy_from_slice(&mot_link(1, 0xf, 0x3));
        row[23] = testing::encode_nibble(3);
        row[24..27].copy_from_slice(&mot_link(1, 0xf, 0x4));
        row[31] = testing::encode_nibble(9);
        magazine.add_packet(&testing::packet(1, 21, &row));

        magazine.commit_current();
        let top = magazine.top_classification();
        assert!(top.mpt().contains("1F1"));
        assert!(top.ait().contains("1F2"));
        assert!(top.mpt_ex().contains("1F3"));
        assert!(magazine.initial_top_seen());
    }
}
