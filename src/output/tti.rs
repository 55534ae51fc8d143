//! TTI page file output.
//!
//! One file per carousel, named `P<magazine><number>.tti`, with subpages in ascending
//! subcode order. The format is line oriented: `DE` description, `CT` cycle time, then
//! `PN`/`SC`/`PS` and the `OL` output lines of each subpage, with `FL` fastext links
//! where present. Bytes below 0x20 are escaped as ESC (0x1B) followed by the byte plus
//! 0x40.

use super::Sink;
use crate::teletext::coding::{hamming_8_4_encode, odd_parity};
use crate::teletext::{Carousel, Magazine, Page, RawTeletextPacket, Service};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

/// Placeholder substituted for a detected header clock, expanded by the transmission
/// side at insertion time.
const CLOCK_PLACEHOLDER: &[u8] = b"%H:%M:%S";

/// Serialises the finished service into a directory of TTI page files.
pub struct TtiSink {
    directory: PathBuf,
    cycle_time: u32,
    pages_written: usize,
}

impl TtiSink {
    /// Creates a sink writing into an existing directory, cycling subpages at
    /// `cycle_time` seconds.
    pub fn new(directory: PathBuf, cycle_time: u32) -> Self {
        Self {
            directory,
            cycle_time,
            pages_written: 0,
        }
    }

    /// Count of subpages serialised by [`Sink::finish`].
    pub fn pages_written(&self) -> usize {
        self.pages_written
    }

    fn write_carousel(
        &mut self,
        service: &Service,
        magazine: &Magazine,
        carousel: &Carousel,
    ) -> io::Result<()> {
        let name = format!("P{}{}.tti", magazine.number(), carousel.number());
        let mut file = BufWriter::new(File::create(self.directory.join(name))?);

        let description = service.status_display().unwrap_or("Teletext service");
        write!(file, "DE,{}\r\n", description)?;
        write!(file, "CT,{},T\r\n", self.cycle_time)?;

        let subpages = carousel.pages_by_subcode();
        let single = subpages.len() == 1;
        for (index, page) in subpages.iter().enumerate() {
            let subpage_digits = if single { 0 } else { index + 1 };
            write!(
                file,
                "PN,{}{}{:02}\r\n",
                magazine.number(),
                carousel.number(),
                subpage_digits.min(99)
            )?;
            write!(file, "SC,{}\r\n", page.subcode())?;
            write!(file, "PS,{:04X}\r\n", page_status(page))?;
            self.write_rows(&mut file, page)?;
            self.pages_written += 1;
        }
        file.flush()
    }

    fn write_rows(&self, file: &mut impl Write, page: &Page) -> io::Result<()> {
        for (row, data) in page.rows() {
            file.write_all(format!("OL,{},", row).as_bytes())?;
            if row == 0 {
                write_header_row(file, data)?;
            } else {
                for &byte in data.iter() {
                    write_text_byte(file, byte)?;
                }
            }
            file.write_all(b"\r\n")?;
        }

        // Enhancement packets are re-emitted raw, with their designation codes restored
        // to packet form.
        for designation in 0..16 {
            if let Some(triplets) = page.replacement_data(designation) {
                write_raw_row(file, 26, designation as u8, triplets)?;
            }
        }
        for index in 0..2 {
            if let Some(triplets) = page.enhancement_links(index) {
                write_raw_row(file, 27, index as u8 + 4, triplets)?;
            }
        }
        for designation in 0..5 {
            if let Some(triplets) = page.enhancement_data(designation) {
                write_raw_row(file, 28, designation as u8, triplets)?;
            }
        }

        if let Some(links) = page.links() {
            let mut line = String::from("FL");
            for link in links.iter() {
                line.push(',');
                line.push_str(&link.page);
            }
            file.write_all(line.as_bytes())?;
            file.write_all(b"\r\n")?;
        }
        Ok(())
    }
}

impl Sink for TtiSink {
    fn packet(&mut self, _packet: &RawTeletextPacket) -> io::Result<()> {
        Ok(())
    }

    fn unit_end(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn finish(&mut self, service: &Service) -> io::Result<()> {
        for magazine in service.magazines().iter() {
            for carousel in magazine.carousels() {
                self.write_carousel(service, magazine, carousel)?;
            }
        }
        Ok(())
    }
}

/// Builds the 16-bit page status word: transmit flag, the C5..C11 control bits and the
/// national option subset.
fn page_status(page: &Page) -> u16 {
    let mut status = 0x8000;
    if page.newsflash() {
        status |= 0x0001;
    }
    if page.subtitles() {
        status |= 0x0002;
    }
    if page.suppress_header() {
        status |= 0x0004;
    }
    if page.update() {
        status |= 0x0008;
    }
    if page.interrupted_sequence() {
        status |= 0x0010;
    }
    if page.inhibit_display() {
        status |= 0x0020;
    }
    if page.magazine_serial() {
        status |= 0x0040;
    }
    status | (page.national_option_subset() as u16) << 7
}

fn write_text_byte(file: &mut impl Write, byte: u8) -> io::Result<()> {
    let decoded = odd_parity(byte);
    if decoded == 0 {
        // Parity failures read as blanks.
        file.write_all(b" ")
    } else if decoded < 0x20 {
        file.write_all(&[0x1b, decoded + 0x40])
    } else {
        file.write_all(&[decoded])
    }
}

fn write_raw_byte(file: &mut impl Write, byte: u8) -> io::Result<()> {
    if byte < 0x20 {
        file.write_all(&[0x1b, byte + 0x40])
    } else {
        file.write_all(&[byte])
    }
}

fn write_raw_row(
    file: &mut impl Write,
    row: usize,
    designation: u8,
    triplets: &[u8],
) -> io::Result<()> {
    file.write_all(format!("OL,{},", row).as_bytes())?;
    write_raw_byte(file, hamming_8_4_encode(designation))?;
    for &byte in triplets {
        write_raw_byte(file, byte)?;
    }
    file.write_all(b"\r\n")
}

/// Writes the header row, substituting the clock placeholder when the trailing eight
/// characters look like a transmitted clock.
fn write_header_row(file: &mut impl Write, data: &[u8]) -> io::Result<()> {
    let tail_start = data.len() - 8;
    if looks_like_clock(&data[tail_start..]) {
        for &byte in &data[..tail_start] {
            write_text_byte(file, byte)?;
        }
        file.write_all(CLOCK_PLACEHOLDER)
    } else {
        for &byte in data.iter() {
            write_text_byte(file, byte)?;
        }
        Ok(())
    }
}

fn looks_like_clock(tail: &[u8]) -> bool {
    let mut clock_chars = 0;
    let mut digits = 0;
    for &byte in tail {
        let decoded = odd_parity(byte);
        if decoded.is_ascii_digit() {
            digits += 1;
            clock_chars += 1;
        } else if matches!(decoded, b':' | b'.' | b'/' | b' ') {
            clock_chars += 1;
        }
    }
    clock_chars >= 6 && digits >= 4
}
