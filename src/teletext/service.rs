//! Top-level packet dispatch and the finalised service model.

use super::coding::{hamming_8_4, odd_parity};
use super::data_unit::RawTeletextPacket;
use super::magazine::Magazine;
use super::packet::{PacketType, TeletextPacket};
use log::warn;

/// Initial page value meaning "unspecified".
const DEFAULT_INITIAL_PAGE: &str = "8FF";
/// Initial subcode wildcard.
const DEFAULT_INITIAL_SUBCODE: &str = "3F7F";

/// The recovered teletext service: eight magazines plus the broadcast service data
/// carried in packet 8/30.
#[derive(Debug)]
pub struct Service {
    magazines: [Magazine; 8],
    multiplexed: bool,
    status_display: Option<String>,
    initial_page: String,
    initial_subcode: String,
    network_id: Option<u16>,
}

impl Default for Service {
    fn default() -> Self {
        Self {
            magazines: [
                Magazine::new(1),
                Magazine::new(2),
                Magazine::new(3),
                Magazine::new(4),
                Magazine::new(5),
                Magazine::new(6),
                Magazine::new(7),
                Magazine::new(8),
            ],
            multiplexed: false,
            status_display: None,
            initial_page: DEFAULT_INITIAL_PAGE.to_string(),
            initial_subcode: DEFAULT_INITIAL_SUBCODE.to_string(),
            network_id: None,
        }
    }
}

impl Service {
    /// The eight magazines in transmission number order.
    pub fn magazines(&self) -> &[Magazine; 8] {
        &self.magazines
    }

    /// One magazine by its number 1..8.
    pub fn magazine(&self, number: u8) -> Option<&Magazine> {
        if (1..=8).contains(&number) {
            Some(&self.magazines[number as usize - 1])
        } else {
            None
        }
    }

    /// True when the teletext lines share the VBI with video (not a full-channel
    /// service).
    pub fn multiplexed(&self) -> bool {
        self.multiplexed
    }

    /// Status display text, typically the channel name.
    pub fn status_display(&self) -> Option<&str> {
        self.status_display.as_deref()
    }

    /// Initial page to show on service entry; "8FF" when unspecified.
    pub fn initial_page(&self) -> &str {
        &self.initial_page
    }

    /// Subcode qualifying the initial page.
    pub fn initial_subcode(&self) -> &str {
        &self.initial_subcode
    }

    /// Network identification code from broadcast service data format 1.
    pub fn network_identification_code(&self) -> Option<u16> {
        self.network_id
    }

    /// Count of committed pages across every magazine.
    pub fn page_count(&self) -> usize {
        self.magazines
            .iter()
            .flat_map(|magazine| magazine.carousels())
            .map(|carousel| carousel.pages().len())
            .sum()
    }
}

/// Routes typed packets to magazines, tracking the service transmission mode, and
/// decodes the 8/30 broadcast service data itself.
#[derive(Debug, Default)]
pub struct ServiceDecoder {
    service: Service,
    warned_undecodable: bool,
}

impl ServiceDecoder {
    /// Creates a decoder with an empty service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses and dispatches one raw packet.
    pub fn push_raw(&mut self, raw: &RawTeletextPacket) {
        self.push(&TeletextPacket::parse(raw));
    }

    /// Dispatches one typed packet.
    pub fn push(&mut self, packet: &TeletextPacket) {
        let magazine = match (packet.decoding_error(), packet.magazine()) {
            (false, Some(magazine)) => magazine,
            _ => {
                if !self.warned_undecodable {
                    self.warned_undecodable = true;
                    warn!("dropping undecodable teletext packets");
                }
                return;
            }
        };

        if packet.packet_type() == PacketType::BroadcastServiceData {
            self.decode_broadcast_service_data(packet);
            return;
        }

        if packet.packet_type() == PacketType::Header {
            // In serial transmission mode any header ends the page every other magazine
            // is assembling.
            let serial = hamming_8_4(packet.data()[7]) & 0x01 == 0x01;
            if serial {
                for other in self.service.magazines.iter_mut() {
                    if other.number() != magazine {
                        other.serial_header_received();
                    }
                }
            }
        }

        self.service.magazines[magazine as usize - 1].add_packet(packet);
    }

    /// A look at the service as recovered so far, not counting pages still under
    /// assembly.
    pub fn service(&self) -> &Service {
        &self.service
    }

    /// Commits every page still under assembly and returns the finished service.
    pub fn finish(mut self) -> Service {
        for magazine in self.service.magazines.iter_mut() {
            magazine.commit_current();
        }
        self.service
    }

    /// Packet 8/30: multiplexing flag, initial page and network data, ETS 300 706 §9.8.
    fn decode_broadcast_service_data(&mut self, packet: &TeletextPacket) {
        let data = packet.data();
        let designation = hamming_8_4(data[0]);
        if designation == 0xff {
            return;
        }
        // Only format 1 and format 2 are defined.
        if designation >> 1 > 1 {
            return;
        }
        let format_1 = designation >> 1 == 0;
        self.service.multiplexed = designation & 0x01 == 0;

        let units = hamming_8_4(data[1]);
        let tens = hamming_8_4(data[2]);
        let s1 = hamming_8_4(data[3]);
        let s2 = hamming_8_4(data[4]);
        let s3 = hamming_8_4(data[5]);
        let s4 = hamming_8_4(data[6]);
        if s2 != 0xff && s4 != 0xff {
            let mut magazine = (s2 >> 3) | ((s4 & 0x0c) >> 1);
            if magazine == 0 {
                magazine = 8;
            }
            if units != 0xff && tens != 0xff {
                self.service.initial_page = format!("{}{:02X}", magazine, (tens << 4) | units);
            }
            if s1 != 0xff && s3 != 0xff {
                let subcode = (u16::from(s4 & 0x03) << 12)
                    | (u16::from(s3) << 8)
                    | (u16::from(s2 & 0x07) << 4)
                    | u16::from(s1);
                self.service.initial_subcode = format!("{:04X}", subcode);
            }
        }

        if format_1 {
            self.service.network_id = Some(u16::from_be_bytes([data[7], data[8]]));
        }

        let display: String = data[20..]
            .iter()
            .map(|&byte| {
                let decoded = odd_parity(byte);
                if decoded < 0x20 {
                    ' '
                } else {
                    decoded as char
                }
            })
            .collect();
        let display = display.trim().to_string();
        if !display.is_empty() {
            self.service.status_display = Some(display);
        }
    }
}
