//! Teletext service recovery layered on the transport stream core.
//!
//! The layers mirror the transmission format: [`DataUnitExtractor`] peels 42-byte raw
//! lines out of PES packets, [`TeletextPacket`] types them by magazine and row, and
//! [`ServiceDecoder`] folds them into [`Magazine`]s of [`Carousel`]s of [`Page`]s,
//! handling parallel and serial transmission modes, navigation tables and broadcast
//! service data along the way.

pub mod coding;

mod data_unit;
pub use data_unit::{DataUnitExtractor, RawTeletextPacket};

mod packet;
pub use packet::{PacketType, TeletextPacket};

mod page;
pub use page::{NationalOptionSubset, Page, PageLink, ROW_LEN, TRIPLET_LEN};

mod carousel;
pub use carousel::Carousel;

mod magazine;
pub use magazine::{Magazine, TopClassification};

mod service;
pub use service::{Service, ServiceDecoder};

#[cfg(test)]
pub(crate) mod testing;
