//! End-to-end tests over synthetic transport streams.

use teletext_io::output::{NullSink, Sink, T42Sink};
use teletext_io::teletext::coding::{hamming_8_4_encode, reverse};
use teletext_io::teletext::Service;
use teletext_io::{Pipeline, PipelineError, PipelineOptions, StreamError};

const TELETEXT_PID: u16 = 0x123;

/// Builds one 44-byte teletext data unit payload in transmission bit order.
fn line_unit(magazine: u8, row: u8, data: &[u8; 38]) -> [u8; 44] {
    let mut unit = [0_u8; 44];
    unit[0] = 0xc7; // field/line byte, ignored by the decoder
    unit[1] = 0xe4; // framing code
    let address1 = (magazine & 0x07) | ((row & 0x01) << 3);
    let address2 = row >> 1;
    unit[2] = reverse(hamming_8_4_encode(address1));
    unit[3] = reverse(hamming_8_4_encode(address2));
    for (out, &byte) in unit[4..42].iter_mut().zip(data.iter()) {
        *out = reverse(byte);
    }
    unit
}

/// Wraps data units in a PES packet on private stream 1.
fn pes_packet(units: &[[u8; 44]]) -> Vec<u8> {
    let mut body = vec![0x80, 0x00, 0x00, 0x10];
    for unit in units {
        body.push(0x02);
        body.push(44);
        body.extend_from_slice(unit);
    }
    let mut pes = vec![0x00, 0x00, 0x01, 0xbd];
    pes.extend_from_slice(&(body.len() as u16).to_be_bytes());
    pes.extend_from_slice(&body);
    pes
}

/// Splits a PES packet across transport packets on one PID.
fn transport_packets(pid: u16, pes: &[u8], counter: &mut u8) -> Vec<u8> {
    let mut stream = Vec::new();
    for (index, fragment) in pes.chunks(184).enumerate() {
        let mut packet = [0xff_u8; 188];
        packet[0] = 0x47;
        packet[1] = (if index == 0 { 0x40 } else { 0x00 }) | ((pid >> 8) as u8 & 0x1f);
        packet[2] = pid as u8;
        packet[3] = 0x10 | (*counter & 0x0f);
        *counter = counter.wrapping_add(1);
        packet[4..4 + fragment.len()].copy_from_slice(fragment);
        stream.extend_from_slice(&packet);
    }
    stream
}

fn header_data(units: u8, tens: u8, serial: bool) -> [u8; 38] {
    let mut data = [0x20_u8; 38];
    data[0] = hamming_8_4_encode(units);
    data[1] = hamming_8_4_encode(tens);
    for nibble in data[2..6].iter_mut() {
        *nibble = hamming_8_4_encode(0);
    }
    data[6] = hamming_8_4_encode(0);
    data[7] = hamming_8_4_encode(serial as u8);
    data
}

fn parity_row(text: &[u8]) -> [u8; 38] {
    let mut row = [0x20_u8; 38];
    for (out, &byte) in row.iter_mut().zip(text.iter()) {
        *out = if byte.count_ones() % 2 == 1 {
            byte
        } else {
            byte | 0x80
        };
    }
    row
}

fn decode<S: Sink>(stream: &[u8], sink: &mut S) -> Result<Service, PipelineError> {
    let mut pipeline = Pipeline::new(PipelineOptions::with_pid(TELETEXT_PID));
    // Deliberately awkward chunk size to exercise the residual handling.
    for chunk in stream.chunks(401) {
        pipeline.push(chunk, sink).unwrap();
    }
    pipeline.finish(sink)
}

#[test]
fn recovers_a_page_from_a_transport_stream() {
    let mut counter = 0;
    let mut stream = Vec::new();
    stream.extend(transport_packets(
        TELETEXT_PID,
        &pes_packet(&[
            line_unit(1, 0, &header_data(0x0, 0x1, false)),
            line_unit(1, 1, &parity_row(b"TELETEXT LIVES")),
        ]),
        &mut counter,
    ));
    // A second header commits the first page.
    stream.extend(transport_packets(
        TELETEXT_PID,
        &pes_packet(&[line_unit(1, 0, &header_data(0x1, 0x1, false))]),
        &mut counter,
    ));

    let service = decode(&stream, &mut NullSink::default()).expect("decoded service");
    let magazine = service.magazine(1).unwrap();
    let carousel = magazine.carousel("10").expect("page 110");
    let page = &carousel.pages()[0];
    assert_eq!(page.subcode(), "0000");
    let row = page.row(1).expect("row 1");
    assert_eq!(&row[..14], b"TELETEXT LIVES");
}

#[test]
fn serial_mode_header_commits_across_magazines() {
    let mut counter = 0;
    let mut stream = Vec::new();
    stream.extend(transport_packets(
        TELETEXT_PID,
        &pes_packet(&[
            line_unit(1, 0, &header_data(0x0, 0x0, true)),
            line_unit(1, 1, &parity_row(b"MAGAZINE ONE")),
            // Another magazine's serial header ends magazine 1's page.
            line_unit(2, 0, &header_data(0x0, 0x2, true)),
        ]),
        &mut counter,
    ));

    let service = decode(&stream, &mut NullSink::default()).expect("decoded service");
    let page = &service
        .magazine(1)
        .unwrap()
        .carousel("00")
        .expect("committed before its own next header")
        .pages()[0];
    assert_eq!(page.used_rows(), 1);
}

#[test]
fn passthrough_sink_sees_lines_in_arrival_order() {
    let mut counter = 0;
    let header = header_data(0x0, 0x1, false);
    let body = parity_row(b"RAW");
    let stream = transport_packets(
        TELETEXT_PID,
        &pes_packet(&[line_unit(1, 0, &header), line_unit(1, 1, &body)]),
        &mut counter,
    );

    let mut buffer = Vec::new();
    decode(&stream, &mut T42Sink::new(&mut buffer, false)).expect("decoded service");
    // Two 40-byte lines; the second one carries the body row after the address bytes.
    assert_eq!(buffer.len(), 80);
    assert_eq!(&buffer[42..42 + 38], &body[..]);
}

#[test]
fn field_padding_rounds_units_to_sixteen_lines() {
    let mut counter = 0;
    let stream = transport_packets(
        TELETEXT_PID,
        &pes_packet(&[line_unit(1, 0, &header_data(0x0, 0x1, false))]),
        &mut counter,
    );

    let mut buffer = Vec::new();
    decode(&stream, &mut T42Sink::new(&mut buffer, true)).expect("decoded service");
    assert_eq!(buffer.len(), 16 * 40);
}

#[test]
fn not_a_transport_stream_is_fatal() {
    let garbage = vec![0x00_u8; 4096];
    match decode(&garbage, &mut NullSink::default()) {
        Err(PipelineError::Stream(StreamError::NotTransportStream)) => {}
        other => panic!("expected NotTransportStream, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn wrong_pid_is_fatal() {
    let mut counter = 0;
    let stream = transport_packets(
        0x456,
        &pes_packet(&[line_unit(1, 0, &header_data(0x0, 0x1, false))]),
        &mut counter,
    );
    match decode(&stream, &mut NullSink::default()) {
        Err(PipelineError::Stream(StreamError::PidNotMatched(TELETEXT_PID))) => {}
        other => panic!("expected PidNotMatched, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn garbage_between_packets_is_survived() {
    let mut counter = 0;
    let mut stream = Vec::new();
    stream.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef]);
    stream.extend(transport_packets(
        TELETEXT_PID,
        &pes_packet(&[line_unit(1, 0, &header_data(0x0, 0x1, false))]),
        &mut counter,
    ));
    stream.push(0x00);
    stream.extend(transport_packets(
        TELETEXT_PID,
        &pes_packet(&[line_unit(1, 1, &parity_row(b"AFTER RESYNC"))]),
        &mut counter,
    ));

    let service = decode(&stream, &mut NullSink::default()).expect("decoded service");
    let page = &service.magazine(1).unwrap().carousel("10").unwrap().pages()[0];
    assert_eq!(&page.row(1).expect("row")[..12], b"AFTER RESYNC");
}
