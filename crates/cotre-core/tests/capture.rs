//! Capture readers feeding a session end to end

use byteorder::{BigEndian, ByteOrder, LittleEndian, WriteBytesExt};
use chrono::{TimeZone, Utc};
use std::fs;
use std::io::Write;
use std::path::Path;

use cotre_core::capture::pcap::{LINKTYPE_USBPCAP, LINKTYPE_USB_LINUX, LINKTYPE_USB_LINUX_MMAPPED};
use cotre_core::capture::{
    open_capture, CaptureError, CaptureFormat, ChunkLogReader, ChunkLogWriter, Chunk, Direction,
    LinkType, PcapReader,
};
use cotre_core::protocol::{ChecksumStatus, Frame};
use cotre_core::session::{Session, Tail};

/// A USB transfer to put into a test capture
struct Transfer {
    secs: u32,
    direction: Direction,
    bulk: bool,
    data: Vec<u8>,
}

fn transfer(secs: u32, direction: Direction, data: &[u8]) -> Transfer {
    Transfer {
        secs,
        direction,
        bulk: true,
        data: data.to_vec(),
    }
}

const MAGIC_MICROS: u32 = 0xA1B2_C3D4;
const MAGIC_NANOS: u32 = 0xA1B2_3C4D;

fn pcap_header<B: ByteOrder>(out: &mut Vec<u8>, link_type: u32) {
    pcap_header_with_magic::<B>(out, MAGIC_MICROS, link_type);
}

fn pcap_header_with_magic<B: ByteOrder>(out: &mut Vec<u8>, magic: u32, link_type: u32) {
    out.write_u32::<B>(magic).unwrap();
    out.write_u16::<B>(2).unwrap();
    out.write_u16::<B>(4).unwrap();
    out.write_i32::<B>(0).unwrap();
    out.write_u32::<B>(0).unwrap();
    out.write_u32::<B>(65535).unwrap();
    out.write_u32::<B>(link_type).unwrap();
}

fn pcap_record<B: ByteOrder>(out: &mut Vec<u8>, secs: u32, frac: u32, record: &[u8]) {
    out.write_u32::<B>(secs).unwrap();
    out.write_u32::<B>(frac).unwrap();
    out.write_u32::<B>(record.len() as u32).unwrap();
    out.write_u32::<B>(record.len() as u32).unwrap();
    out.extend_from_slice(record);
}

/// Little endian USBPcap capture
fn usbpcap_capture(transfers: &[Transfer]) -> Vec<u8> {
    let mut out = Vec::new();
    pcap_header::<LittleEndian>(&mut out, LINKTYPE_USBPCAP);
    for t in transfers {
        let mut rec = Vec::new();
        rec.write_u16::<LittleEndian>(27).unwrap();
        rec.write_u64::<LittleEndian>(0xFFFF_8000_1234_0000).unwrap();
        rec.write_u32::<LittleEndian>(0).unwrap();
        rec.write_u16::<LittleEndian>(0x0009).unwrap();
        rec.push(if t.direction == Direction::DeviceToHost { 1 } else { 0 });
        rec.write_u16::<LittleEndian>(1).unwrap();
        rec.write_u16::<LittleEndian>(4).unwrap();
        rec.push(if t.direction == Direction::DeviceToHost { 0x81 } else { 0x01 });
        rec.push(if t.bulk { 3 } else { 2 });
        rec.write_u32::<LittleEndian>(t.data.len() as u32).unwrap();
        rec.extend_from_slice(&t.data);
        pcap_record::<LittleEndian>(&mut out, t.secs, 250_000, &rec);
    }
    out
}

/// Linux usbmon record header; `mmapped` adds the 16 byte isochronous tail
fn usbmon_header<B: ByteOrder>(rec: &mut Vec<u8>, t: &Transfer, mmapped: bool) {
    let device_to_host = t.direction == Direction::DeviceToHost;
    rec.write_u64::<B>(1).unwrap();
    rec.push(if device_to_host { b'C' } else { b'S' });
    rec.push(if t.bulk { 3 } else { 2 });
    rec.push(if device_to_host { 0x82 } else { 0x02 });
    rec.push(5);
    rec.write_u16::<B>(1).unwrap();
    rec.push(b'-');
    rec.push(0);
    rec.write_i64::<B>(i64::from(t.secs)).unwrap();
    rec.write_i32::<B>(0).unwrap();
    rec.write_i32::<B>(0).unwrap();
    rec.write_u32::<B>(t.data.len() as u32).unwrap();
    rec.write_u32::<B>(t.data.len() as u32).unwrap();
    rec.extend_from_slice(&[0u8; 8]);
    if mmapped {
        rec.write_i32::<B>(0).unwrap();
        rec.write_i32::<B>(0).unwrap();
        rec.write_u32::<B>(0).unwrap();
        rec.write_u32::<B>(0).unwrap();
    }
}

/// Big endian Linux usbmon capture (48 byte headers)
fn usbmon_capture_be(transfers: &[Transfer]) -> Vec<u8> {
    let mut out = Vec::new();
    pcap_header::<BigEndian>(&mut out, LINKTYPE_USB_LINUX);
    for t in transfers {
        let mut rec = Vec::new();
        usbmon_header::<BigEndian>(&mut rec, t, false);
        rec.extend_from_slice(&t.data);
        pcap_record::<BigEndian>(&mut out, t.secs, 250_000, &rec);
    }
    out
}

/// Little endian memory mapped usbmon capture (64 byte headers) with
/// nanosecond timestamps
fn usbmon_mmapped_capture_nanos(transfers: &[Transfer], nanos: u32) -> Vec<u8> {
    let mut out = Vec::new();
    pcap_header_with_magic::<LittleEndian>(&mut out, MAGIC_NANOS, LINKTYPE_USB_LINUX_MMAPPED);
    for t in transfers {
        let mut rec = Vec::new();
        usbmon_header::<LittleEndian>(&mut rec, t, true);
        assert_eq!(rec.len(), 64);
        rec.extend_from_slice(&t.data);
        pcap_record::<LittleEndian>(&mut out, t.secs, nanos, &rec);
    }
    out
}

fn read_exchange() -> Vec<Transfer> {
    vec![
        transfer(10, Direction::HostToDevice, &[0xAD, 0x00, 0x03, b'R', 0x00]),
        Transfer {
            secs: 10,
            direction: Direction::HostToDevice,
            bulk: false,
            data: vec![0x13, 0x11],
        },
        transfer(11, Direction::HostToDevice, &[0x10, 0x42, 0x13]),
        transfer(12, Direction::DeviceToHost, &[0x13, 0x11, 0xAD, 0x00, 0x01, 0x7F, 0x00]),
        transfer(13, Direction::DeviceToHost, &[0xFF, 0xFE]),
    ]
}

fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, bytes).expect("write capture");
    path
}

#[test]
fn test_usbpcap_capture_decodes_both_directions() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_file(dir.path(), "read.pcap", &usbpcap_capture(&read_exchange()));

    let source = open_capture(&path, CaptureFormat::Auto).expect("Should open");
    let mut decode = Session::new().decode(source);
    let frames: Vec<_> = decode
        .by_ref()
        .collect::<Result<_, _>>()
        .expect("Should decode");

    let host: Vec<_> = frames
        .iter()
        .filter(|f| f.direction == Direction::HostToDevice)
        .map(|f| f.frame.clone())
        .collect();
    assert_eq!(
        host,
        vec![Frame::data(vec![b'R', 0x00, 0x10]).expect("Should build")]
    );
    assert_eq!(
        frames[0].timestamp,
        Utc.timestamp_opt(11, 250_000_000).single()
    );

    let device: Vec<_> = frames
        .iter()
        .filter(|f| f.direction == Direction::DeviceToHost)
        .map(|f| f.frame.clone())
        .collect();
    assert_eq!(device.len(), 2);
    assert_eq!(device[0], Frame::Ack);
    assert_eq!(
        device[1].checksum_status(),
        Some(ChecksumStatus::Mismatch {
            stored: 0x00,
            computed: 0x7F
        })
    );

    let summary = decode.finish();
    assert_eq!(summary.host.chunks, 2);
    assert_eq!(summary.host.data_frames, 1);
    assert_eq!(summary.device.checksum_mismatches, 1);
    assert_eq!(
        summary.tails,
        vec![
            Tail {
                direction: Direction::HostToDevice,
                bytes: vec![0x13],
            },
            Tail {
                direction: Direction::DeviceToHost,
                bytes: vec![0xFF, 0xFE],
            },
        ]
    );
}

#[test]
fn test_usbmon_big_endian_capture() {
    let bytes = usbmon_capture_be(&read_exchange());
    let reader = PcapReader::new(bytes.as_slice()).expect("Should parse header");
    assert_eq!(reader.link_type(), LinkType::LinuxUsb);

    let chunks: Vec<Chunk> = reader.collect::<Result<_, _>>().expect("Should read");
    assert_eq!(chunks.len(), 4);
    assert_eq!(chunks[0].direction, Direction::HostToDevice);
    assert_eq!(chunks[0].data, vec![0xAD, 0x00, 0x03, b'R', 0x00]);
    assert_eq!(chunks[2].direction, Direction::DeviceToHost);
    assert_eq!(chunks[1].data, vec![0x10, 0x42, 0x13]);
    assert_eq!(chunks[3].data, vec![0xFF, 0xFE]);
}

#[test]
fn test_usbmon_mmapped_capture_with_nanosecond_timestamps() {
    let bytes = usbmon_mmapped_capture_nanos(&read_exchange(), 123_456_789);
    let reader = PcapReader::new(bytes.as_slice()).expect("Should parse header");
    assert_eq!(reader.link_type(), LinkType::LinuxUsbMmapped);

    let chunks: Vec<Chunk> = reader.collect::<Result<_, _>>().expect("Should read");
    assert_eq!(chunks.len(), 4);
    assert_eq!(chunks[0].direction, Direction::HostToDevice);
    assert_eq!(chunks[0].data, vec![0xAD, 0x00, 0x03, b'R', 0x00]);
    assert_eq!(
        chunks[0].timestamp,
        Utc.timestamp_opt(10, 123_456_789).single()
    );
    assert_eq!(chunks[2].direction, Direction::DeviceToHost);
    assert_eq!(chunks[2].data, vec![0x13, 0x11, 0xAD, 0x00, 0x01, 0x7F, 0x00]);
    assert_eq!(
        chunks[3].timestamp,
        Utc.timestamp_opt(13, 123_456_789).single()
    );
}

#[test]
fn test_pcap_errors() {
    let not_pcap = [0u8; 24];
    assert!(matches!(
        PcapReader::new(&not_pcap[..]),
        Err(CaptureError::BadMagic(0))
    ));

    let mut ethernet = Vec::new();
    pcap_header::<LittleEndian>(&mut ethernet, 1);
    assert!(matches!(
        PcapReader::new(ethernet.as_slice()),
        Err(CaptureError::UnsupportedLinkType(1))
    ));

    assert!(matches!(
        PcapReader::new(&[0xD4u8, 0xC3, 0xB2, 0xA1][..]),
        Err(CaptureError::Truncated(_))
    ));

    let mut cut = usbpcap_capture(&read_exchange());
    cut.truncate(cut.len() - 1);
    let results: Vec<_> = PcapReader::new(cut.as_slice())
        .expect("Header is intact")
        .collect();
    assert!(matches!(
        results.last(),
        Some(Err(CaptureError::Truncated(_)))
    ));
}

#[test]
fn test_chunk_log_roundtrip_through_session() {
    let chunks = vec![
        Chunk::new(Direction::HostToDevice, vec![0x01, 0x02, 0x13]),
        Chunk::new(Direction::DeviceToHost, vec![0xAD, 0x00, 0x01])
            .with_timestamp(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()),
        Chunk::new(Direction::HostToDevice, vec![0x11]),
        Chunk::new(Direction::DeviceToHost, vec![0x5A, 0x5A]),
    ];

    let mut writer = ChunkLogWriter::new(Vec::new());
    for chunk in &chunks {
        writer.write(chunk).expect("Should write");
    }
    let log = writer.finish().expect("Should flush");

    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_file(dir.path(), "capture.log", &log);

    // No known extension, detected from content
    let source = open_capture(&path, CaptureFormat::Auto).expect("Should open");
    let frames: Vec<_> = Session::new()
        .decode(source)
        .map(|f| f.expect("Should decode").frame)
        .collect();
    assert_eq!(
        frames,
        vec![
            Frame::unknown(vec![0x01u8, 0x02]),
            Frame::Ack,
            Frame::data(vec![0x5Au8]).expect("Should build"),
        ]
    );

    let reread: Vec<Chunk> = ChunkLogReader::new(log.as_slice())
        .collect::<Result<_, _>>()
        .expect("Should reread");
    assert_eq!(reread, chunks);
}

#[test]
fn test_unknown_format_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("notes.txt");
    let mut file = fs::File::create(&path).expect("create");
    writeln!(file, "not a capture").expect("write");

    assert!(matches!(
        open_capture(&path, CaptureFormat::Auto),
        Err(CaptureError::UnknownFormat(_))
    ));
}
