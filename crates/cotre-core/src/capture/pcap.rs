//! libpcap USB captures
//!
//! Reads classic libpcap files (not pcapng) recorded with one of the USB
//! link types and yields the payload of every bulk or interrupt transfer as
//! a [`Chunk`]. Control, isochronous and empty transfers are skipped.
//!
//! File layout:
//! - 24 bytes: global header (magic, version, zone, sigfigs, snaplen, link type)
//! - per record: 16 bytes header (seconds, fraction, captured len, original len)
//!   followed by the captured bytes

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use chrono::{DateTime, Utc};
use std::io::{self, Read};
use tracing::{debug, trace};

use super::{CaptureError, Chunk, Direction, Timestamp};

const MAGIC_MICROS: u32 = 0xA1B2_C3D4;
const MAGIC_NANOS: u32 = 0xA1B2_3C4D;

const GLOBAL_HEADER_LEN: usize = 24;
const RECORD_HEADER_LEN: usize = 16;

/// Linux usbmon, 48 byte header
pub const LINKTYPE_USB_LINUX: u32 = 189;
/// Linux usbmon (memory mapped), 64 byte header
pub const LINKTYPE_USB_LINUX_MMAPPED: u32 = 220;
/// Windows USBPcap
pub const LINKTYPE_USBPCAP: u32 = 249;

/// Records larger than this are treated as corruption
const MAX_RECORD_LEN: usize = 16 * 1024 * 1024;

/// Size of the fixed USBPcap pseudo header
const USBPCAP_HEADER_LEN: usize = 27;

const TRANSFER_INTERRUPT: u8 = 1;
const TRANSFER_BULK: u8 = 3;

/// Check whether 4 bytes are a pcap magic number in either byte order
pub fn is_pcap_magic(bytes: &[u8]) -> bool {
    bytes.len() >= 4 && Endian::detect(LittleEndian::read_u32(bytes)).is_some()
}

/// USB link types understood by the reader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkType {
    /// Windows USBPcap pseudo header
    UsbPcap,
    /// Linux usbmon binary header
    LinuxUsb,
    /// Linux usbmon memory mapped header
    LinuxUsbMmapped,
}

impl LinkType {
    /// Map a pcap link type number
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            LINKTYPE_USBPCAP => Some(LinkType::UsbPcap),
            LINKTYPE_USB_LINUX => Some(LinkType::LinuxUsb),
            LINKTYPE_USB_LINUX_MMAPPED => Some(LinkType::LinuxUsbMmapped),
            _ => None,
        }
    }

    /// The pcap link type number
    pub fn raw(&self) -> u32 {
        match self {
            LinkType::UsbPcap => LINKTYPE_USBPCAP,
            LinkType::LinuxUsb => LINKTYPE_USB_LINUX,
            LinkType::LinuxUsbMmapped => LINKTYPE_USB_LINUX_MMAPPED,
        }
    }
}

/// Byte order of the file, fixed by the magic number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endian {
    Little,
    Big,
}

impl Endian {
    /// Returns the byte order and whether timestamps are in nanoseconds
    fn detect(magic_le: u32) -> Option<(Endian, bool)> {
        match magic_le {
            MAGIC_MICROS => Some((Endian::Little, false)),
            MAGIC_NANOS => Some((Endian::Little, true)),
            m if m.swap_bytes() == MAGIC_MICROS => Some((Endian::Big, false)),
            m if m.swap_bytes() == MAGIC_NANOS => Some((Endian::Big, true)),
            _ => None,
        }
    }

    fn read_u16(&self, buf: &[u8]) -> u16 {
        match self {
            Endian::Little => LittleEndian::read_u16(buf),
            Endian::Big => BigEndian::read_u16(buf),
        }
    }

    fn read_u32(&self, buf: &[u8]) -> u32 {
        match self {
            Endian::Little => LittleEndian::read_u32(buf),
            Endian::Big => BigEndian::read_u32(buf),
        }
    }
}

/// Reader yielding USB payload chunks from a pcap file
pub struct PcapReader<R> {
    reader: R,
    endian: Endian,
    nanos: bool,
    link_type: LinkType,
    records: usize,
}

impl<R: Read> PcapReader<R> {
    /// Read the global header and check the link type
    pub fn new(mut reader: R) -> Result<Self, CaptureError> {
        let mut header = [0u8; GLOBAL_HEADER_LEN];
        reader
            .read_exact(&mut header)
            .map_err(|e| truncated(e, "global header"))?;

        let magic = LittleEndian::read_u32(&header[0..4]);
        let (endian, nanos) = Endian::detect(magic).ok_or(CaptureError::BadMagic(magic))?;

        let major = endian.read_u16(&header[4..6]);
        let minor = endian.read_u16(&header[6..8]);
        let raw_link = endian.read_u32(&header[20..24]);
        let link_type =
            LinkType::from_raw(raw_link).ok_or(CaptureError::UnsupportedLinkType(raw_link))?;

        debug!(
            "pcap: version {}.{}, {:?} endian, link type {:?}",
            major, minor, endian, link_type
        );

        Ok(Self {
            reader,
            endian,
            nanos,
            link_type,
            records: 0,
        })
    }

    /// Link type of the capture
    pub fn link_type(&self) -> LinkType {
        self.link_type
    }

    /// Number of records read so far, including skipped ones
    pub fn records(&self) -> usize {
        self.records
    }

    /// Read the next raw record, `None` at a clean end of file
    fn read_record(&mut self) -> Result<Option<(Option<Timestamp>, Vec<u8>)>, CaptureError> {
        let mut header = [0u8; RECORD_HEADER_LEN];
        if !read_exact_or_eof(&mut self.reader, &mut header)
            .map_err(|e| truncated(e, "record header"))?
        {
            return Ok(None);
        }

        let secs = self.endian.read_u32(&header[0..4]);
        let frac = self.endian.read_u32(&header[4..8]);
        let incl_len = self.endian.read_u32(&header[8..12]) as usize;
        if incl_len > MAX_RECORD_LEN {
            return Err(CaptureError::Truncated(format!(
                "record {} claims {} bytes",
                self.records, incl_len
            )));
        }

        let mut data = vec![0u8; incl_len];
        self.reader
            .read_exact(&mut data)
            .map_err(|e| truncated(e, "record data"))?;
        self.records += 1;

        let nanos = if self.nanos { frac } else { frac.saturating_mul(1000) };
        let timestamp = DateTime::<Utc>::from_timestamp(i64::from(secs), nanos);
        Ok(Some((timestamp, data)))
    }

    /// Extract a chunk from a record, `None` for records without bulk data
    fn parse_record(&self, data: &[u8]) -> Option<(Direction, Vec<u8>)> {
        match self.link_type {
            LinkType::UsbPcap => parse_usbpcap(data),
            LinkType::LinuxUsb => parse_usbmon(data, 48, self.endian),
            LinkType::LinuxUsbMmapped => parse_usbmon(data, 64, self.endian),
        }
    }
}

impl<R: Read> Iterator for PcapReader<R> {
    type Item = Result<Chunk, CaptureError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (timestamp, data) = match self.read_record() {
                Ok(Some(record)) => record,
                Ok(None) => return None,
                Err(e) => return Some(Err(e)),
            };

            match self.parse_record(&data) {
                Some((direction, payload)) => {
                    let mut chunk = Chunk::new(direction, payload);
                    chunk.timestamp = timestamp;
                    return Some(Ok(chunk));
                }
                None => trace!("pcap: skipping record {} ({} bytes)", self.records, data.len()),
            }
        }
    }
}

/// USBPcap pseudo header (always little endian):
/// headerLen u16, irpId u64, status u32, function u16, info u8, bus u16,
/// device u16, endpoint u8, transfer u8, dataLength u32
fn parse_usbpcap(data: &[u8]) -> Option<(Direction, Vec<u8>)> {
    if data.len() < USBPCAP_HEADER_LEN {
        return None;
    }
    let header_len = LittleEndian::read_u16(&data[0..2]) as usize;
    if header_len < USBPCAP_HEADER_LEN {
        return None;
    }
    let info = data[16];
    let transfer = data[22];
    let data_len = LittleEndian::read_u32(&data[23..27]) as usize;

    if transfer != TRANSFER_BULK && transfer != TRANSFER_INTERRUPT {
        return None;
    }
    let payload = data.get(header_len..)?;
    let payload = &payload[..payload.len().min(data_len)];
    if payload.is_empty() {
        return None;
    }

    // Bit 0 of info: set when the IRP travels from the device to the host
    let direction = if info & 0x01 != 0 {
        Direction::DeviceToHost
    } else {
        Direction::HostToDevice
    };
    Some((direction, payload.to_vec()))
}

/// Linux usbmon header in host byte order:
/// id u64, type u8, xfer_type u8, epnum u8, devnum u8, busnum u16,
/// flag_setup i8, flag_data i8, ts_sec i64, ts_usec i32, status i32,
/// length u32, len_cap u32, setup [u8; 8] (+ 16 bytes when mmapped)
fn parse_usbmon(data: &[u8], header_len: usize, endian: Endian) -> Option<(Direction, Vec<u8>)> {
    if data.len() < header_len {
        return None;
    }
    let xfer_type = data[9];
    let endpoint = data[10];
    let len_cap = endian.read_u32(&data[36..40]) as usize;

    if xfer_type != TRANSFER_BULK && xfer_type != TRANSFER_INTERRUPT {
        return None;
    }
    let payload = &data[header_len..];
    let payload = &payload[..payload.len().min(len_cap)];
    if payload.is_empty() {
        return None;
    }

    let direction = if endpoint & 0x80 != 0 {
        Direction::DeviceToHost
    } else {
        Direction::HostToDevice
    };
    Some((direction, payload.to_vec()))
}

/// Fill `buf` completely, or return `false` if the reader is already at EOF
fn read_exact_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(true)
}

fn truncated(e: io::Error, what: &str) -> CaptureError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        CaptureError::Truncated(format!("end of file inside {what}"))
    } else {
        CaptureError::Io(e)
    }
}
