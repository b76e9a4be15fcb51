//! Core record-layer types and wire limits.

use nom::number::complete::{be_u16, be_u8};
use nom::IResult;

use crate::buffer::Buf;

/// Largest plaintext fragment one record may carry (2^14).
pub const MAX_PLAINTEXT_SIZE: usize = 16384;

/// Largest ciphertext a record header may declare (2^14 + 2048).
pub const MAX_CIPHERTEXT_SIZE: usize = MAX_PLAINTEXT_SIZE + 2048;

/// TLS record header: type(1) + version(2) + length(2).
pub const TLS_HEADER_SIZE: usize = 5;

/// DTLS record header: type(1) + version(2) + epoch(2) + seq(6) + length(2).
pub const DTLS_HEADER_SIZE: usize = 13;

/// Protocol version as carried in the record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProtocolVersion {
    /// Major version byte. 254 for DTLS.
    pub major: u8,
    /// Minor version byte.
    pub minor: u8,
}

impl ProtocolVersion {
    /// TLS 1.0.
    pub const TLS1_0: ProtocolVersion = ProtocolVersion::new(3, 1);
    /// TLS 1.1.
    pub const TLS1_1: ProtocolVersion = ProtocolVersion::new(3, 2);
    /// TLS 1.2.
    pub const TLS1_2: ProtocolVersion = ProtocolVersion::new(3, 3);
    /// DTLS 1.0. Minor bytes count down in DTLS.
    pub const DTLS1_0: ProtocolVersion = ProtocolVersion::new(254, 255);
    /// DTLS 1.2.
    pub const DTLS1_2: ProtocolVersion = ProtocolVersion::new(254, 253);

    /// Build a version from major/minor bytes.
    pub const fn new(major: u8, minor: u8) -> Self {
        ProtocolVersion { major, minor }
    }

    /// True for datagram (DTLS) versions.
    pub fn is_datagram(&self) -> bool {
        self.major == 254
    }

    /// True when CBC records carry a per-record explicit IV.
    ///
    /// TLS 1.0 derives the first IV from the handshake and chains
    /// afterwards; TLS 1.1+ and all DTLS versions put the IV on the wire.
    pub fn supports_explicit_cbc_ivs(&self) -> bool {
        if self.is_datagram() {
            return true;
        }
        self.major == 3 && self.minor >= 2
    }

    /// Parse a version from wire format.
    pub fn parse(input: &[u8]) -> IResult<&[u8], ProtocolVersion> {
        let (input, major) = be_u8(input)?;
        let (input, minor) = be_u8(input)?;
        Ok((input, ProtocolVersion { major, minor }))
    }

    /// Serialize this version to wire format.
    pub fn serialize(&self, output: &mut Buf) {
        output.push(self.major);
        output.push(self.minor);
    }
}

/// Record content types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    /// ChangeCipherSpec (20).
    ChangeCipherSpec,
    /// Alert (21).
    Alert,
    /// Handshake (22).
    Handshake,
    /// ApplicationData (23).
    ApplicationData,
    /// Heartbeat (24).
    Heartbeat,
    /// Internal sentinel for silently dropped DTLS datagrams.
    ///
    /// Never appears on the wire.
    NoRecord,
    /// Any other content type byte, carried through for the layer above.
    Unknown(u8),
}

impl Default for RecordType {
    fn default() -> Self {
        Self::NoRecord
    }
}

impl RecordType {
    /// Map a wire byte to a record type.
    pub fn from_u8(value: u8) -> Self {
        match value {
            20 => RecordType::ChangeCipherSpec,
            21 => RecordType::Alert,
            22 => RecordType::Handshake,
            23 => RecordType::ApplicationData,
            24 => RecordType::Heartbeat,
            _ => RecordType::Unknown(value),
        }
    }

    /// Wire byte for this record type.
    pub fn as_u8(&self) -> u8 {
        match self {
            RecordType::ChangeCipherSpec => 20,
            RecordType::Alert => 21,
            RecordType::Handshake => 22,
            RecordType::ApplicationData => 23,
            RecordType::Heartbeat => 24,
            RecordType::NoRecord => 0,
            RecordType::Unknown(value) => *value,
        }
    }

    /// Parse a record type from wire format.
    pub fn parse(input: &[u8]) -> IResult<&[u8], RecordType> {
        let (input, byte) = be_u8(input)?;
        Ok((input, Self::from_u8(byte)))
    }
}

/// Connection side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// The client side of the connection.
    Client,
    /// The server side of the connection.
    Server,
}

/// One framed record, as produced by the reader.
///
/// `sequence` carries the epoch in the high 16 bits for DTLS. The data
/// buffer holds plaintext and lives for a single read.
#[derive(Debug, Default)]
pub struct Record {
    /// Content type, or [`RecordType::NoRecord`] for DTLS drops.
    pub rtype: RecordType,
    /// Version from the record header.
    pub version: ProtocolVersion,
    /// 64-bit sequence value (epoch << 48 | seq for DTLS).
    pub sequence: u64,
    /// Decrypted record payload.
    pub data: Buf,
}

impl Record {
    /// Create an empty record to read into.
    pub fn new() -> Self {
        Self::default()
    }
}

/// Parsed TLS record header fields.
pub(crate) struct TlsHeader {
    pub version: ProtocolVersion,
    pub record_size: usize,
}

/// Parsed DTLS record header fields.
pub(crate) struct DtlsHeader {
    pub version: ProtocolVersion,
    pub sequence: u64,
    pub record_size: usize,
}

pub(crate) fn parse_tls_header(input: &[u8]) -> IResult<&[u8], TlsHeader> {
    let (input, _rtype) = be_u8(input)?;
    let (input, version) = ProtocolVersion::parse(input)?;
    let (input, record_size) = be_u16(input)?;
    Ok((
        input,
        TlsHeader {
            version,
            record_size: record_size as usize,
        },
    ))
}

pub(crate) fn parse_dtls_header(input: &[u8]) -> IResult<&[u8], DtlsHeader> {
    let (input, _rtype) = be_u8(input)?;
    let (input, version) = ProtocolVersion::parse(input)?;
    let (input, epoch) = be_u16(input)?;
    let (input, seq48) = crate::util::be_u48(input)?;
    let (input, record_size) = be_u16(input)?;
    Ok((
        input,
        DtlsHeader {
            version,
            sequence: (epoch as u64) << 48 | seq48,
            record_size: record_size as usize,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_predicates() {
        assert!(ProtocolVersion::DTLS1_0.is_datagram());
        assert!(ProtocolVersion::DTLS1_2.is_datagram());
        assert!(!ProtocolVersion::TLS1_2.is_datagram());

        assert!(!ProtocolVersion::TLS1_0.supports_explicit_cbc_ivs());
        assert!(ProtocolVersion::TLS1_1.supports_explicit_cbc_ivs());
        assert!(ProtocolVersion::TLS1_2.supports_explicit_cbc_ivs());
        assert!(ProtocolVersion::DTLS1_0.supports_explicit_cbc_ivs());
    }

    #[test]
    fn record_type_wire_roundtrip() {
        for value in [20u8, 21, 22, 23, 24, 99] {
            assert_eq!(RecordType::from_u8(value).as_u8(), value);
        }
    }

    #[test]
    fn dtls_header_parse() {
        let header = [
            0x17, // ApplicationData
            0xFE, 0xFD, // DTLS 1.2
            0x00, 0x02, // epoch 2
            0x00, 0x00, 0x00, 0x00, 0x01, 0x05, // sequence 261
            0x00, 0x20, // length 32
        ];
        let (rest, parsed) = parse_dtls_header(&header).unwrap();
        assert!(rest.is_empty());
        assert_eq!(parsed.version, ProtocolVersion::DTLS1_2);
        assert_eq!(parsed.sequence, (2u64 << 48) | 261);
        assert_eq!(parsed.record_size, 32);
    }
}
