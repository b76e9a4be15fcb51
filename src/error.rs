//! Error and alert types for the record layer.

use std::fmt;

/// TLS alert descriptions the record layer can raise.
///
/// Only the subset relevant to record processing is modeled here; alert
/// routing and the full registry belong to the layer above.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertDescription {
    /// Record failed authentication, or was too short to carry a tag.
    ///
    /// Length-based rejection deliberately reports the same alert as a
    /// MAC failure so padding-oracle scanners get no distinguisher.
    BadRecordMac,
    /// Declared record length exceeds the protocol maximum.
    RecordOverflow,
    /// Record could not be decoded (zero-length record).
    DecodeError,
    /// DTLS-shaped record arrived on a stream transport.
    ProtocolVersion,
}

impl AlertDescription {
    /// Wire value of this alert description.
    pub fn as_u8(&self) -> u8 {
        match self {
            AlertDescription::BadRecordMac => 20,
            AlertDescription::RecordOverflow => 22,
            AlertDescription::DecodeError => 50,
            AlertDescription::ProtocolVersion => 70,
        }
    }
}

impl fmt::Display for AlertDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AlertDescription::BadRecordMac => "bad_record_mac",
            AlertDescription::RecordOverflow => "record_overflow",
            AlertDescription::DecodeError => "decode_error",
            AlertDescription::ProtocolVersion => "protocol_version",
        };
        write!(f, "{}", name)
    }
}

/// Errors surfaced by record reading and writing.
#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    /// A fatal TLS alert to send to the peer.
    Alert(AlertDescription),
    /// Writer was given more plaintext than fits in one record.
    PlaintextTooLarge(usize),
    /// A cryptographic primitive rejected its input.
    CryptoError(String),
    /// Internal consistency failure. The connection must be terminated.
    InvalidState(&'static str),
}

impl Error {
    /// The alert to send for this error, if it maps to one.
    pub fn alert(&self) -> Option<AlertDescription> {
        match self {
            Error::Alert(alert) => Some(*alert),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Alert(alert) => write!(f, "fatal alert: {}", alert),
            Error::PlaintextTooLarge(len) => {
                write!(f, "plaintext too large for one record: {} bytes", len)
            }
            Error::CryptoError(msg) => write!(f, "crypto error: {}", msg),
            Error::InvalidState(msg) => write!(f, "invalid state: {}", msg),
        }
    }
}

impl std::error::Error for Error {}
