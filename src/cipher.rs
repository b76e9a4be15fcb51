//! Per-epoch, per-direction cipher state.

use std::time::Instant;

use crate::buffer::{Buf, ToBuf};
use crate::crypto::{Aad, Aead, CbcHmacAead, Direction, Nonce, RecordAead};
use crate::error::{AlertDescription, Error};
use crate::rng::SeededRng;
use crate::suite::{Ciphersuite, NonceFormat, SessionKeys};
use crate::types::{ProtocolVersion, RecordType, Side};

/// Everything needed to protect or unprotect records in one direction of
/// one epoch.
///
/// Created when a handshake finishes and a new epoch is installed,
/// immutable in configuration thereafter, and dropped when the epoch is
/// retired. `side` selects whose key material from [`SessionKeys`] is
/// used; `our_side` selects seal or open.
pub struct CipherState {
    nonce_format: NonceFormat,
    nonce_bytes_from_record: usize,
    nonce_bytes_from_handshake: usize,
    nonce: Buf,
    start_time: Instant,
    aead: Box<dyn Aead>,
}

impl CipherState {
    /// Bind a ciphersuite, keys and direction into a live cipher state.
    ///
    /// For `CbcMode` on the peer direction the decryptor is pre-started
    /// with the handshake-derived initial IV (TLS 1.0 style); on our
    /// direction that IV is consumed by the first write instead.
    pub fn new(
        version: ProtocolVersion,
        side: Side,
        our_side: bool,
        suite: &Ciphersuite,
        keys: &SessionKeys,
        uses_encrypt_then_mac: bool,
    ) -> Result<Self, Error> {
        let nonce_bytes_from_record = suite.nonce_bytes_from_record(version);
        let nonce_bytes_from_handshake = suite.nonce_bytes_from_handshake(version);

        let aead_key = keys.aead_key(side);
        let nonce = keys.nonce(side).to_buf();

        if nonce.len() != nonce_bytes_from_handshake {
            return Err(Error::InvalidState(
                "handshake nonce material does not match the ciphersuite",
            ));
        }

        let direction = if our_side {
            Direction::Seal
        } else {
            Direction::Open
        };

        let aead: Box<dyn Aead> = match suite.nonce_format() {
            NonceFormat::CbcMode => {
                let mac = suite
                    .mac
                    .ok_or(Error::InvalidState("CBC suite without a MAC algorithm"))?;

                let mac_keylen = suite.mac_keylen();
                if aead_key.len() != mac_keylen + suite.cipher_keylen() {
                    return Err(Error::InvalidState("CBC key material has the wrong size"));
                }
                let (mac_key, cipher_key) = aead_key.split_at(mac_keylen);

                let mut aead = CbcHmacAead::new(
                    suite.cipher,
                    mac,
                    cipher_key,
                    mac_key,
                    direction,
                    nonce_bytes_from_record,
                    uses_encrypt_then_mac,
                )?;

                if !our_side {
                    aead.start(&nonce)?;
                }

                Box::new(aead)
            }
            _ => Box::new(RecordAead::new(suite.cipher, aead_key, direction)?),
        };

        Ok(CipherState {
            nonce_format: suite.nonce_format(),
            nonce_bytes_from_record,
            nonce_bytes_from_handshake,
            nonce,
            start_time: Instant::now(),
            aead,
        })
    }

    /// Nonce for writing record `seq`.
    ///
    /// `CbcMode` returns the handshake-derived initial IV once, then
    /// fresh random IVs (empty in implicit-IV mode, where the CBC chain
    /// supplies the IV).
    pub fn aead_nonce_write(&mut self, seq: u64, rng: &mut SeededRng) -> Nonce {
        match self.nonce_format {
            NonceFormat::CbcMode => {
                if !self.nonce.is_empty() {
                    let initial = std::mem::take(&mut self.nonce);
                    return Nonce::from_slice(&initial);
                }
                let mut iv = [0u8; 16];
                rng.fill(&mut iv[..self.nonce_bytes_from_record]);
                Nonce::from_slice(&iv[..self.nonce_bytes_from_record])
            }
            NonceFormat::AeadXor12 => Nonce::xor12(&self.nonce, seq),
            NonceFormat::AeadImplicit4 => Nonce::implicit4(&self.nonce, &seq.to_be_bytes()),
        }
    }

    /// Nonce for reading a record whose contents start at `record`.
    pub fn aead_nonce_read(&self, record: &[u8], seq: u64) -> Result<Nonce, Error> {
        match self.nonce_format {
            NonceFormat::CbcMode | NonceFormat::AeadImplicit4 => {
                if record.len() < self.nonce_bytes_from_record {
                    // Publicly derivable from the length, but unified with
                    // MAC failure to starve oracle scanners.
                    return Err(Error::Alert(AlertDescription::BadRecordMac));
                }
                match self.nonce_format {
                    NonceFormat::CbcMode => {
                        Ok(Nonce::from_slice(&record[..self.nonce_bytes_from_record]))
                    }
                    _ => Ok(Nonce::implicit4(
                        &self.nonce,
                        &record[..self.nonce_bytes_from_record],
                    )),
                }
            }
            NonceFormat::AeadXor12 => Ok(Nonce::xor12(&self.nonce, seq)),
        }
    }

    /// Format the 13-byte additional authenticated data for a record.
    pub fn format_ad(
        &self,
        seq: u64,
        rtype: RecordType,
        version: ProtocolVersion,
        len: u16,
    ) -> Aad {
        Aad::new(seq, rtype, version, len)
    }

    /// Nonce construction in use.
    pub fn nonce_format(&self) -> NonceFormat {
        self.nonce_format
    }

    /// Explicit nonce bytes carried in each record.
    pub fn nonce_bytes_from_record(&self) -> usize {
        self.nonce_bytes_from_record
    }

    /// Implicit nonce bytes taken from the handshake.
    pub fn nonce_bytes_from_handshake(&self) -> usize {
        self.nonce_bytes_from_handshake
    }

    /// When this cipher state was installed. Used by the epoch manager
    /// to retire old states.
    pub fn start_time(&self) -> Instant {
        self.start_time
    }

    /// The record protection primitive.
    pub fn aead(&self) -> &dyn Aead {
        &*self.aead
    }

    /// Mutable access to the record protection primitive.
    pub fn aead_mut(&mut self) -> &mut dyn Aead {
        &mut *self.aead
    }
}

impl std::fmt::Debug for CipherState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherState")
            .field("nonce_format", &self.nonce_format)
            .field("nonce_bytes_from_record", &self.nonce_bytes_from_record)
            .field(
                "nonce_bytes_from_handshake",
                &self.nonce_bytes_from_handshake,
            )
            .finish()
    }
}
