//! Record protection primitives.
//!
//! All record protection — true AEADs and the legacy CBC+HMAC
//! construction — goes through the one [`Aead`] capability set. The
//! record writer and reader never branch on the mode; that unification
//! is what keeps them short.

mod aead;
mod cbc;

pub(crate) use aead::RecordAead;
pub(crate) use cbc::CbcHmacAead;

use arrayvec::ArrayVec;
use std::ops::Deref;

use crate::buffer::Buf;
use crate::error::Error;
use crate::types::{ProtocolVersion, RecordType};

/// Authentication tag length shared by all supported AEADs.
pub(crate) const TAG_LEN: usize = 16;

/// Whether a cipher instance seals (writes) or opens (reads) records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Encrypt outgoing records.
    Seal,
    /// Decrypt incoming records.
    Open,
}

/// Additional authenticated data for one record.
///
/// Layout (13 bytes): `seq(8) ‖ type(1) ‖ major(1) ‖ minor(1) ‖ len(2)`,
/// all big-endian. For DTLS the sequence carries the epoch in its high
/// 16 bits, so the epoch is authenticated too.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aad(ArrayVec<u8, 13>);

impl Aad {
    /// Format the additional data for record `seq`.
    pub fn new(seq: u64, rtype: RecordType, version: ProtocolVersion, len: u16) -> Self {
        let mut ad = ArrayVec::new();
        ad.try_extend_from_slice(&seq.to_be_bytes()).unwrap();
        ad.push(rtype.as_u8());
        ad.push(version.major);
        ad.push(version.minor);
        ad.try_extend_from_slice(&len.to_be_bytes()).unwrap();
        Aad(ad)
    }
}

impl Deref for Aad {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// A per-record nonce.
///
/// 12 bytes for the AEAD formats, up to one cipher block for CBC IVs,
/// empty for implicit-IV CBC records that continue the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nonce(ArrayVec<u8, 16>);

impl Nonce {
    /// 12-byte nonce: big-endian `seq` in bytes 4..12, XORed with the
    /// full 12-byte implicit nonce (ChaCha20-Poly1305 style, RFC 7905).
    pub fn xor12(implicit: &[u8], seq: u64) -> Self {
        debug_assert_eq!(implicit.len(), 12);
        let mut nonce = [0u8; 12];
        nonce[4..].copy_from_slice(&seq.to_be_bytes());
        for (byte, imp) in nonce.iter_mut().zip(implicit) {
            *byte ^= imp;
        }
        Self::from_slice(&nonce)
    }

    /// 12-byte nonce: 4 implicit bytes then 8 explicit bytes
    /// (AES-GCM style, RFC 5288).
    pub fn implicit4(implicit: &[u8], explicit: &[u8]) -> Self {
        debug_assert_eq!(implicit.len(), 4);
        debug_assert_eq!(explicit.len(), 8);
        let mut nonce = ArrayVec::new();
        nonce.try_extend_from_slice(implicit).unwrap();
        nonce.try_extend_from_slice(explicit).unwrap();
        Nonce(nonce)
    }

    /// Nonce from raw bytes (CBC IVs). At most one cipher block.
    pub fn from_slice(bytes: &[u8]) -> Self {
        let mut nonce = ArrayVec::new();
        nonce.try_extend_from_slice(bytes).unwrap();
        Nonce(nonce)
    }
}

impl Deref for Nonce {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// The capability set record protection is written against.
///
/// A record transformation is driven as `set_ad`, `start`, then `finish`
/// over the buffer region holding the message. Sealing grows the region
/// (tag, CBC padding); opening authenticates and shrinks it to the
/// plaintext. Direction is fixed when the instance is created.
pub trait Aead {
    /// Set the additional authenticated data for the next record.
    fn set_ad(&mut self, ad: &[u8]);

    /// Begin a record with the given nonce.
    ///
    /// CBC instances accept an empty nonce, meaning the IV chains on
    /// from the previous record (TLS 1.0 implicit-IV mode).
    fn start(&mut self, nonce: &[u8]) -> Result<(), Error>;

    /// Transform `output[offset..]` in place.
    fn finish(&mut self, output: &mut Buf, offset: usize) -> Result<(), Error>;

    /// Output size for a message of `input_len` bytes.
    ///
    /// Exact when sealing. When opening it is an upper bound for modes
    /// whose plaintext length is only known after depadding (CBC).
    fn output_length(&self, input_len: usize) -> usize;

    /// Smallest input `finish` can accept when opening (the tag, or the
    /// minimum MAC-and-padding ciphertext for CBC).
    fn minimum_final_size(&self) -> usize;
}
