//! Legacy CBC+HMAC record protection behind the [`Aead`] capability set.
//!
//! Implements MAC-then-encrypt (RFC 5246 §6.2.3.2) and encrypt-then-MAC
//! (RFC 7366). The MtE decrypt path is the padding-oracle-sensitive one:
//! padding bytes are checked in constant time, the MAC is always
//! computed, and the leftover bytes are absorbed into a throwaway MAC so
//! the compression work does not depend on the claimed padding length.
//! Padding and MAC failures are indistinguishable to the caller.

use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::{Aes128, Aes256};
use arrayvec::ArrayVec;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::{Sha256, Sha384};
use subtle::ConstantTimeEq;

use crate::buffer::Buf;
use crate::crypto::{Aead, Direction};
use crate::error::Error;
use crate::suite::{CipherAlgorithm, MacAlgorithm, CBC_BLOCK_SIZE};
use crate::util::round_up;

const MAX_MAC_LEN: usize = 48;

enum BlockCipher {
    Aes128(Box<Aes128>),
    Aes256(Box<Aes256>),
}

impl BlockCipher {
    fn new(cipher: CipherAlgorithm, key: &[u8]) -> Result<Self, Error> {
        match cipher {
            CipherAlgorithm::Aes128CbcHmac => Ok(BlockCipher::Aes128(Box::new(
                Aes128::new_from_slice(key)
                    .map_err(|_| Error::CryptoError("invalid AES-128 key length".into()))?,
            ))),
            CipherAlgorithm::Aes256CbcHmac => Ok(BlockCipher::Aes256(Box::new(
                Aes256::new_from_slice(key)
                    .map_err(|_| Error::CryptoError("invalid AES-256 key length".into()))?,
            ))),
            _ => Err(Error::InvalidState("not a CBC cipher")),
        }
    }

    fn encrypt_block(&self, block: &mut [u8]) {
        let block = aes::Block::from_mut_slice(block);
        match self {
            BlockCipher::Aes128(c) => c.encrypt_block(block),
            BlockCipher::Aes256(c) => c.encrypt_block(block),
        }
    }

    fn decrypt_block(&self, block: &mut [u8]) {
        let block = aes::Block::from_mut_slice(block);
        match self {
            BlockCipher::Aes128(c) => c.decrypt_block(block),
            BlockCipher::Aes256(c) => c.decrypt_block(block),
        }
    }
}

/// Keyed HMAC, cloned per record so rekeying never happens mid-stream.
#[derive(Clone)]
enum RecordMac {
    Sha1(Hmac<Sha1>),
    Sha256(Hmac<Sha256>),
    Sha384(Hmac<Sha384>),
}

impl RecordMac {
    fn new(mac: MacAlgorithm, key: &[u8]) -> Result<Self, Error> {
        let invalid = |_| Error::CryptoError("invalid HMAC key".into());
        match mac {
            MacAlgorithm::Sha1 => Ok(RecordMac::Sha1(
                Mac::new_from_slice(key).map_err(invalid)?,
            )),
            MacAlgorithm::Sha256 => Ok(RecordMac::Sha256(
                Mac::new_from_slice(key).map_err(invalid)?,
            )),
            MacAlgorithm::Sha384 => Ok(RecordMac::Sha384(
                Mac::new_from_slice(key).map_err(invalid)?,
            )),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            RecordMac::Sha1(mac) => mac.update(data),
            RecordMac::Sha256(mac) => mac.update(data),
            RecordMac::Sha384(mac) => mac.update(data),
        }
    }

    fn finalize(self) -> ArrayVec<u8, MAX_MAC_LEN> {
        let mut out = ArrayVec::new();
        match self {
            RecordMac::Sha1(mac) => out
                .try_extend_from_slice(mac.finalize().into_bytes().as_slice())
                .unwrap(),
            RecordMac::Sha256(mac) => out
                .try_extend_from_slice(mac.finalize().into_bytes().as_slice())
                .unwrap(),
            RecordMac::Sha384(mac) => out
                .try_extend_from_slice(mac.finalize().into_bytes().as_slice())
                .unwrap(),
        }
        out
    }
}

/// CBC+HMAC adapter: one direction of a legacy CBC suite.
///
/// The IV arrives via [`Aead::start`]. An empty `start` keeps the
/// chained IV from the previous record (TLS 1.0 implicit-IV mode);
/// otherwise the per-record explicit IV replaces it.
pub(crate) struct CbcHmacAead {
    cipher: BlockCipher,
    mac: RecordMac,
    mac_len: usize,
    direction: Direction,
    explicit_iv_len: usize,
    encrypt_then_mac: bool,
    ad: ArrayVec<u8, 13>,
    iv: [u8; CBC_BLOCK_SIZE],
}

impl CbcHmacAead {
    pub(crate) fn new(
        cipher: CipherAlgorithm,
        mac: MacAlgorithm,
        cipher_key: &[u8],
        mac_key: &[u8],
        direction: Direction,
        explicit_iv_len: usize,
        encrypt_then_mac: bool,
    ) -> Result<Self, Error> {
        Ok(CbcHmacAead {
            cipher: BlockCipher::new(cipher, cipher_key)?,
            mac: RecordMac::new(mac, mac_key)?,
            mac_len: mac.output_len(),
            direction,
            explicit_iv_len,
            encrypt_then_mac,
            ad: ArrayVec::new(),
            iv: [0u8; CBC_BLOCK_SIZE],
        })
    }

    /// The stored AD with its length field replaced.
    fn ad_with_len(&self, len: u16) -> ArrayVec<u8, 13> {
        let mut ad = self.ad.clone();
        ad[11..13].copy_from_slice(&len.to_be_bytes());
        ad
    }

    fn cbc_encrypt(&mut self, data: &mut [u8]) {
        debug_assert_eq!(data.len() % CBC_BLOCK_SIZE, 0);
        let mut prev = self.iv;
        for chunk in data.chunks_mut(CBC_BLOCK_SIZE) {
            for (byte, p) in chunk.iter_mut().zip(&prev) {
                *byte ^= p;
            }
            self.cipher.encrypt_block(chunk);
            prev.copy_from_slice(chunk);
        }
        // Last ciphertext block becomes the next IV in implicit-IV mode.
        self.iv = prev;
    }

    fn cbc_decrypt(&mut self, data: &mut [u8]) {
        debug_assert_eq!(data.len() % CBC_BLOCK_SIZE, 0);
        let mut prev = self.iv;
        for chunk in data.chunks_mut(CBC_BLOCK_SIZE) {
            // invariant: chunks are exactly one block
            let saved: [u8; CBC_BLOCK_SIZE] = chunk.try_into().unwrap();
            self.cipher.decrypt_block(chunk);
            for (byte, p) in chunk.iter_mut().zip(&prev) {
                *byte ^= p;
            }
            prev = saved;
        }
        self.iv = prev;
    }

    fn seal(&mut self, output: &mut Buf, offset: usize) -> Result<(), Error> {
        let ptext_len = output.len() - offset;
        let record_iv = self.iv;

        if self.encrypt_then_mac {
            // Pad and encrypt the plaintext, then MAC over AD' ‖ IV ‖ ct.
            let padded = round_up(ptext_len + 1, CBC_BLOCK_SIZE);
            let pad_byte = (padded - ptext_len - 1) as u8;
            output.resize(offset + padded, pad_byte);
            self.cbc_encrypt(&mut output[offset..]);

            let mut mac = self.mac.clone();
            mac.update(&self.ad_with_len((self.explicit_iv_len + padded) as u16));
            mac.update(&record_iv[..self.explicit_iv_len]);
            mac.update(&output[offset..]);
            let tag = mac.finalize();
            output.extend_from_slice(&tag[..self.mac_len]);
        } else {
            // MAC over AD ‖ plaintext, then pad and encrypt the lot.
            let mut mac = self.mac.clone();
            mac.update(&self.ad);
            mac.update(&output[offset..]);
            let tag = mac.finalize();
            output.extend_from_slice(&tag[..self.mac_len]);

            let data_len = ptext_len + self.mac_len;
            let padded = round_up(data_len + 1, CBC_BLOCK_SIZE);
            let pad_byte = (padded - data_len - 1) as u8;
            output.resize(offset + padded, pad_byte);
            self.cbc_encrypt(&mut output[offset..]);
        }

        Ok(())
    }

    fn open_mte(&mut self, output: &mut Buf, offset: usize) -> Result<(), Error> {
        let ct_len = output.len() - offset;
        if ct_len < self.minimum_final_size() || ct_len % CBC_BLOCK_SIZE != 0 {
            return Err(Error::CryptoError("malformed CBC ciphertext".into()));
        }

        self.cbc_decrypt(&mut output[offset..]);
        let pt = &output[offset..];

        let pad_len = pt[pt.len() - 1] as usize;
        let total_overhead = pad_len + 1 + self.mac_len;
        let good_length = if total_overhead <= pt.len() { 1u8 } else { 0u8 };

        // Check every claimed padding byte without early exit.
        let pad_start = pt.len().saturating_sub(pad_len + 1);
        let mut pad_ok = good_length;
        for &byte in &pt[pad_start..] {
            pad_ok &= byte.ct_eq(&(pad_len as u8)).unwrap_u8();
        }

        let content_len = if good_length == 1 {
            pt.len() - total_overhead
        } else {
            0
        };

        let mut mac = self.mac.clone();
        mac.update(&self.ad_with_len(content_len as u16));
        mac.update(&pt[..content_len]);
        let computed = mac.finalize();

        // Absorb the remainder into a throwaway context so the amount of
        // compression work does not depend on the claimed padding.
        let mut scratch = self.mac.clone();
        scratch.update(&pt[content_len..]);
        let _ = scratch.finalize();

        // content_len == 0 when the length was bad: compare against the
        // buffer head so a comparison always happens.
        let received = &pt[content_len..content_len + self.mac_len];
        let mac_ok = received.ct_eq(&computed[..self.mac_len]).unwrap_u8();

        if pad_ok & mac_ok != 1 {
            return Err(Error::CryptoError("record failed authentication".into()));
        }

        output.truncate(offset + content_len);
        Ok(())
    }

    fn open_etm(&mut self, output: &mut Buf, offset: usize) -> Result<(), Error> {
        let total = output.len() - offset;
        if total < self.minimum_final_size() {
            return Err(Error::CryptoError("CBC record too short".into()));
        }
        let body_len = total - self.mac_len;
        if body_len % CBC_BLOCK_SIZE != 0 {
            return Err(Error::CryptoError("CBC ciphertext not block-aligned".into()));
        }

        let record_iv = self.iv;
        let ct = &output[offset..];

        let mut mac = self.mac.clone();
        mac.update(&self.ad_with_len((self.explicit_iv_len + body_len) as u16));
        mac.update(&record_iv[..self.explicit_iv_len]);
        mac.update(&ct[..body_len]);
        let computed = mac.finalize();

        let mac_ok = ct[body_len..].ct_eq(&computed[..self.mac_len]).unwrap_u8();
        if mac_ok != 1 {
            return Err(Error::CryptoError("record failed authentication".into()));
        }

        output.truncate(offset + body_len);
        self.cbc_decrypt(&mut output[offset..]);

        // MAC already verified; a padding defect here is a peer bug, but
        // it still reports the same error kind.
        let pt = &output[offset..];
        let pad_len = pt[pt.len() - 1] as usize;
        if pad_len + 1 > pt.len() || !pt[pt.len() - pad_len - 1..].iter().all(|&b| b == pad_len as u8)
        {
            return Err(Error::CryptoError("record failed authentication".into()));
        }

        let content_len = pt.len() - pad_len - 1;
        output.truncate(offset + content_len);
        Ok(())
    }
}

impl Aead for CbcHmacAead {
    fn set_ad(&mut self, ad: &[u8]) {
        self.ad.clear();
        self.ad.try_extend_from_slice(ad).expect("ad fits 13 bytes");
    }

    fn start(&mut self, nonce: &[u8]) -> Result<(), Error> {
        if nonce.is_empty() {
            // Implicit-IV mode: chain on from the previous record.
            return Ok(());
        }
        if nonce.len() != CBC_BLOCK_SIZE {
            return Err(Error::CryptoError(format!(
                "CBC IV must be {} bytes, got {}",
                CBC_BLOCK_SIZE,
                nonce.len()
            )));
        }
        self.iv.copy_from_slice(nonce);
        Ok(())
    }

    fn finish(&mut self, output: &mut Buf, offset: usize) -> Result<(), Error> {
        match self.direction {
            Direction::Seal => self.seal(output, offset),
            Direction::Open => {
                if self.encrypt_then_mac {
                    self.open_etm(output, offset)
                } else {
                    self.open_mte(output, offset)
                }
            }
        }
    }

    fn output_length(&self, input_len: usize) -> usize {
        match self.direction {
            Direction::Seal => {
                if self.encrypt_then_mac {
                    round_up(input_len + 1, CBC_BLOCK_SIZE) + self.mac_len
                } else {
                    round_up(input_len + self.mac_len + 1, CBC_BLOCK_SIZE)
                }
            }
            // Upper bound; the exact length is only known after depadding.
            Direction::Open => input_len,
        }
    }

    fn minimum_final_size(&self) -> usize {
        if self.encrypt_then_mac {
            CBC_BLOCK_SIZE + self.mac_len
        } else {
            round_up(self.mac_len + 1, CBC_BLOCK_SIZE)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Aad;
    use crate::types::{ProtocolVersion, RecordType};

    fn pair(mac: MacAlgorithm, etm: bool) -> (CbcHmacAead, CbcHmacAead) {
        let cipher_key = [0x42u8; 16];
        let mac_key = vec![0xABu8; mac.output_len()];
        let seal = CbcHmacAead::new(
            CipherAlgorithm::Aes128CbcHmac,
            mac,
            &cipher_key,
            &mac_key,
            Direction::Seal,
            CBC_BLOCK_SIZE,
            etm,
        )
        .unwrap();
        let open = CbcHmacAead::new(
            CipherAlgorithm::Aes128CbcHmac,
            mac,
            &cipher_key,
            &mac_key,
            Direction::Open,
            CBC_BLOCK_SIZE,
            etm,
        )
        .unwrap();
        (seal, open)
    }

    fn ad_for(len: usize) -> Aad {
        Aad::new(
            1,
            RecordType::ApplicationData,
            ProtocolVersion::TLS1_2,
            len as u16,
        )
    }

    fn protect(seal: &mut CbcHmacAead, iv: &[u8], plaintext: &[u8]) -> Buf {
        let mut buf = Buf::new();
        buf.extend_from_slice(plaintext);
        seal.set_ad(&ad_for(plaintext.len()));
        seal.start(iv).unwrap();
        seal.finish(&mut buf, 0).unwrap();
        buf
    }

    #[test]
    fn mte_roundtrip_all_macs() {
        for mac in [MacAlgorithm::Sha1, MacAlgorithm::Sha256, MacAlgorithm::Sha384] {
            let (mut seal, mut open) = pair(mac, false);
            let iv = [7u8; 16];
            let plaintext = b"hello CBC record";

            let mut buf = protect(&mut seal, &iv, plaintext);
            assert_eq!(
                buf.len(),
                round_up(plaintext.len() + mac.output_len() + 1, CBC_BLOCK_SIZE)
            );

            open.set_ad(&ad_for(buf.len()));
            open.start(&iv).unwrap();
            open.finish(&mut buf, 0).unwrap();
            assert_eq!(&*buf, plaintext);
        }
    }

    #[test]
    fn etm_roundtrip() {
        let (mut seal, mut open) = pair(MacAlgorithm::Sha256, true);
        let iv = [9u8; 16];
        let plaintext = b"encrypt then mac";

        let mut buf = protect(&mut seal, &iv, plaintext);
        assert_eq!(
            buf.len(),
            round_up(plaintext.len() + 1, CBC_BLOCK_SIZE) + 32
        );

        open.set_ad(&ad_for(buf.len()));
        open.start(&iv).unwrap();
        open.finish(&mut buf, 0).unwrap();
        assert_eq!(&*buf, plaintext);
    }

    #[test]
    fn implicit_iv_chains_across_records() {
        let cipher_key = [0x11u8; 16];
        let mac_key = [0x22u8; 20];
        let initial_iv = [0x33u8; 16];

        let mut seal = CbcHmacAead::new(
            CipherAlgorithm::Aes128CbcHmac,
            MacAlgorithm::Sha1,
            &cipher_key,
            &mac_key,
            Direction::Seal,
            0, // implicit-IV mode: nothing on the wire
            false,
        )
        .unwrap();
        let mut open = CbcHmacAead::new(
            CipherAlgorithm::Aes128CbcHmac,
            MacAlgorithm::Sha1,
            &cipher_key,
            &mac_key,
            Direction::Open,
            0,
            false,
        )
        .unwrap();

        seal.start(&initial_iv).unwrap();
        open.start(&initial_iv).unwrap();

        for msg in [&b"first record"[..], &b"second record"[..]] {
            let mut buf = Buf::new();
            buf.extend_from_slice(msg);
            seal.set_ad(&ad_for(msg.len()));
            // Empty start: the IV chains on from the previous ciphertext.
            seal.start(&[]).unwrap();
            seal.finish(&mut buf, 0).unwrap();

            open.set_ad(&ad_for(buf.len()));
            open.start(&[]).unwrap();
            open.finish(&mut buf, 0).unwrap();
            assert_eq!(&*buf, msg);
        }
    }

    #[test]
    fn tampered_ciphertext_rejected() {
        let (mut seal, mut open) = pair(MacAlgorithm::Sha256, false);
        let iv = [0u8; 16];
        let mut buf = protect(&mut seal, &iv, b"secret data");

        buf[3] ^= 0x01;

        open.set_ad(&ad_for(buf.len()));
        open.start(&iv).unwrap();
        assert!(open.finish(&mut buf, 0).is_err());
    }

    #[test]
    fn padding_and_mac_failures_are_indistinguishable() {
        let (mut seal, mut open) = pair(MacAlgorithm::Sha1, false);
        let iv = [5u8; 16];
        let plaintext = [0x61u8; 32];

        // Corrupting the last block garbles the padding; corrupting an
        // early block garbles the plaintext (and so the MAC). Both must
        // fail with the same error.
        let mut errors = Vec::new();
        for corrupt_at in [0usize, 47] {
            let mut buf = protect(&mut seal, &iv, &plaintext);
            buf[corrupt_at] ^= 0x80;

            open.set_ad(&ad_for(buf.len()));
            open.start(&iv).unwrap();
            errors.push(open.finish(&mut buf, 0).unwrap_err());
        }
        assert_eq!(errors[0], errors[1]);
    }

    #[test]
    fn rejects_unaligned_and_short_input() {
        let (_, mut open) = pair(MacAlgorithm::Sha256, false);

        let mut buf = Buf::new();
        buf.extend_from_slice(&[0u8; 17]);
        open.set_ad(&ad_for(17));
        open.start(&[1u8; 16]).unwrap();
        assert!(open.finish(&mut buf, 0).is_err());

        let mut buf = Buf::new();
        buf.extend_from_slice(&[0u8; 16]);
        open.set_ad(&ad_for(16));
        open.start(&[1u8; 16]).unwrap();
        // One block cannot hold a SHA-256 MAC plus padding.
        assert!(open.finish(&mut buf, 0).is_err());
    }
}
