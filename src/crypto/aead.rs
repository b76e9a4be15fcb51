//! AES-GCM and ChaCha20-Poly1305 behind the [`Aead`] capability set.

use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes128Gcm, Aes256Gcm};
use arrayvec::ArrayVec;
use chacha20poly1305::ChaCha20Poly1305;

use crate::buffer::Buf;
use crate::crypto::{Aead, Direction, TAG_LEN};
use crate::error::Error;
use crate::suite::CipherAlgorithm;

enum Engine {
    Aes128(Box<Aes128Gcm>),
    Aes256(Box<Aes256Gcm>),
    ChaCha(Box<ChaCha20Poly1305>),
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Engine::Aes128(_) => "Aes128Gcm",
            Engine::Aes256(_) => "Aes256Gcm",
            Engine::ChaCha(_) => "ChaCha20Poly1305",
        };
        f.write_str(name)
    }
}

/// True AEAD record protection (12-byte nonce, 16-byte tag).
#[derive(Debug)]
pub(crate) struct RecordAead {
    engine: Engine,
    direction: Direction,
    ad: ArrayVec<u8, 13>,
    nonce: ArrayVec<u8, 12>,
}

impl RecordAead {
    pub(crate) fn new(
        cipher: CipherAlgorithm,
        key: &[u8],
        direction: Direction,
    ) -> Result<Self, Error> {
        let engine = match cipher {
            CipherAlgorithm::Aes128Gcm => Engine::Aes128(Box::new(
                Aes128Gcm::new_from_slice(key)
                    .map_err(|_| Error::CryptoError("invalid AES-128-GCM key length".into()))?,
            )),
            CipherAlgorithm::Aes256Gcm => Engine::Aes256(Box::new(
                Aes256Gcm::new_from_slice(key)
                    .map_err(|_| Error::CryptoError("invalid AES-256-GCM key length".into()))?,
            )),
            CipherAlgorithm::ChaCha20Poly1305 => Engine::ChaCha(Box::new(
                ChaCha20Poly1305::new_from_slice(key)
                    .map_err(|_| Error::CryptoError("invalid ChaCha20 key length".into()))?,
            )),
            CipherAlgorithm::Aes128CbcHmac | CipherAlgorithm::Aes256CbcHmac => {
                return Err(Error::InvalidState("CBC suites use the CBC+HMAC adapter"))
            }
        };
        Ok(RecordAead {
            engine,
            direction,
            ad: ArrayVec::new(),
            nonce: ArrayVec::new(),
        })
    }

    fn seal(&self, buf: &mut [u8]) -> Result<[u8; TAG_LEN], Error> {
        let nonce = aes_gcm::Nonce::from_slice(&self.nonce);
        let tag = match &self.engine {
            Engine::Aes128(c) => c.encrypt_in_place_detached(nonce, &self.ad, buf),
            Engine::Aes256(c) => c.encrypt_in_place_detached(nonce, &self.ad, buf),
            Engine::ChaCha(c) => c.encrypt_in_place_detached(nonce, &self.ad, buf),
        }
        .map_err(|_| Error::CryptoError("AEAD encryption failed".into()))?;
        Ok(tag.into())
    }

    fn open(&self, buf: &mut [u8], tag: &[u8; TAG_LEN]) -> Result<(), Error> {
        let nonce = aes_gcm::Nonce::from_slice(&self.nonce);
        let tag = aes_gcm::Tag::from_slice(tag);
        match &self.engine {
            Engine::Aes128(c) => c.decrypt_in_place_detached(nonce, &self.ad, buf, tag),
            Engine::Aes256(c) => c.decrypt_in_place_detached(nonce, &self.ad, buf, tag),
            Engine::ChaCha(c) => c.decrypt_in_place_detached(nonce, &self.ad, buf, tag),
        }
        .map_err(|_| Error::CryptoError("AEAD authentication failed".into()))
    }
}

impl Aead for RecordAead {
    fn set_ad(&mut self, ad: &[u8]) {
        self.ad.clear();
        self.ad.try_extend_from_slice(ad).expect("ad fits 13 bytes");
    }

    fn start(&mut self, nonce: &[u8]) -> Result<(), Error> {
        if nonce.len() != 12 {
            return Err(Error::CryptoError(format!(
                "AEAD nonce must be 12 bytes, got {}",
                nonce.len()
            )));
        }
        self.nonce.clear();
        self.nonce.try_extend_from_slice(nonce).unwrap();
        Ok(())
    }

    fn finish(&mut self, output: &mut Buf, offset: usize) -> Result<(), Error> {
        match self.direction {
            Direction::Seal => {
                let tag = self.seal(&mut output[offset..])?;
                output.extend_from_slice(&tag);
                Ok(())
            }
            Direction::Open => {
                let len = output.len() - offset;
                if len < TAG_LEN {
                    return Err(Error::CryptoError("ciphertext shorter than tag".into()));
                }
                let tag_pos = output.len() - TAG_LEN;
                let mut tag = [0u8; TAG_LEN];
                tag.copy_from_slice(&output[tag_pos..]);
                self.open(&mut output[offset..tag_pos], &tag)?;
                output.truncate(tag_pos);
                Ok(())
            }
        }
    }

    fn output_length(&self, input_len: usize) -> usize {
        match self.direction {
            Direction::Seal => input_len + TAG_LEN,
            Direction::Open => input_len.saturating_sub(TAG_LEN),
        }
    }

    fn minimum_final_size(&self) -> usize {
        TAG_LEN
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(cipher: CipherAlgorithm, key: &[u8]) -> (RecordAead, RecordAead) {
        let seal = RecordAead::new(cipher, key, Direction::Seal).unwrap();
        let open = RecordAead::new(cipher, key, Direction::Open).unwrap();
        (seal, open)
    }

    #[test]
    fn roundtrip_at_offset() {
        for (cipher, keylen) in [
            (CipherAlgorithm::Aes128Gcm, 16),
            (CipherAlgorithm::Aes256Gcm, 32),
            (CipherAlgorithm::ChaCha20Poly1305, 32),
        ] {
            let key = vec![0x42u8; keylen];
            let (mut seal, mut open) = pair(cipher, &key);

            let nonce = [7u8; 12];
            let ad = [1u8; 13];

            // Header bytes before the message stay untouched.
            let mut buf = Buf::new();
            buf.extend_from_slice(b"hdr");
            buf.extend_from_slice(b"secret message");

            seal.set_ad(&ad);
            seal.start(&nonce).unwrap();
            seal.finish(&mut buf, 3).unwrap();
            assert_eq!(&buf[..3], b"hdr");
            assert_eq!(buf.len(), 3 + 14 + TAG_LEN);

            open.set_ad(&ad);
            open.start(&nonce).unwrap();
            open.finish(&mut buf, 3).unwrap();
            assert_eq!(&buf[3..], b"secret message");
        }
    }

    #[test]
    fn tampered_tag_rejected() {
        let key = [9u8; 16];
        let (mut seal, mut open) = pair(CipherAlgorithm::Aes128Gcm, &key);

        let mut buf = Buf::new();
        buf.extend_from_slice(b"data");
        seal.set_ad(&[0u8; 13]);
        seal.start(&[0u8; 12]).unwrap();
        seal.finish(&mut buf, 0).unwrap();

        let last = buf.len() - 1;
        buf[last] ^= 1;

        open.set_ad(&[0u8; 13]);
        open.start(&[0u8; 12]).unwrap();
        assert!(open.finish(&mut buf, 0).is_err());
    }

    #[test]
    fn output_lengths() {
        let key = [0u8; 32];
        let (seal, open) = pair(CipherAlgorithm::ChaCha20Poly1305, &key);
        assert_eq!(seal.output_length(100), 116);
        assert_eq!(open.output_length(116), 100);
        assert_eq!(open.minimum_final_size(), TAG_LEN);
    }
}
