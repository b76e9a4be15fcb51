//! Ciphersuite descriptors and handshake-derived key material.
//!
//! The ciphersuite registry and negotiation live in the layer above; the
//! record layer only consumes the fields that decide how a record is
//! protected: the cipher, the MAC (for CBC suites) and the nonce format.

use crate::buffer::Buf;
use crate::types::{ProtocolVersion, Side};

/// How the per-record AEAD nonce is constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonceFormat {
    /// Legacy CBC+HMAC: the "nonce" is the CBC IV.
    CbcMode,
    /// 12-byte nonce = implicit(12) XOR padded sequence (RFC 7905 style).
    AeadXor12,
    /// 12-byte nonce = implicit(4) then 8 explicit wire bytes (RFC 5288).
    AeadImplicit4,
}

/// Record protection algorithms the record layer can instantiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherAlgorithm {
    /// AES-128 in GCM mode.
    Aes128Gcm,
    /// AES-256 in GCM mode.
    Aes256Gcm,
    /// ChaCha20-Poly1305.
    ChaCha20Poly1305,
    /// AES-128-CBC with HMAC.
    Aes128CbcHmac,
    /// AES-256-CBC with HMAC.
    Aes256CbcHmac,
}

impl CipherAlgorithm {
    /// Cipher key length in bytes.
    pub fn keylen(&self) -> usize {
        match self {
            CipherAlgorithm::Aes128Gcm => 16,
            CipherAlgorithm::Aes256Gcm => 32,
            CipherAlgorithm::ChaCha20Poly1305 => 32,
            CipherAlgorithm::Aes128CbcHmac => 16,
            CipherAlgorithm::Aes256CbcHmac => 32,
        }
    }

    /// True for the legacy CBC+HMAC constructions.
    pub fn is_cbc(&self) -> bool {
        matches!(
            self,
            CipherAlgorithm::Aes128CbcHmac | CipherAlgorithm::Aes256CbcHmac
        )
    }
}

/// HMAC hash for CBC suites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacAlgorithm {
    /// HMAC-SHA1.
    Sha1,
    /// HMAC-SHA256.
    Sha256,
    /// HMAC-SHA384.
    Sha384,
}

impl MacAlgorithm {
    /// MAC output (and key) length in bytes.
    pub fn output_len(&self) -> usize {
        match self {
            MacAlgorithm::Sha1 => 20,
            MacAlgorithm::Sha256 => 32,
            MacAlgorithm::Sha384 => 48,
        }
    }
}

/// The slice of a negotiated ciphersuite the record layer consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ciphersuite {
    /// Record protection cipher.
    pub cipher: CipherAlgorithm,
    /// MAC hash. Only consulted by CBC suites.
    pub mac: Option<MacAlgorithm>,
}

impl Ciphersuite {
    /// Descriptor for an AEAD suite.
    pub const fn aead(cipher: CipherAlgorithm) -> Self {
        Ciphersuite { cipher, mac: None }
    }

    /// Descriptor for a CBC+HMAC suite.
    pub const fn cbc(cipher: CipherAlgorithm, mac: MacAlgorithm) -> Self {
        Ciphersuite {
            cipher,
            mac: Some(mac),
        }
    }

    /// Nonce construction for this suite.
    pub fn nonce_format(&self) -> NonceFormat {
        match self.cipher {
            CipherAlgorithm::Aes128Gcm | CipherAlgorithm::Aes256Gcm => NonceFormat::AeadImplicit4,
            CipherAlgorithm::ChaCha20Poly1305 => NonceFormat::AeadXor12,
            CipherAlgorithm::Aes128CbcHmac | CipherAlgorithm::Aes256CbcHmac => NonceFormat::CbcMode,
        }
    }

    /// Cipher key length in bytes.
    pub fn cipher_keylen(&self) -> usize {
        self.cipher.keylen()
    }

    /// MAC key length in bytes. Zero for AEAD suites.
    pub fn mac_keylen(&self) -> usize {
        if self.cipher.is_cbc() {
            self.mac.map(|m| m.output_len()).unwrap_or(0)
        } else {
            0
        }
    }

    /// Nonce bytes taken from the handshake key block (the implicit part).
    ///
    /// For AEAD suites this plus [`nonce_bytes_from_record`] is the
    /// 12-byte AEAD nonce. For CBC the handshake contributes the initial
    /// IV only in the implicit-IV era (TLS 1.0).
    ///
    /// [`nonce_bytes_from_record`]: Self::nonce_bytes_from_record
    pub fn nonce_bytes_from_handshake(&self, version: ProtocolVersion) -> usize {
        match self.nonce_format() {
            NonceFormat::AeadXor12 => 12,
            NonceFormat::AeadImplicit4 => 4,
            NonceFormat::CbcMode => {
                if version.supports_explicit_cbc_ivs() {
                    0
                } else {
                    CBC_BLOCK_SIZE
                }
            }
        }
    }

    /// Nonce bytes carried in each record (the explicit part).
    pub fn nonce_bytes_from_record(&self, version: ProtocolVersion) -> usize {
        match self.nonce_format() {
            NonceFormat::AeadXor12 => 0,
            NonceFormat::AeadImplicit4 => 8,
            NonceFormat::CbcMode => {
                if version.supports_explicit_cbc_ivs() {
                    CBC_BLOCK_SIZE
                } else {
                    0
                }
            }
        }
    }
}

/// AES block size, the CBC IV width.
pub(crate) const CBC_BLOCK_SIZE: usize = 16;

/// Directional key and nonce material produced by the handshake.
///
/// For CBC suites the key buffer is `mac_key ‖ cipher_key`; the cipher
/// state splits it. The nonce buffers hold the implicit nonce (AEAD
/// salt), or the initial IV for implicit-IV CBC.
#[derive(Debug)]
pub struct SessionKeys {
    client_key: Buf,
    client_nonce: Buf,
    server_key: Buf,
    server_nonce: Buf,
}

impl SessionKeys {
    /// Bundle the per-direction key material.
    pub fn new(client_key: Buf, client_nonce: Buf, server_key: Buf, server_nonce: Buf) -> Self {
        SessionKeys {
            client_key,
            client_nonce,
            server_key,
            server_nonce,
        }
    }

    /// Key material for records written by `side`.
    pub fn aead_key(&self, side: Side) -> &[u8] {
        match side {
            Side::Client => &self.client_key,
            Side::Server => &self.server_key,
        }
    }

    /// Implicit nonce material for records written by `side`.
    pub fn nonce(&self, side: Side) -> &[u8] {
        match side {
            Side::Client => &self.client_nonce,
            Side::Server => &self.server_nonce,
        }
    }
}
