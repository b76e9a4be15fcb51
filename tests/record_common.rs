//! Shared helpers for record layer integration tests.
#![allow(dead_code)]

use std::collections::HashMap;

use reclay::buffer::{Buf, ToBuf};
use reclay::{CipherAlgorithm, CipherState, Ciphersuite, MacAlgorithm};
use reclay::{ProtocolVersion, RawInput, Record, SeededRng, SequenceNumbers, SessionKeys, Side};

/// Deterministic key material sized for the suite, distinct per side.
pub fn session_keys(suite: &Ciphersuite, version: ProtocolVersion) -> SessionKeys {
    let key_len = suite.mac_keylen() + suite.cipher_keylen();
    let nonce_len = suite.nonce_bytes_from_handshake(version);

    let client_key: Vec<u8> = (0..key_len).map(|i| i as u8).collect();
    let server_key: Vec<u8> = (0..key_len).map(|i| (i as u8).wrapping_add(0x80)).collect();
    let client_nonce: Vec<u8> = (0..nonce_len).map(|i| i as u8 + 1).collect();
    let server_nonce: Vec<u8> = (0..nonce_len).map(|i| i as u8 + 0x41).collect();

    SessionKeys::new(
        client_key.to_buf(),
        client_nonce.to_buf(),
        server_key.to_buf(),
        server_nonce.to_buf(),
    )
}

/// A client-side writer and the matching reader lookup at `epoch`,
/// both keyed for client-to-server traffic.
pub fn client_to_server(
    version: ProtocolVersion,
    suite: &Ciphersuite,
    etm: bool,
    epoch: u16,
) -> (CipherState, HashMap<u16, CipherState>) {
    let keys = session_keys(suite, version);
    let write = CipherState::new(version, Side::Client, true, suite, &keys, etm).unwrap();
    let read = CipherState::new(version, Side::Client, false, suite, &keys, etm).unwrap();

    let mut epochs = HashMap::new();
    epochs.insert(epoch, read);
    (write, epochs)
}

/// Every suite the record layer supports, with a label for assertions.
pub fn all_suites() -> Vec<(&'static str, Ciphersuite, bool)> {
    vec![
        ("aes128-gcm", Ciphersuite::aead(CipherAlgorithm::Aes128Gcm), false),
        ("aes256-gcm", Ciphersuite::aead(CipherAlgorithm::Aes256Gcm), false),
        (
            "chacha20-poly1305",
            Ciphersuite::aead(CipherAlgorithm::ChaCha20Poly1305),
            false,
        ),
        (
            "aes128-cbc-sha1",
            Ciphersuite::cbc(CipherAlgorithm::Aes128CbcHmac, MacAlgorithm::Sha1),
            false,
        ),
        (
            "aes256-cbc-sha384",
            Ciphersuite::cbc(CipherAlgorithm::Aes256CbcHmac, MacAlgorithm::Sha384),
            false,
        ),
        (
            "aes128-cbc-sha256-etm",
            Ciphersuite::cbc(CipherAlgorithm::Aes128CbcHmac, MacAlgorithm::Sha256),
            true,
        ),
    ]
}

/// Read a full record from `wire` in one call, expecting success.
pub fn read_one(
    wire: &[u8],
    is_datagram: bool,
    sn: &mut dyn SequenceNumbers,
    epochs: &mut HashMap<u16, CipherState>,
) -> Record {
    let mut readbuf = Buf::new();
    let mut input = RawInput::new(wire, is_datagram);
    let mut rec = Record::new();
    let needed = reclay::read_record(&mut readbuf, &mut input, &mut rec, Some(sn), epochs)
        .expect("read_record");
    assert_eq!(needed, 0, "expected a complete record");
    rec
}

/// A seeded RNG so tests are reproducible.
pub fn test_rng() -> SeededRng {
    SeededRng::new(Some(0x5EED))
}
