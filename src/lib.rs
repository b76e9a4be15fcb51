//! reclay — TLS/DTLS record layer (Sans-IO)
//!
//! reclay is the record layer of a TLS 1.0–1.2 / DTLS 1.0–1.2 endpoint:
//! it frames, encrypts, decrypts and authenticates every byte that
//! crosses a connection. It is Sans-IO — you bring the transport, the
//! handshake state machine and the key schedule; reclay turns plaintext
//! into protected records and wire bytes back into plaintext.
//!
//! # Goals
//! - **Correct record protection**: AES-GCM, ChaCha20-Poly1305 and the
//!   legacy CBC+HMAC construction (with optional Encrypt-then-MAC)
//!   behind one uniform interface.
//! - **Resumable reading**: the reader consumes whatever bytes the
//!   caller has and returns the deficit, so it fits any event loop
//!   without tasks or timers.
//! - **DTLS tolerance**: malformed, truncated or replayed datagrams are
//!   silently dropped; stream transports get proper fatal alerts.
//! - **Safety**: `forbid(unsafe_code)` throughout the crate.
//!
//! ## Non-goals
//! - **TLS 1.3** record framing
//! - **Handshake** message assembly and state machine
//! - **Key schedule** (PRF/HKDF) — keys arrive via [`SessionKeys`]
//! - **Transport I/O**
//!
//! # Division of labor
//!
//! The layer above owns negotiation and keying and hands the record
//! layer three collaborators:
//! - [`SessionKeys`] — directional key and nonce material from the
//!   handshake, bound into a [`CipherState`] per epoch and direction.
//! - [`SequenceNumbers`] — per-direction counters and epochs;
//!   [`DatagramSequenceNumbers`] adds the DTLS replay window.
//! - [`CipherStateLookup`] — the reader borrows the cipher state for
//!   whatever epoch a record declares, so the handshake can install and
//!   retire epochs freely.
//!
//! # Example
//!
//! ```
//! use std::collections::HashMap;
//!
//! use reclay::buffer::{Buf, ToBuf};
//! use reclay::{read_record, write_record, CipherAlgorithm, CipherState, Ciphersuite};
//! use reclay::{ProtocolVersion, RawInput, Record, RecordType, SeededRng, SessionKeys, Side};
//! use reclay::{SequenceNumbers, StreamSequenceNumbers};
//!
//! # fn main() -> Result<(), reclay::Error> {
//! let suite = Ciphersuite::aead(CipherAlgorithm::Aes128Gcm);
//! let keys = SessionKeys::new(
//!     vec![0x11; 16].to_buf(),
//!     vec![1, 2, 3, 4].to_buf(),
//!     vec![0x22; 16].to_buf(),
//!     vec![5, 6, 7, 8].to_buf(),
//! );
//! let version = ProtocolVersion::TLS1_2;
//!
//! // The client protects a record...
//! let mut write_cs = CipherState::new(version, Side::Client, true, &suite, &keys, false)?;
//! let mut rng = SeededRng::new(None);
//! let mut wire = Buf::new();
//! write_record(
//!     &mut wire,
//!     RecordType::ApplicationData,
//!     b"hello",
//!     version,
//!     0,
//!     Some(&mut write_cs),
//!     &mut rng,
//! )?;
//!
//! // ...and the server reads it back.
//! let read_cs = CipherState::new(version, Side::Client, false, &suite, &keys, false)?;
//! let mut epochs: HashMap<u16, CipherState> = HashMap::new();
//! epochs.insert(1, read_cs);
//!
//! let mut sn = StreamSequenceNumbers::new();
//! sn.new_read_cipher_state(); // handshake installed epoch 1
//!
//! let mut readbuf = Buf::new();
//! let mut input = RawInput::new(&wire, false);
//! let mut rec = Record::new();
//! let needed = read_record(&mut readbuf, &mut input, &mut rec, Some(&mut sn), &mut epochs)?;
//! assert_eq!(needed, 0);
//! assert_eq!(&*rec.data, b"hello");
//! # Ok(())
//! # }
//! ```
//!
//! ### MSRV
//! Rust 1.81.0
#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![allow(clippy::upper_case_acronyms)]
#![deny(missing_docs)]

#[macro_use]
extern crate log;

pub mod buffer;

mod cipher;
pub use cipher::CipherState;

pub mod crypto;

mod error;
pub use error::{AlertDescription, Error};

mod record;
pub use record::{read_record, write_record, CipherStateLookup, RawInput};

mod rng;
pub use rng::SeededRng;

mod seq;
pub use seq::{DatagramSequenceNumbers, SequenceNumbers, StreamSequenceNumbers};

mod suite;
pub use suite::{CipherAlgorithm, Ciphersuite, MacAlgorithm, NonceFormat, SessionKeys};

mod types;
pub use types::{
    ProtocolVersion, Record, RecordType, Side, DTLS_HEADER_SIZE, MAX_CIPHERTEXT_SIZE,
    MAX_PLAINTEXT_SIZE, TLS_HEADER_SIZE,
};

mod util;

mod window;
pub use window::ReplayWindow;
