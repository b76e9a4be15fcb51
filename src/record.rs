//! Record framing: the writer and the resumable reader.
//!
//! The reader is a pull parser with buffered restart: callers feed bytes
//! as they arrive and get back the number of additional bytes needed, or
//! zero when a full record is ready. Its only state is `readbuf` plus
//! the caller's input cursor, so cancellation is just dropping the
//! connection.

use crate::buffer::Buf;
use crate::cipher::CipherState;
use crate::error::{AlertDescription, Error};
use crate::rng::SeededRng;
use crate::seq::SequenceNumbers;
use crate::suite::NonceFormat;
use crate::types::{
    parse_dtls_header, parse_tls_header, ProtocolVersion, Record, RecordType, DTLS_HEADER_SIZE,
    MAX_CIPHERTEXT_SIZE, MAX_PLAINTEXT_SIZE, TLS_HEADER_SIZE,
};

/// Borrowed lookup of the cipher state for an epoch.
///
/// The reader does not own cipher states; it borrows one per record so
/// the handshake layer can install and retire epochs without
/// coordinating with an in-flight read.
pub trait CipherStateLookup {
    /// The cipher state for `epoch`, or `None` if it was retired.
    ///
    /// Must return `Some` for any epoch the connection has not
    /// explicitly retired; a `None` for a declared epoch terminates the
    /// connection.
    fn get_cipherstate(&mut self, epoch: u16) -> Option<&mut CipherState>;
}

impl CipherStateLookup for std::collections::HashMap<u16, CipherState> {
    fn get_cipherstate(&mut self, epoch: u16) -> Option<&mut CipherState> {
        self.get_mut(&epoch)
    }
}

/// Bytes the caller has read from the transport but not yet consumed.
///
/// The reader advances `consumed` as it moves bytes into its internal
/// buffer; the caller uses it to know how far the transport cursor
/// moved.
#[derive(Debug)]
pub struct RawInput<'a> {
    data: &'a [u8],
    consumed: usize,
    is_datagram: bool,
}

impl<'a> RawInput<'a> {
    /// Wrap unread transport bytes.
    pub fn new(data: &'a [u8], is_datagram: bool) -> Self {
        RawInput {
            data,
            consumed: 0,
            is_datagram,
        }
    }

    /// Total bytes the reader has taken from this input.
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    /// Bytes not yet taken.
    pub fn remaining(&self) -> usize {
        self.data.len()
    }

    /// True if this input is a datagram (DTLS) transport.
    pub fn is_datagram(&self) -> bool {
        self.is_datagram
    }
}

/// Move bytes from `input` into `readbuf` until it holds `desired`
/// bytes. Returns the remaining deficit, zero when satisfied.
fn fill_buffer_to(readbuf: &mut Buf, input: &mut RawInput, desired: usize) -> usize {
    if readbuf.len() >= desired {
        return 0;
    }

    let taken = input.data.len().min(desired - readbuf.len());
    readbuf.extend_from_slice(&input.data[..taken]);
    input.data = &input.data[taken..];
    input.consumed += taken;

    desired - readbuf.len()
}

/// Serialize and protect one record into `output`.
///
/// `output` is cleared first. Without a cipher state (epoch 0) the
/// record goes out in plaintext. `seq` is the full 64-bit sequence value
/// (epoch in the high 16 bits for DTLS), as handed out by
/// [`SequenceNumbers::next_write_sequence`].
pub fn write_record(
    output: &mut Buf,
    rtype: RecordType,
    data: &[u8],
    version: ProtocolVersion,
    seq: u64,
    cipher_state: Option<&mut CipherState>,
    rng: &mut SeededRng,
) -> Result<(), Error> {
    output.clear();

    if data.len() > MAX_PLAINTEXT_SIZE {
        return Err(Error::PlaintextTooLarge(data.len()));
    }

    output.push(rtype.as_u8());
    version.serialize(output);

    if version.is_datagram() {
        output.extend_from_slice(&seq.to_be_bytes());
    }

    let Some(cs) = cipher_state else {
        // Initial unencrypted handshake records.
        output.extend_from_slice(&(data.len() as u16).to_be_bytes());
        output.extend_from_slice(data);
        return Ok(());
    };

    let ad = cs.format_ad(seq, rtype, version, data.len() as u16);
    let ctext_size = cs.aead().output_length(data.len());
    let rec_size = ctext_size + cs.nonce_bytes_from_record();

    cs.aead_mut().set_ad(&ad);
    let nonce = cs.aead_nonce_write(seq, rng);

    output.extend_from_slice(&(rec_size as u16).to_be_bytes());

    if cs.nonce_bytes_from_record() > 0 {
        if cs.nonce_format() == NonceFormat::CbcMode {
            output.extend_from_slice(&nonce);
        } else {
            output.extend_from_slice(&nonce[cs.nonce_bytes_from_handshake()..]);
        }
    }

    let header_size = output.len();
    output.extend_from_slice(data);

    cs.aead_mut().start(&nonce)?;
    cs.aead_mut().finish(output, header_size)?;

    if output.len() >= MAX_CIPHERTEXT_SIZE {
        return Err(Error::InvalidState(
            "produced ciphertext larger than protocol allows",
        ));
    }

    Ok(())
}

/// Unprotect one record's contents into `output`.
fn decrypt_record(
    output: &mut Buf,
    record_contents: &[u8],
    seq: u64,
    version: ProtocolVersion,
    rtype: RecordType,
    cs: &mut CipherState,
) -> Result<(), Error> {
    let nonce = cs.aead_nonce_read(record_contents, seq)?;
    let msg = &record_contents[cs.nonce_bytes_from_record()..];

    // Rejection on public information (the length), but reported as a
    // MAC failure so padding-oracle scanners get no distinct signal.
    if msg.len() < cs.aead().minimum_final_size() {
        return Err(Error::Alert(AlertDescription::BadRecordMac));
    }

    let ptext_size = cs.aead().output_length(msg.len());

    let ad = cs.format_ad(seq, rtype, version, ptext_size as u16);
    cs.aead_mut().set_ad(&ad);
    cs.aead_mut().start(&nonce)?;

    let offset = output.len();
    output.extend_from_slice(msg);
    cs.aead_mut()
        .finish(output, offset)
        .map_err(|_| Error::Alert(AlertDescription::BadRecordMac))
}

/// Read one record from `input`, resuming from any earlier partial feed.
///
/// Returns the number of additional bytes needed, or zero when `rec`
/// holds a complete record. On DTLS, malformed or replayed datagrams are
/// silently dropped: the call returns zero with `rec.rtype` set to
/// [`RecordType::NoRecord`].
pub fn read_record(
    readbuf: &mut Buf,
    input: &mut RawInput,
    rec: &mut Record,
    sequence_numbers: Option<&mut dyn SequenceNumbers>,
    cipherstates: &mut dyn CipherStateLookup,
) -> Result<usize, Error> {
    if input.is_datagram() {
        read_dtls_record(readbuf, input, rec, sequence_numbers, cipherstates)
    } else {
        read_tls_record(readbuf, input, rec, sequence_numbers, cipherstates)
    }
}

fn read_tls_record(
    readbuf: &mut Buf,
    input: &mut RawInput,
    rec: &mut Record,
    mut sequence_numbers: Option<&mut dyn SequenceNumbers>,
    cipherstates: &mut dyn CipherStateLookup,
) -> Result<usize, Error> {
    if readbuf.len() < TLS_HEADER_SIZE {
        let needed = fill_buffer_to(readbuf, input, TLS_HEADER_SIZE);
        if needed > 0 {
            return Ok(needed);
        }
    }

    let (_, header) = parse_tls_header(&readbuf[..TLS_HEADER_SIZE])
        .map_err(|_| Error::Alert(AlertDescription::DecodeError))?;

    rec.version = header.version;

    if rec.version.is_datagram() {
        return Err(Error::Alert(AlertDescription::ProtocolVersion));
    }

    if header.record_size > MAX_CIPHERTEXT_SIZE {
        return Err(Error::Alert(AlertDescription::RecordOverflow));
    }

    if header.record_size == 0 {
        return Err(Error::Alert(AlertDescription::DecodeError));
    }

    let needed = fill_buffer_to(readbuf, input, TLS_HEADER_SIZE + header.record_size);
    if needed > 0 {
        return Ok(needed);
    }

    rec.rtype = RecordType::from_u8(readbuf[0]);

    let (seq, epoch) = match sequence_numbers.as_deref_mut() {
        Some(sn) => (sn.next_read_sequence()?, sn.current_read_epoch()),
        // Server before its first handshake message.
        None => (0, 0),
    };
    rec.sequence = seq;

    if epoch == 0 {
        // Unencrypted initial handshake.
        rec.data.clear();
        rec.data.extend_from_slice(&readbuf[TLS_HEADER_SIZE..]);
        readbuf.clear();
        return Ok(0);
    }

    let cs = cipherstates
        .get_cipherstate(epoch)
        .ok_or(Error::InvalidState("no cipher state for epoch"))?;

    rec.data.clear();
    decrypt_record(
        &mut rec.data,
        &readbuf[TLS_HEADER_SIZE..],
        seq,
        rec.version,
        rec.rtype,
        cs,
    )?;

    if let Some(sn) = sequence_numbers.as_deref_mut() {
        sn.read_accept(seq);
    }

    readbuf.clear();
    Ok(0)
}

/// DTLS drop: clear all buffers and report no record.
fn silent_drop(readbuf: &mut Buf, rec: &mut Record) -> Result<usize, Error> {
    readbuf.clear();
    rec.rtype = RecordType::NoRecord;
    rec.data.clear();
    Ok(0)
}

fn read_dtls_record(
    readbuf: &mut Buf,
    input: &mut RawInput,
    rec: &mut Record,
    mut sequence_numbers: Option<&mut dyn SequenceNumbers>,
    cipherstates: &mut dyn CipherStateLookup,
) -> Result<usize, Error> {
    if readbuf.len() < DTLS_HEADER_SIZE {
        if fill_buffer_to(readbuf, input, DTLS_HEADER_SIZE) > 0 {
            // Datagrams never resume; a short header is a short datagram.
            return silent_drop(readbuf, rec);
        }
    }

    let Ok((_, header)) = parse_dtls_header(&readbuf[..DTLS_HEADER_SIZE]) else {
        return silent_drop(readbuf, rec);
    };

    rec.version = header.version;

    if !rec.version.is_datagram() {
        trace!("Dropping non-DTLS record on datagram transport");
        return silent_drop(readbuf, rec);
    }

    if header.record_size > MAX_CIPHERTEXT_SIZE {
        // Too large to be valid, ignore it.
        return silent_drop(readbuf, rec);
    }

    if fill_buffer_to(readbuf, input, DTLS_HEADER_SIZE + header.record_size) > 0 {
        trace!("Dropping truncated datagram");
        return silent_drop(readbuf, rec);
    }

    rec.rtype = RecordType::from_u8(readbuf[0]);
    rec.sequence = header.sequence;
    let epoch = (header.sequence >> 48) as u16;

    if let Some(sn) = sequence_numbers.as_deref_mut() {
        if sn.already_seen(header.sequence) {
            trace!("Dropping replayed record, sequence {}", header.sequence);
            return silent_drop(readbuf, rec);
        }
    }

    if epoch == 0 {
        // Unencrypted initial handshake.
        rec.data.clear();
        rec.data.extend_from_slice(&readbuf[DTLS_HEADER_SIZE..]);
        readbuf.clear();
        if let Some(sn) = sequence_numbers.as_deref_mut() {
            sn.read_accept(header.sequence);
        }
        return Ok(0);
    }

    let cs = cipherstates
        .get_cipherstate(epoch)
        .ok_or(Error::InvalidState("no cipher state for epoch"))?;

    rec.data.clear();
    let decrypted = decrypt_record(
        &mut rec.data,
        &readbuf[DTLS_HEADER_SIZE..],
        header.sequence,
        rec.version,
        rec.rtype,
        cs,
    );

    if let Err(e) = decrypted {
        // Corruption is expected on datagram transports.
        trace!("Dropping undecryptable record: {}", e);
        return silent_drop(readbuf, rec);
    }

    if let Some(sn) = sequence_numbers.as_deref_mut() {
        sn.read_accept(header.sequence);
    }

    readbuf.clear();
    Ok(0)
}
