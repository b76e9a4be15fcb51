#![no_main]

//! Fuzz target for the resumable record reader.
//!
//! Feeds arbitrary bytes through both the TLS and DTLS read paths,
//! including a variant with a well-formed header prefix so the parser
//! gets past the cheap early checks. The reader must never panic; any
//! outcome (deficit, record, drop, alert) is acceptable.

use libfuzzer_sys::fuzz_target;
use std::collections::HashMap;

use reclay::buffer::Buf;
use reclay::{
    read_record, CipherState, DatagramSequenceNumbers, RawInput, Record, StreamSequenceNumbers,
};

fuzz_target!(|data: &[u8]| {
    let mut epochs: HashMap<u16, CipherState> = HashMap::new();

    // TLS path, fed in two arbitrary chunks to exercise resumption.
    let split = data.len() / 2;
    let mut sn = StreamSequenceNumbers::new();
    let mut readbuf = Buf::new();
    let mut rec = Record::new();

    let mut input = RawInput::new(&data[..split], false);
    if read_record(&mut readbuf, &mut input, &mut rec, Some(&mut sn), &mut epochs).is_ok() {
        let mut input = RawInput::new(&data[split..], false);
        let _ = read_record(&mut readbuf, &mut input, &mut rec, Some(&mut sn), &mut epochs);
    }

    // DTLS path: as-is, then with a valid epoch-0 header bolted on.
    let mut sn = DatagramSequenceNumbers::new();
    let mut readbuf = Buf::new();
    let mut input = RawInput::new(data, true);
    let _ = read_record(&mut readbuf, &mut input, &mut rec, Some(&mut sn), &mut epochs);

    let mut datagram = vec![22u8]; // handshake
    datagram.extend_from_slice(&[0xFE, 0xFD]); // DTLS 1.2
    datagram.extend_from_slice(&[0, 0]); // epoch 0
    datagram.extend_from_slice(&[0, 0, 0, 0, 0, 1]); // sequence 1
    let frag_len = data.len().min(16384) as u16;
    datagram.extend_from_slice(&frag_len.to_be_bytes());
    datagram.extend_from_slice(&data[..frag_len as usize]);

    let mut readbuf = Buf::new();
    let mut input = RawInput::new(&datagram, true);
    let _ = read_record(&mut readbuf, &mut input, &mut rec, Some(&mut sn), &mut epochs);
});
