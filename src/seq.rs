//! Per-connection sequence number and epoch tracking.

use std::collections::HashMap;

use crate::error::Error;
use crate::window::ReplayWindow;

/// Low 48 bits of a DTLS sequence value; the high 16 bits are the epoch.
const SEQ_MASK: u64 = 0xFFFF_FFFF_FFFF;

/// Sequence number and epoch bookkeeping the record layer relies on.
///
/// The handshake layer installs new epochs via the `new_*_cipher_state`
/// hooks; the record layer consumes the rest. All counters are
/// per-direction.
pub trait SequenceNumbers {
    /// A new read epoch was installed: bump the epoch, reset read state.
    fn new_read_cipher_state(&mut self);

    /// A new write epoch was installed: bump the epoch, reset the counter.
    fn new_write_cipher_state(&mut self);

    /// Epoch used for incoming records.
    fn current_read_epoch(&self) -> u16;

    /// Epoch used for outgoing records.
    fn current_write_epoch(&self) -> u16;

    /// Sequence value the next incoming record is expected to carry.
    ///
    /// DTLS transports carry the sequence in the record header instead
    /// and refuse this call.
    fn next_read_sequence(&mut self) -> Result<u64, Error>;

    /// Sequence value to use for the next outgoing record.
    ///
    /// Fails when the counter space is exhausted; the connection must be
    /// torn down rather than reuse a sequence (and with it, a nonce).
    fn next_write_sequence(&mut self) -> Result<u64, Error>;

    /// Commit the sequence returned by [`next_write_sequence`] after the
    /// record was produced.
    ///
    /// [`next_write_sequence`]: Self::next_write_sequence
    fn write_accept(&mut self);

    /// Record that `seq` was read and authenticated successfully.
    fn read_accept(&mut self, seq: u64);

    /// True if `seq` was already accepted, or is too old to tell (DTLS).
    fn already_seen(&self, seq: u64) -> bool;
}

/// Sequence numbers for stream (TLS) transports.
///
/// Plain monotonic counters; the wire never carries them, so replay
/// detection is not applicable.
#[derive(Debug, Default)]
pub struct StreamSequenceNumbers {
    write_seq: u64,
    read_seq: u64,
    write_epoch: u16,
    read_epoch: u16,
}

impl StreamSequenceNumbers {
    /// Fresh counters at epoch 0.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SequenceNumbers for StreamSequenceNumbers {
    fn new_read_cipher_state(&mut self) {
        self.read_epoch += 1;
        self.read_seq = 0;
    }

    fn new_write_cipher_state(&mut self) {
        self.write_epoch += 1;
        self.write_seq = 0;
    }

    fn current_read_epoch(&self) -> u16 {
        self.read_epoch
    }

    fn current_write_epoch(&self) -> u16 {
        self.write_epoch
    }

    fn next_read_sequence(&mut self) -> Result<u64, Error> {
        Ok(self.read_seq)
    }

    fn next_write_sequence(&mut self) -> Result<u64, Error> {
        if self.write_seq == u64::MAX {
            return Err(Error::InvalidState("write sequence space exhausted"));
        }
        Ok(self.write_seq)
    }

    fn write_accept(&mut self) {
        self.write_seq += 1;
    }

    fn read_accept(&mut self, _seq: u64) {
        self.read_seq += 1;
    }

    fn already_seen(&self, _seq: u64) -> bool {
        false
    }
}

/// Sequence numbers for datagram (DTLS) transports.
///
/// Write counters are kept per epoch so that handshake retransmissions in
/// an old epoch keep their own numbering. The read side tracks a replay
/// window for the current epoch only.
#[derive(Debug)]
pub struct DatagramSequenceNumbers {
    write_epoch: u16,
    read_epoch: u16,
    write_seqs: HashMap<u16, u64>,
    window: ReplayWindow,
}

impl Default for DatagramSequenceNumbers {
    fn default() -> Self {
        Self::new()
    }
}

impl DatagramSequenceNumbers {
    /// Fresh counters at epoch 0.
    pub fn new() -> Self {
        let mut write_seqs = HashMap::new();
        write_seqs.insert(0, 0);
        DatagramSequenceNumbers {
            write_epoch: 0,
            read_epoch: 0,
            write_seqs,
            window: ReplayWindow::new(),
        }
    }
}

impl SequenceNumbers for DatagramSequenceNumbers {
    fn new_read_cipher_state(&mut self) {
        self.read_epoch += 1;
        self.window.reset();
    }

    fn new_write_cipher_state(&mut self) {
        self.write_epoch += 1;
        self.write_seqs.insert(self.write_epoch, 0);
    }

    fn current_read_epoch(&self) -> u16 {
        self.read_epoch
    }

    fn current_write_epoch(&self) -> u16 {
        self.write_epoch
    }

    fn next_read_sequence(&mut self) -> Result<u64, Error> {
        Err(Error::InvalidState("DTLS uses explicit sequence numbers"))
    }

    fn next_write_sequence(&mut self) -> Result<u64, Error> {
        let epoch = self.write_epoch;
        let seq = self
            .write_seqs
            .get(&epoch)
            .copied()
            .ok_or(Error::InvalidState("no write counter for current epoch"))?;
        if seq > SEQ_MASK {
            return Err(Error::InvalidState("write sequence space exhausted"));
        }
        Ok((epoch as u64) << 48 | seq)
    }

    fn write_accept(&mut self) {
        if let Some(seq) = self.write_seqs.get_mut(&self.write_epoch) {
            *seq += 1;
        }
    }

    fn read_accept(&mut self, seq: u64) {
        let epoch = (seq >> 48) as u16;
        // The window tracks the current epoch only. Accepts for other
        // epochs (e.g. late epoch-0 plaintext) are not recorded.
        if epoch == self.read_epoch {
            self.window.accept(seq & SEQ_MASK);
        }
    }

    fn already_seen(&self, seq: u64) -> bool {
        let epoch = (seq >> 48) as u16;
        if epoch != self.read_epoch {
            return false;
        }
        self.window.already_seen(seq & SEQ_MASK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_counters_advance_on_accept() {
        let mut sn = StreamSequenceNumbers::new();

        assert_eq!(sn.next_write_sequence().unwrap(), 0);
        // Not committed yet: asking again gives the same value.
        assert_eq!(sn.next_write_sequence().unwrap(), 0);
        sn.write_accept();
        assert_eq!(sn.next_write_sequence().unwrap(), 1);

        assert_eq!(sn.next_read_sequence().unwrap(), 0);
        sn.read_accept(0);
        assert_eq!(sn.next_read_sequence().unwrap(), 1);
    }

    #[test]
    fn stream_epoch_install_resets_counters() {
        let mut sn = StreamSequenceNumbers::new();
        sn.write_accept();
        sn.write_accept();
        sn.new_write_cipher_state();
        assert_eq!(sn.current_write_epoch(), 1);
        assert_eq!(sn.next_write_sequence().unwrap(), 0);

        sn.read_accept(0);
        sn.new_read_cipher_state();
        assert_eq!(sn.current_read_epoch(), 1);
        assert_eq!(sn.next_read_sequence().unwrap(), 0);
    }

    #[test]
    fn datagram_sequence_packs_epoch() {
        let mut sn = DatagramSequenceNumbers::new();
        sn.new_write_cipher_state();
        assert_eq!(sn.next_write_sequence().unwrap(), 1u64 << 48);
        sn.write_accept();
        assert_eq!(sn.next_write_sequence().unwrap(), (1u64 << 48) | 1);
    }

    #[test]
    fn datagram_old_epoch_counter_survives() {
        let mut sn = DatagramSequenceNumbers::new();
        sn.write_accept(); // epoch 0, seq 0 used
        sn.new_write_cipher_state();
        sn.write_accept(); // epoch 1, seq 0 used

        // Epoch 1 continues from its own counter.
        assert_eq!(sn.next_write_sequence().unwrap(), (1u64 << 48) | 1);
    }

    #[test]
    fn datagram_replay_detection() {
        let mut sn = DatagramSequenceNumbers::new();
        sn.new_read_cipher_state(); // epoch 1
        let seq = |n: u64| (1u64 << 48) | n;

        assert!(!sn.already_seen(seq(1)));
        sn.read_accept(seq(1));
        assert!(sn.already_seen(seq(1)));

        sn.read_accept(seq(2));
        sn.read_accept(seq(3));
        assert!(sn.already_seen(seq(2)));
        assert!(!sn.already_seen(seq(4)));

        // Other epochs are not the window's concern.
        assert!(!sn.already_seen(1));
    }

    #[test]
    fn datagram_read_epoch_reset_clears_window() {
        let mut sn = DatagramSequenceNumbers::new();
        sn.new_read_cipher_state();
        sn.read_accept((1u64 << 48) | 7);
        sn.new_read_cipher_state();
        assert!(!sn.already_seen((2u64 << 48) | 7));
    }

    #[test]
    fn dtls_has_no_implicit_read_sequence() {
        let mut sn = DatagramSequenceNumbers::new();
        assert!(sn.next_read_sequence().is_err());
    }
}
