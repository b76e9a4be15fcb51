/// Sliding replay window for DTLS record sequence numbers.
///
/// Maintains the highest accepted sequence number and a 64-bit bitmap of
/// the last 64 seen sequence numbers to reject duplicates and old records.
///
/// Each epoch gets its own window state; the sequence-number tracker is
/// responsible for resetting it when a new read epoch is installed.
#[derive(Debug, Default)]
pub struct ReplayWindow {
    max_seq: u64,
    window: u64,
}

impl ReplayWindow {
    /// Create an empty window.
    pub fn new() -> Self {
        Self::default()
    }

    /// True if `seqno` is a duplicate or older than the window reaches.
    pub fn already_seen(&self, seqno: u64) -> bool {
        if seqno > self.max_seq {
            return false;
        }
        let offset = self.max_seq - seqno;
        if offset >= 64 {
            return true; // too old
        }
        (self.window >> offset) & 1 == 1
    }

    /// Mark `seqno` as seen, sliding the window forward if it is newer
    /// than anything accepted so far.
    pub fn accept(&mut self, seqno: u64) {
        if seqno > self.max_seq {
            let delta = seqno - self.max_seq;
            if delta > 63 {
                // Jump exceeds window size: clear entirely, only newest is seen
                self.window = 1;
            } else {
                self.window <<= delta;
                self.window |= 1; // mark newest as seen
            }
            self.max_seq = seqno;
        } else {
            let offset = self.max_seq - seqno;
            if offset < 64 {
                self.window |= 1 << offset;
            }
        }
    }

    /// Forget all state (new epoch).
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_fresh_and_rejects_duplicate() {
        let mut w = ReplayWindow::new();
        assert!(!w.already_seen(1));
        w.accept(1);
        assert!(w.already_seen(1)); // duplicate
        assert!(!w.already_seen(2)); // next fresh
    }

    #[test]
    fn accepts_out_of_order_within_window() {
        let mut w = ReplayWindow::new();
        w.accept(10); // establish max=10
        assert!(!w.already_seen(8)); // unseen within 64
        w.accept(8);
        assert!(w.already_seen(8)); // duplicate now
        assert!(!w.already_seen(9)); // unseen within 64
    }

    #[test]
    fn rejects_too_old() {
        let mut w = ReplayWindow::new();
        w.accept(100);
        // offset = 64 -> too old
        assert!(w.already_seen(36));
        // offset = 63 -> allowed once
        assert!(!w.already_seen(37));
    }

    #[test]
    fn handles_large_jump_and_window_shift() {
        let mut w = ReplayWindow::new();
        w.accept(1);
        // Large forward jump clears the window entirely
        w.accept(80);
        // Within window of new max and unseen
        assert!(!w.already_seen(79));
        // Too old relative to new max
        assert!(w.already_seen(15));
    }

    #[test]
    fn large_jump_does_not_leave_stale_bits() {
        let mut w = ReplayWindow::new();
        w.accept(0);
        // Jump of 200 exceeds window size (64). The window must be fully
        // cleared so no stale bits from seq 0 remain.
        w.accept(200);
        // seq 137 is within the window (offset = 200 - 137 = 63) and was
        // never seen, so it must be accepted.
        assert!(!w.already_seen(137));
    }

    #[test]
    fn reset_forgets_everything() {
        let mut w = ReplayWindow::new();
        w.accept(50);
        w.reset();
        assert!(!w.already_seen(1));
    }
}
