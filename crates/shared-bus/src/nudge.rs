//! # Nudge Channel
//!
//! A capacity-1 wakeup channel with drop-on-full semantics: `signal` never
//! blocks, back-to-back signals coalesce into one, and a pending signal is
//! never lost. Worker loops block on `notified` and treat each wakeup as
//! "there may be work to do".

use tokio::sync::mpsc;

/// The sending/receiving halves of a coalescing wakeup channel.
pub struct Nudge {
    tx: mpsc::Sender<()>,
    rx: tokio::sync::Mutex<mpsc::Receiver<()>>,
}

impl Nudge {
    /// Create a new nudge channel.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(1);
        Self {
            tx,
            rx: tokio::sync::Mutex::new(rx),
        }
    }

    /// Signal that there is work to do. Never blocks; a signal already
    /// pending absorbs this one.
    pub fn signal(&self) {
        let _ = self.tx.try_send(());
    }

    /// Wait until signalled. Intended for a single consumer loop.
    pub async fn notified(&self) {
        let mut rx = self.rx.lock().await;
        let _ = rx.recv().await;
    }

    /// Consume a pending signal without waiting. Returns whether one was
    /// pending.
    pub fn take_pending(&self) -> bool {
        match self.rx.try_lock() {
            Ok(mut rx) => rx.try_recv().is_ok(),
            Err(_) => false,
        }
    }
}

impl Default for Nudge {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_signal_wakes_waiter() {
        let nudge = Nudge::new();
        nudge.signal();
        tokio::time::timeout(Duration::from_secs(1), nudge.notified())
            .await
            .expect("signal must wake the waiter");
    }

    #[tokio::test]
    async fn test_signals_coalesce() {
        let nudge = Nudge::new();
        for _ in 0..100 {
            nudge.signal();
        }
        assert!(nudge.take_pending());
        assert!(!nudge.take_pending());
    }

    #[tokio::test]
    async fn test_signal_never_blocks() {
        let nudge = Nudge::new();
        // Nothing is draining; these must all return immediately.
        for _ in 0..1000 {
            nudge.signal();
        }
    }
}
