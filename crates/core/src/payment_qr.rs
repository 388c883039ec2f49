//! WeChat Pay QR code countdown.
//!
//! The QR modal counts down from five minutes. When the count reaches zero
//! the modal closes itself, exactly once; the customer can also close it at
//! any time. Nothing here knows whether the payment went through.

use url::form_urlencoded;

/// Seconds a QR code stays on screen.
pub const WECHAT_QR_TIMEOUT_SECS: u32 = 300;

/// Seconds the placeholder spinner shows before the QR image.
pub const QR_LOADING_DELAY_SECS: u32 = 1;

const QR_IMAGE_BASE_URL: &str = "https://api.qrserver.com/v1/create-qr-code/?size=200x200&data=";

/// Image URL rendering `payment_url` as a 200x200 QR code.
#[must_use]
pub fn qr_image_url(payment_url: &str) -> String {
    let encoded: String = form_urlencoded::byte_serialize(payment_url.as_bytes()).collect();
    format!("{QR_IMAGE_BASE_URL}{encoded}")
}

/// Result of one countdown step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Still open with this many seconds left.
    Running(u32),
    /// Just reached zero; close the modal.
    Expired,
    /// Already closed; nothing to do.
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrCountdown {
    remaining: u32,
    elapsed: u32,
    open: bool,
}

impl Default for QrCountdown {
    fn default() -> Self {
        Self::new()
    }
}

impl QrCountdown {
    /// A closed countdown.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            remaining: WECHAT_QR_TIMEOUT_SECS,
            elapsed: 0,
            open: false,
        }
    }

    /// (Re)open the modal with a full countdown.
    pub const fn open(&mut self) {
        self.remaining = WECHAT_QR_TIMEOUT_SECS;
        self.elapsed = 0;
        self.open = true;
    }

    /// One second passes.
    pub const fn tick(&mut self) -> Tick {
        if !self.open {
            return Tick::Closed;
        }
        self.elapsed = self.elapsed.saturating_add(1);
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.open = false;
            Tick::Expired
        } else {
            Tick::Running(self.remaining)
        }
    }

    /// `secs` seconds pass. Reports [`Tick::Expired`] if the countdown ran
    /// out during this step.
    pub const fn advance(&mut self, secs: u32) -> Tick {
        if !self.open {
            return Tick::Closed;
        }
        if secs >= self.remaining {
            self.elapsed = self.elapsed.saturating_add(self.remaining);
            self.remaining = 0;
            self.open = false;
            return Tick::Expired;
        }
        self.elapsed = self.elapsed.saturating_add(secs);
        self.remaining -= secs;
        Tick::Running(self.remaining)
    }

    /// Close the modal. Returns false if it was already closed.
    pub const fn close(&mut self) -> bool {
        let was_open = self.open;
        self.open = false;
        was_open
    }

    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.open
    }

    /// Whether the spinner still stands in for the QR image.
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        self.open && self.elapsed < QR_LOADING_DELAY_SECS
    }

    #[must_use]
    pub const fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Remaining time as `m:ss`.
    #[must_use]
    pub fn display(&self) -> String {
        format!("{}:{:02}", self.remaining / 60, self.remaining % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_down_to_single_close() {
        let mut countdown = QrCountdown::new();
        countdown.open();
        assert_eq!(countdown.display(), "5:00");

        let mut closes = 0;
        for _ in 0..400 {
            if countdown.tick() == Tick::Expired {
                closes += 1;
            }
        }
        assert_eq!(closes, 1);
        assert_eq!(countdown.remaining(), 0);
        assert!(!countdown.is_open());
        assert_eq!(countdown.tick(), Tick::Closed);
        assert_eq!(countdown.remaining(), 0);
    }

    #[test]
    fn test_last_second_expires() {
        let mut countdown = QrCountdown::new();
        countdown.open();
        assert_eq!(countdown.advance(298), Tick::Running(2));
        assert_eq!(countdown.tick(), Tick::Running(1));
        assert_eq!(countdown.display(), "0:01");
        assert_eq!(countdown.tick(), Tick::Expired);
    }

    #[test]
    fn test_advance_past_end_expires_once() {
        let mut countdown = QrCountdown::new();
        countdown.open();
        assert_eq!(countdown.advance(1_000), Tick::Expired);
        assert_eq!(countdown.advance(1), Tick::Closed);
    }

    #[test]
    fn test_manual_close_is_idempotent() {
        let mut countdown = QrCountdown::new();
        countdown.open();
        countdown.advance(10);
        assert!(countdown.close());
        assert!(!countdown.close());
        assert_eq!(countdown.tick(), Tick::Closed);
        assert_eq!(countdown.remaining(), 290);
    }

    #[test]
    fn test_reopen_resets() {
        let mut countdown = QrCountdown::new();
        countdown.open();
        countdown.advance(120);
        countdown.open();
        assert_eq!(countdown.remaining(), WECHAT_QR_TIMEOUT_SECS);
        assert!(countdown.is_loading());
        countdown.tick();
        assert!(!countdown.is_loading());
    }

    #[test]
    fn test_closed_countdown_never_ticks() {
        let mut countdown = QrCountdown::new();
        assert_eq!(countdown.tick(), Tick::Closed);
        assert_eq!(countdown.remaining(), WECHAT_QR_TIMEOUT_SECS);
    }

    #[test]
    fn test_qr_image_url_encodes_payment_url() {
        assert_eq!(
            qr_image_url("weixin://wxpay/bizpayurl?pr=abc&x=1"),
            "https://api.qrserver.com/v1/create-qr-code/?size=200x200&data=weixin%3A%2F%2Fwxpay%2Fbizpayurl%3Fpr%3Dabc%26x%3D1"
        );
    }
}
