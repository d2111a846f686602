//! One-time sign-in codes kept in the context's in-process expiring store.

use rand::Rng;
use storefront_sync::SyncContext;

/// Number of digits in an issued code.
pub const CODE_DIGITS: usize = 6;

/// Issues and verifies one-time codes for phone numbers.
pub struct OtpVerifier<'a> {
    ctx: &'a SyncContext,
    ttl_ms: u64,
}

impl<'a> OtpVerifier<'a> {
    /// Creates a verifier using the context's configured code lifetime.
    pub fn new(ctx: &'a SyncContext) -> Self {
        Self {
            ctx,
            ttl_ms: ctx.config().otp_ttl_ms,
        }
    }

    /// Overrides the code lifetime.
    pub fn with_ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.ttl_ms = ttl_ms;
        self
    }

    /// Issues a fresh code for `phone`, replacing any earlier one, and returns it for delivery.
    pub fn issue(&self, phone: &str) -> String {
        self.issue_with_rng(phone, &mut rand::thread_rng())
    }

    /// Same as [`OtpVerifier::issue`] with a caller-supplied random source.
    pub fn issue_with_rng<R: Rng>(&self, phone: &str, rng: &mut R) -> String {
        let code = format!("{:0width$}", rng.gen_range(0..1_000_000_u32), width = CODE_DIGITS);
        self.ctx
            .store_with_expiry(&normalize_phone(phone), code.clone(), self.ttl_ms);
        code
    }

    /// Returns `true` once for a live matching code; the code is then spent.
    pub fn verify(&self, phone: &str, code: &str) -> bool {
        let code = code.trim();
        if code.len() != CODE_DIGITS || !code.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }
        self.ctx.consume_if_valid(&normalize_phone(phone), code)
    }
}

/// Strips formatting so `+1 555-0100` and `+15550100` share one entry.
pub fn normalize_phone(phone: &str) -> String {
    phone
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect()
}
