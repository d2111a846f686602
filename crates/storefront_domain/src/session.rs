//! Signed-in user record.

use serde::{Deserialize, Serialize};
use storefront_sync::SyncContext;
use thiserror::Error;

use crate::{keys::SESSION_KEY, otp::OtpVerifier};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
/// Access level of a signed-in user.
pub enum Role {
    /// Regular shopper.
    #[default]
    Customer,
    /// Store administrator.
    Admin,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Persisted session for the signed-in user.
pub struct SessionRecord {
    /// Stable user id.
    pub user_id: String,
    /// Name shown in the header.
    pub display_name: String,
    /// Access level.
    #[serde(default)]
    pub role: Role,
    /// When the session was issued.
    pub issued_at_ms: u64,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
/// Reasons a sign-in is refused.
pub enum SessionError {
    /// The user id was empty after trimming.
    #[error("user id must not be blank")]
    BlankUserId,
    /// The one-time code was wrong, spent or expired.
    #[error("one-time code is invalid or expired")]
    InvalidCode,
}

/// Returns the signed-in user, if any.
pub fn current(ctx: &SyncContext) -> Option<SessionRecord> {
    ctx.get(SESSION_KEY, None)
}

/// Stores a session for `user_id`.
///
/// # Errors
///
/// Returns [`SessionError::BlankUserId`] when `user_id` is blank.
pub fn sign_in(
    ctx: &SyncContext,
    user_id: &str,
    display_name: &str,
    role: Role,
) -> Result<SessionRecord, SessionError> {
    let user_id = user_id.trim();
    if user_id.is_empty() {
        return Err(SessionError::BlankUserId);
    }
    let display_name = match display_name.trim() {
        "" => user_id,
        name => name,
    };
    let record = SessionRecord {
        user_id: user_id.to_string(),
        display_name: display_name.to_string(),
        role,
        issued_at_ms: ctx.now_ms(),
    };
    ctx.set(SESSION_KEY, &record);
    Ok(record)
}

/// Signs in a customer identified by `phone` after checking a one-time code.
///
/// # Errors
///
/// Returns [`SessionError::InvalidCode`] when the code does not verify.
pub fn sign_in_with_code(
    ctx: &SyncContext,
    phone: &str,
    code: &str,
    display_name: &str,
) -> Result<SessionRecord, SessionError> {
    if !OtpVerifier::new(ctx).verify(phone, code) {
        return Err(SessionError::InvalidCode);
    }
    sign_in(
        ctx,
        &crate::otp::normalize_phone(phone),
        display_name,
        Role::Customer,
    )
}

/// Clears the session at once.
pub fn sign_out(ctx: &SyncContext) {
    ctx.remove(SESSION_KEY);
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rand::{rngs::StdRng, SeedableRng};
    use storefront_host::{HostServices, ManualScheduler, SharedMemoryFacility};
    use storefront_sync::SyncConfig;

    use super::*;

    fn context(shared: &SharedMemoryFacility, scheduler: &ManualScheduler) -> SyncContext {
        SyncContext::new(
            HostServices::memory(shared, scheduler.clone()),
            SyncConfig::default(),
        )
    }

    #[test]
    fn sign_in_persists_and_sign_out_removes() {
        let shared = SharedMemoryFacility::new();
        let scheduler = ManualScheduler::starting_at(1_000);
        let ctx = context(&shared, &scheduler);

        let record = sign_in(&ctx, " ana ", "", Role::Admin).expect("sign in");
        assert_eq!(
            record,
            SessionRecord {
                user_id: "ana".to_string(),
                display_name: "ana".to_string(),
                role: Role::Admin,
                issued_at_ms: 1_000,
            }
        );
        assert_eq!(current(&ctx), Some(record));

        sign_out(&ctx);
        assert_eq!(current(&ctx), None);
        assert_eq!(shared.raw(SESSION_KEY), None);
    }

    #[test]
    fn blank_user_is_refused() {
        let shared = SharedMemoryFacility::new();
        let ctx = context(&shared, &ManualScheduler::new());
        assert_eq!(sign_in(&ctx, "  ", "Ana", Role::Customer), Err(SessionError::BlankUserId));
        assert_eq!(current(&ctx), None);
    }

    #[test]
    fn code_sign_in_requires_a_live_code() {
        let shared = SharedMemoryFacility::new();
        let ctx = context(&shared, &ManualScheduler::new());
        let code = OtpVerifier::new(&ctx).issue_with_rng("+1 555 0100", &mut StdRng::seed_from_u64(3));
        let wrong = if code == "000000" { "000001" } else { "000000" };

        assert_eq!(
            sign_in_with_code(&ctx, "+15550100", wrong, "Ana"),
            Err(SessionError::InvalidCode)
        );
        let record = sign_in_with_code(&ctx, "+1 555 0100", &code, "Ana").expect("valid code");
        assert_eq!(record.user_id, "+15550100");
        assert_eq!(record.role, Role::Customer);
        assert_eq!(
            sign_in_with_code(&ctx, "+15550100", &code, "Ana"),
            Err(SessionError::InvalidCode)
        );
    }

    #[test]
    fn stored_role_is_lowercase_and_optional() {
        let shared = SharedMemoryFacility::new();
        shared.seed_raw(
            SESSION_KEY,
            r#"{"user_id":"u1","display_name":"Bo","issued_at_ms":5}"#,
        );
        let ctx = context(&shared, &ManualScheduler::new());
        assert_eq!(current(&ctx).map(|record| record.role), Some(Role::Customer));
        assert_eq!(
            serde_json::to_value(Role::Admin).expect("serialize"),
            serde_json::json!("admin")
        );
    }
}
