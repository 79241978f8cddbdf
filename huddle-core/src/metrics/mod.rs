//! Metrics for membership and identity operations
//!
//! Counters are recorded through the `metrics` facade. Nothing is exported
//! unless the binary installs a recorder (see `metrics-exporter-prometheus`).

use metrics::{counter, describe_counter};
use std::fmt::Display;

use crate::core_identity::IdentityError;
use crate::core_space::MembershipError;

pub const OPERATIONS_TOTAL: &str = "huddle.operations.total";
pub const OPERATIONS_FAILED: &str = "huddle.operations.failed";
pub const ADMIN_BACKFILLS: &str = "huddle.roster.admin_backfills";
pub const INVITES_ISSUED: &str = "huddle.invites.issued";
pub const MAILS_FAILED: &str = "huddle.mail.failed";

/// Register metric descriptions with the installed recorder
pub fn init_metrics() {
    describe_counter!(OPERATIONS_TOTAL, "Operations attempted, by op");
    describe_counter!(OPERATIONS_FAILED, "Operations that returned an error, by op and kind");
    describe_counter!(ADMIN_BACKFILLS, "Members promoted because the last admin left");
    describe_counter!(INVITES_ISSUED, "Invite tokens issued, by scope");
    describe_counter!(MAILS_FAILED, "Outgoing mails that could not be delivered");
}

/// Errors that can be labelled in metrics
pub trait Labelled: Display {
    fn kind(&self) -> &'static str;

    /// Failures caused by the server rather than the caller
    fn is_internal(&self) -> bool;
}

impl Labelled for MembershipError {
    fn kind(&self) -> &'static str {
        MembershipError::kind(self)
    }

    fn is_internal(&self) -> bool {
        matches!(self, MembershipError::Internal(_))
    }
}

impl Labelled for IdentityError {
    fn kind(&self) -> &'static str {
        IdentityError::kind(self)
    }

    fn is_internal(&self) -> bool {
        matches!(self, IdentityError::Internal(_))
    }
}

/// Count an operation and its outcome, passing the result through
pub fn observe<T, E: Labelled>(op: &'static str, result: Result<T, E>) -> Result<T, E> {
    counter!(OPERATIONS_TOTAL, "op" => op).increment(1);
    if let Err(err) = &result {
        counter!(OPERATIONS_FAILED, "op" => op, "kind" => err.kind()).increment(1);
        if err.is_internal() {
            tracing::error!(op, error = %err, "operation failed");
        }
    }
    result
}

/// `scope` is "workspace" or "channel"
pub fn record_admin_backfill(scope: &'static str) {
    counter!(ADMIN_BACKFILLS, "scope" => scope).increment(1);
}

pub fn record_invite_issued(scope: &'static str) {
    counter!(INVITES_ISSUED, "scope" => scope).increment(1);
}

pub fn record_mail_failure() {
    counter!(MAILS_FAILED).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_space::Entity;

    #[test]
    fn test_metrics_init() {
        // no recorder installed; must not panic
        init_metrics();
        record_admin_backfill("channel");
        record_mail_failure();
    }

    #[test]
    fn test_observe_passes_result_through() {
        let ok: Result<u8, MembershipError> = Ok(3);
        assert_eq!(observe("test_op", ok).unwrap(), 3);

        let err: Result<u8, MembershipError> = Err(MembershipError::NotFound(Entity::Channel));
        assert!(matches!(
            observe("test_op", err),
            Err(MembershipError::NotFound(Entity::Channel))
        ));
    }

    #[test]
    fn test_internal_classification() {
        assert!(MembershipError::Internal("db".into()).is_internal());
        assert!(!MembershipError::Conflict.is_internal());
        assert!(!IdentityError::InvalidCredentials.is_internal());
    }
}
