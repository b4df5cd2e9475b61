use fail::fail_point;

use crate::bail;
use crate::error::{ErrorKind, ProrepError, ProrepResult};

pub const APPLY_ENTRY__AFTER_CLAIM: &str = "apply_entry.after_claim";
pub const APPLY_ROW__BEFORE_WRITE: &str = "apply_row.before_write";
pub const POLL_CYCLE__AFTER_LIST: &str = "poll_cycle.after_list";

/// Evaluates the named failpoint and turns a triggered `return` action into a [`ProrepError`].
///
/// The optional parameter picks the error kind: `transient` yields a connection failure that the
/// resilience layer retries, anything else yields a fatal query failure.
pub fn prorep_fail_point(name: &str) -> ProrepResult<()> {
    fail_point!(name, |parameter| {
        let error_kind = match parameter.as_deref() {
            Some("transient") => ErrorKind::DestinationConnectionFailed,
            Some("conversion") => ErrorKind::ConversionError,
            _ => ErrorKind::DestinationQueryFailed,
        };

        bail!(
            error_kind,
            "An error occurred in a fail point",
            format!("The failpoint '{name}' returned an error")
        );
    });

    Ok(())
}
