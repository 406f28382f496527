//! Initialize/terminate transitions for a single extension.
//!
//! Extension code runs inside `catch_unwind`; a panic becomes a value the
//! manager can classify instead of tearing down the host.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use tracing::debug;

use super::api::HostHandle;
use super::error::{LoadError, TeardownFault};
use super::loader::ExtensionHandle;

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Ask the extension to activate.
///
/// `Ok(false)` means it declined; the caller drops the handle without
/// terminating it. A panic is reported as [`LoadError::LoadFailed`].
pub fn initialize(
    handle: &mut ExtensionHandle,
    host: &HostHandle,
    path: &Path,
) -> Result<bool, LoadError> {
    let extension = handle.extension_mut();
    let activated = catch_unwind(AssertUnwindSafe(|| extension.initialize(host))).map_err(
        |payload| LoadError::LoadFailed {
            path: path.to_path_buf(),
            reason: format!("initialize panicked: {}", panic_message(&*payload)),
        },
    )?;

    debug!("{} initialize returned {}", path.display(), activated);
    Ok(activated)
}

/// Terminate the extension and release its handle.
///
/// The handle is consumed, so terminate runs at most once per instance. The
/// handle is dropped even when terminate panics.
pub fn terminate(mut handle: ExtensionHandle, entry: &str) -> Result<(), TeardownFault> {
    let extension = handle.extension_mut();
    let outcome = catch_unwind(AssertUnwindSafe(|| extension.terminate()));
    drop(handle);

    outcome.map_err(|payload| TeardownFault {
        entry: entry.to_string(),
        message: panic_message(&*payload),
    })
}
