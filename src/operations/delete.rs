//! Bulk delete

use tracing::debug;

use super::{OperationContext, OperationError};
use crate::backends::StorageBackend;

/// Delete `paths` in order, stopping at the first failure.
///
/// Entries after a failing one are never attempted. Cancellation is checked
/// between entries.
pub fn delete_entries(
    ctx: &OperationContext,
    backend: &dyn StorageBackend,
    paths: &[String],
) -> Result<(), OperationError> {
    ctx.update(|p| p.total = paths.len());

    for path in paths {
        ctx.check_cancelled()?;
        ctx.begin_item(path);
        debug!(path = %path, "deleting");

        if let Err(e) = backend.delete(ctx.cancel_token(), path) {
            if e.is_cancelled() {
                ctx.end_item(path, |_| {});
                return Err(OperationError::Cancelled);
            }
            ctx.end_item(path, |p| {
                p.failed += 1;
                p.skipped = p.total - p.done - p.failed;
            });
            return Err(OperationError::entry(path.clone(), e));
        }
        ctx.end_item(path, |p| p.done += 1);
    }

    Ok(())
}
