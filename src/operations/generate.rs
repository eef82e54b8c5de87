//! Nested directory tree generation

use std::num::NonZeroUsize;
use std::thread;

use tracing::debug;

use super::{OperationContext, OperationError};
use crate::backends::{BackendError, StorageBackend};

/// Shape of a generated tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeLayout {
    /// Directories created under every node
    pub breadth: usize,
    /// Number of levels below the root
    pub depth: usize,
    /// Directory name template; `{level}` is replaced by the 1-based level
    /// and `{index}` by the 1-based position among siblings
    pub template: String,
}

impl TreeLayout {
    pub fn name(&self, level: usize, index: usize) -> String {
        self.template
            .replace("{level}", &level.to_string())
            .replace("{index}", &index.to_string())
    }

    /// Directories in a subtree of `levels` levels below one node
    fn subtree_size(&self, levels: usize) -> usize {
        (1..=levels as u32).fold(0usize, |acc, l| {
            acc.saturating_add(self.breadth.saturating_pow(l))
        })
    }

    /// Total directories the layout creates
    pub fn total(&self) -> usize {
        self.subtree_size(self.depth)
    }

    fn validate(&self) -> Result<(), OperationError> {
        if self.template.is_empty() || self.template.contains('/') {
            return Err(OperationError::Invalid(format!(
                "template '{}' must be a non-empty name without '/'",
                self.template
            )));
        }
        if self.breadth > 1 && !self.template.contains("{index}") {
            return Err(OperationError::Invalid(
                "template needs an {index} placeholder when breadth is above 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Create `layout.breadth` directories under every node of `root`, down to
/// `layout.depth` levels.
///
/// Levels are created one after another; directories within a level are
/// created in parallel. A failed directory prunes its subtree (counted as
/// skipped) while its siblings carry on. Any failure makes the operation
/// fail with the first error.
pub fn generate_tree(
    ctx: &OperationContext,
    backend: &dyn StorageBackend,
    root: &str,
    layout: &TreeLayout,
) -> Result<(), OperationError> {
    layout.validate()?;
    ctx.update(|p| p.total = layout.total());

    let parallelism = thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1);
    let mut parents = vec![root.to_string()];
    let mut first_error: Option<OperationError> = None;

    for level in 1..=layout.depth {
        ctx.check_cancelled()?;
        let work: Vec<String> = parents
            .iter()
            .flat_map(|parent| {
                (1..=layout.breadth)
                    .map(move |index| backend.join_path(parent, &layout.name(level, index)))
            })
            .collect();
        if work.is_empty() {
            break;
        }
        debug!(level, directories = work.len(), "creating level");

        let results = create_level(ctx, backend, &work, parallelism);
        ctx.check_cancelled()?;

        let below = layout.subtree_size(layout.depth - level);
        parents = Vec::with_capacity(results.len());
        for (path, result) in work.into_iter().zip(results) {
            match result {
                Ok(()) => parents.push(path),
                Err(e) => {
                    ctx.update(|p| {
                        p.failed += 1;
                        p.skipped += below;
                    });
                    if first_error.is_none() {
                        first_error = Some(OperationError::entry(path, e));
                    }
                }
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Create every directory in `work`, spread over at most `parallelism`
/// scoped threads. Results come back in `work` order; entries never tried
/// because of cancellation report `Cancelled`.
fn create_level(
    ctx: &OperationContext,
    backend: &dyn StorageBackend,
    work: &[String],
    parallelism: usize,
) -> Vec<Result<(), BackendError>> {
    let chunk_size = work.len().div_ceil(parallelism.max(1));

    thread::scope(|scope| {
        let handles: Vec<_> = work
            .chunks(chunk_size)
            .map(|chunk| {
                scope.spawn(move || {
                    chunk
                        .iter()
                        .map(|path| {
                            if ctx.is_cancelled() {
                                return Err(BackendError::cancelled(path.as_str()));
                            }
                            ctx.begin_item(path);
                            let result = backend.create_directory(ctx.cancel_token(), path);
                            let created = result.is_ok();
                            ctx.end_item(path, |p| {
                                if created {
                                    p.done += 1;
                                }
                            });
                            result
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        handles
            .into_iter()
            .zip(work.chunks(chunk_size))
            .flat_map(|(handle, chunk)| {
                handle.join().unwrap_or_else(|_| {
                    chunk
                        .iter()
                        .map(|path| {
                            Err(BackendError::Other {
                                path: path.clone(),
                                message: "worker thread panicked".to_string(),
                            })
                        })
                        .collect()
                })
            })
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use crate::backends::{BackendResult, MemoryBackend, RootIdentity};
    use crate::cancel::CancelToken;
    use crate::fs::Entry;
    use crate::operations::{Operation, OperationKind, Outcome, Progress};

    fn layout(breadth: usize, depth: usize) -> TreeLayout {
        TreeLayout {
            breadth,
            depth,
            template: "d{level}_{index}".to_string(),
        }
    }

    fn run(backend: Arc<dyn StorageBackend>, layout: TreeLayout) -> (Outcome, Progress) {
        let handle = Operation::run(
            OperationKind::GenerateTree,
            move |ctx| generate_tree(ctx, backend.as_ref(), "/root", &layout),
            None,
        );
        let deadline = Instant::now() + Duration::from_secs(10);
        while !handle.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        let progress = handle.progress();
        (handle.wait(), progress)
    }

    #[test]
    fn totals_follow_breadth_and_depth() {
        assert_eq!(layout(3, 2).total(), 3 + 9);
        assert_eq!(layout(2, 3).total(), 2 + 4 + 8);
        assert_eq!(layout(5, 0).total(), 0);
        assert_eq!(layout(2, 3).name(2, 1), "d2_1");
    }

    #[test]
    fn creates_full_tree() -> Result<(), Box<dyn std::error::Error>> {
        let backend = Arc::new(MemoryBackend::default().with_dir("/root"));
        let (outcome, _) = run(backend.clone(), layout(2, 3));
        assert!(outcome.is_completed());

        let cancel = CancelToken::new();
        assert_eq!(backend.list(&cancel, "/root")?.len(), 2);
        assert_eq!(backend.list(&cancel, "/root/d1_2/d2_1")?.len(), 2);
        assert!(backend.exists("/root/d1_1/d2_2/d3_2"));
        Ok(())
    }

    /// Refuses to create one specific directory
    struct FailOne {
        inner: MemoryBackend,
        fail: &'static str,
    }

    impl StorageBackend for FailOne {
        fn root(&self) -> RootIdentity {
            self.inner.root()
        }

        fn list(&self, cancel: &CancelToken, path: &str) -> BackendResult<Vec<Entry>> {
            self.inner.list(cancel, path)
        }

        fn create_directory(&self, cancel: &CancelToken, path: &str) -> BackendResult<()> {
            if path == self.fail {
                return Err(BackendError::PermissionDenied {
                    path: path.to_string(),
                });
            }
            self.inner.create_directory(cancel, path)
        }
    }

    #[test]
    fn failure_prunes_branch_and_siblings_continue() {
        let backend = Arc::new(FailOne {
            inner: MemoryBackend::default().with_dir("/root"),
            fail: "/root/d1_1",
        });
        let (outcome, progress) = run(backend.clone(), layout(2, 3));

        match outcome {
            Outcome::Failed(OperationError::Entry { path, .. }) => assert_eq!(path, "/root/d1_1"),
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(progress.total, 14);
        assert_eq!(progress.failed, 1);
        assert_eq!(progress.skipped, 6);
        assert_eq!(progress.done, 7);
        assert!(progress.processing.is_empty());
        assert!(!backend.inner.exists("/root/d1_1"));
        assert!(backend.inner.exists("/root/d1_2/d2_2/d3_1"));
    }

    #[test]
    fn template_without_index_is_rejected() {
        let backend = Arc::new(MemoryBackend::default().with_dir("/root"));
        let bad = TreeLayout {
            breadth: 2,
            depth: 1,
            template: "same".to_string(),
        };
        let (outcome, _) = run(backend, bad);
        assert!(matches!(outcome, Outcome::Failed(OperationError::Invalid(_))));
    }
}
