//! Running blocking tree operations from async code.
//!
//! Every tree call blocks on driver I/O and locks, so async callers hand
//! them to tokio's blocking pool and await the result.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::error::{TreeError, TreeResult};
use crate::tree::Tree;

/// Run `f` against `tree` on the blocking pool.
pub fn spawn<F, T>(tree: Arc<Tree>, f: F) -> JoinHandle<TreeResult<T>>
where
    F: FnOnce(&Tree) -> TreeResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || f(&tree))
}

/// Run `f` against `tree` on the blocking pool and wait for it.
///
/// A panic or cancellation of the task surfaces as
/// [`TreeError::Background`].
pub async fn run<F, T>(tree: Arc<Tree>, f: F) -> TreeResult<T>
where
    F: FnOnce(&Tree) -> TreeResult<T> + Send + 'static,
    T: Send + 'static,
{
    spawn(tree, f)
        .await
        .map_err(|e| TreeError::Background(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use crate::records::{IssuerProfile, Thread};
    use ots_driver::MemoryDriver;

    fn tree() -> Arc<Tree> {
        Arc::new(Tree::open(Arc::new(MemoryDriver::new())).unwrap())
    }

    #[tokio::test]
    async fn run_returns_the_operation_result() {
        let tree = tree();
        let hash = run(Arc::clone(&tree), |t| {
            t.issuers().store(IssuerProfile::new("X1", "n"), "Bank")
        })
        .await
        .unwrap();
        assert_eq!(tree.issuers().metadata("X1").unwrap().unwrap().hash, hash);
    }

    #[tokio::test]
    async fn tree_errors_pass_through() {
        let err = run(tree(), |t| t.issuers().store(IssuerProfile::blank("X1"), ""))
            .await
            .unwrap_err();
        assert!(matches!(err, TreeError::Validation { .. }));
    }

    #[tokio::test]
    async fn panics_become_background_errors() {
        let err = run(tree(), |_| -> TreeResult<()> { panic!("boom") })
            .await
            .unwrap_err();
        assert!(matches!(err, TreeError::Background(_)));
    }

    #[tokio::test]
    async fn concurrent_writers_all_land() {
        let tree = tree();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                spawn(Arc::clone(&tree), move |t| {
                    t.threads().store(Thread::new(format!("t{i}"), ["alice"]), "")
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(tree.threads().len().unwrap(), 8);

        let reopened = Tree::open(Arc::clone(tree.driver())).unwrap();
        assert_eq!(reopened.threads().len().unwrap(), 8);
    }
}
