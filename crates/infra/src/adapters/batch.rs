//! Batch helpers for platforms without (or with capped) native batch calls

use std::future::Future;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tablesync_core::ItemOutcome;
use tablesync_domain::{ErrorKind, Result, SyncError};
use tracing::debug;

/// Run `op` over every item with at most `limit` in flight
///
/// All-settled: every item gets an outcome, in input order.
pub(crate) async fn settle_bounded<'a, T, R, F, Fut>(
    items: &'a [T],
    limit: usize,
    op: F,
) -> Vec<ItemOutcome<R>>
where
    F: FnMut(&'a T) -> Fut,
    Fut: Future<Output = Result<R>>,
{
    // Futures are lazy, so building them up front still bounds concurrency.
    let pending: Vec<Fut> = items.iter().map(op).collect();
    stream::iter(pending).buffered(limit.max(1)).collect().await
}

/// Split `items` into chunks of at most `cap` and run `call` per chunk
///
/// A chunk-level error marks each item of that chunk failed, except errors
/// that no later chunk could survive (auth, configuration), which abort the
/// whole batch.
pub(crate) async fn chunked<'a, T, R, F, Fut>(
    items: &'a [T],
    cap: usize,
    delay: Duration,
    mut call: F,
) -> Result<Vec<ItemOutcome<R>>>
where
    F: FnMut(&'a [T]) -> Fut,
    Fut: Future<Output = Result<Vec<ItemOutcome<R>>>>,
{
    let chunks: Vec<&'a [T]> = items.chunks(cap.max(1)).collect();
    let total = chunks.len();
    let mut outcomes = Vec::with_capacity(items.len());

    for (index, chunk) in chunks.into_iter().enumerate() {
        match call(chunk).await {
            Ok(results) => outcomes.extend(pad(results, chunk.len())),
            Err(error) if aborts_batch(&error) => return Err(error),
            Err(error) => {
                debug!(chunk = index + 1, total, error = %error, "chunk failed");
                outcomes.extend(chunk.iter().map(|_| Err(error.clone())));
            }
        }

        if index + 1 < total && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    Ok(outcomes)
}

fn aborts_batch(error: &SyncError) -> bool {
    matches!(error.kind(), ErrorKind::Auth | ErrorKind::Configuration)
}

/// Guarantee one outcome per input even if a platform answered short
fn pad<R>(mut results: Vec<ItemOutcome<R>>, expected: usize) -> Vec<ItemOutcome<R>> {
    if results.len() < expected {
        let missing = SyncError::Deserialization(format!(
            "platform returned {} results for {expected} items",
            results.len()
        ));
        results.extend((results.len()..expected).map(|_| Err(missing.clone())));
    }
    results.truncate(expected);
    results
}
