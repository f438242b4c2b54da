//! Concurrent fan-out with ordered, all-or-nothing joins.

use std::future::Future;

use tokio::task::JoinSet;

use crate::error::{Result, ShipitError};

/// Run every future concurrently and return their outputs in input order.
///
/// The first error aborts the remaining tasks and is returned.
pub async fn join_ordered<T, F>(futures: impl IntoIterator<Item = F>) -> Result<Vec<T>>
where
    T: Send + 'static,
    F: Future<Output = Result<T>> + Send + 'static,
{
    let mut join_set = JoinSet::new();
    let mut len = 0;
    for (idx, fut) in futures.into_iter().enumerate() {
        join_set.spawn(async move { fut.await.map(|value| (idx, value)) });
        len += 1;
    }

    let mut slots: Vec<Option<T>> = std::iter::repeat_with(|| None).take(len).collect();
    while let Some(joined) = join_set.join_next().await {
        let (idx, value) = joined??;
        slots[idx] = Some(value);
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(idx, slot)| {
            slot.ok_or_else(|| ShipitError::Invalid(format!("missing result for task {}", idx)))
        })
        .collect()
}
