//! `idle -> loading -> {ready | failed}` lifecycle for a fetched list.
//!
//! Each load is tagged with the precondition value it was started for
//! (owner balance or total supply) and a generation number. A result is only
//! committed if its ticket is still the newest one.

use crate::aggregator::{Aggregator, Enumeration};
use crate::contract::PlantRegistry;
use crate::error::Result;
use crate::record::PlantRecord;
use log::{debug, error, info, warn};
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState<T> {
    Idle,
    Loading,
    Ready(T),
    Failed(String),
}

#[derive(Debug)]
pub struct Ticket<K> {
    generation: u64,
    key: K,
}

impl<K> Ticket<K> {
    pub fn key(&self) -> &K {
        &self.key
    }
}

pub struct ListLoader<K, T> {
    state: LoadState<T>,
    generation: u64,
    key: Option<K>,
    in_flight: bool,
}

impl<K: Clone + PartialEq, T> ListLoader<K, T> {
    pub fn new() -> Self {
        Self {
            state: LoadState::Idle,
            generation: 0,
            key: None,
            in_flight: false,
        }
    }

    pub fn state(&self) -> &LoadState<T> {
        &self.state
    }

    /// Start a load for `key`. Returns `None` when a load for the same key is
    /// already in flight; a different key supersedes the running load.
    pub fn begin(&mut self, key: K) -> Option<Ticket<K>> {
        if self.in_flight && self.key.as_ref() == Some(&key) {
            debug!("load for the same precondition already in flight");
            return None;
        }
        self.generation += 1;
        self.key = Some(key.clone());
        self.in_flight = true;
        self.state = LoadState::Loading;
        Some(Ticket {
            generation: self.generation,
            key,
        })
    }

    /// Commit `result` if `ticket` is the newest load. Returns whether it was
    /// committed; stale results are dropped.
    pub fn finish(&mut self, ticket: Ticket<K>, result: Result<T>) -> bool {
        if ticket.generation != self.generation {
            debug!(
                "discarding stale load (generation {} < {})",
                ticket.generation, self.generation
            );
            return false;
        }
        self.in_flight = false;
        self.state = match result {
            Ok(items) => LoadState::Ready(items),
            Err(e) => LoadState::Failed(e.to_string()),
        };
        true
    }

    /// Whether the last load for `key` has completed, successfully or not.
    /// Failed loads are not retried until the precondition changes.
    pub fn is_settled_for(&self, key: &K) -> bool {
        !self.in_flight
            && self.key.as_ref() == Some(key)
            && matches!(self.state, LoadState::Ready(_) | LoadState::Failed(_))
    }
}

/// Poll the size of `source` every `every` and reload whenever it changes,
/// calling `on_commit` with each committed state. Stops on Ctrl-C.
pub async fn watch<R, F>(
    aggregator: &Aggregator<'_, R>,
    source: &Enumeration,
    every: Duration,
    on_commit: F,
) -> Result<()>
where
    R: PlantRegistry,
    F: FnMut(&LoadState<Vec<PlantRecord>>),
{
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Could not listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };
    watch_until(aggregator, source, every, ctrl_c, on_commit).await
}

/// [`watch`] that stops when `stop` completes.
///
/// A size change observed while a load is running abandons that load and
/// starts one for the new size.
pub async fn watch_until<R, S, F>(
    aggregator: &Aggregator<'_, R>,
    source: &Enumeration,
    every: Duration,
    stop: S,
    mut on_commit: F,
) -> Result<()>
where
    R: PlantRegistry,
    S: Future<Output = ()>,
    F: FnMut(&LoadState<Vec<PlantRecord>>),
{
    tokio::pin!(stop);
    let policy = source.default_policy();
    let mut loader: ListLoader<u64, Vec<PlantRecord>> = ListLoader::new();
    let mut ticker = tokio::time::interval(every);
    let mut pending = None;

    loop {
        tokio::select! {
            _ = &mut stop => {
                info!("Stopping watch");
                return Ok(());
            }
            _ = ticker.tick() => {}
        }

        let size = match aggregator.size(source).await {
            Ok(size) => size,
            Err(e) => {
                warn!("Could not read collection size: {}", e);
                continue;
            }
        };
        if loader.is_settled_for(&size) {
            continue;
        }
        if let Some(ticket) = loader.begin(size) {
            pending = Some(ticket);
        }
        let Some(ticket) = pending.take() else {
            continue;
        };

        info!("Loading {} plants", ticket.key());
        let load = aggregator.enumerate(source, *ticket.key(), policy);
        tokio::pin!(load);

        // Keep polling the precondition while the batch runs.
        let result = loop {
            tokio::select! {
                result = &mut load => break Some(result),
                _ = &mut stop => {
                    info!("Stopping watch");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    match aggregator.size(source).await {
                        Ok(size) if size != *ticket.key() => {
                            info!("Collection size changed to {} during load", size);
                            pending = loader.begin(size);
                            break None;
                        }
                        Ok(_) => {}
                        Err(e) => warn!("Could not read collection size: {}", e),
                    }
                }
            }
        };

        match result {
            Some(result) => {
                if let Err(e) = &result {
                    error!("Load failed: {}", e);
                }
                if loader.finish(ticket, result) {
                    on_commit(loader.state());
                }
            }
            None => debug!("Dropped superseded load for size {}", ticket.key()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::tests::{FakeRegistry, quiet};
    use crate::error::Error;
    use std::sync::atomic::Ordering;
    use tokio::sync::Notify;
    use tokio::time::sleep;

    fn committed_ids(state: &LoadState<Vec<PlantRecord>>) -> Option<Vec<u64>> {
        match state {
            LoadState::Ready(list) => Some(list.iter().map(|p| p.id).collect()),
            _ => None,
        }
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut loader: ListLoader<u64, Vec<u64>> = ListLoader::new();
        assert_eq!(loader.state(), &LoadState::Idle);

        let ticket = loader.begin(3).unwrap();
        assert_eq!(loader.state(), &LoadState::Loading);
        assert!(loader.finish(ticket, Ok(vec![1, 2, 3])));
        assert_eq!(loader.state(), &LoadState::Ready(vec![1, 2, 3]));
        assert!(loader.is_settled_for(&3));
        assert!(!loader.is_settled_for(&4));
    }

    #[test]
    fn test_failure_state() {
        let mut loader: ListLoader<u64, Vec<u64>> = ListLoader::new();
        let ticket = loader.begin(2).unwrap();
        assert!(loader.finish(ticket, Err(Error::Rpc("down".into()))));
        assert_eq!(
            loader.state(),
            &LoadState::Failed("rpc error: down".into())
        );
        assert!(loader.is_settled_for(&2));
    }

    #[test]
    fn test_duplicate_load_is_refused() {
        let mut loader: ListLoader<u64, Vec<u64>> = ListLoader::new();
        let first = loader.begin(5).unwrap();
        assert!(loader.begin(5).is_none());
        assert!(loader.finish(first, Ok(vec![])));

        // Re-entering loading for the same key after completion is a refetch.
        assert!(loader.begin(5).is_some());
    }

    #[test]
    fn test_stale_result_is_discarded() {
        let mut loader: ListLoader<u64, Vec<u64>> = ListLoader::new();
        let old = loader.begin(2).unwrap();
        let new = loader.begin(3).unwrap();

        assert!(loader.finish(new, Ok(vec![1, 2, 3])));
        assert!(!loader.finish(old, Ok(vec![9, 9])));
        assert_eq!(loader.state(), &LoadState::Ready(vec![1, 2, 3]));
    }

    #[test]
    fn test_stale_failure_does_not_overwrite_loading() {
        let mut loader: ListLoader<u64, Vec<u64>> = ListLoader::new();
        let old = loader.begin(1).unwrap();
        let _new = loader.begin(2).unwrap();
        assert!(!loader.finish(old, Err(Error::Rpc("late".into()))));
        assert_eq!(loader.state(), &LoadState::Loading);
    }

    #[tokio::test]
    async fn test_watch_abandons_load_when_supply_changes() {
        let mut registry = FakeRegistry::with_plants(3);
        *registry.supply.lock().unwrap() = Some(2);
        registry.delays_ms.insert(100, 300);
        let aggregator = Aggregator::new(&registry, quiet());
        let committed = Notify::new();
        let mut commits = Vec::new();

        let grow = async {
            sleep(Duration::from_millis(100)).await;
            *registry.supply.lock().unwrap() = Some(3);
        };
        let run = watch_until(
            &aggregator,
            &Enumeration::All,
            Duration::from_millis(50),
            committed.notified(),
            |state| {
                commits.push(committed_ids(state));
                committed.notify_one();
            },
        );
        let (result, ()) = tokio::join!(run, grow);

        result.unwrap();
        assert_eq!(commits, vec![Some(vec![100, 101, 102])]);
    }

    #[tokio::test]
    async fn test_watch_commits_failure_once_and_waits_for_change() {
        let mut registry = FakeRegistry::with_plants(2);
        registry.failing_ids.insert(101);
        let aggregator = Aggregator::new(&registry, quiet());
        let mut states = Vec::new();

        watch_until(
            &aggregator,
            &Enumeration::All,
            Duration::from_millis(20),
            sleep(Duration::from_millis(200)),
            |state| states.push(state.clone()),
        )
        .await
        .unwrap();

        assert_eq!(states.len(), 1);
        assert!(matches!(states[0], LoadState::Failed(_)));
        assert_eq!(registry.index_calls.load(Ordering::SeqCst), 2);
    }
}
