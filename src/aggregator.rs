//! Enumerates plant tokens and fetches their records.
//!
//! Every per-index resolution (index -> token id -> record) runs
//! concurrently under a bounded semaphore and a per-token timeout. Results
//! are gathered in index order regardless of completion order.

use crate::abi::Address;
use crate::config::Config;
use crate::contract::{PlantRegistry, TokenEnumerable};
use crate::error::{Error, Result};
use crate::record::{LegacyPlant, PlantRecord};
use futures::future::{join_all, try_join_all};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::future::Future;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::timeout;

/// Which index space to walk.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Enumeration {
    /// `tokenOfOwnerByIndex(owner, i)` for `i < balanceOf(owner)`.
    ByOwner(Address),
    /// `tokenByIndex(i)` for `i < totalSupply()`.
    All,
}

/// What a failed index does to the rest of the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Log the failed index and keep the others.
    SkipFailed,
    /// Any failure fails the whole batch; no partial list is returned.
    FailFast,
}

impl Enumeration {
    pub fn default_policy(&self) -> FailurePolicy {
        match self {
            Enumeration::ByOwner(_) => FailurePolicy::SkipFailed,
            Enumeration::All => FailurePolicy::FailFast,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FetchSettings {
    pub timeout: Duration,
    pub max_concurrent: usize,
    pub show_progress: bool,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl FetchSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            timeout: config.fetch_timeout,
            max_concurrent: config.max_concurrent.max(1),
            show_progress: config.show_progress,
        }
    }
}

fn progress_bar(count: u64, label: &str, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(count);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40.green/white} {pos:>5}/{len:5} {msg}")
    {
        bar.set_style(style.progress_chars("##-"));
    }
    bar.set_message(format!("Fetching {label}s"));
    bar
}

/// Run `fetch(i)` for every `i < count` and collect the results in index order.
async fn gather<T, F, Fut>(
    settings: &FetchSettings,
    label: &str,
    count: u64,
    policy: FailurePolicy,
    fetch: F,
) -> Result<Vec<T>>
where
    F: Fn(u64) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    if count == 0 {
        return Ok(Vec::new());
    }

    let semaphore = Semaphore::new(settings.max_concurrent.max(1));
    let progress = progress_bar(count, label, settings.show_progress);
    let limit = settings.timeout;

    let tasks = (0..count).map(|index| {
        let semaphore = &semaphore;
        let progress = &progress;
        let fetch = &fetch;
        async move {
            let _permit = semaphore
                .acquire()
                .await
                .map_err(|e| Error::Rpc(format!("fetch queue closed: {e}")))?;
            let result = match timeout(limit, fetch(index)).await {
                Ok(result) => result,
                Err(_) => Err(Error::Timeout {
                    what: format!("{label} at index {index}"),
                    secs: limit.as_secs(),
                }),
            };
            progress.inc(1);
            result
        }
    });

    let outcome = match policy {
        FailurePolicy::SkipFailed => {
            let results = join_all(tasks).await;
            let mut fetched = Vec::with_capacity(results.len());
            for (index, result) in results.into_iter().enumerate() {
                match result {
                    Ok(item) => fetched.push(item),
                    Err(e) => warn!("Failed to fetch {} at index {}: {}", label, index, e),
                }
            }
            if fetched.len() as u64 != count {
                info!(
                    "Fetched {} out of {} {}s ({} skipped)",
                    fetched.len(),
                    count,
                    label,
                    count - fetched.len() as u64
                );
            }
            Ok(fetched)
        }
        FailurePolicy::FailFast => try_join_all(tasks)
            .await
            .inspect_err(|e| error!("Error fetching {}s: {}", label, e)),
    };

    progress.finish_and_clear();
    outcome
}

pub struct Aggregator<'a, R> {
    registry: &'a R,
    settings: FetchSettings,
}

impl<'a, R: PlantRegistry> Aggregator<'a, R> {
    pub fn new(registry: &'a R, settings: FetchSettings) -> Self {
        Self { registry, settings }
    }

    /// Number of indices in `source`: the owner's balance or the total supply.
    pub async fn size(&self, source: &Enumeration) -> Result<u64> {
        match source {
            Enumeration::ByOwner(owner) => self.registry.balance_of(owner).await,
            Enumeration::All => self.registry.total_supply().await,
        }
    }

    /// Plants held by `account`, tolerating individual failures.
    ///
    /// No account means there is nothing to enumerate yet; that is an empty
    /// list, not an error. Only a failed balance query fails the call.
    pub async fn enumerate_by_owner(&self, account: Option<&Address>) -> Result<Vec<PlantRecord>> {
        let Some(owner) = account else {
            return Ok(Vec::new());
        };
        let source = Enumeration::ByOwner(owner.clone());
        let balance = self.size(&source).await?;
        self.enumerate(&source, balance, source.default_policy()).await
    }

    /// Every registered plant; one failed index fails the batch.
    pub async fn enumerate_all(&self) -> Result<Vec<PlantRecord>> {
        let total = self.size(&Enumeration::All).await?;
        self.enumerate(&Enumeration::All, total, Enumeration::All.default_policy())
            .await
    }

    /// Resolve indices `0..count` of `source` with the given policy. `count`
    /// is the already-known balance or supply.
    pub async fn enumerate(
        &self,
        source: &Enumeration,
        count: u64,
        policy: FailurePolicy,
    ) -> Result<Vec<PlantRecord>> {
        info!("Enumerating {} plants ({:?}, {:?})", count, source, policy);
        gather(&self.settings, "plant", count, policy, |index| {
            self.resolve(source, index)
        })
        .await
    }

    async fn resolve(&self, source: &Enumeration, index: u64) -> Result<PlantRecord> {
        let id = match source {
            Enumeration::ByOwner(owner) => self.registry.token_of_owner_by_index(owner, index).await?,
            Enumeration::All => self.registry.token_by_index(index).await?,
        };
        self.registry.get_plant(id).await
    }

    pub async fn fetch_plant(&self, id: u64) -> Result<PlantRecord> {
        timeout(self.settings.timeout, self.registry.get_plant(id))
            .await
            .map_err(|_| Error::Timeout {
                what: format!("plant {id}"),
                secs: self.settings.timeout.as_secs(),
            })?
    }

    pub async fn fetch_legacy(&self, id: u64) -> Result<LegacyPlant> {
        timeout(self.settings.timeout, self.registry.plants(id))
            .await
            .map_err(|_| Error::Timeout {
                what: format!("plant {id}"),
                secs: self.settings.timeout.as_secs(),
            })?
    }
}

/// Steward badge token ids held by `account`, in index order.
pub async fn enumerate_badges<T: TokenEnumerable>(
    badges: &T,
    account: Option<&Address>,
    settings: &FetchSettings,
) -> Result<Vec<u64>> {
    let Some(owner) = account else {
        return Ok(Vec::new());
    };
    let balance = badges.balance_of(owner).await?;
    gather(settings, "badge", balance, FailurePolicy::SkipFailed, |index| {
        badges.token_of_owner_by_index(owner, index)
    })
    .await
}
