//! The crawl worker: a shared HTTP client and a bounded pool of fetch tasks.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio::runtime::Handle;
use tokio::sync::{Semaphore, watch};
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

use fieldmap_mapping::{CrawlGateway, CrawlOutcome, FetchHandle};
use fieldmap_shared::{CrawlOptions, FetchCategory, FieldMapError, Result};

use crate::fetch::{fetch_outcome, redirect_policy};

/// User-Agent string for crawl requests.
const USER_AGENT: &str = concat!("fieldmap/", env!("CARGO_PKG_VERSION"));

/// Lifecycle of one submitted fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchState {
    /// Waiting for a free fetch slot.
    Queued,
    /// Request in flight.
    Running,
    /// Finished, successfully or not.
    Done(Box<CrawlOutcome>),
}

// ---------------------------------------------------------------------------
// CrawlMaster
// ---------------------------------------------------------------------------

/// Fetches pages on the tokio runtime it was created on.
pub struct CrawlMaster {
    client: Client,
    slots: Arc<Semaphore>,
    options: CrawlOptions,
    runtime: Handle,
}

impl CrawlMaster {
    /// Create a crawl worker. Must be called from within a tokio runtime.
    pub fn new(options: CrawlOptions) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(redirect_policy(options.max_redirects, options.allow_private_hosts))
            .timeout(options.request_timeout)
            .build()
            .map_err(|e| FieldMapError::Network(format!("failed to build HTTP client: {e}")))?;

        let runtime = Handle::try_current()
            .map_err(|e| FieldMapError::Crawl(format!("crawl worker needs a tokio runtime: {e}")))?;

        info!(
            concurrency = options.concurrency,
            rate_limit_ms = options.rate_limit.as_millis() as u64,
            allow_private_hosts = options.allow_private_hosts,
            "crawl worker ready"
        );

        Ok(Self {
            client,
            slots: Arc::new(Semaphore::new(options.concurrency as usize)),
            options,
            runtime,
        })
    }
}

impl CrawlGateway for CrawlMaster {
    type Handle = CrawlHandle;

    fn submit(&self, url: &Url, category: FetchCategory) -> Result<CrawlHandle> {
        let id = Uuid::now_v7();
        let (state_tx, state_rx) = watch::channel(FetchState::Queued);

        let client = self.client.clone();
        let slots = self.slots.clone();
        let rate_limit = self.options.rate_limit;
        let allow_private_hosts = self.options.allow_private_hosts;
        let target = url.clone();

        debug!(%id, %url, %category, "fetch queued");

        self.runtime.spawn(async move {
            let Ok(_permit) = slots.acquire_owned().await else {
                state_tx.send_replace(FetchState::Done(Box::new(CrawlOutcome {
                    url: target,
                    category,
                    status_code: None,
                    document: None,
                    error: Some("crawl worker shut down".into()),
                })));
                return;
            };
            state_tx.send_replace(FetchState::Running);

            if !rate_limit.is_zero() {
                tokio::time::sleep(rate_limit).await;
            }

            let outcome = fetch_outcome(&client, &target, category, allow_private_hosts, id).await;
            state_tx.send_replace(FetchState::Done(Box::new(outcome)));
        });

        Ok(CrawlHandle {
            id,
            url: url.clone(),
            state: state_rx,
        })
    }
}

// ---------------------------------------------------------------------------
// CrawlHandle
// ---------------------------------------------------------------------------

/// Observer of one fetch submitted to a [`CrawlMaster`].
#[derive(Debug, Clone)]
pub struct CrawlHandle {
    id: Uuid,
    url: Url,
    state: watch::Receiver<FetchState>,
}

impl CrawlHandle {
    /// Snapshot of the fetch state.
    pub fn state(&self) -> FetchState {
        self.state.borrow().clone()
    }

    async fn wait_until(&self, budget: Duration, reached: fn(&FetchState) -> bool) -> Result<bool> {
        let mut state = self.state.clone();
        match tokio::time::timeout(budget, state.wait_for(reached)).await {
            Ok(Ok(_)) => Ok(true),
            Ok(Err(_)) => Err(FieldMapError::Crawl(format!(
                "fetch task {} for {} ended without a result",
                self.id, self.url
            ))),
            Err(_) => Ok(false),
        }
    }
}

impl FetchHandle for CrawlHandle {
    async fn wait_for_start(&self, budget: Duration) -> Result<bool> {
        self.wait_until(budget, |s| !matches!(s, FetchState::Queued))
            .await
    }

    async fn wait_for_end(&self, budget: Duration) -> Result<bool> {
        self.wait_until(budget, |s| matches!(s, FetchState::Done(_)))
            .await
    }

    fn current_result(&self) -> Option<CrawlOutcome> {
        match &*self.state.borrow() {
            FetchState::Done(outcome) => Some(outcome.as_ref().clone()),
            _ => None,
        }
    }
}
