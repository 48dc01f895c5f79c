use komodo_core::{Index, SearchQuery, SearchResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Runs callback searches in the background and POSTs their results.
///
/// At most `workers` searches/deliveries run at once; the rest queue on the
/// semaphore. Delivery failures are logged and never retried.
pub struct CallbackDispatcher {
    client: reqwest::Client,
    permits: Arc<Semaphore>,
}

impl CallbackDispatcher {
    pub fn new(workers: usize, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("komodo/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self { client, permits: Arc::new(Semaphore::new(workers.max(1))) })
    }

    /// Detaches a task that executes `query` and delivers the result to `url`.
    /// The query must already have passed validation.
    pub fn dispatch_search(&self, index: Arc<Index>, query: SearchQuery, url: String) -> JoinHandle<()> {
        let client = self.client.clone();
        let permits = Arc::clone(&self.permits);
        tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else { return };
            let index_name = index.name().to_string();
            let result = match tokio::task::spawn_blocking(move || index.search(&query)).await {
                Ok(Ok(result)) => result,
                Ok(Err(err)) => {
                    warn!(index = %index_name, url = %url, error = %err, "callback search failed");
                    return;
                }
                Err(err) => {
                    warn!(index = %index_name, url = %url, error = %err, "callback search task panicked");
                    return;
                }
            };
            deliver(&client, &url, &result).await;
        })
    }
}

async fn deliver(client: &reqwest::Client, url: &str, result: &SearchResult) {
    debug!(url, matches = result.matches.len(), "delivering search result");
    match client.post(url).json(result).send().await {
        Ok(resp) if resp.status().is_success() => {
            info!(url, status = resp.status().as_u16(), "search result delivered");
        }
        Ok(resp) => warn!(url, status = resp.status().as_u16(), "callback endpoint rejected search result"),
        Err(err) => warn!(url, error = %err, "search result delivery failed"),
    }
}
