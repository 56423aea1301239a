//! Periodic re-aggregation.
//!
//! Every tick starts an independent fetch tagged with a sequence number.
//! Fetches may overlap; [`RefreshGate`] drops any result that arrives after
//! a newer one has already been applied. A fetch that outlives its timeout
//! is cancelled and reported as failed.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, warn};

/// Accepts results only in increasing sequence order.
#[derive(Debug, Default)]
pub struct RefreshGate {
    latest_applied: Option<u64>,
}

impl RefreshGate {
    pub fn accept(&mut self, sequence: u64) -> bool {
        match self.latest_applied {
            Some(latest) if sequence <= latest => false,
            _ => {
                self.latest_applied = Some(sequence);
                true
            }
        }
    }

    pub fn latest_applied(&self) -> Option<u64> {
        self.latest_applied
    }
}

/// Runs `fetch` immediately and then every `period` until `shutdown`
/// resolves, handing each fresh result to `apply`. Failed or timed out
/// fetches are logged and skipped.
pub async fn watch<T, F, Fut, A, S>(
    period: Duration,
    fetch_timeout: Duration,
    fetch: F,
    mut apply: A,
    shutdown: S,
) where
    T: Send + 'static,
    F: Fn(u64) -> Fut,
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    A: FnMut(u64, T),
    S: Future<Output = ()>,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<(u64, anyhow::Result<T>)>();
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut gate = RefreshGate::default();
    let mut next_sequence = 1u64;

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                let sequence = next_sequence;
                next_sequence += 1;
                let request = fetch(sequence);
                let tx = tx.clone();
                tokio::spawn(async move {
                    let result = match timeout(fetch_timeout, request).await {
                        Ok(result) => result,
                        Err(_) => Err(anyhow::anyhow!(
                            "refresh timed out after {}ms",
                            fetch_timeout.as_millis()
                        )),
                    };
                    let _ = tx.send((sequence, result));
                });
                debug!(sequence, "refresh started");
            }
            Some((sequence, result)) = rx.recv() => match result {
                Ok(value) if gate.accept(sequence) => apply(sequence, value),
                Ok(_) => debug!(sequence, latest = ?gate.latest_applied(), "discarding stale refresh"),
                Err(err) => warn!(sequence, error = %err, "refresh failed"),
            },
        }
    }
}
