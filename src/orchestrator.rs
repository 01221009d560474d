use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

use crate::aggregator::PlaceAggregator;
use crate::errors::{AppError, AppResult};
use crate::places::normalize_region;
use crate::telemetry::TelemetryClient;

/// How widely a running fetch blocks other fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SerializationScope {
    /// One fetch at a time across the whole process.
    Global,
    /// One fetch at a time per normalized region.
    PerRegion,
}

impl FromStr for SerializationScope {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "global" => Ok(SerializationScope::Global),
            "per-region" | "per_region" | "region" => Ok(SerializationScope::PerRegion),
            other => Err(AppError::Config(format!(
                "invalid fetch serialization scope: {other}"
            ))),
        }
    }
}

impl fmt::Display for SerializationScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SerializationScope::Global => f.write_str("global"),
            SerializationScope::PerRegion => f.write_str("per-region"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Completed { region: String, inserted: usize },
    Failed { region: String, reason: String },
}

impl FetchOutcome {
    pub fn region(&self) -> &str {
        match self {
            FetchOutcome::Completed { region, .. } | FetchOutcome::Failed { region, .. } => region,
        }
    }

    pub fn inserted(&self) -> usize {
        match self {
            FetchOutcome::Completed { inserted, .. } => *inserted,
            FetchOutcome::Failed { .. } => 0,
        }
    }
}

struct FetchGate {
    scope: SerializationScope,
    global: Arc<AsyncMutex<()>>,
    regions: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl FetchGate {
    fn new(scope: SerializationScope) -> Self {
        Self {
            scope,
            global: Arc::new(AsyncMutex::new(())),
            regions: Mutex::new(HashMap::new()),
        }
    }

    async fn enter(&self, region: &str) -> OwnedMutexGuard<()> {
        let lock = match self.scope {
            SerializationScope::Global => Arc::clone(&self.global),
            SerializationScope::PerRegion => {
                let mut regions = self.regions.lock();
                Arc::clone(
                    regions
                        .entry(region.to_string())
                        .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
                )
            }
        };
        lock.lock_owned().await
    }
}

/// Entry point for fetch-and-save runs. Never surfaces a failure to callers.
pub struct FetchOrchestrator {
    aggregator: PlaceAggregator,
    gate: FetchGate,
    telemetry: Option<TelemetryClient>,
}

impl FetchOrchestrator {
    pub fn new(aggregator: PlaceAggregator, scope: SerializationScope) -> Self {
        Self {
            aggregator,
            gate: FetchGate::new(scope),
            telemetry: None,
        }
    }

    pub fn with_telemetry(mut self, telemetry: TelemetryClient) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn scope(&self) -> SerializationScope {
        self.gate.scope
    }

    pub async fn fetch_and_save(&self, term: &str) {
        let _ = self.run(term).await;
    }

    /// Like [`fetch_and_save`](Self::fetch_and_save) but reports what happened.
    pub async fn run(&self, term: &str) -> FetchOutcome {
        let region = normalize_region(term);
        let _permit = self.gate.enter(&region).await;
        debug!(%region, scope = %self.gate.scope, "fetch started");

        match self.aggregator.collect(term).await {
            Ok(stats) => {
                self.record(
                    "fetch_completed",
                    json!({
                        "region": stats.region,
                        "query": stats.query,
                        "candidates": stats.candidates,
                        "inserted": stats.inserted,
                        "fallback_images": stats.fallback_images,
                    }),
                );
                FetchOutcome::Completed {
                    region,
                    inserted: stats.inserted,
                }
            }
            Err(err) => {
                error!(%region, ?err, "fetch failed; discarding");
                self.record(
                    "fetch_failed",
                    json!({ "region": region, "reason": err.to_string() }),
                );
                FetchOutcome::Failed {
                    region,
                    reason: err.to_string(),
                }
            }
        }
    }

    fn record(&self, name: &str, payload: serde_json::Value) {
        if let Some(telemetry) = &self.telemetry {
            if let Err(err) = telemetry.record(name, payload) {
                warn!(?err, "failed to queue fetch telemetry");
            }
        }
    }
}

struct FetchJob {
    term: String,
    done: oneshot::Sender<FetchOutcome>,
}

/// Bounded queue feeding a single background fetch worker.
#[derive(Clone)]
pub struct FetchQueue {
    sender: mpsc::Sender<FetchJob>,
}

/// Completion signal for a submitted fetch.
pub struct FetchTicket {
    receiver: oneshot::Receiver<FetchOutcome>,
}

impl FetchTicket {
    /// Resolves once the fetch has run; `None` if the worker went away first.
    pub async fn completed(self) -> Option<FetchOutcome> {
        self.receiver.await.ok()
    }
}

impl FetchQueue {
    /// Spawns the worker on the current tokio runtime.
    pub fn spawn(orchestrator: Arc<FetchOrchestrator>, capacity: usize) -> Self {
        let (sender, mut receiver) = mpsc::channel::<FetchJob>(capacity.max(1));
        tokio::spawn(async move {
            while let Some(job) = receiver.recv().await {
                let outcome = orchestrator.run(&job.term).await;
                let _ = job.done.send(outcome);
            }
            info!("fetch queue closed; worker exiting");
        });
        Self { sender }
    }

    pub fn submit(&self, term: impl Into<String>) -> AppResult<FetchTicket> {
        let (done, receiver) = oneshot::channel();
        let job = FetchJob {
            term: term.into(),
            done,
        };
        self.sender.try_send(job).map_err(|err| match err {
            mpsc::error::TrySendError::Full(job) => {
                warn!(term = %job.term, "fetch queue full; dropping request");
                AppError::QueueFull
            }
            mpsc::error::TrySendError::Closed(_) => AppError::QueueClosed,
        })?;
        Ok(FetchTicket { receiver })
    }
}
