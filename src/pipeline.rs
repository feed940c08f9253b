use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::error::IngestError;
use crate::io::DocumentFetcher;
use crate::models::{House, SittingKey};
use crate::stages::{
    build_batch, execute_stage1, execute_stage2, execute_stage3, parse_document, TalkerRoster,
};
use crate::store::PersistenceGateway;

/// Configuration for ingestion runs
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Sitting dates ingested at once
    pub max_concurrent_dates: usize,
    pub fetch_timeout_secs: u64,
    pub persist_timeout_secs: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_concurrent_dates: 4,
            fetch_timeout_secs: 60,
            persist_timeout_secs: 120,
        }
    }
}

/// Where one sitting date is in its ingestion
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum IngestState {
    Pending,
    Fetched,
    Parsed,
    Segmented,
    Persisted,
    Failed(String),
}

impl IngestState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, IngestState::Persisted | IngestState::Failed(_))
    }
}

impl fmt::Display for IngestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestState::Pending => f.write_str("PENDING"),
            IngestState::Fetched => f.write_str("FETCHED"),
            IngestState::Parsed => f.write_str("PARSED"),
            IngestState::Segmented => f.write_str("SEGMENTED"),
            IngestState::Persisted => f.write_str("PERSISTED"),
            IngestState::Failed(reason) => write!(f, "FAILED({})", reason),
        }
    }
}

/// Counts for a persisted sitting
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    pub debates: usize,
    pub speeches: usize,
    pub parts: usize,
    pub interjections: usize,
    pub talkers: usize,
    pub talkers_created: usize,
}

/// Final status of one sitting date
#[derive(Debug, Clone, Serialize)]
pub struct DateOutcome {
    pub sitting: SittingKey,
    pub state: IngestState,
    /// Last state reached before a failure
    pub failed_after: Option<IngestState>,
    pub stats: Option<IngestStats>,
    pub error_kind: Option<&'static str>,
}

impl DateOutcome {
    pub fn succeeded(&self) -> bool {
        self.state == IngestState::Persisted
    }
}

/// Per-date statuses of one run, ordered by date
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub outcomes: Vec<DateOutcome>,
}

impl IngestReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &DateOutcome> {
        self.outcomes.iter().filter(|o| o.succeeded())
    }

    pub fn failed(&self) -> impl Iterator<Item = &DateOutcome> {
        self.outcomes.iter().filter(|o| !o.succeeded())
    }

    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(DateOutcome::succeeded)
    }
}

/// Tracks one date through the state machine
struct DateRun {
    sitting: SittingKey,
    state: IngestState,
}

impl DateRun {
    fn advance(&mut self, next: IngestState) {
        debug!("{}: {} -> {}", self.sitting, self.state, next);
        self.state = next;
    }
}

/// Runs fetch, parse, segment, resolve and persist for sitting dates
#[derive(Clone)]
pub struct Ingestor {
    fetcher: Arc<dyn DocumentFetcher>,
    gateway: Arc<dyn PersistenceGateway>,
    roster: Arc<TalkerRoster>,
    config: IngestConfig,
}

impl Ingestor {
    pub fn new(
        fetcher: Arc<dyn DocumentFetcher>,
        gateway: Arc<dyn PersistenceGateway>,
        roster: Arc<TalkerRoster>,
        config: IngestConfig,
    ) -> Self {
        Self {
            fetcher,
            gateway,
            roster,
            config,
        }
    }

    pub fn roster(&self) -> &TalkerRoster {
        &self.roster
    }

    /// Ingest one sitting date. Never commits a partial sitting.
    pub async fn ingest(&self, house: House, date: NaiveDate) -> DateOutcome {
        let sitting = SittingKey::new(house, date);
        let span = info_span!("ingest", house = %house, date = %date);

        async move {
            let mut run = DateRun {
                sitting,
                state: IngestState::Pending,
            };
            match self.run(&mut run).await {
                Ok(stats) => {
                    run.advance(IngestState::Persisted);
                    info!(
                        "Ingested {}: {} speeches, {} parts",
                        sitting, stats.speeches, stats.parts
                    );
                    DateOutcome {
                        sitting,
                        state: run.state,
                        failed_after: None,
                        stats: Some(stats),
                        error_kind: None,
                    }
                }
                Err(err) => {
                    let failed_after = run.state.clone();
                    warn!("{} failed after {}: {}", sitting, failed_after, err);
                    run.advance(IngestState::Failed(err.to_string()));
                    DateOutcome {
                        sitting,
                        state: run.state,
                        failed_after: Some(failed_after),
                        stats: None,
                        error_kind: Some(err.kind()),
                    }
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run(&self, run: &mut DateRun) -> Result<IngestStats, IngestError> {
        let sitting = run.sitting;

        let fetch_secs = self.config.fetch_timeout_secs;
        let document = timeout(
            Duration::from_secs(fetch_secs),
            self.fetcher.fetch(sitting.house, sitting.date),
        )
        .await
        .map_err(|_| IngestError::Timeout {
            stage: "fetch",
            secs: fetch_secs,
        })??;
        run.advance(IngestState::Fetched);

        let parsed = tokio::task::spawn_blocking(move || parse_document(sitting, &document))
            .await
            .map_err(|e| IngestError::Worker(e.to_string()))??;
        run.advance(IngestState::Parsed);

        let segmented = execute_stage1(&parsed);
        let resolved = execute_stage2(&self.roster, segmented)?;
        run.advance(IngestState::Segmented);

        let talkers_created = resolved.talkers_created;
        let interjections = resolved.speeches.iter().map(|s| s.interjection_count()).sum();
        let batch = build_batch(resolved);

        let persist_secs = self.config.persist_timeout_secs;
        let summary = timeout(
            Duration::from_secs(persist_secs),
            execute_stage3(self.gateway.as_ref(), batch),
        )
        .await
        .map_err(|_| IngestError::Timeout {
            stage: "persist",
            secs: persist_secs,
        })??;

        Ok(IngestStats {
            debates: summary.debates,
            speeches: summary.speeches,
            parts: summary.parts,
            interjections,
            talkers: summary.talkers,
            talkers_created,
        })
    }

    /// Ingest several dates concurrently; each date succeeds or fails alone
    pub async fn ingest_many(
        &self,
        house: House,
        dates: impl IntoIterator<Item = NaiveDate>,
    ) -> IngestReport {
        let dates: BTreeSet<NaiveDate> = dates.into_iter().collect();
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_dates.max(1)));

        info!(
            "Ingesting {} dates for {} ({} at a time)",
            dates.len(),
            house,
            self.config.max_concurrent_dates.max(1)
        );

        let mut tasks = JoinSet::new();
        for &date in &dates {
            let ingestor = self.clone();
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                ingestor.ingest(house, date).await
            });
        }

        let mut outcomes = Vec::with_capacity(dates.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => warn!("Ingestion task failed: {}", e),
            }
        }

        // A task that died takes its date with it; report it as failed
        for date in dates {
            if !outcomes.iter().any(|o| o.sitting.date == date) {
                outcomes.push(DateOutcome {
                    sitting: SittingKey::new(house, date),
                    state: IngestState::Failed("ingestion task aborted".to_string()),
                    failed_after: None,
                    stats: None,
                    error_kind: Some("worker"),
                });
            }
        }

        outcomes.sort_by_key(|o| o.sitting);
        let report = IngestReport { outcomes };
        info!(
            "Ingestion finished: {} succeeded, {} failed",
            report.succeeded().count(),
            report.failed().count()
        );
        report
    }
}
