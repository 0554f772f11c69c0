use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{error, info};

use crate::error::OrthoError;
use crate::store::{blocking, write_json_atomic};

pub const MAX_ERROR_MESSAGE: usize = 1000;

/// Job stages in execution order. `Error` is terminal and reachable from any
/// other stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fetching,
    Storing,
    Resolving,
    Complete,
    Error,
}

impl Stage {
    /// Share of the overall bar, in percent, that this stage spans.
    pub fn span(self) -> (f64, f64) {
        match self {
            Stage::Fetching => (0.0, 10.0),
            Stage::Storing => (10.0, 15.0),
            Stage::Resolving => (15.0, 100.0),
            Stage::Complete => (100.0, 100.0),
            Stage::Error => (0.0, 0.0),
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Complete | Stage::Error)
    }
}

/// Overall percentage for `current` of `total` within `stage`, two decimals.
pub fn blended_percentage(stage: Stage, current: usize, total: usize) -> f64 {
    let (low, high) = stage.span();
    let fraction = if total == 0 {
        0.0
    } else {
        current.min(total) as f64 / total as f64
    };
    let raw = low + (high - low) * fraction;
    (raw * 100.0).round() / 100.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    pub organism: String,
    pub total_genes: usize,
    pub genes_with_orthologs: usize,
    pub orphans: usize,
    pub failures: usize,
    pub coverage_percent: f64,
    pub by_source: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobProgress {
    pub organism_id: String,
    #[serde(default)]
    pub job_id: Option<String>,
    pub stage: Stage,
    pub current: usize,
    pub total: usize,
    pub percentage: f64,
    #[serde(default)]
    pub genes_with_orthologs: usize,
    #[serde(default)]
    pub errors: usize,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub summary: Option<JobSummary>,
}

impl JobProgress {
    fn fresh(organism_id: &str, total: usize, job_id: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            organism_id: organism_id.to_string(),
            job_id,
            stage: Stage::Fetching,
            current: 0,
            total,
            percentage: 0.0,
            genes_with_orthologs: 0,
            errors: 0,
            started_at: now,
            updated_at: now,
            error_message: None,
            summary: None,
        }
    }
}

pub type ProgressUpdate = Box<dyn FnOnce(Option<JobProgress>) -> JobProgress + Send>;

/// Shared key-value store for progress entries with per-key expiry.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<JobProgress>, OrthoError>;

    /// Atomic read-modify-write. The stored entry's lifetime restarts at `ttl`.
    async fn update(
        &self,
        key: &str,
        ttl: Duration,
        apply: ProgressUpdate,
    ) -> Result<JobProgress, OrthoError>;

    async fn delete(&self, key: &str) -> Result<(), OrthoError>;
}

#[derive(Default)]
pub struct MemoryProgressStore {
    entries: Mutex<HashMap<String, (JobProgress, Instant)>>,
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProgressStore for MemoryProgressStore {
    async fn get(&self, key: &str) -> Result<Option<JobProgress>, OrthoError> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some((_, deadline)) if *deadline <= Instant::now() => {
                entries.remove(key);
                Ok(None)
            }
            Some((progress, _)) => Ok(Some(progress.clone())),
            None => Ok(None),
        }
    }

    async fn update(
        &self,
        key: &str,
        ttl: Duration,
        apply: ProgressUpdate,
    ) -> Result<JobProgress, OrthoError> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        let current = entries
            .remove(key)
            .filter(|(_, deadline)| *deadline > now)
            .map(|(progress, _)| progress);
        let next = apply(current);
        entries.insert(key.to_string(), (next.clone(), now + ttl));
        Ok(next)
    }

    async fn delete(&self, key: &str) -> Result<(), OrthoError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredProgress {
    expires_at: DateTime<Utc>,
    progress: JobProgress,
}

/// One JSON document per key under `<root>/progress`, readable by other
/// processes. Filesystem work runs on the blocking pool; writes from this
/// process are serialized.
pub struct FileProgressStore {
    root: Utf8PathBuf,
    write_lock: Mutex<()>,
}

impl FileProgressStore {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn path(&self, key: &str) -> Utf8PathBuf {
        let file = key
            .chars()
            .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' { ch } else { '_' })
            .collect::<String>();
        self.root.join("progress").join(format!("{file}.json"))
    }

    fn read(path: &Utf8Path) -> Result<Option<JobProgress>, OrthoError> {
        if !path.as_std_path().exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| OrthoError::Storage(format!("read {path}: {err}")))?;
        let stored: StoredProgress = serde_json::from_str(&content)
            .map_err(|err| OrthoError::Storage(format!("decode {path}: {err}")))?;
        if stored.expires_at <= Utc::now() {
            return Ok(None);
        }
        Ok(Some(stored.progress))
    }
}

#[async_trait]
impl ProgressStore for FileProgressStore {
    async fn get(&self, key: &str) -> Result<Option<JobProgress>, OrthoError> {
        let path = self.path(key);
        blocking(move || Self::read(&path)).await
    }

    async fn update(
        &self,
        key: &str,
        ttl: Duration,
        apply: ProgressUpdate,
    ) -> Result<JobProgress, OrthoError> {
        let _guard = self.write_lock.lock().await;
        let path = self.path(key);
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|err| OrthoError::InvalidConfig(format!("progress ttl: {err}")))?;
        blocking(move || {
            let next = apply(Self::read(&path)?);
            let stored = StoredProgress {
                expires_at: Utc::now() + ttl,
                progress: next.clone(),
            };
            write_json_atomic(&path, &stored)?;
            Ok(next)
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<(), OrthoError> {
        let _guard = self.write_lock.lock().await;
        let path = self.path(key);
        blocking(move || {
            if path.as_std_path().exists() {
                fs::remove_file(path.as_std_path())
                    .map_err(|err| OrthoError::Storage(format!("remove {path}: {err}")))?;
            }
            Ok(())
        })
        .await
    }
}

/// Writes job progress for organisms. Percentages never move backwards
/// within a run; a new `start` begins a new run.
#[derive(Clone)]
pub struct ProgressTracker {
    store: Arc<dyn ProgressStore>,
    ttl: Duration,
}

impl ProgressTracker {
    pub fn new(store: Arc<dyn ProgressStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    fn key(organism_id: &str) -> String {
        format!("progress:{organism_id}")
    }

    pub async fn start(
        &self,
        organism_id: &str,
        total_genes: usize,
        job_id: Option<String>,
    ) -> Result<JobProgress, OrthoError> {
        let organism = organism_id.to_string();
        let progress = self
            .store
            .update(
                &Self::key(organism_id),
                self.ttl,
                Box::new(move |_| JobProgress::fresh(&organism, total_genes, job_id)),
            )
            .await?;
        info!(organism = organism_id, total = total_genes, "progress tracking started");
        Ok(progress)
    }

    pub async fn advance(
        &self,
        organism_id: &str,
        stage: Stage,
        current: usize,
        total: usize,
    ) -> Result<JobProgress, OrthoError> {
        self.advance_with(organism_id, stage, current, total, None)
            .await
    }

    /// `advance` for the resolving stage, also recording orthologs found and
    /// per-gene errors so far.
    pub async fn advance_resolving(
        &self,
        organism_id: &str,
        current: usize,
        total: usize,
        genes_with_orthologs: usize,
        errors: usize,
    ) -> Result<JobProgress, OrthoError> {
        self.advance_with(
            organism_id,
            Stage::Resolving,
            current,
            total,
            Some((genes_with_orthologs, errors)),
        )
        .await
    }

    async fn advance_with(
        &self,
        organism_id: &str,
        stage: Stage,
        current: usize,
        total: usize,
        tally: Option<(usize, usize)>,
    ) -> Result<JobProgress, OrthoError> {
        let organism = organism_id.to_string();
        self.store
            .update(
                &Self::key(organism_id),
                self.ttl,
                Box::new(move |previous| {
                    let mut progress =
                        previous.unwrap_or_else(|| JobProgress::fresh(&organism, total, None));
                    if progress.stage.is_terminal() || stage < progress.stage {
                        return progress;
                    }
                    let current = current.min(total);
                    if stage == progress.stage && total == progress.total {
                        progress.current = progress.current.max(current);
                    } else {
                        progress.current = current;
                    }
                    progress.stage = stage;
                    progress.total = total;
                    progress.percentage = progress
                        .percentage
                        .max(blended_percentage(stage, progress.current, total));
                    if let Some((with_orthologs, errors)) = tally {
                        progress.genes_with_orthologs =
                            progress.genes_with_orthologs.max(with_orthologs);
                        progress.errors = progress.errors.max(errors);
                    }
                    progress.updated_at = Utc::now();
                    progress
                }),
            )
            .await
    }

    pub async fn complete(
        &self,
        organism_id: &str,
        summary: JobSummary,
    ) -> Result<JobProgress, OrthoError> {
        let organism = organism_id.to_string();
        let progress = self
            .store
            .update(
                &Self::key(organism_id),
                self.ttl,
                Box::new(move |previous| {
                    let mut progress = previous.unwrap_or_else(|| {
                        JobProgress::fresh(&organism, summary.total_genes, None)
                    });
                    progress.stage = Stage::Complete;
                    progress.total = summary.total_genes;
                    progress.current = summary.total_genes;
                    progress.percentage = 100.0;
                    progress.genes_with_orthologs = summary.genes_with_orthologs;
                    progress.errors = summary.failures;
                    progress.summary = Some(summary);
                    progress.updated_at = Utc::now();
                    progress
                }),
            )
            .await?;
        info!(organism = organism_id, "job marked complete");
        Ok(progress)
    }

    pub async fn fail(&self, organism_id: &str, message: &str) -> Result<JobProgress, OrthoError> {
        let organism = organism_id.to_string();
        let message: String = message.chars().take(MAX_ERROR_MESSAGE).collect();
        error!(organism = organism_id, error = %message, "job failed");
        self.store
            .update(
                &Self::key(organism_id),
                self.ttl,
                Box::new(move |previous| {
                    let mut progress =
                        previous.unwrap_or_else(|| JobProgress::fresh(&organism, 0, None));
                    progress.stage = Stage::Error;
                    progress.error_message = Some(message);
                    progress.updated_at = Utc::now();
                    progress
                }),
            )
            .await
    }

    pub async fn read(&self, organism_id: &str) -> Result<JobProgress, OrthoError> {
        self.store
            .get(&Self::key(organism_id))
            .await?
            .ok_or_else(|| OrthoError::ProgressNotFound(organism_id.to_string()))
    }

    pub async fn clear(&self, organism_id: &str) -> Result<(), OrthoError> {
        self.store.delete(&Self::key(organism_id)).await
    }
}
