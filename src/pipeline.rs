use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::client::ApiClient;
use crate::config::Settings;
use crate::domain::{GeneRecord, OrganismCode, OrganismStatus, OrthologResult};
use crate::error::OrthoError;
use crate::orchestrator::{ConcurrencyOrchestrator, OrchestratorReport, ResolutionSink, Tally};
use crate::parser::{GeneListEntry, parse};
use crate::progress::{JobProgress, JobSummary, ProgressStore, ProgressTracker, Stage};
use crate::resolver::CascadingResolver;
use crate::sources::{OrthologSource, build_sources};
use crate::store::GeneStore;

/// A running job. Dropping the handle detaches the job; `abort` cancels it,
/// leaving already persisted genes and the last progress entry in place.
pub struct JobHandle {
    pub job_id: String,
    pub organism: OrganismCode,
    handle: JoinHandle<Result<JobSummary, OrthoError>>,
}

impl JobHandle {
    pub async fn wait(self) -> Result<JobSummary, OrthoError> {
        self.handle
            .await
            .map_err(|err| OrthoError::PipelineFatal(format!("job task ended: {err}")))?
    }

    pub fn abort(&self) {
        self.handle.abort();
    }
}

/// Drives one organism through fetch, store, resolve and finalize.
#[derive(Clone)]
pub struct Pipeline {
    settings: Arc<Settings>,
    client: ApiClient,
    store: Arc<dyn GeneStore>,
    tracker: ProgressTracker,
    resolver: Arc<CascadingResolver>,
}

impl Pipeline {
    pub fn new(
        settings: Settings,
        client: ApiClient,
        store: Arc<dyn GeneStore>,
        progress: Arc<dyn ProgressStore>,
    ) -> Result<Self, OrthoError> {
        let sources = build_sources(&settings, &client)?;
        Self::with_sources(settings, client, store, progress, sources)
    }

    pub fn with_sources(
        settings: Settings,
        client: ApiClient,
        store: Arc<dyn GeneStore>,
        progress: Arc<dyn ProgressStore>,
        sources: Vec<Arc<dyn OrthologSource>>,
    ) -> Result<Self, OrthoError> {
        settings.validate()?;
        let tracker = ProgressTracker::new(progress, settings.progress_ttl());
        Ok(Self {
            settings: Arc::new(settings),
            client,
            store,
            tracker,
            resolver: Arc::new(CascadingResolver::new(sources)),
        })
    }

    /// Marks the organism pending and runs the job in the background.
    pub async fn start_processing(
        &self,
        organism: &OrganismCode,
    ) -> Result<JobHandle, OrthoError> {
        if self.store.organism(organism).await?.is_none() {
            return Err(OrthoError::OrganismNotFound(organism.to_string()));
        }

        let job_id = Uuid::new_v4().to_string();
        self.store
            .set_status(organism, OrganismStatus::Pending, Some(&job_id), None)
            .await?;
        self.tracker
            .start(organism.as_str(), 0, Some(job_id.clone()))
            .await?;
        info!(
            organism = %organism,
            job_id = %job_id,
            sources = ?self.resolver.source_names(),
            "ortholog job queued"
        );

        let pipeline = self.clone();
        let code = organism.clone();
        let task_job_id = job_id.clone();
        let handle = tokio::spawn(async move { pipeline.run(code, task_job_id).await });
        Ok(JobHandle {
            job_id,
            organism: organism.clone(),
            handle,
        })
    }

    pub async fn get_progress(&self, organism: &OrganismCode) -> Result<JobProgress, OrthoError> {
        self.tracker.read(organism.as_str()).await
    }

    async fn run(self, organism: OrganismCode, job_id: String) -> Result<JobSummary, OrthoError> {
        let err = match self.execute(&organism).await {
            Ok(summary) => {
                info!(
                    organism = %organism,
                    job_id = %job_id,
                    total = summary.total_genes,
                    with_orthologs = summary.genes_with_orthologs,
                    orphans = summary.orphans,
                    coverage = summary.coverage_percent,
                    "ortholog job complete"
                );
                return Ok(summary);
            }
            Err(err) => err,
        };

        let message = match &err {
            OrthoError::PipelineFatal(message) => message.clone(),
            other => other.to_string(),
        };
        error!(organism = %organism, job_id = %job_id, error = %message, "ortholog job failed");
        if let Err(status_err) = self
            .store
            .set_status(&organism, OrganismStatus::Error, None, Some(&message))
            .await
        {
            error!(organism = %organism, error = %status_err, "could not record job failure");
        }
        if let Err(progress_err) = self.tracker.fail(organism.as_str(), &message).await {
            error!(organism = %organism, error = %progress_err, "could not record job failure");
        }
        Err(OrthoError::PipelineFatal(message))
    }

    async fn execute(&self, organism: &OrganismCode) -> Result<JobSummary, OrthoError> {
        let genes = self.fetch_genes(organism).await?;
        self.store_genes(organism, &genes).await?;

        let total = genes.len();
        report_progress(
            organism,
            self.tracker
                .advance(organism.as_str(), Stage::Resolving, 0, total)
                .await,
        );
        let orchestrator = ConcurrencyOrchestrator::new(
            Arc::clone(&self.resolver),
            self.settings.max_in_flight,
            self.settings.quality_threshold,
        );
        let sink = Arc::new(StoreSink {
            organism: organism.clone(),
            store: Arc::clone(&self.store),
            tracker: self.tracker.clone(),
        });
        let report = orchestrator.resolve_all(genes, organism, sink).await;

        let summary = summarize(organism, &report);
        self.store
            .set_status(organism, OrganismStatus::Complete, None, None)
            .await?;
        self.tracker
            .complete(organism.as_str(), summary.clone())
            .await?;
        Ok(summary)
    }

    async fn fetch_genes(&self, organism: &OrganismCode) -> Result<Vec<GeneRecord>, OrthoError> {
        info!(organism = %organism, "fetching gene list");
        let path = format!("/list/{}", organism.as_str());
        let body = self
            .client
            .fetch(&self.settings.kegg_base_url, &path, &[])
            .await
            .map_err(|err| OrthoError::PipelineFatal(format!("gene list fetch failed: {err}")))?;
        let entries = parse::<GeneListEntry>(&body)
            .map_err(|err| OrthoError::PipelineFatal(format!("gene list unreadable: {err}")))?;

        let mut seen = HashSet::new();
        let mut genes = Vec::with_capacity(entries.len());
        for entry in entries {
            if !entry.id.belongs_to(organism) {
                warn!(organism = %organism, gene = %entry.id, "skipping foreign gene in list");
                continue;
            }
            if seen.insert(entry.id.clone()) {
                genes.push(GeneRecord::new(entry.id, entry.description, organism.clone()));
            }
        }

        let total = genes.len();
        report_progress(
            organism,
            self.tracker
                .advance(organism.as_str(), Stage::Fetching, total, total)
                .await,
        );
        info!(organism = %organism, genes = total, "gene list fetched");
        Ok(genes)
    }

    async fn store_genes(
        &self,
        organism: &OrganismCode,
        genes: &[GeneRecord],
    ) -> Result<(), OrthoError> {
        let total = genes.len();
        let mut stored = 0;
        for batch in genes.chunks(self.settings.store_batch_size) {
            self.store
                .upsert_genes(batch)
                .await
                .map_err(|err| OrthoError::PipelineFatal(format!("storing genes failed: {err}")))?;
            stored += batch.len();
            report_progress(
                organism,
                self.tracker
                    .advance(organism.as_str(), Stage::Storing, stored, total)
                    .await,
            );
        }
        info!(organism = %organism, genes = stored, "genes stored");
        Ok(())
    }
}

struct StoreSink {
    organism: OrganismCode,
    store: Arc<dyn GeneStore>,
    tracker: ProgressTracker,
}

#[async_trait]
impl ResolutionSink for StoreSink {
    async fn persist(
        &self,
        gene: &GeneRecord,
        result: Option<&OrthologResult>,
    ) -> Result<(), OrthoError> {
        self.store
            .set_ortholog(&gene.id, result.map(OrthologResult::to_fields))
            .await
    }

    async fn completed(&self, tally: &Tally) {
        report_progress(
            &self.organism,
            self.tracker
                .advance_resolving(
                    self.organism.as_str(),
                    tally.processed,
                    tally.total,
                    tally.with_orthologs,
                    tally.failures,
                )
                .await,
        );
    }
}

/// Progress writes never abort a job.
fn report_progress(organism: &OrganismCode, outcome: Result<JobProgress, OrthoError>) {
    if let Err(err) = outcome {
        warn!(organism = %organism, error = %err, "progress update failed");
    }
}

fn summarize(organism: &OrganismCode, report: &OrchestratorReport) -> JobSummary {
    let tally = report.tally;
    let mut by_source = BTreeMap::new();
    for source in report.outcomes.iter().filter_map(|outcome| outcome.source.as_ref()) {
        *by_source.entry(source.clone()).or_insert(0) += 1;
    }
    let coverage_percent = if tally.total == 0 {
        0.0
    } else {
        (tally.with_orthologs as f64 / tally.total as f64 * 10_000.0).round() / 100.0
    };
    JobSummary {
        organism: organism.to_string(),
        total_genes: tally.total,
        genes_with_orthologs: tally.with_orthologs,
        orphans: tally.orphans,
        failures: tally.failures,
        coverage_percent,
        by_source,
    }
}
