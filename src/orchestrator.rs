use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream;
use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::{GeneId, GeneRecord, OrganismCode, OrthologResult};
use crate::error::OrthoError;
use crate::resolver::CascadingResolver;

/// Receives each gene as soon as it is resolved.
#[async_trait]
pub trait ResolutionSink: Send + Sync {
    /// Writes the outcome for one gene. `None` clears its ortholog fields.
    async fn persist(
        &self,
        gene: &GeneRecord,
        result: Option<&OrthologResult>,
    ) -> Result<(), OrthoError>;

    /// Called once per completed gene, after `persist`.
    async fn completed(&self, tally: &Tally);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub total: usize,
    pub processed: usize,
    pub with_orthologs: usize,
    pub orphans: usize,
    /// Genes left without a result after a source error, or not persisted.
    pub failures: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct GeneOutcome {
    pub gene: GeneId,
    pub source: Option<String>,
    pub confidence: Option<f64>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct OrchestratorReport {
    pub outcomes: Vec<GeneOutcome>,
    pub tally: Tally,
}

struct Completed {
    gene: GeneId,
    result: Option<OrthologResult>,
    note: Option<String>,
    failed: bool,
}

/// Fans the resolver out over a gene list with at most `max_in_flight` genes
/// being resolved at once. Genes start in list order and finish in any order.
pub struct ConcurrencyOrchestrator {
    resolver: Arc<CascadingResolver>,
    max_in_flight: usize,
    quality_threshold: f64,
}

impl ConcurrencyOrchestrator {
    pub fn new(
        resolver: Arc<CascadingResolver>,
        max_in_flight: usize,
        quality_threshold: f64,
    ) -> Self {
        Self {
            resolver,
            max_in_flight: max_in_flight.max(1),
            quality_threshold,
        }
    }

    /// Resolves every gene, persisting each through `sink` as it completes.
    /// Per-gene failures end up as orphans with a note, never as an error.
    pub async fn resolve_all(
        &self,
        genes: Vec<GeneRecord>,
        exclude_organism: &OrganismCode,
        sink: Arc<dyn ResolutionSink>,
    ) -> OrchestratorReport {
        let mut report = OrchestratorReport {
            outcomes: Vec::with_capacity(genes.len()),
            tally: Tally {
                total: genes.len(),
                ..Tally::default()
            },
        };

        let mut completions = stream::iter(genes)
            .map(|gene| {
                resolve_one(
                    Arc::clone(&self.resolver),
                    gene,
                    exclude_organism.clone(),
                    self.quality_threshold,
                    Arc::clone(&sink),
                )
            })
            .buffer_unordered(self.max_in_flight);

        while let Some(done) = completions.next().await {
            let tally = &mut report.tally;
            tally.processed += 1;
            if done.result.is_some() {
                tally.with_orthologs += 1;
            } else {
                tally.orphans += 1;
            }
            if done.failed {
                tally.failures += 1;
            }
            sink.completed(tally).await;
            report.outcomes.push(GeneOutcome {
                gene: done.gene,
                source: done.result.as_ref().map(|result| result.source.clone()),
                confidence: done.result.as_ref().map(|result| result.confidence),
                note: done.note,
            });
        }
        report
    }
}

async fn resolve_one(
    resolver: Arc<CascadingResolver>,
    gene: GeneRecord,
    exclude_organism: OrganismCode,
    quality_threshold: f64,
    sink: Arc<dyn ResolutionSink>,
) -> Completed {
    let resolution = resolver
        .resolve(&gene.id, &exclude_organism, quality_threshold)
        .await;

    let mut notes: Vec<String> = resolution
        .failures
        .iter()
        .map(|failure| format!("{}: {}", failure.source, failure.message))
        .collect();
    if resolution.result.is_some() && !resolution.accepted {
        notes.push("below quality threshold".to_string());
    }
    let mut failed = !resolution.failures.is_empty() && resolution.is_exhausted();
    let mut result = resolution.result;

    if let Err(err) = sink.persist(&gene, result.as_ref()).await {
        warn!(
            gene = %gene.id,
            organism = %exclude_organism,
            error = %err,
            "failed to persist ortholog"
        );
        notes.push(format!("persist: {err}"));
        failed = true;
        // not stored, so reported as an orphan
        result = None;
    }
    debug!(gene = %gene.id, found = result.is_some(), "gene resolved");

    Completed {
        gene: gene.id,
        result,
        note: (!notes.is_empty()).then(|| notes.join("; ")),
        failed,
    }
}
