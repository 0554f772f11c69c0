use std::sync::Arc;

use tracing::{debug, warn};

use crate::domain::{GeneId, OrganismCode, OrthologResult};
use crate::sources::OrthologSource;

/// A source that failed for one gene. Recorded, never propagated.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFailure {
    pub source: String,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub result: Option<OrthologResult>,
    /// True when `result` met the quality threshold.
    pub accepted: bool,
    pub failures: Vec<SourceFailure>,
}

impl Resolution {
    /// Every source was tried and none produced anything.
    pub fn is_exhausted(&self) -> bool {
        self.result.is_none()
    }
}

/// Tries sources in priority order until one clears the quality threshold.
pub struct CascadingResolver {
    sources: Vec<Arc<dyn OrthologSource>>,
}

impl CascadingResolver {
    pub fn new(sources: Vec<Arc<dyn OrthologSource>>) -> Self {
        Self { sources }
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|source| source.name()).collect()
    }

    pub async fn resolve_best(
        &self,
        gene: &GeneId,
        exclude_organism: &OrganismCode,
        quality_threshold: f64,
    ) -> Option<OrthologResult> {
        self.resolve(gene, exclude_organism, quality_threshold)
            .await
            .result
    }

    /// Full cascade. Falls back to the strongest below-threshold result once
    /// every source has been asked; ties keep the earlier source. Every source
    /// is released for `gene` afterwards, including ones never asked.
    pub async fn resolve(
        &self,
        gene: &GeneId,
        exclude_organism: &OrganismCode,
        quality_threshold: f64,
    ) -> Resolution {
        let resolution = self
            .cascade(gene, exclude_organism, quality_threshold)
            .await;
        for source in &self.sources {
            source.release(gene).await;
        }
        resolution
    }

    async fn cascade(
        &self,
        gene: &GeneId,
        exclude_organism: &OrganismCode,
        quality_threshold: f64,
    ) -> Resolution {
        let mut resolution = Resolution::default();
        let mut fallback: Option<OrthologResult> = None;

        for source in &self.sources {
            let found = match source.resolve(gene, exclude_organism).await {
                Ok(found) => found,
                Err(err) => {
                    warn!(
                        gene = %gene,
                        organism = %exclude_organism,
                        source = source.name(),
                        error = %err,
                        "source failed, trying next"
                    );
                    resolution.failures.push(SourceFailure {
                        source: source.name().to_string(),
                        message: err.to_string(),
                    });
                    continue;
                }
            };
            let Some(mut result) = found else {
                continue;
            };
            let same_organism = result.gene.belongs_to(exclude_organism)
                || result.gene.organism() == gene.organism();
            if same_organism {
                warn!(
                    gene = %gene,
                    source = source.name(),
                    candidate = %result.gene,
                    "discarding same-organism match"
                );
                continue;
            }

            result.source = source.name().to_string();
            if result.confidence >= quality_threshold {
                debug!(
                    gene = %gene,
                    source = source.name(),
                    confidence = result.confidence,
                    "accepted"
                );
                resolution.result = Some(result);
                resolution.accepted = true;
                return resolution;
            }
            debug!(
                gene = %gene,
                source = source.name(),
                confidence = result.confidence,
                threshold = quality_threshold,
                "below threshold"
            );
            let stronger = fallback
                .as_ref()
                .is_none_or(|best| result.confidence > best.confidence);
            if stronger {
                fallback = Some(result);
            }
        }

        resolution.result = fallback;
        resolution
    }
}
