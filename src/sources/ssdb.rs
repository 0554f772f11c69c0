use std::sync::Arc;

use async_trait::async_trait;

use crate::client::ApiClient;
use crate::domain::{GeneId, OrganismCode, OrthologResult};
use crate::error::OrthoError;
use crate::parser::{AlignmentHit, parse};
use crate::sources::OrthologSource;
use crate::sources::directory::SpeciesDirectory;
use crate::sources::memo::Memo;

/// Pairwise alignment tables shared by every source that reads them.
///
/// A table is fetched at most once per gene while that gene is being
/// resolved; `release` drops it once the cascade is done with the gene.
pub struct AlignmentTables {
    client: ApiClient,
    tables: Memo<Vec<AlignmentHit>>,
}

impl AlignmentTables {
    pub fn new(client: ApiClient) -> Self {
        Self {
            client,
            tables: Memo::default(),
        }
    }

    /// A gene the service does not know is an empty table, not an error.
    pub async fn get(
        &self,
        base_url: &str,
        gene: &GeneId,
    ) -> Result<Arc<Vec<AlignmentHit>>, OrthoError> {
        self.tables
            .get_or_try_init(&table_key(base_url, gene), || async {
                let path = format!("/ssdb/ortholog/{}", gene.as_str());
                match self.client.fetch(base_url, &path, &[]).await {
                    Ok(body) => parse(&body),
                    Err(OrthoError::NotFound(_)) => Ok(Vec::new()),
                    Err(err) => Err(err),
                }
            })
            .await
    }

    pub async fn release(&self, base_url: &str, gene: &GeneId) {
        self.tables.forget(&table_key(base_url, gene)).await;
    }
}

fn table_key(base_url: &str, gene: &GeneId) -> String {
    format!("{base_url}\t{gene}")
}

/// Hits that may serve as orthologs of `gene`: other organisms only.
fn foreign_hits<'a>(
    hits: &'a [AlignmentHit],
    gene: &'a GeneId,
    exclude_organism: &'a OrganismCode,
) -> impl Iterator<Item = &'a AlignmentHit> + 'a {
    hits.iter().filter(move |hit| {
        !hit.target.belongs_to(exclude_organism) && hit.target.organism() != gene.organism()
    })
}

pub fn describe(hit: &AlignmentHit, species: &str) -> String {
    hit.definition
        .clone()
        .unwrap_or_else(|| format!("Ortholog from {species}"))
}

/// Pairwise best-hit source: the single strongest Smith-Waterman hit.
pub struct PairwiseSource {
    name: String,
    base_url: String,
    tables: Arc<AlignmentTables>,
    species: Arc<SpeciesDirectory>,
}

impl PairwiseSource {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        tables: Arc<AlignmentTables>,
        species: Arc<SpeciesDirectory>,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            tables,
            species,
        }
    }
}

#[async_trait]
impl OrthologSource for PairwiseSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn resolve(
        &self,
        gene: &GeneId,
        exclude_organism: &OrganismCode,
    ) -> Result<Option<OrthologResult>, OrthoError> {
        let hits = self.tables.get(&self.base_url, gene).await?;
        let best = foreign_hits(&hits, gene, exclude_organism).min_by(|a, b| {
            b.sw_score
                .cmp(&a.sw_score)
                .then_with(|| a.target.cmp(&b.target))
        });
        let Some(best) = best else {
            return Ok(None);
        };

        let species = self.species.species_name(best.target.organism()).await;
        Ok(Some(OrthologResult {
            gene: best.target.clone(),
            description: describe(best, &species),
            species,
            length: best.length,
            sw_score: best.sw_score,
            identity: best.identity,
            source: self.name.clone(),
            confidence: best.identity,
        }))
    }

    async fn release(&self, gene: &GeneId) {
        self.tables.release(&self.base_url, gene).await;
    }
}
