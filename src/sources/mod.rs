pub mod directory;
pub mod kegg_ko;
pub mod memo;
pub mod ssdb;

use std::sync::Arc;

use async_trait::async_trait;

use crate::client::ApiClient;
use crate::config::{KEGG_KO_SOURCE, SSDB_BEST_SOURCE, Settings};
use crate::domain::{GeneId, OrganismCode, OrthologResult};
use crate::error::OrthoError;

use self::directory::SpeciesDirectory;
use self::kegg_ko::KoGroupSource;
use self::ssdb::{AlignmentTables, PairwiseSource};

/// One external ortholog data source.
///
/// `Ok(None)` means the source has nothing for this gene, which is common and
/// not a failure. Matches from `exclude_organism` or from the query gene's own
/// organism are never returned.
#[async_trait]
pub trait OrthologSource: Send + Sync {
    fn name(&self) -> &str;

    async fn resolve(
        &self,
        gene: &GeneId,
        exclude_organism: &OrganismCode,
    ) -> Result<Option<OrthologResult>, OrthoError>;

    /// Called once the cascade is finished with `gene`, whatever the outcome.
    async fn release(&self, _gene: &GeneId) {}
}

/// Builds the configured sources in priority order, all sharing one client.
pub fn build_sources(
    settings: &Settings,
    client: &ApiClient,
) -> Result<Vec<Arc<dyn OrthologSource>>, OrthoError> {
    settings.validate()?;
    let species = Arc::new(SpeciesDirectory::new(
        client.clone(),
        settings.kegg_base_url.clone(),
    ));
    let tables = Arc::new(AlignmentTables::new(client.clone()));

    let mut sources: Vec<Arc<dyn OrthologSource>> = Vec::with_capacity(settings.sources.len());
    for name in &settings.sources {
        let source: Arc<dyn OrthologSource> = match name.as_str() {
            KEGG_KO_SOURCE => Arc::new(KoGroupSource::new(
                client.clone(),
                settings.kegg_base_url.clone(),
                settings.ssdb_base_url.clone(),
                settings.model_organisms.iter().cloned(),
                Arc::clone(&tables),
                Arc::clone(&species),
            )),
            SSDB_BEST_SOURCE => Arc::new(PairwiseSource::new(
                SSDB_BEST_SOURCE,
                settings.ssdb_base_url.clone(),
                Arc::clone(&tables),
                Arc::clone(&species),
            )),
            other => {
                let extra = settings
                    .pairwise_sources
                    .iter()
                    .find(|extra| extra.name == other)
                    .ok_or_else(|| OrthoError::InvalidConfig(format!("unknown source: {other}")))?;
                Arc::new(PairwiseSource::new(
                    extra.name.clone(),
                    extra.base_url.clone(),
                    Arc::clone(&tables),
                    Arc::clone(&species),
                ))
            }
        };
        sources.push(source);
    }
    Ok(sources)
}
