use std::collections::{HashMap, HashSet};
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, warn};

use crate::client::ApiClient;
use crate::config::KEGG_KO_SOURCE;
use crate::domain::{GeneId, OrganismCode, OrthologResult};
use crate::error::OrthoError;
use crate::parser::{AlignmentHit, LinkPair, parse};
use crate::sources::OrthologSource;
use crate::sources::directory::SpeciesDirectory;
use crate::sources::memo::Memo;
use crate::sources::ssdb::{AlignmentTables, describe};

static KO_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:ko:)?(K\d{5})$").expect("valid KO pattern"));

/// Confidence of a group member the alignment table has no row for. It never
/// clears a positive threshold, so later sources still get asked.
pub const UNALIGNED_MEMBER_CONFIDENCE: f64 = 0.0;

/// Orthology-group source.
///
/// A gene's KO assignments come from the organism-wide `/link/ko/<org>`
/// listing; each KO expands to its members via `/link/genes/<ko>`. Every
/// member from another organism is a candidate. Candidates are ranked by
/// model-organism flag, then by having a row in the gene's alignment table,
/// then Smith-Waterman score, then identifier. Alignment rows supply the
/// length, score and identity; an unreachable table only costs those stats.
pub struct KoGroupSource {
    client: ApiClient,
    kegg_base_url: String,
    ssdb_base_url: String,
    model_organisms: HashSet<String>,
    tables: Arc<AlignmentTables>,
    species: Arc<SpeciesDirectory>,
    assignments: Memo<HashMap<GeneId, Vec<String>>>,
    groups: Memo<HashSet<GeneId>>,
}

impl KoGroupSource {
    pub fn new(
        client: ApiClient,
        kegg_base_url: impl Into<String>,
        ssdb_base_url: impl Into<String>,
        model_organisms: impl IntoIterator<Item = String>,
        tables: Arc<AlignmentTables>,
        species: Arc<SpeciesDirectory>,
    ) -> Self {
        Self {
            client,
            kegg_base_url: kegg_base_url.into(),
            ssdb_base_url: ssdb_base_url.into(),
            model_organisms: model_organisms.into_iter().collect(),
            tables,
            species,
            assignments: Memo::default(),
            groups: Memo::default(),
        }
    }

    async fn ko_assignments(
        &self,
        organism: &str,
    ) -> Result<Arc<HashMap<GeneId, Vec<String>>>, OrthoError> {
        self.assignments
            .get_or_try_init(organism, || self.load_assignments(organism))
            .await
    }

    async fn load_assignments(
        &self,
        organism: &str,
    ) -> Result<HashMap<GeneId, Vec<String>>, OrthoError> {
        let path = format!("/link/ko/{organism}");
        let body = fetch_or_empty(&self.client, &self.kegg_base_url, &path).await?;
        let mut map: HashMap<GeneId, Vec<String>> = HashMap::new();
        for pair in parse::<LinkPair>(&body)? {
            let gene = link_gene(&pair.left)?;
            if let Some(ko) = normalize_ko(&pair.right) {
                map.entry(gene).or_default().push(ko);
            }
        }
        debug!(organism, genes = map.len(), "loaded KO assignments");
        Ok(map)
    }

    async fn group_members(&self, ko: &str) -> Result<Arc<HashSet<GeneId>>, OrthoError> {
        self.groups
            .get_or_try_init(ko, || self.load_group(ko))
            .await
    }

    async fn load_group(&self, ko: &str) -> Result<HashSet<GeneId>, OrthoError> {
        let path = format!("/link/genes/{ko}");
        let body = fetch_or_empty(&self.client, &self.kegg_base_url, &path).await?;
        parse::<LinkPair>(&body)?
            .iter()
            .map(|pair| link_gene(&pair.right))
            .collect()
    }

    async fn alignment_rows(&self, gene: &GeneId) -> Arc<Vec<AlignmentHit>> {
        match self.tables.get(&self.ssdb_base_url, gene).await {
            Ok(rows) => rows,
            Err(err) => {
                warn!(
                    gene = %gene,
                    error = %err,
                    "alignment table unavailable, ranking without it"
                );
                Arc::new(Vec::new())
            }
        }
    }

    fn rank<'a>(
        &self,
        candidates: impl Iterator<Item = (&'a GeneId, Option<&'a AlignmentHit>)>,
    ) -> Option<(&'a GeneId, Option<&'a AlignmentHit>)> {
        candidates.min_by(|(a, a_row), (b, b_row)| {
            let a_model = self.model_organisms.contains(a.organism());
            let b_model = self.model_organisms.contains(b.organism());
            let score = |row: &Option<&AlignmentHit>| row.map(|row| row.sw_score);
            b_model
                .cmp(&a_model)
                .then_with(|| b_row.is_some().cmp(&a_row.is_some()))
                .then_with(|| score(b_row).cmp(&score(a_row)))
                .then_with(|| a.cmp(b))
        })
    }
}

#[async_trait]
impl OrthologSource for KoGroupSource {
    fn name(&self) -> &str {
        KEGG_KO_SOURCE
    }

    async fn resolve(
        &self,
        gene: &GeneId,
        exclude_organism: &OrganismCode,
    ) -> Result<Option<OrthologResult>, OrthoError> {
        let assignments = self.ko_assignments(gene.organism()).await?;
        let Some(kos) = assignments.get(gene) else {
            debug!(gene = %gene, "no KO assignment");
            return Ok(None);
        };

        let mut rows: Option<Arc<Vec<AlignmentHit>>> = None;
        for ko in kos {
            let members = self.group_members(ko).await?;
            let foreign: Vec<&GeneId> = members
                .iter()
                .filter(|member| {
                    !member.belongs_to(exclude_organism) && member.organism() != gene.organism()
                })
                .collect();
            if foreign.is_empty() {
                debug!(gene = %gene, ko = %ko, "KO group has no foreign members");
                continue;
            }

            if rows.is_none() {
                rows = Some(self.alignment_rows(gene).await);
            }
            let by_target: HashMap<&GeneId, &AlignmentHit> = rows
                .as_deref()
                .map(|rows| rows.iter().map(|row| (&row.target, row)).collect())
                .unwrap_or_default();
            let candidates = foreign
                .into_iter()
                .map(|member| (member, by_target.get(member).copied()));
            let Some((member, row)) = self.rank(candidates) else {
                continue;
            };

            debug!(
                gene = %gene,
                ko = %ko,
                ortholog = %member,
                aligned = row.is_some(),
                "KO group match"
            );
            let species = self.species.species_name(member.organism()).await;
            let result = match row {
                Some(row) => OrthologResult {
                    gene: member.clone(),
                    description: describe(row, &species),
                    species,
                    length: row.length,
                    sw_score: row.sw_score,
                    identity: row.identity,
                    source: KEGG_KO_SOURCE.to_string(),
                    confidence: row.identity,
                },
                None => OrthologResult {
                    gene: member.clone(),
                    description: format!("{ko} member from {species}"),
                    species,
                    length: 0,
                    sw_score: 0,
                    identity: 0.0,
                    source: KEGG_KO_SOURCE.to_string(),
                    confidence: UNALIGNED_MEMBER_CONFIDENCE,
                },
            };
            return Ok(Some(result));
        }
        Ok(None)
    }

    async fn release(&self, gene: &GeneId) {
        self.tables.release(&self.ssdb_base_url, gene).await;
    }
}

async fn fetch_or_empty(
    client: &ApiClient,
    base_url: &str,
    path: &str,
) -> Result<String, OrthoError> {
    match client.fetch(base_url, path, &[]).await {
        Ok(body) => Ok(body),
        Err(OrthoError::NotFound(_)) => Ok(String::new()),
        Err(err) => Err(err),
    }
}

fn link_gene(value: &str) -> Result<GeneId, OrthoError> {
    value.parse().map_err(|_| OrthoError::Parse {
        line: 0,
        message: format!("invalid gene identifier in link listing: {value}"),
    })
}

/// `ko:K12524` or `K12524` -> `K12524`
fn normalize_ko(value: &str) -> Option<String> {
    KO_ID
        .captures(value.trim())
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}
