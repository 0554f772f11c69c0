use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::io::Write;

use serde::Serialize;

use crate::domain::GeneRecord;
use crate::error::OrthoError;

pub const CSV_HEADER: [&str; 8] = [
    "gene_name",
    "gene_description",
    "ortholog_name",
    "ortholog_description",
    "ortholog_species",
    "ortholog_length",
    "ortholog_sw_score",
    "ortholog_identity",
];

/// Identity ascending, genes without an ortholog last, then gene name.
pub fn ordered_genes(mut genes: Vec<GeneRecord>) -> Vec<GeneRecord> {
    genes.sort_by(|a, b| {
        let by_identity = match (&a.ortholog, &b.ortholog) {
            (Some(left), Some(right)) => left.identity.total_cmp(&right.identity),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        by_identity.then_with(|| a.id.cmp(&b.id))
    });
    genes
}

pub fn write_csv<W: Write>(
    mut writer: W,
    genes: &[GeneRecord],
    with_orthologs_only: bool,
) -> Result<usize, OrthoError> {
    write_row(&mut writer, CSV_HEADER.iter().map(|cell| cell.to_string()))?;
    let mut rows = 0;
    for gene in genes {
        let cells = match &gene.ortholog {
            Some(ortholog) => [
                gene.id.to_string(),
                gene.description.clone(),
                ortholog.name.to_string(),
                ortholog.description.clone(),
                ortholog.species.clone(),
                ortholog.length.to_string(),
                ortholog.sw_score.to_string(),
                format!("{:.2}", ortholog.identity),
            ],
            None if with_orthologs_only => continue,
            None => [
                gene.id.to_string(),
                gene.description.clone(),
                String::new(),
                String::new(),
                String::new(),
                String::new(),
                String::new(),
                String::new(),
            ],
        };
        write_row(&mut writer, cells.into_iter())?;
        rows += 1;
    }
    writer
        .flush()
        .map_err(|err| OrthoError::Storage(format!("csv write failed: {err}")))?;
    Ok(rows)
}

fn write_row<W: Write>(
    writer: &mut W,
    cells: impl Iterator<Item = String>,
) -> Result<(), OrthoError> {
    let line = cells
        .map(|cell| escape(&cell))
        .collect::<Vec<_>>()
        .join(",");
    writeln!(writer, "{line}")
        .map_err(|err| OrthoError::Storage(format!("csv write failed: {err}")))
}

fn escape(cell: &str) -> String {
    if cell.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpeciesCount {
    pub species: String,
    pub genes: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Coverage {
    pub total: usize,
    pub with_orthologs: usize,
    pub orphans: usize,
    pub percent: f64,
    pub top_species: Vec<SpeciesCount>,
}

pub fn coverage(genes: &[GeneRecord]) -> Coverage {
    let mut species: BTreeMap<&str, usize> = BTreeMap::new();
    for ortholog in genes.iter().filter_map(|gene| gene.ortholog.as_ref()) {
        *species.entry(ortholog.species.as_str()).or_insert(0) += 1;
    }
    let with_orthologs = species.values().sum::<usize>();
    let total = genes.len();

    let mut top_species: Vec<SpeciesCount> = species
        .into_iter()
        .map(|(species, genes)| SpeciesCount {
            species: species.to_string(),
            genes,
        })
        .collect();
    top_species.sort_by(|a, b| b.genes.cmp(&a.genes).then_with(|| a.species.cmp(&b.species)));
    top_species.truncate(5);

    let percent = if total == 0 {
        0.0
    } else {
        (with_orthologs as f64 / total as f64 * 10_000.0).round() / 100.0
    };
    Coverage {
        total,
        with_orthologs,
        orphans: total - with_orthologs,
        percent,
        top_species,
    }
}
