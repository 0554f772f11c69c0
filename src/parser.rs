use crate::domain::GeneId;
use crate::error::OrthoError;

/// A record decoded from one tab-separated line.
pub trait TsvRecord: Sized {
    /// Columns that must be present; anything beyond is optional or ignored.
    const REQUIRED_COLUMNS: usize;

    fn from_columns(columns: &[&str], line: usize) -> Result<Self, OrthoError>;
}

/// Parses newline-delimited, tab-separated text. Blank lines are skipped and
/// empty input yields an empty vector.
pub fn parse<R: TsvRecord>(text: &str) -> Result<Vec<R>, OrthoError> {
    let mut records = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        let columns = line.split('\t').map(str::trim).collect::<Vec<_>>();
        let line_no = index + 1;
        if columns.len() < R::REQUIRED_COLUMNS {
            return Err(OrthoError::Parse {
                line: line_no,
                message: format!(
                    "expected at least {} columns, found {}",
                    R::REQUIRED_COLUMNS,
                    columns.len()
                ),
            });
        }
        records.push(R::from_columns(&columns, line_no)?);
    }
    Ok(records)
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneListEntry {
    pub id: GeneId,
    pub description: String,
}

impl TsvRecord for GeneListEntry {
    const REQUIRED_COLUMNS: usize = 1;

    fn from_columns(columns: &[&str], line: usize) -> Result<Self, OrthoError> {
        let id = gene_column(columns[0], line)?;
        // Newer gene lists carry `id, type, position, description`.
        let description = match columns.len() {
            1 => "",
            2 | 3 => columns[1],
            _ => columns[columns.len() - 1],
        };
        Ok(Self {
            id,
            description: description.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkPair {
    pub left: String,
    pub right: String,
}

impl TsvRecord for LinkPair {
    const REQUIRED_COLUMNS: usize = 2;

    fn from_columns(columns: &[&str], line: usize) -> Result<Self, OrthoError> {
        if columns[0].is_empty() || columns[1].is_empty() {
            return Err(OrthoError::Parse {
                line,
                message: "empty link column".to_string(),
            });
        }
        Ok(Self {
            left: columns[0].to_string(),
            right: columns[1].to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrganismEntry {
    pub t_number: String,
    pub code: String,
    pub species: String,
    pub lineage: Option<String>,
}

impl TsvRecord for OrganismEntry {
    const REQUIRED_COLUMNS: usize = 3;

    fn from_columns(columns: &[&str], line: usize) -> Result<Self, OrthoError> {
        if columns[1].is_empty() {
            return Err(OrthoError::Parse {
                line,
                message: "missing organism code".to_string(),
            });
        }
        Ok(Self {
            t_number: columns[0].to_string(),
            code: columns[1].to_string(),
            species: columns[2].to_string(),
            lineage: columns
                .get(3)
                .filter(|value| !value.is_empty())
                .map(|value| value.to_string()),
        })
    }
}

/// One row of a pairwise alignment table.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentHit {
    pub target: GeneId,
    pub sw_score: u32,
    pub identity: f64,
    pub overlap: u32,
    pub length: u32,
    pub definition: Option<String>,
}

impl TsvRecord for AlignmentHit {
    const REQUIRED_COLUMNS: usize = 5;

    fn from_columns(columns: &[&str], line: usize) -> Result<Self, OrthoError> {
        let target = gene_column(columns[0], line)?;
        let sw_score = number_column::<u32>(columns[1], "sw_score", line)?;
        let identity = identity_column(columns[2], line)?;
        let overlap = number_column::<u32>(columns[3], "overlap", line)?;
        let length = number_column::<u32>(columns[4], "length", line)?;
        Ok(Self {
            target,
            sw_score,
            identity,
            overlap,
            length,
            definition: columns
                .get(5)
                .filter(|value| !value.is_empty())
                .map(|value| value.to_string()),
        })
    }
}

fn gene_column(value: &str, line: usize) -> Result<GeneId, OrthoError> {
    value.parse().map_err(|_| OrthoError::Parse {
        line,
        message: format!("invalid gene identifier {value:?}"),
    })
}

fn number_column<T: std::str::FromStr>(
    value: &str,
    name: &str,
    line: usize,
) -> Result<T, OrthoError> {
    value.parse().map_err(|_| OrthoError::Parse {
        line,
        message: format!("invalid {name} {value:?}"),
    })
}

/// Accepts `85.3`, `85.3%` or a fraction such as `0.853`.
fn identity_column(value: &str, line: usize) -> Result<f64, OrthoError> {
    let raw: f64 = number_column(value.trim_end_matches('%'), "identity", line)?;
    let percent = if raw <= 1.0 && !value.ends_with('%') {
        raw * 100.0
    } else {
        raw
    };
    if !(0.0..=100.0).contains(&percent) {
        return Err(OrthoError::Parse {
            line,
            message: format!("identity {value} is outside 0-100"),
        });
    }
    Ok(percent)
}
