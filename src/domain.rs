use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::OrthoError;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OrganismCode(String);

impl OrganismCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrganismCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for OrganismCode {
    type Err = OrthoError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_lowercase();
        let is_valid = (2..=8).contains(&normalized.len())
            && normalized.chars().all(|ch| ch.is_ascii_alphanumeric());
        if !is_valid {
            return Err(OrthoError::InvalidOrganismCode(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

impl TryFrom<String> for OrganismCode {
    type Error = OrthoError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<OrganismCode> for String {
    fn from(value: OrganismCode) -> Self {
        value.0
    }
}

/// Source-qualified gene identifier, `<organism-code>:<locus>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GeneId(String);

impl GeneId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn organism(&self) -> &str {
        self.0.split_once(':').map(|(org, _)| org).unwrap_or("")
    }

    pub fn locus(&self) -> &str {
        self.0.split_once(':').map(|(_, locus)| locus).unwrap_or("")
    }

    pub fn belongs_to(&self, organism: &OrganismCode) -> bool {
        self.organism() == organism.as_str()
    }
}

impl fmt::Display for GeneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for GeneId {
    type Err = OrthoError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let (org, locus) = trimmed
            .split_once(':')
            .ok_or_else(|| OrthoError::InvalidGeneId(value.to_string()))?;
        let org: OrganismCode = org
            .parse()
            .map_err(|_| OrthoError::InvalidGeneId(value.to_string()))?;
        let locus_ok = !locus.is_empty() && !locus.chars().any(|ch| ch.is_whitespace());
        if !locus_ok {
            return Err(OrthoError::InvalidGeneId(value.to_string()));
        }
        Ok(Self(format!("{}:{locus}", org.as_str())))
    }
}

impl TryFrom<String> for GeneId {
    type Error = OrthoError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<GeneId> for String {
    fn from(value: GeneId) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrganismStatus {
    Pending,
    Complete,
    Error,
}

impl fmt::Display for OrganismStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrganismStatus::Pending => write!(f, "pending"),
            OrganismStatus::Complete => write!(f, "complete"),
            OrganismStatus::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organism {
    pub code: OrganismCode,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<OrganismStatus>,
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub job_error: Option<String>,
}

impl Organism {
    pub fn new(code: OrganismCode, name: Option<String>) -> Self {
        Self {
            code,
            name,
            status: None,
            job_id: None,
            job_error: None,
        }
    }
}

/// Ortholog columns persisted on a gene. Stored as one optional block so a
/// record can never carry half of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrthologFields {
    pub name: GeneId,
    pub description: String,
    pub species: String,
    pub length: u32,
    pub sw_score: u32,
    pub identity: f64,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneRecord {
    pub id: GeneId,
    pub description: String,
    pub organism: OrganismCode,
    #[serde(default)]
    pub ortholog: Option<OrthologFields>,
}

impl GeneRecord {
    pub fn new(id: GeneId, description: impl Into<String>, organism: OrganismCode) -> Self {
        Self {
            id,
            description: description.into(),
            organism,
            ortholog: None,
        }
    }

    pub fn is_orphan(&self) -> bool {
        self.ortholog.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrthologResult {
    pub gene: GeneId,
    pub description: String,
    pub species: String,
    pub length: u32,
    pub sw_score: u32,
    /// Percent identity, 0-100.
    pub identity: f64,
    pub source: String,
    /// Normalized 0-100 score comparable across sources.
    pub confidence: f64,
}

impl OrthologResult {
    pub fn to_fields(&self) -> OrthologFields {
        OrthologFields {
            name: self.gene.clone(),
            description: self.description.clone(),
            species: self.species.clone(),
            length: self.length,
            sw_score: self.sw_score,
            identity: self.identity,
            source: self.source.clone(),
        }
    }
}
