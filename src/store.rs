use std::collections::BTreeMap;
use std::fs;

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::Builder;
use tokio::sync::Mutex;

use crate::domain::{GeneId, GeneRecord, Organism, OrganismCode, OrganismStatus, OrthologFields};
use crate::error::OrthoError;

/// Durable record store for organisms and their genes.
///
/// Gene upserts are keyed by gene id: an existing record keeps its ortholog
/// fields, so re-running a job never duplicates genes.
#[async_trait]
pub trait GeneStore: Send + Sync {
    async fn organism(&self, code: &OrganismCode) -> Result<Option<Organism>, OrthoError>;

    async fn save_organism(&self, organism: &Organism) -> Result<(), OrthoError>;

    async fn set_status(
        &self,
        code: &OrganismCode,
        status: OrganismStatus,
        job_id: Option<&str>,
        job_error: Option<&str>,
    ) -> Result<(), OrthoError>;

    async fn list_organisms(&self) -> Result<Vec<Organism>, OrthoError>;

    async fn upsert_genes(&self, genes: &[GeneRecord]) -> Result<(), OrthoError>;

    /// `None` clears every ortholog field.
    async fn set_ortholog(
        &self,
        gene: &GeneId,
        ortholog: Option<OrthologFields>,
    ) -> Result<(), OrthoError>;

    /// Genes of one organism, ordered by id.
    async fn genes(&self, code: &OrganismCode) -> Result<Vec<GeneRecord>, OrthoError>;
}

fn apply_status(
    organism: &mut Organism,
    status: OrganismStatus,
    job_id: Option<&str>,
    job_error: Option<&str>,
) {
    organism.status = Some(status);
    if let Some(job_id) = job_id {
        organism.job_id = Some(job_id.to_string());
    }
    organism.job_error = job_error.map(str::to_string);
}

#[derive(Default)]
struct MemoryState {
    organisms: BTreeMap<OrganismCode, Organism>,
    genes: BTreeMap<GeneId, GeneRecord>,
}

#[derive(Default)]
pub struct MemoryGeneStore {
    state: Mutex<MemoryState>,
}

impl MemoryGeneStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GeneStore for MemoryGeneStore {
    async fn organism(&self, code: &OrganismCode) -> Result<Option<Organism>, OrthoError> {
        Ok(self.state.lock().await.organisms.get(code).cloned())
    }

    async fn save_organism(&self, organism: &Organism) -> Result<(), OrthoError> {
        self.state
            .lock()
            .await
            .organisms
            .insert(organism.code.clone(), organism.clone());
        Ok(())
    }

    async fn set_status(
        &self,
        code: &OrganismCode,
        status: OrganismStatus,
        job_id: Option<&str>,
        job_error: Option<&str>,
    ) -> Result<(), OrthoError> {
        let mut state = self.state.lock().await;
        let organism = state
            .organisms
            .get_mut(code)
            .ok_or_else(|| OrthoError::OrganismNotFound(code.to_string()))?;
        apply_status(organism, status, job_id, job_error);
        Ok(())
    }

    async fn list_organisms(&self) -> Result<Vec<Organism>, OrthoError> {
        Ok(self.state.lock().await.organisms.values().cloned().collect())
    }

    async fn upsert_genes(&self, genes: &[GeneRecord]) -> Result<(), OrthoError> {
        let mut state = self.state.lock().await;
        for gene in genes {
            state
                .genes
                .entry(gene.id.clone())
                .and_modify(|existing| existing.description = gene.description.clone())
                .or_insert_with(|| gene.clone());
        }
        Ok(())
    }

    async fn set_ortholog(
        &self,
        gene: &GeneId,
        ortholog: Option<OrthologFields>,
    ) -> Result<(), OrthoError> {
        let mut state = self.state.lock().await;
        let record = state
            .genes
            .get_mut(gene)
            .ok_or_else(|| OrthoError::Storage(format!("unknown gene {gene}")))?;
        record.ortholog = ortholog;
        Ok(())
    }

    async fn genes(&self, code: &OrganismCode) -> Result<Vec<GeneRecord>, OrthoError> {
        let state = self.state.lock().await;
        Ok(state
            .genes
            .values()
            .filter(|gene| &gene.organism == code)
            .cloned()
            .collect())
    }
}

/// Directory-backed store.
///
/// ```text
/// <root>/organisms/<code>.json
/// <root>/genes/<code>/<locus>.json
/// ```
///
/// Every document is replaced atomically. Filesystem work runs on the blocking
/// pool; mutations are serialized by one lock.
#[derive(Debug)]
pub struct FileGeneStore {
    layout: Layout,
    write_lock: Mutex<()>,
}

#[derive(Debug, Clone)]
struct Layout {
    root: Utf8PathBuf,
}

impl FileGeneStore {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            layout: Layout { root: root.into() },
            write_lock: Mutex::new(()),
        }
    }

    /// `<data-local-dir>/kira-ortholog-mapper`
    pub fn default_root() -> Result<Utf8PathBuf, OrthoError> {
        BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(dirs.data_local_dir().join("kira-ortholog-mapper")).ok()
            })
            .ok_or_else(|| OrthoError::Storage("unable to resolve data directory".to_string()))
    }
}

impl Layout {
    fn organism_path(&self, code: &OrganismCode) -> Utf8PathBuf {
        self.root
            .join("organisms")
            .join(format!("{}.json", code.as_str()))
    }

    fn genes_dir(&self, organism: &str) -> Utf8PathBuf {
        self.root.join("genes").join(organism)
    }

    fn gene_path(&self, gene: &GeneId) -> Utf8PathBuf {
        let file = gene
            .locus()
            .chars()
            .map(|ch| {
                if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '_') {
                    ch
                } else {
                    '_'
                }
            })
            .collect::<String>();
        self.genes_dir(gene.organism()).join(format!("{file}.json"))
    }

    fn organism(&self, code: &OrganismCode) -> Result<Option<Organism>, OrthoError> {
        read_json(&self.organism_path(code))
    }

    fn list_organisms(&self) -> Result<Vec<Organism>, OrthoError> {
        let mut organisms: Vec<Organism> = read_dir_json(&self.root.join("organisms"))?;
        organisms.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(organisms)
    }

    fn set_status(
        &self,
        code: &OrganismCode,
        status: OrganismStatus,
        job_id: Option<&str>,
        job_error: Option<&str>,
    ) -> Result<(), OrthoError> {
        let path = self.organism_path(code);
        let mut organism: Organism =
            read_json(&path)?.ok_or_else(|| OrthoError::OrganismNotFound(code.to_string()))?;
        apply_status(&mut organism, status, job_id, job_error);
        write_json_atomic(&path, &organism)
    }

    fn upsert_genes(&self, genes: &[GeneRecord]) -> Result<(), OrthoError> {
        for gene in genes {
            let path = self.gene_path(&gene.id);
            let record = match read_json::<GeneRecord>(&path)? {
                Some(mut existing) => {
                    if existing.description == gene.description {
                        continue;
                    }
                    existing.description = gene.description.clone();
                    existing
                }
                None => gene.clone(),
            };
            write_json_atomic(&path, &record)?;
        }
        Ok(())
    }

    fn set_ortholog(
        &self,
        gene: &GeneId,
        ortholog: Option<OrthologFields>,
    ) -> Result<(), OrthoError> {
        let path = self.gene_path(gene);
        let mut record: GeneRecord =
            read_json(&path)?.ok_or_else(|| OrthoError::Storage(format!("unknown gene {gene}")))?;
        record.ortholog = ortholog;
        write_json_atomic(&path, &record)
    }

    fn genes(&self, code: &OrganismCode) -> Result<Vec<GeneRecord>, OrthoError> {
        let mut genes: Vec<GeneRecord> = read_dir_json(&self.genes_dir(code.as_str()))?;
        genes.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(genes)
    }
}

pub(crate) async fn blocking<T, F>(task: F) -> Result<T, OrthoError>
where
    F: FnOnce() -> Result<T, OrthoError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|err| OrthoError::Storage(format!("storage task failed: {err}")))?
}

#[async_trait]
impl GeneStore for FileGeneStore {
    async fn organism(&self, code: &OrganismCode) -> Result<Option<Organism>, OrthoError> {
        let layout = self.layout.clone();
        let code = code.clone();
        blocking(move || layout.organism(&code)).await
    }

    async fn save_organism(&self, organism: &Organism) -> Result<(), OrthoError> {
        let _guard = self.write_lock.lock().await;
        let path = self.layout.organism_path(&organism.code);
        let organism = organism.clone();
        blocking(move || write_json_atomic(&path, &organism)).await
    }

    async fn set_status(
        &self,
        code: &OrganismCode,
        status: OrganismStatus,
        job_id: Option<&str>,
        job_error: Option<&str>,
    ) -> Result<(), OrthoError> {
        let _guard = self.write_lock.lock().await;
        let layout = self.layout.clone();
        let code = code.clone();
        let job_id = job_id.map(str::to_string);
        let job_error = job_error.map(str::to_string);
        blocking(move || {
            layout.set_status(&code, status, job_id.as_deref(), job_error.as_deref())
        })
        .await
    }

    async fn list_organisms(&self) -> Result<Vec<Organism>, OrthoError> {
        let layout = self.layout.clone();
        blocking(move || layout.list_organisms()).await
    }

    async fn upsert_genes(&self, genes: &[GeneRecord]) -> Result<(), OrthoError> {
        let _guard = self.write_lock.lock().await;
        let layout = self.layout.clone();
        let genes = genes.to_vec();
        blocking(move || layout.upsert_genes(&genes)).await
    }

    async fn set_ortholog(
        &self,
        gene: &GeneId,
        ortholog: Option<OrthologFields>,
    ) -> Result<(), OrthoError> {
        let _guard = self.write_lock.lock().await;
        let layout = self.layout.clone();
        let gene = gene.clone();
        blocking(move || layout.set_ortholog(&gene, ortholog)).await
    }

    async fn genes(&self, code: &OrganismCode) -> Result<Vec<GeneRecord>, OrthoError> {
        let layout = self.layout.clone();
        let code = code.clone();
        blocking(move || layout.genes(&code)).await
    }
}

fn read_json<T: DeserializeOwned>(path: &Utf8Path) -> Result<Option<T>, OrthoError> {
    if !path.as_std_path().exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path.as_std_path())
        .map_err(|err| OrthoError::Storage(format!("read {path}: {err}")))?;
    let value = serde_json::from_str(&content)
        .map_err(|err| OrthoError::Storage(format!("decode {path}: {err}")))?;
    Ok(Some(value))
}

fn read_dir_json<T: DeserializeOwned>(dir: &Utf8Path) -> Result<Vec<T>, OrthoError> {
    if !dir.as_std_path().exists() {
        return Ok(Vec::new());
    }
    let entries = fs::read_dir(dir.as_std_path())
        .map_err(|err| OrthoError::Storage(format!("list {dir}: {err}")))?;
    let mut items = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| OrthoError::Storage(err.to_string()))?;
        let path = Utf8PathBuf::from_path_buf(entry.path())
            .map_err(|_| OrthoError::Storage(format!("non UTF-8 path under {dir}")))?;
        if path.extension() != Some("json") {
            continue;
        }
        if let Some(item) = read_json(&path)? {
            items.push(item);
        }
    }
    Ok(items)
}

/// Writes `value` as pretty JSON through a sibling temp file, then renames it
/// over `path`.
pub fn write_json_atomic<T: Serialize>(path: &Utf8Path, value: &T) -> Result<(), OrthoError> {
    let parent = path
        .parent()
        .ok_or_else(|| OrthoError::Storage(format!("invalid destination path {path}")))?;
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| OrthoError::Storage(format!("create {parent}: {err}")))?;
    let content =
        serde_json::to_vec_pretty(value).map_err(|err| OrthoError::Storage(err.to_string()))?;
    let temp = Builder::new()
        .prefix("kira-om")
        .suffix(".tmp")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| OrthoError::Storage(err.to_string()))?;
    fs::write(temp.path(), &content).map_err(|err| OrthoError::Storage(err.to_string()))?;
    temp.persist(path.as_std_path())
        .map_err(|err| OrthoError::Storage(format!("persist {path}: {err}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths() {
        let layout = Layout {
            root: Utf8PathBuf::from("/data"),
        };
        let code: OrganismCode = "eco".parse().unwrap();
        let gene: GeneId = "eco:b0001".parse().unwrap();
        assert!(layout.organism_path(&code).ends_with("organisms/eco.json"));
        assert!(layout.gene_path(&gene).ends_with("genes/eco/b0001.json"));
    }
}
