use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use kira_ortholog_mapper::domain::{
    GeneId, GeneRecord, Organism, OrganismCode, OrganismStatus, OrthologFields,
};
use kira_ortholog_mapper::error::OrthoError;
use kira_ortholog_mapper::store::{FileGeneStore, GeneStore, MemoryGeneStore};

fn eco() -> OrganismCode {
    "eco".parse().unwrap()
}

fn gene(locus: &str, description: &str) -> GeneRecord {
    let id: GeneId = format!("eco:{locus}").parse().unwrap();
    GeneRecord::new(id, description, eco())
}

fn ortholog(name: &str, identity: f64) -> OrthologFields {
    OrthologFields {
        name: name.parse().unwrap(),
        description: "aspartokinase".to_string(),
        species: "Homo sapiens".to_string(),
        length: 819,
        sw_score: 1500,
        identity,
        source: "kegg_ko".to_string(),
    }
}

async fn exercise(store: &dyn GeneStore) {
    let code = eco();
    assert_eq!(store.organism(&code).await.unwrap(), None);
    store
        .save_organism(&Organism::new(code.clone(), Some("E. coli".to_string())))
        .await
        .unwrap();

    store
        .set_status(&code, OrganismStatus::Pending, Some("job-1"), None)
        .await
        .unwrap();
    let organism = store.organism(&code).await.unwrap().unwrap();
    assert_eq!(organism.status, Some(OrganismStatus::Pending));
    assert_eq!(organism.job_id.as_deref(), Some("job-1"));

    store
        .upsert_genes(&[gene("b0002", "thrA"), gene("b0001", "thrL")])
        .await
        .unwrap();
    let b0002: GeneId = "eco:b0002".parse().unwrap();
    store
        .set_ortholog(&b0002, Some(ortholog("hsa:10458", 85.0)))
        .await
        .unwrap();

    // a second upsert of the same ids neither duplicates nor wipes orthologs
    store
        .upsert_genes(&[gene("b0001", "thrL"), gene("b0002", "thrA")])
        .await
        .unwrap();
    let genes = store.genes(&code).await.unwrap();
    assert_eq!(genes.len(), 2);
    assert_eq!(genes[0].id.as_str(), "eco:b0001");
    assert!(genes[0].is_orphan());
    assert_eq!(genes[1].ortholog.as_ref().unwrap().identity, 85.0);

    store.set_ortholog(&b0002, None).await.unwrap();
    let genes = store.genes(&code).await.unwrap();
    assert!(genes.iter().all(GeneRecord::is_orphan));

    store
        .set_status(&code, OrganismStatus::Error, None, Some("boom"))
        .await
        .unwrap();
    let organism = store.organism(&code).await.unwrap().unwrap();
    assert_eq!(organism.status, Some(OrganismStatus::Error));
    assert_eq!(organism.job_id.as_deref(), Some("job-1"));
    assert_eq!(organism.job_error.as_deref(), Some("boom"));

    let missing: GeneId = "eco:b9999".parse().unwrap();
    assert_matches!(
        store.set_ortholog(&missing, None).await,
        Err(OrthoError::Storage(_))
    );
    let unknown: OrganismCode = "hsa".parse().unwrap();
    assert_matches!(
        store
            .set_status(&unknown, OrganismStatus::Pending, None, None)
            .await,
        Err(OrthoError::OrganismNotFound(_))
    );
    assert_eq!(store.list_organisms().await.unwrap().len(), 1);
}

#[tokio::test]
async fn memory_store_contract() {
    exercise(&MemoryGeneStore::new()).await;
}

#[tokio::test]
async fn file_store_contract() {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    exercise(&FileGeneStore::new(root)).await;
}

#[tokio::test]
async fn file_store_survives_reopen() {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    {
        let store = FileGeneStore::new(root.clone());
        store.save_organism(&Organism::new(eco(), None)).await.unwrap();
        store.upsert_genes(&[gene("b0003", "thrB")]).await.unwrap();
    }

    let store = FileGeneStore::new(root.clone());
    let genes = store.genes(&eco()).await.unwrap();
    assert_eq!(genes.len(), 1);
    assert_eq!(genes[0].description, "thrB");
    assert!(root.join("genes/eco/b0003.json").as_std_path().exists());
    assert!(root.join("organisms/eco.json").as_std_path().exists());
}

#[test]
fn default_root_is_under_user_data_dir() {
    let root = FileGeneStore::default_root().unwrap();
    assert!(root.ends_with("kira-ortholog-mapper"));
}
