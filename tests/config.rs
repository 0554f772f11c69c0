use std::time::Duration;

use assert_matches::assert_matches;

use kira_ortholog_mapper::config::{ConfigLoader, Settings, default_model_organisms};
use kira_ortholog_mapper::error::OrthoError;

#[test]
fn full_config_round_trip() {
    let settings = ConfigLoader::parse(
        r#"{
            "kegg_base_url": "http://localhost:9000",
            "requests_per_second": 5,
            "max_in_flight": 4,
            "quality_threshold": 55.5,
            "store_batch_size": 100,
            "progress_ttl_secs": 60,
            "sources": ["kegg_ko", "ssdb_best", "mirror"],
            "pairwise_sources": [{"name": "mirror", "base_url": "http://mirror.test"}]
        }"#,
    )
    .unwrap();

    assert!(settings.validate().is_ok());
    assert_eq!(settings.kegg_base_url, "http://localhost:9000");
    assert_eq!(settings.ssdb_base_url, "https://www.kegg.jp");
    assert_eq!(settings.requests_per_second, 5);
    assert_eq!(settings.quality_threshold, 55.5);
    assert_eq!(settings.progress_ttl(), Duration::from_secs(60));
    assert_eq!(settings.request_timeout(), Duration::from_secs(30));
    assert_eq!(settings.sources.len(), 3);
    assert_eq!(settings.model_organisms, default_model_organisms());
}

#[test]
fn model_organisms_are_a_list_of_codes() {
    let settings = ConfigLoader::parse(r#"{"model_organisms": ["hsa", "dre"]}"#).unwrap();
    assert_eq!(settings.model_organisms, vec!["hsa".to_string(), "dre".to_string()]);

    let err = ConfigLoader::parse(r#"{"model_organisms": {"hsa": 2.0}}"#).unwrap_err();
    assert_matches!(err, OrthoError::ConfigParse(_));
}

#[test]
fn defaults_retain_a_day_of_progress() {
    let settings = Settings::default();
    assert_eq!(settings.progress_ttl(), Duration::from_secs(86_400));
    assert_eq!(settings.store_batch_size, 500);
    assert_eq!(settings.backoff_base_ms, 500);
}

#[test]
fn invalid_values_are_rejected() {
    for json in [
        r#"{"requests_per_second": 0}"#,
        r#"{"max_in_flight": 0}"#,
        r#"{"max_attempts": 0}"#,
        r#"{"store_batch_size": 0}"#,
        r#"{"quality_threshold": 101}"#,
        r#"{"sources": []}"#,
        r#"{"sources": ["kegg_ko", "kegg_ko"]}"#,
        r#"{"pairwise_sources": [{"name": "ssdb_best", "base_url": "http://x"}]}"#,
    ] {
        let settings = ConfigLoader::parse(json).unwrap();
        assert_matches!(settings.validate(), Err(OrthoError::InvalidConfig(_)), "{json}");
    }
}

#[test]
fn malformed_json_is_a_parse_error() {
    assert_matches!(
        ConfigLoader::parse("{\"sources\": "),
        Err(OrthoError::ConfigParse(_))
    );
}

#[test]
fn explicit_missing_file_is_a_read_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("absent.json");
    assert_matches!(
        ConfigLoader::resolve(path.to_str()),
        Err(OrthoError::ConfigRead(_))
    );
}

#[test]
fn explicit_file_is_loaded() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("kira-om.json");
    std::fs::write(&path, r#"{"quality_threshold": 30}"#).unwrap();

    let settings = ConfigLoader::resolve(path.to_str()).unwrap();
    assert_eq!(settings.quality_threshold, 30.0);
}
