use handlehunt::handlers::*;
use handlehunt_core::config::EngineConfig;
use handlehunt_core::data::Database;
use handlehunt_core::engine::ScanEngine;
use handlehunt_core::progress::{ProgressEvent, ProgressSink};
use handlehunt_core::report::ReportFormat;
use handlehunt_core::store::ResultStore;
use handlehunt_scanner::{CatalogSource, SiteDefinition};
use indicatif::ProgressBar;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::{NamedTempFile, TempDir};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CATALOG_JSON: &str = r#"{
    "sites": [
        {"name": "Alpha", "uri_check": "https://a.test/{account}", "cat": "social"},
        {"name": "Beta", "uri_check": "https://b.test/u/{account}", "cat": "social", "valid": false},
        {"name": "Gamma", "uri_check": "https://g.test/@{account}", "cat": "coding"}
    ]
}"#;

fn catalog_file() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{}", CATALOG_JSON).unwrap();
    file
}

fn test_db() -> (TempDir, Arc<Database>) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = create_database(temp_dir.path()).unwrap();
    let db = Arc::new(Database::new(&db_path).unwrap());
    (temp_dir, db)
}

#[test]
fn test_expand_path_tilde() {
    let expanded = expand_path("~/.config/handlehunt/handlehunt.db");
    assert!(!expanded.to_string_lossy().starts_with('~'));
    assert!(expanded.ends_with(".config/handlehunt/handlehunt.db"));
}

#[test]
fn test_expand_path_absolute_untouched() {
    assert_eq!(expand_path("/tmp/hh.db"), PathBuf::from("/tmp/hh.db"));
}

#[test]
fn test_create_database() {
    let temp_dir = TempDir::new().unwrap();
    let config_dir = temp_dir.path().join("nested").join("handlehunt");

    let db_path = create_database(&config_dir).unwrap();

    assert_eq!(db_path, config_dir.join(DB_FILE_NAME));
    assert!(Database::exists(&db_path));
}

#[test]
fn test_open_database_requires_init() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("missing.db");

    let result = open_database(missing.to_str().unwrap());

    assert!(result.is_err());
    assert!(result.err().unwrap().to_string().contains("handlehunt init"));
    assert!(!missing.exists());
}

#[test]
fn test_open_existing_database() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = create_database(temp_dir.path()).unwrap();

    assert!(open_database(db_path.to_str().unwrap()).is_ok());
}

#[test]
fn test_group_catalog() {
    let sites = vec![
        SiteDefinition::new("Gamma", "https://g.test/@{account}", "coding"),
        SiteDefinition::new("Alpha", "https://a.test/{account}", "social"),
        SiteDefinition::new("Delta", "https://d.test/{account}", "Social"),
    ];

    let all = group_catalog(&sites, None);
    assert_eq!(all.keys().copied().collect::<Vec<_>>(), vec!["Social", "coding", "social"]);

    let social = group_catalog(&sites, Some("social"));
    let listed: usize = social.values().map(Vec::len).sum();
    assert_eq!(listed, 2);
    assert!(!social.contains_key("coding"));
}

#[tokio::test]
async fn test_catalog_source_from_file() {
    let file = catalog_file();
    let path = file.path().to_path_buf();

    let source = catalog_source(None, Some(&path)).unwrap();
    let sites = source.fetch_catalog().await.unwrap();

    assert_eq!(sites.len(), 3);
    assert!(!sites[1].is_enabled());
}

#[tokio::test]
async fn test_catalog_source_from_url() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wmn-data.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string(CATALOG_JSON))
        .mount(&server)
        .await;

    let url = format!("{}/wmn-data.json", server.uri());
    let source = catalog_source(Some(&url), None).unwrap();

    assert_eq!(source.fetch_catalog().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_load_catalog_stores_snapshot() {
    let (_temp_dir, db) = test_db();
    let engine = ScanEngine::new(db.clone(), EngineConfig::default()).unwrap();
    let file = catalog_file();
    let path = file.path().to_path_buf();
    let source = catalog_source(None, Some(&path)).unwrap();

    let origin = load_catalog(&engine, &db, source.as_ref()).await.unwrap();

    assert_eq!(origin, CatalogOrigin::Fetched(3));
    assert_eq!(engine.catalog().await.len(), 3);
    assert_eq!(db.load_catalog().unwrap().len(), 3);
}

#[tokio::test]
async fn test_load_catalog_falls_back_to_snapshot() {
    let (temp_dir, db) = test_db();
    db.replace_catalog(&[SiteDefinition::new("Alpha", "https://a.test/{account}", "social")])
        .unwrap();
    let engine = ScanEngine::new(db.clone(), EngineConfig::default()).unwrap();
    let missing = temp_dir.path().join("no-such-catalog.json");
    let source = catalog_source(None, Some(&missing)).unwrap();

    let origin = load_catalog(&engine, &db, source.as_ref()).await.unwrap();

    assert_eq!(origin, CatalogOrigin::Stored(1));
    assert_eq!(engine.catalog().await[0].name, "Alpha");
    // The snapshot is left as it was
    assert_eq!(db.load_catalog().unwrap().len(), 1);
}

#[tokio::test]
async fn test_load_catalog_with_nothing_stored() {
    let (temp_dir, db) = test_db();
    let engine = ScanEngine::new(db.clone(), EngineConfig::default()).unwrap();
    let source = catalog_source(None, Some(&temp_dir.path().join("nope.json"))).unwrap();

    let origin = load_catalog(&engine, &db, source.as_ref()).await.unwrap();

    assert_eq!(origin, CatalogOrigin::Stored(0));
    assert!(engine.catalog().await.is_empty());
}

#[test]
fn test_progress_sink_accepts_every_event() {
    let sink = progress_sink(ProgressBar::hidden());
    let alpha = SiteDefinition::new("Alpha", "https://a.test/{account}", "social");

    let events = [
        ProgressEvent::Progress {
            handle: "carol".to_string(),
            found_so_far: vec![alpha.clone()],
            total_sites: 3,
        },
        ProgressEvent::Complete {
            handle: "carol".to_string(),
            final_found: vec![alpha],
        },
        ProgressEvent::Failed {
            handle: "carol".to_string(),
            error: "boom".to_string(),
        },
    ];

    for event in &events {
        assert!(sink.emit(event).is_ok());
    }
}

#[test]
fn test_stored_report_formats_list_the_same_matches() {
    let (_temp_dir, db) = test_db();
    db.create_search_record("carol").unwrap();
    db.record_correlation("carol", &SiteDefinition::new("Alpha", "https://a.test/{account}", "social"))
        .unwrap();
    db.record_correlation("carol", &SiteDefinition::new("Gamma", "https://g.test/@{account}", "coding"))
        .unwrap();

    let text = stored_report(&db, "carol", ReportFormat::Text, Some(5)).unwrap();
    let json = stored_report(&db, "carol", ReportFormat::Json, Some(5)).unwrap();

    assert!(text.contains("Sites checked: 5"));
    assert!(text.contains("Accounts found: 2"));
    let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed["search"]["accounts_found"], 2);
    for entry in parsed["matches"].as_array().unwrap() {
        assert!(text.contains(entry["url"].as_str().unwrap()));
    }
}

#[test]
fn test_stored_report_without_total_is_history() {
    let (_temp_dir, db) = test_db();
    db.create_search_record("carol").unwrap();

    let text = stored_report(&db, "carol", ReportFormat::Text, None).unwrap();

    assert!(text.contains("Accounts found: 0"));
    assert!(!text.contains("Sites checked"));
}

#[test]
fn test_cached_results_notice_warns_about_partial_results() {
    let notice = cached_results_notice("carol");

    assert!(notice.contains("'carol'"));
    assert!(notice.contains("incomplete"));
    assert!(notice.contains("--refresh"));
}
