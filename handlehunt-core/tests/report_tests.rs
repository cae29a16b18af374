// Tests for report generation functionality

use chrono::{TimeZone, Utc};
use handlehunt_core::report::{
    ReportFormat, generate_history_report, generate_json_report, generate_search_report, save_report,
};
use handlehunt_core::store::Correlation;
use handlehunt_scanner::SiteDefinition;
use tempfile::TempDir;

fn found_sites() -> Vec<SiteDefinition> {
    vec![
        SiteDefinition::new("Gamma", "https://g.test/@{account}", "coding"),
        SiteDefinition::new("Alpha", "https://a.test/{account}", "social"),
        SiteDefinition::new("Delta", "https://d.test/{account}", ""),
    ]
}

fn position(report: &str, needle: &str) -> usize {
    report
        .find(needle)
        .unwrap_or_else(|| panic!("'{}' missing from report:\n{}", needle, report))
}

fn correlations() -> Vec<Correlation> {
    let searched_at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    let found_at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 3).unwrap();
    found_sites()
        .into_iter()
        .map(|site| Correlation {
            handle: "carol".to_string(),
            site,
            found_at,
            searched_at,
        })
        .collect()
}

// ============================================================================
// Report Format Tests
// ============================================================================

#[test]
fn test_report_format_from_str() {
    assert_eq!(ReportFormat::from_str("text"), Some(ReportFormat::Text));
    assert_eq!(ReportFormat::from_str("txt"), Some(ReportFormat::Text));
    assert_eq!(ReportFormat::from_str("JSON"), Some(ReportFormat::Json));
    assert_eq!(ReportFormat::from_str("csv"), None);
}

// ============================================================================
// Search Report Tests
// ============================================================================

#[test]
fn test_search_report_summary() {
    let report = generate_search_report("carol", &found_sites(), 10);

    assert!(report.contains("# Summary:"));
    assert!(report.contains("Username: carol"));
    assert!(report.contains("Sites checked: 10"));
    assert!(report.contains("Accounts found: 3"));
}

#[test]
fn test_search_report_renders_profile_urls() {
    let report = generate_search_report("carol", &found_sites(), 3);

    assert!(report.contains("https://a.test/carol"));
    assert!(report.contains("https://g.test/@carol"));
    assert!(!report.contains("{account}"));
}

#[test]
fn test_search_report_groups_by_category() {
    let report = generate_search_report("carol", &found_sites(), 3);

    let coding = position(&report, "## coding");
    let social = position(&report, "## social");
    let uncategorized = position(&report, "## uncategorized");

    assert!(coding < social);
    assert!(social < uncategorized);
    assert!(coding < position(&report, "Gamma"));
    assert!(position(&report, "Gamma") < social);
    assert!(position(&report, "Delta") > uncategorized);
}

#[test]
fn test_search_report_with_no_matches() {
    let report = generate_search_report("carol", &[], 42);

    assert!(report.contains("Accounts found: 0"));
    assert!(report.contains("Sites checked: 42"));
    assert!(!report.contains("## "));
}

// ============================================================================
// History Report Tests
// ============================================================================

#[test]
fn test_history_report() {
    let correlations = correlations();

    let report = generate_history_report("carol", &correlations);

    assert!(report.contains("Username: carol"));
    assert!(report.contains("Searched: 2024-03-01 12:00:00"));
    assert!(report.contains("Accounts found: 3"));
    assert!(report.contains("2024-03-01 12:00:03"));
    assert!(report.contains("https://d.test/carol"));
    assert!(report.contains("## uncategorized"));
}

#[test]
fn test_history_report_without_matches() {
    let report = generate_history_report("carol", &[]);

    assert!(report.contains("Accounts found: 0"));
    assert!(!report.contains("Searched:"));
}

// ============================================================================
// JSON Report Tests
// ============================================================================

#[test]
fn test_json_report_structure() {
    let json = generate_json_report("carol", &correlations(), Some(10)).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();

    assert_eq!(parsed["metadata"]["generator"], "handlehunt");
    assert_eq!(parsed["search"]["username"], "carol");
    assert_eq!(parsed["search"]["sites_checked"], 10);
    assert_eq!(parsed["search"]["accounts_found"], 3);
    assert_eq!(parsed["search"]["searched_at"], "2024-03-01T12:00:00+00:00");

    let matches = parsed["matches"].as_array().unwrap();
    assert_eq!(matches.len(), 3);
    assert_eq!(matches[0]["site"], "Gamma");
    assert_eq!(matches[0]["category"], "coding");
    assert_eq!(matches[0]["url"], "https://g.test/@carol");
    assert_eq!(matches[0]["found_at"], "2024-03-01T12:00:03+00:00");
}

#[test]
fn test_json_report_without_matches() {
    let json = generate_json_report("carol", &[], None).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();

    assert!(parsed["search"]["sites_checked"].is_null());
    assert!(parsed["search"]["searched_at"].is_null());
    assert_eq!(parsed["matches"].as_array().unwrap().len(), 0);
}

#[test]
fn test_save_report() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("carol.txt");

    save_report("report body", &path).unwrap();

    assert_eq!(std::fs::read_to_string(&path).unwrap(), "report body");
}
