// Plain-text rendering of search results for the terminal

use crate::store::Correlation;
use chrono::{DateTime, Utc};
use colored::Colorize;
use handlehunt_scanner::SiteDefinition;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Text,
    Json,
}

impl ReportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Some(ReportFormat::Text),
            "json" => Some(ReportFormat::Json),
            _ => None,
        }
    }
}

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

struct ReportLine<'a> {
    name: &'a str,
    url: String,
    found_at: Option<DateTime<Utc>>,
}

fn group_by_category<'a, I>(lines: I) -> BTreeMap<String, Vec<ReportLine<'a>>>
where
    I: IntoIterator<Item = (&'a str, ReportLine<'a>)>,
{
    let mut by_category: BTreeMap<String, Vec<ReportLine<'a>>> = BTreeMap::new();
    for (category, line) in lines {
        let category = if category.trim().is_empty() {
            "uncategorized".to_string()
        } else {
            category.to_string()
        };
        by_category.entry(category).or_default().push(line);
    }
    by_category
}

fn render(summary: &[String], by_category: BTreeMap<String, Vec<ReportLine<'_>>>) -> String {
    let mut report = String::new();
    report.push_str(RULE);
    report.push_str("\n\n# Summary:\n");
    for line in summary {
        report.push_str(&format!("  {}\n", line));
    }
    report.push('\n');
    report.push_str(RULE);
    report.push_str("\n\n");

    for (category, lines) in by_category {
        report.push_str(&format!("## {}\n", category));
        for line in lines {
            let mut row = format!("  {} {}", line.name.green(), line.url);
            if let Some(found_at) = line.found_at {
                row.push_str(&format!(" {}", found_at.format("%Y-%m-%d %H:%M:%S").to_string().dimmed()));
            }
            report.push_str(&row);
            report.push('\n');
        }
        report.push('\n');
    }

    report
}

/// Report for a scan that just finished.
pub fn generate_search_report(handle: &str, found: &[SiteDefinition], total_sites: usize) -> String {
    let summary = vec![
        format!("Username: {}", handle),
        format!("Sites checked: {}", total_sites),
        format!("Accounts found: {}", found.len()),
    ];

    let by_category = group_by_category(found.iter().map(|site| {
        (
            site.category.as_str(),
            ReportLine {
                name: &site.name,
                url: site.render(handle),
                found_at: None,
            },
        )
    }));

    render(&summary, by_category)
}

/// Report for cached results.
pub fn generate_history_report(handle: &str, correlations: &[Correlation]) -> String {
    let mut summary = vec![format!("Username: {}", handle)];
    if let Some(first) = correlations.first() {
        summary.push(format!(
            "Searched: {}",
            first.searched_at.format("%Y-%m-%d %H:%M:%S")
        ));
    }
    summary.push(format!("Accounts found: {}", correlations.len()));

    let by_category = group_by_category(correlations.iter().map(|c| {
        (
            c.site.category.as_str(),
            ReportLine {
                name: &c.site.name,
                url: c.profile_url(),
                found_at: Some(c.found_at),
            },
        )
    }));

    render(&summary, by_category)
}

/// Machine-readable report. `total_sites` is unknown for cached results.
pub fn generate_json_report(
    handle: &str,
    correlations: &[Correlation],
    total_sites: Option<usize>,
) -> Result<String, serde_json::Error> {
    let matches: Vec<serde_json::Value> = correlations
        .iter()
        .map(|c| {
            serde_json::json!({
                "site": c.site.name,
                "category": c.site.category,
                "url": c.profile_url(),
                "found_at": c.found_at.to_rfc3339(),
            })
        })
        .collect();

    let json_report = serde_json::json!({
        "metadata": {
            "generator": "handlehunt",
            "version": env!("CARGO_PKG_VERSION"),
            "generated_at": Utc::now().to_rfc3339(),
        },
        "search": {
            "username": handle,
            "searched_at": correlations.first().map(|c| c.searched_at.to_rfc3339()),
            "sites_checked": total_sites,
            "accounts_found": matches.len(),
        },
        "matches": matches,
    });

    serde_json::to_string_pretty(&json_report)
}

pub fn save_report(content: &str, path: &Path) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}
