use crate::types::RunReport;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tera::{Context as TeraContext, Tera};

const MARKDOWN_TEMPLATE: &str = include_str!("../templates/report.md");

/// ISO-8601 timestamp with `:` and `.` swapped for `-` so it can be used in
/// file names.
pub fn file_stamp(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
        .replace([':', '.'], "-")
}

/// Empty cell for missing values; `{}` prints whole floats without a
/// trailing `.0`.
fn cell<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

#[derive(Serialize)]
struct MarkdownRow {
    framework: String,
    memory: u32,
    cold_init_p95: String,
    first_hit_p95: String,
    warm_p95: String,
    warm_p99: String,
    rps: String,
    errors: String,
}

/// Render the human-readable summary table. Only p95/p99, throughput and
/// errors make it into the table; the JSON report has the rest.
pub fn render_markdown(report: &RunReport, stamp: &str) -> Result<String> {
    let rows: Vec<MarkdownRow> = report
        .results
        .iter()
        .map(|r| MarkdownRow {
            framework: r.framework.clone(),
            memory: r.memory,
            cold_init_p95: cell(r.cold_init_stats.p95),
            first_hit_p95: cell(r.cold_first_stats.p95),
            warm_p95: cell(r.warm_summary.p95),
            warm_p99: cell(r.warm_summary.p99),
            rps: cell(r.warm_summary.rps),
            errors: cell(r.warm_summary.errors),
        })
        .collect();

    let mut tera = Tera::default();
    tera.add_raw_template("report.md", MARKDOWN_TEMPLATE)
        .context("Failed to load Markdown report template")?;

    let mut ctx = TeraContext::new();
    ctx.insert("stamp", stamp);
    ctx.insert("rows", &rows);
    ctx.insert("warm_duration", &report.settings.warm_duration_sec);
    ctx.insert("arrival_rate", &report.settings.arrival_rate);

    tera.render("report.md", &ctx)
        .context("Failed to render Markdown report")
}

/// Paths of the artifacts written for one run.
#[derive(Debug, Clone)]
pub struct ReportPaths {
    pub json: PathBuf,
    pub markdown: PathBuf,
}

/// Write `benchmark-<stamp>.json` and `benchmark-<stamp>.md` into
/// `output_dir`, creating it if needed.
pub fn write_reports(report: &RunReport, output_dir: &Path, stamp: &str) -> Result<ReportPaths> {
    fs::create_dir_all(output_dir).with_context(|| {
        format!("Failed to create reports directory: {}", output_dir.display())
    })?;

    let json_path = output_dir.join(format!("benchmark-{}.json", stamp));
    let md_path = output_dir.join(format!("benchmark-{}.md", stamp));

    let json = serde_json::to_string_pretty(report)?;
    fs::write(&json_path, json)
        .with_context(|| format!("Failed to write {}", json_path.display()))?;

    let markdown = render_markdown(report, stamp)?;
    fs::write(&md_path, markdown)
        .with_context(|| format!("Failed to write {}", md_path.display()))?;

    tracing::debug!(json = %json_path.display(), markdown = %md_path.display(), "reports written");
    Ok(ReportPaths {
        json: json_path,
        markdown: md_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::summarize;
    use crate::types::{BenchmarkResult, ColdStartSample, RunSettings, WarmSummary};
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn sample_report() -> RunReport {
        let cold_samples = vec![
            ColdStartSample {
                init_duration_ms: Some(210.5),
                first_response_ms: Some(640.0),
            },
            ColdStartSample {
                init_duration_ms: None,
                first_response_ms: Some(700.0),
            },
        ];
        RunReport {
            timestamp: "2026-10-16T08:30:00.000Z".to_string(),
            region: "ap-southeast-1".to_string(),
            settings: RunSettings {
                cold_runs: 2,
                warm_duration_sec: 120,
                arrival_rate: 10,
            },
            results: vec![
                BenchmarkResult {
                    framework: "fastify".to_string(),
                    memory: 512,
                    cold_init_stats: summarize(&[210.5]),
                    cold_first_stats: summarize(&[640.0, 700.0]),
                    cold_samples,
                    warm_summary: WarmSummary {
                        p50: Some(30.0),
                        p95: Some(71.5),
                        p99: Some(120.0),
                        rps: Some(10.0),
                        errors: Some(0),
                        raw: String::new(),
                    },
                },
                BenchmarkResult {
                    framework: "nest".to_string(),
                    memory: 1024,
                    cold_samples: vec![],
                    cold_init_stats: summarize(&[]),
                    cold_first_stats: summarize(&[]),
                    warm_summary: WarmSummary::default(),
                },
            ],
        }
    }

    #[test]
    fn test_file_stamp_is_fs_safe() {
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 8, 30, 5).unwrap();
        let stamp = file_stamp(now);
        assert_eq!(stamp, "2026-10-16T08-30-05-000Z");
        assert!(!stamp.contains(':') && !stamp.contains('.'));
    }

    #[test]
    fn test_render_markdown_rows() {
        let md = render_markdown(&sample_report(), "stamp-1").unwrap();

        assert!(md.starts_with("# Lambda Benchmark (stamp-1)"));
        assert!(md.contains("| fastify | 512 | 210.5 | 640 | 71.5 | 120 | 10 | 0 |"));
        assert!(md.contains("| nest | 1024 |  |  |  |  |  |  |"));
        assert!(md.contains("duration=120s, arrivalRate=10/s"));
    }

    #[test]
    fn test_write_reports_creates_directory() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("reports");
        let report = sample_report();

        let paths = write_reports(&report, &out, "2026-10-16T08-30-05-000Z").unwrap();

        assert!(out.is_dir());
        assert_eq!(
            paths.json.file_name().unwrap(),
            "benchmark-2026-10-16T08-30-05-000Z.json"
        );
        assert!(paths.markdown.exists());

        let saved: RunReport =
            serde_json::from_str(&fs::read_to_string(&paths.json).unwrap()).unwrap();
        assert_eq!(saved.results.len(), 2);
        assert_eq!(saved.results[0].cold_samples, report.results[0].cold_samples);
        assert_eq!(saved.results[0].warm_summary, report.results[0].warm_summary);
        assert_eq!(saved.settings, report.settings);
    }

    #[test]
    fn test_json_uses_null_for_missing_stats() {
        let dir = tempdir().unwrap();
        let paths = write_reports(&sample_report(), dir.path(), "s").unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(paths.json).unwrap()).unwrap();

        let empty = &value["results"][1]["cold_init_stats"];
        assert_eq!(empty["count"], 0);
        assert!(empty["p95"].is_null());
        assert!(empty["mean"].is_null());
    }
}
