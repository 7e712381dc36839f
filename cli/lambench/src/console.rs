use crate::types::{BenchmarkResult, SampleStats};
use colored::*;
use comfy_table::{
    presets::*, Attribute, Cell, CellAlignment, ColumnConstraint, ContentArrangement, Table,
    TableComponent, Width,
};

const TABLE_WIDTH: u16 = 100;
const DESCRIPTION_WIDTH: u16 = 16;

fn format_value_or_na(value: Option<f64>, unit: &str) -> String {
    match value {
        Some(v) => format!("{:.2} {}", v, unit),
        None => format!("N/A {}", unit),
    }
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(NOTHING)
        .set_style(TableComponent::MiddleHeaderIntersections, '┴')
        .set_style(TableComponent::BottomBorder, '─')
        .set_style(TableComponent::BottomBorderIntersections, '─')
        .set_style(TableComponent::HeaderLines, '─')
        .set_content_arrangement(ContentArrangement::DynamicFullWidth)
        .set_width(TABLE_WIDTH)
        .set_header(
            header
                .into_iter()
                .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
                .collect::<Vec<_>>(),
        )
        .set_constraints(vec![ColumnConstraint::LowerBoundary(Width::Fixed(
            DESCRIPTION_WIDTH,
        ))]);
    table
}

fn stats_row(label: &str, stats: &SampleStats) -> Vec<Cell> {
    let mut row = vec![
        Cell::new(label),
        Cell::new(stats.count).set_alignment(CellAlignment::Right),
    ];
    for value in [
        stats.min, stats.p50, stats.p95, stats.p99, stats.max, stats.mean,
    ] {
        row.push(Cell::new(format_value_or_na(value, "ms")).set_alignment(CellAlignment::Right));
    }
    row
}

/// Print the cold start and warm load numbers of a single configuration.
pub fn print_benchmark_result(result: &BenchmarkResult) {
    println!(
        "\n{}",
        format!(
            "{} @ {} MB | Cold Start Metrics ({} runs)",
            result.framework,
            result.memory,
            result.cold_samples.len()
        )
        .bright_blue()
        .bold()
    );
    println!("{}", "─".repeat(TABLE_WIDTH as usize).bright_black());

    let mut table = new_table(vec!["Metric", "Count", "Min", "P50", "P95", "P99", "Max", "Mean"]);
    table.add_row(stats_row("Init Duration", &result.cold_init_stats));
    table.add_row(stats_row("First Hit", &result.cold_first_stats));
    println!("{table}");

    let warm = &result.warm_summary;
    let mut table = new_table(vec!["Warm Load", "P50", "P95", "P99", "RPS", "Errors"]);
    table.add_row(vec![
        Cell::new("Artillery"),
        Cell::new(format_value_or_na(warm.p50, "ms")).set_alignment(CellAlignment::Right),
        Cell::new(format_value_or_na(warm.p95, "ms")).set_alignment(CellAlignment::Right),
        Cell::new(format_value_or_na(warm.p99, "ms")).set_alignment(CellAlignment::Right),
        Cell::new(format_value_or_na(warm.rps, "/s")).set_alignment(CellAlignment::Right),
        Cell::new(
            warm.errors
                .map(|e| e.to_string())
                .unwrap_or_else(|| "N/A".to_string()),
        )
        .set_alignment(CellAlignment::Right),
    ]);
    println!("{table}");
}

/// One line per configuration, p95 only, once the whole run is done.
pub fn print_run_summary(results: &[BenchmarkResult]) {
    println!("\n{}", "Run Summary".bright_blue().bold());
    let mut table = new_table(vec![
        "Framework",
        "Mem",
        "Cold Init p95",
        "1st Hit p95",
        "Warm p95",
        "Warm p99",
        "RPS",
        "Errors",
    ]);
    for r in results {
        table.add_row(vec![
            Cell::new(&r.framework),
            Cell::new(format!("{} MB", r.memory)).set_alignment(CellAlignment::Right),
            Cell::new(format_value_or_na(r.cold_init_stats.p95, "ms"))
                .set_alignment(CellAlignment::Right),
            Cell::new(format_value_or_na(r.cold_first_stats.p95, "ms"))
                .set_alignment(CellAlignment::Right),
            Cell::new(format_value_or_na(r.warm_summary.p95, "ms"))
                .set_alignment(CellAlignment::Right),
            Cell::new(format_value_or_na(r.warm_summary.p99, "ms"))
                .set_alignment(CellAlignment::Right),
            Cell::new(format_value_or_na(r.warm_summary.rps, "/s"))
                .set_alignment(CellAlignment::Right),
            Cell::new(
                r.warm_summary
                    .errors
                    .map(|e| e.to_string())
                    .unwrap_or_default(),
            )
            .set_alignment(CellAlignment::Right),
        ]);
    }
    println!("{table}");
}
