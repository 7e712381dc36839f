use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A deployed function under test, as discovered from the stack outputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionMeta {
    pub framework: String,
    pub memory: u32,
    pub url: String,
    pub name: String,
}

/// Measurements taken for a single forced cold start.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ColdStartSample {
    /// Platform-reported `Init Duration`, when the log line showed up in time.
    pub init_duration_ms: Option<f64>,
    /// Client-side wall time of the first request after the cold start.
    pub first_response_ms: Option<f64>,
}

/// Summary numbers scraped from the load generator's text report.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WarmSummary {
    pub p50: Option<f64>,
    pub p95: Option<f64>,
    pub p99: Option<f64>,
    pub rps: Option<f64>,
    pub errors: Option<u64>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub raw: String,
}

/// Order statistics over a sample set. Every field but `count` is `None`
/// when there were no finite samples.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SampleStats {
    pub count: usize,
    pub min: Option<f64>,
    pub p50: Option<f64>,
    pub p95: Option<f64>,
    pub p99: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub std_dev: Option<f64>,
}

/// Everything measured for one (framework, memory) configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub framework: String,
    pub memory: u32,
    pub cold_samples: Vec<ColdStartSample>,
    pub cold_init_stats: SampleStats,
    pub cold_first_stats: SampleStats,
    pub warm_summary: WarmSummary,
}

impl BenchmarkResult {
    pub fn init_durations(&self) -> Vec<f64> {
        self.cold_samples
            .iter()
            .filter_map(|s| s.init_duration_ms)
            .collect()
    }

    pub fn first_responses(&self) -> Vec<f64> {
        self.cold_samples
            .iter()
            .filter_map(|s| s.first_response_ms)
            .collect()
    }
}

/// Load settings recorded alongside the results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSettings {
    pub cold_runs: u32,
    pub warm_duration_sec: u64,
    pub arrival_rate: u32,
}

/// The JSON document written at the end of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub timestamp: String,
    pub region: String,
    pub settings: RunSettings,
    pub results: Vec<BenchmarkResult>,
}

/// Fixed-count, fixed-delay polling budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Same attempt budget with no waiting in between.
    pub const fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO)
    }
}
