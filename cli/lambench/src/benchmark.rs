use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashSet;
use std::time::Duration;

use crate::console;
use crate::lambda::{self, FunctionControl};
use crate::logs::{self, LogQuery, LogWindow};
use crate::probe::Prober;
use crate::stats::summarize;
use crate::types::{BenchmarkResult, ColdStartSample, FunctionMeta, RetryPolicy, SampleStats};
use crate::warm::{self, LoadRunner, WarmLoad};

/// External systems a run talks to.
pub struct Collaborators<'a> {
    pub control: &'a dyn FunctionControl,
    pub logs: &'a dyn LogQuery,
    pub prober: &'a dyn Prober,
    pub runner: &'a dyn LoadRunner,
}

/// Waits and retry budgets for one run.
#[derive(Debug, Clone)]
pub struct Pacing {
    /// Wait for the configuration update to be applied.
    pub update_policy: RetryPolicy,
    /// Lookups of `Init Duration` in the function's logs.
    pub init_policy: RetryPolicy,
    /// How far back the log query looks at most.
    pub log_lookback: Duration,
    /// Allowance for clock drift between this host and the log service when
    /// the query starts at the moment a cold start was triggered.
    pub clock_skew: Duration,
    /// Pause after the first hit so log ingestion can catch up.
    pub log_settle: Duration,
    /// Pause between cold start iterations.
    pub between_runs: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            update_policy: RetryPolicy::new(60, Duration::from_secs(2)),
            init_policy: RetryPolicy::new(12, Duration::from_secs(1)),
            log_lookback: Duration::from_secs(5 * 60),
            clock_skew: Duration::from_secs(2),
            log_settle: Duration::from_millis(1500),
            between_runs: Duration::from_secs(1),
        }
    }
}

impl Pacing {
    /// No waiting anywhere, same attempt budgets.
    pub fn immediate() -> Self {
        let default = Self::default();
        Self {
            update_policy: RetryPolicy::immediate(default.update_policy.max_attempts),
            init_policy: RetryPolicy::immediate(default.init_policy.max_attempts),
            log_lookback: default.log_lookback,
            clock_skew: default.clock_skew,
            log_settle: Duration::ZERO,
            between_runs: Duration::ZERO,
        }
    }
}

/// Options shared by every configuration in a run.
#[derive(Debug, Clone)]
pub struct BenchmarkOptions {
    pub cold_runs: u32,
    pub warm: WarmLoad,
    pub pacing: Pacing,
    pub quiet: bool,
}

fn progress_line(run: u32, sample: &ColdStartSample) -> String {
    let show = |v: Option<f64>| v.map_or_else(|| "n/a".to_string(), |v| format!("~{:.0}ms", v));
    format!(
        "Run {} → init {}, first {}",
        run,
        show(sample.init_duration_ms),
        show(sample.first_response_ms)
    )
}

/// Force `runs` cold starts in a row and measure each one.
#[tracing::instrument(skip_all, fields(function = %meta.name))]
pub async fn run_cold_starts(
    collaborators: &Collaborators<'_>,
    meta: &FunctionMeta,
    runs: u32,
    pacing: &Pacing,
    quiet: bool,
) -> Result<Vec<ColdStartSample>> {
    let progress = if !quiet && runs > 1 {
        let pb = ProgressBar::new(runs as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} cold starts")?
                .progress_chars("#>-"),
        );
        Some(pb)
    } else {
        None
    };

    let mut samples = Vec::with_capacity(runs as usize);
    let mut consumed = HashSet::new();
    for run in 1..=runs {
        let triggered_ms = chrono::Utc::now().timestamp_millis();
        lambda::force_cold_start(collaborators.control, &meta.name, pacing.update_policy).await?;

        // The first invocation creates the log group and emits the REPORT line.
        let first_response_ms = match collaborators.prober.first_hit(&meta.url).await {
            Ok(ms) => Some(ms),
            Err(e) => {
                tracing::warn!(run, error = %e, "first hit failed, sample recorded as missing");
                None
            }
        };

        tokio::time::sleep(pacing.log_settle).await;
        let window = LogWindow {
            lookback: pacing.log_lookback,
            not_before_ms: Some(triggered_ms - pacing.clock_skew.as_millis() as i64),
        };
        let init_duration_ms = logs::get_init_duration(
            collaborators.logs,
            &meta.name,
            window,
            &mut consumed,
            pacing.init_policy,
        )
        .await?;

        let sample = ColdStartSample {
            init_duration_ms,
            first_response_ms,
        };
        if !quiet {
            match &progress {
                Some(pb) => {
                    pb.println(progress_line(run, &sample));
                    pb.inc(1);
                }
                None => println!("{}", progress_line(run, &sample)),
            }
        }
        samples.push(sample);

        tokio::time::sleep(pacing.between_runs).await;
    }

    if let Some(pb) = progress {
        pb.finish_and_clear();
    }
    Ok(samples)
}

/// Cold starts followed by one warm pass for a single configuration.
pub async fn run_function_benchmark(
    collaborators: &Collaborators<'_>,
    meta: &FunctionMeta,
    options: &BenchmarkOptions,
) -> Result<BenchmarkResult> {
    let cold_samples = run_cold_starts(
        collaborators,
        meta,
        options.cold_runs,
        &options.pacing,
        options.quiet,
    )
    .await?;

    if !options.quiet {
        println!(
            "\nRunning warm load: {}s at {}/s ...",
            options.warm.duration_sec, options.warm.arrival_rate
        );
    }
    let warm_summary = warm::run_warm_load(collaborators.runner, &options.warm, &meta.url).await?;

    let mut result = BenchmarkResult {
        framework: meta.framework.clone(),
        memory: meta.memory,
        cold_samples,
        cold_init_stats: SampleStats::default(),
        cold_first_stats: SampleStats::default(),
        warm_summary,
    };
    result.cold_init_stats = summarize(&result.init_durations());
    result.cold_first_stats = summarize(&result.first_responses());
    Ok(result)
}

/// Benchmark every configuration in order and hand back the collected
/// results. Any fatal error discards what was gathered so far.
pub async fn run_benchmark(
    collaborators: &Collaborators<'_>,
    metas: &[FunctionMeta],
    options: &BenchmarkOptions,
) -> Result<Vec<BenchmarkResult>> {
    let mut results = Vec::with_capacity(metas.len());
    let total = metas.len();

    for (index, meta) in metas.iter().enumerate() {
        if !options.quiet {
            println!(
                "\n=== [{}/{}] Benchmark {} @ {}MB ===",
                index + 1,
                total,
                meta.framework,
                meta.memory
            );
        }
        tracing::info!(framework = %meta.framework, memory = meta.memory, function = %meta.name, "benchmarking configuration");

        let result = run_function_benchmark(collaborators, meta, options).await?;
        if !options.quiet {
            console::print_benchmark_result(&result);
        }
        results.push(result);
    }

    Ok(results)
}
