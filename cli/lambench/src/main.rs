use lambench::{
    benchmark::{run_benchmark, BenchmarkOptions, Collaborators, Pacing},
    cli::{BenchArgs, CliArgs, Commands, StackArgs},
    console::print_run_summary,
    probe::HttpProber,
    report::{file_stamp, write_reports},
    stack::{deploy_stack, read_stack_outputs},
    telemetry::init_telemetry,
    types::{FunctionMeta, RunReport, RunSettings},
    warm::{CommandRunner, WarmLoad},
};

use anyhow::{anyhow, Context, Result};
use aws_config::Region;
use aws_sdk_cloudwatchlogs::Client as CwlClient;
use aws_sdk_lambda::Client as LambdaClient;
use chrono::Utc;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use colored::*;
use std::time::Duration;

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("\n❌ Error: {}", err);

        if let Some(cause) = err.source() {
            eprintln!("\nCaused by:");
            let mut current = Some(cause);
            let mut i = 0;
            while let Some(e) = current {
                eprintln!("  {}: {}", i, e);
                current = e.source();
                i += 1;
            }
        }
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let args = CliArgs::parse();

    if let Commands::GenerateCompletions { shell } = args.command {
        let mut cmd = CliArgs::command();
        let bin_name = cmd.get_name().to_string();
        generate(shell, &mut cmd, bin_name, &mut std::io::stdout());
        return Ok(());
    }

    let tracer_provider = init_telemetry(args.verbose)?;

    let result = match args.command {
        Commands::Run { stack, bench } => execute_run(stack, bench).await,
        Commands::Outputs { stack } => execute_outputs(stack).await,
        Commands::GenerateCompletions { .. } => {
            unreachable!("completions are generated before telemetry is initialized")
        }
    };

    if let Some(provider) = tracer_provider {
        if let Err(e) = provider.force_flush() {
            tracing::error!("Failed to flush spans: {}", e);
        }
    }
    result
}

/// Deploy (unless skipped) and resolve the functions to benchmark.
async fn resolve_functions(stack: &StackArgs) -> Result<Vec<FunctionMeta>> {
    let frameworks = stack.frameworks();
    if frameworks.is_empty() {
        return Err(anyhow!("At least one framework must be given"));
    }
    if stack.memory_sizes.is_empty() {
        return Err(anyhow!("At least one memory size must be given"));
    }

    if stack.skip_deploy {
        tracing::info!("skipping deploy, reusing {}", stack.outputs_path().display());
    } else {
        deploy_stack(&stack.infra_dir, &stack.outputs_file).await?;
    }

    read_stack_outputs(
        &stack.outputs_path(),
        &stack.stack_name,
        &frameworks,
        &stack.memory_sizes,
    )
}

async fn execute_outputs(stack: StackArgs) -> Result<()> {
    let metas = resolve_functions(&stack).await?;
    for meta in &metas {
        println!(
            "{} @ {} MB  {}  {}",
            meta.framework.bold(),
            meta.memory,
            meta.name,
            meta.url.bright_black()
        );
    }
    Ok(())
}

async fn execute_run(stack: StackArgs, bench: BenchArgs) -> Result<()> {
    bench.validate()?;
    let metas = resolve_functions(&stack).await?;

    let warm = WarmLoad::from_template_file(
        &bench.template,
        bench.warm_duration,
        bench.arrival_rate,
        bench.load_config.clone(),
    )?;

    let config = aws_config::from_env()
        .region(Region::new(stack.region.clone()))
        .load()
        .await;
    let lambda_client = LambdaClient::new(&config);
    let logs_client = CwlClient::new(&config);

    let http_client = reqwest::Client::builder()
        .build()
        .context("Failed to build HTTP client")?;
    let prober = HttpProber::new(http_client, bench.health_path.clone());
    let runner = CommandRunner::new(&bench.load_command)?;

    let collaborators = Collaborators {
        control: &lambda_client,
        logs: &logs_client,
        prober: &prober,
        runner: &runner,
    };
    let pacing = Pacing {
        log_lookback: Duration::from_secs(bench.log_lookback),
        ..Pacing::default()
    };
    let options = BenchmarkOptions {
        cold_runs: bench.cold_runs,
        warm,
        pacing,
        quiet: bench.quiet,
    };

    println!(
        "Benchmarking {} configuration(s) in {} ({} cold runs, {}s warm at {}/s)",
        metas.len(),
        stack.region,
        bench.cold_runs,
        bench.warm_duration,
        bench.arrival_rate
    );
    let results = run_benchmark(&collaborators, &metas, &options).await?;

    let now = Utc::now();
    let report = RunReport {
        timestamp: now.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
        region: stack.region.clone(),
        settings: RunSettings {
            cold_runs: bench.cold_runs,
            warm_duration_sec: bench.warm_duration,
            arrival_rate: bench.arrival_rate,
        },
        results,
    };
    let paths = write_reports(&report, &bench.reports_dir, &file_stamp(now))?;

    print_run_summary(&report.results);
    println!("\n{}", "Saved reports:".green().bold());
    println!("  {}", paths.json.display());
    println!("  {}", paths.markdown.display());
    Ok(())
}
