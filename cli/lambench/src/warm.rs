use crate::types::WarmSummary;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;
use tokio::process::Command;

/// Fill the load-test template. The target loses any trailing slash so
/// scenario paths like `/health` join cleanly.
pub fn render_template(template: &str, target: &str, duration_sec: u64, arrival_rate: u32) -> String {
    template
        .replace("{{target}}", target.trim_end_matches('/'))
        .replace("{{duration}}", &duration_sec.to_string())
        .replace("{{arrivalRate}}", &arrival_rate.to_string())
}

struct ReportPatterns {
    p50: Regex,
    p95: Regex,
    p99: Regex,
    rps: Regex,
    errors: Regex,
}

/// `<label>: <number>`, tolerating the dot leaders newer reports print
/// between label and value.
fn labeled_number(labels: &str) -> Regex {
    Regex::new(&format!(
        r"(?i)(?:{}):\s*(?:\.{{2,}}\s*)?(\d+(?:\.\d+)?)",
        labels
    ))
    .expect("valid pattern")
}

fn patterns() -> &'static ReportPatterns {
    static PATTERNS: OnceLock<ReportPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| ReportPatterns {
        p50: labeled_number("p50|median"),
        p95: labeled_number("p95"),
        p99: labeled_number("p99"),
        rps: labeled_number("scenarios/s|request_rate"),
        errors: labeled_number("errors"),
    })
}

fn match_num<T: std::str::FromStr>(text: &str, re: &Regex) -> Option<T> {
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<T>().ok())
}

/// Scrape the load generator's stdout. Only the final summary block is
/// searched when one is present, since intermediate reports repeat the same
/// labels. Fields that do not match stay `None`.
pub fn parse_load_report(stdout: &str) -> WarmSummary {
    let section = stdout
        .rfind("Summary report")
        .map_or(stdout, |idx| &stdout[idx..]);
    let re = patterns();

    WarmSummary {
        p50: match_num::<f64>(section, &re.p50).filter(|v| v.is_finite()),
        p95: match_num::<f64>(section, &re.p95).filter(|v| v.is_finite()),
        p99: match_num::<f64>(section, &re.p99).filter(|v| v.is_finite()),
        rps: match_num::<f64>(section, &re.rps).filter(|v| v.is_finite()),
        errors: match_num::<u64>(section, &re.errors),
        raw: stdout.to_string(),
    }
}

/// Runs the external load generator against a materialized config file.
#[async_trait]
pub trait LoadRunner: Send + Sync {
    /// Stdout of the run. A non-zero exit is not an error.
    async fn run(&self, config_path: &Path) -> Result<String>;
}

/// Shells out to a command line such as `npx artillery run`, appending the
/// config path as the last argument.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    program: String,
    args: Vec<String>,
}

impl CommandRunner {
    pub fn new(command_line: &[String]) -> Result<Self> {
        let Some((program, args)) = command_line.split_first() else {
            bail!("Load generator command cannot be empty");
        };
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

#[async_trait]
impl LoadRunner for CommandRunner {
    async fn run(&self, config_path: &Path) -> Result<String> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(config_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .with_context(|| format!("Failed to launch load generator '{}'", self.program))?;

        if !output.status.success() {
            tracing::warn!(
                status = %output.status,
                stderr = %String::from_utf8_lossy(&output.stderr),
                "load generator exited unsuccessfully"
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Template, load shape and scratch location for the warm phase.
#[derive(Debug, Clone)]
pub struct WarmLoad {
    pub template: String,
    pub duration_sec: u64,
    pub arrival_rate: u32,
    pub config_path: PathBuf,
}

impl WarmLoad {
    pub fn from_template_file(
        template_path: &Path,
        duration_sec: u64,
        arrival_rate: u32,
        config_path: PathBuf,
    ) -> Result<Self> {
        let template = fs::read_to_string(template_path).with_context(|| {
            format!("Failed to read load-test template: {}", template_path.display())
        })?;
        Ok(Self {
            template,
            duration_sec,
            arrival_rate,
            config_path,
        })
    }
}

/// Materialize the config for `url`, run the load generator and parse what
/// it printed. Only a failure to write the config is fatal.
#[tracing::instrument(skip(runner, load))]
pub async fn run_warm_load(runner: &dyn LoadRunner, load: &WarmLoad, url: &str) -> Result<WarmSummary> {
    let filled = render_template(&load.template, url, load.duration_sec, load.arrival_rate);
    if let Some(parent) = load.config_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    fs::write(&load.config_path, filled).with_context(|| {
        format!(
            "Failed to write load-test config: {}",
            load.config_path.display()
        )
    })?;

    let stdout = match runner.run(&load.config_path).await {
        Ok(stdout) => stdout,
        Err(e) => {
            tracing::warn!(error = %e, "load generator did not run");
            String::new()
        }
    };
    Ok(parse_load_report(&stdout))
}
