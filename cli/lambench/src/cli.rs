use anyhow::{anyhow, Result};
use clap::{crate_authors, crate_description, Args, Parser, Subcommand};
use clap_complete::Shell as ClapShell;
use std::path::PathBuf;

const USAGE_EXAMPLES: &str = "\
EXAMPLES:
    # Deploy the stack and benchmark every framework at 512 and 1024 MB
    lambench run

    # Reuse the existing CDK outputs, 5 cold starts per function, 60s warm phase
    lambench run --skip-deploy --cold-runs 5 --warm-duration 60

    # Only benchmark express at 256 MB
    lambench run --frameworks express --memory-sizes 256

    # Show which functions the stack outputs resolve to
    lambench outputs --skip-deploy";

#[derive(Parser, Debug)]
#[command(author = crate_authors!(", "), version, about = crate_description!(), long_about = None, after_help = USAGE_EXAMPLES)]
pub struct CliArgs {
    /// Increase logging verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Force cold starts, run the warm load and write reports
    Run {
        #[command(flatten)]
        stack: StackArgs,

        #[command(flatten)]
        bench: BenchArgs,
    },

    /// Print the functions discovered from the deployment outputs
    Outputs {
        #[command(flatten)]
        stack: StackArgs,
    },

    /// Generate shell completion script
    #[command(name = "generate-completions", hide = true)]
    GenerateCompletions {
        /// Shell for which to generate completions
        #[arg(value_enum)]
        shell: ClapShell,
    },
}

/// Where the deployed functions come from.
#[derive(Args, Debug, Clone)]
pub struct StackArgs {
    /// AWS region of the deployed stack
    #[arg(long, env = "AWS_REGION", default_value = "ap-southeast-1")]
    pub region: String,

    /// Memory sizes in MB, comma separated
    #[arg(long = "memory-sizes", env = "MEM_SIZES", value_delimiter = ',', default_value = "512,1024")]
    pub memory_sizes: Vec<u32>,

    /// Frameworks to benchmark, comma separated
    #[arg(long, env = "FRAMEWORKS", value_delimiter = ',', default_value = "fastify,express,nest")]
    pub frameworks: Vec<String>,

    /// Logical stack name inside the outputs file
    #[arg(long = "stack-name", env = "STACK_NAME", default_value = "LambdaBenchStack")]
    pub stack_name: String,

    /// Directory containing the CDK app
    #[arg(long = "infra-dir", env = "INFRA_DIR", default_value = "infra")]
    pub infra_dir: PathBuf,

    /// Outputs file written by `cdk deploy`, relative to the infra directory
    #[arg(long = "outputs-file", env = "CDK_OUTPUTS_FILE", default_value = "cdk-outputs.json")]
    pub outputs_file: String,

    /// Read the existing outputs file instead of deploying first
    #[arg(long = "skip-deploy", env = "SKIP_DEPLOY")]
    pub skip_deploy: bool,
}

impl StackArgs {
    pub fn outputs_path(&self) -> PathBuf {
        self.infra_dir.join(&self.outputs_file)
    }

    pub fn frameworks(&self) -> Vec<String> {
        self.frameworks
            .iter()
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty())
            .collect()
    }
}

/// Load shape and output locations of a run.
#[derive(Args, Debug, Clone)]
pub struct BenchArgs {
    /// Cold starts forced per function
    #[arg(long = "cold-runs", env = "COLD_START_RUNS", default_value_t = 10)]
    pub cold_runs: u32,

    /// Warm phase duration in seconds
    #[arg(long = "warm-duration", env = "WARM_DURATION_SEC", default_value_t = 120)]
    pub warm_duration: u64,

    /// Warm phase arrival rate (new virtual users per second)
    #[arg(long = "arrival-rate", env = "ARRIVAL_RATE", default_value_t = 10)]
    pub arrival_rate: u32,

    /// Load-test template with {{target}}, {{duration}} and {{arrivalRate}} placeholders
    #[arg(long, env = "ARTILLERY_TEMPLATE", default_value = "bench/artillery.yml")]
    pub template: PathBuf,

    /// Where the filled-in load-test config is written
    #[arg(long = "load-config", env = "ARTILLERY_CONFIG", default_value = "bench/.tmp-artillery.yml")]
    pub load_config: PathBuf,

    /// Load generator command; the config path is appended
    #[arg(long = "load-command", env = "LOAD_COMMAND", value_delimiter = ' ', default_value = "npx artillery run")]
    pub load_command: Vec<String>,

    /// Path requested for the first-hit measurement
    #[arg(long = "health-path", env = "HEALTH_PATH", default_value = "/health")]
    pub health_path: String,

    /// How far back, in seconds, to search the logs for Init Duration
    #[arg(long = "log-lookback", env = "LOG_LOOKBACK_SEC", default_value_t = 300)]
    pub log_lookback: u64,

    /// Directory for the JSON and Markdown reports
    #[arg(long = "reports-dir", env = "REPORTS_DIR", default_value = "reports")]
    pub reports_dir: PathBuf,

    /// Only print the final summary table
    #[arg(short, long)]
    pub quiet: bool,
}

impl BenchArgs {
    pub fn validate(&self) -> Result<()> {
        if self.cold_runs == 0 {
            return Err(anyhow!("--cold-runs must be at least 1"));
        }
        if self.arrival_rate == 0 {
            return Err(anyhow!("--arrival-rate must be at least 1"));
        }
        if self.load_command.iter().all(|s| s.trim().is_empty()) {
            return Err(anyhow!("--load-command cannot be empty"));
        }
        Ok(())
    }
}
