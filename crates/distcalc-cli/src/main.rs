//! # Distcalc CLI Entry Point
//!
//! ## Usage
//!
//! ```bash
//! # Start an orchestrator with two API keys
//! distcalc orchestrator -b 0.0.0.0:8080 --api-key alice:s3cret --api-key bob:hunter2
//!
//! # Start a worker with 4 compute loops and fast additions
//! distcalc worker -o http://127.0.0.1:8080 -c 4 --time-addition-ms 100
//!
//! # Submit an expression (prints the stored task as raw JSON)
//! distcalc submit http://127.0.0.1:8080 --id 1 "2+2*2"
//!
//! # Fetch one task, or every task
//! distcalc get http://127.0.0.1:8080 --id 1
//! distcalc get http://127.0.0.1:8080 | jq '.[].status'
//! ```
//!
//! Worker settings are read from `COMPUTING_POWER`, `POLL_INTERVAL_MS`,
//! `TIME_ADDITION_MS`, `TIME_SUBTRACTION_MS`, `TIME_MULTIPLICATIONS_MS` and
//! `TIME_DIVISIONS_MS`; flags win over the environment.

use anyhow::Result;
use argh::FromArgs;
use distcalc_cli::commands::{self, WorkerOverrides};
use distcalc_worker::WorkerConfig;

#[derive(FromArgs)]
/// Distcalc - distributed arithmetic expression calculator
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Orchestrator(OrchestratorArgs),
    Worker(WorkerArgs),
    Submit(SubmitArgs),
    Get(GetArgs),
}

/// Arguments for starting an orchestrator.
///
/// The orchestrator validates submitted expressions, splits them into
/// independent subtasks, serves those to workers and folds results back in
/// until each task finishes.
#[derive(FromArgs)]
#[argh(subcommand, name = "orchestrator")]
/// start a distcalc orchestrator
struct OrchestratorArgs {
    /// address to bind the HTTP server to
    ///
    /// Defaults to "0.0.0.0:8080".
    #[argh(option, short = 'b', default = "\"0.0.0.0:8080\".into()")]
    bind: String,

    /// an API key as OWNER:KEY, repeatable
    ///
    /// When at least one is given, public endpoints require a matching
    /// X-API-Key header and tasks are scoped to their owner.
    #[argh(option, long = "api-key")]
    api_keys: Vec<String>,

    /// how long a worker may hold a subtask, in milliseconds (default 60000)
    #[argh(option, long = "lease-timeout-ms")]
    lease_timeout_ms: Option<u64>,

    /// interval between expired-lease sweeps, in milliseconds (default 5000)
    #[argh(option, long = "lease-sweep-ms")]
    lease_sweep_ms: Option<u64>,

    /// never hand an assigned subtask out again
    #[argh(switch, long = "disable-lease")]
    disable_lease: bool,
}

/// Arguments for starting a worker pool.
#[derive(FromArgs)]
#[argh(subcommand, name = "worker")]
/// start a distcalc worker
struct WorkerArgs {
    /// orchestrator URL, e.g. http://127.0.0.1:8080 (plain HTTP only)
    #[argh(option, short = 'o', long = "orchestrator")]
    orchestrator: String,

    /// number of concurrent compute loops
    #[argh(option, short = 'c', long = "computing-power")]
    computing_power: Option<usize>,

    /// wait after an empty pull, in milliseconds
    #[argh(option, long = "poll-interval-ms")]
    poll_interval_ms: Option<u64>,

    /// simulated cost of an addition, in milliseconds
    #[argh(option, long = "time-addition-ms")]
    time_addition_ms: Option<u64>,

    /// simulated cost of a subtraction, in milliseconds
    #[argh(option, long = "time-subtraction-ms")]
    time_subtraction_ms: Option<u64>,

    /// simulated cost of a multiplication, in milliseconds
    #[argh(option, long = "time-multiplication-ms")]
    time_multiplication_ms: Option<u64>,

    /// simulated cost of a division, in milliseconds
    #[argh(option, long = "time-division-ms")]
    time_division_ms: Option<u64>,
}

impl WorkerArgs {
    fn overrides(&self) -> WorkerOverrides {
        WorkerOverrides {
            computing_power: self.computing_power,
            poll_interval_ms: self.poll_interval_ms,
            time_addition_ms: self.time_addition_ms,
            time_subtraction_ms: self.time_subtraction_ms,
            time_multiplication_ms: self.time_multiplication_ms,
            time_division_ms: self.time_division_ms,
        }
    }
}

/// Arguments for submitting one expression.
///
/// Prints the stored task as raw JSON so the output can be piped to `jq`.
#[derive(FromArgs)]
#[argh(subcommand, name = "submit")]
/// submit an expression to an orchestrator
struct SubmitArgs {
    /// orchestrator URL, e.g. http://127.0.0.1:8080 (plain HTTP only)
    #[argh(positional)]
    server_address: String,

    /// task id chosen by the caller
    #[argh(option, long = "id")]
    id: i64,

    /// the infix expression, e.g. "(1+2)*3"
    #[argh(positional)]
    expression: String,

    /// the API key sent as X-API-Key
    #[argh(option, long = "api-key")]
    api_key: Option<String>,
}

/// Arguments for fetching tasks.
#[derive(FromArgs)]
#[argh(subcommand, name = "get")]
/// print one task, or all tasks, as raw JSON
struct GetArgs {
    /// orchestrator URL, e.g. http://127.0.0.1:8080 (plain HTTP only)
    #[argh(positional)]
    server_address: String,

    /// task id; omit to list every visible task
    #[argh(option, long = "id")]
    id: Option<i64>,

    /// the API key sent as X-API-Key
    #[argh(option, long = "api-key")]
    api_key: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // submit and get keep stdout clean for piping
    if matches!(cli.command, Commands::Orchestrator(_) | Commands::Worker(_)) {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    match cli.command {
        Commands::Orchestrator(args) => {
            tracing::info!("Starting distcalc orchestrator on {}", args.bind);
            let auth = commands::auth_from_entries(&args.api_keys)?;
            let lease = commands::lease_config(
                args.lease_timeout_ms,
                args.lease_sweep_ms,
                args.disable_lease,
            )?;
            commands::run_orchestrator(&args.bind, auth, lease).await
        }
        Commands::Worker(args) => {
            let config = args.overrides().apply(WorkerConfig::from_env()?)?;
            tracing::info!("Starting distcalc worker for {}", args.orchestrator);
            commands::run_worker(&args.orchestrator, config).await
        }
        Commands::Submit(args) => {
            let json = commands::submit(
                &args.server_address,
                args.id,
                &args.expression,
                args.api_key,
            )
            .await?;
            println!("{}", json);
            Ok(())
        }
        Commands::Get(args) => {
            let json = commands::get(&args.server_address, args.id, args.api_key).await?;
            println!("{}", json);
            Ok(())
        }
    }
}
