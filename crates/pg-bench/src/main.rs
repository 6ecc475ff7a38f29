//! Benchmark driver for the async PostgreSQL client.
//!
//! Runs one of seven named scenarios against a live server and reports the
//! request/row throughput as text or JSON. The `--benchmark` flag is a
//! required acknowledgement that the run will hammer the target database.

use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod queries;
mod scenario;
mod stats;

use queries::QueryKind;
use scenario::{RunConfig, Scenario};

#[derive(Debug, Parser)]
#[command(name = "pg-bench", about = "Benchmark driver for the async PostgreSQL client", version)]
struct Args {
    /// Scenario to run.
    #[arg(value_enum)]
    scenario: Option<Scenario>,

    /// Acknowledge that the run will load the target database.
    #[arg(long)]
    benchmark: bool,

    /// Benchmark duration in seconds.
    #[arg(long, default_value_t = 31)]
    duration: u64,

    /// Concurrent tasks per thread.
    #[arg(long, default_value_t = 1)]
    coroutines: u32,

    /// Pool capacity (defaults to --coroutines).
    #[arg(long)]
    connections: Option<u32>,

    /// OS threads, each with its own reactor.
    #[arg(long, default_value_t = 1)]
    threads: u32,

    /// Pool wait-queue capacity; 0 fails immediately when saturated.
    #[arg(long, default_value_t = 0)]
    queue: u32,

    /// Native connection string, passed to the client opaquely.
    #[arg(long, default_value = "")]
    conninfo: String,

    /// Which query to run.
    #[arg(long, value_enum, default_value_t = QueryKind::Simple)]
    query: QueryKind,

    /// Report format.
    #[arg(long, value_enum, default_value_t = Format::Text)]
    format: Format,

    /// Enable debug logging.
    #[arg(long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
#[value(rename_all = "snake_case")]
enum Format {
    Text,
    Json,
}

fn main() {
    let args = Args::parse();

    if args.verbose {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
            )
            .init();
    }

    if !args.benchmark {
        eprintln!("refusing to run without --benchmark; this program loads the target database");
        std::process::exit(-1);
    }
    let Some(scenario) = args.scenario else {
        eprintln!("no scenario given; see --help for the list");
        std::process::exit(-1);
    };

    let config = RunConfig {
        conninfo: args.conninfo,
        query: args.query,
        duration: Duration::from_secs(args.duration),
        coroutines: args.coroutines,
        threads: args.threads,
        connections: args.connections.unwrap_or(args.coroutines),
        queue_capacity: args.queue,
    };

    match scenario::run(scenario, config) {
        Ok(report) => match args.format {
            Format::Text => println!("{report}"),
            Format::Json => match serde_json::to_string_pretty(&report) {
                Ok(json) => println!("{json}"),
                Err(e) => {
                    eprintln!("failed to serialize report: {e}");
                    std::process::exit(-1);
                }
            },
        },
        Err(e) => {
            eprintln!("benchmark failed: {e}");
            std::process::exit(-1);
        }
    }
}
