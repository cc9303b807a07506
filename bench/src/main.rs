//! Benchmark runner that prints the formatted report.
//!
//! `run` (the default) measures a PostgreSQL database that already holds both
//! schemas. `demo` builds an in-memory SQLite database from the synthetic
//! fixture and measures that instead, which needs no server at all.
//!
//! Connection settings come from `AUDIENCE_*` environment variables (a `.env`
//! file is honoured). Each flag below is bound to its variable, so `--help`
//! lists both, and a flag given on the command line wins for that run.
//!
//! Usage:
//!   cargo run --release
//!   cargo run --release -- --target-users 200000000 --samples 5
//!   cargo run --release -- demo --users 100000

use audience_bench::fixture::{generate_users, FixtureParams};
use audience_bench::harness;
use audience_bench::report::print_report;
use audience_bench::store::postgres::PgStore;
use audience_bench::store::sqlite::SqliteStore;
use audience_bench::store::Store;
use audience_core::config::BenchConfig;
use clap::{Parser, Subcommand};
use std::process;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "audience-bench")]
#[command(about = "Compare audience count latency on the EAV and denormalized schemas")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Database host
    #[arg(long, global = true, env = "AUDIENCE_DB_HOST")]
    host: Option<String>,
    /// Database port
    #[arg(long, global = true, env = "AUDIENCE_DB_PORT")]
    port: Option<u16>,
    /// Database user (the password is read from AUDIENCE_DB_PASSWORD only)
    #[arg(long, global = true, env = "AUDIENCE_DB_USER")]
    user: Option<String>,
    /// Database name
    #[arg(long, global = true, env = "AUDIENCE_DB_NAME")]
    dbname: Option<String>,
    /// User count the measured latency is projected to
    #[arg(long, global = true, env = "AUDIENCE_TARGET_USERS")]
    target_users: Option<u64>,
    /// Latency budget in milliseconds
    #[arg(long, global = true, env = "AUDIENCE_BUDGET_MS")]
    budget_ms: Option<u64>,
    /// Per-query deadline in milliseconds
    #[arg(long, global = true, env = "AUDIENCE_QUERY_TIMEOUT_MS")]
    query_timeout_ms: Option<u64>,
    /// Executions per query; the median is reported
    #[arg(long, global = true, env = "AUDIENCE_SAMPLES")]
    samples: Option<usize>,
}

#[derive(Subcommand)]
enum Command {
    /// Benchmark the configured PostgreSQL database
    Run,
    /// Benchmark an in-memory SQLite database filled with synthetic users
    Demo {
        /// Number of synthetic users
        #[arg(long, default_value_t = 100_000)]
        users: usize,
    },
}

impl Cli {
    fn apply(&self, config: &mut BenchConfig) {
        if let Some(host) = &self.host {
            config.db.host = host.clone();
        }
        if let Some(port) = self.port {
            config.db.port = port;
        }
        if let Some(user) = &self.user {
            config.db.user = user.clone();
        }
        if let Some(dbname) = &self.dbname {
            config.db.dbname = dbname.clone();
        }
        if let Some(target) = self.target_users {
            config.bench.target_users = target;
        }
        if let Some(ms) = self.budget_ms {
            config.bench.latency_budget = Duration::from_millis(ms);
        }
        if let Some(ms) = self.query_timeout_ms {
            config.bench.query_timeout = Some(Duration::from_millis(ms));
        }
        if let Some(samples) = self.samples {
            config.bench.samples = samples;
        }
    }
}

async fn run_and_print(store: &dyn Store, config: &BenchConfig) -> anyhow::Result<()> {
    let report = harness::run(store, &config.bench, &config.schema).await?;
    print_report(&report)?;
    Ok(())
}

#[tokio::main]
async fn main() {
    // Loads `.env` too, so the flags' environment fallbacks see it.
    let mut config = match BenchConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Invalid configuration: {err}");
            process::exit(2);
        }
    };
    let cli = Cli::parse();
    cli.apply(&mut config);
    if let Err(err) = config.validate() {
        eprintln!("Invalid configuration: {err}");
        process::exit(2);
    }

    if let Err(err) = audience_core::initialize_logger(config.log.level, config.log.file.as_deref()) {
        eprintln!("Failed to initialize logger: {err:#}. Exiting.");
        process::exit(1);
    }

    let result = match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            log::info!(
                "Connecting to {}@{}:{}/{}",
                config.db.user,
                config.db.host,
                config.db.port,
                config.db.dbname
            );
            let store = match PgStore::connect(&config.db, &config.pool).await {
                Ok(store) => store,
                Err(err) => {
                    log::error!("Failed to connect to database: {err}");
                    process::exit(1);
                }
            };
            run_and_print(&store, &config).await
        }
        Command::Demo { users } => {
            log::info!("Generating {users} synthetic users...");
            let profiles = generate_users(&FixtureParams::with_users(users));
            let store = match SqliteStore::with_fixture(&config.schema, &profiles) {
                Ok(store) => store,
                Err(err) => {
                    log::error!("Failed to build demo database: {err}");
                    process::exit(1);
                }
            };
            run_and_print(&store, &config).await
        }
    };

    if let Err(err) = result {
        log::error!("{err:#}");
        process::exit(1);
    }
}
