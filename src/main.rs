//! Kneader CLI
//!
//! A command-line front end for the kneader worker.
//!
//! # Commands
//!
//! - `serve` - Run a worker session over stdin/stdout JSON lines
//! - `search` - Run a single search and print the outcome
//! - `verify` - Recompute the hash for a level and nonce
//! - `benchmark` - Measure raw kneading throughput

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use tokio::io::BufReader;
use tracing::debug;

use kneader::engine::{
    self, ClockSeed, Difficulty, Kneader, SearchControl, SearchRequest, SeedStrategy,
};
use kneader::logging::{init_logging, LogFormat};
use kneader::protocol::HashFound;
use kneader::serve::serve;
use kneader::session::SessionConfig;
use kneader::KneaderConfig;

#[derive(Parser)]
#[command(name = "kneader")]
#[command(version = "0.1.0")]
#[command(about = "Bounded-time proof-of-work worker for Michelson-packed level secrets")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: <config dir>/kneader/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter, overrides the config file
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log format, overrides the config file
    #[arg(long, global = true, value_enum)]
    log_format: Option<LogFormat>,
}

#[derive(Subcommand)]
enum Commands {
    /// Read commands from stdin and write hash-found events to stdout
    Serve,

    /// Search for a nonce meeting a difficulty
    Search {
        /// Level multiplied into every secret
        #[arg(allow_hyphen_values = true)]
        level: i64,

        /// Difficulty length in bytes
        #[arg(short, long)]
        length: usize,

        /// Required hex prefix of the hash
        #[arg(short, long, default_value = "")]
        prefix: String,

        /// Starting nonce (default: seeded from the clock)
        #[arg(short, long)]
        nonce: Option<u64>,

        /// Time budget in seconds, 0 = unbounded (default: from config)
        #[arg(short, long)]
        time_budget: Option<u64>,
    },

    /// Show the packed secret and hash for a level and nonce
    Verify {
        #[arg(allow_hyphen_values = true)]
        level: i64,

        nonce: u64,

        /// Hex prefix to check the hash against
        #[arg(short, long)]
        prefix: Option<String>,
    },

    /// Run performance benchmark
    Benchmark {
        /// Number of nonces to hash
        #[arg(short, long, default_value = "100000")]
        count: u64,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = KneaderConfig::load(cli.config.as_deref())
        .map_err(anyhow::Error::from)
        .and_then(|config| {
            let log_level = cli.log_level.as_deref().unwrap_or(&config.log_level);
            let log_format = cli.log_format.unwrap_or(config.log_format);
            init_logging(log_format, log_level)?;
            debug!(?config, "Configuration loaded");

            match cli.command {
                Commands::Serve => cmd_serve(config.session_config()),
                Commands::Search {
                    level,
                    length,
                    prefix,
                    nonce,
                    time_budget,
                } => {
                    let budget = match time_budget {
                        Some(0) => None,
                        Some(secs) => Some(Duration::from_secs(secs)),
                        None => config.time_budget(),
                    };
                    cmd_search(level, length, &prefix, nonce, budget, config.check_interval)
                }
                Commands::Verify {
                    level,
                    nonce,
                    prefix,
                } => cmd_verify(level, nonce, prefix.as_deref()),
                Commands::Benchmark { count } => cmd_benchmark(count),
            }
        });

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn cmd_serve(config: SessionConfig) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(serve(
        config,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    ))
}

fn cmd_search(
    level: i64,
    length: usize,
    prefix: &str,
    nonce: Option<u64>,
    budget: Option<Duration>,
    check_interval: u64,
) -> anyhow::Result<()> {
    let difficulty = Difficulty::new(length, prefix)?;
    let request = SearchRequest::new(level, difficulty);
    let kneader = Kneader::new().with_check_interval(check_interval);
    let start_nonce = nonce.unwrap_or_else(|| ClockSeed.start_nonce(level));

    println!("Kneading level {} from nonce {}...", level, start_nonce);
    match budget {
        Some(budget) => println!("Time budget: {}s", budget.as_secs_f64()),
        None => println!("Time budget: unbounded"),
    }

    let start = Instant::now();
    let result = kneader.search(&request, start_nonce, budget, &SearchControl::new())?;
    let elapsed = start.elapsed();

    println!();
    match (&result.hash, result.nonce) {
        (Some(hash), Some(nonce)) => {
            println!("Found valid hash!");
            println!("Hash: {}", hash);
            println!("Nonce: {}", nonce);
        }
        _ => println!("No hash found within the time budget."),
    }
    println!("Hashes computed: {}", result.attempts);
    println!("Time elapsed: {:.2}s", elapsed.as_secs_f64());
    println!("{}", serde_json::to_string(&HashFound::from(result))?);

    Ok(())
}

fn cmd_verify(level: i64, nonce: u64, prefix: Option<&str>) -> anyhow::Result<()> {
    let secret = i128::from(level) * i128::from(nonce);
    let kneader = Kneader::new();
    let hash = kneader.hash_hex(level, nonce)?;

    println!("Secret: {}", secret);
    println!("Packed: {}", hex::encode(engine::pack_int(secret)));
    println!("Hash:   {}", hash);

    if let Some(prefix) = prefix {
        let difficulty = Difficulty::new(prefix.len() / 2, prefix)?;
        if !difficulty.matches_hex(&hash) {
            anyhow::bail!("hash does not start with {}", difficulty.sub_bytes());
        }
        println!("Meets difficulty: {}", difficulty.sub_bytes());
    }

    Ok(())
}

fn cmd_benchmark(count: u64) -> anyhow::Result<()> {
    println!("Running benchmark with {} nonces...", count);

    let kneader = Kneader::new();
    let mut buf = Vec::with_capacity(16);
    let level = 7;

    let start = Instant::now();
    for nonce in 0..count {
        let _ = kneader.digest(level, nonce, &mut buf)?;
    }
    let elapsed = start.elapsed();
    let hashrate = count as f64 / elapsed.as_secs_f64();

    println!("\nResults:");
    println!("  Total hashes: {}", count);
    println!("  Time elapsed: {:.2}s", elapsed.as_secs_f64());
    println!("  Hashrate: {:.2} H/s", hashrate);

    println!("\nSearch parameters:");
    println!("  Seed range: 0..{}", engine::NONCE_RANGE);
    println!("  Default time budget: {}s", engine::DEFAULT_TIME_BUDGET_SECS);
    println!("  Clock check interval: {} nonces", engine::DEFAULT_CHECK_INTERVAL);
    // A one-byte prefix matches once per 256 nonces on average.
    println!("  Expected time for a one-byte prefix: {:.3}s", 256.0 / hashrate);

    Ok(())
}
