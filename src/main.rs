//! Redis Build Cache
//!
//! Operator command line for the Redis build cache: inspect the configured
//! service, move single artifacts in and out, and read the statistics the
//! cache keeps next to the artifacts.
//!
//! Logs go to stderr so `load` can stream an artifact to stdout.

use anyhow::{bail, Context};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use redis_build_cache::{
    BuildCacheService, BuildCacheSettings, CacheKey, CopyFrom, CopyInto, RedisBuildCachePlugin,
    RedisBuildCacheService, RedisBuildCacheServiceFactory, RedisCacheConfig, ServiceDescription,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Redis Build Cache - remote artifact cache for build tools
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML configuration file
    #[arg(long, env = "BUILD_CACHE_CONFIG")]
    config: Option<PathBuf>,

    /// Redis host
    #[arg(long)]
    host: Option<String>,

    /// Redis port
    #[arg(long)]
    port: Option<u16>,

    /// Redis password
    #[arg(long)]
    password: Option<String>,

    /// Time to live of cached artifacts in minutes
    #[arg(long)]
    ttl: Option<u32>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "warn")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the description of the configured service
    Describe,

    /// Fetch an artifact
    Load {
        /// Artifact fingerprint
        key: String,

        /// Write the artifact here instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Upload an artifact
    Store {
        /// Artifact fingerprint
        key: String,

        /// Read the artifact from here instead of stdin
        #[arg(long, short)]
        input: Option<PathBuf>,
    },

    /// Show the statistics kept in Redis
    Stats {
        #[command(subcommand)]
        scope: StatsScope,
    },

    /// Check that Redis answers
    Ping,
}

#[derive(Subcommand, Debug)]
enum StatsScope {
    /// Totals and per-key counters of one day
    Daily {
        /// Day to report (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Counters and timings of one artifact
    Key {
        /// Artifact fingerprint
        key: String,
    },
}

// =============================================================================
// Main
// =============================================================================

fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    init_logging(&args)?;

    let config = load_config(&args)?;
    info!(version = redis_build_cache::VERSION, config = ?config, "Starting Redis build cache");

    match args.command {
        Command::Describe => {
            let mut description = ServiceDescription::new();
            redis_build_cache::factory::describe(&config, &mut description);
            println!("{}", description);
            Ok(ExitCode::SUCCESS)
        }
        Command::Load { key, output } => {
            let service = remote_service(config)?;
            let key = CacheKey::new(key);
            let outcome = match output {
                Some(path) => {
                    let file = File::create(&path)
                        .with_context(|| format!("Failed to create {}", path.display()))?;
                    service.load(&key, &mut CopyInto(BufWriter::new(file)))
                }
                None => service.load(&key, &mut CopyInto(io::stdout().lock())),
            }
            .with_context(|| format!("Failed to load {}", key))?;
            service.close().context("Failed to close the cache")?;

            if outcome.is_found() {
                Ok(ExitCode::SUCCESS)
            } else {
                eprintln!("{}: not found", key);
                Ok(ExitCode::from(1))
            }
        }
        Command::Store { key, input } => {
            let service = remote_service(config)?;
            let key = CacheKey::new(key);
            match input {
                Some(path) => {
                    let file = File::open(&path)
                        .with_context(|| format!("Failed to open {}", path.display()))?;
                    service.store(&key, &mut CopyFrom(BufReader::new(file)))
                }
                None => service.store(&key, &mut CopyFrom(io::stdin().lock())),
            }
            .with_context(|| format!("Failed to store {}", key))?;
            service.close().context("Failed to close the cache")?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Stats { scope } => {
            let service = direct_service(&config)?;
            let report = match scope {
                StatsScope::Daily { date } => {
                    let date = date.unwrap_or_else(|| Local::now().date_naive());
                    serde_json::to_string_pretty(&service.daily_statistics(date)?)?
                }
                StatsScope::Key { key } => match service.key_statistics(&key)? {
                    Some(stats) => serde_json::to_string_pretty(&stats)?,
                    None => {
                        service.close()?;
                        eprintln!("{}: no statistics", key);
                        return Ok(ExitCode::from(1));
                    }
                },
            };
            service.close()?;
            println!("{}", report);
            Ok(ExitCode::SUCCESS)
        }
        Command::Ping => {
            let service = direct_service(&config)?;
            let alive = service.ping().context("Redis did not answer")?;
            service.close()?;
            if alive {
                println!("PONG");
                Ok(ExitCode::SUCCESS)
            } else {
                bail!("Unexpected reply to PING");
            }
        }
    }
}

// =============================================================================
// Configuration
// =============================================================================

fn load_config(args: &Args) -> anyhow::Result<RedisCacheConfig> {
    let mut config = match &args.config {
        Some(path) => RedisCacheConfig::from_yaml_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => RedisCacheConfig::default(),
    };

    if let Some(host) = &args.host {
        config.host = host.clone();
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(password) = &args.password {
        config.password = Some(password.clone());
    }
    if let Some(ttl) = args.ttl {
        config.time_to_live = ttl;
    }

    Ok(config)
}

/// Service obtained the way the host does, through the plugin registration
fn remote_service(config: RedisCacheConfig) -> anyhow::Result<Box<dyn BuildCacheService>> {
    let mut settings = BuildCacheSettings::new(config);
    RedisBuildCachePlugin.apply(&mut settings);

    let mut description = ServiceDescription::new();
    match settings
        .create_remote_service(&mut description)
        .context("Failed to create the build cache service")?
    {
        Some(service) => Ok(service),
        None => bail!("The remote build cache is disabled"),
    }
}

fn direct_service(config: &RedisCacheConfig) -> anyhow::Result<RedisBuildCacheService> {
    RedisBuildCacheServiceFactory::new()
        .create_service(config, &mut ServiceDescription::new())
        .context("Failed to create the build cache service")
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) -> anyhow::Result<()> {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive("r2d2=warn".parse()?);

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(io::stderr))
            .init();
    }

    Ok(())
}
