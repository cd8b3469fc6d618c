use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use netrecon_ratelimit::store::{MemoryConnector, RedisConnector, StoreClient};
use netrecon_ratelimit::{Decision, FixedWindowLimiter, LimiterConfig, RateLimiterBackend};

/// Operator tool for the NetRecon rate limiter.
#[derive(Debug, Parser)]
#[command(name = "netrecon-ratelimit", version, about)]
struct Cli {
    /// YAML configuration file; NETRECON_RL_* environment variables override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a rate limit check for each identifier, in order
    Check {
        #[arg(required = true)]
        identifiers: Vec<String>,

        /// Use an in-process store instead of Redis
        #[arg(long)]
        memory: bool,

        /// Print decisions as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// Connect to the counter store and report whether it answers
    Ping,
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = LimiterConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Command::Check {
            identifiers,
            memory,
            json,
        } => {
            let limiter: Arc<dyn RateLimiterBackend> = if memory {
                Arc::new(FixedWindowLimiter::new(config, MemoryConnector::default())?)
            } else {
                Arc::new(FixedWindowLimiter::from_config(config)?)
            };

            for identifier in &identifiers {
                let decision = limiter.check(identifier).await;
                if json {
                    println!("{}", serde_json::to_string(&decision)?);
                } else {
                    println!("{}\t{}", identifier, describe(&decision));
                }
            }
        }
        Command::Ping => {
            let client = StoreClient::with_config(RedisConnector::from_config(&config), &config);
            if client.get_connection().await.is_none() {
                bail!("counter store at {} is unavailable", config.redis_url);
            }
            info!(endpoint = %config.redis_url, "Counter store is reachable");
            println!("PONG {}", config.redis_url);
        }
        Command::Config => {
            print!("{}", serde_yaml::to_string(&config)?);
        }
    }

    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn describe(decision: &Decision) -> String {
    match (decision.allowed(), decision.remaining(), decision.retry_after()) {
        (true, Some(remaining), _) => format!("allowed remaining={}", remaining),
        (true, None, _) => "allowed (unmetered)".to_string(),
        (false, _, Some(retry_after)) => format!("denied retry_after={}s", retry_after),
        (false, _, None) => "denied".to_string(),
    }
}
