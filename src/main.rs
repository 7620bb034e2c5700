use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use shardgate::{
    Cluster, FingerprintDeriver, IdGenerator, MySqlConnector, RedisStore, Settings,
    SnowflakeIdGenerator,
};
use shardgate::routing::DEFAULT_MAX_DIGITS;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "shardgate")]
#[command(about = "Shard routing, distributed locks and ids for sharded MySQL")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the routing fingerprint of each input
    Fingerprint {
        inputs: Vec<String>,
        #[arg(long, default_value_t = DEFAULT_MAX_DIGITS)]
        digits: usize,
    },
    /// Print the shard each input lands on, without connecting
    Route {
        inputs: Vec<String>,
        #[arg(long)]
        shards: u32,
        #[arg(long, default_value_t = DEFAULT_MAX_DIGITS)]
        digits: usize,
    },
    /// Validate a settings file and list the shards it describes
    CheckConfig {
        #[arg(long)]
        config: PathBuf,
    },
    /// Connect to every shard and the lock store, then query each shard
    Probe {
        #[arg(long)]
        config: PathBuf,
    },
    /// Try to take a named lock
    Lock {
        name: String,
        #[arg(long)]
        config: PathBuf,
        #[arg(long, default_value_t = 30)]
        ttl_secs: u64,
    },
    /// Release a named lock, whoever holds it
    Unlock {
        name: String,
        #[arg(long)]
        config: PathBuf,
    },
    /// Generate snowflake ids
    Ids {
        #[arg(long, default_value_t = 0)]
        worker: i64,
        #[arg(long, default_value_t = 1)]
        count: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Fingerprint { inputs, digits } => print_fingerprints(&inputs, digits),
        Command::Route {
            inputs,
            shards,
            digits,
        } => print_routes(&inputs, shards, digits),
        Command::CheckConfig { config } => check_config(&config),
        Command::Probe { config } => probe(&config).await,
        Command::Lock {
            name,
            config,
            ttl_secs,
        } => {
            let cluster = connect(&config).await?;
            let acquired = cluster
                .try_lock(&name, Duration::from_secs(ttl_secs))
                .await;
            println!("{}: {}", name, if acquired { "acquired" } else { "busy" });
            Ok(())
        }
        Command::Unlock { name, config } => {
            let cluster = connect(&config).await?;
            let released = cluster.unlock(&name).await;
            println!("{}: {}", name, if released { "released" } else { "not held" });
            Ok(())
        }
        Command::Ids { worker, count } => {
            let ids = SnowflakeIdGenerator::new(worker)?;
            for _ in 0..count {
                println!("{}", ids.next_id()?);
            }
            Ok(())
        }
    }
}

fn print_fingerprints(inputs: &[String], digits: usize) -> Result<()> {
    let deriver = FingerprintDeriver::new(digits)?;
    for input in inputs {
        let fingerprint = deriver
            .derive(input)
            .with_context(|| format!("fingerprinting '{}'", input))?;
        println!("{}\t{}", input, fingerprint);
    }
    Ok(())
}

fn print_routes(inputs: &[String], shards: u32, digits: usize) -> Result<()> {
    let deriver = FingerprintDeriver::new(digits)?;
    for input in inputs {
        let fingerprint = deriver
            .derive(input)
            .with_context(|| format!("fingerprinting '{}'", input))?;
        let shard = fingerprint
            .shard_index(shards)
            .ok_or_else(|| anyhow!("--shards must be at least 1"))?;
        println!("{}\t{}", input, shard);
    }
    Ok(())
}

fn check_config(path: &Path) -> Result<()> {
    let settings = Settings::from_file(path)
        .with_context(|| format!("loading {}", path.display()))?;
    for index in settings.shards.hosts.keys() {
        if let Some(url) = settings.shards.redacted_url(*index) {
            println!("shard {}\t{}", index, url);
        }
    }
    println!("kv\t{}", settings.kv.host);
    Ok(())
}

async fn connect(path: &Path) -> Result<Cluster<MySqlConnector, RedisStore>> {
    let settings = Settings::from_file(path)
        .with_context(|| format!("loading {}", path.display()))?;
    Cluster::connect(settings)
        .await
        .context("cluster startup failed")
}

async fn probe(path: &Path) -> Result<()> {
    let cluster = connect(path).await?;

    let gathered = cluster
        .router()
        .scatter_gather(|shard, pool| async move {
            sqlx::query_scalar::<_, i64>("SELECT 1")
                .fetch_one(pool)
                .await
                .map(|one| vec![(shard, one)])
        })
        .await;

    for (shard, _) in gathered.rows() {
        println!("shard {}\tok", shard);
    }
    for shard in gathered.failed_shards() {
        println!("shard {}\tfailed", shard);
    }

    let (_, first_error) = gathered.into_result();
    match first_error {
        Some(e) => Err(anyhow!("probe failed: {}", e)),
        None => {
            println!("next id\t{}", cluster.next_id()?);
            Ok(())
        }
    }
}
