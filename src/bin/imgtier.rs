use clap::{Parser, Subcommand};
use imgtier::cache::{CacheConfig, ImageCache, derive_key};
use imgtier::errors::CacheError;
use imgtier::logger;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "imgtier", version, about = "Inspect and maintain an imgtier image cache")]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Cache directory (overrides config and IMGTIER_CACHE_DIR)
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,
    /// Log level: off|error|warn|info|debug|trace
    #[arg(long, global = true)]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the cache key derived from an identifier
    Key { identifier: String },
    /// Show cache statistics
    Stats {
        #[arg(long)]
        json: bool,
    },
    /// Print bytes used on disk
    Size,
    /// Remove every cached image
    Clear,
    /// Run maintenance sweeps (both when no flag is given)
    Sweep {
        #[arg(long)]
        expired: bool,
        #[arg(long)]
        quota: bool,
    },
    /// Store an image file under an identifier
    Put { identifier: String, file: PathBuf },
    /// Write the cached image for an identifier to a file
    Get { identifier: String, out: PathBuf },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), CacheError> {
    if let Some(level) = cli.log_level.as_deref() {
        let dir = std::env::var("IMGTIER_LOG_DIR").ok().map(PathBuf::from);
        logger::configure_logging(dir.as_deref(), Some(level), None, false)?;
    } else if std::env::var_os("IMGTIER_LOG_DIR").is_some() {
        logger::configure_from_env()?;
    }

    if let Command::Key { identifier } = &cli.command {
        println!("{}", derive_key(identifier));
        return Ok(());
    }

    let mut config = CacheConfig::load(cli.config.as_deref())?;
    if let Some(dir) = cli.cache_dir {
        config.cache_dir = dir;
    }
    // One-shot commands sweep explicitly.
    config.expiry_sweep_on_open = false;
    let cache = ImageCache::open(config)?;

    match cli.command {
        Command::Key { .. } => {}
        Command::Stats { json } => {
            let stats = cache.statistics().await;
            if json {
                let out = serde_json::json!({
                    "device_class": cache.device_class(),
                    "cache_dir": cache.cache_dir().display().to_string(),
                    "statistics": stats,
                });
                let text = serde_json::to_string_pretty(&out)
                    .map_err(|e| CacheError::Encode(e.to_string()))?;
                println!("{text}");
            } else {
                println!("cache dir:      {}", cache.cache_dir().display());
                println!("device class:   {:?} ({:.2} GiB)", cache.device_class(), stats.device_memory_gb);
                println!("disk:           {} / {} bytes", stats.disk_used_bytes, stats.disk_max_bytes);
                println!(
                    "memory:         {} / {} bytes, {} / {} entries",
                    stats.memory_used_bytes,
                    stats.memory_max_bytes,
                    stats.memory_entries,
                    stats.memory_entry_limit
                );
            }
        }
        Command::Size => println!("{}", cache.cache_size().await),
        Command::Clear => {
            cache.clear_all();
            println!("cleared {}", cache.cache_dir().display());
        }
        Command::Sweep { expired, quota } => {
            let both = !expired && !quota;
            if expired || both {
                let r = cache.sweep_expired().await;
                println!("expired: removed {} of {} ({} bytes)", r.removed, r.scanned, r.freed_bytes);
            }
            if quota || both {
                let r = cache.sweep_quota().await;
                println!("quota:   removed {} of {}, {} bytes remain", r.removed, r.scanned, r.remaining_bytes);
            }
        }
        Command::Put { identifier, file } => {
            let bytes = tokio::fs::read(&file).await?;
            let image = cache.codec().decode(&bytes)?;
            cache.set(&identifier, image);
            cache.flush().await;
            println!("{}", derive_key(&identifier));
        }
        Command::Get { identifier, out } => {
            let Some(image) = cache.get_async(&identifier).await else {
                return Err(CacheError::Config(format!("no cached image for '{identifier}'")));
            };
            image.as_dynamic().save(&out).map_err(|e| CacheError::Encode(e.to_string()))?;
            println!("{}x{} -> {}", image.width(), image.height(), out.display());
        }
    }
    Ok(())
}
