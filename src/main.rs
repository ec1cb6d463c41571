//! officelm - cache store maintenance CLI
//!
//! Inspect and maintain the cache database used by the Office LLM backend.

use clap::{Parser, Subcommand};
use officelm::cache::{CacheManager, StoredContent, DEFAULT_SUMMARY_TYPE};
use officelm::config::{validate_config_result, CacheConfig};
use officelm::{CacheError, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

/// officelm - persistent cache for LLM and embedding results
#[derive(Parser, Debug)]
#[command(name = "officelm")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: ~/.config/officelm/config.yaml)
    #[arg(short, long, env = "OFFICELM_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Database file, overriding the config file
    #[arg(long, env = "CACHE_DB_PATH", global = true)]
    db_path: Option<PathBuf>,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a default configuration file
    Init,

    /// Show entry counts and expiry backlog
    Stats,

    /// Delete expired cache entries
    Sweep,

    /// Shrink the cache to a maximum number of entries
    Evict {
        /// Entry limit (default: max_entries from config)
        #[arg(short, long)]
        max: Option<usize>,
    },

    /// Read a cache entry
    Get {
        key: String,
    },

    /// Write a cache entry. VALUE is parsed as JSON when possible.
    Set {
        key: String,
        value: String,

        /// TTL in seconds (default: default_ttl_secs from config)
        #[arg(short, long)]
        ttl: Option<u64>,

        /// JSON metadata stored alongside the value
        #[arg(short, long)]
        metadata: Option<String>,

        /// Store VALUE as a string even if it is valid JSON
        #[arg(long)]
        raw: bool,
    },

    /// Delete a cache entry
    Delete {
        key: String,
    },

    /// List keys of unexpired entries
    Keys,

    /// Print the derived key for the given parts
    Key {
        #[arg(required = true)]
        parts: Vec<String>,
    },

    /// Manage context layers
    #[command(subcommand)]
    Layer(LayerCommands),

    /// Manage document summaries
    #[command(subcommand)]
    Summary(SummaryCommands),

    /// Delete all context layers and summaries of a document
    Purge {
        document_id: String,
    },
}

#[derive(Subcommand, Debug)]
enum LayerCommands {
    /// Save a layer, replacing any existing one of the same type
    Save {
        document_id: String,
        /// Layer type (local, section, global, ...)
        layer_type: String,
        content: String,
        #[arg(short, long)]
        metadata: Option<String>,
    },

    /// Show one layer
    Get {
        document_id: String,
        layer_type: String,
    },

    /// Show all layers of a document
    List {
        document_id: String,
    },
}

#[derive(Subcommand, Debug)]
enum SummaryCommands {
    /// Save a summary
    Save {
        document_id: String,
        content: String,
        #[arg(short = 't', long = "type", default_value = DEFAULT_SUMMARY_TYPE)]
        summary_type: String,
        #[arg(short, long)]
        metadata: Option<String>,
    },

    /// Show a summary
    Get {
        document_id: String,
        #[arg(short = 't', long = "type", default_value = DEFAULT_SUMMARY_TYPE)]
        summary_type: String,
    },
}

fn main() {
    if let Err(e) = officelm::logging::init() {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let Cli {
        config,
        db_path,
        json,
        command,
    } = cli;
    let open = || open_cache(config.as_deref(), db_path.clone());

    match command {
        Commands::Init => handle_init_command(config.as_deref())?,

        // Key derivation does not need the database
        Commands::Key { parts } => println!("{}", officelm::cache::generate_key(&parts)),

        Commands::Stats => {
            let cache = open()?;
            let stats = cache
                .get_stats()
                .ok_or_else(|| CacheError::Storage("Failed to read cache statistics".to_string()))?;

            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("Cache: {}", cache.path().display());
                println!();
                println!("  Cache entries:    {}", stats.cache_entries);
                println!("  Expired entries:  {}", stats.expired_entries);
                println!("  Context layers:   {}", stats.context_layers);
                println!("  Summaries:        {}", stats.summaries);
                println!("  Soft limit:       {}", cache.config().max_entries);
            }
        }

        Commands::Sweep => {
            let removed = open()?.clear_expired();
            println!("Removed {} expired entries", removed);
        }

        Commands::Evict { max } => {
            let cache = open()?;
            let removed = cache.evict_to(max.unwrap_or(cache.config().max_entries));
            println!("Removed {} entries", removed);
        }

        Commands::Get { key } => match open()?.get(&key) {
            Some(value) => print_value(&value, json)?,
            None => {
                return Err(CacheError::Other(format!("No live entry for key: {}", key)));
            }
        },

        Commands::Set {
            key,
            value,
            ttl,
            metadata,
            raw,
        } => {
            let value = if raw {
                Value::String(value)
            } else {
                serde_json::from_str(&value).unwrap_or(Value::String(value))
            };
            let metadata = parse_metadata(metadata.as_deref())?;
            let cache = open()?;
            if !cache.set(&key, &value, metadata.as_ref(), ttl.map(Duration::from_secs)) {
                return Err(CacheError::Storage(format!("Failed to cache key: {}", key)));
            }
            println!("Cached {}", key);
        }

        Commands::Delete { key } => {
            if !open()?.delete(&key) {
                return Err(CacheError::Storage(format!("Failed to delete key: {}", key)));
            }
            println!("Deleted {}", key);
        }

        Commands::Keys => {
            let keys = open()?.keys();
            if json {
                println!("{}", serde_json::to_string_pretty(&keys)?);
            } else {
                for key in keys {
                    println!("{}", key);
                }
            }
        }

        Commands::Layer(cmd) => handle_layer_command(&open()?, cmd, json)?,

        Commands::Summary(cmd) => handle_summary_command(&open()?, cmd, json)?,

        Commands::Purge { document_id } => {
            if !open()?.purge_document(&document_id) {
                return Err(CacheError::Storage(format!(
                    "Failed to purge document: {}",
                    document_id
                )));
            }
            println!("Purged layers and summaries of {}", document_id);
        }
    }

    Ok(())
}

/// Resolve configuration (file, then environment, then `--db-path`) and open the cache
fn open_cache(config_path: Option<&Path>, db_path: Option<PathBuf>) -> Result<CacheManager> {
    let mut config = match config_path {
        Some(path) => CacheConfig::load(path)?.apply_env_overrides()?,
        None => CacheConfig::load_default()?,
    };
    if let Some(db_path) = db_path {
        config.path = db_path;
    }
    validate_config_result(&config)?;

    CacheManager::open(config)
}

fn handle_init_command(config_path: Option<&Path>) -> Result<()> {
    let config_file = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(CacheConfig::default_path);

    if config_file.exists() {
        println!("Configuration already exists at {}", config_file.display());
        return Ok(());
    }

    let config = CacheConfig::default();
    config.save(&config_file)?;

    println!("✓ Created configuration at {}", config_file.display());
    println!("  Cache database: {}", config.path.display());
    println!("  Default TTL:    {}s", config.default_ttl_secs);

    Ok(())
}

fn handle_layer_command(cache: &CacheManager, cmd: LayerCommands, json: bool) -> Result<()> {
    match cmd {
        LayerCommands::Save {
            document_id,
            layer_type,
            content,
            metadata,
        } => {
            let metadata = parse_metadata(metadata.as_deref())?;
            if !cache.save_context_layer(&document_id, &layer_type, &content, metadata.as_ref()) {
                return Err(CacheError::Storage(format!(
                    "Failed to save {} layer for {}",
                    layer_type, document_id
                )));
            }
            println!("Saved {} layer for {}", layer_type, document_id);
        }

        LayerCommands::Get {
            document_id,
            layer_type,
        } => {
            let layer = cache.get_context_layer(&document_id, &layer_type).ok_or_else(|| {
                CacheError::Other(format!("No {} layer for {}", layer_type, document_id))
            })?;
            print_content(&layer_type, &layer, json)?;
        }

        LayerCommands::List { document_id } => {
            let layers = cache.get_all_layers(&document_id);
            if json {
                println!("{}", serde_json::to_string_pretty(&layers)?);
            } else if layers.is_empty() {
                println!("No layers stored for {}", document_id);
            } else {
                for (layer_type, layer) in &layers {
                    print_content(layer_type, layer, false)?;
                }
            }
        }
    }

    Ok(())
}

fn handle_summary_command(cache: &CacheManager, cmd: SummaryCommands, json: bool) -> Result<()> {
    match cmd {
        SummaryCommands::Save {
            document_id,
            content,
            summary_type,
            metadata,
        } => {
            let metadata = parse_metadata(metadata.as_deref())?;
            if !cache.save_summary(&document_id, &summary_type, &content, metadata.as_ref()) {
                return Err(CacheError::Storage(format!(
                    "Failed to save {} summary for {}",
                    summary_type, document_id
                )));
            }
            println!("Saved {} summary for {}", summary_type, document_id);
        }

        SummaryCommands::Get {
            document_id,
            summary_type,
        } => {
            let summary = cache.get_summary(&document_id, &summary_type).ok_or_else(|| {
                CacheError::Other(format!("No {} summary for {}", summary_type, document_id))
            })?;
            print_content(&summary_type, &summary, json)?;
        }
    }

    Ok(())
}

fn parse_metadata(metadata: Option<&str>) -> Result<Option<Value>> {
    metadata
        .map(|m| {
            serde_json::from_str(m)
                .map_err(|e| CacheError::Parse(format!("Invalid metadata JSON: {}", e)))
        })
        .transpose()
}

fn print_value(value: &Value, json: bool) -> Result<()> {
    match value {
        Value::String(s) if !json => println!("{}", s),
        other => println!("{}", serde_json::to_string_pretty(other)?),
    }
    Ok(())
}

fn print_content(kind: &str, stored: &StoredContent, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(stored)?);
        return Ok(());
    }

    println!("[{}] updated {}", kind, stored.updated_at.to_rfc3339());
    if stored.metadata.as_object().is_some_and(|m| !m.is_empty()) {
        println!("  metadata: {}", stored.metadata);
    }
    println!("{}", stored.content);
    println!();
    Ok(())
}
