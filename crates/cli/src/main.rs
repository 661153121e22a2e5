use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tracker::{
    CacheConfig, HttpMetadataSource, MetadataCache, MetadataFilter, Reference, RemoteConfig,
};
use units::Unit;

#[derive(Parser)]
#[command(name = "clinsync")]
#[command(about = "clinsync operator tools")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a measurement value between units
    Convert {
        /// Value to convert
        value: f64,
        /// Source unit (g, kg, oz, lb, cm, m, in, ft)
        from: Unit,
        /// Target unit
        to: Unit,
    },
    /// Resolve a metadata reference against the remote platform
    Lookup {
        /// Reference as kind:value, e.g. code:OU_1234
        reference: Reference,
        /// Bypass the cache and force a remote fetch
        #[arg(long)]
        refreshed: bool,
    },
    /// List metadata records page by page
    Page {
        /// Zero-based offset into the listing
        #[arg(long, default_value_t = 0)]
        offset: u32,
        /// Page size
        #[arg(long, default_value_t = 20)]
        limit: u32,
        /// Exact-match name filter
        #[arg(long)]
        name: Option<String>,
        /// Exact-match code filter
        #[arg(long)]
        code: Option<String>,
    },
    /// Watch the remote change feed and print changed references
    Watch {
        /// Seconds between polls
        #[arg(long, default_value_t = 30)]
        interval: u64,
    },
}

/// Remote connection parameters from the environment, in the same shape
/// the worker binary uses.
fn remote_config_from_env() -> anyhow::Result<RemoteConfig> {
    let base_url =
        std::env::var("CLINSYNC_BASE_URL").context("CLINSYNC_BASE_URL must be set")?;
    let resource_type = std::env::var("CLINSYNC_RESOURCE_TYPE")
        .unwrap_or_else(|_| "trackedEntityTypes".into());
    Ok(RemoteConfig {
        base_url,
        resource_type,
        username: std::env::var("CLINSYNC_USERNAME").ok(),
        password: std::env::var("CLINSYNC_PASSWORD").ok(),
        timeout_secs: 30,
    })
}

fn print_record(record: &tracker::MetadataRecord) {
    println!(
        "ID: {}, Code: {}, Name: {}, Updated: {}",
        record.id,
        record.code.as_deref().unwrap_or("-"),
        record.name,
        record.last_updated
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Convert { value, from, to }) => match units::convert(value, from, to) {
            Ok(converted) => println!("{} {} = {} {}", value, from, converted, to),
            Err(e) => eprintln!("Error converting: {}", e),
        },
        Some(Commands::Lookup {
            reference,
            refreshed,
        }) => {
            let source = Arc::new(HttpMetadataSource::new(remote_config_from_env()?)?);
            let cache = MetadataCache::new(source, CacheConfig::default());
            let found = if refreshed {
                cache.find_refreshed_by_reference(&reference).await?
            } else {
                cache.find_by_reference(&reference).await?
            };
            match found {
                Some(record) => print_record(&record),
                None => println!("No metadata found for {}", reference),
            }
        }
        Some(Commands::Page {
            offset,
            limit,
            name,
            code,
        }) => {
            let source = Arc::new(HttpMetadataSource::new(remote_config_from_env()?)?);
            let cache = MetadataCache::new(source, CacheConfig::default());
            let filter = MetadataFilter { name, code };
            let page = cache.find(&filter, offset, limit).await?;
            if page.items.is_empty() {
                println!("No metadata records found.");
            } else {
                for record in &page.items {
                    print_record(record);
                }
                if page.more {
                    println!("... more records follow (next offset: {})", offset + limit);
                }
            }
        }
        Some(Commands::Watch { interval }) => {
            use tracker::MetadataSource;

            let source = HttpMetadataSource::new(remote_config_from_env()?)?;
            let mut since = Utc::now();
            println!("Watching for metadata changes every {}s...", interval);
            loop {
                tokio::time::sleep(Duration::from_secs(interval.max(1))).await;
                let window_start = Utc::now();
                match source.fetch_changed_since(since).await {
                    Ok(changed) if changed.is_empty() => {}
                    Ok(changed) => {
                        for reference in changed {
                            println!("{} changed {}", Utc::now().format("%H:%M:%S"), reference);
                        }
                    }
                    Err(e) => eprintln!("Error polling change feed: {}", e),
                }
                since = window_start;
            }
        }
        None => {
            println!("Use 'clinsync --help' for commands");
        }
    }

    Ok(())
}
