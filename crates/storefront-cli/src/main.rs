//! Storefront - browse the top-grossing and top-free app charts from a
//! terminal, with a local copy that keeps working offline.

use std::io;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use storefront_core::config::REGION_ENV;
use storefront_core::{
    AppEntry, CatalogClient, CatalogEvent, CatalogRepository, Config, EventBus, Fetched,
    IncrementalLoader, LoadMore, LocalStore, ReachabilityMonitor, SourceKind,
};

/// Pages loaded by `browse` when no count is given
const DEFAULT_BROWSE_PAGES: usize = 1;

/// Browse the top-grossing and top-free app charts, with an offline copy
#[derive(Parser, Debug)]
#[command(name = "storefront")]
#[command(version)]
struct Cli {
    /// Storefront region, e.g. hk or us (overrides the config file)
    #[arg(long, global = true, env = REGION_ENV)]
    region: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Top grossing and top free side by side
    Home,
    /// Top grossing apps
    Grossing,
    /// Top free apps
    Free,
    /// Look up apps by catalog id
    Details {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Page through details of the top free apps
    Browse {
        #[arg(default_value_t = DEFAULT_BROWSE_PAGES)]
        pages: usize,
    },
}

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();

    let cli = Cli::parse();

    let mut config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "Failed to load config, using defaults");
            Config::default()
        }
    };
    config.apply_env();
    if let Some(region) = cli.region.filter(|r| !r.trim().is_empty()) {
        config.region = region.trim().to_string();
    }
    info!(region = %config.region, "Storefront starting");

    let store = match config.cache_dir() {
        Ok(dir) => LocalStore::open(&dir).unwrap_or_else(|e| {
            warn!(error = %e, dir = %dir.display(), "Local store unavailable, running without cache");
            LocalStore::ephemeral()
        }),
        Err(e) => {
            warn!(error = %e, "No cache directory, running without cache");
            LocalStore::ephemeral()
        }
    };

    let events = EventBus::default();
    let banner = spawn_banner(&events);

    let client = CatalogClient::new(&config.region)?;
    let host = client.host().unwrap_or(storefront_core::api::CATALOG_HOST).to_string();
    let mut monitor = ReachabilityMonitor::start(
        host,
        client.port(),
        config.reachability_interval(),
        events.clone(),
    );

    let repository = CatalogRepository::new(client, Arc::new(store), events)
        .with_limits(config.top_grossing_limit, config.top_free_limit);

    run(cli.command, &repository, config.batch_size).await;

    monitor.stop();
    banner.abort();
    info!("Storefront shutting down");
    Ok(())
}

/// Print a one-line banner whenever connectivity changes.
fn spawn_banner(events: &EventBus) -> tokio::task::JoinHandle<()> {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        let mut offline = false;
        loop {
            match rx.recv().await {
                Ok(CatalogEvent::ConnectivityLost) if !offline => {
                    offline = true;
                    eprintln!("! Offline - showing saved results");
                }
                Ok(CatalogEvent::ConnectivityRestored) if offline => {
                    offline = false;
                    eprintln!("! Back online");
                }
                Ok(_) => {}
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    })
}

async fn run(command: Command, repository: &CatalogRepository<CatalogClient>, batch_size: usize) {
    match command {
        Command::Home => {
            let (grossing, free) = repository.home().await;
            print_list("Top Grossing", &grossing);
            println!();
            print_list("Top Free", &free);
        }
        Command::Grossing => print_list("Top Grossing", &repository.top_grossing().await),
        Command::Free => print_list("Top Free", &repository.top_free().await),
        Command::Details { ids } => {
            let fetched = repository.details(&ids).await;
            for (id, app) in ids.iter().zip(&fetched.data) {
                match app {
                    Some(app) => {
                        print_detail(app);
                        if fetched.is_cached() {
                            if let Some(saved) = repository.store().entity(SourceKind::LookupResult, id) {
                                println!("  Saved {}", saved.age_display());
                            }
                        }
                    }
                    None => println!("{}: not found", id),
                }
            }
        }
        Command::Browse { pages } => browse(repository, batch_size, pages).await,
    }
}

async fn browse(repository: &CatalogRepository<CatalogClient>, batch_size: usize, pages: usize) {
    let free = repository.top_free().await.into_inner();
    let mut loader = IncrementalLoader::new(batch_size);
    loader.reset(free.into_iter().map(|app| app.app_id).collect());

    for _ in 0..pages {
        let shown = loader.apps().len();
        match loader.load_more(repository).await {
            LoadMore::Loaded(outcome) => {
                for (offset, app) in loader.apps()[shown..].iter().enumerate() {
                    println!("{:>3}. {}", shown + offset + 1, summary_line(app));
                }
                if !outcome.has_more {
                    println!("-- end of list --");
                    break;
                }
            }
            LoadMore::Exhausted => {
                println!("-- end of list --");
                break;
            }
            LoadMore::Busy | LoadMore::Discarded => break,
        }
    }
}

fn print_list(title: &str, fetched: &Fetched<Vec<AppEntry>>) {
    let suffix = if fetched.is_cached() { " (saved)" } else { "" };
    println!("{}{}", title, suffix);
    if fetched.data.is_empty() {
        println!("  nothing to show");
    }
    for (position, app) in fetched.data.iter().enumerate() {
        println!("{:>3}. {}", position + 1, summary_line(app));
    }
}

fn summary_line(app: &AppEntry) -> String {
    let mut line = app.display_title().to_string();
    if let Some(ref category) = app.category {
        line.push_str(&format!(" ({})", category));
    }
    if app.rating_count > 0 {
        line.push_str(&format!(" {:.1}* from {}", app.rating, app.rating_count));
    }
    line
}

fn print_detail(app: &AppEntry) {
    println!("{} [{}]", app.display_title(), app.app_id);
    if let Some(ref category) = app.category {
        println!("  Category: {}", category);
    }
    if app.rating_count > 0 {
        println!("  Rating:   {:.1} ({} ratings)", app.rating, app.rating_count);
    }
    if let Some(ref icon) = app.icon_url {
        println!("  Icon:     {}", icon);
    }
    if let Some(ref summary) = app.summary {
        let first_line = summary.lines().next().unwrap_or_default();
        println!("  {}", first_line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(values: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("storefront").chain(values.iter().copied()))
    }

    fn command(values: &[&str]) -> Command {
        parse(values).unwrap().command
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(command(&["home"]), Command::Home);
        assert_eq!(command(&["grossing"]), Command::Grossing);
        assert_eq!(command(&["free"]), Command::Free);
        assert_eq!(
            command(&["details", "1", "2"]),
            Command::Details {
                ids: vec!["1".to_string(), "2".to_string()]
            }
        );
        assert_eq!(command(&["browse"]), Command::Browse { pages: 1 });
        assert_eq!(command(&["browse", "3"]), Command::Browse { pages: 3 });
    }

    #[test]
    fn test_region_flag() {
        let cli = parse(&["free", "--region", "us"]).unwrap();
        assert_eq!(cli.region.as_deref(), Some("us"));
        assert_eq!(cli.command, Command::Free);
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse(&[]).is_err());
        assert!(parse(&["details"]).is_err());
        assert!(parse(&["browse", "many"]).is_err());
        assert!(parse(&["upload"]).is_err());
    }

    #[test]
    fn test_summary_line() {
        let mut app = AppEntry::new(SourceKind::LookupResult, "1");
        assert_eq!(summary_line(&app), "1");

        app.title = Some("Chess".to_string());
        app.category = Some("Games".to_string());
        app.rating = 4.5;
        app.rating_count = 10;
        assert_eq!(summary_line(&app), "Chess (Games) 4.5* from 10");
    }
}
