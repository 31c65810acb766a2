use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use newsdesk::app::{App, BackgroundResult};
use newsdesk::config::Config;
use newsdesk::download::{SourceStatus, DAILY_CAP};
use newsdesk::feed::{Fallback, Fetcher};
use newsdesk::net::{ProbeReachability, Reachability, StaticReachability};
use newsdesk::notify::ConsoleNotifier;
use newsdesk::storage::{Article, LocalStore};
use newsdesk::util::{html_to_text, strip_control_chars, truncate_to_width};

const HEADLINE_WIDTH: usize = 72;

/// Get the config directory path (~/.config/newsdesk/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("newsdesk"))
}

#[derive(Parser, Debug)]
#[command(name = "newsdesk", about = "Offline-first news reader for RSS and WordPress sources")]
struct Args {
    /// Config file (defaults to ~/.config/newsdesk/config.toml)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List known sources
    Sources,
    /// Fetch a source, falling back to the cache when offline
    Fetch {
        #[arg(long)]
        source: Option<String>,
        /// Only fetch over wifi (overrides config)
        #[arg(long, conflicts_with = "any_network")]
        wifi_only: bool,
        /// Fetch over any connection (overrides config)
        #[arg(long)]
        any_network: bool,
    },
    /// Download articles from the auto-download sources now
    Download,
    /// Run a background sweep, or keep sweeping with --watch
    Background {
        #[arg(long)]
        watch: bool,
    },
    /// Manage saved articles
    Saved {
        #[command(subcommand)]
        action: SavedAction,
    },
    /// Save one article from a source's cached feed
    Save {
        #[arg(long)]
        source: String,
        #[arg(long)]
        id: String,
    },
    /// Show today's download counts
    Quota {
        #[arg(long)]
        source: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum SavedAction {
    List,
    Show { id: String },
    Delete {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    Clear,
}

fn reachability(config: &Config) -> Result<Arc<dyn Reachability>> {
    let connection = config.network.connection;
    Ok(match &config.network.probe_url {
        Some(url) => Arc::new(
            ProbeReachability::new(url.clone(), connection).context("Failed to build reachability probe")?,
        ),
        None => Arc::new(StaticReachability::new(connection.state())),
    })
}

fn print_article_line(article: &Article) {
    let headline = strip_control_chars(&article.headline);
    println!(
        "{:<24} {}",
        truncate_to_width(&strip_control_chars(&article.id), 24),
        truncate_to_width(&headline, HEADLINE_WIDTH)
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout is command output
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = std::fs::set_permissions(&config_dir, std::fs::Permissions::from_mode(0o700)) {
            tracing::warn!(
                path = %config_dir.display(),
                error = %e,
                "Failed to set config directory permissions to 0700"
            );
        }
    }

    let config_path = args.config.clone().unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let db_path = match &config.database_path {
        Some(path) => PathBuf::from(path),
        None => config_dir.join("newsdesk.db"),
    };
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let store = LocalStore::open(db_path_str)
        .await
        .context("Failed to open local store")?;

    let registry = config.registry().context("Invalid source in config")?;
    let fetcher = Fetcher::new(
        registry,
        store,
        reachability(&config)?,
        Duration::from_secs(config.request_timeout_secs),
    )
    .context("Failed to create HTTP clients")?;

    let mut settings = config.settings();
    if let Command::Fetch {
        wifi_only,
        any_network,
        ..
    } = &args.command
    {
        if *wifi_only {
            settings.wifi_only = true;
        } else if *any_network {
            settings.wifi_only = false;
        }
    }

    let app = App::new(fetcher, settings, Arc::new(ConsoleNotifier));
    let result = run(&app, &config, args.command).await;
    app.store().close().await;
    result
}

async fn run(app: &App, config: &Config, command: Command) -> Result<()> {
    let store = app.store();
    let registry = app.fetcher().registry();

    match command {
        Command::Sources => {
            for source in registry.iter() {
                let marker = if source.id == registry.default_source().id {
                    "*"
                } else {
                    " "
                };
                println!("{marker} {:<10} {:<20} {:?}", source.id, source.name, source.format);
                for url in &source.urls {
                    println!("    {url}");
                }
            }
        }

        Command::Fetch { source, .. } => {
            let source_id = source.unwrap_or_else(|| registry.default_source().id.clone());
            let refresh = app.refresh(&source_id).await;
            let outcome = &refresh.outcome;

            let note = match outcome.fallback {
                Some(Fallback::NetworkUnavailable) => " (network unavailable)",
                Some(Fallback::SourceExhausted) => " (all endpoints failed)",
                None => "",
            };
            println!(
                "{} articles from {}{}",
                outcome.articles.len(),
                outcome.origin,
                note
            );
            for article in &outcome.articles {
                print_article_line(article);
            }
        }

        Command::Download => {
            let summary = app.download().await;
            if let Some(reason) = summary.aborted {
                println!("Download skipped: {reason:?}");
                return Ok(());
            }
            for report in &summary.sources {
                match &report.status {
                    SourceStatus::QuotaReached => {
                        println!("{:<10} daily limit reached", report.source_id)
                    }
                    SourceStatus::Processed { origin, saved } => {
                        println!("{:<10} {saved} saved ({origin})", report.source_id)
                    }
                }
            }
            if summary.saved == 0 {
                println!("No new articles");
            }
        }

        Command::Background { watch } => {
            if watch {
                let interval = Duration::from_secs(config.background_interval_minutes.saturating_mul(60));
                app.run_background(interval).await;
            } else {
                let result = app.background_sweep().await;
                println!(
                    "{}",
                    match result {
                        BackgroundResult::NewData => "new data",
                        BackgroundResult::NoData => "no data",
                        BackgroundResult::Failed => "failed",
                    }
                );
            }
        }

        Command::Saved { action } => match action {
            SavedAction::List => {
                let saved = store.get_saved_articles().await;
                if saved.is_empty() {
                    println!("No saved articles");
                }
                for entry in &saved {
                    println!(
                        "{}  {:<24} {}",
                        entry.downloaded_at.format("%Y-%m-%d %H:%M"),
                        truncate_to_width(&strip_control_chars(&entry.id), 24),
                        truncate_to_width(&strip_control_chars(&entry.headline), HEADLINE_WIDTH)
                    );
                }
            }
            SavedAction::Show { id } => {
                let saved = store.get_saved_articles().await;
                let entry = saved
                    .iter()
                    .find(|s| s.id == id)
                    .ok_or_else(|| anyhow::anyhow!("No saved article with id '{id}'"))?;
                println!("{}", strip_control_chars(&entry.headline));
                println!("{}", strip_control_chars(&entry.source));
                if let Some(date) = &entry.date {
                    println!("{}", strip_control_chars(date));
                }
                if let Some(url) = &entry.url {
                    println!("{}", strip_control_chars(url));
                }
                println!();
                println!("{}", strip_control_chars(&html_to_text(&entry.content)));
            }
            SavedAction::Delete { ids } => {
                let before = store.get_saved_articles().await.len();
                if !store.delete_articles(&ids).await {
                    anyhow::bail!("Failed to delete articles");
                }
                let after = store.get_saved_articles().await.len();
                println!("Deleted {} articles", before.saturating_sub(after));
            }
            SavedAction::Clear => {
                if !store.clear_all_articles().await {
                    anyhow::bail!("Failed to clear saved articles");
                }
                println!("Cleared saved articles");
            }
        },

        Command::Save { source, id } => {
            let source = registry.resolve(&source);
            let cached = store.get_feed_cache(&source.id).await;
            let article = cached.iter().find(|a| a.id == id).ok_or_else(|| {
                anyhow::anyhow!(
                    "Article '{id}' is not in the {} cache; run `newsdesk fetch --source {}` first",
                    source.id,
                    source.id
                )
            })?;
            if store.save_article(article).await {
                println!("Saved: {}", truncate_to_width(&strip_control_chars(&article.headline), HEADLINE_WIDTH));
            } else if store.is_saved(&article.id).await {
                println!("Already saved");
            } else {
                anyhow::bail!("Failed to save article");
            }
        }

        Command::Quota { source } => {
            let ids: Vec<String> = match source {
                Some(id) => vec![registry.resolve(&id).id.clone()],
                None => registry.ids().map(str::to_string).collect(),
            };
            let premium = app.settings().is_premium;
            for id in ids {
                let count = store.get_daily_download_count(&id).await;
                if premium {
                    println!("{id:<10} {count} today (premium, no limit)");
                } else {
                    println!("{id:<10} {count}/{DAILY_CAP} today");
                }
            }
        }
    }

    Ok(())
}
