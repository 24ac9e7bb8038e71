//! collection-scraper entry point.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use collection_scraper_server::logging::{self, LogFormat};
use collection_scraper_server::renderer::chromium::{find_chromium, ChromiumLauncher};
use collection_scraper_server::rest::{self, AppState};
use collection_scraper_server::{build_store, run_scrape, CaptureMode, Overrides, ScraperConfig};

#[derive(Parser)]
#[command(
    name = "collection-scraper",
    about = "Scrape marketplace collection pages with a headless browser",
    version
)]
struct Cli {
    /// Log level (trace, debug, info, warn, error). RUST_LOG takes precedence.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log line format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP trigger (default).
    Serve {
        /// Listen address (host:port).
        #[arg(long)]
        addr: Option<SocketAddr>,

        #[command(flatten)]
        scrape: ScrapeArgs,
    },

    /// Run a single scrape in the foreground and print the report as JSON.
    Scrape {
        #[command(flatten)]
        scrape: ScrapeArgs,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[derive(Args, Default)]
struct ScrapeArgs {
    /// Collection page to scrape.
    #[arg(long)]
    url: Option<String>,

    /// Show the browser window instead of running headless.
    #[arg(long)]
    headed: bool,

    /// What to capture.
    #[arg(long, value_enum)]
    capture: Option<CaptureMode>,

    /// Number of scroll passes.
    #[arg(long)]
    iterations: Option<u32>,

    /// Write artifacts to this directory.
    #[arg(long, conflicts_with = "bucket")]
    out_dir: Option<PathBuf>,

    /// Upload artifacts to this Cloud Storage bucket.
    #[arg(long)]
    bucket: Option<String>,
}

impl ScrapeArgs {
    fn overrides(self, listen_addr: Option<SocketAddr>) -> Overrides {
        Overrides {
            listen_addr,
            target_url: self.url,
            headed: self.headed,
            capture: self.capture,
            iterations: self.iterations,
            output_dir: self.out_dir,
            bucket: self.bucket,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let command = cli.command.unwrap_or(Commands::Serve {
        addr: None,
        scrape: ScrapeArgs::default(),
    });

    let init_logging = || logging::init(cli.log_format, cli.log_level.as_deref());

    match command {
        Commands::Serve { addr, scrape } => {
            init_logging();
            let config = ScraperConfig::resolve(&scrape.overrides(addr))
                .context("invalid configuration")?;
            warn_if_browser_missing(&config);

            let store = build_store(&config.storage);
            tracing::info!(
                "collection-scraper v{} (target {}, storage {})",
                env!("CARGO_PKG_VERSION"),
                config.scrape.target_url,
                store.describe()
            );

            let state = Arc::new(AppState::new(
                config.scrape,
                Arc::new(ChromiumLauncher),
                store,
            ));
            rest::serve(config.listen_addr, state).await?;
        }

        Commands::Scrape { scrape } => {
            init_logging();
            let config = ScraperConfig::resolve(&scrape.overrides(None))
                .context("invalid configuration")?;
            let store = build_store(&config.storage);
            let report = run_scrape(&ChromiumLauncher, store.as_ref(), &config.scrape).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "collection-scraper", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn warn_if_browser_missing(config: &ScraperConfig) {
    if config.scrape.browser.chrome_path.is_none() && find_chromium().is_none() {
        tracing::warn!("Chromium not found; scrape jobs will fail until a browser is installed");
    }
}
