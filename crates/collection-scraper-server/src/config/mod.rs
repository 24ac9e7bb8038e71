//! Configuration loading and resolution.
//!
//! Every setting resolves in the same order: explicit CLI flag, then the
//! `SCRAPER_*` environment variable, then the built-in default.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use clap::ValueEnum;
use collection_scraper::ScrollPlan;

use crate::gcs::DEFAULT_ENDPOINT;
use crate::renderer::BrowserOptions;
use crate::scrape::{CaptureMode, ScrapeSettings};

/// Default listen address when neither a flag nor `PORT` says otherwise.
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8080";

/// A setting that could not be parsed.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("invalid value {value:?} for {key}: {reason}")]
pub struct ConfigError {
    pub key: String,
    pub value: String,
    pub reason: String,
}

/// Where artifacts are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageConfig {
    Local {
        dir: PathBuf,
    },
    Gcs {
        bucket: String,
        token: Option<String>,
        endpoint: String,
    },
}

/// Fully resolved server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScraperConfig {
    pub listen_addr: SocketAddr,
    pub scrape: ScrapeSettings,
    pub storage: StorageConfig,
}

/// Values given explicitly on the command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub listen_addr: Option<SocketAddr>,
    pub target_url: Option<String>,
    pub headed: bool,
    pub capture: Option<CaptureMode>,
    pub iterations: Option<u32>,
    pub output_dir: Option<PathBuf>,
    pub bucket: Option<String>,
}

impl ScraperConfig {
    /// Resolve from CLI overrides and the process environment.
    pub fn resolve(overrides: &Overrides) -> Result<Self, ConfigError> {
        Self::resolve_with(overrides, |key| std::env::var(key).ok())
    }

    /// Resolve using `lookup` in place of the process environment.
    pub fn resolve_with<F>(overrides: &Overrides, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup: &lookup };

        let listen_addr = match overrides.listen_addr {
            Some(addr) => addr,
            None => match env.raw("SCRAPER_LISTEN_ADDR") {
                Some(v) => parse_value("SCRAPER_LISTEN_ADDR", &v)?,
                None => match env.raw("PORT") {
                    Some(port) => {
                        let port: u16 = parse_value("PORT", &port)?;
                        SocketAddr::from(([0, 0, 0, 0], port))
                    }
                    None => parse_value("SCRAPER_LISTEN_ADDR", DEFAULT_LISTEN_ADDR)?,
                },
            },
        };

        let defaults = ScrapeSettings::default();

        let headless = if overrides.headed {
            false
        } else {
            env.flag("SCRAPER_HEADLESS", defaults.browser.headless)?
        };
        let browser = BrowserOptions {
            headless,
            stealth: env.flag("SCRAPER_STEALTH", defaults.browser.stealth)?,
            chrome_path: env.raw("SCRAPER_CHROMIUM_PATH").map(PathBuf::from),
            navigation_timeout_ms: env.parsed(
                "SCRAPER_NAVIGATION_TIMEOUT_MS",
                defaults.browser.navigation_timeout_ms,
            )?,
        };

        let anchor_selector = env
            .raw("SCRAPER_ANCHOR_SELECTOR")
            .unwrap_or(defaults.anchor_selector);
        let challenge_selector = env
            .raw("SCRAPER_CHALLENGE_SELECTOR")
            .unwrap_or_else(|| anchor_selector.clone());

        let capture = match overrides.capture {
            Some(mode) => mode,
            None => match env.raw("SCRAPER_CAPTURE") {
                Some(v) => <CaptureMode as ValueEnum>::from_str(&v, true).map_err(|reason| ConfigError {
                    key: "SCRAPER_CAPTURE".into(),
                    value: v.clone(),
                    reason,
                })?,
                None => defaults.capture,
            },
        };

        let scroll = ScrollPlan {
            iterations: match overrides.iterations {
                Some(n) => n,
                None => env.parsed("SCRAPER_ITERATIONS", defaults.scroll.iterations)?,
            },
            scroll_delta_px: env.parsed("SCRAPER_SCROLL_DELTA_PX", defaults.scroll.scroll_delta_px)?,
            pause: Duration::from_millis(
                env.parsed("SCRAPER_PAUSE_MS", defaults.scroll.pause.as_millis() as u64)?,
            ),
        };

        let scrape = ScrapeSettings {
            target_url: overrides
                .target_url
                .clone()
                .or_else(|| env.raw("SCRAPER_TARGET_URL"))
                .unwrap_or(defaults.target_url),
            capture,
            browser,
            anchor_selector,
            challenge_selector,
            challenge_timeout_ms: env
                .parsed("SCRAPER_CHALLENGE_TIMEOUT_MS", defaults.challenge_timeout_ms)?,
            settle_ms: env.parsed("SCRAPER_SETTLE_MS", defaults.settle_ms)?,
            scroll,
        };

        let bucket = overrides
            .bucket
            .clone()
            .or_else(|| env.raw("SCRAPER_GCS_BUCKET"));
        let storage = match (bucket, &overrides.output_dir) {
            (Some(bucket), None) => StorageConfig::Gcs {
                bucket,
                token: env.raw("SCRAPER_GCS_TOKEN"),
                endpoint: env
                    .raw("SCRAPER_GCS_ENDPOINT")
                    .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            },
            (_, Some(dir)) => StorageConfig::Local { dir: dir.clone() },
            (None, None) => StorageConfig::Local {
                dir: env
                    .raw("SCRAPER_OUTPUT_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(default_output_dir),
            },
        };

        Ok(Self {
            listen_addr,
            scrape,
            storage,
        })
    }
}

/// `~/.local/share/collection-scraper` or `./scrapes` without a data dir.
pub fn default_output_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("collection-scraper"))
        .unwrap_or_else(|| PathBuf::from("scrapes"))
}

struct Env<'a> {
    lookup: &'a dyn Fn(&str) -> Option<String>,
}

impl Env<'_> {
    /// Non-empty, trimmed value of `key`.
    fn raw(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.raw(key) {
            Some(v) => parse_value(key, &v),
            None => Ok(default),
        }
    }

    fn flag(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        let Some(v) = self.raw(key) else {
            return Ok(default);
        };
        match v.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError {
                key: key.to_string(),
                value: v,
                reason: "expected a boolean".to_string(),
            }),
        }
    }
}

fn parse_value<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError {
        key: key.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}
