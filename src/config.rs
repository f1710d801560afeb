use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context as _;
use url::Url;

use crate::cli::Cli;

pub const DEFAULT_API_BASE: &str = "https://api.bookmanager.com/customer";
pub const DEFAULT_CDN_BASE: &str = "https://cdn1.bookmanager.com";
pub const DEFAULT_STORE_ID: &str = "168749";
pub const DEFAULT_CATEGORY: &str = "a4to6";
pub const DEFAULT_CACHE_BUSTER: &str = "7603827";

/// Where the catalog lives and how to talk to it.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub api_base: String,
    pub cdn_base: String,
    pub store_id: String,
    pub category: String,
    pub cache_buster: String,
    pub timeout: Duration,
}

/// Pacing and checkpoint cadence for the phases.
#[derive(Debug, Clone)]
pub struct HarvestSettings {
    pub page_size: u64,
    pub list_delay: Duration,
    pub detail_delay: Duration,
    pub image_delay: Duration,
    pub list_save_every_pages: usize,
    pub detail_save_every_items: usize,
    pub image_save_every_books: usize,
    pub images_dir: PathBuf,
    pub dataset_path: PathBuf,
}

impl HarvestSettings {
    pub fn for_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            page_size: 100,
            list_delay: Duration::from_millis(500),
            detail_delay: Duration::from_millis(300),
            image_delay: Duration::from_millis(100),
            list_save_every_pages: 5,
            detail_save_every_items: 10,
            image_save_every_books: 25,
            images_dir: data_dir.join("images"),
            dataset_path: data_dir.join("books.json"),
        }
    }

    /// Same directories, no pacing. Used by tests and local stubs.
    pub fn without_delays(mut self) -> Self {
        self.list_delay = Duration::ZERO;
        self.detail_delay = Duration::ZERO;
        self.image_delay = Duration::ZERO;
        self
    }
}

#[derive(Debug, Clone)]
pub struct CwebpConfig {
    pub bin: String,
    pub quality: u8,
}

#[derive(Debug, Clone)]
pub struct HarvestConfig {
    pub state_dir: PathBuf,
    pub api: ApiConfig,
    pub settings: HarvestSettings,
    pub cwebp: CwebpConfig,
}

impl HarvestConfig {
    pub fn from_cli(cli: &Cli) -> anyhow::Result<Self> {
        if cli.page_size == 0 {
            anyhow::bail!("--page-size must be greater than zero");
        }
        if cli.webp_quality > 100 {
            anyhow::bail!("--webp-quality must be within 0..=100");
        }

        let api_base = cli.api_base.trim_end_matches('/');
        let cdn_base = cli.cdn_base.trim_end_matches('/');
        for (flag, value) in [("--api-base", api_base), ("--cdn-base", cdn_base)] {
            Url::parse(value).with_context(|| format!("{flag} is not a valid url: {value}"))?;
        }

        let mut settings = HarvestSettings::for_data_dir(&cli.data_dir);
        settings.page_size = cli.page_size;
        settings.list_delay = Duration::from_millis(cli.list_delay_ms);
        settings.detail_delay = Duration::from_millis(cli.detail_delay_ms);
        settings.image_delay = Duration::from_millis(cli.image_delay_ms);

        Ok(Self {
            state_dir: PathBuf::from(&cli.state_dir),
            api: ApiConfig {
                api_base: api_base.to_owned(),
                cdn_base: cdn_base.to_owned(),
                store_id: cli.store_id.clone(),
                category: cli.category.clone(),
                cache_buster: DEFAULT_CACHE_BUSTER.to_owned(),
                timeout: Duration::from_secs(cli.http_timeout_secs.max(1)),
            },
            settings,
            cwebp: CwebpConfig {
                bin: cli.cwebp.clone(),
                quality: cli.webp_quality,
            },
        })
    }
}
