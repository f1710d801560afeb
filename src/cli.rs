use clap::{Parser, ValueEnum};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Discard all checkpointed progress before running.
    #[arg(long)]
    pub reset: bool,

    /// Run exactly one phase instead of the full sequence.
    #[arg(long, value_enum)]
    pub phase: Option<Phase>,

    /// Directory holding the checkpoint document.
    #[arg(long, default_value = "state")]
    pub state_dir: String,

    /// Directory receiving `images/` and `books.json`.
    #[arg(long, default_value = "data")]
    pub data_dir: String,

    /// Catalog API base URL.
    #[arg(long, env = "BOOKHARVEST_API_BASE", default_value = crate::config::DEFAULT_API_BASE)]
    pub api_base: String,

    /// Image CDN base URL.
    #[arg(long, env = "BOOKHARVEST_CDN_BASE", default_value = crate::config::DEFAULT_CDN_BASE)]
    pub cdn_base: String,

    /// Store identifier sent with every catalog call.
    #[arg(long, env = "BOOKHARVEST_STORE_ID", default_value = crate::config::DEFAULT_STORE_ID)]
    pub store_id: String,

    /// Category filter for the browse call.
    #[arg(long, default_value = crate::config::DEFAULT_CATEGORY)]
    pub category: String,

    /// Rows requested per browse page.
    #[arg(long, default_value_t = 100)]
    pub page_size: u64,

    /// Delay between browse pages (politeness).
    #[arg(long, default_value_t = 500)]
    pub list_delay_ms: u64,

    /// Delay between detail requests (politeness).
    #[arg(long, default_value_t = 300)]
    pub detail_delay_ms: u64,

    /// Delay between image downloads (politeness).
    #[arg(long, default_value_t = 100)]
    pub image_delay_ms: u64,

    /// HTTP request timeout.
    #[arg(long, default_value_t = 30)]
    pub http_timeout_secs: u64,

    /// `cwebp` executable used for transcoding.
    #[arg(long, env = "BOOKHARVEST_CWEBP_BIN", default_value = "cwebp")]
    pub cwebp: String,

    /// WebP quality passed to `cwebp -q`.
    #[arg(long, default_value_t = 65)]
    pub webp_quality: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Phase {
    #[value(alias = "1")]
    Discovery,
    #[value(alias = "2")]
    List,
    #[value(alias = "3")]
    Detail,
    #[value(alias = "4")]
    Images,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Discovery => "discovery",
            Self::List => "list",
            Self::Detail => "detail",
            Self::Images => "images",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
