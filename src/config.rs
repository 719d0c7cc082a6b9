use std::{path::PathBuf, time::Duration};

use chrono_tz::Tz;
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::{AddContext, Error};

/// Runtime settings, read from `.env`, an optional `invoice-desk.{toml,yaml,json}` file and
/// `INVOICE_DESK__*` environment variables, in increasing order of precedence.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub database_url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,
    #[serde(default = "default_render_timeout_secs")]
    pub render_timeout_secs: u64,
    /// Calendar days (stats buckets, date filters, printed dates) are cut in this zone.
    #[serde(default = "default_timezone")]
    pub timezone: Tz,
    #[serde(default)]
    pub template_dir: Option<PathBuf>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_json: bool,
}

fn default_max_connections() -> u32 {
    5
}

fn default_webdriver_url() -> String {
    String::from("http://localhost:4444")
}

fn default_render_timeout_secs() -> u64 {
    10
}

fn default_timezone() -> Tz {
    Tz::UTC
}

fn default_log_level() -> String {
    String::from("info")
}

impl Settings {
    pub fn load() -> Result<Self, Error> {
        dotenvy::dotenv().ok();
        Self::from_config(
            Config::builder()
                .add_source(File::with_name("invoice-desk").required(false))
                .add_source(Environment::with_prefix("INVOICE_DESK").separator("__")),
        )
    }

    fn from_config(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, Error> {
        builder
            .build()
            .and_then(Config::try_deserialize)
            .map_err(Error::from)
            .add_context("loading settings")
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.render_timeout_secs)
    }
}
