//! 🔧 App Configuration: the sacred TOML-to-struct pipeline.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the junk drawer. Nothing." (every developer at 3am) 🦆
//!
//! 🏗️ Powered by Figment, because manually parsing env vars is a form of
//! self-harm that even the borrow checker wouldn't approve of.
//!
//! 🧠 Knowledge graph:
//! - `walk`: how the walk behaves (hand-off queue size, scan concurrency, progress spinner).
//! - `aws`: overrides layered on top of the SDK's own defaults chain.
//! - Env vars: `TDG_WALK__CHANNEL_CAPACITY=64`, `TDG_AWS__REGION=us-east-1`, and so on.

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use tracing::info;

use crate::error::WalkError;

/// 📦 The AppConfig: one struct to rule them all, and in the Figment bind them.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub walk: WalkConfig,
    #[serde(default)]
    pub aws: AwsConfig,
}

/// 🚶 How a walk behaves, as opposed to what it reads.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct WalkConfig {
    /// 📬 Records buffered between the walk and its consumer before the walk waits.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// 🧵 Scan units allowed to hit the store at the same time within one day.
    #[serde(default = "default_max_concurrent_scans")]
    pub max_concurrent_scans: usize,
    /// 📊 Spin a progress spinner on stderr.
    #[serde(default)]
    pub show_progress: bool,
}

// 📬 1024 records: a few object bodies' worth. Enough to keep the consumer busy, not enough
// to matter to the allocator.
fn default_channel_capacity() -> usize {
    1024
}

// 🧵 64 concurrent scans per day. Plenty for an org with a dozen accounts in every region,
// polite enough that S3 doesn't start saying "SlowDown".
fn default_max_concurrent_scans() -> usize {
    64
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            max_concurrent_scans: default_max_concurrent_scans(),
            show_progress: false,
        }
    }
}

/// 🪣 Overrides for the AWS SDK config. Every field is optional; unset means "let the SDK decide".
#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct AwsConfig {
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub profile: Option<String>,
    /// 🔌 For S3-compatible stores and local stand-ins.
    #[serde(default)]
    pub endpoint_url: Option<String>,
    #[serde(default)]
    pub force_path_style: bool,
}

/// 🚀 Load the config from env vars (`TDG_*`) and, if given, a TOML file. TOML wins on conflicts.
///
/// 📐 No file means env vars only. We don't go looking for a `config.toml` nobody asked for.
pub fn load_config(config_file_name: Option<&Path>) -> Result<AppConfig, WalkError> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    let config = Figment::new().merge(Env::prefixed("TDG_").split("__"));
    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    config.extract().map_err(|e| {
        let the_origin = match config_file_name {
            Some(path) => format!("file '{}' and environment variables (TDG_*)", path.display()),
            None => "environment variables (TDG_*)".to_string(),
        };
        WalkError::Config(format!("{the_origin}: {e}"))
    })
}
