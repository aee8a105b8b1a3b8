use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_gutenberg_base_url")]
    pub gutenberg_base_url: String,
    #[serde(default = "default_download_max_retries")]
    pub download_max_retries: usize,
    #[serde(default = "default_download_backoff_ms")]
    pub download_backoff_ms: u64,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    #[serde(default)]
    pub openai_api_key: Option<String>,
    #[serde(default = "default_base_url")]
    pub openai_base_url: String,
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_gutenberg_base_url() -> String {
    "https://www.gutenberg.org".to_string()
}

fn default_download_max_retries() -> usize {
    3
}

fn default_download_backoff_ms() -> u64 {
    500
}

fn default_http_timeout_secs() -> u64 {
    60
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            gutenberg_base_url: default_gutenberg_base_url(),
            download_max_retries: default_download_max_retries(),
            download_backoff_ms: default_download_backoff_ms(),
            http_timeout_secs: default_http_timeout_secs(),
            openai_api_key: None,
            openai_base_url: default_base_url(),
        }
    }
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default())
        .build()?;

    config.try_deserialize()
}
