use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Clone, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Local,
    Memory,
}

fn default_storage_kind() -> StorageKind {
    StorageKind::Local
}

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    pub surrealdb_address: String,
    pub surrealdb_username: String,
    pub surrealdb_password: String,
    pub surrealdb_namespace: String,
    pub surrealdb_database: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_storage_kind")]
    pub storage: StorageKind,
    /// Attempt bound for the optimistic page-number allocation loop.
    #[serde(default = "default_numbering_max_attempts")]
    pub numbering_max_attempts: u32,
    /// First backoff delay between allocation attempts, in milliseconds.
    #[serde(default = "default_numbering_base_delay_ms")]
    pub numbering_base_delay_ms: u64,
    /// Buffered capacity of the pages-changed broadcast channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_numbering_max_attempts() -> u32 {
    5
}

fn default_numbering_base_delay_ms() -> u64 {
    25
}

fn default_event_capacity() -> usize {
    64
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            surrealdb_address: "mem://".to_string(),
            surrealdb_username: "root".to_string(),
            surrealdb_password: "root".to_string(),
            surrealdb_namespace: "pages".to_string(),
            surrealdb_database: "pages".to_string(),
            data_dir: default_data_dir(),
            storage: default_storage_kind(),
            numbering_max_attempts: default_numbering_max_attempts(),
            numbering_base_delay_ms: default_numbering_base_delay_ms(),
            event_capacity: default_event_capacity(),
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
