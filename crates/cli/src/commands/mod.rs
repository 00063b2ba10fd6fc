pub mod doctor;
pub mod draft;
pub mod serve;

use std::path::Path;

use outreach_config::AppConfig;

/// Load configuration or explain why it could not be loaded.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    AppConfig::load(path).map_err(|e| format!("Failed to load config: {e}").into())
}
