//! Default configuration values

use super::types::Config;

/// Default configuration file name (TOML)
pub const DEFAULT_CONFIG_TOML: &str = "foreman.toml";

/// Default configuration file name (YAML)
pub const DEFAULT_CONFIG_YAML: &str = "foreman.yaml";

/// Get list of config file names to search for
pub fn config_file_names() -> Vec<&'static str> {
    vec![
        DEFAULT_CONFIG_TOML,
        DEFAULT_CONFIG_YAML,
        ".foreman.toml",
        ".foreman.yaml",
    ]
}

/// Generate default configuration TOML
pub fn default_config_toml() -> String {
    let config = Config::default();
    toml::to_string_pretty(&config).unwrap_or_else(|_| DEFAULT_CONFIG_TEMPLATE.to_string())
}

/// Default configuration template
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# Foreman Configuration

[tasks]
dir = ".foreman/tasks"
max_concurrency = 4
stall_timeout_secs = 3600
log_level = "debug"

[blobstore]
provider = "local"
path = ".foreman/blobstore"
multidigest_path = "verify-multidigest"
"#;
