//! Configuration schema for lattice
//!
//! Config lives at `.config/lattice/config.yaml` relative to the
//! workspace root. Only the `connect` bridging needs it; everything else
//! runs without a config file.

use eyre::{Result, WrapErr};
use facet::Facet;
use std::path::{Path, PathBuf};

/// Root configuration for lattice
#[derive(Debug, Clone, Default, Facet)]
pub struct Config {
    /// Bridging rules mapping requirement-id prefixes to code paths
    #[facet(default)]
    pub mappings: Vec<Mapping>,
}

/// One bridging rule: requirements whose id starts with `prefix` map to
/// the first snapshot node whose file path contains `path`.
#[derive(Debug, Clone, Facet)]
pub struct Mapping {
    pub prefix: String,
    pub path: String,
}

/// Default config location relative to the workspace root.
pub const CONFIG_PATH: &str = ".config/lattice/config.yaml";

pub fn config_path(workspace_root: &Path) -> PathBuf {
    workspace_root.join(CONFIG_PATH)
}

pub fn load_config(path: &PathBuf) -> Result<Config> {
    if !path.exists() {
        eyre::bail!(
            "Config file not found at {}\n\n\
             Create a config file with your bridging rules:\n\n\
             mappings:\n  \
               - prefix: \"AUTH.\"\n    \
                 path: \"src/auth\"\n",
            path.display()
        );
    }

    let content = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = facet_yaml::from_str(&content)
        .wrap_err_with(|| format!("Failed to parse config file: {}", path.display()))?;

    Ok(config)
}

/// Load config if it exists, otherwise return the default empty config.
/// This lets every command run without a config file.
pub fn load_config_or_default(path: &PathBuf) -> Config {
    if !path.exists() {
        return Config::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => facet_yaml::from_str(&content).unwrap_or_default(),
        Err(_) => Config::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mapping_rules() {
        let config: Config = facet_yaml::from_str(
            "mappings:\n  - prefix: \"AUTH.\"\n    path: \"src/auth\"\n  - prefix: \"NET.\"\n    path: \"src/net\"\n",
        )
        .unwrap();
        assert_eq!(config.mappings.len(), 2);
        assert_eq!(config.mappings[0].prefix, "AUTH.");
        assert_eq!(config.mappings[1].path, "src/net");
    }

    #[test]
    fn missing_config_defaults_to_empty() {
        let config = load_config_or_default(&PathBuf::from("/nonexistent/config.yaml"));
        assert!(config.mappings.is_empty());
    }
}
