pub mod schema;

pub use schema::{AppConfig, StoreBackend};

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variables that carry credentials.
pub const CREDENTIAL_VARS: &[&str] = &[
    "GOOGLE_CSE_API_KEY",
    "GOOGLE_CSE_ID",
    "CHROMA_API_KEY",
    "CHROMA_TENANT",
    "CHROMA_DATABASE",
    "GOOGLE_API_KEY",
];

/// Default home directory (~/.uniplexity).
pub fn default_home_dir() -> PathBuf {
    directories::BaseDirs::new()
        .map(|d| d.home_dir().join(".uniplexity"))
        .unwrap_or_else(|| PathBuf::from(".uniplexity"))
}

/// Load config from the given path, or return defaults.
pub fn load_config(path: &Path) -> Result<AppConfig> {
    if path.exists() {
        let contents = std::fs::read_to_string(path).context("Failed to read config file")?;
        let config: AppConfig =
            toml::from_str(&contents).context("Failed to parse config (TOML)")?;
        Ok(config)
    } else {
        debug!("No config at {}, using defaults", path.display());
        Ok(AppConfig::default())
    }
}

/// Load config and layer credentials from the process environment on top.
/// Paths left empty default to the directory holding `path`.
pub fn load_with_env(path: &Path) -> Result<AppConfig> {
    let home = path.parent().unwrap_or_else(|| Path::new("."));
    let mut config = load_config(path)?.with_home(home);
    apply_env(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

/// Override credential fields with non-empty values from `lookup`.
pub fn apply_env<F>(config: &mut AppConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    for var in CREDENTIAL_VARS {
        let Some(value) = lookup(var).filter(|v| !v.trim().is_empty()) else {
            continue;
        };
        let slot = match *var {
            "GOOGLE_CSE_API_KEY" => &mut config.search_api_key,
            "GOOGLE_CSE_ID" => &mut config.search_engine_id,
            "CHROMA_API_KEY" => &mut config.chroma_api_key,
            "CHROMA_TENANT" => &mut config.chroma_tenant,
            "CHROMA_DATABASE" => &mut config.chroma_database,
            "GOOGLE_API_KEY" => &mut config.google_api_key,
            _ => continue,
        };
        *slot = value.trim().to_string();
    }
}

/// Save config to the given path (TOML format).
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let contents = toml::to_string_pretty(config).context("Failed to serialize config")?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, contents).context("Failed to write config file")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            collection = "notes"
            store_backend = "sqlite"
            max_output_tokens = 256
            "#,
        )
        .unwrap();
        assert_eq!(config.collection, "notes");
        assert_eq!(config.store_backend, StoreBackend::Sqlite);
        assert_eq!(config.max_output_tokens, 256);
        assert_eq!(config.scrape_max_chars, 2000);
        assert_eq!(config.default_k, 1);
    }

    #[test]
    fn env_overrides_credentials_only_when_set() {
        let env: HashMap<&str, &str> = [
            ("GOOGLE_CSE_ID", "engine-1"),
            ("GOOGLE_CSE_API_KEY", "  key-1  "),
            ("CHROMA_TENANT", ""),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig {
            chroma_tenant: "from-file".into(),
            ..AppConfig::default()
        };
        apply_env(&mut config, |k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.search_engine_id, "engine-1");
        assert_eq!(config.search_api_key, "key-1");
        assert_eq!(config.chroma_tenant, "from-file");
        assert!(config.has_search_credentials());
        assert!(!config.has_chroma_credentials());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = load_config(Path::new("/nonexistent/uniplexity.toml")).unwrap();
        assert_eq!(config.collection, "uniplexity_collection");
    }

    #[test]
    fn store_path_follows_the_home_directory() {
        let home = std::env::temp_dir().join(format!("uniplexity-home-{}", ulid::Ulid::new()));
        let path = home.join("uniplexity.toml");
        save_config(
            &AppConfig {
                store_backend: StoreBackend::Sqlite,
                ..AppConfig::default()
            },
            &path,
        )
        .unwrap();

        let config = load_with_env(&path).unwrap();
        assert_eq!(
            Path::new(&config.resolved_sqlite_path()),
            home.join(schema::SQLITE_FILE)
        );

        let explicit = AppConfig {
            sqlite_path: "/data/kb.db".into(),
            ..AppConfig::default()
        }
        .with_home(&home);
        assert_eq!(explicit.resolved_sqlite_path(), "/data/kb.db");

        let _ = std::fs::remove_dir_all(home);
    }

    #[test]
    fn save_then_load() {
        let dir = std::env::temp_dir().join(format!("uniplexity-cfg-{}", ulid::Ulid::new()));
        let path = dir.join("uniplexity.toml");
        let config = AppConfig {
            rag_enabled: false,
            ..AppConfig::default()
        };
        save_config(&config, &path).unwrap();
        let loaded = load_config(&path).unwrap();
        assert!(!loaded.rag_enabled);
        let _ = std::fs::remove_dir_all(dir);
    }
}
