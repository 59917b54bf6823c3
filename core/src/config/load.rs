use std::path::{Path, PathBuf};

use super::types::AppConfig;

/// Default data directory: ~/.aiwhisper
pub fn get_aiwhisper_data_dir() -> anyhow::Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(home.join(".aiwhisper"))
}

pub fn load_default() -> anyhow::Result<AppConfig> {
    // Priority 1: ~/.aiwhisper/config.toml
    let user_config = get_aiwhisper_data_dir()?.join("config.toml");

    // Priority 2: ./config.toml
    let local_config = Path::new("config.toml");

    let cfg = if user_config.exists() {
        read_config(&user_config)?
    } else if local_config.exists() {
        read_config(local_config)?
    } else {
        AppConfig::default()
    };

    finish(cfg)
}

/// Load an explicit config file (`--config`).
pub fn load_from_path(path: &Path) -> anyhow::Result<AppConfig> {
    finish(read_config(path)?)
}

fn read_config(path: &Path) -> anyhow::Result<AppConfig> {
    let s = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read config {}: {e}", path.display()))?;
    toml::from_str::<AppConfig>(&s)
        .map_err(|e| anyhow::anyhow!("invalid config {}: {e}", path.display()))
}

fn finish(mut cfg: AppConfig) -> anyhow::Result<AppConfig> {
    apply_env_overrides(&mut cfg, |key| std::env::var(key).ok());
    expand_paths(&mut cfg)?;
    Ok(cfg)
}

/// Environment variable overrides (highest priority).
fn apply_env_overrides<F>(cfg: &mut AppConfig, var: F)
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |key: &str| var(key).filter(|v| !v.trim().is_empty());

    // AIWHISPER_API_KEY wins over the provider specific variable.
    if let Some(v) = non_empty("AIWHISPER_API_KEY").or_else(|| non_empty("OPENROUTER_API_KEY")) {
        cfg.ai.api_key = v;
    }
    if let Some(v) = non_empty("AIWHISPER_MODEL") {
        cfg.ai.model = v;
    }
    if let Some(v) = non_empty("AIWHISPER_BASE_URL") {
        cfg.ai.base_url = v;
    }
    if let Some(v) = non_empty("AIWHISPER_LOG_LEVEL") {
        cfg.logging.level = v;
    }
}

fn expand_paths(cfg: &mut AppConfig) -> anyhow::Result<()> {
    let expand = |p: &str| -> anyhow::Result<String> {
        Ok(shellexpand::full(p)
            .map_err(|e| anyhow::anyhow!("cannot expand path {p}: {e}"))?
            .into_owned())
    };

    cfg.workspace.root = expand(&cfg.workspace.root)?;
    if let Some(p) = cfg.state.path.as_deref() {
        cfg.state.path = Some(expand(p)?);
    }
    if let Some(p) = cfg.output.events_path.as_deref() {
        cfg.output.events_path = Some(expand(p)?);
    }
    if let Some(p) = cfg.logging.directory.as_deref() {
        cfg.logging.directory = Some(expand(p)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("OPENROUTER_API_KEY", "or-key"),
            ("AIWHISPER_MODEL", "mistral/mixtral"),
            ("AIWHISPER_BASE_URL", "  "),
        ]
        .into_iter()
        .collect();

        let mut cfg = AppConfig::default();
        apply_env_overrides(&mut cfg, |k| env.get(k).map(|v| v.to_string()));

        assert_eq!(cfg.ai.api_key, "or-key");
        assert_eq!(cfg.ai.model, "mistral/mixtral");
        // blank values are ignored
        assert_eq!(cfg.ai.base_url, "https://openrouter.ai/api/v1");
    }

    #[test]
    fn test_aiwhisper_key_takes_precedence() {
        let mut cfg = AppConfig::default();
        apply_env_overrides(&mut cfg, |k| match k {
            "OPENROUTER_API_KEY" => Some("or".into()),
            "AIWHISPER_API_KEY" => Some("aw".into()),
            _ => None,
        });
        assert_eq!(cfg.ai.api_key, "aw");
    }

    #[test]
    fn test_load_from_path_expands_home() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[state]\npath = \"~/runs/state.json\"\n").unwrap();

        let cfg = load_from_path(&path).unwrap();
        let state_path = cfg.state.path.unwrap();
        assert!(!state_path.starts_with('~'));
        assert!(state_path.ends_with("runs/state.json"));
    }

    #[test]
    fn test_load_from_missing_path_fails() {
        let dir = TempDir::new().unwrap();
        assert!(load_from_path(&dir.path().join("nope.toml")).is_err());
    }
}
