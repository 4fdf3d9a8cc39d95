use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use tracing::{debug, info, trace, warn};

const DEFAULTS: [(&str, &str); 5] = [
    ("data.location", "~/.daybook"),
    ("default.command", "month"),
    ("color", "on"),
    ("day.start", "09:00"),
    ("day.stop", "18:00"),
];

/// Flat `key=value` configuration, seeded with defaults and layered from
/// `~/.daybookrc` (or `DAYBOOKRC`), `include` directives, and `rc.` overrides.
#[derive(Debug, Clone)]
pub struct Config {
    values: HashMap<String, String>,
    pub sources: Vec<PathBuf>,
}

impl Config {
    #[tracing::instrument(skip(rc_override))]
    pub fn load(rc_override: Option<&Path>) -> anyhow::Result<Self> {
        let mut cfg = Config {
            values: HashMap::new(),
            sources: vec![],
        };

        for (key, value) in DEFAULTS {
            cfg.values.insert(key.to_string(), value.to_string());
        }

        match resolve_rc_path(rc_override)? {
            Some(path) => {
                info!(daybookrc = %path.display(), "loading daybookrc");
                cfg.ingest_file(&path)?;
            }
            None => warn!("no daybookrc found; using defaults"),
        }

        Ok(cfg)
    }

    #[tracing::instrument(skip(self, overrides))]
    pub fn apply_overrides<I>(&mut self, overrides: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (k, v) in overrides {
            let key = k.strip_prefix("rc.").unwrap_or(&k).to_string();
            debug!(key = %key, value = %v, "applying override");
            self.values.insert(key, v);
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.values.get(key).map(|v| parse_bool(v))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.values.iter()
    }

    #[tracing::instrument(skip(self))]
    fn ingest_file(&mut self, path: &Path) -> anyhow::Result<()> {
        let path = expand_tilde(path);
        let text = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;

        self.sources.push(path.clone());

        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        for (line_no, raw) in text.lines().enumerate() {
            let line = strip_comment(raw);
            if line.is_empty() {
                continue;
            }

            if let Some(target) = line.strip_prefix("include ") {
                let include_path = resolve_include_path(&base_dir, target.trim())?;
                debug!(
                    file = %path.display(),
                    include = %include_path.display(),
                    line = line_no + 1,
                    "processing include"
                );

                if include_path.exists() {
                    self.ingest_file(&include_path)?;
                } else {
                    warn!(include = %include_path.display(), "include file does not exist; skipping");
                }
                continue;
            }

            let (k, v) = line.split_once('=').ok_or_else(|| {
                anyhow!(
                    "{}:{}: expected key=value, got: {raw}",
                    path.display(),
                    line_no + 1
                )
            })?;

            let key = k.trim().to_string();
            let value = v.trim().to_string();
            trace!(key = %key, value = %value, "loaded config key");
            self.values.insert(key, value);
        }

        Ok(())
    }
}

/// Trim a config line and drop everything after a `#`.
fn strip_comment(raw: &str) -> &str {
    let line = raw.trim();
    match line.find('#') {
        Some(idx) => line[..idx].trim(),
        None => line,
    }
}

#[tracing::instrument(skip(cfg, override_dir))]
pub fn resolve_data_dir(cfg: &Config, override_dir: Option<&Path>) -> anyhow::Result<PathBuf> {
    let dir = match (override_dir, cfg.get("data.location")) {
        (Some(path), _) => path.to_path_buf(),
        (None, Some(configured)) => expand_tilde(Path::new(&configured)),
        (None, None) => default_data_dir()?,
    };

    if !dir.exists() {
        info!(dir = %dir.display(), "creating data directory");
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }

    Ok(dir)
}

#[tracing::instrument(skip(override_path))]
fn resolve_rc_path(override_path: Option<&Path>) -> anyhow::Result<Option<PathBuf>> {
    if let Some(path) = override_path {
        return Ok(Some(path.to_path_buf()));
    }

    match std::env::var("DAYBOOKRC") {
        Ok(env_path) if env_path == "/dev/null" => return Ok(None),
        Ok(env_path) => return Ok(Some(PathBuf::from(env_path))),
        Err(_) => {}
    }

    let candidate = home_dir()?.join(".daybookrc");
    if candidate.exists() {
        Ok(Some(candidate))
    } else {
        Ok(None)
    }
}

fn default_data_dir() -> anyhow::Result<PathBuf> {
    Ok(home_dir()?.join(".daybook"))
}

fn home_dir() -> anyhow::Result<PathBuf> {
    dirs::home_dir().ok_or_else(|| anyhow!("cannot determine home directory"))
}

fn resolve_include_path(base_dir: &Path, include: &str) -> anyhow::Result<PathBuf> {
    if include.trim().is_empty() {
        return Err(anyhow!("include path cannot be empty"));
    }

    let expanded = expand_tilde(Path::new(include));
    if expanded.is_absolute() {
        Ok(expanded)
    } else {
        Ok(base_dir.join(expanded))
    }
}

fn expand_tilde(path: &Path) -> PathBuf {
    let text = path.to_string_lossy();
    if let Some(rest) = text.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    path.to_path_buf()
}

fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_ascii_lowercase().as_str(),
        "1" | "y" | "yes" | "on" | "true"
    )
}

#[cfg(test)]
mod tests {
    use super::strip_comment;

    #[test]
    fn comments_and_padding_are_stripped() {
        assert_eq!(strip_comment("  color = off  # disable ansi"), "color = off");
        assert_eq!(strip_comment("# whole line"), "");
        assert_eq!(strip_comment("   "), "");
    }
}
