use crate::icons::IconTheme;
use anyhow::Context;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const CONFIG_FILE_NAME: &str = "2fas-tray.conf";
pub const DEFAULT_FORMAT: &str = "{name} - {account}";
pub const DEFAULT_REFRESH_INTERVAL: i64 = 1;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot determine home directory")]
    NoHomeDir,
    #[error("value for `{key}` contains a line break")]
    Multiline { key: &'static str },
}

/// User preferences persisted as `key=value` lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preferences {
    pub icon: IconTheme,
    pub format: String,
    pub backup_path: String,
    /// Stored in clear text next to the other keys.
    pub default_passphrase: Option<String>,
    /// `<= 0` aligns refreshes to the 30 second OTP window.
    pub refresh_interval_secs: i64,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            icon: IconTheme::default(),
            format: DEFAULT_FORMAT.to_string(),
            backup_path: String::new(),
            default_passphrase: None,
            refresh_interval_secs: DEFAULT_REFRESH_INTERVAL,
        }
    }
}

type Setter = fn(&mut Preferences, &str);

/// Known keys and how each one is applied. Anything else in the file is ignored.
const FIELDS: &[(&str, Setter)] = &[
    ("icon", set_icon),
    ("twoFASPath", set_backup_path),
    ("format", set_format),
    ("defaultPassword", set_default_passphrase),
    ("updateMenuInterval", set_refresh_interval),
];

fn set_icon(p: &mut Preferences, v: &str) {
    p.icon = v.parse().unwrap_or_else(|_| {
        warn!("unknown icon theme `{v}`, using {}", IconTheme::default());
        IconTheme::default()
    });
}

fn set_backup_path(p: &mut Preferences, v: &str) {
    p.backup_path = v.to_string();
}

fn set_format(p: &mut Preferences, v: &str) {
    p.format = v.to_string();
}

fn set_default_passphrase(p: &mut Preferences, v: &str) {
    p.default_passphrase = (!v.is_empty()).then(|| v.to_string());
}

fn set_refresh_interval(p: &mut Preferences, v: &str) {
    match v.trim().parse::<i64>() {
        Ok(secs) => p.refresh_interval_secs = secs,
        Err(_) => warn!(
            "invalid updateMenuInterval `{v}`, keeping {}",
            p.refresh_interval_secs
        ),
    }
}

impl Preferences {
    pub fn parse(data: &str) -> Self {
        let mut prefs = Preferences::default();
        for (n, line) in data.lines().enumerate() {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                warn!("config line {} has no `=`, skipping", n + 1);
                continue;
            };
            match FIELDS.iter().find(|(name, _)| *name == key) {
                Some((_, set)) => set(&mut prefs, value),
                None => debug!("ignoring unknown config key `{key}`"),
            }
        }
        prefs
    }

    pub fn serialize(&self) -> Result<String, ConfigError> {
        let pairs: [(&'static str, String); 5] = [
            ("icon", self.icon.to_string()),
            ("twoFASPath", self.backup_path.clone()),
            ("format", self.format.clone()),
            ("defaultPassword", self.default_passphrase.clone().unwrap_or_default()),
            ("updateMenuInterval", self.refresh_interval_secs.to_string()),
        ];

        let mut out = String::new();
        for (key, value) in pairs {
            if value.contains(['\n', '\r']) {
                return Err(ConfigError::Multiline { key });
            }
            let _ = writeln!(out, "{key}={value}");
        }
        Ok(out)
    }
}

/// Owns the live [`Preferences`] and the file they are persisted to.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    prefs: Preferences,
}

impl ConfigStore {
    /// Reads the file at `path`, writing defaults first if it does not exist.
    pub fn load(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        if !path.is_file() {
            info!("no config at {}, writing defaults", path.display());
            let store = Self {
                path,
                prefs: Preferences::default(),
            };
            store.save()?;
            return Ok(store);
        }

        let data = std::fs::read_to_string(&path)
            .with_context(|| format!("cannot read config file {}", path.display()))?;
        Ok(Self {
            prefs: Preferences::parse(&data),
            path,
        })
    }

    pub fn save(&self) -> anyhow::Result<()> {
        save_config(&self.prefs, &self.path)
    }

    pub fn prefs(&self) -> &Preferences {
        &self.prefs
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Applies `f` and persists the result immediately.
    pub fn update(&mut self, f: impl FnOnce(&mut Preferences)) -> anyhow::Result<()> {
        f(&mut self.prefs);
        self.save()
    }
}

pub fn config_path() -> anyhow::Result<PathBuf> {
    let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
    Ok(home.join(".config").join(CONFIG_FILE_NAME))
}

pub fn save_config(prefs: &Preferences, path: &Path) -> anyhow::Result<()> {
    let s = prefs.serialize()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, s)
        .with_context(|| format!("cannot write config file {}", path.display()))?;
    Ok(())
}
