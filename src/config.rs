use crate::error::Result;
use directories::{BaseDirs, ProjectDirs};
use log::{info, warn};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Deserialize, Debug, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
}

#[derive(Deserialize, Debug, Clone)]
pub struct GeneralConfig {
    #[serde(default)]
    pub terminal: Option<String>,
    #[serde(default)]
    pub lang: Option<String>,
    #[serde(default = "default_true")]
    pub favorites: bool,
    #[serde(default = "default_true")]
    pub pins: bool,
    #[serde(default = "default_columns")]
    pub columns: usize,
    #[serde(default)]
    pub dirs: Option<Vec<PathBuf>>,
}

fn default_true() -> bool { true }
fn default_columns() -> usize { 6 }

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            terminal: None,
            lang: None,
            favorites: true,
            pins: true,
            columns: default_columns(),
            dirs: None,
        }
    }
}

pub fn config_path() -> PathBuf {
    match ProjectDirs::from("org", "appgrid", "appgrid") {
        Some(dirs) => dirs.config_dir().join("config.toml"),
        None => PathBuf::from("config.toml"),
    }
}

pub fn load_config() -> Result<Config> {
    load_config_from(&config_path())
}

pub fn load_config_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    Ok(config)
}

/// Default search directories, highest precedence first.
pub fn app_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Some(base_dirs) = BaseDirs::new() {
        dirs.push(base_dirs.data_dir().join("applications"));
    }
    dirs.push(PathBuf::from("/usr/share/applications"));
    dirs.push(PathBuf::from("/usr/local/share/applications"));

    if let Ok(data_dirs) = env::var("XDG_DATA_DIRS") {
        dirs.extend(
            data_dirs
                .split(':')
                .filter(|d| !d.is_empty())
                .map(|d| Path::new(d).join("applications")),
        );
    }
    dedup_dirs(dirs)
}

/// Keeps the first occurrence of each directory; order is priority.
pub fn dedup_dirs(dirs: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::with_capacity(dirs.len());
    for dir in dirs {
        if !result.contains(&dir) {
            result.push(dir);
        }
    }
    result
}

/// Turns a `a:b:c` list into existing directories, logging the rejects.
pub fn custom_dirs(spec: &str) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    info!("Using custom .desktop files path(s):");
    for dir in spec.split(':').filter(|d| !d.is_empty()) {
        let path = PathBuf::from(dir);
        if path.is_dir() {
            info!("'{}' [OK]", dir);
            dirs.push(path);
        } else {
            warn!("'{}' [INVALID]", dir);
        }
    }
    dedup_dirs(dirs)
}

/// `LANG=de_DE.UTF-8` gives `de`.
pub fn detect_lang(explicit: Option<&str>) -> String {
    if let Some(lang) = explicit.filter(|l| !l.is_empty()) {
        return lang.to_string();
    }
    lang_from_env(env::var("LANG").ok().as_deref())
}

fn lang_from_env(value: Option<&str>) -> String {
    match value.filter(|v| !v.is_empty()) {
        Some(loc) => loc.split('_').next().unwrap_or(loc).to_string(),
        None => "en".to_string(),
    }
}

const KNOWN_TERMS: [(&str, &str); 11] = [
    ("alacritty", " -e"),
    ("kitty", " -e"),
    ("urxvt", " -e"),
    ("lxterminal", " -e"),
    ("sakura", " -e"),
    ("st", " -e"),
    ("termite", " -e"),
    ("terminator", " -e"),
    ("xfce4-terminal", " -e"),
    ("gnome-terminal", " -e"),
    ("foot", ""),
];

/// Command used to run `Terminal=true` entries.
pub fn detect_terminal(explicit: Option<&str>) -> String {
    if let Some(term) = explicit.filter(|t| !t.is_empty()) {
        return term.to_string();
    }
    if let Ok(term) = env::var("TERMCMD") {
        if !term.is_empty() {
            return term;
        }
    }
    let path_var = env::var("PATH").unwrap_or_default();
    probe_terminal(&path_var).unwrap_or_else(|| "xterm -e".to_string())
}

fn probe_terminal(path_var: &str) -> Option<String> {
    KNOWN_TERMS.iter().find_map(|(term, flag)| {
        path_var
            .split(':')
            .filter(|d| !d.is_empty())
            .any(|dir| Path::new(dir).join(term).is_file())
            .then(|| format!("{term}{flag}"))
    })
}
