//! Descriptor (`.desktop` file) parsing.
//!
//! Only the `[Desktop Entry]` section is read, and only the handful of keys
//! the grid needs. Everything else in the file is skipped.

use crate::model::ApplicationRecord;
use log::debug;
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;

const HEADER: &str = "[Desktop Entry]";
const NO_DISPLAY: &str = "NoDisplay=true";
const TERMINAL: &str = "Terminal=true";

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("cannot read file: {0}")]
    Unreadable(#[from] io::Error),
    #[error("no [Desktop Entry] section")]
    MissingHeader,
    #[error("required key '{0}' is missing or empty")]
    MissingField(&'static str),
}

/// Result of parsing one descriptor.
#[derive(Debug)]
pub enum Outcome {
    Ok(ApplicationRecord),
    /// The file asks not to be displayed.
    Hidden,
    Error(ParseError),
}

/// Language and terminal settings the parser needs.
#[derive(Debug, Clone)]
pub struct ParserConfig {
    name_ln: String,
    comment_ln: String,
    term: String,
    home: Option<String>,
}

impl ParserConfig {
    pub fn new(lang: &str, term: impl Into<String>) -> Self {
        Self {
            name_ln: format!("Name[{lang}]="),
            comment_ln: format!("Comment[{lang}]="),
            term: term.into(),
            home: directories::BaseDirs::new()
                .map(|dirs| dirs.home_dir().to_string_lossy().into_owned()),
        }
    }

    /// Overrides the directory substituted for a leading `~/` in `Exec=`.
    pub fn with_home(mut self, home: Option<String>) -> Self {
        self.home = home;
        self
    }
}

#[derive(Clone, Copy)]
enum Field {
    Name,
    NameLn,
    Exec,
    Icon,
    Comment,
    CommentLn,
    MimeType,
    Categories,
}

pub fn parse_file(path: &Path, config: &ParserConfig) -> Outcome {
    match fs::read(path) {
        Ok(bytes) => parse_str(&String::from_utf8_lossy(&bytes), config),
        Err(e) => Outcome::Error(ParseError::Unreadable(e)),
    }
}

pub fn parse_str(content: &str, config: &ParserConfig) -> Outcome {
    let mut lines = content.lines();
    if !lines.by_ref().any(|line| line.starts_with(HEADER)) {
        return Outcome::Error(ParseError::MissingHeader);
    }

    let matches = [
        ("Name=", Field::Name),
        (config.name_ln.as_str(), Field::NameLn),
        ("Exec=", Field::Exec),
        ("Icon=", Field::Icon),
        ("Comment=", Field::Comment),
        (config.comment_ln.as_str(), Field::CommentLn),
        ("MimeType=", Field::MimeType),
        ("Categories=", Field::Categories),
    ];

    let mut record = ApplicationRecord::default();
    let mut name_ln = String::new();
    let mut comment_ln = String::new();

    for line in lines {
        // new section begins
        if line.starts_with('[') {
            break;
        }
        if line == NO_DISPLAY {
            return Outcome::Hidden;
        }
        if line == TERMINAL {
            record.terminal = true;
        }

        let Some((value, field)) = matches
            .iter()
            .find_map(|(prefix, field)| line.strip_prefix(*prefix).map(|value| (value, *field)))
        else {
            continue;
        };

        match field {
            Field::Name => record.name = value.to_string(),
            Field::NameLn => name_ln = value.to_string(),
            Field::Exec => record.exec = clean_exec(value, config.home.as_deref()),
            Field::Icon => record.icon = value.to_string(),
            Field::Comment => record.comment = value.to_string(),
            Field::CommentLn => comment_ln = value.to_string(),
            Field::MimeType => record.mime_type = value.to_string(),
            Field::Categories => {
                record.categories = value
                    .split(';')
                    .filter(|c| !c.is_empty())
                    .map(String::from)
                    .collect();
            }
        }
    }

    if !name_ln.is_empty() {
        record.name = name_ln;
    }
    if !comment_ln.is_empty() {
        record.comment = comment_ln;
    }
    if record.name.is_empty() {
        return Outcome::Error(ParseError::MissingField("Name"));
    }
    if record.exec.is_empty() {
        return Outcome::Error(ParseError::MissingField("Exec"));
    }
    if record.terminal {
        record.exec = format!("{} {}", config.term, record.exec);
    }

    debug!("Parsed descriptor '{}' -> '{}'", record.name, record.exec);
    Outcome::Ok(record)
}

/// Drops field codes (`%U`, `%f`, ...) and everything after them,
/// and expands a leading `~/`.
fn clean_exec(raw: &str, home: Option<&str>) -> String {
    let mut exec = String::new();
    let mut rest = raw;
    if let (Some(stripped), Some(home)) = (raw.strip_prefix("~/"), home) {
        exec.push_str(home);
        exec.push('/');
        rest = stripped;
    }
    let end = rest.find(" %").unwrap_or(rest.len());
    exec.push_str(&rest[..end]);
    exec
}

/// The desktop id of `file`: its path relative to the search root `dir`.
pub fn desktop_id(file: &Path, dir: &Path) -> Option<String> {
    let relative = file.strip_prefix(dir).ok()?;
    let id = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    if id.is_empty() { None } else { Some(id) }
}

pub fn looks_like_desktop_file(path: &Path) -> bool {
    path.extension().and_then(|s| s.to_str()) == Some("desktop")
}
