use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid statistics cache: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("cannot watch {path:?}: {source}")]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("event loop: {0}")]
    EventLoop(String),
}

pub type Result<T> = std::result::Result<T, Error>;
