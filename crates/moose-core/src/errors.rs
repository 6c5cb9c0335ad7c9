/// Core error type for the bot.
///
/// Adapter crates map their specific errors into this type so the router can
/// tell user-facing failures (not found, transport) from startup failures.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no such moose: {0}")]
    NotFound(String),

    #[error("{0}")]
    Transport(String),

    #[error("protocol error: {0}")]
    Protocol(String),
}

pub type Result<T> = std::result::Result<T, Error>;
