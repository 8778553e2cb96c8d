use thiserror::Error;

/// Errors raised by the dashboard library.
///
/// Most variants carry text that is shown to the user unchanged, so their
/// `Display` output is phrased as a user-facing message.
#[derive(Debug, Error)]
pub enum ArgusError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("seed file error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A form value failed a validation rule.
    #[error("{0}")]
    Validation(String),

    #[error("Username already exists")]
    UserExists,

    /// Unknown username and wrong password are deliberately indistinguishable.
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("password hashing failed: {0}")]
    PasswordHash(String),

    #[error("{kind} {id} already exists")]
    Duplicate { kind: &'static str, id: i64 },

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: i64 },

    #[error("database lock poisoned")]
    LockPoisoned,

    #[error("configuration error: {0}")]
    Config(String),

    #[cfg(feature = "web")]
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("AI service error: {0}")]
    Assistant(String),

    #[error("chart rendering failed: {0}")]
    Chart(String),

    #[error("template error: {0}")]
    Template(String),

    #[error("export failed: {0}")]
    Export(String),
}

pub type Result<T> = std::result::Result<T, ArgusError>;
