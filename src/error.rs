use thiserror::Error;

#[derive(Error, Debug)]
pub enum InfinityError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("Data corruption: {message}")]
    DataCorruption { message: String },
    #[error("Parse error: {message}")]
    Parse { message: String, line: Option<usize>, col: Option<usize> },
    #[error("Construction error: {0}")]
    Construction(String),
    #[error("Illegal argument: {0}")]
    IllegalArgument(String),
    #[error("Illegal state: {0}")]
    IllegalState(String),
    #[error("Dependency error: {0}")]
    Dependency(String),
    #[error("I/O error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, InfinityError>;

impl InfinityError {
    pub fn corruption(message: impl Into<String>) -> Self {
        Self::DataCorruption { message: message.into() }
    }
}

// Helper conversions
impl From<rusqlite::Error> for InfinityError {
    fn from(e: rusqlite::Error) -> Self { Self::Persistence(e.to_string()) }
}

impl From<std::io::Error> for InfinityError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::UnexpectedEof => Self::corruption(format!("truncated stream: {e}")),
            std::io::ErrorKind::InvalidData => Self::corruption(e.to_string()),
            _ => Self::Io(e.to_string()),
        }
    }
}

impl From<config::ConfigError> for InfinityError {
    fn from(e: config::ConfigError) -> Self { Self::Config(e.to_string()) }
}
