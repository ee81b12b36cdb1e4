//! The three error kinds from spec.md §7, each carrying the exit code
//! the CLI reports for it.

use thiserror::Error;

pub const EXIT_OK: i32 = 0;
pub const EXIT_SYSTEM: i32 = 5;
pub const EXIT_HTML: i32 = 10;
pub const EXIT_SCRIPT: i32 = 15;

#[derive(Debug, Error)]
pub enum HtmlError {
    #[error("maximum tree depth ({max}) exceeded at byte offset {offset}")]
    DepthExceeded { offset: usize, max: usize },
}

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("{message} (at byte offset {offset})")]
    Syntax { offset: usize, message: String },
}

impl ScriptError {
    pub fn at(offset: usize, message: impl Into<String>) -> Self {
        Self::Syntax { offset, message: message.into() }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("system error: {0}")]
    System(#[from] std::io::Error),
    #[error(transparent)]
    Html(#[from] HtmlError),
    #[error(transparent)]
    Script(#[from] ScriptError),
}

impl Error {
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::System(_) => EXIT_SYSTEM,
            Error::Html(_) => EXIT_HTML,
            Error::Script(_) => EXIT_SCRIPT,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
