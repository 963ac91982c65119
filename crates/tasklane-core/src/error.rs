use thiserror::Error;

#[derive(Debug, Error)]
pub enum TasklaneError {
    /// Unreadable config source or a value outside its allowed range.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl TasklaneError {
    /// Short error code string, printed by the worker CLI on fatal errors.
    pub fn code(&self) -> &'static str {
        match self {
            TasklaneError::Config(_) => "CONFIG_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, TasklaneError>;
