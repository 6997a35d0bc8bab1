//! Error type shared by the calculator, integrator, store and engine

#[derive(Debug)]
pub enum EngineError {
    /// Non-finite, negative-where-impossible or out-of-order input
    InvalidInput(String),
    /// Any SQLite read/write failure (fatal to the invocation)
    Database(rusqlite::Error),
    Serialization(serde_json::Error),
    Io(std::io::Error),
    /// Host-level timeout around an invocation
    Timeout(u64),
    /// Background evaluation task panicked or was cancelled
    Task(String),
    LockPoisoned,
}

impl EngineError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        EngineError::InvalidInput(msg.into())
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(err: rusqlite::Error) -> Self {
        EngineError::Database(err)
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Serialization(err)
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Io(err)
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            EngineError::Database(e) => write!(f, "Database error: {}", e),
            EngineError::Serialization(e) => write!(f, "Serialization error: {}", e),
            EngineError::Io(e) => write!(f, "IO error: {}", e),
            EngineError::Timeout(ms) => write!(f, "Invocation timed out after {}ms", ms),
            EngineError::Task(msg) => write!(f, "Evaluation task failed: {}", msg),
            EngineError::LockPoisoned => write!(f, "Engine lock poisoned"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Database(e) => Some(e),
            EngineError::Serialization(e) => Some(e),
            EngineError::Io(e) => Some(e),
            _ => None,
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = EngineError::invalid("negative elapsed time: -5");
        assert_eq!(err.to_string(), "Invalid input: negative elapsed time: -5");

        let err = EngineError::Timeout(250);
        assert_eq!(err.to_string(), "Invocation timed out after 250ms");
    }

    #[test]
    fn test_from_rusqlite() {
        let err: EngineError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, EngineError::Database(_)));
        assert!(err.to_string().starts_with("Database error"));
    }
}
