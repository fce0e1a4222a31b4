use thiserror::Error;

/// Closed error taxonomy for the game service. Every fallible operation in
/// the crate funnels into one of these variants; the API layer maps them to
/// HTTP statuses.
#[derive(Debug, Error)]
pub enum GameError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: u64, available: u64 },

    #[error("An active game already exists for this player")]
    ActiveGameExists { game_id: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Game belongs to another player")]
    Forbidden,

    #[error("Invalid game state: {0}")]
    InvalidState(String),

    #[error("Concurrent update conflict, please try again")]
    ConcurrencyConflict,

    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),
}

impl GameError {
    pub fn validation(message: impl Into<String>) -> Self {
        GameError::Validation(message.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        GameError::NotFound(what.into())
    }

    /// Whether retrying the whole read-mutate-commit sequence can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GameError::ConcurrencyConflict | GameError::PersistenceFailure(_)
        )
    }
}

impl From<rocksdb::Error> for GameError {
    fn from(err: rocksdb::Error) -> Self {
        GameError::PersistenceFailure(err.to_string())
    }
}

impl From<serde_json::Error> for GameError {
    fn from(err: serde_json::Error) -> Self {
        GameError::PersistenceFailure(format!("serialization: {}", err))
    }
}

pub type PontoonResult<T> = std::result::Result<T, GameError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_are_stable() {
        let err = GameError::InsufficientBalance {
            required: 100,
            available: 40,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient balance: required 100, available 40"
        );

        let err = GameError::validation("bet_amount must be positive");
        assert_eq!(
            err.to_string(),
            "Validation failed: bet_amount must be positive"
        );
    }

    #[test]
    fn serde_errors_map_to_persistence_failure() {
        let parse_err = serde_json::from_str::<u64>("not-a-number").unwrap_err();
        let err: GameError = parse_err.into();
        assert!(matches!(err, GameError::PersistenceFailure(_)));
        assert!(err.to_string().contains("serialization"));
    }

    #[test]
    fn only_conflict_and_persistence_are_retryable() {
        assert!(GameError::ConcurrencyConflict.is_retryable());
        assert!(GameError::PersistenceFailure("io".to_string()).is_retryable());
        assert!(!GameError::Forbidden.is_retryable());
        assert!(!GameError::not_found("game").is_retryable());
        assert!(!GameError::InvalidState("completed".to_string()).is_retryable());
    }
}
