//! Per-player and per-game serialization for mutating requests.
//!
//! Async mutexes keyed on player and game ids remove in-process races;
//! the profile version check in the record store covers writers outside
//! this process. Retryable failures are re-run a bounded number of times
//! before surfacing to the caller.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::config::{AbandonmentPolicy, GuardConfig};
use crate::errors::{GameError, PontoonResult};
use crate::game::engine::GameRecord;
use crate::metrics::MetricsRegistry;

#[derive(Clone)]
pub struct SessionGuard {
    user_locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
    game_locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
    config: GuardConfig,
    metrics: MetricsRegistry,
}

impl SessionGuard {
    pub fn new(config: GuardConfig, metrics: MetricsRegistry) -> Self {
        Self {
            user_locks: Arc::new(DashMap::new()),
            game_locks: Arc::new(DashMap::new()),
            config,
            metrics,
        }
    }

    pub fn policy(&self) -> AbandonmentPolicy {
        self.config.abandonment_policy
    }

    /// Serialize all balance-moving work for one player. Lock ordering is
    /// always user before game; never acquire these the other way around.
    pub async fn lock_user(&self, user_id: &str) -> OwnedMutexGuard<()> {
        // The shard guard drops at the end of the statement, before the await.
        let lock = self
            .user_locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// Serialize state transitions for one game.
    pub async fn lock_game(&self, game_id: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .game_locks
            .entry(game_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// Run a read-mutate-commit sequence, re-running it after retryable
    /// failures up to `conflict_retry_limit` times. The operation must
    /// re-read its inputs on every call.
    pub async fn with_retries<T, F>(&self, mut operation: F) -> PontoonResult<T>
    where
        F: FnMut() -> PontoonResult<T>,
    {
        let mut attempt: u32 = 0;
        loop {
            match operation() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.config.conflict_retry_limit => {
                    attempt += 1;
                    if matches!(err, GameError::ConcurrencyConflict) {
                        self.metrics.record_version_conflict();
                    }
                    self.metrics.record_conflict_retry();
                    tracing::warn!(attempt, error = %err, "Retrying after retryable failure");
                    tokio::time::sleep(Duration::from_millis(self.config.conflict_retry_delay_ms))
                        .await;
                }
                Err(err) => {
                    if matches!(err, GameError::ConcurrencyConflict) {
                        self.metrics.record_version_conflict();
                    }
                    return Err(err);
                }
            }
        }
    }

    /// Whether a live game sat idle past the inactivity window.
    pub fn is_abandoned(&self, game: &GameRecord, now: DateTime<Utc>) -> bool {
        if !game.is_live() {
            return false;
        }
        let idle = now.signed_duration_since(game.last_activity_at);
        idle.num_seconds() >= self.config.inactivity_window_seconds as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::cards::{Card, Rank, Suit};
    use crate::game::deck::ScriptedDeck;
    use crate::game::engine;

    fn guard_with(config: GuardConfig) -> SessionGuard {
        SessionGuard::new(config, MetricsRegistry::new())
    }

    fn live_game() -> GameRecord {
        let deck = ScriptedDeck::new(
            [Rank::Five, Rank::Nine, Rank::Six, Rank::King]
                .iter()
                .map(|&rank| Card::face_up(rank, Suit::Hearts))
                .collect(),
        );
        engine::deal("alice", 100, &deck)
    }

    #[tokio::test]
    async fn user_lock_serializes_same_player() {
        let guard = guard_with(GuardConfig::default());

        let held = guard.lock_user("alice").await;
        let second = tokio::time::timeout(
            Duration::from_millis(50),
            guard.lock_user("alice"),
        )
        .await;
        assert!(second.is_err(), "second acquisition should block");

        drop(held);
        let reacquired = tokio::time::timeout(
            Duration::from_millis(50),
            guard.lock_user("alice"),
        )
        .await;
        assert!(reacquired.is_ok());
    }

    #[tokio::test]
    async fn different_players_do_not_contend() {
        let guard = guard_with(GuardConfig::default());

        let _alice = guard.lock_user("alice").await;
        let bob = tokio::time::timeout(Duration::from_millis(50), guard.lock_user("bob")).await;
        assert!(bob.is_ok());
    }

    #[tokio::test]
    async fn retries_stop_after_the_configured_limit() {
        let guard = guard_with(GuardConfig {
            conflict_retry_limit: 2,
            conflict_retry_delay_ms: 1,
            ..Default::default()
        });

        let mut calls = 0;
        let result: PontoonResult<()> = guard
            .with_retries(|| {
                calls += 1;
                Err(GameError::ConcurrencyConflict)
            })
            .await;

        assert!(matches!(result, Err(GameError::ConcurrencyConflict)));
        // First attempt plus two retries.
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn non_retryable_errors_surface_immediately() {
        let guard = guard_with(GuardConfig::default());

        let mut calls = 0;
        let result: PontoonResult<()> = guard
            .with_retries(|| {
                calls += 1;
                Err(GameError::Forbidden)
            })
            .await;

        assert!(matches!(result, Err(GameError::Forbidden)));
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn retry_succeeds_once_the_conflict_clears() {
        let guard = guard_with(GuardConfig {
            conflict_retry_delay_ms: 1,
            ..Default::default()
        });

        let mut calls = 0;
        let result = guard
            .with_retries(|| {
                calls += 1;
                if calls < 3 {
                    Err(GameError::ConcurrencyConflict)
                } else {
                    Ok(calls)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn abandonment_needs_a_live_game_past_the_window() {
        let guard = guard_with(GuardConfig {
            inactivity_window_seconds: 60,
            ..Default::default()
        });

        let mut game = live_game();
        let now = Utc::now();
        assert!(!guard.is_abandoned(&game, now));

        game.last_activity_at = now - chrono::Duration::seconds(61);
        assert!(guard.is_abandoned(&game, now));

        engine::forfeit(&mut game).unwrap();
        assert!(!guard.is_abandoned(&game, now));
    }
}
