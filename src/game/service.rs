//! Boundary operations wiring guard, engine, settlement, store, and cache.
//!
//! Handlers stay stateless: every operation loads the full game from
//! cache-or-store, applies one transition under the owner's locks, commits
//! through the record store, and re-caches what changed.

use std::sync::Arc;

use chrono::Utc;

use crate::api::cache::TableCache;
use crate::config::{AbandonmentPolicy, PontoonConfig, RulesConfig};
use crate::errors::{GameError, PontoonResult};
use crate::game::advisor::{Advice, Advisor};
use crate::game::deck::DeckSource;
use crate::game::engine::{self, DealerPlay, GameRecord, GameStatus};
use crate::game::guard::SessionGuard;
use crate::game::settlement::{self, SettlementOutcome};
use crate::metrics::MetricsRegistry;
use crate::record_store::{PlayerProfile, RecordStore};

/// Result of one dealer-turn step.
#[derive(Clone, Debug)]
pub struct DealerStepOutcome {
    pub game: GameRecord,
    pub needs_more_cards: bool,
    pub game_complete: bool,
    /// Present iff settlement committed in this call.
    pub new_balance: Option<u64>,
}

#[derive(Clone)]
pub struct GameService {
    store: RecordStore,
    cache: Arc<TableCache>,
    guard: SessionGuard,
    metrics: MetricsRegistry,
    deck: Arc<dyn DeckSource>,
    advisor: Arc<dyn Advisor>,
    rules: RulesConfig,
}

impl GameService {
    pub fn new(
        config: &PontoonConfig,
        store: RecordStore,
        cache: Arc<TableCache>,
        metrics: MetricsRegistry,
        deck: Arc<dyn DeckSource>,
        advisor: Arc<dyn Advisor>,
    ) -> Self {
        Self {
            guard: SessionGuard::new(config.guard.clone(), metrics.clone()),
            rules: config.rules.clone(),
            store,
            cache,
            metrics,
            deck,
            advisor,
        }
    }

    /// Deduct the stake and deal a fresh game. A stale or crash-leftover
    /// game is reconciled first; a live one rejects the new bet.
    pub async fn place_bet(&self, user_id: &str, bet_amount: u64) -> PontoonResult<GameRecord> {
        let _user = self.guard.lock_user(user_id).await;

        self.reconcile_active_game(user_id).await?;

        let profile = self
            .store
            .load_or_create_profile(user_id, self.rules.starting_balance)?;
        settlement::validate_bet(&profile, bet_amount, self.rules.minimum_bet)?;

        let game = engine::deal(user_id, bet_amount, self.deck.as_ref());

        let balance = self
            .guard
            .with_retries(|| {
                let mut profile = self
                    .store
                    .load_or_create_profile(user_id, self.rules.starting_balance)?;
                settlement::place_bet(&self.store, &mut profile, &game, self.rules.minimum_bet)?;
                Ok(profile.balance)
            })
            .await
            .map_err(|e| {
                self.cache.invalidate_user(user_id);
                e
            })?;

        let natural = game.status == GameStatus::Completed;
        self.metrics.record_deal(bet_amount, natural);
        tracing::info!(
            game_id = %game.id,
            user_id,
            bet_amount,
            natural,
            "Dealt new game"
        );

        self.cache.refresh_game(&game);
        self.cache.cache_balance(user_id, balance);

        if natural {
            self.settle_now(&game).await?;
        }

        Ok(game)
    }

    /// Draw one card for the player.
    pub async fn hit(&self, game_id: &str, user_id: &str) -> PontoonResult<GameRecord> {
        let _user = self.guard.lock_user(user_id).await;
        let _game = self.guard.lock_game(game_id).await;

        let mut game = self.load_owned_game(game_id, user_id)?;
        engine::hit(&mut game, self.deck.as_ref())?;

        if game.status == GameStatus::Completed {
            self.settle_now(&game).await?;
        } else {
            self.store.store_game(&game)?;
        }
        self.cache.refresh_game(&game);

        Ok(game)
    }

    /// Lock in the player total and reveal the hole card. Dealer cards are
    /// drawn by subsequent `dealer_step` calls.
    pub async fn stand(&self, game_id: &str, user_id: &str) -> PontoonResult<GameRecord> {
        let _user = self.guard.lock_user(user_id).await;
        let _game = self.guard.lock_game(game_id).await;

        let mut game = self.load_owned_game(game_id, user_id)?;
        engine::stand(&mut game)?;
        self.store.store_game(&game)?;
        self.cache.refresh_game(&game);

        Ok(game)
    }

    /// Advance the dealer turn. `OneCard` draws a single card so clients
    /// can pace the reveal; `ToCompletion` plays the dealer out in one call.
    /// Both converge on the same completed state.
    pub async fn dealer_step(
        &self,
        game_id: &str,
        user_id: &str,
        mode: DealerPlay,
    ) -> PontoonResult<DealerStepOutcome> {
        let _user = self.guard.lock_user(user_id).await;
        let _game = self.guard.lock_game(game_id).await;

        let mut game = self.load_owned_game(game_id, user_id)?;
        engine::dealer_draw(&mut game, self.deck.as_ref(), mode)?;

        let new_balance = if game.status == GameStatus::Completed {
            Some(self.settle_now(&game).await?.new_balance)
        } else {
            self.store.store_game(&game)?;
            None
        };
        self.cache.refresh_game(&game);

        let game_complete = game.status == GameStatus::Completed;
        Ok(DealerStepOutcome {
            needs_more_cards: !game_complete,
            game_complete,
            new_balance,
            game,
        })
    }

    /// The player's current game, if any, reconciled per the abandonment
    /// policy. Crash leftovers settle here; stale games are reaped.
    pub async fn active_game(&self, user_id: &str) -> PontoonResult<Option<GameRecord>> {
        let _user = self.guard.lock_user(user_id).await;

        let game_id = match self.cache.active_game_id(user_id) {
            Some(id) => id,
            None => match self.store.active_game_id(user_id)? {
                Some(id) => id,
                None => return Ok(None),
            },
        };

        let Some(game) = self.load_game_anywhere(&game_id)? else {
            tracing::warn!(user_id, game_id, "Active pointer without a game row, clearing");
            self.store.clear_active_game(user_id)?;
            self.cache.invalidate_user(user_id);
            return Ok(None);
        };

        if game.status == GameStatus::Completed {
            // Completed but still indexed: a crash beat the settlement batch.
            self.settle_now(&game).await?;
            self.cache.refresh_game(&game);
            return Ok(None);
        }

        if self.guard.is_abandoned(&game, Utc::now()) {
            tracing::info!(game_id = %game.id, user_id, "Reaping abandoned game as forfeit");
            self.forfeit_and_settle(game).await?;
            return Ok(None);
        }

        match self.guard.policy() {
            AbandonmentPolicy::Forfeit => {
                tracing::info!(
                    game_id = %game.id,
                    user_id,
                    "Forfeiting live game on reconnect per policy"
                );
                self.forfeit_and_settle(game).await?;
                Ok(None)
            }
            AbandonmentPolicy::Resume => {
                self.cache.refresh_game(&game);
                Ok(Some(game))
            }
        }
    }

    /// Profile behind the balance endpoint. First touch of an unknown id
    /// materializes a profile with the starting balance.
    pub fn profile(&self, user_id: &str) -> PontoonResult<PlayerProfile> {
        let profile = self
            .store
            .load_or_create_profile(user_id, self.rules.starting_balance)?;
        self.cache.cache_balance(user_id, profile.balance);
        Ok(profile)
    }

    /// Credit purchased chips. No ledger row; the ledger's type set covers
    /// wagers only, purchases live in the profile counter.
    pub async fn buy_chips(&self, user_id: &str, amount: u64) -> PontoonResult<u64> {
        if amount == 0 {
            return Err(GameError::validation(
                "Chip purchase amount must be greater than zero",
            ));
        }

        let _user = self.guard.lock_user(user_id).await;

        let balance = self
            .guard
            .with_retries(|| {
                let mut profile = self
                    .store
                    .load_or_create_profile(user_id, self.rules.starting_balance)?;
                let expected = profile.version;
                profile.balance += amount;
                profile.total_chips_bought += amount;
                profile.version += 1;
                profile.updated_at = Utc::now();
                self.store.commit_profile(&profile, expected)?;
                Ok(profile.balance)
            })
            .await
            .map_err(|e| {
                self.cache.invalidate_user(user_id);
                e
            })?;

        self.metrics.record_chip_purchase(amount);
        self.cache.cache_balance(user_id, balance);
        tracing::info!(user_id, amount, new_balance = balance, "Credited chip purchase");
        Ok(balance)
    }

    /// Advice for the current player hand against the dealer up-card.
    pub async fn hint(&self, game_id: &str, user_id: &str) -> PontoonResult<Advice> {
        let game = self.load_owned_game(game_id, user_id)?;
        if game.status != GameStatus::Playing {
            return Err(GameError::InvalidState(
                "Hints are only available while the hand is in play".to_string(),
            ));
        }
        let up_card = game
            .dealer_hand
            .first()
            .ok_or_else(|| GameError::InvalidState("Dealer has no up-card".to_string()))?;
        self.advisor.advise(&game.player_hand, up_card).await
    }

    /// Refresh cache TTLs for a live session. Never mutates game state or
    /// balance.
    pub fn heartbeat(&self, game_id: &str, user_id: &str) -> PontoonResult<()> {
        let game = self.load_owned_game(game_id, user_id)?;
        self.cache.refresh_game(&game);
        if let Some(balance) = self.cache.balance(user_id) {
            self.cache.cache_balance(user_id, balance);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn load_game_anywhere(&self, game_id: &str) -> PontoonResult<Option<GameRecord>> {
        if let Some(game) = self.cache.game(game_id) {
            return Ok(Some(game));
        }
        self.store.load_game(game_id)
    }

    fn load_owned_game(&self, game_id: &str, user_id: &str) -> PontoonResult<GameRecord> {
        let game = self
            .load_game_anywhere(game_id)?
            .ok_or_else(|| GameError::not_found(format!("Game {}", game_id)))?;
        if game.owner_id != user_id {
            return Err(GameError::Forbidden);
        }
        Ok(game)
    }

    /// Settle a completed game with retries. On failure the player's cached
    /// rows are dropped so nothing stale survives the error.
    async fn settle_now(&self, game: &GameRecord) -> PontoonResult<SettlementOutcome> {
        let outcome = self
            .guard
            .with_retries(|| settlement::settle_game(&self.store, game))
            .await
            .map_err(|e| {
                self.cache.invalidate_game(&game.id);
                self.cache.invalidate_user(&game.owner_id);
                e
            })?;

        if !outcome.replayed {
            if let Some(result) = game.result {
                self.metrics.record_settlement(result, outcome.winnings);
            }
        }
        self.cache.cache_balance(&game.owner_id, outcome.new_balance);
        Ok(outcome)
    }

    async fn forfeit_and_settle(&self, mut game: GameRecord) -> PontoonResult<SettlementOutcome> {
        engine::forfeit(&mut game)?;
        let outcome = self.settle_now(&game).await?;
        self.cache.refresh_game(&game);
        Ok(outcome)
    }

    /// Applied before a new deal: settle crash leftovers, reap stale games,
    /// reject while a live game is still in play.
    async fn reconcile_active_game(&self, user_id: &str) -> PontoonResult<()> {
        let Some(game_id) = self.store.active_game_id(user_id)? else {
            return Ok(());
        };

        let Some(game) = self.store.load_game(&game_id)? else {
            tracing::warn!(user_id, game_id, "Active pointer without a game row, clearing");
            self.store.clear_active_game(user_id)?;
            return Ok(());
        };

        if game.status == GameStatus::Completed {
            self.settle_now(&game).await?;
            return Ok(());
        }

        if self.guard.is_abandoned(&game, Utc::now()) {
            tracing::info!(game_id = %game.id, user_id, "Reaping abandoned game as forfeit");
            self.forfeit_and_settle(game).await?;
            return Ok(());
        }

        Err(GameError::ActiveGameExists { game_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheConfig, GuardConfig};
    use crate::game::advisor::{BasicStrategyAdvisor, RecommendedAction};
    use crate::game::cards::{Card, Rank, Suit};
    use crate::game::deck::ScriptedDeck;
    use crate::game::engine::GameResult;
    use crate::storage::Storage;
    use tempfile::TempDir;

    fn scripted(ranks: &[Rank]) -> ScriptedDeck {
        ScriptedDeck::new(
            ranks
                .iter()
                .map(|&rank| Card::face_up(rank, Suit::Hearts))
                .collect(),
        )
    }

    fn service_with(deck: ScriptedDeck, guard: GuardConfig) -> (TempDir, GameService) {
        let dir = TempDir::new().unwrap();
        let storage = Storage::open_at_path(dir.path()).unwrap();
        let store = RecordStore::new(storage);
        let metrics = MetricsRegistry::new();
        let cache = Arc::new(TableCache::new(
            &CacheConfig {
                capacity: 100,
                ttl_seconds: 60,
                cleanup_interval_seconds: 1,
            },
            metrics.clone(),
        ));

        let config = PontoonConfig {
            guard,
            ..Default::default()
        };
        let service = GameService::new(
            &config,
            store,
            cache,
            metrics,
            Arc::new(deck),
            Arc::new(BasicStrategyAdvisor),
        );
        (dir, service)
    }

    #[tokio::test]
    async fn place_bet_deducts_the_stake_and_opens_a_live_game() {
        let (_dir, service) = service_with(
            scripted(&[Rank::Five, Rank::Nine, Rank::Six, Rank::King]),
            GuardConfig::default(),
        );

        let game = service.place_bet("alice", 100).await.unwrap();
        assert_eq!(game.status, GameStatus::Playing);
        assert_eq!(game.bet_amount, 100);

        let profile = service.profile("alice").unwrap();
        assert_eq!(profile.balance, 400);
        assert_eq!(profile.total_wagered, 100);
        assert_eq!(
            service.store.active_game_id("alice").unwrap(),
            Some(game.id.clone())
        );
    }

    #[tokio::test]
    async fn second_bet_is_rejected_while_a_game_is_live() {
        let (_dir, service) = service_with(
            scripted(&[Rank::Five, Rank::Nine, Rank::Six, Rank::King]),
            GuardConfig::default(),
        );

        let game = service.place_bet("alice", 100).await.unwrap();
        let err = service.place_bet("alice", 100).await.unwrap_err();
        match err {
            GameError::ActiveGameExists { game_id } => assert_eq!(game_id, game.id),
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(service.profile("alice").unwrap().balance, 400);
    }

    #[tokio::test]
    async fn natural_deal_settles_immediately() {
        let (_dir, service) = service_with(
            scripted(&[Rank::Ace, Rank::Five, Rank::King, Rank::Nine]),
            GuardConfig::default(),
        );

        let game = service.place_bet("alice", 100).await.unwrap();
        assert_eq!(game.status, GameStatus::Completed);
        assert_eq!(game.result, Some(GameResult::Win));
        assert!(game.dealer_hand.iter().all(|card| !card.face_down));

        assert_eq!(service.profile("alice").unwrap().balance, 600);
        assert!(service.active_game("alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn natural_against_dealer_natural_pushes() {
        let (_dir, service) = service_with(
            scripted(&[Rank::Ace, Rank::Ace, Rank::King, Rank::Queen]),
            GuardConfig::default(),
        );

        let game = service.place_bet("alice", 100).await.unwrap();
        assert_eq!(game.result, Some(GameResult::Push));
        assert_eq!(service.profile("alice").unwrap().balance, 500);
    }

    #[tokio::test]
    async fn busting_hit_settles_the_loss() {
        let (_dir, service) = service_with(
            scripted(&[Rank::Ten, Rank::Ten, Rank::Six, Rank::Nine, Rank::King]),
            GuardConfig::default(),
        );

        let game = service.place_bet("alice", 100).await.unwrap();
        let after = service.hit(&game.id, "alice").await.unwrap();
        assert_eq!(after.status, GameStatus::Completed);
        assert_eq!(after.result, Some(GameResult::Lose));

        let profile = service.profile("alice").unwrap();
        assert_eq!(profile.balance, 400);
        assert_eq!(profile.total_losses, 1);
        assert!(service.active_game("alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stand_reveals_the_hole_card_and_draws_nothing() {
        let (_dir, service) = service_with(
            scripted(&[Rank::Ten, Rank::Six, Rank::Nine, Rank::Ten]),
            GuardConfig::default(),
        );

        let game = service.place_bet("alice", 100).await.unwrap();
        let after = service.stand(&game.id, "alice").await.unwrap();
        assert_eq!(after.status, GameStatus::DealerTurn);
        assert_eq!(after.dealer_hand.len(), 2);
        assert!(after.dealer_hand.iter().all(|card| !card.face_down));
    }

    #[tokio::test]
    async fn dealer_steps_converge_one_card_at_a_time() {
        let (_dir, service) = service_with(
            scripted(&[Rank::Ten, Rank::Six, Rank::Nine, Rank::Ten, Rank::Five]),
            GuardConfig::default(),
        );

        let game = service.place_bet("alice", 100).await.unwrap();
        service.stand(&game.id, "alice").await.unwrap();

        // Dealer holds 16 and must draw.
        let step1 = service
            .dealer_step(&game.id, "alice", DealerPlay::OneCard)
            .await
            .unwrap();
        assert!(step1.needs_more_cards);
        assert!(!step1.game_complete);
        assert!(step1.new_balance.is_none());

        // The 21 already drawn now stands and settles.
        let step2 = service
            .dealer_step(&game.id, "alice", DealerPlay::OneCard)
            .await
            .unwrap();
        assert!(step2.game_complete);
        assert_eq!(step2.game.result, Some(GameResult::Lose));
        assert_eq!(step2.new_balance, Some(400));

        let err = service
            .dealer_step(&game.id, "alice", DealerPlay::OneCard)
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::InvalidState(_)));
    }

    #[tokio::test]
    async fn dealer_step_to_completion_finishes_in_one_call() {
        let (_dir, service) = service_with(
            scripted(&[Rank::Ten, Rank::Six, Rank::Ten, Rank::Ten, Rank::Two]),
            GuardConfig::default(),
        );

        let game = service.place_bet("alice", 100).await.unwrap();
        service.stand(&game.id, "alice").await.unwrap();

        let outcome = service
            .dealer_step(&game.id, "alice", DealerPlay::ToCompletion)
            .await
            .unwrap();
        assert!(outcome.game_complete);
        assert_eq!(outcome.game.result, Some(GameResult::Win));
        assert_eq!(outcome.new_balance, Some(600));
    }

    #[tokio::test]
    async fn stale_game_is_reaped_before_the_next_deal() {
        let (_dir, service) = service_with(
            scripted(&[
                Rank::Five,
                Rank::Nine,
                Rank::Six,
                Rank::King,
                Rank::Five,
                Rank::Nine,
                Rank::Six,
                Rank::King,
            ]),
            GuardConfig {
                inactivity_window_seconds: 60,
                ..Default::default()
            },
        );

        let first = service.place_bet("alice", 100).await.unwrap();

        let mut stored = service.store.load_game(&first.id).unwrap().unwrap();
        stored.last_activity_at = Utc::now() - chrono::Duration::seconds(120);
        service.store.store_game(&stored).unwrap();

        let second = service.place_bet("alice", 50).await.unwrap();
        assert_ne!(second.id, first.id);
        assert_eq!(second.bet_amount, 50);

        let profile = service.profile("alice").unwrap();
        // 500 less the forfeited 100 and the fresh stake.
        assert_eq!(profile.balance, 350);
        assert_eq!(profile.total_losses, 1);

        let reaped = service.store.load_game(&first.id).unwrap().unwrap();
        assert_eq!(reaped.result, Some(GameResult::Forfeit));
    }

    #[tokio::test]
    async fn resume_policy_returns_the_live_game_unchanged() {
        let (_dir, service) = service_with(
            scripted(&[Rank::Five, Rank::Nine, Rank::Six, Rank::King]),
            GuardConfig::default(),
        );

        let game = service.place_bet("alice", 100).await.unwrap();
        let active = service.active_game("alice").await.unwrap().unwrap();
        assert_eq!(active.id, game.id);
        assert_eq!(active.version, game.version);
    }

    #[tokio::test]
    async fn forfeit_policy_reaps_on_reconnect() {
        let (_dir, service) = service_with(
            scripted(&[Rank::Five, Rank::Nine, Rank::Six, Rank::King]),
            GuardConfig {
                abandonment_policy: AbandonmentPolicy::Forfeit,
                ..Default::default()
            },
        );

        let game = service.place_bet("alice", 100).await.unwrap();
        assert!(service.active_game("alice").await.unwrap().is_none());

        let stored = service.store.load_game(&game.id).unwrap().unwrap();
        assert_eq!(stored.result, Some(GameResult::Forfeit));
        let profile = service.profile("alice").unwrap();
        assert_eq!(profile.balance, 400);
        assert_eq!(profile.total_losses, 1);
    }

    #[tokio::test]
    async fn buy_chips_credits_without_a_ledger_row() {
        let (_dir, service) = service_with(scripted(&[]), GuardConfig::default());

        let balance = service.buy_chips("alice", 250).await.unwrap();
        assert_eq!(balance, 750);

        let profile = service.profile("alice").unwrap();
        assert_eq!(profile.total_chips_bought, 250);
        assert!(service
            .store
            .ledger_entries_for_user("alice", 10)
            .unwrap()
            .is_empty());

        let err = service.buy_chips("alice", 0).await.unwrap_err();
        assert!(matches!(err, GameError::Validation(_)));
    }

    #[tokio::test]
    async fn hint_follows_ownership_and_game_state() {
        let (_dir, service) = service_with(
            scripted(&[Rank::Ten, Rank::Six, Rank::Nine, Rank::Ten]),
            GuardConfig::default(),
        );

        let game = service.place_bet("alice", 100).await.unwrap();

        let advice = service.hint(&game.id, "alice").await.unwrap();
        assert_eq!(advice.recommended_action, RecommendedAction::Stand);

        let err = service.hint(&game.id, "mallory").await.unwrap_err();
        assert!(matches!(err, GameError::Forbidden));

        service.stand(&game.id, "alice").await.unwrap();
        let err = service.hint(&game.id, "alice").await.unwrap_err();
        assert!(matches!(err, GameError::InvalidState(_)));
    }

    #[tokio::test]
    async fn heartbeat_never_mutates_the_game() {
        let (_dir, service) = service_with(
            scripted(&[Rank::Five, Rank::Nine, Rank::Six, Rank::King]),
            GuardConfig::default(),
        );

        let game = service.place_bet("alice", 100).await.unwrap();
        service.heartbeat(&game.id, "alice").unwrap();

        let stored = service.store.load_game(&game.id).unwrap().unwrap();
        assert_eq!(stored.version, game.version);
        assert_eq!(stored.last_activity_at, game.last_activity_at);
    }

    #[tokio::test]
    async fn foreign_and_missing_games_are_rejected() {
        let (_dir, service) = service_with(
            scripted(&[Rank::Five, Rank::Nine, Rank::Six, Rank::King]),
            GuardConfig::default(),
        );

        let game = service.place_bet("alice", 100).await.unwrap();

        let err = service.hit(&game.id, "mallory").await.unwrap_err();
        assert!(matches!(err, GameError::Forbidden));

        let err = service.hit("missing-game", "alice").await.unwrap_err();
        assert!(matches!(err, GameError::NotFound(_)));
    }
}
