//! Wager settlement.
//!
//! Turns finished games into balance movements, profile counters, and
//! ledger rows. The settlement witness row makes replays harmless, so a
//! crash between the game completing and the payout landing is repaired
//! by settling again on the next access.

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::errors::{GameError, PontoonResult};
use crate::game::engine::{GameRecord, GameResult};
use crate::record_store::{LedgerEntry, LedgerEntryType, PlayerProfile, RecordStore};

/// Chips returned to the player for a finished game. Wins pay even money:
/// the stake back plus an equal amount. Pushes refund the stake. Losses
/// and forfeits return nothing; the stake was already deducted at deal.
pub fn payout(result: GameResult, bet_amount: u64) -> u64 {
    match result {
        GameResult::Win => bet_amount * 2,
        GameResult::Push => bet_amount,
        GameResult::Lose | GameResult::Forfeit => 0,
    }
}

fn entry_type_for(result: GameResult) -> LedgerEntryType {
    match result {
        GameResult::Win => LedgerEntryType::BetWon,
        GameResult::Push => LedgerEntryType::BetPush,
        GameResult::Lose | GameResult::Forfeit => LedgerEntryType::BetLost,
    }
}

/// What one settlement produced. `replayed` is set when the witness row
/// already existed and the stored outcome was returned untouched.
#[derive(Clone, Debug)]
pub struct SettlementOutcome {
    pub winnings: u64,
    pub new_balance: u64,
    pub entry_id: String,
    pub replayed: bool,
}

/// Check a proposed wager against the table minimum and the player's
/// balance before any cards are drawn.
pub fn validate_bet(
    profile: &PlayerProfile,
    bet_amount: u64,
    minimum_bet: u64,
) -> PontoonResult<()> {
    if bet_amount < minimum_bet {
        return Err(GameError::validation(format!(
            "Bet must be at least {} chips",
            minimum_bet
        )));
    }
    if profile.balance < bet_amount {
        return Err(GameError::InsufficientBalance {
            required: bet_amount,
            available: profile.balance,
        });
    }
    Ok(())
}

/// Deduct the stake for a freshly dealt game and commit the placement
/// batch. The profile is mutated in place; on error nothing is persisted
/// and the caller should reload before retrying.
pub fn place_bet(
    store: &RecordStore,
    profile: &mut PlayerProfile,
    game: &GameRecord,
    minimum_bet: u64,
) -> PontoonResult<LedgerEntry> {
    validate_bet(profile, game.bet_amount, minimum_bet)?;

    let balance_before = profile.balance;
    profile.balance -= game.bet_amount;
    profile.total_wagered += game.bet_amount;
    let expected_version = profile.version;
    profile.version += 1;
    profile.updated_at = Utc::now();

    let entry = LedgerEntry {
        id: Uuid::new_v4().to_string(),
        owner_id: profile.user_id.clone(),
        entry_type: LedgerEntryType::Bet,
        amount: -(game.bet_amount as i64),
        balance_before,
        balance_after: profile.balance,
        game_id: game.id.clone(),
        metadata: json!({ "bet_amount": game.bet_amount }),
        created_at: Utc::now(),
    };

    store.commit_bet_placement(profile, expected_version, game, &entry)?;
    Ok(entry)
}

/// Settle a completed game: credit the payout, bump the matching lifetime
/// counter, and append the settlement ledger entry, all in one batch.
///
/// Settling the same game twice returns the recorded outcome without
/// moving any chips.
pub fn settle_game(store: &RecordStore, game: &GameRecord) -> PontoonResult<SettlementOutcome> {
    let result = game
        .result
        .ok_or_else(|| GameError::InvalidState("Game has no recorded outcome yet".to_string()))?;

    if let Some(entry) = store.settlement_entry(&game.id)? {
        tracing::debug!(
            game_id = %game.id,
            entry_id = %entry.id,
            "Settlement already recorded, replaying stored outcome"
        );
        return Ok(SettlementOutcome {
            winnings: entry.amount.max(0) as u64,
            new_balance: entry.balance_after,
            entry_id: entry.id,
            replayed: true,
        });
    }

    let mut profile = store
        .load_profile(&game.owner_id)?
        .ok_or_else(|| GameError::not_found(format!("Profile {}", game.owner_id)))?;

    let winnings = payout(result, game.bet_amount);
    let balance_before = profile.balance;
    profile.balance += winnings;
    match result {
        GameResult::Win => profile.total_wins += 1,
        GameResult::Push => profile.total_pushes += 1,
        GameResult::Lose | GameResult::Forfeit => profile.total_losses += 1,
    }
    let expected_version = profile.version;
    profile.version += 1;
    profile.updated_at = Utc::now();

    let entry = LedgerEntry {
        id: Uuid::new_v4().to_string(),
        owner_id: profile.user_id.clone(),
        entry_type: entry_type_for(result),
        amount: winnings as i64,
        balance_before,
        balance_after: profile.balance,
        game_id: game.id.clone(),
        metadata: json!({
            "bet_amount": game.bet_amount,
            "player_score": game.player_score,
            "dealer_score": game.dealer_score,
            "result": result,
            "winnings": winnings,
        }),
        created_at: Utc::now(),
    };

    store.commit_settlement(&profile, expected_version, game, &entry)?;

    tracing::info!(
        game_id = %game.id,
        user_id = %game.owner_id,
        result = %result,
        winnings,
        new_balance = profile.balance,
        "Settled game"
    );

    Ok(SettlementOutcome {
        winnings,
        new_balance: profile.balance,
        entry_id: entry.id,
        replayed: false,
    })
}
