//! Persistent player, game, and ledger records stored in RocksDB.
//!
//! Every balance-moving operation commits one atomic batch so the profile,
//! the game row, the active-game index, and the ledger can never disagree.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{GameError, PontoonResult};
use crate::game::engine::GameRecord;
use crate::storage::{Storage, StorageBatch};

const PROFILE_PREFIX: &str = "user:profile:";
const GAME_PREFIX: &str = "game:";
const ACTIVE_GAME_PREFIX: &str = "user:active:";
const LEDGER_ENTRY_PREFIX: &str = "ledger:entry:";
const LEDGER_GAME_PREFIX: &str = "ledger:game:";
const LEDGER_USER_PREFIX: &[u8] = b"ledger:user:";

/// Per-player chip balance and lifetime counters
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlayerProfile {
    pub user_id: String,
    pub balance: u64,
    pub total_wagered: u64,
    pub total_wins: u64,
    pub total_losses: u64,
    pub total_pushes: u64,
    pub total_chips_bought: u64,
    /// Optimistic-concurrency counter, bumped on every committed write
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PlayerProfile {
    pub fn new(user_id: &str, starting_balance: u64) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.to_string(),
            balance: starting_balance,
            total_wagered: 0,
            total_wins: 0,
            total_losses: 0,
            total_pushes: 0,
            total_chips_bought: 0,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Ledger entry kinds. The set is closed; chip purchases deliberately do
/// not appear here.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEntryType {
    Bet,
    BetWon,
    BetLost,
    BetPush,
}

impl fmt::Display for LedgerEntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerEntryType::Bet => write!(f, "bet"),
            LedgerEntryType::BetWon => write!(f, "bet_won"),
            LedgerEntryType::BetLost => write!(f, "bet_lost"),
            LedgerEntryType::BetPush => write!(f, "bet_push"),
        }
    }
}

/// Append-only audit row for one balance movement
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: String,
    pub owner_id: String,
    pub entry_type: LedgerEntryType,
    /// Signed chip delta: negative for the bet deduction, the returned
    /// winnings otherwise
    pub amount: i64,
    pub balance_before: u64,
    pub balance_after: u64,
    pub game_id: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

fn profile_key(user_id: &str) -> Vec<u8> {
    format!("{}{}", PROFILE_PREFIX, user_id).into_bytes()
}

fn game_key(game_id: &str) -> Vec<u8> {
    format!("{}{}", GAME_PREFIX, game_id).into_bytes()
}

fn active_game_key(user_id: &str) -> Vec<u8> {
    format!("{}{}", ACTIVE_GAME_PREFIX, user_id).into_bytes()
}

fn ledger_entry_key(entry_id: &str) -> Vec<u8> {
    format!("{}{}", LEDGER_ENTRY_PREFIX, entry_id).into_bytes()
}

fn ledger_game_bet_key(game_id: &str) -> Vec<u8> {
    format!("{}{}:bet", LEDGER_GAME_PREFIX, game_id).into_bytes()
}

/// The settlement witness row. Its presence is what makes re-settling a
/// completed game a no-op.
fn ledger_game_settlement_key(game_id: &str) -> Vec<u8> {
    format!("{}{}:settlement", LEDGER_GAME_PREFIX, game_id).into_bytes()
}

fn ledger_user_prefix(user_id: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(LEDGER_USER_PREFIX.len() + user_id.len() + 1);
    prefix.extend_from_slice(LEDGER_USER_PREFIX);
    prefix.extend_from_slice(user_id.as_bytes());
    prefix.push(b':');
    prefix
}

fn ledger_user_index_key(user_id: &str, created_at: DateTime<Utc>, entry_id: &str) -> Vec<u8> {
    // Sort newest-first by using inverted milliseconds as the sort key.
    // Key layout: prefix | user_id | ':' | inv_millis(be) | ':' | entry_id
    let millis = created_at.timestamp_millis().max(0) as u64;
    let inv_millis = u64::MAX - millis;
    let mut key = ledger_user_prefix(user_id);
    key.reserve(9 + entry_id.len());
    key.extend_from_slice(&inv_millis.to_be_bytes());
    key.push(b':');
    key.extend_from_slice(entry_id.as_bytes());
    key
}

/// Typed access to the persisted records. Cheap to clone; all clones share
/// one RocksDB handle.
#[derive(Clone)]
pub struct RecordStore {
    storage: Storage,
}

impl RecordStore {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    // ------------------------------------------------------------------
    // Profiles
    // ------------------------------------------------------------------

    pub fn load_profile(&self, user_id: &str) -> PontoonResult<Option<PlayerProfile>> {
        let Some(bytes) = self.storage.get(&profile_key(user_id))? else {
            return Ok(None);
        };

        let profile: PlayerProfile = serde_json::from_slice(&bytes).map_err(|e| {
            GameError::PersistenceFailure(format!(
                "Failed to decode profile for {}: {}",
                user_id, e
            ))
        })?;

        Ok(Some(profile))
    }

    /// First touch of an unknown player materializes and persists a fresh
    /// profile with the configured starting balance.
    pub fn load_or_create_profile(
        &self,
        user_id: &str,
        starting_balance: u64,
    ) -> PontoonResult<PlayerProfile> {
        if let Some(profile) = self.load_profile(user_id)? {
            return Ok(profile);
        }

        let profile = PlayerProfile::new(user_id, starting_balance);
        let bytes = encode_profile(&profile)?;
        self.storage.put(profile_key(user_id), bytes)?;
        tracing::info!(
            user_id,
            starting_balance,
            "Materialized new player profile"
        );
        Ok(profile)
    }

    /// Persist a profile-only mutation (chip purchase) guarded by the
    /// version the caller read.
    pub fn commit_profile(
        &self,
        profile: &PlayerProfile,
        expected_version: u64,
    ) -> PontoonResult<()> {
        self.check_profile_version(&profile.user_id, expected_version)?;
        self.storage
            .put(profile_key(&profile.user_id), encode_profile(profile)?)?;
        Ok(())
    }

    fn check_profile_version(&self, user_id: &str, expected: u64) -> PontoonResult<()> {
        match self.load_profile(user_id)? {
            Some(stored) if stored.version == expected => Ok(()),
            Some(stored) => {
                tracing::warn!(
                    user_id,
                    stored_version = stored.version,
                    expected_version = expected,
                    "Profile version mismatch"
                );
                Err(GameError::ConcurrencyConflict)
            }
            None if expected == 0 => Ok(()),
            None => Err(GameError::ConcurrencyConflict),
        }
    }

    // ------------------------------------------------------------------
    // Games
    // ------------------------------------------------------------------

    pub fn load_game(&self, game_id: &str) -> PontoonResult<Option<GameRecord>> {
        let Some(bytes) = self.storage.get(&game_key(game_id))? else {
            return Ok(None);
        };

        let game: GameRecord = serde_json::from_slice(&bytes).map_err(|e| {
            GameError::PersistenceFailure(format!("Failed to decode game {}: {}", game_id, e))
        })?;

        Ok(Some(game))
    }

    /// Single-row game update for transitions that move no chips
    /// (a non-busting hit, a stand, an intermediate dealer draw).
    pub fn store_game(&self, game: &GameRecord) -> PontoonResult<()> {
        self.storage.put(game_key(&game.id), encode_game(game)?)?;
        tracing::debug!(game_id = %game.id, status = %game.status, "Stored game row");
        Ok(())
    }

    pub fn active_game_id(&self, user_id: &str) -> PontoonResult<Option<String>> {
        let Some(bytes) = self.storage.get(&active_game_key(user_id))? else {
            return Ok(None);
        };
        Ok(Some(String::from_utf8_lossy(&bytes).to_string()))
    }

    /// Drop an active-game pointer whose game row is gone. Settlement
    /// normally clears the pointer in its batch; this is the repair path.
    pub fn clear_active_game(&self, user_id: &str) -> PontoonResult<()> {
        self.storage.delete(&active_game_key(user_id))?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Atomic multi-row commits
    // ------------------------------------------------------------------

    /// Bet deduction at deal time. One batch: debited profile, the new game
    /// row, the owner's active-game index row, and the `bet` ledger entry
    /// with its indexes. Fails with `ActiveGameExists` if the owner still
    /// has an index row; nothing is applied on failure.
    pub fn commit_bet_placement(
        &self,
        profile: &PlayerProfile,
        expected_version: u64,
        game: &GameRecord,
        entry: &LedgerEntry,
    ) -> PontoonResult<()> {
        self.check_profile_version(&profile.user_id, expected_version)?;

        if let Some(existing) = self.active_game_id(&profile.user_id)? {
            return Err(GameError::ActiveGameExists { game_id: existing });
        }

        let mut batch = StorageBatch::new();
        batch.put(profile_key(&profile.user_id), encode_profile(profile)?);
        batch.put(game_key(&game.id), encode_game(game)?);
        batch.put(active_game_key(&game.owner_id), game.id.as_bytes());
        batch.put(ledger_entry_key(&entry.id), encode_entry(entry)?);
        batch.put(ledger_game_bet_key(&game.id), entry.id.as_bytes());
        batch.put(
            ledger_user_index_key(&entry.owner_id, entry.created_at, &entry.id),
            entry.id.as_bytes(),
        );

        self.storage.commit(batch).map_err(|e| {
            GameError::PersistenceFailure(format!(
                "Failed to commit bet placement for game {}: {}",
                game.id, e
            ))
        })?;

        tracing::debug!(
            game_id = %game.id,
            user_id = %profile.user_id,
            bet_amount = game.bet_amount,
            new_balance = profile.balance,
            "Committed bet placement batch"
        );
        Ok(())
    }

    /// Outcome settlement. One batch: credited profile, the completed game
    /// row, deletion of the active-game index row, the settlement ledger
    /// entry with its indexes, and the settlement witness row.
    pub fn commit_settlement(
        &self,
        profile: &PlayerProfile,
        expected_version: u64,
        game: &GameRecord,
        entry: &LedgerEntry,
    ) -> PontoonResult<()> {
        self.check_profile_version(&profile.user_id, expected_version)?;

        let mut batch = StorageBatch::new();
        batch.put(profile_key(&profile.user_id), encode_profile(profile)?);
        batch.put(game_key(&game.id), encode_game(game)?);
        batch.delete(active_game_key(&game.owner_id));
        batch.put(ledger_entry_key(&entry.id), encode_entry(entry)?);
        batch.put(ledger_game_settlement_key(&game.id), entry.id.as_bytes());
        batch.put(
            ledger_user_index_key(&entry.owner_id, entry.created_at, &entry.id),
            entry.id.as_bytes(),
        );

        self.storage.commit(batch).map_err(|e| {
            GameError::PersistenceFailure(format!(
                "Failed to commit settlement for game {}: {}",
                game.id, e
            ))
        })?;

        tracing::debug!(
            game_id = %game.id,
            user_id = %profile.user_id,
            entry_type = %entry.entry_type,
            amount = entry.amount,
            new_balance = profile.balance,
            "Committed settlement batch"
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Ledger
    // ------------------------------------------------------------------

    pub fn load_entry(&self, entry_id: &str) -> PontoonResult<Option<LedgerEntry>> {
        let Some(bytes) = self.storage.get(&ledger_entry_key(entry_id))? else {
            return Ok(None);
        };

        let entry: LedgerEntry = serde_json::from_slice(&bytes).map_err(|e| {
            GameError::PersistenceFailure(format!(
                "Failed to decode ledger entry {}: {}",
                entry_id, e
            ))
        })?;

        Ok(Some(entry))
    }

    /// The settlement entry recorded for a game, if it settled already.
    pub fn settlement_entry(&self, game_id: &str) -> PontoonResult<Option<LedgerEntry>> {
        let Some(bytes) = self.storage.get(&ledger_game_settlement_key(game_id))? else {
            return Ok(None);
        };

        let entry_id = String::from_utf8_lossy(&bytes).to_string();
        match self.load_entry(&entry_id)? {
            Some(entry) => Ok(Some(entry)),
            None => {
                tracing::warn!(
                    game_id,
                    entry_id,
                    "Settlement witness points at a missing ledger entry"
                );
                Ok(None)
            }
        }
    }

    /// Ledger entries for one player, newest first.
    pub fn ledger_entries_for_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> PontoonResult<Vec<LedgerEntry>> {
        let rows = self.storage.scan_prefix(&ledger_user_prefix(user_id))?;

        let mut entries = Vec::new();
        for (_key, value) in rows {
            if entries.len() >= limit {
                break;
            }
            let entry_id = String::from_utf8_lossy(&value).to_string();
            match self.load_entry(&entry_id)? {
                Some(entry) => entries.push(entry),
                None => {
                    tracing::warn!(user_id, entry_id, "Ledger index points at a missing entry");
                }
            }
        }

        Ok(entries)
    }
}

fn encode_profile(profile: &PlayerProfile) -> PontoonResult<Vec<u8>> {
    serde_json::to_vec(profile).map_err(|e| {
        GameError::PersistenceFailure(format!(
            "Failed to encode profile for {}: {}",
            profile.user_id, e
        ))
    })
}

fn encode_game(game: &GameRecord) -> PontoonResult<Vec<u8>> {
    serde_json::to_vec(game).map_err(|e| {
        GameError::PersistenceFailure(format!("Failed to encode game {}: {}", game.id, e))
    })
}

fn encode_entry(entry: &LedgerEntry) -> PontoonResult<Vec<u8>> {
    serde_json::to_vec(entry).map_err(|e| {
        GameError::PersistenceFailure(format!("Failed to encode ledger entry {}: {}", entry.id, e))
    })
}
