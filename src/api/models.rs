//! API request and response models
//!
//! Everything the wire sees. `GameView` is the one place the dealer hole
//! card gets censored; handlers never serialize a `GameRecord` directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::game::cards::{Card, Rank, Suit};
use crate::game::engine::{GameRecord, GameResult, GameStatus, LastAction};
use crate::record_store::PlayerProfile;

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DealRequest {
    pub bet_amount: u64,
}

/// Body shared by hit, stand, hint, and heartbeat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameActionRequest {
    pub game_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DealerCardRequest {
    pub game_id: String,
    /// Draw the whole dealer hand in one call instead of card by card.
    #[serde(default)]
    pub to_completion: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuyChipsRequest {
    pub amount: u64,
}

/// One card as the client sees it. Face-down cards carry no rank or suit
/// until the engine reveals them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rank: Option<Rank>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suit: Option<Suit>,
    pub face_down: bool,
}

impl From<&Card> for CardView {
    fn from(card: &Card) -> Self {
        if card.face_down {
            Self {
                rank: None,
                suit: None,
                face_down: true,
            }
        } else {
            Self {
                rank: Some(card.rank),
                suit: Some(card.suit),
                face_down: false,
            }
        }
    }
}

/// Client-facing game state. Totals are computed over face-up cards, so the
/// dealer total excludes the hole card until it is revealed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameView {
    pub id: String,
    pub status: GameStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<GameResult>,
    pub bet_amount: u64,
    pub player_hand: Vec<CardView>,
    pub dealer_hand: Vec<CardView>,
    pub player_total: u32,
    pub dealer_total: u32,
    pub last_action: LastAction,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&GameRecord> for GameView {
    fn from(game: &GameRecord) -> Self {
        Self {
            id: game.id.clone(),
            status: game.status,
            result: game.result,
            bet_amount: game.bet_amount,
            player_hand: game.player_hand.iter().map(CardView::from).collect(),
            dealer_hand: game.dealer_hand.iter().map(CardView::from).collect(),
            player_total: game.player_value().total,
            dealer_total: game.dealer_value().total,
            last_action: game.last_action,
            created_at: game.created_at,
            last_activity_at: game.last_activity_at,
            completed_at: game.completed_at,
        }
    }
}

/// `GET /api/game/active` payload. `game` is absent when the player has
/// nothing at the table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveGameResponse {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game: Option<GameView>,
}

/// One dealer-turn step. `new_balance` appears only on the call that
/// settled the game.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DealerStepResponse {
    pub game: GameView,
    pub needs_more_cards: bool,
    pub game_complete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_balance: Option<u64>,
}

/// Lifetime profile counters reported with the balance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerStats {
    pub total_wagered: u64,
    pub total_wins: u64,
    pub total_losses: u64,
    pub total_pushes: u64,
    pub total_chips_bought: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub balance: u64,
    pub stats: PlayerStats,
}

impl From<&PlayerProfile> for BalanceResponse {
    fn from(profile: &PlayerProfile) -> Self {
        Self {
            balance: profile.balance,
            stats: PlayerStats {
                total_wagered: profile.total_wagered,
                total_wins: profile.total_wins,
                total_losses: profile.total_losses,
                total_pushes: profile.total_pushes,
                total_chips_bought: profile.total_chips_bought,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuyChipsResponse {
    pub balance: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    pub refreshed: bool,
}
