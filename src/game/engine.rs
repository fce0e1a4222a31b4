//! The single-game state machine: deal, hit, stand, dealer play, and
//! outcome determination. Transitions mutate a `GameRecord` in place and
//! never touch storage; persistence is the caller's job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::errors::GameError;
use crate::game::cards::{self, Card, HandValue};
use crate::game::deck::DeckSource;

/// Lifecycle of a game
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    Playing,
    DealerTurn,
    Completed,
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameStatus::Playing => write!(f, "playing"),
            GameStatus::DealerTurn => write!(f, "dealer_turn"),
            GameStatus::Completed => write!(f, "completed"),
        }
    }
}

/// Final outcome of a completed game
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GameResult {
    Win,
    Lose,
    Push,
    Forfeit,
}

impl fmt::Display for GameResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameResult::Win => write!(f, "win"),
            GameResult::Lose => write!(f, "lose"),
            GameResult::Push => write!(f, "push"),
            GameResult::Forfeit => write!(f, "forfeit"),
        }
    }
}

/// Most recent player-visible action, kept for client display
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LastAction {
    BetPlaced,
    Hit,
    Stand,
    DealerCard,
}

/// The persisted game aggregate. One row per game; hands are stored in
/// deal order and values are recomputed from them on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameRecord {
    pub id: String,
    pub owner_id: String,
    pub bet_amount: u64,
    pub player_hand: Vec<Card>,
    pub dealer_hand: Vec<Card>,
    pub status: GameStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<GameResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_score: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dealer_score: Option<u32>,
    pub last_action: LastAction,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub version: u64,
}

impl GameRecord {
    pub fn player_value(&self) -> HandValue {
        cards::hand_value(&self.player_hand)
    }

    pub fn dealer_value(&self) -> HandValue {
        cards::hand_value(&self.dealer_hand)
    }

    /// Live games block the owner from starting a new one.
    pub fn is_live(&self) -> bool {
        matches!(self.status, GameStatus::Playing | GameStatus::DealerTurn)
    }

    fn touch(&mut self) {
        self.last_activity_at = Utc::now();
        self.version += 1;
    }
}

/// Granularity of one `dealer_draw` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DealerPlay {
    /// Draw at most one card, for clients animating card by card.
    OneCard,
    /// Keep drawing until the dealer must stand.
    ToCompletion,
}

/// Deal a fresh game: player, dealer, player, dealer hole (face down).
///
/// A player natural short-circuits: the hole card is revealed and the game
/// completes as a win, or a push against a dealer natural. The intermediate
/// states are never observable from outside.
pub fn deal(owner_id: &str, bet_amount: u64, deck: &dyn DeckSource) -> GameRecord {
    let first = deck.draw(false);
    let dealer_up = deck.draw(false);
    let second = deck.draw(false);
    let hole = deck.draw(true);

    let now = Utc::now();
    let mut game = GameRecord {
        id: Uuid::new_v4().to_string(),
        owner_id: owner_id.to_string(),
        bet_amount,
        player_hand: vec![first, second],
        dealer_hand: vec![dealer_up, hole],
        status: GameStatus::Playing,
        result: None,
        player_score: None,
        dealer_score: None,
        last_action: LastAction::BetPlaced,
        created_at: now,
        last_activity_at: now,
        completed_at: None,
        version: 1,
    };

    if cards::is_natural(&game.player_hand) {
        reveal_dealer_hand(&mut game);
        let result = if cards::is_natural(&game.dealer_hand) {
            GameResult::Push
        } else {
            GameResult::Win
        };
        complete(&mut game, result);
    }

    game
}

/// Draw one card into the player hand. Busting reveals the hole card and
/// completes the game as a loss.
pub fn hit(game: &mut GameRecord, deck: &dyn DeckSource) -> Result<(), GameError> {
    if game.status != GameStatus::Playing {
        return Err(GameError::InvalidState(
            "cannot hit in the current game state".to_string(),
        ));
    }

    game.player_hand.push(deck.draw(false));
    game.last_action = LastAction::Hit;
    game.touch();

    if game.player_value().total > 21 {
        reveal_dealer_hand(game);
        complete(game, GameResult::Lose);
    }

    Ok(())
}

/// Stop taking cards: reveal the dealer hole card and hand the turn over.
/// Draws nothing; dealer cards come from `dealer_draw` calls.
pub fn stand(game: &mut GameRecord) -> Result<(), GameError> {
    if game.status != GameStatus::Playing {
        return Err(GameError::InvalidState(
            "cannot stand in the current game state".to_string(),
        ));
    }

    reveal_dealer_hand(game);
    game.status = GameStatus::DealerTurn;
    game.last_action = LastAction::Stand;
    game.touch();
    Ok(())
}

/// Advance the dealer. The stand rule is evaluated from stored state on
/// every call: stand on hard 17 and anything 18+, hit soft 17 and below.
/// Once the dealer stands the outcome is decided and the game completes.
pub fn dealer_draw(
    game: &mut GameRecord,
    deck: &dyn DeckSource,
    mode: DealerPlay,
) -> Result<(), GameError> {
    if game.status != GameStatus::DealerTurn {
        return Err(GameError::InvalidState("not the dealer's turn".to_string()));
    }

    loop {
        let dealer = game.dealer_value();
        if dealer_stands(dealer) {
            let player = game.player_value();
            let result = compare_totals(player.total, dealer.total);
            game.last_action = LastAction::DealerCard;
            complete(game, result);
            game.touch();
            return Ok(());
        }

        game.dealer_hand.push(deck.draw(false));
        game.dealer_score = Some(game.dealer_value().total);
        game.last_action = LastAction::DealerCard;
        game.touch();

        if mode == DealerPlay::OneCard {
            return Ok(());
        }
    }
}

/// Force-complete a live game as a forfeit. The bet is not returned.
pub fn forfeit(game: &mut GameRecord) -> Result<(), GameError> {
    if !game.is_live() {
        return Err(GameError::InvalidState(
            "only a live game can be forfeited".to_string(),
        ));
    }

    reveal_dealer_hand(game);
    complete(game, GameResult::Forfeit);
    game.touch();
    Ok(())
}

fn dealer_stands(value: HandValue) -> bool {
    value.total >= 17 && !(value.total == 17 && value.is_soft)
}

fn compare_totals(player: u32, dealer: u32) -> GameResult {
    if dealer > 21 {
        GameResult::Win
    } else if player > dealer {
        GameResult::Win
    } else if player < dealer {
        GameResult::Lose
    } else {
        GameResult::Push
    }
}

fn reveal_dealer_hand(game: &mut GameRecord) {
    for card in &mut game.dealer_hand {
        card.reveal();
    }
}

fn complete(game: &mut GameRecord, result: GameResult) {
    game.player_score = Some(game.player_value().total);
    game.dealer_score = Some(game.dealer_value().total);
    game.status = GameStatus::Completed;
    game.result = Some(result);
    game.completed_at = Some(Utc::now());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::cards::{Rank, Suit};
    use crate::game::deck::ScriptedDeck;

    fn scripted(ranks: &[Rank]) -> ScriptedDeck {
        ScriptedDeck::new(
            ranks
                .iter()
                .map(|&rank| Card::face_up(rank, Suit::Spades))
                .collect(),
        )
    }

    #[test]
    fn deal_alternates_player_and_dealer() {
        let deck = scripted(&[Rank::Five, Rank::Nine, Rank::Six, Rank::King]);
        let game = deal("player-1", 100, &deck);

        assert_eq!(game.player_hand[0].rank, Rank::Five);
        assert_eq!(game.player_hand[1].rank, Rank::Six);
        assert_eq!(game.dealer_hand[0].rank, Rank::Nine);
        assert_eq!(game.dealer_hand[1].rank, Rank::King);
        assert!(game.dealer_hand[1].face_down);
        assert!(!game.dealer_hand[0].face_down);

        assert_eq!(game.status, GameStatus::Playing);
        assert_eq!(game.last_action, LastAction::BetPlaced);
        assert_eq!(game.result, None);
        assert!(game.is_live());
    }

    #[test]
    fn natural_deal_completes_as_win() {
        let deck = scripted(&[Rank::Ace, Rank::Nine, Rank::King, Rank::Five]);
        let game = deal("player-1", 100, &deck);

        assert_eq!(game.status, GameStatus::Completed);
        assert_eq!(game.result, Some(GameResult::Win));
        assert_eq!(game.player_score, Some(21));
        assert_eq!(game.dealer_score, Some(14));
        assert!(game.dealer_hand.iter().all(|card| !card.face_down));
        assert!(game.completed_at.is_some());
    }

    #[test]
    fn natural_against_dealer_natural_pushes() {
        let deck = scripted(&[Rank::Ace, Rank::Ace, Rank::King, Rank::King]);
        let game = deal("player-1", 100, &deck);

        assert_eq!(game.status, GameStatus::Completed);
        assert_eq!(game.result, Some(GameResult::Push));
        assert_eq!(game.player_score, Some(21));
        assert_eq!(game.dealer_score, Some(21));
    }

    #[test]
    fn hit_appends_and_stays_live_under_twenty_one() {
        let deck = scripted(&[Rank::Five, Rank::Nine, Rank::Six, Rank::King, Rank::Seven]);
        let mut game = deal("player-1", 100, &deck);

        hit(&mut game, &deck).unwrap();
        assert_eq!(game.player_hand.len(), 3);
        assert_eq!(game.player_value().total, 18);
        assert_eq!(game.status, GameStatus::Playing);
        assert_eq!(game.last_action, LastAction::Hit);
        assert!(game.dealer_hand[1].face_down);
    }

    #[test]
    fn busting_hit_completes_as_loss() {
        let deck = scripted(&[
            Rank::Ten,
            Rank::Nine,
            Rank::Six,
            Rank::King,
            Rank::Queen,
        ]);
        let mut game = deal("player-1", 100, &deck);

        hit(&mut game, &deck).unwrap();
        assert_eq!(game.status, GameStatus::Completed);
        assert_eq!(game.result, Some(GameResult::Lose));
        assert_eq!(game.player_score, Some(26));
        assert!(game.dealer_hand.iter().all(|card| !card.face_down));
    }

    #[test]
    fn hit_is_rejected_outside_playing() {
        let deck = scripted(&[Rank::Ten, Rank::Nine, Rank::Six, Rank::King]);
        let mut game = deal("player-1", 100, &deck);
        stand(&mut game).unwrap();

        let err = hit(&mut game, &deck).unwrap_err();
        assert!(matches!(err, GameError::InvalidState(_)));
    }

    #[test]
    fn stand_reveals_hole_and_draws_nothing() {
        let deck = scripted(&[Rank::Ten, Rank::Nine, Rank::Six, Rank::King]);
        let mut game = deal("player-1", 100, &deck);

        stand(&mut game).unwrap();
        assert_eq!(game.status, GameStatus::DealerTurn);
        assert_eq!(game.last_action, LastAction::Stand);
        assert_eq!(game.dealer_hand.len(), 2);
        assert!(game.dealer_hand.iter().all(|card| !card.face_down));
        assert_eq!(game.dealer_value().total, 19);

        let err = stand(&mut game).unwrap_err();
        assert!(matches!(err, GameError::InvalidState(_)));
    }

    #[test]
    fn dealer_stands_on_hard_seventeen() {
        // Player 20 vs dealer 10+7: dealer must not draw.
        let deck = scripted(&[Rank::Ten, Rank::Ten, Rank::Queen, Rank::Seven]);
        let mut game = deal("player-1", 100, &deck);
        stand(&mut game).unwrap();

        dealer_draw(&mut game, &deck, DealerPlay::OneCard).unwrap();
        assert_eq!(game.dealer_hand.len(), 2);
        assert_eq!(game.status, GameStatus::Completed);
        assert_eq!(game.result, Some(GameResult::Win));
        assert_eq!(game.player_score, Some(20));
        assert_eq!(game.dealer_score, Some(17));
    }

    #[test]
    fn dealer_hits_soft_seventeen() {
        // Dealer ace+6 is a soft 17 and must take a card.
        let deck = scripted(&[
            Rank::Ten,
            Rank::Ace,
            Rank::Queen,
            Rank::Six,
            Rank::Five,
        ]);
        let mut game = deal("player-1", 100, &deck);
        stand(&mut game).unwrap();

        dealer_draw(&mut game, &deck, DealerPlay::OneCard).unwrap();
        assert_eq!(game.dealer_hand.len(), 3);
        assert_eq!(game.status, GameStatus::DealerTurn);
        assert_eq!(game.dealer_score, Some(12));
    }

    #[test]
    fn dealer_draw_one_card_converges_with_to_completion() {
        let script = [
            Rank::Ten,
            Rank::Two,
            Rank::Queen,
            Rank::Three,
            Rank::Four,
            Rank::Five,
            Rank::Nine,
        ];

        let deck_a = scripted(&script);
        let mut stepped = deal("player-1", 100, &deck_a);
        stand(&mut stepped).unwrap();
        while stepped.status == GameStatus::DealerTurn {
            dealer_draw(&mut stepped, &deck_a, DealerPlay::OneCard).unwrap();
        }

        let deck_b = scripted(&script);
        let mut swept = deal("player-1", 100, &deck_b);
        stand(&mut swept).unwrap();
        dealer_draw(&mut swept, &deck_b, DealerPlay::ToCompletion).unwrap();

        assert_eq!(stepped.dealer_hand, swept.dealer_hand);
        assert_eq!(stepped.result, swept.result);
        assert_eq!(stepped.dealer_score, swept.dealer_score);
    }

    #[test]
    fn dealer_bust_wins_for_the_player() {
        // Dealer 10+6 then a king busts at 26.
        let deck = scripted(&[
            Rank::Two,
            Rank::Ten,
            Rank::Three,
            Rank::Six,
            Rank::King,
        ]);
        let mut game = deal("player-1", 100, &deck);
        stand(&mut game).unwrap();

        dealer_draw(&mut game, &deck, DealerPlay::ToCompletion).unwrap();
        assert_eq!(game.status, GameStatus::Completed);
        assert_eq!(game.result, Some(GameResult::Win));
        assert_eq!(game.dealer_score, Some(26));
        assert_eq!(game.player_score, Some(5));
    }

    #[test]
    fn equal_totals_push() {
        // Player 10+9 stands on 19; dealer 10+9 stands on 19.
        let deck = scripted(&[Rank::Ten, Rank::Ten, Rank::Nine, Rank::Nine]);
        let mut game = deal("player-1", 100, &deck);
        stand(&mut game).unwrap();

        dealer_draw(&mut game, &deck, DealerPlay::ToCompletion).unwrap();
        assert_eq!(game.result, Some(GameResult::Push));
    }

    #[test]
    fn dealer_draw_rejected_after_completion() {
        let deck = scripted(&[Rank::Ten, Rank::Ten, Rank::Queen, Rank::Seven]);
        let mut game = deal("player-1", 100, &deck);
        stand(&mut game).unwrap();
        dealer_draw(&mut game, &deck, DealerPlay::ToCompletion).unwrap();

        let err = dealer_draw(&mut game, &deck, DealerPlay::OneCard).unwrap_err();
        assert!(matches!(err, GameError::InvalidState(_)));
    }

    #[test]
    fn forfeit_completes_a_live_game() {
        let deck = scripted(&[Rank::Ten, Rank::Nine, Rank::Six, Rank::King]);
        let mut game = deal("player-1", 100, &deck);

        forfeit(&mut game).unwrap();
        assert_eq!(game.status, GameStatus::Completed);
        assert_eq!(game.result, Some(GameResult::Forfeit));
        assert!(game.dealer_hand.iter().all(|card| !card.face_down));

        let err = forfeit(&mut game).unwrap_err();
        assert!(matches!(err, GameError::InvalidState(_)));
    }

    #[test]
    fn version_advances_on_every_transition() {
        let deck = scripted(&[
            Rank::Five,
            Rank::Nine,
            Rank::Six,
            Rank::King,
            Rank::Two,
        ]);
        let mut game = deal("player-1", 100, &deck);
        let dealt = game.version;

        hit(&mut game, &deck).unwrap();
        assert!(game.version > dealt);

        let after_hit = game.version;
        stand(&mut game).unwrap();
        assert!(game.version > after_hit);
    }
}
