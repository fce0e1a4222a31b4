//! Play advice from the player hand and the dealer up-card.
//!
//! The advisor is injected as a trait object so the table logic can be
//! swapped out; the built-in implementation is the deterministic
//! basic-strategy table for an infinite deck. It never sees the hole card.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::PontoonResult;
use crate::game::cards::{hand_value, Card, HandValue};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RecommendedAction {
    Hit,
    Stand,
}

impl fmt::Display for RecommendedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecommendedAction::Hit => write!(f, "hit"),
            RecommendedAction::Stand => write!(f, "stand"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Advice {
    pub recommended_action: RecommendedAction,
    pub reasoning: String,
}

#[async_trait]
pub trait Advisor: Send + Sync {
    async fn advise(&self, player_hand: &[Card], dealer_up_card: &Card) -> PontoonResult<Advice>;
}

/// Basic-strategy table reduced to hit/stand decisions.
pub struct BasicStrategyAdvisor;

#[async_trait]
impl Advisor for BasicStrategyAdvisor {
    async fn advise(&self, player_hand: &[Card], dealer_up_card: &Card) -> PontoonResult<Advice> {
        let value = hand_value(player_hand);
        let dealer_up = dealer_up_card.rank.value();
        let (recommended_action, reasoning) = decide(value, dealer_up);
        Ok(Advice {
            recommended_action,
            reasoning,
        })
    }
}

fn decide(value: HandValue, dealer_up: u32) -> (RecommendedAction, String) {
    let total = value.total;

    if total <= 11 {
        return (
            RecommendedAction::Hit,
            format!("A total of {} cannot bust, so drawing is free", total),
        );
    }

    if value.is_soft {
        return if total >= 18 {
            (
                RecommendedAction::Stand,
                format!("Soft {} is strong enough to stand on", total),
            )
        } else {
            (
                RecommendedAction::Hit,
                format!("Soft {} cannot bust and usually improves", total),
            )
        };
    }

    if total >= 17 {
        return (
            RecommendedAction::Stand,
            format!("Hard {} busts too often to draw again", total),
        );
    }

    // Stiff hands: stand when the dealer's up-card is weak.
    let dealer_weak = if total == 12 {
        (4..=6).contains(&dealer_up)
    } else {
        dealer_up <= 6
    };

    if dealer_weak {
        (
            RecommendedAction::Stand,
            format!(
                "The dealer shows {} and is likely to bust; hard {} should wait",
                dealer_up, total
            ),
        )
    } else {
        (
            RecommendedAction::Hit,
            format!(
                "The dealer shows {}; hard {} needs to improve to compete",
                dealer_up, total
            ),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::cards::{Rank, Suit};

    fn hand(ranks: &[Rank]) -> Vec<Card> {
        ranks
            .iter()
            .map(|&rank| Card::face_up(rank, Suit::Diamonds))
            .collect()
    }

    fn up(rank: Rank) -> Card {
        Card::face_up(rank, Suit::Spades)
    }

    async fn action(player: &[Rank], dealer_up: Rank) -> RecommendedAction {
        BasicStrategyAdvisor
            .advise(&hand(player), &up(dealer_up))
            .await
            .unwrap()
            .recommended_action
    }

    #[tokio::test]
    async fn eleven_or_less_always_hits() {
        assert_eq!(
            action(&[Rank::Five, Rank::Six], Rank::King).await,
            RecommendedAction::Hit
        );
        assert_eq!(
            action(&[Rank::Two, Rank::Three], Rank::Two).await,
            RecommendedAction::Hit
        );
    }

    #[tokio::test]
    async fn hard_seventeen_or_more_stands() {
        assert_eq!(
            action(&[Rank::Ten, Rank::Seven], Rank::Ace).await,
            RecommendedAction::Stand
        );
        assert_eq!(
            action(&[Rank::King, Rank::Queen], Rank::Six).await,
            RecommendedAction::Stand
        );
    }

    #[tokio::test]
    async fn soft_seventeen_hits_and_soft_eighteen_stands() {
        assert_eq!(
            action(&[Rank::Ace, Rank::Six], Rank::Ten).await,
            RecommendedAction::Hit
        );
        assert_eq!(
            action(&[Rank::Ace, Rank::Seven], Rank::Ten).await,
            RecommendedAction::Stand
        );
    }

    #[tokio::test]
    async fn stiff_hands_follow_the_dealer_up_card() {
        // Hard 16 against a strong card keeps drawing.
        assert_eq!(
            action(&[Rank::Ten, Rank::Six], Rank::Seven).await,
            RecommendedAction::Hit
        );
        // Hard 13 against a six waits for the dealer to bust.
        assert_eq!(
            action(&[Rank::Ten, Rank::Three], Rank::Six).await,
            RecommendedAction::Stand
        );
    }

    #[tokio::test]
    async fn hard_twelve_stands_only_against_four_through_six() {
        assert_eq!(
            action(&[Rank::Ten, Rank::Two], Rank::Four).await,
            RecommendedAction::Stand
        );
        assert_eq!(
            action(&[Rank::Ten, Rank::Two], Rank::Three).await,
            RecommendedAction::Hit
        );
        assert_eq!(
            action(&[Rank::Ten, Rank::Two], Rank::Seven).await,
            RecommendedAction::Hit
        );
    }

    #[tokio::test]
    async fn ace_up_card_counts_as_eleven() {
        assert_eq!(
            action(&[Rank::Ten, Rank::Six], Rank::Ace).await,
            RecommendedAction::Hit
        );
    }

    #[tokio::test]
    async fn reasoning_is_populated() {
        let advice = BasicStrategyAdvisor
            .advise(&hand(&[Rank::Ten, Rank::Seven]), &up(Rank::Five))
            .await
            .unwrap();
        assert!(!advice.reasoning.is_empty());
    }
}
