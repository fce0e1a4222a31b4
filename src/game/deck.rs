use rand::Rng;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::game::cards::{Card, Rank, Suit};

/// Source of dealt cards. Implementations decide the probability model;
/// the engine only asks for the next card.
pub trait DeckSource: Send + Sync {
    fn draw(&self, face_down: bool) -> Card;
}

/// Infinite deck: every draw is an independent uniform pick over the 52
/// rank/suit combinations. There is no shoe to persist, so a stored game
/// can resume from its hands alone.
#[derive(Debug, Default)]
pub struct InfiniteDeck;

impl InfiniteDeck {
    pub fn new() -> Self {
        Self
    }
}

impl DeckSource for InfiniteDeck {
    fn draw(&self, face_down: bool) -> Card {
        let mut rng = rand::thread_rng();
        let rank = Rank::ALL[rng.gen_range(0..Rank::ALL.len())];
        let suit = Suit::ALL[rng.gen_range(0..Suit::ALL.len())];
        Card {
            rank,
            suit,
            face_down,
        }
    }
}

/// Deterministic source that replays a fixed sequence. Test support only;
/// panics when the script runs dry.
#[derive(Debug)]
pub struct ScriptedDeck {
    cards: Mutex<VecDeque<Card>>,
}

impl ScriptedDeck {
    pub fn new(cards: Vec<Card>) -> Self {
        Self {
            cards: Mutex::new(cards.into()),
        }
    }

    /// Append more cards to the script.
    pub fn extend(&self, cards: Vec<Card>) {
        let mut queue = match self.cards.lock() {
            Ok(queue) => queue,
            Err(poisoned) => poisoned.into_inner(),
        };
        queue.extend(cards);
    }

    pub fn remaining(&self) -> usize {
        match self.cards.lock() {
            Ok(queue) => queue.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

impl DeckSource for ScriptedDeck {
    fn draw(&self, face_down: bool) -> Card {
        let mut queue = match self.cards.lock() {
            Ok(queue) => queue,
            Err(poisoned) => poisoned.into_inner(),
        };
        match queue.pop_front() {
            Some(mut card) => {
                card.face_down = face_down;
                card
            }
            None => panic!("scripted deck ran out of cards"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infinite_deck_honours_face_down_flag() {
        let deck = InfiniteDeck::new();
        assert!(!deck.draw(false).face_down);
        assert!(deck.draw(true).face_down);
    }

    #[test]
    fn infinite_deck_produces_varied_ranks() {
        let deck = InfiniteDeck::new();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..200 {
            seen.insert(deck.draw(false).rank);
        }
        assert!(seen.len() > 1);
    }

    #[test]
    fn scripted_deck_replays_in_order() {
        let deck = ScriptedDeck::new(vec![
            Card::face_up(Rank::Ace, Suit::Spades),
            Card::face_up(Rank::King, Suit::Hearts),
        ]);
        assert_eq!(deck.remaining(), 2);

        let first = deck.draw(false);
        assert_eq!(first.rank, Rank::Ace);
        assert!(!first.face_down);

        let second = deck.draw(true);
        assert_eq!(second.rank, Rank::King);
        assert!(second.face_down);
        assert_eq!(deck.remaining(), 0);
    }

    #[test]
    fn scripted_deck_accepts_extensions() {
        let deck = ScriptedDeck::new(vec![Card::face_up(Rank::Two, Suit::Clubs)]);
        deck.extend(vec![Card::face_up(Rank::Three, Suit::Clubs)]);
        assert_eq!(deck.draw(false).rank, Rank::Two);
        assert_eq!(deck.draw(false).rank, Rank::Three);
    }

    #[test]
    #[should_panic(expected = "ran out of cards")]
    fn scripted_deck_panics_when_exhausted() {
        let deck = ScriptedDeck::new(vec![]);
        deck.draw(false);
    }
}
