//! Blackjack domain: cards, deck sources, state machine, strategy advice,
//! settlement, and the service tying them together.

pub mod advisor;
pub mod cards;
pub mod deck;
pub mod engine;
pub mod guard;
pub mod service;
pub mod settlement;
