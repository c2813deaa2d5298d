#![deny(missing_docs)]
//! The `deckgen` command line runs the deck generation pipeline against a
//! Rig completion model and stores the resulting decks as JSON files.

/// Rig-backed LLM capability.
pub mod backend;
/// Provider client configuration.
pub mod config;
/// Error types for the command line.
pub mod errors;
/// JSON file storage for generated decks.
pub mod store;

pub use backend::RigBackend;
pub use config::ClientConfig;
pub use errors::CliError;
pub use store::{CardRecord, DeckRecord, JsonFileStore};
