//! Chat exchange, simulated streaming, and orchestration.

pub mod exchange;
pub mod orchestrator;
pub mod reveal;

pub use exchange::{
    ExchangeClient, ExchangeRequest, ExchangeResponse, HistoryEntry, HttpExchangeClient,
};
pub use orchestrator::{APOLOGY_TEXT, AppState, ChatOrchestrator, SendOutcome};
pub use reveal::{RevealOutcome, RevealScheduler};
