//! Core types: sessions, messages, the session repository, and the user profile.

pub mod profile;
pub mod repository;
pub mod state;

pub use profile::{UserProfile, ValidationError, validate_user_name};
pub use repository::{MigrationOutcome, Readiness, SessionRepository, SharedRepository};
pub use state::{Message, Role, Session};
