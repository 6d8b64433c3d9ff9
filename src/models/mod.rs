pub mod campaign;
pub mod conversation;
pub mod message;
pub mod outreach_queue;
pub mod user;

// Re-export core models for easy access
pub use campaign::{Campaign, NewCampaign};
pub use conversation::Conversation;
pub use message::{HistoryEntry, Message};
pub use outreach_queue::{ClaimedEntry, OutreachQueueEntry};
pub use user::{DemographicsUpdate, User};
