#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Mesh Core
//!
//! Orchestration core for conversational outreach campaigns over a
//! messaging channel: schedule opening messages to a recipient list at a
//! bounded rate, route inbound replies to the right in-flight conversation,
//! and drive each conversation to a terminal state exactly once under
//! concurrent webhook delivery and concurrent worker polling.
//!
//! ## Architecture
//!
//! PostgreSQL is the single source of truth; all coordination is expressed
//! as transactions, advisory locks, and skip-locked row claims against it.
//! The generation of message text and the outbound transport are external
//! collaborators behind narrow trait seams.
//!
//! ## Module Organization
//!
//! - [`models`] - Data layer: users, campaigns, conversations, messages, queue
//! - [`state_machine`] - Conversation statuses, transition table, inbound routing
//! - [`ingestion`] - Webhook processing and the per-mode state-machine handlers
//! - [`outreach`] - Background dispatcher draining the outreach queue
//! - [`campaigns`] - Launch/pause/completion lifecycle operations
//! - [`agent`] - Conversational response provider contract and HTTP client
//! - [`transport`] - Outbound message transport contract and HTTP client
//! - [`database`] - Pool, migrations, advisory-lock helpers
//! - [`web`] - Axum surface: webhook plus campaign management
//! - [`config`] - Typed configuration
//! - [`error`] - Structured error handling

pub mod agent;
pub mod campaigns;
pub mod config;
pub mod constants;
pub mod database;
pub mod error;
pub mod ingestion;
pub mod logging;
pub mod models;
pub mod outreach;
pub mod state_machine;
pub mod transport;
pub mod web;

pub use campaigns::{stagger_offset_seconds, CampaignLifecycle, LaunchResult};
pub use config::{
    AgentConfig, DatabaseConfig, MeshConfig, OutreachConfig, TransportConfig, WebConfig,
};
pub use error::{MeshError, Result};
pub use ingestion::InboundProcessor;
pub use outreach::{DispatcherHandle, OutreachDispatcher};
pub use state_machine::{
    CampaignStatus, ConversationStatus, InboundRoute, MessageSender, QueueStatus, RoutingSnapshot,
    UserStatus,
};
