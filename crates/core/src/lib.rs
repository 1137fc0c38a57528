//! # Cleaners Core
//!
//! Domain types, traits, and error definitions for the Cleaners
//! laundry-advice chat backend. This crate has **no framework dependencies**;
//! it defines the model every other crate implements against.
//!
//! ## Seams
//!
//! Each external collaborator is a trait here and implemented elsewhere:
//! - [`ModelGateway`] — hosted completion provider (`cleaners-providers`)
//! - [`Embedder`] / [`KnowledgeRetriever`] / [`ShopDirectory`] — vector search
//!   and shop lookup (`cleaners-knowledge`)
//! - [`SessionStore`] / [`ConversationStore`] — short-term and durable
//!   conversation memory (`cleaners-memory`)
//! - [`KnowledgeRepository`] — the curated knowledge catalogue (`cleaners-memory`)

pub mod caller;
pub mod conversation;
pub mod error;
pub mod gateway;
pub mod knowledge;
pub mod message;
pub mod session;
pub mod shop;

pub use caller::{Caller, UserId};
pub use conversation::{Conversation, ConversationStore, StoredMessage};
pub use error::{
    Error, GatewayError, KnowledgeError, LookupError, RetrievalError, Result, StoreError,
};
pub use gateway::{Completion, ModelGateway, Prompt, Usage};
pub use knowledge::{
    Difficulty, Embedder, KnowledgeCategory, KnowledgeItem, KnowledgeRepository, KnowledgeRetriever,
};
pub use message::{Role, SessionId, SessionMessage};
pub use session::SessionStore;
pub use shop::{PartnerShop, ShopDirectory, ShopPriority};
