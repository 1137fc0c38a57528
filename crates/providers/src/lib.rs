//! Model gateway implementations for Cleaners.
//!
//! All gateways implement `cleaners_core::ModelGateway`; the OpenAI-compatible
//! one also implements `cleaners_core::Embedder` for vector search.

pub mod builder;
pub mod openai_compat;

pub use builder::{build_embedder, build_gateway, default_base_url};
pub use openai_compat::{ModelSettings, OpenAiCompatGateway};
