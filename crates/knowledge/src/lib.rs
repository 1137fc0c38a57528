//! Knowledge retrieval and partner-shop lookup for Cleaners.
//!
//! - [`PineconeRetriever`] — embeds the question and formats the top matches
//!   of the laundry knowledge index as prompt context
//! - [`PineconeShopDirectory`] / [`StaticShopDirectory`] — partner shops by zipcode
//! - [`NoopRetriever`] — used when retrieval is disabled
//! - [`KnowledgeBase`] — curates knowledge items and keeps the index in step

pub mod builder;
pub mod catalog;
pub mod noop;
pub mod pinecone;
pub mod static_shops;

pub use builder::{build_knowledge_base, build_retriever, build_shop_directory};
pub use catalog::{DEFAULT_SEARCH_TOP_K, KnowledgeBase, KnowledgeDraft};
pub use noop::NoopRetriever;
pub use pinecone::{PineconeIndex, PineconeRetriever, PineconeShopDirectory, format_context};
pub use static_shops::StaticShopDirectory;
