//! hbsync Sync - Batched library synchronization
//!
//! Provides:
//! - The sync orchestrator: session, discovery, batched fetches, hand-off to storage
//! - A sliding-window rate limiter for outbound requests
//! - Decomposition of order batches into bundle/product/download records
//! - A keyword-based default categorizer
//!
//! ## Modules
//!
//! - [`engine`] - `SyncOrchestrator` driving one sync run
//! - [`rate_limit`] - `SlidingWindowRateLimiter`
//! - [`parse`] - Order batch decomposition
//! - [`categorize`] - `KeywordCategorizer`

pub mod categorize;
pub mod engine;
pub mod parse;
pub mod rate_limit;

pub use categorize::KeywordCategorizer;
pub use engine::{SyncOrchestrator, SyncPorts, SyncSettings};
pub use rate_limit::SlidingWindowRateLimiter;
