//! hbsync Core - Domain logic and business rules
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `Session`, `MfaChallenge`, `Gamekey`, `FetchBatch`, `SyncRun`
//!   and the library records produced by a sync
//! - **Use cases** - `AuthStateMachine`, which establishes and persists a session
//! - **Port definitions** - Traits for adapters: `ISessionStore`, `IBrowserDriver`,
//!   `ILibraryProvider`, `IDataSyncer`, `ICategorizer`
//! - **Retry policy** - The backoff schedule shared by login and batch retries
//!
//! # Architecture
//!
//! This crate follows the hexagonal (ports & adapters) architecture pattern.
//! The domain module contains pure business logic with no I/O.
//! Ports define trait interfaces that adapter crates implement.
//! Use cases orchestrate domain entities through port interfaces.

pub mod config;
pub mod domain;
pub mod ports;
pub mod retry;
pub mod usecases;
