//! Fetch batches
//!
//! Discovered gamekeys are fetched in bounded groups. [`partition`] splits
//! them in discovery order; each [`FetchBatch`] tracks its own retries.

use super::newtypes::Gamekey;

/// Default number of gamekeys per API call
pub const DEFAULT_BATCH_SIZE: usize = 35;

/// A bounded group of gamekeys submitted as one API call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchBatch {
    index: usize,
    gamekeys: Vec<Gamekey>,
    retry_count: u32,
    last_error: Option<String>,
}

impl FetchBatch {
    pub fn new(index: usize, gamekeys: Vec<Gamekey>) -> Self {
        Self {
            index,
            gamekeys,
            retry_count: 0,
            last_error: None,
        }
    }

    /// Zero-based ordinal of this batch within the run
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn gamekeys(&self) -> &[Gamekey] {
        &self.gamekeys
    }

    pub fn len(&self) -> usize {
        self.gamekeys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gamekeys.is_empty()
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Records a failed attempt that will be retried
    pub fn record_retry(&mut self, error: impl Into<String>) {
        self.retry_count += 1;
        self.last_error = Some(error.into());
    }

    /// Records the final error without consuming a retry
    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
    }
}

/// Splits `gamekeys` into batches of at most `batch_size`, preserving order
///
/// A `batch_size` of zero is treated as one.
pub fn partition(gamekeys: &[Gamekey], batch_size: usize) -> Vec<FetchBatch> {
    gamekeys
        .chunks(batch_size.max(1))
        .enumerate()
        .map(|(index, chunk)| FetchBatch::new(index, chunk.to_vec()))
        .collect()
}
