//! Categorizer port

use crate::domain::{Categorization, ProductRecord, SyncError};

/// Assigns a category to a product
///
/// Implementations are pure. An `Err` is never fatal: the caller degrades it
/// to [`Categorization::uncategorized`].
pub trait ICategorizer: Send + Sync {
    fn categorize(&self, product: &ProductRecord) -> Result<Categorization, SyncError>;
}
