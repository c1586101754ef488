//! MFA code supplier port
//!
//! The wait for a secondary-verification code is an explicit state with a
//! bounded timeout. The code itself comes from whatever implements this
//! trait: a terminal prompt, an environment variable, or a test harness.

use async_trait::async_trait;

use crate::domain::MfaChallenge;

#[async_trait]
pub trait IMfaCodeSupplier: Send + Sync {
    /// Asks for one code for `challenge`
    ///
    /// Returns `None` when no code can be supplied (input closed). The caller
    /// bounds the wait with the challenge's maximum duration, so an
    /// implementation may block for as long as it likes.
    async fn request_code(&self, challenge: &MfaChallenge) -> Option<String>;
}
