//! Bounded retry-with-reauthentication

use std::future::Future;

use tracing::warn;

use super::errors::Result;

/// How many times a backend call may be attempted when its session expires.
///
/// Between two attempts the session is renewed once. Errors other than
/// `AuthExpired`, and any error from the final attempt, are returned as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReauthPolicy {
    pub max_attempts: usize,
}

impl Default for ReauthPolicy {
    fn default() -> Self {
        Self { max_attempts: 2 }
    }
}

impl ReauthPolicy {
    /// Run `call`, renewing the session with `reauth` when it reports
    /// `AuthExpired` and attempts remain.
    ///
    /// A failed renewal ends the loop with the renewal's error.
    pub async fn run<T, Call, CallFut, Reauth, ReauthFut>(
        &self,
        operation: &str,
        mut call: Call,
        mut reauth: Reauth,
    ) -> Result<T>
    where
        Call: FnMut() -> CallFut,
        CallFut: Future<Output = Result<T>>,
        Reauth: FnMut() -> ReauthFut,
        ReauthFut: Future<Output = Result<()>>,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Err(e) if e.is_auth_expired() && attempt < self.max_attempts => {
                    warn!(
                        operation = operation,
                        attempt = attempt,
                        max = self.max_attempts,
                        "Session expired, reauthenticating"
                    );
                    reauth().await?;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}
