use std::future::Future;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::prompt::ConfirmGate;

pub const REAUTH_PROMPT: &str = "Your credentials have expired, do you want to regenerate them?";

/// Obtains fresh credentials and installs them wherever they are used.
#[async_trait]
pub trait Reauthenticator: Send + Sync {
    async fn reauthenticate(&self) -> Result<()>;
}

/// Reruns a remote operation once after its credentials expired.
///
/// On [`RemoteError::AuthExpired`](crate::error::RemoteError::AuthExpired)
/// the user is asked whether to re-authenticate; on yes the credentials are
/// refreshed and the operation runs exactly one more time. A decline, a
/// failed refresh or a second expiry ends the command.
pub struct CredentialRetry<'a> {
    gate: &'a dyn ConfirmGate,
    reauth: &'a dyn Reauthenticator,
}

impl<'a> CredentialRetry<'a> {
    pub fn new(gate: &'a dyn ConfirmGate, reauth: &'a dyn Reauthenticator) -> Self {
        Self { gate, reauth }
    }

    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match operation().await {
            Err(e) if e.is_auth_expired() => {
                tracing::warn!("credentials expired");
                if !self.gate.confirm(REAUTH_PROMPT) {
                    return Err(Error::ReauthDeclined);
                }

                self.reauth.reauthenticate().await?;
                tracing::info!("authenticated successfully");

                operation().await.map_err(|e| {
                    if e.is_auth_expired() {
                        Error::AuthFailed(
                            "credentials were rejected again after re-authentication".to_string(),
                        )
                    } else {
                        e
                    }
                })
            }
            other => other,
        }
    }
}
