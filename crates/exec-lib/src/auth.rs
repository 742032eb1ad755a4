//! Caller authorization
//!
//! A terminal belongs to exactly one user. Each request's token is
//! resolved to a user UID and compared with the configured owner.

use crate::cluster::ClientProvider;
use crate::error::SessionError;
use std::sync::Arc;
use tracing::{debug, warn};

const UNABLE_TO_VERIFY: &str = "unable to verify user";
const NOT_AUTHORIZED: &str = "the current user is not authorized to access this web terminal";

/// Verifies that a bearer token belongs to the terminal's owner
#[derive(Clone)]
pub struct Authenticator {
    provider: Arc<dyn ClientProvider>,
    authorized_uid: String,
}

impl Authenticator {
    pub fn new(provider: Arc<dyn ClientProvider>, authorized_uid: impl Into<String>) -> Self {
        Self {
            provider,
            authorized_uid: authorized_uid.into(),
        }
    }

    pub async fn authenticate(&self, token: &str) -> Result<(), SessionError> {
        let client = self.provider.client_for_token(token).map_err(|e| {
            warn!(error = %e, "Failed to create client for user token");
            SessionError::unauthorized(UNABLE_TO_VERIFY)
        })?;

        let uid = client.current_user_uid().await.map_err(|e| {
            warn!(error = %e, "Failed to resolve current user");
            SessionError::unauthorized(UNABLE_TO_VERIFY)
        })?;

        if uid != self.authorized_uid {
            debug!(uid = %uid, "Rejected request from non-owner");
            return Err(SessionError::unauthorized(NOT_AUTHORIZED));
        }
        Ok(())
    }
}
