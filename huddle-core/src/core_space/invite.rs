//! Invite tokens for workspaces and channels
//!
//! An invite is a signed token naming its target. Anyone holding a valid
//! token may join the target until the token expires.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use super::types::{ChannelId, WorkspaceId};
use crate::core_identity::token::{TokenError, TokenSigner};

/// What an invite grants access to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InviteScope {
    Workspace(WorkspaceId),
    Channel(ChannelId),
}

impl InviteScope {
    pub fn kind(&self) -> &'static str {
        match self {
            InviteScope::Workspace(_) => "workspace",
            InviteScope::Channel(_) => "channel",
        }
    }
}

#[derive(Serialize, Deserialize)]
struct InviteClaims {
    scope: InviteScope,
    nonce: String,
}

#[derive(Debug, Error)]
pub enum InviteError {
    #[error("Invite is invalid or expired")]
    InvalidOrExpired,

    #[error("Failed to issue invite: {0}")]
    Signing(String),
}

impl From<TokenError> for InviteError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Invalid => InviteError::InvalidOrExpired,
            TokenError::Signing(detail) => InviteError::Signing(detail),
        }
    }
}

/// Issues and verifies invite tokens
#[derive(Debug, Clone)]
pub struct InviteTokenService {
    signer: TokenSigner,
    default_ttl: Duration,
}

impl InviteTokenService {
    pub fn new(signer: TokenSigner, default_ttl: Duration) -> Self {
        InviteTokenService { signer, default_ttl }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Issue a token for `scope`. Callers check that the issuer is an admin
    /// of the target.
    pub fn issue(&self, scope: InviteScope, ttl: Duration) -> Result<String, InviteError> {
        let mut nonce = [0u8; 16];
        rand::rng().fill_bytes(&mut nonce);
        let claims = InviteClaims { scope, nonce: hex::encode(nonce) };
        Ok(self.signer.sign(&claims, ttl)?)
    }

    pub fn verify(&self, token: &str) -> Result<InviteScope, InviteError> {
        let claims: InviteClaims = self.signer.verify(token)?;
        Ok(claims.scope)
    }
}
