// libs/appointment-cell/src/services/identity.rs
use anyhow::Result;
use async_trait::async_trait;

use shared_models::auth::User;

/// Resolves the patient acting in the current booking attempt.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn current_user(&self) -> Result<Option<User>>;
}

/// An identity already established elsewhere, e.g. by the auth middleware.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity {
    user: Option<User>,
}

impl StaticIdentity {
    pub fn new(user: User) -> Self {
        Self { user: Some(user) }
    }

    pub fn anonymous() -> Self {
        Self { user: None }
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn current_user(&self) -> Result<Option<User>> {
        Ok(self.user.clone())
    }
}
