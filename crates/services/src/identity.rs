use cbt_core::model::UserIdentity;

/// Supplies the acting user. Read-only from the engine's point of view.
pub trait IdentityProvider: Send + Sync {
    fn current_user(&self) -> Option<UserIdentity>;
}

/// Identity provider that always reports the same user (or nobody).
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity {
    user: Option<UserIdentity>,
}

impl StaticIdentity {
    #[must_use]
    pub fn signed_in(user: UserIdentity) -> Self {
        Self { user: Some(user) }
    }

    #[must_use]
    pub fn anonymous() -> Self {
        Self { user: None }
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_user(&self) -> Option<UserIdentity> {
        self.user.clone()
    }
}
