//! Identity resolver: claims from the identity provider to a durable user.

use serde::Serialize;
use tracing::{debug, info};

use super::builder::ControlPlane;
use super::context::require_input;
use super::workflows::Onboarding;
use crate::domain::{Claims, ControlError, ErrorKind, Key, Slug, User};
use crate::store::Tables;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedIdentity {
    pub user: Key<User>,
    pub slug: Slug,
    /// True when this call onboarded the user.
    pub is_new_user: bool,
}

impl ControlPlane {
    /// Resolve `claims` to a user, onboarding them on first contact.
    ///
    /// A stored user whose username disagrees with the token is never
    /// reconciled. Two first contacts racing on the same subject both end up
    /// with the one user that committed.
    #[tracing::instrument(name = "resolve_identity", skip_all, fields(subject = %claims.subject))]
    pub async fn resolve(&self, claims: &Claims) -> Result<ResolvedIdentity, ControlError> {
        require_input(&claims.subject, "subject")?;
        if let Some(found) = existing(&self.snapshot(), claims)? {
            return Ok(found);
        }

        match self.run(&Onboarding, None, claims.clone()).await {
            Ok(onboarded) => {
                info!(user = %onboarded.user, "new user resolved");
                Ok(ResolvedIdentity {
                    user: onboarded.user,
                    slug: Slug::new(claims.preferred_username.trim()),
                    is_new_user: true,
                })
            }
            Err(err) if err.kind() == ErrorKind::Conflict => {
                debug!(error = %err, "onboarding lost a race, re-reading");
                existing(&self.snapshot(), claims)?.ok_or(err)
            }
            Err(err) => Err(err),
        }
    }
}

fn existing(tables: &Tables, claims: &Claims) -> Result<Option<ResolvedIdentity>, ControlError> {
    let Some(user) = tables.user_by_subject(claims.subject.trim()) else {
        return Ok(None);
    };
    if user.username != claims.preferred_username.trim() {
        return Err(ControlError::IdentityConflict {
            subject: claims.subject.clone(),
            token_username: claims.preferred_username.clone(),
            stored_username: user.username.clone(),
        });
    }
    if !user.deletion_status.is_active() {
        return Err(ControlError::Unauthenticated {
            reason: format!("user {} is deleted", user.slug),
        });
    }
    Ok(Some(ResolvedIdentity {
        user: user.id,
        slug: user.slug.clone(),
        is_new_user: false,
    }))
}
