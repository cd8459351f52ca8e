use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::app::context::WorkflowContext;
use crate::app::engine::Workflow;
use crate::domain::{
    ActivityKind, ActivityRefs, ControlError, DeletionStatus, Key, NewActivity, Organization,
    OrganizationMember, Slug, Team, TeamMember, User,
};
use crate::store::EntityStoreExt;

/// Soft-delete the calling user.
///
/// The user's memberships are retired. Teams of the user's solo
/// organization that have no other live member are retired too, and the
/// organization with them once none of its teams is left. Rows are never
/// removed, so the activity history keeps resolving.
pub struct UserDelete;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserDeleteInput {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDeleted {
    pub user: Key<User>,
    pub teams: Vec<Key<Team>>,
    pub organization: Option<Key<Organization>>,
}

#[async_trait]
impl Workflow for UserDelete {
    const NAME: &'static str = "user.delete.v1";
    type Input = UserDeleteInput;
    type Output = UserDeleted;

    #[tracing::instrument(name = "user_delete", skip_all)]
    async fn execute(&self, ctx: &WorkflowContext, input: UserDeleteInput) -> Result<UserDeleted, ControlError> {
        let now = ctx.services().now();
        let deleted = ctx.services().store.transaction(|tx| {
            let user = ctx.require_caller(tx)?;
            let solo = tx
                .rows::<OrganizationMember>()
                .filter(|m| m.user == user)
                .filter_map(|m| tx.get(m.organization))
                .find(|o| o.solo && o.deletion_status.is_active())
                .map(|o| o.id);

            let memberships: Vec<(Key<TeamMember>, Slug)> = tx
                .memberships_of(user)
                .filter(|m| m.deletion_status.is_active())
                .map(|m| (m.id, m.slug.clone()))
                .collect();
            for (member, _) in &memberships {
                tx.update(*member, |m| m.deletion_status = DeletionStatus::Deleted)?;
            }

            let mut retired_teams = Vec::new();
            if let Some(organization) = solo {
                let teams: Vec<Key<Team>> = tx
                    .rows::<Team>()
                    .filter(|t| t.organization == organization && t.deletion_status.is_active())
                    .map(|t| t.id)
                    .collect();
                for team in teams {
                    let occupied = tx
                        .rows::<TeamMember>()
                        .any(|m| m.team == team && m.deletion_status.is_active());
                    if !occupied {
                        tx.update(team, |t| {
                            t.deletion_status = DeletionStatus::Deleted;
                            t.updated_at = now;
                        })?;
                        retired_teams.push(team);
                    }
                }
            }
            let organization = match solo {
                Some(organization)
                    if !tx
                        .rows::<Team>()
                        .any(|t| t.organization == organization && t.deletion_status.is_active()) =>
                {
                    tx.update(organization, |o| {
                        o.deletion_status = DeletionStatus::Deleted;
                        o.updated_at = now;
                    })?;
                    Some(organization)
                }
                _ => None,
            };

            tx.update(user, |u| {
                u.deletion_status = DeletionStatus::Deleted;
                u.updated_at = now;
            })?;
            // The refs hold one team; the detail lists everything retired.
            let team_slugs: Vec<Slug> = retired_teams
                .iter()
                .filter_map(|t| tx.get(*t))
                .map(|t| t.slug.clone())
                .collect();
            let membership_slugs: Vec<Slug> = memberships.into_iter().map(|(_, slug)| slug).collect();
            let activity = NewActivity::new(ActivityKind::UserDelete, Some(user), now)
                .refs(ActivityRefs {
                    user: Some(user),
                    organization,
                    team: retired_teams.first().copied(),
                    ..ActivityRefs::default()
                })
                .detail(serde_json::json!({
                    "reason": input.reason,
                    "retired_teams": team_slugs,
                    "retired_memberships": membership_slugs,
                }));
            tx.append(activity)?;
            Ok::<_, ControlError>(UserDeleted {
                user,
                teams: retired_teams,
                organization,
            })
        })?;
        info!(workflow = Self::NAME, user = %deleted.user, "user deleted");
        Ok(deleted)
    }
}
