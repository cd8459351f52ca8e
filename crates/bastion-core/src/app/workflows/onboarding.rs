use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::app::context::{WorkflowContext, require_input};
use crate::app::engine::Workflow;
use crate::domain::{
    ActivityKind, ActivityRefs, Claims, ControlError, DeletionStatus, EntityKind, Key, MemberRole,
    NewActivity, Organization, OrganizationMember, Season, Slug, Team, TeamMember, User,
    gravatar_url,
};
use crate::store::EntityStoreExt;

/// Just-in-time creation of a user and their private workspace.
///
/// One transaction creates the user, a solo organization with an owner
/// membership, a default team in the platform's default season with an
/// owner team membership, and the `UserRegister` activity, then points the
/// user's active membership and season at the new team.
pub struct Onboarding;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Onboarded {
    pub user: Key<User>,
    pub organization: Key<Organization>,
    pub team: Key<Team>,
    pub team_member: Key<TeamMember>,
    pub season: Key<Season>,
}

#[async_trait]
impl Workflow for Onboarding {
    const NAME: &'static str = "user.onboard.v1";
    type Input = Claims;
    type Output = Onboarded;

    #[tracing::instrument(name = "onboarding", skip_all, fields(subject = %claims.subject))]
    async fn execute(&self, ctx: &WorkflowContext, claims: Claims) -> Result<Onboarded, ControlError> {
        let subject = require_input(&claims.subject, "subject")?.to_string();
        let username = require_input(&claims.preferred_username, "preferred_username")?.to_string();
        if !claims.email_verified {
            return Err(ControlError::UnverifiedEmail { email: claims.email });
        }

        let services = ctx.services();
        let now = services.now();
        let avatar = gravatar_url(&claims.email);
        let org_slug = services.slug(EntityKind::Organization);
        let org_member_slug = services.slug(EntityKind::OrganizationMember);
        let team_slug = services.slug(EntityKind::Team);
        let member_slug = services.slug(EntityKind::TeamMember);

        let onboarded = services.store.transaction(|tx| {
            if tx.user_by_subject(&subject).is_some() {
                return Err(ControlError::conflict(EntityKind::User, &subject, "subject already onboarded"));
            }
            let season = tx
                .default_season()
                .map(|s| s.id)
                .ok_or_else(|| ControlError::not_found(EntityKind::Season, "default"))?;

            let user = tx.insert(|id| User {
                id,
                slug: Slug::new(username.clone()),
                username: username.clone(),
                email: claims.email.clone(),
                gravatar_url: avatar.clone(),
                oauth_subject: subject.clone(),
                active_team_member: None,
                active_season: None,
                deletion_status: DeletionStatus::Active,
                created_at: now,
                updated_at: now,
            })?;
            let organization = tx.insert(|id| Organization {
                id,
                slug: org_slug,
                name: username.clone(),
                gravatar_url: avatar.clone(),
                solo: true,
                deletion_status: DeletionStatus::Active,
                created_at: now,
                updated_at: now,
            })?;
            tx.insert(|id| OrganizationMember {
                id,
                slug: org_member_slug,
                organization,
                user,
                role: MemberRole::Owner,
                created_at: now,
            })?;
            let team = tx.insert(|id| Team {
                id,
                slug: team_slug,
                organization,
                season,
                is_default: true,
                deletion_status: DeletionStatus::Active,
                created_at: now,
                updated_at: now,
            })?;
            let team_member = tx.insert(|id| TeamMember {
                id,
                slug: member_slug,
                team,
                user,
                role: MemberRole::Owner,
                deletion_status: DeletionStatus::Active,
                created_at: now,
            })?;
            tx.append(
                NewActivity::new(ActivityKind::UserRegister, Some(user), now).refs(ActivityRefs {
                    user: Some(user),
                    organization: Some(organization),
                    team: Some(team),
                    team_member: Some(team_member),
                    season: Some(season),
                    ..ActivityRefs::default()
                }),
            )?;
            tx.update(user, |u| {
                u.active_team_member = Some(team_member);
                u.active_season = Some(season);
            })?;
            Ok(Onboarded {
                user,
                organization,
                team,
                team_member,
                season,
            })
        })?;

        info!(workflow = Self::NAME, user = %onboarded.user, username = %username, "user onboarded");
        Ok(onboarded)
    }
}
