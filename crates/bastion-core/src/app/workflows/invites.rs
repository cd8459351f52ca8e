//! Team invitations: sending and accepting.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::app::context::{WorkflowContext, lookup};
use crate::app::engine::Workflow;
use crate::domain::{
    ActivityKind, ActivityRefs, ControlError, DeletionStatus, EntityKind, Key, MemberRole,
    NewActivity, Organization, Slug, Team, TeamInvite, TeamMember, User,
};
use crate::store::{EntityStoreExt, Tables};

/// Invite a user into a team. Only owners of the team may invite.
pub struct InviteSend;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InviteSendInput {
    pub team: String,
    /// Surface identifier of the invited user.
    pub user: String,
    /// Surface identifier for the invite; generated when absent.
    #[serde(default)]
    pub slug: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteSent {
    pub invite: Key<TeamInvite>,
    pub slug: Slug,
}

#[async_trait]
impl Workflow for InviteSend {
    const NAME: &'static str = "team-invite.send.v1";
    type Input = InviteSendInput;
    type Output = InviteSent;

    #[tracing::instrument(name = "invite_send", skip_all, fields(team = %input.team, user = %input.user))]
    async fn execute(&self, ctx: &WorkflowContext, input: InviteSendInput) -> Result<InviteSent, ControlError> {
        let services = ctx.services();
        let now = services.now();
        let slug = match input.slug.as_deref().map(str::trim) {
            Some(slug) if !slug.is_empty() => Slug::new(slug),
            _ => services.slug(EntityKind::TeamInvite),
        };

        let sent = services.store.transaction(|tx| {
            let caller = ctx.require_caller(tx)?;
            let team = lookup::<Team>(tx, &input.team, "team")?.clone();
            if !team.deletion_status.is_active() {
                return Err(ControlError::not_found(EntityKind::Team, &input.team));
            }
            let is_owner = tx.rows::<TeamMember>().any(|m| {
                m.team == team.id
                    && m.user == caller
                    && m.role == MemberRole::Owner
                    && m.deletion_status.is_active()
            });
            if !is_owner {
                return Err(ControlError::Unauthenticated {
                    reason: format!("{caller} is not an owner of team {}", team.slug),
                });
            }
            let invitee = lookup::<User>(tx, &input.user, "user")?;
            if !invitee.deletion_status.is_active() {
                return Err(ControlError::not_found(EntityKind::User, &input.user));
            }
            let invitee = invitee.id;
            if tx
                .memberships_of(invitee)
                .any(|m| m.team == team.id && m.deletion_status.is_active())
            {
                return Err(ControlError::conflict(EntityKind::Team, &team.slug, "user is already a member"));
            }
            if tx.rows::<TeamInvite>().any(|i| i.team == team.id && i.user == invitee) {
                return Err(ControlError::conflict(EntityKind::TeamInvite, &team.slug, "invite already pending"));
            }

            let invite = tx.insert(|id| TeamInvite {
                id,
                slug: slug.clone(),
                team: team.id,
                user: invitee,
                created_at: now,
            })?;
            tx.append(
                NewActivity::new(ActivityKind::TeamInviteSend, Some(caller), now).refs(ActivityRefs {
                    team: Some(team.id),
                    user: Some(invitee),
                    organization: Some(team.organization),
                    season: Some(team.season),
                    ..ActivityRefs::default()
                }),
            )?;
            Ok(InviteSent { invite, slug: slug.clone() })
        })?;

        info!(workflow = Self::NAME, invite = %sent.slug, "team invite sent");
        Ok(sent)
    }
}

/// Accept a pending invite addressed to the caller.
///
/// Creating the membership, consuming the invite and writing the activity
/// happen in one transaction, so of two concurrent acceptances of the same
/// invite exactly one succeeds and the other sees the invite gone.
pub struct InviteAccept;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InviteAcceptInput {
    pub team_invite: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteAccepted {
    pub team_member: Key<TeamMember>,
    pub team: Key<Team>,
    pub organization: Key<Organization>,
    /// Solo workspace membership retired by this acceptance, if any.
    pub retired_team_member: Option<Key<TeamMember>>,
}

/// The caller's membership in their own solo workspace team of `season`.
fn solo_membership(tables: &Tables, user: Key<User>, season: Key<crate::domain::Season>) -> Option<Key<TeamMember>> {
    let member = tables.membership_in_season(user, season)?;
    let team = tables.get(member.team)?;
    let organization = tables.get(team.organization)?;
    let alone = tables
        .rows::<TeamMember>()
        .filter(|m| m.team == team.id && m.deletion_status.is_active())
        .all(|m| m.user == user);
    (organization.solo && alone).then_some(member.id)
}

#[async_trait]
impl Workflow for InviteAccept {
    const NAME: &'static str = "team-invite.accept.v1";
    type Input = InviteAcceptInput;
    type Output = InviteAccepted;

    #[tracing::instrument(name = "invite_accept", skip_all, fields(invite = %input.team_invite))]
    async fn execute(&self, ctx: &WorkflowContext, input: InviteAcceptInput) -> Result<InviteAccepted, ControlError> {
        if input.team_invite.trim().is_empty() {
            return Err(ControlError::MissingInput { field: "team_invite" });
        }
        let services = ctx.services();
        let now = services.now();
        let member_slug = services.slug(EntityKind::TeamMember);

        let accepted = services.store.transaction(|tx| {
            let caller = ctx.require_caller(tx)?;
            let invite = lookup::<TeamInvite>(tx, &input.team_invite, "team_invite")?;
            if invite.user != caller {
                return Err(ControlError::not_found(EntityKind::TeamInvite, &input.team_invite));
            }
            let invite_key = invite.id;
            let team = tx.require(invite.team)?.clone();
            if !team.deletion_status.is_active() {
                return Err(ControlError::not_found(EntityKind::Team, &team.slug));
            }

            let retired = match tx.membership_in_season(caller, team.season) {
                None => None,
                Some(existing) => match solo_membership(tx, caller, team.season) {
                    Some(solo) => Some(solo),
                    None => {
                        return Err(ControlError::conflict(
                            EntityKind::TeamMember,
                            &existing.slug,
                            "user already plays this season in another team",
                        ));
                    }
                },
            };
            if let Some(solo) = retired {
                tx.update(solo, |m| m.deletion_status = DeletionStatus::Deleted)?;
            }

            let team_member = tx.insert(|id| TeamMember {
                id,
                slug: member_slug,
                team: team.id,
                user: caller,
                role: MemberRole::Member,
                deletion_status: DeletionStatus::Active,
                created_at: now,
            })?;
            tx.delete(invite_key)?;

            let user = tx.require(caller)?;
            let repoint = user.active_season.is_none_or(|season| season == team.season);
            if repoint {
                tx.update(caller, |u| {
                    u.active_team_member = Some(team_member);
                    u.active_season = Some(team.season);
                    u.updated_at = now;
                })?;
            }

            let mut activity = NewActivity::new(ActivityKind::TeamInviteAccept, Some(caller), now).refs(ActivityRefs {
                team: Some(team.id),
                user: Some(caller),
                team_member: Some(team_member),
                organization: Some(team.organization),
                season: Some(team.season),
                ..ActivityRefs::default()
            });
            if let Some(solo) = retired {
                let slug = tx.require(solo)?.slug.clone();
                activity = activity.detail(serde_json::json!({ "retired_team_member": slug }));
            }
            tx.append(activity)?;

            Ok(InviteAccepted {
                team_member,
                team: team.id,
                organization: team.organization,
                retired_team_member: retired,
            })
        })?;

        info!(workflow = Self::NAME, team_member = %accepted.team_member, "team invite accepted");
        Ok(accepted)
    }
}
