//! The signed-in user's session view.

use serde::Serialize;

use super::builder::ControlPlane;
use crate::domain::{Claims, ControlError, Organization, Season, Slug, Team, User, Visibility};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    pub user: User,
    pub is_new_user: bool,
    pub team: Option<Team>,
    pub organization: Option<Organization>,
    pub season: Option<Season>,
    pub notifications: u32,
    /// Public seasons, each with the user's team in it when there is one.
    pub seasons: Vec<SeasonEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeasonEntry {
    pub season: Slug,
    pub name: String,
    pub is_default: bool,
    pub team: Option<Slug>,
}

impl ControlPlane {
    /// Resolve `claims` and describe the user's current workspace.
    pub async fn session(&self, claims: &Claims) -> Result<Session, ControlError> {
        let resolved = self.resolve(claims).await?;
        let tables = self.snapshot();
        let user = tables.require(resolved.user)?.clone();

        let team = user
            .active_team_member
            .and_then(|m| tables.get(m))
            .and_then(|m| tables.get(m.team))
            .cloned();
        let organization = team
            .as_ref()
            .and_then(|t| tables.get(t.organization))
            .cloned();
        let season = user.active_season.and_then(|s| tables.get(s)).cloned();

        let seasons = tables
            .rows::<Season>()
            .filter(|s| s.visibility == Visibility::Public)
            .map(|s| SeasonEntry {
                season: s.slug.clone(),
                name: s.name.clone(),
                is_default: s.is_default,
                team: tables
                    .membership_in_season(user.id, s.id)
                    .and_then(|m| tables.get(m.team))
                    .map(|t| t.slug.clone()),
            })
            .collect();

        Ok(Session {
            notifications: self.services().notifications.unread_count(user.id),
            is_new_user: resolved.is_new_user,
            user,
            team,
            organization,
            season,
            seasons,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::testing::{Harness, claims};
    use crate::app::workflows::{SeasonCreate, SeasonCreateInput};

    #[tokio::test]
    async fn session_describes_the_active_workspace() {
        let h = Harness::new();
        h.seed_season("s1", true);
        h.run(
            SeasonCreate,
            None,
            SeasonCreateInput {
                slug: "hidden".into(),
                name: "Hidden".into(),
                visibility: Visibility::Private,
                make_default: false,
            },
        )
        .await
        .unwrap();
        h.seed_season("s2", false);

        let session = h.plane.session(&claims("sub-1", "alice")).await.unwrap();
        assert!(session.is_new_user);
        assert_eq!(session.user.username, "alice");
        assert_eq!(session.season.unwrap().slug.as_str(), "s1");
        let team = session.team.unwrap();
        assert!(team.is_default);
        assert!(session.organization.unwrap().solo);
        assert_eq!(session.notifications, 0);

        let seasons: Vec<_> = session.seasons.iter().map(|s| s.season.as_str()).collect();
        assert_eq!(seasons, vec!["s1", "s2"]);
        assert_eq!(session.seasons[0].team.as_ref(), Some(&team.slug));
        assert_eq!(session.seasons[1].team, None);

        h.notifications.set(session.user.id, 4);
        let again = h.plane.session(&claims("sub-1", "alice")).await.unwrap();
        assert!(!again.is_new_user);
        assert_eq!(again.notifications, 4);
    }
}
