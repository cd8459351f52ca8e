//! Demo platform: seed data and a walkthrough of the main workflows.

use bastion_core::app::workflows::{
    AgentRegister, AgentRegisterInput, ChallengeAdd, ChallengeAddInput, ChallengeFlavorAdd, FlavorAddInput,
    InstanceProvisioning, InviteAccept, InviteAcceptInput, InviteSend, InviteSendInput, ProvisionInput,
    SeasonChallengeAdd, SeasonChallengeAddInput, SeasonCreate, SeasonCreateInput, SubscribeInput, TeamSubscribe,
};
use bastion_core::app::{ActivityFilter, ControlPlane};
use bastion_core::domain::{Claims, ControlError, ReportedStatus, Visibility};
use bastion_core::impls::ScriptedAgentFleet;
use tracing::{info, warn};

use crate::output::{Output, activity_line};

const SEASON: &str = "2024-spring";
const CHALLENGE: &str = "hello-world";
const FLAVOR: &str = "hello-world@1.0.0";
const AGENT: &str = "agent-1";

/// Seed a default season, one listed challenge flavor and a live default
/// agent.
pub async fn seed(plane: &ControlPlane) -> anyhow::Result<()> {
    plane
        .run(
            &SeasonCreate,
            None,
            SeasonCreateInput {
                slug: SEASON.into(),
                name: "Spring 2024".into(),
                visibility: Visibility::Public,
                make_default: true,
            },
        )
        .await?;
    plane
        .run(
            &ChallengeAdd,
            None,
            ChallengeAddInput {
                slug: CHALLENGE.into(),
                name: "Hello, world".into(),
                author: "bastion".into(),
                locale: "en".into(),
                ..ChallengeAddInput::default()
            },
        )
        .await?;
    plane
        .run(
            &ChallengeFlavorAdd,
            None,
            FlavorAddInput {
                challenge: CHALLENGE.into(),
                version: "1.0.0".into(),
                slug: None,
                bundle: format!("registry.local/{CHALLENGE}:1.0.0"),
                purchase_price: 10,
                validation_reward: 50,
            },
        )
        .await?;
    plane
        .run(
            &SeasonChallengeAdd,
            None,
            SeasonChallengeAddInput {
                season: SEASON.into(),
                flavor: FLAVOR.into(),
            },
        )
        .await?;
    plane
        .run(
            &AgentRegister,
            None,
            AgentRegisterInput {
                hostname: AGENT.into(),
                domain_suffix: "fleet.local".into(),
                default_agent: true,
            },
        )
        .await?;
    plane.fleet().heartbeat(AGENT)?;
    info!(season = SEASON, flavor = FLAVOR, agent = AGENT, "demo platform seeded");
    Ok(())
}

fn claims(username: &str) -> Claims {
    Claims {
        subject: format!("sub-{username}"),
        preferred_username: username.into(),
        email: format!("{username}@example.com"),
        email_verified: true,
    }
}

/// Report a step that may legitimately fail on a store that already ran
/// the demo.
fn step<T>(name: &str, result: Result<T, ControlError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(error) => {
            warn!(step = name, %error, "demo step skipped");
            None
        }
    }
}

pub async fn walkthrough(plane: &ControlPlane, fleet: &ScriptedAgentFleet, out: &Output) -> anyhow::Result<()> {
    let alice = plane.session(&claims("alice")).await?;
    let bob = plane.session(&claims("bob")).await?;
    info!(user = %alice.user.slug, new = alice.is_new_user, "alice signed in");
    info!(user = %bob.user.slug, new = bob.is_new_user, "bob signed in");

    if let Some(team) = &alice.team {
        let sent = step(
            "invite",
            plane
                .run(
                    &InviteSend,
                    Some(alice.user.id),
                    InviteSendInput {
                        team: team.slug.to_string(),
                        user: bob.user.slug.to_string(),
                        slug: None,
                    },
                )
                .await,
        );
        if let Some(sent) = sent {
            step(
                "accept",
                plane
                    .run(
                        &InviteAccept,
                        Some(bob.user.id),
                        InviteAcceptInput {
                            team_invite: sent.slug.to_string(),
                        },
                    )
                    .await,
            );
        }
    }
    step(
        "subscribe",
        plane
            .run(
                &TeamSubscribe,
                Some(alice.user.id),
                SubscribeInput {
                    season_challenge: format!("{SEASON}/{FLAVOR}"),
                },
            )
            .await,
    );

    for _ in 0..2 {
        step(
            "provision",
            plane
                .run(
                    &InstanceProvisioning,
                    Some(alice.user.id),
                    ProvisionInput {
                        flavor: FLAVOR.into(),
                        agent: AGENT.into(),
                        config: None,
                    },
                )
                .await,
        );
    }

    // drift between stored status and what the agent reports
    fleet.report_all_on(AGENT, ReportedStatus::Error);
    let outcomes = plane
        .fleet()
        .redump(vec![FLAVOR.to_string(), "alice".to_string(), "i-missing".to_string()])
        .await;
    out.redump(&outcomes)?;

    out.rows(&plane.activities(&ActivityFilter::default()), activity_line)
}
