//! A small platform built through public workflows only.

#![allow(dead_code)]

use std::sync::Arc;

use bastion_core::app::workflows::{
    AgentRegister, AgentRegisterInput, ChallengeAdd, ChallengeAddInput, ChallengeFlavorAdd, FlavorAddInput,
    Onboarded, Onboarding, SeasonCreate, SeasonCreateInput,
};
use bastion_core::app::{ControlPlane, ControlPlaneBuilder};
use bastion_core::domain::{Claims, Visibility};
use bastion_core::impls::ScriptedAgentFleet;
use bastion_core::ports::FixedClock;
use bastion_core::store::InMemoryEntityStore;
use chrono::{TimeZone, Utc};

pub const FLAVOR: &str = "hello@1.0.0";
pub const AGENT: &str = "agent-1";

pub struct Platform {
    pub plane: ControlPlane,
    pub fleet: ScriptedAgentFleet,
    pub clock: Arc<FixedClock>,
}

pub fn claims(subject: &str, username: &str) -> Claims {
    Claims {
        subject: subject.into(),
        preferred_username: username.into(),
        email: format!("{username}@x.com"),
        email_verified: true,
    }
}

impl Platform {
    /// A control plane with nothing in it.
    pub fn empty() -> Self {
        let fleet = ScriptedAgentFleet::new();
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()));
        let plane = ControlPlaneBuilder::new()
            .store(Arc::new(InMemoryEntityStore::new()))
            .clock(clock.clone())
            .agents(Arc::new(fleet.clone()))
            .with_standard_workflows()
            .unwrap()
            .build()
            .unwrap();
        Self { plane, fleet, clock }
    }

    /// A default season, one flavor and one live agent.
    pub async fn seeded() -> Self {
        let platform = Self::empty();
        let plane = &platform.plane;
        plane
            .run(
                &SeasonCreate,
                None,
                SeasonCreateInput {
                    slug: "s1".into(),
                    name: "Season 1".into(),
                    visibility: Visibility::Public,
                    make_default: true,
                },
            )
            .await
            .unwrap();
        plane
            .run(
                &ChallengeAdd,
                None,
                ChallengeAddInput {
                    slug: "hello".into(),
                    ..ChallengeAddInput::default()
                },
            )
            .await
            .unwrap();
        plane
            .run(
                &ChallengeFlavorAdd,
                None,
                FlavorAddInput {
                    challenge: "hello".into(),
                    version: "1.0.0".into(),
                    slug: None,
                    bundle: "bundles/hello.tar".into(),
                    purchase_price: 10,
                    validation_reward: 20,
                },
            )
            .await
            .unwrap();
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
            .await
            .unwrap();
        plane.fleet().heartbeat(AGENT).unwrap();
        platform
    }

    pub async fn onboard(&self, username: &str) -> Onboarded {
        self.plane
            .run(&Onboarding, None, claims(&format!("sub-{username}"), username))
            .await
            .unwrap()
    }
}
