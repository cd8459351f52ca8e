//! Workflows: every state change of the platform.

pub mod agents;
pub mod catalog;
pub mod invites;
pub mod onboarding;
pub mod provisioning;
pub mod users;

pub use self::agents::{AgentRegister, AgentRegisterInput, AgentRegistered, AgentSetDefault, AgentSetDefaultInput};
pub use self::catalog::{
    ChallengeAdd, ChallengeAddInput, ChallengeFlavorAdd, FlavorAddInput, SeasonChallengeAdd,
    SeasonChallengeAddInput, SeasonCreate, SeasonCreateInput, SeasonSetDefault, SetDefaultInput,
    SubscribeInput, TeamSubscribe,
};
pub use self::invites::{InviteAccept, InviteAcceptInput, InviteAccepted, InviteSend, InviteSendInput, InviteSent};
pub use self::onboarding::{Onboarded, Onboarding};
pub use self::provisioning::{
    InstanceProvisioning, InstanceTeardown, ProvisionInput, ProvisionedInstance, TeardownInput,
};
pub use self::users::{UserDelete, UserDeleteInput, UserDeleted};

use super::engine::{RegistryError, Workflow, WorkflowRegistry};

/// Names of the workflows every control plane serves.
pub const STANDARD_WORKFLOWS: &[&str] = &[
    Onboarding::NAME,
    InviteSend::NAME,
    InviteAccept::NAME,
    InstanceProvisioning::NAME,
    InstanceTeardown::NAME,
    SeasonCreate::NAME,
    SeasonSetDefault::NAME,
    ChallengeAdd::NAME,
    ChallengeFlavorAdd::NAME,
    SeasonChallengeAdd::NAME,
    TeamSubscribe::NAME,
    AgentRegister::NAME,
    AgentSetDefault::NAME,
    UserDelete::NAME,
];

pub fn register_standard(registry: &mut WorkflowRegistry) -> Result<(), RegistryError> {
    registry.register(Onboarding)?;
    registry.register(InviteSend)?;
    registry.register(InviteAccept)?;
    registry.register(InstanceProvisioning)?;
    registry.register(InstanceTeardown)?;
    registry.register(SeasonCreate)?;
    registry.register(SeasonSetDefault)?;
    registry.register(ChallengeAdd)?;
    registry.register(ChallengeFlavorAdd)?;
    registry.register(SeasonChallengeAdd)?;
    registry.register(TeamSubscribe)?;
    registry.register(AgentRegister)?;
    registry.register(AgentSetDefault)?;
    registry.register(UserDelete)?;
    Ok(())
}
