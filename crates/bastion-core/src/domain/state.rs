//! Challenge instance status state machine.

use serde::{Deserialize, Serialize};

/// Status of a challenge instance.
///
/// State transitions:
/// - Starting -> Available | Error
/// - Available -> Unavailable (heartbeat miss)
/// - Unavailable -> Available (heartbeat recovered)
/// - any live state -> Error (agent reports failure)
/// - any live state -> Destroyed (explicit teardown, terminal)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Starting,
    Available,
    Unavailable,
    Error,
    Destroyed,
}

impl InstanceStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, InstanceStatus::Destroyed)
    }

    /// Transitions driven by liveness and provisioning.
    pub fn can_transition_to(self, next: InstanceStatus) -> bool {
        use InstanceStatus::*;
        match (self, next) {
            (Destroyed, _) => false,
            (_, Destroyed) | (_, Error) => true,
            (Starting, Available) => true,
            (Available, Unavailable) => true,
            (Unavailable, Available) => true,
            _ => false,
        }
    }

    /// Status to store after the agent reported `reported`, or `None` when
    /// the stored status stands.
    ///
    /// The agent is ground truth for live instances, with one exception: a
    /// Starting instance the agent reports Unavailable is still coming up and
    /// stays Starting.
    pub fn reconcile(self, reported: ReportedStatus) -> Option<InstanceStatus> {
        use InstanceStatus::*;
        match (self, InstanceStatus::from(reported)) {
            (Destroyed, _) | (Starting, Unavailable) => None,
            (current, next) if current == next => None,
            (_, next) => Some(next),
        }
    }

    /// Every edge a stored instance may take: the liveness and provisioning
    /// transitions plus the rewrites reconciliation performs.
    pub fn permits(self, next: InstanceStatus) -> bool {
        use InstanceStatus::*;
        let reconciled = match next {
            Available | Unavailable | Error => !matches!(self, Starting | Destroyed),
            Starting | Destroyed => false,
        };
        self == next || self.can_transition_to(next) || reconciled
    }

    pub fn is_available(self) -> bool {
        matches!(self, InstanceStatus::Available)
    }
}

/// Status as reported by an agent for one of its instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportedStatus {
    Available,
    Unavailable,
    Error,
}

impl From<ReportedStatus> for InstanceStatus {
    fn from(status: ReportedStatus) -> Self {
        match status {
            ReportedStatus::Available => InstanceStatus::Available,
            ReportedStatus::Unavailable => InstanceStatus::Unavailable,
            ReportedStatus::Error => InstanceStatus::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::InstanceStatus::*;
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::ack(Starting, Available, true)]
    #[case::start_failed(Starting, Error, true)]
    #[case::heartbeat_miss(Available, Unavailable, true)]
    #[case::heartbeat_recovered(Unavailable, Available, true)]
    #[case::failure(Available, Error, true)]
    #[case::teardown(Unavailable, Destroyed, true)]
    #[case::skip_start(Starting, Unavailable, false)]
    #[case::resurrect(Destroyed, Available, false)]
    #[case::stay_destroyed(Destroyed, Error, false)]
    fn state_machine(#[case] from: InstanceStatus, #[case] to: InstanceStatus, #[case] ok: bool) {
        assert_eq!(from.can_transition_to(to), ok);
    }

    #[rstest]
    #[case::agent_confirms(Available, ReportedStatus::Available, None)]
    #[case::agent_lost_it(Available, ReportedStatus::Unavailable, Some(Unavailable))]
    #[case::agent_recovered(Error, ReportedStatus::Available, Some(Available))]
    #[case::still_coming_up(Starting, ReportedStatus::Unavailable, None)]
    #[case::came_up(Starting, ReportedStatus::Available, Some(Available))]
    #[case::failed_to_come_up(Starting, ReportedStatus::Error, Some(Error))]
    #[case::destroyed_stays(Destroyed, ReportedStatus::Available, None)]
    fn reconciliation(
        #[case] stored: InstanceStatus,
        #[case] reported: ReportedStatus,
        #[case] expected: Option<InstanceStatus>,
    ) {
        assert_eq!(stored.reconcile(reported), expected);
    }

    #[rstest]
    #[case(Starting)]
    #[case(Available)]
    #[case(Unavailable)]
    #[case(Error)]
    #[case(Destroyed)]
    fn every_reconciled_status_is_a_permitted_edge(#[case] stored: InstanceStatus) {
        for reported in [ReportedStatus::Available, ReportedStatus::Unavailable, ReportedStatus::Error] {
            if let Some(next) = stored.reconcile(reported) {
                assert!(stored.permits(next), "{stored:?} -> {next:?}");
            }
        }
    }

    #[test]
    fn nothing_goes_back_to_starting_or_skips_it() {
        assert!(!Available.permits(Starting));
        assert!(!Starting.permits(Unavailable));
        assert!(!Destroyed.permits(Available));
        assert!(Error.permits(Destroyed));
    }
}
