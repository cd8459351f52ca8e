//! Background fleet loops: the stale-agent sweep and the heartbeat consumer.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use super::fleet::FleetCoordinator;

/// One heartbeat received from the agent transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatSignal {
    pub agent: String,
}

/// Fleet loop handle.
/// - `request_shutdown()` stops both loops after their current step
/// - `shutdown_and_join()` also waits for them to finish
pub struct FleetLoops {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl FleetLoops {
    /// Spawn the sweep loop, ticking every `sweep_interval`, and a consumer
    /// for `heartbeats`.
    pub fn spawn(
        fleet: FleetCoordinator,
        sweep_interval: Duration,
        heartbeats: mpsc::Receiver<HeartbeatSignal>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let joins = vec![
            tokio::spawn(sweep_loop(fleet.clone(), sweep_interval, shutdown_rx.clone())),
            tokio::spawn(heartbeat_loop(fleet, heartbeats, shutdown_rx)),
        ];
        Self { shutdown_tx, joins }
    }

    pub fn request_shutdown(&self) {
        // receivers may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for join in self.joins {
            if let Err(error) = join.await {
                warn!(%error, "fleet loop panicked");
            }
        }
    }
}

async fn sweep_loop(fleet: FleetCoordinator, period: Duration, mut shutdown_rx: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick completes immediately
    ticker.tick().await;
    loop {
        if *shutdown_rx.borrow() {
            break;
        }
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = ticker.tick() => {
                let now = fleet.now();
                let changes = fleet.sweep_stale_agents(now);
                debug!(changed = changes.len(), "sweep tick");
            }
        }
    }
}

async fn heartbeat_loop(
    fleet: FleetCoordinator,
    mut heartbeats: mpsc::Receiver<HeartbeatSignal>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        if *shutdown_rx.borrow() {
            break;
        }
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            signal = heartbeats.recv() => {
                let Some(signal) = signal else {
                    break;
                };
                if let Err(error) = fleet.heartbeat(&signal.agent) {
                    warn!(agent = %signal.agent, %error, "heartbeat rejected");
                }
            }
        }
    }
}
