//! File-backed entity store.
//!
//! The full state is kept in memory and written as one JSON document after
//! every commit. The document is written to a sibling temp file, synced and
//! renamed over the previous one before the in-memory state is swapped, so a
//! crash leaves either the old or the new state on disk.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use super::{EntityStore, Row, StoreError, Tables, Tx, TxMode};
use crate::domain::{
    Activity, Agent, Challenge, ChallengeFlavor, ChallengeInstance, ChallengeSubscription,
    Organization, OrganizationMember, Season, SeasonChallenge, Team, TeamInvite, TeamMember, User,
};

const DUMP_VERSION: u32 = 1;

/// Serialized form of the whole store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dump {
    pub version: u32,
    pub sequence: u64,
    pub users: Vec<User>,
    pub organizations: Vec<Organization>,
    pub organization_members: Vec<OrganizationMember>,
    pub teams: Vec<Team>,
    pub team_members: Vec<TeamMember>,
    pub team_invites: Vec<TeamInvite>,
    pub seasons: Vec<Season>,
    pub challenges: Vec<Challenge>,
    pub challenge_flavors: Vec<ChallengeFlavor>,
    pub season_challenges: Vec<SeasonChallenge>,
    pub challenge_instances: Vec<ChallengeInstance>,
    pub challenge_subscriptions: Vec<ChallengeSubscription>,
    pub agents: Vec<Agent>,
    pub activities: Vec<Activity>,
}

fn rows<E: Row>(tables: &Tables) -> Vec<E> {
    tables.rows::<E>().cloned().collect()
}

impl Dump {
    pub fn from_tables(tables: &Tables) -> Self {
        Self {
            version: DUMP_VERSION,
            sequence: tables.last_sequence(),
            users: rows(tables),
            organizations: rows(tables),
            organization_members: rows(tables),
            teams: rows(tables),
            team_members: rows(tables),
            team_invites: rows(tables),
            seasons: rows(tables),
            challenges: rows(tables),
            challenge_flavors: rows(tables),
            season_challenges: rows(tables),
            challenge_instances: rows(tables),
            challenge_subscriptions: rows(tables),
            agents: rows(tables),
            activities: rows(tables),
        }
    }

    /// Rebuild tables and indexes, then re-check every invariant.
    pub fn into_tables(self) -> Result<Tables, StoreError> {
        if self.version != DUMP_VERSION {
            return Err(StoreError::Codec(format!(
                "unsupported dump version {}",
                self.version
            )));
        }
        let mut tables = Tables::default();
        tables.set_sequence(self.sequence);
        restore(&mut tables, self.users);
        restore(&mut tables, self.organizations);
        restore(&mut tables, self.organization_members);
        restore(&mut tables, self.teams);
        restore(&mut tables, self.team_members);
        restore(&mut tables, self.team_invites);
        restore(&mut tables, self.seasons);
        restore(&mut tables, self.challenges);
        restore(&mut tables, self.challenge_flavors);
        restore(&mut tables, self.season_challenges);
        restore(&mut tables, self.challenge_instances);
        restore(&mut tables, self.challenge_subscriptions);
        restore(&mut tables, self.agents);
        restore(&mut tables, self.activities);
        tables.verify()?;
        Ok(tables)
    }
}

fn restore<E: Row>(tables: &mut Tables, rows: Vec<E>) {
    for row in rows {
        tables.restore_row(row);
    }
}

/// Entity store persisted to a single JSON document.
///
/// Commits are synchronous: the write, fsync and rename happen on the
/// calling thread while the writer lock is held. Async callers block their
/// worker for that long, which suits the single-operator deployments this
/// store is meant for. Run the control plane on the multi-threaded runtime
/// when using it.
#[derive(Debug)]
pub struct FileEntityStore {
    path: PathBuf,
    writer: Mutex<()>,
    committed: RwLock<Tables>,
}

impl FileEntityStore {
    /// Open the store at `path`, starting empty if the file does not exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let tables = if path.exists() {
            let data = fs::read(&path).map_err(|e| StoreError::Io(format!("read {}: {e}", path.display())))?;
            let dump: Dump = serde_json::from_slice(&data).map_err(|e| StoreError::Codec(e.to_string()))?;
            dump.into_tables()?
        } else {
            Tables::default()
        };
        tracing::debug!(path = %path.display(), sequence = tables.last_sequence(), "entity store opened");
        Ok(Self {
            path,
            writer: Mutex::new(()),
            committed: RwLock::new(tables),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, tables: &Tables) -> Result<(), StoreError> {
        let io = |what: &str, e: std::io::Error| StoreError::Io(format!("{what} {}: {e}", self.path.display()));
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| io("create directory for", e))?;
        }
        let serialized = serde_json::to_vec_pretty(&Dump::from_tables(tables))
            .map_err(|e| StoreError::Codec(e.to_string()))?;
        let temp_path = self.path.with_extension("tmp");
        let temp_file = File::create(&temp_path).map_err(|e| io("create temp file for", e))?;
        let mut writer = BufWriter::new(temp_file);
        writer.write_all(&serialized).map_err(|e| io("write", e))?;
        writer.flush().map_err(|e| io("flush", e))?;
        writer.get_mut().sync_all().map_err(|e| io("sync", e))?;
        fs::rename(&temp_path, &self.path).map_err(|e| io("rename onto", e))?;
        Ok(())
    }
}

impl EntityStore for FileEntityStore {
    fn snapshot(&self) -> Tables {
        self.committed.read().clone()
    }

    fn execute(
        &self,
        mode: TxMode,
        work: &mut dyn FnMut(&mut Tx<'_>) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        let _writer = self.writer.lock();
        let mut draft = self.committed.read().clone();
        let mut tx = Tx::new(&mut draft, mode);
        work(&mut tx)?;
        tx.finish()?;
        self.persist(&draft)?;
        *self.committed.write() = draft;
        Ok(())
    }
}
