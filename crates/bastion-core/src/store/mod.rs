//! Entity store: transactional persistence of every entity.
//!
//! Writers run a synchronous closure against a private draft of the tables;
//! the draft replaces the committed state only if the closure succeeds and
//! the commit rules hold. Readers get O(1) snapshots that never observe a
//! partially applied transaction.

mod file;
mod memory;
mod tables;

pub use self::file::{Dump, FileEntityStore};
pub use self::memory::InMemoryEntityStore;
pub use self::tables::{Bookkeeping, Deletable, Mutable, Row, Tables, Tx, TxMode};

#[cfg(test)]
pub(crate) use self::tables::fixtures;

use thiserror::Error;

use crate::domain::{ControlError, EntityKind, Key};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("{kind} {slug} already exists")]
    DuplicateSlug { kind: EntityKind, slug: String },

    #[error("empty surface identifier for {kind}")]
    EmptySlug { kind: EntityKind },

    #[error("{kind} #{key} does not exist")]
    MissingRow { kind: EntityKind, key: u64 },

    #[error("{referrer} references missing {kind} #{key}")]
    DanglingReference {
        referrer: EntityKind,
        kind: EntityKind,
        key: u64,
    },

    #[error("invariant violated on {kind}: {reason}")]
    Invariant { kind: EntityKind, reason: String },

    #[error("surface identifier of {kind} is immutable")]
    ImmutableSlug { kind: EntityKind },

    #[error("transaction mutated {mutations} rows without an activity entry")]
    Unaudited { mutations: usize },

    #[error("operation not permitted in a bookkeeping transaction")]
    NotPermitted,

    #[error("transaction aborted")]
    Aborted,

    #[error("persistence failure: {0}")]
    Io(String),

    #[error("snapshot codec failure: {0}")]
    Codec(String),
}

impl From<StoreError> for ControlError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateSlug { kind, slug } => {
                ControlError::conflict(kind, slug, "surface identifier already taken")
            }
            StoreError::Invariant { kind, reason } => ControlError::conflict(kind, "-", reason),
            StoreError::ImmutableSlug { kind } => {
                ControlError::conflict(kind, "-", "surface identifier is immutable")
            }
            StoreError::MissingRow { kind, key } => ControlError::not_found(kind, format!("#{key}")),
            StoreError::DanglingReference { kind, key, .. } => {
                ControlError::not_found(kind, format!("#{key}"))
            }
            other => ControlError::Internal(other.to_string()),
        }
    }
}

/// Transactional store of all entities.
///
/// Object safe so the control plane can hold an `Arc<dyn EntityStore>`;
/// typed helpers live on [`EntityStoreExt`].
pub trait EntityStore: Send + Sync {
    /// Consistent point-in-time view of the committed state.
    fn snapshot(&self) -> Tables;

    /// Run `work` against a draft and commit it atomically.
    ///
    /// Transactions are serialized; a failed `work` or commit leaves the
    /// committed state untouched.
    fn execute(
        &self,
        mode: TxMode,
        work: &mut dyn FnMut(&mut Tx<'_>) -> Result<(), StoreError>,
    ) -> Result<(), StoreError>;
}

pub trait EntityStoreExt: EntityStore {
    /// Audited transaction returning a value; `work` may fail with any error
    /// that a store failure converts into.
    fn transaction<R, Err>(&self, work: impl FnOnce(&mut Tx<'_>) -> Result<R, Err>) -> Result<R, Err>
    where
        Err: From<StoreError>,
    {
        run(self, TxMode::Audited, work)
    }

    /// Single-row bookkeeping update outside the audit trail.
    fn touch<E: Bookkeeping>(&self, key: Key<E>, change: impl FnOnce(&mut E)) -> Result<E, StoreError> {
        run(self, TxMode::Bookkeeping, |tx| tx.touch(key, change))
    }
}

impl<S: EntityStore + ?Sized> EntityStoreExt for S {}

fn run<S, R, Err>(
    store: &S,
    mode: TxMode,
    work: impl FnOnce(&mut Tx<'_>) -> Result<R, Err>,
) -> Result<R, Err>
where
    S: EntityStore + ?Sized,
    Err: From<StoreError>,
{
    let mut work = Some(work);
    let mut outcome: Option<Result<R, Err>> = None;
    let committed = store.execute(mode, &mut |tx| {
        let work = work.take().ok_or(StoreError::Aborted)?;
        match work(tx) {
            Ok(value) => {
                outcome = Some(Ok(value));
                Ok(())
            }
            Err(err) => {
                outcome = Some(Err(err));
                Err(StoreError::Aborted)
            }
        }
    });
    match (committed, outcome) {
        (Ok(()), Some(Ok(value))) => Ok(value),
        (Err(StoreError::Aborted), Some(Err(err))) => Err(err),
        (Err(err), _) => Err(err.into()),
        (Ok(()), _) => Err(StoreError::Aborted.into()),
    }
}
