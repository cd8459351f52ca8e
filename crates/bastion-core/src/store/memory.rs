use parking_lot::{Mutex, RwLock};

use super::{EntityStore, StoreError, Tables, Tx, TxMode};

/// In-memory entity store.
///
/// Writers are serialized by `writer`; the committed tables sit behind a
/// read-write lock that is only held long enough to clone or swap them, so
/// readers never wait on a running transaction.
#[derive(Debug, Default)]
pub struct InMemoryEntityStore {
    writer: Mutex<()>,
    committed: RwLock<Tables>,
}

impl InMemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tables(tables: Tables) -> Self {
        Self {
            writer: Mutex::new(()),
            committed: RwLock::new(tables),
        }
    }
}

impl EntityStore for InMemoryEntityStore {
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
        *self.committed.write() = draft;
        Ok(())
    }
}
