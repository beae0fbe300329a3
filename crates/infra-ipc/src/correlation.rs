use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use infra_core::OperationId;
use infra_driver_proto::OperationResponse;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::IpcError;

/// Waiting side of one response slot.
type Slot = mpsc::Sender<OperationResponse>;

/// Outcome of routing one inbound response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Handed to the waiting caller.
    Delivered,
    /// No caller is waiting for this operation id.
    Unmatched,
    /// The caller already has a response queued for this id.
    Duplicate,
}

/// Outstanding operations of one session, keyed by operation id.
///
/// Callers insert through [`CorrelationTable::register`] and remove by
/// dropping the returned [`PendingSlot`]; the dispatch loop only looks up and
/// delivers.
#[derive(Debug, Default)]
pub struct CorrelationTable {
    entries: Mutex<HashMap<OperationId, Slot>>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a response slot for `id`. Fails if `id` is already pending.
    pub fn register(&self, id: OperationId) -> Result<PendingSlot<'_>, IpcError> {
        let (tx, rx) = mpsc::channel(1);
        let mut entries = self.entries()?;
        if entries.contains_key(&id) {
            return Err(IpcError::DuplicateOperation(id.0));
        }
        entries.insert(id, tx);
        Ok(PendingSlot {
            table: self,
            id,
            rx,
        })
    }

    /// Routes a response to the caller waiting on its operation id.
    pub fn deliver(&self, response: OperationResponse) -> Result<Delivery, IpcError> {
        let slot = self.entries()?.get(&response.operation_id).cloned();
        let Some(slot) = slot else {
            return Ok(Delivery::Unmatched);
        };

        match slot.try_send(response) {
            Ok(()) => Ok(Delivery::Delivered),
            Err(TrySendError::Full(_)) => Ok(Delivery::Duplicate),
            Err(TrySendError::Closed(_)) => Ok(Delivery::Unmatched),
        }
    }

    /// Number of operations currently awaiting a response; 0 if the table
    /// lock is poisoned.
    pub fn len(&self) -> usize {
        match self.entries() {
            Ok(entries) => entries.len(),
            Err(err) => {
                tracing::error!(error = %err, "failed to count pending operations");
                0
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `id` is pending; false if the table lock is poisoned.
    pub fn contains(&self, id: OperationId) -> bool {
        match self.entries() {
            Ok(entries) => entries.contains_key(&id),
            Err(err) => {
                tracing::error!(operation_id = %id, error = %err, "failed to look up pending operation");
                false
            }
        }
    }

    fn remove(&self, id: OperationId) {
        match self.entries() {
            Ok(mut entries) => {
                entries.remove(&id);
            }
            Err(err) => {
                tracing::error!(operation_id = %id, error = %err, "failed to drop pending operation");
            }
        }
    }

    /// Acquires the entry map and converts poisoning to an IPC error.
    fn entries(&self) -> Result<MutexGuard<'_, HashMap<OperationId, Slot>>, IpcError> {
        self.entries
            .lock()
            .map_err(|_| IpcError::Internal("correlation table lock poisoned".to_string()))
    }
}

/// A registered entry. Removes itself from the table when dropped, so the
/// entry never outlives the call that owns it, whether it resolved, failed,
/// or was cancelled.
#[derive(Debug)]
pub struct PendingSlot<'a> {
    table: &'a CorrelationTable,
    id: OperationId,
    rx: mpsc::Receiver<OperationResponse>,
}

impl PendingSlot<'_> {
    pub fn id(&self) -> OperationId {
        self.id
    }

    /// Waits for the dispatch loop to deliver the response.
    ///
    /// Returns `None` only if the entry was removed underneath the slot.
    pub async fn response(&mut self) -> Option<OperationResponse> {
        self.rx.recv().await
    }
}

impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        self.table.remove(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::{CorrelationTable, Delivery};
    use crate::IpcError;
    use infra_core::OperationId;
    use infra_driver_proto::{DeleteResponse, OperationResponse, OperationResult};

    fn response(id: i32, error: i32) -> OperationResponse {
        OperationResponse {
            operation_id: OperationId(id),
            result: Some(OperationResult::Delete(DeleteResponse { error })),
        }
    }

    #[tokio::test]
    async fn delivers_to_matching_slot() {
        let table = CorrelationTable::new();
        let mut first = table.register(OperationId(1)).expect("register 1");
        let mut second = table.register(OperationId(2)).expect("register 2");

        assert_eq!(table.deliver(response(2, 20)).expect("deliver"), Delivery::Delivered);
        assert_eq!(table.deliver(response(1, 10)).expect("deliver"), Delivery::Delivered);

        assert_eq!(first.response().await, Some(response(1, 10)));
        assert_eq!(second.response().await, Some(response(2, 20)));
    }

    #[test]
    fn unknown_id_is_unmatched() {
        let table = CorrelationTable::new();
        let _slot = table.register(OperationId(1)).expect("register");

        assert_eq!(table.deliver(response(5, 0)).expect("deliver"), Delivery::Unmatched);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn second_response_for_same_id_is_duplicate() {
        let table = CorrelationTable::new();
        let _slot = table.register(OperationId(3)).expect("register");

        assert_eq!(table.deliver(response(3, 0)).expect("deliver"), Delivery::Delivered);
        assert_eq!(table.deliver(response(3, 1)).expect("deliver"), Delivery::Duplicate);
    }

    #[test]
    fn dropping_slot_removes_entry() {
        let table = CorrelationTable::new();
        let slot = table.register(OperationId(4)).expect("register");
        assert!(table.contains(OperationId(4)));

        drop(slot);

        assert!(table.is_empty());
        assert_eq!(table.deliver(response(4, 0)).expect("deliver"), Delivery::Unmatched);
    }

    #[test]
    fn poisoned_table_reports_fallbacks() {
        let table = CorrelationTable::new();
        let _slot = table.register(OperationId(9)).expect("register");

        let poisoned = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = table.entries.lock();
            panic!("poison the table");
        }));
        assert!(poisoned.is_err());

        assert_eq!(table.len(), 0);
        assert!(!table.contains(OperationId(9)));
        assert!(matches!(
            table.deliver(response(9, 0)),
            Err(IpcError::Internal(_))
        ));
    }

    #[test]
    fn pending_id_cannot_be_registered_twice() {
        let table = CorrelationTable::new();
        let _slot = table.register(OperationId(7)).expect("register");

        let err = table
            .register(OperationId(7))
            .expect_err("duplicate registration must fail");
        assert!(matches!(err, IpcError::DuplicateOperation(7)));

        assert_eq!(table.len(), 1);
    }
}
