use log::debug;

use crate::error::GatewayError;
use crate::store::TaskStore;

/// Gate in front of every delete. No delete request leaves without passing `PendingConfirm`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DeleteConfirm {
    #[default]
    Idle,
    PendingConfirm { task_id: String },
    /// Delete request in flight; returns to `Idle` whatever the outcome.
    Confirmed { task_id: String },
}

impl DeleteConfirm {
    pub fn request(&mut self, task_id: &str) {
        if matches!(self, DeleteConfirm::Confirmed { .. }) {
            return;
        }
        *self = DeleteConfirm::PendingConfirm {
            task_id: task_id.to_string(),
        };
    }

    pub fn cancel(&mut self) {
        if let DeleteConfirm::PendingConfirm { task_id } = self {
            debug!("delete of {} cancelled", task_id);
            *self = DeleteConfirm::Idle;
        }
    }

    /// Moves to `Confirmed` and returns the id to delete. Does nothing unless pending.
    pub fn confirm(&mut self) -> Option<String> {
        match std::mem::take(self) {
            DeleteConfirm::PendingConfirm { task_id } => {
                *self = DeleteConfirm::Confirmed {
                    task_id: task_id.clone(),
                };
                Some(task_id)
            }
            other => {
                *self = other;
                None
            }
        }
    }

    /// The delete request completed; failures are reported by the store's notice.
    pub fn finish(&mut self) {
        *self = DeleteConfirm::Idle;
    }

    pub fn pending_id(&self) -> Option<&str> {
        match self {
            DeleteConfirm::PendingConfirm { task_id } | DeleteConfirm::Confirmed { task_id } => {
                Some(task_id)
            }
            DeleteConfirm::Idle => None,
        }
    }

    pub fn is_open(&self) -> bool {
        !matches!(self, DeleteConfirm::Idle)
    }

    /// Runs the delete inline. `None` when nothing was pending, so no request was made.
    pub async fn confirm_with(&mut self, store: &TaskStore) -> Option<Result<(), GatewayError>> {
        let id = self.confirm()?;
        let result = store.remove(&id).await;
        self.finish();
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Operation;
    use crate::store::testing::*;
    use crate::store::{NoticeLevel, StoreOptions};
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    fn setup() -> (Arc<FakeGateway>, TaskStore) {
        let gateway = Arc::new(FakeGateway::with_tasks(vec![task("T1", "Deploy", "Jane", "echo hi")]));
        let store = TaskStore::new(gateway.clone(), StoreOptions::default());
        (gateway, store)
    }

    #[tokio::test]
    async fn test_confirmed_delete_removes_task() {
        let (gateway, store) = setup();
        let mut flow = DeleteConfirm::default();
        flow.request("T1");
        assert_eq!(flow.pending_id(), Some("T1"));

        assert_eq!(flow.confirm_with(&store).await, Some(Ok(())));
        assert_eq!(flow, DeleteConfirm::Idle);
        assert_eq!(gateway.delete_calls.load(Ordering::SeqCst), 1);

        store.refresh("").await.unwrap();
        assert!(store.find("T1").is_none());
    }

    #[tokio::test]
    async fn test_cancelled_delete_never_calls_gateway() {
        let (gateway, store) = setup();
        let mut flow = DeleteConfirm::default();
        flow.request("T1");
        flow.cancel();
        assert_eq!(flow, DeleteConfirm::Idle);

        // Confirming from Idle must not reach the service either.
        assert_eq!(flow.confirm_with(&store).await, None);
        assert_eq!(gateway.delete_calls.load(Ordering::SeqCst), 0);

        store.refresh("").await.unwrap();
        assert!(store.find("T1").is_some());
    }

    #[tokio::test]
    async fn test_failed_delete_still_returns_to_idle() {
        let (gateway, store) = setup();
        gateway.fail_on("delete", failed(Operation::Delete, 500, None));
        let mut flow = DeleteConfirm::default();
        flow.request("T1");

        let outcome = flow.confirm_with(&store).await;
        assert!(matches!(outcome, Some(Err(ref e)) if e.operation() == Operation::Delete));
        assert_eq!(flow, DeleteConfirm::Idle);
        let notices = store.take_notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].level, NoticeLevel::Error);
        assert_eq!(notices[0].text, "Failed to delete task.");
    }

    #[test]
    fn test_confirm_passes_through_confirmed() {
        let mut flow = DeleteConfirm::default();
        flow.request("T1");
        assert_eq!(flow.confirm().as_deref(), Some("T1"));
        assert_eq!(flow, DeleteConfirm::Confirmed { task_id: "T1".to_string() });
        assert_eq!(flow.confirm(), None);
        flow.cancel();
        assert!(flow.is_open());
        flow.finish();
        assert!(!flow.is_open());
    }
}
