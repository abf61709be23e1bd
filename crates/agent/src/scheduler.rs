use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::AbortHandle;
use tracing::debug;

use roomservice_core::domain::conversation::ConversationKey;
use roomservice_core::domain::order::OrderId;

/// Invoked when a scheduled rating prompt comes due. The callee decides
/// whether the prompt is still relevant.
#[async_trait]
pub trait PromptFire: Send + Sync {
    async fn fire(&self, key: ConversationKey, order_id: OrderId);
}

struct Pending {
    order_id: OrderId,
    task: AbortHandle,
}

/// At most one delayed rating prompt per conversation.
#[derive(Default)]
pub struct RatingPromptScheduler {
    pending: Arc<Mutex<HashMap<ConversationKey, Pending>>>,
}

impl RatingPromptScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules a prompt for `order_id`, replacing any earlier one for `key`.
    pub fn schedule(
        &self,
        key: ConversationKey,
        order_id: OrderId,
        delay: Duration,
        target: Arc<dyn PromptFire>,
    ) {
        let pending = Arc::clone(&self.pending);
        let task_key = key.clone();
        let task_order = order_id.clone();
        // Held across the spawn so the task cannot look up its entry early.
        let mut entries = lock(&self.pending);
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let still_current = {
                let mut entries = lock(&pending);
                let current = entries.get(&task_key).is_some_and(|entry| entry.order_id == task_order);
                if current {
                    entries.remove(&task_key);
                }
                current
            };
            if still_current {
                target.fire(task_key, task_order).await;
            }
        });

        let previous = entries.insert(key.clone(), Pending { order_id, task: task.abort_handle() });
        drop(entries);
        if let Some(previous) = previous {
            previous.task.abort();
            debug!(
                event_name = "conversation.rating_prompt.replaced",
                conversation = %key,
                order_id = %previous.order_id,
                "replaced pending rating prompt"
            );
        }
    }

    pub fn cancel(&self, key: &ConversationKey) -> bool {
        match lock(&self.pending).remove(key) {
            Some(previous) => {
                previous.task.abort();
                true
            }
            None => false,
        }
    }

    pub fn pending(&self, key: &ConversationKey) -> Option<OrderId> {
        lock(&self.pending).get(key).map(|entry| entry.order_id.clone())
    }

    pub fn cancel_all(&self) {
        for (_, entry) in lock(&self.pending).drain() {
            entry.task.abort();
        }
    }
}

fn lock(
    pending: &Mutex<HashMap<ConversationKey, Pending>>,
) -> std::sync::MutexGuard<'_, HashMap<ConversationKey, Pending>> {
    match pending.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
