//! Permission broker: correlates out-of-band approval decisions with the
//! tool calls waiting on them.
//!
//! A caller inside a turn asks [`PermissionBroker::request`] and is parked on
//! a oneshot until the host answers with the matching request id. Decisions
//! are matched purely by id, so they may arrive in any order. There is no
//! timeout: an unanswered request holds its turn until the turn is
//! interrupted or the process exits.

use crate::error::BrokerError;
use crate::protocol::{Decision, Event};
use crate::transport::EventSink;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{oneshot, Mutex};

/// Pending request tracked until resolved.
struct PendingPermission {
    /// Turn that issued this request.
    turn_id: u64,
    tool_name: String,
    /// Single-use resolution slot.
    response: oneshot::Sender<Decision>,
}

pub struct PermissionBroker {
    pending: Mutex<HashMap<String, PendingPermission>>,
    counter: AtomicU64,
    /// Set once nobody can answer any more; later requests are denied unasked.
    closed: AtomicBool,
    events: EventSink,
}

impl PermissionBroker {
    pub fn new(events: EventSink) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            counter: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            events,
        }
    }

    /// Register a request, announce it to the host, and wait for the decision.
    ///
    /// Resolves to [`BrokerError::BrokerClosed`] if the slot is dropped without
    /// a decision (e.g. the broker itself is torn down).
    pub async fn request(
        &self,
        turn_id: u64,
        tool_name: &str,
        input: Value,
    ) -> Result<Decision, BrokerError> {
        let request_id = self.next_request_id();
        let (response_tx, response_rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            // Checked under the lock so `close` cannot slip in between.
            if self.closed.load(Ordering::Acquire) {
                tracing::info!(turn_id, tool = tool_name, "broker closed; denying without asking");
                return Ok(Decision::Deny);
            }
            pending.insert(
                request_id.clone(),
                PendingPermission {
                    turn_id,
                    tool_name: tool_name.to_string(),
                    response: response_tx,
                },
            );
        }

        tracing::info!(turn_id, request_id = %request_id, tool = tool_name, "permission requested");
        self.events.emit(Event::PermissionRequest {
            request_id,
            tool_name: tool_name.to_string(),
            input,
        });

        response_rx.await.map_err(|_| BrokerError::BrokerClosed)
    }

    /// Fulfil one pending request. The entry is removed before the decision is
    /// sent, so a second resolve for the same id reports `UnknownRequest`.
    pub async fn resolve(&self, request_id: &str, decision: Decision) -> Result<(), BrokerError> {
        let Some(pending) = self.pending.lock().await.remove(request_id) else {
            return Err(BrokerError::UnknownRequest(request_id.to_string()));
        };
        tracing::info!(
            turn_id = pending.turn_id,
            request_id,
            tool = %pending.tool_name,
            decision = decision.as_str(),
            "permission resolved"
        );
        // The waiter may already be gone if its turn was torn down.
        let _ = pending.response.send(decision);
        Ok(())
    }

    /// Deny and forget every request issued by `turn_id`. Returns how many.
    pub async fn deny_turn(&self, turn_id: u64) -> usize {
        let mut pending = self.pending.lock().await;
        // Collect ids first to avoid mutable iteration + remove conflicts.
        let ids = pending
            .iter()
            .filter_map(|(id, entry)| (entry.turn_id == turn_id).then_some(id.clone()))
            .collect::<Vec<_>>();
        for id in &ids {
            if let Some(entry) = pending.remove(id) {
                let _ = entry.response.send(Decision::Deny);
            }
        }
        ids.len()
    }

    /// Deny everything pending and every later request. Returns how many
    /// pending requests were denied.
    pub async fn close(&self) -> usize {
        let drained = {
            let mut pending = self.pending.lock().await;
            self.closed.store(true, Ordering::Release);
            pending.drain().collect::<Vec<_>>()
        };
        let count = drained.len();
        for (_, entry) in drained {
            let _ = entry.response.send(Decision::Deny);
        }
        count
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    pub async fn is_pending(&self, request_id: &str) -> bool {
        self.pending.lock().await.contains_key(request_id)
    }

    /// `perm_<counter>_<unix_ms>`: the counter alone is unique per process;
    /// the timestamp keeps ids distinct across restarts.
    fn next_request_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("perm_{n}_{}", now_unix_millis())
    }
}

fn now_unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
