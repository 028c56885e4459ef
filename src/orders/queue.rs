use std::collections::VecDeque;
use std::sync::Mutex;

use crate::entities::item::{pad_to_capacity, Item};
use crate::orders::notifier::Notifier;

/// A requested villager replacement carried alongside an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VillagerRequest {
    pub house_index: u8,
    pub record: Vec<u8>,
}

/// One delivery order. Owned by the queue until dequeued, then exclusively
/// by the orchestrator. Immutable apart from the skip flag.
pub struct Order {
    pub id: u64,
    pub requester_id: u64,
    pub requester_name: String,
    /// Always exactly the carryable maximum, padded with NONE.
    pub items: Vec<Item>,
    pub villager: Option<VillagerRequest>,
    pub skip_requested: bool,
    pub notifier: Box<dyn Notifier>,
}

/// Terminal outcome of one order, reported exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderResult {
    Success,
    Faulted,
    NoArrival,
    NoLeave,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued { position: usize, eta_secs: u64 },
    AlreadyQueued,
    CurrentlyServing,
    Full,
}

struct QueueState {
    pending: VecDeque<Order>,
    serving: Option<u64>,
    next_id: u64,
}

/// Thread-safe order FIFO. Producers enqueue from any thread; only the
/// worker pops and marks who is being served.
pub struct OrderQueue {
    state: Mutex<QueueState>,
    max_pending: usize,
    order_budget_secs: u64,
}

impl OrderQueue {
    pub fn new(max_pending: usize, order_budget_secs: u64) -> Self {
        Self {
            state: Mutex::new(QueueState {
                pending: VecDeque::new(),
                serving: None,
                next_id: 1,
            }),
            max_pending,
            order_budget_secs,
        }
    }

    pub fn enqueue(
        &self,
        requester_id: u64,
        requester_name: &str,
        items: &[Item],
        villager: Option<VillagerRequest>,
        notifier: Box<dyn Notifier>,
    ) -> EnqueueOutcome {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(_) => return EnqueueOutcome::Full,
        };
        if state.serving == Some(requester_id) {
            return EnqueueOutcome::CurrentlyServing;
        }
        if state
            .pending
            .iter()
            .any(|order| order.requester_id == requester_id)
        {
            return EnqueueOutcome::AlreadyQueued;
        }
        if state.pending.len() >= self.max_pending {
            return EnqueueOutcome::Full;
        }
        let id = state.next_id;
        state.next_id += 1;
        let position = state.pending.len() + 1;
        state.pending.push_back(Order {
            id,
            requester_id,
            requester_name: requester_name.to_string(),
            items: pad_to_capacity(items),
            villager,
            skip_requested: false,
            notifier,
        });
        EnqueueOutcome::Queued {
            position,
            eta_secs: position as u64 * self.order_budget_secs,
        }
    }

    /// Pops the next order, discarding any whose skip flag was raised while
    /// queued. Skips are the only mid-queue mutation honored. Cancellation
    /// callbacks run after the lock is released so a slow notifier cannot
    /// stall producers.
    pub fn pop(&self) -> Option<Order> {
        let mut skipped = Vec::new();
        let next = {
            let mut state = self.state.lock().ok()?;
            let mut next = None;
            while let Some(order) = state.pending.pop_front() {
                if order.skip_requested {
                    skipped.push(order);
                    continue;
                }
                next = Some(order);
                break;
            }
            next
        };
        for order in skipped {
            order.notifier.on_cancelled("order skipped on request", false);
        }
        next
    }

    pub fn request_skip(&self, requester_id: u64) -> bool {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(_) => return false,
        };
        for order in state.pending.iter_mut() {
            if order.requester_id == requester_id {
                order.skip_requested = true;
                return true;
            }
        }
        false
    }

    pub fn set_serving(&self, requester_id: Option<u64>) {
        if let Ok(mut state) = self.state.lock() {
            state.serving = requester_id;
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().map(|state| state.pending.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
