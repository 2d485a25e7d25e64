//! Per-agent ledger of outstanding orders and their cancellation hazards.
//!
//! Pending inserts are keyed by client request id until the exchange
//! confirms them with an exchange order id; confirmed orders sit in a
//! min-heap ordered by absolute hazard threshold. Entries for orders that
//! filled in the meantime are skipped when they surface.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use protocol::Id;

#[derive(Debug, Clone, Copy)]
struct HazardEntry {
    threshold: f64,
    order_id: Id,
}

impl PartialEq for HazardEntry {
    fn eq(&self, other: &Self) -> bool {
        self.threshold.total_cmp(&other.threshold).is_eq() && self.order_id == other.order_id
    }
}
impl Eq for HazardEntry {}

impl PartialOrd for HazardEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for HazardEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.threshold
            .total_cmp(&other.threshold)
            .then_with(|| self.order_id.cmp(&other.order_id))
    }
}

#[derive(Default)]
pub struct OrderLedger {
    /// client_request_id -> absolute hazard threshold, until confirmed.
    pending: HashMap<Id, f64>,
    active: HashSet<Id>,
    expiry_queue: BinaryHeap<Reverse<HazardEntry>>,
}

impl OrderLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_pending(&mut self, client_request_id: Id, hazard_threshold: f64) {
        self.pending.insert(client_request_id, hazard_threshold);
    }

    /// Exchange acknowledged the insert: arm the hazard for the exchange id.
    /// Unknown request ids (e.g. a resubscribe race) are ignored.
    pub fn confirm_insert(&mut self, client_request_id: Id, exchange_order_id: Id) {
        let Some(threshold) = self.pending.remove(&client_request_id) else {
            return;
        };
        self.active.insert(exchange_order_id);
        self.expiry_queue.push(Reverse(HazardEntry { threshold, order_id: exchange_order_id }));
    }

    /// A fill with zero leaves retires the order; its heap entry goes stale
    /// and will be skipped.
    pub fn on_fill(&mut self, exchange_order_id: Id, leaves_quantity: u32) {
        if leaves_quantity == 0 {
            self.active.remove(&exchange_order_id);
        }
    }

    /// Pop every entry whose threshold the cumulative hazard has crossed.
    /// Only still-active orders are returned (and deactivated); stale
    /// entries are dropped, so a cancel is never produced twice.
    pub fn drain_expired(&mut self, cumulative_hazard: f64, out: &mut Vec<Id>) {
        while let Some(Reverse(top)) = self.expiry_queue.peek() {
            if top.threshold > cumulative_hazard {
                break;
            }
            let Some(Reverse(entry)) = self.expiry_queue.pop() else {
                break;
            };
            if self.active.remove(&entry.order_id) {
                out.push(entry.order_id);
            }
        }
    }

    pub fn open_order_count(&self) -> usize {
        self.active.len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
