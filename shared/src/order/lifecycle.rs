//! Order lifecycle state machine
//!
//! Pure transition logic: every function validates the requested
//! transition against the current snapshot and returns a fresh snapshot,
//! with no I/O. Persisting the result (and broadcasting it to the other
//! views) is the store's job, not this module's.
//!
//! # State machine
//!
//! ```text
//! pending --send_to_kitchen--> cooking --dispatch (all items)--> ready --complete--> completed
//! ```
//!
//! Item-level substates (pending/cooking/ready) exist only while the
//! order is cooking or ready; while the order is pending every item is
//! pending too. "Partially ready" is derived (some but not all items
//! ready), never stored.

use super::error::{LifecycleError, LifecycleResult};
use super::model::{
    CartItem, ItemStatus, Order, OrderId, OrderItem, OrderStatus, PaymentMethod,
};
use super::money;
use chrono::{SecondsFormat, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

/// Order id source
///
/// Ids are the creation timestamp in epoch millis, bumped by one when
/// two checkouts land on the same millisecond, so ids never repeat and
/// never decrease within a run.
#[derive(Debug, Default)]
pub struct OrderIds {
    last: AtomicI64,
}

impl OrderIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue the next unique id
    pub fn next(&self) -> OrderId {
        let now = Utc::now().timestamp_millis();
        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(prev + 1);
            match self
                .last
                .compare_exchange_weak(prev, candidate, Ordering::SeqCst, Ordering::Relaxed)
            {
                Ok(_) => return candidate,
                Err(actual) => prev = actual,
            }
        }
    }
}

/// Current time in the ISO-8601 shape orders carry on the wire
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn invalid(order: &Order, action: &str, required: &str) -> LifecycleError {
    LifecycleError::InvalidTransition(format!(
        "{} requires a {} order, order {} is {:?}",
        action, required, order.id, order.status
    ))
}

/// Create a new order from the cart
///
/// Assigns a fresh unique id and timestamp, stamps every item pending,
/// and computes the total from the cart contents. Price changes after
/// this point never retroactively affect the placed order.
pub fn checkout(
    ids: &OrderIds,
    cart: &[CartItem],
    payment_method: PaymentMethod,
) -> LifecycleResult<Order> {
    if cart.is_empty() {
        return Err(LifecycleError::InvalidCart);
    }

    let items = cart
        .iter()
        .map(|line| OrderItem {
            name: line.name.clone(),
            quantity: line.quantity,
            price: line.price,
            status: ItemStatus::Pending,
        })
        .collect::<Vec<_>>();

    Ok(Order {
        id: ids.next(),
        total: money::cart_total(cart),
        items,
        status: OrderStatus::Pending,
        payment_method,
        timestamp: now_iso(),
        pending_change: None,
        pending_change_amount: None,
        completed_at: None,
    })
}

/// Send a pending order to the kitchen
///
/// Repeated calls are rejected, not silently ignored, to surface UI and
/// transport bugs.
pub fn send_to_kitchen(order: &Order) -> LifecycleResult<Order> {
    if order.status != OrderStatus::Pending {
        return Err(invalid(order, "send_to_kitchen", "pending"));
    }

    let mut next = order.clone();
    next.status = OrderStatus::Cooking;
    for item in &mut next.items {
        item.status = ItemStatus::Cooking;
    }
    Ok(next)
}

/// Mark one line item ready and recompute the order roll-up
///
/// The order becomes ready exactly when every item is ready; with some
/// items still cooking it stays cooking (views derive "partially ready"
/// themselves).
pub fn dispatch_item(order: &Order, item_index: usize) -> LifecycleResult<Order> {
    if order.status != OrderStatus::Cooking {
        return Err(invalid(order, "dispatch_item", "cooking"));
    }
    if item_index >= order.items.len() {
        return Err(LifecycleError::IndexOutOfRange {
            order_id: order.id,
            index: item_index,
            len: order.items.len(),
        });
    }

    let mut next = order.clone();
    next.items[item_index].status = ItemStatus::Ready;
    if next.all_items_ready() {
        next.status = OrderStatus::Ready;
    }
    Ok(next)
}

/// Mark every item and the order itself ready
///
/// Bulk equivalent of repeated dispatch_item with no observable
/// partial-ready intermediate; also the shortcut the cash-confirmation
/// path takes before completing.
pub fn dispatch_all(order: &Order) -> LifecycleResult<Order> {
    if order.status != OrderStatus::Cooking && order.status != OrderStatus::Ready {
        return Err(invalid(order, "dispatch_all", "cooking"));
    }

    let mut next = order.clone();
    for item in &mut next.items {
        item.status = ItemStatus::Ready;
    }
    next.status = OrderStatus::Ready;
    Ok(next)
}

/// Finalize a ready order for archival
///
/// The result carries `completed_at`; moving it to the archive and
/// deleting it from the live set is the caller's responsibility.
pub fn complete(order: &Order) -> LifecycleResult<Order> {
    if order.status != OrderStatus::Ready {
        return Err(invalid(order, "complete", "ready"));
    }

    let mut next = order.clone();
    next.status = OrderStatus::Completed;
    next.completed_at = Some(now_iso());
    Ok(next)
}

/// Record change owed back to the customer
///
/// Only meaningful for cash orders where the tendered amount exceeded
/// the total; the caller precomputes `given - total`.
pub fn attach_pending_change(order: &Order, amount: f64) -> LifecycleResult<Order> {
    if amount <= 0.0 || !amount.is_finite() {
        return Err(LifecycleError::InvalidChangeAmount(amount));
    }
    if order.payment_method != PaymentMethod::Cash {
        return Err(LifecycleError::InvalidTransition(format!(
            "pending change applies to cash orders only, order {} was paid by {:?}",
            order.id, order.payment_method
        )));
    }
    if order.status == OrderStatus::Completed {
        return Err(invalid(order, "attach_pending_change", "live"));
    }

    let mut next = order.clone();
    next.pending_change = Some(true);
    next.pending_change_amount = Some(money::to_f64(money::to_decimal(amount)));
    Ok(next)
}

/// Clear the pending-change flag; a no-op when nothing was owed
pub fn clear_pending_change(order: &Order) -> Order {
    let mut next = order.clone();
    next.pending_change = None;
    next.pending_change_amount = None;
    next
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_cart() -> Vec<CartItem> {
        vec![
            CartItem::new("Veg Atho", 3, 110.0),
            CartItem::new("Water Bottle", 1, 20.0),
        ]
    }

    fn cooking_order() -> Order {
        let ids = OrderIds::new();
        let order = checkout(&ids, &sample_cart(), PaymentMethod::Cash).unwrap();
        send_to_kitchen(&order).unwrap()
    }

    #[test]
    fn test_checkout_pending_with_total() {
        let ids = OrderIds::new();
        let order = checkout(&ids, &sample_cart(), PaymentMethod::Cash).unwrap();

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.total, 350.0);
        assert_eq!(order.items.len(), 2);
        assert!(order.items.iter().all(|i| i.status == ItemStatus::Pending));
        assert!(order.pending_change.is_none());
        assert!(order.completed_at.is_none());
    }

    #[test]
    fn test_checkout_empty_cart_rejected() {
        let ids = OrderIds::new();
        let result = checkout(&ids, &[], PaymentMethod::Gpay);
        assert_eq!(result, Err(LifecycleError::InvalidCart));
    }

    #[test]
    fn test_checkout_ids_unique_in_a_run() {
        let ids = OrderIds::new();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..100 {
            let order = checkout(&ids, &sample_cart(), PaymentMethod::Gpay).unwrap();
            assert!(seen.insert(order.id), "duplicate id {}", order.id);
        }
    }

    #[test]
    fn test_send_to_kitchen_moves_everything_to_cooking() {
        let order = cooking_order();
        assert_eq!(order.status, OrderStatus::Cooking);
        assert!(order.items.iter().all(|i| i.status == ItemStatus::Cooking));
    }

    #[test]
    fn test_send_to_kitchen_not_idempotent() {
        let order = cooking_order();
        let result = send_to_kitchen(&order);
        assert!(matches!(result, Err(LifecycleError::InvalidTransition(_))));
        // The rejected call must not have touched its input
        assert_eq!(order.status, OrderStatus::Cooking);
    }

    #[test]
    fn test_dispatch_item_rolls_up_only_when_all_ready() {
        let order = cooking_order();

        let after_first = dispatch_item(&order, 0).unwrap();
        assert_eq!(after_first.items[0].status, ItemStatus::Ready);
        assert_eq!(after_first.status, OrderStatus::Cooking);
        assert!(after_first.is_partially_ready());

        let after_second = dispatch_item(&after_first, 1).unwrap();
        assert_eq!(after_second.status, OrderStatus::Ready);
        assert!(after_second.all_items_ready());
    }

    #[test]
    fn test_dispatch_item_bad_index() {
        let order = cooking_order();
        let result = dispatch_item(&order, 5);
        assert!(matches!(
            result,
            Err(LifecycleError::IndexOutOfRange { index: 5, len: 2, .. })
        ));
    }

    #[test]
    fn test_dispatch_item_requires_cooking() {
        let ids = OrderIds::new();
        let pending = checkout(&ids, &sample_cart(), PaymentMethod::Gpay).unwrap();
        assert!(matches!(
            dispatch_item(&pending, 0),
            Err(LifecycleError::InvalidTransition(_))
        ));
    }

    #[test]
    fn test_dispatch_all_from_cooking() {
        let order = cooking_order();
        let ready = dispatch_all(&order).unwrap();
        assert_eq!(ready.status, OrderStatus::Ready);
        assert!(ready.all_items_ready());
    }

    #[test]
    fn test_dispatch_all_rejects_pending() {
        let ids = OrderIds::new();
        let pending = checkout(&ids, &sample_cart(), PaymentMethod::Gpay).unwrap();
        assert!(dispatch_all(&pending).is_err());
    }

    #[test]
    fn test_complete_requires_ready() {
        let cooking = cooking_order();
        assert!(matches!(
            complete(&cooking),
            Err(LifecycleError::InvalidTransition(_))
        ));

        let ready = dispatch_all(&cooking).unwrap();
        let completed = complete(&ready).unwrap();
        assert_eq!(completed.status, OrderStatus::Completed);
        assert!(completed.completed_at.is_some());
    }

    #[test]
    fn test_pending_change_round_trip() {
        let order = cooking_order();
        let with_change = attach_pending_change(&order, 50.0).unwrap();
        assert_eq!(with_change.pending_change, Some(true));
        assert_eq!(with_change.pending_change_amount, Some(50.0));

        let cleared = clear_pending_change(&with_change);
        assert!(cleared.pending_change.is_none());
        assert!(cleared.pending_change_amount.is_none());
    }

    #[test]
    fn test_clear_pending_change_noop_when_unset() {
        let order = cooking_order();
        let cleared = clear_pending_change(&order);
        assert_eq!(cleared, order);
    }

    #[test]
    fn test_attach_pending_change_guards() {
        let order = cooking_order();
        assert_eq!(
            attach_pending_change(&order, 0.0),
            Err(LifecycleError::InvalidChangeAmount(0.0))
        );
        assert_eq!(
            attach_pending_change(&order, -5.0),
            Err(LifecycleError::InvalidChangeAmount(-5.0))
        );

        let ids = OrderIds::new();
        let gpay = checkout(&ids, &sample_cart(), PaymentMethod::Gpay).unwrap();
        assert!(matches!(
            attach_pending_change(&gpay, 50.0),
            Err(LifecycleError::InvalidTransition(_))
        ));
    }

    #[test]
    fn test_full_flow_single_line() {
        // Checkout with one line, dispatch it, complete
        let ids = OrderIds::new();
        let cart = vec![CartItem::new("Tea", 2, 10.0)];
        let order = checkout(&ids, &cart, PaymentMethod::Gpay).unwrap();
        assert_eq!(order.total, 20.0);

        let cooking = send_to_kitchen(&order).unwrap();
        let ready = dispatch_item(&cooking, 0).unwrap();
        assert_eq!(ready.status, OrderStatus::Ready);

        let done = complete(&ready).unwrap();
        assert_eq!(done.status, OrderStatus::Completed);
    }
}
