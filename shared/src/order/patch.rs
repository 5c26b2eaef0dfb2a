//! Field-path partial updates
//!
//! Transports with write-granularity support (the keyed store, the push
//! server) carry patches as a mapping of `/`-separated field paths to
//! JSON values, e.g. `items/2/status -> "ready"`. A patch is applied to
//! the serialized order tree and the result is deserialized again, so
//! unknown status strings or malformed values reject the whole patch at
//! the boundary instead of propagating.
//!
//! Immutable-after-creation fields (`id`, `total`, `paymentMethod`,
//! `timestamp`) cannot be patched, and item sub-paths may only target
//! `status` - name, quantity and price are captured at checkout.

use super::model::Order;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// Mapping of field paths to replacement values
pub type PathUpdates = BTreeMap<String, Value>;

/// Fields frozen at checkout
const IMMUTABLE_FIELDS: [&str; 4] = ["id", "total", "paymentMethod", "timestamp"];

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PatchError {
    #[error("invalid field path: {0}")]
    InvalidPath(String),

    #[error("unknown field in path: {0}")]
    UnknownField(String),

    #[error("index out of range in path: {0}")]
    IndexOutOfRange(String),

    #[error("field is immutable after creation: {0}")]
    ImmutableField(String),

    #[error("patch produced an invalid order: {0}")]
    InvalidValue(String),
}

pub type PatchResult<T> = Result<T, PatchError>;

/// Apply path updates to an order, producing the patched snapshot
///
/// All-or-nothing: the first bad path or value rejects the whole patch.
pub fn apply_updates(order: &Order, updates: &PathUpdates) -> PatchResult<Order> {
    let mut doc = serde_json::to_value(order)
        .map_err(|e| PatchError::InvalidValue(e.to_string()))?;

    for (path, value) in updates {
        validate_path(path)?;
        set_path(&mut doc, path, value.clone())?;
    }

    serde_json::from_value(doc).map_err(|e| PatchError::InvalidValue(e.to_string()))
}

fn validate_path(path: &str) -> PatchResult<()> {
    let segments: Vec<&str> = path.split('/').collect();
    if segments.is_empty() || segments.iter().any(|s| s.is_empty()) {
        return Err(PatchError::InvalidPath(path.to_string()));
    }

    let root = segments[0];
    if IMMUTABLE_FIELDS.contains(&root) {
        return Err(PatchError::ImmutableField(root.to_string()));
    }
    // Items are append-only captures; only their kitchen status moves
    if root == "items" && segments.last() != Some(&"status") {
        return Err(PatchError::ImmutableField(path.to_string()));
    }
    Ok(())
}

fn set_path(doc: &mut Value, path: &str, value: Value) -> PatchResult<()> {
    let segments: Vec<&str> = path.split('/').collect();
    let (&leaf, parents) = segments
        .split_last()
        .ok_or_else(|| PatchError::InvalidPath(path.to_string()))?;

    let mut current = doc;
    for &segment in parents {
        current = descend(current, segment, path)?;
    }

    match current {
        Value::Object(map) => {
            map.insert(leaf.to_string(), value);
            Ok(())
        }
        Value::Array(arr) => {
            let index = parse_index(leaf, path)?;
            if index >= arr.len() {
                return Err(PatchError::IndexOutOfRange(path.to_string()));
            }
            arr[index] = value;
            Ok(())
        }
        _ => Err(PatchError::InvalidPath(path.to_string())),
    }
}

fn descend<'a>(current: &'a mut Value, segment: &str, path: &str) -> PatchResult<&'a mut Value> {
    match current {
        Value::Object(map) => map
            .get_mut(segment)
            .ok_or_else(|| PatchError::UnknownField(path.to_string())),
        Value::Array(arr) => {
            let index = parse_index(segment, path)?;
            let len = arr.len();
            arr.get_mut(index)
                .ok_or_else(|| PatchError::IndexOutOfRange(format!("{} (len {})", path, len)))
        }
        _ => Err(PatchError::InvalidPath(path.to_string())),
    }
}

fn parse_index(segment: &str, path: &str) -> PatchResult<usize> {
    segment
        .parse::<usize>()
        .map_err(|_| PatchError::InvalidPath(path.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::lifecycle::{self, OrderIds};
    use crate::order::model::{CartItem, ItemStatus, OrderStatus, PaymentMethod};
    use serde_json::json;

    fn cooking_order() -> Order {
        let ids = OrderIds::new();
        let cart = vec![
            CartItem::new("Veg Atho", 1, 110.0),
            CartItem::new("Egg Atho", 2, 130.0),
        ];
        let order = lifecycle::checkout(&ids, &cart, PaymentMethod::Gpay).unwrap();
        lifecycle::send_to_kitchen(&order).unwrap()
    }

    #[test]
    fn test_patch_item_status() {
        let order = cooking_order();
        let mut updates = PathUpdates::new();
        updates.insert("items/1/status".to_string(), json!("ready"));

        let patched = apply_updates(&order, &updates).unwrap();
        assert_eq!(patched.items[1].status, ItemStatus::Ready);
        assert_eq!(patched.items[0].status, ItemStatus::Cooking);
    }

    #[test]
    fn test_patch_order_status_and_pending_change() {
        let order = cooking_order();
        let mut updates = PathUpdates::new();
        updates.insert("status".to_string(), json!("ready"));
        updates.insert("pendingChange".to_string(), json!(true));
        updates.insert("pendingChangeAmount".to_string(), json!(40.0));

        let patched = apply_updates(&order, &updates).unwrap();
        assert_eq!(patched.status, OrderStatus::Ready);
        assert_eq!(patched.pending_change, Some(true));
        assert_eq!(patched.pending_change_amount, Some(40.0));
    }

    #[test]
    fn test_patch_clears_optional_with_null() {
        let order = lifecycle::attach_pending_change(
            &lifecycle::checkout(
                &OrderIds::new(),
                &[CartItem::new("Tea", 1, 10.0)],
                PaymentMethod::Cash,
            )
            .unwrap(),
            5.0,
        )
        .unwrap();

        let mut updates = PathUpdates::new();
        updates.insert("pendingChange".to_string(), Value::Null);
        updates.insert("pendingChangeAmount".to_string(), Value::Null);

        let patched = apply_updates(&order, &updates).unwrap();
        assert!(patched.pending_change.is_none());
        assert!(patched.pending_change_amount.is_none());
    }

    #[test]
    fn test_patch_rejects_unknown_status() {
        let order = cooking_order();
        let mut updates = PathUpdates::new();
        updates.insert("items/0/status".to_string(), json!("burnt"));

        assert!(matches!(
            apply_updates(&order, &updates),
            Err(PatchError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_patch_rejects_immutable_fields() {
        let order = cooking_order();

        for path in ["id", "total", "paymentMethod", "timestamp"] {
            let mut updates = PathUpdates::new();
            updates.insert(path.to_string(), json!(1));
            assert!(
                matches!(
                    apply_updates(&order, &updates),
                    Err(PatchError::ImmutableField(_))
                ),
                "path {} should be immutable",
                path
            );
        }

        // Item captures other than status are frozen too
        let mut updates = PathUpdates::new();
        updates.insert("items/0/price".to_string(), json!(999.0));
        assert!(matches!(
            apply_updates(&order, &updates),
            Err(PatchError::ImmutableField(_))
        ));
    }

    #[test]
    fn test_patch_rejects_bad_index() {
        let order = cooking_order();
        let mut updates = PathUpdates::new();
        updates.insert("items/9/status".to_string(), json!("ready"));
        assert!(matches!(
            apply_updates(&order, &updates),
            Err(PatchError::IndexOutOfRange(_))
        ));
    }

    #[test]
    fn test_patch_rejects_unknown_field_path() {
        let order = cooking_order();
        let mut updates = PathUpdates::new();
        updates.insert("toppings/0/status".to_string(), json!("ready"));
        assert!(matches!(
            apply_updates(&order, &updates),
            Err(PatchError::UnknownField(_))
        ));
    }
}
