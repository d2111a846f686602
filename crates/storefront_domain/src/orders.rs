//! Order placement and history.
//!
//! Placing an order appends to the order list and then empties the cart. The two keys are written
//! independently, so a context that stops between them keeps both the order and the cart.

use serde::{Deserialize, Serialize};
use storefront_sync::{SequencePattern, SyncContext};
use thiserror::Error;

use crate::{
    cart::{self, CartItem},
    keys::{ORDERS_KEY, PLACE_ORDER_LOCK_KEY},
};

/// Prefix of order numbers (`ORD-01`, `ORD-02`, ...).
pub const ORDER_ID_PREFIX: &str = "ORD-";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// A placed order.
pub struct Order {
    /// Sequence-derived order number.
    pub id: String,
    /// Cart lines at placement time.
    pub items: Vec<CartItem>,
    /// Sum of the line totals in cents.
    pub total_cents: u64,
    /// When the order was placed.
    pub placed_at_ms: u64,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
/// Reasons an order cannot be placed.
pub enum OrderError {
    /// The cart has no lines.
    #[error("cannot place an order from an empty cart")]
    EmptyCart,
    /// Another placement from this context is still in flight.
    #[error("an order is already being placed")]
    InFlight,
}

/// Returns the order number pattern.
pub fn order_pattern() -> SequencePattern {
    SequencePattern::prefixed(ORDER_ID_PREFIX)
}

/// Returns placed orders, oldest first.
pub fn history(ctx: &SyncContext) -> Vec<Order> {
    ctx.get(ORDERS_KEY, Vec::new())
}

/// Returns the number the next placed order would get.
pub fn next_order_id(ctx: &SyncContext) -> String {
    ctx.next_sequence(ORDERS_KEY, &order_pattern())
}

/// Turns the current cart into an order and empties the cart.
///
/// Order numbers come from the last stored order, so two contexts placing orders at the same time
/// can both receive the same number.
///
/// # Errors
///
/// Returns [`OrderError::EmptyCart`] for an empty cart and [`OrderError::InFlight`] when a
/// placement is already running in this context.
pub fn place_order(ctx: &SyncContext) -> Result<Order, OrderError> {
    let lines = cart::items(ctx);
    if lines.is_empty() {
        return Err(OrderError::EmptyCart);
    }

    ctx.run_due_timers();
    let lock_timeout_ms = ctx.config().lock_timeout_ms;
    if ctx.guard().acquire(PLACE_ORDER_LOCK_KEY, lock_timeout_ms).is_none() {
        leptos::logging::debug_warn!("order placement rejected, one is already in flight");
        return Err(OrderError::InFlight);
    }

    let template = Order {
        id: String::new(),
        total_cents: cart::total_cents(&lines),
        items: lines,
        placed_at_ms: ctx.now_ms(),
    };
    let id = ctx
        .sequences()
        .append_next(ORDERS_KEY, &order_pattern(), |id| Order {
            id: id.to_string(),
            ..template.clone()
        });
    cart::clear(ctx);
    Ok(Order { id, ..template })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use storefront_host::{HostServices, ManualScheduler, SharedMemoryFacility};
    use storefront_sync::SyncConfig;

    use super::*;
    use crate::catalog::CatalogProduct;

    fn context(scheduler: &ManualScheduler) -> SyncContext {
        SyncContext::new(
            HostServices::memory(&SharedMemoryFacility::new(), scheduler.clone()),
            SyncConfig::default(),
        )
    }

    fn product(id: u32, price_cents: u64) -> CatalogProduct {
        CatalogProduct {
            id,
            name: format!("Product {id}"),
            price_cents,
            in_stock: true,
        }
    }

    #[test]
    fn empty_cart_is_refused() {
        let scheduler = ManualScheduler::new();
        let ctx = context(&scheduler);
        assert_eq!(place_order(&ctx), Err(OrderError::EmptyCart));
        assert!(history(&ctx).is_empty());
    }

    #[test]
    fn orders_are_numbered_and_cart_is_cleared() {
        let scheduler = ManualScheduler::new();
        let ctx = context(&scheduler);

        let mut ids = Vec::new();
        for n in 1..=3 {
            cart::add_to_cart(&ctx, &product(n, 1_000 * u64::from(n)));
            let order = place_order(&ctx).expect("order placed");
            assert!(cart::items(&ctx).is_empty());
            ids.push(order.id);
            scheduler.advance(300);
        }

        assert_eq!(ids, vec!["ORD-01", "ORD-02", "ORD-03"]);
        let stored = history(&ctx);
        assert_eq!(stored.len(), 3);
        assert_eq!(stored[1].total_cents, 2_000);
        assert_eq!(stored[2].placed_at_ms, 600);
        assert_eq!(next_order_id(&ctx), "ORD-04");
    }

    #[test]
    fn returned_order_is_the_stored_record_and_holds_the_lock() {
        let scheduler = ManualScheduler::starting_at(1_000);
        let ctx = context(&scheduler);
        cart::add_to_cart(&ctx, &product(4, 750));
        cart::add_to_cart(&ctx, &product(5, 250));

        let order = place_order(&ctx).expect("order placed");
        assert_eq!(order.id, "ORD-01");
        assert_eq!(order.total_cents, 1_000);
        assert_eq!(order.placed_at_ms, 1_000);
        assert_eq!(history(&ctx), vec![order]);

        assert!(ctx.guard().is_locked(PLACE_ORDER_LOCK_KEY));
        scheduler.advance(ctx.config().lock_timeout_ms);
        assert!(!ctx.guard().is_locked(PLACE_ORDER_LOCK_KEY));
    }

    #[test]
    fn second_placement_inside_lock_window_is_in_flight() {
        let scheduler = ManualScheduler::new();
        let ctx = context(&scheduler);
        cart::add_to_cart(&ctx, &product(1, 500));
        place_order(&ctx).expect("first");

        cart::add_to_cart(&ctx, &product(2, 500));
        assert_eq!(place_order(&ctx), Err(OrderError::InFlight));
        assert_eq!(cart::items(&ctx).len(), 1);
    }
}
