//! Shopping cart persisted under [`CART_KEY`].

use serde::{Deserialize, Serialize};
use storefront_sync::SyncContext;

use crate::{
    catalog::CatalogProduct,
    keys::{cart_add_lock_key, CART_KEY},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// One product line in the cart.
pub struct CartItem {
    /// Catalog product id.
    pub product_id: u32,
    /// Display name captured when the line was added.
    pub name: String,
    /// Unit price in cents captured when the line was added.
    pub unit_price_cents: u64,
    /// Number of units, never zero for a stored line.
    pub quantity: u32,
}

impl CartItem {
    /// Builds a single-unit line for `product`.
    pub fn from_product(product: &CatalogProduct) -> Self {
        Self {
            product_id: product.id,
            name: product.name.clone(),
            unit_price_cents: product.price_cents,
            quantity: 1,
        }
    }

    /// Price of the whole line in cents.
    pub fn line_total_cents(&self) -> u64 {
        self.unit_price_cents.saturating_mul(u64::from(self.quantity))
    }
}

/// Returns the current cart lines.
pub fn items(ctx: &SyncContext) -> Vec<CartItem> {
    ctx.get(CART_KEY, Vec::new())
}

/// Adds one unit of `product`, collapsing repeated clicks within the lock window.
///
/// Returns `false` when the product is out of stock or an add for it is still in flight.
pub fn add_to_cart(ctx: &SyncContext, product: &CatalogProduct) -> bool {
    if !product.in_stock {
        leptos::logging::warn!("product {} is out of stock, not added to cart", product.id);
        return false;
    }
    ctx.with_lock(&cart_add_lock_key(product.id), None, || {
        let mut lines = items(ctx);
        match lines.iter_mut().find(|line| line.product_id == product.id) {
            Some(line) => line.quantity = line.quantity.saturating_add(1),
            None => lines.push(CartItem::from_product(product)),
        }
        ctx.set(CART_KEY, &lines);
    })
}

/// Sets the quantity of `product_id`; zero removes the line.
pub fn set_quantity(ctx: &SyncContext, product_id: u32, quantity: u32) {
    let mut lines = items(ctx);
    if quantity == 0 {
        lines.retain(|line| line.product_id != product_id);
    } else if let Some(line) = lines.iter_mut().find(|line| line.product_id == product_id) {
        line.quantity = quantity;
    } else {
        return;
    }
    ctx.set(CART_KEY, &lines);
}

/// Removes the line for `product_id`.
pub fn remove_item(ctx: &SyncContext, product_id: u32) {
    set_quantity(ctx, product_id, 0);
}

/// Empties the cart.
pub fn clear(ctx: &SyncContext) {
    ctx.set(CART_KEY, &Vec::<CartItem>::new());
}

/// Total price of `lines` in cents.
pub fn total_cents(lines: &[CartItem]) -> u64 {
    lines
        .iter()
        .fold(0_u64, |total, line| total.saturating_add(line.line_total_cents()))
}

/// Number of units across `lines`.
pub fn item_count(lines: &[CartItem]) -> u32 {
    lines
        .iter()
        .fold(0_u32, |count, line| count.saturating_add(line.quantity))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use storefront_host::{HostServices, ManualScheduler, SharedMemoryFacility};
    use storefront_sync::SyncConfig;

    use super::*;

    fn tee() -> CatalogProduct {
        CatalogProduct {
            id: 7,
            name: "Logo tee".to_string(),
            price_cents: 2_500,
            in_stock: true,
        }
    }

    fn mug() -> CatalogProduct {
        CatalogProduct {
            id: 9,
            name: "Mug".to_string(),
            price_cents: 1_200,
            in_stock: true,
        }
    }

    fn context(scheduler: &ManualScheduler) -> SyncContext {
        SyncContext::new(
            HostServices::memory(&SharedMemoryFacility::new(), scheduler.clone()),
            SyncConfig::default(),
        )
    }

    #[test]
    fn adds_merge_into_one_line_per_product() {
        let scheduler = ManualScheduler::new();
        let ctx = context(&scheduler);

        assert!(add_to_cart(&ctx, &tee()));
        assert!(add_to_cart(&ctx, &mug()));
        scheduler.advance(300);
        assert!(add_to_cart(&ctx, &tee()));

        let lines = items(&ctx);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].quantity, 2);
        assert_eq!(total_cents(&lines), 2 * 2_500 + 1_200);
        assert_eq!(item_count(&lines), 3);
    }

    #[test]
    fn out_of_stock_products_are_not_added() {
        let scheduler = ManualScheduler::new();
        let ctx = context(&scheduler);
        let sold_out = CatalogProduct {
            in_stock: false,
            ..tee()
        };

        assert!(!add_to_cart(&ctx, &sold_out));
        assert!(items(&ctx).is_empty());
        assert!(!ctx.guard().is_locked(&cart_add_lock_key(7)));
    }

    #[test]
    fn quantity_edits_and_removal() {
        let scheduler = ManualScheduler::new();
        let ctx = context(&scheduler);
        add_to_cart(&ctx, &tee());
        add_to_cart(&ctx, &mug());

        set_quantity(&ctx, 7, 4);
        assert_eq!(items(&ctx)[0].line_total_cents(), 10_000);

        set_quantity(&ctx, 404, 2);
        remove_item(&ctx, 9);
        assert_eq!(
            items(&ctx),
            vec![CartItem {
                product_id: 7,
                name: "Logo tee".to_string(),
                unit_price_cents: 2_500,
                quantity: 4,
            }]
        );

        clear(&ctx);
        assert!(items(&ctx).is_empty());
    }
}
