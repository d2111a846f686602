//! Facility keys, one JSON value per logical collection.

/// Cart line items.
pub const CART_KEY: &str = "storefront.cart.v1";
/// Wishlist product ids.
pub const WISHLIST_KEY: &str = "storefront.wishlist.v1";
/// Signed-in user record.
pub const SESSION_KEY: &str = "storefront.session.v1";
/// Theme settings.
pub const THEME_KEY: &str = "storefront.theme.v1";
/// Placed orders.
pub const ORDERS_KEY: &str = "storefront.orders.v1";
/// Product catalog mirror. Recreatable, so the `cache.` prefix marks it evictable.
pub const CATALOG_KEY: &str = "cache.catalog.v1";

/// Lock key guarding "add to cart" for one product.
pub fn cart_add_lock_key(product_id: u32) -> String {
    format!("cart:add:{product_id}")
}

/// Lock key guarding order placement.
pub const PLACE_ORDER_LOCK_KEY: &str = "orders:place";
