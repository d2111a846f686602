//! Local mirror of the product catalog.
//!
//! The mirror is recreatable from the catalog source, so it lives under an evictable key and may
//! disappear under quota pressure. Readers treat an empty mirror as "not loaded yet".

use serde::{Deserialize, Serialize};
use storefront_sync::SyncContext;

use crate::keys::CATALOG_KEY;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// A product as mirrored from the catalog.
pub struct CatalogProduct {
    /// Product id.
    pub id: u32,
    /// Display name.
    pub name: String,
    /// Unit price in cents.
    pub price_cents: u64,
    /// Whether the product can be added to a cart.
    #[serde(default = "default_in_stock")]
    pub in_stock: bool,
}

fn default_in_stock() -> bool {
    true
}

/// Returns the mirrored catalog, empty when it was never loaded or has been evicted.
pub fn products(ctx: &SyncContext) -> Vec<CatalogProduct> {
    ctx.get(CATALOG_KEY, Vec::new())
}

/// Replaces the mirror with `products`.
pub fn replace_mirror(ctx: &SyncContext, products: &[CatalogProduct]) {
    ctx.set(CATALOG_KEY, &products);
}

/// Looks up one mirrored product.
pub fn find(ctx: &SyncContext, id: u32) -> Option<CatalogProduct> {
    products(ctx).into_iter().find(|product| product.id == id)
}
