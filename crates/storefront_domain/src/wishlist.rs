//! Wishlist of product ids, ordered by when they were added.

use std::collections::BTreeSet;

use storefront_sync::SyncContext;

use crate::keys::WISHLIST_KEY;

/// Returns the wishlisted product ids, duplicates dropped.
pub fn ids(ctx: &SyncContext) -> Vec<u32> {
    let mut seen = BTreeSet::new();
    ctx.get::<Vec<u32>>(WISHLIST_KEY, Vec::new())
        .into_iter()
        .filter(|id| seen.insert(*id))
        .collect()
}

/// Returns whether `product_id` is wishlisted.
pub fn contains(ctx: &SyncContext, product_id: u32) -> bool {
    ids(ctx).contains(&product_id)
}

/// Adds `product_id` if absent, removes it otherwise. Returns whether it is now wishlisted.
pub fn toggle(ctx: &SyncContext, product_id: u32) -> bool {
    let mut ids = ids(ctx);
    let added = if let Some(index) = ids.iter().position(|id| *id == product_id) {
        ids.remove(index);
        false
    } else {
        ids.push(product_id);
        true
    };
    ctx.set(WISHLIST_KEY, &ids);
    added
}
