//! Storefront features built on the local persistence layer.
//!
//! Every collection has an explicit schema here; the persistence layer itself stays
//! shape-agnostic. Features take the context's [`storefront_sync::SyncContext`] and never touch the
//! durable facility directly.

#![warn(missing_docs, rustdoc::broken_intra_doc_links)]

pub mod cart;
pub mod catalog;
pub mod keys;
pub mod orders;
pub mod otp;
pub mod session;
pub mod theme;
pub mod wishlist;

pub use cart::CartItem;
pub use catalog::CatalogProduct;
pub use orders::{Order, OrderError};
pub use otp::OtpVerifier;
pub use session::{Role, SessionError, SessionRecord};
pub use theme::{ThemeMode, ThemeSettings};
