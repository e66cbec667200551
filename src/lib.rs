//! # werkbeleg
//!
//! Calculation and numbering engine for the offers, orders and invoices of
//! trade businesses: per-tax-key totals with proportional discount
//! allocation, cost and margin summaries with a lockable cost basis,
//! gap-tolerant but duplicate-free document numbers, the
//! offer → order → invoice lifecycle with payments, and two fixed
//! accounting export formats.
//!
//! All monetary values use [`rust_decimal::Decimal`], never floating point.
//!
//! ## Quick Start
//!
//! ```rust
//! use werkbeleg::core::*;
//! use rust_decimal_macros::dec;
//!
//! let items = vec![
//!     LineItemBuilder::new(1, "Fliesen verlegen", dec!(2), "m²", dec!(100), "DE19").build(),
//!     LineItemBuilder::new(2, "Fachbuch", dec!(1), "Stk", dec!(50), "DE7").build(),
//! ];
//! let totals = compute_totals(&items, &german_defaults(), dec!(10)).unwrap();
//!
//! assert_eq!(totals.vat_by_key["DE19"], dec!(36.48));
//! assert_eq!(totals.vat_by_key["DE7"], dec!(3.36));
//! assert_eq!(totals.grand_total_gross, dec!(279.84));
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `core` (default) | Totals, costing, numbering, lifecycle, in-memory store |
//! | `export` (default) | Accounting export formats A and B |
//! | `postgres` | PostgreSQL store via `sqlx` |
//! | `all` | Everything |

#[cfg(feature = "core")]
pub mod core;

#[cfg(feature = "core")]
pub mod catalog;

#[cfg(feature = "core")]
pub mod costing;

#[cfg(feature = "core")]
pub mod store;

#[cfg(feature = "core")]
pub mod lifecycle;

#[cfg(feature = "export")]
pub mod export;

// Re-export core types at crate root for convenience
#[cfg(feature = "core")]
pub use crate::core::*;
