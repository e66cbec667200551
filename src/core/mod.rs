//! Core document types, tax keys, totals calculation and numbering.
//!
//! Everything in this module is pure and synchronous: safe to call from any
//! number of concurrent request handlers without coordination.

mod builder;
mod config;
mod error;
mod numbering;
mod tax_keys;
mod totals;
mod types;

pub use builder::*;
pub use config::*;
pub use error::*;
pub use numbering::*;
pub use tax_keys::*;
pub use totals::*;
pub use types::*;
