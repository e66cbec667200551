//! Accounting exports of finished invoices.
//!
//! Two fixed row formats:
//!
//! - **Format A** ([`to_extf`], [`to_extf_time`]): quoted, semicolon
//!   separated, headed by `"EXTF";"300";"21";"<label>";"2.0"`.
//! - **Format B** ([`to_journal`]): unquoted journal rows headed by
//!   `Datum;Beleg;Konto;Gegenkonto;Betrag;Name`.
//!
//! Exports read the persisted totals verbatim and never recompute.
//! Amounts use a dot and two decimals, lines end with `\n`.
//!
//! # Example
//!
//! ```ignore
//! use werkbeleg::export::*;
//!
//! let config = ExportConfigBuilder::new()
//!     .chart(ChartOfAccounts::SKR03)
//!     .include_payments(true)
//!     .build();
//!
//! let csv = to_journal(&invoices, &payments, &config)?;
//! ```

mod accounts;
mod config;
mod extf;
mod journal;

pub use accounts::{ChartOfAccounts, revenue_account_for};
pub use config::{ExportConfig, ExportConfigBuilder};
pub use extf::{TimeRecord, to_extf, to_extf_time};
pub use journal::to_journal;

use rust_decimal::Decimal;

use crate::core::{EngineError, round2};
use crate::lifecycle::{Invoice, InvoiceState};

/// Two fixed decimals with a dot: `1190.00`.
fn format_amount(d: Decimal) -> String {
    format!("{:.2}", round2(d))
}

/// Only invoices that left `draft` carry final numbers and totals.
fn ensure_exportable(invoice: &Invoice) -> Result<(), EngineError> {
    if invoice.state() == InvoiceState::Draft {
        return Err(EngineError::PreconditionFailed(format!(
            "invoice {} is still a draft",
            invoice.base().number()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_amount_basic() {
        assert_eq!(format_amount(Decimal::new(119000, 2)), "1190.00");
        assert_eq!(format_amount(Decimal::new(2495, 2)), "24.95");
        assert_eq!(format_amount(Decimal::new(100, 0)), "100.00");
    }

    #[test]
    fn format_amount_rounds() {
        assert_eq!(format_amount(Decimal::new(123456, 3)), "123.46");
    }
}
