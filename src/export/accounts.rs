//! SKR03 / SKR04 revenue accounts.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::config::ExportConfig;
use crate::lifecycle::Invoice;

/// Standard German chart of accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ChartOfAccounts {
    /// Standardkontenrahmen 03 (most common for SMBs).
    SKR03,
    /// Standardkontenrahmen 04.
    SKR04,
}

impl ChartOfAccounts {
    pub fn code(&self) -> &'static str {
        match self {
            Self::SKR03 => "03",
            Self::SKR04 => "04",
        }
    }

    /// Erlöskonto of the chart for a VAT rate, if it has a standard one.
    pub fn revenue_account(&self, rate_pct: Decimal) -> Option<u32> {
        let (standard, reduced, zero) = match self {
            Self::SKR03 => (8400, 8300, 8200),
            Self::SKR04 => (4400, 4300, 4200),
        };
        if rate_pct == dec!(19) {
            Some(standard)
        } else if rate_pct == dec!(7) {
            Some(reduced)
        } else if rate_pct.is_zero() {
            Some(zero)
        } else {
            None
        }
    }
}

/// Revenue account an invoice is booked on.
///
/// Invoices taxed with a single key use the configured mapping for that
/// key, then the chart's account for its rate. Mixed-rate invoices and
/// anything unmapped fall back to `config.revenue_account`.
pub fn revenue_account_for(invoice: &Invoice, config: &ExportConfig) -> u32 {
    let base = invoice.base();
    let mut used = base.line_items().iter().map(|item| item.tax_key.as_str());
    let single = match used.next() {
        Some(first) if used.all(|key| key == first) => Some(first),
        _ => None,
    };
    let Some(key) = single else {
        return config.revenue_account;
    };
    if let Some(account) = config.account_mapping.get(key) {
        return *account;
    }
    base.tax_keys()
        .iter()
        .find(|tk| tk.key == key)
        .and_then(|tk| config.chart.revenue_account(tk.rate_pct))
        .unwrap_or(config.revenue_account)
}
