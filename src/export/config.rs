use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::accounts::ChartOfAccounts;

/// Accounts and labels used by both export formats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Label in the format-A header of invoice exports.
    pub label: String,
    /// Label in the format-A header of time-record exports.
    pub time_label: String,
    /// Debitor collective account (Debitorensammelkonto).
    pub debtor_account: u32,
    /// Revenue account used when neither the mapping nor the chart decide.
    pub revenue_account: u32,
    /// Bank account payments are booked against.
    pub bank_account: u32,
    pub chart: ChartOfAccounts,
    /// Tax key → revenue account overrides.
    pub account_mapping: BTreeMap<String, u32>,
    /// Add one journal row per recorded payment.
    pub include_payments: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            label: "Buchungsstapel".into(),
            time_label: "Zeiterfassung".into(),
            debtor_account: 10000,
            revenue_account: 8400,
            bank_account: 1200,
            chart: ChartOfAccounts::SKR03,
            account_mapping: BTreeMap::new(),
            include_payments: false,
        }
    }
}

/// Builder for [`ExportConfig`].
///
/// # Example
///
/// ```
/// use werkbeleg::export::{ChartOfAccounts, ExportConfigBuilder};
///
/// let config = ExportConfigBuilder::new()
///     .chart(ChartOfAccounts::SKR04)
///     .map_tax_key("DE19", 4400)
///     .include_payments(true)
///     .build();
/// assert_eq!(config.debtor_account, 10000);
/// ```
#[derive(Debug, Default)]
pub struct ExportConfigBuilder {
    config: ExportConfig,
}

impl ExportConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the format-A header label for invoice exports.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.config.label = label.into();
        self
    }

    /// Set the format-A header label for time-record exports.
    pub fn time_label(mut self, label: impl Into<String>) -> Self {
        self.config.time_label = label.into();
        self
    }

    pub fn debtor_account(mut self, account: u32) -> Self {
        self.config.debtor_account = account;
        self
    }

    /// Set the fallback revenue account.
    pub fn revenue_account(mut self, account: u32) -> Self {
        self.config.revenue_account = account;
        self
    }

    pub fn bank_account(mut self, account: u32) -> Self {
        self.config.bank_account = account;
        self
    }

    pub fn chart(mut self, chart: ChartOfAccounts) -> Self {
        self.config.chart = chart;
        self
    }

    /// Book revenue of invoices taxed only with `tax_key` on `account`.
    pub fn map_tax_key(mut self, tax_key: impl Into<String>, account: u32) -> Self {
        self.config.account_mapping.insert(tax_key.into(), account);
        self
    }

    pub fn include_payments(mut self, include: bool) -> Self {
        self.config.include_payments = include;
        self
    }

    pub fn build(self) -> ExportConfig {
        self.config
    }
}
