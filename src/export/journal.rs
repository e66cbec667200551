//! Format B: plain semicolon-separated journal rows.

use tracing::debug;

use super::accounts::revenue_account_for;
use super::config::ExportConfig;
use super::{ensure_exportable, format_amount};
use crate::core::{EngineError, Payment};
use crate::lifecycle::Invoice;

const HEADER: &str = "Datum;Beleg;Konto;Gegenkonto;Betrag;Name";

/// Export invoices as format-B journal rows.
///
/// One row per invoice, `{YYYY-MM-DD};{number};{revenue};{debtor};{gross};{client}`.
/// With `config.include_payments`, each payment in `payments` that belongs
/// to an exported invoice follows its invoice as a row booked from the bank
/// account against the debitor.
///
/// ```
/// use werkbeleg::export::{ExportConfig, to_journal};
///
/// let csv = to_journal(&[], &[], &ExportConfig::default()).unwrap();
/// assert_eq!(csv, "Datum;Beleg;Konto;Gegenkonto;Betrag;Name\n");
/// ```
pub fn to_journal(
    invoices: &[Invoice],
    payments: &[Payment],
    config: &ExportConfig,
) -> Result<String, EngineError> {
    let mut out = String::with_capacity(64 * (invoices.len() + 1));
    out.push_str(HEADER);
    out.push('\n');

    let mut payment_rows = 0usize;
    for inv in invoices {
        ensure_exportable(inv)?;
        let base = inv.base();
        let number = base.number().to_string();
        let name = clean(&base.client_snapshot().name);
        write_row(
            &mut out,
            &[
                &base.issue_date().format("%Y-%m-%d").to_string(),
                &number,
                &revenue_account_for(inv, config).to_string(),
                &config.debtor_account.to_string(),
                &format_amount(base.totals().grand_total_gross),
                &name,
            ],
        );

        if !config.include_payments {
            continue;
        }
        for payment in payments.iter().filter(|p| &p.invoice_id == base.id()) {
            write_row(
                &mut out,
                &[
                    &payment.paid_at.format("%Y-%m-%d").to_string(),
                    &number,
                    &config.bank_account.to_string(),
                    &config.debtor_account.to_string(),
                    &format_amount(payment.amount),
                    &name,
                ],
            );
            payment_rows += 1;
        }
    }

    debug!(invoices = invoices.len(), payments = payment_rows, "format B journal written");
    Ok(out)
}

fn write_row(out: &mut String, fields: &[&str]) {
    out.push_str(&fields.join(";"));
    out.push('\n');
}

/// Separators and line breaks inside a field would shift the columns.
fn clean(value: &str) -> String {
    value
        .chars()
        .map(|c| if matches!(c, ';' | '\n' | '\r') { ' ' } else { c })
        .collect()
}
