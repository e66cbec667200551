//! Format A: quoted, semicolon-separated EXTF-style rows.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::accounts::revenue_account_for;
use super::config::ExportConfig;
use super::{ensure_exportable, format_amount};
use crate::core::{EngineError, round2};
use crate::lifecycle::Invoice;

const FORMAT_VERSION: &str = "300";
const DATA_CATEGORY: &str = "21";
const HEADER_VERSION: &str = "2.0";

/// A finished or running time-clock entry of one employee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRecord {
    /// Personalnummer.
    pub personnel_number: String,
    pub start: NaiveDateTime,
    /// `None` while the record is still running.
    pub end: Option<NaiveDateTime>,
    /// Total break within the record, in seconds.
    pub break_secs: u32,
}

impl TimeRecord {
    /// Worked hours: span minus breaks, never negative. `None` while running.
    pub fn worked_hours(&self) -> Option<Decimal> {
        let end = self.end?;
        let secs = (end - self.start).num_seconds() - i64::from(self.break_secs);
        Some(round2(Decimal::from(secs.max(0)) / dec!(3600)))
    }

    /// Break rounded to whole minutes.
    pub fn break_minutes(&self) -> u32 {
        (self.break_secs + 30) / 60
    }
}

/// Export invoices as format-A booking rows.
///
/// One row per invoice:
/// `"{number}";"INVOICE {number}";"{debtor}";"{revenue}";"{gross}";"{YYYYMMDD}";"{client}"`.
/// Amounts are the persisted gross totals. Draft invoices are rejected.
///
/// ```
/// use werkbeleg::export::{ExportConfig, to_extf};
///
/// let csv = to_extf(&[], &ExportConfig::default()).unwrap();
/// assert_eq!(csv, "\"EXTF\";\"300\";\"21\";\"Buchungsstapel\";\"2.0\"\n");
/// ```
pub fn to_extf(invoices: &[Invoice], config: &ExportConfig) -> Result<String, EngineError> {
    let mut out = String::new();
    write_header(&mut out, &config.label);

    for inv in invoices {
        ensure_exportable(inv)?;
        let base = inv.base();
        let number = base.number().to_string();
        write_row(
            &mut out,
            &[
                &number,
                &format!("INVOICE {number}"),
                &config.debtor_account.to_string(),
                &revenue_account_for(inv, config).to_string(),
                &format_amount(base.totals().grand_total_gross),
                &base.issue_date().format("%Y%m%d").to_string(),
                &base.client_snapshot().name,
            ],
        );
    }

    debug!(invoices = invoices.len(), "format A invoice export written");
    Ok(out)
}

/// Export time records as format-A rows with a column header.
///
/// Running records (no end) are skipped.
pub fn to_extf_time(records: &[TimeRecord], config: &ExportConfig) -> String {
    let mut out = String::new();
    write_header(&mut out, &config.time_label);
    write_row(
        &mut out,
        &["Personalnummer", "Datum", "Von", "Bis", "Pause", "Stunden", "Art"],
    );

    let mut written = 0usize;
    for record in records {
        let (Some(end), Some(hours)) = (record.end, record.worked_hours()) else {
            continue;
        };
        write_row(
            &mut out,
            &[
                &record.personnel_number,
                &record.start.format("%d%m%Y").to_string(),
                &record.start.format("%H%M").to_string(),
                &end.format("%H%M").to_string(),
                &record.break_minutes().to_string(),
                &format_amount(hours),
                "Normal",
            ],
        );
        written += 1;
    }

    debug!(records = written, skipped = records.len() - written, "format A time export written");
    out
}

fn write_header(out: &mut String, label: &str) {
    write_row(
        out,
        &["EXTF", FORMAT_VERSION, DATA_CATEGORY, label, HEADER_VERSION],
    );
}

fn write_row(out: &mut String, fields: &[&str]) {
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.push(';');
        }
        out.push('"');
        out.push_str(&clean(field));
        out.push('"');
    }
    out.push('\n');
}

/// Quotes would break the quoting, line breaks the row.
fn clean(value: &str) -> String {
    value
        .chars()
        .filter(|c| *c != '"')
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect()
}
