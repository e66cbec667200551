use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::core::{
    EngineError, ItemType, LineItem, MAX_QUANTITY, MAX_UNIT_AMOUNT, ValidationError, check_range, round2,
};

/// Cost and margin figures of a document. All money values are rounded to
/// cents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostSummary {
    pub materials_cost: Decimal,
    pub labor_cost: Decimal,
    pub overhead_pct: Decimal,
    pub overhead_value: Decimal,
    pub margin_pct: Decimal,
    pub margin_value: Decimal,
    pub sell_total: Decimal,
    /// materials + labor + overhead.
    pub cost_total: Decimal,
}

/// Compute cost, overhead and margin over a set of line items.
///
/// Items without a type are costed half as material, half as labor.
///
/// ```
/// use werkbeleg::core::*;
/// use werkbeleg::costing::calculate_summary;
/// use rust_decimal_macros::dec;
///
/// let items = vec![
///     LineItemBuilder::new(1, "Rohr", dec!(10), "m", dec!(20), "DE19")
///         .item_type(ItemType::Material).unit_cost(dec!(15)).build(),
///     LineItemBuilder::new(2, "Muffe", dec!(5), "Stk", dec!(30), "DE19")
///         .item_type(ItemType::Material).unit_cost(dec!(20)).build(),
/// ];
/// let s = calculate_summary(&items, dec!(10)).unwrap();
/// assert_eq!(s.cost_total, dec!(275));
/// assert_eq!(s.margin_pct, dec!(21.43));
/// ```
pub fn calculate_summary(items: &[LineItem], overhead_pct: Decimal) -> Result<CostSummary, EngineError> {
    let mut errors = Vec::new();
    if overhead_pct < Decimal::ZERO {
        errors.push(ValidationError::with_rule(
            "overhead_pct",
            "overhead must not be negative",
            "AMOUNT-NEG",
        ));
    }
    for (i, item) in items.iter().enumerate() {
        if item.quantity < Decimal::ZERO {
            errors.push(ValidationError::with_rule(
                format!("line_items[{i}].quantity"),
                "quantity must not be negative",
                "AMOUNT-NEG",
            ));
        }
        if item.unit_cost.is_some_and(|c| c < Decimal::ZERO) {
            errors.push(ValidationError::with_rule(
                format!("line_items[{i}].unit_cost"),
                "unit cost must not be negative",
                "AMOUNT-NEG",
            ));
        }
        check_range(&mut errors, format!("line_items[{i}].quantity"), item.quantity, MAX_QUANTITY);
        if let Some(cost) = item.unit_cost {
            check_range(&mut errors, format!("line_items[{i}].unit_cost"), cost, MAX_UNIT_AMOUNT);
        }
        check_range(&mut errors, format!("line_items[{i}].unit_sell"), item.sell_price(), MAX_UNIT_AMOUNT);
    }
    if !errors.is_empty() {
        return Err(EngineError::Validation(errors));
    }

    let mut materials = Decimal::ZERO;
    let mut labor = Decimal::ZERO;
    let mut sell = Decimal::ZERO;
    for item in items {
        let cost = item.unit_cost.unwrap_or(Decimal::ZERO) * item.quantity;
        match item.item_type {
            Some(ItemType::Material) => materials += cost,
            Some(ItemType::Labor) => labor += cost,
            Some(ItemType::Service) | None => {
                let half = cost / dec!(2);
                materials += half;
                labor += half;
            }
        }
        sell += item.sell_price() * item.quantity;
    }

    // Sums stay unrounded; only the reported figures are rounded.
    let direct = materials + labor;
    let overhead = direct.checked_mul(overhead_pct).ok_or_else(|| {
        EngineError::Validation(vec![ValidationError::with_rule(
            "overhead_pct",
            format!("overhead of {overhead_pct}% is out of range"),
            "AMOUNT-RANGE",
        )])
    })? / dec!(100);
    let cost = direct + overhead;
    let margin = sell - cost;

    let materials_cost = round2(materials);
    let labor_cost = round2(labor);
    let overhead_value = round2(overhead);
    let cost_total = round2(cost);
    let sell_total = round2(sell);
    let margin_value = round2(margin);
    let margin_pct = if sell > Decimal::ZERO {
        round2(margin / sell * dec!(100))
    } else {
        Decimal::ZERO
    };

    Ok(CostSummary {
        materials_cost,
        labor_cost,
        overhead_pct,
        overhead_value,
        margin_pct,
        margin_value,
        sell_total,
        cost_total,
    })
}

/// Stored costing state of a document.
///
/// A `Draft` summary can be recomputed and locked. A `Locked` summary is a
/// frozen cost basis: it has no mutators, so later catalog price changes
/// cannot reach it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum CalcSummary {
    Draft(DraftSummary),
    Locked(LockedSummary),
}

/// Recomputable cost summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftSummary {
    figures: CostSummary,
}

impl DraftSummary {
    pub fn new(figures: CostSummary) -> Self {
        Self { figures }
    }

    pub fn figures(&self) -> &CostSummary {
        &self.figures
    }

    /// Fresh figures for the given items.
    pub fn recompute(&self, items: &[LineItem], overhead_pct: Decimal) -> Result<Self, EngineError> {
        Ok(Self::new(calculate_summary(items, overhead_pct)?))
    }

    /// Freeze the figures as of `snapshot_date`.
    pub fn lock(self, snapshot_date: NaiveDate) -> LockedSummary {
        LockedSummary {
            figures: self.figures,
            snapshot_date,
        }
    }
}

/// Frozen cost basis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedSummary {
    figures: CostSummary,
    snapshot_date: NaiveDate,
}

impl LockedSummary {
    pub fn figures(&self) -> &CostSummary {
        &self.figures
    }

    pub fn snapshot_date(&self) -> NaiveDate {
        self.snapshot_date
    }
}

impl CalcSummary {
    /// Draft summary for the given items.
    pub fn calculate(items: &[LineItem], overhead_pct: Decimal) -> Result<Self, EngineError> {
        Ok(Self::Draft(DraftSummary::new(calculate_summary(items, overhead_pct)?)))
    }

    pub fn figures(&self) -> &CostSummary {
        match self {
            Self::Draft(d) => d.figures(),
            Self::Locked(l) => l.figures(),
        }
    }

    pub fn snapshot_locked(&self) -> bool {
        matches!(self, Self::Locked(_))
    }

    pub fn snapshot_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Draft(_) => None,
            Self::Locked(l) => Some(l.snapshot_date()),
        }
    }

    /// Recomputed summary, or `PreconditionFailed` if the basis is locked.
    pub fn recompute(&self, items: &[LineItem], overhead_pct: Decimal) -> Result<Self, EngineError> {
        match self {
            Self::Draft(d) => Ok(Self::Draft(d.recompute(items, overhead_pct)?)),
            Self::Locked(l) => Err(EngineError::PreconditionFailed(format!(
                "cost basis was locked on {} and cannot be recomputed",
                l.snapshot_date()
            ))),
        }
    }

    /// Lock the summary. Locking a locked summary keeps its original date.
    pub fn lock(self, snapshot_date: NaiveDate) -> Self {
        match self {
            Self::Draft(d) => Self::Locked(d.lock(snapshot_date)),
            locked @ Self::Locked(_) => locked,
        }
    }
}

/// Compute a new summary for a document whose current summary is `current`.
///
/// Fails with `PreconditionFailed` when `current` is locked; the caller's
/// stored summary is never touched.
pub fn recalculate_summary(
    current: Option<&CalcSummary>,
    items: &[LineItem],
    overhead_pct: Decimal,
) -> Result<CalcSummary, EngineError> {
    match current {
        Some(summary) => summary.recompute(items, overhead_pct),
        None => CalcSummary::calculate(items, overhead_pct),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::LineItemBuilder;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn typed(qty: Decimal, price: Decimal, cost: Decimal, t: Option<ItemType>) -> LineItem {
        let mut item = LineItemBuilder::new(1, "Pos", qty, "Stk", price, "DE19")
            .unit_cost(cost)
            .build();
        item.item_type = t;
        item
    }

    #[test]
    fn untyped_items_split_half_and_half() {
        let s = calculate_summary(&[typed(dec!(2), dec!(80), dec!(50), None)], dec!(0)).unwrap();
        assert_eq!(s.materials_cost, dec!(50));
        assert_eq!(s.labor_cost, dec!(50));
        assert_eq!(s.cost_total, dec!(100));
        assert_eq!(s.margin_value, dec!(60));
    }

    #[test]
    fn service_items_split_like_untyped() {
        let s = calculate_summary(
            &[typed(dec!(1), dec!(10), dec!(4), Some(ItemType::Service))],
            dec!(0),
        )
        .unwrap();
        assert_eq!((s.materials_cost, s.labor_cost), (dec!(2), dec!(2)));
    }

    #[test]
    fn odd_cent_split_is_not_counted_twice() {
        let s = calculate_summary(&[typed(dec!(1), dec!(20), dec!(10.01), None)], dec!(0)).unwrap();
        // Each half of 10.01 reports as 5.01, the total stays 10.01.
        assert_eq!((s.materials_cost, s.labor_cost), (dec!(5.01), dec!(5.01)));
        assert_eq!(s.cost_total, dec!(10.01));
        assert_eq!(s.margin_value, dec!(9.99));
        assert_eq!(s.margin_pct, dec!(49.95));
    }

    #[test]
    fn overhead_uses_unrounded_costs() {
        let s = calculate_summary(&[typed(dec!(1), dec!(10), dec!(0.01), None)], dec!(50)).unwrap();
        // 0.01 direct + 0.005 overhead
        assert_eq!(s.overhead_value, dec!(0.01));
        assert_eq!(s.cost_total, dec!(0.02));
        assert_eq!(s.margin_value, dec!(9.99));
    }

    #[test]
    fn amounts_out_of_range_are_rejected() {
        let huge = typed(dec!(1000000000000000000), dec!(10), dec!(1000000000000000000), None);
        let err = calculate_summary(&[huge], dec!(10)).unwrap_err();
        let rules: Vec<_> = err
            .validation_errors()
            .iter()
            .filter_map(|e| e.rule.as_deref())
            .collect();
        assert_eq!(rules, ["AMOUNT-RANGE", "AMOUNT-RANGE"]);

        let big = typed(MAX_QUANTITY, dec!(10), MAX_UNIT_AMOUNT, Some(ItemType::Material));
        let err = calculate_summary(&[big], Decimal::MAX).unwrap_err();
        assert_eq!(err.validation_errors()[0].rule.as_deref(), Some("AMOUNT-RANGE"));
    }

    #[test]
    fn zero_sell_total_gives_zero_margin_pct() {
        let s = calculate_summary(
            &[typed(dec!(1), dec!(0), dec!(10), Some(ItemType::Labor))],
            dec!(10),
        )
        .unwrap();
        assert_eq!(s.margin_pct, Decimal::ZERO);
        assert_eq!(s.margin_value, dec!(-11));
    }

    #[test]
    fn negative_overhead_is_rejected() {
        assert!(matches!(
            calculate_summary(&[], dec!(-1)),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn locked_summary_rejects_recompute() {
        let items = [typed(dec!(1), dec!(10), dec!(5), Some(ItemType::Material))];
        let locked = CalcSummary::calculate(&items, dec!(10))
            .unwrap()
            .lock(date(2025, 4, 1));
        assert!(locked.snapshot_locked());
        assert_eq!(locked.snapshot_date(), Some(date(2025, 4, 1)));

        let before = locked.clone();
        let cheaper = [typed(dec!(1), dec!(10), dec!(1), Some(ItemType::Material))];
        let err = recalculate_summary(Some(&locked), &cheaper, dec!(10)).unwrap_err();
        assert!(matches!(err, EngineError::PreconditionFailed(_)));
        assert_eq!(locked, before);
    }

    #[test]
    fn relocking_keeps_first_date() {
        let s = CalcSummary::calculate(&[], dec!(10))
            .unwrap()
            .lock(date(2025, 1, 1))
            .lock(date(2025, 6, 1));
        assert_eq!(s.snapshot_date(), Some(date(2025, 1, 1)));
    }

    #[test]
    fn serializes_with_status_tag() {
        let s = CalcSummary::calculate(&[], dec!(10)).unwrap();
        let json = serde_json::to_string(&s).unwrap();
        assert!(json.contains("\"status\":\"draft\""));
        let back: CalcSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }
}
