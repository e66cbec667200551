use std::collections::{BTreeMap, HashMap};

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

use super::error::{EngineError, ValidationError};
use super::types::{LineItem, TaxKey, Totals};

/// Round to 2 decimal places using half-up (commercial rounding).
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Largest accepted line quantity.
pub const MAX_QUANTITY: Decimal = dec!(1000000000);

/// Largest accepted per-unit amount (price, sell price or cost).
///
/// Together with [`MAX_QUANTITY`] and `MAX_LINE_ITEMS` this keeps every
/// document sum far inside the range of `Decimal`.
pub const MAX_UNIT_AMOUNT: Decimal = dec!(1000000000000);

/// Reject a per-line value above `max` with rule `AMOUNT-RANGE`.
pub(crate) fn check_range(errors: &mut Vec<ValidationError>, field: String, value: Decimal, max: Decimal) {
    if value > max {
        errors.push(ValidationError::with_rule(
            field,
            format!("{value} exceeds the maximum of {max}"),
            "AMOUNT-RANGE",
        ));
    }
}

/// Per-line amounts, each rounded to cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineAmounts {
    pub net: Decimal,
    pub discount: Decimal,
    pub net_after_discount: Decimal,
}

/// `net = round2(qty · price)`, `discount = round2(net · pct / 100)`.
///
/// Expects quantity and price within [`MAX_QUANTITY`] and
/// [`MAX_UNIT_AMOUNT`], as [`compute_totals`] checks before calling it.
pub fn line_amounts(item: &LineItem) -> LineAmounts {
    let net = round2(item.quantity * item.unit_price);
    let discount = match item.discount_pct {
        Some(pct) => round2(net * pct / dec!(100)),
        None => Decimal::ZERO,
    };
    LineAmounts {
        net,
        discount,
        net_after_discount: net - discount,
    }
}

/// Compute net/VAT/gross totals over mixed tax rates.
///
/// The document-level discount is allocated to tax groups in proportion to
/// their share of the discounted item net. VAT is rounded per tax group and
/// then summed, so `total_vat` can differ by ±0.01 from rounding only the
/// sum. Downstream accounting exports depend on the per-group figures.
///
/// ```
/// use werkbeleg::core::*;
/// use rust_decimal_macros::dec;
///
/// let keys = german_defaults();
/// let items = vec![
///     LineItemBuilder::new(1, "Fliesen", dec!(2), "m²", dec!(100), "DE19").build(),
///     LineItemBuilder::new(2, "Fachbuch", dec!(1), "Stk", dec!(50), "DE7").build(),
/// ];
/// let totals = compute_totals(&items, &keys, dec!(10)).unwrap();
/// assert_eq!(totals.vat_by_key["DE19"], dec!(36.48));
/// assert_eq!(totals.vat_by_key["DE7"], dec!(3.36));
/// assert_eq!(totals.grand_total_gross, dec!(279.84));
/// ```
pub fn compute_totals(
    items: &[LineItem],
    tax_keys: &[TaxKey],
    additional_discount_abs: Decimal,
) -> Result<Totals, EngineError> {
    let rates: HashMap<&str, Decimal> = tax_keys
        .iter()
        .map(|k| (k.key.as_str(), k.rate_pct))
        .collect();

    let mut errors = validate_items(items, &rates);
    if additional_discount_abs < Decimal::ZERO {
        errors.push(ValidationError::with_rule(
            "additional_discount_abs",
            "additional discount must not be negative",
            "AMOUNT-NEG",
        ));
    }
    if !errors.is_empty() {
        return Err(EngineError::Validation(errors));
    }

    let mut subtotal_net = Decimal::ZERO;
    let mut line_discount_total = Decimal::ZERO;
    let mut item_net_after_discount = Decimal::ZERO;
    let mut group_net: BTreeMap<&str, Decimal> = BTreeMap::new();

    for item in items {
        let amounts = line_amounts(item);
        subtotal_net += amounts.net;
        line_discount_total += amounts.discount;
        item_net_after_discount += amounts.net_after_discount;
        *group_net.entry(item.tax_key.as_str()).or_insert(Decimal::ZERO) +=
            amounts.net_after_discount;
    }

    if additional_discount_abs > item_net_after_discount {
        return Err(EngineError::Validation(vec![ValidationError::with_rule(
            "additional_discount_abs",
            format!(
                "additional discount {additional_discount_abs} exceeds item net {item_net_after_discount}"
            ),
            "DISCOUNT-EXCEEDS-NET",
        )]));
    }

    let allocate = additional_discount_abs > Decimal::ZERO && item_net_after_discount > Decimal::ZERO;

    let mut vat_by_key = BTreeMap::new();
    for (key, net) in &group_net {
        let group_final = if allocate {
            // Multiply first for exact shares; divide first when the product
            // would leave the Decimal range.
            let share = match additional_discount_abs.checked_mul(*net) {
                Some(product) => product / item_net_after_discount,
                None => additional_discount_abs * (*net / item_net_after_discount),
            };
            *net - share
        } else {
            *net
        };
        // Presence of every key was checked by validate_items.
        let rate = rates.get(key).copied().unwrap_or(Decimal::ZERO);
        vat_by_key.insert((*key).to_string(), round2(group_final * rate / dec!(100)));
    }

    let total_vat: Decimal = vat_by_key.values().copied().sum();
    let grand_total_gross = round2(item_net_after_discount - additional_discount_abs + total_vat);

    Ok(Totals {
        subtotal_net,
        line_discount_total,
        item_net_after_discount,
        additional_discount_abs,
        vat_by_key,
        total_vat,
        grand_total_gross,
    })
}

fn validate_items(items: &[LineItem], rates: &HashMap<&str, Decimal>) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    for (i, item) in items.iter().enumerate() {
        let path = format!("line_items[{i}]");
        if item.quantity < Decimal::ZERO {
            errors.push(ValidationError::with_rule(
                format!("{path}.quantity"),
                "quantity must not be negative",
                "AMOUNT-NEG",
            ));
        }
        if item.unit_price < Decimal::ZERO {
            errors.push(ValidationError::with_rule(
                format!("{path}.unit_price"),
                "unit price must not be negative",
                "AMOUNT-NEG",
            ));
        }
        check_range(&mut errors, format!("{path}.quantity"), item.quantity, MAX_QUANTITY);
        check_range(&mut errors, format!("{path}.unit_price"), item.unit_price, MAX_UNIT_AMOUNT);
        if let Some(pct) = item.discount_pct {
            if pct < Decimal::ZERO {
                errors.push(ValidationError::with_rule(
                    format!("{path}.discount_pct"),
                    "discount must not be negative",
                    "AMOUNT-NEG",
                ));
            } else if pct > dec!(100) {
                errors.push(ValidationError::with_rule(
                    format!("{path}.discount_pct"),
                    "discount must not exceed 100%",
                    "DISCOUNT-RANGE",
                ));
            }
        }
        if !rates.contains_key(item.tax_key.as_str()) {
            errors.push(ValidationError::with_rule(
                format!("{path}.tax_key"),
                format!("tax key '{}' is not part of the document", item.tax_key),
                "TAX-KEY-UNKNOWN",
            ));
        }
    }
    errors
}

impl Totals {
    /// Totals of an empty document.
    pub fn zero() -> Self {
        Self {
            subtotal_net: Decimal::ZERO,
            line_discount_total: Decimal::ZERO,
            item_net_after_discount: Decimal::ZERO,
            additional_discount_abs: Decimal::ZERO,
            vat_by_key: BTreeMap::new(),
            total_vat: Decimal::ZERO,
            grand_total_gross: Decimal::ZERO,
        }
    }

    /// Net after line and document-level discounts.
    pub fn net_after_all_discounts(&self) -> Decimal {
        self.item_net_after_discount - self.additional_discount_abs
    }

    /// Re-check the derived relations of persisted totals.
    pub fn check_consistency(&self) -> Result<(), EngineError> {
        let vat_sum: Decimal = self.vat_by_key.values().copied().sum();
        if vat_sum != self.total_vat {
            return Err(EngineError::IntegrityViolation(format!(
                "VAT total {} does not match sum of per-key amounts {vat_sum}",
                self.total_vat
            )));
        }
        let expected_net = self.subtotal_net - self.line_discount_total;
        if expected_net != self.item_net_after_discount {
            return Err(EngineError::IntegrityViolation(format!(
                "item net {} does not match subtotal {} - line discounts {}",
                self.item_net_after_discount, self.subtotal_net, self.line_discount_total
            )));
        }
        let expected_gross = round2(self.net_after_all_discounts() + self.total_vat);
        if expected_gross != self.grand_total_gross {
            return Err(EngineError::IntegrityViolation(format!(
                "gross total {} does not match net {} + VAT {}",
                self.grand_total_gross,
                self.net_after_all_discounts(),
                self.total_vat
            )));
        }
        Ok(())
    }
}
