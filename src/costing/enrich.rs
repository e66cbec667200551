use std::future::Future;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, warn};

use crate::catalog::{CatalogError, MaterialCatalog, PersonnelCatalog};
use crate::core::{EngineError, ItemType, LineItem, round2};

/// Fill in the unit cost of a line item from the catalogs, then derive
/// its margin and markup.
///
/// Material items with a `material_id` take the catalog's unit price, labor
/// items with a `personnel_id` the hourly rate. On timeout, catalog failure
/// or an unknown id the caller-supplied `unit_cost` is kept.
pub async fn enrich_item_with_cost(
    item: &LineItem,
    materials: &dyn MaterialCatalog,
    personnel: &dyn PersonnelCatalog,
    timeout: Duration,
) -> LineItem {
    let mut enriched = item.clone();

    let looked_up = match (item.item_type, &item.material_id, &item.personnel_id) {
        (Some(ItemType::Material), Some(id), _) => {
            Some(lookup_cost("material", id, timeout, materials.unit_price(id)).await)
        }
        (Some(ItemType::Labor), _, Some(id)) => {
            Some(lookup_cost("personnel", id, timeout, personnel.hourly_rate(id)).await)
        }
        _ => None,
    };

    match looked_up {
        Some(Ok(Some(cost))) => enriched.unit_cost = Some(cost),
        Some(Ok(None)) => debug!(position = item.position, "catalog entry not found, keeping supplied cost"),
        Some(Err(e)) => warn!(
            position = item.position,
            error = %e,
            "catalog lookup failed, keeping supplied cost"
        ),
        None => {}
    }

    apply_margin(&mut enriched);
    enriched
}

/// Enrich every item, keeping order.
pub async fn enrich_items(
    items: &[LineItem],
    materials: &dyn MaterialCatalog,
    personnel: &dyn PersonnelCatalog,
    timeout: Duration,
) -> Vec<LineItem> {
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        out.push(enrich_item_with_cost(item, materials, personnel, timeout).await);
    }
    out
}

/// Derive `line_margin` and `markup_pct` from the item's cost and sell price.
///
/// Without a unit cost, or when a figure leaves the Decimal range, the
/// field stays unset.
pub fn apply_margin(item: &mut LineItem) {
    let Some(cost) = item.unit_cost else {
        item.line_margin = None;
        item.markup_pct = None;
        return;
    };
    let sell = item.sell_price();
    let unit_margin = sell.checked_sub(cost);
    item.line_margin = unit_margin
        .and_then(|m| m.checked_mul(item.quantity))
        .map(round2);
    item.markup_pct = if cost > Decimal::ZERO {
        unit_margin
            .and_then(|m| m.checked_div(cost))
            .and_then(|r| r.checked_mul(dec!(100)))
            .map(round2)
    } else {
        None
    };
}

async fn lookup_cost<F>(
    catalog: &str,
    id: &str,
    timeout: Duration,
    lookup: F,
) -> Result<Option<Decimal>, EngineError>
where
    F: Future<Output = Result<Option<Decimal>, CatalogError>>,
{
    match tokio::time::timeout(timeout, lookup).await {
        Ok(Ok(found)) => Ok(found),
        Ok(Err(e)) => Err(EngineError::Unavailable(format!("{catalog} '{id}': {e}"))),
        Err(_) => Err(EngineError::Unavailable(format!(
            "{catalog} '{id}': no answer within {} ms",
            timeout.as_millis()
        ))),
    }
}
