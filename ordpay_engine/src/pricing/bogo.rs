//! Buy-X-get-Y allocation.
//!
//! For `N` qualifying units, `floor(N / (buy + get)) * get` of them are free. The free units go to the cheapest
//! qualifying units first, with ties broken by product id, so the same cart always produces the same split.
use crate::db_types::Money;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BogoUnit {
    pub product_id: i64,
    pub unit_price: Money,
    pub quantity: i64,
}

/// The number of free units a promotion grants for `units` qualifying units.
pub fn free_unit_count(units: i64, buy: i64, get: i64) -> i64 {
    if buy <= 0 || get <= 0 || units <= 0 {
        return 0;
    }
    (units / (buy + get)) * get
}

/// Returns `(product_id, free_quantity)` for every qualifying line, in product id order.
pub fn allocate_free_units(lines: &[BogoUnit], buy: i64, get: i64) -> Vec<(i64, i64)> {
    let total: i64 = lines.iter().map(|l| l.quantity).sum();
    let mut remaining = free_unit_count(total, buy, get);
    let mut by_price = lines.to_vec();
    by_price.sort_by_key(|l| (l.unit_price, l.product_id));
    let mut allocation = by_price
        .iter()
        .map(|line| {
            let free = remaining.min(line.quantity);
            remaining -= free;
            (line.product_id, free)
        })
        .collect::<Vec<_>>();
    allocation.sort_by_key(|(id, _)| *id);
    allocation
}
