// src/pricing.rs

use rust_decimal::{Decimal, RoundingStrategy};

/// Sales tax applied to stores flagged as taxable (8.875%).
pub const TAX_RATE: Decimal = Decimal::from_parts(8875, 0, 0, false, 5);

/// Per-customer handling surcharge (12%).
pub const HANDLING_RATE: Decimal = Decimal::from_parts(12, 0, 0, false, 2);

fn round_cents(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven)
}

/// Amount due for one line. Rounded per line; callers sum rounded lines.
pub fn line_total(quantity: i64, unit_price: Decimal, tax_flag: i64) -> Decimal {
    let multiplier = Decimal::ONE + TAX_RATE * Decimal::from(tax_flag);
    round_cents(unit_price * Decimal::from(quantity) * multiplier)
}

pub fn customer_handling_fee(subtotal: Decimal) -> Decimal {
    round_cents(subtotal * HANDLING_RATE)
}

/// "$12.30"
pub fn dollar(amount: Decimal) -> String {
    format!("${:.2}", amount)
}
