//! Order pricing.
//!
//! Pure arithmetic over already-resolved unit prices; the engine takes the
//! price snapshot from the catalog and hands it here. All math is exact
//! decimal, so `total == Σ unit_price * quantity` holds to the last digit.

use rust_decimal::Decimal;

/// A resolved order line: the product's unit price at order time and the quantity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinePrice {
    pub unit_price: Decimal,
    pub quantity: i64,
}

/// Per-line totals and the order total
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    pub line_totals: Vec<Decimal>,
    pub total: Decimal,
}

/// Line whose total left the representable decimal range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricingOverflow {
    pub index: usize,
}

pub fn quote(lines: &[LinePrice]) -> Result<Quote, PricingOverflow> {
    let mut line_totals = Vec::with_capacity(lines.len());
    let mut total = Decimal::ZERO;

    for (index, line) in lines.iter().enumerate() {
        let line_total = line
            .unit_price
            .checked_mul(Decimal::from(line.quantity))
            .ok_or(PricingOverflow { index })?;
        total = total
            .checked_add(line_total)
            .ok_or(PricingOverflow { index })?;
        line_totals.push(line_total);
    }

    Ok(Quote { line_totals, total })
}
