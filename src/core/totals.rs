use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::types::Totals;

/// IVA rate applied to every invoice.
pub const IVA_RATE: Decimal = dec!(0.16);

/// Derive subtotal and IVA from a tax-inclusive total.
///
/// `subtotal = total / 1.16` rounded half-up to cents and `tax = total - subtotal`,
/// so `subtotal + tax == total` holds exactly.
pub fn split_tax_inclusive(total: Decimal) -> Totals {
    let total = round_half_up(total, 2);
    let subtotal = round_half_up(total / (Decimal::ONE + IVA_RATE), 2);
    Totals {
        subtotal,
        tax: total - subtotal,
        total,
    }
}

/// Round a Decimal to `dp` decimal places using half-up (commercial rounding).
pub fn round_half_up(value: Decimal, dp: u32) -> Decimal {
    value.round_dp_with_strategy(dp, rust_decimal::RoundingStrategy::MidpointAwayFromZero)
}

/// Format an amount as a fixed two-decimal string, rounding half-up.
/// Used for every monetary XML attribute and PDF figure.
pub fn format_amount(d: Decimal) -> String {
    let mut rounded = round_half_up(d, 2);
    rounded.rescale(2);
    rounded.to_string()
}
