//! Trading-rule filter engine.
//!
//! Pure decimal functions that snap raw prices and quantities onto the
//! exchange grid and enforce the minimum-notional rule. Everything quantizes
//! **down** (toward zero) so an order never spends more than intended or
//! crosses a filter boundary.
//!
//! | Function                 | Rule                                             |
//! |--------------------------|--------------------------------------------------|
//! | [`normalize_quantity`]   | floor to `step_qty`, `< min_qty` → 0, clamp max |
//! | [`normalize_price`]      | floor to `tick_size`, clamp `[min, max]`         |
//! | [`ensure_min_notional`]  | raise qty by whole steps until notional is met   |
//! | [`ceil_qty_for_notional`]| smallest step-aligned qty meeting notional       |
//!
//! A zero bound in [`TradingFilters`] disables that rule.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::types::TradingFilters;

/// Floor `value` onto the `step` grid. A non-positive step leaves the value as is.
pub fn quantize_down(value: Decimal, step: Decimal) -> Decimal {
    if step <= Decimal::ZERO {
        return value;
    }
    ((value / step).floor() * step).normalize()
}

/// Smallest multiple of `step` that is `>= value`.
pub fn quantize_up(value: Decimal, step: Decimal) -> Decimal {
    if step <= Decimal::ZERO {
        return value;
    }
    ((value / step).ceil() * step).normalize()
}

/// Snap a raw quantity onto the lot grid.
///
/// Returns zero when the result falls below `min_qty`; callers treat zero as
/// "cannot place".
pub fn normalize_quantity(raw: Decimal, f: &TradingFilters) -> Decimal {
    let q = quantize_down(raw, f.step_qty);
    if q <= Decimal::ZERO || (f.min_qty > Decimal::ZERO && q < f.min_qty) {
        return Decimal::ZERO;
    }
    if f.max_qty > Decimal::ZERO && q > f.max_qty {
        return f.max_qty.normalize();
    }
    q
}

/// Snap a raw price onto the tick grid and clamp it into `[min_price, max_price]`.
pub fn normalize_price(raw: Decimal, f: &TradingFilters) -> Decimal {
    let mut p = quantize_down(raw, f.tick_size);
    if f.min_price > Decimal::ZERO && p < f.min_price {
        p = f.min_price.normalize();
    }
    if f.max_price > Decimal::ZERO && p > f.max_price {
        p = f.max_price.normalize();
    }
    p
}

/// Result of [`ensure_min_notional`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotionalCheck {
    pub price: Decimal,
    pub qty: Decimal,
    pub satisfied: bool,
}

/// Make `price * qty >= min_notional`, raising `qty` by whole steps if needed.
///
/// When the raised quantity cannot be placed (e.g. it exceeds `max_qty`), the
/// original quantity is returned with `satisfied == false` and the caller must
/// abort placement. The quantity is never lowered.
pub fn ensure_min_notional(price: Decimal, qty: Decimal, f: &TradingFilters) -> NotionalCheck {
    let unchanged = |satisfied| NotionalCheck { price, qty, satisfied };

    if f.min_notional <= Decimal::ZERO || price * qty >= f.min_notional {
        return unchanged(true);
    }
    if price <= Decimal::ZERO || f.step_qty <= Decimal::ZERO {
        return unchanged(false);
    }

    let needed = f.min_notional / price;
    let mut q2 = quantize_down(needed, f.step_qty);
    if q2 * price < f.min_notional {
        q2 = (q2 + f.step_qty).normalize();
    }
    let q2 = normalize_quantity(q2, f);
    if q2 > Decimal::ZERO && q2 >= qty && q2 * price >= f.min_notional {
        return NotionalCheck { price, qty: q2, satisfied: true };
    }
    unchanged(false)
}

/// Smallest step-aligned quantity whose notional at `price` reaches
/// `min_notional`. Zero when the price is not positive.
pub fn ceil_qty_for_notional(min_notional: Decimal, price: Decimal, step_qty: Decimal) -> Decimal {
    if price <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    quantize_up(min_notional / price, step_qty)
}

/// Render a decimal for the wire with exactly the scale of `step`
/// (e.g. step `0.01` → `"20200.00"`). Never uses scientific notation.
pub fn to_api_string(value: Decimal, step: Decimal) -> String {
    if step <= Decimal::ZERO {
        return value.normalize().to_string();
    }
    let scale = step.normalize().scale();
    let mut v = value.round_dp_with_strategy(scale, RoundingStrategy::ToZero);
    v.rescale(scale);
    v.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn btc() -> TradingFilters {
        TradingFilters {
            tick_size: dec!(0.01),
            min_price: dec!(0.01),
            max_price: dec!(1000000),
            step_qty: dec!(0.00001),
            min_qty: dec!(0.00001),
            max_qty: dec!(9000),
            min_notional: dec!(5),
        }
    }

    fn raw_values() -> Vec<Decimal> {
        vec![
            dec!(0.000004),
            dec!(0.00001),
            dec!(0.000123456),
            dec!(0.5),
            dec!(1.999999),
            dec!(20000),
            dec!(20200.129),
            dec!(19899.999),
            dec!(123456.789123),
            dec!(9000.5),
            dec!(2000000),
        ]
    }

    #[test]
    fn quantity_floors_to_step() {
        let f = btc();
        assert_eq!(normalize_quantity(dec!(0.000123456), &f), dec!(0.00012));
        assert_eq!(normalize_quantity(dec!(0.0005), &f), dec!(0.0005));
    }

    #[test]
    fn quantity_below_min_is_zero() {
        assert_eq!(normalize_quantity(dec!(0.000009), &btc()), Decimal::ZERO);
    }

    #[test]
    fn quantity_clamped_to_max() {
        assert_eq!(normalize_quantity(dec!(9999.12345), &btc()), dec!(9000));
    }

    #[test]
    fn price_floors_and_clamps() {
        let f = btc();
        assert_eq!(normalize_price(dec!(20200.129), &f), dec!(20200.12));
        assert_eq!(normalize_price(dec!(0.001), &f), dec!(0.01));
        assert_eq!(normalize_price(dec!(2000000), &f), dec!(1000000));
    }

    #[test]
    fn zero_bounds_disable_rules() {
        let f = TradingFilters { tick_size: dec!(0.5), ..Default::default() };
        assert_eq!(normalize_price(dec!(7.9), &f), dec!(7.5));
        assert_eq!(normalize_quantity(dec!(3.3), &f), dec!(3.3));
        assert!(ensure_min_notional(dec!(1), dec!(0.0001), &f).satisfied);
    }

    #[test]
    fn normalization_is_idempotent() {
        let f = btc();
        for raw in raw_values() {
            let p = normalize_price(raw, &f);
            assert_eq!(normalize_price(p, &f), p, "price {raw}");
            let q = normalize_quantity(raw, &f);
            assert_eq!(normalize_quantity(q, &f), q, "qty {raw}");
        }
    }

    #[test]
    fn results_lie_on_grid() {
        let f = btc();
        for raw in raw_values() {
            let p = normalize_price(raw, &f);
            assert_eq!(p % f.tick_size, Decimal::ZERO, "price {raw} -> {p}");
            let q = normalize_quantity(raw, &f);
            assert_eq!(q % f.step_qty, Decimal::ZERO, "qty {raw} -> {q}");
        }
    }

    #[test]
    fn min_notional_raises_quantity() {
        let f = btc();
        let r = ensure_min_notional(dec!(20000), dec!(0.0001), &f);
        assert!(r.satisfied);
        assert_eq!(r.qty, dec!(0.00025));
        assert!(r.price * r.qty >= f.min_notional);
    }

    #[test]
    fn min_notional_unchanged_when_met() {
        let r = ensure_min_notional(dec!(20000), dec!(0.0005), &btc());
        assert_eq!(r, NotionalCheck { price: dec!(20000), qty: dec!(0.0005), satisfied: true });
    }

    #[test]
    fn min_notional_fails_past_max_qty() {
        let f = TradingFilters { max_qty: dec!(0.0001), ..btc() };
        let r = ensure_min_notional(dec!(20000), dec!(0.0001), &f);
        assert!(!r.satisfied);
        assert_eq!(r.qty, dec!(0.0001));
    }

    #[test]
    fn min_notional_never_lowers_quantity() {
        let f = btc();
        for price in [dec!(3), dec!(20000), dec!(0.37)] {
            for qty in [dec!(0.00001), dec!(0.01), dec!(1), dec!(2)] {
                let r = ensure_min_notional(price, qty, &f);
                assert!(r.qty >= qty);
                if r.satisfied {
                    assert!(r.price * r.qty >= f.min_notional);
                }
            }
        }
    }

    #[test]
    fn ceil_qty_rounds_up() {
        assert_eq!(ceil_qty_for_notional(dec!(5), dec!(19900), dec!(0.00001)), dec!(0.00026));
        assert_eq!(ceil_qty_for_notional(dec!(5), Decimal::ZERO, dec!(0.00001)), Decimal::ZERO);
    }

    #[test]
    fn api_string_uses_step_scale() {
        assert_eq!(to_api_string(dec!(20200), dec!(0.01000000)), "20200.00");
        assert_eq!(to_api_string(dec!(0.0005), dec!(0.00001)), "0.00050");
        assert_eq!(to_api_string(dec!(12.5), dec!(1)), "12");
        assert_eq!(to_api_string(dec!(0.00000001), Decimal::ZERO), "0.00000001");
    }
}
