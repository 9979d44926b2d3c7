// 💰 Costing Calculator - new quantity, weighted-average price, total value
//
// Pure arithmetic, no store access.
//
// Issue:   quantity down, unit price unchanged, total = round(qty × price, 1)
// Receipt: quantity up; on empty stock the entered price is taken as given,
//          otherwise the unit price becomes the quantity-weighted average
//          round(total / qty, 2) where total = round(old value + incoming value, 1)
//
// Rounding is exact Decimal half-to-even. Values booked by the older float-based
// application may differ in the last place (0.35 was stored as 0.3 there).
// Every product is checked; leaving the Decimal range is an error, never a panic.

use crate::db::Direction;
use crate::error::{LedgerError, ValidationError};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use thiserror::Error;

/// Decimal places of a stored total value.
pub const TOTAL_DP: u32 = 1;
/// Decimal places of an averaged unit price.
pub const UNIT_PRICE_DP: u32 = 2;

/// Post-movement values for one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Costing {
    pub new_quantity: i64,
    pub unit_price: Decimal,
    pub total_value: Decimal,
    /// Positive for receipts, negative for issues
    pub signed_delta: i64,
    /// Price the movement is booked at: entered price on receipts, stock price on issues
    pub movement_unit_price: Decimal,
    /// round(signed_delta × movement_unit_price, 1)
    pub movement_value: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CostingError {
    #[error("Položka Změna množství musí být kladné celé číslo (zadáno {0}).")]
    NonPositiveDelta(i64),

    #[error("Vydávané množství {requested} je větší než množství na skladě {on_hand}.")]
    InsufficientStock { on_hand: i64, requested: i64 },

    #[error("Množství nebo cena je příliš velká, hodnotu zásoby nelze spočítat.")]
    Overflow,
}

impl CostingError {
    /// Form field the error is reported on.
    pub fn field(&self) -> &'static str {
        match self {
            CostingError::Overflow => "unit_price",
            _ => "quantity_delta",
        }
    }
}

impl From<CostingError> for LedgerError {
    fn from(err: CostingError) -> Self {
        LedgerError::Validation(ValidationError::new(err.field(), err.to_string()))
    }
}

pub fn round_total(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(TOTAL_DP, RoundingStrategy::MidpointNearestEven)
}

pub fn round_unit_price(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(UNIT_PRICE_DP, RoundingStrategy::MidpointNearestEven)
}

/// quantity × price, or `Overflow` when it leaves the Decimal range.
fn value_of(quantity: i64, unit_price: Decimal) -> Result<Decimal, CostingError> {
    Decimal::from(quantity)
        .checked_mul(unit_price)
        .ok_or(CostingError::Overflow)
}

/// Compute the post-movement quantity, unit price and total value.
///
/// `new_unit_price` is the price entered for a receipt; it is ignored for issues.
pub fn compute(
    direction: Direction,
    current_quantity: i64,
    current_unit_price: Decimal,
    delta: i64,
    new_unit_price: Decimal,
) -> Result<Costing, CostingError> {
    if delta <= 0 {
        return Err(CostingError::NonPositiveDelta(delta));
    }

    match direction {
        Direction::Issue => {
            if delta > current_quantity {
                return Err(CostingError::InsufficientStock {
                    on_hand: current_quantity,
                    requested: delta,
                });
            }
            let new_quantity = current_quantity - delta;

            Ok(Costing {
                new_quantity,
                unit_price: current_unit_price,
                total_value: round_total(value_of(new_quantity, current_unit_price)?),
                signed_delta: -delta,
                movement_unit_price: current_unit_price,
                movement_value: movement_value(-delta, current_unit_price)?,
            })
        }
        Direction::Receipt => {
            let new_quantity = current_quantity
                .checked_add(delta)
                .ok_or(CostingError::Overflow)?;
            let incoming = value_of(delta, new_unit_price)?;

            if current_quantity == 0 {
                // Nothing to average against
                return Ok(Costing {
                    new_quantity,
                    unit_price: new_unit_price,
                    total_value: round_total(incoming),
                    signed_delta: delta,
                    movement_unit_price: new_unit_price,
                    movement_value: round_total(incoming),
                });
            }

            let total_value = round_total(
                value_of(current_quantity, current_unit_price)?
                    .checked_add(incoming)
                    .ok_or(CostingError::Overflow)?,
            );
            let average = round_unit_price(total_value / Decimal::from(new_quantity));

            Ok(Costing {
                new_quantity,
                unit_price: average,
                total_value,
                signed_delta: delta,
                movement_unit_price: new_unit_price,
                movement_value: round_total(incoming),
            })
        }
    }
}

/// Value of the movement itself: round(signed delta × price, 1).
pub fn movement_value(signed_delta: i64, unit_price: Decimal) -> Result<Decimal, CostingError> {
    Ok(round_total(value_of(signed_delta, unit_price)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_first_receipt_takes_entered_price() {
        let c = compute(Direction::Receipt, 0, Decimal::ZERO, 10, dec!(5.00)).unwrap();
        assert_eq!(c.new_quantity, 10);
        assert_eq!(c.unit_price, dec!(5.00));
        assert_eq!(c.total_value, dec!(50.0));
        assert_eq!(c.signed_delta, 10);
    }

    #[test]
    fn test_receipt_averages_price() {
        let c = compute(Direction::Receipt, 10, dec!(5.00), 5, dec!(8.00)).unwrap();
        assert_eq!(c.total_value, dec!(90.0));
        assert_eq!(c.unit_price, dec!(6.00));
        assert_eq!(c.new_quantity, 15);
    }

    #[test]
    fn test_average_is_rounded_to_two_places() {
        // 2 × 1.00 + 1 × 3.00 = 5.0, spread over 3 units
        let c = compute(Direction::Receipt, 2, dec!(1.00), 1, dec!(3.00)).unwrap();
        assert_eq!(c.total_value, dec!(5.0));
        assert_eq!(c.unit_price, dec!(1.67));
    }

    #[test]
    fn test_issue_keeps_price() {
        let c = compute(Direction::Issue, 15, dec!(6.00), 5, Decimal::ZERO).unwrap();
        assert_eq!(c.new_quantity, 10);
        assert_eq!(c.unit_price, dec!(6.00));
        assert_eq!(c.total_value, dec!(60.0));
        assert_eq!(c.signed_delta, -5);
    }

    #[test]
    fn test_issue_to_zero() {
        let c = compute(Direction::Issue, 4, dec!(2.35), 4, Decimal::ZERO).unwrap();
        assert_eq!(c.new_quantity, 0);
        assert_eq!(c.total_value, Decimal::ZERO);
    }

    #[test]
    fn test_issue_over_stock_is_refused() {
        let err = compute(Direction::Issue, 15, dec!(6.00), 20, Decimal::ZERO).unwrap_err();
        assert_eq!(
            err,
            CostingError::InsufficientStock {
                on_hand: 15,
                requested: 20
            }
        );
    }

    #[test]
    fn test_non_positive_delta_is_refused() {
        assert!(compute(Direction::Receipt, 0, Decimal::ZERO, 0, dec!(1)).is_err());
        assert!(compute(Direction::Issue, 5, dec!(1), -1, Decimal::ZERO).is_err());

        let err: LedgerError = CostingError::NonPositiveDelta(0).into();
        assert_eq!(err.field(), Some("quantity_delta"));
    }

    #[test]
    fn test_huge_receipt_overflows_instead_of_panicking() {
        let err = compute(
            Direction::Receipt,
            0,
            Decimal::ZERO,
            9_000_000_000_000_000_000,
            dec!(100000000000000),
        )
        .unwrap_err();
        assert_eq!(err, CostingError::Overflow);

        // Existing stock value plus incoming value leaves the range
        let err = compute(Direction::Receipt, 1, Decimal::MAX, 1, Decimal::MAX).unwrap_err();
        assert_eq!(err, CostingError::Overflow);

        let err = compute(Direction::Receipt, i64::MAX, dec!(1), 1, dec!(1)).unwrap_err();
        assert_eq!(err, CostingError::Overflow);
    }

    #[test]
    fn test_costing_errors_are_czech_and_field_scoped() {
        let err: LedgerError = CostingError::Overflow.into();
        assert_eq!(err.field(), Some("unit_price"));
        assert!(err.to_string().contains("příliš velká"));

        let err: LedgerError = CostingError::InsufficientStock { on_hand: 2, requested: 3 }.into();
        assert_eq!(err.field(), Some("quantity_delta"));
        assert!(err.to_string().contains("větší než množství na skladě 2"));
    }

    #[test]
    fn test_movement_is_booked_at_its_own_price() {
        let c = compute(Direction::Receipt, 10, dec!(5.00), 5, dec!(8.00)).unwrap();
        assert_eq!(c.movement_unit_price, dec!(8.00));
        assert_eq!(c.movement_value, dec!(40.0));

        let c = compute(Direction::Issue, 15, dec!(6.00), 5, Decimal::ZERO).unwrap();
        assert_eq!(c.movement_unit_price, dec!(6.00));
        assert_eq!(c.movement_value, dec!(-30.0));
    }

    #[test]
    fn test_rounding_is_half_even() {
        assert_eq!(round_total(dec!(0.25)), dec!(0.2));
        assert_eq!(round_total(dec!(0.35)), dec!(0.4));
        assert_eq!(round_unit_price(dec!(1.005)), dec!(1.00));
        assert_eq!(round_unit_price(dec!(1.015)), dec!(1.02));
    }

    #[test]
    fn test_movement_value_is_signed() {
        assert_eq!(movement_value(-5, dec!(6.00)).unwrap(), dec!(-30.0));
        assert_eq!(movement_value(3, dec!(0.35)).unwrap(), dec!(1.0));
    }

    fn price() -> impl Strategy<Value = Decimal> {
        (1i64..1_000_000).prop_map(|cents| Decimal::new(cents, 2))
    }

    proptest! {
        #[test]
        fn prop_receipt_on_empty_stock(delta in 1i64..10_000, p in price()) {
            let c = compute(Direction::Receipt, 0, Decimal::ZERO, delta, p).unwrap();
            prop_assert_eq!(c.unit_price, p);
            prop_assert_eq!(c.total_value, round_total(Decimal::from(delta) * p));
            prop_assert_eq!(c.new_quantity, delta);
        }

        #[test]
        fn prop_receipt_weighted_average(
            qty in 1i64..10_000,
            current in price(),
            delta in 1i64..10_000,
            p in price(),
        ) {
            let c = compute(Direction::Receipt, qty, current, delta, p).unwrap();
            let total = round_total(Decimal::from(qty) * current + Decimal::from(delta) * p);
            prop_assert_eq!(c.total_value, total);
            prop_assert_eq!(c.unit_price, round_unit_price(total / Decimal::from(qty + delta)));
            prop_assert_eq!(c.new_quantity, qty + delta);

            // The average lies between the two input prices, give or take rounding
            let lo = current.min(p) - dec!(0.05);
            let hi = current.max(p) + dec!(0.05);
            prop_assert!(c.unit_price >= lo && c.unit_price <= hi);
        }

        #[test]
        fn prop_issue_never_goes_negative(qty in 0i64..10_000, delta in 1i64..20_000, current in price()) {
            match compute(Direction::Issue, qty, current, delta, Decimal::ZERO) {
                Ok(c) => {
                    prop_assert!(delta <= qty);
                    prop_assert_eq!(c.new_quantity, qty - delta);
                    prop_assert_eq!(c.unit_price, current);
                }
                Err(e) => {
                    prop_assert!(delta > qty);
                    prop_assert_eq!(e, CostingError::InsufficientStock { on_hand: qty, requested: delta });
                }
            }
        }
    }
}
