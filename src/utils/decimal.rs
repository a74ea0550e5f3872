//! Decimal arithmetic utilities for financial calculations.

use rust_decimal::Decimal;

/// Round down to lot size (quantity precision).
pub fn round_down_to_lot(value: Decimal, lot_size: Decimal) -> Decimal {
    if lot_size == Decimal::ZERO {
        return value;
    }
    ((value / lot_size).floor() * lot_size).normalize()
}

/// Fractional change from `from` to `to` (0.05 = +5%).
pub fn fractional_change(from: Decimal, to: Decimal) -> Decimal {
    safe_div(to - from, from)
}

/// Division that returns zero when the divisor is zero or the quotient overflows.
pub fn safe_div(numerator: Decimal, denominator: Decimal) -> Decimal {
    numerator.checked_div(denominator).unwrap_or(Decimal::ZERO)
}

/// Calculate weighted average.
pub fn weighted_average(values: &[(Decimal, Decimal)]) -> Decimal {
    let (sum, weight_sum) = values.iter().fold(
        (Decimal::ZERO, Decimal::ZERO),
        |(sum, weight_sum), (val, weight)| (sum + val * weight, weight_sum + weight),
    );

    safe_div(sum, weight_sum)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_round_down_to_lot() {
        assert_eq!(round_down_to_lot(dec!(1.567), dec!(0.001)), dec!(1.567));
        assert_eq!(round_down_to_lot(dec!(1.567), dec!(0.01)), dec!(1.56));
        assert_eq!(round_down_to_lot(dec!(6.0975), dec!(1)), dec!(6));
    }

    #[test]
    fn test_fractional_change() {
        assert_eq!(fractional_change(dec!(1.00), dec!(1.05)), dec!(0.05));
        assert_eq!(fractional_change(dec!(1.00), dec!(0.97)), dec!(-0.03));
        assert_eq!(fractional_change(Decimal::ZERO, dec!(1)), Decimal::ZERO);
    }

    #[test]
    fn test_safe_div_never_panics() {
        assert_eq!(safe_div(dec!(1), Decimal::ZERO), Decimal::ZERO);
        assert_eq!(safe_div(Decimal::MAX, dec!(0.001)), Decimal::ZERO);
        assert_eq!(safe_div(dec!(3), dec!(2)), dec!(1.5));
    }

    #[test]
    fn test_weighted_average() {
        let values = vec![
            (dec!(100), dec!(2)), // 100 with weight 2
            (dec!(200), dec!(1)), // 200 with weight 1
        ];
        // (100*2 + 200*1) / (2+1) = 400/3 ~ 133.33
        let avg = weighted_average(&values);
        assert!(avg > dec!(133) && avg < dec!(134));
    }
}
