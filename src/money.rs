use bigdecimal::{BigDecimal, RoundingMode};

/// Stored monetary amounts carry two fractional digits, stored exchange
/// rates six. Both round half-up.
pub const AMOUNT_SCALE: i64 = 2;
pub const RATE_SCALE: i64 = 6;

pub fn round_amount(value: &BigDecimal) -> BigDecimal {
    value.with_scale_round(AMOUNT_SCALE, RoundingMode::HalfUp)
}

pub fn round_rate(value: &BigDecimal) -> BigDecimal {
    value.with_scale_round(RATE_SCALE, RoundingMode::HalfUp)
}

pub fn zero_amount() -> BigDecimal {
    BigDecimal::from(0).with_scale(AMOUNT_SCALE)
}

pub fn one_rate() -> BigDecimal {
    BigDecimal::from(1).with_scale(RATE_SCALE)
}

/// Cross rate through the pivot: (pivot -> to) / (pivot -> from).
pub fn cross_rate(pivot_to_from: &BigDecimal, pivot_to_to: &BigDecimal) -> BigDecimal {
    round_rate(&(pivot_to_to / pivot_to_from))
}

/// spent / limit * 100, scale 2. Zero when the limit is zero.
pub fn percent_of_limit(spent: &BigDecimal, limit: &BigDecimal) -> BigDecimal {
    if limit == &BigDecimal::from(0) {
        return zero_amount();
    }
    let ratio = (spent / limit).with_scale_round(4, RoundingMode::HalfUp);
    round_amount(&(ratio * BigDecimal::from(100)))
}

/// Share of `value` in `total` as a percentage, zero for empty totals.
pub fn percent_share(value: &BigDecimal, total: &BigDecimal) -> BigDecimal {
    if total <= &BigDecimal::from(0) {
        return zero_amount();
    }
    let ratio = (value / total).with_scale_round(4, RoundingMode::HalfUp);
    round_amount(&(ratio * BigDecimal::from(100)))
}

/// Cash flow percent: (income - expense) / income * 100. With no income at
/// all, positive spending reads as -100.00 and full inactivity as 0.00.
pub fn cash_flow_percent(income: &BigDecimal, expense: &BigDecimal) -> BigDecimal {
    let zero = BigDecimal::from(0);
    if income == &zero {
        if expense == &zero {
            return zero_amount();
        }
        return round_amount(&BigDecimal::from(-100));
    }
    let profit = income - expense;
    let ratio = (profit / income).with_scale_round(4, RoundingMode::HalfUp);
    round_amount(&(ratio * BigDecimal::from(100)))
}

/// Two one-sided debt accumulators. Both stay non-negative; a payment on one
/// side drains it to zero and spills the remainder onto the other side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TwoSidedPosition {
    pub owed_to_me: BigDecimal,
    pub i_owe: BigDecimal,
}

impl TwoSidedPosition {
    pub fn zero() -> Self {
        Self {
            owed_to_me: zero_amount(),
            i_owe: zero_amount(),
        }
    }

    /// Applies a LENT amount: pays down `i_owe` first, clamping at zero,
    /// and credits the remainder to `owed_to_me`.
    pub fn apply_lent(&self, amount: &BigDecimal) -> Self {
        let zero = BigDecimal::from(0);
        if self.i_owe > zero {
            let remaining = &self.i_owe - amount;
            if remaining < zero {
                Self {
                    owed_to_me: round_amount(&(&self.owed_to_me + remaining.abs())),
                    i_owe: zero_amount(),
                }
            } else {
                Self {
                    owed_to_me: self.owed_to_me.clone(),
                    i_owe: round_amount(&remaining),
                }
            }
        } else {
            Self {
                owed_to_me: round_amount(&(&self.owed_to_me + amount)),
                i_owe: self.i_owe.clone(),
            }
        }
    }

    /// Mirror of [`Self::apply_lent`]: pays down `owed_to_me` before growing
    /// `i_owe`.
    pub fn apply_borrowed(&self, amount: &BigDecimal) -> Self {
        let mirrored = Self {
            owed_to_me: self.i_owe.clone(),
            i_owe: self.owed_to_me.clone(),
        }
        .apply_lent(amount);
        Self {
            owed_to_me: mirrored.i_owe,
            i_owe: mirrored.owed_to_me,
        }
    }

    /// Rebuilds the position from scratch out of summed LENT/BORROWED
    /// totals. The clamped incremental form is not invertible, so edits and
    /// deletes always go through this.
    pub fn from_totals(total_lent: &BigDecimal, total_borrowed: &BigDecimal) -> Self {
        let zero = BigDecimal::from(0);
        let owed = total_lent - total_borrowed;
        let owing = total_borrowed - total_lent;
        Self {
            owed_to_me: if owed < zero {
                zero_amount()
            } else {
                round_amount(&owed)
            },
            i_owe: if owing < zero {
                zero_amount()
            } else {
                round_amount(&owing)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn rounds_amounts_half_up() {
        assert_eq!(round_amount(&dec("1.005")), dec("1.01"));
        assert_eq!(round_amount(&dec("1.004")), dec("1.00"));
        assert_eq!(round_amount(&dec("-1.005")), dec("-1.01"));
    }

    #[test]
    fn rounds_rates_to_six_digits() {
        assert_eq!(round_rate(&dec("0.12345649")), dec("0.123456"));
        assert_eq!(round_rate(&dec("0.12345650")), dec("0.123457"));
    }

    #[test]
    fn cross_rate_divides_pivot_legs() {
        // pivot->from = 0.5, pivot->to = 2.0 => from->to = 4.0
        assert_eq!(cross_rate(&dec("0.5"), &dec("2.0")), dec("4.000000"));
    }

    #[test]
    fn cross_rate_symmetry_within_tolerance() {
        let a = dec("0.912345");
        let b = dec("493.250000");
        let ab = cross_rate(&a, &b);
        let ba = cross_rate(&b, &a);
        let product = ab * ba;
        let error = (product - BigDecimal::from(1)).abs();
        assert!(error < dec("0.000002"), "error was {error}");
    }

    #[test]
    fn percent_of_limit_basic() {
        assert_eq!(percent_of_limit(&dec("400"), &dec("1000")), dec("40.00"));
        assert_eq!(percent_of_limit(&dec("10"), &dec("0")), dec("0.00"));
    }

    #[test]
    fn cash_flow_percent_edge_cases() {
        assert_eq!(cash_flow_percent(&dec("0"), &dec("120")), dec("-100.00"));
        assert_eq!(cash_flow_percent(&dec("0"), &dec("0")), dec("0.00"));
        assert_eq!(cash_flow_percent(&dec("200"), &dec("50")), dec("75.00"));
    }

    #[test]
    fn lent_pays_down_debt_and_spills_over() {
        let position = TwoSidedPosition {
            owed_to_me: dec("0.00"),
            i_owe: dec("50.00"),
        };
        let updated = position.apply_lent(&dec("80.00"));
        assert_eq!(updated.i_owe, dec("0.00"));
        assert_eq!(updated.owed_to_me, dec("30.00"));
    }

    #[test]
    fn lent_partial_repayment_stays_one_sided() {
        let position = TwoSidedPosition {
            owed_to_me: dec("0.00"),
            i_owe: dec("50.00"),
        };
        let updated = position.apply_lent(&dec("20.00"));
        assert_eq!(updated.i_owe, dec("30.00"));
        assert_eq!(updated.owed_to_me, dec("0.00"));
    }

    #[test]
    fn borrowed_mirrors_lent() {
        let position = TwoSidedPosition {
            owed_to_me: dec("50.00"),
            i_owe: dec("0.00"),
        };
        let updated = position.apply_borrowed(&dec("80.00"));
        assert_eq!(updated.owed_to_me, dec("0.00"));
        assert_eq!(updated.i_owe, dec("30.00"));
    }

    #[test]
    fn from_totals_clamps_the_losing_side() {
        let position = TwoSidedPosition::from_totals(&dec("120.00"), &dec("45.50"));
        assert_eq!(position.owed_to_me, dec("74.50"));
        assert_eq!(position.i_owe, dec("0.00"));

        let inverse = TwoSidedPosition::from_totals(&dec("45.50"), &dec("120.00"));
        assert_eq!(inverse.owed_to_me, dec("0.00"));
        assert_eq!(inverse.i_owe, dec("74.50"));
    }

    #[test]
    fn percent_share_of_total() {
        assert_eq!(percent_share(&dec("30"), &dec("120")), dec("25.00"));
        assert_eq!(percent_share(&dec("30"), &dec("0")), dec("0.00"));
    }
}
