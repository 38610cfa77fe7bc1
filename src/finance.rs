//! Financial arithmetic for loan servicing: amortization, calendar month
//! arithmetic, and portfolio-at-risk. All amounts are `Decimal` rounded to
//! 2 dp at the edges.

use chrono::{Months, NaiveDate};
use rust_decimal::Decimal;

use crate::database::models::loan::{Loan, LoanStatus};

/// Standard amortized monthly installment.
///
/// monthlyRate = rate/100/12; installment =
/// P * i * (1+i)^n / ((1+i)^n - 1), or P/n for a zero rate.
pub fn monthly_installment(principal: Decimal, annual_rate_pct: Decimal, term_months: u32) -> Decimal {
    assert!(term_months > 0, "term must be at least one month");
    let n = Decimal::from(term_months);
    let monthly_rate = annual_rate_pct / Decimal::from(100) / Decimal::from(12);
    if monthly_rate.is_zero() {
        return (principal / n).round_dp(2);
    }
    let factor = compound(Decimal::ONE + monthly_rate, term_months);
    let installment = principal * monthly_rate * factor / (factor - Decimal::ONE);
    installment.round_dp(2)
}

// (base)^n by repeated multiplication; terms are bounded by the product's
// maximum term so this stays well within Decimal precision.
fn compound(base: Decimal, n: u32) -> Decimal {
    let mut acc = Decimal::ONE;
    for _ in 0..n {
        acc *= base;
    }
    acc
}

/// Total interest paid over the life of the loan under the amortized
/// installment, never negative.
pub fn total_interest(principal: Decimal, installment: Decimal, term_months: u32) -> Decimal {
    let interest = installment * Decimal::from(term_months) - principal;
    interest.max(Decimal::ZERO).round_dp(2)
}

/// Calendar-month addition with month-end clamping: 2025-01-31 plus one
/// month is 2025-02-28.
pub fn add_months(date: NaiveDate, months: u32) -> NaiveDate {
    date.checked_add_months(Months::new(months))
        .unwrap_or(NaiveDate::MAX)
}

/// Whole calendar months between two dates, ignoring day-of-month; the
/// membership-duration rule counts months the same way the ledger does.
pub fn months_between(from: NaiveDate, to: NaiveDate) -> i32 {
    use chrono::Datelike;
    (to.year() - from.year()) * 12 + (to.month() as i32 - from.month() as i32)
}

/// Portfolio at risk: fraction of outstanding balance on DISBURSED/ACTIVE
/// loans whose maturity date has passed. Zero when nothing is outstanding.
pub fn portfolio_at_risk(loans: &[Loan], today: NaiveDate) -> Decimal {
    let mut outstanding = Decimal::ZERO;
    let mut overdue = Decimal::ZERO;
    for loan in loans {
        if !matches!(loan.status, LoanStatus::Disbursed | LoanStatus::Active) {
            continue;
        }
        outstanding += loan.outstanding_balance;
        if loan.maturity_date.map(|m| today > m).unwrap_or(false) {
            overdue += loan.outstanding_balance;
        }
    }
    if outstanding.is_zero() {
        Decimal::ZERO
    } else {
        (overdue / outstanding).round_dp(4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn amortized_installment_reference_case() {
        // 10_000 at 12% over 12 months
        let installment = monthly_installment(dec("10000"), dec("12"), 12);
        let diff = (installment - dec("888.49")).abs();
        assert!(diff <= dec("0.01"), "installment was {installment}");
    }

    #[test]
    fn zero_rate_divides_principal_evenly() {
        assert_eq!(monthly_installment(dec("1200"), Decimal::ZERO, 12), dec("100"));
    }

    #[test]
    fn total_interest_never_negative() {
        assert_eq!(total_interest(dec("1200"), dec("100"), 12), Decimal::ZERO);
        let installment = monthly_installment(dec("10000"), dec("12"), 12);
        let interest = total_interest(dec("10000"), installment, 12);
        assert!(interest > dec("600") && interest < dec("700"), "interest was {interest}");
    }

    #[test]
    fn month_end_addition_clamps() {
        let jan31 = NaiveDate::from_ymd_opt(2025, 1, 31).unwrap();
        assert_eq!(add_months(jan31, 1), NaiveDate::from_ymd_opt(2025, 2, 28).unwrap());
        assert_eq!(add_months(jan31, 12), NaiveDate::from_ymd_opt(2026, 1, 31).unwrap());
        // leap year February keeps the 29th
        let jan31_2024 = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        assert_eq!(add_months(jan31_2024, 1), NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
    }

    #[test]
    fn months_between_is_calendar_based() {
        let join = NaiveDate::from_ymd_opt(2024, 11, 30).unwrap();
        let now = NaiveDate::from_ymd_opt(2025, 5, 1).unwrap();
        assert_eq!(months_between(join, now), 6);
    }
}
