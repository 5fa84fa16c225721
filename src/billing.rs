//! Billing-cycle day arithmetic.
//!
//! Subscriptions are due on a fixed day of month. The distance to the
//! next due date is pure modular arithmetic over the calendar month
//! containing "today", so callers supply both values and the functions
//! stay trivially testable.

use chrono::{Datelike, NaiveDate};

/// Days remaining until the next occurrence of `billing_day`.
///
/// When the billing day is still ahead in the current month the result
/// is a simple difference; otherwise the cycle rolls into next month.
/// `days_in_month` must describe the month containing `today`.
/// `billing_day` is trusted to be a stored 1-31 value and is not
/// range-checked here.
pub fn days_until_billing(billing_day: u32, today: u32, days_in_month: u32) -> u32 {
    if billing_day >= today {
        billing_day - today
    } else {
        days_in_month - today + billing_day
    }
}

/// Number of days in the given month.
pub fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    let first_of_next = NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .expect("first of month is always a valid date");
    first_of_next
        .pred_opt()
        .expect("month has a last day")
        .day()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_billing_day_still_ahead() {
        assert_eq!(days_until_billing(15, 10, 30), 5);
    }

    #[test]
    fn test_billing_day_rolls_into_next_month() {
        assert_eq!(days_until_billing(5, 20, 30), 15);
    }

    #[test]
    fn test_billing_day_is_today() {
        assert_eq!(days_until_billing(1, 1, 31), 0);
        assert_eq!(days_until_billing(28, 28, 28), 0);
    }

    #[test]
    fn test_last_day_of_month_rollover() {
        // Due on the 31st, today is the 1st of a 31-day month.
        assert_eq!(days_until_billing(31, 1, 31), 30);
        // Due on the 1st, today is the 31st.
        assert_eq!(days_until_billing(1, 31, 31), 1);
    }

    #[test]
    fn test_days_in_month() {
        assert_eq!(days_in_month(2024, 1), 31);
        assert_eq!(days_in_month(2024, 2), 29); // leap year
        assert_eq!(days_in_month(2023, 2), 28);
        assert_eq!(days_in_month(2024, 4), 30);
        assert_eq!(days_in_month(2024, 12), 31);
    }

    #[test]
    fn test_days_in_month_matches_chrono() {
        for month in 1..=12 {
            let first = chrono::NaiveDate::from_ymd_opt(2025, month, 1).unwrap();
            let mut last = first;
            while let Some(next) = last.succ_opt() {
                if next.month() != month {
                    break;
                }
                last = next;
            }
            assert_eq!(days_in_month(2025, month), last.day());
        }
    }
}
