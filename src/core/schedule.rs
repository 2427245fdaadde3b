use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};

use super::error::SimulationError;
use super::types::Expense;

/// One month of the shared baseline: the month-end instant and the
/// materialized expenses for that month. Built once per request and shared
/// read-only across all trials.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BaselineStep {
    pub date_unix: i64,
    pub expenses: f64,
}

/// Expense cadence. Parsed from the wire string during materialization so
/// an unknown value is a diagnosable input error, not a decode failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    Weekly,
    Monthly,
    Annual,
    Onetime,
}

impl Frequency {
    pub fn parse(raw: &str) -> Result<Self, SimulationError> {
        match raw {
            "weekly" => Ok(Frequency::Weekly),
            "monthly" => Ok(Frequency::Monthly),
            "annual" => Ok(Frequency::Annual),
            "onetime" => Ok(Frequency::Onetime),
            other => Err(SimulationError::UnknownFrequency(other.to_string())),
        }
    }
}

/// Moves an instant to the last calendar day of its month, 23:59:59 UTC.
/// Everything runs in UTC; local time would shift month ends across
/// daylight-savings transitions.
pub fn end_of_month(instant: DateTime<Utc>) -> DateTime<Utc> {
    let (year, month) = (instant.year(), instant.month());
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    let first_of_next = Utc
        .with_ymd_and_hms(next_year, next_month, 1, 0, 0, 0)
        .single()
        .expect("first of month is a valid UTC instant");
    first_of_next - Duration::seconds(1)
}

/// End-of-month normalization on raw Unix seconds.
pub fn end_of_month_unix(secs: i64) -> i64 {
    let instant = DateTime::from_timestamp(secs, 0).unwrap_or_default();
    end_of_month(instant).timestamp()
}

/// Ordered month-end instants: the end of `from`'s month, then the end of
/// each following month.
pub fn month_end_grid(from: DateTime<Utc>, months: usize) -> Vec<i64> {
    let mut grid = Vec::with_capacity(months);
    let mut current = end_of_month(from);
    for _ in 0..months {
        grid.push(current.timestamp());
        current = end_of_month(current + Duration::days(1));
    }
    grid
}

/// Whether a month-end instant is December 31.
fn is_year_end(secs: i64) -> bool {
    let instant = DateTime::from_timestamp(end_of_month_unix(secs), 0).unwrap_or_default();
    instant.month() == 12 && instant.day() == 31
}

fn expense_ends(expense: &Expense) -> bool {
    expense.ends != 0
}

/// Whether the expense's end date falls in a month strictly before the
/// given one. Both sides are normalized to end-of-month first.
fn has_ended(expense: &Expense, date_unix: i64) -> bool {
    end_of_month_unix(expense.ends) < end_of_month_unix(date_unix)
}

/// Whether a one-time expense lands in the given month: the two dates agree
/// after end-of-month normalization.
fn is_relevant_onetime_date(expense: &Expense, date_unix: i64) -> bool {
    end_of_month_unix(expense.onetime_on) == end_of_month_unix(date_unix)
}

/// Splits expenses into one bucket per frequency. Every expense lands in
/// exactly one bucket.
fn filter_expenses(
    expenses: &[Expense],
) -> Result<(Vec<&Expense>, Vec<&Expense>, Vec<&Expense>, Vec<&Expense>), SimulationError> {
    let mut weekly = Vec::new();
    let mut monthly = Vec::new();
    let mut annual = Vec::new();
    let mut onetime = Vec::new();

    for expense in expenses {
        match Frequency::parse(&expense.frequency)? {
            Frequency::Weekly => weekly.push(expense),
            Frequency::Monthly => monthly.push(expense),
            Frequency::Annual => annual.push(expense),
            Frequency::Onetime => onetime.push(expense),
        }
    }

    Ok((weekly, monthly, annual, onetime))
}

// The apply functions below stop at the first expired month (break, not
// continue). That is only correct because the grid is chronological, which
// `month_end_grid` guarantees.

fn apply_weekly_expenses(steps: &mut [BaselineStep], expenses: &[&Expense]) {
    for expense in expenses {
        let monthly_amount = expense.amount * (52.0 / 12.0);
        for step in steps.iter_mut() {
            if expense_ends(expense) && has_ended(expense, step.date_unix) {
                break;
            }
            step.expenses += monthly_amount;
        }
    }
}

fn apply_monthly_expenses(steps: &mut [BaselineStep], expenses: &[&Expense]) {
    for expense in expenses {
        for step in steps.iter_mut() {
            if expense_ends(expense) && has_ended(expense, step.date_unix) {
                break;
            }
            step.expenses += expense.amount;
        }
    }
}

fn apply_annual_expenses(steps: &mut [BaselineStep], expenses: &[&Expense]) {
    for expense in expenses {
        for step in steps.iter_mut() {
            if expense_ends(expense) && has_ended(expense, step.date_unix) {
                break;
            }
            if !is_year_end(step.date_unix) {
                continue;
            }
            step.expenses += expense.amount;
        }
    }
}

fn apply_onetime_expenses(steps: &mut [BaselineStep], expenses: &[&Expense]) {
    for expense in expenses {
        for step in steps.iter_mut() {
            if is_relevant_onetime_date(expense, step.date_unix) {
                step.expenses += expense.amount;
                break;
            }
        }
    }
}

/// Folds the expense list onto an explicit month grid.
pub fn materialize(expenses: &[Expense], grid: &[i64]) -> Result<Vec<BaselineStep>, SimulationError> {
    let mut steps: Vec<BaselineStep> = grid
        .iter()
        .map(|&date_unix| BaselineStep {
            date_unix,
            expenses: 0.0,
        })
        .collect();

    let (weekly, monthly, annual, onetime) = filter_expenses(expenses)?;

    apply_weekly_expenses(&mut steps, &weekly);
    apply_monthly_expenses(&mut steps, &monthly);
    apply_annual_expenses(&mut steps, &annual);
    apply_onetime_expenses(&mut steps, &onetime);

    Ok(steps)
}

/// Builds the shared baseline for a request: `months` month-ends starting
/// with the end of the current month, with all expenses applied.
pub fn build_baseline(expenses: &[Expense], months: usize) -> Result<Vec<BaselineStep>, SimulationError> {
    materialize(expenses, &month_end_grid(Utc::now(), months))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expense(amount: f64, frequency: &str, onetime_on: i64, ends: i64) -> Expense {
        Expense {
            amount,
            frequency: frequency.to_string(),
            onetime_on,
            ends,
        }
    }

    fn grid_of(dates: &[i64]) -> Vec<i64> {
        dates.to_vec()
    }

    #[test]
    fn end_of_month_lands_on_last_second() {
        let mid_july = Utc.with_ymd_and_hms(2014, 7, 15, 12, 0, 0).unwrap();
        assert_eq!(end_of_month(mid_july).timestamp(), 1406851199); // Jul-31-2014 23:59:59

        let leap_feb = Utc.with_ymd_and_hms(2016, 2, 1, 0, 0, 0).unwrap();
        assert_eq!(end_of_month(leap_feb).timestamp(), 1456790399); // Feb-29-2016 23:59:59

        let december = Utc.with_ymd_and_hms(2014, 12, 5, 8, 30, 0).unwrap();
        assert_eq!(end_of_month(december).timestamp(), 1420070399); // Dec-31-2014 23:59:59
    }

    #[test]
    fn month_grid_is_consecutive_month_ends() {
        let from = Utc.with_ymd_and_hms(2014, 7, 15, 12, 0, 0).unwrap();
        let grid = month_end_grid(from, 8);

        assert_eq!(grid[0], 1406851199); // Jul-31-2014
        assert_eq!(grid[1], 1409529599); // Aug-31-2014
        assert_eq!(grid[2], 1412121599); // Sep-30-2014
        assert_eq!(grid.len(), 8);
        for pair in grid.windows(2) {
            assert!(pair[0] < pair[1]);
        }
        // year rollover: Dec-31-2014 then Jan-31-2015
        assert_eq!(grid[5], 1420070399);
        assert_eq!(grid[6], 1422748799);
    }

    #[test]
    fn year_end_is_december_31_only() {
        assert!(is_year_end(1420070399)); // Dec-31-2014
        assert!(is_year_end(1418342400)); // Dec-12-2014, normalizes to Dec-31
        assert!(!is_year_end(1417391999)); // Nov-30-2014
    }

    #[test]
    fn frequency_classification_is_a_partition() {
        let expenses = vec![
            expense(100.0, "weekly", 0, 0),
            expense(25.0, "weekly", 0, 0),
            expense(45.0, "weekly", 0, 1406851199),
            expense(50.0, "weekly", 0, 0),
            expense(300.0, "monthly", 0, 0),
            expense(3000.0, "annual", 0, 1472687999),
            expense(5000.0, "annual", 0, 0),
            expense(25000.0, "onetime", 1409529599, 0),
        ];

        let (weekly, monthly, annual, onetime) =
            filter_expenses(&expenses).expect("all frequencies known");
        assert_eq!(weekly.len(), 4);
        assert_eq!(monthly.len(), 1);
        assert_eq!(annual.len(), 2);
        assert_eq!(onetime.len(), 1);
        assert_eq!(onetime[0].amount, 25000.0);
    }

    #[test]
    fn unknown_frequency_is_rejected() {
        let expenses = vec![expense(10.0, "daily", 0, 0)];
        assert_eq!(
            materialize(&expenses, &grid_of(&[1406851199])),
            Err(SimulationError::UnknownFrequency("daily".to_string()))
        );
    }

    #[test]
    fn onetime_relevance_normalizes_both_dates() {
        let jul = 1406851199;
        let aug = 1409529599;
        let sep = 1412121599;
        let e = expense(25000.0, "onetime", aug, 0);

        assert!(!is_relevant_onetime_date(&e, jul));
        assert!(is_relevant_onetime_date(&e, aug));
        assert!(!is_relevant_onetime_date(&e, sep));
    }

    #[test]
    fn weekly_expenses_stop_after_their_end_month() {
        let weekly = vec![
            expense(100.0, "weekly", 0, 1409529590), // just before Aug-31-2014; expires after Aug
            expense(25.0, "weekly", 0, 0),
            expense(45.0, "weekly", 0, 1412207999), // expires after its (normalized) end month
            expense(50.0, "weekly", 0, 0),
        ];
        let grid = grid_of(&[
            1406851199, 1409529599, 1412207999, 1414821599, 1417417199, 1420095599, 1422773999,
        ]);

        let steps = materialize(&weekly, &grid).expect("materializes");
        let factor = 52.0 / 12.0;

        assert_eq!(steps[0].expenses, (100.0 + 25.0 + 45.0 + 50.0) * factor);
        assert_eq!(steps[1].expenses, (100.0 + 25.0 + 45.0 + 50.0) * factor);
        assert_eq!(steps[2].expenses, (25.0 + 45.0 + 50.0) * factor);
        assert_eq!(steps[3].expenses, (25.0 + 50.0) * factor);
    }

    #[test]
    fn monthly_expenses_stop_after_their_end_month() {
        let monthly = vec![
            expense(300.0, "monthly", 0, 0),
            expense(100.0, "monthly", 0, 1409529590),
            expense(45.0, "monthly", 0, 1412207999),
        ];
        let grid = grid_of(&[
            1406851199, 1409529599, 1412207999, 1414821599, 1417417199, 1420095599, 1422773999,
        ]);

        let steps = materialize(&monthly, &grid).expect("materializes");

        assert_eq!(steps[0].expenses, 300.0 + 100.0 + 45.0);
        assert_eq!(steps[1].expenses, 300.0 + 100.0 + 45.0);
        assert_eq!(steps[2].expenses, 300.0 + 45.0);
        assert_eq!(steps[3].expenses, 300.0);
    }

    #[test]
    fn annual_expenses_land_on_december_only() {
        let annual = vec![
            expense(1000.0, "annual", 0, 1412207999), // expires before any December
            expense(3000.0, "annual", 0, 1472687999), // Aug-31-2016
            expense(5000.0, "annual", 0, 0),
        ];
        let grid = grid_of(&[
            1409529599, // Aug-31-2014
            1412207999, 1414713599, 1417391999, // no Decembers
            1420070399, // Dec-31-2014
            1422748799, // Jan-31-2015
            1451606399, // Dec-31-2015
            1483228799, // Dec-31-2016
            1514764799, // Dec-31-2017
        ]);

        let steps = materialize(&annual, &grid).expect("materializes");

        for step in &steps[0..4] {
            assert_eq!(step.expenses, 0.0);
        }
        assert_eq!(steps[4].expenses, 8000.0);
        assert_eq!(steps[5].expenses, 0.0);
        assert_eq!(steps[6].expenses, 8000.0);
        assert_eq!(steps[7].expenses, 5000.0);
        assert_eq!(steps[8].expenses, 5000.0);
    }

    #[test]
    fn onetime_expenses_land_in_exactly_one_month() {
        let onetime = vec![
            expense(100.0, "onetime", 1406851199, 0), // Jul-31-2014
            expense(210.0, "onetime", 1409529599, 0), // Aug-31-2014
            expense(320.0, "onetime", 1409529590, 0), // inside August, normalizes to Aug-31
            expense(430.0, "onetime", 1412207999, 0),
        ];
        let grid = grid_of(&[
            1406851199, 1409529599, 1412207999, 1414713599, 1417391999, 1420070399, 1422748799,
        ]);

        let steps = materialize(&onetime, &grid).expect("materializes");

        assert_eq!(steps[0].expenses, 100.0);
        assert_eq!(steps[1].expenses, 210.0 + 320.0);
        assert_eq!(steps[2].expenses, 430.0);
        for step in &steps[3..] {
            assert_eq!(step.expenses, 0.0);
        }
    }

    #[test]
    fn baseline_uses_current_month_end_grid() {
        let steps = build_baseline(&[expense(120.0, "monthly", 0, 0)], 24).expect("builds");
        assert_eq!(steps.len(), 24);
        assert_eq!(steps[0].date_unix, end_of_month(Utc::now()).timestamp());
        for pair in steps.windows(2) {
            assert!(pair[0].date_unix < pair[1].date_unix);
        }
        assert!(steps.iter().all(|s| s.expenses == 120.0));
    }
}
