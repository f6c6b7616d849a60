// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Eager expansion of a recurrence rule into individual send times.

use chrono::{DateTime, Months, Utc};

use ticketflow_core::types::{Recurrence, RecurrenceStep};
use ticketflow_core::TicketflowError;

/// Upper bound on occurrences materialized by one request.
pub const MAX_OCCURRENCES: usize = 1000;

/// The `k`-th occurrence after `start`, or `None` if the date overflows.
///
/// Month steps are taken from `start` rather than from the previous
/// occurrence so that a run starting on the 31st comes back to the 31st
/// after short months.
fn nth(start: DateTime<Utc>, step: RecurrenceStep, k: u32) -> Option<DateTime<Utc>> {
    match step {
        RecurrenceStep::Days(days) => {
            let days = i64::try_from(days).ok()?.checked_mul(i64::from(k))?;
            start.checked_add_signed(chrono::Duration::try_days(days)?)
        }
        RecurrenceStep::Months(months) => {
            start.checked_add_months(Months::new(months.checked_mul(k)?))
        }
    }
}

/// All send times from `start` up to and including `end`.
///
/// A one-off rule yields `[start]`. A recurring rule needs an `end`
/// strictly after `start`.
pub fn expand(
    start: DateTime<Utc>,
    recurrence: Recurrence,
    end: Option<DateTime<Utc>>,
) -> Result<Vec<DateTime<Utc>>, TicketflowError> {
    let Some(step) = recurrence.step() else {
        return Ok(vec![start]);
    };
    let end = end.ok_or_else(|| {
        TicketflowError::Validation("recurring schedules need a recurrence end date".into())
    })?;
    if end <= start {
        return Err(TicketflowError::Validation(
            "recurrence end date must be after the first send time".into(),
        ));
    }

    let mut occurrences = Vec::new();
    let mut k = 0u32;
    while let Some(at) = nth(start, step, k) {
        if at > end {
            break;
        }
        if occurrences.len() == MAX_OCCURRENCES {
            return Err(TicketflowError::Validation(format!(
                "recurrence produces more than {MAX_OCCURRENCES} occurrences"
            )));
        }
        occurrences.push(at);
        k += 1;
    }
    Ok(occurrences)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn weekly_over_three_weeks_is_end_inclusive() {
        let start = ts("2026-03-02T09:00:00Z");
        let end = start + chrono::Duration::days(21);
        let days: Vec<i64> = expand(start, Recurrence::Weekly, Some(end))
            .unwrap()
            .iter()
            .map(|t| (*t - start).num_days())
            .collect();
        assert_eq!(days, vec![0, 7, 14, 21]);
    }

    #[test]
    fn one_off_ignores_end() {
        let start = ts("2026-03-02T09:00:00Z");
        assert_eq!(expand(start, Recurrence::None, None).unwrap(), vec![start]);
    }

    #[test]
    fn recurring_without_end_is_rejected() {
        let start = ts("2026-03-02T09:00:00Z");
        let err = expand(start, Recurrence::Daily, None).unwrap_err();
        assert!(err.is_validation());
        let err = expand(start, Recurrence::Daily, Some(start)).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn monthly_keeps_day_of_month_after_short_months() {
        let start = ts("2026-01-31T12:00:00Z");
        let got = expand(start, Recurrence::Monthly, Some(ts("2026-03-31T12:00:00Z"))).unwrap();
        assert_eq!(
            got,
            vec![
                start,
                ts("2026-02-28T12:00:00Z"),
                ts("2026-03-31T12:00:00Z"),
            ]
        );
    }

    #[test]
    fn quarterly_and_yearly_steps() {
        let start = ts("2026-01-15T08:00:00Z");
        let end = ts("2027-01-15T08:00:00Z");
        assert_eq!(expand(start, Recurrence::Quarterly, Some(end)).unwrap().len(), 5);
        assert_eq!(expand(start, Recurrence::Semiannually, Some(end)).unwrap().len(), 3);
        assert_eq!(expand(start, Recurrence::Yearly, Some(end)).unwrap().len(), 2);
    }

    #[test]
    fn runaway_expansion_is_rejected() {
        let start = ts("2026-01-01T00:00:00Z");
        let end = start + chrono::Duration::days(MAX_OCCURRENCES as i64 + 10);
        assert!(expand(start, Recurrence::Daily, Some(end)).unwrap_err().is_validation());
    }

    proptest! {
        #[test]
        fn daily_occurrences_are_spaced_and_bounded(offset_days in 1i64..365, extra_secs in 0i64..86_400) {
            let start = ts("2026-03-02T09:00:00Z");
            let end = start + chrono::Duration::days(offset_days) + chrono::Duration::seconds(extra_secs);
            let got = expand(start, Recurrence::Daily, Some(end)).unwrap();

            prop_assert_eq!(got.len() as i64, offset_days + 1);
            prop_assert_eq!(got[0], start);
            prop_assert!(got.iter().all(|t| *t <= end));
            for pair in got.windows(2) {
                prop_assert_eq!(pair[1] - pair[0], chrono::Duration::days(1));
            }
        }
    }
}
