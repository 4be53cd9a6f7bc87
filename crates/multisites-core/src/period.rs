//! Periods, date parameters and prior-period resolution.

use std::fmt;

use anyhow::{anyhow, Result};
use chrono::{Datelike, Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound on sub-periods expanded from one date parameter.
pub const MAX_SUB_PERIODS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Day,
    Week,
    Month,
    Year,
    Range,
}

impl Period {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim() {
            "day" => Ok(Self::Day),
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            "year" => Ok(Self::Year),
            "range" => Ok(Self::Range),
            _ => Err(anyhow!(
                "period must be one of: day, week, month, year, range"
            )),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Day => "day",
            Period::Week => "week",
            Period::Month => "month",
            Period::Year => "year",
            Period::Range => "range",
        }
    }

    /// Calendar span of the period containing `date`. Weeks start on Monday.
    pub fn bounds(&self, date: NaiveDate) -> (NaiveDate, NaiveDate) {
        match self {
            Period::Day | Period::Range => (date, date),
            Period::Week => {
                let start = date - Days::new(u64::from(date.weekday().num_days_from_monday()));
                (start, start + Days::new(6))
            }
            Period::Month => {
                let start = date.with_day(1).unwrap_or(date);
                let end = start
                    .checked_add_months(Months::new(1))
                    .and_then(|d| d.pred_opt())
                    .unwrap_or(start);
                (start, end)
            }
            Period::Year => {
                let start = NaiveDate::from_ymd_opt(date.year(), 1, 1).unwrap_or(date);
                let end = NaiveDate::from_ymd_opt(date.year(), 12, 31).unwrap_or(date);
                (start, end)
            }
        }
    }

    /// Move `date` by `steps` whole periods. `None` for `range` or on overflow.
    pub fn shift(&self, date: NaiveDate, steps: i64) -> Option<NaiveDate> {
        let magnitude = steps.unsigned_abs();
        match self {
            Period::Range => None,
            Period::Day | Period::Week => {
                let days = if matches!(self, Period::Week) {
                    magnitude.checked_mul(7)?
                } else {
                    magnitude
                };
                if steps < 0 {
                    date.checked_sub_days(Days::new(days))
                } else {
                    date.checked_add_days(Days::new(days))
                }
            }
            Period::Month | Period::Year => {
                let months = if matches!(self, Period::Year) {
                    magnitude.checked_mul(12)?
                } else {
                    magnitude
                };
                let months = Months::new(u32::try_from(months).ok()?);
                if steps < 0 {
                    date.checked_sub_months(months)
                } else {
                    date.checked_add_months(months)
                }
            }
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelativeKeyword {
    Last,
    Previous,
}

/// The `date` request parameter, resolved against "today".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DateSpec {
    Single(NaiveDate),
    /// Explicit `start,end` pair.
    List { start: NaiveDate, end: NaiveDate },
    /// `lastN` / `previousN`; `end` is the date inside the newest period.
    Relative {
        keyword: RelativeKeyword,
        count: u32,
        end: NaiveDate,
    },
}

impl DateSpec {
    pub fn parse(raw: &str, period: Period, today: NaiveDate) -> Result<Self> {
        let raw = raw.trim();
        match raw {
            "today" => return Ok(Self::Single(today)),
            "yesterday" => {
                return today
                    .pred_opt()
                    .map(Self::Single)
                    .ok_or_else(|| anyhow!("date out of range"))
            }
            _ => {}
        }

        for (prefix, keyword) in [
            ("last", RelativeKeyword::Last),
            ("previous", RelativeKeyword::Previous),
        ] {
            if let Some(count) = raw.strip_prefix(prefix) {
                let count: u32 = count
                    .parse()
                    .map_err(|_| anyhow!("{prefix}N date must carry a positive number"))?;
                if count == 0 || count as usize > MAX_SUB_PERIODS {
                    return Err(anyhow!(
                        "{prefix}N must be between 1 and {MAX_SUB_PERIODS}"
                    ));
                }
                let end = match keyword {
                    RelativeKeyword::Last => today,
                    // `range` has no period length of its own; step back one day.
                    RelativeKeyword::Previous => match period {
                        Period::Range => Period::Day.shift(today, -1),
                        _ => period.shift(today, -1),
                    }
                    .ok_or_else(|| anyhow!("date out of range"))?,
                };
                return Ok(Self::Relative {
                    keyword,
                    count,
                    end,
                });
            }
        }

        if let Some((start, end)) = raw.split_once(',') {
            let start = parse_ymd(start)?;
            let end = parse_ymd(end)?;
            if end < start {
                return Err(anyhow!("end of date range must be on or after its start"));
            }
            if period != Period::Range && list_len(period, start, end) > MAX_SUB_PERIODS {
                return Err(anyhow!(
                    "{start},{end} spans more than {MAX_SUB_PERIODS} {period} periods"
                ));
            }
            return Ok(Self::List { start, end });
        }

        parse_ymd(raw).map(Self::Single)
    }

    /// Whether this date produces one result per sub-period for `period`.
    pub fn is_multi_period(&self, period: Period) -> bool {
        period != Period::Range && !matches!(self, DateSpec::Single(_))
    }

    /// Expand into concrete sub-periods, oldest first.
    pub fn sub_periods(&self, period: Period) -> Vec<PeriodSpan> {
        if period == Period::Range {
            let (start, end) = match *self {
                DateSpec::Single(d) => (d, d),
                DateSpec::List { start, end } => (start, end),
                DateSpec::Relative { count, end, .. } => (
                    end.checked_sub_days(Days::new(u64::from(count).saturating_sub(1)))
                        .unwrap_or(end),
                    end,
                ),
            };
            return vec![PeriodSpan {
                period,
                start,
                end,
            }];
        }

        match *self {
            DateSpec::Single(d) => vec![PeriodSpan::containing(period, d)],
            DateSpec::List { start, end } => {
                let mut spans = Vec::new();
                let mut cursor = Some(start);
                while let Some(date) = cursor {
                    let span = PeriodSpan::containing(period, date);
                    if span.start > end || spans.len() >= MAX_SUB_PERIODS {
                        break;
                    }
                    cursor = period.shift(span.start, 1);
                    spans.push(span);
                }
                spans
            }
            DateSpec::Relative { count, end, .. } => (0..i64::from(count))
                .rev()
                .filter_map(|back| period.shift(end, -back))
                .map(|d| PeriodSpan::containing(period, d))
                .collect(),
        }
    }
}

impl fmt::Display for DateSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateSpec::Single(d) => write!(f, "{d}"),
            DateSpec::List { start, end } => write!(f, "{start},{end}"),
            DateSpec::Relative {
                keyword: RelativeKeyword::Last,
                count,
                ..
            } => write!(f, "last{count}"),
            DateSpec::Relative {
                keyword: RelativeKeyword::Previous,
                count,
                ..
            } => write!(f, "previous{count}"),
        }
    }
}

/// Number of `period` spans touching `start..=end`, counting stops one past
/// [`MAX_SUB_PERIODS`].
fn list_len(period: Period, start: NaiveDate, end: NaiveDate) -> usize {
    let mut count = 0;
    let mut cursor = Some(period.bounds(start).0);
    while let Some(date) = cursor {
        if date > end || count > MAX_SUB_PERIODS {
            break;
        }
        count += 1;
        cursor = period.shift(date, 1);
    }
    count
}

fn parse_ymd(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| anyhow!("invalid date {raw:?} (expected YYYY-MM-DD)"))
}

/// One concrete archived period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PeriodSpan {
    pub period: Period,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl PeriodSpan {
    pub fn containing(period: Period, date: NaiveDate) -> Self {
        let (start, end) = period.bounds(date);
        Self { period, start, end }
    }

    /// Key used for this span in period-grouped reports.
    pub fn label(&self) -> String {
        match self.period {
            Period::Day => self.start.to_string(),
            Period::Week | Period::Range => format!("{},{}", self.start, self.end),
            Period::Month => self.start.format("%Y-%m").to_string(),
            Period::Year => self.start.format("%Y").to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeriodError {
    #[error("invalid period: {0}")]
    InvalidPeriod(String),
    #[error("no comparable prior period for period={period} date={date}")]
    UnresolvablePriorPeriod { period: Period, date: String },
}

/// The comparable period immediately before a requested one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorPeriod {
    pub period: Period,
    pub date: DateSpec,
    /// Set when the prior period is a single date.
    pub last_date: Option<NaiveDate>,
}

pub trait PeriodMath: Send + Sync + 'static {
    fn prior_period(&self, period: Period, date: &DateSpec) -> Result<PriorPeriod, PeriodError>;
}

/// Calendar arithmetic: one period back, no prior for ranges or `lastN`/`previousN`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CalendarPeriodMath;

impl PeriodMath for CalendarPeriodMath {
    fn prior_period(&self, period: Period, date: &DateSpec) -> Result<PriorPeriod, PeriodError> {
        let unresolvable = || PeriodError::UnresolvablePriorPeriod {
            period,
            date: date.to_string(),
        };
        let shift = |d: NaiveDate| {
            period
                .shift(d, -1)
                .ok_or_else(|| PeriodError::InvalidPeriod(format!("{period} before {d}")))
        };

        if period == Period::Range {
            return Err(unresolvable());
        }
        match *date {
            DateSpec::Relative { .. } => Err(unresolvable()),
            DateSpec::Single(d) => {
                let last = shift(d)?;
                Ok(PriorPeriod {
                    period,
                    date: DateSpec::Single(last),
                    last_date: Some(last),
                })
            }
            DateSpec::List { start, end } => Ok(PriorPeriod {
                period,
                date: DateSpec::List {
                    start: shift(start)?,
                    end: shift(end)?,
                },
                last_date: None,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("date")
    }

    #[test]
    fn oversized_date_list_is_rejected() {
        let today = date(2025, 6, 1);
        let err = DateSpec::parse("2020-01-01,2024-12-31", Period::Day, today)
            .expect_err("too many days");
        assert!(err.to_string().contains("more than 500"));

        let longest = DateSpec::parse("2024-01-01,2025-05-14", Period::Day, today)
            .expect("500 days");
        let spans = longest.sub_periods(Period::Day);
        assert_eq!(spans.len(), MAX_SUB_PERIODS);
        assert_eq!(spans[MAX_SUB_PERIODS - 1].start, date(2025, 5, 14));
        assert!(DateSpec::parse("2024-01-01,2025-05-15", Period::Day, today).is_err());

        assert!(DateSpec::parse("2020-01-01,2024-12-31", Period::Month, today).is_ok());
        assert!(DateSpec::parse("2020-01-01,2024-12-31", Period::Range, today).is_ok());
    }

    #[test]
    fn parse_period_rejects_unknown() {
        assert_eq!(Period::parse("week").expect("week"), Period::Week);
        assert!(Period::parse("fortnight").is_err());
    }

    #[test]
    fn parse_date_keywords() {
        let today = date(2024, 1, 15);
        assert_eq!(
            DateSpec::parse("yesterday", Period::Day, today).expect("yesterday"),
            DateSpec::Single(date(2024, 1, 14))
        );
        assert_eq!(
            DateSpec::parse("previous3", Period::Month, today).expect("previous"),
            DateSpec::Relative {
                keyword: RelativeKeyword::Previous,
                count: 3,
                end: date(2023, 12, 15),
            }
        );
        assert!(DateSpec::parse("last0", Period::Day, today).is_err());
        assert!(DateSpec::parse("2024-02-10,2024-02-01", Period::Day, today).is_err());
        assert!(DateSpec::parse("15/01/2024", Period::Day, today).is_err());
    }

    #[test]
    fn week_and_month_bounds() {
        // 2024-01-17 is a Wednesday
        assert_eq!(
            Period::Week.bounds(date(2024, 1, 17)),
            (date(2024, 1, 15), date(2024, 1, 21))
        );
        assert_eq!(
            Period::Month.bounds(date(2024, 2, 10)),
            (date(2024, 2, 1), date(2024, 2, 29))
        );
    }

    #[test]
    fn last_n_days_expand_oldest_first() {
        let dates = DateSpec::parse("last3", Period::Day, date(2024, 1, 15)).expect("dates");
        let labels: Vec<String> = dates
            .sub_periods(Period::Day)
            .iter()
            .map(PeriodSpan::label)
            .collect();
        assert_eq!(labels, vec!["2024-01-13", "2024-01-14", "2024-01-15"]);
        assert!(dates.is_multi_period(Period::Day));
    }

    #[test]
    fn range_period_is_one_span() {
        let dates = DateSpec::parse("2024-01-01,2024-01-31", Period::Range, date(2024, 3, 1))
            .expect("dates");
        let spans = dates.sub_periods(Period::Range);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].label(), "2024-01-01,2024-01-31");
        assert!(!dates.is_multi_period(Period::Range));
    }

    #[test]
    fn month_list_expands_per_month() {
        let dates = DateSpec::parse("2024-01-20,2024-03-02", Period::Month, date(2024, 6, 1))
            .expect("dates");
        let labels: Vec<String> = dates
            .sub_periods(Period::Month)
            .iter()
            .map(PeriodSpan::label)
            .collect();
        assert_eq!(labels, vec!["2024-01", "2024-02", "2024-03"]);
    }

    #[test]
    fn prior_of_single_day() {
        let prior = CalendarPeriodMath
            .prior_period(Period::Day, &DateSpec::Single(date(2024, 1, 15)))
            .expect("prior");
        assert_eq!(prior.date, DateSpec::Single(date(2024, 1, 14)));
        assert_eq!(prior.last_date, Some(date(2024, 1, 14)));
    }

    #[test]
    fn prior_of_month_clamps_day() {
        let prior = CalendarPeriodMath
            .prior_period(Period::Month, &DateSpec::Single(date(2024, 3, 31)))
            .expect("prior");
        assert_eq!(prior.date, DateSpec::Single(date(2024, 2, 29)));
    }

    #[test]
    fn prior_of_list_shifts_both_ends() {
        let prior = CalendarPeriodMath
            .prior_period(
                Period::Week,
                &DateSpec::List {
                    start: date(2024, 1, 15),
                    end: date(2024, 1, 28),
                },
            )
            .expect("prior");
        assert_eq!(
            prior.date,
            DateSpec::List {
                start: date(2024, 1, 8),
                end: date(2024, 1, 21),
            }
        );
        assert_eq!(prior.last_date, None);
    }

    #[test]
    fn no_prior_for_range_or_relative() {
        let math = CalendarPeriodMath;
        assert!(matches!(
            math.prior_period(Period::Range, &DateSpec::Single(date(2024, 1, 15))),
            Err(PeriodError::UnresolvablePriorPeriod { .. })
        ));
        let last7 = DateSpec::parse("last7", Period::Day, date(2024, 1, 15)).expect("dates");
        assert!(matches!(
            math.prior_period(Period::Day, &last7),
            Err(PeriodError::UnresolvablePriorPeriod { .. })
        ));
    }
}
