use chrono::{DateTime, Datelike, Days, Months, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use hotelpos_core::{DomainError, DomainResult};

/// Reporting granularity of a balance row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodType {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl PeriodType {
    pub const ALL: [PeriodType; 4] = [
        PeriodType::Daily,
        PeriodType::Weekly,
        PeriodType::Monthly,
        PeriodType::Yearly,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            PeriodType::Daily => "daily",
            PeriodType::Weekly => "weekly",
            PeriodType::Monthly => "monthly",
            PeriodType::Yearly => "yearly",
        }
    }

    pub fn from_code(code: &str) -> DomainResult<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.code().eq_ignore_ascii_case(code.trim()))
            .ok_or_else(|| DomainError::not_found(format!("period type {code:?}")))
    }

    /// First day of the bucket holding `date`: the date itself, its Monday,
    /// the first of its month or January 1st.
    pub fn bucket_start(&self, date: NaiveDate) -> DomainResult<NaiveDate> {
        let start = match self {
            PeriodType::Daily => Some(date),
            PeriodType::Weekly => {
                date.checked_sub_days(Days::new(u64::from(date.weekday().num_days_from_monday())))
            }
            PeriodType::Monthly => date.with_day(1),
            PeriodType::Yearly => NaiveDate::from_ymd_opt(date.year(), 1, 1),
        };
        start.ok_or_else(|| DomainError::validation(format!("no {} bucket for {date}", self.code())))
    }

    /// Exclusive end of the bucket starting at `start`.
    pub fn bucket_end(&self, start: NaiveDate) -> DomainResult<NaiveDate> {
        let end = match self {
            PeriodType::Daily => start.checked_add_days(Days::new(1)),
            PeriodType::Weekly => start.checked_add_days(Days::new(7)),
            PeriodType::Monthly => start.checked_add_months(Months::new(1)),
            PeriodType::Yearly => start.checked_add_months(Months::new(12)),
        };
        end.ok_or_else(|| DomainError::validation(format!("{} period starting {start} overflows", self.code())))
    }
}

impl core::fmt::Display for PeriodType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.code())
    }
}

/// Identity of a balance row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeriodKey {
    pub period_type: PeriodType,
    pub period_start: NaiveDate,
}

impl PeriodKey {
    /// Key of the bucket that contains `date`.
    pub fn for_date(period_type: PeriodType, date: NaiveDate) -> DomainResult<Self> {
        Ok(Self {
            period_type,
            period_start: period_type.bucket_start(date)?,
        })
    }

    pub fn containing(period_type: PeriodType, at: DateTime<Utc>) -> DomainResult<Self> {
        Self::for_date(period_type, at.date_naive())
    }

    /// `[start, end)` in UTC.
    pub fn range(&self) -> DomainResult<(DateTime<Utc>, DateTime<Utc>)> {
        let end = self.period_type.bucket_end(self.period_start)?;
        Ok((midnight(self.period_start), midnight(end)))
    }
}

impl core::fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{}", self.period_type, self.period_start)
    }
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}
