//! Simulation time stamps: a calendar date plus seconds of the day

use crate::errors::{Result, StatsError};
use chrono::{Datelike, Days, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use std::fmt;

pub const SECONDS_PER_DAY: u32 = 86_400;

/// Date in `YYYYMMDD` form plus time of day in seconds
///
/// Ordering is chronological.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeStamp {
    date: NaiveDate,
    tod: u32,
}

impl Default for TimeStamp {
    /// Midnight of 1970-01-01
    fn default() -> Self {
        Self {
            date: NaiveDate::default(),
            tod: 0,
        }
    }
}

impl TimeStamp {
    /// # Errors
    ///
    /// Returns an error if `ymd` is not a valid calendar date with year >= 1,
    /// or `tod` is outside `[0, 86400)`.
    pub fn new(ymd: i32, tod: i32) -> Result<Self> {
        let (year, month, day) = (ymd / 10_000, (ymd / 100) % 100, ymd % 100);
        if year < 1 {
            return Err(StatsError::InvalidTimeStamp(format!(
                "year {year} in YYYYMMDD {ymd} must be positive"
            )));
        }
        let date = NaiveDate::from_ymd_opt(year, month as u32, day as u32).ok_or_else(|| {
            StatsError::InvalidTimeStamp(format!("YYYYMMDD {ymd} is not a calendar date"))
        })?;
        let tod = u32::try_from(tod)
            .ok()
            .filter(|&t| t < SECONDS_PER_DAY)
            .ok_or_else(|| StatsError::InvalidTimeStamp(format!("time of day {tod} out of range")))?;
        Ok(Self { date, tod })
    }

    pub fn from_datetime(datetime: NaiveDateTime) -> Result<Self> {
        let ymd = datetime.year() * 10_000 + datetime.month() as i32 * 100 + datetime.day() as i32;
        Self::new(ymd, datetime.num_seconds_from_midnight() as i32)
    }

    #[must_use]
    pub fn ymd(&self) -> i32 {
        self.year() * 10_000 + self.month() as i32 * 100 + self.day() as i32
    }

    #[must_use]
    pub fn tod(&self) -> u32 {
        self.tod
    }

    #[must_use]
    pub fn year(&self) -> i32 {
        self.date.year()
    }

    #[must_use]
    pub fn month(&self) -> u32 {
        self.date.month()
    }

    #[must_use]
    pub fn day(&self) -> u32 {
        self.date.day()
    }

    #[must_use]
    pub fn hour(&self) -> u32 {
        self.tod / 3600
    }

    #[must_use]
    pub fn min(&self) -> u32 {
        (self.tod / 60) % 60
    }

    #[must_use]
    pub fn sec(&self) -> u32 {
        self.tod % 60
    }

    #[must_use]
    pub fn frac_of_day(&self) -> f64 {
        f64::from(self.tod) / f64::from(SECONDS_PER_DAY)
    }

    pub fn to_datetime(&self) -> Result<NaiveDateTime> {
        NaiveTime::from_num_seconds_from_midnight_opt(self.tod, 0)
            .map(|time| self.date.and_time(time))
            .ok_or_else(|| StatsError::InvalidTimeStamp(format!("time of day {} out of range", self.tod)))
    }

    /// Move forward by `seconds`, carrying over into following days
    pub fn advance(&mut self, seconds: u64) -> Result<()> {
        let total = u64::from(self.tod) + seconds;
        let days = total / u64::from(SECONDS_PER_DAY);
        self.date = self
            .date
            .checked_add_days(Days::new(days))
            .ok_or_else(|| StatsError::InvalidTimeStamp(format!("{self} + {seconds}s overflows")))?;
        self.tod = (total % u64::from(SECONDS_PER_DAY)) as u32;
        Ok(())
    }

    /// Signed distance to `earlier`, in days
    #[must_use]
    pub fn days_since(&self, earlier: &TimeStamp) -> f64 {
        let days = (self.date - earlier.date).num_days() as f64;
        days + self.frac_of_day() - earlier.frac_of_day()
    }
}

impl fmt::Display for TimeStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02}-{:05}",
            self.year(),
            self.month(),
            self.day(),
            self.tod
        )
    }
}
