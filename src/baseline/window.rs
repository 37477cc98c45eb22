//! Daily snapshot window (time-of-day range, minute resolution)

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotWindow {
    start: NaiveTime,
    end: NaiveTime,
}

impl SnapshotWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self {
            start: truncate(start),
            end: truncate(end),
        }
    }

    /// Parse `HH:MM` bounds
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        Ok(Self::new(parse_hhmm(start)?, parse_hhmm(end)?))
    }

    /// Both bounds are inclusive; a window whose end precedes its start wraps midnight
    pub fn contains(&self, time: NaiveTime) -> bool {
        let t = truncate(time);
        if self.start <= self.end {
            t >= self.start && t <= self.end
        } else {
            t >= self.start || t <= self.end
        }
    }

    /// End precedes start, so the window spans midnight
    pub fn wraps(&self) -> bool {
        self.start > self.end
    }

    /// The day a window occurrence belongs to: the date it opened on.
    /// Past midnight in a wrapping window that is the previous day.
    pub fn opening_date(&self, local: NaiveDateTime) -> NaiveDate {
        let date = local.date();
        if self.wraps() && truncate(local.time()) <= self.end {
            date.pred_opt().unwrap_or(date)
        } else {
            date
        }
    }

    pub fn start(&self) -> NaiveTime {
        self.start
    }

    pub fn end(&self) -> NaiveTime {
        self.end
    }
}

fn parse_hhmm(value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .map_err(|e| Error::Config(format!("Invalid time of day '{}': {}", value, e)))
}

fn truncate(time: NaiveTime) -> NaiveTime {
    NaiveTime::from_hms_opt(time.hour(), time.minute(), 0).unwrap_or(time)
}
