use std::fmt::{Display, Formatter};

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Date, OffsetDateTime, Weekday};

use crate::ValidationError;

const DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

const MILLIS_PER_SECOND: i64 = 1_000;

/// UTC calendar day a daily kline belongs to, serialized as `YYYY-MM-DD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TradeDate(Date);

impl TradeDate {
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        Date::parse(input.trim(), DATE_FORMAT)
            .map(Self)
            .map_err(|_| ValidationError::InvalidDate {
                value: input.to_owned(),
            })
    }

    pub fn from_calendar(year: i32, month: u8, day: u8) -> Result<Self, ValidationError> {
        let month = time::Month::try_from(month).map_err(|_| ValidationError::InvalidDate {
            value: format!("{year}-{month}-{day}"),
        })?;
        Date::from_calendar_date(year, month, day)
            .map(Self)
            .map_err(|_| ValidationError::InvalidDate {
                value: format!("{year}-{}-{day}", month as u8),
            })
    }

    /// Calendar day (UTC) containing the given epoch-millisecond timestamp.
    pub fn from_unix_millis(millis: i64) -> Result<Self, ValidationError> {
        let nanos = i128::from(millis) * 1_000_000;
        OffsetDateTime::from_unix_timestamp_nanos(nanos)
            .map(|ts| Self(ts.date()))
            .map_err(|_| ValidationError::TimestampOutOfRange { value: millis })
    }

    pub const fn from_date(date: Date) -> Self {
        Self(date)
    }

    pub fn next_day(self) -> Option<Self> {
        self.0.next_day().map(Self)
    }

    /// Epoch milliseconds of 00:00:00 UTC on this day.
    pub fn start_unix_millis(self) -> i64 {
        self.0.midnight().assume_utc().unix_timestamp() * MILLIS_PER_SECOND
    }

    pub fn year(self) -> i32 {
        self.0.year()
    }

    pub fn month(self) -> u8 {
        self.0.month() as u8
    }

    pub fn weekday(self) -> Weekday {
        self.0.weekday()
    }

    /// `YYYY-MM` bucket label.
    pub fn month_label(self) -> String {
        format!("{:04}-{:02}", self.year(), self.month())
    }

    pub fn format(self) -> String {
        format!(
            "{:04}-{:02}-{:02}",
            self.0.year(),
            self.0.month() as u8,
            self.0.day()
        )
    }
}

impl Display for TradeDate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.format())
    }
}

impl Serialize for TradeDate {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.format())
    }
}

impl<'de> Deserialize<'de> for TradeDate {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Self::parse(&value).map_err(D::Error::custom)
    }
}
