use std::fmt;

use time::{macros::format_description, Date, Month, OffsetDateTime};

/// One metered reading (15-minute, daily, monthly or yearly depending on the query).
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumptionRecord {
    pub ts: OffsetDateTime,
    pub value: f64,
}

/// The window a consumption query covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumptionPeriod {
    Day(Date),
    Month { year: i32, month: Month },
    Year(i32),
}

impl ConsumptionPeriod {
    pub fn granularity(&self) -> &'static str {
        match self {
            Self::Day(_) => "day",
            Self::Month { .. } => "month",
            Self::Year(_) => "year",
        }
    }
}

impl fmt::Display for ConsumptionPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Day(date) => {
                let day = date
                    .format(format_description!("[year]-[month]-[day]"))
                    .map_err(|_| fmt::Error)?;
                f.write_str(&day)
            }
            Self::Month { year, month } => write!(f, "{year:04}-{:02}", u8::from(*month)),
            Self::Year(year) => write!(f, "{year:04}"),
        }
    }
}
