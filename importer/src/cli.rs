//! Argument types shared by the importer binaries.

use clap::Args;
use energy_client::domain::ConsumptionPeriod;
use time::{macros::format_description, Date, Month};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearMonth {
    pub year: i32,
    pub month: Month,
}

pub fn parse_day(s: &str) -> Result<Date, String> {
    Date::parse(s.trim(), format_description!("[year]-[month]-[day]"))
        .map_err(|e| format!("expected YYYY-MM-DD: {e}"))
}

pub fn parse_month(s: &str) -> Result<YearMonth, String> {
    let (year, month) = s
        .trim()
        .split_once('-')
        .ok_or_else(|| "expected YYYY-MM".to_string())?;
    let year = parse_year(year)?;
    let month = month
        .parse::<u8>()
        .ok()
        .and_then(|m| Month::try_from(m).ok())
        .ok_or_else(|| format!("invalid month {month:?}"))?;
    Ok(YearMonth { year, month })
}

pub fn parse_year(s: &str) -> Result<i32, String> {
    match s.trim().parse::<i32>() {
        Ok(year) if (2000..=2100).contains(&year) => Ok(year),
        Ok(year) => Err(format!("year {year} is out of range")),
        Err(e) => Err(format!("invalid year {s:?}: {e}")),
    }
}

/// Exactly one of day, month or year selects the readings to import.
#[derive(Debug, Clone, Args)]
#[group(required = true, multiple = false)]
pub struct PeriodArgs {
    /// Day whose 15-minute readings are imported (YYYY-MM-DD)
    #[arg(short, long, value_parser = parse_day)]
    pub day: Option<Date>,

    /// Month whose daily readings are imported (YYYY-MM)
    #[arg(short, long, value_parser = parse_month)]
    pub month: Option<YearMonth>,

    /// Year whose monthly readings are imported (YYYY)
    #[arg(short, long, value_parser = parse_year)]
    pub year: Option<i32>,
}

impl PeriodArgs {
    pub fn period(&self) -> Option<ConsumptionPeriod> {
        match (self.day, self.month, self.year) {
            (Some(day), _, _) => Some(ConsumptionPeriod::Day(day)),
            (_, Some(YearMonth { year, month }), _) => Some(ConsumptionPeriod::Month { year, month }),
            (_, _, Some(year)) => Some(ConsumptionPeriod::Year(year)),
            _ => None,
        }
    }
}
