use chrono::{DateTime, Local, NaiveDate, Utc};
use chrono_tz::Tz;
use std::sync::Arc;

pub type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LocalClock {
    zone: Option<Tz>,
}

impl LocalClock {
    pub fn system() -> Self {
        Self { zone: None }
    }

    pub fn with_zone(zone: Tz) -> Self {
        Self { zone: Some(zone) }
    }

    pub fn from_name(name: Option<&str>) -> Result<Self, String> {
        match name.map(str::trim).filter(|value| !value.is_empty()) {
            None => Ok(Self::system()),
            Some(name) => name
                .parse::<Tz>()
                .map(Self::with_zone)
                .map_err(|error| format!("unknown timezone '{name}': {error}")),
        }
    }

    pub fn zone(&self) -> Option<Tz> {
        self.zone
    }

    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        match self.zone {
            Some(zone) => instant.with_timezone(&zone).date_naive(),
            None => instant.with_timezone(&Local).date_naive(),
        }
    }

    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        self.local_date(now)
    }

}
