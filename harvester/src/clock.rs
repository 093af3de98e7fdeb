use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use std::time::SystemTime;

/// Source of "now" for the freshness guard and archive filenames.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;

    fn now_system(&self) -> SystemTime {
        SystemTime::from(self.now())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// A clock stuck at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Local>);

impl FixedClock {
    /// Fixed at a local wall-clock time, e.g. `"2024-03-05 09:00:00"`.
    pub fn at_local(datetime: &str) -> Option<Self> {
        let naive = NaiveDateTime::parse_from_str(datetime, "%Y-%m-%d %H:%M:%S").ok()?;
        Local.from_local_datetime(&naive).single().map(FixedClock)
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Local> {
        self.0
    }
}
