use chrono::{DateTime, Duration, Timelike, Utc};

/// Night window in local hours. `start > end` wraps past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NightSchedule {
    pub start_hour: u32,
    pub end_hour: u32,
    pub utc_offset_hours: i32,
}

impl NightSchedule {
    pub fn local_hour(&self, now: DateTime<Utc>) -> u32 {
        (now + Duration::hours(i64::from(self.utc_offset_hours))).hour()
    }

    pub fn is_night_hour(&self, hour: u32) -> bool {
        let (start, end) = (self.start_hour % 24, self.end_hour % 24);
        if start == end {
            false
        } else if start < end {
            (start..end).contains(&hour)
        } else {
            hour >= start || hour < end
        }
    }

    /// Reflector should be lit.
    pub fn is_night(&self, now: DateTime<Utc>) -> bool {
        self.is_night_hour(self.local_hour(now))
    }
}
