use std::fmt;

use chrono::NaiveTime;

pub const DEFAULT_START_HOUR: u32 = 9;
pub const DEFAULT_END_HOUR: u32 = 17;

/// A bookable half-hour mark, displayed as `H:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimeSlot {
    pub hour: u32,
    pub minute: u32,
}

impl TimeSlot {
    pub fn to_naive_time(self) -> Option<NaiveTime> {
        NaiveTime::from_hms_opt(self.hour, self.minute, 0)
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:02}", self.hour, self.minute)
    }
}

/// Half-hour marks from `start_hour`; the last hour only gets its `:00` slot.
pub fn generate_time_slots(start_hour: u32, end_hour: u32) -> Vec<TimeSlot> {
    let mut slots = Vec::new();
    for hour in start_hour..end_hour {
        slots.push(TimeSlot { hour, minute: 0 });
        if hour + 1 < end_hour {
            slots.push(TimeSlot { hour, minute: 30 });
        }
    }
    slots
}

pub fn default_time_slots() -> Vec<TimeSlot> {
    generate_time_slots(DEFAULT_START_HOUR, DEFAULT_END_HOUR)
}

#[cfg(test)]
#[path = "tests/slots_tests.rs"]
mod tests;
