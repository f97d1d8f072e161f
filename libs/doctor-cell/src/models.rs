// libs/doctor-cell/src/models.rs
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

// ==============================================================================
// DOCTOR PROFILE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Doctor {
    pub id: Uuid,
    pub user_id: Uuid,
    pub full_name: String,
    pub specialties: Vec<String>,
    pub clinic_name: String,
    pub clinic_address: String,
    pub contact_phone: String,
    pub contact_email: Option<String>,
    pub qualifications: Option<String>,
    pub is_approved: bool,
    pub working_days: Option<WorkingDays>,
    pub work_start_time: Option<NaiveTime>,
    pub work_end_time: Option<NaiveTime>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Doctor {
    /// A doctor only declares a recurring schedule when all three parts are set.
    pub fn has_declared_schedule(&self) -> bool {
        self.working_days.is_some()
            && self.work_start_time.is_some()
            && self.work_end_time.is_some()
    }
}

/// Structured set of consulting weekdays. Parsed once at the profile-edit
/// boundary from descriptors like "Mon-Fri", "Mon,Wed,Fri" or "Sat-Sun";
/// booking-time checks operate on the set, never on the raw string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkingDays {
    // Indexed by Weekday::num_days_from_monday().
    days: [bool; 7],
}

const WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

impl WorkingDays {
    pub fn contains(&self, day: Weekday) -> bool {
        self.days[day.num_days_from_monday() as usize]
    }

    pub fn is_empty(&self) -> bool {
        !self.days.iter().any(|d| *d)
    }

    pub fn iter(&self) -> impl Iterator<Item = Weekday> + '_ {
        WEEKDAYS.iter().copied().filter(|d| self.contains(*d))
    }

    fn parse_day(token: &str) -> Result<Weekday, String> {
        match token.trim().to_lowercase().as_str() {
            "mon" | "monday" => Ok(Weekday::Mon),
            "tue" | "tues" | "tuesday" => Ok(Weekday::Tue),
            "wed" | "wednesday" => Ok(Weekday::Wed),
            "thu" | "thur" | "thurs" | "thursday" => Ok(Weekday::Thu),
            "fri" | "friday" => Ok(Weekday::Fri),
            "sat" | "saturday" => Ok(Weekday::Sat),
            "sun" | "sunday" => Ok(Weekday::Sun),
            other => Err(format!("Unrecognised weekday: '{}'", other)),
        }
    }

    fn short_name(day: Weekday) -> &'static str {
        match day {
            Weekday::Mon => "Mon",
            Weekday::Tue => "Tue",
            Weekday::Wed => "Wed",
            Weekday::Thu => "Thu",
            Weekday::Fri => "Fri",
            Weekday::Sat => "Sat",
            Weekday::Sun => "Sun",
        }
    }
}

impl FromStr for WorkingDays {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut days = [false; 7];

        for token in s.split(',') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }

            if let Some((from, to)) = token.split_once('-') {
                let from = Self::parse_day(from)?;
                let to = Self::parse_day(to)?;

                // Ranges wrap: "Sat-Mon" covers Sat, Sun, Mon.
                let mut current = from;
                loop {
                    days[current.num_days_from_monday() as usize] = true;
                    if current == to {
                        break;
                    }
                    current = current.succ();
                }
            } else {
                days[Self::parse_day(token)?.num_days_from_monday() as usize] = true;
            }
        }

        let parsed = Self { days };
        if parsed.is_empty() {
            return Err("Working days descriptor contains no days".to_string());
        }

        Ok(parsed)
    }
}

impl fmt::Display for WorkingDays {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(Self::short_name).collect();
        write!(f, "{}", names.join(","))
    }
}

impl Serialize for WorkingDays {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for WorkingDays {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ==============================================================================
// SLOT MODELS
// ==============================================================================

/// One discrete bookable window declared by a doctor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorSlot {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub slot_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub is_available: bool,
    pub created_at: DateTime<Utc>,
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSlotRequest {
    pub slot_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateScheduleRequest {
    /// Raw descriptor, e.g. "Mon-Fri" or "Mon,Wed,Fri". Parsed here, at the
    /// profile-edit boundary, and stored canonically.
    pub working_days: Option<String>,
    pub work_start_time: Option<NaiveTime>,
    pub work_end_time: Option<NaiveTime>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DoctorSearchFilters {
    pub q: Option<String>,
    pub specialty: Option<String>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum DoctorError {
    #[error("Doctor not found")]
    NotFound,

    #[error("Slot not found")]
    SlotNotFound,

    #[error("An identical slot already exists for this doctor")]
    SlotConflict,

    #[error("Invalid slot time: {0}")]
    InvalidTime(String),

    #[error("Doctor does not consult on {0}")]
    NotWorkingDay(String),

    #[error("Requested time is outside working hours ({start} - {end})")]
    OutsideWorkingHours { start: NaiveTime, end: NaiveTime },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comma_list() {
        let days: WorkingDays = "Mon,Wed,Fri".parse().unwrap();
        assert!(days.contains(Weekday::Mon));
        assert!(!days.contains(Weekday::Tue));
        assert!(days.contains(Weekday::Wed));
        assert!(days.contains(Weekday::Fri));
        assert!(!days.contains(Weekday::Sun));
    }

    #[test]
    fn parses_range() {
        let days: WorkingDays = "Mon-Fri".parse().unwrap();
        for day in [Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri] {
            assert!(days.contains(day));
        }
        assert!(!days.contains(Weekday::Sat));
        assert!(!days.contains(Weekday::Sun));
    }

    #[test]
    fn parses_wrapping_range() {
        let days: WorkingDays = "Sat-Mon".parse().unwrap();
        assert!(days.contains(Weekday::Sat));
        assert!(days.contains(Weekday::Sun));
        assert!(days.contains(Weekday::Mon));
        assert!(!days.contains(Weekday::Tue));
    }

    #[test]
    fn parses_full_names_case_insensitive() {
        let days: WorkingDays = "monday, WEDNESDAY".parse().unwrap();
        assert!(days.contains(Weekday::Mon));
        assert!(days.contains(Weekday::Wed));
    }

    #[test]
    fn rejects_garbage() {
        assert!("Mon-Fry".parse::<WorkingDays>().is_err());
        assert!("someday".parse::<WorkingDays>().is_err());
        assert!("".parse::<WorkingDays>().is_err());
    }

    #[test]
    fn display_is_canonical() {
        let days: WorkingDays = "friday,mon, Wed".parse().unwrap();
        assert_eq!(days.to_string(), "Mon,Wed,Fri");
    }

    #[test]
    fn serde_round_trip() {
        let days: WorkingDays = "Mon-Fri".parse().unwrap();
        let json = serde_json::to_string(&days).unwrap();
        assert_eq!(json, "\"Mon,Tue,Wed,Thu,Fri\"");
        let back: WorkingDays = serde_json::from_str(&json).unwrap();
        assert_eq!(back, days);
    }
}
