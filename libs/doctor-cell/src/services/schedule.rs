// libs/doctor-cell/src/services/schedule.rs
//
// Declared working-hours check. Independent of slot-based availability: some
// booking flows carry an explicit date/time instead of a slot, and those must
// still respect the doctor's recurring schedule when one is declared.
use chrono::{Datelike, NaiveDate, NaiveTime, Weekday};

use crate::models::{Doctor, DoctorError};

fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// Validate a requested window against the doctor's declared schedule.
///
/// A doctor with no declared schedule accepts any window here (the caller
/// falls back to slot-based availability or manual review). The two failure
/// modes are reported separately so the patient learns whether the weekday or
/// the time of day was the problem.
pub fn check_within_working_hours(
    doctor: &Doctor,
    date: NaiveDate,
    start: NaiveTime,
    end: NaiveTime,
) -> Result<(), DoctorError> {
    let Some(days) = &doctor.working_days else {
        return Ok(());
    };

    if !days.contains(date.weekday()) {
        return Err(DoctorError::NotWorkingDay(
            weekday_name(date.weekday()).to_string(),
        ));
    }

    if let (Some(work_start), Some(work_end)) = (doctor.work_start_time, doctor.work_end_time) {
        if start < work_start || end > work_end {
            return Err(DoctorError::OutsideWorkingHours {
                start: work_start,
                end: work_end,
            });
        }
    }

    Ok(())
}
