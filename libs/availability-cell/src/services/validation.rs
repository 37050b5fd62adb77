// libs/availability-cell/src/services/validation.rs
use chrono::{DateTime, Utc};

use crate::models::{SlotError, SlotKey};

/// Checks the window rules every slot must satisfy when written:
/// end strictly after start, start strictly after `now`.
pub fn validate_slot_window(key: &SlotKey, now: DateTime<Utc>) -> Result<(), SlotError> {
    if key.end_time <= key.start_time {
        return Err(SlotError::InvalidRange);
    }

    if key.starts_at() <= now {
        return Err(SlotError::InThePast);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime, TimeZone};
    use uuid::Uuid;

    fn key(start: (u32, u32), end: (u32, u32)) -> SlotKey {
        SlotKey::new(
            Uuid::new_v4(),
            NaiveDate::from_ymd_opt(2025, 1, 10).unwrap(),
            NaiveTime::from_hms_opt(start.0, start.1, 0).unwrap(),
            NaiveTime::from_hms_opt(end.0, end.1, 0).unwrap(),
        )
    }

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 10, hour, minute, 0).unwrap()
    }

    #[test]
    fn accepts_future_window() {
        assert_eq!(validate_slot_window(&key((10, 0), (10, 30)), at(9, 0)), Ok(()));
    }

    #[test]
    fn rejects_empty_and_inverted_ranges() {
        assert_eq!(
            validate_slot_window(&key((10, 0), (10, 0)), at(9, 0)),
            Err(SlotError::InvalidRange)
        );
        assert_eq!(
            validate_slot_window(&key((10, 30), (10, 0)), at(9, 0)),
            Err(SlotError::InvalidRange)
        );
    }

    #[test]
    fn start_equal_to_now_is_in_the_past() {
        assert_eq!(
            validate_slot_window(&key((10, 0), (10, 30)), at(10, 0)),
            Err(SlotError::InThePast)
        );
        assert_eq!(
            validate_slot_window(&key((10, 0), (10, 30)), at(10, 1)),
            Err(SlotError::InThePast)
        );
    }
}
