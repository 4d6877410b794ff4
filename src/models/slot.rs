use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use mongodb::bson::oid::ObjectId;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Calendar day of a slot. Wire form is `D_M_YYYY` without zero padding,
/// e.g. `12_6_2025`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotDate(NaiveDate);

impl SlotDate {
    #[cfg(test)]
    pub fn new(date: NaiveDate) -> Self {
        SlotDate(date)
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }
}

impl FromStr for SlotDate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split('_').collect();
        if parts.len() != 3 {
            return Err(format!("Invalid slot date '{}': expected D_M_YYYY", s));
        }

        let number = |part: &str| {
            part.parse::<u32>()
                .map_err(|_| format!("Invalid slot date '{}': '{}' is not a number", s, part))
        };
        let day = number(parts[0])?;
        let month = number(parts[1])?;
        let year = parts[2]
            .parse::<i32>()
            .map_err(|_| format!("Invalid slot date '{}': '{}' is not a year", s, parts[2]))?;

        NaiveDate::from_ymd_opt(year, month, day)
            .map(SlotDate)
            .ok_or_else(|| format!("Invalid slot date '{}': no such calendar day", s))
    }
}

impl fmt::Display for SlotDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.0.day(), self.0.month(), self.0.year())
    }
}

/// Wall-clock time of a slot on the 12-hour clock, e.g. `10:30 AM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotTime(NaiveTime);

impl SlotTime {
    pub fn time(&self) -> NaiveTime {
        self.0
    }
}

impl FromStr for SlotTime {
    type Err = String;

    /// Accepts `H:MM AM` / `HH:MM PM` (marker case-insensitive). The hour is
    /// converted with: PM and hour < 12 adds 12, AM and hour == 12 becomes 0.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || format!("Invalid slot time '{}': expected HH:MM AM|PM", s);

        let (clock, marker) = s.trim().split_once(' ').ok_or_else(invalid)?;
        let (hours, minutes) = clock.split_once(':').ok_or_else(invalid)?;

        let mut hour: u32 = hours.parse().map_err(|_| invalid())?;
        let minute: u32 = minutes.parse().map_err(|_| invalid())?;
        if !(1..=12).contains(&hour) || minute > 59 || minutes.len() != 2 {
            return Err(invalid());
        }

        match marker.trim().to_ascii_uppercase().as_str() {
            "PM" if hour < 12 => hour += 12,
            "AM" if hour == 12 => hour = 0,
            "AM" | "PM" => {}
            _ => return Err(invalid()),
        }

        NaiveTime::from_hms_opt(hour, minute, 0)
            .map(SlotTime)
            .ok_or_else(invalid)
    }
}

impl fmt::Display for SlotTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%I:%M %p"))
    }
}

macro_rules! string_serde {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(de::Error::custom)
            }
        }
    };
}

string_serde!(SlotDate);
string_serde!(SlotTime);

/// Per-doctor map of booked times, keyed by day. Never holds an empty day.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotLedger(BTreeMap<SlotDate, Vec<SlotTime>>);

impl SlotLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the ledger from the authoritative booking rows.
    pub fn from_bookings<'a, I>(bookings: I) -> Self
    where
        I: IntoIterator<Item = &'a SlotBooking>,
    {
        let mut ledger = SlotLedger::new();
        for booking in bookings {
            ledger.insert(booking.slot_date, booking.slot_time);
        }
        ledger
    }

    pub fn contains(&self, date: &SlotDate, time: &SlotTime) -> bool {
        self.0
            .get(date)
            .map(|times| times.contains(time))
            .unwrap_or(false)
    }

    /// Returns false when the slot was already present.
    pub fn insert(&mut self, date: SlotDate, time: SlotTime) -> bool {
        let times = self.0.entry(date).or_default();
        match times.binary_search(&time) {
            Ok(_) => false,
            Err(pos) => {
                times.insert(pos, time);
                true
            }
        }
    }

    #[cfg(test)]
    pub fn times(&self, date: &SlotDate) -> &[SlotTime] {
        self.0.get(date).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SlotDate, &Vec<SlotTime>)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Whether the ledger still has a booked slot ahead of `now` (server-local
/// wall clock). Past days are ignored; today counts only for times strictly
/// after the current hour and minute; any later day with a slot qualifies.
pub fn has_future_slots(ledger: &SlotLedger, now: NaiveDateTime) -> bool {
    let today = now.date();
    let current = (now.hour(), now.minute());

    ledger.iter().any(|(date, times)| {
        if times.is_empty() || date.date() < today {
            return false;
        }
        if date.date() > today {
            return true;
        }
        times
            .iter()
            .any(|t| (t.time().hour(), t.time().minute()) > current)
    })
}

/// Whether the slot is at or before the current minute.
pub fn is_past_slot(date: &SlotDate, time: &SlotTime, now: NaiveDateTime) -> bool {
    let slot = date.date().and_time(time.time());
    slot.date() < now.date()
        || (slot.date() == now.date()
            && (slot.hour(), slot.minute()) <= (now.hour(), now.minute()))
}

/// Occupancy row in `slot_bookings`. Unique on (doctor_id, slot_date, slot_time).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotBooking {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub doctor_id: ObjectId,
    pub slot_date: SlotDate,
    pub slot_time: SlotTime,
    /// None for rows reconciled from a ledger written before rows existed.
    pub appointment_id: Option<ObjectId>,
    pub created_at: i64,
}

impl SlotBooking {
    pub fn new(doctor_id: ObjectId, slot_date: SlotDate, slot_time: SlotTime) -> Self {
        SlotBooking {
            id: None,
            doctor_id,
            slot_date,
            slot_time,
            appointment_id: None,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> SlotDate {
        s.parse().unwrap()
    }

    fn time(s: &str) -> SlotTime {
        s.parse().unwrap()
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn test_slot_date_round_trips_unpadded() {
        let d = date("12_6_2025");
        assert_eq!(d.date(), NaiveDate::from_ymd_opt(2025, 6, 12).unwrap());
        assert_eq!(d.to_string(), "12_6_2025");
        assert_eq!(date("01_02_2026").to_string(), "1_2_2026");
    }

    #[test]
    fn test_slot_date_rejects_garbage() {
        assert!("2025-06-12".parse::<SlotDate>().is_err());
        assert!("31_2_2025".parse::<SlotDate>().is_err());
        assert!("a_6_2025".parse::<SlotDate>().is_err());
        assert!("".parse::<SlotDate>().is_err());
    }

    #[test]
    fn test_slot_time_twelve_hour_rules() {
        assert_eq!(time("12:15 AM").time(), NaiveTime::from_hms_opt(0, 15, 0).unwrap());
        assert_eq!(time("12:00 PM").time(), NaiveTime::from_hms_opt(12, 0, 0).unwrap());
        assert_eq!(time("1:30 PM").time(), NaiveTime::from_hms_opt(13, 30, 0).unwrap());
        assert_eq!(time("9:00 am").to_string(), "09:00 AM");
        assert_eq!(time("11:00 PM").to_string(), "11:00 PM");
    }

    #[test]
    fn test_slot_time_rejects_garbage() {
        for bad in ["13:00 PM", "0:30 AM", "10:60 AM", "10:00", "10:00 XM", "ten AM", "10:5 AM"] {
            assert!(bad.parse::<SlotTime>().is_err(), "{} should be rejected", bad);
        }
    }

    #[test]
    fn test_ledger_keeps_times_in_clock_order() {
        let mut ledger = SlotLedger::new();
        assert!(ledger.insert(date("12_6_2025"), time("01:00 PM")));
        assert!(ledger.insert(date("12_6_2025"), time("10:00 AM")));
        assert!(!ledger.insert(date("12_6_2025"), time("10:00 AM")));

        let times: Vec<String> = ledger
            .times(&date("12_6_2025"))
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(times, vec!["10:00 AM", "01:00 PM"]);
    }

    #[test]
    fn test_ledger_json_shape() {
        let ledger: SlotLedger =
            serde_json::from_str(r#"{"12_6_2025": ["10:00 AM", "11:00 AM"]}"#).unwrap();
        assert!(ledger.contains(&date("12_6_2025"), &time("11:00 AM")));
        assert_eq!(
            serde_json::to_value(&ledger).unwrap(),
            serde_json::json!({"12_6_2025": ["10:00 AM", "11:00 AM"]})
        );
    }

    #[test]
    fn test_ledger_from_bookings_is_sparse() {
        let doctor = ObjectId::new();
        let rows = vec![
            SlotBooking::new(doctor, date("12_6_2025"), time("10:00 AM")),
            SlotBooking::new(doctor, date("13_6_2025"), time("10:00 AM")),
        ];
        let remaining: Vec<SlotBooking> = rows
            .into_iter()
            .filter(|r| r.slot_date != date("12_6_2025"))
            .collect();

        let ledger = SlotLedger::from_bookings(&remaining);
        assert!(ledger.times(&date("12_6_2025")).is_empty());
        assert_eq!(ledger.iter().count(), 1);
    }

    #[test]
    fn test_availability_future_day() {
        let mut ledger = SlotLedger::new();
        ledger.insert(date("13_6_2025"), time("08:00 AM"));
        assert!(has_future_slots(&ledger, at(2025, 6, 12, 23, 59)));
    }

    #[test]
    fn test_availability_ignores_past_days() {
        let mut ledger = SlotLedger::new();
        ledger.insert(date("11_6_2025"), time("11:00 PM"));
        assert!(!has_future_slots(&ledger, at(2025, 6, 12, 0, 0)));
    }

    #[test]
    fn test_availability_today_needs_later_time() {
        let mut ledger = SlotLedger::new();
        ledger.insert(date("12_6_2025"), time("10:00 AM"));
        ledger.insert(date("12_6_2025"), time("02:30 PM"));

        assert!(has_future_slots(&ledger, at(2025, 6, 12, 14, 29)));
        // Same minute is not in the future.
        assert!(!has_future_slots(&ledger, at(2025, 6, 12, 14, 30)));
        assert!(!has_future_slots(&ledger, at(2025, 6, 12, 18, 0)));
    }

    #[test]
    fn test_availability_empty_ledger() {
        assert!(!has_future_slots(&SlotLedger::new(), at(2025, 6, 12, 9, 0)));
    }

    #[test]
    fn test_availability_is_idempotent() {
        let mut ledger = SlotLedger::new();
        ledger.insert(date("12_6_2025"), time("10:00 AM"));
        ledger.insert(date("20_6_2025"), time("04:00 PM"));
        let now = at(2025, 6, 12, 11, 0);

        let first = has_future_slots(&ledger, now);
        let second = has_future_slots(&ledger, now);
        assert_eq!(first, second);
        assert!(first);
    }

    #[test]
    fn test_past_slot_detection() {
        let now = at(2025, 6, 12, 10, 0);
        assert!(is_past_slot(&date("11_6_2025"), &time("11:00 PM"), now));
        assert!(is_past_slot(&date("12_6_2025"), &time("10:00 AM"), now));
        assert!(!is_past_slot(&date("12_6_2025"), &time("10:01 AM"), now));
        assert!(!is_past_slot(&date("13_6_2025"), &time("12:00 AM"), now));
    }
}
