//! Weekday vocabulary, the injectable clock, and the mapping from a recurring
//! weekday to the concrete calendar date it refers to.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, RwLock};

use crate::error::BookingError;
use crate::slot_time::SlotTime;

/// Bookable days of the week. Sunday is never bookable and has no variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locale {
    En,
    Es,
}

// (weekday, english, spanish, spanish without accents)
const WEEKDAY_NAMES: [(Weekday, &str, &str, &str); 6] = [
    (Weekday::Monday, "Monday", "Lunes", "lunes"),
    (Weekday::Tuesday, "Tuesday", "Martes", "martes"),
    (Weekday::Wednesday, "Wednesday", "Miércoles", "miercoles"),
    (Weekday::Thursday, "Thursday", "Jueves", "jueves"),
    (Weekday::Friday, "Friday", "Viernes", "viernes"),
    (Weekday::Saturday, "Saturday", "Sábado", "sabado"),
];

impl Weekday {
    pub const ALL: [Weekday; 6] = [
        Weekday::Monday,
        Weekday::Tuesday,
        Weekday::Wednesday,
        Weekday::Thursday,
        Weekday::Friday,
        Weekday::Saturday,
    ];

    /// Monday = 1 .. Saturday = 6.
    pub fn number(self) -> u32 {
        self.to_chrono().number_from_monday()
    }

    pub fn from_number(n: u32) -> Option<Weekday> {
        Weekday::ALL.get(n.checked_sub(1)? as usize).copied()
    }

    pub fn to_chrono(self) -> chrono::Weekday {
        match self {
            Weekday::Monday => chrono::Weekday::Mon,
            Weekday::Tuesday => chrono::Weekday::Tue,
            Weekday::Wednesday => chrono::Weekday::Wed,
            Weekday::Thursday => chrono::Weekday::Thu,
            Weekday::Friday => chrono::Weekday::Fri,
            Weekday::Saturday => chrono::Weekday::Sat,
        }
    }

    /// `None` for Sunday.
    pub fn from_chrono(day: chrono::Weekday) -> Option<Weekday> {
        Weekday::from_number(day.number_from_monday())
    }

    /// Accepts English or Spanish names in any case, with or without accents.
    pub fn from_name(name: &str) -> Result<Weekday, BookingError> {
        let wanted = name.trim().to_lowercase();
        WEEKDAY_NAMES
            .iter()
            .find(|(_, en, es, plain)| {
                wanted == en.to_lowercase() || wanted == es.to_lowercase() || wanted == *plain
            })
            .map(|(day, ..)| *day)
            .ok_or_else(|| BookingError::InvalidWeekday(name.to_string()))
    }

    pub fn name(self, locale: Locale) -> &'static str {
        let (_, en, es, _) = WEEKDAY_NAMES[(self.number() - 1) as usize];
        match locale {
            Locale::En => en,
            Locale::Es => es,
        }
    }
}

impl fmt::Display for Weekday {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name(Locale::En))
    }
}

/// Nearest date on or after `reference` that falls on `weekday`.
/// From a Sunday every target lands in the following week.
pub fn date_for_weekday(weekday: Weekday, reference: NaiveDate) -> NaiveDate {
    let target = weekday.to_chrono().num_days_from_monday() as i64;
    let today = reference.weekday().num_days_from_monday() as i64;
    reference + Duration::days((target - today).rem_euclid(7))
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock frozen at a settable instant.
#[derive(Debug, Clone)]
pub struct FixedClock {
    now: Arc<RwLock<DateTime<Utc>>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(RwLock::new(now)),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        match self.now.write() {
            Ok(mut guard) => *guard = now,
            Err(poisoned) => *poisoned.into_inner() = now,
        }
    }

    pub fn advance(&self, by: Duration) {
        let now = self.now();
        self.set(now + by);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Translates between instants and the gym's local calendar.
#[derive(Debug, Clone, Copy)]
pub struct Calendar {
    tz: Tz,
}

impl Calendar {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    pub fn time_zone(&self) -> Tz {
        self.tz
    }

    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.tz).date_naive()
    }

    pub fn date_for_weekday(&self, weekday: Weekday, now: DateTime<Utc>) -> NaiveDate {
        date_for_weekday(weekday, self.today(now))
    }

    /// Start instant of a class held at local `time` on `date`. A time that
    /// falls into a DST gap resolves to the first valid instant after it.
    pub fn instant_of(&self, date: NaiveDate, time: SlotTime) -> DateTime<Utc> {
        let local = date.and_time(time.to_naive());
        let mut probe = local;
        for _ in 0..4 {
            if let Some(instant) = self.tz.from_local_datetime(&probe).earliest() {
                return instant.with_timezone(&Utc);
            }
            probe = probe + Duration::minutes(30);
        }
        Utc.from_utc_datetime(&local)
    }
}
