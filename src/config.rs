use chrono::Duration;
use chrono_tz::Tz;
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{AppError, Result};
use crate::models::{DEFAULT_CAPACITY, MAX_CAPACITY};
use crate::slot_time::SlotTime;

const DEFAULT_SLOT_TIMES: &str =
    "7:00 AM,8:00 AM,9:30 AM,12:00 PM,5:00 PM,6:00 PM,7:00 PM,8:00 PM";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Scylla,
    Memory,
}

/// Knobs of the booking rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookingPolicy {
    /// Self-service bookings may target today .. today + this many days.
    pub advance_days: i64,
    /// Cancelling closer to class start than this is refused.
    pub cancellation_cutoff: Duration,
}

impl Default for BookingPolicy {
    fn default() -> Self {
        Self {
            advance_days: 1,
            cancellation_cutoff: Duration::hours(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub bind_addr: String,
    pub storage: StorageKind,
    pub scylla_nodes: Vec<String>,
    pub scylla_credentials: Option<(String, String)>,
    pub keyspace: String,
    pub replication_factor: u32,
    pub schema_path: PathBuf,
    pub time_zone: Tz,
    pub default_capacity: u32,
    pub slot_times: Vec<SlotTime>,
    pub policy: BookingPolicy,
}

impl Settings {
    /// Reads `.env` (if present) and then the process environment.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_vars(&std::env::vars().collect())
    }

    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self> {
        let get = |key: &str| vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());

        let storage = match get("STORAGE").unwrap_or("scylla").to_lowercase().as_str() {
            "scylla" => StorageKind::Scylla,
            "memory" => StorageKind::Memory,
            other => return Err(AppError::Config(format!("STORAGE must be scylla or memory, got {}", other))),
        };

        let scylla_credentials = match (get("SCYLLA_USER"), get("SCYLLA_PASSWORD")) {
            (Some(user), Some(password)) => Some((user.to_string(), password.to_string())),
            (None, None) => None,
            _ => return Err(AppError::Config("SCYLLA_USER and SCYLLA_PASSWORD go together".into())),
        };

        let time_zone = Tz::from_str(get("GYM_TIMEZONE").unwrap_or("Europe/Madrid"))
            .map_err(|e| AppError::Config(format!("GYM_TIMEZONE: {}", e)))?;

        let default_capacity: u32 = parse_number(get("DEFAULT_SLOT_CAPACITY"), DEFAULT_CAPACITY, "DEFAULT_SLOT_CAPACITY")?;
        if default_capacity == 0 || default_capacity > MAX_CAPACITY {
            return Err(AppError::Config(format!(
                "DEFAULT_SLOT_CAPACITY must be within 1..={}",
                MAX_CAPACITY
            )));
        }

        let mut slot_times = get("SLOT_TIMES")
            .unwrap_or(DEFAULT_SLOT_TIMES)
            .split(',')
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .map(|raw| SlotTime::parse(raw).map_err(|e| AppError::Config(format!("SLOT_TIMES: {}", e))))
            .collect::<Result<Vec<_>>>()?;
        slot_times.sort();
        slot_times.dedup();

        let advance_days: i64 = parse_number(get("ADVANCE_BOOKING_DAYS"), 1, "ADVANCE_BOOKING_DAYS")?;
        let cutoff_minutes: i64 = parse_number(get("CANCELLATION_CUTOFF_MINUTES"), 60, "CANCELLATION_CUTOFF_MINUTES")?;
        if advance_days < 0 || cutoff_minutes < 0 {
            return Err(AppError::Config("booking policy values cannot be negative".into()));
        }

        Ok(Self {
            bind_addr: get("BIND_ADDR").unwrap_or("127.0.0.1:1227").to_string(),
            storage,
            scylla_nodes: get("SCYLLA_NODES")
                .unwrap_or("127.0.0.1:9042")
                .split(',')
                .map(|node| node.trim().to_string())
                .filter(|node| !node.is_empty())
                .collect(),
            scylla_credentials,
            keyspace: get("SCYLLA_KEYSPACE").unwrap_or("gym").to_string(),
            replication_factor: parse_number(get("SCYLLA_REPLICATION_FACTOR"), 1, "SCYLLA_REPLICATION_FACTOR")?,
            schema_path: PathBuf::from(get("SCHEMA_PATH").unwrap_or("schema")),
            time_zone,
            default_capacity,
            slot_times,
            policy: BookingPolicy {
                advance_days,
                cancellation_cutoff: Duration::minutes(cutoff_minutes),
            },
        })
    }
}

fn parse_number<T: FromStr>(raw: Option<&str>, default: T, key: &str) -> Result<T> {
    match raw {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| AppError::Config(format!("{} must be a number, got {}", key, raw))),
    }
}
