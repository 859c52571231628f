use chrono::{DateTime, NaiveDate, Utc};
use futures::future::try_join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::calendar::{Calendar, Weekday};
use crate::error::{BookingError, Result};
use crate::models::{Occupancy, Slot, SlotKey, MAX_CAPACITY};
use crate::slot_time::SlotTime;
use crate::store::BookingStore;

/// A slot as seen by the booking rules: either a stored template or the
/// timetable default for a key nobody has configured yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSlot {
    pub slot: Slot,
    pub configured: bool,
}

/// One row of the weekly schedule.
#[derive(Debug, Clone, Serialize)]
pub struct SlotView {
    pub weekday: Weekday,
    pub time: SlotTime,
    pub date: NaiveDate,
    pub capacity: u32,
    pub available: bool,
    pub configured: bool,
    pub passed: bool,
    pub occupancy: Occupancy,
}

#[derive(Clone)]
pub struct SlotDirectory {
    store: Arc<dyn BookingStore>,
    timetable: Arc<Vec<SlotTime>>,
    default_capacity: u32,
}

impl SlotDirectory {
    pub fn new(store: Arc<dyn BookingStore>, timetable: Vec<SlotTime>, default_capacity: u32) -> Self {
        Self {
            store,
            timetable: Arc::new(timetable),
            default_capacity,
        }
    }

    pub async fn get_slot(&self, weekday: Weekday, time: SlotTime) -> Result<Option<Slot>> {
        self.store.get_slot(SlotKey::new(weekday, time)).await
    }

    /// `None` when the key is neither configured nor on the timetable.
    pub async fn resolve(&self, key: SlotKey) -> Result<Option<ResolvedSlot>> {
        if let Some(slot) = self.store.get_slot(key).await? {
            return Ok(Some(ResolvedSlot { slot, configured: true }));
        }
        Ok(self.timetable.contains(&key.time).then(|| ResolvedSlot {
            slot: Slot::with_defaults(key, self.default_capacity),
            configured: false,
        }))
    }

    /// Persists a timetable default the first time it is booked. A template
    /// written in the meantime wins over the default and is returned instead.
    pub async fn materialize(&self, resolved: &ResolvedSlot) -> Result<Slot> {
        if resolved.configured {
            return Ok(resolved.slot.clone());
        }
        let stored = self.store.insert_slot_if_absent(resolved.slot.clone()).await?;
        if stored == resolved.slot {
            tracing::info!("Created slot template {} on first booking", stored.key());
        } else {
            tracing::debug!("Slot {} was configured concurrently, using the stored template", stored.key());
        }
        Ok(stored)
    }

    pub async fn upsert_slot(
        &self,
        weekday: Weekday,
        time: SlotTime,
        capacity: i64,
        available: bool,
    ) -> std::result::Result<Slot, BookingError> {
        if capacity < 1 || capacity > MAX_CAPACITY as i64 {
            return Err(BookingError::InvalidCapacity(capacity));
        }
        let slot = Slot {
            weekday,
            time,
            capacity: capacity as u32,
            available,
        };
        let stored = self.store.upsert_slot(slot).await?;
        tracing::info!(
            "Slot {} set to capacity {} (available: {})",
            stored.key(),
            stored.capacity,
            stored.available
        );
        Ok(stored)
    }

    pub async fn occupancy(&self, slot: &Slot, date: NaiveDate) -> Result<Occupancy> {
        let current = self.store.count_reservations(slot.key(), date).await?;
        Ok(Occupancy::new(current, slot.capacity))
    }

    /// Every slot of the coming Monday..Saturday, each at its next
    /// occurrence, with live occupancy.
    pub async fn week(&self, calendar: &Calendar, now: DateTime<Utc>) -> Result<Vec<SlotView>> {
        let mut templates: BTreeMap<SlotKey, ResolvedSlot> = BTreeMap::new();
        for weekday in Weekday::ALL {
            for time in self.timetable.iter() {
                let key = SlotKey::new(weekday, *time);
                templates.insert(
                    key,
                    ResolvedSlot {
                        slot: Slot::with_defaults(key, self.default_capacity),
                        configured: false,
                    },
                );
            }
        }
        for slot in self.store.list_slots().await? {
            templates.insert(slot.key(), ResolvedSlot { slot, configured: true });
        }

        let mut views = try_join_all(templates.into_values().map(|resolved| async move {
            let date = calendar.date_for_weekday(resolved.slot.weekday, now);
            let occupancy = self.occupancy(&resolved.slot, date).await?;
            Ok::<_, crate::error::AppError>(SlotView {
                weekday: resolved.slot.weekday,
                time: resolved.slot.time,
                date,
                capacity: resolved.slot.capacity,
                available: resolved.slot.available,
                configured: resolved.configured,
                passed: calendar.instant_of(date, resolved.slot.time) <= now,
                occupancy,
            })
        }))
        .await?;

        views.sort_by_key(|view| (view.date, view.time));
        Ok(views)
    }
}
