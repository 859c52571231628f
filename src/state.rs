use std::sync::Arc;
use uuid::Uuid;

use crate::booking::BookingEngine;
use crate::calendar::{Calendar, Clock, SystemClock};
use crate::config::{BookingPolicy, Settings};
use crate::manager::ManagerConsole;
use crate::members::MemberRegistry;
use crate::slot_time::SlotTime;
use crate::slots::SlotDirectory;
use crate::store::BookingStore;

#[derive(Clone)]
pub struct StoreStateManager {
    pub store: Arc<dyn BookingStore>,
    pub bookings: BookingEngine,
    pub members: MemberRegistry,
}

impl StoreStateManager {
    pub fn new(
        store: Arc<dyn BookingStore>,
        clock: Arc<dyn Clock>,
        calendar: Calendar,
        timetable: Vec<SlotTime>,
        default_capacity: u32,
        policy: BookingPolicy,
    ) -> Self {
        let slots = SlotDirectory::new(store.clone(), timetable, default_capacity);
        let bookings = BookingEngine::new(store.clone(), slots, clock.clone(), calendar, policy);
        let members = MemberRegistry::new(store.clone(), clock);
        Self {
            store,
            bookings,
            members,
        }
    }

    pub fn from_settings(store: Arc<dyn BookingStore>, settings: &Settings) -> Self {
        Self::new(
            store,
            Arc::new(SystemClock),
            Calendar::new(settings.time_zone),
            settings.slot_times.clone(),
            settings.default_capacity,
            settings.policy,
        )
    }

    pub fn console(&self, manager_id: Uuid) -> ManagerConsole {
        ManagerConsole::new(self.bookings.clone(), self.store.clone(), manager_id)
    }
}
