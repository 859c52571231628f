use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use scylla::client::session::Session;
use scylla::client::session_builder::SessionBuilder;
use scylla::response::query_result::QueryResult;
use scylla::statement::batch::{Batch, BatchType};
use scylla::value::Row;
use std::sync::Arc;
use uuid::Uuid;

use crate::calendar::Weekday;
use crate::error::{AppError, Result, TraceErr};
use crate::models::{Claim, Member, Reservation, ReservationSource, Slot, SlotKey};
use crate::seat_ledger::{self, SeatLedger};
use crate::slot_time::SlotTime;
use crate::store::BookingStore;

/// Compare-and-set attempts on one occupancy row before giving up.
const MAX_LWT_ATTEMPTS: usize = 16;

type ReservationRow = (Uuid, Uuid, i32, String, NaiveDate, DateTime<Utc>, String);
type MemberRow = (Uuid, String, String, Option<DateTime<Utc>>, bool, DateTime<Utc>);

const RESERVATION_COLUMNS: &str =
    "reservation_id, member_id, weekday, slot_time, day, created_ts, source";

#[derive(Debug, Clone)]
pub struct ScyllaConnector {
    session: Arc<Session>,
    keyspace: String,
    slot_cache: Arc<DashMap<SlotKey, Slot>>,
}

impl ScyllaConnector {
    pub async fn new(
        nodes: &[String],
        keyspace: &str,
        credentials: Option<(String, String)>,
    ) -> Result<Self> {
        let mut builder = SessionBuilder::new().known_nodes(nodes);
        if let Some((user, password)) = credentials {
            builder = builder.user(user, password);
        }
        let session = builder.build().await.trace_err("connecting to scylla")?;
        tracing::info!("Connected to Scylla at {:?}", nodes);
        Ok(Self {
            session: Arc::new(session),
            keyspace: keyspace.to_string(),
            slot_cache: Arc::new(DashMap::new()),
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    fn table(&self, name: &str) -> String {
        format!("{}.{}", self.keyspace, name)
    }

    async fn current_occupancy(&self, key: SlotKey, date: NaiveDate) -> Result<Option<i32>> {
        let row = self
            .session
            .query_unpaged(
                format!(
                    "SELECT current FROM {} WHERE weekday = ? AND slot_time = ? AND day = ?",
                    self.table("slot_occupancy")
                ),
                (key.weekday.number() as i32, key.time.to_string(), date),
            )
            .await?
            .into_rows_result()?
            .maybe_first_row::<(i32,)>()?;
        Ok(row.map(|(current,)| current))
    }

    /// Reads a template straight from the table and refreshes the cache.
    async fn fetch_slot(&self, key: SlotKey) -> Result<Option<Slot>> {
        let row = self
            .session
            .query_unpaged(
                format!(
                    "SELECT capacity, available FROM {} WHERE weekday = ? AND slot_time = ?",
                    self.table("slot_template")
                ),
                (key.weekday.number() as i32, key.time.to_string()),
            )
            .await?
            .into_rows_result()?
            .maybe_first_row::<(i32, bool)>()?;

        Ok(row.map(|(capacity, available)| {
            let slot = Slot {
                weekday: key.weekday,
                time: key.time,
                capacity: capacity.max(0) as u32,
                available,
            };
            self.slot_cache.insert(key, slot.clone());
            slot
        }))
    }

    fn logged_batch(statements: &[String]) -> Batch {
        let mut batch = Batch::new(BatchType::Logged);
        for cql in statements {
            batch.append_statement(cql.as_str());
        }
        batch
    }

    async fn query_reservations(
        &self,
        cql: String,
        values: impl scylla::serialize::row::SerializeRow,
    ) -> Result<Vec<Reservation>> {
        let rows = self
            .session
            .query_unpaged(cql, values)
            .await?
            .into_rows_result()?;
        let mut reservations = Vec::new();
        for row in rows.rows::<ReservationRow>()? {
            reservations.push(reservation_from_row(row?)?);
        }
        reservations.sort_by(|a, b| {
            (a.date, a.time, a.created_at).cmp(&(b.date, b.time, b.created_at))
        });
        Ok(reservations)
    }
}

fn lwt_applied(result: QueryResult) -> Result<bool> {
    let row = result.into_rows_result()?.first_row::<Row>()?;
    Ok(row
        .columns
        .first()
        .and_then(|column| column.as_ref())
        .and_then(|value| value.as_boolean())
        .unwrap_or(false))
}

fn slot_key_from_row(weekday: i32, slot_time: &str) -> Result<SlotKey> {
    let weekday = u32::try_from(weekday)
        .ok()
        .and_then(Weekday::from_number)
        .ok_or_else(|| AppError::Internal(format!("Invalid weekday {} in DB", weekday)))?;
    let time = SlotTime::parse(slot_time)
        .map_err(|_| AppError::Internal(format!("Invalid slot_time {} in DB", slot_time)))?;
    Ok(SlotKey::new(weekday, time))
}

fn reservation_from_row(row: ReservationRow) -> Result<Reservation> {
    let (id, member_id, weekday, slot_time, date, created_at, source) = row;
    let key = slot_key_from_row(weekday, &slot_time)?;
    let source = ReservationSource::from_db(&source)
        .ok_or_else(|| AppError::Internal(format!("Invalid source {} in DB", source)))?;
    Ok(Reservation {
        id,
        member_id,
        weekday: key.weekday,
        time: key.time,
        date,
        created_at,
        source,
    })
}

fn member_from_row(row: MemberRow) -> Member {
    let (id, name, email, subscription_expires_at, approved, created_at) = row;
    Member {
        id,
        name,
        email,
        subscription_expires_at,
        approved,
        created_at,
    }
}

#[async_trait]
impl BookingStore for ScyllaConnector {
    async fn get_slot(&self, key: SlotKey) -> Result<Option<Slot>> {
        if let Some(slot) = self.slot_cache.get(&key) {
            return Ok(Some(slot.clone()));
        }
        self.fetch_slot(key).await
    }

    async fn upsert_slot(&self, slot: Slot) -> Result<Slot> {
        self.session
            .query_unpaged(
                format!(
                    "INSERT INTO {} (weekday, slot_time, capacity, available) VALUES (?, ?, ?, ?)",
                    self.table("slot_template")
                ),
                (
                    slot.weekday.number() as i32,
                    slot.time.to_string(),
                    slot.capacity as i32,
                    slot.available,
                ),
            )
            .await
            .trace_err("upserting slot template")?;
        self.slot_cache.insert(slot.key(), slot.clone());
        Ok(slot)
    }

    async fn insert_slot_if_absent(&self, slot: Slot) -> Result<Slot> {
        let result = self
            .session
            .query_unpaged(
                format!(
                    "INSERT INTO {} (weekday, slot_time, capacity, available) VALUES (?, ?, ?, ?) IF NOT EXISTS",
                    self.table("slot_template")
                ),
                (
                    slot.weekday.number() as i32,
                    slot.time.to_string(),
                    slot.capacity as i32,
                    slot.available,
                ),
            )
            .await
            .trace_err("creating slot template")?;
        if lwt_applied(result)? {
            self.slot_cache.insert(slot.key(), slot.clone());
            return Ok(slot);
        }

        self.slot_cache.remove(&slot.key());
        self.fetch_slot(slot.key()).await?.ok_or_else(|| {
            AppError::Internal(format!("Slot template {} vanished after insert", slot.key()))
        })
    }

    async fn list_slots(&self) -> Result<Vec<Slot>> {
        let rows = self
            .session
            .query_unpaged(
                format!(
                    "SELECT weekday, slot_time, capacity, available FROM {}",
                    self.table("slot_template")
                ),
                &[],
            )
            .await?
            .into_rows_result()?;

        let mut slots = Vec::new();
        for row in rows.rows::<(i32, String, i32, bool)>()? {
            let (weekday, slot_time, capacity, available) = row?;
            let key = slot_key_from_row(weekday, &slot_time)?;
            let slot = Slot {
                weekday: key.weekday,
                time: key.time,
                capacity: capacity.max(0) as u32,
                available,
            };
            self.slot_cache.insert(key, slot.clone());
            slots.push(slot);
        }
        slots.sort_by_key(|slot| slot.key());
        Ok(slots)
    }

    async fn insert_member(&self, member: &Member) -> Result<bool> {
        let email = member.email.to_lowercase();
        let result = self
            .session
            .query_unpaged(
                format!(
                    "INSERT INTO {} (email, member_id) VALUES (?, ?) IF NOT EXISTS",
                    self.table("member_by_email")
                ),
                (&email, member.id),
            )
            .await?;
        if !lwt_applied(result)? {
            return Ok(false);
        }

        self.session
            .query_unpaged(
                format!(
                    "INSERT INTO {} (member_id, name, email, subscription_expires_at, approved, created_ts) \
                     VALUES (?, ?, ?, ?, ?, ?)",
                    self.table("member")
                ),
                (
                    member.id,
                    &member.name,
                    &member.email,
                    member.subscription_expires_at,
                    member.approved,
                    member.created_at,
                ),
            )
            .await
            .trace_err("inserting member")?;
        Ok(true)
    }

    async fn get_member(&self, member_id: Uuid) -> Result<Option<Member>> {
        let row = self
            .session
            .query_unpaged(
                format!(
                    "SELECT member_id, name, email, subscription_expires_at, approved, created_ts \
                     FROM {} WHERE member_id = ?",
                    self.table("member")
                ),
                (member_id,),
            )
            .await?
            .into_rows_result()?
            .maybe_first_row::<MemberRow>()?;
        Ok(row.map(member_from_row))
    }

    async fn set_member_approval(&self, member_id: Uuid, approved: bool) -> Result<bool> {
        let result = self
            .session
            .query_unpaged(
                format!(
                    "UPDATE {} SET approved = ? WHERE member_id = ? IF EXISTS",
                    self.table("member")
                ),
                (approved, member_id),
            )
            .await?;
        lwt_applied(result)
    }

    async fn delete_member(&self, member_id: Uuid) -> Result<bool> {
        let Some(member) = self.get_member(member_id).await? else {
            return Ok(false);
        };
        self.session
            .query_unpaged(
                format!("DELETE FROM {} WHERE member_id = ?", self.table("member")),
                (member_id,),
            )
            .await?;
        self.session
            .query_unpaged(
                format!("DELETE FROM {} WHERE email = ?", self.table("member_by_email")),
                (member.email.to_lowercase(),),
            )
            .await?;
        Ok(true)
    }

    async fn get_reservation(&self, reservation_id: Uuid) -> Result<Option<Reservation>> {
        let row = self
            .session
            .query_unpaged(
                format!(
                    "SELECT {} FROM {} WHERE reservation_id = ?",
                    RESERVATION_COLUMNS,
                    self.table("reservation")
                ),
                (reservation_id,),
            )
            .await?
            .into_rows_result()?
            .maybe_first_row::<ReservationRow>()?;
        row.map(reservation_from_row).transpose()
    }

    async fn member_reservations(
        &self,
        member_id: Uuid,
        date: Option<NaiveDate>,
    ) -> Result<Vec<Reservation>> {
        let table = self.table("reservation_by_member");
        match date {
            Some(date) => {
                self.query_reservations(
                    format!(
                        "SELECT {} FROM {} WHERE member_id = ? AND day = ?",
                        RESERVATION_COLUMNS, table
                    ),
                    (member_id, date),
                )
                .await
            }
            None => {
                self.query_reservations(
                    format!("SELECT {} FROM {} WHERE member_id = ?", RESERVATION_COLUMNS, table),
                    (member_id,),
                )
                .await
            }
        }
    }

    async fn reservations_on(&self, date: NaiveDate) -> Result<Vec<Reservation>> {
        self.query_reservations(
            format!(
                "SELECT {} FROM {} WHERE day = ?",
                RESERVATION_COLUMNS,
                self.table("reservation_by_day")
            ),
            (date,),
        )
        .await
    }

    async fn count_reservations(&self, key: SlotKey, date: NaiveDate) -> Result<u32> {
        Ok(self.current_occupancy(key, date).await?.unwrap_or(0).max(0) as u32)
    }

    async fn claim_seat(
        &self,
        reservation: &Reservation,
        capacity: u32,
        exclusive_day: bool,
    ) -> Result<Claim> {
        seat_ledger::claim(self, reservation, capacity, exclusive_day).await
    }

    async fn release_seat(&self, reservation: &Reservation) -> Result<bool> {
        seat_ledger::release(self, reservation).await
    }
}

#[async_trait]
impl SeatLedger for ScyllaConnector {
    async fn claim_day(&self, reservation: &Reservation) -> Result<bool> {
        let result = self
            .session
            .query_unpaged(
                format!(
                    "INSERT INTO {} (member_id, day, reservation_id) VALUES (?, ?, ?) IF NOT EXISTS",
                    self.table("member_day_claim")
                ),
                (reservation.member_id, reservation.date, reservation.id),
            )
            .await?;
        lwt_applied(result)
    }

    async fn release_day(&self, reservation: &Reservation) -> Result<()> {
        self.session
            .query_unpaged(
                format!(
                    "DELETE FROM {} WHERE member_id = ? AND day = ? IF reservation_id = ?",
                    self.table("member_day_claim")
                ),
                (reservation.member_id, reservation.date, reservation.id),
            )
            .await?;
        Ok(())
    }

    async fn holds_other_on_day(&self, reservation: &Reservation) -> Result<bool> {
        let rows = self
            .session
            .query_unpaged(
                format!(
                    "SELECT reservation_id FROM {} WHERE member_id = ? AND day = ?",
                    self.table("reservation_by_member")
                ),
                (reservation.member_id, reservation.date),
            )
            .await?
            .into_rows_result()?;
        for row in rows.rows::<(Uuid,)>()? {
            let (reservation_id,) = row?;
            if reservation_id != reservation.id {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Compare-and-set on the occupancy row, retried while other writers
    /// win the race.
    async fn shift_occupancy(
        &self,
        key: SlotKey,
        date: NaiveDate,
        delta: i32,
        limit: Option<u32>,
    ) -> Result<Option<u32>> {
        let weekday = key.weekday.number() as i32;
        let slot_time = key.time.to_string();

        for _ in 0..MAX_LWT_ATTEMPTS {
            let current = self.current_occupancy(key, date).await?;
            let next = (current.unwrap_or(0) + delta).max(0);
            if let Some(limit) = limit {
                if next as u32 > limit {
                    return Ok(None);
                }
            }

            let result = match current {
                None => {
                    self.session
                        .query_unpaged(
                            format!(
                                "INSERT INTO {} (weekday, slot_time, day, current) VALUES (?, ?, ?, ?) IF NOT EXISTS",
                                self.table("slot_occupancy")
                            ),
                            (weekday, &slot_time, date, next),
                        )
                        .await?
                }
                Some(seen) => {
                    self.session
                        .query_unpaged(
                            format!(
                                "UPDATE {} SET current = ? WHERE weekday = ? AND slot_time = ? AND day = ? IF current = ?",
                                self.table("slot_occupancy")
                            ),
                            (next, weekday, &slot_time, date, seen),
                        )
                        .await?
                }
            };

            if lwt_applied(result)? {
                return Ok(Some(next as u32));
            }
            tracing::debug!("Occupancy of {} on {} moved underneath us, retrying", key, date);
        }

        Err(AppError::Contention(format!("{} on {}", key, date)))
    }

    async fn write_rows(&self, reservation: &Reservation) -> Result<()> {
        let values = (
            reservation.id,
            reservation.member_id,
            reservation.weekday.number() as i32,
            reservation.time.to_string(),
            reservation.date,
            reservation.created_at,
            reservation.source.as_str(),
        );
        let statements = ["reservation", "reservation_by_day", "reservation_by_member"].map(|table| {
            format!(
                "INSERT INTO {} ({}) VALUES (?, ?, ?, ?, ?, ?, ?)",
                self.table(table),
                RESERVATION_COLUMNS
            )
        });
        self.session
            .batch(
                &Self::logged_batch(&statements),
                (values.clone(), values.clone(), values),
            )
            .await
            .trace_err("writing reservation rows")?;
        Ok(())
    }

    async fn delete_index_rows(&self, reservation: &Reservation) -> Result<()> {
        let statements = [
            format!(
                "DELETE FROM {} WHERE day = ? AND slot_time = ? AND reservation_id = ?",
                self.table("reservation_by_day")
            ),
            format!(
                "DELETE FROM {} WHERE member_id = ? AND day = ? AND reservation_id = ?",
                self.table("reservation_by_member")
            ),
        ];
        self.session
            .batch(
                &Self::logged_batch(&statements),
                (
                    (reservation.date, reservation.time.to_string(), reservation.id),
                    (reservation.member_id, reservation.date, reservation.id),
                ),
            )
            .await
            .trace_err("deleting reservation lookup rows")?;
        Ok(())
    }

    async fn remove_primary(&self, reservation: &Reservation) -> Result<bool> {
        let result = self
            .session
            .query_unpaged(
                format!(
                    "DELETE FROM {} WHERE reservation_id = ? IF EXISTS",
                    self.table("reservation")
                ),
                (reservation.id,),
            )
            .await?;
        lwt_applied(result)
    }
}
