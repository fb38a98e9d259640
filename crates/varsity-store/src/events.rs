//! CRUD operations for [`CalendarEvent`] records.

use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, types::Value};
use uuid::Uuid;

use varsity_shared::EventType;

use crate::convert;
use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{CalendarEvent, NewCalendarEvent, Owner};

const EVENT_COLUMNS: &str = "e.id, e.title, e.description, e.event_type, e.start_date, \
     e.end_date, e.is_active, e.created_at, e.updated_at, u.id, u.name, u.email, u.role";

const EVENT_FROM: &str = "FROM events e JOIN users u ON u.id = e.owner_id";

impl Database {
    /// Insert a new calendar event and return the stored record.
    pub fn create_event(&self, new: &NewCalendarEvent) -> Result<CalendarEvent> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        self.conn().execute(
            "INSERT INTO events (id, title, description, event_type, start_date, end_date,
                                 owner_id, is_active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8, ?8)",
            params![
                id.to_string(),
                new.title,
                new.description,
                new.event_type.as_str(),
                new.start_date.to_rfc3339(),
                new.end_date.to_rfc3339(),
                new.owner_id.to_string(),
                now.to_rfc3339(),
            ],
        )?;

        self.get_event(id)
    }

    /// Fetch a single event by UUID.
    pub fn get_event(&self, id: Uuid) -> Result<CalendarEvent> {
        self.conn()
            .query_row(
                &format!("SELECT {EVENT_COLUMNS} {EVENT_FROM} WHERE e.id = ?1"),
                params![id.to_string()],
                row_to_event,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// List active events ordered by start date, optionally filtered by kind
    /// and date window. When both bounds are given, an event qualifies by
    /// starting after `from` or ending before `to`.
    pub fn list_active_events(
        &self,
        event_type: Option<EventType>,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<CalendarEvent>> {
        let mut clauses = vec!["e.is_active = 1".to_string()];
        let mut values: Vec<Value> = Vec::new();

        if let Some(event_type) = event_type {
            values.push(Value::from(event_type.as_str().to_string()));
            clauses.push(format!("e.event_type = ?{}", values.len()));
        }

        match (from, to) {
            (Some(from), Some(to)) => {
                values.push(Value::from(from.to_rfc3339()));
                let from_idx = values.len();
                values.push(Value::from(to.to_rfc3339()));
                clauses.push(format!(
                    "(e.start_date >= ?{from_idx} OR e.end_date <= ?{})",
                    values.len()
                ));
            }
            (Some(from), None) => {
                values.push(Value::from(from.to_rfc3339()));
                clauses.push(format!("e.start_date >= ?{}", values.len()));
            }
            (None, Some(to)) => {
                values.push(Value::from(to.to_rfc3339()));
                clauses.push(format!("e.end_date <= ?{}", values.len()));
            }
            (None, None) => {}
        }

        let sql = format!(
            "SELECT {EVENT_COLUMNS} {EVENT_FROM}
             WHERE {}
             ORDER BY e.start_date ASC",
            clauses.join(" AND ")
        );

        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), row_to_event)?;

        let mut events = Vec::new();
        for row in rows {
            events.push(row?);
        }
        Ok(events)
    }

    /// Persist the mutable fields of an already-fetched event.
    pub fn update_event(&self, event: &CalendarEvent) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE events
             SET title = ?2, description = ?3, event_type = ?4, start_date = ?5,
                 end_date = ?6, updated_at = ?7
             WHERE id = ?1",
            params![
                event.id.to_string(),
                event.title,
                event.description,
                event.event_type.as_str(),
                event.start_date.to_rfc3339(),
                event.end_date.to_rfc3339(),
                Utc::now().to_rfc3339(),
            ],
        )?;

        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Delete an event row. Returns `true` if a row was deleted.
    pub fn delete_event(&self, id: Uuid) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM events WHERE id = ?1", params![id.to_string()])?;
        Ok(affected > 0)
    }
}

/// Map a joined `rusqlite::Row` to a [`CalendarEvent`].
fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<CalendarEvent> {
    let id_str: String = row.get(0)?;
    let title: String = row.get(1)?;
    let description: String = row.get(2)?;
    let event_type_str: String = row.get(3)?;
    let start_str: String = row.get(4)?;
    let end_str: String = row.get(5)?;
    let is_active_int: i32 = row.get(6)?;
    let created_str: String = row.get(7)?;
    let updated_str: String = row.get(8)?;
    let owner_id_str: String = row.get(9)?;
    let owner_name: String = row.get(10)?;
    let owner_email: String = row.get(11)?;
    let owner_role_str: String = row.get(12)?;

    Ok(CalendarEvent {
        id: convert::uuid_col(0, &id_str)?,
        title,
        description,
        event_type: convert::enum_col(3, &event_type_str)?,
        start_date: convert::timestamp_col(4, &start_str)?,
        end_date: convert::timestamp_col(5, &end_str)?,
        owner: Owner {
            id: convert::uuid_col(9, &owner_id_str)?,
            name: owner_name,
            email: owner_email,
            role: convert::enum_col(12, &owner_role_str)?,
        },
        is_active: is_active_int != 0,
        created_at: convert::timestamp_col(7, &created_str)?,
        updated_at: convert::timestamp_col(8, &updated_str)?,
    })
}
