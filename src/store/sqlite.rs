use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter, types::ToSql};

use super::Store;
use super::schema::SCHEMA;
use crate::error::{Error, Result};
use crate::types::*;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|e| {
            tracing::error!("Invalid datetime in database: '{}' - {}", s, e);
            Utc::now()
        })
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        created_at: parse_datetime(&row.get::<_, String>(3)?),
    })
}

fn row_to_page(row: &Row<'_>) -> rusqlite::Result<Page> {
    Ok(Page {
        id: row.get(0)?,
        name: row.get(1)?,
        owner_id: row.get(2)?,
        created_at: parse_datetime(&row.get::<_, String>(3)?),
    })
}

fn row_to_permission(row: &Row<'_>) -> rusqlite::Result<Option<PagePermission>> {
    let page_id: String = row.get(0)?;
    let kind: String = row.get(1)?;
    let subject_id: String = row.get(2)?;
    let can_view: bool = row.get(3)?;
    let can_edit: bool = row.get(4)?;
    Ok(Subject::from_columns(&kind, subject_id).map(|subject| PagePermission {
        page_id,
        subject,
        can_view,
        can_edit,
    }))
}

fn row_to_alarm(row: &Row<'_>) -> rusqlite::Result<Alarm> {
    Ok(Alarm {
        id: row.get(0)?,
        page_id: row.get(1)?,
        ticker: row.get(2)?,
        option: row.get(3)?,
        condition: row.get(4)?,
        strategy_id: row.get(5)?,
        strategy_name: row.get(6)?,
        created_by: row.get(7)?,
        active: row.get(8)?,
        created_at: parse_datetime(&row.get::<_, String>(9)?),
        last_triggered: row
            .get::<_, Option<String>>(10)?
            .map(|s| parse_datetime(&s)),
    })
}

const ALARM_COLUMNS: &str = "id, page_id, ticker, option, condition, strategy_id, strategy_name, \
                             created_by, active, created_at, last_triggered";

fn row_to_event(row: &Row<'_>) -> rusqlite::Result<AlarmEvent> {
    Ok(AlarmEvent {
        id: row.get(0)?,
        alarm_id: row.get(1)?,
        triggered_by: row.get(2)?,
        price: row.get(3)?,
        triggered_at: parse_datetime(&row.get::<_, String>(4)?),
    })
}

impl Store for SqliteStore {
    fn initialize(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    // User operations

    fn create_user(&self, user: &User) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO users (id, username, password_hash, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    user.id,
                    user.username,
                    user.password_hash,
                    format_datetime(&user.created_at)
                ],
            )
            .map_err(|e| {
                if is_constraint_violation(&e) {
                    Error::UsernameTaken
                } else {
                    e.into()
                }
            })?;
        Ok(())
    }

    fn get_user(&self, id: &str) -> Result<Option<User>> {
        Ok(self
            .conn()
            .query_row(
                "SELECT id, username, password_hash, created_at FROM users WHERE id = ?1",
                params![id],
                row_to_user,
            )
            .optional()?)
    }

    fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        Ok(self
            .conn()
            .query_row(
                "SELECT id, username, password_hash, created_at FROM users WHERE username = ?1",
                params![username],
                row_to_user,
            )
            .optional()?)
    }

    // Group operations

    fn create_group(&self, group: &Group, creator_id: &str) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO groups (id, name) VALUES (?1, ?2)",
            params![group.id, group.name],
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                Error::GroupNameTaken
            } else {
                e.into()
            }
        })?;
        tx.execute(
            "INSERT INTO user_groups (user_id, group_id) VALUES (?1, ?2)",
            params![creator_id, group.id],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn get_group(&self, id: &str) -> Result<Option<Group>> {
        Ok(self
            .conn()
            .query_row(
                "SELECT id, name FROM groups WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Group {
                        id: row.get(0)?,
                        name: row.get(1)?,
                    })
                },
            )
            .optional()?)
    }

    fn add_member(&self, group_id: &str, user_id: &str) -> Result<()> {
        let conn = self.conn();

        let group_exists: bool = conn
            .query_row(
                "SELECT 1 FROM groups WHERE id = ?1",
                params![group_id],
                |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false);
        if !group_exists {
            return Err(Error::NotFound("group"));
        }

        let user_exists: bool = conn
            .query_row("SELECT 1 FROM users WHERE id = ?1", params![user_id], |_| {
                Ok(true)
            })
            .optional()?
            .unwrap_or(false);
        if !user_exists {
            return Err(Error::NotFound("user"));
        }

        conn.execute(
            "INSERT INTO user_groups (user_id, group_id) VALUES (?1, ?2)",
            params![user_id, group_id],
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                Error::AlreadyMember
            } else {
                e.into()
            }
        })?;
        Ok(())
    }

    fn remove_member(&self, group_id: &str, user_id: &str) -> Result<()> {
        let changed = self.conn().execute(
            "DELETE FROM user_groups WHERE user_id = ?1 AND group_id = ?2",
            params![user_id, group_id],
        )?;
        if changed == 0 {
            return Err(Error::NotFound("membership"));
        }
        Ok(())
    }

    fn is_member(&self, group_id: &str, user_id: &str) -> Result<bool> {
        Ok(self
            .conn()
            .query_row(
                "SELECT 1 FROM user_groups WHERE user_id = ?1 AND group_id = ?2",
                params![user_id, group_id],
                |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false))
    }

    fn list_groups_of_user(&self, user_id: &str) -> Result<HashSet<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT group_id FROM user_groups WHERE user_id = ?1")?;
        let ids = stmt
            .query_map(params![user_id], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<HashSet<_>>>()?;
        Ok(ids)
    }

    // Page operations

    fn create_page(&self, page: &Page) -> Result<()> {
        self.conn().execute(
            "INSERT INTO pages (id, name, owner_id, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                page.id,
                page.name,
                page.owner_id,
                format_datetime(&page.created_at)
            ],
        )?;
        Ok(())
    }

    fn get_page(&self, id: &str) -> Result<Option<Page>> {
        Ok(self
            .conn()
            .query_row(
                "SELECT id, name, owner_id, created_at FROM pages WHERE id = ?1",
                params![id],
                row_to_page,
            )
            .optional()?)
    }

    fn list_pages_visible_to(&self, user_id: &str) -> Result<Vec<VisiblePage>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT p.id, p.name, p.owner_id, p.created_at,
                    COALESCE(MAX(pp.can_edit), 0) AS granted_edit
             FROM pages p
             LEFT JOIN page_permissions pp
                    ON pp.page_id = p.id
                   AND ((pp.subject_type = 'user' AND pp.subject_id = ?1)
                     OR (pp.subject_type = 'group' AND pp.subject_id IN
                         (SELECT group_id FROM user_groups WHERE user_id = ?1)))
             WHERE p.owner_id = ?1 OR pp.can_view = 1 OR pp.can_edit = 1
             GROUP BY p.id, p.name, p.owner_id, p.created_at
             ORDER BY p.created_at, p.id",
        )?;
        let pages = stmt
            .query_map(params![user_id], |row| {
                let page = row_to_page(row)?;
                let granted_edit: bool = row.get(4)?;
                let is_owner = page.owner_id == user_id;
                Ok(VisiblePage {
                    is_owner,
                    can_edit: is_owner || granted_edit,
                    page,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(pages)
    }

    // Permission operations

    fn upsert_permission(&self, permission: &PagePermission) -> Result<()> {
        let conn = self.conn();

        let owner_id: String = conn
            .query_row(
                "SELECT owner_id FROM pages WHERE id = ?1",
                params![permission.page_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or(Error::NotFound("page"))?;

        let subject_exists: bool = match &permission.subject {
            Subject::User(id) => {
                if *id == owner_id {
                    return Err(Error::OwnerGrant);
                }
                conn.query_row("SELECT 1 FROM users WHERE id = ?1", params![id], |_| {
                    Ok(true)
                })
                .optional()?
                .unwrap_or(false)
            }
            Subject::Group(id) => conn
                .query_row("SELECT 1 FROM groups WHERE id = ?1", params![id], |_| {
                    Ok(true)
                })
                .optional()?
                .unwrap_or(false),
        };
        if !subject_exists {
            return Err(Error::InvalidSubject);
        }

        conn.execute(
            "INSERT OR REPLACE INTO page_permissions
             (page_id, subject_type, subject_id, can_view, can_edit)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                permission.page_id,
                permission.subject.kind_str(),
                permission.subject.id(),
                permission.can_view,
                permission.can_edit
            ],
        )?;
        Ok(())
    }

    fn delete_permission(&self, page_id: &str, subject: &Subject) -> Result<bool> {
        let changed = self.conn().execute(
            "DELETE FROM page_permissions
             WHERE page_id = ?1 AND subject_type = ?2 AND subject_id = ?3",
            params![page_id, subject.kind_str(), subject.id()],
        )?;
        Ok(changed > 0)
    }

    fn list_permissions(&self, page_id: &str) -> Result<Vec<PagePermission>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT page_id, subject_type, subject_id, can_view, can_edit
             FROM page_permissions WHERE page_id = ?1",
        )?;
        let rows = stmt
            .query_map(params![page_id], row_to_permission)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows.into_iter().flatten().collect())
    }

    fn list_pages_granted_to(&self, subject: &Subject) -> Result<Vec<Page>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT p.id, p.name, p.owner_id, p.created_at
             FROM pages p
             JOIN page_permissions pp ON pp.page_id = p.id
             WHERE pp.subject_type = ?1 AND pp.subject_id = ?2",
        )?;
        let pages = stmt
            .query_map(params![subject.kind_str(), subject.id()], row_to_page)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(pages)
    }

    // Alarm operations

    fn create_alarm(&self, alarm: &Alarm) -> Result<()> {
        let conn = self.conn();

        let page_exists: bool = conn
            .query_row(
                "SELECT 1 FROM pages WHERE id = ?1",
                params![alarm.page_id],
                |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false);
        if !page_exists {
            return Err(Error::NotFound("page"));
        }

        conn.execute(
            "INSERT INTO alarms
             (id, page_id, ticker, option, condition, strategy_id, strategy_name,
              created_by, active, created_at, last_triggered)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                alarm.id,
                alarm.page_id,
                alarm.ticker,
                alarm.option,
                alarm.condition,
                alarm.strategy_id,
                alarm.strategy_name,
                alarm.created_by,
                alarm.active,
                format_datetime(&alarm.created_at),
                alarm.last_triggered.as_ref().map(format_datetime)
            ],
        )?;
        Ok(())
    }

    fn get_alarm(&self, id: &str) -> Result<Option<Alarm>> {
        Ok(self
            .conn()
            .query_row(
                &format!("SELECT {ALARM_COLUMNS} FROM alarms WHERE id = ?1"),
                params![id],
                row_to_alarm,
            )
            .optional()?)
    }

    fn update_alarm(&self, id: &str, patch: &AlarmPatch) -> Result<Option<Alarm>> {
        let conn = self.conn();

        let mut sets: Vec<&str> = Vec::new();
        let mut values: Vec<Box<dyn ToSql>> = Vec::new();
        if let Some(ticker) = &patch.ticker {
            sets.push("ticker = ?");
            values.push(Box::new(ticker.clone()));
        }
        if let Some(option) = &patch.option {
            sets.push("option = ?");
            values.push(Box::new(option.clone()));
        }
        if let Some(condition) = &patch.condition {
            sets.push("condition = ?");
            values.push(Box::new(condition.clone()));
        }
        if let Some(active) = patch.active {
            sets.push("active = ?");
            values.push(Box::new(active));
        }

        if !sets.is_empty() {
            values.push(Box::new(id.to_string()));
            let sql = format!("UPDATE alarms SET {} WHERE id = ?", sets.join(", "));
            conn.execute(
                &sql,
                params_from_iter(values.iter().map(|v| v.as_ref() as &dyn ToSql)),
            )?;
        }

        Ok(conn
            .query_row(
                &format!("SELECT {ALARM_COLUMNS} FROM alarms WHERE id = ?1"),
                params![id],
                row_to_alarm,
            )
            .optional()?)
    }

    fn delete_alarm(&self, id: &str) -> Result<Option<String>> {
        let conn = self.conn();

        let page_id: Option<String> = conn
            .query_row(
                "SELECT page_id FROM alarms WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;

        if page_id.is_some() {
            conn.execute("DELETE FROM alarms WHERE id = ?1", params![id])?;
        }
        Ok(page_id)
    }

    fn trigger_alarm(
        &self,
        id: &str,
        by_user_id: &str,
        price: Option<f64>,
    ) -> Result<Option<(Alarm, AlarmEvent)>> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let exists: bool = tx
            .query_row("SELECT 1 FROM alarms WHERE id = ?1", params![id], |_| {
                Ok(true)
            })
            .optional()?
            .unwrap_or(false);
        if !exists {
            return Ok(None);
        }

        let event = AlarmEvent {
            id: uuid::Uuid::new_v4().to_string(),
            alarm_id: id.to_string(),
            triggered_by: by_user_id.to_string(),
            price,
            triggered_at: Utc::now(),
        };

        tx.execute(
            "INSERT INTO alarm_events (id, alarm_id, triggered_by, price, triggered_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                event.id,
                event.alarm_id,
                event.triggered_by,
                event.price,
                format_datetime(&event.triggered_at)
            ],
        )?;
        tx.execute(
            "UPDATE alarms SET last_triggered = ?1 WHERE id = ?2",
            params![format_datetime(&event.triggered_at), id],
        )?;

        let alarm = tx.query_row(
            &format!("SELECT {ALARM_COLUMNS} FROM alarms WHERE id = ?1"),
            params![id],
            row_to_alarm,
        )?;

        tx.commit()?;
        Ok(Some((alarm, event)))
    }

    fn list_alarms_in_pages(&self, page_ids: &[String]) -> Result<Vec<Alarm>> {
        if page_ids.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.conn();
        let placeholders = vec!["?"; page_ids.len()].join(", ");
        let mut stmt = conn.prepare(&format!(
            "SELECT {ALARM_COLUMNS} FROM alarms WHERE page_id IN ({placeholders})
             ORDER BY created_at, id"
        ))?;
        let alarms = stmt
            .query_map(params_from_iter(page_ids.iter()), row_to_alarm)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(alarms)
    }

    fn list_alarm_events(&self, alarm_id: &str, limit: u32) -> Result<Vec<AlarmEvent>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, alarm_id, triggered_by, price, triggered_at
             FROM alarm_events WHERE alarm_id = ?1
             ORDER BY triggered_at DESC LIMIT ?2",
        )?;
        let events = stmt
            .query_map(params![alarm_id, limit], row_to_event)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(events)
    }

    fn users_with_view_access(&self, page_id: &str) -> Result<HashSet<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT owner_id FROM pages WHERE id = ?1
             UNION
             SELECT subject_id FROM page_permissions
              WHERE page_id = ?1 AND subject_type = 'user'
                AND (can_view = 1 OR can_edit = 1)
             UNION
             SELECT ug.user_id FROM user_groups ug
              JOIN page_permissions pp ON pp.subject_id = ug.group_id
              WHERE pp.page_id = ?1 AND pp.subject_type = 'group'
                AND (pp.can_view = 1 OR pp.can_edit = 1)",
        )?;
        let users = stmt
            .query_map(params![page_id], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<HashSet<_>>>()?;
        Ok(users)
    }
}
