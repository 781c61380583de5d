//! SQLite store for desk records
//!
//! The database sits in `.circulation/desk.db` and is the source of truth
//! for people, items, policies, loans, returns and notices. One connection
//! is shared behind a mutex; multi-record writes run in `BEGIN IMMEDIATE`
//! transactions so other processes on the same file are held off too.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};

use super::{
    CheckoutOutcome, CirculationLedger, ItemRepository, LoanRepository, MemberRepository,
    NotificationRepository, PolicyRepository, ReturnOutcome, ReturnRepository, StoreError,
    StoreResult,
};
use crate::domain::{
    Item, ItemCode, ItemState, Loan, LoanId, LoanState, Membership, Notification, NotificationId,
    Person, PersonId, Policy, PolicyCategory, ReturnRecord, Role,
};

/// SQLite-backed implementation of every desk repository
pub struct SqliteStore {
    /// Path to the database, `None` for in-memory stores
    path: Option<PathBuf>,

    conn: Mutex<Connection>,
}

const LOAN_COLUMNS: &str = "id, member, item, agent, loan_date, due_date, state,
     policy_category, policy_loan_days, policy_max_open, policy_fine_per_day, created_at";

const NOTIFICATION_COLUMNS: &str = "id, loan, message, created_at, delivered";

impl SqliteStore {
    /// Schema version - bump when schema changes
    const SCHEMA_VERSION: i32 = 1;

    /// Opens (creating if needed) the store at `path`
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;

        // WAL lets readers proceed while a checkout holds the write lock
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        conn.busy_timeout(Duration::from_secs(5))?;

        Self::init(conn, Some(path.to_path_buf()))
    }

    /// Opens a private in-memory store
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> StoreResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let store = Self {
            path,
            conn: Mutex::new(conn),
        };
        store.ensure_schema()?;
        Ok(store)
    }

    /// Returns the database path, if file-backed
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Ensures the schema is up to date
    fn ensure_schema(&self) -> StoreResult<()> {
        let conn = self.conn()?;
        let current: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

        match current {
            0 => Self::create_schema(&conn),
            v if v == Self::SCHEMA_VERSION => Ok(()),
            v => Err(StoreError::Corrupt(format!(
                "unsupported schema version {} (expected {})",
                v,
                Self::SCHEMA_VERSION
            ))),
        }
    }

    fn create_schema(conn: &Connection) -> StoreResult<()> {
        conn.execute_batch(
            "
            CREATE TABLE people (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                national_id TEXT NOT NULL UNIQUE,
                email TEXT,
                role TEXT NOT NULL,
                category TEXT,
                status TEXT,
                sanctioned INTEGER NOT NULL DEFAULT 0,
                overdue INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE items (
                code TEXT PRIMARY KEY,
                title TEXT,
                state TEXT NOT NULL,
                location TEXT NOT NULL DEFAULT ''
            );

            CREATE TABLE policies (
                category TEXT PRIMARY KEY,
                loan_days INTEGER NOT NULL,
                max_open_loans INTEGER NOT NULL,
                fine_per_day TEXT NOT NULL
            );

            CREATE TABLE loans (
                id TEXT PRIMARY KEY,
                member TEXT NOT NULL REFERENCES people(id),
                item TEXT NOT NULL REFERENCES items(code),
                agent TEXT NOT NULL REFERENCES people(id),
                loan_date TEXT NOT NULL,
                due_date TEXT NOT NULL,
                state TEXT NOT NULL,
                policy_category TEXT NOT NULL,
                policy_loan_days INTEGER NOT NULL,
                policy_max_open INTEGER NOT NULL,
                policy_fine_per_day TEXT NOT NULL,
                created_at TEXT NOT NULL,
                CHECK (due_date >= loan_date)
            );

            CREATE TABLE returns (
                id TEXT PRIMARY KEY,
                loan TEXT NOT NULL UNIQUE REFERENCES loans(id),
                returned_on TEXT NOT NULL,
                condition TEXT NOT NULL,
                notes TEXT NOT NULL DEFAULT '',
                days_late INTEGER NOT NULL,
                fine TEXT NOT NULL,
                recorded_at TEXT NOT NULL
            );

            CREATE TABLE notifications (
                id TEXT PRIMARY KEY,
                loan TEXT NOT NULL REFERENCES loans(id),
                message TEXT NOT NULL,
                message_key TEXT NOT NULL,
                created_at TEXT NOT NULL,
                delivered INTEGER NOT NULL DEFAULT 0,
                UNIQUE (loan, message_key)
            );

            CREATE INDEX idx_loans_member ON loans(member, state);
            CREATE INDEX idx_loans_state ON loans(state);
            -- at most one open loan per item
            CREATE UNIQUE INDEX idx_loans_open_item ON loans(item) WHERE state != 'returned';
            CREATE INDEX idx_notifications_pending ON notifications(delivered);
            ",
        )?;

        conn.execute(
            &format!("PRAGMA user_version = {}", Self::SCHEMA_VERSION),
            [],
        )?;

        Ok(())
    }

    // -------------------------------------------------------------------------
    // Administrative writes (membership, catalog and policy plumbing)
    // -------------------------------------------------------------------------

    /// Inserts or replaces a person
    pub fn upsert_person(&self, person: &Person) -> StoreResult<()> {
        let (role, category, status, sanctioned, overdue) = match &person.role {
            Role::Patron(m) => (
                "patron",
                Some(m.category.as_str()),
                Some(m.status.as_str()),
                m.sanctioned,
                m.overdue,
            ),
            Role::Librarian => ("librarian", None, None, false, false),
        };

        self.conn()?.execute(
            "INSERT INTO people (id, name, national_id, email, role, category, status, sanctioned, overdue)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name, national_id = excluded.national_id, email = excluded.email,
                role = excluded.role, category = excluded.category, status = excluded.status,
                sanctioned = excluded.sanctioned, overdue = excluded.overdue",
            params![
                person.id.as_str(),
                person.name,
                person.national_id,
                person.email,
                role,
                category,
                status,
                sanctioned,
                overdue,
            ],
        )?;
        Ok(())
    }

    /// Inserts or replaces an item
    pub fn upsert_item(&self, item: &Item) -> StoreResult<()> {
        self.conn()?.execute(
            "INSERT INTO items (code, title, state, location) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(code) DO UPDATE SET
                title = excluded.title, state = excluded.state, location = excluded.location",
            params![item.code.as_str(), item.title, item.state.as_str(), item.location],
        )?;
        Ok(())
    }

    /// Inserts or replaces the policy for its category
    pub fn upsert_policy(&self, policy: &Policy) -> StoreResult<()> {
        self.conn()?.execute(
            "INSERT INTO policies (category, loan_days, max_open_loans, fine_per_day)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(category) DO UPDATE SET
                loan_days = excluded.loan_days, max_open_loans = excluded.max_open_loans,
                fine_per_day = excluded.fine_per_day",
            params![
                policy.category.key(),
                policy.loan_days,
                policy.max_open_loans,
                policy.fine_per_day.to_string(),
            ],
        )?;
        Ok(())
    }

    /// Lists every configured policy
    pub fn list_policies(&self) -> StoreResult<Vec<Policy>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT category, loan_days, max_open_loans, fine_per_day FROM policies ORDER BY category",
        )?;
        let policies = stmt
            .query_map([], policy_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(policies)
    }

    /// Lists every loan, newest first
    pub fn list_loans(&self) -> StoreResult<Vec<Loan>> {
        self.query_loans("1 = 1", params![])
    }

    /// Lists every notice, newest first
    pub fn list_notifications(&self) -> StoreResult<Vec<Notification>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM notifications ORDER BY created_at DESC",
            NOTIFICATION_COLUMNS
        ))?;
        let notices = stmt
            .query_map([], notification_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(notices)
    }

    fn query_loans(&self, filter: &str, args: &[&dyn rusqlite::ToSql]) -> StoreResult<Vec<Loan>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM loans WHERE {} ORDER BY loan_date DESC, created_at DESC",
            LOAN_COLUMNS, filter
        ))?;
        let loans = stmt
            .query_map(args, loan_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(loans)
    }

    fn query_person(&self, column: &str, value: &str) -> StoreResult<Option<Person>> {
        let conn = self.conn()?;
        let person = conn
            .query_row(
                &format!(
                    "SELECT id, name, national_id, email, role, category, status, sanctioned, overdue
                     FROM people WHERE {} = ?1",
                    column
                ),
                params![value],
                person_from_row,
            )
            .optional()?;
        Ok(person)
    }
}

impl fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteStore").field("path", &self.path).finish()
    }
}

/// Renders states as an SQL list literal; values come from `as_str` only
fn state_list<'a>(states: impl IntoIterator<Item = &'a str>) -> String {
    states
        .into_iter()
        .map(|s| format!("'{}'", s))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Reads a text column and parses it, reporting bad values as conversion failures
fn parsed<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e: T::Err| {
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, format!("'{}': {}", raw, e).into())
    })
}

fn person_from_row(row: &Row<'_>) -> rusqlite::Result<Person> {
    let role: String = row.get(4)?;
    let role = match role.as_str() {
        "librarian" => Role::Librarian,
        _ => Role::Patron(Membership {
            category: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
            status: parsed(row, 6)?,
            sanctioned: row.get(7)?,
            overdue: row.get(8)?,
        }),
    };

    Ok(Person {
        id: parsed(row, 0)?,
        name: row.get(1)?,
        national_id: row.get(2)?,
        email: row.get(3)?,
        role,
    })
}

fn item_from_row(row: &Row<'_>) -> rusqlite::Result<Item> {
    Ok(Item {
        code: parsed(row, 0)?,
        title: row.get(1)?,
        state: parsed(row, 2)?,
        location: row.get(3)?,
    })
}

fn policy_from_row(row: &Row<'_>) -> rusqlite::Result<Policy> {
    Ok(Policy {
        category: parsed(row, 0)?,
        loan_days: row.get(1)?,
        max_open_loans: row.get(2)?,
        fine_per_day: parsed(row, 3)?,
    })
}

fn loan_from_row(row: &Row<'_>) -> rusqlite::Result<Loan> {
    Ok(Loan {
        id: parsed(row, 0)?,
        member: parsed(row, 1)?,
        item: parsed(row, 2)?,
        agent: parsed(row, 3)?,
        loan_date: parsed(row, 4)?,
        due_date: parsed(row, 5)?,
        state: parsed(row, 6)?,
        policy: Policy {
            category: parsed(row, 7)?,
            loan_days: row.get(8)?,
            max_open_loans: row.get(9)?,
            fine_per_day: parsed(row, 10)?,
        },
        created_at: parsed(row, 11)?,
    })
}

fn return_from_row(row: &Row<'_>) -> rusqlite::Result<ReturnRecord> {
    Ok(ReturnRecord {
        id: parsed(row, 0)?,
        loan: parsed(row, 1)?,
        returned_on: parsed(row, 2)?,
        condition: parsed(row, 3)?,
        notes: row.get(4)?,
        days_late: row.get(5)?,
        fine: parsed(row, 6)?,
        recorded_at: parsed(row, 7)?,
    })
}

fn notification_from_row(row: &Row<'_>) -> rusqlite::Result<Notification> {
    Ok(Notification {
        id: parsed(row, 0)?,
        loan: parsed(row, 1)?,
        message: row.get(2)?,
        created_at: parsed(row, 3)?,
        delivered: row.get(4)?,
    })
}

impl MemberRepository for SqliteStore {
    fn find(&self, id: &PersonId) -> StoreResult<Option<Person>> {
        self.query_person("id", id.as_str())
    }

    fn find_by_national_id(&self, national_id: &str) -> StoreResult<Option<Person>> {
        self.query_person("national_id", national_id.trim())
    }
}

impl ItemRepository for SqliteStore {
    fn find(&self, code: &ItemCode) -> StoreResult<Option<Item>> {
        let conn = self.conn()?;
        let item = conn
            .query_row(
                "SELECT code, title, state, location FROM items WHERE code = ?1",
                params![code.as_str()],
                item_from_row,
            )
            .optional()?;
        Ok(item)
    }

    fn transition(&self, code: &ItemCode, from: &[ItemState], to: ItemState) -> StoreResult<bool> {
        if from.is_empty() {
            return Ok(false);
        }
        let sql = format!(
            "UPDATE items SET state = ?1 WHERE code = ?2 AND state IN ({})",
            state_list(from.iter().map(ItemState::as_str))
        );
        let changed = self.conn()?.execute(&sql, params![to.as_str(), code.as_str()])?;
        Ok(changed == 1)
    }
}

impl LoanRepository for SqliteStore {
    fn find(&self, id: &LoanId) -> StoreResult<Option<Loan>> {
        let loan_id = id.to_string();
        Ok(self.query_loans("id = ?1", params![loan_id])?.into_iter().next())
    }

    fn list_open(&self) -> StoreResult<Vec<Loan>> {
        self.query_loans("state != 'returned'", params![])
    }

    fn list_for_member(&self, member: &PersonId) -> StoreResult<Vec<Loan>> {
        self.query_loans("member = ?1", params![member.as_str()])
    }

    fn list_for_item(&self, item: &ItemCode) -> StoreResult<Vec<Loan>> {
        self.query_loans("item = ?1", params![item.as_str()])
    }

    fn count_open_for_member(&self, member: &PersonId) -> StoreResult<usize> {
        let conn = self.conn()?;
        count_open(&conn, member)
    }

    fn transition(&self, id: &LoanId, from: &[LoanState], to: LoanState) -> StoreResult<bool> {
        // Backward moves never match, whatever the caller asked for
        let forward: Vec<&str> = from
            .iter()
            .filter(|s| s.can_become(to))
            .map(LoanState::as_str)
            .collect();
        if forward.is_empty() {
            return Ok(false);
        }
        let sql = format!(
            "UPDATE loans SET state = ?1 WHERE id = ?2 AND state IN ({})",
            state_list(forward)
        );
        let changed = self.conn()?.execute(&sql, params![to.as_str(), id.to_string()])?;
        Ok(changed == 1)
    }
}

fn count_open(conn: &Connection, member: &PersonId) -> StoreResult<usize> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM loans WHERE member = ?1 AND state != 'returned'",
        params![member.as_str()],
        |row| row.get(0),
    )?;
    Ok(count as usize)
}

impl PolicyRepository for SqliteStore {
    fn find_by_category(&self, category: PolicyCategory) -> StoreResult<Option<Policy>> {
        let conn = self.conn()?;
        let policy = conn
            .query_row(
                "SELECT category, loan_days, max_open_loans, fine_per_day FROM policies WHERE category = ?1",
                params![category.key()],
                policy_from_row,
            )
            .optional()?;
        Ok(policy)
    }
}

impl ReturnRepository for SqliteStore {
    fn find_for_loan(&self, loan: &LoanId) -> StoreResult<Option<ReturnRecord>> {
        let conn = self.conn()?;
        let record = conn
            .query_row(
                "SELECT id, loan, returned_on, condition, notes, days_late, fine, recorded_at
                 FROM returns WHERE loan = ?1",
                params![loan.to_string()],
                return_from_row,
            )
            .optional()?;
        Ok(record)
    }
}

impl NotificationRepository for SqliteStore {
    fn insert(&self, notification: &Notification) -> StoreResult<bool> {
        let inserted = self.conn()?.execute(
            "INSERT INTO notifications (id, loan, message, message_key, created_at, delivered)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(loan, message_key) DO NOTHING",
            params![
                notification.id.to_string(),
                notification.loan.to_string(),
                notification.message,
                notification.message.to_lowercase(),
                notification.created_at.to_rfc3339(),
                notification.delivered,
            ],
        )?;
        Ok(inserted == 1)
    }

    fn exists(&self, loan: &LoanId, message: &str) -> StoreResult<bool> {
        let conn = self.conn()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM notifications WHERE loan = ?1 AND message_key = ?2",
                params![loan.to_string(), message.to_lowercase()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn list_for_loan(&self, loan: &LoanId) -> StoreResult<Vec<Notification>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM notifications WHERE loan = ?1 ORDER BY created_at",
            NOTIFICATION_COLUMNS
        ))?;
        let notices = stmt
            .query_map(params![loan.to_string()], notification_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(notices)
    }

    fn list_undelivered(&self) -> StoreResult<Vec<Notification>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM notifications WHERE delivered = 0 ORDER BY created_at",
            NOTIFICATION_COLUMNS
        ))?;
        let notices = stmt
            .query_map([], notification_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(notices)
    }

    fn mark_delivered(&self, id: &NotificationId) -> StoreResult<()> {
        self.conn()?.execute(
            "UPDATE notifications SET delivered = 1 WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(())
    }
}

impl CirculationLedger for SqliteStore {
    fn commit_checkout(&self, loan: &Loan) -> StoreResult<CheckoutOutcome> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let open = count_open(&tx, &loan.member)?;
        if !loan.policy.allows_another(open) {
            return Ok(CheckoutOutcome::LimitReached(open));
        }

        let claimed = tx.execute(
            "UPDATE items SET state = ?1 WHERE code = ?2 AND state = ?3",
            params![
                ItemState::Loaned.as_str(),
                loan.item.as_str(),
                ItemState::Available.as_str()
            ],
        )?;
        if claimed == 0 {
            let current = tx
                .query_row(
                    "SELECT state FROM items WHERE code = ?1",
                    params![loan.item.as_str()],
                    |row| parsed::<ItemState>(row, 0),
                )
                .optional()?
                .ok_or_else(|| StoreError::Corrupt(format!("item {} is missing", loan.item)))?;
            return Ok(CheckoutOutcome::ItemUnavailable(current));
        }

        tx.execute(
            &format!(
                "INSERT INTO loans ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                LOAN_COLUMNS
            ),
            params![
                loan.id.to_string(),
                loan.member.as_str(),
                loan.item.as_str(),
                loan.agent.as_str(),
                loan.loan_date.to_string(),
                loan.due_date.to_string(),
                loan.state.as_str(),
                loan.policy.category.key(),
                loan.policy.loan_days,
                loan.policy.max_open_loans,
                loan.policy.fine_per_day.to_string(),
                loan.created_at.to_rfc3339(),
            ],
        )?;

        tx.commit()?;
        Ok(CheckoutOutcome::Committed)
    }

    fn commit_return(
        &self,
        record: &ReturnRecord,
        item: &ItemCode,
        release_to: ItemState,
    ) -> StoreResult<ReturnOutcome> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let loan_id = record.loan.to_string();

        let closed = tx.execute(
            &format!(
                "UPDATE loans SET state = ?1 WHERE id = ?2 AND state IN ({})",
                state_list(LoanState::OPEN.iter().map(LoanState::as_str))
            ),
            params![LoanState::Returned.as_str(), loan_id],
        )?;
        if closed == 0 {
            let current = tx
                .query_row(
                    "SELECT state FROM loans WHERE id = ?1",
                    params![loan_id],
                    |row| parsed::<LoanState>(row, 0),
                )
                .optional()?
                .ok_or_else(|| StoreError::Corrupt(format!("loan {} is missing", record.loan)))?;
            return Ok(ReturnOutcome::AlreadyReturned(current));
        }

        tx.execute(
            "INSERT INTO returns (id, loan, returned_on, condition, notes, days_late, fine, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.id.to_string(),
                loan_id,
                record.returned_on.to_string(),
                record.condition.as_str(),
                record.notes,
                record.days_late,
                record.fine.to_string(),
                record.recorded_at.to_rfc3339(),
            ],
        )?;

        tx.execute(
            "UPDATE items SET state = ?1 WHERE code = ?2",
            params![release_to.as_str(), item.as_str()],
        )?;

        tx.commit()?;
        Ok(ReturnOutcome::Committed)
    }
}
