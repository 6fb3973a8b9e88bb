use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use directories::BaseDirs;
use rusqlite::{params, Connection, Row};
use tokio::sync::{mpsc, watch};

use crate::contact::Contact;
use crate::store::{ContactFeed, ContactStore, NameMatch, SortMode};

const APP_NAME: &str = "addrbook";
const DB_FILE_NAME: &str = "contacts.db";

const CONTACT_COLUMNS: &str = "id, customer_id, company_name, contact_name, contact_title, \
     address, city, email, postal_code, country, phone, fax";

/// Default database location under the platform data directory.
pub fn default_db_path() -> Result<PathBuf> {
    let base = BaseDirs::new().context("unable to determine data directories")?;
    Ok(base.data_dir().join(APP_NAME).join(DB_FILE_NAME))
}

/// SQLite-backed contact store.
///
/// Clones share one connection; every committed write bumps a revision
/// counter that drives the live feeds.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    revision: Arc<watch::Sender<u64>>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create database directory {}", parent.display())
                })?;
            }
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "FULL")?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let (revision, _) = watch::channel(0);
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
            revision: Arc::new(revision),
        };
        db.setup()?;
        Ok(db)
    }

    fn setup(&self) -> Result<()> {
        self.lock()?.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS contacts (
              id            INTEGER PRIMARY KEY AUTOINCREMENT,
              customer_id   TEXT NOT NULL DEFAULT '',
              company_name  TEXT NOT NULL DEFAULT '',
              contact_name  TEXT NOT NULL,
              contact_title TEXT NOT NULL DEFAULT '',
              address       TEXT NOT NULL DEFAULT '',
              city          TEXT NOT NULL DEFAULT '',
              email         TEXT NOT NULL,
              postal_code   TEXT NOT NULL DEFAULT '',
              country       TEXT NOT NULL DEFAULT '',
              phone         TEXT NOT NULL DEFAULT '',
              fax           TEXT NOT NULL DEFAULT ''
            );

            CREATE INDEX IF NOT EXISTS idx_contacts_name ON contacts(contact_name);
            CREATE INDEX IF NOT EXISTS idx_contacts_email ON contacts(email);
        "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("database connection lock poisoned"))
    }

    fn notify(&self) {
        self.revision.send_modify(|rev| *rev += 1);
    }

    pub fn insert_contact(&self, contact: &Contact) -> Result<Contact> {
        let id = insert_row(&*self.lock()?, contact)?;
        self.notify();

        Ok(Contact {
            id,
            ..contact.clone()
        })
    }

    /// Delete `original_id` and insert `contact` in one transaction.
    pub fn replace_contact(&self, original_id: i64, contact: &Contact) -> Result<Contact> {
        let id = {
            let mut conn = self.lock()?;
            let tx = conn.transaction()?;
            let removed = tx
                .execute("DELETE FROM contacts WHERE id = ?1", params![original_id])
                .with_context(|| format!("failed to delete contact {}", original_id))?;
            if removed == 0 {
                tracing::debug!(id = original_id, "contact being replaced was already gone");
            }
            let id = insert_row(&tx, contact)?;
            tx.commit()
                .with_context(|| format!("failed to replace contact {}", original_id))?;
            id
        };
        self.notify();

        Ok(Contact {
            id,
            ..contact.clone()
        })
    }

    pub fn delete_contact(&self, id: i64) -> Result<bool> {
        let removed = self
            .lock()?
            .execute("DELETE FROM contacts WHERE id = ?1", params![id])
            .with_context(|| format!("failed to delete contact {}", id))?;
        if removed > 0 {
            self.notify();
        }
        Ok(removed > 0)
    }

    pub fn contacts_by_name(&self, name: &str, matching: NameMatch) -> Result<Vec<Contact>> {
        let sql = match matching {
            NameMatch::Exact => format!(
                "SELECT {} FROM contacts WHERE contact_name = ?1 ORDER BY id",
                CONTACT_COLUMNS
            ),
            NameMatch::IgnoreCase => format!(
                "SELECT {} FROM contacts WHERE contact_name = ?1 COLLATE NOCASE ORDER BY id",
                CONTACT_COLUMNS
            ),
        };
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([name], row_to_contact)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn contact_by_id(&self, id: i64) -> Result<Option<Contact>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM contacts WHERE id = ?1",
            CONTACT_COLUMNS
        ))?;
        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(row_to_contact(row)?));
        }
        Ok(None)
    }

    pub fn contacts_sorted(&self, mode: SortMode) -> Result<Vec<Contact>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM contacts ORDER BY {} ASC, id ASC",
            CONTACT_COLUMNS,
            mode.column()
        ))?;
        let rows = stmt.query_map([], row_to_contact)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Spawn a task that re-reads the sorted list after every committed write.
    pub fn feed(&self, mode: SortMode) -> ContactFeed {
        let (tx, rx) = mpsc::channel(1);
        let mut changes = self.revision.subscribe();
        let db = self.clone();

        let pump = tokio::spawn(async move {
            loop {
                changes.borrow_and_update();
                let snapshot = db.contacts_sorted(mode);
                if tx.send(snapshot).await.is_err() {
                    break;
                }
                if changes.changed().await.is_err() {
                    break;
                }
            }
        });

        ContactFeed::new(rx, pump)
    }
}

#[cfg(test)]
impl Database {
    /// Make every INSERT fail with `message` until switched off.
    pub(crate) fn fail_inserts(&self, message: Option<&str>) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch("DROP TRIGGER IF EXISTS fail_inserts")?;
        if let Some(message) = message {
            conn.execute_batch(&format!(
                "CREATE TEMP TRIGGER fail_inserts BEFORE INSERT ON contacts \
                 BEGIN SELECT RAISE(ABORT, '{}'); END",
                message.replace('\'', "''")
            ))?;
        }
        Ok(())
    }
}

#[async_trait]
impl ContactStore for Database {
    async fn insert(&self, contact: &Contact) -> Result<Contact> {
        self.insert_contact(contact)
    }

    async fn delete(&self, contact: &Contact) -> Result<bool> {
        self.delete_contact(contact.id)
    }

    async fn replace(&self, original: &Contact, updated: &Contact) -> Result<Contact> {
        self.replace_contact(original.id, updated)
    }

    async fn find_by_name(&self, name: &str, matching: NameMatch) -> Result<Vec<Contact>> {
        self.contacts_by_name(name, matching)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Contact>> {
        self.contact_by_id(id)
    }

    async fn list_sorted(&self, mode: SortMode) -> Result<Vec<Contact>> {
        self.contacts_sorted(mode)
    }

    async fn observe_sorted(&self, mode: SortMode) -> Result<ContactFeed> {
        Ok(self.feed(mode))
    }
}

fn insert_row(conn: &Connection, contact: &Contact) -> Result<i64> {
    conn.execute(
        r#"
        INSERT INTO contacts (customer_id, company_name, contact_name, contact_title,
                              address, city, email, postal_code, country, phone, fax)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
    "#,
        params![
            contact.customer_id,
            contact.company_name,
            contact.contact_name,
            contact.contact_title,
            contact.address,
            contact.city,
            contact.email,
            contact.postal_code,
            contact.country,
            contact.phone,
            contact.fax,
        ],
    )
    .with_context(|| format!("failed to insert contact {}", contact.contact_name))?;
    Ok(conn.last_insert_rowid())
}

fn row_to_contact(row: &Row<'_>) -> rusqlite::Result<Contact> {
    Ok(Contact {
        id: row.get(0)?,
        customer_id: row.get(1)?,
        company_name: row.get(2)?,
        contact_name: row.get(3)?,
        contact_title: row.get(4)?,
        address: row.get(5)?,
        city: row.get(6)?,
        email: row.get(7)?,
        postal_code: row.get(8)?,
        country: row.get(9)?,
        phone: row.get(10)?,
        fax: row.get(11)?,
    })
}
