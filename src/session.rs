// 🔐 Session - who is moving stock, and what time it is
//
// Passed explicitly into the movement coordinator. Nothing here is global.

use crate::db::{self, UserRecord};
use crate::error::{LedgerError, LedgerResult, ValidationError};
use chrono::{Local, NaiveDate, NaiveDateTime, Timelike};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

// ============================================================================
// CLOCK
// ============================================================================

/// Source of wall-clock time for audit timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;

    fn today(&self) -> NaiveDate {
        self.now().date()
    }
}

/// Local time of the host.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        // Second precision, matching the stored timestamp format
        let now = Local::now().naive_local();
        now.with_nanosecond(0).unwrap_or(now)
    }
}

/// Always the same instant. For tests and replays.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

// ============================================================================
// OPERATOR & CONTEXT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operator {
    pub username: String,
    /// Display name, written to the audit log
    pub name: String,
    pub role: String,
}

impl Operator {
    pub fn new(username: impl Into<String>, name: impl Into<String>, role: impl Into<String>) -> Self {
        Operator {
            username: username.into(),
            name: name.into(),
            role: role.into(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

impl From<UserRecord> for Operator {
    fn from(user: UserRecord) -> Self {
        Operator {
            username: user.username,
            name: user.name,
            role: user.role,
        }
    }
}

/// Explicit session context handed to every movement.
#[derive(Clone)]
pub struct SessionContext {
    pub operator: Operator,
    clock: Arc<dyn Clock>,
}

impl SessionContext {
    pub fn new(operator: Operator) -> Self {
        Self::with_clock(operator, Arc::new(SystemClock))
    }

    pub fn with_clock(operator: Operator, clock: Arc<dyn Clock>) -> Self {
        SessionContext { operator, clock }
    }

    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("operator", &self.operator)
            .field("now", &self.clock.now())
            .finish()
    }
}

// ============================================================================
// LOGIN
// ============================================================================

/// Lower-case hex SHA-256 of the password.
pub fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Check the credentials against `users` and return the operator.
pub fn authenticate(conn: &Connection, username: &str, password: &str) -> LedgerResult<Operator> {
    let user = match db::find_user(conn, username)? {
        Some(user) => user,
        None => {
            warn!(username, "login refused: unknown user");
            return Err(LedgerError::Unauthorized);
        }
    };

    if user.password_hash != hash_password(password) {
        warn!(username, "login refused: wrong password");
        return Err(LedgerError::Unauthorized);
    }

    info!(username, role = %user.role, "operator logged in");
    Ok(user.into())
}

/// Register a user; the password is stored as its digest only.
pub fn create_user(
    conn: &Connection,
    username: &str,
    password: &str,
    name: &str,
    role: &str,
) -> LedgerResult<Operator> {
    if username.trim().is_empty() {
        return Err(ValidationError::new("username", "Zadejte uživatelské jméno.").into());
    }
    if password.is_empty() {
        return Err(ValidationError::new("password", "Zadejte heslo.").into());
    }

    let record = UserRecord {
        id: 0,
        username: username.trim().to_string(),
        password_hash: hash_password(password),
        name: name.trim().to_string(),
        role: role.trim().to_string(),
    };
    db::insert_user(conn, &record)?;
    info!(username = %record.username, role = %record.role, "user created");

    Ok(record.into())
}
