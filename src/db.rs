// 🗄️ Data Store Gateway - SQLite rows ↔ named records
//
// Generic key-based reads and writes, nothing more. Business rules live in the
// validator / costing / movement modules; this file only knows the schema.
//
// Every function takes `&Connection`, so the same calls run unchanged inside a
// `rusqlite::Transaction` (which derefs to `Connection`).

use crate::error::{LedgerError, LedgerResult};
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ============================================================================
// DIRECTION
// ============================================================================

/// Direction of a stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    /// Inbound - quantity goes up, unit price may be re-averaged
    Receipt,
    /// Outbound - quantity goes down, unit price untouched
    Issue,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Receipt => "RECEIPT",
            Direction::Issue => "ISSUE",
        }
    }

    /// Czech label used in user-facing messages.
    pub fn label(&self) -> &'static str {
        match self {
            Direction::Receipt => "příjem",
            Direction::Issue => "výdej",
        }
    }

    pub fn parse(s: &str) -> Option<Direction> {
        match s.trim().to_uppercase().as_str() {
            "RECEIPT" | "PRIJEM" | "PŘÍJEM" => Some(Direction::Receipt),
            "ISSUE" | "VYDEJ" | "VÝDEJ" => Some(Direction::Issue),
            _ => None,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

impl ToSql for Direction {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Direction {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        Direction::parse(text).ok_or_else(|| FromSqlError::Other(format!("unknown movement type '{}'", text).into()))
    }
}

// ============================================================================
// STOCK ITEM
// ============================================================================

/// One inventory part (a row of `stock` plus its device usage set).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockItem {
    /// Unique numeric identifier (evidence number) - assigned as max + 1
    pub evidence_number: i64,
    /// Internal card number
    pub card_number: i64,
    pub name: String,
    /// On-hand quantity, never negative
    pub quantity: i64,
    /// Below this the item is flagged "below minimum"
    pub min_quantity: i64,
    /// Unit of measure (ks, m, l, ...)
    pub unit: String,
    pub location: String,
    /// Last supplier
    pub supplier: String,
    /// Last purchase date
    pub purchase_date: Option<NaiveDate>,
    /// Last order number
    pub order_number: String,
    /// Current weighted-average unit price
    pub unit_price: Decimal,
    /// Current total value (quantity × unit price, rounded to 1 dp)
    pub total_value: Decimal,
    pub note: String,
    pub ordered: bool,
    pub accounting: bool,
    pub critical: bool,
    /// Codes of devices this part is used in
    #[serde(default)]
    pub devices: BTreeSet<String>,
}

impl StockItem {
    /// Derived, never stored.
    pub fn is_below_minimum(&self) -> bool {
        self.quantity < self.min_quantity
    }
}

/// Subset of stock columns written by a movement.
#[derive(Debug, Clone, PartialEq)]
pub enum StockUpdate {
    Receipt {
        quantity: i64,
        location: String,
        supplier: String,
        purchase_date: NaiveDate,
        order_number: String,
        unit_price: Decimal,
        total_value: Decimal,
        note: String,
    },
    Issue {
        quantity: i64,
        location: String,
        note: String,
        total_value: Decimal,
    },
}

// ============================================================================
// AUDIT LOG ENTRY
// ============================================================================

/// One movement, append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    /// Auto-incrementing id (0 until inserted)
    pub id: i64,
    pub item_id: i64,
    pub card_number: i64,
    pub item_name: String,
    pub unit: String,
    pub accounting: bool,
    pub movement_type: Direction,
    /// Signed: positive for receipts, negative for issues
    pub quantity_delta: i64,
    pub resulting_quantity: i64,
    /// Stock unit price after the movement
    pub unit_price: Decimal,
    /// Stock total value after the movement
    pub total_value: Decimal,
    /// Price the movement itself was booked at (entered price / current price)
    pub movement_unit_price: Decimal,
    /// round(quantity_delta × movement_unit_price, 1)
    pub movement_value: Decimal,
    pub location: String,
    pub supplier: String,
    pub order_number: String,
    pub purchase_date: Option<NaiveDate>,
    pub issue_date: Option<NaiveDate>,
    pub device_used: String,
    pub note: String,
    pub operator: String,
    pub timestamp: NaiveDateTime,
}

// ============================================================================
// SUPPLIER VARIANT
// ============================================================================

/// Supplier-specific procurement record for a stock item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupplierVariant {
    pub id: i64,
    pub item_id: i64,
    pub supplier_id: i64,
    pub variant_name: String,
    pub variant_number: String,
    pub unit_price: Decimal,
    pub lead_time_days: i64,
    pub min_order_qty: i64,
}

/// Variant joined with the names it points at, for listings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariantRow {
    #[serde(flatten)]
    pub variant: SupplierVariant,
    pub item_name: String,
    pub supplier_name: String,
    pub below_minimum: bool,
}

// ============================================================================
// REFERENCE DATA
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Supplier {
    pub id: i64,
    pub name: String,
    pub contact: String,
    pub email: String,
    pub phone: String,
    pub language: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: i64,
    /// Short normalised code (upper case, no spaces)
    pub code: String,
    pub name: String,
    pub location: String,
    pub device_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub name: String,
    pub role: String,
}

// ============================================================================
// COLUMN HELPERS
// ============================================================================

pub(crate) fn decimal_to_real(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

pub(crate) fn decimal_from_real(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or(Decimal::ZERO).normalize()
}

fn date_to_text(date: Option<NaiveDate>) -> Option<String> {
    date.map(|d| d.format(DATE_FORMAT).to_string())
}

fn decimal_column(row: &Row<'_>, name: &str) -> rusqlite::Result<Decimal> {
    let value: Option<f64> = row.get(name)?;
    Ok(value.map(decimal_from_real).unwrap_or(Decimal::ZERO))
}

fn total_column(row: &Row<'_>, name: &str) -> rusqlite::Result<Decimal> {
    Ok(decimal_column(row, name)?.round_dp(1))
}

fn text_column(row: &Row<'_>, name: &str) -> rusqlite::Result<String> {
    let value: Option<String> = row.get(name)?;
    Ok(value.unwrap_or_default())
}

fn date_column(row: &Row<'_>, name: &str) -> rusqlite::Result<Option<NaiveDate>> {
    let value: Option<String> = row.get(name)?;
    // Historical rows carry "" for "no date"
    Ok(value
        .filter(|s| !s.trim().is_empty())
        .and_then(|s| NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).ok()))
}

fn timestamp_column(row: &Row<'_>, name: &str) -> rusqlite::Result<NaiveDateTime> {
    let value: String = row.get(name)?;
    NaiveDateTime::parse_from_str(&value, TIMESTAMP_FORMAT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> LedgerResult<()> {
    // WAL for crash recovery (in-memory databases answer "memory")
    let _mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS stock (
            evidence_number INTEGER PRIMARY KEY,
            card_number INTEGER UNIQUE NOT NULL,
            name TEXT NOT NULL,
            quantity INTEGER NOT NULL DEFAULT 0 CHECK (quantity >= 0),
            min_quantity INTEGER NOT NULL DEFAULT 0 CHECK (min_quantity >= 0),
            unit TEXT NOT NULL,
            location TEXT,
            supplier TEXT,
            purchase_date TEXT,
            order_number TEXT,
            unit_price REAL NOT NULL DEFAULT 0.0,
            total_value REAL NOT NULL DEFAULT 0.0,
            note TEXT,
            ordered INTEGER NOT NULL DEFAULT 0,
            accounting INTEGER NOT NULL DEFAULT 1,
            critical INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS supplier (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT UNIQUE NOT NULL,
            contact TEXT,
            email TEXT,
            phone TEXT,
            language TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS device (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            code TEXT UNIQUE NOT NULL,
            name TEXT NOT NULL,
            location TEXT NOT NULL,
            device_type TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS stock_device (
            item_id INTEGER NOT NULL REFERENCES stock(evidence_number) ON DELETE CASCADE,
            device_code TEXT NOT NULL REFERENCES device(code),
            PRIMARY KEY (item_id, device_code)
        );

        -- Append-only. No foreign key: entries outlive the item they describe.
        CREATE TABLE IF NOT EXISTS audit_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            item_id INTEGER NOT NULL,
            card_number INTEGER NOT NULL,
            item_name TEXT NOT NULL,
            unit TEXT NOT NULL,
            accounting INTEGER NOT NULL,
            movement_type TEXT NOT NULL CHECK (movement_type IN ('RECEIPT', 'ISSUE')),
            quantity_delta INTEGER NOT NULL,
            resulting_quantity INTEGER NOT NULL,
            unit_price REAL NOT NULL,
            total_value REAL NOT NULL,
            movement_unit_price REAL NOT NULL,
            movement_value REAL NOT NULL,
            location TEXT,
            supplier TEXT,
            order_number TEXT,
            purchase_date TEXT,
            issue_date TEXT,
            device_used TEXT,
            note TEXT,
            operator TEXT NOT NULL,
            timestamp TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS variant (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            item_id INTEGER NOT NULL REFERENCES stock(evidence_number),
            supplier_id INTEGER NOT NULL REFERENCES supplier(id),
            variant_name TEXT NOT NULL,
            variant_number TEXT NOT NULL,
            unit_price REAL NOT NULL DEFAULT 0.0,
            lead_time_days INTEGER NOT NULL DEFAULT 0,
            min_order_qty INTEGER NOT NULL DEFAULT 0,
            UNIQUE (item_id, supplier_id)
        );

        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT UNIQUE NOT NULL,
            password_hash TEXT NOT NULL,
            name TEXT NOT NULL,
            role TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_audit_item ON audit_log(item_id);
        CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp);
        CREATE INDEX IF NOT EXISTS idx_variant_supplier ON variant(supplier_id);",
    )?;

    Ok(())
}

/// Open (or create) the database file and make sure the schema exists.
pub fn open_database(path: &std::path::Path) -> LedgerResult<Connection> {
    let conn = Connection::open(path)?;
    setup_database(&conn)?;
    Ok(conn)
}

/// Highest value of an integer key column, 0 for an empty table.
fn max_key(conn: &Connection, table: &str, column: &str) -> LedgerResult<i64> {
    let sql = format!("SELECT MAX({}) FROM {}", column, table);
    let max: Option<i64> = conn.query_row(&sql, [], |row| row.get(0))?;
    Ok(max.unwrap_or(0))
}

// ============================================================================
// STOCK
// ============================================================================

const STOCK_COLUMNS: &str = "evidence_number, card_number, name, quantity, min_quantity, unit,
    location, supplier, purchase_date, order_number, unit_price, total_value, note,
    ordered, accounting, critical";

fn stock_from_row(row: &Row<'_>) -> rusqlite::Result<StockItem> {
    Ok(StockItem {
        evidence_number: row.get("evidence_number")?,
        card_number: row.get("card_number")?,
        name: row.get("name")?,
        quantity: row.get("quantity")?,
        min_quantity: row.get("min_quantity")?,
        unit: row.get("unit")?,
        location: text_column(row, "location")?,
        supplier: text_column(row, "supplier")?,
        purchase_date: date_column(row, "purchase_date")?,
        order_number: text_column(row, "order_number")?,
        unit_price: decimal_column(row, "unit_price")?,
        total_value: total_column(row, "total_value")?,
        note: text_column(row, "note")?,
        ordered: row.get("ordered")?,
        accounting: row.get("accounting")?,
        critical: row.get("critical")?,
        devices: BTreeSet::new(),
    })
}

fn load_devices(conn: &Connection, item: &mut StockItem) -> LedgerResult<()> {
    let mut stmt =
        conn.prepare_cached("SELECT device_code FROM stock_device WHERE item_id = ?1")?;
    item.devices = stmt
        .query_map([item.evidence_number], |row| row.get::<_, String>(0))?
        .collect::<Result<BTreeSet<_>, _>>()?;
    Ok(())
}

pub fn fetch_stock_item(conn: &Connection, evidence_number: i64) -> LedgerResult<Option<StockItem>> {
    let sql = format!("SELECT {} FROM stock WHERE evidence_number = ?1", STOCK_COLUMNS);
    let item = conn
        .query_row(&sql, [evidence_number], stock_from_row)
        .optional()?;

    match item {
        Some(mut item) => {
            load_devices(conn, &mut item)?;
            Ok(Some(item))
        }
        None => Ok(None),
    }
}

/// Like `fetch_stock_item`, but a missing row is an error.
pub fn get_stock_item(conn: &Connection, evidence_number: i64) -> LedgerResult<StockItem> {
    fetch_stock_item(conn, evidence_number)?
        .ok_or_else(|| LedgerError::not_found("stock item", evidence_number))
}

pub fn list_stock(conn: &Connection) -> LedgerResult<Vec<StockItem>> {
    let sql = format!("SELECT {} FROM stock ORDER BY evidence_number", STOCK_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let mut items = stmt
        .query_map([], stock_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    for item in &mut items {
        load_devices(conn, item)?;
    }

    Ok(items)
}

pub fn max_evidence_number(conn: &Connection) -> LedgerResult<i64> {
    max_key(conn, "stock", "evidence_number")
}

pub fn max_card_number(conn: &Connection) -> LedgerResult<i64> {
    max_key(conn, "stock", "card_number")
}

pub fn insert_stock_item(conn: &Connection, item: &StockItem) -> LedgerResult<()> {
    conn.execute(
        "INSERT INTO stock (
            evidence_number, card_number, name, quantity, min_quantity, unit,
            location, supplier, purchase_date, order_number, unit_price, total_value, note,
            ordered, accounting, critical
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        params![
            item.evidence_number,
            item.card_number,
            item.name,
            item.quantity,
            item.min_quantity,
            item.unit,
            item.location,
            item.supplier,
            date_to_text(item.purchase_date),
            item.order_number,
            decimal_to_real(item.unit_price),
            decimal_to_real(item.total_value),
            item.note,
            item.ordered,
            item.accounting,
            item.critical,
        ],
    )?;

    set_item_devices(conn, item.evidence_number, &item.devices)
}

/// Rewrite the descriptive columns only. Quantity and prices belong to movements.
pub fn update_stock_details(conn: &Connection, item: &StockItem) -> LedgerResult<()> {
    let changed = conn.execute(
        "UPDATE stock
         SET card_number = ?1, name = ?2, min_quantity = ?3, location = ?4, note = ?5,
             ordered = ?6, accounting = ?7, critical = ?8
         WHERE evidence_number = ?9",
        params![
            item.card_number,
            item.name,
            item.min_quantity,
            item.location,
            item.note,
            item.ordered,
            item.accounting,
            item.critical,
            item.evidence_number,
        ],
    )?;

    if changed == 0 {
        return Err(LedgerError::not_found("stock item", item.evidence_number));
    }

    set_item_devices(conn, item.evidence_number, &item.devices)
}

/// Write the post-movement stock columns for one item.
pub fn update_stock_after_movement(
    conn: &Connection,
    evidence_number: i64,
    update: &StockUpdate,
) -> LedgerResult<()> {
    let changed = match update {
        StockUpdate::Receipt {
            quantity,
            location,
            supplier,
            purchase_date,
            order_number,
            unit_price,
            total_value,
            note,
        } => conn.execute(
            "UPDATE stock
             SET quantity = ?1, location = ?2, supplier = ?3, purchase_date = ?4,
                 order_number = ?5, unit_price = ?6, total_value = ?7, note = ?8
             WHERE evidence_number = ?9",
            params![
                quantity,
                location,
                supplier,
                date_to_text(Some(*purchase_date)),
                order_number,
                decimal_to_real(*unit_price),
                decimal_to_real(*total_value),
                note,
                evidence_number,
            ],
        )?,
        StockUpdate::Issue {
            quantity,
            location,
            note,
            total_value,
        } => conn.execute(
            "UPDATE stock
             SET quantity = ?1, location = ?2, note = ?3, total_value = ?4
             WHERE evidence_number = ?5",
            params![
                quantity,
                location,
                note,
                decimal_to_real(*total_value),
                evidence_number,
            ],
        )?,
    };

    if changed == 0 {
        return Err(LedgerError::not_found("stock item", evidence_number));
    }
    Ok(())
}

pub fn delete_stock_item(conn: &Connection, evidence_number: i64) -> LedgerResult<()> {
    let changed = conn.execute(
        "DELETE FROM stock WHERE evidence_number = ?1",
        [evidence_number],
    )?;
    if changed == 0 {
        return Err(LedgerError::not_found("stock item", evidence_number));
    }
    Ok(())
}

/// Replace the device usage set of an item.
pub fn set_item_devices(
    conn: &Connection,
    evidence_number: i64,
    devices: &BTreeSet<String>,
) -> LedgerResult<()> {
    conn.execute("DELETE FROM stock_device WHERE item_id = ?1", [evidence_number])?;

    let mut stmt = conn
        .prepare_cached("INSERT INTO stock_device (item_id, device_code) VALUES (?1, ?2)")?;
    for code in devices {
        stmt.execute(params![evidence_number, code])?;
    }
    Ok(())
}

// ============================================================================
// AUDIT LOG
// ============================================================================

const AUDIT_COLUMNS: &str = "id, item_id, card_number, item_name, unit, accounting, movement_type,
    quantity_delta, resulting_quantity, unit_price, total_value, movement_unit_price,
    movement_value, location, supplier, order_number, purchase_date, issue_date,
    device_used, note, operator, timestamp";

fn audit_from_row(row: &Row<'_>) -> rusqlite::Result<AuditLogEntry> {
    Ok(AuditLogEntry {
        id: row.get("id")?,
        item_id: row.get("item_id")?,
        card_number: row.get("card_number")?,
        item_name: row.get("item_name")?,
        unit: row.get("unit")?,
        accounting: row.get("accounting")?,
        movement_type: row.get("movement_type")?,
        quantity_delta: row.get("quantity_delta")?,
        resulting_quantity: row.get("resulting_quantity")?,
        unit_price: decimal_column(row, "unit_price")?,
        total_value: total_column(row, "total_value")?,
        movement_unit_price: decimal_column(row, "movement_unit_price")?,
        movement_value: total_column(row, "movement_value")?,
        location: text_column(row, "location")?,
        supplier: text_column(row, "supplier")?,
        order_number: text_column(row, "order_number")?,
        purchase_date: date_column(row, "purchase_date")?,
        issue_date: date_column(row, "issue_date")?,
        device_used: text_column(row, "device_used")?,
        note: text_column(row, "note")?,
        operator: row.get("operator")?,
        timestamp: timestamp_column(row, "timestamp")?,
    })
}

/// Append an entry. The `id` field of the argument is ignored; the stored entry is returned.
pub fn insert_audit_entry(conn: &Connection, entry: &AuditLogEntry) -> LedgerResult<AuditLogEntry> {
    conn.execute(
        "INSERT INTO audit_log (
            item_id, card_number, item_name, unit, accounting, movement_type,
            quantity_delta, resulting_quantity, unit_price, total_value,
            movement_unit_price, movement_value, location, supplier, order_number,
            purchase_date, issue_date, device_used, note, operator, timestamp
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21)",
        params![
            entry.item_id,
            entry.card_number,
            entry.item_name,
            entry.unit,
            entry.accounting,
            entry.movement_type,
            entry.quantity_delta,
            entry.resulting_quantity,
            decimal_to_real(entry.unit_price),
            decimal_to_real(entry.total_value),
            decimal_to_real(entry.movement_unit_price),
            decimal_to_real(entry.movement_value),
            entry.location,
            entry.supplier,
            entry.order_number,
            date_to_text(entry.purchase_date),
            date_to_text(entry.issue_date),
            entry.device_used,
            entry.note,
            entry.operator,
            entry.timestamp.format(TIMESTAMP_FORMAT).to_string(),
        ],
    )?;

    let mut stored = entry.clone();
    stored.id = conn.last_insert_rowid();
    Ok(stored)
}

/// Whole audit log in insertion order.
pub fn list_audit_log(conn: &Connection) -> LedgerResult<Vec<AuditLogEntry>> {
    let sql = format!("SELECT {} FROM audit_log ORDER BY id", AUDIT_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let entries = stmt
        .query_map([], audit_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(entries)
}

pub fn audit_entries_for_item(conn: &Connection, item_id: i64) -> LedgerResult<Vec<AuditLogEntry>> {
    let sql = format!(
        "SELECT {} FROM audit_log WHERE item_id = ?1 ORDER BY id",
        AUDIT_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let entries = stmt
        .query_map([item_id], audit_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(entries)
}

pub fn count_audit_entries(conn: &Connection) -> LedgerResult<i64> {
    let count = conn.query_row("SELECT COUNT(*) FROM audit_log", [], |row| row.get(0))?;
    Ok(count)
}

// ============================================================================
// VARIANTS
// ============================================================================

fn variant_from_row(row: &Row<'_>) -> rusqlite::Result<SupplierVariant> {
    Ok(SupplierVariant {
        id: row.get("id")?,
        item_id: row.get("item_id")?,
        supplier_id: row.get("supplier_id")?,
        variant_name: row.get("variant_name")?,
        variant_number: row.get("variant_number")?,
        unit_price: decimal_column(row, "unit_price")?,
        lead_time_days: row.get("lead_time_days")?,
        min_order_qty: row.get("min_order_qty")?,
    })
}

fn variant_row_from_row(row: &Row<'_>) -> rusqlite::Result<VariantRow> {
    Ok(VariantRow {
        variant: variant_from_row(row)?,
        item_name: row.get("item_name")?,
        supplier_name: row.get("supplier_name")?,
        below_minimum: row.get("below_minimum")?,
    })
}

const VARIANT_LISTING: &str = "SELECT v.id, v.item_id, v.supplier_id, v.variant_name,
        v.variant_number, v.unit_price, v.lead_time_days, v.min_order_qty,
        s.name AS item_name, d.name AS supplier_name,
        CASE WHEN s.quantity < s.min_quantity THEN 1 ELSE 0 END AS below_minimum
    FROM variant v
    JOIN stock s ON v.item_id = s.evidence_number
    JOIN supplier d ON v.supplier_id = d.id";

pub fn variant_exists(conn: &Connection, item_id: i64, supplier_id: i64) -> LedgerResult<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM variant WHERE item_id = ?1 AND supplier_id = ?2)",
        params![item_id, supplier_id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// Insert a variant; returns it with its new id.
pub fn insert_variant(conn: &Connection, variant: &SupplierVariant) -> LedgerResult<SupplierVariant> {
    conn.execute(
        "INSERT INTO variant (
            item_id, supplier_id, variant_name, variant_number, unit_price,
            lead_time_days, min_order_qty
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            variant.item_id,
            variant.supplier_id,
            variant.variant_name,
            variant.variant_number,
            decimal_to_real(variant.unit_price),
            variant.lead_time_days,
            variant.min_order_qty,
        ],
    )?;

    let mut stored = variant.clone();
    stored.id = conn.last_insert_rowid();
    Ok(stored)
}

/// Update the editable variant columns; the (item, supplier) pair is fixed.
pub fn update_variant(conn: &Connection, variant: &SupplierVariant) -> LedgerResult<()> {
    let changed = conn.execute(
        "UPDATE variant
         SET variant_name = ?1, variant_number = ?2, unit_price = ?3,
             lead_time_days = ?4, min_order_qty = ?5
         WHERE id = ?6",
        params![
            variant.variant_name,
            variant.variant_number,
            decimal_to_real(variant.unit_price),
            variant.lead_time_days,
            variant.min_order_qty,
            variant.id,
        ],
    )?;
    if changed == 0 {
        return Err(LedgerError::not_found("variant", variant.id));
    }
    Ok(())
}

pub fn get_variant(conn: &Connection, id: i64) -> LedgerResult<SupplierVariant> {
    conn.query_row(
        "SELECT id, item_id, supplier_id, variant_name, variant_number, unit_price,
                lead_time_days, min_order_qty
         FROM variant WHERE id = ?1",
        [id],
        variant_from_row,
    )
    .optional()?
    .ok_or_else(|| LedgerError::not_found("variant", id))
}

pub fn list_variants(conn: &Connection) -> LedgerResult<Vec<VariantRow>> {
    let sql = format!("{} ORDER BY v.id", VARIANT_LISTING);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], variant_row_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn variants_for_item(conn: &Connection, item_id: i64) -> LedgerResult<Vec<VariantRow>> {
    let sql = format!("{} WHERE v.item_id = ?1 ORDER BY v.id", VARIANT_LISTING);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([item_id], variant_row_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============================================================================
// SUPPLIERS
// ============================================================================

fn supplier_from_row(row: &Row<'_>) -> rusqlite::Result<Supplier> {
    Ok(Supplier {
        id: row.get("id")?,
        name: row.get("name")?,
        contact: text_column(row, "contact")?,
        email: text_column(row, "email")?,
        phone: text_column(row, "phone")?,
        language: row.get("language")?,
    })
}

pub fn insert_supplier(conn: &Connection, supplier: &Supplier) -> LedgerResult<Supplier> {
    conn.execute(
        "INSERT INTO supplier (name, contact, email, phone, language)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            supplier.name,
            supplier.contact,
            supplier.email,
            supplier.phone,
            supplier.language,
        ],
    )?;

    let mut stored = supplier.clone();
    stored.id = conn.last_insert_rowid();
    Ok(stored)
}

/// The supplier name is its identity for stock rows; it is not rewritten here.
pub fn update_supplier(conn: &Connection, supplier: &Supplier) -> LedgerResult<()> {
    let changed = conn.execute(
        "UPDATE supplier SET contact = ?1, email = ?2, phone = ?3, language = ?4 WHERE id = ?5",
        params![
            supplier.contact,
            supplier.email,
            supplier.phone,
            supplier.language,
            supplier.id,
        ],
    )?;
    if changed == 0 {
        return Err(LedgerError::not_found("supplier", supplier.id));
    }
    Ok(())
}

pub fn list_suppliers(conn: &Connection) -> LedgerResult<Vec<Supplier>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, contact, email, phone, language FROM supplier ORDER BY name",
    )?;
    let suppliers = stmt
        .query_map([], supplier_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(suppliers)
}

pub fn find_supplier_by_name(conn: &Connection, name: &str) -> LedgerResult<Option<Supplier>> {
    let supplier = conn
        .query_row(
            "SELECT id, name, contact, email, phone, language FROM supplier WHERE name = ?1",
            [name],
            supplier_from_row,
        )
        .optional()?;
    Ok(supplier)
}

pub fn get_supplier(conn: &Connection, id: i64) -> LedgerResult<Supplier> {
    conn.query_row(
        "SELECT id, name, contact, email, phone, language FROM supplier WHERE id = ?1",
        [id],
        supplier_from_row,
    )
    .optional()?
    .ok_or_else(|| LedgerError::not_found("supplier", id))
}

// ============================================================================
// DEVICES
// ============================================================================

fn device_from_row(row: &Row<'_>) -> rusqlite::Result<Device> {
    Ok(Device {
        id: row.get("id")?,
        code: row.get("code")?,
        name: row.get("name")?,
        location: row.get("location")?,
        device_type: row.get("device_type")?,
    })
}

pub fn insert_device(conn: &Connection, device: &Device) -> LedgerResult<Device> {
    conn.execute(
        "INSERT INTO device (code, name, location, device_type) VALUES (?1, ?2, ?3, ?4)",
        params![device.code, device.name, device.location, device.device_type],
    )?;

    let mut stored = device.clone();
    stored.id = conn.last_insert_rowid();
    Ok(stored)
}

pub fn list_devices(conn: &Connection) -> LedgerResult<Vec<Device>> {
    let mut stmt =
        conn.prepare("SELECT id, code, name, location, device_type FROM device ORDER BY code")?;
    let devices = stmt
        .query_map([], device_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(devices)
}

pub fn find_device_by_code(conn: &Connection, code: &str) -> LedgerResult<Option<Device>> {
    let device = conn
        .query_row(
            "SELECT id, code, name, location, device_type FROM device WHERE code = ?1",
            [code],
            device_from_row,
        )
        .optional()?;
    Ok(device)
}

// ============================================================================
// USERS
// ============================================================================

pub fn insert_user(conn: &Connection, user: &UserRecord) -> LedgerResult<i64> {
    conn.execute(
        "INSERT INTO users (username, password_hash, name, role) VALUES (?1, ?2, ?3, ?4)",
        params![user.username, user.password_hash, user.name, user.role],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn find_user(conn: &Connection, username: &str) -> LedgerResult<Option<UserRecord>> {
    let user = conn
        .query_row(
            "SELECT id, username, password_hash, name, role FROM users WHERE username = ?1",
            [username],
            |row| {
                Ok(UserRecord {
                    id: row.get("id")?,
                    username: row.get("username")?,
                    password_hash: row.get("password_hash")?,
                    name: row.get("name")?,
                    role: row.get("role")?,
                })
            },
        )
        .optional()?;
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_item(evidence_number: i64) -> StockItem {
        StockItem {
            evidence_number,
            card_number: evidence_number,
            name: format!("Ložisko 62{:02}", evidence_number),
            quantity: 0,
            min_quantity: 2,
            unit: "ks".to_string(),
            location: "A1".to_string(),
            supplier: String::new(),
            purchase_date: None,
            order_number: String::new(),
            unit_price: Decimal::ZERO,
            total_value: Decimal::ZERO,
            note: String::new(),
            ordered: false,
            accounting: true,
            critical: false,
            devices: BTreeSet::new(),
        }
    }

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    #[test]
    fn test_setup_is_idempotent() {
        let conn = setup();
        setup_database(&conn).unwrap();
        assert_eq!(count_audit_entries(&conn).unwrap(), 0);
    }

    #[test]
    fn test_stock_round_trip_by_name() {
        let conn = setup();
        let mut item = sample_item(1);
        item.unit_price = dec!(6.25);
        item.total_value = dec!(62.5);
        item.quantity = 10;
        insert_stock_item(&conn, &item).unwrap();

        let loaded = get_stock_item(&conn, 1).unwrap();
        assert_eq!(loaded.name, item.name);
        assert_eq!(loaded.quantity, 10);
        assert_eq!(loaded.unit_price, dec!(6.25));
        assert_eq!(loaded.total_value, dec!(62.5));
        assert!(loaded.accounting);
    }

    #[test]
    fn test_missing_item_is_not_found() {
        let conn = setup();
        assert!(fetch_stock_item(&conn, 42).unwrap().is_none());
        let err = get_stock_item(&conn, 42).unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[test]
    fn test_max_keys_on_empty_table() {
        let conn = setup();
        assert_eq!(max_evidence_number(&conn).unwrap(), 0);
        assert_eq!(max_card_number(&conn).unwrap(), 0);

        insert_stock_item(&conn, &sample_item(7)).unwrap();
        assert_eq!(max_evidence_number(&conn).unwrap(), 7);
    }

    #[test]
    fn test_negative_quantity_is_refused_by_schema() {
        let conn = setup();
        let mut item = sample_item(1);
        item.quantity = -1;
        let err = insert_stock_item(&conn, &item).unwrap_err();
        assert_eq!(err.kind(), "integrity");
    }

    #[test]
    fn test_issue_update_touches_only_its_columns() {
        let conn = setup();
        let mut item = sample_item(1);
        item.quantity = 15;
        item.unit_price = dec!(6.00);
        item.total_value = dec!(90.0);
        item.supplier = "Ferona".to_string();
        insert_stock_item(&conn, &item).unwrap();

        update_stock_after_movement(
            &conn,
            1,
            &StockUpdate::Issue {
                quantity: 10,
                location: "B2".to_string(),
                note: "výměna".to_string(),
                total_value: dec!(60.0),
            },
        )
        .unwrap();

        let loaded = get_stock_item(&conn, 1).unwrap();
        assert_eq!(loaded.quantity, 10);
        assert_eq!(loaded.location, "B2");
        assert_eq!(loaded.total_value, dec!(60.0));
        assert_eq!(loaded.unit_price, dec!(6.00));
        assert_eq!(loaded.supplier, "Ferona");
    }

    #[test]
    fn test_device_set_round_trip() {
        let conn = setup();
        for code in ["LIS_1", "PEC_2"] {
            insert_device(
                &conn,
                &Device {
                    id: 0,
                    code: code.to_string(),
                    name: code.to_string(),
                    location: "Hala".to_string(),
                    device_type: "lis".to_string(),
                },
            )
            .unwrap();
        }

        let mut item = sample_item(1);
        item.devices = ["LIS_1".to_string(), "PEC_2".to_string()].into_iter().collect();
        insert_stock_item(&conn, &item).unwrap();

        let loaded = get_stock_item(&conn, 1).unwrap();
        assert_eq!(loaded.devices.len(), 2);
        assert!(loaded.devices.contains("PEC_2"));
    }

    #[test]
    fn test_variant_pair_is_unique() {
        let conn = setup();
        insert_stock_item(&conn, &sample_item(1)).unwrap();
        let supplier = insert_supplier(
            &conn,
            &Supplier {
                id: 0,
                name: "Ferona".to_string(),
                contact: String::new(),
                email: String::new(),
                phone: String::new(),
                language: "CZ".to_string(),
            },
        )
        .unwrap();

        let variant = SupplierVariant {
            id: 0,
            item_id: 1,
            supplier_id: supplier.id,
            variant_name: "SKF 6205".to_string(),
            variant_number: "6205-2RS".to_string(),
            unit_price: dec!(4.5),
            lead_time_days: 7,
            min_order_qty: 10,
        };

        assert!(!variant_exists(&conn, 1, supplier.id).unwrap());
        insert_variant(&conn, &variant).unwrap();
        assert!(variant_exists(&conn, 1, supplier.id).unwrap());

        let err = insert_variant(&conn, &variant).unwrap_err();
        assert_eq!(err.kind(), "integrity");

        let rows = list_variants(&conn).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].supplier_name, "Ferona");
        assert!(rows[0].below_minimum);
    }

    #[test]
    fn test_direction_parse() {
        assert_eq!(Direction::parse("receipt"), Some(Direction::Receipt));
        assert_eq!(Direction::parse("VÝDEJ"), Some(Direction::Issue));
        assert_eq!(Direction::parse("výdej"), Some(Direction::Issue));
        assert_eq!(Direction::parse(" příjem "), Some(Direction::Receipt));
        assert_eq!(Direction::parse("transfer"), None);
    }
}
