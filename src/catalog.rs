// 📦 Catalog - stock items and reference data (suppliers, devices)
//
// Items are created once with zero stock and then only change through
// movements or descriptive edits. The only deletable item is the last one
// added, and only while it holds nothing.

use crate::db::{self, Device, StockItem, Supplier};
use crate::error::{LedgerError, LedgerResult, ValidationError};
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{info, warn};
use unicode_normalization::UnicodeNormalization;

pub const DUPLICATE_MESSAGE: &str =
    "Položka se zadaným ID číslem, uživatelem nebo jménem už v databázi existuje.";
pub const DELETE_REFUSED_MESSAGE: &str =
    "Lze smazat pouze poslední zadanou položku s nulovým množstvím!";

/// Longest device code accepted after normalisation.
pub const DEVICE_CODE_MAX_LEN: usize = 8;

fn mandatory(field: &'static str, label: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new(
            field,
            format!("Před uložením nejdříve zadejte položku {}", label),
        ));
    }
    Ok(())
}

fn non_negative(field: &'static str, label: &str, value: i64) -> Result<(), ValidationError> {
    if value < 0 {
        return Err(ValidationError::new(
            field,
            format!("Položka {} musí být celé nezáporné číslo.", label),
        ));
    }
    Ok(())
}

/// Swap the store's raw constraint text for the user-facing duplicate message.
fn friendly_duplicate(err: LedgerError) -> LedgerError {
    match err {
        LedgerError::Integrity(detail) => {
            warn!(%detail, "duplicate refused");
            LedgerError::Integrity(DUPLICATE_MESSAGE.to_string())
        }
        other => other,
    }
}

// ============================================================================
// STOCK ITEMS
// ============================================================================

/// Descriptive fields of an item; everything a user may type outside a movement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemDetails {
    pub name: String,
    pub unit: String,
    pub min_quantity: i64,
    pub location: String,
    pub note: String,
    pub ordered: bool,
    pub accounting: bool,
    pub critical: bool,
    pub devices: BTreeSet<String>,
}

fn check_devices(conn: &Connection, devices: &BTreeSet<String>) -> LedgerResult<()> {
    for code in devices {
        if db::find_device_by_code(conn, code)?.is_none() {
            return Err(ValidationError::new(
                "devices",
                format!("Zařízení {} není v seznamu zařízení.", code),
            )
            .into());
        }
    }
    Ok(())
}

/// Add a new item with zero stock. Evidence and card numbers are max + 1.
pub fn add_item(conn: &Connection, details: &ItemDetails) -> LedgerResult<StockItem> {
    mandatory("name", "Název dílu", &details.name)?;
    mandatory("unit", "Jedn.", &details.unit)?;
    non_negative("min_quantity", "Minimum", details.min_quantity)?;
    check_devices(conn, &details.devices)?;

    let item = StockItem {
        evidence_number: db::max_evidence_number(conn)? + 1,
        card_number: db::max_card_number(conn)? + 1,
        name: details.name.trim().to_string(),
        quantity: 0,
        min_quantity: details.min_quantity,
        unit: details.unit.trim().to_string(),
        location: details.location.trim().to_string(),
        supplier: String::new(),
        purchase_date: None,
        order_number: String::new(),
        unit_price: Decimal::ZERO,
        total_value: Decimal::ZERO,
        note: details.note.trim().to_string(),
        ordered: details.ordered,
        accounting: details.accounting,
        critical: details.critical,
        devices: details.devices.clone(),
    };

    db::insert_stock_item(conn, &item).map_err(friendly_duplicate)?;
    info!(evidence_number = item.evidence_number, name = %item.name, "stock item added");
    Ok(item)
}

/// Edit descriptive fields. Quantity, unit, prices and purchase fields are left alone.
pub fn edit_item(
    conn: &Connection,
    evidence_number: i64,
    card_number: i64,
    details: &ItemDetails,
) -> LedgerResult<StockItem> {
    mandatory("name", "Název dílu", &details.name)?;
    non_negative("card_number", "Č. karty", card_number)?;
    non_negative("min_quantity", "Minimum", details.min_quantity)?;
    check_devices(conn, &details.devices)?;

    let mut item = db::get_stock_item(conn, evidence_number)?;
    item.card_number = card_number;
    item.name = details.name.trim().to_string();
    item.min_quantity = details.min_quantity;
    item.location = details.location.trim().to_string();
    item.note = details.note.trim().to_string();
    item.ordered = details.ordered;
    item.accounting = details.accounting;
    item.critical = details.critical;
    item.devices = details.devices.clone();

    db::update_stock_details(conn, &item).map_err(friendly_duplicate)?;
    info!(evidence_number, "stock item edited");
    Ok(item)
}

/// Delete an item; only the last one added, and only with zero quantity.
pub fn delete_item(conn: &Connection, evidence_number: i64) -> LedgerResult<()> {
    let item = db::get_stock_item(conn, evidence_number)?;
    let last = db::max_evidence_number(conn)?;

    if item.evidence_number != last || item.quantity != 0 {
        warn!(evidence_number, last, quantity = item.quantity, "delete refused");
        return Err(LedgerError::rejected(DELETE_REFUSED_MESSAGE));
    }

    db::delete_stock_item(conn, evidence_number)?;
    info!(evidence_number, "stock item deleted");
    Ok(())
}

pub fn list_items(conn: &Connection) -> LedgerResult<Vec<StockItem>> {
    db::list_stock(conn)
}

pub fn below_minimum_items(conn: &Connection) -> LedgerResult<Vec<StockItem>> {
    Ok(db::list_stock(conn)?
        .into_iter()
        .filter(StockItem::is_below_minimum)
        .collect())
}

// ============================================================================
// SUPPLIERS
// ============================================================================

pub fn add_supplier(conn: &Connection, supplier: &Supplier) -> LedgerResult<Supplier> {
    mandatory("name", "Dodavatel", &supplier.name)?;
    mandatory("language", "Jazyk", &supplier.language)?;

    let clean = Supplier {
        id: 0,
        name: supplier.name.trim().to_string(),
        contact: supplier.contact.trim().to_string(),
        email: supplier.email.trim().to_string(),
        phone: supplier.phone.trim().to_string(),
        language: supplier.language.trim().to_string(),
    };
    let stored = db::insert_supplier(conn, &clean).map_err(friendly_duplicate)?;
    info!(supplier_id = stored.id, name = %stored.name, "supplier added");
    Ok(stored)
}

/// Contact details and language only; the name is fixed once created.
pub fn update_supplier(conn: &Connection, supplier: &Supplier) -> LedgerResult<Supplier> {
    mandatory("language", "Jazyk", &supplier.language)?;

    let mut stored = db::get_supplier(conn, supplier.id)?;
    stored.contact = supplier.contact.trim().to_string();
    stored.email = supplier.email.trim().to_string();
    stored.phone = supplier.phone.trim().to_string();
    stored.language = supplier.language.trim().to_string();

    db::update_supplier(conn, &stored)?;
    info!(supplier_id = stored.id, "supplier updated");
    Ok(stored)
}

pub fn list_suppliers(conn: &Connection) -> LedgerResult<Vec<Supplier>> {
    db::list_suppliers(conn)
}

// ============================================================================
// DEVICES
// ============================================================================

/// Normalise a device code: NFKD-decomposed with every non-ASCII char dropped,
/// upper case, spaces become `_`, at most 8 characters.
pub fn normalize_device_code(raw: &str) -> Result<String, ValidationError> {
    let code: String = raw
        .trim()
        .nfkd()
        .filter(char::is_ascii)
        .map(|c| if c == ' ' { '_' } else { c.to_ascii_uppercase() })
        .collect();

    if code.is_empty() {
        return Err(ValidationError::new(
            "code",
            "Před uložením nejdříve zadejte položku Zařízení",
        ));
    }
    if code.len() > DEVICE_CODE_MAX_LEN {
        return Err(ValidationError::new(
            "code",
            format!(
                "Zkratka zařízení po normalizaci: {} je delší než {} znaků.",
                code, DEVICE_CODE_MAX_LEN
            ),
        ));
    }
    Ok(code)
}

pub fn add_device(conn: &Connection, device: &Device) -> LedgerResult<Device> {
    let code = normalize_device_code(&device.code)?;
    mandatory("name", "Název zařízení", &device.name)?;
    mandatory("location", "Umístění", &device.location)?;
    mandatory("device_type", "Typ zařízení", &device.device_type)?;

    let clean = Device {
        id: 0,
        code,
        name: device.name.trim().to_string(),
        location: device.location.trim().to_string(),
        device_type: device.device_type.trim().to_string(),
    };
    let stored = db::insert_device(conn, &clean).map_err(friendly_duplicate)?;
    info!(device_id = stored.id, code = %stored.code, "device added");
    Ok(stored)
}

pub fn list_devices(conn: &Connection) -> LedgerResult<Vec<Device>> {
    db::list_devices(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        db::setup_database(&conn).unwrap();
        conn
    }

    fn details(name: &str) -> ItemDetails {
        ItemDetails {
            name: name.to_string(),
            unit: "ks".to_string(),
            min_quantity: 3,
            location: "A1".to_string(),
            accounting: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_add_item_numbers_sequentially() {
        let conn = setup();
        let first = add_item(&conn, &details("Šroub M8")).unwrap();
        let second = add_item(&conn, &details("Matice M8")).unwrap();

        assert_eq!(first.evidence_number, 1);
        assert_eq!(second.evidence_number, 2);
        assert_eq!(second.card_number, 2);
        assert_eq!(second.quantity, 0);
        assert_eq!(second.unit_price, Decimal::ZERO);
        assert!(second.is_below_minimum());
    }

    #[test]
    fn test_add_item_requires_name_and_unit() {
        let conn = setup();
        let err = add_item(&conn, &details("")).unwrap_err();
        assert_eq!(err.field(), Some("name"));

        let mut d = details("Šroub");
        d.unit.clear();
        assert_eq!(add_item(&conn, &d).unwrap_err().field(), Some("unit"));

        d.unit = "ks".to_string();
        d.min_quantity = -1;
        assert_eq!(add_item(&conn, &d).unwrap_err().field(), Some("min_quantity"));
    }

    #[test]
    fn test_edit_leaves_quantity_alone() {
        let conn = setup();
        let item = add_item(&conn, &details("Šroub M8")).unwrap();

        let mut d = details("Šroub M8 pozink");
        d.min_quantity = 10;
        d.critical = true;
        let edited = edit_item(&conn, item.evidence_number, 55, &d).unwrap();

        assert_eq!(edited.name, "Šroub M8 pozink");
        assert_eq!(edited.card_number, 55);
        assert_eq!(edited.quantity, 0);
        assert!(edited.critical);
        assert_eq!(db::get_stock_item(&conn, 1).unwrap().min_quantity, 10);
    }

    #[test]
    fn test_duplicate_card_number_is_friendly_integrity() {
        let conn = setup();
        add_item(&conn, &details("A")).unwrap();
        let b = add_item(&conn, &details("B")).unwrap();

        let err = edit_item(&conn, b.evidence_number, 1, &details("B")).unwrap_err();
        assert_eq!(err.kind(), "integrity");
        assert_eq!(err.to_string(), format!("integrity violation: {}", DUPLICATE_MESSAGE));
    }

    #[test]
    fn test_delete_only_last_empty_item() {
        let conn = setup();
        add_item(&conn, &details("A")).unwrap();
        add_item(&conn, &details("B")).unwrap();

        let err = delete_item(&conn, 1).unwrap_err();
        assert_eq!(err.to_string(), DELETE_REFUSED_MESSAGE);

        conn.execute("UPDATE stock SET quantity = 4 WHERE evidence_number = 2", [])
            .unwrap();
        assert_eq!(delete_item(&conn, 2).unwrap_err().kind(), "rejected");

        conn.execute("UPDATE stock SET quantity = 0 WHERE evidence_number = 2", [])
            .unwrap();
        delete_item(&conn, 2).unwrap();
        assert_eq!(list_items(&conn).unwrap().len(), 1);
    }

    #[test]
    fn test_below_minimum_filter() {
        let conn = setup();
        add_item(&conn, &details("A")).unwrap();
        let mut d = details("B");
        d.min_quantity = 0;
        add_item(&conn, &d).unwrap();

        let below = below_minimum_items(&conn).unwrap();
        assert_eq!(below.len(), 1);
        assert_eq!(below[0].name, "A");
    }

    #[test]
    fn test_device_code_normalisation() {
        assert_eq!(normalize_device_code("lis č 2").unwrap(), "LIS_C_2");
        assert_eq!(normalize_device_code("  Pec  ").unwrap(), "PEC");
        assert_eq!(normalize_device_code("Győr 2").unwrap(), "GYOR_2");
        assert_eq!(normalize_device_code("Señor").unwrap(), "SENOR");
        // No decomposition for Ł, so it is dropped
        assert_eq!(normalize_device_code("Łódź").unwrap(), "ODZ");
        assert_eq!(normalize_device_code("Ø①").unwrap(), "1");
        assert_eq!(normalize_device_code("Kompresor").unwrap_err().field, "code");
        assert!(normalize_device_code("").is_err());
    }

    #[test]
    fn test_devices_are_unique_after_normalisation() {
        let conn = setup();
        let device = Device {
            id: 0,
            code: "lis 1".to_string(),
            name: "Lis".to_string(),
            location: "Hala 1".to_string(),
            device_type: "lis".to_string(),
        };
        assert_eq!(add_device(&conn, &device).unwrap().code, "LIS_1");

        let again = Device {
            code: "LIS_1".to_string(),
            ..device
        };
        assert_eq!(add_device(&conn, &again).unwrap_err().kind(), "integrity");
    }

    #[test]
    fn test_item_devices_must_exist() {
        let conn = setup();
        let mut d = details("A");
        d.devices.insert("NIC".to_string());
        assert_eq!(add_item(&conn, &d).unwrap_err().field(), Some("devices"));
    }

    #[test]
    fn test_supplier_rules() {
        let conn = setup();
        let mut s = Supplier {
            id: 0,
            name: "Ferona".to_string(),
            contact: String::new(),
            email: "obchod@ferona.cz".to_string(),
            phone: String::new(),
            language: String::new(),
        };
        assert_eq!(add_supplier(&conn, &s).unwrap_err().field(), Some("language"));

        s.language = "CZ".to_string();
        let stored = add_supplier(&conn, &s).unwrap();
        assert_eq!(add_supplier(&conn, &s).unwrap_err().kind(), "integrity");

        let mut edit = stored.clone();
        edit.name = "Jiné jméno".to_string();
        edit.phone = "+420 123".to_string();
        let updated = update_supplier(&conn, &edit).unwrap();
        assert_eq!(updated.name, "Ferona");
        assert_eq!(updated.phone, "+420 123");
    }
}
