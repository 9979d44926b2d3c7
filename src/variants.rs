// 🔗 Variant Consistency Checker - every (item, supplier) used for a receipt has a variant
//
// The checker only answers "does the pair exist?". Creating the missing variant
// is a separate, user-confirmed step: the movement returns a pre-filled
// `VariantDraft`, the caller completes it and passes it to `create_variant`.
//
// An existing variant is left untouched on receipt; its price is not refreshed.

use crate::db::{self, StockItem, Supplier, SupplierVariant, VariantRow};
use crate::error::{LedgerError, LedgerResult, ValidationError};
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub const VARIANT_MISSING_MESSAGE: &str =
    "Varianta s tímto dodavatelem ještě neexistuje, prosím, vytvořte ji.";
pub const VARIANT_EXISTS_MESSAGE: &str = "Tato varianta již existuje.";

/// Variant about to be created, pre-filled from a receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantDraft {
    pub item_id: i64,
    pub supplier_id: i64,
    /// Display only, the id is authoritative
    #[serde(default)]
    pub supplier_name: String,
    pub variant_name: String,
    pub variant_number: String,
    pub unit_price: Decimal,
    #[serde(default)]
    pub lead_time_days: i64,
    #[serde(default)]
    pub min_order_qty: i64,
}

impl VariantDraft {
    /// Draft for the pair a receipt just used: item name, supplier and the entered price.
    pub fn for_receipt(item: &StockItem, supplier: &Supplier, unit_price: Decimal) -> Self {
        VariantDraft {
            item_id: item.evidence_number,
            supplier_id: supplier.id,
            supplier_name: supplier.name.clone(),
            variant_name: item.name.clone(),
            variant_number: String::new(),
            unit_price,
            lead_time_days: 0,
            min_order_qty: 0,
        }
    }

    fn into_variant(self) -> SupplierVariant {
        SupplierVariant {
            id: 0,
            item_id: self.item_id,
            supplier_id: self.supplier_id,
            variant_name: self.variant_name.trim().to_string(),
            variant_number: self.variant_number.trim().to_string(),
            unit_price: self.unit_price,
            lead_time_days: self.lead_time_days,
            min_order_qty: self.min_order_qty,
        }
    }
}

/// Does a variant exist for the pair? Read-only; calling it twice gives the same answer.
pub fn ensure_variant(conn: &Connection, item_id: i64, supplier_id: i64) -> LedgerResult<bool> {
    let exists = db::variant_exists(conn, item_id, supplier_id)?;
    debug!(item_id, supplier_id, exists, "variant existence checked");
    Ok(exists)
}

fn check_variant_fields(variant: &SupplierVariant) -> Result<(), ValidationError> {
    if variant.variant_name.is_empty() {
        return Err(ValidationError::new(
            "variant_name",
            "Před uložením nejdříve zadejte položku Název varianty",
        ));
    }
    if variant.variant_number.is_empty() {
        return Err(ValidationError::new(
            "variant_number",
            "Před uložením nejdříve zadejte položku Číslo varianty",
        ));
    }
    if variant.lead_time_days < 0 {
        return Err(ValidationError::new(
            "lead_time_days",
            "Položka Dodací lhůta musí být celé nezáporné číslo.",
        ));
    }
    if variant.min_order_qty < 0 {
        return Err(ValidationError::new(
            "min_order_qty",
            "Položka Min. obj. množství musí být celé nezáporné číslo.",
        ));
    }
    if variant.unit_price < Decimal::ZERO {
        return Err(ValidationError::new(
            "unit_price",
            "Položka EUR/jednotka musí být nezáporné reálné číslo s desetinnou tečkou.",
        ));
    }
    Ok(())
}

/// Create a variant from a completed draft.
///
/// The pair is checked first so a duplicate gets the friendly message; the
/// unique index still backs it up as an integrity error.
pub fn create_variant(conn: &Connection, draft: VariantDraft) -> LedgerResult<SupplierVariant> {
    let variant = draft.into_variant();
    check_variant_fields(&variant)?;

    // Both ends must exist
    db::get_stock_item(conn, variant.item_id)?;
    db::get_supplier(conn, variant.supplier_id)?;

    if db::variant_exists(conn, variant.item_id, variant.supplier_id)? {
        warn!(
            item_id = variant.item_id,
            supplier_id = variant.supplier_id,
            "variant already exists"
        );
        return Err(LedgerError::rejected(VARIANT_EXISTS_MESSAGE));
    }

    let stored = db::insert_variant(conn, &variant)?;
    info!(
        variant_id = stored.id,
        item_id = stored.item_id,
        supplier_id = stored.supplier_id,
        "variant created"
    );
    Ok(stored)
}

/// Edit name, number, price, lead time and minimum order. Item and supplier stay fixed.
pub fn update_variant(conn: &Connection, variant: &SupplierVariant) -> LedgerResult<SupplierVariant> {
    let mut updated = db::get_variant(conn, variant.id)?;
    updated.variant_name = variant.variant_name.trim().to_string();
    updated.variant_number = variant.variant_number.trim().to_string();
    updated.unit_price = variant.unit_price;
    updated.lead_time_days = variant.lead_time_days;
    updated.min_order_qty = variant.min_order_qty;

    check_variant_fields(&updated)?;
    db::update_variant(conn, &updated)?;
    info!(variant_id = updated.id, "variant updated");
    Ok(updated)
}

pub fn list_variants(conn: &Connection) -> LedgerResult<Vec<VariantRow>> {
    db::list_variants(conn)
}

pub fn variants_for_item(conn: &Connection, item_id: i64) -> LedgerResult<Vec<VariantRow>> {
    db::variants_for_item(conn, item_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::setup_database;
    use rust_decimal_macros::dec;
    use std::collections::BTreeSet;

    fn setup() -> (Connection, StockItem, Supplier) {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let item = StockItem {
            evidence_number: 1,
            card_number: 1,
            name: "Filtr oleje".to_string(),
            quantity: 4,
            min_quantity: 2,
            unit: "ks".to_string(),
            location: "B1".to_string(),
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
        };
        db::insert_stock_item(&conn, &item).unwrap();

        let supplier = db::insert_supplier(
            &conn,
            &Supplier {
                id: 0,
                name: "Hennlich".to_string(),
                contact: "Petr".to_string(),
                email: "petr@hennlich.cz".to_string(),
                phone: String::new(),
                language: "CZ".to_string(),
            },
        )
        .unwrap();

        (conn, item, supplier)
    }

    #[test]
    fn test_draft_is_prefilled_from_receipt() {
        let (_conn, item, supplier) = setup();
        let draft = VariantDraft::for_receipt(&item, &supplier, dec!(7.90));
        assert_eq!(draft.item_id, 1);
        assert_eq!(draft.supplier_id, supplier.id);
        assert_eq!(draft.variant_name, "Filtr oleje");
        assert_eq!(draft.unit_price, dec!(7.90));
        assert_eq!(draft.lead_time_days, 0);
        assert_eq!(draft.min_order_qty, 0);
    }

    #[test]
    fn test_ensure_variant_is_idempotent() {
        let (conn, item, supplier) = setup();
        assert!(!ensure_variant(&conn, 1, supplier.id).unwrap());

        let mut draft = VariantDraft::for_receipt(&item, &supplier, dec!(7.90));
        draft.variant_number = "HF-7".to_string();
        create_variant(&conn, draft).unwrap();

        assert!(ensure_variant(&conn, 1, supplier.id).unwrap());
        assert!(ensure_variant(&conn, 1, supplier.id).unwrap());
    }

    #[test]
    fn test_duplicate_variant_is_rejected() {
        let (conn, item, supplier) = setup();
        let mut draft = VariantDraft::for_receipt(&item, &supplier, dec!(7.90));
        draft.variant_number = "HF-7".to_string();
        create_variant(&conn, draft.clone()).unwrap();

        let err = create_variant(&conn, draft).unwrap_err();
        assert_eq!(err.kind(), "rejected");
        assert_eq!(err.to_string(), VARIANT_EXISTS_MESSAGE);
    }

    #[test]
    fn test_draft_needs_variant_number() {
        let (conn, item, supplier) = setup();
        let draft = VariantDraft::for_receipt(&item, &supplier, dec!(7.90));
        let err = create_variant(&conn, draft).unwrap_err();
        assert_eq!(err.field(), Some("variant_number"));
        assert!(!ensure_variant(&conn, 1, supplier.id).unwrap());
    }

    #[test]
    fn test_unknown_supplier_is_not_found() {
        let (conn, item, mut supplier) = setup();
        supplier.id = 99;
        let mut draft = VariantDraft::for_receipt(&item, &supplier, dec!(1));
        draft.variant_number = "X".to_string();
        let err = create_variant(&conn, draft).unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[test]
    fn test_update_keeps_pair() {
        let (conn, item, supplier) = setup();
        let mut draft = VariantDraft::for_receipt(&item, &supplier, dec!(7.90));
        draft.variant_number = "HF-7".to_string();
        let created = create_variant(&conn, draft).unwrap();

        let mut edit = created.clone();
        edit.item_id = 42;
        edit.unit_price = dec!(8.10);
        edit.lead_time_days = 14;
        let updated = update_variant(&conn, &edit).unwrap();

        assert_eq!(updated.item_id, 1);
        assert_eq!(updated.unit_price, dec!(8.10));

        let rows = variants_for_item(&conn, 1).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].variant.lead_time_days, 14);
        assert_eq!(rows[0].supplier_name, "Hennlich");
    }
}
