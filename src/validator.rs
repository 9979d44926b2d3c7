// ✅ Validator - raw movement form → typed movement, or the first failing field
//
// Receipt and issue forms differ in which fields are mandatory, which date they
// carry and whether a unit price is read. Those differences are data
// (`MovementRules`), the checks below are shared.
//
// Check order, first violation wins:
//   1. issue from empty stock
//   2. mandatory fields
//   3. quantity delta is a positive integer
//   4. issue delta ≤ on-hand quantity
//   5. receipt unit price is a positive real
//   6. date is YYYY-MM-DD, then a real calendar date
//
// No side effects: the same form against the same stock level always gives the
// same answer.

use crate::db::{Direction, StockItem, DATE_FORMAT};
use crate::error::ValidationError;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

// ============================================================================
// FIELDS & RULES
// ============================================================================

/// A form field: stable identifier plus the label shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub label: &'static str,
}

pub const QUANTITY_DELTA: Field = Field { name: "quantity_delta", label: "Změna množství" };
pub const UNIT_PRICE: Field = Field { name: "unit_price", label: "EUR/jednotka" };
pub const LOCATION: Field = Field { name: "location", label: "Umístění" };
pub const SUPPLIER: Field = Field { name: "supplier", label: "Dodavatel" };
pub const ORDER_NUMBER: Field = Field { name: "order_number", label: "Objednávka" };
pub const DEVICE_USED: Field = Field { name: "device_used", label: "Použité zařízení" };
pub const PURCHASE_DATE: Field = Field { name: "purchase_date", label: "Datum nákupu" };
pub const ISSUE_DATE: Field = Field { name: "issue_date", label: "Datum výdeje" };

/// Per-direction validation rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MovementRules {
    pub direction: Direction,
    /// Checked in this order
    pub mandatory: &'static [Field],
    pub date_field: Field,
    /// Receipts book the entered price; issues use the stock price
    pub reads_unit_price: bool,
}

pub const RECEIPT_RULES: MovementRules = MovementRules {
    direction: Direction::Receipt,
    mandatory: &[QUANTITY_DELTA, LOCATION, SUPPLIER, ORDER_NUMBER],
    date_field: PURCHASE_DATE,
    reads_unit_price: true,
};

pub const ISSUE_RULES: MovementRules = MovementRules {
    direction: Direction::Issue,
    mandatory: &[QUANTITY_DELTA, DEVICE_USED, LOCATION],
    date_field: ISSUE_DATE,
    reads_unit_price: false,
};

impl MovementRules {
    pub fn for_direction(direction: Direction) -> &'static MovementRules {
        match direction {
            Direction::Receipt => &RECEIPT_RULES,
            Direction::Issue => &ISSUE_RULES,
        }
    }
}

// ============================================================================
// INPUT
// ============================================================================

/// Movement form exactly as typed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MovementForm {
    pub quantity_delta: String,
    pub unit_price: String,
    pub location: String,
    pub supplier: String,
    pub order_number: String,
    pub device_used: String,
    /// Purchase date for receipts, issue date for issues
    pub movement_date: String,
    pub note: String,
}

impl MovementForm {
    /// Form pre-filled from the item the way the entry screen opens it:
    /// current location, price and note, today's date.
    pub fn prefilled(item: &StockItem, today: NaiveDate) -> Self {
        MovementForm {
            unit_price: item.unit_price.to_string(),
            location: item.location.clone(),
            note: item.note.clone(),
            movement_date: today.format(DATE_FORMAT).to_string(),
            ..Default::default()
        }
    }

    fn value(&self, field: Field) -> &str {
        match field.name {
            "quantity_delta" => &self.quantity_delta,
            "unit_price" => &self.unit_price,
            "location" => &self.location,
            "supplier" => &self.supplier,
            "order_number" => &self.order_number,
            "device_used" => &self.device_used,
            "purchase_date" | "issue_date" => &self.movement_date,
            _ => "",
        }
    }
}

/// Pre-movement snapshot the validator checks against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockLevel {
    pub quantity: i64,
    pub unit_price: Decimal,
}

impl From<&StockItem> for StockLevel {
    fn from(item: &StockItem) -> Self {
        StockLevel {
            quantity: item.quantity,
            unit_price: item.unit_price,
        }
    }
}

// ============================================================================
// OUTPUT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReceiptFields {
    pub quantity: i64,
    pub unit_price: Decimal,
    pub location: String,
    pub supplier: String,
    pub order_number: String,
    pub purchase_date: NaiveDate,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssueFields {
    pub quantity: i64,
    pub location: String,
    pub device_used: String,
    pub issue_date: NaiveDate,
    pub note: String,
}

/// An accepted, type-coerced movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "direction", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementSpec {
    Receipt(ReceiptFields),
    Issue(IssueFields),
}

impl MovementSpec {
    pub fn direction(&self) -> Direction {
        match self {
            MovementSpec::Receipt(_) => Direction::Receipt,
            MovementSpec::Issue(_) => Direction::Issue,
        }
    }

    /// Unsigned quantity delta.
    pub fn quantity(&self) -> i64 {
        match self {
            MovementSpec::Receipt(r) => r.quantity,
            MovementSpec::Issue(i) => i.quantity,
        }
    }

    /// Price entered on the form (receipts only).
    pub fn entered_unit_price(&self) -> Option<Decimal> {
        match self {
            MovementSpec::Receipt(r) => Some(r.unit_price),
            MovementSpec::Issue(_) => None,
        }
    }
}

// ============================================================================
// CHECKS
// ============================================================================

fn mandatory_message(field: Field) -> String {
    format!("Před uložením nejdříve zadejte položku {}", field.label)
}

/// `^\d{4}-\d{2}-\d{2}$`
fn has_date_shape(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        })
}

pub fn parse_positive_integer(field: Field, raw: &str) -> Result<i64, ValidationError> {
    let raw = raw.trim();
    let invalid = || ValidationError::new(field.name, format!("Položka {} musí být kladné celé číslo.", field.label));

    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    match raw.parse::<i64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(invalid()),
    }
}

pub fn parse_positive_real(field: Field, raw: &str) -> Result<Decimal, ValidationError> {
    let raw = raw.trim();
    let parsed = Decimal::from_str(raw).or_else(|_| Decimal::from_scientific(raw));

    match parsed {
        Ok(value) if value > Decimal::ZERO => Ok(value),
        Ok(_) => Err(ValidationError::new(
            field.name,
            format!("Položka {} musí být kladné reálné číslo s desetinnou tečkou.", field.label),
        )),
        Err(_) => Err(ValidationError::new(
            field.name,
            format!("Položka {} není platné kladné reálné číslo s desetinnou tečkou.", field.label),
        )),
    }
}

pub fn parse_date(field: Field, raw: &str) -> Result<NaiveDate, ValidationError> {
    let raw = raw.trim();
    if !has_date_shape(raw) {
        return Err(ValidationError::new(
            field.name,
            format!("{} musí být ve formátu RRRR-MM-DD.", field.label),
        ));
    }
    NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(|_| {
        ValidationError::new(
            field.name,
            format!("Neplatné datum: {}. Zadejte prosím platné datum.", raw),
        )
    })
}

/// Validate a movement form against the item's current stock level.
pub fn validate(
    direction: Direction,
    form: &MovementForm,
    stock: StockLevel,
) -> Result<MovementSpec, ValidationError> {
    let rules = MovementRules::for_direction(direction);

    if direction == Direction::Issue && stock.quantity == 0 {
        return Err(ValidationError::new(
            QUANTITY_DELTA.name,
            "Položka aktuálně není na skladě, nelze provést výdej!",
        ));
    }

    for field in rules.mandatory {
        if form.value(*field).trim().is_empty() {
            return Err(ValidationError::new(field.name, mandatory_message(*field)));
        }
    }

    let quantity = parse_positive_integer(QUANTITY_DELTA, &form.quantity_delta)?;

    if direction == Direction::Issue && quantity > stock.quantity {
        return Err(ValidationError::new(
            QUANTITY_DELTA.name,
            "Vydávané množství je větší než množství na skladě.",
        ));
    }

    let unit_price = if rules.reads_unit_price {
        Some(parse_positive_real(UNIT_PRICE, &form.unit_price)?)
    } else {
        None
    };

    let date = parse_date(rules.date_field, form.value(rules.date_field))?;

    let movement = match (direction, unit_price) {
        (Direction::Receipt, Some(unit_price)) => MovementSpec::Receipt(ReceiptFields {
            quantity,
            unit_price,
            location: form.location.trim().to_string(),
            supplier: form.supplier.trim().to_string(),
            order_number: form.order_number.trim().to_string(),
            purchase_date: date,
            note: form.note.trim().to_string(),
        }),
        _ => MovementSpec::Issue(IssueFields {
            quantity,
            location: form.location.trim().to_string(),
            device_used: form.device_used.trim().to_string(),
            issue_date: date,
            note: form.note.trim().to_string(),
        }),
    };

    Ok(movement)
}
