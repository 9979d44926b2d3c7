// 🚚 Movement Coordinator - validate → cost → persist → check variant
//
// Idle → Validating → Calculating → PersistingStock → PersistingAudit
//      → [receipt: CheckingVariant] → Done
//
// Any failing step ends in Failed(reason); the coordinator is back in Idle after
// every run. The stock update and the audit insert share one SQLite transaction,
// so either both rows change or neither does.

use crate::costing::{self, Costing};
use crate::db::{self, AuditLogEntry, Direction, StockItem, StockUpdate, Supplier};
use crate::error::{LedgerError, LedgerResult, ValidationError};
use crate::session::SessionContext;
use crate::validator::{self, MovementForm, MovementSpec, StockLevel, DEVICE_USED, SUPPLIER};
use crate::variants::{self, VariantDraft, VARIANT_MISSING_MESSAGE};
use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, error, info, warn};

/// Device placeholder meaning "not specified"; always accepted on issues.
pub const NO_DEVICE: &str = "Neuvedeno";

// ============================================================================
// PHASES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum MovementPhase {
    Idle,
    Validating,
    Calculating,
    PersistingStock,
    PersistingAudit,
    CheckingVariant,
    Done,
    Failed(String),
}

/// Current phase plus every phase entered during the last run.
#[derive(Debug, Default)]
struct PhaseTrace {
    current: Option<MovementPhase>,
    entered: Vec<MovementPhase>,
}

impl PhaseTrace {
    fn enter(&mut self, phase: MovementPhase) {
        debug!(?phase, "movement phase");
        self.entered.push(phase.clone());
        self.current = Some(phase);
    }

    fn reset(&mut self) {
        self.current = None;
    }
}

// ============================================================================
// OUTCOME
// ============================================================================

/// Result of a completed movement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MovementOutcome {
    /// Item as re-read from the store after commit
    pub item: StockItem,
    pub audit_entry: AuditLogEntry,
    /// Receipt used an (item, supplier) pair with no variant yet
    pub variant_missing: bool,
    /// Pre-filled variant for the caller to confirm and create
    pub variant_draft: Option<VariantDraft>,
    /// The movement is booked, but the variant lookup itself failed
    pub variant_check_error: Option<String>,
}

impl MovementOutcome {
    pub fn direction(&self) -> Direction {
        self.audit_entry.movement_type
    }

    /// Confirmation text naming the movement just performed.
    pub fn confirmation(&self) -> String {
        format!(
            "Úspěšně proběhl {} a zápis do audit logu!",
            self.direction().label()
        )
    }

    pub fn variant_notice(&self) -> Option<&'static str> {
        self.variant_missing.then_some(VARIANT_MISSING_MESSAGE)
    }
}

// ============================================================================
// COORDINATOR
// ============================================================================

/// Runs movements against one connection on behalf of one session.
pub struct MovementCoordinator<'a> {
    conn: &'a mut Connection,
    session: &'a SessionContext,
    trace: PhaseTrace,
}

impl<'a> MovementCoordinator<'a> {
    pub fn new(conn: &'a mut Connection, session: &'a SessionContext) -> Self {
        MovementCoordinator {
            conn,
            session,
            trace: PhaseTrace::default(),
        }
    }

    pub fn phase(&self) -> &MovementPhase {
        self.trace.current.as_ref().unwrap_or(&MovementPhase::Idle)
    }

    /// Phases entered by the last `execute`, in order.
    pub fn trace(&self) -> &[MovementPhase] {
        &self.trace.entered
    }

    pub fn execute(
        &mut self,
        item_id: i64,
        direction: Direction,
        form: &MovementForm,
    ) -> LedgerResult<MovementOutcome> {
        self.trace.entered.clear();

        let result = self.run(item_id, direction, form);

        match &result {
            Ok(outcome) => {
                self.trace.enter(MovementPhase::Done);
                info!(
                    item_id,
                    direction = %direction,
                    audit_id = outcome.audit_entry.id,
                    quantity = outcome.item.quantity,
                    unit_price = %outcome.item.unit_price,
                    total_value = %outcome.item.total_value,
                    variant_missing = outcome.variant_missing,
                    "movement completed"
                );
            }
            Err(err) => {
                self.trace.enter(MovementPhase::Failed(err.to_string()));
                if err.is_recoverable() {
                    warn!(item_id, direction = %direction, kind = err.kind(), field = ?err.field(), "movement rejected: {}", err);
                } else {
                    error!(item_id, direction = %direction, "movement failed: {}", err);
                }
            }
        }

        self.trace.reset();
        result
    }

    fn run(
        &mut self,
        item_id: i64,
        direction: Direction,
        form: &MovementForm,
    ) -> LedgerResult<MovementOutcome> {
        self.trace.enter(MovementPhase::Validating);
        let item = db::get_stock_item(self.conn, item_id)?;
        let movement = validator::validate(direction, form, StockLevel::from(&item))?;

        let supplier = match &movement {
            MovementSpec::Receipt(receipt) => Some(resolve_supplier(self.conn, &receipt.supplier)?),
            MovementSpec::Issue(issue) => {
                check_device(self.conn, &issue.device_used)?;
                None
            }
        };

        self.trace.enter(MovementPhase::Calculating);
        let costing = costing::compute(
            direction,
            item.quantity,
            item.unit_price,
            movement.quantity(),
            movement.entered_unit_price().unwrap_or(item.unit_price),
        )?;
        let update = stock_update(&movement, &costing);
        let entry = audit_entry(&item, &movement, &costing, self.session);

        let tx = self.conn.transaction()?;

        self.trace.enter(MovementPhase::PersistingStock);
        db::update_stock_after_movement(&tx, item.evidence_number, &update)?;

        self.trace.enter(MovementPhase::PersistingAudit);
        let audit_entry = db::insert_audit_entry(&tx, &entry)?;

        tx.commit()?;

        // Committed: from here on nothing may turn the movement into an error
        let mut outcome = MovementOutcome {
            item: apply_update(item, &update),
            audit_entry,
            variant_missing: false,
            variant_draft: None,
            variant_check_error: None,
        };

        if let (MovementSpec::Receipt(receipt), Some(supplier)) = (&movement, supplier) {
            self.trace.enter(MovementPhase::CheckingVariant);
            match variants::ensure_variant(self.conn, item_id, supplier.id) {
                Ok(true) => {}
                Ok(false) => {
                    info!(item_id, supplier = %supplier.name, "no variant for this supplier yet");
                    outcome.variant_missing = true;
                    outcome.variant_draft =
                        Some(VariantDraft::for_receipt(&outcome.item, &supplier, receipt.unit_price));
                }
                Err(err) => {
                    warn!(item_id, supplier = %supplier.name, "variant check failed: {}", err);
                    outcome.variant_check_error = Some(err.to_string());
                }
            }
        }

        Ok(outcome)
    }
}

/// One-shot movement: fresh coordinator, single run.
pub fn execute_movement(
    conn: &mut Connection,
    session: &SessionContext,
    item_id: i64,
    direction: Direction,
    form: &MovementForm,
) -> LedgerResult<MovementOutcome> {
    MovementCoordinator::new(conn, session).execute(item_id, direction, form)
}

// ============================================================================
// HELPERS
// ============================================================================

fn resolve_supplier(conn: &Connection, name: &str) -> LedgerResult<Supplier> {
    db::find_supplier_by_name(conn, name)?.ok_or_else(|| {
        LedgerError::from(ValidationError::new(
            SUPPLIER.name,
            format!("Dodavatel {} není v seznamu dodavatelů.", name),
        ))
    })
}

fn check_device(conn: &Connection, code: &str) -> LedgerResult<()> {
    if code == NO_DEVICE || db::find_device_by_code(conn, code)?.is_some() {
        return Ok(());
    }
    Err(ValidationError::new(
        DEVICE_USED.name,
        format!("Zařízení {} není v seznamu zařízení.", code),
    )
    .into())
}

/// The item as it stands after `update`, without another store round trip.
fn apply_update(mut item: StockItem, update: &StockUpdate) -> StockItem {
    match update {
        StockUpdate::Receipt {
            quantity,
            location,
            supplier,
            purchase_date,
            order_number,
            unit_price,
            total_value,
            note,
        } => {
            item.quantity = *quantity;
            item.location = location.clone();
            item.supplier = supplier.clone();
            item.purchase_date = Some(*purchase_date);
            item.order_number = order_number.clone();
            item.unit_price = *unit_price;
            item.total_value = *total_value;
            item.note = note.clone();
        }
        StockUpdate::Issue {
            quantity,
            location,
            note,
            total_value,
        } => {
            item.quantity = *quantity;
            item.location = location.clone();
            item.note = note.clone();
            item.total_value = *total_value;
        }
    }
    item
}

fn stock_update(movement: &MovementSpec, costing: &Costing) -> StockUpdate {
    match movement {
        MovementSpec::Receipt(r) => StockUpdate::Receipt {
            quantity: costing.new_quantity,
            location: r.location.clone(),
            supplier: r.supplier.clone(),
            purchase_date: r.purchase_date,
            order_number: r.order_number.clone(),
            unit_price: costing.unit_price,
            total_value: costing.total_value,
            note: r.note.clone(),
        },
        MovementSpec::Issue(i) => StockUpdate::Issue {
            quantity: costing.new_quantity,
            location: i.location.clone(),
            note: i.note.clone(),
            total_value: costing.total_value,
        },
    }
}

fn audit_entry(
    item: &StockItem,
    movement: &MovementSpec,
    costing: &Costing,
    session: &SessionContext,
) -> AuditLogEntry {
    let mut entry = AuditLogEntry {
        id: 0,
        item_id: item.evidence_number,
        card_number: item.card_number,
        item_name: item.name.clone(),
        unit: item.unit.clone(),
        accounting: item.accounting,
        movement_type: movement.direction(),
        quantity_delta: costing.signed_delta,
        resulting_quantity: costing.new_quantity,
        unit_price: costing.unit_price,
        total_value: costing.total_value,
        movement_unit_price: costing.movement_unit_price,
        movement_value: costing.movement_value,
        location: String::new(),
        supplier: String::new(),
        order_number: String::new(),
        purchase_date: None,
        issue_date: None,
        device_used: String::new(),
        note: String::new(),
        operator: session.operator.name.clone(),
        timestamp: session.now(),
    };

    match movement {
        MovementSpec::Receipt(r) => {
            entry.location = r.location.clone();
            entry.supplier = r.supplier.clone();
            entry.order_number = r.order_number.clone();
            entry.purchase_date = Some(r.purchase_date);
            entry.note = r.note.clone();
        }
        MovementSpec::Issue(i) => {
            entry.location = i.location.clone();
            entry.issue_date = Some(i.issue_date);
            entry.device_used = i.device_used.clone();
            entry.note = i.note.clone();
        }
    }

    entry
}
