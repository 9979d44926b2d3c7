// Warehouse Ledger - Core Library
// Inventory movements, weighted-average costing and the audit log.
// Exposes all modules for use in CLI, API server, and tests

pub mod error;      // Error taxonomy
pub mod db;         // Data Store Gateway
pub mod costing;    // Costing Calculator
pub mod validator;  // Movement form validation
pub mod session;    // Operator + clock, login
pub mod variants;   // Variant Consistency Checker
pub mod movement;   // Movement Coordinator
pub mod catalog;    // Items, suppliers, devices
pub mod inquiry;    // Supplier inquiries
pub mod export;     // CSV export
pub mod config;
pub mod logging;

// Re-export commonly used types
pub use error::{LedgerError, LedgerResult, ValidationError};
pub use db::{
    AuditLogEntry, Device, Direction, StockItem, Supplier, SupplierVariant, VariantRow,
    open_database, setup_database, get_stock_item, list_stock, list_audit_log,
};
pub use costing::{compute, Costing, CostingError};
pub use validator::{validate, MovementForm, MovementRules, MovementSpec, StockLevel};
pub use session::{authenticate, create_user, Clock, FixedClock, Operator, SessionContext, SystemClock};
pub use variants::{create_variant, ensure_variant, update_variant, VariantDraft};
pub use movement::{
    execute_movement, MovementCoordinator, MovementOutcome, MovementPhase, NO_DEVICE,
};
pub use catalog::{add_device, add_item, add_supplier, delete_item, edit_item, ItemDetails};
pub use inquiry::{build_draft, inquiry_lines, InquiryDraft, InquiryLine};
pub use export::{export_items, export_table, ExportTable};
pub use config::Config;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
