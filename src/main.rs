use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use rust_decimal::Decimal;
use std::collections::BTreeSet;
use std::path::PathBuf;

use warehouse_ledger::db::{self, Device, Direction, Supplier};
use warehouse_ledger::{
    authenticate, catalog, create_user, create_variant, execute_movement, export, inquiry,
    logging, open_database, variants, Config, ExportTable, ItemDetails, MovementForm,
    MovementOutcome, SessionContext, VariantDraft, NO_DEVICE,
};

#[derive(Parser)]
#[command(name = "warehouse-ledger")]
#[command(about = "Warehouse stock movements, weighted-average costing and audit log")]
#[command(version)]
struct Cli {
    /// JSON config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database file (overrides config and WAREHOUSE_DB)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Operator username
    #[arg(long, global = true, env = "WAREHOUSE_USER")]
    user: Option<String>,

    /// Operator password
    #[arg(long, global = true, env = "WAREHOUSE_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the schema and the first (admin) user
    Init {
        #[arg(long, default_value = "admin")]
        admin_user: String,
        #[arg(long)]
        admin_password: String,
        #[arg(long, default_value = "Administrátor")]
        admin_name: String,
    },

    /// Add a stock item (zero quantity)
    AddItem {
        #[arg(long)]
        name: String,
        #[arg(long)]
        unit: String,
        #[arg(long, default_value_t = 0)]
        min: i64,
        #[arg(long, default_value = "")]
        location: String,
        #[arg(long, default_value = "")]
        note: String,
        #[arg(long)]
        critical: bool,
        /// Item is not tracked in accounting
        #[arg(long)]
        no_accounting: bool,
        /// Device code the part is used in (repeatable)
        #[arg(long = "device")]
        devices: Vec<String>,
    },

    /// Receive stock
    Receive {
        item: i64,
        #[arg(long)]
        qty: String,
        /// Unit price (decimal point)
        #[arg(long)]
        price: String,
        #[arg(long)]
        supplier: String,
        #[arg(long)]
        order: String,
        /// Defaults to the item's current location
        #[arg(long)]
        location: Option<String>,
        /// Purchase date YYYY-MM-DD, defaults to today
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        note: Option<String>,
    },

    /// Issue stock
    Issue {
        item: i64,
        #[arg(long)]
        qty: String,
        #[arg(long, default_value = NO_DEVICE)]
        device: String,
        #[arg(long)]
        location: Option<String>,
        /// Issue date YYYY-MM-DD, defaults to today
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        note: Option<String>,
    },

    /// List stock items
    Stock {
        /// Only items below their minimum
        #[arg(long)]
        below_minimum: bool,
    },

    /// Show the audit log
    Audit {
        #[arg(long)]
        item: Option<i64>,
    },

    /// List supplier variants
    Variants {
        #[arg(long)]
        item: Option<i64>,
    },

    /// Create a supplier variant
    AddVariant {
        #[arg(long)]
        item: i64,
        /// Supplier name
        #[arg(long)]
        supplier: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        number: String,
        #[arg(long)]
        price: Decimal,
        #[arg(long, default_value_t = 0)]
        lead_time: i64,
        #[arg(long, default_value_t = 0)]
        min_order: i64,
    },

    /// Add a supplier
    AddSupplier {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "CZ")]
        language: String,
        #[arg(long, default_value = "")]
        contact: String,
        #[arg(long, default_value = "")]
        email: String,
        #[arg(long, default_value = "")]
        phone: String,
    },

    /// Add a device
    AddDevice {
        #[arg(long)]
        code: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        location: String,
        #[arg(long = "type")]
        device_type: String,
    },

    /// Delete the last added item (only with zero quantity)
    DeleteItem { item: i64 },

    /// Build an inquiry e-mail for a supplier from selected variants
    Inquiry {
        #[arg(long)]
        supplier: String,
        #[arg(required = true)]
        variant_ids: Vec<i64>,
    },

    /// Export a table to CSV
    Export {
        #[arg(value_enum)]
        table: ExportTable,
        /// Output file, defaults to <export_dir>/<table>.csv
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(db) = &cli.db {
        config.database_path = db.clone();
    }
    logging::init(&config.logging);

    let mut conn = open_database(&config.database_path)?;

    match cli.command {
        Commands::Init {
            ref admin_user,
            ref admin_password,
            ref admin_name,
        } => run_init(&conn, &config, admin_user, admin_password, admin_name),
        Commands::Stock { below_minimum } => run_stock(&conn, below_minimum),
        Commands::Audit { item } => run_audit(&conn, item),
        Commands::Variants { item } => run_variants(&conn, item),
        Commands::Export { table, ref out } => {
            let path = out
                .clone()
                .unwrap_or_else(|| config.export_dir.join(table.file_name()));
            let rows = export::export_table(&conn, table, &path)?;
            println!("✅ Exported {} rows to {}", rows, path.display());
            Ok(())
        }
        Commands::Inquiry {
            ref supplier,
            ref variant_ids,
        } => run_inquiry(&conn, supplier, variant_ids),
        command => {
            let session = login(&conn, &cli.user, &cli.password)?;
            run_write(&mut conn, &session, command)
        }
    }
}

fn login(conn: &Connection, user: &Option<String>, password: &Option<String>) -> Result<SessionContext> {
    let (Some(user), Some(password)) = (user, password) else {
        bail!("Přihlaste se: --user/--password nebo WAREHOUSE_USER/WAREHOUSE_PASSWORD");
    };
    let operator = authenticate(conn, user, password)?;
    Ok(SessionContext::new(operator))
}

fn run_init(
    conn: &Connection,
    config: &Config,
    admin_user: &str,
    admin_password: &str,
    admin_name: &str,
) -> Result<()> {
    println!("🗄️  Warehouse Ledger {} - database init", warehouse_ledger::VERSION);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✓ Schema ready in {} (WAL mode)", config.database_path.display());

    if db::find_user(conn, admin_user)?.is_some() {
        println!("✓ User '{}' already exists", admin_user);
    } else {
        create_user(conn, admin_user, admin_password, admin_name, "admin")?;
        println!("✓ Admin user '{}' created", admin_user);
    }
    Ok(())
}

fn run_write(conn: &mut Connection, session: &SessionContext, command: Commands) -> Result<()> {
    match command {
        Commands::AddItem {
            name,
            unit,
            min,
            location,
            note,
            critical,
            no_accounting,
            devices,
        } => {
            let details = ItemDetails {
                name,
                unit,
                min_quantity: min,
                location,
                note,
                ordered: false,
                accounting: !no_accounting,
                critical,
                devices: devices.into_iter().collect::<BTreeSet<_>>(),
            };
            let item = catalog::add_item(conn, &details)?;
            println!(
                "✅ Added item #{} (card {}) {}",
                item.evidence_number, item.card_number, item.name
            );
        }

        Commands::Receive {
            item,
            qty,
            price,
            supplier,
            order,
            location,
            date,
            note,
        } => {
            let current = db::get_stock_item(conn, item)?;
            let mut form = MovementForm::prefilled(&current, session.today());
            form.quantity_delta = qty;
            form.unit_price = price;
            form.supplier = supplier;
            form.order_number = order;
            override_common(&mut form, location, date, note);

            let outcome = execute_movement(conn, session, item, Direction::Receipt, &form)?;
            print_outcome(&outcome);
        }

        Commands::Issue {
            item,
            qty,
            device,
            location,
            date,
            note,
        } => {
            let current = db::get_stock_item(conn, item)?;
            let mut form = MovementForm::prefilled(&current, session.today());
            form.quantity_delta = qty;
            form.device_used = device;
            override_common(&mut form, location, date, note);

            let outcome = execute_movement(conn, session, item, Direction::Issue, &form)?;
            print_outcome(&outcome);
        }

        Commands::AddVariant {
            item,
            supplier,
            name,
            number,
            price,
            lead_time,
            min_order,
        } => {
            let stock_item = db::get_stock_item(conn, item)?;
            let Some(supplier) = db::find_supplier_by_name(conn, &supplier)? else {
                bail!("Dodavatel {} není v seznamu dodavatelů.", supplier);
            };
            let mut draft = VariantDraft::for_receipt(&stock_item, &supplier, price);
            if let Some(name) = name {
                draft.variant_name = name;
            }
            draft.variant_number = number;
            draft.lead_time_days = lead_time;
            draft.min_order_qty = min_order;

            let variant = create_variant(conn, draft)?;
            println!(
                "✅ Variant #{} created: {} / {}",
                variant.id, stock_item.name, supplier.name
            );
        }

        Commands::AddSupplier {
            name,
            language,
            contact,
            email,
            phone,
        } => {
            let supplier = catalog::add_supplier(
                conn,
                &Supplier {
                    id: 0,
                    name,
                    contact,
                    email,
                    phone,
                    language,
                },
            )?;
            println!("✅ Supplier #{} {}", supplier.id, supplier.name);
        }

        Commands::AddDevice {
            code,
            name,
            location,
            device_type,
        } => {
            let device = catalog::add_device(
                conn,
                &Device {
                    id: 0,
                    code,
                    name,
                    location,
                    device_type,
                },
            )?;
            println!("✅ Device {} ({})", device.code, device.name);
        }

        Commands::DeleteItem { item } => {
            catalog::delete_item(conn, item)?;
            println!("✅ Item #{} deleted", item);
        }

        _ => unreachable!("read-only commands are handled in main"),
    }
    Ok(())
}

fn override_common(
    form: &mut MovementForm,
    location: Option<String>,
    date: Option<String>,
    note: Option<String>,
) {
    if let Some(location) = location {
        form.location = location;
    }
    if let Some(date) = date {
        form.movement_date = date;
    }
    if let Some(note) = note {
        form.note = note;
    }
}

fn print_outcome(outcome: &MovementOutcome) {
    println!("✅ {}", outcome.confirmation());
    println!(
        "   #{} {}: {} {} @ {} = {}",
        outcome.item.evidence_number,
        outcome.item.name,
        outcome.item.quantity,
        outcome.item.unit,
        outcome.item.unit_price,
        outcome.item.total_value
    );
    println!(
        "   audit #{} delta {:+}",
        outcome.audit_entry.id, outcome.audit_entry.quantity_delta
    );

    if let Some(err) = &outcome.variant_check_error {
        println!("\n⚠️  Kontrola varianty se nezdařila: {}", err);
    }

    if let (Some(notice), Some(draft)) = (outcome.variant_notice(), &outcome.variant_draft) {
        println!("\n⚠️  {}", notice);
        println!(
            "   warehouse-ledger add-variant --item {} --supplier \"{}\" --name \"{}\" --number <ČÍSLO> --price {}",
            draft.item_id, draft.supplier_name, draft.variant_name, draft.unit_price
        );
    }
}

fn run_stock(conn: &Connection, below_minimum: bool) -> Result<()> {
    let items = if below_minimum {
        catalog::below_minimum_items(conn)?
    } else {
        catalog::list_items(conn)?
    };

    println!("📦 {} items", items.len());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for item in &items {
        let flag = if item.is_below_minimum() { "⚠️ " } else { "  " };
        println!(
            "{} #{:<4} {:<30} {:>6} {:<3} (min {:>4}) {:>10} {:>12}  {}",
            flag,
            item.evidence_number,
            item.name,
            item.quantity,
            item.unit,
            item.min_quantity,
            item.unit_price,
            item.total_value,
            item.location
        );
    }
    Ok(())
}

fn run_audit(conn: &Connection, item: Option<i64>) -> Result<()> {
    let entries = match item {
        Some(id) => db::audit_entries_for_item(conn, id)?,
        None => db::list_audit_log(conn)?,
    };

    println!("📜 {} audit entries", entries.len());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for e in &entries {
        println!(
            "#{:<5} {} {:<7} item #{:<4} {:+6} → {:>6}  {:>10} {:>12}  {}",
            e.id,
            e.timestamp,
            e.movement_type,
            e.item_id,
            e.quantity_delta,
            e.resulting_quantity,
            e.unit_price,
            e.total_value,
            e.operator
        );
    }
    Ok(())
}

fn run_variants(conn: &Connection, item: Option<i64>) -> Result<()> {
    let rows = match item {
        Some(id) => variants::variants_for_item(conn, id)?,
        None => variants::list_variants(conn)?,
    };

    println!("🔗 {} variants", rows.len());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for row in &rows {
        let flag = if row.below_minimum { "⚠️ " } else { "  " };
        println!(
            "{} #{:<4} {:<25} {:<20} {:<15} {:>10}  {} d, min {}",
            flag,
            row.variant.id,
            row.item_name,
            row.supplier_name,
            row.variant.variant_number,
            row.variant.unit_price,
            row.variant.lead_time_days,
            row.variant.min_order_qty
        );
    }
    Ok(())
}

fn run_inquiry(conn: &Connection, supplier: &str, variant_ids: &[i64]) -> Result<()> {
    let Some(supplier) = db::find_supplier_by_name(conn, supplier)? else {
        bail!("Dodavatel {} není v seznamu dodavatelů.", supplier);
    };

    let lines = inquiry::inquiry_lines(conn, variant_ids)?;
    let draft = inquiry::build_draft(&supplier, &lines)?;

    println!("📧 {} <{}>", draft.subject, draft.recipient);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("{}", draft.body);
    println!("\n{}", draft.mailto_link());
    Ok(())
}
