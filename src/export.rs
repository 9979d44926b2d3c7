// 📤 CSV Export - dump a table (or a filtered item list) with a header row

use crate::db::{StockItem, DATE_FORMAT};
use anyhow::{Context, Result};
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use std::path::Path;
use tracing::info;

/// Tables that can be exported as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExportTable {
    Stock,
    AuditLog,
    Variant,
    Supplier,
    Device,
}

impl ExportTable {
    pub fn table_name(&self) -> &'static str {
        match self {
            ExportTable::Stock => "stock",
            ExportTable::AuditLog => "audit_log",
            ExportTable::Variant => "variant",
            ExportTable::Supplier => "supplier",
            ExportTable::Device => "device",
        }
    }

    fn order_by(&self) -> &'static str {
        match self {
            ExportTable::Stock => "evidence_number",
            _ => "id",
        }
    }

    /// Default file name, e.g. `audit_log.csv`.
    pub fn file_name(&self) -> String {
        format!("{}.csv", self.table_name())
    }
}

fn cell(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => String::new(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned(),
        ValueRef::Blob(b) => format!("<{} bytes>", b.len()),
    }
}

/// Write every row of `table` to `path`. Returns the number of data rows.
pub fn export_table(conn: &Connection, table: ExportTable, path: &Path) -> Result<usize> {
    let sql = format!(
        "SELECT * FROM {} ORDER BY {}",
        table.table_name(),
        table.order_by()
    );
    let mut stmt = conn
        .prepare(&sql)
        .with_context(|| format!("Failed to read table {}", table.table_name()))?;
    let headers: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
    let column_count = headers.len();

    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create file: {}", path.display()))?;
    writer.write_record(&headers)?;

    let mut rows = stmt.query([])?;
    let mut count = 0;
    while let Some(row) = rows.next()? {
        let record: Vec<String> = (0..column_count)
            .map(|i| row.get_ref(i).map(cell))
            .collect::<Result<_, _>>()?;
        writer.write_record(&record)?;
        count += 1;
    }

    writer.flush()?;
    info!(table = table.table_name(), rows = count, path = %path.display(), "table exported");
    Ok(count)
}

/// Write an in-memory item list (e.g. the below-minimum view) to `path`.
pub fn export_items(items: &[StockItem], path: &Path) -> Result<usize> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create file: {}", path.display()))?;

    writer.write_record([
        "evidence_number",
        "card_number",
        "name",
        "quantity",
        "min_quantity",
        "unit",
        "location",
        "supplier",
        "purchase_date",
        "order_number",
        "unit_price",
        "total_value",
        "below_minimum",
        "devices",
    ])?;

    for item in items {
        writer.write_record([
            item.evidence_number.to_string(),
            item.card_number.to_string(),
            item.name.clone(),
            item.quantity.to_string(),
            item.min_quantity.to_string(),
            item.unit.clone(),
            item.location.clone(),
            item.supplier.clone(),
            item.purchase_date
                .map(|d| d.format(DATE_FORMAT).to_string())
                .unwrap_or_default(),
            item.order_number.clone(),
            item.unit_price.to_string(),
            item.total_value.to_string(),
            item.is_below_minimum().to_string(),
            item.devices.iter().cloned().collect::<Vec<_>>().join(" "),
        ])?;
    }

    writer.flush()?;
    info!(rows = items.len(), path = %path.display(), "items exported");
    Ok(items.len())
}
