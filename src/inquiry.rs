// 📧 Inquiry - ask a supplier for the parts that fell below minimum
//
// Shortfall lines come from selected variants; the draft is a plain e-mail
// (recipient, subject, body) that can be opened through a mailto: link.

use crate::db::Supplier;
use crate::error::{LedgerError, LedgerResult};
use rusqlite::{params_from_iter, Connection};
use serde::Serialize;

/// One requested part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InquiryLine {
    pub variant_id: i64,
    /// min_quantity - quantity, as stored (may be ≤ 0 when the item is not short)
    pub shortfall: i64,
    pub unit: String,
    pub variant_number: String,
    pub variant_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InquiryDraft {
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

/// Shortfall lines for the given variant ids, in variant id order.
pub fn inquiry_lines(conn: &Connection, variant_ids: &[i64]) -> LedgerResult<Vec<InquiryLine>> {
    if variant_ids.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders = vec!["?"; variant_ids.len()].join(", ");
    let sql = format!(
        "SELECT v.id, (s.min_quantity - s.quantity) AS shortfall, s.unit,
                v.variant_number, v.variant_name
         FROM stock s
         JOIN variant v ON s.evidence_number = v.item_id
         WHERE v.id IN ({})
         ORDER BY v.id",
        placeholders
    );

    let mut stmt = conn.prepare(&sql)?;
    let lines = stmt
        .query_map(params_from_iter(variant_ids.iter()), |row| {
            Ok(InquiryLine {
                variant_id: row.get("id")?,
                shortfall: row.get("shortfall")?,
                unit: row.get("unit")?,
                variant_number: row.get("variant_number")?,
                variant_name: row.get("variant_name")?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(lines)
}

/// Build the e-mail for one supplier. Lines with nothing missing are left out.
pub fn build_draft(supplier: &Supplier, lines: &[InquiryLine]) -> LedgerResult<InquiryDraft> {
    if supplier.email.trim().is_empty() {
        return Err(LedgerError::rejected(format!(
            "Dodavatel {} nemá zadaný e-mail.",
            supplier.name
        )));
    }

    let wanted: Vec<&InquiryLine> = lines.iter().filter(|l| l.shortfall > 0).collect();
    if wanted.is_empty() {
        return Err(LedgerError::rejected("Žádná z vybraných položek není pod minimem."));
    }

    let czech = matches!(supplier.language.to_uppercase().as_str(), "CZ" | "CS" | "SK");

    let (subject, greeting, intro, closing) = if czech {
        (
            "Poptávka",
            "Dobrý den,",
            "prosíme o cenovou nabídku na následující položky:",
            "Děkujeme a přejeme hezký den.",
        )
    } else {
        (
            "Inquiry",
            "Dear Sir or Madam,",
            "please send us a quotation for the following items:",
            "Thank you and kind regards.",
        )
    };

    let mut body = format!("{}\n\n{}\n\n", greeting, intro);
    for line in wanted {
        body.push_str(&format!(
            "{} {} - {} {}\n",
            line.shortfall, line.unit, line.variant_number, line.variant_name
        ));
    }
    body.push('\n');
    body.push_str(closing);

    Ok(InquiryDraft {
        recipient: supplier.email.trim().to_string(),
        subject: subject.to_string(),
        body,
    })
}

impl InquiryDraft {
    /// `mailto:` link with percent-encoded subject and body.
    pub fn mailto_link(&self) -> String {
        format!(
            "mailto:{}?subject={}&body={}",
            self.recipient,
            urlencoding::encode(&self.subject),
            urlencoding::encode(&self.body)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{self, StockItem, SupplierVariant};
    use rust_decimal::Decimal;
    use std::collections::BTreeSet;

    fn supplier(language: &str) -> Supplier {
        Supplier {
            id: 1,
            name: "SKF".to_string(),
            contact: String::new(),
            email: "sales@skf.example".to_string(),
            phone: String::new(),
            language: language.to_string(),
        }
    }

    fn line(shortfall: i64) -> InquiryLine {
        InquiryLine {
            variant_id: 1,
            shortfall,
            unit: "ks".to_string(),
            variant_number: "6205-2RS".to_string(),
            variant_name: "Ložisko".to_string(),
        }
    }

    #[test]
    fn test_lines_from_store() {
        let conn = Connection::open_in_memory().unwrap();
        db::setup_database(&conn).unwrap();
        db::insert_stock_item(
            &conn,
            &StockItem {
                evidence_number: 1,
                card_number: 1,
                name: "Ložisko".to_string(),
                quantity: 2,
                min_quantity: 10,
                unit: "ks".to_string(),
                location: String::new(),
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
            },
        )
        .unwrap();
        let s = db::insert_supplier(&conn, &supplier("EN")).unwrap();
        let v = db::insert_variant(
            &conn,
            &SupplierVariant {
                id: 0,
                item_id: 1,
                supplier_id: s.id,
                variant_name: "Ložisko".to_string(),
                variant_number: "6205-2RS".to_string(),
                unit_price: Decimal::ONE,
                lead_time_days: 5,
                min_order_qty: 1,
            },
        )
        .unwrap();

        let lines = inquiry_lines(&conn, &[v.id, 999]).unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].shortfall, 8);
        assert_eq!(lines[0].variant_number, "6205-2RS");

        assert!(inquiry_lines(&conn, &[]).unwrap().is_empty());
    }

    #[test]
    fn test_draft_language_and_lines() {
        let draft = build_draft(&supplier("CZ"), &[line(8), line(0)]).unwrap();
        assert_eq!(draft.subject, "Poptávka");
        assert!(draft.body.starts_with("Dobrý den,"));
        assert!(draft.body.contains("8 ks - 6205-2RS Ložisko\n"));
        assert_eq!(draft.body.matches(" ks - ").count(), 1);

        let draft = build_draft(&supplier("DE"), &[line(3)]).unwrap();
        assert_eq!(draft.subject, "Inquiry");
    }

    #[test]
    fn test_draft_refusals() {
        let mut s = supplier("CZ");
        assert_eq!(build_draft(&s, &[line(0)]).unwrap_err().kind(), "rejected");

        s.email.clear();
        assert_eq!(build_draft(&s, &[line(5)]).unwrap_err().kind(), "rejected");
    }

    #[test]
    fn test_mailto_is_encoded() {
        let draft = InquiryDraft {
            recipient: "sales@skf.example".to_string(),
            subject: "Poptávka".to_string(),
            body: "8 ks\nA&B".to_string(),
        };
        assert_eq!(
            draft.mailto_link(),
            "mailto:sales@skf.example?subject=Popt%C3%A1vka&body=8%20ks%0AA%26B"
        );
    }
}
