//! Record command implementations

use anyhow::{Context, Result};
use chrono::Local;
use tally_core::{Database, NewRecord, Record, RecordFilter};
use tracing::info;

use super::{colored_amount, parse_date, parse_kind, parse_money, parse_optional_date, truncate};

pub fn cmd_records_list(
    db: &Database,
    limit: i64,
    kind: Option<&str>,
    category: Option<&str>,
    from: Option<&str>,
    to: Option<&str>,
) -> Result<()> {
    let filter = RecordFilter::new()
        .kind(kind.map(parse_kind).transpose()?)
        .category(category)
        .date_from(parse_optional_date(from)?)
        .date_to(parse_optional_date(to)?);

    let records = db.list_records(&filter, limit.max(1), 0)?;

    if records.is_empty() {
        println!("No records found. Add one with:");
        println!("  tally records add -t expense -a 25 -c 餐饮");
        return Ok(());
    }

    let total = db.count_records(&filter)?;

    println!();
    println!("📝 Records ({} of {})", records.len(), total);
    println!("   ─────────────────────────────────────────────────────────────");

    for record in records {
        println!(
            "   [{}] {} │ {:>12} │ {:<8} │ {}",
            record.id,
            record.date,
            colored_amount(record.kind, record.amount),
            truncate(&record.category, 8),
            truncate(&record.description, 30)
        );
    }

    Ok(())
}

pub fn cmd_records_add(
    db: &Database,
    kind: &str,
    amount: &str,
    category: &str,
    description: &str,
    date: Option<&str>,
    wallet: Option<i64>,
) -> Result<Record> {
    let category = category.trim();
    if category.is_empty() {
        anyhow::bail!("Category must not be empty");
    }

    let date = match date {
        Some(d) => parse_date(d)?,
        None => Local::now().date_naive(),
    };

    let record = db
        .create_record(&NewRecord {
            kind: parse_kind(kind)?,
            amount: parse_money(amount)?,
            category: category.to_string(),
            description: description.trim().to_string(),
            date,
            wallet_id: wallet,
        })
        .context("Failed to add record")?;

    info!(id = record.id, kind = %record.kind, "Added record");

    println!(
        "✅ Added record {}: {} {} ({})",
        record.id,
        colored_amount(record.kind, record.amount),
        record.category,
        record.date
    );

    Ok(record)
}

pub fn cmd_records_delete(db: &Database, id: i64) -> Result<()> {
    if !db.delete_record(id)? {
        anyhow::bail!("Record {} not found", id);
    }

    println!("🗑️  Deleted record {}", id);

    Ok(())
}
