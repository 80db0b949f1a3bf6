//! Statistics command implementation

use anyhow::Result;
use tally_core::money::format_money;
use tally_core::{summarize, Database, Granularity, RecordFilter, StatsOptions};

use super::{parse_optional_date, truncate};

pub fn cmd_stats(
    db: &Database,
    from: Option<&str>,
    to: Option<&str>,
    group_by: &str,
) -> Result<()> {
    let granularity: Granularity = group_by.parse().map_err(|e: String| anyhow::anyhow!(e))?;

    let filter = RecordFilter::new()
        .date_from(parse_optional_date(from)?)
        .date_to(parse_optional_date(to)?);

    let records = db.all_records(&filter)?;
    let summary = summarize(&records, &StatsOptions::dashboard(granularity));

    if summary.is_empty() {
        println!("No records in this range.");
        return Ok(());
    }

    println!();
    println!("📊 Summary ({} records)", summary.record_count);
    println!("   ───────────────────────────────");
    println!("   Income:        {:>12}", format_money(summary.total_income));
    println!("   Expense:       {:>12}", format_money(summary.total_expense));
    println!("   Net balance:   {:>12}", format_money(summary.net_balance));
    println!("   Savings rate:  {:>11}%", summary.savings_rate);

    let breakdown = summary.category_breakdown();
    for (title, shares) in [("Expense", &breakdown.expense), ("Income", &breakdown.income)] {
        if shares.is_empty() {
            continue;
        }
        println!();
        println!("   {} by category", title);
        for share in shares {
            println!(
                "   {:<10} {:>12} {:>6}%  ({} records)",
                truncate(&share.category, 10),
                format_money(share.total),
                share.percentage,
                share.count
            );
        }
    }

    println!();
    println!("   By {}", granularity);
    for period in &summary.by_period {
        println!(
            "   {:<10} in {:>12}  out {:>12}  ({} records)",
            period.period,
            format_money(period.income),
            format_money(period.expense),
            period.count
        );
    }

    Ok(())
}
