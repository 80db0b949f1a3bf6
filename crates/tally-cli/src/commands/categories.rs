//! Category command implementations

use anyhow::{Context, Result};
use tally_core::{Category, Database, EntryKind};

use super::parse_kind;

pub fn cmd_categories_list(db: &Database, kind: Option<&str>) -> Result<()> {
    let kind = kind.map(parse_kind).transpose()?;
    let categories = db.list_categories(kind)?;

    if categories.is_empty() {
        println!("No categories found.");
        return Ok(());
    }

    for section in [EntryKind::Expense, EntryKind::Income] {
        let in_section: Vec<&Category> = categories.iter().filter(|c| c.kind == section).collect();
        if in_section.is_empty() {
            continue;
        }

        println!();
        println!("🏷️  {} categories ({})", section.label(), section);
        println!("   ───────────────────────────────");
        for category in in_section {
            println!(
                "   {} {:<12} {}",
                category.icon, category.name, category.color
            );
        }
    }

    Ok(())
}

pub fn cmd_categories_add(
    db: &Database,
    name: &str,
    kind: &str,
    icon: Option<&str>,
    color: Option<&str>,
) -> Result<()> {
    let mut category = Category::new(name.trim(), parse_kind(kind)?);
    if let Some(icon) = icon.filter(|s| !s.trim().is_empty()) {
        category = category.with_icon(icon.trim());
    }
    if let Some(color) = color.filter(|s| !s.trim().is_empty()) {
        category = category.with_color(color.trim());
    }

    let stored = db
        .add_category(&category)
        .context("Failed to add category")?;

    println!(
        "✅ Category {} {} ({})",
        stored.icon, stored.name, stored.kind
    );

    Ok(())
}
