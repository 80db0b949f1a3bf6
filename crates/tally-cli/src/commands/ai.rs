//! AI command implementations (parse, normalize, ocr, analyze)

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Local;
use tally_core::ai::encode_image;
use tally_core::money::format_money;
use tally_core::{
    analyze_records, normalize, AIBackend, AIClient, AnalysisReport, DateRange, Database, Draft,
    NormalizeContext, NormalizeError, Normalized, RecordFilter,
};
use tracing::{debug, info};

use super::{colored_amount, parse_kind, parse_optional_date, truncate};

/// Create the AI client from the environment, or explain how to configure one
pub fn ai_client() -> Result<AIClient> {
    let client = AIClient::from_env().context(
        "AI backend not configured. Set AI_API_BASE, AI_API_KEY and AI_MODEL, or AI_BACKEND=mock",
    )?;
    info!(backend = client.backend_name(), model = client.model(), "Using AI backend");
    Ok(client)
}

/// Read a raw model reply from a file, or stdin when no file is given
pub fn read_input(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read stdin")?;
            Ok(buf)
        }
    }
}

/// MIME type of a receipt image, by file extension
pub fn image_mime(path: &Path) -> Result<&'static str> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match ext.as_str() {
        "jpg" | "jpeg" => Ok("image/jpeg"),
        "png" => Ok("image/png"),
        "webp" => Ok("image/webp"),
        "gif" => Ok("image/gif"),
        _ => anyhow::bail!(
            "Unsupported image type '{}' (expected jpg, png, webp or gif)",
            path.display()
        ),
    }
}

fn print_drafts(drafts: &[Draft]) {
    println!();
    println!("📝 Drafts ({})", drafts.len());
    println!("   ─────────────────────────────────────────────────────────────");
    for (i, draft) in drafts.iter().enumerate() {
        println!(
            "   {}. {} │ {:>12} │ {:<8} │ {}",
            i + 1,
            draft.date,
            colored_amount(draft.kind, draft.amount),
            truncate(&draft.category, 8),
            truncate(&draft.description, 30)
        );
        for item in &draft.items {
            println!("        · {}", item);
        }
    }
}

/// Print a rejected reply with whatever diagnostic the normalizer kept
fn report_rejection(err: NormalizeError) -> anyhow::Error {
    if let Some(excerpt) = err.diagnostic() {
        eprintln!("   Raw reply: {}", excerpt);
    }
    anyhow::Error::new(err).context("Model reply rejected")
}

fn save_drafts(db: &Database, drafts: &[Draft], wallet: Option<i64>) -> Result<()> {
    for draft in drafts {
        let record = db
            .create_record(&draft.clone().into_new_record(wallet))
            .context("Failed to save draft")?;
        println!("   ✅ Saved record {}", record.id);
    }
    Ok(())
}

pub async fn cmd_ai_parse(
    db: &Database,
    client: &AIClient,
    text: &str,
    save: bool,
    wallet: Option<i64>,
) -> Result<Vec<Draft>> {
    let text = text.trim();
    if text.is_empty() {
        anyhow::bail!("Text must not be empty");
    }

    println!("🤖 Parsing with {} ({})...", client.backend_name(), client.model());

    let today = Local::now().date_naive();
    let categories = db.list_categories(None)?;
    let raw = client.parse_text(text, &categories, today).await?;
    debug!(reply = %raw, "Model reply");

    let drafts = normalize(&raw, &NormalizeContext::multiple(today))
        .map_err(report_rejection)?
        .into_drafts();

    print_drafts(&drafts);
    if save {
        save_drafts(db, &drafts, wallet)?;
    }

    Ok(drafts)
}

/// Run the normalizer on a captured reply and print the outcome as JSON
pub fn cmd_ai_normalize(raw: &str, single: bool) -> Result<()> {
    let today = Local::now().date_naive();
    let ctx = if single {
        NormalizeContext::single(today)
    } else {
        NormalizeContext::multiple(today)
    };

    let normalized = normalize(raw, &ctx).map_err(report_rejection)?;
    let output = match &normalized {
        Normalized::Single(draft) => serde_json::to_string_pretty(draft)?,
        Normalized::Multiple(drafts) => serde_json::to_string_pretty(drafts)?,
    };

    println!("{}", output);

    Ok(())
}

pub async fn cmd_ai_ocr(
    db: &Database,
    client: &AIClient,
    image: &Path,
    save: bool,
    wallet: Option<i64>,
) -> Result<Draft> {
    let mime = image_mime(image)?;
    let bytes =
        std::fs::read(image).with_context(|| format!("Failed to read {}", image.display()))?;
    if bytes.is_empty() {
        anyhow::bail!("Image file is empty: {}", image.display());
    }

    println!("🧾 Reading receipt {}...", image.display());

    let today = Local::now().date_naive();
    let categories = db.list_categories(None)?;
    let raw = client
        .parse_receipt(&encode_image(&bytes, mime), &categories, today)
        .await?;
    debug!(reply = %raw, "Model reply");

    let draft = match normalize(&raw, &NormalizeContext::single(today))
        .map_err(report_rejection)?
    {
        Normalized::Single(draft) => draft,
        Normalized::Multiple(drafts) => anyhow::bail!(
            "Expected a single record from the receipt, got {}",
            drafts.len()
        ),
    };

    print_drafts(std::slice::from_ref(&draft));
    if save {
        save_drafts(db, std::slice::from_ref(&draft), wallet)?;
    }

    Ok(draft)
}

pub async fn cmd_ai_analyze(
    db: &Database,
    client: &AIClient,
    from: Option<&str>,
    to: Option<&str>,
    kind: Option<&str>,
) -> Result<()> {
    let range = DateRange {
        start: parse_optional_date(from)?,
        end: parse_optional_date(to)?,
    };
    let filter = RecordFilter::new()
        .date_from(range.start)
        .date_to(range.end)
        .kind(kind.map(parse_kind).transpose()?);

    let records = db.all_records(&filter)?;
    println!("🔍 Analyzing {} records...", records.len());

    let report = analyze_records(client, &records, range).await;
    print_report(&report);

    Ok(())
}

fn print_report(report: &AnalysisReport) {
    let stats = &report.stats;

    println!();
    println!(
        "📊 Income {}  Expense {}  Net {}  Savings rate {}%",
        format_money(stats.total_income),
        format_money(stats.total_expense),
        format_money(stats.net_balance),
        stats.savings_rate
    );
    if report.analysis.health_score > 0 {
        println!("   Health score: {}/100", report.analysis.health_score);
    }
    if report.ai_error {
        println!("   ⚠️  The AI backend did not respond; statistics only");
    }
    for (month, totals) in &stats.by_month {
        println!(
            "   {}  +{}  -{}",
            month,
            format_money(totals.income),
            format_money(totals.expense)
        );
    }

    println!();
    println!("{}", report.analysis.analysis);

    if !report.analysis.highlights.is_empty() {
        println!();
        println!("Highlights:");
        for highlight in &report.analysis.highlights {
            println!("  • {}", highlight);
        }
    }
    if !report.analysis.suggestions.is_empty() {
        println!();
        println!("Suggestions:");
        for suggestion in &report.analysis.suggestions {
            println!("  • {}", suggestion);
        }
    }
}
