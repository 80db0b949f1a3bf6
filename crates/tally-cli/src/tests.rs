//! CLI command tests
//!
//! This module contains all tests for the CLI commands.

use std::str::FromStr;

use rust_decimal::Decimal;
use tally_core::ai::MockBackend;
use tally_core::prompts::{PromptId, PromptLibrary};
use tally_core::{AIClient, Database, EntryKind, RecordFilter, WalletKind};

use crate::commands::{self, truncate};

fn setup_test_db() -> Database {
    Database::in_memory().unwrap()
}

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn add_expense(db: &Database, amount: &str, category: &str, date: &str) -> i64 {
    commands::cmd_records_add(db, "expense", amount, category, "", Some(date), None)
        .unwrap()
        .id
}

// ========== Core Command Tests ==========

#[test]
fn test_cmd_init_creates_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tally.db");

    let result = commands::cmd_init(&path);
    assert!(result.is_ok());
    assert!(path.exists());

    let db = commands::open_db(&path).unwrap();
    assert!(!db.list_categories(None).unwrap().is_empty());
}

#[test]
fn test_cmd_init_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tally.db");

    commands::cmd_init(&path).unwrap();
    let before = commands::open_db(&path)
        .unwrap()
        .list_categories(None)
        .unwrap()
        .len();
    commands::cmd_init(&path).unwrap();
    let after = commands::open_db(&path)
        .unwrap()
        .list_categories(None)
        .unwrap()
        .len();

    assert_eq!(before, after);
}

// ========== Record Command Tests ==========

#[test]
fn test_cmd_records_add_and_list() {
    let db = setup_test_db();

    let record = commands::cmd_records_add(
        &db,
        "expense",
        "25.5",
        "餐饮",
        " 午饭 ",
        Some("2024-03-01"),
        None,
    )
    .unwrap();

    assert_eq!(record.kind, EntryKind::Expense);
    assert_eq!(record.amount, dec("25.50"));
    assert_eq!(record.description, "午饭");
    assert_eq!(record.date.to_string(), "2024-03-01");

    let result = commands::cmd_records_list(&db, 20, None, None, None, None);
    assert!(result.is_ok());
}

#[test]
fn test_cmd_records_add_defaults_to_today() {
    let db = setup_test_db();

    let record =
        commands::cmd_records_add(&db, "income", "8000", "工资", "", None, None).unwrap();

    assert_eq!(record.date, chrono::Local::now().date_naive());
}

#[test]
fn test_cmd_records_add_rejects_bad_input() {
    let db = setup_test_db();

    assert!(commands::cmd_records_add(&db, "spend", "10", "餐饮", "", None, None).is_err());
    assert!(commands::cmd_records_add(&db, "expense", "-10", "餐饮", "", None, None).is_err());
    assert!(commands::cmd_records_add(&db, "expense", "ten", "餐饮", "", None, None).is_err());
    assert!(commands::cmd_records_add(&db, "expense", "10", "  ", "", None, None).is_err());
    assert!(
        commands::cmd_records_add(&db, "expense", "10", "餐饮", "", Some("2024-13-01"), None)
            .is_err()
    );

    assert_eq!(db.count_records(&RecordFilter::new()).unwrap(), 0);
}

#[test]
fn test_cmd_records_add_unknown_wallet_fails() {
    let db = setup_test_db();

    let result = commands::cmd_records_add(&db, "expense", "10", "餐饮", "", None, Some(999));
    assert!(result.is_err());
}

#[test]
fn test_cmd_records_list_filters() {
    let db = setup_test_db();
    add_expense(&db, "10", "餐饮", "2024-01-05");
    add_expense(&db, "20", "交通", "2024-02-05");

    assert!(commands::cmd_records_list(&db, 20, Some("expense"), Some("交通"), None, None).is_ok());
    assert!(
        commands::cmd_records_list(&db, 20, None, None, Some("2024-02-01"), Some("2024-02-28"))
            .is_ok()
    );
    assert!(commands::cmd_records_list(&db, 20, Some("refund"), None, None, None).is_err());
    assert!(commands::cmd_records_list(&db, 20, None, None, Some("yesterday"), None).is_err());
}

#[test]
fn test_cmd_records_list_empty() {
    let db = setup_test_db();
    let result = commands::cmd_records_list(&db, 20, None, None, None, None);
    assert!(result.is_ok());
}

#[test]
fn test_cmd_records_delete() {
    let db = setup_test_db();
    let id = add_expense(&db, "10", "餐饮", "2024-01-05");

    assert!(commands::cmd_records_delete(&db, id).is_ok());
    assert!(db.get_record(id).unwrap().is_none());

    // Second delete reports the missing record
    assert!(commands::cmd_records_delete(&db, id).is_err());
}

// ========== Category Command Tests ==========

#[test]
fn test_cmd_categories_list() {
    let db = setup_test_db();
    assert!(commands::cmd_categories_list(&db, None).is_ok());
    assert!(commands::cmd_categories_list(&db, Some("income")).is_ok());
    assert!(commands::cmd_categories_list(&db, Some("both")).is_err());
}

#[test]
fn test_cmd_categories_add() {
    let db = setup_test_db();

    let result = commands::cmd_categories_add(&db, "宠物", "expense", Some("🐱"), None);
    assert!(result.is_ok());

    let expense = db.list_categories(Some(EntryKind::Expense)).unwrap();
    let pets = expense.iter().find(|c| c.name == "宠物").unwrap();
    assert_eq!(pets.icon, "🐱");
}

#[test]
fn test_cmd_categories_add_existing_is_noop() {
    let db = setup_test_db();
    let before = db.list_categories(None).unwrap().len();

    commands::cmd_categories_add(&db, "餐饮", "expense", Some("❓"), None).unwrap();

    let categories = db.list_categories(None).unwrap();
    assert_eq!(categories.len(), before);
    let dining = categories.iter().find(|c| c.name == "餐饮").unwrap();
    assert_ne!(dining.icon, "❓");
}

// ========== Wallet Command Tests ==========

#[test]
fn test_cmd_wallets_add_and_list() {
    let db = setup_test_db();

    let id = commands::cmd_wallets_add(
        &db,
        "信用卡",
        "credit_card",
        Some("0"),
        Some("5000"),
        true,
    )
    .unwrap();
    commands::cmd_records_add(&db, "expense", "1200", "购物", "", None, Some(id)).unwrap();

    let wallet = db.get_wallet(id).unwrap().unwrap();
    assert_eq!(wallet.wallet.kind, WalletKind::CreditCard);
    assert!(wallet.wallet.is_default);
    assert_eq!(wallet.available, dec("3800"));

    assert!(commands::cmd_wallets_list(&db).is_ok());
}

#[test]
fn test_cmd_wallets_add_rejects_bad_input() {
    let db = setup_test_db();

    assert!(commands::cmd_wallets_add(&db, "Piggy", "piggy_bank", None, None, false).is_err());
    assert!(commands::cmd_wallets_add(&db, "  ", "cash", None, None, false).is_err());
    assert!(commands::cmd_wallets_add(&db, "Cash", "cash", Some("abc"), None, false).is_err());
}

#[test]
fn test_cmd_wallets_delete_in_use() {
    let db = setup_test_db();
    let id = commands::cmd_wallets_add(&db, "现金", "cash", None, None, false).unwrap();
    let record =
        commands::cmd_records_add(&db, "expense", "5", "餐饮", "", None, Some(id)).unwrap();

    assert!(commands::cmd_wallets_delete(&db, id).is_err());

    commands::cmd_records_delete(&db, record.id).unwrap();
    assert!(commands::cmd_wallets_delete(&db, id).is_ok());
    assert!(commands::cmd_wallets_delete(&db, id).is_err());
}

// ========== Stats Command Tests ==========

#[test]
fn test_cmd_stats() {
    let db = setup_test_db();
    add_expense(&db, "30", "餐饮", "2024-01-10");
    commands::cmd_records_add(&db, "income", "100", "工资", "", Some("2024-01-15"), None)
        .unwrap();

    assert!(commands::cmd_stats(&db, None, None, "month").is_ok());
    assert!(commands::cmd_stats(&db, Some("2024-01-01"), Some("2024-01-31"), "week").is_ok());
}

#[test]
fn test_cmd_stats_rejects_bad_arguments() {
    let db = setup_test_db();
    assert!(commands::cmd_stats(&db, None, None, "fortnight").is_err());
    assert!(commands::cmd_stats(&db, Some("01/02/2024"), None, "month").is_err());
}

#[test]
fn test_cmd_stats_empty() {
    let db = setup_test_db();
    assert!(commands::cmd_stats(&db, None, None, "day").is_ok());
}

// ========== AI Command Tests ==========

#[tokio::test]
async fn test_cmd_ai_parse_with_mock() {
    let db = setup_test_db();
    let client = AIClient::mock();

    let drafts = commands::cmd_ai_parse(&db, &client, "交通 18", false, None)
        .await
        .unwrap();

    assert_eq!(drafts.len(), 1);
    assert_eq!(drafts[0].amount, dec("18"));
    assert_eq!(drafts[0].category, "交通");
    assert_eq!(db.count_records(&RecordFilter::new()).unwrap(), 0);
}

#[tokio::test]
async fn test_cmd_ai_parse_save_stores_records() {
    let db = setup_test_db();
    let wallet = commands::cmd_wallets_add(&db, "现金", "cash", None, None, false).unwrap();
    let client = AIClient::Mock(MockBackend::new().with_parse_reply(
        r#"[{"type":"expense","amount":25,"category":"餐饮","date":"2024-05-01"},
            {"type":"expense","amount":18,"category":"交通","date":"2024-05-01"}]"#,
    ));

    let drafts = commands::cmd_ai_parse(&db, &client, "午饭 25，打车 18", true, Some(wallet))
        .await
        .unwrap();

    assert_eq!(drafts.len(), 2);
    let stored = db.all_records(&RecordFilter::new()).unwrap();
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().all(|r| r.wallet_id == Some(wallet)));
}

#[tokio::test]
async fn test_cmd_ai_parse_sentinel_is_error() {
    let db = setup_test_db();
    let client = AIClient::mock();

    // No number in the text: the mock answers with an error sentinel
    let result = commands::cmd_ai_parse(&db, &client, "今天心情不错", true, None).await;

    let err = result.unwrap_err();
    assert!(format!("{:#}", err).contains("无法解析"));
    assert_eq!(db.count_records(&RecordFilter::new()).unwrap(), 0);
}

#[tokio::test]
async fn test_cmd_ai_parse_backend_failure() {
    let db = setup_test_db();
    let client = AIClient::Mock(MockBackend::unhealthy());

    let result = commands::cmd_ai_parse(&db, &client, "午饭 25", false, None).await;
    assert!(result.is_err());
}

#[test]
fn test_cmd_ai_normalize() {
    let fenced = "好的：\n```json\n{\"type\":\"expense\",\"amount\":\"12.5\",\"category\":\"餐饮\"}\n```";
    assert!(commands::cmd_ai_normalize(fenced, true).is_ok());

    let two = r#"[{"type":"expense","amount":1,"category":"餐饮"},{"type":"income","amount":2,"category":"工资"}]"#;
    assert!(commands::cmd_ai_normalize(two, false).is_ok());
    assert!(commands::cmd_ai_normalize(two, true).is_err());

    assert!(commands::cmd_ai_normalize("sorry, I can't help", false).is_err());
}

#[tokio::test]
async fn test_cmd_ai_ocr_with_mock() {
    let db = setup_test_db();
    let client = AIClient::mock();
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("receipt.PNG");
    std::fs::write(&image, b"\x89PNG").unwrap();

    let draft = commands::cmd_ai_ocr(&db, &client, &image, true, None)
        .await
        .unwrap();

    assert_eq!(draft.amount, dec("36.8"));
    assert_eq!(draft.items.len(), 2);
    assert_eq!(db.count_records(&RecordFilter::new()).unwrap(), 1);
}

#[tokio::test]
async fn test_cmd_ai_ocr_rejects_bad_files() {
    let db = setup_test_db();
    let client = AIClient::mock();
    let dir = tempfile::tempdir().unwrap();

    let text = dir.path().join("receipt.txt");
    std::fs::write(&text, "not an image").unwrap();
    assert!(commands::cmd_ai_ocr(&db, &client, &text, false, None)
        .await
        .is_err());

    let empty = dir.path().join("empty.jpg");
    std::fs::write(&empty, b"").unwrap();
    assert!(commands::cmd_ai_ocr(&db, &client, &empty, false, None)
        .await
        .is_err());

    let missing = dir.path().join("missing.jpg");
    assert!(commands::cmd_ai_ocr(&db, &client, &missing, false, None)
        .await
        .is_err());
}

#[tokio::test]
async fn test_cmd_ai_ocr_multiple_records_is_error() {
    let db = setup_test_db();
    let client = AIClient::Mock(MockBackend::new().with_receipt_reply(
        r#"[{"type":"expense","amount":1,"category":"购物"},{"type":"expense","amount":2,"category":"购物"}]"#,
    ));
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("receipt.jpg");
    std::fs::write(&image, b"\xFF\xD8").unwrap();

    let result = commands::cmd_ai_ocr(&db, &client, &image, true, None).await;
    assert!(result.is_err());
    assert_eq!(db.count_records(&RecordFilter::new()).unwrap(), 0);
}

#[tokio::test]
async fn test_cmd_ai_analyze() {
    let db = setup_test_db();
    add_expense(&db, "30", "餐饮", "2024-01-10");

    let client = AIClient::mock();
    assert!(commands::cmd_ai_analyze(&db, &client, None, None, None)
        .await
        .is_ok());

    // A failing backend still yields statistics
    let failing = AIClient::Mock(MockBackend::unhealthy());
    assert!(
        commands::cmd_ai_analyze(&db, &failing, Some("2024-01-01"), None, Some("expense"))
            .await
            .is_ok()
    );

    assert!(commands::cmd_ai_analyze(&db, &client, None, None, Some("all"))
        .await
        .is_err());
}

#[test]
fn test_image_mime() {
    use std::path::Path;

    assert_eq!(commands::image_mime(Path::new("a.jpg")).unwrap(), "image/jpeg");
    assert_eq!(commands::image_mime(Path::new("a.JPEG")).unwrap(), "image/jpeg");
    assert_eq!(commands::image_mime(Path::new("a.webp")).unwrap(), "image/webp");
    assert!(commands::image_mime(Path::new("a.pdf")).is_err());
    assert!(commands::image_mime(Path::new("receipt")).is_err());
}

#[test]
fn test_read_input_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("reply.txt");
    std::fs::write(&path, "{\"error\":\"x\"}").unwrap();

    assert_eq!(
        commands::read_input(Some(&path)).unwrap(),
        "{\"error\":\"x\"}"
    );
    assert!(commands::read_input(Some(&dir.path().join("nope.txt"))).is_err());
}

// ========== Prompts Command Tests ==========

#[test]
fn test_cmd_prompts_list() {
    let mut library = PromptLibrary::embedded_only();
    assert!(commands::cmd_prompts_list(&mut library).is_ok());
}

#[test]
fn test_cmd_prompts_show() {
    let mut library = PromptLibrary::embedded_only();
    assert!(commands::cmd_prompts_show(&mut library, "parse_text", None).is_ok());
    assert!(commands::cmd_prompts_show(&mut library, "parse_text", Some("user")).is_ok());
    assert!(commands::cmd_prompts_show(&mut library, "parse_text", Some("footer")).is_err());

    let err = commands::cmd_prompts_show(&mut library, "classify_merchant", None).unwrap_err();
    assert!(err.to_string().contains("analyze_finances"));
}

#[test]
fn test_cmd_prompts_path_without_data_dir() {
    let library = PromptLibrary::embedded_only();
    assert!(commands::cmd_prompts_path(&library).is_err());

    let dir = tempfile::tempdir().unwrap();
    let library = PromptLibrary::with_override_dir(dir.path().to_path_buf());
    assert!(commands::cmd_prompts_path(&library).is_ok());
}

#[test]
fn test_placeholders() {
    let text = "{{today}} and {{ categories }} then {{today}}; {{not a var}} {{";
    assert_eq!(commands::placeholders(text), vec!["categories", "today"]);
    assert!(commands::placeholders("no variables").is_empty());
}

#[test]
fn test_cmd_prompts_init_writes_loadable_overrides() {
    let dir = tempfile::tempdir().unwrap();
    let overrides = dir.path().join("overrides");

    let written = commands::cmd_prompts_init(&overrides, None, false).unwrap();
    assert_eq!(written.len(), PromptId::all().len());

    let mut library = PromptLibrary::with_override_dir(overrides.clone());
    let prompt = library.get(PromptId::ParseText).unwrap();
    assert!(prompt.is_override);
    assert_eq!(
        commands::placeholders(&prompt.content),
        vec!["categories", "text", "today"]
    );

    // edits survive a second init unless forced
    let path = overrides.join("parse_text.md");
    let edited = PromptId::ParseText
        .default_content()
        .replace("# System", "# System\n只记人民币。");
    std::fs::write(&path, &edited).unwrap();

    let written = commands::cmd_prompts_init(&overrides, Some("parse_text"), false).unwrap();
    assert!(written.is_empty());
    assert_eq!(std::fs::read_to_string(&path).unwrap(), edited);

    let written = commands::cmd_prompts_init(&overrides, Some("parse_text"), true).unwrap();
    assert_eq!(written, vec![path.clone()]);
    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        PromptId::ParseText.default_content()
    );

    assert!(commands::cmd_prompts_init(&overrides, Some("nope"), false).is_err());
}

// ========== Helper Tests ==========

#[test]
fn test_truncate() {
    assert_eq!(truncate("short", 10), "short");
    assert_eq!(truncate("a longer description", 10), "a longe...");
    assert_eq!(truncate("午饭和晚饭加夜宵", 5), "午饭...");
    assert_eq!(truncate("午饭", 2), "午饭");
}

#[test]
fn test_parse_helpers() {
    assert!(commands::parse_date("2024-02-29").is_ok());
    assert!(commands::parse_date("2023-02-29").is_err());
    assert_eq!(commands::parse_money("1e2").unwrap(), dec("100"));
    assert!(commands::parse_money("-1").is_err());
    assert!(commands::parse_kind("Income").is_err());
}
