//! Integration tests for tally-core
//!
//! These tests exercise the full model reply → normalize → store → aggregate
//! workflow against a mock chat-completions server.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::json;
use tally_core::{
    ai::{analysis::parse_analysis, category_list},
    db::{Database, RecordFilter},
    models::{Category, EntryKind},
    normalize,
    stats::{summarize, Granularity, StatsOptions},
    test_utils::MockChatServer,
    AIBackend, Error, NormalizeContext, NormalizeError, OpenAICompatibleBackend, PromptLibrary,
};

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
}

fn backend(server: &MockChatServer) -> OpenAICompatibleBackend {
    OpenAICompatibleBackend::with_api_key(&server.url(), "gpt-4o-mini", "sk-test")
        .with_vision_model("gpt-4o")
        .with_prompts(PromptLibrary::embedded_only())
}

fn amount(s: &str) -> Decimal {
    s.parse().unwrap()
}

// =============================================================================
// Parse Workflow Tests
// =============================================================================

#[tokio::test]
async fn test_parse_text_to_stored_records() {
    let server = MockChatServer::with_content(
        "```json\n[{\"type\":\"expense\",\"amount\":25,\"category\":\"餐饮\",\"description\":\"午饭\"},\
         {\"type\":\"income\",\"amount\":\"8000\",\"category\":\"工资\",\"date\":\"2024-03-10\"}]\n```",
    )
    .await;
    let db = Database::in_memory().expect("Failed to create in-memory database");
    let categories = db.list_categories(None).unwrap();

    let raw = backend(&server)
        .parse_text("午饭25，发工资8000", &categories, today())
        .await
        .expect("parse call failed");

    let drafts = normalize(&raw, &NormalizeContext::multiple(today())).unwrap();
    assert!(drafts.is_multiple());

    for draft in drafts.into_drafts() {
        db.create_record(&draft.into_new_record(None)).unwrap();
    }

    let records = db.all_records(&RecordFilter::new()).unwrap();
    assert_eq!(records.len(), 2);
    // missing date filled with today
    assert!(records.iter().any(|r| r.date == today() && r.category == "餐饮"));

    let summary = summarize(&records, &StatsOptions::dashboard(Granularity::Month));
    assert_eq!(summary.total_income, amount("8000"));
    assert_eq!(summary.total_expense, amount("25"));
    assert_eq!(summary.net_balance, amount("7975"));
}

#[tokio::test]
async fn test_request_carries_prompt_and_sampling() {
    let server = MockChatServer::with_content("[]").await;
    let categories = vec![Category::new("餐饮", EntryKind::Expense)];

    backend(&server)
        .parse_text("咖啡 18", &categories, today())
        .await
        .unwrap();

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request["model"], "gpt-4o-mini");
    assert_eq!(request["max_tokens"], 1000);
    assert_eq!(request["messages"][0]["role"], "system");

    let user = request["messages"][1]["content"].as_str().unwrap();
    assert!(user.contains("咖啡 18"));
    let prompt_text = request.to_string();
    assert!(prompt_text.contains(&category_list(&categories)));
    assert!(prompt_text.contains("2024-03-15"));
}

#[tokio::test]
async fn test_empty_reply_array_is_rejected() {
    let server = MockChatServer::with_content("[]").await;
    let raw = backend(&server).parse_text("x", &[], today()).await.unwrap();
    let err = normalize(&raw, &NormalizeContext::multiple(today())).unwrap_err();
    assert!(matches!(err, NormalizeError::Empty));
}

#[tokio::test]
async fn test_upstream_sentinel_passes_through() {
    let server = MockChatServer::with_content(r#"{"error":"无法解析"}"#).await;
    let raw = backend(&server).parse_text("今天天气", &[], today()).await.unwrap();
    let err = normalize(&raw, &NormalizeContext::multiple(today())).unwrap_err();
    assert_eq!(err.to_string(), "无法解析");
}

// =============================================================================
// Receipt Tests
// =============================================================================

#[tokio::test]
async fn test_receipt_uses_vision_model_and_data_url() {
    let server = MockChatServer::with_content(
        r#"好的：{"type":"expense","amount":36.8,"category":"购物","date":"2024-03-14","items":["牛奶"]}"#,
    )
    .await;

    let raw = backend(&server)
        .parse_receipt("QUJD", &[], today())
        .await
        .unwrap();
    let drafts = normalize(&raw, &NormalizeContext::single(today()))
        .unwrap()
        .into_drafts();
    assert_eq!(drafts[0].amount, amount("36.8"));
    assert_eq!(drafts[0].items, vec!["牛奶"]);

    let request = &server.requests()[0];
    assert_eq!(request["model"], "gpt-4o");
    let parts = request["messages"][1]["content"].as_array().unwrap();
    assert_eq!(parts[1]["image_url"]["url"], "data:image/jpeg;base64,QUJD");
}

#[tokio::test]
async fn test_receipt_with_several_records_is_rejected() {
    let server = MockChatServer::with_content(
        r#"[{"type":"expense","amount":1,"category":"a"},{"type":"expense","amount":2,"category":"b"}]"#,
    )
    .await;
    let raw = backend(&server).parse_receipt("QUJD", &[], today()).await.unwrap();
    let err = normalize(&raw, &NormalizeContext::single(today())).unwrap_err();
    assert!(matches!(err, NormalizeError::TooManyRecords { count: 2 }));
}

// =============================================================================
// Provider Shape and Failure Tests
// =============================================================================

#[tokio::test]
async fn test_alternative_response_shape() {
    let server = MockChatServer::with_body(json!({
        "response": r#"{"type":"income","amount":100,"category":"奖金"}"#
    }))
    .await;
    let raw = backend(&server).parse_text("奖金 100", &[], today()).await.unwrap();
    let drafts = normalize(&raw, &NormalizeContext::single(today()))
        .unwrap()
        .into_drafts();
    assert_eq!(drafts[0].kind, EntryKind::Income);
}

#[tokio::test]
async fn test_error_status_becomes_upstream_error() {
    let server = MockChatServer::with_status(429, "rate limited").await;
    let err = backend(&server)
        .parse_text("午饭 25", &[], today())
        .await
        .unwrap_err();
    match err {
        Error::Upstream(message) => {
            assert!(message.contains("429"));
            assert!(message.contains("rate limited"));
        }
        other => panic!("expected upstream error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_body_without_content_is_upstream_error() {
    let server = MockChatServer::with_body(json!({"choices": []})).await;
    let err = backend(&server).analyze("summary").await.unwrap_err();
    assert!(matches!(err, Error::Upstream(_)));
}

#[tokio::test]
async fn test_health_check_against_mock_server() {
    let server = MockChatServer::with_content("ok").await;
    assert!(backend(&server).health_check().await);
}

// =============================================================================
// Analysis Tests
// =============================================================================

#[tokio::test]
async fn test_analysis_reply_uses_analysis_sampling() {
    let server = MockChatServer::with_content(
        r#"{"analysis":"支出稳定","suggestions":["保持"],"highlights":["储蓄率高"],"healthScore":82}"#,
    )
    .await;

    let raw = backend(&server).analyze("统计区间: 全部").await.unwrap();
    let analysis = parse_analysis(&raw);
    assert_eq!(analysis.health_score, 82);
    assert_eq!(analysis.highlights, vec!["储蓄率高"]);

    let request = &server.requests()[0];
    assert_eq!(request["max_tokens"], 1500);
    let temp = request["temperature"].as_f64().unwrap();
    assert!((temp - 0.7).abs() < 0.001);
    assert!(request.to_string().contains("统计区间: 全部"));
}
