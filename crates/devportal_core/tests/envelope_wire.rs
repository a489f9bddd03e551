use devportal_core::db::open_db_in_memory;
use devportal_core::service::faq_service::{CreateFaqRequest, UpdateFaqRequest};
use devportal_core::{execute_safely, FaqService, SqliteStore};
use serde_json::Value;
use uuid::Uuid;

#[test]
fn missing_faq_serializes_as_technical_exception() {
    let conn = open_db_in_memory().unwrap();
    let service = FaqService::new(SqliteStore::new(&conn));

    let response = execute_safely(|| service.get_faq(Uuid::new_v4()));
    let json = serde_json::to_value(&response).unwrap();

    assert_eq!(json["payload"], Value::Null);
    assert_eq!(json["exception"]["code"], "DP-404");
    assert_eq!(json["exception"]["description"], "faq not found");
    assert_eq!(json["exception"]["category"], "technical");
    assert!(json["exception"]["id"].is_string());
}

#[test]
fn validation_failure_serializes_as_business_exception() {
    let conn = open_db_in_memory().unwrap();
    let service = FaqService::new(SqliteStore::new(&conn));
    let request: UpdateFaqRequest = serde_json::from_value(serde_json::json!({
        "id": Uuid::new_v4(),
        "question": "Where are the docs?",
        "answer": "In the portal.",
        "langcode": "en",
        "faq_order": 1
    }))
    .unwrap();
    assert!(request.categories.is_none());

    let json = serde_json::to_value(execute_safely(|| service.update_faq(&request))).unwrap();

    assert_eq!(json["exception"]["code"], "DP-422");
    assert_eq!(json["exception"]["category"], "business");
    assert_eq!(json["exception"]["description"], "`status` is required");
}

#[test]
fn success_payload_carries_flattened_fields_and_categories() {
    let conn = open_db_in_memory().unwrap();
    let service = FaqService::new(SqliteStore::new(&conn));
    let id = service
        .create_faq(&CreateFaqRequest {
            question: "What is sandbox?".to_string(),
            answer: "A test environment.".to_string(),
            langcode: "en".to_string(),
            status: Some(true),
            faq_order: Some(4),
            categories: Vec::new(),
        })
        .unwrap();

    let json = serde_json::to_value(execute_safely(|| service.get_faq(id))).unwrap();

    assert_eq!(json["exception"], Value::Null);
    assert_eq!(json["payload"]["id"], id.to_string());
    assert_eq!(json["payload"]["question"], "What is sandbox?");
    assert_eq!(json["payload"]["faq_order"], 4);
    assert_eq!(json["payload"]["categories"], serde_json::json!([]));
}
