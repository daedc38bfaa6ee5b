//! Function calls through the registry, checked at the string boundary.

mod common;

use std::sync::Arc;

use chrono::FixedOffset;
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio_stream::StreamExt;

use wasbot::channels::BroadcastNotifier;
use wasbot::db::MemoryStore;
use wasbot::db::memory::Write;
use wasbot::models::{AccountContext, ContactAttribute, CustomField};
use wasbot::tools::{ToolError, ToolRegistry};

use common::{AI_QUEUE, TENANT, contact, open_ticket, seeded_store};

struct Harness {
    store: Arc<MemoryStore>,
    notifier: Arc<BroadcastNotifier>,
    registry: ToolRegistry,
}

fn harness() -> Harness {
    let store = seeded_store();
    store.insert_ticket(open_ticket(42, AI_QUEUE, 10));
    let store = Arc::new(store);
    let notifier = Arc::new(BroadcastNotifier::new());
    let offset = FixedOffset::west_opt(3 * 3600).unwrap();
    let registry = ToolRegistry::with_builtins(store.clone(), notifier.clone(), offset);
    Harness {
        store,
        notifier,
        registry,
    }
}

fn ctx() -> AccountContext {
    AccountContext::new(42, TENANT).with_contact(10).with_user(3)
}

impl Harness {
    async fn call(&self, name: &str, args: serde_json::Value) -> String {
        self.registry.dispatch(name, args, &ctx()).await.unwrap()
    }
}

// ==================== find_customer ====================

#[tokio::test]
async fn test_find_builtin_attributes() {
    let h = harness();
    assert_eq!(h.call("find_customer", json!({"field": "name"})).await, "Ana");
    assert_eq!(
        h.call("find_customer", json!({"field": "number"})).await,
        "5511999999999"
    );
    // Empty email reads as unknown
    assert_eq!(h.call("find_customer", json!({"field": "email"})).await, "null");
}

#[tokio::test]
async fn test_find_custom_fields() {
    let h = harness();
    assert_eq!(h.call("find_customer", json!({"field": "plan"})).await, "basic");
    assert_eq!(h.call("find_customer", json!({"field": "Plan"})).await, "null");
    assert_eq!(h.call("find_customer", json!({"field": "city"})).await, "null");
}

#[tokio::test]
async fn test_find_outside_tenant_is_null() {
    let h = harness();
    let foreign = AccountContext::new(42, TENANT + 1);
    let result = h
        .registry
        .dispatch("find_customer", json!({"field": "name"}), &foreign)
        .await
        .unwrap();
    assert_eq!(result, "null");
}

// ==================== register_customer ====================

#[tokio::test]
async fn test_register_number_is_ignored() {
    let h = harness();
    let result = h
        .call(
            "register_customer",
            json!({"field": "number", "value": "5511888888888"}),
        )
        .await;

    assert_eq!(result, "true");
    assert_eq!(h.store.contact(10).unwrap().number, "5511999999999");
    assert!(h.store.writes().is_empty());
}

#[tokio::test]
async fn test_register_invalid_email_makes_no_write() {
    let h = harness();
    let result = h
        .call(
            "register_customer",
            json!({"field": "email", "value": "not-an-email"}),
        )
        .await;

    assert_eq!(result, "null");
    assert!(h.store.writes().is_empty());
}

#[tokio::test]
async fn test_register_email_and_name() {
    let h = harness();
    assert_eq!(
        h.call(
            "register_customer",
            json!({"field": "email", "value": "ana@example.com"})
        )
        .await,
        "true"
    );
    assert_eq!(
        h.call("register_customer", json!({"field": "name", "value": "Ana Maria"}))
            .await,
        "true"
    );

    let stored = h.store.contact(10).unwrap();
    assert_eq!(stored.email, "ana@example.com");
    assert_eq!(stored.name, "Ana Maria");
    assert_eq!(
        h.store.writes()[0],
        Write::ContactAttribute {
            contact_id: 10,
            attribute: ContactAttribute::Email,
            value: "ana@example.com".to_string()
        }
    );
}

#[tokio::test]
async fn test_register_blank_name_is_rejected() {
    let h = harness();
    let result = h
        .call("register_customer", json!({"field": "name", "value": "   "}))
        .await;
    assert_eq!(result, "null");
    assert_eq!(h.store.contact(10).unwrap().name, "Ana");
}

#[tokio::test]
async fn test_register_custom_field_merges() {
    let h = harness();
    assert_eq!(
        h.call("register_customer", json!({"field": "city", "value": "Recife"}))
            .await,
        "true"
    );
    assert_eq!(
        h.call("register_customer", json!({"field": "plan", "value": "premium"}))
            .await,
        "true"
    );

    let mut fields = h.store.contact(10).unwrap().custom_fields;
    fields.sort_by(|a, b| a.name.cmp(&b.name));
    assert_eq!(
        fields,
        vec![
            CustomField {
                name: "city".to_string(),
                value: "Recife".to_string()
            },
            CustomField {
                name: "plan".to_string(),
                value: "premium".to_string()
            },
        ]
    );
    assert_eq!(h.call("find_customer", json!({"field": "plan"})).await, "premium");
}

#[tokio::test]
async fn test_register_rejects_bad_scope_and_arguments() {
    let h = harness();

    let no_contact = AccountContext::new(42, TENANT);
    let result = h
        .registry
        .dispatch(
            "register_customer",
            json!({"field": "city", "value": "Recife"}),
            &no_contact,
        )
        .await
        .unwrap();
    assert_eq!(result, "null");

    let other_tenant = AccountContext::new(42, TENANT + 1).with_contact(10);
    let result = h
        .registry
        .dispatch(
            "register_customer",
            json!({"field": "city", "value": "Recife"}),
            &other_tenant,
        )
        .await
        .unwrap();
    assert_eq!(result, "null");

    assert_eq!(
        h.call("register_customer", json!({"field": "age", "value": 31}))
            .await,
        "null"
    );
    assert_eq!(
        h.call("register_customer", json!({"field": "city", "value": ""}))
            .await,
        "null"
    );
    assert!(h.store.writes().is_empty());
}

#[tokio::test]
async fn test_register_persistence_error_is_null() {
    let h = harness();
    h.store.fail_writes(true);
    let result = h
        .call("register_customer", json!({"field": "city", "value": "Recife"}))
        .await;
    assert_eq!(result, "null");
}

#[tokio::test]
async fn test_register_unknown_contact_is_null() {
    let h = harness();
    let ghost = AccountContext::new(42, TENANT).with_contact(999);
    let result = h
        .registry
        .dispatch(
            "register_customer",
            json!({"field": "city", "value": "Recife"}),
            &ghost,
        )
        .await
        .unwrap();
    assert_eq!(result, "null");
    assert_eq!(contact(10), h.store.contact(10).unwrap());
}

// ==================== check_calendar / schedule ====================

#[tokio::test]
async fn test_schedule_takes_the_slot() {
    let h = harness();
    let mut notifications = Box::pin(h.notifier.subscribe());
    let slot = json!({"date": "2024-05-10 14:00"});

    assert_eq!(h.call("check_calendar", slot.clone()).await, "true");
    assert_eq!(
        h.call(
            "schedule",
            json!({"date": "2024-05-10 14:00", "message": "Consulta confirmada"})
        )
        .await,
        "true"
    );
    assert_eq!(h.call("check_calendar", slot).await, "false");

    let schedules = h.store.schedules();
    assert_eq!(schedules.len(), 1);
    assert_eq!(schedules[0].contact_id, Some(10));
    assert_eq!(schedules[0].user_id, Some(3));
    assert_eq!(schedules[0].tenant_id, TENANT);

    let notification = notifications.next().await.unwrap();
    assert_eq!(notification.event, "schedule");
    assert_eq!(notification.rooms, vec!["company-7-mainchannel"]);
    assert_eq!(notification.payload["action"], "create");
}

#[tokio::test]
async fn test_slots_are_per_tenant() {
    let h = harness();
    h.call(
        "schedule",
        json!({"date": "2024-05-10T17:00:00Z", "message": "Retorno"}),
    )
    .await;

    let other = AccountContext::new(1, TENANT + 1);
    let result = h
        .registry
        .dispatch("check_calendar", json!({"date": "2024-05-10 14:00"}), &other)
        .await
        .unwrap();
    assert_eq!(result, "true");
    // Same instant written in the tenant offset
    assert_eq!(
        h.call("check_calendar", json!({"date": "2024-05-10 14:00"})).await,
        "false"
    );
}

#[tokio::test]
async fn test_check_calendar_propagates_datastore_errors() {
    let h = harness();
    h.store.fail_reads(true);
    let result = h
        .registry
        .dispatch("check_calendar", json!({"date": "2024-05-10 14:00"}), &ctx())
        .await;
    assert!(matches!(result, Err(ToolError::Database(_))));
}

#[tokio::test]
async fn test_check_calendar_unparseable_date_is_null() {
    let h = harness();
    assert_eq!(
        h.call("check_calendar", json!({"date": "next friday"})).await,
        "null"
    );
}

#[tokio::test]
async fn test_schedule_never_propagates() {
    let h = harness();
    h.store.fail_writes(true);
    assert_eq!(
        h.call("schedule", json!({"date": "2024-05-10 14:00", "message": "x"}))
            .await,
        "false"
    );
    assert_eq!(
        h.call("schedule", json!({"date": "2024-05-10 14:00"})).await,
        "false"
    );
    assert_eq!(h.notifier.published_count(), 0);
}

// ==================== get_current_date ====================

#[tokio::test]
async fn test_current_date_shape() {
    let h = harness();
    let now = h.call("get_current_date", json!({})).await;
    let pattern = regex::Regex::new(r"^\d{2}/\d{2}/\d{4}, \d{2}:\d{2}:\d{2}$").unwrap();
    assert!(pattern.is_match(&now), "unexpected date {now}");
}
