#![cfg(feature = "test-utils")]

use std::time::Duration;

use exporter::concurrency::shutdown::create_shutdown_channel;
use exporter::destination::memory::{MemoryDestination, PublishedMessage, StreamOperation};
use exporter::error::ErrorKind;
use exporter::router::{BuiltRow, ChangeEventRouter, DispatchTarget, DropReason, ExportOutcome};
use exporter::schema::{ColumnSchema, ColumnType};
use exporter::test_utils::config::{export_rules, test_table};
use exporter::test_utils::event::{
    TEST_PROJECT_ID, create_event, delete_event, document_name, update_event,
};
use exporter::types::{ChangeMarker, ChangeType, DocumentEventData, Value};
use prost::Message;
use serde_json::json;
use telemetry::init_test_tracing;

const DIRECT_RULES: &str =
    r#"{"rules":{"orders":{"table":"ds.orders_mirror","fields":["Name","Amount"]}}}"#;
const TOPIC_RULES: &str = r#"{"rules":{"orders":{"table":"ds.orders_mirror","fields":["Name","Amount"],"topic":"orders-rows"}}}"#;

/// Row message of `ds.orders_mirror` as BigQuery decodes it.
#[derive(Clone, PartialEq, Message)]
struct OrdersMirrorRow {
    #[prost(string, optional, tag = "1")]
    name: Option<String>,
    #[prost(double, optional, tag = "2")]
    amount: Option<f64>,
    #[prost(string, optional, tag = "3")]
    change_type: Option<String>,
}

type TestRouter = ChangeEventRouter<MemoryDestination, MemoryDestination>;

async fn router(rules: &str) -> (TestRouter, MemoryDestination) {
    let destination = MemoryDestination::new();
    destination
        .register_table(
            test_table("ds", "orders_mirror"),
            vec![
                ColumnSchema::nullable("Name", ColumnType::String),
                ColumnSchema::nullable("Amount", ColumnType::Float64),
            ],
        )
        .await;

    let router = ChangeEventRouter::new(
        export_rules(rules),
        destination.clone(),
        destination.clone(),
        TEST_PROJECT_ID.to_owned(),
    );

    (router, destination)
}

fn acme_order() -> DocumentEventData {
    create_event(
        "orders",
        "o-1",
        [
            ("Name", Value::from("Acme")),
            ("Amount", Value::from(42.5)),
            ("Extra", Value::from("ignored")),
        ],
    )
}

#[tokio::test(flavor = "multi_thread")]
async fn test_row_contains_only_configured_fields() {
    init_test_tracing();

    let (router, destination) = router(DIRECT_RULES).await;

    let BuiltRow::Tagged(tagged) = router.build_row(&acme_order()).unwrap() else {
        panic!("expected a tagged row");
    };

    assert_eq!(tagged.change_type, ChangeType::Create);
    assert_eq!(tagged.document.document_id, "o-1");
    insta::assert_json_snapshot!(tagged.row, @r#"
    {
      "Amount": 42.5,
      "Name": "Acme",
      "_CHANGE_TYPE": "UPSERT"
    }
    "#);
    assert_eq!(destination.dispatch_count().await, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_direct_write_appends_encoded_row() {
    init_test_tracing();

    let (router, destination) = router(DIRECT_RULES).await;

    let outcome = router.export(&acme_order()).await.unwrap();

    assert_eq!(
        outcome,
        ExportOutcome::Dispatched {
            document: exporter::conversions::name::parse_document_name(&document_name(
                "orders", "o-1"
            ))
            .unwrap(),
            change_type: ChangeType::Create,
            target: DispatchTarget::Table(test_table("ds", "orders_mirror")),
        }
    );

    let appended = destination.appended_rows().await;
    assert_eq!(appended.len(), 1);
    assert_eq!(appended[0].rows.len(), 1);

    let row = OrdersMirrorRow::decode(appended[0].rows[0].as_slice()).unwrap();
    assert_eq!(
        row,
        OrdersMirrorRow {
            name: Some("Acme".to_owned()),
            amount: Some(42.5),
            change_type: Some("UPSERT".to_owned()),
        }
    );

    let stream = format!(
        "projects/{TEST_PROJECT_ID}/datasets/ds/tables/orders_mirror/streams/_default"
    );
    assert_eq!(
        destination.stream_operations().await,
        vec![
            StreamOperation::Open(stream.clone()),
            StreamOperation::Append(stream.clone(), 1),
            StreamOperation::Finalize(stream),
            StreamOperation::Commit(format!("{TEST_PROJECT_ID}.ds.orders_mirror")),
        ]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_schema_is_fetched_once_per_rule() {
    init_test_tracing();

    let (router, destination) = router(DIRECT_RULES).await;

    router.export(&acme_order()).await.unwrap();
    router
        .export(&create_event("orders", "o-2", [("Name", Value::from("Beta"))]))
        .await
        .unwrap();

    assert_eq!(destination.schema_fetches().await, 1);
    assert_eq!(destination.appended_rows().await.len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_topic_rule_publishes_json_row() {
    init_test_tracing();

    let (router, destination) = router(TOPIC_RULES).await;

    let outcome = router.export(&acme_order()).await.unwrap();
    assert!(matches!(
        outcome,
        ExportOutcome::Dispatched {
            target: DispatchTarget::Topic(ref topic),
            ..
        } if topic == "orders-rows"
    ));

    let published = destination.published().await;
    assert_eq!(published.len(), 1);
    let PublishedMessage { topic, payload } = &published[0];
    assert_eq!(topic, "orders-rows");
    assert_eq!(
        serde_json::from_slice::<serde_json::Value>(payload).unwrap(),
        json!({"Name": "Acme", "Amount": 42.5, "_CHANGE_TYPE": "UPSERT"})
    );
    assert_eq!(destination.schema_fetches().await, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_non_finite_double_is_not_published() {
    init_test_tracing();

    let (router, destination) = router(TOPIC_RULES).await;

    for amount in [f64::NAN, f64::INFINITY] {
        let event = create_event(
            "orders",
            "o-1",
            [("Name", Value::from("Acme")), ("Amount", Value::from(amount))],
        );

        let err = router.export(&event).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::SerializationError);
        assert!(!err.is_retryable());
        let context = err.context().unwrap();
        assert_eq!(context.collection.as_deref(), Some("orders"));
        assert_eq!(context.document_id.as_deref(), Some("o-1"));
    }

    assert!(destination.published().await.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_change_markers() {
    init_test_tracing();

    let (router, _) = router(TOPIC_RULES).await;
    let fields = || [("Name", Value::from("Acme"))];

    let cases = [
        (create_event("orders", "o-1", fields()), ChangeMarker::Upsert),
        (
            update_event("orders", "o-1", fields(), fields(), None),
            ChangeMarker::Upsert,
        ),
        (delete_event("orders", "o-1", fields()), ChangeMarker::Delete),
    ];

    for (event, marker) in cases {
        let BuiltRow::Tagged(tagged) = router.build_row(&event).unwrap() else {
            panic!("expected a tagged row");
        };
        assert_eq!(tagged.row.marker(), marker);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_delete_takes_values_from_old_snapshot() {
    init_test_tracing();

    let (router, destination) = router(TOPIC_RULES).await;

    router
        .export(&delete_event(
            "orders",
            "o-1",
            [("Name", Value::from("Gone")), ("Amount", Value::null())],
        ))
        .await
        .unwrap();

    let published = destination.published().await;
    assert_eq!(
        serde_json::from_slice::<serde_json::Value>(&published[0].payload).unwrap(),
        json!({"Name": "Gone", "Amount": null, "_CHANGE_TYPE": "DELETE"})
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_irrelevant_update_is_dropped_without_dispatch() {
    init_test_tracing();

    let (router, destination) = router(DIRECT_RULES).await;

    let event = update_event(
        "orders",
        "o-1",
        [("Extra", Value::from("before"))],
        [("Extra", Value::from("after"))],
        Some(&["Extra"][..]),
    );
    let outcome = router.export(&event).await.unwrap();

    assert_eq!(outcome, ExportOutcome::Dropped(DropReason::IrrelevantUpdate));
    assert_eq!(destination.dispatch_count().await, 0);
    assert_eq!(destination.schema_fetches().await, 0);

    let relevant = update_event(
        "orders",
        "o-1",
        [("Name", Value::from("Acme"))],
        [("Name", Value::from("Acme Corp"))],
        Some(&["Name"][..]),
    );
    router.export(&relevant).await.unwrap();
    assert_eq!(destination.dispatch_count().await, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unknown_collection_is_dropped() {
    init_test_tracing();

    let (router, destination) = router(DIRECT_RULES).await;

    let outcome = router
        .export(&create_event("customers", "c-1", [("Name", Value::from("Acme"))]))
        .await
        .unwrap();

    assert_eq!(outcome, ExportOutcome::Dropped(DropReason::UnknownCollection));
    assert_eq!(destination.dispatch_count().await, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_invalid_document_paths_fail() {
    init_test_tracing();

    let (router, destination) = router(DIRECT_RULES).await;

    let mut nested = acme_order();
    if let Some(value) = nested.value.as_mut() {
        value.name = format!("{}/items/i-1", document_name("orders", "o-1"));
    }
    let err = router.export(&nested).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedNestedCollection);
    let nested_path = format!("{}/items/i-1", document_name("orders", "o-1"));
    assert_eq!(
        err.context().unwrap().document_path.as_deref(),
        Some(nested_path.as_str())
    );

    let mut malformed = acme_order();
    if let Some(value) = malformed.value.as_mut() {
        value.name = "orders/o-1".to_owned();
    }
    let err = router.export(&malformed).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedPath);
    assert_eq!(
        err.context().unwrap().document_path.as_deref(),
        Some("orders/o-1")
    );
    assert!(err.to_string().contains("path=orders/o-1"));

    let err = router.build_row(&malformed).unwrap_err();
    assert_eq!(
        err.context().unwrap().document_path.as_deref(),
        Some("orders/o-1")
    );

    assert_eq!(destination.dispatch_count().await, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_dispatch_failure_carries_event_context() {
    init_test_tracing();

    let (router, destination) = router(TOPIC_RULES).await;
    destination.fail_publishes(true).await;

    let err = router.export(&acme_order()).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::DispatchFailed);
    assert!(err.is_retryable());

    let context = err.context().unwrap();
    assert_eq!(context.collection.as_deref(), Some("orders"));
    assert_eq!(context.document_id.as_deref(), Some("o-1"));
    assert_eq!(context.rule.as_deref(), Some("orders"));
    assert_eq!(
        context.document_path.as_deref(),
        Some(document_name("orders", "o-1").as_str())
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unknown_table_fails_schema_fetch_and_retries() {
    init_test_tracing();

    let (router, destination) = router(
        r#"{"rules":{"orders":{"table":"other.missing","fields":["Name"]}}}"#,
    )
    .await;

    for attempt in 1..=2 {
        let err = router.export(&acme_order()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaFetchFailed);
        assert_eq!(destination.schema_fetches().await, attempt);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_invalid_table_reference_fails() {
    init_test_tracing();

    let (router, destination) =
        router(r#"{"rules":{"orders":{"table":"orders","fields":["Name"]}}}"#).await;

    let err = router.export(&acme_order()).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidTableReference);
    assert_eq!(destination.schema_fetches().await, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_shutdown_cancels_in_flight_export() {
    init_test_tracing();

    let (router, destination) = router(TOPIC_RULES).await;
    destination.set_network_delay(Duration::from_secs(60)).await;

    let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let handle = tokio::spawn({
        let router = router.clone();
        async move { router.export_with_shutdown(&acme_order(), shutdown_rx).await }
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown_tx.shutdown().unwrap();

    let err = handle.await.unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert_eq!(err.context().unwrap().collection.as_deref(), Some("orders"));
    assert!(destination.published().await.is_empty());
}
