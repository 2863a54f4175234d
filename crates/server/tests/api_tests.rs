use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{self, Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;

use logscope_core::Pagination;
use logscope_server::api::AppState;
use logscope_server::config::LogscopeConfig;
use logscope_server::store_factory::LogStores;
use logscope_store::{
    AuditColumn, AuditEvent, GroupKey, LogStore, NewAuditEvent, Predicate, QueryLogEntry, Sort,
    StoreError,
};
use logscope_store_memory::MemoryLogStore;

// -- Stalled store --------------------------------------------------------

/// Audit store whose reads never complete and whose batch writes take
/// five seconds each.
struct StalledStore;

#[async_trait]
impl LogStore<AuditEvent> for StalledStore {
    async fn find_page(
        &self,
        _predicates: &[Predicate<AuditColumn>],
        _sort: &[Sort<AuditColumn>],
        _pagination: Pagination,
    ) -> Result<(Vec<AuditEvent>, u64), StoreError> {
        std::future::pending().await
    }

    async fn find_by_id(&self, _id: i64) -> Result<Option<AuditEvent>, StoreError> {
        std::future::pending().await
    }

    async fn insert(&self, _record: NewAuditEvent) -> Result<AuditEvent, StoreError> {
        std::future::pending().await
    }

    async fn insert_batch(&self, records: Vec<NewAuditEvent>) -> Result<u64, StoreError> {
        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
        Ok(records.len() as u64)
    }

    async fn count(&self, _predicates: &[Predicate<AuditColumn>]) -> Result<u64, StoreError> {
        std::future::pending().await
    }

    async fn count_distinct(
        &self,
        _column: AuditColumn,
        _predicates: &[Predicate<AuditColumn>],
    ) -> Result<u64, StoreError> {
        std::future::pending().await
    }

    async fn group_counts(
        &self,
        _key: GroupKey<AuditColumn>,
        _predicates: &[Predicate<AuditColumn>],
        _limit: Option<usize>,
    ) -> Result<Vec<(String, u64)>, StoreError> {
        std::future::pending().await
    }
}

// -- Helpers --------------------------------------------------------------

fn memory_stores() -> LogStores {
    LogStores {
        audit: Arc::new(MemoryLogStore::<AuditEvent>::new()),
        query: Arc::new(MemoryLogStore::<QueryLogEntry>::new()),
    }
}

fn build_app() -> axum::Router {
    logscope_server::api::router(AppState::new(memory_stores()))
}

fn build_app_with_config(toml: &str) -> axum::Router {
    let config: LogscopeConfig = toml::from_str(toml).unwrap();
    logscope_server::api::router(AppState::from_config(memory_stores(), &config))
}

async fn send(app: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

async fn get(app: &axum::Router, uri: &str) -> (StatusCode, Value) {
    send(
        app,
        Request::builder().uri(uri).body(Body::empty()).unwrap(),
    )
    .await
}

async fn post(app: &axum::Router, uri: &str, body: &Value) -> (StatusCode, Value) {
    send(
        app,
        Request::builder()
            .method(http::Method::POST)
            .uri(uri)
            .header(http::header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(body).unwrap()))
            .unwrap(),
    )
    .await
}

fn audit_event(id: i64, user_id: i64, action: &str, timestamp: &str) -> Value {
    json!({
        "id": id,
        "userId": user_id,
        "userType": 1,
        "action": action,
        "timestamp": timestamp,
    })
}

fn query_entry(query: &str, page: &str) -> Value {
    json!({
        "userId": 1,
        "query": query,
        "page": page,
        "timestamp": "2024-03-01T12:00:00Z",
    })
}

fn ids(page: &Value) -> Vec<i64> {
    page["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["id"].as_i64().unwrap())
        .collect()
}

/// Thirty audit events one minute apart. Even ids view an order, odd ids
/// update a status; the user id cycles through 0, 1, 2.
async fn seed_audit_events(app: &axum::Router) {
    let events: Vec<Value> = (1..=30)
        .map(|i| {
            let action = if i % 2 == 0 {
                "viewed order"
            } else {
                "updated status"
            };
            audit_event(i, i % 3, action, &format!("2024-01-01T00:{i:02}:00Z"))
        })
        .collect();
    let (status, summary) = post(app, "/v1/audit-logs/bulk", &json!(events)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["created"], 30);
}

// -- Tests ----------------------------------------------------------------

#[tokio::test]
async fn health_returns_200() {
    let app = build_app();
    let (status, json) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn audit_search_paginates_newest_first() {
    let app = build_app();
    seed_audit_events(&app).await;

    let (status, page) = get(&app, "/v1/audit-logs?limit=10&page=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["meta"]["total"], 30);
    assert_eq!(page["meta"]["page"], 2);
    assert_eq!(page["meta"]["limit"], 10);
    assert_eq!(page["meta"]["totalPages"], 3);
    assert_eq!(page["meta"]["hasNextPage"], true);
    assert_eq!(page["meta"]["count"], 10);
    assert_eq!(ids(&page), (11..=20).rev().collect::<Vec<_>>());

    let (_, last) = get(&app, "/v1/audit-logs?skip=25&take=10").await;
    assert_eq!(last["meta"]["page"], 3);
    assert_eq!(last["meta"]["count"], 5);
    assert_eq!(last["meta"]["hasNextPage"], false);
}

#[tokio::test]
async fn audit_search_applies_filters_sort_and_search() {
    let app = build_app();
    seed_audit_events(&app).await;

    let (status, page) = get(&app, "/v1/audit-logs?userId=0&sort=timestamp:asc").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(&page), vec![3, 6, 9, 12, 15, 18, 21, 24, 27, 30]);

    let (_, page) = get(&app, "/v1/audit-logs?search=STATUS&limit=100").await;
    assert_eq!(page["meta"]["total"], 15);
    assert!(ids(&page).iter().all(|id| id % 2 == 1));

    let (_, page) = get(&app, "/v1/audit-logs?date=2024-01-01&hasOrder=false").await;
    assert_eq!(page["meta"]["total"], 30);

    let (_, page) = get(&app, "/v1/audit-logs?date=2024-01-02").await;
    assert_eq!(page["meta"]["total"], 0);
    assert_eq!(page["meta"]["totalPages"], 0);
}

#[tokio::test]
async fn invalid_queries_return_400_with_error_body() {
    let app = build_app();
    for uri in [
        "/v1/audit-logs?limit=0",
        "/v1/audit-logs?limit=1001",
        "/v1/audit-logs?page=0",
        "/v1/audit-logs?sort=password:asc",
        "/v1/audit-logs?sort=timestamp:sideways",
        "/v1/audit-logs?userId=abc",
        "/v1/query-logs?sort=query:asc",
        "/v1/query-logs?operation=MERGE",
    ] {
        let (status, json) = get(&app, uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert!(json["error"].is_string(), "{uri}");
    }
}

#[tokio::test]
async fn record_get_and_conflict() {
    let app = build_app();

    let (status, created) = post(
        &app,
        "/v1/audit-logs",
        &json!({
            "userId": 7,
            "userType": 2,
            "orderId": 42,
            "action": "status changed",
            "orderStatusFrom": 1,
            "orderStatusTo": 2,
            "timestamp": "2024-01-05T10:00:00Z",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["id"].as_i64().unwrap();
    assert!(created["createdAt"].is_string());

    let (status, fetched) = get(&app, &format!("/v1/audit-logs/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["action"], "status changed");
    assert_eq!(fetched["orderId"], 42);

    let (status, json) = get(&app, "/v1/audit-logs/999").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "audit_log 999 not found");

    let (status, _) = get(&app, "/v1/audit-logs/abc").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = post(
        &app,
        "/v1/audit-logs",
        &audit_event(id, 7, "replayed", "2024-01-05T10:00:00Z"),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn bulk_insert_skips_existing_ids() {
    let app = build_app();
    let batch = |ids: &[i64]| {
        json!(
            ids.iter()
                .map(|id| audit_event(*id, 1, "imported", "2023-12-31T23:00:00Z"))
                .collect::<Vec<_>>()
        )
    };

    let (_, first) = post(&app, "/v1/audit-logs/bulk", &batch(&[1, 2, 3])).await;
    assert_eq!(first, json!({"created": 3, "skipped": 0}));

    let (_, second) = post(&app, "/v1/audit-logs/bulk", &batch(&[2, 3, 4])).await;
    assert_eq!(second, json!({"created": 1, "skipped": 2}));

    // Fresh rows continue after the highest migrated id.
    let (_, fresh) = post(
        &app,
        "/v1/audit-logs",
        &json!({"userId": 1, "userType": 1, "action": "new", "timestamp": "2024-01-01T00:00:00Z"}),
    )
    .await;
    assert_eq!(fresh["id"], 5);

    let (status, _) = post(&app, "/v1/audit-logs/bulk", &json!({"not": "an array"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn audit_statistics_respect_the_window() {
    let app = build_app();
    let mut events = vec![
        audit_event(1, 1, "login", "2024-01-01T09:00:00Z"),
        audit_event(2, 1, "login", "2024-01-02T09:00:00Z"),
        audit_event(3, 2, "login", "2024-01-03T09:00:00Z"),
    ];
    events.push(json!({
        "id": 4,
        "userId": 2,
        "userType": 1,
        "orderId": 5,
        "action": "status changed",
        "orderStatusFrom": 1,
        "orderStatusTo": 2,
        "timestamp": "2024-01-04T09:00:00Z",
    }));
    post(&app, "/v1/audit-logs/bulk", &json!(events)).await;

    let (status, stats) = get(&app, "/v1/audit-logs/statistics").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total"], 4);
    assert_eq!(stats["uniqueUsers"], 2);
    assert_eq!(stats["uniqueOrders"], 1);
    assert_eq!(stats["statusChanges"], 1);
    assert_eq!(stats["topActions"][0]["label"], "login");
    assert_eq!(stats["topActions"][0]["count"], 3);
    assert_eq!(stats["topActions"][0]["percentage"], 75.0);

    let (_, windowed) = get(
        &app,
        "/v1/audit-logs/statistics?fromDate=2024-01-02&toDate=2024-01-04",
    )
    .await;
    assert_eq!(windowed["total"], 2);
    assert_eq!(windowed["uniqueUsers"], 2);
    assert_eq!(windowed["statusChanges"], 0);

    let (status, json) = get(
        &app,
        "/v1/audit-logs/statistics?fromDate=2024-01-04&toDate=2024-01-02",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("time window"));
}

#[tokio::test]
async fn query_log_search_annotates_items() {
    let app = build_app();
    let entries = json!([
        query_entry("SELECT * FROM orders", "/orders"),
        query_entry("  update orders set status = 2", "/orders/1"),
        query_entry("select id from customers order by name limit 10", "/customers"),
        query_entry("DELETE FROM saddles WHERE id = 1", "/saddles"),
    ]);
    let (_, summary) = post(&app, "/v1/query-logs/bulk", &entries).await;
    assert_eq!(summary["created"], 4);

    let (status, page) = get(&app, "/v1/query-logs").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["meta"]["total"], 4);
    assert_eq!(page["meta"]["limit"], 100);
    let items = page["items"].as_array().unwrap();
    let by_page = |path: &str| {
        items
            .iter()
            .find(|item| item["page"] == path)
            .unwrap()
            .clone()
    };
    assert_eq!(by_page("/orders")["potentiallySlow"], true);
    assert_eq!(by_page("/orders")["operation"], "SELECT");
    assert_eq!(by_page("/orders/1")["potentiallySlow"], false);
    assert_eq!(by_page("/orders/1")["operation"], "UPDATE");
    assert_eq!(by_page("/customers")["potentiallySlow"], true);
    assert_eq!(by_page("/customers")["slowReasons"], json!(["order_by_with_limit"]));
    assert_eq!(by_page("/orders/1")["slowReasons"], json!([]));

    let (_, slow) = get(&app, "/v1/query-logs?potentiallySlow=true").await;
    assert_eq!(slow["meta"]["total"], 2);

    let (_, updates) = get(&app, "/v1/query-logs?operation=UPDATE").await;
    assert_eq!(updates["meta"]["total"], 1);

    let (_, exact) = get(&app, "/v1/query-logs?pagePath=/orders").await;
    assert_eq!(exact["meta"]["total"], 1);

    let (_, contains) = get(&app, "/v1/query-logs?pageContains=orders&page=1&limit=1").await;
    assert_eq!(contains["meta"]["total"], 2);
    assert_eq!(contains["meta"]["count"], 1);

    let (status, single) = get(&app, "/v1/query-logs/4").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(single["operation"], "DELETE");
}

#[tokio::test]
async fn analysis_ranks_high_impact_first() {
    let app = build_app();
    let mut entries: Vec<Value> = (0..15)
        .map(|_| query_entry("SELECT * FROM orders", "/orders"))
        .collect();
    entries.extend((0..5).map(|_| query_entry("select id from customers", "/customers")));
    post(&app, "/v1/query-logs/bulk", &json!(entries)).await;

    let (status, analysis) = get(&app, "/v1/query-logs/analysis").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(analysis["statistics"]["total"], 20);

    let insights = analysis["performanceInsights"].as_array().unwrap();
    let categories: Vec<&str> = insights
        .iter()
        .map(|f| f["category"].as_str().unwrap())
        .collect();
    assert_eq!(categories, vec!["Caching", "Caching", "Query Optimization"]);
    assert_eq!(insights[0]["impact"], "high");
    assert!(insights[0]["finding"].as_str().unwrap().contains("/orders"));
    assert_eq!(insights[2]["impact"], "medium");
    assert_eq!(
        analysis["recommendations"].as_array().unwrap().len(),
        insights.len()
    );

    let (_, empty) = get(&app, "/v1/query-logs/analysis?fromDate=2030-01-01").await;
    assert_eq!(empty["statistics"]["total"], 0);
    assert!(empty["performanceInsights"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn query_log_statistics_break_down_operations() {
    let app = build_app();
    post(
        &app,
        "/v1/query-logs/bulk",
        &json!([
            query_entry("select 1", "/a"),
            query_entry("SELECT 2", "/a"),
            query_entry("insert into t values (1)", "/b"),
            query_entry("vacuum", "/b"),
        ]),
    )
    .await;

    let (status, stats) = get(&app, "/v1/query-logs/statistics").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total"], 4);
    assert_eq!(stats["uniqueUsers"], 1);
    let operations: Vec<(&str, u64)> = stats["operations"]
        .as_array()
        .unwrap()
        .iter()
        .map(|g| (g["label"].as_str().unwrap(), g["count"].as_u64().unwrap()))
        .collect();
    assert_eq!(operations, vec![("SELECT", 2), ("INSERT", 1), ("OTHER", 1)]);
}

#[tokio::test]
async fn archive_is_a_no_op() {
    let app = build_app();
    let (status, json) = post(&app, "/v1/audit-logs/archive", &json!({"olderThanDays": 90})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({"archived": 0}));

    let (status, _) = post(&app, "/v1/query-logs/archive", &json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn cached_searches_see_new_records() {
    let app = build_app_with_config("[cache]\nenabled = true\n");

    let (_, before) = get(&app, "/v1/audit-logs").await;
    assert_eq!(before["meta"]["total"], 0);

    post(
        &app,
        "/v1/audit-logs",
        &audit_event(1, 1, "login", "2024-01-01T00:00:00Z"),
    )
    .await;

    let (_, after) = get(&app, "/v1/audit-logs").await;
    assert_eq!(after["meta"]["total"], 1);
}

#[tokio::test(start_paused = true)]
async fn stalled_store_times_out_with_504() {
    let config: LogscopeConfig = toml::from_str("[server]\nrequest_timeout_seconds = 2\n").unwrap();
    let stores = LogStores {
        audit: Arc::new(StalledStore),
        query: Arc::new(MemoryLogStore::<QueryLogEntry>::new()),
    };
    let app = logscope_server::api::router(AppState::from_config(stores, &config));

    let (status, json) = get(&app, "/v1/audit-logs/statistics").await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(json["error"], "request timed out after 2s");

    let (status, _) = get(&app, "/v1/query-logs/statistics").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test(start_paused = true)]
async fn bulk_insert_outlives_the_request_timeout() {
    let config: LogscopeConfig = toml::from_str("[server]\nrequest_timeout_seconds = 2\n").unwrap();
    let stores = LogStores {
        audit: Arc::new(StalledStore),
        query: Arc::new(MemoryLogStore::<QueryLogEntry>::new()),
    };
    let app = logscope_server::api::router(AppState::from_config(stores, &config));

    let batch = json!([
        audit_event(1, 1, "login", "2024-01-01T00:00:00Z"),
        audit_event(2, 1, "logout", "2024-01-01T01:00:00Z"),
    ]);
    let (status, json) = post(&app, "/v1/audit-logs/bulk", &batch).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({"created": 2, "skipped": 0}));
}

#[tokio::test]
async fn out_of_range_offsets_and_ages_return_400() {
    let app = build_app();

    let (status, json) = get(&app, "/v1/audit-logs?skip=18446744073709551615&take=1").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("row offset"));

    let (status, _) = get(&app, "/v1/query-logs?page=18446744073709551615&limit=1000").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, json) = post(
        &app,
        "/v1/audit-logs/archive",
        &json!({"olderThanDays": 4_294_967_295_u64}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("olderThanDays"));
}

#[tokio::test]
async fn cached_search_terms_do_not_collide_with_filters() {
    let app = build_app_with_config("[cache]\nenabled = true\n");
    post(
        &app,
        "/v1/audit-logs",
        &audit_event(1, 1, "login", "2024-01-01T00:00:00Z"),
    )
    .await;

    // search=o:filters:{"userId":1}
    let (_, forged) = get(&app, "/v1/audit-logs?search=o%3Afilters%3A%7B%22userId%22%3A1%7D").await;
    assert_eq!(forged["meta"]["total"], 0);

    let (_, filtered) = get(&app, "/v1/audit-logs?search=o&userId=1").await;
    assert_eq!(filtered["meta"]["total"], 1);
}
