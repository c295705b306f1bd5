use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use chrono::NaiveDate;
use rds_data_api::{
    DataApi, DataApiConfig, DataApiError, Engine, HttpExecutionService, HttpOptions, Params,
    TransactionState, Value,
};
use serde_json::{json, Value as JsonValue};

#[derive(Clone)]
struct MockResponse {
    status: StatusCode,
    body: JsonValue,
    delay: Duration,
}

impl MockResponse {
    fn json(status: StatusCode, body: JsonValue) -> Self {
        Self {
            status,
            body,
            delay: Duration::from_millis(0),
        }
    }

    fn ok(body: JsonValue) -> Self {
        Self::json(StatusCode::OK, body)
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Clone, Debug)]
struct CapturedRequest {
    operation: String,
    authorization: Option<String>,
    body: JsonValue,
}

#[derive(Clone)]
struct MockState {
    responses: Arc<Mutex<VecDeque<MockResponse>>>,
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
    hits: Arc<AtomicUsize>,
}

async fn operation_handler(
    State(state): State<MockState>,
    Path(operation): Path<String>,
    headers: HeaderMap,
    Json(body): Json<JsonValue>,
) -> impl IntoResponse {
    state.hits.fetch_add(1, Ordering::SeqCst);
    state
        .requests
        .lock()
        .expect("request log mutex must not be poisoned")
        .push(CapturedRequest {
            operation,
            authorization: headers
                .get(header::AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .map(str::to_owned),
            body,
        });

    let response = {
        let mut queue = state
            .responses
            .lock()
            .expect("response queue mutex must not be poisoned");
        queue.pop_front().unwrap_or_else(|| {
            MockResponse::json(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"message": "no mock response available"}),
            )
        })
    };

    if !response.delay.is_zero() {
        tokio::time::sleep(response.delay).await;
    }

    (response.status, Json(response.body))
}

struct TestServer {
    base_url: String,
    hits: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
    task: tokio::task::JoinHandle<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl TestServer {
    fn api(&self) -> DataApi {
        self.api_with(config())
    }

    fn api_with(&self, config: DataApiConfig) -> DataApi {
        DataApi::new(HttpExecutionService::new(self.base_url.clone()), config)
    }

    fn requests(&self) -> Vec<CapturedRequest> {
        self.requests
            .lock()
            .expect("request log mutex must not be poisoned")
            .clone()
    }
}

async fn spawn_server(responses: Vec<MockResponse>) -> TestServer {
    let state = MockState {
        responses: Arc::new(Mutex::new(responses.into())),
        requests: Arc::new(Mutex::new(Vec::new())),
        hits: Arc::new(AtomicUsize::new(0)),
    };

    let app = Router::new()
        .route("/:operation", post(operation_handler))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("must bind test listener");
    let address = listener.local_addr().expect("must have local addr");
    let task = tokio::spawn(async move {
        axum::serve(listener, app)
            .await
            .expect("mock server must run");
    });

    TestServer {
        base_url: format!("http://{address}"),
        hits: state.hits,
        requests: state.requests,
        task,
    }
}

fn config() -> DataApiConfig {
    DataApiConfig::new("arn:aws:rds:us-east-1:123456789012:cluster:pets", "arn:secret")
        .with_database("test")
}

fn pets_body() -> JsonValue {
    json!({
        "numberOfRecordsUpdated": 0,
        "records": [
            [{"longValue": 1}, {"stringValue": "dog"}, {"stringValue": "2020-01-02"}],
            [{"longValue": 2}, {"stringValue": "cat"}, {"isNull": true}]
        ],
        "columnMetadata": [
            {"label": "id", "name": "id", "type": 4, "typeName": "INT"},
            {"label": "name", "name": "name", "type": 12, "typeName": "VARCHAR"},
            {"label": "born", "name": "born", "type": 91, "typeName": "DATE"}
        ]
    })
}

#[tokio::test]
async fn execute_with_columns_decodes_typed_rows() {
    let server = spawn_server(vec![MockResponse::ok(pets_body())]).await;
    let api = server.api();

    let result = api
        .execute(
            "SELECT id, name, born FROM pets WHERE name <> :name",
            Params::new().bind("name", "bird"),
            true,
        )
        .await
        .expect("execute must succeed");

    assert_eq!(result.len(), 2);
    assert_eq!(result.column_names(), Some(vec!["id", "name", "born"]));
    assert_eq!(result[0].get_by_name("name").expect("name"), &Value::text("dog"));
    assert_eq!(
        result[0][2],
        Value::Date(NaiveDate::from_ymd_opt(2020, 1, 2).expect("date"))
    );
    assert_eq!(result[1][2], Value::Null);
    assert!(matches!(
        result.one(),
        Err(DataApiError::MultipleRecordsFound(2))
    ));

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].operation, "Execute");
    assert_eq!(
        requests[0].body,
        json!({
            "resourceArn": "arn:aws:rds:us-east-1:123456789012:cluster:pets",
            "secretArn": "arn:secret",
            "sql": "SELECT id, name, born FROM pets WHERE name <> :name",
            "database": "test",
            "parameters": [{"name": "name", "value": {"stringValue": "bird"}}],
            "includeResultMetadata": true,
            "continueAfterTimeout": true
        })
    );
}

#[tokio::test]
async fn execute_dml_returns_count_and_generated_key() {
    let server = spawn_server(vec![MockResponse::ok(json!({
        "numberOfRecordsUpdated": 1,
        "generatedFields": [{"longValue": 42}]
    }))])
    .await;
    let api = server.api();

    let born = NaiveDate::from_ymd_opt(2021, 6, 1).expect("date");
    let result = api
        .execute(
            "INSERT INTO pets (name, born) VALUES (:name, :born)",
            Params::new().bind("name", "dog").bind("born", born),
            false,
        )
        .await
        .expect("execute must succeed");

    assert!(result.is_empty());
    assert_eq!(result.number_of_records_updated(), Some(1));
    assert_eq!(result.generated_keys(), [Value::Int(42)]);

    let requests = server.requests();
    assert_eq!(
        requests[0].body["parameters"][1],
        json!({"name": "born", "value": {"stringValue": "2021-06-01"}, "typeHint": "DATE"})
    );
    assert_eq!(requests[0].body["includeResultMetadata"], json!(false));
}

#[tokio::test]
async fn scalar_reads_first_value_of_select_one() {
    let server = spawn_server(vec![MockResponse::ok(json!({
        "numberOfRecordsUpdated": 0,
        "records": [[{"longValue": 1}]]
    }))])
    .await;
    let api = server.api();

    let result = api
        .execute("select 1", (), false)
        .await
        .expect("execute must succeed");

    assert_eq!(result.scalar().expect("scalar"), &Value::Int(1));
    assert!(server.requests()[0].body.get("parameters").is_none());
}

#[tokio::test]
async fn batch_execute_sends_parameter_sets_and_collects_keys() {
    let server = spawn_server(vec![MockResponse::ok(json!({
        "updateResults": [
            {"generatedFields": [{"longValue": 1}]},
            {"generatedFields": [{"longValue": 2}]},
            {"generatedFields": [{"longValue": 3}]}
        ]
    }))])
    .await;
    let api = server.api();

    let rows: Vec<Params> = ["dog", "cat", "bird"]
        .into_iter()
        .map(|name| Params::new().bind("name", name))
        .collect();
    let result = api
        .execute("INSERT INTO pets (name) VALUES (:name)", rows, false)
        .await
        .expect("batch must succeed");

    assert_eq!(
        result.generated_keys(),
        [Value::Int(1), Value::Int(2), Value::Int(3)]
    );
    assert_eq!(result.number_of_records_updated(), Some(3));

    let requests = server.requests();
    assert_eq!(requests[0].operation, "BatchExecute");
    assert_eq!(
        requests[0].body["parameterSets"],
        json!([
            [{"name": "name", "value": {"stringValue": "dog"}}],
            [{"name": "name", "value": {"stringValue": "cat"}}],
            [{"name": "name", "value": {"stringValue": "bird"}}]
        ])
    );
}

#[tokio::test]
async fn ragged_and_empty_batches_never_reach_the_service() {
    let server = spawn_server(Vec::new()).await;
    let api = server.api();

    let err = api
        .execute(
            "INSERT INTO t (a, b) VALUES (:a, :b)",
            vec![
                Params::new().bind("a", 1).bind("b", 2),
                Params::new().bind("a", 3),
            ],
            false,
        )
        .await
        .expect_err("ragged batch must fail");
    assert!(matches!(
        err,
        DataApiError::InconsistentBatchColumns { row_index: 1, .. }
    ));

    let result = api
        .execute("INSERT INTO t (a) VALUES (:a)", Vec::<Params>::new(), false)
        .await
        .expect("empty batch is a no-op");
    assert_eq!(result.number_of_records_updated(), Some(0));
    assert_eq!(server.hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn transaction_round_trip_tags_every_call() {
    let server = spawn_server(vec![
        MockResponse::ok(json!({"transactionId": "tx-1"})),
        MockResponse::ok(json!({"numberOfRecordsUpdated": 1})),
        MockResponse::ok(json!({"transactionStatus": "Transaction Committed"})),
    ])
    .await;
    let api = server.api();

    let mut transaction = api.begin().await.expect("begin must succeed");
    assert_eq!(transaction.transaction_id(), Some("tx-1"));
    transaction
        .execute("DELETE FROM pets WHERE id = :id", Params::new().bind("id", 2), false)
        .await
        .expect("execute must succeed");
    let status = transaction.commit().await.expect("commit must succeed");

    assert_eq!(status, "Transaction Committed");
    assert_eq!(transaction.state(), TransactionState::Committed);

    let requests = server.requests();
    let operations: Vec<_> = requests.iter().map(|r| r.operation.as_str()).collect();
    assert_eq!(
        operations,
        ["BeginTransaction", "Execute", "CommitTransaction"]
    );
    assert_eq!(requests[0].body["database"], json!("test"));
    assert_eq!(requests[1].body["transactionId"], json!("tx-1"));
    assert_eq!(
        requests[2].body,
        json!({
            "resourceArn": "arn:aws:rds:us-east-1:123456789012:cluster:pets",
            "secretArn": "arn:secret",
            "transactionId": "tx-1"
        })
    );
}

#[tokio::test]
async fn postgresql_config_shapes_requests_and_decoding() {
    let server = spawn_server(vec![
        MockResponse::ok(json!({"transactionId": "tx-pg"})),
        MockResponse::ok(json!({
            "numberOfRecordsUpdated": 0,
            "records": [[{"stringValue": "2020-01-02T05:04:05.5+02"}]],
            "columnMetadata": [
                {"label": "seen_at", "name": "seen_at", "type": 93, "typeName": "timestamptz"}
            ]
        })),
        MockResponse::ok(json!({"transactionStatus": "Transaction Committed"})),
    ])
    .await;
    let api = server.api_with(
        config()
            .with_engine(Engine::PostgreSql)
            .with_schema("public")
            .with_continue_after_timeout(false),
    );

    let mut transaction = api.begin().await.expect("begin must succeed");
    let result = transaction
        .execute("SELECT seen_at FROM visits", (), true)
        .await
        .expect("execute must succeed");
    transaction.commit().await.expect("commit must succeed");

    let expected = NaiveDate::from_ymd_opt(2020, 1, 2)
        .and_then(|date| date.and_hms_milli_opt(3, 4, 5, 500))
        .expect("valid datetime");
    assert_eq!(
        result.scalar().expect("scalar"),
        &Value::DateTime(expected)
    );

    let requests = server.requests();
    assert_eq!(requests[0].operation, "BeginTransaction");
    assert_eq!(requests[0].body["schema"], json!("public"));
    assert_eq!(requests[0].body["database"], json!("test"));
    assert_eq!(requests[1].operation, "Execute");
    assert_eq!(requests[1].body["continueAfterTimeout"], json!(false));
    assert_eq!(requests[1].body["schema"], json!("public"));
    assert_eq!(requests[1].body["includeResultMetadata"], json!(true));
    assert_eq!(requests[1].body["transactionId"], json!("tx-pg"));
}

#[tokio::test]
async fn scoped_block_rolls_back_over_http() {
    let server = spawn_server(vec![
        MockResponse::ok(json!({"transactionId": "tx-2"})),
        MockResponse::json(
            StatusCode::BAD_REQUEST,
            json!({"message": "Duplicate entry '1' for key 'PRIMARY'"}),
        ),
        MockResponse::ok(json!({"transactionStatus": "Rollback Complete"})),
    ])
    .await;
    let api = server.api();

    let err = api
        .transaction(|tx| {
            Box::pin(async move {
                tx.execute("INSERT INTO pets (id) VALUES (1)", (), false)
                    .await?;
                Ok::<_, DataApiError>(())
            })
        })
        .await
        .expect_err("scope must fail");

    match err {
        DataApiError::Http { status, body } => {
            assert_eq!(status, 400);
            assert!(body.contains("Duplicate entry"));
        }
        other => panic!("expected http error, got {other:?}"),
    }
    let requests = server.requests();
    assert_eq!(requests[2].operation, "RollbackTransaction");
    assert_eq!(requests[2].body["transactionId"], json!("tx-2"));
}

#[tokio::test]
async fn authorization_header_is_forwarded() {
    let server = spawn_server(vec![MockResponse::ok(json!({"numberOfRecordsUpdated": 0}))]).await;
    let service =
        HttpExecutionService::new(server.base_url.clone()).with_authorization("AWS4-HMAC-SHA256 x");
    let api = DataApi::new(service, config());

    api.execute("DELETE FROM pets", (), false)
        .await
        .expect("execute must succeed");

    assert_eq!(
        server.requests()[0].authorization.as_deref(),
        Some("AWS4-HMAC-SHA256 x")
    );
}

#[tokio::test]
async fn http_error_status_is_not_retried() {
    let server = spawn_server(vec![
        MockResponse::json(StatusCode::SERVICE_UNAVAILABLE, json!({"message": "busy"})),
        MockResponse::ok(json!({"numberOfRecordsUpdated": 1})),
    ])
    .await;
    let api = server.api();

    let err = api
        .execute("UPDATE pets SET name = 'x'", (), false)
        .await
        .expect_err("request must fail");

    assert!(err.is_service_fault());
    assert!(matches!(err, DataApiError::Http { status: 503, .. }));
    assert_eq!(server.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn malformed_response_is_invalid_response() {
    let server = spawn_server(vec![MockResponse::ok(json!({"records": "nope"}))]).await;
    let api = server.api();

    let err = api
        .execute("SELECT 1", (), false)
        .await
        .expect_err("decode must fail");

    assert!(matches!(err, DataApiError::InvalidResponse(_)));
}

#[tokio::test]
async fn request_timeout_surfaces_transport_error() {
    let server = spawn_server(vec![MockResponse::ok(json!({"numberOfRecordsUpdated": 1}))
        .with_delay(Duration::from_millis(150))])
    .await;

    let service = HttpExecutionService::new(server.base_url.clone())
        .with_options(HttpOptions { timeout_ms: 20 });
    let api = DataApi::new(service, config());

    let err = api
        .execute("DELETE FROM pets", (), false)
        .await
        .expect_err("request must timeout");

    match err {
        DataApiError::Transport(inner) => assert!(inner.is_timeout()),
        _ => panic!("expected transport timeout error"),
    }
}
