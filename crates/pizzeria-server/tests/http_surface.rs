use std::sync::Arc;

use pizzeria_query::{OutBinds, Schemas, SqlValue};
use pizzeria_server::{AppConfig, AppState, build_app};
use pizzeria_storage::testing::{ScriptedProvider, row};
use pizzeria_storage::{ExecuteResult, StorageError};
use serde_json::{Value, json};
use tokio::task::JoinHandle;

const JSONAPI: &str = "application/vnd.api+json";

struct TestServer {
    base: String,
    shutdown: Option<tokio::sync::oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

async fn start_server(provider: &ScriptedProvider) -> TestServer {
    let mut cfg = AppConfig::default();
    cfg.server.public_url = Some("http://pizza.test".into());
    let state = AppState::new(Arc::new(provider.clone()), Schemas::default(), cfg.links_base());
    let app = build_app(state, &cfg);

    // Bind to an ephemeral port
    let listener = tokio::net::TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0))
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();

    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = rx.await;
            })
            .await;
    });

    TestServer {
        base: format!("http://{addr}"),
        shutdown: Some(tx),
        handle: Some(handle),
    }
}

fn pizza_row(id: i64, ingredient: Option<(i64, &str)>) -> pizzeria_query::Row {
    let mut row = row([
        ("PIZZA_id", SqlValue::Integer(id)),
        ("PIZZA_doughId", SqlValue::Integer(3)),
        ("PIZZA_name", SqlValue::from("Margherita")),
        ("PIZZA_bakeTime", SqlValue::from("90")),
        ("PIZZA_ovenTemp", SqlValue::Integer(900)),
        ("PIZZA_specialInstructions", SqlValue::Null),
        ("DOUGH_id", SqlValue::Integer(3)),
        ("DOUGH_name", SqlValue::from("Neapolitan")),
        ("DOUGH_proofTime", SqlValue::from("24")),
    ]);
    let (ingredient_id, name) = match ingredient {
        Some((ingredient_id, name)) => (SqlValue::Integer(ingredient_id), SqlValue::from(name)),
        None => (SqlValue::Null, SqlValue::Null),
    };
    row.insert("INGREDIENT_id".into(), ingredient_id);
    row.insert("INGREDIENT_ingredientType".into(), SqlValue::from("cheese"));
    row.insert("INGREDIENT_name".into(), name);
    row.insert("INGREDIENT_notes".into(), SqlValue::Null);
    row
}

async fn json_body(resp: reqwest::Response) -> Value {
    resp.json().await.expect("json body")
}

#[tokio::test]
async fn health_endpoints_report_status() {
    let provider = ScriptedProvider::new();
    let server = start_server(&provider).await;
    let client = reqwest::Client::new();

    let resp = client.get(server.url("/healthz")).send().await.unwrap();
    assert!(resp.status().is_success());
    assert_eq!(json_body(resp).await["status"], "ok");

    let resp = client.get(server.url("/readyz")).send().await.unwrap();
    assert!(resp.status().is_success());
    assert_eq!(json_body(resp).await["status"], "ready");

    provider.set_unavailable(true);
    let resp = client.get(server.url("/readyz")).send().await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);

    server.stop().await;
}

#[tokio::test]
async fn list_doughs_applies_declared_filters() {
    let provider = ScriptedProvider::new();
    provider.push_rows(vec![row([
        ("id", SqlValue::Integer(1)),
        ("name", SqlValue::from("Neapolitan")),
        ("gramsFlour", SqlValue::from("1000")),
        ("specialInstructions", SqlValue::Null),
    ])]);
    let server = start_server(&provider).await;

    let resp = reqwest::Client::new()
        .get(server.url("/v1/doughs"))
        .query(&[("filter[name]", "Neapolitan"), ("abc", "def")])
        .header("accept", JSONAPI)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    assert_eq!(resp.headers().get("content-type").unwrap(), JSONAPI);
    assert!(resp.headers().contains_key("x-request-id"));
    let body = json_body(resp).await;
    assert_eq!(body["data"][0]["type"], "dough");
    assert_eq!(body["data"][0]["id"], "1");
    assert_eq!(body["data"][0]["attributes"]["gramsFlour"], json!(1000));
    assert_eq!(body["data"][0]["attributes"]["specialInstructions"], json!(""));
    assert_eq!(body["data"][0]["links"]["self"], "http://pizza.test/v1/doughs/1");
    assert_eq!(
        body["links"]["self"],
        "http://pizza.test/v1/doughs?filter[name]=Neapolitan&abc=def"
    );

    let statements = provider.statements();
    assert_eq!(statements.len(), 1);
    assert!(statements[0].sql.ends_with(" FROM DOUGHS WHERE NAME = :name"));
    assert_eq!(statements[0].binds.in_value("name"), Some(&SqlValue::from("Neapolitan")));
    assert_eq!(provider.open_connections(), 0);

    server.stop().await;
}

#[tokio::test]
async fn missing_dough_is_404() {
    let provider = ScriptedProvider::new();
    provider.push_rows(vec![]);
    let server = start_server(&provider).await;

    let resp = reqwest::Client::new()
        .get(server.url("/v1/doughs/7"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
    assert_eq!(resp.headers().get("content-type").unwrap(), JSONAPI);
    let body = json_body(resp).await;
    assert_eq!(body["errors"][0]["status"], "404");
    assert_eq!(body["errors"][0]["detail"], "No dough with ID 7 found");

    server.stop().await;
}

#[tokio::test]
async fn invalid_query_parameters_are_400() {
    let provider = ScriptedProvider::new();
    let server = start_server(&provider).await;
    let client = reqwest::Client::new();

    let resp = client
        .get(server.url("/v1/doughs"))
        .query(&[("filter[waterTemp]", "warm")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
    assert_eq!(
        json_body(resp).await["errors"][0]["detail"],
        "Invalid value 'warm' for filter waterTemp"
    );

    let resp = client
        .get(server.url("/v1/pizzas"))
        .query(&[("include", "crust")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);

    assert!(provider.statements().is_empty());
    server.stop().await;
}

#[tokio::test]
async fn pizza_with_includes_is_compound_document() {
    let provider = ScriptedProvider::new();
    provider.push_rows(vec![
        pizza_row(1, Some((8, "Mozzarella"))),
        pizza_row(1, Some((9, "Basil"))),
    ]);
    let server = start_server(&provider).await;

    let resp = reqwest::Client::new()
        .get(server.url("/v1/pizzas/1"))
        .query(&[("include", "dough,ingredients")])
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["data"]["id"], "1");
    assert_eq!(body["data"]["attributes"]["bakeTime"], json!(90));
    assert_eq!(
        body["data"]["relationships"]["dough"]["data"],
        json!({"type": "dough", "id": "3"})
    );
    assert_eq!(
        body["data"]["relationships"]["ingredients"]["data"],
        json!([{"type": "ingredient", "id": "8"}, {"type": "ingredient", "id": "9"}])
    );
    assert_eq!(
        body["data"]["relationships"]["ingredients"]["links"]["related"],
        "http://pizza.test/v1/pizzas/1/ingredients"
    );
    let included = body["included"].as_array().expect("included");
    assert_eq!(included.len(), 3);
    assert_eq!(included[0]["type"], "dough");
    assert_eq!(included[0]["attributes"]["proofTime"], json!(24));

    let sql = &provider.statements()[0].sql;
    assert!(sql.contains(" LEFT JOIN DOUGHS ON PIZZAS.DOUGH_ID = DOUGHS.ID"));
    assert!(sql.ends_with(" WHERE PIZZAS.ID = :id ORDER BY PIZZAS.ID, INGREDIENTS.ID"));

    server.stop().await;
}

#[tokio::test]
async fn pizza_without_ingredient_rows_has_empty_linkage() {
    let provider = ScriptedProvider::new();
    let mut row = pizza_row(2, None);
    row.retain(|column, _| !column.starts_with("DOUGH_"));
    provider.push_rows(vec![row]);
    let server = start_server(&provider).await;

    let resp = reqwest::Client::new()
        .get(server.url("/v1/pizzas"))
        .query(&[("include", "ingredients")])
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["data"][0]["relationships"]["ingredients"]["data"], json!([]));
    assert!(body.get("included").is_none());
    assert_eq!(body["links"]["self"], "http://pizza.test/v1/pizzas?include=ingredients");

    server.stop().await;
}

#[tokio::test]
async fn create_ingredient_returns_201_with_location() {
    let provider = ScriptedProvider::new();
    let mut out_binds = OutBinds::new();
    out_binds.insert("idOut".into(), vec![SqlValue::from("4")]);
    out_binds.insert("ingredientTypeOut".into(), vec![SqlValue::from("herb")]);
    out_binds.insert("nameOut".into(), vec![SqlValue::from("Basil")]);
    out_binds.insert("notesOut".into(), vec![SqlValue::Null]);
    provider.push_result(ExecuteResult::with_out_binds(out_binds));
    let server = start_server(&provider).await;

    let resp = reqwest::Client::new()
        .post(server.url("/v1/ingredients"))
        .header("content-type", JSONAPI)
        .header("accept", JSONAPI)
        .body(
            json!({"data": {"type": "ingredient", "attributes": {
                "ingredientType": "herb", "name": "Basil"
            }}})
            .to_string(),
        )
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), reqwest::StatusCode::CREATED);
    assert_eq!(
        resp.headers().get("location").unwrap(),
        "http://pizza.test/v1/ingredients/4"
    );
    let body = json_body(resp).await;
    assert_eq!(body["data"]["id"], "4");
    assert_eq!(body["data"]["attributes"]["notes"], json!(""));
    assert!(provider.statements()[0].sql.starts_with("INSERT INTO INGREDIENTS ("));

    server.stop().await;
}

#[tokio::test]
async fn write_requests_are_validated_before_storage() {
    let provider = ScriptedProvider::new();
    let server = start_server(&provider).await;
    let client = reqwest::Client::new();

    // Wrong content type
    let resp = client
        .post(server.url("/v1/doughs"))
        .header("content-type", "text/plain")
        .body("{}")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::UNSUPPORTED_MEDIA_TYPE);

    // Not JSON
    let resp = client
        .post(server.url("/v1/doughs"))
        .header("content-type", JSONAPI)
        .body("{\"data\":")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);

    // Unknown attribute
    let resp = client
        .post(server.url("/v1/ingredients"))
        .header("content-type", JSONAPI)
        .body(json!({"data": {"type": "ingredient", "attributes": {"foo": "bar"}}}).to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);

    // Body id differs from the URL id
    let resp = client
        .patch(server.url("/v1/doughs/5"))
        .header("content-type", JSONAPI)
        .body(json!({"data": {"type": "dough", "id": "6", "attributes": {"name": "Roman"}}}).to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::CONFLICT);

    // Body type differs from the endpoint
    let resp = client
        .patch(server.url("/v1/doughs/5"))
        .header("content-type", JSONAPI)
        .body(json!({"data": {"type": "pizza", "id": "5", "attributes": {}}}).to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::CONFLICT);

    assert!(provider.statements().is_empty());
    server.stop().await;
}

#[tokio::test]
async fn pizza_with_missing_ingredient_is_rolled_back() {
    let provider = ScriptedProvider::new();
    provider.push_rows(vec![row([("count", 1)])]);
    let server = start_server(&provider).await;

    let resp = reqwest::Client::new()
        .post(server.url("/v1/pizzas"))
        .header("content-type", JSONAPI)
        .body(
            json!({"data": {
                "type": "pizza",
                "attributes": {"name": "Marinara", "bakeTime": 90, "ovenTemp": 900},
                "relationships": {"ingredients": {"data": [
                    {"type": "ingredient", "id": "8"},
                    {"type": "ingredient", "id": "99"}
                ]}}
            }})
            .to_string(),
        )
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
    assert_eq!(
        json_body(resp).await["errors"][0]["detail"],
        "Request includes invalid ingredients ids"
    );
    let statements = provider.statements();
    assert_eq!(statements.len(), 1);
    assert!(statements[0].sql.starts_with("SELECT COUNT(*)"));
    assert_eq!(provider.commits(), 0);
    assert_eq!(provider.rollbacks(), 1);
    assert_eq!(provider.open_connections(), 0);

    server.stop().await;
}

#[tokio::test]
async fn empty_pizza_patch_reads_only() {
    let provider = ScriptedProvider::new();
    provider.push_rows(vec![row([
        ("PIZZA_id", SqlValue::Integer(4)),
        ("PIZZA_doughId", SqlValue::Null),
        ("PIZZA_name", SqlValue::from("Bianca")),
    ])]);
    let server = start_server(&provider).await;

    let resp = reqwest::Client::new()
        .patch(server.url("/v1/pizzas/4"))
        .header("content-type", JSONAPI)
        .body(json!({"data": {"type": "pizza", "id": "4", "attributes": {}}}).to_string())
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["data"]["attributes"]["name"], "Bianca");
    assert_eq!(body["data"]["relationships"]["dough"]["data"], Value::Null);

    let statements = provider.statements();
    assert_eq!(statements.len(), 1);
    assert!(statements[0].sql.starts_with("SELECT "));

    server.stop().await;
}

#[tokio::test]
async fn storage_failures_are_500_without_details() {
    let provider = ScriptedProvider::new();
    provider.push_error(StorageError::database("relation \"INGREDIENTS\" does not exist"));
    let server = start_server(&provider).await;

    let resp = reqwest::Client::new()
        .get(server.url("/v1/ingredients"))
        .header("x-request-id", "req-42")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(resp.headers().get("x-request-id").unwrap(), "req-42");
    assert_eq!(
        json_body(resp).await["errors"][0]["detail"],
        "An unexpected error occurred"
    );

    server.stop().await;
}
