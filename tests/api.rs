use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use http_body_util::BodyExt;
use mockario::{build_router, AppState, MemoryStore, ServerConfig};
use serde_json::{json, Value};
use tower::ServiceExt;

struct TestApp {
    router: Router,
    state: Arc<AppState>,
    store: Arc<MemoryStore>,
}

impl TestApp {
    fn new() -> Self {
        let store = Arc::new(MemoryStore::default());
        let state = Arc::new(AppState::open(store.clone(), None).unwrap());
        let router = build_router(state.clone(), &ServerConfig::default());
        Self {
            router,
            state,
            store,
        }
    }

    async fn request(
        &self,
        method: &str,
        uri: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let body = body.map_or_else(Body::empty, |b| Body::from(b.to_string()));
        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn send(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.request(method, uri, body, &[]).await
    }
}

#[tokio::test]
async fn created_endpoint_is_served_by_dispatch() {
    let app = TestApp::new();

    let (status, created) = app
        .send(
            "POST",
            "/api/endpoints",
            Some(json!({"path": "hello", "method": "GET", "response": {"msg": "hi"}})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["path"], "/hello");

    let (status, body) = app.send("GET", "/hello", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"msg": "hi"}));

    let (status, body) = app
        .send(
            "POST",
            "/api/endpoints",
            Some(json!({"path": "/hello", "method": "GET", "response": {}})),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("already exists"));
}

#[tokio::test]
async fn create_validates_required_fields() {
    let app = TestApp::new();

    let (status, body) = app
        .send("POST", "/api/endpoints", Some(json!({"path": "/x"})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Path, method and response are required");

    let (status, _) = app
        .send(
            "POST",
            "/api/endpoints",
            Some(json!({"path": "/x", "method": "GET", "response": 1, "delay": -5})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_management_body_is_a_bad_request() {
    let app = TestApp::new();
    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/endpoints")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{oops"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unmatched_post_creates_then_appends_then_lists() {
    let app = TestApp::new();

    let (status, body) = app.send("POST", "/foo/bar", Some(json!({"a": 1}))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["endpoint"]["method"], "GET");
    assert_eq!(body["endpoint"]["path"], "/foo/bar");

    let (status, body) = app.send("POST", "/foo/bar", Some(json!({"a": 2}))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body, json!({"a": 2}));

    let (status, body) = app.send("GET", "/foo/bar", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([{"a": 1}, {"a": 2}]));

    let stored = app.state.read(|db| {
        db.endpoints
            .find_by_path("/foo/bar", mockario::models::HttpMethod::Get)
            .unwrap()
            .stored_data
            .clone()
    });
    assert_eq!(stored, Some(vec![json!({"a": 1}), json!({"a": 2})]));
    assert_eq!(
        app.store
            .snapshot()
            .endpoints
            .iter()
            .filter(|e| e.path == "/foo/bar")
            .count(),
        1
    );
}

#[tokio::test]
async fn unmatched_put_also_auto_creates() {
    let app = TestApp::new();
    let (status, _) = app.send("PUT", "/things", Some(json!({"t": true}))).await;
    assert_eq!(status, StatusCode::CREATED);
    let (_, body) = app.send("GET", "/things", None).await;
    assert_eq!(body, json!([{"t": true}]));
}

#[tokio::test]
async fn unknown_get_and_unsupported_methods_are_not_found() {
    let app = TestApp::new();

    let (status, body) = app.send("GET", "/nothing/here", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"error": "Endpoint not found"}));

    let (status, _) = app.send("PATCH", "/api/users", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delay_is_applied_before_responding() {
    let app = TestApp::new();
    app.send(
        "POST",
        "/api/endpoints",
        Some(json!({"path": "/slow", "method": "GET", "response": {}, "delay": 120})),
    )
    .await;

    let started = Instant::now();
    let (status, _) = app.send("GET", "/slow", None).await;

    assert_eq!(status, StatusCode::OK);
    assert!(started.elapsed() >= Duration::from_millis(120));
}

#[tokio::test]
async fn dispatched_requests_are_logged_management_requests_are_not() {
    let app = TestApp::new();
    app.send("GET", "/api/users", None).await;
    app.send("GET", "/missing", None).await;
    app.send("GET", "/api/endpoints", None).await;

    let (status, logs) = app.send("GET", "/api/logs", None).await;
    assert_eq!(status, StatusCode::OK);
    let logs = logs.as_array().unwrap();
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0]["path"], "/api/users");
    assert_eq!(logs[0]["status"], 200);
    assert!(!logs[0]["endpointId"].as_str().unwrap().is_empty());
    assert_eq!(logs[1]["status"], 404);
    assert_eq!(logs[1]["endpointId"], "");

    let (status, _) = app.send("DELETE", "/api/logs", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(app.state.logs.is_empty());
}

#[tokio::test]
async fn template_endpoints_render_fake_data() {
    let app = TestApp::new();
    app.send(
        "POST",
        "/api/endpoints",
        Some(json!({
            "path": "/people",
            "method": "GET",
            "responseType": "template",
            "response": {"id": "{{faker.uuid}}", "age": "{{faker.number}}", "bad": "{{faker.nope}}"}
        })),
    )
    .await;

    let (status, body) = app.send("GET", "/people", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"].as_str().unwrap().len(), 36);
    assert!(body["age"].is_number());
    assert_eq!(body["bad"], "{{faker.nope}}");
}

#[tokio::test]
async fn static_responses_pass_through_the_renderer() {
    let app = TestApp::new();
    app.send(
        "POST",
        "/api/endpoints",
        Some(json!({"path": "/me", "method": "GET", "response": {"email": "{{faker.email}}", "n": 1}})),
    )
    .await;

    let (_, body) = app.send("GET", "/me", None).await;

    assert!(body["email"].as_str().unwrap().contains('@'));
    assert_eq!(body["n"], 1);
}

#[tokio::test]
async fn post_endpoints_validate_and_store_payloads() {
    let app = TestApp::new();
    app.send(
        "POST",
        "/api/endpoints",
        Some(json!({
            "path": "/signup",
            "method": "POST",
            "response": {"ok": true},
            "payloadSchema": {"required": ["email"]}
        })),
    )
    .await;

    let (status, body) = app.send("POST", "/signup", Some(json!({"name": "x"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid payload");
    assert_eq!(body["missing"], json!(["email"]));

    let (status, body) = app
        .send("POST", "/signup", Some(json!({"email": "a@b.c"})))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"], json!({"email": "a@b.c"}));
}

#[tokio::test]
async fn stored_data_on_object_response_returns_latest_item() {
    let app = TestApp::new();
    let (_, created) = app
        .send(
            "POST",
            "/api/endpoints",
            Some(json!({"path": "/latest", "method": "GET", "response": {"empty": true}})),
        )
        .await;
    let id = created["id"].as_str().unwrap().to_string();
    app.state
        .write(|db| {
            db.endpoints.append_stored(&id, json!({"v": 1}))?;
            db.endpoints.append_stored(&id, json!({"v": 2})).map(|_| ())
        })
        .unwrap();

    let (_, body) = app.send("GET", "/latest", None).await;
    assert_eq!(body, json!({"v": 2}));

    let (status, _) = app
        .send("DELETE", &format!("/api/endpoints/{id}/data"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = app.send("GET", "/latest", None).await;
    assert_eq!(body, json!({"empty": true}));
}

#[tokio::test]
async fn endpoint_crud_roundtrip() {
    let app = TestApp::new();
    let (_, created) = app
        .send(
            "POST",
            "/api/endpoints",
            Some(json!({"path": "/crud", "method": "GET", "response": {"v": 1}, "delay": 7})),
        )
        .await;
    let uri = format!("/api/endpoints/{}", created["id"].as_str().unwrap());

    let (status, updated) = app
        .send("PUT", &uri, Some(json!({"response": {"v": 2}})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["response"], json!({"v": 2}));
    assert_eq!(updated["delay"], 7);

    let (_, fetched) = app.send("GET", &uri, None).await;
    assert_eq!(fetched, updated);

    let (status, _) = app.send("DELETE", &uri, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.send("GET", &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app.send("PUT", &uri, Some(json!({}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn reset_restores_defaults() {
    let app = TestApp::new();
    app.send(
        "POST",
        "/api/endpoints",
        Some(json!({"path": "/extra", "method": "GET", "response": 1})),
    )
    .await;

    for _ in 0..2 {
        let (status, _) = app.send("DELETE", "/api/endpoints", None).await;
        assert_eq!(status, StatusCode::OK);
        let (_, list) = app.send("GET", "/api/endpoints", None).await;
        let routes: Vec<_> = list
            .as_array()
            .unwrap()
            .iter()
            .map(|e| format!("{} {}", e["method"].as_str().unwrap(), e["path"].as_str().unwrap()))
            .collect();
        assert_eq!(
            routes,
            ["GET /api/users", "POST /api/users", "GET /api/products"]
        );
    }
}

async fn schema_with_users_table(app: &TestApp) -> (String, String) {
    let (status, schema) = app
        .send("POST", "/api/schemas", Some(json!({"name": "shop"})))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let schema_id = schema["id"].as_str().unwrap().to_string();

    let (status, table) = app
        .send(
            "POST",
            &format!("/api/schemas/{schema_id}/tables"),
            Some(json!({"name": "users"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let table_id = table["id"].as_str().unwrap().to_string();

    let (status, _) = app
        .send(
            "POST",
            &format!("/api/schemas/{schema_id}/tables/{table_id}/fields"),
            Some(json!({"name": "email", "type": "email", "required": true})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    (schema_id, table_id)
}

#[tokio::test]
async fn schema_generation_through_the_api() {
    let app = TestApp::new();
    let (schema_id, table_id) = schema_with_users_table(&app).await;

    let (status, rows) = app
        .send(
            "POST",
            &format!("/api/schemas/{schema_id}/generate"),
            Some(json!({"tableId": table_id, "count": 3})),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 3);
    assert!(rows
        .iter()
        .all(|r| !r["email"].as_str().unwrap().is_empty()));

    let (status, _) = app
        .send(
            "POST",
            &format!("/api/schemas/{schema_id}/generate"),
            Some(json!({"tableId": table_id, "count": 5000})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn schema_backed_endpoint_generates_rows() {
    let app = TestApp::new();
    let (schema_id, table_id) = schema_with_users_table(&app).await;
    app.send(
        "POST",
        "/api/endpoints",
        Some(json!({
            "path": "/generated",
            "method": "GET",
            "response": [],
            "schemaRef": {"schemaId": schema_id, "tableId": table_id, "count": 4}
        })),
    )
    .await;

    let (_, body) = app.send("GET", "/generated", None).await;

    assert_eq!(body.as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn deleting_a_table_via_api_cascades_relations() {
    let app = TestApp::new();
    let (schema_id, users) = schema_with_users_table(&app).await;
    let (_, orders) = app
        .send(
            "POST",
            &format!("/api/schemas/{schema_id}/tables"),
            Some(json!({"name": "orders"})),
        )
        .await;
    let orders = orders["id"].as_str().unwrap().to_string();
    let (status, _) = app
        .send(
            "POST",
            &format!("/api/schemas/{schema_id}/relations"),
            Some(json!({"fromTable": users, "toTable": orders, "type": "one-to-many"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = app
        .send(
            "DELETE",
            &format!("/api/schemas/{schema_id}/tables/{orders}"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, schema) = app
        .send("GET", &format!("/api/schemas/{schema_id}"), None)
        .await;
    assert_eq!(schema["tables"].as_array().unwrap().len(), 1);
    assert!(schema["relations"].as_array().unwrap().is_empty());
    assert_eq!(app.store.snapshot().schemas[0].relations.len(), 0);
}

#[tokio::test]
async fn table_position_updates() {
    let app = TestApp::new();
    let (schema_id, table_id) = schema_with_users_table(&app).await;

    let (status, _) = app
        .send(
            "PUT",
            &format!("/api/schemas/{schema_id}/tables/{table_id}/position"),
            Some(json!({"x": 10.0, "y": 20.0})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, schema) = app
        .send("GET", &format!("/api/schemas/{schema_id}"), None)
        .await;
    assert_eq!(schema["tables"][0]["position"], json!({"x": 10.0, "y": 20.0}));
}

fn basic(username: &str, password: &str) -> String {
    format!("Basic {}", BASE64.encode(format!("{username}:{password}")))
}

#[tokio::test]
async fn basic_auth_protects_required_endpoints() {
    let app = TestApp::new();
    let (status, settings) = app
        .send(
            "PUT",
            "/api/auth/settings",
            Some(json!({"enabled": true, "type": "basic"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(settings["enabled"], true);

    let (status, user) = app
        .send(
            "POST",
            "/api/auth/users",
            Some(json!({"username": "ana", "password": "secret"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(user.get("password").is_none());

    let (status, _) = app.send("GET", "/auth/me", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let auth = basic("ana", "secret");
    let (status, me) = app
        .request("GET", "/auth/me", None, &[("authorization", auth.as_str())])
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["user"]["username"], "ana");

    let wrong = basic("ana", "nope");
    let (status, _) = app
        .request("GET", "/auth/me", None, &[("authorization", wrong.as_str())])
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let stored = &app.store.snapshot().users[0].password;
    assert!(stored.starts_with("sha256$"));
}

#[tokio::test]
async fn bearer_login_flow() {
    let app = TestApp::new();
    app.send(
        "PUT",
        "/api/auth/settings",
        Some(json!({"enabled": true, "type": "bearer", "allowRegister": true})),
    )
    .await;

    let (status, registered) = app
        .send(
            "POST",
            "/auth/register",
            Some(json!({"username": "bo", "password": "pw"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(registered["user"]["username"], "bo");

    let (status, _) = app
        .send(
            "POST",
            "/auth/login",
            Some(json!({"username": "bo", "password": "bad"})),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, login) = app
        .send(
            "POST",
            "/auth/login",
            Some(json!({"username": "bo", "password": "pw"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let bearer = format!("Bearer {}", login["token"].as_str().unwrap());

    let (status, me) = app
        .request("GET", "/auth/me", None, &[("authorization", bearer.as_str())])
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["user"]["username"], "bo");
}

#[tokio::test]
async fn disabling_auth_removes_routes_and_users() {
    let app = TestApp::new();
    let (_, before) = app.send("GET", "/api/endpoints", None).await;
    app.send("PUT", "/api/auth/settings", Some(json!({"enabled": true})))
        .await;
    app.send(
        "POST",
        "/api/auth/users",
        Some(json!({"username": "ana", "password": "secret"})),
    )
    .await;

    let (_, during) = app.send("GET", "/api/endpoints", None).await;
    assert_eq!(
        during.as_array().unwrap().len(),
        before.as_array().unwrap().len() + 3
    );

    app.send("PUT", "/api/auth/settings", Some(json!({"enabled": false})))
        .await;
    let (_, after) = app.send("GET", "/api/endpoints", None).await;
    let (_, users) = app.send("GET", "/api/auth/users", None).await;
    assert_eq!(after, before);
    assert_eq!(users, json!([]));
    let (status, _) = app.send("GET", "/auth/me", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn faker_catalog_and_health() {
    let app = TestApp::new();
    let (status, keys) = app.send("GET", "/api/faker", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(keys.as_array().unwrap().contains(&json!("email")));

    let (status, health) = app.send("GET", "/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "ok");
}

async fn protected_endpoint(app: &TestApp, path: &str, delay: u64) {
    let (status, _) = app
        .send(
            "POST",
            "/api/endpoints",
            Some(json!({
                "path": path,
                "method": "GET",
                "response": {"secret": true},
                "authRequired": true,
                "delay": delay
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn auth_required_is_ignored_while_auth_is_disabled() {
    let app = TestApp::new();
    protected_endpoint(&app, "/secret", 0).await;

    let (status, body) = app.send("GET", "/secret", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"secret": true}));
}

#[tokio::test]
async fn api_key_auth_guards_required_endpoints() {
    let app = TestApp::new();
    protected_endpoint(&app, "/secret", 0).await;
    let (status, _) = app
        .send(
            "PUT",
            "/api/auth/settings",
            Some(json!({"enabled": true, "type": "apiKey", "apiKey": "k1"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.send("GET", "/secret", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Unauthorized");

    let (status, _) = app
        .request("GET", "/secret", None, &[("x-api-key", "wrong")])
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app
        .request("GET", "/secret", None, &[("x-api-key", "k1")])
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"secret": true}));
}

#[tokio::test]
async fn unauthorized_requests_skip_the_delay() {
    let app = TestApp::new();
    protected_endpoint(&app, "/slow-secret", 400).await;
    app.send(
        "PUT",
        "/api/auth/settings",
        Some(json!({"enabled": true, "type": "bearer"})),
    )
    .await;

    let started = Instant::now();
    let (status, _) = app.send("GET", "/slow-secret", None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(started.elapsed() < Duration::from_millis(400));
}

#[tokio::test]
async fn register_is_refused_unless_allowed() {
    let app = TestApp::new();
    app.send("PUT", "/api/auth/settings", Some(json!({"enabled": true})))
        .await;

    let (status, body) = app
        .send(
            "POST",
            "/auth/register",
            Some(json!({"username": "eve", "password": "pw"})),
        )
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Registration disabled");
    let (_, users) = app.send("GET", "/api/auth/users", None).await;
    assert_eq!(users, json!([]));
}

#[tokio::test]
async fn oversized_schema_ref_count_is_rejected() {
    let app = TestApp::new();
    let (schema_id, table_id) = schema_with_users_table(&app).await;

    let (status, _) = app
        .send(
            "POST",
            "/api/endpoints",
            Some(json!({
                "path": "/huge",
                "method": "GET",
                "response": [],
                "schemaRef": {"schemaId": schema_id, "tableId": table_id, "count": 100000000}
            })),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = app.send("GET", "/huge", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
