//! End-to-end route tests against a flat-file store and an in-memory provider.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

use opensase_storefront::auth::SessionSigner;
use opensase_storefront::broker::EventBroker;
use opensase_storefront::config::AppConfig;
use opensase_storefront::domain::aggregates::Product;
use opensase_storefront::domain::value_objects::Price;
use opensase_storefront::http::{router, AppState};
use opensase_storefront::payments::{CheckoutSession, GatewayError, NewCheckoutSession, PaymentGateway, ITEMS_METADATA_KEY};
use opensase_storefront::services::SettingsService;
use opensase_storefront::settings::EnvOverrides;
use opensase_storefront::store::{FileStore, Store};

#[derive(Default)]
struct StubGateway {
    sessions: Mutex<HashMap<String, CheckoutSession>>,
}

#[async_trait]
impl PaymentGateway for StubGateway {
    fn name(&self) -> &'static str { "stub" }

    async fn create_checkout_session(&self, _key: &str, req: &NewCheckoutSession) -> Result<CheckoutSession, GatewayError> {
        let id = "cs_test_created".to_string();
        let session = CheckoutSession {
            id: id.clone(),
            url: Some(format!("https://pay.test/{id}")),
            payment_status: "unpaid".into(),
            amount_total: Some(req.lines.iter().map(|l| l.unit_amount * i64::from(l.quantity)).sum()),
            metadata: req.metadata.clone(),
        };
        self.sessions.lock().unwrap().insert(id, session.clone());
        Ok(session)
    }

    async fn retrieve_checkout_session(&self, _key: &str, id: &str) -> Result<CheckoutSession, GatewayError> {
        self.sessions.lock().unwrap().get(id).cloned()
            .ok_or_else(|| GatewayError::Rejected { status: 404, message: format!("No such checkout.session: '{id}'") })
    }
}

struct TestApp {
    _dir: tempfile::TempDir,
    store: Arc<dyn Store>,
    gateway: Arc<StubGateway>,
    app: Router,
}

impl TestApp {
    async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn Store> = Arc::new(FileStore::open(dir.path().join("data")).await.unwrap());
        for (id, price, stock, active) in [("p1", dec!(12), 5, true), ("p2", dec!(3.5), 2, true), ("p3", dec!(1), 9, false)] {
            let mut product = Product::create(id.to_uppercase(), Price::new(price).unwrap(), stock);
            product.id = id.to_string();
            product.is_active = active;
            store.insert_product(&product).await.unwrap();
        }
        let env = EnvOverrides {
            test_pk: Some("pk_test_storefront".into()),
            test_sk: Some("sk_test_storefront".into()),
            admin_password: Some("hunter2".into()),
            ..EnvOverrides::default()
        };
        let settings = SettingsService::with_env(store.clone(), move || env.clone());
        let gateway = Arc::new(StubGateway::default());
        let config = AppConfig { upload_dir: dir.path().join("uploads"), ..AppConfig::default() };
        let state = AppState::new(store.clone(), settings, gateway.clone(), EventBroker::disabled(), SessionSigner::new(b"test-secret".to_vec()), &config);
        Self { _dir: dir, store, gateway, app: router(state) }
    }

    async fn call(&self, method: Method, uri: &str, body: Option<Value>, cookie: Option<&str>) -> (StatusCode, HeaderMap, Value) {
        let mut req = Request::builder().method(method).uri(uri).header(header::ORIGIN, "https://shop.test");
        if let Some(cookie) = cookie {
            req = req.header(header::COOKIE, cookie);
        }
        let req = match body {
            Some(body) => req.header(header::CONTENT_TYPE, "application/json").body(Body::from(body.to_string())).unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };
        let resp = self.app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap_or(Value::Null) };
        (status, headers, value)
    }

    async fn login(&self) -> String {
        let (status, headers, _) = self.call(Method::POST, "/api/admin/login", Some(json!({"password": "hunter2"})), None).await;
        assert_eq!(status, StatusCode::OK);
        let set_cookie = headers.get(header::SET_COOKIE).unwrap().to_str().unwrap();
        set_cookie.split(';').next().unwrap().to_string()
    }

    async fn stock(&self, id: &str) -> i32 {
        self.store.get_product(id).await.unwrap().unwrap().stock
    }

    fn paid_session(&self, id: &str, items: &str, amount: i64) {
        let metadata = BTreeMap::from([(ITEMS_METADATA_KEY.to_string(), items.to_string())]);
        self.gateway.sessions.lock().unwrap().insert(id.to_string(), CheckoutSession {
            id: id.to_string(), url: None, payment_status: "paid".into(), amount_total: Some(amount), metadata,
        });
    }
}

#[tokio::test]
async fn health_reports_service() {
    let t = TestApp::new().await;
    let (status, _, body) = t.call(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn public_listing_shows_active_products_cheapest_first() {
    let t = TestApp::new().await;
    let (status, _, body) = t.call(Method::GET, "/api/products", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = body.as_array().unwrap().iter().map(|p| p["id"].as_str().unwrap()).collect();
    assert_eq!(ids, vec!["p2", "p1"]);
    assert_eq!(body[0]["isActive"], true);
}

#[tokio::test]
async fn cash_order_with_short_stock_is_rejected_without_changes() {
    let t = TestApp::new().await;
    let items = json!([{"id": "p1", "name": "P1", "price": 12, "quantity": 2}, {"id": "p2", "name": "P2", "price": 3.5, "quantity": 5}]);
    let (status, _, body) = t.call(Method::POST, "/api/cash", Some(json!({"items": items})), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Insufficient stock for p2");
    assert_eq!(t.stock("p1").await, 5);
    assert_eq!(t.stock("p2").await, 2);
    assert!(t.store.list_orders().await.unwrap().is_empty());
}

#[tokio::test]
async fn cash_order_then_admin_marks_it_paid() {
    let t = TestApp::new().await;
    let items = json!([{"id": "p1", "name": "P1", "price": 12, "quantity": 2}]);
    let (status, _, body) = t.call(Method::POST, "/api/cash", Some(json!({"items": items, "total": 24})), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let order_id = body["orderId"].as_str().unwrap().to_string();
    assert!(order_id.starts_with("cash-"));
    assert_eq!(t.stock("p1").await, 3);

    let cookie = t.login().await;
    let uri = format!("/api/admin/orders/{order_id}");
    let (status, _, body) = t.call(Method::PUT, &uri, Some(json!({"status": "paid"})), Some(&cookie)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "paid");

    let (status, _, _) = t.call(Method::PUT, &uri, Some(json!({"status": "pending_payment"})), Some(&cookie)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _, body) = t.call(Method::GET, "/api/admin/orders", None, Some(&cookie)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["orders"][0]["id"], order_id.as_str());
    assert_eq!(body["products"]["p1"]["name"], "P1");
}

#[tokio::test]
async fn card_confirmation_settles_once() {
    let t = TestApp::new().await;
    t.paid_session("cs_test_abc", r#"{"p2": 2}"#, 700);

    let (status, _, body) = t.call(Method::POST, "/api/orders/confirm", Some(json!({"sessionId": "cs_test_abc"})), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["orderId"], "cs_test_abc");
    assert_eq!(body["alreadyProcessed"], false);
    assert_eq!(t.stock("p2").await, 0);

    let (status, _, body) = t.call(Method::POST, "/api/orders/confirm", Some(json!({"sessionId": "cs_test_abc"})), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["alreadyProcessed"], true);
    assert_eq!(t.stock("p2").await, 0);
    assert_eq!(t.store.list_orders().await.unwrap().len(), 1);
}

#[tokio::test]
async fn unpaid_session_is_rejected() {
    let t = TestApp::new().await;
    let (status, _, body) = t.call(Method::POST, "/api/checkout_sessions", Some(json!({"items": [{"id": "p1", "name": "P1", "price": 12, "quantity": 1}]})), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sessionId"], "cs_test_created");
    assert_eq!(body["url"], "https://pay.test/cs_test_created");

    let (status, _, body) = t.call(Method::POST, "/api/orders/confirm", Some(json!({"sessionId": "cs_test_created"})), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Payment not completed");
    assert_eq!(t.stock("p1").await, 5);
}

#[tokio::test]
async fn unknown_session_is_a_provider_error() {
    let t = TestApp::new().await;
    let (status, _, body) = t.call(Method::POST, "/api/orders/confirm", Some(json!({"sessionId": "cs_missing"})), None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"].as_str().unwrap().contains("No such checkout.session"));
}

#[tokio::test]
async fn out_of_range_price_is_a_bad_request() {
    let t = TestApp::new().await;
    let items = json!([{"id": "p1", "name": "P1", "price": 1e27, "quantity": 1}]);
    let (status, _, body) = t.call(Method::POST, "/api/checkout_sessions", Some(json!({"items": items})), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("out of range"));
    assert!(t.gateway.sessions.lock().unwrap().is_empty());
}

#[tokio::test]
async fn empty_checkout_is_a_validation_error() {
    let t = TestApp::new().await;
    let (status, _, body) = t.call(Method::POST, "/api/checkout_sessions", Some(json!({"items": []})), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No items in cart");
}

#[tokio::test]
async fn admin_routes_require_a_session() {
    let t = TestApp::new().await;
    let (status, _, _) = t.call(Method::GET, "/api/admin/products", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _, _) = t.call(Method::GET, "/api/admin/settings", None, Some("admin_session=true")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _, _) = t.call(Method::POST, "/api/admin/login", Some(json!({"password": "admin"})), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let cookie = t.login().await;
    let (status, _, body) = t.call(Method::GET, "/api/admin/products", None, Some(&cookie)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn settings_are_masked_and_environment_wins() {
    let t = TestApp::new().await;
    let cookie = t.login().await;

    let update = json!({"mode": "test", "testSk": "sk_test_from_admin", "newPassword": "stored-password", "contactHandle": "@shop"});
    let (status, _, body) = t.call(Method::POST, "/api/admin/settings", Some(update), Some(&cookie)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (status, _, body) = t.call(Method::GET, "/api/admin/settings", None, Some(&cookie)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["testSk"], "***");
    assert_eq!(body["prodSk"], "");
    assert_eq!(body["testPk"], "pk_test_storefront");
    assert_eq!(body["contactHandle"], "@shop");

    // ADMIN_PASSWORD in the environment still decides login
    let (status, _, _) = t.call(Method::POST, "/api/admin/login", Some(json!({"password": "stored-password"})), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn public_payment_config() {
    let t = TestApp::new().await;
    let (status, _, body) = t.call(Method::GET, "/api/config/payments", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["publishableKey"], "pk_test_storefront");
    assert_eq!(body["isTestMode"], true);
}

#[tokio::test]
async fn admin_product_lifecycle() {
    let t = TestApp::new().await;
    let cookie = t.login().await;

    let (status, _, created) = t.call(Method::POST, "/api/admin/products", Some(json!({"name": "Honey", "price": 7.25, "stock": 4})), Some(&cookie)).await;
    assert_eq!(status, StatusCode::CREATED);
    let uri = format!("/api/admin/products/{}", created["id"].as_str().unwrap());

    let (status, _, patched) = t.call(Method::PATCH, &uri, Some(json!({"isActive": false})), Some(&cookie)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(patched["isActive"], false);
    assert_eq!(patched["stock"], 4);

    let (status, _, _) = t.call(Method::DELETE, &uri, None, Some(&cookie)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _, _) = t.call(Method::DELETE, &uri, None, Some(&cookie)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_json_is_a_bad_request() {
    let t = TestApp::new().await;
    let req = Request::builder().method(Method::POST).uri("/api/cash")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json")).unwrap();
    let resp = t.app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}
