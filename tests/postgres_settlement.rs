//! Settlement races against PostgreSQL. Skipped when `DATABASE_URL` is unset.

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use opensase_storefront::broker::EventBroker;
use opensase_storefront::domain::aggregates::{CartItem, Product};
use opensase_storefront::domain::value_objects::{Price, Quantity};
use opensase_storefront::payments::{CheckoutSession, GatewayError, NewCheckoutSession, PaymentGateway, ITEMS_METADATA_KEY};
use opensase_storefront::services::{CardSettlement, SettingsService, SettlementService};
use opensase_storefront::settings::EnvOverrides;
use opensase_storefront::store::{PgStore, Store};
use opensase_storefront::ShopError;

#[derive(Default)]
struct PaidSessions {
    sessions: Mutex<HashMap<String, CheckoutSession>>,
}

#[async_trait]
impl PaymentGateway for PaidSessions {
    fn name(&self) -> &'static str { "paid-sessions" }

    async fn create_checkout_session(&self, _key: &str, _req: &NewCheckoutSession) -> Result<CheckoutSession, GatewayError> {
        Err(GatewayError::Http("not used".into()))
    }

    async fn retrieve_checkout_session(&self, _key: &str, id: &str) -> Result<CheckoutSession, GatewayError> {
        self.sessions.lock().unwrap().get(id).cloned()
            .ok_or_else(|| GatewayError::Rejected { status: 404, message: format!("No such checkout.session: '{id}'") })
    }
}

struct Fixture {
    store: Arc<dyn Store>,
    gateway: Arc<PaidSessions>,
    service: SettlementService,
}

async fn fixture() -> Option<Fixture> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let pg = PgStore::connect(&url, 10).await.unwrap();
    pg.migrate().await.unwrap();
    let store: Arc<dyn Store> = Arc::new(pg);
    let gateway = Arc::new(PaidSessions::default());
    let settings = SettingsService::with_env(store.clone(), || EnvOverrides {
        test_sk: Some("sk_test_pg".into()), ..EnvOverrides::default()
    });
    let service = SettlementService::new(store.clone(), settings, gateway.clone(), EventBroker::disabled());
    Some(Fixture { store, gateway, service })
}

/// Inserts a product under a fresh id so runs against a shared database never collide.
async fn add_product(f: &Fixture, price: Decimal, stock: i32) -> String {
    let p = Product::create("Pg race", Price::new(price).unwrap(), stock);
    f.store.insert_product(&p).await.unwrap();
    p.id
}

fn cart_item(id: &str, qty: u32) -> CartItem {
    CartItem { id: id.into(), name: id.into(), price: Price::new(dec!(1)).unwrap(), quantity: Quantity::new(qty).unwrap(), image: None }
}

async fn stock(f: &Fixture, id: &str) -> i32 {
    f.store.get_product(id).await.unwrap().unwrap().stock
}

async fn orders_for(f: &Fixture, product_id: &str) -> usize {
    f.store.list_orders().await.unwrap().iter()
        .filter(|o| o.items.to_map().contains_key(product_id))
        .count()
}

#[tokio::test]
async fn concurrent_cash_orders_never_oversell() {
    let Some(f) = fixture().await else { return };
    let id = add_product(&f, dec!(1), 1).await;
    let (ra, rb) = tokio::join!(
        tokio::spawn({ let svc = f.service.clone(); let id = id.clone(); async move { svc.settle_cash(vec![cart_item(&id, 1)], None).await } }),
        tokio::spawn({ let svc = f.service.clone(); let id = id.clone(); async move { svc.settle_cash(vec![cart_item(&id, 1)], None).await } }),
    );
    let results = [ra.unwrap(), rb.unwrap()];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results.iter().any(|r| matches!(r, Err(ShopError::InsufficientStock { .. }))));
    assert_eq!(stock(&f, &id).await, 0);
    assert_eq!(orders_for(&f, &id).await, 1);
}

#[tokio::test]
async fn many_concurrent_cash_orders_respect_stock() {
    let Some(f) = fixture().await else { return };
    let id = add_product(&f, dec!(1), 7).await;
    let mut handles = Vec::new();
    for _ in 0..20 {
        let svc = f.service.clone();
        let id = id.clone();
        handles.push(tokio::spawn(async move { svc.settle_cash(vec![cart_item(&id, 1)], None).await.is_ok() }));
    }
    let mut accepted = 0;
    for h in handles { if h.await.unwrap() { accepted += 1; } }
    assert_eq!(accepted, 7);
    assert_eq!(stock(&f, &id).await, 0);
    assert_eq!(orders_for(&f, &id).await, 7);
}

#[tokio::test]
async fn concurrent_card_confirmations_settle_once() {
    let Some(f) = fixture().await else { return };
    let id = add_product(&f, dec!(10), 5).await;
    let session_id = format!("cs_pg_{}", Uuid::now_v7().simple());
    let metadata = BTreeMap::from([(ITEMS_METADATA_KEY.to_string(), format!(r#"{{"{id}": 1}}"#))]);
    f.gateway.sessions.lock().unwrap().insert(session_id.clone(), CheckoutSession {
        id: session_id.clone(), url: None, payment_status: "paid".into(), amount_total: Some(1000), metadata,
    });

    let mut handles = Vec::new();
    for _ in 0..4 {
        let svc = f.service.clone();
        let session_id = session_id.clone();
        handles.push(tokio::spawn(async move { svc.settle_card(&session_id).await }));
    }
    let mut settled = 0;
    for h in handles {
        match h.await.unwrap().unwrap() {
            CardSettlement::Settled(order) => { settled += 1; assert_eq!(order.id, session_id); }
            CardSettlement::AlreadySettled(existing) => assert_eq!(existing, session_id),
            other => panic!("unexpected outcome {other:?}"),
        }
    }
    assert_eq!(settled, 1);
    assert_eq!(stock(&f, &id).await, 4);
    assert_eq!(orders_for(&f, &id).await, 1);
}
