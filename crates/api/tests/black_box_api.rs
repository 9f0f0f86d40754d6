use std::sync::Arc;

use reqwest::StatusCode;
use serde_json::{json, Value};

use stockledger_api::app::{build_app, AppServices};
use stockledger_core::{LocationId, ProductId};
use stockledger_infra::{EngineConfig, InMemoryCatalog};
use stockledger_inventory::{Location, Product};

struct TestServer {
    base_url: String,
    product: ProductId,
    w1: LocationId,
    w2: LocationId,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        stockledger_observability::init();

        let catalog = InMemoryCatalog::new();
        let product = ProductId::new();
        let w1 = LocationId::new();
        let w2 = LocationId::new();
        catalog.insert_product(Product {
            id: product,
            sku: "BOLT-M8".to_string(),
            name: "M8 bolt".to_string(),
            unit_of_measure: "pcs".to_string(),
            reorder_threshold: 10,
            barcode: Some("4006381333931".to_string()),
        });
        catalog.insert_location(Location {
            id: w1,
            name: "Main warehouse".to_string(),
            code: "WH-1".to_string(),
            barcode: None,
        });
        catalog.insert_location(Location {
            id: w2,
            name: "Overflow".to_string(),
            code: "WH-2".to_string(),
            barcode: None,
        });

        // Same router as prod, bound to an ephemeral port.
        let services = Arc::new(AppServices::in_memory(catalog, EngineConfig::default()));
        let app = build_app(services);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            product,
            w1,
            w2,
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn movement(
        &self,
        client: &reqwest::Client,
        kind: &str,
        location: LocationId,
        signed_quantity: i64,
    ) -> (StatusCode, Value) {
        let res = client
            .post(self.url("/movement"))
            .json(&json!({
                "type": kind,
                "product_id": self.product.to_string(),
                "location_id": location.to_string(),
                "signed_quantity": signed_quantity,
            }))
            .send()
            .await
            .unwrap();
        let status = res.status();
        (status, res.json().await.unwrap())
    }

    async fn quantity(&self, client: &reqwest::Client, location: LocationId) -> i64 {
        let body: Value = client
            .get(self.url(&format!(
                "/stock?product_id={}&location_id={}",
                self.product, location
            )))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        body["items"]
            .as_array()
            .unwrap()
            .first()
            .map(|l| l["quantity"].as_i64().unwrap())
            .unwrap_or(0)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[tokio::test]
async fn health_reports_backend() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client.get(srv.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["backend"], "memory");
}

#[tokio::test]
async fn receipt_delivery_and_rejected_overdraw() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let (status, body) = srv.movement(&client, "receipt", srv.w1, 100).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["new_quantity"], 100);

    let (status, body) = srv.movement(&client, "delivery", srv.w1, -30).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["old_quantity"], 100);
    assert_eq!(body["new_quantity"], 70);
    assert_eq!(body["entry"]["entry_type"], "delivery");

    let (status, body) = srv.movement(&client, "delivery", srv.w1, -90).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "insufficient_stock");
    assert_eq!(body["available"], 70);

    assert_eq!(srv.quantity(&client, srv.w1).await, 70);

    let ledger: Value = client
        .get(srv.url("/ledger?limit=10"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let items = ledger["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["entry_type"], "delivery");
    assert_eq!(items[1]["entry_type"], "receipt");
}

#[tokio::test]
async fn malformed_input_is_a_bad_request() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let (status, body) = srv.movement(&client, "receipt", srv.w1, -3).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    let res = client
        .get(srv.url("/stock?product_id=not-a-uuid"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .post(srv.url("/transfer/not-a-uuid/execute"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn undecodable_bodies_are_json_validation_errors() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let unknown_type = json!({
        "type": "scan_receipt",
        "product_id": srv.product.to_string(),
        "location_id": srv.w1.to_string(),
        "signed_quantity": 5,
    });
    let missing_location = json!({
        "type": "receipt",
        "product_id": srv.product.to_string(),
        "signed_quantity": 5,
    });
    let wrong_type = json!({
        "product_id": srv.product.to_string(),
        "source_location_id": srv.w1.to_string(),
        "destination_location_id": srv.w2.to_string(),
        "quantity": "twenty",
    });

    for (path, body) in [
        ("/movement", unknown_type),
        ("/movement", missing_location),
        ("/transfer", wrong_type),
        ("/adjustment", json!({})),
        ("/scan/receipt", json!({ "quantity": 1 })),
    ] {
        let res = client.post(srv.url(path)).json(&body).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST, "{path}");
        let content_type = res.headers()["content-type"].to_str().unwrap().to_string();
        assert!(content_type.starts_with("application/json"), "{path}: {content_type}");
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["error"], "validation_error", "{path}");
        assert!(body["message"].as_str().is_some_and(|m| !m.is_empty()));
    }

    assert_eq!(srv.quantity(&client, srv.w1).await, 0);
}

#[tokio::test]
async fn unknown_location_is_not_found() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let (status, body) = srv.movement(&client, "receipt", LocationId::new(), 5).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn transfer_lifecycle_over_http() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    srv.movement(&client, "receipt", srv.w1, 70).await;

    let res = client
        .post(srv.url("/transfer"))
        .json(&json!({
            "product_id": srv.product.to_string(),
            "source_location_id": srv.w1.to_string(),
            "destination_location_id": srv.w2.to_string(),
            "quantity": 20,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let transfer: Value = res.json().await.unwrap();
    assert_eq!(transfer["status"], "draft");
    let id = transfer["id"].as_str().unwrap().to_string();

    let res = client
        .post(srv.url(&format!("/transfer/{id}/execute")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let outcome: Value = res.json().await.unwrap();
    assert_eq!(outcome["transfer"]["status"], "done");
    assert_eq!(outcome["entries"].as_array().unwrap().len(), 2);

    assert_eq!(srv.quantity(&client, srv.w1).await, 50);
    assert_eq!(srv.quantity(&client, srv.w2).await, 20);

    let res = client
        .post(srv.url(&format!("/transfer/{id}/cancel")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_transition");

    let res = client
        .get(srv.url(&format!("/transfer/{id}")))
        .send()
        .await
        .unwrap();
    let fetched: Value = res.json().await.unwrap();
    assert_eq!(fetched["status"], "done");
}

#[tokio::test]
async fn adjustment_then_undo_over_http() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    srv.movement(&client, "receipt", srv.w1, 50).await;

    let res = client
        .post(srv.url("/adjustment"))
        .json(&json!({
            "product_id": srv.product.to_string(),
            "location_id": srv.w1.to_string(),
            "counted_quantity": 45,
            "reason": "cycle count",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let adjustment: Value = res.json().await.unwrap();
    assert_eq!(adjustment["system_quantity"], 50);
    assert_eq!(adjustment["variance"], -5);
    let id = adjustment["id"].as_str().unwrap().to_string();

    let res = client
        .post(srv.url(&format!("/adjustment/{id}/execute")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let outcome: Value = res.json().await.unwrap();
    assert_eq!(outcome["entry"]["delta_quantity"], -5);
    assert_eq!(outcome["adjustment"]["executed_variance"], -5);
    assert_eq!(srv.quantity(&client, srv.w1).await, 45);

    let res = client
        .post(srv.url("/undo-last"))
        .json(&json!({ "actor": "supervisor" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let undo: Value = res.json().await.unwrap();
    assert_eq!(undo["entries"][0]["entry_type"], "undo");
    assert_eq!(undo["entries"][0]["actor"], "supervisor");
    assert_eq!(srv.quantity(&client, srv.w1).await, 50);
}

#[tokio::test]
async fn undo_on_empty_ledger_is_unprocessable() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client.post(srv.url("/undo-last")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "nothing_to_undo");
}

#[tokio::test]
async fn idempotency_key_prevents_double_apply() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let body = json!({
        "type": "receipt",
        "product_id": srv.product.to_string(),
        "location_id": srv.w1.to_string(),
        "signed_quantity": 12,
        "idempotency_key": "dock-7-pallet-19",
    });

    let first = client.post(srv.url("/movement")).json(&body).send().await.unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);
    let second = client.post(srv.url("/movement")).json(&body).send().await.unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    let replay: Value = second.json().await.unwrap();
    assert_eq!(replay["replayed"], true);

    assert_eq!(srv.quantity(&client, srv.w1).await, 12);
}

#[tokio::test]
async fn scan_endpoints_resolve_codes() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/scan/receipt"))
        .json(&json!({
            "product_code": "4006381333931",
            "location_code": "WH-1",
            "quantity": 3,
            "scanner_id": "handheld-1",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["new_quantity"], 3);
    assert_eq!(body["product"]["sku"], "BOLT-M8");

    let res = client.get(srv.url("/scan/lookup/WH-2")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let target: Value = res.json().await.unwrap();
    assert_eq!(target["kind"], "location");

    let res = client.get(srv.url("/scan/lookup/unknown")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let low: Value = client
        .get(srv.url("/stock/low"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(low["items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn scan_history_lists_accepted_and_rejected_scans() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let scan = |quantity: i64| {
        json!({
            "product_code": "BOLT-M8",
            "location_code": "WH-1",
            "quantity": quantity,
            "scanner_id": "handheld-2",
        })
    };
    let res = client
        .post(srv.url("/scan/receipt"))
        .json(&scan(2))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let res = client
        .post(srv.url("/scan/delivery"))
        .json(&scan(5))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let res = client
        .get(srv.url(&format!("/scan/history?warehouse_id={}&limit=10", srv.w1)))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["count"], 2);
    let items = body["items"].as_array().unwrap();
    assert_eq!(items[0]["action"], "delivery");
    assert_eq!(items[0]["success"], false);
    assert!(items[0]["error"].is_string());
    assert_eq!(items[0]["product_id"], srv.product.to_string());
    assert_eq!(items[1]["action"], "receipt");
    assert_eq!(items[1]["success"], true);
    assert!(items[1]["error"].is_null());
    assert_eq!(items[1]["scanner_id"], "handheld-2");

    let other: Value = client
        .get(srv.url(&format!("/scan/history?location_id={}", srv.w2)))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(other["count"], 0);

    let res = client
        .get(srv.url("/scan/history?product_id=not-a-uuid"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}
