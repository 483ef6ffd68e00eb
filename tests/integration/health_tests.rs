//! Health endpoints

use serde_json::Value;

use crate::common::TestApp;

#[tokio::test]
async fn test_health_endpoints_are_public() {
    let app = TestApp::new().await;

    let response = app.get("/api/v1/health", None).await;
    response.assert_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));

    let response = app.get("/api/v1/health/ready", None).await;
    response.assert_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "ready");
    assert_eq!(body["database"], "healthy");
    assert_eq!(body["storage"], "healthy");
}
