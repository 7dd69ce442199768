//! HTTP-level tests driving the full router.

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceExt;

use super::auth::{issue_token, TokenType};
use super::create_router;
use crate::config::Config;
use crate::db::{test_pool, User, UserRole};
use crate::AppState;

struct TestApp {
    router: Router,
    state: Arc<AppState>,
}

impl TestApp {
    async fn new() -> Self {
        Self::with_config(Config::default().with_jwt_secret("integration-test-secret")).await
    }

    async fn with_config(config: Config) -> Self {
        let state = Arc::new(AppState::new(config, test_pool().await));
        Self {
            router: create_router(state.clone()),
            state,
        }
    }

    /// Create an account directly and return its id and an access token
    async fn user(&self, username: &str, role: UserRole) -> (String, String) {
        let user = User::create(
            &self.state.db,
            username,
            &format!("{}@example.com", username),
            "not-a-real-hash",
            role,
        )
        .await
        .unwrap();
        let token = issue_token(&self.state.config.auth, &user, TokenType::Access).unwrap();
        (user.id, token)
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let (status, _, body) = self.send_raw(method, uri, token, body).await;
        (status, body)
    }

    async fn send_raw(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, axum::http::HeaderMap, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, headers, value)
    }

    async fn create_product(&self, token: &str, title: &str, price: &str) -> String {
        let (status, body) = self
            .send(
                Method::POST,
                "/api/products/new/",
                Some(token),
                Some(json!({
                    "title": title,
                    "description": format!("{} from the farm", title),
                    "category": "number",
                    "price": price,
                    "stock": 10
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["id"].as_str().unwrap().to_string()
    }

    async fn place_order(&self, token: &str, items: Value) -> (StatusCode, Value) {
        self.send(
            Method::POST,
            "/api/products/orders/",
            Some(token),
            Some(json!({ "items": items })),
        )
        .await
    }
}

#[tokio::test]
async fn test_health_check() {
    let app = TestApp::new().await;
    let (status, body) = app.send(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!("OK"));
}

#[tokio::test]
async fn test_register_login_refresh_and_me() {
    let app = TestApp::new().await;
    let registration = json!({
        "username": "wanjiku",
        "email": "Wanjiku@Example.com",
        "password": "kuku-connect-2024",
        "user_type": "farmer"
    });

    let (status, body) = app
        .send(Method::POST, "/api/users/register/", None, Some(registration.clone()))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["email"], "wanjiku@example.com");
    assert_eq!(body["role"], "farmer");
    assert!(body.get("password_hash").is_none());

    let (status, _) = app
        .send(Method::POST, "/api/users/register/", None, Some(registration))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = app
        .send(
            Method::POST,
            "/api/users/register/",
            None,
            Some(json!({"username": "bad name", "email": "nope", "password": "123", "role": "admin"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "validation_error");
    for field in ["username", "email", "password", "role"] {
        assert!(body["error"]["details"].get(field).is_some(), "missing {field}");
    }

    let (status, _) = app
        .send(
            Method::POST,
            "/api/users/login/",
            None,
            Some(json!({"username": "wanjiku", "password": "wrong-password"})),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, login) = app
        .send(
            Method::POST,
            "/api/users/login/",
            None,
            Some(json!({"username": "wanjiku", "password": "kuku-connect-2024"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let access = login["access"].as_str().unwrap();
    let refresh = login["refresh"].as_str().unwrap();
    assert_eq!(login["user"]["username"], "wanjiku");

    let (status, me) = app.send(Method::GET, "/api/users/me/", Some(access), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["username"], "wanjiku");
    assert_eq!(me["role"], "farmer");

    // A refresh token is not an access token
    let (status, _) = app.send(Method::GET, "/api/users/protected/", Some(refresh), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .send(Method::POST, "/api/users/token/refresh/", None, Some(json!({"refresh": access})))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, refreshed) = app
        .send(Method::POST, "/api/users/token/refresh/", None, Some(json!({"refresh": refresh})))
        .await;
    assert_eq!(status, StatusCode::OK);
    let new_access = refreshed["access"].as_str().unwrap();
    let (status, _) = app.send(Method::GET, "/api/users/protected/", Some(new_access), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_protected_routes_require_a_valid_token() {
    let app = TestApp::new().await;

    let (status, body) = app.send(Method::GET, "/api/products/", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "unauthorized");

    let (status, _) = app
        .send(Method::GET, "/api/products/orders/", Some("garbage"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .place_order("garbage", json!([{"product": "p", "quantity": 1}]))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_order_total_and_farmer_visibility() {
    let app = TestApp::new().await;
    let (_, farmer) = app.user("farmer_p", UserRole::Farmer).await;
    let (_, other_farmer) = app.user("farmer_g", UserRole::Farmer).await;
    let (buyer_id, buyer) = app.user("buyer", UserRole::Buyer).await;

    let product = app.create_product(&farmer, "Organic Chicken", "200.00").await;
    app.create_product(&other_farmer, "Eggs", "15.00").await;

    // The body's buyer is ignored; the caller is the buyer
    let (status, order) = app
        .send(
            Method::POST,
            "/api/products/orders/",
            Some(&buyer),
            Some(json!({"buyer": "someone-else", "items": [{"product": product, "quantity": 2}]})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{order}");
    assert_eq!(order["buyer"], buyer_id.as_str());
    assert!(order["total_price"].is_number());
    assert_eq!(order["total_price"].as_f64(), Some(400.0));
    assert_eq!(order["items"][0]["price"], "200.00");
    assert_eq!(order["items"][0]["quantity"], 2);
    assert_eq!(order["items"][0]["product_title"], "Organic Chicken");

    let (status, seen) = app
        .send(Method::GET, "/api/products/orders/farmer/", Some(&farmer), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(seen.as_array().unwrap().len(), 1);
    assert_eq!(seen[0]["id"], order["id"]);

    let (_, unseen) = app
        .send(Method::GET, "/api/products/orders/farmer/", Some(&other_farmer), None)
        .await;
    assert!(unseen.as_array().unwrap().is_empty());

    let (_, mine) = app
        .send(Method::GET, "/api/products/orders/buyer/", Some(&buyer), None)
        .await;
    assert_eq!(mine.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_order_price_is_a_snapshot() {
    let app = TestApp::new().await;
    let (_, farmer) = app.user("farmer", UserRole::Farmer).await;
    let (_, buyer) = app.user("buyer", UserRole::Buyer).await;
    let product = app.create_product(&farmer, "Broilers", "350.50").await;

    let (_, order) = app
        .place_order(&buyer, json!([{"product": product, "quantity": 3}]))
        .await;
    assert_eq!(order["total_price"].as_f64(), Some(1051.5));

    let (status, _) = app
        .send(
            Method::PATCH,
            &format!("/api/products/edit/{}/", product),
            Some(&farmer),
            Some(json!({"price": "10.00"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, reread) = app
        .send(
            Method::GET,
            &format!("/api/products/orders/{}/", order["id"].as_str().unwrap()),
            Some(&buyer),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reread["items"][0]["price"], "350.50");
    assert_eq!(reread["total_price"].as_f64(), Some(1051.5));
}

#[tokio::test]
async fn test_invalid_order_is_rejected_without_writes() {
    let app = TestApp::new().await;
    let (_, farmer) = app.user("farmer", UserRole::Farmer).await;
    let (_, buyer) = app.user("buyer", UserRole::Buyer).await;
    let product = app.create_product(&farmer, "Layers", "250.00").await;

    let (status, body) = app.place_order(&buyer, json!([])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["details"].get("items").is_some());

    let (status, body) = app
        .place_order(
            &buyer,
            json!([{"product": product, "quantity": 1}, {"product": product, "quantity": 0}]),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["details"].get("items[1].quantity").is_some(), "{body}");

    let (status, body) = app
        .place_order(&buyer, json!([{"product": product, "quantity": 1}, {"product": "missing", "quantity": 1}]))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["details"].get("items[1].product").is_some(), "{body}");

    let (_, orders) = app.send(Method::GET, "/api/products/orders/", Some(&buyer), None).await;
    assert!(orders.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_order_read_and_delete_are_owner_only() {
    let app = TestApp::new().await;
    let (_, farmer) = app.user("farmer", UserRole::Farmer).await;
    let (_, buyer) = app.user("buyer", UserRole::Buyer).await;
    let (_, intruder) = app.user("intruder", UserRole::Buyer).await;
    let product = app.create_product(&farmer, "Eggs", "12.25").await;

    let (_, order) = app
        .place_order(&buyer, json!([{"product": product, "quantity": 4}]))
        .await;
    let uri = format!("/api/products/orders/{}/", order["id"].as_str().unwrap());

    let (status, _) = app.send(Method::GET, &uri, Some(&intruder), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app.send(Method::DELETE, &uri, Some(&intruder), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.send(Method::DELETE, &uri, Some(&buyer), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.send(Method::GET, &uri, Some(&buyer), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app.send(Method::DELETE, &uri, Some(&buyer), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_other_farmer_cannot_read_edit_or_delete_product() {
    let app = TestApp::new().await;
    let (_, owner) = app.user("owner", UserRole::Farmer).await;
    let (_, intruder) = app.user("intruder", UserRole::Farmer).await;
    let product = app.create_product(&owner, "Organic Chicken", "200.00").await;
    let uri = format!("/api/products/{}/", product);

    let (status, body) = app.send(Method::GET, &uri, Some(&intruder), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["message"], "Product not found");

    let (status, _) = app
        .send(Method::PUT, &uri, Some(&intruder), Some(json!({"price": "1.00"})))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app
        .send(
            Method::PUT,
            &format!("/api/products/edit/{}/", product),
            Some(&intruder),
            Some(json!({"title": "Mine now"})),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app.send(Method::DELETE, &uri, Some(&intruder), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app.send(Method::GET, &uri, Some(&owner), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["price"], "200.00");
    assert_eq!(body["title"], "Organic Chicken");
    assert_eq!(body["farmer_name"], "owner");

    let (_, listed) = app.send(Method::GET, "/api/products/my-products/", Some(&intruder), None).await;
    assert!(listed.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_product_referenced_by_order_cannot_be_deleted() {
    let app = TestApp::new().await;
    let (_, farmer) = app.user("farmer", UserRole::Farmer).await;
    let (_, buyer) = app.user("buyer", UserRole::Buyer).await;
    let product = app.create_product(&farmer, "Broilers", "300.00").await;
    let unsold = app.create_product(&farmer, "Layers", "280.00").await;

    app.place_order(&buyer, json!([{"product": product, "quantity": 1}])).await;

    let (status, body) = app
        .send(Method::DELETE, &format!("/api/products/{}/", product), Some(&farmer), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "conflict");

    let (status, _) = app
        .send(Method::DELETE, &format!("/api/products/{}/", unsold), Some(&farmer), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_marketplace_is_public() {
    let app = TestApp::new().await;
    let (_, a) = app.user("farmer_a", UserRole::Farmer).await;
    let (_, b) = app.user("farmer_b", UserRole::Farmer).await;
    app.create_product(&a, "Broilers", "300.00").await;
    app.create_product(&b, "Eggs", "12.00").await;

    let (status, body) = app
        .send(Method::GET, "/api/products/marketplace/", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let products = body.as_array().unwrap();
    assert_eq!(products.len(), 2);
    assert_eq!(products[0]["farmer_name"], "farmer_b");
    assert!(products[0].get("farmer_id").is_none());
}

#[tokio::test]
async fn test_profiles_resolve_to_the_caller() {
    let app = TestApp::new().await;
    let (a_id, a) = app.user("farmer_a", UserRole::Farmer).await;
    let (b_id, b) = app.user("farmer_b", UserRole::Farmer).await;

    let profile = json!({
        "farm_name": "Green Acres",
        "location": "Nakuru",
        "phone_number": "+254712345678",
        "farm_size": 12.5
    });
    let (status, a_profile) = app
        .send(Method::POST, "/api/profiles/farmers/", Some(&a), Some(profile.clone()))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{a_profile}");
    assert_eq!(a_profile["user"], a_id.as_str());
    assert_eq!(a_profile["farm_size"], "12.50");

    let (status, _) = app
        .send(Method::POST, "/api/profiles/farmers/", Some(&a), Some(profile.clone()))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // B has no profile yet: A's real id does not help
    let a_uri = format!("/api/profiles/farmers/{}/", a_profile["id"].as_str().unwrap());
    let (status, _) = app.send(Method::GET, &a_uri, Some(&b), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app
        .send(Method::PATCH, &a_uri, Some(&b), Some(json!({"farm_name": "Taken"})))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, b_profile) = app
        .send(Method::POST, "/api/profiles/farmers/", Some(&b), Some(profile))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    // With A's id in the path, B still gets B's own profile
    let (status, body) = app.send(Method::GET, &a_uri, Some(&b), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], b_profile["id"]);
    assert_eq!(body["user"], b_id.as_str());

    let (status, body) = app
        .send(Method::PUT, &a_uri, Some(&b), Some(json!({"location": "Eldoret"})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["location"], "Eldoret");
    assert_eq!(body["farm_name"], "Green Acres");

    let (_, body) = app.send(Method::GET, "/api/profiles/farmers/me/", Some(&a), None).await;
    assert_eq!(body["location"], "Nakuru");
}

#[tokio::test]
async fn test_buyer_profile_create_and_update() {
    let app = TestApp::new().await;
    let (_, buyer) = app.user("buyer", UserRole::Buyer).await;

    let (status, body) = app
        .send(
            Method::POST,
            "/api/profiles/buyers/",
            Some(&buyer),
            Some(json!({"business_name": "Mama Mboga Ltd", "phone_number": "0712345678"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert!(body["preferred_products"].is_null());

    let (status, body) = app
        .send(
            Method::PATCH,
            "/api/profiles/buyers/0/",
            Some(&buyer),
            Some(json!({"preferred_products": "eggs, broilers"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["preferred_products"], "eggs, broilers");
    assert_eq!(body["business_name"], "Mama Mboga Ltd");

    let (status, _) = app
        .send(
            Method::POST,
            "/api/profiles/buyers/",
            Some(&buyer),
            Some(json!({"phone_number": "0712345678"})),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_malformed_json_is_a_validation_error() {
    let app = TestApp::new().await;
    let (_, farmer) = app.user("farmer", UserRole::Farmer).await;

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/products/new/")
        .header(header::AUTHORIZATION, format!("Bearer {}", farmer))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"title\": "))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_account_endpoints_are_rate_limited() {
    let mut config = Config::default().with_jwt_secret("integration-test-secret");
    config.rate_limit.auth_requests_per_window = 2;
    let app = TestApp::with_config(config).await;
    let body = json!({"username": "nobody", "password": "whatever-pass"});

    for _ in 0..2 {
        let (status, _) = app
            .send(Method::POST, "/api/users/login/", None, Some(body.clone()))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    let (status, headers, body) = app
        .send_raw(Method::POST, "/api/users/login/", None, Some(body))
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(headers.contains_key("retry-after"));
    assert_eq!(body["error"]["code"], "too_many_requests");

    // Authenticated routes are not limited
    let (_, token) = app.user("buyer", UserRole::Buyer).await;
    let (status, _) = app.send(Method::GET, "/api/users/me/", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
}

async fn login_from(app: &TestApp, peer: &str, forwarded_for: Option<&str>) -> StatusCode {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri("/api/users/login/")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(value) = forwarded_for {
        builder = builder.header("x-forwarded-for", value);
    }
    let body = json!({"username": "nobody", "password": "whatever-pass"});
    let mut request = builder
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();
    request
        .extensions_mut()
        .insert(ConnectInfo(peer.parse::<SocketAddr>().unwrap()));

    app.router.clone().oneshot(request).await.unwrap().status()
}

#[tokio::test]
async fn test_rate_limit_buckets_are_per_peer() {
    let mut config = Config::default().with_jwt_secret("integration-test-secret");
    config.rate_limit.auth_requests_per_window = 2;
    let app = TestApp::with_config(config).await;

    for _ in 0..2 {
        assert_eq!(
            login_from(&app, "198.51.100.4:50000", None).await,
            StatusCode::UNAUTHORIZED
        );
    }
    assert_eq!(
        login_from(&app, "198.51.100.4:50001", None).await,
        StatusCode::TOO_MANY_REQUESTS
    );

    // A second client is unaffected by the first one's exhausted bucket
    assert_eq!(
        login_from(&app, "198.51.100.5:50000", None).await,
        StatusCode::UNAUTHORIZED
    );

    // Untrusted forwarding headers do not open a fresh bucket
    assert_eq!(
        login_from(&app, "198.51.100.4:50002", Some("203.0.113.77")).await,
        StatusCode::TOO_MANY_REQUESTS
    );
}
