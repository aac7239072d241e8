use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};
use http::{HeaderName, HeaderValue, header};
use tower_cookies::CookieManagerLayer;
use tower_http::{
    set_header::SetResponseHeaderLayer,
    trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::{handlers, middleware_layer, state::AppState};

/// Largest JSON body accepted by any route.
const MAX_BODY_BYTES: usize = 64 * 1024;

const CONTENT_SECURITY_POLICY: &str = "default-src 'self'; \
    script-src 'self'; \
    style-src 'self' 'unsafe-inline'; \
    img-src 'self' https: data:; \
    connect-src 'self' https://api.twitter.com; \
    font-src 'self'; \
    frame-src 'self' https://twitter.com";

/// Headers added to every response unless a handler already set them.
fn security_headers() -> [(HeaderName, HeaderValue); 7] {
    [
        (
            HeaderName::from_static("x-dns-prefetch-control"),
            HeaderValue::from_static("on"),
        ),
        (
            header::STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_static("max-age=63072000; includeSubDomains; preload"),
        ),
        (header::X_XSS_PROTECTION, HeaderValue::from_static("1; mode=block")),
        (header::X_FRAME_OPTIONS, HeaderValue::from_static("SAMEORIGIN")),
        (header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff")),
        (
            header::REFERRER_POLICY,
            HeaderValue::from_static("origin-when-cross-origin"),
        ),
        (
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static(CONTENT_SECURITY_POLICY),
        ),
    ]
}

/// Builds every route of the service. Connection-level layers (CORS, rate
/// limiting) are added by the caller.
pub fn build_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/api/auth/signin/twitter", get(handlers::auth::sign_in))
        .route("/api/auth/callback/twitter", get(handlers::auth::callback))
        .route(
            "/api/applyBanner",
            post(handlers::banner::apply_banner)
                .fallback(handlers::banner::method_not_allowed),
        )
        .route("/api/test-config", get(handlers::config::test_config))
        .with_state(state.clone());

    let session_routes = Router::new()
        .route("/api/auth/session", get(handlers::auth::session))
        .route("/api/auth/signout", post(handlers::auth::sign_out))
        .route_layer(from_fn(middleware_layer::csrf::verify_csrf))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::auth::require_session,
        ))
        .with_state(state);

    let mut app = Router::new()
        .merge(public_routes)
        .merge(session_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default())
                .on_request(DefaultOnRequest::default().level(Level::DEBUG))
                .on_response(DefaultOnResponse::default().level(Level::DEBUG))
                .on_failure(DefaultOnFailure::default().level(Level::ERROR)),
        )
        .layer(CookieManagerLayer::new())
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES));

    for (name, value) in security_headers() {
        app = app.layer(SetResponseHeaderLayer::if_not_present(name, value));
    }

    app
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tower::ServiceExt;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, http::HeaderMap, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, headers, body)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    async fn mount_image_host(server: &MockServer) -> String {
        Mock::given(method("GET"))
            .and(path("/avatar.png"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(crate::services::banner::png_fixture(100, 100)),
            )
            .mount(server)
            .await;
        format!("{}/avatar.png", server.uri())
    }

    #[tokio::test]
    async fn missing_profile_image_url_is_400() {
        let app = build_router(AppState::for_tests("http://127.0.0.1:9"));
        let (status, headers, body) =
            send(&app, post_json("/api/applyBanner", json!({ "accessToken": "abc" }))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "error": "Missing required parameters" }));
        assert_eq!(headers[header::X_FRAME_OPTIONS], "SAMEORIGIN");
        assert!(headers.contains_key(header::CONTENT_SECURITY_POLICY));
    }

    #[tokio::test]
    async fn apply_banner_rejects_other_methods() {
        let app = build_router(AppState::for_tests("http://127.0.0.1:9"));
        let (status, _, body) = send(&app, get("/api/applyBanner")).await;

        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body, json!({ "error": "Method not allowed" }));
    }

    #[tokio::test]
    async fn apply_banner_returns_data_url() {
        let server = MockServer::start().await;
        let image_url = mount_image_host(&server).await;
        Mock::given(method("POST"))
            .and(path("/2/users/me"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let app = build_router(AppState::for_tests(&server.uri()));
        let (status, _, body) = send(
            &app,
            post_json(
                "/api/applyBanner",
                json!({ "accessToken": "token", "profileImageUrl": image_url }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert!(body["image"].as_str().unwrap().starts_with("data:image/png;base64,"));
    }

    #[tokio::test]
    async fn apply_banner_surfaces_provider_401() {
        let server = MockServer::start().await;
        let image_url = mount_image_host(&server).await;
        Mock::given(method("POST"))
            .and(path("/2/users/me"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let app = build_router(AppState::for_tests(&server.uri()));
        let (status, _, body) = send(
            &app,
            post_json(
                "/api/applyBanner",
                json!({ "accessToken": "expired", "profileImageUrl": image_url }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["error"].as_str().unwrap().contains("expired"));
        assert!(body.get("image").is_none());
    }

    #[tokio::test]
    async fn unreachable_image_is_500_with_details() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let app = build_router(AppState::for_tests(&server.uri()));
        let (status, _, body) = send(
            &app,
            post_json(
                "/api/applyBanner",
                json!({ "accessToken": "secret-token", "profileImageUrl": format!("{}/x.png", server.uri()) }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Error processing image");
        assert!(body["details"].as_str().unwrap().contains("404"));
        assert!(!body.to_string().contains("secret-token"));
    }

    #[tokio::test]
    async fn test_config_reports_without_secrets() {
        let app = build_router(AppState::for_tests("http://127.0.0.1:9"));
        let (status, _, body) = send(&app, get("/api/test-config")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["config"]["clientId"], "test-...");
        assert_eq!(
            body["config"]["callbackUrl"],
            "http://localhost:3000/api/auth/callback/twitter"
        );
        assert_eq!(body["config"]["isConfigured"], true);
        assert!(!body.to_string().contains("test-client-secret"));
    }

    #[tokio::test]
    async fn session_requires_cookie() {
        let app = build_router(AppState::for_tests("http://127.0.0.1:9"));
        let (status, _, body) = send(&app, get("/api/auth/session")).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Not signed in");
    }

    fn query_value(location: &str, name: &str) -> String {
        let url = url::Url::parse(location).unwrap();
        url.query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
            .unwrap()
    }

    fn cookie_pair(headers: &http::HeaderMap, name: &str) -> String {
        headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(|v| v.split(';').next())
            .find(|pair| pair.starts_with(&format!("{}=", name)))
            .unwrap()
            .to_string()
    }

    /// Runs sign-in and callback; returns (cookie header, csrf token).
    async fn sign_in(app: &Router, server: &MockServer, expires_in: i64) -> (String, String) {
        Mock::given(method("POST"))
            .and(path("/2/oauth2/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "first-access",
                "refresh_token": "first-refresh",
                "expires_in": expires_in
            })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/2/users/me"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "id": "42", "name": "Ada", "profile_image_url": "https://pbs.example/a.jpg" }
            })))
            .mount(server)
            .await;

        let (status, headers, _) = send(app, get("/api/auth/signin/twitter")).await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        let location = headers[header::LOCATION].to_str().unwrap().to_string();
        assert!(location.starts_with(&format!("{}/i/oauth2/authorize", server.uri())));
        assert_eq!(query_value(&location, "code_challenge_method"), "S256");
        assert_eq!(query_value(&location, "code_challenge").len(), 43);
        let oauth_state = query_value(&location, "state");

        let callback = format!("/api/auth/callback/twitter?code=the-code&state={}", oauth_state);
        let (status, headers, _) = send(app, get(&callback)).await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        assert_eq!(headers[header::LOCATION], "/");

        let session_cookie = cookie_pair(&headers, "session_id");
        let csrf_cookie = cookie_pair(&headers, "csrf_token");
        let csrf = csrf_cookie.trim_start_matches("csrf_token=").to_string();

        // The state is single use.
        let (status, _, _) = send(app, get(&callback)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        (format!("{}; {}", session_cookie, csrf_cookie), csrf)
    }

    fn with_cookie(mut request: Request<Body>, cookie: &str) -> Request<Body> {
        request
            .headers_mut()
            .insert(header::COOKIE, HeaderValue::from_str(cookie).unwrap());
        request
    }

    #[tokio::test]
    async fn sign_in_session_and_sign_out() {
        let server = MockServer::start().await;
        let app = build_router(AppState::for_tests(&server.uri()));
        let (cookie, csrf) = sign_in(&app, &server, 7200).await;

        let (status, _, body) = send(&app, with_cookie(get("/api/auth/session"), &cookie)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["name"], "Ada");
        assert_eq!(body["accessToken"], "first-access");
        assert_eq!(body["error"], Value::Null);
        assert!(body["expires"].is_string());

        let (status, _, _) = send(
            &app,
            with_cookie(Request::post("/api/auth/signout").body(Body::empty()).unwrap(), &cookie),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let signout = Request::post("/api/auth/signout")
            .header(middleware_layer::csrf::CSRF_HEADER, csrf)
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(&app, with_cookie(signout, &cookie)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);

        let (status, _, _) = send(&app, with_cookie(get("/api/auth/session"), &cookie)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn expired_token_is_refreshed_at_most_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2/oauth2/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(400))
            .expect(1)
            .mount(&server)
            .await;

        let app = build_router(AppState::for_tests(&server.uri()));
        let (cookie, _) = sign_in(&app, &server, 0).await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        for _ in 0..2 {
            let (status, _, body) =
                send(&app, with_cookie(get("/api/auth/session"), &cookie)).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["error"], "RefreshAccessTokenError");
            assert_eq!(body["accessToken"], "first-access");
        }
    }

    #[tokio::test]
    async fn expired_token_is_replaced_by_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2/oauth2/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=first-refresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "second-access",
                "expires_in": 7200
            })))
            .expect(1)
            .mount(&server)
            .await;

        let app = build_router(AppState::for_tests(&server.uri()));
        let (cookie, _) = sign_in(&app, &server, 0).await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        for _ in 0..2 {
            let (status, _, body) =
                send(&app, with_cookie(get("/api/auth/session"), &cookie)).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["accessToken"], "second-access");
            assert_eq!(body["error"], Value::Null);
        }
    }

    #[tokio::test]
    async fn callback_rejects_unknown_state() {
        let app = build_router(AppState::for_tests("http://127.0.0.1:9"));
        let (status, _, body) =
            send(&app, get("/api/auth/callback/twitter?code=c&state=forged")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Invalid or expired OAuth state");

        let (status, _, _) =
            send(&app, get("/api/auth/callback/twitter?error=access_denied")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
