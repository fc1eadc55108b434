use axum::http::{self, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use mock_server::{app, app_with_db, new_db, EXPIRED_ACCESS_TOKEN, PASSWORD, USERNAME, USER_KEY};
use serde_json::Value;
use tower::ServiceExt;

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

fn json_request(method: &str, uri: &str, body: &str) -> Request<String> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(http::header::CONTENT_TYPE, "application/json;charset=UTF-8")
        .body(body.to_string())
        .unwrap()
}

fn empty_request(method: &str, uri: &str) -> Request<String> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(String::new())
        .unwrap()
}

fn token_request(form: &str) -> Request<String> {
    Request::builder()
        .method("POST")
        .uri("/oauth/token")
        .header(http::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(form.to_string())
        .unwrap()
}

fn password_form() -> String {
    format!(
        "grant_type=password&client_id=TrackViaAPI&username={}&password={}",
        USERNAME.replace('@', "%40"),
        PASSWORD
    )
}

async fn login(app: &Router) -> Value {
    let resp = app.clone().oneshot(token_request(&password_form())).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    body_json(resp).await
}

fn authed(path: &str, token: &Value) -> String {
    let sep = if path.contains('?') { '&' } else { '?' };
    format!(
        "{path}{sep}access_token={}&user_key={USER_KEY}",
        token["access_token"].as_str().unwrap()
    )
}

// --- oauth ---

#[tokio::test]
async fn password_grant_issues_tokens() {
    let app = app();
    let token = login(&app).await;

    assert!(token["access_token"].as_str().is_some());
    assert!(token["refresh_token"].as_str().is_some());
    assert_eq!(token["expires_in"], 3600);
}

#[tokio::test]
async fn wrong_password_is_an_error_envelope() {
    let app = app();
    let resp = app
        .oneshot(token_request(
            "grant_type=password&client_id=TrackViaAPI&username=x&password=y",
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = body_json(resp).await;
    assert_eq!(body["error"], "invalid_grant");
}

#[tokio::test]
async fn refresh_grant_rotates_refresh_token() {
    let app = app();
    let first = login(&app).await;
    let form = format!(
        "grant_type=refresh_token&client_id=TrackViaAPI&refresh_token={}",
        first["refresh_token"].as_str().unwrap()
    );

    let resp = app.clone().oneshot(token_request(&form)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let second = body_json(resp).await;
    assert_ne!(second["access_token"], first["access_token"]);

    // the old refresh token was consumed
    let resp = app.oneshot(token_request(&form)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// --- token checks ---

#[tokio::test]
async fn missing_token_is_unauthorized() {
    let app = app();
    let resp = app
        .oneshot(empty_request("GET", &format!("/openapi/views?user_key={USER_KEY}")))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(resp).await;
    assert!(body["error_description"].is_string());
}

#[tokio::test]
async fn expired_token_reports_sentinel_inside_ok_response() {
    let db = new_db();
    let app = app_with_db(db.clone());
    let token = login(&app).await;

    db.write().await.expire_access_tokens();

    let resp = app
        .oneshot(empty_request("GET", &authed("/openapi/views", &token)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["error_description"], EXPIRED_ACCESS_TOKEN);
}

#[tokio::test]
async fn admin_route_expires_tokens() {
    let app = app();
    let token = login(&app).await;

    let resp = app
        .clone()
        .oneshot(empty_request("POST", "/__admin/expire-tokens"))
        .await
        .unwrap();
    assert_eq!(body_json(resp).await["expired"], 1);

    let resp = app
        .oneshot(empty_request("GET", &authed("/openapi/apps", &token)))
        .await
        .unwrap();
    assert_eq!(body_json(resp).await["error_description"], EXPIRED_ACCESS_TOKEN);
}

// --- views ---

#[tokio::test]
async fn views_filter_on_exact_name() {
    let app = app();
    let token = login(&app).await;

    let resp = app
        .clone()
        .oneshot(empty_request("GET", &authed("/openapi/views?name=Open%20Tasks", &token)))
        .await
        .unwrap();
    let views = body_json(resp).await;
    assert_eq!(views.as_array().unwrap().len(), 1);
    assert_eq!(views[0]["id"], 1);

    let resp = app
        .oneshot(empty_request("GET", &authed("/openapi/views?name=Open", &token)))
        .await
        .unwrap();
    assert!(body_json(resp).await.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn find_matches_any_field() {
    let app = app();
    let token = login(&app).await;

    let resp = app
        .oneshot(empty_request(
            "GET",
            &authed("/openapi/views/1/find?start=0&max=10&q=login", &token),
        ))
        .await
        .unwrap();
    let page = body_json(resp).await;
    assert_eq!(page["totalCount"], 1);
    assert_eq!(page["data"][0]["Title"], "Fix login bug");
}

#[tokio::test]
async fn unknown_view_is_an_error_envelope() {
    let app = app();
    let token = login(&app).await;

    let resp = app
        .oneshot(empty_request("GET", &authed("/openapi/views/99", &token)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(resp).await["error_description"], "View not found");
}

// --- users ---

#[tokio::test]
async fn create_user_from_query_parameters() {
    let app = app();
    let token = login(&app).await;

    let resp = app
        .clone()
        .oneshot(empty_request(
            "POST",
            &authed(
                "/openapi/users?firstName=Ada&lastName=Lovelace&email=ada%40example.com&timeZone=Europe%2FLondon",
                &token,
            ),
        ))
        .await
        .unwrap();
    let created = body_json(resp).await;
    assert_eq!(created["data"][0]["timeZone"], "Europe/London");

    let resp = app
        .oneshot(empty_request("GET", &authed("/openapi/users", &token)))
        .await
        .unwrap();
    assert_eq!(body_json(resp).await["totalCount"], 2);
}

// --- full record lifecycle ---

#[tokio::test]
async fn record_lifecycle() {
    let app = app();
    let token = login(&app).await;

    // create
    let resp = app
        .clone()
        .oneshot(json_request(
            "POST",
            &authed("/openapi/views/2/records", &token),
            r#"{"Name":"Grace"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let created = body_json(resp).await;
    let id = created["data"][0]["id"].as_u64().unwrap();
    assert_eq!(created["data"][0]["Name"], "Grace");

    // get
    let resp = app
        .clone()
        .oneshot(empty_request(
            "GET",
            &authed(&format!("/openapi/views/2/records/{id}"), &token),
        ))
        .await
        .unwrap();
    assert_eq!(body_json(resp).await["data"]["Name"], "Grace");

    // update
    let resp = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &authed(&format!("/openapi/views/2/records/{id}"), &token),
            r#"{"Name":"Grace Hopper","id":999}"#,
        ))
        .await
        .unwrap();
    let updated = body_json(resp).await;
    assert_eq!(updated["data"][0]["Name"], "Grace Hopper");
    assert_eq!(updated["data"][0]["id"], id);

    // delete
    let resp = app
        .clone()
        .oneshot(empty_request(
            "DELETE",
            &authed(&format!("/openapi/views/2/records/{id}"), &token),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert!(body_bytes(resp).await.is_empty());

    // get after delete
    let resp = app
        .oneshot(empty_request(
            "GET",
            &authed(&format!("/openapi/views/2/records/{id}"), &token),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(resp).await["error_description"], "Record not found");
}
