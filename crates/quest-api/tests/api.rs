use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use quest_api::{AppConfig, AppState, AppStateInner, router};
use quest_db::Database;
use quest_types::models::Role;

struct TestApp {
    app: Router,
    state: AppState,
}

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: Value,
}

impl TestApp {
    fn new() -> Self {
        let db = Database::open_in_memory().unwrap();
        let state = AppStateInner::new(db, AppConfig::default()).into_state();
        Self {
            app: router(state.clone()),
            state,
        }
    }

    async fn request(&self, req: Request<Body>) -> Reply {
        let res = self.app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let headers = res.headers().clone();
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        Reply {
            status,
            headers,
            body,
        }
    }

    async fn send(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Reply {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        self.request(builder.body(body).unwrap()).await
    }

    /// Register a learner and return (user id, access token, refresh token).
    async fn register(&self, name: &str, email: &str) -> (String, String, String) {
        let reply = self
            .send(
                Method::POST,
                "/api/v1/auth/register",
                None,
                Some(json!({
                    "name": name,
                    "email": email,
                    "password": "Secret123",
                    "confirmPassword": "Secret123",
                })),
            )
            .await;
        assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.body);
        (
            reply.body["user"]["id"].as_str().unwrap().to_string(),
            reply.body["accessToken"].as_str().unwrap().to_string(),
            reply.body["refreshToken"].as_str().unwrap().to_string(),
        )
    }

    async fn create_task(&self, token: &str, title: &str) -> String {
        let reply = self
            .send(Method::POST, "/api/v1/tasks", Some(token), Some(json!({ "title": title })))
            .await;
        assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.body);
        reply.body["id"].as_str().unwrap().to_string()
    }
}

#[tokio::test]
async fn health_carries_hardening_headers() {
    let t = TestApp::new();
    let reply = t.send(Method::GET, "/health", None, None).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body, json!({ "status": "ok" }));
    assert_eq!(reply.headers["x-frame-options"], "DENY");
    assert_eq!(reply.headers["x-content-type-options"], "nosniff");
    assert_eq!(reply.headers["x-xss-protection"], "1; mode=block");
    assert!(reply.headers.contains_key("content-security-policy"));
    assert!(!reply.headers.contains_key("strict-transport-security"));
}

#[tokio::test]
async fn unknown_routes_return_json_404() {
    let t = TestApp::new();
    let reply = t.send(Method::GET, "/api/v1/nope", None, None).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(reply.body["error"], "Not Found");
    assert_eq!(reply.headers["x-frame-options"], "DENY");
}

#[tokio::test]
async fn register_login_and_me() {
    let t = TestApp::new();
    t.register("Ada", "ada@example.com").await;

    let login = t
        .send(
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({ "email": "ADA@example.com", "password": "Secret123" })),
        )
        .await;
    assert_eq!(login.status, StatusCode::OK);
    let token = login.body["accessToken"].as_str().unwrap();

    let me = t.send(Method::GET, "/api/v1/auth/me", Some(token), None).await;
    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.body["email"], "ada@example.com");
    assert_eq!(me.body["level"], 1);
    assert!(me.body["lastLogin"].is_string());
    assert!(me.body.get("password").is_none());
}

#[tokio::test]
async fn duplicate_email_conflicts() {
    let t = TestApp::new();
    t.register("Ada", "ada@example.com").await;
    let reply = t
        .send(
            Method::POST,
            "/api/v1/auth/register",
            None,
            Some(json!({
                "name": "Imposter",
                "email": "ada@example.com",
                "password": "Secret123",
                "confirmPassword": "Secret123",
            })),
        )
        .await;
    assert_eq!(reply.status, StatusCode::CONFLICT);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn simultaneous_signups_with_one_email_conflict() {
    let t = TestApp::new();
    let signup = |name: &str| {
        json!({
            "name": name,
            "email": "ada@example.com",
            "password": "Secret123",
            "confirmPassword": "Secret123",
        })
    };
    let (a, b) = tokio::join!(
        t.send(Method::POST, "/api/v1/auth/register", None, Some(signup("Ada"))),
        t.send(Method::POST, "/api/v1/auth/register", None, Some(signup("Imposter"))),
    );

    let mut statuses = [a.status, b.status];
    statuses.sort();
    assert_eq!(statuses, [StatusCode::CREATED, StatusCode::CONFLICT]);
    let loser = if a.status == StatusCode::CONFLICT { &a } else { &b };
    assert_eq!(loser.body["message"], "An account with this email already exists");
}

#[tokio::test]
async fn password_mismatch_is_rejected_before_persisting() {
    let t = TestApp::new();
    let reply = t
        .send(
            Method::POST,
            "/api/v1/auth/register",
            None,
            Some(json!({
                "name": "Ada",
                "email": "ada@example.com",
                "password": "Secret123",
                "confirmPassword": "Secret321",
            })),
        )
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["error"], "Validation Error");
    assert_eq!(reply.body["message"], "Passwords do not match");

    let login = t
        .send(
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({ "email": "ada@example.com", "password": "Secret123" })),
        )
        .await;
    assert_eq!(login.status, StatusCode::UNAUTHORIZED);
    assert_eq!(login.body["message"], "Invalid email or password");
}

#[tokio::test]
async fn operator_keys_are_stripped_from_bodies() {
    let t = TestApp::new();
    let reply = t
        .send(
            Method::POST,
            "/api/v1/auth/register",
            None,
            Some(json!({
                "name": "Ada",
                "email": "ada@example.com",
                "password": "Secret123",
                "confirmPassword": "Secret123",
                "$where": "1 == 1",
                "role.admin": true,
            })),
        )
        .await;
    assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.body);
    assert_eq!(reply.body["user"]["role"], "user");

    // Without the key stripping this would be an unknown-key validation error
    let login = t
        .send(
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({ "email": "ada@example.com", "password": { "$gt": "" } })),
        )
        .await;
    assert_eq!(login.status, StatusCode::BAD_REQUEST);
    assert_eq!(login.body["message"], "\"password\" must be a string");
}

#[tokio::test]
async fn html_in_strings_is_escaped() {
    let t = TestApp::new();
    let (_, token, _) = t.register("Ada", "ada@example.com").await;
    let reply = t
        .send(
            Method::POST,
            "/api/v1/tasks",
            Some(&token),
            Some(json!({ "title": "<script>alert('x')</script>" })),
        )
        .await;
    assert_eq!(reply.status, StatusCode::CREATED);
    assert_eq!(
        reply.body["title"],
        "&lt;script&gt;alert(&#x27;x&#x27;)&lt;&#x2F;script&gt;"
    );
}

#[tokio::test]
async fn sixth_login_attempt_is_rate_limited() {
    let t = TestApp::new();
    let attempt = json!({ "email": "ada@example.com", "password": "Wrong1234" });
    for _ in 0..5 {
        let reply = t
            .send(Method::POST, "/api/v1/auth/login", None, Some(attempt.clone()))
            .await;
        assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    }

    let req = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/auth/login")
        .header(header::ORIGIN, "http://localhost:3000")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(attempt.to_string()))
        .unwrap();
    let reply = t.request(req).await;
    assert_eq!(reply.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(reply.headers["access-control-allow-origin"], "http://localhost:3000");
    assert_eq!(reply.body["error"], "Too Many Requests");
    assert_eq!(
        reply.body["message"],
        "Too many authentication attempts, please try again after an hour."
    );
    assert_eq!(reply.headers["x-frame-options"], "DENY");
}

#[tokio::test]
async fn preflight_short_circuits() {
    let t = TestApp::new();
    let req = Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/v1/tasks")
        .header(header::ORIGIN, "http://localhost:3000")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "PATCH")
        .body(Body::empty())
        .unwrap();
    let reply = t.request(req).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body, Value::Null);
    assert_eq!(reply.headers["access-control-allow-origin"], "http://localhost:3000");
    assert_eq!(reply.headers["access-control-allow-credentials"], "true");
    assert!(
        reply.headers["access-control-allow-methods"]
            .to_str()
            .unwrap()
            .contains("PATCH")
    );
}

#[tokio::test]
async fn oversized_bodies_are_rejected() {
    let t = TestApp::new();
    let big = "a".repeat(11 * 1024);
    let body = json!({ "email": "ada@example.com", "password": big }).to_string();
    let req = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/auth/refresh")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::CONTENT_LENGTH, body.len())
        .header(header::ORIGIN, "http://localhost:3000")
        .body(Body::from(body))
        .unwrap();
    let reply = t.request(req).await;
    assert_eq!(reply.status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(reply.headers["access-control-allow-origin"], "http://localhost:3000");
    assert_eq!(reply.body["error"], "Payload Too Large");
}

#[tokio::test]
async fn protected_routes_need_a_token() {
    let t = TestApp::new();
    let reply = t.send(Method::GET, "/api/v1/tasks", None, None).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.body["message"], "No token provided");

    let reply = t.send(Method::GET, "/api/v1/tasks", Some("garbage"), None).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.body["message"], "Invalid or expired token");
}

#[tokio::test]
async fn refresh_stops_working_after_logout() {
    let t = TestApp::new();
    let (_, access, refresh) = t.register("Ada", "ada@example.com").await;

    let renewed = t
        .send(
            Method::POST,
            "/api/v1/auth/refresh",
            None,
            Some(json!({ "refreshToken": refresh })),
        )
        .await;
    assert_eq!(renewed.status, StatusCode::OK);

    let logout = t.send(Method::POST, "/api/v1/auth/logout", Some(&access), None).await;
    assert_eq!(logout.status, StatusCode::OK);
    assert_eq!(logout.body["message"], "Logged out successfully");

    let reply = t
        .send(
            Method::POST,
            "/api/v1/auth/refresh",
            None,
            Some(json!({ "refreshToken": refresh })),
        )
        .await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.body["message"], "Invalid or expired refresh token");
}

#[tokio::test]
async fn forgot_and_reset_password() {
    let t = TestApp::new();
    t.register("Ada", "ada@example.com").await;

    let unknown = t
        .send(
            Method::POST,
            "/api/v1/auth/forgot-password",
            None,
            Some(json!({ "email": "nobody@example.com" })),
        )
        .await;
    assert_eq!(unknown.status, StatusCode::OK);
    assert!(unknown.body.get("resetToken").is_none());

    let known = t
        .send(
            Method::POST,
            "/api/v1/auth/forgot-password",
            None,
            Some(json!({ "email": "ada@example.com" })),
        )
        .await;
    assert_eq!(known.status, StatusCode::OK);
    assert_eq!(known.body["message"], unknown.body["message"]);
    let token = known.body["resetToken"].as_str().unwrap().to_string();

    let reset = t
        .send(
            Method::POST,
            &format!("/api/v1/auth/reset-password/{token}"),
            None,
            Some(json!({ "password": "Changed123", "confirmPassword": "Changed123" })),
        )
        .await;
    assert_eq!(reset.status, StatusCode::OK, "{}", reset.body);

    let reused = t
        .send(
            Method::POST,
            &format!("/api/v1/auth/reset-password/{token}"),
            None,
            Some(json!({ "password": "Again1234", "confirmPassword": "Again1234" })),
        )
        .await;
    assert_eq!(reused.status, StatusCode::BAD_REQUEST);

    let login = t
        .send(
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({ "email": "ada@example.com", "password": "Changed123" })),
        )
        .await;
    assert_eq!(login.status, StatusCode::OK);
}

#[tokio::test]
async fn malformed_ids_fail_validation() {
    let t = TestApp::new();
    let (_, token, _) = t.register("Ada", "ada@example.com").await;
    let reply = t.send(Method::GET, "/api/v1/tasks/not-an-id", Some(&token), None).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["message"], "\"id\" must be a valid id");
}

#[tokio::test]
async fn completing_a_task_awards_points_once() {
    let t = TestApp::new();
    let (_, token, _) = t.register("Ada", "ada@example.com").await;
    let id = t.create_task(&token, "Read chapter one").await;
    let uri = format!("/api/v1/tasks/{id}/complete");

    let first = t.send(Method::POST, &uri, Some(&token), None).await;
    assert_eq!(first.status, StatusCode::OK, "{}", first.body);
    assert_eq!(first.body["pointsAwarded"], 10);
    assert_eq!(first.body["totalPoints"], 10);
    assert_eq!(first.body["task"]["status"], "completed");
    assert_eq!(first.body["newBadges"], json!(["first-steps"]));

    let second = t.send(Method::POST, &uri, Some(&token), None).await;
    assert_eq!(second.status, StatusCode::CONFLICT);
    assert_eq!(second.body["message"], "Task is already completed");

    let reopen = t
        .send(
            Method::PATCH,
            &format!("/api/v1/tasks/{id}"),
            Some(&token),
            Some(json!({ "status": "pending" })),
        )
        .await;
    assert_eq!(reopen.status, StatusCode::CONFLICT);

    let rename = t
        .send(
            Method::PATCH,
            &format!("/api/v1/tasks/{id}"),
            Some(&token),
            Some(json!({ "title": "Read chapter two" })),
        )
        .await;
    assert_eq!(rename.status, StatusCode::OK, "{}", rename.body);
    assert_eq!(rename.body["title"], "Read chapter two");
    assert_eq!(rename.body["status"], "completed");

    let third = t.send(Method::POST, &uri, Some(&token), None).await;
    assert_eq!(third.status, StatusCode::CONFLICT);

    let me = t.send(Method::GET, "/api/v1/auth/me", Some(&token), None).await;
    assert_eq!(me.body["points"], 10);

    let notes = t.send(Method::GET, "/api/v1/notifications", Some(&token), None).await;
    assert_eq!(notes.body["total"], 2);
    let count = t
        .send(Method::GET, "/api/v1/notifications/unread-count", Some(&token), None)
        .await;
    assert_eq!(count.body["count"], 2);

    let all = t
        .send(Method::PATCH, "/api/v1/notifications/read-all", Some(&token), None)
        .await;
    assert_eq!(all.body["updated"], 2);
    let unread = t
        .send(Method::GET, "/api/v1/notifications?unread=true", Some(&token), None)
        .await;
    assert_eq!(unread.body["total"], 0);
}

#[tokio::test]
async fn task_listing_filters_and_paginates() {
    let t = TestApp::new();
    let (_, token, _) = t.register("Ada", "ada@example.com").await;
    for title in ["Alpha task", "Beta task", "Gamma task"] {
        t.create_task(&token, title).await;
    }
    let done = t.create_task(&token, "Delta task").await;
    t.send(Method::POST, &format!("/api/v1/tasks/{done}/complete"), Some(&token), None)
        .await;

    let page = t
        .send(
            Method::GET,
            "/api/v1/tasks?status=pending&limit=2&page=1",
            Some(&token),
            None,
        )
        .await;
    assert_eq!(page.status, StatusCode::OK, "{}", page.body);
    assert_eq!(page.body["total"], 3);
    assert_eq!(page.body["limit"], 2);
    assert_eq!(page.body["data"].as_array().unwrap().len(), 2);

    // Repeated non-allow-listed keys collapse to the last value
    let reply = t
        .send(Method::GET, "/api/v1/tasks?foo=1&foo=2", Some(&token), None)
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["message"], "\"foo\" is not allowed");
}

#[tokio::test]
async fn other_users_tasks_are_invisible() {
    let t = TestApp::new();
    let (_, ada, _) = t.register("Ada", "ada@example.com").await;
    let (_, grace, _) = t.register("Grace", "grace@example.com").await;
    let id = t.create_task(&ada, "Private task").await;

    let reply = t.send(Method::GET, &format!("/api/v1/tasks/{id}"), Some(&grace), None).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    let reply = t
        .send(Method::DELETE, &format!("/api/v1/tasks/{id}"), Some(&grace), None)
        .await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn friend_request_flow() {
    let t = TestApp::new();
    let (ada_id, ada, _) = t.register("Ada", "ada@example.com").await;
    let (grace_id, grace, _) = t.register("Grace", "grace@example.com").await;

    let to_self = t
        .send(
            Method::POST,
            "/api/v1/friends/requests",
            Some(&ada),
            Some(json!({ "userId": ada_id })),
        )
        .await;
    assert_eq!(to_self.status, StatusCode::BAD_REQUEST);

    let sent = t
        .send(
            Method::POST,
            "/api/v1/friends/requests",
            Some(&ada),
            Some(json!({ "userId": grace_id })),
        )
        .await;
    assert_eq!(sent.status, StatusCode::CREATED, "{}", sent.body);
    let request_id = sent.body["id"].as_str().unwrap().to_string();

    let again = t
        .send(
            Method::POST,
            "/api/v1/friends/requests",
            Some(&grace),
            Some(json!({ "userId": ada_id })),
        )
        .await;
    assert_eq!(again.status, StatusCode::CONFLICT);
    assert_eq!(again.body["message"], "A friend request between you already exists");

    // Only the recipient may accept
    let accept_uri = format!("/api/v1/friends/requests/{request_id}/accept");
    let wrong = t.send(Method::POST, &accept_uri, Some(&ada), None).await;
    assert_eq!(wrong.status, StatusCode::NOT_FOUND);

    let incoming = t.send(Method::GET, "/api/v1/friends/requests", Some(&grace), None).await;
    assert_eq!(incoming.body[0]["requester"]["name"], "Ada");

    let accepted = t.send(Method::POST, &accept_uri, Some(&grace), None).await;
    assert_eq!(accepted.status, StatusCode::OK);

    let befriended = t
        .send(
            Method::POST,
            "/api/v1/friends/requests",
            Some(&ada),
            Some(json!({ "userId": grace_id })),
        )
        .await;
    assert_eq!(befriended.status, StatusCode::CONFLICT);
    assert_eq!(befriended.body["message"], "You are already friends");

    let friends = t.send(Method::GET, "/api/v1/friends", Some(&ada), None).await;
    assert_eq!(friends.body[0]["id"], grace_id.as_str());

    let removed = t
        .send(Method::DELETE, &format!("/api/v1/friends/{grace_id}"), Some(&ada), None)
        .await;
    assert_eq!(removed.status, StatusCode::OK);
    let friends = t.send(Method::GET, "/api/v1/friends", Some(&grace), None).await;
    assert_eq!(friends.body, json!([]));
}

#[tokio::test]
async fn admin_routes_require_the_admin_role() {
    let t = TestApp::new();
    let (admin_id, _, _) = t.register("Root", "root@example.com").await;
    let (user_id, user_token, _) = t.register("Ada", "ada@example.com").await;

    let denied = t.send(Method::GET, "/api/v1/admin/stats", Some(&user_token), None).await;
    assert_eq!(denied.status, StatusCode::FORBIDDEN);
    assert_eq!(denied.body["message"], "Admin access required");

    t.state
        .db
        .admin_update_user(&admin_id, Some(Role::Admin), None)
        .unwrap();
    let login = t
        .send(
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({ "email": "root@example.com", "password": "Secret123" })),
        )
        .await;
    let admin = login.body["accessToken"].as_str().unwrap().to_string();

    let stats = t.send(Method::GET, "/api/v1/admin/stats", Some(&admin), None).await;
    assert_eq!(stats.status, StatusCode::OK, "{}", stats.body);
    assert_eq!(stats.body["totalUsers"], 2);
    assert_eq!(stats.body["admins"], 1);

    let self_demote = t
        .send(
            Method::PATCH,
            &format!("/api/v1/admin/users/{admin_id}"),
            Some(&admin),
            Some(json!({ "role": "user" })),
        )
        .await;
    assert_eq!(self_demote.status, StatusCode::BAD_REQUEST);

    let announce = t
        .send(
            Method::POST,
            "/api/v1/admin/announcements",
            Some(&admin),
            Some(json!({ "title": "Maintenance", "message": "Back soon" })),
        )
        .await;
    assert_eq!(announce.status, StatusCode::CREATED);
    assert_eq!(announce.body["recipients"], 2);

    let deactivate = t
        .send(
            Method::PATCH,
            &format!("/api/v1/admin/users/{user_id}"),
            Some(&admin),
            Some(json!({ "active": false })),
        )
        .await;
    assert_eq!(deactivate.status, StatusCode::OK);
    assert_eq!(deactivate.body["active"], false);

    let locked_out = t.send(Method::GET, "/api/v1/auth/me", Some(&user_token), None).await;
    assert_eq!(locked_out.status, StatusCode::UNAUTHORIZED);

    let everyone = t.send(Method::GET, "/api/v1/admin/users", Some(&admin), None).await;
    assert_eq!(everyone.body["total"], 2);
    let directory = t.send(Method::GET, "/api/v1/users", Some(&admin), None).await;
    assert_eq!(directory.body["total"], 1);
}

#[tokio::test]
async fn gateway_rejects_missing_token_before_upgrade() {
    let t = TestApp::new();
    let reply = t.send(Method::GET, "/ws", None, None).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);

    let reply = t.send(Method::GET, "/ws?token=garbage", None, None).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.body["message"], "Invalid or expired token");
}
