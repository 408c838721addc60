use std::net::SocketAddr;
use std::time::Duration;

use quest_api::{AppConfig, AppStateInner, router};
use quest_client::{ApiClient, ClientError, NewTask, ReconnectPolicy, Session};
use quest_db::Database;
use quest_types::events::GatewayEvent;
use quest_types::models::NotificationKind;

/// Serve a fresh in-memory instance on an ephemeral port.
async fn spawn_server() -> String {
    let db = Database::open_in_memory().unwrap();
    let state = AppStateInner::new(db, AppConfig::default()).into_state();
    let app = router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });
    format!("http://{addr}")
}

async fn next_event(sub: &mut quest_client::Subscription) -> GatewayEvent {
    tokio::time::timeout(Duration::from_secs(5), sub.next())
        .await
        .expect("gateway event in time")
        .expect("subscription still open")
}

#[tokio::test]
async fn session_lifecycle() {
    let client = ApiClient::new(&spawn_server().await);
    assert!(!client.is_authenticated());

    let user = client
        .register("Ada", "ada@example.com", "Secret123")
        .await
        .unwrap();
    assert_eq!(user.email, "ada@example.com");
    assert!(client.is_authenticated());

    let me = client.me().await.unwrap();
    assert_eq!(me.id, user.id);

    let before = client.session().unwrap().refresh_token;
    client.refresh().await.unwrap();
    assert!(client.is_authenticated());

    client.logout().await.unwrap();
    assert!(!client.is_authenticated());
    assert!(matches!(client.refresh().await, Err(ClientError::NoSession)));

    // The refresh token from before logout is dead
    client.set_session(Some(Session {
        access_token: "stale".into(),
        refresh_token: before,
        user,
    }));
    assert!(matches!(client.refresh().await, Err(ClientError::Unauthorized(_))));
    assert!(!client.is_authenticated());
}

#[tokio::test]
async fn unauthorized_clears_the_session() {
    let client = ApiClient::new(&spawn_server().await);
    let user = client
        .register("Ada", "ada@example.com", "Secret123")
        .await
        .unwrap();

    client.set_session(Some(Session {
        access_token: "not-a-token".into(),
        refresh_token: "also-not".into(),
        user,
    }));
    let err = client.me().await.unwrap_err();
    assert!(matches!(err, ClientError::Unauthorized(ref m) if m == "Invalid or expired token"));
    assert!(client.session().is_none());
}

#[tokio::test]
async fn api_errors_carry_the_envelope() {
    let client = ApiClient::new(&spawn_server().await);
    client
        .register("Ada", "ada@example.com", "Secret123")
        .await
        .unwrap();

    let err = client
        .create_task(&NewTask::titled("No"))
        .await
        .unwrap_err();
    match err {
        ClientError::Api {
            status,
            error,
            message,
        } => {
            assert_eq!(status, 400);
            assert_eq!(error, "Validation Error");
            assert_eq!(message, "\"title\" length must be at least 3 characters long");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(client.is_authenticated());
}

#[tokio::test]
async fn tasks_and_notifications() {
    let client = ApiClient::new(&spawn_server().await);
    client
        .register("Ada", "ada@example.com", "Secret123")
        .await
        .unwrap();

    let task = client
        .create_task(&NewTask {
            points: Some(150),
            ..NewTask::titled("Finish the course")
        })
        .await
        .unwrap();
    let page = client.list_tasks(1, 20).await.unwrap();
    assert_eq!(page.total, 1);

    let done = client.complete_task(&task.id).await.unwrap();
    assert_eq!(done.total_points, 150);
    assert_eq!(done.level, 2);
    assert_eq!(done.new_badges.len(), 2);

    let unread = client.list_notifications(true, 1).await.unwrap();
    assert_eq!(unread.total, 3);
    client
        .mark_notification_read(&unread.data[0].id)
        .await
        .unwrap();
    let unread = client.list_notifications(true, 1).await.unwrap();
    assert_eq!(unread.total, 2);
}

#[tokio::test]
async fn gateway_pushes_notifications() {
    let client = ApiClient::new(&spawn_server().await);
    client
        .register("Ada", "ada@example.com", "Secret123")
        .await
        .unwrap();

    let mut sub = client.subscribe(ReconnectPolicy::default()).unwrap();
    match next_event(&mut sub).await {
        GatewayEvent::Ready { user_id } => {
            assert_eq!(user_id, client.session().unwrap().user.id);
        }
        other => panic!("expected Ready, got {other:?}"),
    }

    let task = client.create_task(&NewTask::titled("Practice")).await.unwrap();
    client.complete_task(&task.id).await.unwrap();

    match next_event(&mut sub).await {
        GatewayEvent::Notification(n) => {
            assert_eq!(n.kind, NotificationKind::TaskCompleted);
            assert_eq!(n.metadata["taskId"], task.id.as_str());
        }
        other => panic!("expected a notification, got {other:?}"),
    }
    match next_event(&mut sub).await {
        GatewayEvent::Notification(n) => assert_eq!(n.kind, NotificationKind::BadgeEarned),
        other => panic!("expected a badge notification, got {other:?}"),
    }
    sub.close();
}

#[tokio::test]
async fn gateway_rejects_bad_tokens_without_retrying() {
    let base = spawn_server().await;
    let ws = ApiClient::new(&base).gateway_url();
    let policy = ReconnectPolicy {
        max_attempts: 5,
        delay: Duration::from_secs(10),
    };

    // A 401 ends the subscription immediately instead of waiting out retries
    let mut sub = quest_client::subscribe_notifications(&ws, "garbage", policy);
    let ended = tokio::time::timeout(Duration::from_secs(5), sub.next()).await;
    assert!(matches!(ended, Ok(None)));
}
