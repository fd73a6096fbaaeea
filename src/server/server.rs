use anyhow::Result;
use std::{
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use tracing::{debug, error, info};

use crate::notifications::{
    CreateNotificationRequest, NotificationEngine, NotificationError, NotificationPatch,
};
use crate::user::auth::AuthTokenValue;
use crate::user::{UserManager, UserStore};
use axum_extra::extract::cookie::{Cookie, SameSite};

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{response, HeaderValue, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::websocket::handler::ws_handler;
use super::websocket::ConnectionManager;
use super::{log_requests, metrics, session, state::*, RequestsLoggingLevel, ServerConfig};
use crate::server::session::Session;

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub hash: String,
    pub session_token: Option<String>,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

#[derive(Deserialize, Debug)]
struct LoginBody {
    pub user_handle: String,
    pub password: String,
}

#[derive(Serialize)]
struct LoginSuccessResponse {
    token: String,
}

fn default_page_limit() -> usize {
    20
}

#[derive(Deserialize, Debug)]
struct PageQuery {
    #[serde(default)]
    pub page: usize,
    #[serde(default = "default_page_limit")]
    pub limit: usize,
}

#[derive(Serialize)]
struct CountResponse {
    count: usize,
}

/// Maps engine errors onto HTTP statuses. Persistence failures are logged
/// here so handlers stay terse.
fn engine_error_response(err: NotificationError, endpoint: &'static str) -> Response {
    match err {
        NotificationError::Validation(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
        NotificationError::NotFound => StatusCode::NOT_FOUND.into_response(),
        NotificationError::Persistence(source) => {
            error!("Storage failure on {}: {:#}", endpoint, source);
            metrics::record_error("persistence", endpoint);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn home(session: Option<Session>, State(state): State<ServerState>) -> impl IntoResponse {
    let stats = ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        hash: state.hash.clone(),
        session_token: session.map(|s| s.token),
    };
    Json(stats)
}

async fn login(
    State(user_manager): State<GuardedUserManager>,
    Json(body): Json<LoginBody>,
) -> Response {
    debug!("login() called for user {}", body.user_handle);
    let start = Instant::now();
    let locked_manager = user_manager.lock().unwrap();

    if let Ok(Some(credentials)) = locked_manager.get_user_credentials(&body.user_handle) {
        if let Some(password_credentials) = &credentials.username_password {
            if let Ok(true) = password_credentials.hasher.verify(
                &body.password,
                &password_credentials.hash,
                &password_credentials.salt,
            ) {
                return match locked_manager.generate_auth_token(&credentials) {
                    Ok(auth_token) => {
                        metrics::record_login_attempt("success", start.elapsed());
                        let response_body = LoginSuccessResponse {
                            token: auth_token.value.0.clone(),
                        };
                        let response_body = serde_json::to_string(&response_body).unwrap();

                        let cookie_value = HeaderValue::from_str(&format!(
                            "session_token={}; Path=/; HttpOnly",
                            auth_token.value.0
                        ))
                        .unwrap();
                        response::Builder::new()
                            .status(StatusCode::CREATED)
                            .header(axum::http::header::SET_COOKIE, cookie_value)
                            .body(Body::from(response_body))
                            .unwrap()
                    }
                    Err(err) => {
                        error!("Error with auth token generation: {}", err);
                        StatusCode::INTERNAL_SERVER_ERROR.into_response()
                    }
                };
            }
        }
    }
    metrics::record_login_attempt("failure", start.elapsed());
    StatusCode::FORBIDDEN.into_response()
}

async fn logout(State(user_manager): State<GuardedUserManager>, session: Session) -> Response {
    let locked_manager = user_manager.lock().unwrap();
    match locked_manager.delete_auth_token(&session.user_id, &AuthTokenValue(session.token)) {
        Ok(()) => {
            let cookie_value = Cookie::build(Cookie::new(session::COOKIE_SESSION_TOKEN_KEY, ""))
                .path("/")
                .expires(time::OffsetDateTime::now_utc() - time::Duration::days(1)) // Expire it in the past
                .same_site(SameSite::Lax)
                .build();

            response::Builder::new()
                .status(StatusCode::OK)
                .header(axum::http::header::SET_COOKIE, cookie_value.to_string())
                .body(Body::empty())
                .unwrap()
        }
        Err(_) => StatusCode::BAD_REQUEST.into_response(),
    }
}

async fn create_notification(
    session: Session,
    State(engine): State<GuardedNotificationEngine>,
    Json(body): Json<CreateNotificationRequest>,
) -> Response {
    match engine.create(session.user_id, body).await {
        Ok(notification) => (StatusCode::CREATED, Json(notification)).into_response(),
        Err(err) => engine_error_response(err, "create_notification"),
    }
}

async fn list_notifications(
    session: Session,
    State(engine): State<GuardedNotificationEngine>,
    Query(query): Query<PageQuery>,
) -> Response {
    match engine.find_all_for_user(session.user_id, query.page, query.limit) {
        Ok(page) => Json(page).into_response(),
        Err(err) => engine_error_response(err, "list_notifications"),
    }
}

async fn get_notification(
    session: Session,
    State(engine): State<GuardedNotificationEngine>,
    Path(id): Path<String>,
) -> Response {
    match engine.find_one(&id, session.user_id) {
        Ok(notification) => Json(notification).into_response(),
        Err(err) => engine_error_response(err, "get_notification"),
    }
}

async fn put_notification(
    session: Session,
    State(engine): State<GuardedNotificationEngine>,
    Path(id): Path<String>,
    Json(patch): Json<NotificationPatch>,
) -> Response {
    match engine.update(&id, session.user_id, patch).await {
        Ok(notification) => Json(notification).into_response(),
        Err(err) => engine_error_response(err, "put_notification"),
    }
}

async fn read_notification(
    session: Session,
    State(engine): State<GuardedNotificationEngine>,
    Path(id): Path<String>,
) -> Response {
    match engine.mark_as_read(&id, session.user_id) {
        Ok(notification) => Json(notification).into_response(),
        Err(err) => engine_error_response(err, "read_notification"),
    }
}

async fn read_all_notifications(
    session: Session,
    State(engine): State<GuardedNotificationEngine>,
) -> Response {
    match engine.mark_all_as_read(session.user_id) {
        Ok(count) => Json(CountResponse { count }).into_response(),
        Err(err) => engine_error_response(err, "read_all_notifications"),
    }
}

async fn unread_count(
    session: Session,
    State(engine): State<GuardedNotificationEngine>,
) -> Response {
    match engine.get_unread_count(session.user_id) {
        Ok(count) => Json(CountResponse { count }).into_response(),
        Err(err) => engine_error_response(err, "unread_count"),
    }
}

async fn delete_notification(
    session: Session,
    State(engine): State<GuardedNotificationEngine>,
    Path(id): Path<String>,
) -> Response {
    match engine.remove(&id, session.user_id) {
        Ok(()) => StatusCode::OK.into_response(),
        Err(err) => engine_error_response(err, "delete_notification"),
    }
}

async fn delete_all_notifications(
    session: Session,
    State(engine): State<GuardedNotificationEngine>,
) -> Response {
    match engine.remove_all_for_user(session.user_id) {
        Ok(count) => Json(CountResponse { count }).into_response(),
        Err(err) => engine_error_response(err, "delete_all_notifications"),
    }
}

impl ServerState {
    fn new(
        config: ServerConfig,
        user_manager: UserManager,
        notification_engine: Arc<NotificationEngine>,
        connection_manager: Arc<ConnectionManager>,
    ) -> ServerState {
        ServerState {
            config,
            start_time: Instant::now(),
            user_manager: Arc::new(Mutex::new(user_manager)),
            notification_engine,
            ws_connection_manager: connection_manager,
            hash: env!("GIT_HASH").to_owned(),
        }
    }
}

pub fn make_app(
    config: ServerConfig,
    user_store: Box<dyn UserStore>,
    notification_engine: Arc<NotificationEngine>,
    connection_manager: Arc<ConnectionManager>,
) -> Result<Router> {
    let user_manager = UserManager::new(user_store);
    let state = ServerState::new(config, user_manager, notification_engine, connection_manager);

    let auth_routes: Router = Router::new()
        .route("/login", post(login))
        .route("/logout", get(logout))
        .with_state(state.clone());

    let notification_routes: Router = Router::new()
        .route("/", post(create_notification))
        .route("/", get(list_notifications))
        .route("/", delete(delete_all_notifications))
        .route("/unread_count", get(unread_count))
        .route("/read_all", post(read_all_notifications))
        .route("/{id}", get(get_notification))
        .route("/{id}", put(put_notification))
        .route("/{id}", delete(delete_notification))
        .route("/{id}/read", post(read_notification))
        .with_state(state.clone());

    let ws_routes: Router = Router::new()
        .route("/ws", get(ws_handler))
        .with_state(state.clone());

    let home_router: Router = Router::new().route("/", get(home)).with_state(state.clone());

    #[allow(unused_mut)]
    let mut app: Router = home_router
        .nest("/v1/auth", auth_routes)
        .nest("/v1/notifications", notification_routes)
        .nest("/v1", ws_routes);

    #[cfg(feature = "slowdown")]
    {
        app = app.layer(middleware::from_fn(super::slowdown_request));
    }
    app = app.layer(middleware::from_fn_with_state(state.clone(), log_requests));

    Ok(app)
}

#[allow(clippy::too_many_arguments)]
pub async fn run_server(
    user_store: Box<dyn UserStore>,
    notification_engine: Arc<NotificationEngine>,
    connection_manager: Arc<ConnectionManager>,
    requests_logging_level: RequestsLoggingLevel,
    port: u16,
    metrics_port: u16,
) -> Result<()> {
    let config = ServerConfig {
        port,
        requests_logging_level,
    };
    let app = make_app(config, user_store, notification_engine, connection_manager)?;

    let metrics_app: Router = Router::new().route("/metrics", get(metrics::metrics_handler));
    let metrics_listener =
        tokio::net::TcpListener::bind(format!("127.0.0.1:{}", metrics_port)).await?;
    tokio::spawn(async move {
        if let Err(err) = axum::serve(metrics_listener, metrics_app).await {
            error!("Metrics server failed: {}", err);
        }
    });

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    info!("Listening on port {}", port);

    Ok(axum::serve(listener, app).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::{ScheduleManager, SqliteNotificationStore};
    use crate::user::auth::{AuthToken, AuthTokenValue, UserAuthCredentials};
    use crate::user::{UserAuthCredentialsStore, UserAuthTokenStore};
    use axum::{body::Body, http::Request};
    use tower::ServiceExt;

    #[derive(Default)]
    struct InMemoryUserStore {}

    impl UserStore for InMemoryUserStore {
        fn create_user(&self, _user_handle: &str) -> Result<usize> {
            Ok(1)
        }

        fn get_user_handle(&self, _user_id: usize) -> Result<Option<String>> {
            Ok(None)
        }

        fn get_user_id(&self, _user_handle: &str) -> Result<Option<usize>> {
            Ok(None)
        }

        fn get_all_user_handles(&self) -> Result<Vec<String>> {
            Ok(vec![])
        }
    }

    impl UserAuthTokenStore for InMemoryUserStore {
        fn get_user_auth_token(&self, _token: &AuthTokenValue) -> Result<Option<AuthToken>> {
            Ok(None)
        }

        fn delete_user_auth_token(&self, _token: &AuthTokenValue) -> Result<Option<AuthToken>> {
            Ok(None)
        }

        fn update_user_auth_token_last_used_timestamp(
            &self,
            _token: &AuthTokenValue,
        ) -> Result<()> {
            Ok(())
        }

        fn add_user_auth_token(&self, _token: AuthToken) -> Result<()> {
            Ok(())
        }
    }

    impl UserAuthCredentialsStore for InMemoryUserStore {
        fn get_user_auth_credentials(
            &self,
            _user_handle: &str,
        ) -> Result<Option<UserAuthCredentials>> {
            Ok(None)
        }

        fn update_user_auth_credentials(&self, _credentials: UserAuthCredentials) -> Result<()> {
            Ok(())
        }
    }

    fn test_app() -> (tempfile::TempDir, Router) {
        let dir = tempfile::tempdir().unwrap();
        let store =
            Arc::new(SqliteNotificationStore::new(dir.path().join("notifications.db")).unwrap());
        let connection_manager = Arc::new(ConnectionManager::new());
        let engine = Arc::new(NotificationEngine::new(
            store,
            Arc::new(ScheduleManager::new()),
            connection_manager.clone(),
        ));
        let app = make_app(
            ServerConfig {
                requests_logging_level: RequestsLoggingLevel::None,
                ..ServerConfig::default()
            },
            Box::new(InMemoryUserStore::default()),
            engine,
            connection_manager,
        )
        .unwrap();
        (dir, app)
    }

    #[tokio::test]
    async fn responds_forbidden_on_protected_routes() {
        let (_dir, app) = test_app();

        let protected_routes = vec![
            "/v1/auth/logout",
            "/v1/notifications",
            "/v1/notifications/unread_count",
            "/v1/notifications/some-id",
            "/v1/ws",
        ];

        for route in protected_routes.into_iter() {
            let request = Request::builder().uri(route).body(Body::empty()).unwrap();
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(
                response.status(),
                StatusCode::FORBIDDEN,
                "route {} should be protected",
                route
            );
        }
    }

    #[tokio::test]
    async fn home_works_without_session() {
        let (_dir, app) = test_app();

        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn login_with_unknown_user_is_forbidden() {
        let (_dir, app) = test_app();

        let request = Request::builder()
            .method("POST")
            .uri("/v1/auth/login")
            .header("content-type", "application/json")
            .body(Body::from(
                r#"{"user_handle":"ghost","password":"nope"}"#,
            ))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
