use super::*;
use axum::Router;
use axum::http::StatusCode;
use axum::routing::{get, post};
use salon::storage::{MemoryStorage, TOKEN_KEY, USER_KEY};

#[test]
fn parses_master_create_with_russian_sex_label() {
    let cli = Cli::try_parse_from([
        "salon-cli",
        "masters",
        "create",
        "--name",
        "X",
        "--sex",
        "Женский",
        "--phone",
        "+7 900 000-00-01",
        "--experience",
        "2",
        "--specialty",
        "Y",
    ])
    .unwrap();
    let Command::Masters(MastersCommand { command: MastersSubcommand::Create { sex, experience, .. } }) = cli.command
    else {
        panic!("expected masters create");
    };
    assert_eq!(sex, Sex::Female);
    assert_eq!(experience, 2);
}

#[test]
fn rejects_unknown_sex_label() {
    let parsed = Cli::try_parse_from([
        "salon-cli", "masters", "create", "--name", "X", "--sex", "other", "--phone", "1", "--specialty", "Y",
    ]);
    assert!(parsed.is_err());
}

#[test]
fn base_url_flag_overrides() {
    let cli = Cli::try_parse_from(["salon-cli", "--base-url", "http://salon.test/api", "whoami"]).unwrap();
    assert_eq!(cli.base_url.as_deref(), Some("http://salon.test/api"));
    assert!(matches!(cli.command, Command::Whoami));
}

#[test]
fn only_resource_commands_use_session() {
    let list = Cli::try_parse_from(["salon-cli", "services", "list"]).unwrap();
    assert!(list.command.uses_session());
    let booking = Cli::try_parse_from(["salon-cli", "booking", "list"]).unwrap();
    assert!(!booking.command.uses_session());
    let theme = Cli::try_parse_from(["salon-cli", "theme", "toggle"]).unwrap();
    assert!(!theme.command.uses_session());
}

#[test]
fn delete_requires_uuid() {
    assert!(Cli::try_parse_from(["salon-cli", "appointments", "delete", "42"]).is_err());
    let id = Uuid::new_v4().to_string();
    assert!(Cli::try_parse_from(["salon-cli", "appointments", "delete", id.as_str()]).is_ok());
}

// =============================================================================
// execute
// =============================================================================

/// Backend that rejects every token and every login.
async fn rejecting_backend() -> String {
    let unauthorized = || async { (StatusCode::UNAUTHORIZED, axum::Json(serde_json::json!({ "detail": "Not authenticated" }))) };
    let app = Router::new()
        .route("/api/master/", get(unauthorized))
        .route("/api/users/login/", post(unauthorized));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/api")
}

fn logged_in_context(base_url: &str) -> (CliContext, Arc<MemoryStorage>) {
    let storage = Arc::new(MemoryStorage::new());
    storage.set(TOKEN_KEY, "tok123").unwrap();
    storage.set(USER_KEY, r#"{"email":"admin@salon.test"}"#).unwrap();
    let config = ClientConfig::default().with_api_url(base_url);
    let session = Arc::new(SessionStore::restore(storage.clone()).unwrap());
    let api = ApiClient::new(&config, session).unwrap();
    (CliContext { config, storage: storage.clone(), api }, storage)
}

#[tokio::test]
async fn resource_command_with_rejected_token_logs_out() {
    let base_url = rejecting_backend().await;
    let (ctx, storage) = logged_in_context(&base_url);

    let result = execute(&ctx, Command::Masters(MastersCommand { command: MastersSubcommand::List })).await;

    assert!(matches!(result, Err(CliError::SessionExpired)));
    assert!(!ctx.api.session().is_authenticated());
    assert_eq!(storage.get(TOKEN_KEY).unwrap(), None);
    assert_eq!(storage.get(USER_KEY).unwrap(), None);
}

#[tokio::test]
async fn rejected_login_keeps_stored_session() {
    let base_url = rejecting_backend().await;
    let (ctx, storage) = logged_in_context(&base_url);

    let command = Command::Login { email: "admin@salon.test".into(), password: "wrong".into() };
    let err = execute(&ctx, command).await.unwrap_err();

    assert_eq!(err.to_string(), "invalid email or password");
    assert!(ctx.api.session().is_authenticated());
    assert_eq!(storage.get(TOKEN_KEY).unwrap().as_deref(), Some("tok123"));
}

#[test]
fn errors_render_for_humans() {
    assert_eq!(CliError::from(ApiError::AuthFailed).to_string(), "invalid email or password");
    assert_eq!(CliError::SessionExpired.to_string(), "session expired; logged out");
    assert_eq!(CliError::NotLoggedIn.to_string(), "not logged in; run `salon-cli login` first");
}
