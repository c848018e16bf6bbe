use serde_json::{Value, json};
use tokio_test::{assert_err, assert_ok};
use was_client::{ClientError, ReqwestTransport, list_apps};
use was_core::backend::{BackendClient, BackendError, Operation};
use was_core::protocol::GameRecord;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

fn backend(server: &MockServer) -> BackendClient<ReqwestTransport> {
    let base = format!("{}/data/golf", server.uri());
    BackendClient::new(ReqwestTransport::new(&base).unwrap())
}

fn has_creation_date(request: &Request) -> bool {
    serde_json::from_slice::<Value>(&request.body)
        .map(|body| body["creationDate"].is_string())
        .unwrap_or(false)
}

#[tokio::test]
async fn existence_follows_the_status_code() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data/golf/user/alice"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "creationDate": "x" })))
        .mount(&server)
        .await;
    // Anything else is answered 404 by the mock server.

    let backend = backend(&server);
    assert!(assert_ok!(backend.user_exists("alice").await));
    assert!(!assert_ok!(backend.user_exists("bob").await));
    assert!(!assert_ok!(backend.invite_exists("alice").await));
}

#[tokio::test]
async fn names_travel_percent_encoded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data/golf/user/J%C3%B6el%20M"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "creationDate": "x" })))
        .expect(1)
        .mount(&server)
        .await;

    assert!(assert_ok!(backend(&server).user_exists("Jöel M").await));
}

#[tokio::test]
async fn create_user_posts_a_creation_stamp() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/data/golf/user/alice"))
        .and(has_creation_date)
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "message": "ok" })))
        .expect(1)
        .mount(&server)
        .await;

    assert_ok!(backend(&server).create_user("alice").await);
}

#[tokio::test]
async fn failed_creation_is_a_request_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/data/golf/game-invites/bob"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = assert_err!(backend(&server).create_invite("bob").await);
    assert!(matches!(
        err,
        BackendError::Request {
            op: Operation::CreateInvite,
            status: 500,
            ..
        }
    ));
}

#[tokio::test]
async fn game_record_is_posted_verbatim() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/data/golf/game/bob"))
        .and(body_json(json!({ "players": ["alice", "bob"], "hole": 1 })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let mut state = serde_json::Map::new();
    state.insert("hole".to_string(), json!(1));
    let game = GameRecord::new("alice", "bob", state);
    assert_ok!(backend(&server).create_game("bob", &game).await);
}

#[tokio::test]
async fn game_listing_finds_the_users_game() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data/golf/game/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "g0": { "players": ["carol", "dave"] },
            "g1": { "players": ["alice", "bob"], "turn": "alice" },
        })))
        .mount(&server)
        .await;

    let backend = backend(&server);
    assert_eq!(
        assert_ok!(backend.active_game_for("bob").await).as_deref(),
        Some("g1")
    );
    assert_eq!(assert_ok!(backend.active_game_for("erin").await), None);
}

#[tokio::test]
async fn missing_game_directory_means_no_game() {
    let server = MockServer::start().await;
    assert_eq!(assert_ok!(backend(&server).active_game_for("bob").await), None);
}

#[tokio::test]
async fn unparseable_listing_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data/golf/game-invites/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let err = assert_err!(backend(&server).list_invites().await);
    assert!(matches!(err, BackendError::Malformed { op: Operation::ListInvites, .. }));
}

#[tokio::test]
async fn delete_of_a_missing_invite_fails() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/data/golf/game-invites/bob"))
        .respond_with(ResponseTemplate::new(200))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    let backend = backend(&server);
    assert_ok!(backend.delete_invite("bob").await);
    // The second joiner loses the race.
    let err = assert_err!(backend.delete_invite("bob").await);
    assert_eq!(err.status(), Some(404));
}

#[tokio::test]
async fn unreachable_server_is_a_transport_error() {
    // Nothing listens on port 1.
    let transport = ReqwestTransport::new("http://127.0.0.1:1/data/golf").unwrap();
    let backend = BackendClient::new(transport);
    let err = assert_err!(backend.user_exists("alice").await);
    assert!(matches!(err, BackendError::Transport(_)));
}

#[tokio::test]
async fn lists_hosted_apps() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/service/apps"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Golf_distance": { "path": "Golf_distance", "name": "Golf distance" },
        })))
        .mount(&server)
        .await;

    let apps = assert_ok!(list_apps(&server.uri()).await);
    assert_eq!(apps.len(), 1);
    assert_eq!(apps["Golf_distance"].name, "Golf distance");
}

#[tokio::test]
async fn app_listing_failure_is_reported() {
    let server = MockServer::start().await;
    let err = assert_err!(list_apps(&server.uri()).await);
    assert!(matches!(
        err,
        ClientError::Backend(BackendError::Request {
            op: Operation::ListApps,
            status: 404,
            ..
        })
    ));
}
