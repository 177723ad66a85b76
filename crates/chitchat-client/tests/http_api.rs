//! `HttpApi` against a mock backend.
//!
//! Covers request shapes (form-encoded login, bearer header, JSON bodies) and
//! the status → `ClientError` mapping.

use std::time::Duration;

use chitchat_client::{BearerAuth, ChatApi, ClientError, HttpApi};
use chitchat_types::{ChatId, ChatType, Credentials, NewChat, NewMessage, SignupRequest, SignupResponse, UserId};
use reqwest::Url;
use serde_json::json;
use wiremock::matchers::{body_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn api(server: &MockServer, token: Option<&str>) -> HttpApi {
    let auth = BearerAuth::new();
    if let Some(token) = token {
        auth.set(token);
    }
    let base = Url::parse(&format!("{}/api", server.uri())).unwrap();
    HttpApi::new(base, auth, Duration::from_secs(2)).unwrap()
}

fn user_json(id: i64, name: &str) -> serde_json::Value {
    json!({"id": id, "email": format!("{}@example.com", name.to_lowercase()), "full_name": name})
}

#[tokio::test]
async fn login_posts_form_and_returns_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/token"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string_contains("username=a%40b.com"))
        .and(body_string_contains("password=x"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "jwt", "token_type": "bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let token = api(&server, None)
        .await
        .login(&Credentials::new("a@b.com", "x"))
        .await
        .unwrap();
    assert_eq!(token.access_token, "jwt");
}

#[tokio::test]
async fn bad_password_is_auth_rejected_with_detail() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/token"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"detail": "Incorrect email or password"})),
        )
        .mount(&server)
        .await;

    let err = api(&server, None)
        .await
        .login(&Credentials::new("a@b.com", "nope"))
        .await
        .unwrap_err();
    assert_eq!(err, ClientError::AuthRejected("Incorrect email or password".into()));
}

#[tokio::test]
async fn current_user_uses_explicit_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/users/me"))
        .and(header("authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(user_json(1, "Amy")))
        .mount(&server)
        .await;

    // The shared header holds a different token; the explicit one wins.
    let me = api(&server, Some("stale")).await.current_user("fresh").await.unwrap();
    assert_eq!(me.id, UserId::new(1));
    assert_eq!(me.display_name(), "Amy");
}

#[tokio::test]
async fn signup_may_return_created_user() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/signup"))
        .and(body_json(json!({"email": "bo@example.com", "password": "pw", "full_name": "Bo"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(user_json(9, "Bo")))
        .mount(&server)
        .await;

    let response = api(&server, None)
        .await
        .signup(&SignupRequest {
            email: "bo@example.com".into(),
            password: "pw".into(),
            full_name: "Bo".into(),
        })
        .await
        .unwrap();
    assert!(matches!(response, SignupResponse::Created(user) if user.id == UserId::new(9)));
}

#[tokio::test]
async fn chat_list_and_detail() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/chats/"))
        .and(header("authorization", "Bearer tok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 4, "name": null, "type": "one_on_one", "participants": []},
            {"id": 5, "name": "Team", "type": "group", "participants": []}
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/chats/4"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 4, "name": null, "type": "one_on_one",
            "participants": [{"user_id": 1, "user": user_json(1, "Amy")}],
            "messages": [{
                "id": 11, "chat_id": 4, "sender_id": 1, "content": "hi",
                "timestamp": "2024-05-01T10:00:00", "is_bot_message": false
            }]
        })))
        .mount(&server)
        .await;

    let api = api(&server, Some("tok")).await;
    let chats = api.chats().await.unwrap();
    assert_eq!(chats.len(), 2);
    assert_eq!(chats[1].chat_type, ChatType::Group);

    let detail = api.chat(ChatId::new(4)).await.unwrap();
    assert_eq!(detail.messages.len(), 1);
    assert!(detail.has_participant(UserId::new(1)));
}

#[tokio::test]
async fn create_chat_and_send_message_bodies() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chats/"))
        .and(body_json(json!({"name": "Team", "type": "group", "participant_ids": [2, 3]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 7, "name": "Team", "type": "group", "participants": []
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/chats/7/messages"))
        .and(body_json(json!({"content": "hello"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 12, "chat_id": 7, "sender_id": 1, "content": "hello",
            "timestamp": "2024-05-01T10:00:00Z", "is_bot_message": false
        })))
        .expect(1)
        .mount(&server)
        .await;

    let api = api(&server, Some("tok")).await;
    let chat = api
        .create_chat(&NewChat {
            name: Some("Team".into()),
            chat_type: ChatType::Group,
            participant_ids: vec![UserId::new(2), UserId::new(3)],
        })
        .await
        .unwrap();
    assert_eq!(chat.id, ChatId::new(7));

    let sent = api
        .send_message(chat.id, &NewMessage { content: "hello".into() })
        .await
        .unwrap();
    assert_eq!(sent.content, "hello");
}

#[tokio::test]
async fn error_statuses_map_to_taxonomy() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/chats/99"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"detail": "Chat not found"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/users/contacts"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/chats/"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"detail": "Could not validate credentials"})))
        .mount(&server)
        .await;

    let api = api(&server, Some("tok")).await;
    assert_eq!(
        api.chat(ChatId::new(99)).await.unwrap_err(),
        ClientError::Api { status: 404, detail: "Chat not found".into() }
    );
    assert_eq!(
        api.contacts().await.unwrap_err(),
        ClientError::Api { status: 500, detail: "Internal Server Error".into() }
    );
    assert!(matches!(api.chats().await.unwrap_err(), ClientError::AuthRejected(_)));
}

#[tokio::test]
async fn slow_server_is_network_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/chats/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let base = Url::parse(&format!("{}/api/", server.uri())).unwrap();
    let auth = BearerAuth::new();
    auth.set("tok");
    let api = HttpApi::new(base, auth, Duration::from_millis(200)).unwrap();

    let err = api.chats().await.unwrap_err();
    assert!(err.is_retryable(), "{err:?}");
}

#[tokio::test]
async fn unreachable_server_is_network_failure() {
    let base = Url::parse("http://127.0.0.1:9/api/").unwrap();
    let api = HttpApi::new(base, BearerAuth::new(), Duration::from_secs(2)).unwrap();
    let err = api.login(&Credentials::new("a@b.com", "x")).await.unwrap_err();
    assert!(matches!(err, ClientError::NetworkFailure(_)));
}
