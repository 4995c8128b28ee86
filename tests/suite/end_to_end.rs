//! Full turns against a mock OpenRouter endpoint.

use procoder_engine::{Role, ScriptedPrompter, Settings};
use procoder_providers::OpenRouterClient;
use serde_json::Value;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{Workspace, sse_response};

fn client(server: &MockServer) -> OpenRouterClient {
    OpenRouterClient::new(Some("sk-test".into()), "test/model")
        .expect("client with key")
        .with_base_url(server.uri())
}

#[tokio::test]
async fn streamed_reply_edits_the_loaded_file() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(sse_response(&[
            "Here is the fix:\n```python filename=\"app.py\"\n",
            "print(2)\n",
            "```\n",
        ]))
        .expect(1)
        .mount(&server)
        .await;

    let ws = Workspace::new();
    let mut session = ws.session(&[("app.py", "print(1)\n")], Settings::default());
    assert!(session.begin_turn("make it print 2"));

    let mut streamed = String::new();
    let response = client(&server)
        .stream_chat(session.messages(), |chunk| streamed.push_str(chunk))
        .await
        .expect("stream completes");
    assert_eq!(streamed, response);

    let mut prompter = ScriptedPrompter::new(["y"]);
    let report = session.finish_turn(&response, &mut prompter);

    assert_eq!(report.applied, [ws.path("app.py")]);
    assert_eq!(ws.read("app.py"), "print(2)\n");
    assert_eq!(ws.read("app.py.bak"), "print(1)\n");
    assert_eq!(
        session.messages().last().map(|m| m.role),
        Some(Role::Assistant)
    );

    let requests = server.received_requests().await.expect("recording enabled");
    let body: Value = serde_json::from_slice(&requests[0].body).expect("json body");
    let messages = body["messages"].as_array().expect("messages array");
    assert_eq!(messages[0]["role"], "system");
    assert!(
        messages
            .iter()
            .any(|m| m["content"].as_str().is_some_and(|c| c.contains("--- File: app.py ---")))
    );
    assert_eq!(messages.last().map(|m| &m["content"]), Some(&Value::from("make it print 2")));
}

#[tokio::test]
async fn failed_request_drops_the_pending_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
        .mount(&server)
        .await;

    let ws = Workspace::new();
    let mut session = ws.session(&[("app.py", "print(1)\n")], Settings::default());
    assert!(session.begin_turn("hello"));

    let err = client(&server)
        .stream_chat(session.messages(), |_| {})
        .await
        .expect_err("401 is an error");
    assert!(err.hint().is_some());

    session.abandon_turn();

    assert!(session.messages().iter().all(|m| m.role != Role::User));
    assert_eq!(ws.read("app.py"), "print(1)\n");
}

#[test]
fn missing_key_is_reported_before_any_request() {
    let err = OpenRouterClient::new(None, "test/model").expect_err("no key");
    assert!(err.hint().is_some_and(|h| h.contains("openrouter_key")));
}
