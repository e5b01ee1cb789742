use std::sync::{Arc, Mutex};
use std::time::Duration;

use efficiency_ai::clipboard::ClipboardSink;
use efficiency_ai::{ActionController, GenerationError, OpenAiPlanner, Phase, PlannerConfig};
use serde_json::{json, Value};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const COMPLETIONS_PATH: &str = "/v1/chat/completions";

#[derive(Default)]
struct RecordingClipboard {
    writes: Mutex<Vec<String>>,
}

impl ClipboardSink for RecordingClipboard {
    fn set_text(&self, text: &str) -> anyhow::Result<()> {
        self.writes.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

fn config_for(server: &MockServer, timeout: Duration) -> PlannerConfig {
    PlannerConfig {
        api_url: format!("{}{}", server.uri(), COMPLETIONS_PATH),
        model: "gpt-3.5-turbo".to_string(),
        temperature: 0.7,
        timeout,
    }
}

fn controller_for(config: PlannerConfig) -> (ActionController, Arc<RecordingClipboard>) {
    let clipboard = Arc::new(RecordingClipboard::default());
    let controller = ActionController::new(Arc::new(OpenAiPlanner::new(config)), clipboard.clone());
    (controller, clipboard)
}

fn plan_body(text: &str) -> Value {
    json!({
        "id": "chatcmpl-123",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": text},
            "finish_reason": "stop"
        }]
    })
}

#[test_log::test(tokio::test)]
async fn test_successful_generation_sets_plan() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .and(header("authorization", "Bearer sk-valid"))
        .and(header("content-type", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(plan_body("Week 1: ...")))
        .expect(1)
        .mount(&server)
        .await;

    let (controller, _) = controller_for(config_for(&server, Duration::from_secs(5)));
    controller.update_goal("Learn Python in 30 days");
    controller.update_credential("sk-valid");

    let plan = controller.generate().await.expect("generation should succeed");
    assert_eq!(plan, "Week 1: ...");

    let view = controller.snapshot();
    assert_eq!(view.plan.as_deref(), Some("Week 1: ..."));
    assert!(view.error.is_none());
    assert!(!view.is_busy);
    assert_eq!(view.phase, Phase::Succeeded);
}

#[tokio::test]
async fn test_outbound_payload_carries_objective() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(plan_body("Mile 1")))
        .mount(&server)
        .await;

    let (controller, _) = controller_for(config_for(&server, Duration::from_secs(5)));
    controller.update_goal("Run a marathon");
    controller.update_credential("sk-valid");
    controller.generate().await.unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();

    assert_eq!(body["model"], "gpt-3.5-turbo");
    assert_eq!(body["messages"].as_array().unwrap().len(), 2);
    assert_eq!(body["messages"][0]["role"], "system");
    assert!(body["messages"][0]["content"]
        .as_str()
        .unwrap()
        .contains("expert planner"));
    assert_eq!(body["messages"][1]["role"], "user");
    assert_eq!(
        body["messages"][1]["content"],
        "Create a detailed plan and schedule for this goal: Run a marathon"
    );
    assert!((body["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);

    // The credential only travels in the authorization header.
    assert!(!String::from_utf8_lossy(&requests[0].body).contains("sk-valid"));
}

#[tokio::test]
async fn test_missing_goal_never_reaches_service() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(plan_body("unused")))
        .expect(0)
        .mount(&server)
        .await;

    let (controller, _) = controller_for(config_for(&server, Duration::from_secs(5)));
    controller.update_goal("");
    controller.update_credential("sk-valid");

    assert_eq!(controller.generate().await, Err(GenerationError::Validation));
    let view = controller.snapshot();
    assert_eq!(
        view.error.as_deref(),
        Some("Please provide both a goal and your OpenAI API key.")
    );
    assert!(view.plan.is_none());
    assert!(!view.is_busy);
}

#[tokio::test]
async fn test_missing_credential_never_reaches_service() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(plan_body("unused")))
        .expect(0)
        .mount(&server)
        .await;

    let (controller, _) = controller_for(config_for(&server, Duration::from_secs(5)));
    controller.update_goal("Run a marathon");

    assert_eq!(controller.generate().await, Err(GenerationError::Validation));
    assert!(controller.snapshot().error.is_some());
}

#[tokio::test]
async fn test_service_reason_is_surfaced() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .and(header("authorization", "Bearer sk-bad"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {
                "message": "Invalid API key",
                "type": "invalid_request_error",
                "code": "invalid_api_key"
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (controller, _) = controller_for(config_for(&server, Duration::from_secs(5)));
    controller.update_goal("Run a marathon");
    controller.update_credential("sk-bad");

    let err = controller.generate().await.unwrap_err();
    assert_eq!(err, GenerationError::Upstream("Invalid API key".to_string()));

    let view = controller.snapshot();
    assert_eq!(view.error.as_deref(), Some("Invalid API key"));
    assert!(view.plan.is_none());
    assert!(!view.is_busy);
}

#[tokio::test]
async fn test_unparseable_failure_uses_generic_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("<html>Service Unavailable</html>"))
        .mount(&server)
        .await;

    let (controller, _) = controller_for(config_for(&server, Duration::from_secs(5)));
    controller.update_goal("Run a marathon");
    controller.update_credential("sk-valid");

    let _ = controller.generate().await;
    assert_eq!(
        controller.snapshot().error.as_deref(),
        Some("Failed to generate plan")
    );
}

#[tokio::test]
async fn test_success_without_choices_is_protocol_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    let (controller, _) = controller_for(config_for(&server, Duration::from_secs(5)));
    controller.update_goal("Run a marathon");
    controller.update_credential("sk-valid");

    assert_eq!(controller.generate().await, Err(GenerationError::Protocol));
    let view = controller.snapshot();
    assert!(view.error.is_some());
    assert!(view.plan.is_none());
}

#[tokio::test]
async fn test_empty_plan_text_is_protocol_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": ""}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (controller, _) = controller_for(config_for(&server, Duration::from_secs(5)));
    controller.update_goal("Run a marathon");
    controller.update_credential("sk-valid");

    assert_eq!(controller.generate().await, Err(GenerationError::Protocol));

    // Exactly one of plan/error is populated after the invocation.
    let view = controller.snapshot();
    assert!(view.plan.is_none());
    assert!(!view.error.unwrap().is_empty());
    assert_eq!(view.phase, Phase::Failed);
}

#[tokio::test]
async fn test_spaces_only_goal_is_sent_to_service() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(plan_body("Day 1: ...")))
        .expect(1)
        .mount(&server)
        .await;

    let (controller, _) = controller_for(config_for(&server, Duration::from_secs(5)));
    controller.update_goal("   ");
    controller.update_credential("sk-valid");

    assert_eq!(controller.generate().await.unwrap(), "Day 1: ...");

    let requests = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(
        body["messages"][1]["content"],
        "Create a detailed plan and schedule for this goal:    "
    );
}

#[tokio::test]
async fn test_slow_service_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(plan_body("too late"))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let (controller, _) = controller_for(config_for(&server, Duration::from_millis(100)));
    controller.update_goal("Run a marathon");
    controller.update_credential("sk-valid");

    let err = controller.generate().await.unwrap_err();
    assert!(matches!(err, GenerationError::Transport(_)));
    assert!(err.to_string().contains("timed out"));
    assert!(!controller.is_busy());
}

#[tokio::test]
async fn test_unreachable_service_is_transport_error() {
    let config = PlannerConfig {
        api_url: "http://127.0.0.1:9/v1/chat/completions".to_string(),
        model: "gpt-3.5-turbo".to_string(),
        temperature: 0.7,
        timeout: Duration::from_secs(5),
    };
    let (controller, _) = controller_for(config);
    controller.update_goal("Run a marathon");
    controller.update_credential("sk-valid");

    let err = controller.generate().await.unwrap_err();
    assert!(matches!(err, GenerationError::Transport(_)));
    let message = controller.snapshot().error.unwrap();
    assert!(!message.is_empty());
    assert!(!message.contains("sk-valid"));
}

#[tokio::test]
async fn test_new_invocation_clears_previous_outcome() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("authorization", "Bearer sk-bad"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": {"message": "Invalid API key"}})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(header("authorization", "Bearer sk-valid"))
        .respond_with(ResponseTemplate::new(200).set_body_json(plan_body("Week 1: ...")))
        .mount(&server)
        .await;

    let (controller, _) = controller_for(config_for(&server, Duration::from_secs(5)));
    controller.update_goal("Learn Python in 30 days");
    controller.update_credential("sk-bad");
    let _ = controller.generate().await;
    assert_eq!(controller.snapshot().error.as_deref(), Some("Invalid API key"));

    let mut updates = controller.subscribe();
    controller.update_credential("sk-valid");
    controller.generate().await.unwrap();

    let credential_changed = updates.recv().await.unwrap();
    assert!(!credential_changed.is_busy);
    let started = updates.recv().await.unwrap();
    assert!(started.is_busy);
    assert!(started.error.is_none() && started.plan.is_none());
    let finished = updates.recv().await.unwrap();
    assert_eq!(finished.plan.as_deref(), Some("Week 1: ..."));
    assert!(finished.error.is_none());

    println!("✅ Retry after upstream failure replaced the error with a plan");
}

#[tokio::test]
async fn test_copy_result_without_plan_writes_nothing() {
    let server = MockServer::start().await;
    let (controller, clipboard) = controller_for(config_for(&server, Duration::from_secs(5)));

    assert!(!controller.copy_result());
    assert!(clipboard.writes.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_copy_result_after_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(plan_body("Week 1: ...")))
        .mount(&server)
        .await;

    let (controller, clipboard) = controller_for(config_for(&server, Duration::from_secs(5)));
    controller.update_goal("Learn Python in 30 days");
    controller.update_credential("sk-valid");
    controller.generate().await.unwrap();

    assert!(controller.copy_result());
    assert_eq!(*clipboard.writes.lock().unwrap(), vec!["Week 1: ...".to_string()]);
}
