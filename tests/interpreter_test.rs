//! End-to-end tests against a real host interpreter (no container).
//!
//! These exercise the full provision → prime → frame → capture → teardown
//! path with `python3` on the host, and skip themselves when no python3 is
//! installed.

use std::sync::Arc;

use replbox::{LocalProvisioner, RuntimeSpec, Session, SessionConfig, SessionError, SessionState};

fn python3_available() -> bool {
    std::process::Command::new("python3")
        .arg("--version")
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
}

fn test_config() -> SessionConfig {
    SessionConfig {
        startup_timeout_seconds: 20,
        call_timeout_seconds: 20,
        close_timeout_seconds: 2,
        ..SessionConfig::default()
    }
}

async fn python_session(config: SessionConfig) -> Session {
    Session::start(
        config,
        RuntimeSpec::default(),
        Arc::new(LocalProvisioner::new()),
    )
    .await
    .expect("python session start")
}

macro_rules! require_python {
    () => {
        if !python3_available() {
            eprintln!("python3 not available, skipping");
            return;
        }
    };
}

#[tokio::test]
async fn state_persists_across_calls_within_a_session() {
    require_python!();
    let session = python_session(test_config()).await;

    let first = session.execute("x = 10").await.unwrap();
    assert_eq!(first.output, "");
    assert!(first.value.is_none());

    let second = session.execute("x + 5").await.unwrap();
    assert_eq!(second.value.as_deref(), Some("15"));

    session.close().await.unwrap();
}

#[tokio::test]
async fn state_does_not_cross_sessions() {
    require_python!();
    let provisioner = Arc::new(LocalProvisioner::new());

    let first = Session::start(test_config(), RuntimeSpec::default(), provisioner.clone())
        .await
        .unwrap();
    first.execute("marker_variable = 10").await.unwrap();

    let second = Session::start(test_config(), RuntimeSpec::default(), provisioner)
        .await
        .unwrap();
    let result = second.execute("marker_variable + 5").await.unwrap();
    assert!(result.output.contains("NameError"));
    assert!(result.value.is_none());

    first.close().await.unwrap();
    second.close().await.unwrap();
}

#[tokio::test]
async fn printed_output_is_captured_in_order() {
    require_python!();
    let session = python_session(test_config()).await;

    let result = session
        .execute("for i in range(3):\n    print(i)")
        .await
        .unwrap();
    assert_eq!(result.output, "0\n1\n2");
    assert!(result.value.is_none());

    session.close().await.unwrap();
}

#[tokio::test]
async fn output_and_value_from_one_fragment() {
    require_python!();
    let session = python_session(test_config()).await;

    let result = session
        .execute("y = 2\nprint('hi')\ny * 3")
        .await
        .unwrap();
    assert_eq!(result.output, "hi");
    assert_eq!(result.value.as_deref(), Some("6"));

    session.close().await.unwrap();
}

#[tokio::test]
async fn function_definition_then_call() {
    require_python!();
    let session = python_session(test_config()).await;

    session
        .execute("def greet(name):\n    return f\"Hi {name}!\"")
        .await
        .unwrap();
    let result = session.execute("greet('Sandeep')").await.unwrap();
    assert_eq!(result.value.as_deref(), Some("'Hi Sandeep!'"));

    session.close().await.unwrap();
}

#[tokio::test]
async fn in_sandbox_exception_is_output_not_failure() {
    require_python!();
    let session = python_session(test_config()).await;

    let result = session.execute("1 / 0").await.unwrap();
    assert!(result.output.contains("ZeroDivisionError"));
    assert!(result.value.is_none());
    assert_eq!(session.state(), SessionState::Ready);

    // Interpreter state survives the exception.
    let next = session.execute("2 + 2").await.unwrap();
    assert_eq!(next.value.as_deref(), Some("4"));

    session.close().await.unwrap();
}

#[tokio::test]
async fn syntax_error_is_forwarded_to_the_interpreter() {
    require_python!();
    let session = python_session(test_config()).await;

    let result = session.execute("print 'hello'").await.unwrap();
    assert!(result.output.contains("SyntaxError"));
    assert_eq!(session.state(), SessionState::Ready);

    session.close().await.unwrap();
}

#[tokio::test]
async fn marker_lookalike_output_does_not_break_framing() {
    require_python!();
    let session = python_session(test_config()).await;

    // Output shaped like a marker line, with a token the fragment invented.
    let result = session
        .execute("print('0123456789abcdef0123456789abcdef:N')\n'fine'")
        .await
        .unwrap();
    assert!(result.output.contains("0123456789abcdef0123456789abcdef:N"));
    assert_eq!(result.value.as_deref(), Some("'fine'"));

    session.close().await.unwrap();
}

#[tokio::test]
async fn trailing_none_expression_spells_none() {
    require_python!();
    let session = python_session(test_config()).await;

    let result = session.execute("None").await.unwrap();
    assert_eq!(result.value.as_deref(), Some("None"));

    session.close().await.unwrap();
}

#[tokio::test]
async fn empty_fragment_is_a_successful_empty_call() {
    require_python!();
    let session = python_session(test_config()).await;

    let result = session.execute("").await.unwrap();
    assert_eq!(result.output, "");
    assert!(result.value.is_none());

    session.close().await.unwrap();
}

#[tokio::test]
async fn infinite_loop_times_out_and_kills_the_runtime() {
    require_python!();
    let config = SessionConfig {
        call_timeout_seconds: 1,
        ..test_config()
    };
    let session = python_session(config).await;

    let err = session
        .execute("while True:\n    pass")
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::ExecutionTimeout(_)));
    assert_eq!(session.state(), SessionState::Errored);
    assert!(!session.runtime_alive().await);

    // Closing an errored session stays a no-op.
    session.close().await.unwrap();
    assert_eq!(session.state(), SessionState::Errored);
}

#[tokio::test]
async fn killing_the_runtime_out_of_band_surfaces_a_crash() {
    require_python!();
    let session = python_session(test_config()).await;

    let err = session.execute("import os; os._exit(1)").await.unwrap_err();
    assert!(matches!(err, SessionError::RuntimeCrashed));
    assert_eq!(session.state(), SessionState::Errored);
}

#[tokio::test]
async fn close_is_idempotent_against_a_real_interpreter() {
    require_python!();
    let session = python_session(test_config()).await;

    session.execute("x = 1").await.unwrap();
    session.close().await.unwrap();
    session.close().await.unwrap();
    assert_eq!(session.state(), SessionState::Closed);
    assert!(!session.runtime_alive().await);
}
