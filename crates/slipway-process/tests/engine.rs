//! End-to-end engine tests against real OS processes

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serial_test::serial;
use slipway_process::{
    exit_code, exit_code_is_zero, strings, CliCommand, CommandSpec, KillQueue, Phase,
    ProcessCallback, ProcessControl, ProcessError, ProcessResult, KILL_EXIT_CODE,
};

#[cfg(unix)]
fn shell(script: &str) -> CommandSpec {
    CommandSpec::new("sh").args(["-c", script])
}

#[cfg(unix)]
#[tokio::test]
async fn round_trip_stdout_and_stderr() {
    let control = ProcessControl::spawn(shell("printf 'hello X\\n'; printf 'bye X\\n' >&2"))
        .await
        .unwrap();
    let result = control.wait().await;

    assert_eq!(result.exit_code, 0);
    assert_eq!(result.stdout, "hello X\n");
    assert_eq!(result.stderr, "bye X\n");
    assert!(!result.was_killed);

    let state = control.state();
    assert_eq!(state.phase(), Phase::Exited);
    assert_eq!(state.exit_code(), 0);
}

#[cfg(unix)]
#[tokio::test]
async fn strings_converter_yields_stdout_only() {
    let command = CliCommand::new("sh", strings()).args(["-c", "echo hello; echo bye >&2"]);
    assert_eq!(command.run().await.unwrap(), "hello\n");
}

#[cfg(unix)]
#[tokio::test]
async fn multibyte_output_survives_read_chunking() {
    // pad so the trailing multi-byte character straddles the pump's read
    // boundary; it must arrive intact, not as replacement characters
    let expected = format!("{}\u{20ac}", "a".repeat(8191));
    let command =
        CliCommand::new("sh", strings()).args(["-c", &format!("printf '%s' '{expected}'")]);
    assert_eq!(command.run().await.unwrap(), expected);
}

#[cfg(unix)]
#[tokio::test]
async fn control_debug_names_the_command() {
    let control = ProcessControl::spawn(shell("true")).await.unwrap();
    assert!(format!("{control:?}").contains("sh -c true"));
    control.wait().await;
}

#[tokio::test]
async fn missing_executable_is_a_launch_failure() {
    let err = ProcessControl::spawn(CommandSpec::new("slipway-no-such-binary"))
        .await
        .unwrap_err();
    assert!(matches!(err, ProcessError::SpawnFailed(_)));
}

#[tokio::test]
async fn missing_executable_through_cli_command() {
    let command = CliCommand::new("slipway-no-such-binary", strings());
    assert!(matches!(
        command.run().await.unwrap_err(),
        ProcessError::SpawnFailed(_)
    ));
}

#[cfg(unix)]
#[tokio::test]
async fn exit_code_converters() {
    let failing = CliCommand::new("sh", exit_code_is_zero()).args(["-c", "exit 7"]);
    assert!(!failing.run().await.unwrap());

    let expecting_seven = CliCommand::new("sh", exit_code(|code| code == 7)).args(["-c", "exit 7"]);
    assert!(expecting_seven.run().await.unwrap());
}

#[cfg(unix)]
#[tokio::test]
async fn wait_timeout_leaves_process_running() {
    let control = ProcessControl::spawn(shell("sleep 5")).await.unwrap();

    assert!(control
        .wait_timeout(Duration::from_millis(50))
        .await
        .is_none());
    assert!(control.state().is_running());

    assert!(control.kill());
    let result = control.wait().await;
    assert!(result.was_killed);
    assert_eq!(result.exit_code, KILL_EXIT_CODE);
}

#[cfg(unix)]
#[tokio::test]
async fn concurrent_kills_notify_once() {
    let control = Arc::new(ProcessControl::spawn(shell("sleep 5")).await.unwrap());

    let notified = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&notified);
    control.listen(move |_: &ProcessResult| {
        seen.fetch_add(1, Ordering::SeqCst);
    });

    let a = Arc::clone(&control);
    let b = Arc::clone(&control);
    let (won_a, won_b) = tokio::join!(
        tokio::task::spawn_blocking(move || a.kill()),
        tokio::task::spawn_blocking(move || b.kill()),
    );
    let wins = usize::from(won_a.unwrap()) + usize::from(won_b.unwrap());
    assert_eq!(wins, 1);

    let result = control.wait().await;
    assert_eq!(result.exit_code, KILL_EXIT_CODE);
    assert!(!control.state().is_running());
    assert_eq!(notified.load(Ordering::SeqCst), 1);
}

#[cfg(unix)]
#[tokio::test]
async fn listener_after_completion_is_immediate() {
    let control = ProcessControl::spawn(shell("echo done")).await.unwrap();
    control.wait().await;

    let notified = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&notified);
    control.listen(move |result: &ProcessResult| {
        assert_eq!(result.stdout, "done\n");
        seen.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(notified.load(Ordering::SeqCst), 1);
}

#[cfg(unix)]
#[tokio::test]
#[serial]
async fn kill_after_terminates_at_deadline() {
    KillQueue::global().reset();

    let started = Instant::now();
    let control = ProcessControl::spawn(shell("sleep 10")).await.unwrap();
    control.kill_after(Duration::from_millis(200));

    let result = control.wait().await;
    assert!(started.elapsed() >= Duration::from_millis(200));
    assert!(result.was_killed);
    assert_eq!(result.exit_code, KILL_EXIT_CODE);
    assert!(control.state().was_killed());

    KillQueue::global().reset();
}

#[cfg(unix)]
#[tokio::test]
#[serial]
async fn fast_process_is_never_killed() {
    KillQueue::global().reset();

    let observed = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&observed);
    KillQueue::global().set_kill_observer(move |_: &ProcessCallback| {
        seen.fetch_add(1, Ordering::SeqCst);
    });

    let control = ProcessControl::spawn(shell("echo quick")).await.unwrap();
    control.kill_after(Duration::from_millis(150));

    let result = control.wait().await;
    assert_eq!(result.exit_code, 0);
    assert!(!result.was_killed);

    // give the worker its deadline wakeup before asserting
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(observed.load(Ordering::SeqCst), 0);

    KillQueue::global().reset();
}

#[cfg(unix)]
#[tokio::test]
async fn stdin_handler_feeds_the_child() {
    let mut lines = vec!["first\n".to_string(), "second\n".to_string()].into_iter();
    let spec = CommandSpec::new("cat").stdin_handler(
        move |_: &ProcessCallback, buf: &mut String| match lines.next() {
            Some(line) => {
                buf.push_str(&line);
                true
            }
            None => false,
        },
        true,
    );

    let control = ProcessControl::spawn(spec).await.unwrap();
    let result = control.wait().await;
    assert_eq!(result.exit_code, 0);
    assert_eq!(result.stdout, "first\nsecond\n");
}

#[cfg(unix)]
#[tokio::test]
async fn stdin_handler_may_defer_before_providing_input() {
    // first call produces nothing but asks to be called again; the pump
    // must keep the runtime alive until the handler delivers
    let mut calls = 0u32;
    let spec = CommandSpec::new("cat").stdin_handler(
        move |_: &ProcessCallback, buf: &mut String| {
            calls += 1;
            match calls {
                1 => true,
                2 => {
                    buf.push_str("deferred\n");
                    true
                }
                _ => false,
            }
        },
        true,
    );

    let control = ProcessControl::spawn(spec).await.unwrap();
    let result = control.wait().await;
    assert_eq!(result.exit_code, 0);
    assert_eq!(result.stdout, "deferred\n");
}

#[cfg(unix)]
#[tokio::test]
#[serial]
async fn kill_after_on_exited_process_is_a_noop() {
    let control = ProcessControl::spawn(shell("true")).await.unwrap();
    control.wait().await;

    let pending_before = KillQueue::global().pending();
    control.kill_after(Duration::from_millis(10));
    assert_eq!(KillQueue::global().pending(), pending_before);
}

#[cfg(unix)]
#[tokio::test]
async fn run_with_appends_per_invocation_arguments() {
    let command = CliCommand::new("sh", strings()).arg("-c");
    let out = command
        .run_with(|args| args.push("echo per-run".to_string()))
        .await
        .unwrap();
    assert_eq!(out, "per-run\n");
}
