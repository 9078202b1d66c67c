use nix::sys::signal::Signal;
use procprog::process_manager::{
    ChildProcess, ExitOutcome, OutputChunk, ProcessManagerError, ProcessSpec,
};
use std::sync::mpsc::Receiver;
use std::time::Duration;

fn sh(script: &str) -> ProcessSpec {
    ProcessSpec::new("sh", vec!["-c".to_owned(), script.to_owned()])
}

fn drain(output: &Receiver<OutputChunk>) -> Vec<OutputChunk> {
    let mut chunks = Vec::new();
    while let Ok(chunk) = output.recv_timeout(Duration::from_secs(5)) {
        chunks.push(chunk);
    }
    chunks
}

fn collect(chunks: &[OutputChunk]) -> Vec<u8> {
    chunks
        .iter()
        .flat_map(|chunk| chunk.bytes.iter().copied())
        .collect()
}

#[test]
fn child_output_arrives_as_raw_bytes_from_both_streams() {
    let mut child =
        ChildProcess::spawn(&sh("printf 'out\\033[1m\\r'; printf err 1>&2")).expect("spawn");
    let output = child.take_output().expect("output channel");
    let chunks = drain(&output);
    child.join_reader();

    assert_eq!(collect(&chunks), b"out\x1b[1m\rerr");
    assert_eq!(child.wait().expect("wait"), ExitOutcome::Finished);
}

#[test]
fn stdout_and_stderr_keep_their_write_order() {
    let script = "i=1; while [ $i -le 20 ]; do printf \"O$i \"; printf \"E$i \" >&2; i=$((i+1)); done";
    let mut child = ChildProcess::spawn(&sh(script)).expect("spawn");
    let output = child.take_output().expect("output channel");
    let merged = String::from_utf8(collect(&drain(&output))).expect("utf8");
    child.join_reader();

    let expected: String = (1..=20).map(|i| format!("O{i} E{i} ")).collect();
    assert_eq!(merged, expected);
    assert!(child.wait().expect("wait").is_success());
}

#[test]
fn stopped_child_is_reported() {
    let child = ChildProcess::spawn(&sh("kill -STOP $$; exit 0")).expect("spawn");
    let outcome = child.wait().expect("wait");
    assert_eq!(outcome, ExitOutcome::Stopped(19));
    assert_eq!(outcome.exit_code(), 147);
    assert_eq!(outcome.describe(), "stopped by signal 19");
    assert_eq!(child.try_wait().expect("try_wait"), Some(outcome));
    child.signal(Signal::SIGKILL).expect("kill stopped child");
}

#[test]
fn child_shares_our_process_group() {
    let child = ChildProcess::spawn(&sh("sleep 5")).expect("spawn");
    let child_group = nix::unistd::getpgid(Some(nix::unistd::Pid::from_raw(child.id() as i32)))
        .expect("child process group");
    assert_eq!(child_group, nix::unistd::getpgrp());
    child.signal(Signal::SIGKILL).expect("kill child");
    assert_eq!(child.wait().expect("wait"), ExitOutcome::Signaled(9));
}

#[test]
fn child_receives_forwarded_input() {
    let mut child =
        ChildProcess::spawn(&sh("IFS= read -r line; printf \"seen:%s\\n\" \"$line\""))
            .expect("spawn");
    let mut input = child.take_input().expect("stdin");
    input.send(b"r\n").expect("send input");
    let output = child.take_output().expect("output channel");
    let chunks = drain(&output);

    assert_eq!(collect(&chunks), b"seen:r\n");
    assert!(child.wait().expect("wait").is_success());
}

#[test]
fn exit_outcomes_are_classified() {
    let child = ChildProcess::spawn(&sh("exit 3")).expect("spawn");
    let outcome = child.wait().expect("wait");
    assert_eq!(outcome, ExitOutcome::NonZero(3));
    assert_eq!(outcome.exit_code(), 3);
    assert_eq!(outcome.describe(), "exited with non-zero status 3");

    let child = ChildProcess::spawn(&sh("kill -TERM $$")).expect("spawn");
    let outcome = child.wait().expect("wait");
    assert_eq!(outcome, ExitOutcome::Signaled(15));
    assert_eq!(outcome.exit_code(), 143);
    assert_eq!(outcome.describe(), "terminated by signal 15");
}

#[test]
fn termination_is_forwarded_to_the_child() {
    let child = ChildProcess::spawn(&sh("sleep 30")).expect("spawn");
    child.signal(Signal::SIGTERM).expect("signal child");
    let outcome = child.wait().expect("wait");
    assert_eq!(outcome.signal(), Some(15));
}

#[test]
fn missing_program_is_a_spawn_error() {
    let error = match ChildProcess::spawn(&ProcessSpec::new(
        "procprog-definitely-missing-binary",
        Vec::new(),
    )) {
        Ok(_) => panic!("spawn should fail"),
        Err(error) => error,
    };
    assert!(matches!(error, ProcessManagerError::Spawn { .. }));
    assert!(error
        .to_string()
        .contains("procprog-definitely-missing-binary"));
}

#[test]
fn display_name_is_the_program_basename() {
    let spec = ProcessSpec::new("/usr/bin/make", vec!["-j4".to_owned()]);
    assert_eq!(spec.display_name(), "make");
    assert_eq!(spec.command_line(), "/usr/bin/make -j4");
}
