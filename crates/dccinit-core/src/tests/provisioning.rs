//! Provisioning policies.

use crate::config::{ProvisionConfig, ProvisionFailurePolicy};
use crate::signals::{SignalRouter, SignalTrigger};
use crate::tests::harness::{Fixture, trigger_when_logged};
use crate::tests::mocks::MockProvisioner;
use crate::types::ShutdownEvent;

#[tokio::test]
async fn failure_aborts_before_any_daemon_starts() {
    let fx = Fixture::new();
    let provisioner = MockProvisioner::failing();
    let (mut router, _trigger) = SignalRouter::manual();

    let outcome = fx
        .supervisor(fx.config(), fx.options())
        .with_provisioner(provisioner.clone())
        .run(&mut router)
        .await;

    assert_eq!(outcome.exit_code, 1);
    assert!(matches!(outcome.event, ShutdownEvent::Aborted(ref r) if r.contains("compiler")));
    assert!(outcome.teardown.sequence.is_empty());
    assert_eq!(outcome.teardown.skipped.len(), 3);
    assert_eq!(provisioner.calls(), 1);
}

#[tokio::test]
async fn failure_is_tolerated_with_a_command() {
    let fx = Fixture::new();
    let (mut router, _trigger) = SignalRouter::manual();

    let outcome = fx
        .supervisor(fx.config(), fx.command(&["/bin/true"]))
        .with_provisioner(MockProvisioner::failing())
        .run(&mut router)
        .await;

    assert_eq!(outcome.exit_code, 0);
    assert_eq!(outcome.teardown.stopped.len(), 3);
}

#[tokio::test]
async fn abort_policy_applies_with_a_command() {
    let fx = Fixture::new();
    let mut config = fx.config();
    config.on_provision_failure = ProvisionFailurePolicy::Abort;
    let (mut router, _trigger) = SignalRouter::manual();

    let outcome = fx
        .supervisor(config, fx.command(&["/bin/true"]))
        .with_provisioner(MockProvisioner::failing())
        .run(&mut router)
        .await;

    assert_eq!(outcome.exit_code, 1);
}

#[tokio::test]
async fn continue_policy_enters_watch_mode() {
    let fx = Fixture::new();
    let mut config = fx.config();
    config.on_provision_failure = ProvisionFailurePolicy::Continue;
    let (mut router, trigger) = SignalRouter::manual();
    trigger_when_logged(&fx, "service running", trigger, SignalTrigger::interrupt);

    let outcome = fx
        .supervisor(config, fx.options())
        .with_provisioner(MockProvisioner::failing())
        .run(&mut router)
        .await;

    assert_eq!(outcome.exit_code, 130);
}

/// The configured installer runs once; the stamp file skips it next time.
#[tokio::test]
async fn configured_installer_honours_stamp() {
    let fx = Fixture::new();
    let counter = fx.path("installs");
    let mut config = fx.config();
    config.provision = Some(ProvisionConfig {
        program: "/bin/sh".into(),
        args: vec!["-c".into(), format!("echo x >> {}", counter.display())],
        stamp_file: Some(fx.path("state/compilers.stamp")),
    });

    for _ in 0..2 {
        let (mut router, _trigger) = SignalRouter::manual();
        let outcome = fx
            .supervisor(config.clone(), fx.command(&["/bin/true"]))
            .run(&mut router)
            .await;
        assert_eq!(outcome.exit_code, 0);
    }

    assert_eq!(std::fs::read_to_string(counter).unwrap(), "x\n");
}
