mod common;

use claude_code_archive::backend::{BackendAdapter, BackendMode, RemoteOutcome};
use claude_code_archive::device::DeviceIdentity;
use claude_code_archive::error::ArchiveError;
use claude_code_archive::manifest::ManifestWriter;
use claude_code_archive::sync::{run_sync, SyncOptions, SyncOutcome};
use common::{session_lines, FakeProvisioner, FakeScm, Fixture, DEVICE_SLUG};

const URL: &str = "git@example.com:me/archive.git";

fn identity(fixture: &Fixture) -> DeviceIdentity {
    DeviceIdentity::load_or_create(
        &fixture.config.device_state_path(),
        fixture.config.device_name.as_deref(),
    )
    .unwrap()
}

fn mode_on_disk(fixture: &Fixture) -> Option<BackendMode> {
    ManifestWriter::new(&fixture.layout())
        .read_device(DEVICE_SLUG)
        .unwrap()
        .map(|m| m.mode)
}

fn assert_invalid_transition(err: &anyhow::Error) {
    assert!(
        matches!(
            err.downcast_ref::<ArchiveError>(),
            Some(ArchiveError::InvalidTransition { .. })
        ),
        "unexpected error: {err:#}"
    );
}

#[test]
fn test_switch_to_custom_sets_remote_and_persists() {
    let fixture = Fixture::new();
    let scm = FakeScm::new(&fixture.config.archive_root);
    scm.make_reachable(URL);
    let layout = fixture.layout();
    let adapter = BackendAdapter::new(&scm, &layout, &fixture.config);
    let device = identity(&fixture);

    let backend = adapter.switch_to_custom(&device, URL).unwrap();

    assert_eq!(backend.mode, BackendMode::Custom);
    assert_eq!(scm.remote("origin").as_deref(), Some(URL));
    assert_eq!(scm.pushes().len(), 1, "transition performs a test push");
    assert_eq!(mode_on_disk(&fixture), Some(BackendMode::Custom));

    // Switching again to the same remote does not duplicate it
    adapter.switch_to_custom(&device, URL).unwrap();
    assert_eq!(scm.remote("origin").as_deref(), Some(URL));
}

#[test]
fn test_unreachable_custom_remote_changes_nothing() {
    let fixture = Fixture::new();
    let scm = FakeScm::new(&fixture.config.archive_root);
    let layout = fixture.layout();
    let adapter = BackendAdapter::new(&scm, &layout, &fixture.config);
    let device = identity(&fixture);
    adapter.switch_to_none(&device).unwrap();

    let err = adapter.switch_to_custom(&device, URL).unwrap_err();

    assert_invalid_transition(&err);
    assert!(scm.remote("origin").is_none());
    assert_eq!(mode_on_disk(&fixture), Some(BackendMode::None));
}

#[test]
fn test_failed_test_push_restores_previous_remote() {
    let fixture = Fixture::new();
    let scm = FakeScm::new(&fixture.config.archive_root);
    let other = "https://example.com/other.git";
    scm.make_reachable(URL);
    scm.make_reachable(other);
    let layout = fixture.layout();
    let adapter = BackendAdapter::new(&scm, &layout, &fixture.config);
    let device = identity(&fixture);
    adapter.switch_to_custom(&device, URL).unwrap();

    scm.set_fail_push(true);
    let err = adapter.switch_to_custom(&device, other).unwrap_err();

    assert_invalid_transition(&err);
    assert_eq!(scm.remote("origin").as_deref(), Some(URL));
    let manifest = ManifestWriter::new(&layout).read_device(DEVICE_SLUG).unwrap().unwrap();
    assert_eq!(manifest.remote.as_deref(), Some(URL));
}

#[test]
fn test_hosted_requires_authenticated_provisioner() {
    let fixture = Fixture::new();
    let scm = FakeScm::new(&fixture.config.archive_root);
    let layout = fixture.layout();
    let adapter = BackendAdapter::new(&scm, &layout, &fixture.config);
    let device = identity(&fixture);
    adapter.switch_to_none(&device).unwrap();

    let provisioner = FakeProvisioner::unauthenticated();
    let err = adapter
        .switch_to_hosted(&device, &provisioner, "archive")
        .unwrap_err();

    assert_invalid_transition(&err);
    assert!(provisioner.created.lock().unwrap().is_empty());
    assert_eq!(mode_on_disk(&fixture), Some(BackendMode::None));
}

#[test]
fn test_hosted_provisions_and_pushes() {
    let fixture = Fixture::new();
    let scm = FakeScm::new(&fixture.config.archive_root);
    let layout = fixture.layout();
    let adapter = BackendAdapter::new(&scm, &layout, &fixture.config);
    let device = identity(&fixture);

    let provisioner = FakeProvisioner::ready("https://github.com/me/archive.git");
    let backend = adapter
        .switch_to_hosted(&device, &provisioner, "archive")
        .unwrap();

    assert_eq!(backend.mode, BackendMode::Hosted);
    assert_eq!(*provisioner.created.lock().unwrap(), vec!["archive".to_string()]);
    assert_eq!(
        scm.remote("origin").as_deref(),
        Some("https://github.com/me/archive.git")
    );
    assert_eq!(mode_on_disk(&fixture), Some(BackendMode::Hosted));
}

#[test]
fn test_switch_to_none_removes_remote() {
    let fixture = Fixture::new();
    let scm = FakeScm::new(&fixture.config.archive_root);
    scm.make_reachable(URL);
    let layout = fixture.layout();
    let adapter = BackendAdapter::new(&scm, &layout, &fixture.config);
    let device = identity(&fixture);
    adapter.switch_to_custom(&device, URL).unwrap();

    let backend = adapter.switch_to_none(&device).unwrap();
    assert_eq!(backend.mode, BackendMode::None);
    assert!(scm.remote("origin").is_none());
    assert_eq!(mode_on_disk(&fixture), Some(BackendMode::None));
}

#[test]
fn test_sync_pushes_in_remote_mode() {
    let fixture = Fixture::new();
    fixture.write_session("p1", "aaaa", &session_lines(2));
    let scm = FakeScm::new(&fixture.config.archive_root);
    scm.make_reachable(URL);
    let layout = fixture.layout();
    let device = identity(&fixture);
    BackendAdapter::new(&scm, &layout, &fixture.config)
        .switch_to_custom(&device, URL)
        .unwrap();
    let pushes_before = scm.pushes().len();

    let SyncOutcome::Completed(report) =
        run_sync(&fixture.config, &scm, &SyncOptions::default()).unwrap()
    else {
        panic!("expected completed sync");
    };

    match &report.remote {
        RemoteOutcome::Pushed { remote, branch } => {
            assert_eq!(remote, "origin");
            assert_eq!(branch, "main");
        }
        other => panic!("expected push, got {other:?}"),
    }
    assert_eq!(scm.pulls(), 1);
    assert_eq!(scm.pushes().len(), pushes_before + 1);
    assert_eq!(scm.gc_runs(), 1);
}

#[test]
fn test_remote_failure_keeps_local_commit() {
    let fixture = Fixture::new();
    fixture.write_session("p1", "aaaa", &session_lines(2));
    let scm = FakeScm::new(&fixture.config.archive_root);
    scm.make_reachable(URL);
    let layout = fixture.layout();
    let device = identity(&fixture);
    BackendAdapter::new(&scm, &layout, &fixture.config)
        .switch_to_custom(&device, URL)
        .unwrap();
    let commits_before = scm.commits().len();

    scm.set_fail_pull(true);
    let SyncOutcome::Completed(report) =
        run_sync(&fixture.config, &scm, &SyncOptions::default()).unwrap()
    else {
        panic!("expected completed sync");
    };

    match &report.remote {
        RemoteOutcome::Unavailable(ArchiveError::RemoteUnavailable { remote, reason }) => {
            assert_eq!(remote, "origin");
            assert!(reason.contains("could not resolve host"));
        }
        other => panic!("expected unavailable remote, got {other:?}"),
    }
    assert!(report.commit.is_some());
    assert_eq!(scm.commits().len(), commits_before + 1);
    assert_eq!(scm.gc_runs(), 0);
}

#[test]
fn test_local_mode_never_touches_remote() {
    let fixture = Fixture::new();
    fixture.write_session("p1", "aaaa", &session_lines(2));
    let scm = FakeScm::new(&fixture.config.archive_root);
    let layout = fixture.layout();
    let device = identity(&fixture);
    BackendAdapter::new(&scm, &layout, &fixture.config)
        .switch_to_none(&device)
        .unwrap();

    let SyncOutcome::Completed(report) =
        run_sync(&fixture.config, &scm, &SyncOptions::default()).unwrap()
    else {
        panic!("expected completed sync");
    };
    assert!(matches!(report.remote, RemoteOutcome::Disabled));
    assert_eq!(scm.pulls(), 0);
    assert!(scm.pushes().is_empty());
}
