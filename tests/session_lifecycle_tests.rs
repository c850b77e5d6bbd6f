// Integration tests for the session state machine
//
// These drive the machine through the simulated SDK in both callback modes
// and check transitions, adapter call counts and failure handling.

mod common;

use common::{credential, harness, request, simulation, wait_for};
use meeting_audio_relay::sdk::{
    AdapterListener, CallbackMode, Credential, JoinRequest, MeetingAdapter, MeetingErrorCode,
    MeetingStatus, SdkError, SimulationConfig,
};
use meeting_audio_relay::audio::SilenceSource;
use meeting_audio_relay::{SessionConfig, SessionError, SessionMachine, SessionState, TerminationSignal};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

#[test]
fn test_happy_path_streams_fixed_size_chunks() {
    let h = harness(simulation(CallbackMode::Threaded));

    h.machine.initialize(&credential()).expect("initialize");
    assert_eq!(h.machine.state(), SessionState::Authenticated);

    h.machine.join(&request(48000, 2)).expect("join");
    assert_eq!(h.machine.state(), SessionState::InMeeting);

    let snapshot = h.machine.snapshot();
    assert!(snapshot.in_meeting());
    assert!(snapshot.authenticated());
    assert!(snapshot.audio_subscribed());
    assert_eq!(snapshot.meeting_id(), "123456789");
    assert_eq!(snapshot.sample_rate(), 48000);
    assert_eq!(snapshot.channels(), 2);

    thread::sleep(Duration::from_millis(350));
    h.machine.leave();
    let report = h.machine.join_pipeline().expect("pipeline was started");

    let sizes = h.collected.sizes();
    assert!(sizes.len() >= 2, "expected a few chunks, got {}", sizes.len());
    assert!(sizes.iter().all(|&len| len == 19200), "48kHz stereo chunks are 19200 bytes");
    assert_eq!(report.chunks_forwarded as usize, sizes.len());
    assert_eq!(report.bytes_forwarded, 19200 * sizes.len() as u64);

    h.machine.shutdown();
    assert_eq!(h.machine.state(), SessionState::Terminated);
}

#[test]
fn test_chunks_arrive_at_steady_cadence() {
    let h = harness(simulation(CallbackMode::Inline));

    h.machine.initialize(&credential()).unwrap();
    h.machine.join(&request(16000, 1)).unwrap();
    thread::sleep(Duration::from_millis(560));
    h.machine.shutdown();

    let received = h.collected.all();
    assert!(received.len() >= 4, "got {} chunks", received.len());

    for (i, r) in received.iter().enumerate() {
        assert_eq!(r.chunk.sequence, i as u64);
        assert_eq!(r.chunk.data.len(), 3200);
        assert_eq!(r.chunk.sample_rate, 16000);
        assert_eq!(r.chunk.channels, 1);
    }

    // One chunk per tick, never batched
    for pair in received.windows(2) {
        let gap = pair[1].at - pair[0].at;
        assert!(gap >= Duration::from_millis(50), "chunks {:?} apart", gap);
    }
}

#[test]
fn test_transitions_follow_lifecycle_order() {
    for mode in [CallbackMode::Inline, CallbackMode::Threaded] {
        let h = harness(simulation(mode));

        h.machine.initialize(&credential()).unwrap();
        h.machine.join(&request(16000, 1)).unwrap();
        h.machine.leave();
        h.machine.shutdown();

        assert_eq!(
            h.machine.snapshot().history(),
            &[
                SessionState::Uninitialized,
                SessionState::Authenticating,
                SessionState::Authenticated,
                SessionState::Joining,
                SessionState::InMeeting,
                SessionState::Leaving,
                SessionState::Terminated,
            ],
            "mode {:?}",
            mode
        );
    }
}

#[test]
fn test_join_before_initialize_is_rejected() {
    let h = harness(simulation(CallbackMode::Inline));

    let err = h.machine.join(&request(16000, 1)).unwrap_err();

    assert_eq!(err, SessionError::NotAuthenticated);
    assert_eq!(h.adapter.calls().join, 0);
    assert_eq!(h.machine.state(), SessionState::Uninitialized);
}

#[test]
fn test_join_after_failed_auth_is_rejected() {
    let h = harness(SimulationConfig {
        reject_auth: true,
        ..simulation(CallbackMode::Threaded)
    });

    let err = h.machine.initialize(&credential()).unwrap_err();
    assert!(matches!(err, SessionError::AuthenticationFailed(_)));
    assert_eq!(h.machine.state(), SessionState::Failed);
    assert!(h.machine.termination().is_raised());

    assert_eq!(h.machine.join(&request(16000, 1)).unwrap_err(), SessionError::NotAuthenticated);
    assert_eq!(h.adapter.calls().join, 0);

    h.machine.shutdown();
    assert_eq!(h.collected.len(), 0);
}

#[test]
fn test_empty_credential_fails_authentication() {
    let h = harness(simulation(CallbackMode::Inline));

    let err = h.machine.initialize(&Credential::new("")).unwrap_err();

    assert!(matches!(err, SessionError::AuthenticationFailed(_)));
    assert!(!h.machine.snapshot().authenticated());
}

#[test]
fn test_initialize_failure_is_reported() {
    let h = harness(SimulationConfig {
        fail_initialize: true,
        ..simulation(CallbackMode::Inline)
    });

    let err = h.machine.initialize(&credential()).unwrap_err();

    assert!(matches!(err, SessionError::InitializationFailed(_)));
    assert_eq!(h.adapter.calls().authenticate, 0);
    assert_eq!(h.machine.state(), SessionState::Failed);

    // Internal failures request the same stop as a signal does
    assert!(h.machine.termination().is_raised());
    assert!(h.machine.snapshot().stop_requested());
}

#[test]
fn test_initialize_is_idempotent() {
    let h = harness(simulation(CallbackMode::Threaded));

    h.machine.initialize(&credential()).unwrap();
    h.machine.initialize(&credential()).unwrap();

    let calls = h.adapter.calls();
    assert_eq!(calls.initialize, 1);
    assert_eq!(calls.authenticate, 1);

    h.machine.join(&request(16000, 1)).unwrap();
    h.machine.initialize(&credential()).unwrap();
    assert_eq!(h.adapter.calls().authenticate, 1);

    h.machine.shutdown();
}

#[test]
fn test_join_rejects_invalid_parameters() {
    let h = harness(simulation(CallbackMode::Inline));
    h.machine.initialize(&credential()).unwrap();

    let err = h.machine.join(&request(16000, 3)).unwrap_err();
    assert!(matches!(err, SessionError::InvalidParameters(_)));

    let err = h.machine.join(&request(0, 1)).unwrap_err();
    assert!(matches!(err, SessionError::InvalidParameters(_)));

    assert_eq!(h.adapter.calls().join, 0);
    assert_eq!(h.machine.state(), SessionState::Authenticated);
}

#[test]
fn test_leave_is_idempotent() {
    for mode in [CallbackMode::Inline, CallbackMode::Threaded] {
        let h = harness(simulation(mode));
        h.machine.initialize(&credential()).unwrap();
        h.machine.join(&request(16000, 1)).unwrap();

        h.machine.leave();
        h.machine.leave();
        h.machine.shutdown();

        let calls = h.adapter.calls();
        assert_eq!(calls.leave, 1, "mode {:?}", mode);
        assert_eq!(calls.unsubscribe, 1, "mode {:?}", mode);
        assert_eq!(calls.cleanup, 1, "mode {:?}", mode);
    }
}

#[test]
fn test_concurrent_leave_reaches_sdk_once() {
    let h = harness(simulation(CallbackMode::Threaded));
    h.machine.initialize(&credential()).unwrap();
    h.machine.join(&request(16000, 1)).unwrap();

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let machine = Arc::clone(&h.machine);
            thread::spawn(move || machine.leave())
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }
    h.machine.shutdown();

    assert_eq!(h.adapter.calls().leave, 1);
    assert_eq!(h.adapter.calls().unsubscribe, 1);
}

#[test]
fn test_subscribe_failure_leaves_immediately() {
    for mode in [CallbackMode::Inline, CallbackMode::Threaded] {
        let h = harness(SimulationConfig {
            fail_subscribe: true,
            ..simulation(mode)
        });
        h.machine.initialize(&credential()).unwrap();

        let err = h.machine.join(&request(48000, 2)).unwrap_err();
        assert!(matches!(err, SessionError::SubscribeFailed(_)), "mode {:?}: {:?}", mode, err);
        assert!(h.machine.termination().is_raised());

        assert!(wait_for(Duration::from_secs(1), || h.adapter.calls().leave == 1));
        assert!(h.machine.join_pipeline().is_none());
        h.machine.shutdown();

        let calls = h.adapter.calls();
        assert_eq!(calls.subscribe, 1);
        assert_eq!(calls.unsubscribe, 0);
        assert_eq!(calls.leave, 1);
        assert_eq!(h.collected.len(), 0);
        assert!(matches!(h.machine.failure(), Some(SessionError::SubscribeFailed(_))));
    }
}

#[test]
fn test_join_error_fails_session() {
    let h = harness(SimulationConfig {
        join_error: Some(4),
        ..simulation(CallbackMode::Threaded)
    });
    h.machine.initialize(&credential()).unwrap();

    let err = h.machine.join(&request(16000, 1)).unwrap_err();

    assert_eq!(
        err,
        SessionError::MeetingFailed {
            status: MeetingStatus::InMeeting,
            code: MeetingErrorCode(4),
        }
    );
    assert_eq!(h.machine.state(), SessionState::Failed);
    assert_eq!(h.adapter.calls().subscribe, 0);

    h.machine.shutdown();
    assert_eq!(h.machine.state(), SessionState::Terminated);
    assert!(matches!(h.machine.failure(), Some(SessionError::MeetingFailed { .. })));
}

#[test]
fn test_mid_meeting_error_stops_stream() {
    let h = harness(simulation(CallbackMode::Inline));
    h.machine.initialize(&credential()).unwrap();
    h.machine.join(&request(16000, 1)).unwrap();
    thread::sleep(Duration::from_millis(150));

    let machine: &dyn AdapterListener = &*h.machine;
    machine.on_meeting_status_changed(MeetingStatus::Reconnecting, MeetingErrorCode(1006));

    assert_eq!(h.machine.state(), SessionState::Failed);
    assert!(h.machine.termination().is_raised());
    assert_eq!(h.machine.wait_until_finished(), SessionState::Failed);

    h.machine.join_pipeline();
    h.machine.shutdown();

    // Still subscribed when the error hit, released by shutdown
    assert_eq!(h.adapter.calls().unsubscribe, 1);
    assert_eq!(h.machine.state(), SessionState::Terminated);
}

#[test]
fn test_informational_statuses_do_not_change_state() {
    let h = harness(simulation(CallbackMode::Inline));
    h.machine.initialize(&credential()).unwrap();
    h.machine.join(&request(16000, 1)).unwrap();

    let machine: &dyn AdapterListener = &*h.machine;
    for status in [
        MeetingStatus::Connecting,
        MeetingStatus::WaitingForHost,
        MeetingStatus::Reconnecting,
        MeetingStatus::InMeeting,
        MeetingStatus::from_code(42),
    ] {
        machine.on_meeting_status_changed(status, MeetingErrorCode::SUCCESS);
        assert_eq!(h.machine.state(), SessionState::InMeeting, "after {}", status);
    }

    h.machine.shutdown();
    assert_eq!(h.adapter.calls().subscribe, 1);
}

#[test]
fn test_host_ending_meeting_terminates_session() {
    let h = harness(SimulationConfig {
        meeting_duration_ms: Some(250),
        ..simulation(CallbackMode::Threaded)
    });
    h.machine.initialize(&credential()).unwrap();
    h.machine.join(&request(16000, 1)).unwrap();

    assert_eq!(h.machine.wait_until_finished(), SessionState::Terminated);
    let report = h.machine.join_pipeline().unwrap();
    h.machine.shutdown();

    assert!(report.chunks_forwarded >= 1);
    assert!(h.machine.failure().is_none());
    // The host ended it, we never asked to leave
    assert_eq!(h.adapter.calls().leave, 0);
    assert_eq!(h.adapter.calls().unsubscribe, 1);
}

#[test]
fn test_shutdown_runs_once() {
    let h = harness(simulation(CallbackMode::Inline));
    h.machine.initialize(&credential()).unwrap();
    h.machine.join(&request(16000, 1)).unwrap();

    h.machine.shutdown();
    h.machine.shutdown();

    let calls = h.adapter.calls();
    assert_eq!(calls.leave, 1);
    assert_eq!(calls.cleanup, 1);
    assert!(!h.machine.snapshot().sdk_ready());
}

#[test]
fn test_shutdown_without_session_work() {
    let h = harness(simulation(CallbackMode::Inline));

    h.machine.shutdown();

    assert_eq!(h.machine.state(), SessionState::Terminated);
    assert_eq!(h.adapter.calls().cleanup, 1);
    assert_eq!(h.adapter.calls().leave, 0);
}

#[test]
fn test_stats_reflect_session() {
    let h = harness(simulation(CallbackMode::Inline));
    h.machine.initialize(&credential()).unwrap();
    h.machine.join(&request(16000, 1)).unwrap();
    thread::sleep(Duration::from_millis(250));
    h.machine.shutdown();

    let stats = h.machine.stats();
    assert_eq!(stats.state, SessionState::Terminated);
    assert_eq!(stats.meeting_id, "123456789");
    assert_eq!(stats.chunks_forwarded as usize, h.collected.len());
    assert_eq!(stats.bytes_forwarded, stats.chunks_forwarded * 3200);
    assert!(stats.failure.is_none());
    assert!(stats.session_id.starts_with("session-"));

    let json = serde_json::to_value(&stats).unwrap();
    assert_eq!(json["state"], "Terminated");
}

/// SDK that accepts every request and never calls back
struct SilentAdapter;

impl MeetingAdapter for SilentAdapter {
    fn set_listener(&self, _listener: Weak<dyn AdapterListener>) {}

    fn initialize(&self, _credential: &Credential) -> Result<(), SdkError> {
        Ok(())
    }

    fn authenticate(&self, _credential: &Credential) -> Result<(), SdkError> {
        Ok(())
    }

    fn join_meeting(&self, _request: &JoinRequest) -> Result<(), SdkError> {
        Ok(())
    }

    fn leave_meeting(&self) -> Result<(), SdkError> {
        Ok(())
    }

    fn subscribe_audio(&self) -> Result<(), SdkError> {
        Ok(())
    }

    fn unsubscribe_audio(&self) -> Result<(), SdkError> {
        Ok(())
    }

    fn cleanup(&self) {}

    fn name(&self) -> &str {
        "silent"
    }
}

#[test]
fn test_missing_callback_times_out() {
    let (sink, _collected) = common::collector();
    let machine = SessionMachine::new(
        Arc::new(SilentAdapter),
        Box::new(SilenceSource),
        sink,
        TerminationSignal::new(),
        SessionConfig {
            callback_timeout: Duration::from_millis(50),
            ..SessionConfig::default()
        },
    );

    let err = machine.initialize(&credential()).unwrap_err();

    assert_eq!(err, SessionError::CallbackTimeout(Duration::from_millis(50)));
    assert_eq!(machine.state(), SessionState::Failed);
    assert!(machine.termination().is_raised());
}

#[test]
fn test_stop_request_interrupts_pending_join() {
    let (sink, _collected) = common::collector();
    let machine = SessionMachine::new(
        Arc::new(SilentAdapter),
        Box::new(SilenceSource),
        sink,
        TerminationSignal::new(),
        SessionConfig::default(),
    );

    // Authenticate by hand: the silent SDK never answers
    let listener: &dyn AdapterListener = &*machine;
    let init = {
        let machine = Arc::clone(&machine);
        thread::spawn(move || machine.initialize(&credential()))
    };
    assert!(wait_for(Duration::from_secs(1), || machine.state() == SessionState::Authenticating));
    listener.on_auth_result(meeting_audio_relay::sdk::AuthResult::Success);
    init.join().unwrap().unwrap();

    let stop = machine.stop_handle();
    let joiner = {
        let machine = Arc::clone(&machine);
        thread::spawn(move || machine.join(&request(16000, 1)))
    };
    assert!(wait_for(Duration::from_secs(1), || machine.state() == SessionState::Joining));

    stop.request_stop("test");
    assert_eq!(joiner.join().unwrap().unwrap_err(), SessionError::Interrupted);

    machine.shutdown();
    assert_eq!(machine.state(), SessionState::Terminated);
}

#[test]
fn test_join_answered_after_stop_request_is_left_without_subscribing() {
    let h = harness(SimulationConfig {
        callback_delay_ms: 100,
        ..simulation(CallbackMode::Threaded)
    });
    h.machine.initialize(&credential()).unwrap();

    let joiner = {
        let machine = Arc::clone(&h.machine);
        thread::spawn(move || machine.join(&request(16000, 1)))
    };
    assert!(wait_for(Duration::from_secs(1), || h.machine.state() == SessionState::Joining));

    h.machine.stop_handle().request_stop("test");
    assert_eq!(joiner.join().unwrap().unwrap_err(), SessionError::Interrupted);

    // The SDK still reports the join; the session leaves right away
    assert!(wait_for(Duration::from_secs(2), || h.machine.state() == SessionState::Terminated));

    let calls = h.adapter.calls();
    assert_eq!(calls.subscribe, 0);
    assert_eq!(calls.leave, 1);
    assert!(!h.machine.snapshot().audio_subscribed());

    h.machine.shutdown();
    assert_eq!(h.machine.join_pipeline(), None);
    assert_eq!(h.collected.len(), 0);
}
