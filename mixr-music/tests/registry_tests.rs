//! Integration tests for the backend registry
//!
//! Process-wide open/close is reference counted across leases and sessions.

mod helpers;

use helpers::{Counters, Script, ScriptedBackend};
use mixr_music::audio::spec::{AudioSpec, SampleFormat};
use mixr_music::error::Error;
use mixr_music::music::{BackendRegistry, MusicSession, MusicSource, MusicType, SessionOptions};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;

const TARGET: AudioSpec = AudioSpec::new(44100, SampleFormat::S16, 2);

fn registry_with(name: &'static str) -> (Arc<BackendRegistry>, Arc<ScriptedBackend>) {
    let registry = BackendRegistry::new(TARGET).unwrap();
    let backend = ScriptedBackend::new(name, Script::new(TARGET, 100));
    registry.register(backend.clone()).unwrap();
    (registry, backend)
}

#[test]
fn test_open_once_close_after_last_release() {
    let (registry, backend) = registry_with("alpha");

    let first = registry.acquire("alpha").unwrap();
    let second = registry.acquire("alpha").unwrap();
    let third = first.clone();
    assert_eq!(Counters::get(&backend.counters.opens), 1);
    assert_eq!(registry.open_count("alpha"), 3);

    drop(first);
    drop(third);
    assert_eq!(Counters::get(&backend.counters.closes), 0);

    drop(second);
    assert_eq!(Counters::get(&backend.counters.closes), 1);
    assert_eq!(registry.open_count("alpha"), 0);
}

#[test]
fn test_sessions_hold_backend_open() {
    let (registry, backend) = registry_with("alpha");
    let lease = registry.acquire("alpha").unwrap();

    let sessions: Vec<MusicSession> = (0..3)
        .map(|_| {
            MusicSession::create(&lease, MusicSource::from_bytes(Vec::new()), SessionOptions::default())
                .unwrap()
        })
        .collect();
    drop(lease);
    assert_eq!(registry.open_count("alpha"), 3);

    drop(sessions);
    assert_eq!(registry.open_count("alpha"), 0);
    assert_eq!(Counters::get(&backend.counters.opens), 1);
    assert_eq!(Counters::get(&backend.counters.closes), 1);
}

#[test]
fn test_reopen_after_close() {
    let (registry, backend) = registry_with("alpha");
    drop(registry.acquire("alpha").unwrap());
    drop(registry.acquire("alpha").unwrap());
    assert_eq!(Counters::get(&backend.counters.opens), 2);
    assert_eq!(Counters::get(&backend.counters.closes), 2);
}

#[test]
fn test_unknown_backend() {
    let (registry, _backend) = registry_with("alpha");
    let err = registry.acquire("beta").unwrap_err();
    assert!(matches!(err, Error::BackendUnavailable(_)));
}

#[test]
fn test_duplicate_registration_rejected() {
    let (registry, _backend) = registry_with("alpha");
    let again = ScriptedBackend::new("alpha", Script::new(TARGET, 1));
    assert!(registry.register(again).is_err());
    assert_eq!(registry.backend_names(), vec!["alpha"]);
}

#[test]
fn test_failed_open_leaves_backend_closed() {
    let (registry, backend) = registry_with("alpha");
    backend.fail_open.store(true, Ordering::SeqCst);

    let err = registry.acquire("alpha").unwrap_err();
    assert!(matches!(err, Error::BackendInit { .. }));
    assert_eq!(registry.open_count("alpha"), 0);

    // A later acquire retries the open
    backend.fail_open.store(false, Ordering::SeqCst);
    let lease = registry.acquire("alpha").unwrap();
    assert_eq!(Counters::get(&backend.counters.opens), 1);
    drop(lease);
    assert_eq!(Counters::get(&backend.counters.closes), 1);
}

#[test]
fn test_acquire_for_skips_failing_backend() {
    let registry = BackendRegistry::new(TARGET).unwrap();
    let broken = ScriptedBackend::new("broken", Script::new(TARGET, 1));
    let working = ScriptedBackend::new("working", Script::new(TARGET, 1));
    broken.fail_open.store(true, Ordering::SeqCst);
    registry.register(broken.clone()).unwrap();
    registry.register(working.clone()).unwrap();

    let lease = registry.acquire_for(MusicType::Midi).unwrap();
    assert_eq!(lease.name(), "working");

    let err = registry.acquire_for(MusicType::Flac).unwrap_err();
    assert!(matches!(err, Error::BackendUnavailable(_)));
}

#[test]
fn test_invalid_target_rejected() {
    let zero_channels = AudioSpec::new(44100, SampleFormat::S16, 0);
    assert!(matches!(
        BackendRegistry::new(zero_channels),
        Err(Error::InvalidSpec(_))
    ));
}

#[test]
fn test_concurrent_leases_balance() {
    let (registry, backend) = registry_with("alpha");

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                for _ in 0..200 {
                    let lease = registry.acquire("alpha").unwrap();
                    let copy = lease.clone();
                    drop(lease);
                    drop(copy);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(registry.open_count("alpha"), 0);
    assert_eq!(
        Counters::get(&backend.counters.opens),
        Counters::get(&backend.counters.closes)
    );
}
