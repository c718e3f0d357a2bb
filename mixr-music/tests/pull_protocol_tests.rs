//! Integration tests for the pull protocol through a format adapter
//!
//! Checks drain-before-decode ordering, byte accounting across loop
//! boundaries, channel and rate conversion, and end detection policies.

mod helpers;

use helpers::{Counters, EndSignal, Script, ScriptedBackend};
use mixr_music::audio::spec::{AudioSpec, SampleFormat};
use mixr_music::music::{
    BackendLease, BackendRegistry, EndDetection, MusicSession, MusicSource, PlayCount, PullStatus,
    SessionOptions,
};
use std::sync::Arc;

fn setup(target: AudioSpec, script: Script) -> (Arc<ScriptedBackend>, BackendLease) {
    let registry = BackendRegistry::new(target).unwrap();
    let backend = ScriptedBackend::new("scripted", script);
    registry.register(backend.clone()).unwrap();
    let lease = registry.acquire("scripted").unwrap();
    (backend, lease)
}

fn open(lease: &BackendLease, options: SessionOptions) -> MusicSession {
    MusicSession::create(lease, MusicSource::from_bytes(Vec::new()), options).unwrap()
}

/// Pull until done; returns (bytes, final status)
fn drain(session: &mut MusicSession, pull_bytes: usize) -> (usize, PullStatus) {
    let mut buf = vec![0u8; pull_bytes];
    let mut total = 0;
    for _ in 0..100_000 {
        let pull = session.get_audio(&mut buf).unwrap();
        total += pull.written;
        if pull.is_done() {
            return (total, pull.status);
        }
    }
    panic!("session never finished ({} bytes)", total);
}

#[test]
fn test_drain_before_decode() {
    let native = AudioSpec::new(44100, SampleFormat::S16, 1);
    let target = AudioSpec::new(44100, SampleFormat::S16, 2);
    let (backend, lease) = setup(target, Script::new(native, 100_000).unit_frames(1024));
    let mut session = open(&lease, SessionOptions::default());
    assert!(session.has_adapter());
    session.play(PlayCount::ONCE).unwrap();

    let mut out = vec![0u8; target.bytes_for_frames(100)];

    // First step decodes one unit into the adapter and returns nothing
    let supply = session.get_some(&mut out).unwrap();
    assert_eq!(supply.written, 0);
    assert!(!supply.done);
    assert_eq!(Counters::get(&backend.counters.renders), 1);
    assert_eq!(session.buffered_bytes(), target.bytes_for_frames(1024));

    // Buffered audio is drained without touching the decoder
    let mut drained = 0;
    while session.buffered_bytes() > 0 {
        let supply = session.get_some(&mut out).unwrap();
        assert!(supply.written > 0);
        drained += supply.written;
        assert_eq!(Counters::get(&backend.counters.renders), 1);
    }
    assert_eq!(drained, target.bytes_for_frames(1024));

    // Only an empty adapter leads to the next decode
    let supply = session.get_some(&mut out).unwrap();
    assert_eq!(supply.written, 0);
    assert_eq!(Counters::get(&backend.counters.renders), 2);
}

#[test]
fn test_data_and_done_never_together() {
    let native = AudioSpec::new(44100, SampleFormat::S16, 1);
    let target = AudioSpec::new(44100, SampleFormat::S16, 2);
    let (_backend, lease) = setup(target, Script::new(native, 5000).unit_frames(512));
    let mut session = open(&lease, SessionOptions::default());
    session.play(PlayCount::times(2)).unwrap();

    let mut out = vec![0u8; target.bytes_for_frames(300)];
    let mut total = 0;
    loop {
        let supply = session.get_some(&mut out).unwrap();
        assert!(!(supply.written > 0 && supply.done));
        total += supply.written;
        if supply.done {
            break;
        }
    }
    assert_eq!(total, target.bytes_for_frames(2 * 5000));
}

#[test]
fn test_byte_accounting_across_loops() {
    let native = AudioSpec::new(22050, SampleFormat::U8, 1);
    let target = AudioSpec::new(22050, SampleFormat::S16, 2);
    let (_backend, lease) = setup(target, Script::new(native, 1000).unit_frames(256));
    let mut session = open(&lease, SessionOptions::default());
    session.play(PlayCount::times(2)).unwrap();

    let (total, status) = drain(&mut session, target.bytes_for_frames(333));
    assert_eq!(total, target.bytes_for_frames(2 * 1000));
    assert_eq!(status, PullStatus::Finished);
}

#[test]
fn test_six_channels_to_stereo_keeps_duration() {
    let native = AudioSpec::new(44100, SampleFormat::S16, 6);
    let target = AudioSpec::new(44100, SampleFormat::S16, 2);
    let (_backend, lease) = setup(target, Script::new(native, 4410));
    let mut session = open(&lease, SessionOptions::default());
    assert_eq!(session.native_spec().channels, 6);
    session.play(PlayCount::ONCE).unwrap();

    let (total, status) = drain(&mut session, target.bytes_for_frames(1000));
    assert_eq!(status, PullStatus::Finished);
    assert_eq!(target.frames_in(total), 4410);
    assert!((target.seconds_for_bytes(total) - 0.1).abs() < 1e-9);
}

#[test]
fn test_rate_conversion_flushes_at_end() {
    let native = AudioSpec::new(48000, SampleFormat::F32, 1);
    let target = AudioSpec::new(44100, SampleFormat::S16, 2);
    let (_backend, lease) = setup(target, Script::new(native, 4800).unit_frames(1024));
    let mut session = open(&lease, SessionOptions::default());
    session.play(PlayCount::ONCE).unwrap();

    let (total, status) = drain(&mut session, target.bytes_for_frames(512));
    assert_eq!(status, PullStatus::Finished);

    // 0.1 s of audio at the new rate, give or take the resampler delay
    let frames = target.frames_in(total);
    assert!((4300..=4500).contains(&frames), "got {} frames", frames);
}

#[test]
fn test_seek_discards_buffered_audio() {
    let native = AudioSpec::new(44100, SampleFormat::S16, 1);
    let target = AudioSpec::new(44100, SampleFormat::S16, 2);
    let (_backend, lease) = setup(target, Script::new(native, 44_100).unit_frames(1024));
    let mut session = open(&lease, SessionOptions::default());
    session.play(PlayCount::ONCE).unwrap();

    let mut out = vec![0u8; target.bytes_for_frames(10)];
    session.get_some(&mut out).unwrap();
    assert!(session.buffered_bytes() > 0);

    session.seek(0.0).unwrap();
    assert_eq!(session.buffered_bytes(), 0);
    assert_eq!(session.tell().unwrap(), 0.0);
}

#[test]
fn test_stop_discards_buffered_audio() {
    let native = AudioSpec::new(44100, SampleFormat::S16, 1);
    let target = AudioSpec::new(44100, SampleFormat::S16, 2);
    let (_backend, lease) = setup(target, Script::new(native, 44_100).unit_frames(1024));
    let mut session = open(&lease, SessionOptions::default());
    session.play(PlayCount::ONCE).unwrap();

    let mut out = vec![0u8; target.bytes_for_frames(10)];
    session.get_some(&mut out).unwrap();
    session.stop().unwrap();

    let supply = session.get_some(&mut out).unwrap();
    assert_eq!(supply.written, 0);
    assert!(supply.done);
}

#[test]
fn test_short_read_ends_pass_when_enabled() {
    let spec = AudioSpec::new(44100, SampleFormat::S16, 2);
    let script = Script::new(spec, 10_000).end_signal(EndSignal::ShortOnly);
    let (_backend, lease) = setup(spec, script);

    let options = SessionOptions {
        end_detection: EndDetection::ShortRead,
        unit_frames: None,
    };
    let mut session = open(&lease, options);
    session.play(PlayCount::ONCE).unwrap();

    let (total, status) = drain(&mut session, spec.bytes_for_frames(4096));
    assert_eq!(total, spec.bytes_for_frames(10_000));
    assert_eq!(status, PullStatus::Finished);
}

#[test]
fn test_short_read_is_underrun_by_default() {
    let spec = AudioSpec::new(44100, SampleFormat::S16, 2);
    let script = Script::new(spec, 10_000).max_render_frames(100);
    let (_backend, lease) = setup(spec, script);
    let mut session = open(&lease, SessionOptions::default());
    session.play(PlayCount::ONCE).unwrap();

    // Short renders keep the session playing until the real end
    let mut buf = vec![0u8; spec.bytes_for_frames(4096)];
    let pull = session.get_audio(&mut buf).unwrap();
    assert_eq!(pull.written, buf.len());
    assert_eq!(pull.status, PullStatus::Streaming);

    let (rest, status) = drain(&mut session, spec.bytes_for_frames(4096));
    assert_eq!(pull.written + rest, spec.bytes_for_frames(10_000));
    assert_eq!(status, PullStatus::Finished);
}

#[test]
fn test_short_read_policy_with_short_renders_stops_early() {
    let spec = AudioSpec::new(44100, SampleFormat::S16, 2);
    let script = Script::new(spec, 10_000).max_render_frames(100);
    let (_backend, lease) = setup(spec, script);
    let options = SessionOptions {
        end_detection: EndDetection::ShortRead,
        unit_frames: None,
    };
    let mut session = open(&lease, options);
    session.play(PlayCount::ONCE).unwrap();

    let (total, status) = drain(&mut session, spec.bytes_for_frames(4096));
    assert_eq!(total, spec.bytes_for_frames(100));
    assert_eq!(status, PullStatus::Finished);
}

#[test]
fn test_unit_frames_override_sizes_scratch() {
    let native = AudioSpec::new(44100, SampleFormat::S16, 1);
    let target = AudioSpec::new(44100, SampleFormat::S16, 2);
    let (_backend, lease) = setup(target, Script::new(native, 10_000).unit_frames(1024));
    let options = SessionOptions {
        end_detection: EndDetection::EndOfStream,
        unit_frames: Some(128),
    };
    let mut session = open(&lease, options);
    session.play(PlayCount::ONCE).unwrap();

    let mut out = vec![0u8; target.bytes_for_frames(10)];
    session.get_some(&mut out).unwrap();
    assert_eq!(session.buffered_bytes(), target.bytes_for_frames(128));
}
