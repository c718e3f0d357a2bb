//! Synth decoder: renders one song track with the instrument bank

use super::patches::{Instrument, InstrumentBank, Waveform};
use super::song::Song;
use super::BACKEND_NAME;
use crate::audio::sample::write_from_f32;
use crate::audio::spec::{AudioSpec, MAX_VOLUME};
use crate::error::{Error, Result};
use crate::music::interface::{Capabilities, Capability, MetaTag, MusicDecoder, Rendered};
use crate::music::source::SourceStream;
use std::sync::Arc;
use tracing::debug;

/// Per-voice level; leaves room for a few overlapping notes
const VOICE_HEADROOM: f32 = 0.25;

/// Longest track a song may schedule
const MAX_TRACK_SECONDS: f64 = 24.0 * 60.0 * 60.0;

/// One scheduled note, in frames
#[derive(Debug, Clone)]
struct Voice {
    start: usize,
    note_off: usize,
    end: usize,
    attack: usize,
    frequency: f64,
    amplitude: f32,
    waveform: Waveform,
}

impl Voice {
    fn new(start: usize, note_off: usize, frequency: f64, velocity: u8, instrument: &Instrument, rate: u32) -> Self {
        let attack = ms_to_frames(instrument.attack_ms, rate);
        let release = ms_to_frames(instrument.release_ms, rate);
        Self {
            start,
            note_off,
            end: note_off.saturating_add(release),
            attack,
            frequency,
            amplitude: velocity as f32 / 127.0 * instrument.gain * VOICE_HEADROOM,
            waveform: instrument.waveform,
        }
    }

    fn envelope(&self, frame: usize) -> f32 {
        let attack_level = |at: usize| -> f32 {
            if self.attack == 0 {
                1.0
            } else {
                ((at - self.start) as f32 / self.attack as f32).min(1.0)
            }
        };

        if frame < self.note_off {
            attack_level(frame)
        } else {
            let release = self.end - self.note_off;
            if release == 0 {
                return 0.0;
            }
            let held = attack_level(self.note_off);
            held * (1.0 - (frame - self.note_off) as f32 / release as f32)
        }
    }

    fn sample_at(&self, frame: usize, rate: u32) -> f32 {
        let phase = (frame - self.start) as f64 * self.frequency / rate as f64;
        self.waveform.sample(phase) * self.envelope(frame) * self.amplitude
    }
}

fn ms_to_frames(ms: u32, rate: u32) -> usize {
    (ms as u64 * rate as u64 / 1000) as usize
}

pub(super) struct SynthDecoder {
    spec: AudioSpec,
    bank: Arc<InstrumentBank>,
    song: Song,
    track: usize,
    voices: Vec<Voice>,
    total_frames: usize,
    position: usize,
    active: bool,
    volume: u8,
    mono: Vec<f32>,
    mix: Vec<f32>,
    source: Option<Box<dyn SourceStream>>,
}

impl SynthDecoder {
    pub(super) fn new(
        spec: AudioSpec,
        bank: Arc<InstrumentBank>,
        song: Song,
        source: Option<Box<dyn SourceStream>>,
    ) -> Result<Self> {
        let mut decoder = Self {
            spec,
            bank,
            song,
            track: 0,
            voices: Vec::new(),
            total_frames: 0,
            position: 0,
            active: false,
            volume: MAX_VOLUME,
            mono: Vec::new(),
            mix: Vec::new(),
            source,
        };
        decoder.voices = decoder.schedule(0)?;
        decoder.select_scheduled(0);
        Ok(decoder)
    }

    /// Build the voice list for `track`.
    ///
    /// # Errors
    /// [`Error::Decode`] when a note ends later than [`MAX_TRACK_SECONDS`].
    fn schedule(&self, track: usize) -> Result<Vec<Voice>> {
        let rate = self.spec.frequency;
        let seconds_per_beat = self.song.seconds_per_beat();
        let frames_per_beat = seconds_per_beat * rate as f64;

        let mut voices = Vec::with_capacity(self.song.tracks[track].notes.len());
        for note in &self.song.tracks[track].notes {
            let end_seconds = note.end_beat() * seconds_per_beat;
            if end_seconds > MAX_TRACK_SECONDS {
                return Err(Error::Decode(format!(
                    "track {}: note at beat {} ends after {:.0}s (limit {:.0}s)",
                    track, note.start_beat, end_seconds, MAX_TRACK_SECONDS
                )));
            }
            let start = (note.start_beat * frames_per_beat).round() as usize;
            let note_off = (note.end_beat() * frames_per_beat).round() as usize;
            let instrument = self.bank.instrument(note.program);
            voices.push(Voice::new(
                start,
                note_off.max(start + 1),
                note.frequency(),
                note.velocity,
                instrument,
                rate,
            ));
        }
        voices.sort_by_key(|v| v.start);
        Ok(voices)
    }

    /// Make the already scheduled voices current for `track`
    fn select_scheduled(&mut self, track: usize) {
        self.track = track;
        self.total_frames = self.voices.iter().map(|v| v.end).max().unwrap_or(0);
        self.position = 0;

        debug!(
            "Synth track {}: {} notes, {} frames",
            self.track,
            self.voices.len(),
            self.total_frames
        );
    }

    fn frames_to_ms(&self, frames: usize) -> u64 {
        frames as u64 * 1000 / self.spec.frequency as u64
    }
}

impl MusicDecoder for SynthDecoder {
    fn backend_name(&self) -> &'static str {
        BACKEND_NAME
    }

    fn capabilities(&self) -> Capabilities {
        [
            Capability::NativeVolume,
            Capability::Seek,
            Capability::Tell,
            Capability::Duration,
            Capability::Stop,
            Capability::MetaTags,
            Capability::Tracks,
        ]
        .into_iter()
        .collect()
    }

    fn native_spec(&self) -> AudioSpec {
        self.spec
    }

    fn start(&mut self) -> Result<()> {
        self.position = 0;
        self.active = true;
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn render(&mut self, out: &mut [u8]) -> Result<Rendered> {
        if !self.active {
            return Ok(Rendered::end(0));
        }

        let frame_size = self.spec.frame_size();
        let channels = self.spec.channels as usize;
        let remaining = self.total_frames.saturating_sub(self.position);
        let frames = (out.len() / frame_size).min(remaining);
        let window = self.position..self.position + frames;

        self.mono.clear();
        self.mono.resize(frames, 0.0);
        let rate = self.spec.frequency;
        for voice in self.voices.iter().take_while(|v| v.start < window.end) {
            let lo = voice.start.max(window.start);
            let hi = voice.end.min(window.end);
            for frame in lo..hi {
                self.mono[frame - window.start] += voice.sample_at(frame, rate);
            }
        }

        let gain = self.volume as f32 / MAX_VOLUME as f32;
        self.mix.clear();
        self.mix.reserve(frames * channels);
        for sample in &self.mono {
            for _ in 0..channels {
                self.mix.push(sample * gain);
            }
        }

        let bytes = frames * frame_size;
        write_from_f32(self.spec.format, &self.mix, &mut out[..bytes]);
        self.position += frames;

        if self.position >= self.total_frames {
            self.active = false;
            Ok(Rendered::end(bytes))
        } else {
            Ok(Rendered::more(bytes))
        }
    }

    fn set_volume(&mut self, volume: u8) -> Result<()> {
        self.volume = volume.min(MAX_VOLUME);
        Ok(())
    }

    fn seek(&mut self, position: f64) -> Result<()> {
        // Past the end lands on the end
        let end_ms = self.frames_to_ms(self.total_frames) + 1;
        let ms = ((position * 1000.0).round() as u64).min(end_ms);
        let frame = ms * self.spec.frequency as u64 / 1000;
        self.position = (frame as usize).min(self.total_frames);
        Ok(())
    }

    fn tell(&self) -> Result<f64> {
        Ok(self.frames_to_ms(self.position) as f64 / 1000.0)
    }

    fn duration(&self) -> Result<f64> {
        Ok(self.frames_to_ms(self.total_frames) as f64 / 1000.0)
    }

    fn meta_tag(&self, tag: MetaTag) -> Result<Option<String>> {
        Ok(match tag {
            MetaTag::Title => self.song.title.clone(),
            _ => None,
        })
    }

    fn num_tracks(&self) -> Result<usize> {
        Ok(self.song.tracks.len())
    }

    fn start_track(&mut self, track: usize) -> Result<()> {
        if track >= self.song.tracks.len() {
            return Err(Error::InvalidState(format!(
                "track {} out of range (song has {})",
                track,
                self.song.tracks.len()
            )));
        }
        self.voices = self.schedule(track)?;
        self.select_scheduled(track);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.active = false;
        Ok(())
    }

    fn take_source(&mut self) -> Option<Box<dyn SourceStream>> {
        self.source.take()
    }
}
