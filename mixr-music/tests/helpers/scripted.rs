//! Scripted backend for session and registry tests
//!
//! The decoder renders a byte ramp of a fixed length per pass and records
//! every call in shared counters. Open and decoder creation can be made to
//! fail on demand.

use mixr_music::audio::spec::{AudioSpec, DEFAULT_UNIT_FRAMES};
use mixr_music::error::{Error, Result};
use mixr_music::music::{
    Capabilities, Capability, MetaTag, MusicBackend, MusicDecoder, MusicSource, MusicType,
    Rendered, SourceStream,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// How the scripted decoder reports the end of a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndSignal {
    /// `end_of_stream` set on the render that returns the last bytes
    WithLastData,
    /// Last bytes returned normally, then a separate empty end render
    Separate,
    /// Never sets `end_of_stream`; a short render is the only hint
    ShortOnly,
}

/// Decoder behaviour
#[derive(Debug, Clone)]
pub struct Script {
    pub native: AudioSpec,
    pub frames_per_pass: usize,
    pub unit_frames: usize,
    /// Cap on frames per render, to simulate underruns
    pub max_render_frames: Option<usize>,
    pub end_signal: EndSignal,
    pub capabilities: Capabilities,
    pub music_types: &'static [MusicType],
    pub title: Option<&'static str>,
}

impl Script {
    pub fn new(native: AudioSpec, frames_per_pass: usize) -> Self {
        Self {
            native,
            frames_per_pass,
            unit_frames: DEFAULT_UNIT_FRAMES,
            max_render_frames: None,
            end_signal: EndSignal::WithLastData,
            capabilities: Capabilities::NONE
                .with(Capability::Seek)
                .with(Capability::Tell)
                .with(Capability::Duration)
                .with(Capability::Stop),
            music_types: &[MusicType::Midi],
            title: None,
        }
    }

    pub fn unit_frames(mut self, frames: usize) -> Self {
        self.unit_frames = frames;
        self
    }

    pub fn end_signal(mut self, signal: EndSignal) -> Self {
        self.end_signal = signal;
        self
    }

    pub fn capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn max_render_frames(mut self, frames: usize) -> Self {
        self.max_render_frames = Some(frames);
        self
    }
}

/// Call counters shared between a backend and its decoders
#[derive(Debug, Default)]
pub struct Counters {
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
    pub decoders_created: AtomicUsize,
    pub decoders_dropped: AtomicUsize,
    pub starts: AtomicUsize,
    pub seeks: AtomicUsize,
    pub renders: AtomicUsize,
    pub stops: AtomicUsize,
    pub last_volume: AtomicUsize,
    /// Ordered lifecycle events ("open", "close", "decoder_drop")
    pub events: Mutex<Vec<&'static str>>,
}

impl Counters {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::SeqCst);
    }

    fn event(&self, name: &'static str) {
        self.events.lock().unwrap().push(name);
    }

    pub fn events(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().clone()
    }
}

pub struct ScriptedBackend {
    name: &'static str,
    script: Script,
    pub counters: Arc<Counters>,
    pub fail_open: AtomicBool,
    pub fail_create: AtomicBool,
}

impl ScriptedBackend {
    pub fn new(name: &'static str, script: Script) -> Arc<Self> {
        Arc::new(Self {
            name,
            script,
            counters: Arc::new(Counters::default()),
            fail_open: AtomicBool::new(false),
            fail_create: AtomicBool::new(false),
        })
    }
}

impl MusicBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        self.name
    }

    fn music_types(&self) -> &'static [MusicType] {
        self.script.music_types
    }

    fn open(&self, _target: &AudioSpec) -> Result<()> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(Error::BackendInit {
                backend: self.name,
                message: "scripted open failure".into(),
            });
        }
        Counters::bump(&self.counters.opens);
        self.counters.event("open");
        Ok(())
    }

    fn close(&self) {
        Counters::bump(&self.counters.closes);
        self.counters.event("close");
    }

    fn create_decoder(&self, source: MusicSource, _target: &AudioSpec) -> Result<Box<dyn MusicDecoder>> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(Error::Decode("scripted load failure".into()));
        }
        Counters::bump(&self.counters.decoders_created);
        Ok(Box::new(ScriptedDecoder {
            name: self.name,
            script: self.script.clone(),
            counters: Arc::clone(&self.counters),
            position: 0,
            active: false,
            end_sent: false,
            source: source.finish(),
        }))
    }
}

struct ScriptedDecoder {
    name: &'static str,
    script: Script,
    counters: Arc<Counters>,
    /// Frames produced in the current pass
    position: usize,
    active: bool,
    end_sent: bool,
    source: Option<Box<dyn SourceStream>>,
}

impl MusicDecoder for ScriptedDecoder {
    fn backend_name(&self) -> &'static str {
        self.name
    }

    fn capabilities(&self) -> Capabilities {
        self.script.capabilities
    }

    fn native_spec(&self) -> AudioSpec {
        self.script.native
    }

    fn unit_frames(&self) -> usize {
        self.script.unit_frames
    }

    fn start(&mut self) -> Result<()> {
        Counters::bump(&self.counters.starts);
        self.position = 0;
        self.active = true;
        self.end_sent = false;
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn render(&mut self, out: &mut [u8]) -> Result<Rendered> {
        Counters::bump(&self.counters.renders);
        let spec = self.script.native;
        let remaining = self.script.frames_per_pass - self.position;
        let mut frames = spec.frames_in(out.len()).min(remaining);
        if let Some(cap) = self.script.max_render_frames {
            frames = frames.min(cap);
        }

        let start = spec.bytes_for_frames(self.position);
        let bytes = spec.bytes_for_frames(frames);
        for (i, b) in out[..bytes].iter_mut().enumerate() {
            *b = ((start + i) % 251) as u8;
        }
        self.position += frames;

        let at_end = self.position == self.script.frames_per_pass;
        let end = match self.script.end_signal {
            EndSignal::WithLastData => at_end,
            EndSignal::Separate => {
                let end = at_end && frames == 0 && !self.end_sent;
                if end {
                    self.end_sent = true;
                }
                end
            }
            EndSignal::ShortOnly => false,
        };

        if end {
            self.active = false;
            Ok(Rendered::end(bytes))
        } else {
            Ok(Rendered::more(bytes))
        }
    }

    fn set_volume(&mut self, volume: u8) -> Result<()> {
        self.counters.last_volume.store(volume as usize, Ordering::SeqCst);
        Ok(())
    }

    fn seek(&mut self, position: f64) -> Result<()> {
        Counters::bump(&self.counters.seeks);
        let frame = (position * self.script.native.frequency as f64) as usize;
        self.position = frame.min(self.script.frames_per_pass);
        Ok(())
    }

    fn tell(&self) -> Result<f64> {
        Ok(self.position as f64 / self.script.native.frequency as f64)
    }

    fn duration(&self) -> Result<f64> {
        Ok(self.script.frames_per_pass as f64 / self.script.native.frequency as f64)
    }

    fn meta_tag(&self, tag: MetaTag) -> Result<Option<String>> {
        Ok(match tag {
            MetaTag::Title => self.script.title.map(str::to_string),
            _ => None,
        })
    }

    fn stop(&mut self) -> Result<()> {
        Counters::bump(&self.counters.stops);
        self.active = false;
        Ok(())
    }

    fn take_source(&mut self) -> Option<Box<dyn SourceStream>> {
        self.source.take()
    }
}

impl Drop for ScriptedDecoder {
    fn drop(&mut self) {
        Counters::bump(&self.counters.decoders_dropped);
        self.counters.event("decoder_drop");
    }
}
