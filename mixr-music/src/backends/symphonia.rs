//! Compressed-audio backend using symphonia
//!
//! Probes the source by content, decodes the default track to interleaved
//! `f32` at its native rate and channel count, and streams from the source for
//! the whole session. The session's format adapter converts to the target.

use crate::audio::spec::{AudioSpec, SampleFormat};
use crate::error::{Error, Result};
use crate::music::interface::{
    Capabilities, Capability, MetaTag, MusicBackend, MusicDecoder, MusicType, Rendered,
};
use crate::music::source::{MusicSource, SourceStream};
use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::{MetadataOptions, MetadataRevision, StandardTagKey};
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;
use tracing::{debug, warn};

pub const BACKEND_NAME: &str = "symphonia";

/// Lets symphonia read from a [`SourceStream`]
struct StreamSource(Box<dyn SourceStream>);

impl Read for StreamSource {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.0.read(buf)
    }
}

impl Seek for StreamSource {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.0.seek(pos)
    }
}

impl MediaSource for StreamSource {
    fn is_seekable(&self) -> bool {
        self.0.is_seekable()
    }

    fn byte_len(&self) -> Option<u64> {
        self.0.byte_len()
    }
}

/// Backend for every format symphonia was built with
#[derive(Debug, Default)]
pub struct SymphoniaBackend;

impl SymphoniaBackend {
    pub fn new() -> Self {
        Self
    }
}

impl MusicBackend for SymphoniaBackend {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    fn music_types(&self) -> &'static [MusicType] {
        &[MusicType::Wav, MusicType::Ogg, MusicType::Mp3, MusicType::Flac]
    }

    fn open(&self, _target: &AudioSpec) -> Result<()> {
        // Codec and probe registries are static inside symphonia
        Ok(())
    }

    fn close(&self) {}

    fn create_decoder(&self, source: MusicSource, _target: &AudioSpec) -> Result<Box<dyn MusicDecoder>> {
        Ok(Box::new(SymphoniaDecoder::new(source)?))
    }
}

struct SymphoniaDecoder {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    spec: AudioSpec,
    n_frames: Option<u64>,
    tags: HashMap<MetaTag, String>,

    /// Decoded samples not yet rendered
    pending: Vec<f32>,
    pending_offset: usize,
    sample_buf: Option<SampleBuffer<f32>>,
    frames_delivered: u64,
    active: bool,
    exhausted: bool,
}

impl SymphoniaDecoder {
    fn new(source: MusicSource) -> Result<Self> {
        let mss = MediaSourceStream::new(
            Box::new(StreamSource(source.into_stream())),
            Default::default(),
        );

        let mut probed = symphonia::default::get_probe()
            .format(
                &Hint::new(),
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| Error::Decode(format!("Failed to probe format: {}", e)))?;

        let mut tags = HashMap::new();
        if let Some(revision) = probed.metadata.get().as_ref().and_then(|m| m.current()) {
            collect_tags(revision, &mut tags);
        }
        let mut format = probed.format;
        if let Some(revision) = format.metadata().current() {
            collect_tags(revision, &mut tags);
        }

        let track = format
            .default_track()
            .filter(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .or_else(|| {
                format
                    .tracks()
                    .iter()
                    .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            })
            .ok_or_else(|| Error::Decode("No audio track found".to_string()))?;

        let track_id = track.id;
        let params = track.codec_params.clone();
        let frequency = params
            .sample_rate
            .ok_or_else(|| Error::Decode("Sample rate not found".to_string()))?;
        let channels = params
            .channels
            .map(|c| c.count() as u16)
            .ok_or_else(|| Error::Decode("Channel count not found".to_string()))?;

        let decoder = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|e| Error::Decode(format!("Failed to create decoder: {}", e)))?;

        let spec = AudioSpec::new(frequency, SampleFormat::F32, channels);
        spec.validate()?;

        debug!(
            "Symphonia track {}: {} ({} frames), {} tag(s)",
            track_id,
            spec,
            params
                .n_frames
                .map(|n| n.to_string())
                .unwrap_or_else(|| "unknown".into()),
            tags.len()
        );

        Ok(Self {
            format,
            decoder,
            track_id,
            spec,
            n_frames: params.n_frames,
            tags,
            pending: Vec::new(),
            pending_offset: 0,
            sample_buf: None,
            frames_delivered: 0,
            active: false,
            exhausted: false,
        })
    }

    /// Decode packets until samples are pending.
    ///
    /// Returns false at end of stream.
    fn decode_next(&mut self) -> Result<bool> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(false);
                }
                Err(SymphoniaError::ResetRequired) => {
                    debug!("Symphonia stream reset required, treating as end of stream");
                    return Ok(false);
                }
                Err(e) => return Err(Error::Decode(format!("Error reading packet: {}", e))),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    if decoded.frames() == 0 {
                        continue;
                    }
                    let spec = *decoded.spec();
                    let needed = decoded.capacity() * spec.channels.count();
                    let reuse = self
                        .sample_buf
                        .as_ref()
                        .map(|b| b.capacity() >= needed)
                        .unwrap_or(false);
                    if !reuse {
                        self.sample_buf = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
                    }
                    if let Some(buf) = self.sample_buf.as_mut() {
                        buf.copy_interleaved_ref(decoded);
                        self.pending.clear();
                        self.pending_offset = 0;
                        self.pending.extend_from_slice(buf.samples());
                    }
                    return Ok(true);
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!("Decode error: {}", e);
                    continue;
                }
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(false);
                }
                Err(e) => return Err(Error::Decode(format!("Decode failed: {}", e))),
            }
        }
    }

    fn discard_pending(&mut self) {
        self.pending.clear();
        self.pending_offset = 0;
    }

    fn seek_to(&mut self, position: f64) -> Result<()> {
        let seeked = self
            .format
            .seek(
                SeekMode::Accurate,
                SeekTo::Time {
                    time: Time::from(position),
                    track_id: Some(self.track_id),
                },
            )
            .map_err(|e| Error::Decode(format!("Seek to {:.3}s failed: {}", position, e)))?;
        self.decoder.reset();
        self.discard_pending();
        self.exhausted = false;
        self.frames_delivered = seeked.required_ts;

        // The reader lands on a packet boundary at or before the request
        let channels = self.spec.channels as usize;
        let mut skip = seeked.required_ts.saturating_sub(seeked.actual_ts) as usize * channels;
        while skip > 0 {
            if !self.decode_next()? {
                self.exhausted = true;
                break;
            }
            let n = skip.min(self.pending.len());
            self.pending_offset = n;
            skip -= n;
        }
        Ok(())
    }
}

fn collect_tags(revision: &MetadataRevision, tags: &mut HashMap<MetaTag, String>) {
    for tag in revision.tags() {
        let key = match tag.std_key {
            Some(StandardTagKey::TrackTitle) => MetaTag::Title,
            Some(StandardTagKey::Artist) => MetaTag::Artist,
            Some(StandardTagKey::Album) => MetaTag::Album,
            Some(StandardTagKey::Copyright) => MetaTag::Copyright,
            _ => continue,
        };
        tags.entry(key).or_insert_with(|| tag.value.to_string());
    }
}

impl MusicDecoder for SymphoniaDecoder {
    fn backend_name(&self) -> &'static str {
        BACKEND_NAME
    }

    fn capabilities(&self) -> Capabilities {
        let caps = Capabilities::NONE
            .with(Capability::Seek)
            .with(Capability::Tell)
            .with(Capability::Stop)
            .with(Capability::MetaTags)
            .with(Capability::Unload);
        if self.n_frames.is_some() {
            caps.with(Capability::Duration)
        } else {
            caps
        }
    }

    fn native_spec(&self) -> AudioSpec {
        self.spec
    }

    fn start(&mut self) -> Result<()> {
        if self.frames_delivered != 0 || self.exhausted {
            self.seek_to(0.0)?;
        }
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

        let channels = self.spec.channels as usize;
        let wanted = self.spec.frames_in(out.len()) * channels;
        let mut written = 0;

        while written < wanted {
            if self.pending_offset >= self.pending.len() {
                if self.exhausted || !self.decode_next()? {
                    self.exhausted = true;
                    self.active = false;
                    break;
                }
            }
            let take = (self.pending.len() - self.pending_offset).min(wanted - written);
            let src = &self.pending[self.pending_offset..self.pending_offset + take];
            for (sample, dst) in src.iter().zip(out[written * 4..].chunks_exact_mut(4)) {
                dst.copy_from_slice(&sample.to_le_bytes());
            }
            self.pending_offset += take;
            written += take;
        }

        self.frames_delivered += (written / channels) as u64;
        let bytes = written * 4;
        if self.active {
            Ok(Rendered::more(bytes))
        } else {
            Ok(Rendered::end(bytes))
        }
    }

    fn seek(&mut self, position: f64) -> Result<()> {
        self.seek_to(position)
    }

    fn tell(&self) -> Result<f64> {
        Ok(self.frames_delivered as f64 / self.spec.frequency as f64)
    }

    fn duration(&self) -> Result<f64> {
        self.n_frames
            .map(|n| n as f64 / self.spec.frequency as f64)
            .ok_or_else(|| Error::unsupported("Duration", BACKEND_NAME))
    }

    fn meta_tag(&self, tag: MetaTag) -> Result<Option<String>> {
        Ok(self.tags.get(&tag).cloned())
    }

    fn stop(&mut self) -> Result<()> {
        self.active = false;
        Ok(())
    }

    fn unload(&mut self) -> Result<()> {
        self.active = false;
        self.exhausted = true;
        self.pending = Vec::new();
        self.pending_offset = 0;
        self.sample_buf = None;
        Ok(())
    }
}
