//! Song text format for the synth backend
//!
//! One statement per line, `#` starts a comment:
//!
//! ```text
//! title "Scale"
//! tempo 120
//! track
//! program 1
//! note 0 1 60 100       # beat, length in beats, key, velocity
//! note 1 1 62 100 3     # optional per-note program
//! ```
//!
//! Notes before the first `track` line belong to an implicit first track.

use crate::error::{Error, Result};

pub const DEFAULT_TEMPO: f64 = 120.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    pub start_beat: f64,
    pub beats: f64,
    pub key: u8,
    pub velocity: u8,
    pub program: u8,
}

impl Note {
    pub fn end_beat(&self) -> f64 {
        self.start_beat + self.beats
    }

    /// Equal-tempered frequency, key 69 = A4 = 440 Hz
    pub fn frequency(&self) -> f64 {
        440.0 * 2f64.powf((self.key as f64 - 69.0) / 12.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Track {
    pub notes: Vec<Note>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Song {
    pub title: Option<String>,
    /// Beats per minute
    pub tempo: f64,
    /// Never empty
    pub tracks: Vec<Track>,
}

impl Song {
    pub fn parse(text: &str) -> Result<Song> {
        let mut title = None;
        let mut tempo = DEFAULT_TEMPO;
        let mut tracks: Vec<Track> = Vec::new();
        let mut program = 0u8;

        for (index, raw) in text.lines().enumerate() {
            let line_no = index + 1;
            let line = raw.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }

            let (keyword, rest) = match line.split_once(char::is_whitespace) {
                Some((k, r)) => (k, r.trim()),
                None => (line, ""),
            };

            match keyword {
                "title" => title = Some(parse_title(rest, line_no)?),
                "tempo" => {
                    tempo = parse_number::<f64>(rest, "tempo", line_no)?;
                    if !(tempo.is_finite() && tempo > 0.0) {
                        return Err(syntax(line_no, "tempo must be positive"));
                    }
                }
                "track" => {
                    tracks.push(Track::default());
                    program = 0;
                }
                "program" => program = parse_number::<u8>(rest, "program", line_no)?,
                "note" => {
                    let note = parse_note(rest, program, line_no)?;
                    if tracks.is_empty() {
                        tracks.push(Track::default());
                    }
                    if let Some(track) = tracks.last_mut() {
                        track.notes.push(note);
                    }
                }
                other => {
                    return Err(syntax(line_no, &format!("unknown statement '{}'", other)));
                }
            }
        }

        if tracks.is_empty() {
            tracks.push(Track::default());
        }

        Ok(Song {
            title,
            tempo,
            tracks,
        })
    }

    pub fn seconds_per_beat(&self) -> f64 {
        60.0 / self.tempo
    }
}

fn parse_title(rest: &str, line_no: usize) -> Result<String> {
    rest.strip_prefix('"')
        .and_then(|r| r.strip_suffix('"'))
        .map(str::to_string)
        .ok_or_else(|| syntax(line_no, "title must be quoted"))
}

fn parse_number<T: std::str::FromStr>(text: &str, what: &str, line_no: usize) -> Result<T> {
    text.parse()
        .map_err(|_| syntax(line_no, &format!("invalid {} '{}'", what, text)))
}

fn parse_note(rest: &str, program: u8, line_no: usize) -> Result<Note> {
    let fields: Vec<&str> = rest.split_whitespace().collect();
    if !(4..=5).contains(&fields.len()) {
        return Err(syntax(
            line_no,
            "note needs: beat length key velocity [program]",
        ));
    }

    let start_beat: f64 = parse_number(fields[0], "beat", line_no)?;
    let beats: f64 = parse_number(fields[1], "length", line_no)?;
    let key: u8 = parse_number(fields[2], "key", line_no)?;
    let velocity: u8 = parse_number(fields[3], "velocity", line_no)?;
    let program = match fields.get(4) {
        Some(p) => parse_number(p, "program", line_no)?,
        None => program,
    };

    if !(start_beat.is_finite() && start_beat >= 0.0) {
        return Err(syntax(line_no, "note beat must be non-negative"));
    }
    if !(beats.is_finite() && beats > 0.0) {
        return Err(syntax(line_no, "note length must be positive"));
    }
    if key > 127 || velocity > 127 {
        return Err(syntax(line_no, "key and velocity must be 0-127"));
    }

    Ok(Note {
        start_beat,
        beats,
        key,
        velocity,
        program,
    })
}

fn syntax(line_no: usize, message: &str) -> Error {
    Error::Decode(format!("song line {}: {}", line_no, message))
}
