//! Instrument bank for the synth backend
//!
//! A bank maps program numbers to simple oscillator instruments. Banks are
//! TOML files:
//!
//! ```toml
//! [[instrument]]
//! program = 0
//! waveform = "sine"
//! attack_ms = 5
//! release_ms = 80
//! gain = 0.8
//! ```

use mixr_common::config::read_toml_file;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::f64::consts::TAU;
use std::path::Path;

/// Oscillator shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    Sine,
    Square,
    Saw,
    Triangle,
}

impl Waveform {
    /// Value at `phase` (cycles, any real number), range [-1.0, 1.0]
    pub fn sample(self, phase: f64) -> f32 {
        let p = phase.fract();
        let value = match self {
            Waveform::Sine => (p * TAU).sin(),
            Waveform::Square => {
                if p < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            Waveform::Saw => 2.0 * p - 1.0,
            Waveform::Triangle => 1.0 - 4.0 * (p - 0.5).abs(),
        };
        value as f32
    }
}

fn default_attack_ms() -> u32 {
    5
}

fn default_release_ms() -> u32 {
    50
}

fn default_gain() -> f32 {
    0.8
}

/// One playable instrument
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Instrument {
    pub program: u8,
    pub waveform: Waveform,
    #[serde(default = "default_attack_ms")]
    pub attack_ms: u32,
    #[serde(default = "default_release_ms")]
    pub release_ms: u32,
    #[serde(default = "default_gain")]
    pub gain: f32,
}

impl Instrument {
    fn builtin(program: u8, waveform: Waveform) -> Self {
        Self {
            program,
            waveform,
            attack_ms: default_attack_ms(),
            release_ms: default_release_ms(),
            gain: default_gain(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct BankFile {
    #[serde(default)]
    instrument: Vec<Instrument>,
}

/// Program number to instrument lookup
#[derive(Debug, Clone)]
pub struct InstrumentBank {
    instruments: BTreeMap<u8, Instrument>,
}

impl InstrumentBank {
    /// Compiled-in bank: programs 0-3 are sine, square, saw and triangle
    pub fn builtin() -> Self {
        let instruments = [
            Waveform::Sine,
            Waveform::Square,
            Waveform::Saw,
            Waveform::Triangle,
        ]
        .into_iter()
        .enumerate()
        .map(|(program, waveform)| {
            let program = program as u8;
            (program, Instrument::builtin(program, waveform))
        })
        .collect();

        Self { instruments }
    }

    /// Load a bank file
    pub fn load(path: &Path) -> mixr_common::Result<Self> {
        let file: BankFile = read_toml_file(path)?;
        Self::from_instruments(file.instrument).map_err(|e| {
            mixr_common::Error::Config(format!("{}: {}", path.display(), e))
        })
    }

    /// Parse a bank from TOML text
    pub fn from_toml_str(text: &str) -> mixr_common::Result<Self> {
        let file: BankFile = toml::from_str(text)
            .map_err(|e| mixr_common::Error::Config(format!("instrument bank: {}", e)))?;
        Self::from_instruments(file.instrument).map_err(mixr_common::Error::Config)
    }

    fn from_instruments(list: Vec<Instrument>) -> std::result::Result<Self, String> {
        if list.is_empty() {
            return Err("bank defines no instruments".to_string());
        }

        let mut instruments = BTreeMap::new();
        for instrument in list {
            if !(0.0..=4.0).contains(&instrument.gain) {
                return Err(format!(
                    "program {}: gain {} outside 0.0..=4.0",
                    instrument.program, instrument.gain
                ));
            }
            if instruments.insert(instrument.program, instrument).is_some() {
                return Err("duplicate program number".to_string());
            }
        }
        Ok(Self { instruments })
    }

    /// Instrument for `program`, falling back to the lowest program defined
    pub fn instrument(&self, program: u8) -> &Instrument {
        match self.instruments.get(&program) {
            Some(instrument) => instrument,
            // Bank construction guarantees at least one entry
            None => self.instruments.values().next().unwrap_or(&FALLBACK),
        }
    }

    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }
}

static FALLBACK: Instrument = Instrument {
    program: 0,
    waveform: Waveform::Sine,
    attack_ms: 5,
    release_ms: 50,
    gain: 0.8,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_bank() {
        let bank = InstrumentBank::builtin();
        assert_eq!(bank.len(), 4);
        assert_eq!(bank.instrument(2).waveform, Waveform::Saw);
        // Unknown programs use the lowest one
        assert_eq!(bank.instrument(99).program, 0);
    }

    #[test]
    fn test_parse_bank() {
        let bank = InstrumentBank::from_toml_str(
            r#"
            [[instrument]]
            program = 10
            waveform = "triangle"
            release_ms = 200

            [[instrument]]
            program = 20
            waveform = "square"
            gain = 0.5
            "#,
        )
        .unwrap();

        assert_eq!(bank.len(), 2);
        let tri = bank.instrument(10);
        assert_eq!(tri.release_ms, 200);
        assert_eq!(tri.attack_ms, 5);
        assert_eq!(bank.instrument(20).gain, 0.5);
        assert_eq!(bank.instrument(0).program, 10);
    }

    #[test]
    fn test_empty_bank_rejected() {
        assert!(InstrumentBank::from_toml_str("").is_err());
    }

    #[test]
    fn test_duplicate_program_rejected() {
        let text = r#"
            [[instrument]]
            program = 1
            waveform = "sine"
            [[instrument]]
            program = 1
            waveform = "saw"
        "#;
        assert!(InstrumentBank::from_toml_str(text).is_err());
    }

    #[test]
    fn test_waveform_ranges() {
        for waveform in [
            Waveform::Sine,
            Waveform::Square,
            Waveform::Saw,
            Waveform::Triangle,
        ] {
            for i in 0..100 {
                let v = waveform.sample(i as f64 / 37.0);
                assert!((-1.0..=1.0).contains(&v), "{:?} out of range: {}", waveform, v);
            }
        }
        assert_eq!(Waveform::Square.sample(0.25), 1.0);
        assert_eq!(Waveform::Square.sample(0.75), -1.0);
    }
}
