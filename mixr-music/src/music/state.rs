//! Playback state machine
//!
//! Play/stop/loop bookkeeping shared by every session. Transitions are a pure
//! function of (state, event) returning the next state plus the action the
//! session must carry out on its decoder. Loop restarts are an action, not a
//! recursive play call.
//!
//! | State            | Event                  | Next state         | Action      |
//! |------------------|------------------------|--------------------|-------------|
//! | any              | `Play(n)`              | `Playing(n)`       | `Start`     |
//! | `Playing(1)`     | `NaturalEnd`           | `Stopped(Finished)`| `None`      |
//! | `Playing(n > 1)` | `NaturalEnd`           | `Playing(n - 1)`   | `Rewind`    |
//! | `Playing(∞)`     | `NaturalEnd`           | `Playing(∞)`       | `Rewind`    |
//! | `Playing(_)`     | `NaturalEnd` (empty)   | `Stopped(Finished)`| `None`      |
//! | `Stopped(_)`     | `NaturalEnd`           | unchanged          | `None`      |
//! | any              | `Stop`                 | `Stopped(Halted)`  | `Halt`      |

use std::fmt;
use std::num::NonZeroU32;

/// How many times a track should be played
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayCount {
    /// Play this many more times
    Times(NonZeroU32),
    /// Loop until stopped
    Forever,
}

impl PlayCount {
    /// Play exactly once
    pub const ONCE: PlayCount = PlayCount::Times(NonZeroU32::MIN);

    /// Build from a signed loop count: negative loops forever, 0 plays once
    pub fn from_raw(count: i32) -> Self {
        if count < 0 {
            PlayCount::Forever
        } else {
            PlayCount::Times(NonZeroU32::new(count as u32).unwrap_or(NonZeroU32::MIN))
        }
    }

    /// Convenience constructor; 0 is treated as 1
    pub fn times(count: u32) -> Self {
        PlayCount::Times(NonZeroU32::new(count).unwrap_or(NonZeroU32::MIN))
    }

    /// Signed representation: -1 for forever
    pub fn as_raw(self) -> i32 {
        match self {
            PlayCount::Times(n) => n.get().min(i32::MAX as u32) as i32,
            PlayCount::Forever => -1,
        }
    }
}

impl fmt::Display for PlayCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayCount::Times(n) => write!(f, "{}x", n),
            PlayCount::Forever => f.write_str("forever"),
        }
    }
}

/// Why a session is not playing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Never started
    Idle,
    /// Every requested play-through completed
    Finished,
    /// Stopped explicitly
    Halted,
}

/// Session playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped(StopReason),
    Playing(PlayCount),
}

/// Input driving a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEvent {
    /// Start (or restart) with a repeat count
    Play(PlayCount),
    /// The decoder reached the end of the track.
    ///
    /// `empty` is set when the finished pass produced no audio at all.
    NaturalEnd { empty: bool },
    /// Explicit stop request
    Stop,
}

/// Work the session performs on its decoder after a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Fresh start: discard buffered audio, restart decoder, seek to zero
    Start,
    /// Loop boundary: keep buffered audio, restart decoder, seek to zero
    Rewind,
    /// Halt the decoder and discard buffered audio
    Halt,
    None,
}

impl Default for PlaybackState {
    fn default() -> Self {
        PlaybackState::Stopped(StopReason::Idle)
    }
}

impl PlaybackState {
    /// Apply `event`, returning the next state and the action to perform
    pub fn transition(self, event: PlaybackEvent) -> (PlaybackState, Action) {
        match (self, event) {
            (_, PlaybackEvent::Play(count)) => (PlaybackState::Playing(count), Action::Start),
            (_, PlaybackEvent::Stop) => (PlaybackState::Stopped(StopReason::Halted), Action::Halt),
            (PlaybackState::Playing(_), PlaybackEvent::NaturalEnd { empty: true }) => {
                (PlaybackState::Stopped(StopReason::Finished), Action::None)
            }
            (PlaybackState::Playing(PlayCount::Forever), PlaybackEvent::NaturalEnd { .. }) => {
                (PlaybackState::Playing(PlayCount::Forever), Action::Rewind)
            }
            (PlaybackState::Playing(PlayCount::Times(n)), PlaybackEvent::NaturalEnd { .. }) => {
                match NonZeroU32::new(n.get() - 1) {
                    Some(rest) => (PlaybackState::Playing(PlayCount::Times(rest)), Action::Rewind),
                    None => (PlaybackState::Stopped(StopReason::Finished), Action::None),
                }
            }
            (stopped @ PlaybackState::Stopped(_), PlaybackEvent::NaturalEnd { .. }) => {
                (stopped, Action::None)
            }
        }
    }

    /// Signed repeat count: 0 when stopped, -1 when looping forever
    pub fn repeat_count(&self) -> i32 {
        match self {
            PlaybackState::Stopped(_) => 0,
            PlaybackState::Playing(count) => count.as_raw(),
        }
    }

    pub fn is_playing(&self) -> bool {
        matches!(self, PlaybackState::Playing(_))
    }

    /// Every play-through completed naturally
    pub fn is_finished(&self) -> bool {
        matches!(self, PlaybackState::Stopped(StopReason::Finished))
    }

    /// Stopped by request rather than by running out
    pub fn is_halted(&self) -> bool {
        matches!(self, PlaybackState::Stopped(StopReason::Halted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const END: PlaybackEvent = PlaybackEvent::NaturalEnd { empty: false };

    #[test]
    fn test_play_starts_from_any_state() {
        for state in [
            PlaybackState::Stopped(StopReason::Idle),
            PlaybackState::Stopped(StopReason::Finished),
            PlaybackState::Playing(PlayCount::Forever),
        ] {
            let (next, action) = state.transition(PlaybackEvent::Play(PlayCount::times(3)));
            assert_eq!(next, PlaybackState::Playing(PlayCount::times(3)));
            assert_eq!(action, Action::Start);
        }
    }

    #[test]
    fn test_last_pass_finishes() {
        let (next, action) = PlaybackState::Playing(PlayCount::ONCE).transition(END);
        assert_eq!(next, PlaybackState::Stopped(StopReason::Finished));
        assert_eq!(action, Action::None);
        assert_eq!(next.repeat_count(), 0);
    }

    #[test]
    fn test_finite_loop_counts_down() {
        let mut state = PlaybackState::Playing(PlayCount::times(3));
        let mut rewinds = 0;
        while state.is_playing() {
            let (next, action) = state.transition(END);
            if action == Action::Rewind {
                rewinds += 1;
            }
            state = next;
        }
        assert_eq!(rewinds, 2);
        assert!(state.is_finished());
    }

    #[test]
    fn test_forever_never_finishes() {
        let mut state = PlaybackState::Playing(PlayCount::Forever);
        for _ in 0..1000 {
            let (next, action) = state.transition(END);
            assert_eq!(action, Action::Rewind);
            state = next;
        }
        assert_eq!(state.repeat_count(), -1);
    }

    #[test]
    fn test_empty_pass_finishes_even_forever() {
        let (next, _) = PlaybackState::Playing(PlayCount::Forever)
            .transition(PlaybackEvent::NaturalEnd { empty: true });
        assert!(next.is_finished());
    }

    #[test]
    fn test_stop_is_not_finished() {
        let (next, action) =
            PlaybackState::Playing(PlayCount::times(2)).transition(PlaybackEvent::Stop);
        assert!(next.is_halted());
        assert!(!next.is_finished());
        assert_eq!(action, Action::Halt);
        assert_eq!(next.repeat_count(), 0);
    }

    #[test]
    fn test_natural_end_while_stopped_is_ignored() {
        let state = PlaybackState::Stopped(StopReason::Halted);
        assert_eq!(state.transition(END), (state, Action::None));
    }

    #[test]
    fn test_play_count_raw_conversion() {
        assert_eq!(PlayCount::from_raw(-1), PlayCount::Forever);
        assert_eq!(PlayCount::from_raw(0), PlayCount::ONCE);
        assert_eq!(PlayCount::from_raw(4).as_raw(), 4);
        assert_eq!(PlayCount::Forever.as_raw(), -1);
    }
}
