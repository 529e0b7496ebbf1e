//! Game detection state machine
//!
//! Watches the message stream for the emulator's start/name/stop
//! handshake and resolves which profile should become active.
//!
//! The handshake is two tokens: a start marker arms the session, then a
//! game-name announcement is matched against the known profiles. Exactly
//! one match event is emitted per completed handshake; a name no profile
//! claims drops the session back to idle with a no-match notification.
//! A stop marker, or silence past the configured timeout, resets the
//! session.

use crate::message::wire::{GAME_NAME_KEY, START_KEY, STOP_KEY};
use crate::types::{PacketBody, RawPacket};
use std::time::{Duration, Instant};
use tracing::debug;

/// State of the detection handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetectionState {
    /// No emulator session announced
    #[default]
    Idle,
    /// Start marker seen, waiting for the game name
    AwaitingGameName,
    /// A profile matched the announced game
    Matched,
}

impl DetectionState {
    /// Check if waiting for a game name
    pub fn is_awaiting(&self) -> bool {
        matches!(self, DetectionState::AwaitingGameName)
    }

    /// Check if a profile is matched
    pub fn is_matched(&self) -> bool {
        matches!(self, DetectionState::Matched)
    }

    /// Display name for the state
    pub fn display_name(&self) -> &'static str {
        match self {
            DetectionState::Idle => "Idle",
            DetectionState::AwaitingGameName => "Awaiting game name",
            DetectionState::Matched => "Matched",
        }
    }
}

/// A profile's claim on a game name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameBinding {
    /// Profile name
    pub profile: String,
    /// Game name the profile expects, compared case-insensitively
    pub game: String,
}

impl GameBinding {
    /// Create a binding
    pub fn new(profile: impl Into<String>, game: impl Into<String>) -> Self {
        Self {
            profile: profile.into(),
            game: game.into(),
        }
    }
}

/// Events emitted by the detection session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectionEvent {
    /// A start marker armed the session
    Armed,
    /// A profile matched the announced game
    Matched {
        /// Name of the matched profile
        profile: String,
        /// The announced game name
        game: String,
    },
    /// No profile claimed the announced game
    NoMatch {
        /// The announced game name
        game: String,
    },
    /// A stop marker reset the session
    Reset,
    /// The idle timeout expired while awaiting a game name
    TimedOut,
}

/// The detection handshake over the message stream
#[derive(Debug)]
pub struct DetectionSession {
    state: DetectionState,
    bindings: Vec<GameBinding>,
    game_name: Option<String>,
    matched_profile: Option<String>,
    timeout: Duration,
    awaiting_since: Option<Instant>,
}

impl DetectionSession {
    /// Create a session with the given await timeout
    pub fn new(timeout: Duration) -> Self {
        Self {
            state: DetectionState::Idle,
            bindings: Vec::new(),
            game_name: None,
            matched_profile: None,
            timeout,
            awaiting_since: None,
        }
    }

    /// Replace the profile bindings; order decides match priority
    pub fn set_bindings(&mut self, bindings: Vec<GameBinding>) {
        self.bindings = bindings;
    }

    /// Current handshake state
    pub fn state(&self) -> DetectionState {
        self.state
    }

    /// The most recently announced game name
    pub fn game_name(&self) -> Option<&str> {
        self.game_name.as_deref()
    }

    /// The matched profile name, if any
    pub fn matched_profile(&self) -> Option<&str> {
        self.matched_profile.as_deref()
    }

    /// Time left before the await times out
    pub fn remaining_timeout(&self) -> Option<Duration> {
        let since = self.awaiting_since?;
        Some(self.timeout.saturating_sub(since.elapsed()))
    }

    /// Feed a packet through the state machine
    ///
    /// A start marker arms (or re-arms) the session. While armed, the
    /// first matching binding wins. Unrelated packets never transition.
    pub fn on_packet(&mut self, packet: &RawPacket) -> Option<DetectionEvent> {
        match packet.key.as_str() {
            START_KEY => {
                self.state = DetectionState::AwaitingGameName;
                self.game_name = None;
                self.matched_profile = None;
                self.awaiting_since = Some(Instant::now());
                Some(DetectionEvent::Armed)
            }
            STOP_KEY => {
                if self.state == DetectionState::Idle {
                    return None;
                }
                self.reset();
                Some(DetectionEvent::Reset)
            }
            GAME_NAME_KEY => {
                let PacketBody::Text(ref name) = packet.body else {
                    // The zero seed that follows every name frame
                    return None;
                };
                if !self.state.is_awaiting() {
                    debug!("game name '{}' outside handshake, ignored", name);
                    return None;
                }
                self.game_name = Some(name.clone());
                self.awaiting_since = None;

                let hit = self
                    .bindings
                    .iter()
                    .find(|b| b.game.eq_ignore_ascii_case(name));
                match hit {
                    Some(binding) => {
                        self.state = DetectionState::Matched;
                        self.matched_profile = Some(binding.profile.clone());
                        Some(DetectionEvent::Matched {
                            profile: binding.profile.clone(),
                            game: name.clone(),
                        })
                    }
                    None => {
                        self.state = DetectionState::Idle;
                        Some(DetectionEvent::NoMatch { game: name.clone() })
                    }
                }
            }
            _ => None,
        }
    }

    /// Check the await timeout; call periodically between packets
    pub fn tick(&mut self) -> Option<DetectionEvent> {
        if !self.state.is_awaiting() {
            return None;
        }
        let since = self.awaiting_since?;
        if since.elapsed() >= self.timeout {
            self.reset();
            return Some(DetectionEvent::TimedOut);
        }
        None
    }

    fn reset(&mut self) {
        self.state = DetectionState::Idle;
        self.game_name = None;
        self.matched_profile = None;
        self.awaiting_since = None;
    }
}
