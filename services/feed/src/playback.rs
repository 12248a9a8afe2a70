//! Playback session controller for a vertically swiped feed.
//!
//! A [`FeedSession`] owns the ordered items of one viewing session and the
//! index of the active item. Gestures and taps are applied one at a time through
//! `&mut self`; every call returns the [`PlaybackCommand`]s the player layer must
//! execute, in order. Outgoing items are always paused before the incoming item
//! is played, so at most one item is ever playing.

use crate::config::PlaybackConfig;
use crate::error::LoadError;
use crate::model::VideoRecord;
use tracing::{debug, trace};

/// Input from the gesture capture layer.
///
/// Displacement is measured along the feed axis: positive values move forward
/// (finger travels up the screen), negative values move backward.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GestureEvent {
    /// Finger moved by `delta` logical units since the previous event
    Move(f32),
    /// Finger lifted; the accumulated displacement is evaluated
    Release,
    /// Gesture aborted by the platform; nothing is evaluated
    Cancel,
}

/// Instruction for the player layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackCommand {
    Play(usize),
    Pause(usize),
}

/// Direction of a committed swipe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwipeDirection {
    Forward,
    Backward,
}

/// Per-viewer feed state
#[derive(Debug, Clone)]
pub struct FeedSession {
    items: Vec<VideoRecord>,
    active_index: usize,
    playing: bool,
    gesture_accumulator: f32,
    swipe_threshold: f32,
}

impl FeedSession {
    /// Start a session on `items` with the default swipe threshold.
    ///
    /// The first item starts out playing; call [`FeedSession::initial_commands`]
    /// to tell the player.
    pub fn new(items: Vec<VideoRecord>) -> Self {
        Self::with_config(items, &PlaybackConfig::default())
    }

    /// Start a session with explicit tuning. A threshold that is not a positive
    /// finite number falls back to the default.
    pub fn with_config(items: Vec<VideoRecord>, config: &PlaybackConfig) -> Self {
        let swipe_threshold = if config.validate().is_ok() {
            config.swipe_threshold
        } else {
            PlaybackConfig::default().swipe_threshold
        };
        let playing = !items.is_empty();
        Self {
            items,
            active_index: 0,
            playing,
            gesture_accumulator: 0.0,
            swipe_threshold,
        }
    }

    /// Commands bringing a fresh player in line with the session
    pub fn initial_commands(&self) -> Vec<PlaybackCommand> {
        if self.playing {
            vec![PlaybackCommand::Play(self.active_index)]
        } else {
            Vec::new()
        }
    }

    pub fn items(&self) -> &[VideoRecord] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn active_index(&self) -> usize {
        self.active_index
    }

    pub fn active_item(&self) -> Option<&VideoRecord> {
        self.items.get(self.active_index)
    }

    /// Whether item `index` is currently playing
    pub fn is_playing(&self, index: usize) -> bool {
        self.playing && index == self.active_index
    }

    /// The single playing item, if any
    pub fn playing_index(&self) -> Option<usize> {
        self.playing.then_some(self.active_index)
    }

    pub fn gesture_accumulator(&self) -> f32 {
        self.gesture_accumulator
    }

    pub fn swipe_threshold(&self) -> f32 {
        self.swipe_threshold
    }

    /// Apply one gesture event
    pub fn handle_gesture(&mut self, event: GestureEvent) -> Vec<PlaybackCommand> {
        if self.items.is_empty() {
            return Vec::new();
        }

        match event {
            GestureEvent::Move(delta) => {
                if delta.is_finite() {
                    self.gesture_accumulator += delta;
                }
                Vec::new()
            }
            GestureEvent::Cancel => {
                trace!(accumulated = self.gesture_accumulator, "Gesture cancelled");
                self.gesture_accumulator = 0.0;
                Vec::new()
            }
            GestureEvent::Release => {
                let displacement = std::mem::take(&mut self.gesture_accumulator);
                match self.classify(displacement) {
                    Some(direction) => self.step(direction),
                    None => {
                        trace!(displacement, "Swipe below threshold discarded");
                        Vec::new()
                    }
                }
            }
        }
    }

    /// A complete swipe: one move of `displacement` followed by release
    pub fn swipe(&mut self, displacement: f32) -> Vec<PlaybackCommand> {
        self.handle_gesture(GestureEvent::Move(displacement));
        self.handle_gesture(GestureEvent::Release)
    }

    /// Toggle play/pause of the active item without moving
    pub fn tap(&mut self) -> Vec<PlaybackCommand> {
        if self.items.is_empty() {
            return Vec::new();
        }

        self.playing = !self.playing;
        let command = if self.playing {
            PlaybackCommand::Play(self.active_index)
        } else {
            PlaybackCommand::Pause(self.active_index)
        };

        debug!(index = self.active_index, playing = self.playing, "Tap toggled playback");
        vec![command]
    }

    fn classify(&self, displacement: f32) -> Option<SwipeDirection> {
        if displacement.abs() < self.swipe_threshold {
            None
        } else if displacement > 0.0 {
            Some(SwipeDirection::Forward)
        } else if displacement < 0.0 {
            Some(SwipeDirection::Backward)
        } else {
            // Zero displacement with a zero threshold
            None
        }
    }

    fn step(&mut self, direction: SwipeDirection) -> Vec<PlaybackCommand> {
        let from = self.active_index;
        let to = match direction {
            SwipeDirection::Forward if from + 1 < self.items.len() => from + 1,
            SwipeDirection::Backward if from > 0 => from - 1,
            _ => {
                trace!(index = from, ?direction, "Swipe at feed boundary ignored");
                return Vec::new();
            }
        };

        let commands = vec![PlaybackCommand::Pause(from), PlaybackCommand::Play(to)];
        self.active_index = to;
        self.playing = true;

        debug!(from, to, ?direction, "Active item changed");
        commands
    }
}

/// What the feed screen shows after a load attempt
#[derive(Debug)]
pub enum FeedView {
    Ready(FeedSession),
    /// The feed loaded but holds no videos
    Empty,
    /// The feed could not be loaded
    Failed(String),
}

impl FeedView {
    pub fn from_load(result: Result<Vec<VideoRecord>, LoadError>, config: &PlaybackConfig) -> Self {
        match result {
            Ok(items) if items.is_empty() => FeedView::Empty,
            Ok(items) => FeedView::Ready(FeedSession::with_config(items, config)),
            Err(e) => FeedView::Failed(e.to_string()),
        }
    }

    pub fn session_mut(&mut self) -> Option<&mut FeedSession> {
        match self {
            FeedView::Ready(session) => Some(session),
            _ => None,
        }
    }
}
