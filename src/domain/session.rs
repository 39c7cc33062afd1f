//! Session Coordinator
//!
//! Serializes audio processing (at most one session in flight) and hands out
//! tokens so late completions from a superseded session can be recognized
//! and dropped.

use crate::domain::models::{AppEvent, VoiceState};
use std::fmt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Identifies one run of the processing pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionToken(u64);

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session#{}", self.0)
    }
}

pub struct SessionCoordinator {
    next_id: u64,
    active: Option<SessionToken>,
    voice_state: VoiceState,
    event_sender: mpsc::UnboundedSender<AppEvent>,
}

impl SessionCoordinator {
    pub fn new(event_sender: mpsc::UnboundedSender<AppEvent>) -> Self {
        Self {
            next_id: 1,
            active: None,
            voice_state: VoiceState::Idle,
            event_sender,
        }
    }

    pub fn voice_state(&self) -> VoiceState {
        self.voice_state
    }

    pub fn active(&self) -> Option<SessionToken> {
        self.active
    }

    pub fn is_busy(&self) -> bool {
        self.active.is_some()
    }

    /// The watch opened an audio session.
    ///
    /// A session already being processed keeps its state; the new audio will
    /// be dropped when it completes.
    pub fn start_listening(&mut self) {
        if self.is_busy() {
            debug!("Audio started while a session is in flight");
            return;
        }
        self.set_voice_state(VoiceState::Listening);
    }

    /// Audio stopped without producing anything to process.
    pub fn abandon_listening(&mut self) {
        if !self.is_busy() {
            self.set_voice_state(VoiceState::Idle);
        }
    }

    /// Claim the pipeline for a completed audio buffer. Returns `None` when a
    /// session is already active; the caller drops the audio.
    pub fn begin(&mut self) -> Option<SessionToken> {
        if let Some(active) = self.active {
            warn!("Dropping audio: {} still processing", active);
            return None;
        }

        let token = SessionToken(self.next_id);
        self.next_id += 1;
        self.active = Some(token);
        info!("Started {}", token);
        self.set_voice_state(VoiceState::Processing);
        Some(token)
    }

    pub fn is_current(&self, token: SessionToken) -> bool {
        self.active == Some(token)
    }

    /// Mark the reply as being delivered. No-op for stale tokens.
    pub fn responding(&mut self, token: SessionToken) -> bool {
        if !self.is_current(token) {
            return false;
        }
        self.set_voice_state(VoiceState::Responding);
        true
    }

    /// Release the pipeline after success or failure. No-op for stale tokens.
    pub fn finish(&mut self, token: SessionToken) -> bool {
        if !self.is_current(token) {
            debug!("Ignoring completion of stale {}", token);
            return false;
        }
        self.active = None;
        self.set_voice_state(VoiceState::Idle);
        true
    }

    /// Link lost: forget any in-flight session unconditionally.
    pub fn reset(&mut self) {
        if let Some(token) = self.active.take() {
            info!("Invalidated {} on disconnect", token);
        }
        self.set_voice_state(VoiceState::Idle);
    }

    fn set_voice_state(&mut self, state: VoiceState) {
        if self.voice_state == state {
            return;
        }
        debug!("Voice state {:?} -> {:?}", self.voice_state, state);
        self.voice_state = state;
        let _ = self.event_sender.send(AppEvent::VoiceState(state));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voice_states(rx: &mut mpsc::UnboundedReceiver<AppEvent>) -> Vec<VoiceState> {
        let mut states = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let AppEvent::VoiceState(state) = event {
                states.push(state);
            }
        }
        states
    }

    #[test]
    fn test_second_session_is_dropped() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut sessions = SessionCoordinator::new(tx);

        let first = sessions.begin().unwrap();
        assert!(sessions.begin().is_none());
        assert!(sessions.is_current(first));

        assert!(sessions.finish(first));
        let second = sessions.begin().unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_reset_makes_token_stale() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut sessions = SessionCoordinator::new(tx);

        let token = sessions.begin().unwrap();
        sessions.reset();
        assert!(!sessions.is_current(token));
        assert!(!sessions.responding(token));
        assert!(!sessions.finish(token));
        assert_eq!(sessions.voice_state(), VoiceState::Idle);
        assert_eq!(
            voice_states(&mut rx),
            vec![VoiceState::Processing, VoiceState::Idle]
        );
    }

    #[test]
    fn test_stale_finish_does_not_release_new_session() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut sessions = SessionCoordinator::new(tx);

        let old = sessions.begin().unwrap();
        sessions.reset();
        let new = sessions.begin().unwrap();

        assert!(!sessions.finish(old));
        assert!(sessions.is_current(new));
        assert_eq!(sessions.voice_state(), VoiceState::Processing);
    }

    #[test]
    fn test_full_voice_cycle() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut sessions = SessionCoordinator::new(tx);

        sessions.start_listening();
        let token = sessions.begin().unwrap();
        assert!(sessions.responding(token));
        assert!(sessions.finish(token));

        assert_eq!(
            voice_states(&mut rx),
            vec![
                VoiceState::Listening,
                VoiceState::Processing,
                VoiceState::Responding,
                VoiceState::Idle
            ]
        );
    }

    #[test]
    fn test_listening_does_not_clobber_processing() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut sessions = SessionCoordinator::new(tx);

        let _token = sessions.begin().unwrap();
        sessions.start_listening();
        assert_eq!(sessions.voice_state(), VoiceState::Processing);
        sessions.abandon_listening();
        assert_eq!(sessions.voice_state(), VoiceState::Processing);
    }
}
