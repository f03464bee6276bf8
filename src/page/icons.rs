//! Per-unit visual playback state
//!
//! The page tracks a visual marker per unit so the user can see which
//! paragraphs are queued, speaking, or already read. Wire updates from the
//! dispatcher are folded into this registry; the `stopped` update is
//! history-dependent, landing on `played` for units that finished at least
//! once and back on `idle` otherwise.

use crate::message::{IconUpdate, UnitId};
use log::debug;
use std::collections::{HashMap, HashSet};

/// Visual state of one unit's marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnitVisualState {
    #[default]
    Idle,
    Loading,
    Playing,
    Played,
    Error,
}

impl UnitVisualState {
    pub fn name(self) -> &'static str {
        match self {
            UnitVisualState::Idle => "idle",
            UnitVisualState::Loading => "loading",
            UnitVisualState::Playing => "playing",
            UnitVisualState::Played => "played",
            UnitVisualState::Error => "error",
        }
    }
}

/// Registry of unit markers for the current page
#[derive(Debug, Default)]
pub struct IconRegistry {
    states: HashMap<UnitId, UnitVisualState>,
    /// Units that have finished playback at least once
    completed: HashSet<UnitId>,
    enabled: bool,
}

impl IconRegistry {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            ..Self::default()
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Turn markers on or off. Turning them off clears all current state.
    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled && !enabled {
            self.states.clear();
        }
        self.enabled = enabled;
    }

    /// Current state of a unit's marker
    pub fn state(&self, id: &str) -> UnitVisualState {
        self.states.get(id).copied().unwrap_or_default()
    }

    /// Mark a set of units as queued for synthesis
    pub fn set_loading(&mut self, ids: &[UnitId]) {
        if !self.enabled {
            return;
        }
        for id in ids {
            self.states.insert(id.clone(), UnitVisualState::Loading);
        }
    }

    /// Fold a wire update into the registry.
    ///
    /// Returns true if the unit landed in the error state, which the caller
    /// should schedule to clear.
    pub fn apply(&mut self, id: &UnitId, update: IconUpdate) -> bool {
        if !self.enabled {
            return false;
        }
        let state = match update {
            IconUpdate::Loading => UnitVisualState::Loading,
            IconUpdate::Playing => UnitVisualState::Playing,
            IconUpdate::Ended => {
                self.completed.insert(id.clone());
                UnitVisualState::Played
            }
            IconUpdate::Stopped => {
                if self.completed.contains(id) {
                    UnitVisualState::Played
                } else {
                    UnitVisualState::Idle
                }
            }
            IconUpdate::Error => UnitVisualState::Error,
        };
        debug!("Unit {} marker -> {}", id, state.name());
        self.states.insert(id.clone(), state);
        state == UnitVisualState::Error
    }

    /// Clear an error marker after its display window
    pub fn clear_error(&mut self, id: &str) {
        if self.state(id) == UnitVisualState::Error {
            let state = if self.completed.contains(id) {
                UnitVisualState::Played
            } else {
                UnitVisualState::Idle
            };
            self.states.insert(id.to_string(), state);
        }
    }

    /// Drop state for units that no longer exist after a rescan
    pub fn retain(&mut self, valid: &HashSet<UnitId>) {
        self.states.retain(|id, _| valid.contains(id));
        self.completed.retain(|id| valid.contains(id));
    }

    /// Snapshot of all non-idle markers, for diagnostics
    pub fn snapshot(&self) -> Vec<(UnitId, String)> {
        let mut states: Vec<(UnitId, String)> = self
            .states
            .iter()
            .map(|(id, state)| (id.clone(), state.name().to_string()))
            .collect();
        states.sort();
        states
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> UnitId {
        s.to_string()
    }

    #[test]
    fn stopped_depends_on_history() {
        let mut reg = IconRegistry::new(true);

        // Never completed: stop returns the unit to idle
        reg.apply(&id("u1"), IconUpdate::Playing);
        reg.apply(&id("u1"), IconUpdate::Stopped);
        assert_eq!(reg.state("u1"), UnitVisualState::Idle);

        // Completed once: stop leaves it marked as played
        reg.apply(&id("u2"), IconUpdate::Ended);
        reg.apply(&id("u2"), IconUpdate::Stopped);
        assert_eq!(reg.state("u2"), UnitVisualState::Played);
    }

    #[test]
    fn error_apply_signals_clear_needed() {
        let mut reg = IconRegistry::new(true);
        assert!(reg.apply(&id("u1"), IconUpdate::Error));
        assert!(!reg.apply(&id("u1"), IconUpdate::Playing));
    }

    #[test]
    fn clear_error_respects_history() {
        let mut reg = IconRegistry::new(true);
        reg.apply(&id("u1"), IconUpdate::Error);
        reg.clear_error("u1");
        assert_eq!(reg.state("u1"), UnitVisualState::Idle);

        reg.apply(&id("u2"), IconUpdate::Ended);
        reg.apply(&id("u2"), IconUpdate::Error);
        reg.clear_error("u2");
        assert_eq!(reg.state("u2"), UnitVisualState::Played);

        // A clear that arrives after the state already moved on is a no-op
        reg.apply(&id("u3"), IconUpdate::Error);
        reg.apply(&id("u3"), IconUpdate::Playing);
        reg.clear_error("u3");
        assert_eq!(reg.state("u3"), UnitVisualState::Playing);
    }

    #[test]
    fn disabled_registry_ignores_updates() {
        let mut reg = IconRegistry::new(false);
        reg.apply(&id("u1"), IconUpdate::Playing);
        assert_eq!(reg.state("u1"), UnitVisualState::Idle);
        assert!(reg.snapshot().is_empty());
    }

    #[test]
    fn disabling_clears_state() {
        let mut reg = IconRegistry::new(true);
        reg.apply(&id("u1"), IconUpdate::Playing);
        reg.set_enabled(false);
        reg.set_enabled(true);
        assert_eq!(reg.state("u1"), UnitVisualState::Idle);
    }

    #[test]
    fn retain_drops_vanished_units() {
        let mut reg = IconRegistry::new(true);
        reg.apply(&id("u1"), IconUpdate::Ended);
        reg.apply(&id("u2"), IconUpdate::Playing);
        let valid: HashSet<UnitId> = [id("u2")].into_iter().collect();
        reg.retain(&valid);
        assert_eq!(reg.state("u1"), UnitVisualState::Idle);
        assert_eq!(reg.state("u2"), UnitVisualState::Playing);
        assert_eq!(reg.snapshot().len(), 1);
    }
}
