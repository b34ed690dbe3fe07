//! Four-stage progress state machine.
//!
//! Status only moves forward within a run (`pending -> in_progress ->
//! completed | error`); [`StageMachine::reset`] is the only way back. At most
//! one stage is `in_progress` at a time, and an error halts all further
//! progression until the next reset.

use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::core::{StageData, StageFields, StageKey, StageMap, StageStatus};

/// Progress model of one generation run.
///
/// Owned by exactly one run; readers take [`StageMachine::snapshot`]s.
#[derive(Debug, Clone, PartialEq)]
pub struct StageMachine {
    stages: StageMap,
    active: StageKey,
    halted: bool,
    error: Option<String>,
}

impl Default for StageMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StageMachine {
    /// Creates a machine with every stage pending.
    #[must_use]
    pub fn new() -> Self {
        Self {
            stages: all_pending(),
            active: StageKey::Classification,
            halted: false,
            error: None,
        }
    }

    /// Creates a machine already reset for a new run.
    #[must_use]
    pub fn started() -> Self {
        let mut machine = Self::new();
        machine.reset();
        machine
    }

    /// Sets every stage to pending, then marks `classification` in progress.
    pub fn reset(&mut self) {
        self.stages = all_pending();
        self.halted = false;
        self.error = None;
        self.set_status(StageKey::Classification, StageStatus::InProgress);
        self.active = StageKey::Classification;
    }

    /// Marks `key` in progress if it is pending, every earlier stage has
    /// finished and nothing else is running.
    ///
    /// Returns true if the status changed.
    pub fn activate(&mut self, key: StageKey) -> bool {
        if self.halted {
            warn!(stage = %key, "Ignoring activation after halt");
            return false;
        }
        let earlier_done = StageKey::ALL
            .iter()
            .take(key.index())
            .all(|k| self.status(*k).is_terminal());
        if !earlier_done || self.status(key) != StageStatus::Pending || self.in_progress().is_some() {
            return false;
        }
        self.set_status(key, StageStatus::InProgress);
        self.active = key;
        true
    }

    /// Completes `key`, merging `fields`, and activates the next stage if it
    /// is still pending.
    ///
    /// Earlier stages that never reported (dropped frames) are completed
    /// with what they have, so at most one stage stays in progress. Returns
    /// false when ignored (halted run or a stage already in error).
    pub fn complete_stage(&mut self, key: StageKey, fields: StageFields) -> bool {
        if self.halted {
            warn!(stage = %key, "Ignoring stage completion after halt");
            return false;
        }
        if self.status(key) == StageStatus::Error {
            warn!(stage = %key, "Ignoring completion of a failed stage");
            return false;
        }

        for earlier in StageKey::ALL.iter().take(key.index()) {
            if !self.status(*earlier).is_terminal() {
                debug!(stage = %earlier, completed_by = %key, "Implicitly completing skipped stage");
                self.set_status(*earlier, StageStatus::Completed);
            }
        }

        let newly_completed = self.status(key) != StageStatus::Completed;
        let data = self.data_mut(key);
        data.status = StageStatus::Completed;
        data.merge(fields);
        // A repeated completion only merges fields; focus never moves back.
        if newly_completed {
            self.active = key;
        }

        if let Some(next) = key.next() {
            if self.status(next) == StageStatus::Pending {
                self.set_status(next, StageStatus::InProgress);
                self.active = next;
            }
        }
        true
    }

    /// Marks the stage currently in progress as failed and halts the run.
    ///
    /// Returns the failed stage, or `None` if nothing was in progress (the
    /// run is halted either way).
    pub fn mark_error(&mut self, message: impl Into<String>) -> Option<StageKey> {
        let message = message.into();
        let failed = self.in_progress();
        if let Some(key) = failed {
            let data = self.data_mut(key);
            data.status = StageStatus::Error;
            data.content = Some(message.clone());
            self.active = key;
        }
        self.halted = true;
        self.error = Some(message);
        failed
    }

    /// Rebuilds every stage as completed from a per-stage summary.
    ///
    /// Stages absent from `summary` become completed with no content.
    /// Leaves `review` as the active stage.
    pub fn apply_summary(&mut self, mut summary: BTreeMap<StageKey, StageFields>) -> bool {
        if self.halted {
            warn!("Ignoring summary after halt");
            return false;
        }
        self.stages = StageKey::ALL
            .iter()
            .map(|key| {
                let fields = summary.remove(key).unwrap_or_default();
                (*key, StageData::completed(fields))
            })
            .collect();
        self.active = StageKey::Review;
        true
    }

    /// Returns the summary implied by the data recorded so far.
    #[must_use]
    pub fn recorded_summary(&self) -> BTreeMap<StageKey, StageFields> {
        self.stages
            .iter()
            .filter(|(_, data)| data.status == StageStatus::Completed)
            .map(|(key, data)| (*key, data.to_fields()))
            .collect()
    }

    /// Appends partial output to a stage that is in progress.
    pub fn append_stream_content(&mut self, key: StageKey, content: &str) -> bool {
        if self.halted || self.status(key) != StageStatus::InProgress {
            return false;
        }
        self.data_mut(key)
            .streaming_content
            .get_or_insert_with(String::new)
            .push_str(content);
        true
    }

    /// Returns the status of a stage.
    #[must_use]
    pub fn status(&self, key: StageKey) -> StageStatus {
        self.stages
            .get(&key)
            .map_or(StageStatus::Pending, |d| d.status)
    }

    /// Returns the data of a stage.
    #[must_use]
    pub fn stage(&self, key: StageKey) -> Option<&StageData> {
        self.stages.get(&key)
    }

    /// Returns the stage currently in progress, if any.
    #[must_use]
    pub fn in_progress(&self) -> Option<StageKey> {
        StageKey::ALL
            .iter()
            .copied()
            .find(|key| self.status(*key) == StageStatus::InProgress)
    }

    /// Returns the focal stage for display.
    #[must_use]
    pub const fn active_stage(&self) -> StageKey {
        self.active
    }

    /// Returns true once an error halted the run.
    #[must_use]
    pub const fn is_halted(&self) -> bool {
        self.halted
    }

    /// Returns the message that halted the run.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Returns true if every stage is completed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        StageKey::ALL
            .iter()
            .all(|key| self.status(*key) == StageStatus::Completed)
    }

    /// Returns true once the run either halted or completed every stage.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.halted || self.is_complete()
    }

    /// Returns a copy of all stage data.
    #[must_use]
    pub fn snapshot(&self) -> StageMap {
        self.stages.clone()
    }

    fn set_status(&mut self, key: StageKey, status: StageStatus) {
        self.data_mut(key).status = status;
    }

    fn data_mut(&mut self, key: StageKey) -> &mut StageData {
        self.stages.entry(key).or_default()
    }
}

fn all_pending() -> StageMap {
    StageKey::ALL
        .iter()
        .map(|key| (*key, StageData::pending()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StructuredFields;
    use pretty_assertions::assert_eq;

    fn in_progress_count(machine: &StageMachine) -> usize {
        StageKey::ALL
            .iter()
            .filter(|k| machine.status(**k) == StageStatus::InProgress)
            .count()
    }

    #[test]
    fn test_reset_activates_classification() {
        let machine = StageMachine::started();
        assert_eq!(machine.status(StageKey::Classification), StageStatus::InProgress);
        assert_eq!(machine.status(StageKey::Review), StageStatus::Pending);
        assert_eq!(machine.active_stage(), StageKey::Classification);
    }

    #[test]
    fn test_complete_stage_lookahead_activation() {
        let mut machine = StageMachine::started();
        assert!(machine.complete_stage(
            StageKey::Classification,
            StageFields::new().with_structured(StructuredFields::Classification {
                role_classification: "Backend Engineer".to_string(),
                focus_points: vec![],
                keywords: vec![],
                key_sentences: vec![],
            }),
        ));
        assert_eq!(machine.status(StageKey::Classification), StageStatus::Completed);
        assert_eq!(machine.status(StageKey::Experience), StageStatus::InProgress);
        assert_eq!(machine.active_stage(), StageKey::Experience);
        assert_eq!(
            machine.stage(StageKey::Classification).unwrap().role_classification(),
            Some("Backend Engineer")
        );
    }

    #[test]
    fn test_full_progression_keeps_single_in_progress() {
        let mut machine = StageMachine::started();
        for key in StageKey::ALL {
            assert!(in_progress_count(&machine) <= 1);
            machine.complete_stage(key, StageFields::new().with_content(key.as_str()));
        }
        assert!(machine.is_complete());
        assert_eq!(in_progress_count(&machine), 0);
        assert_eq!(machine.active_stage(), StageKey::Review);
    }

    #[test]
    fn test_repeated_completion_keeps_focus_on_later_stage() {
        let mut machine = StageMachine::started();
        machine.complete_stage(StageKey::Classification, StageFields::new());
        machine.complete_stage(StageKey::Experience, StageFields::new().with_content("draft"));
        assert_eq!(machine.active_stage(), StageKey::Profile);

        assert!(machine.complete_stage(
            StageKey::Experience,
            StageFields::new().with_content("revised draft"),
        ));
        assert_eq!(machine.active_stage(), StageKey::Profile);
        assert_eq!(machine.status(StageKey::Profile), StageStatus::InProgress);
        assert_eq!(
            machine.stage(StageKey::Experience).unwrap().content.as_deref(),
            Some("revised draft")
        );
        assert_eq!(in_progress_count(&machine), 1);
    }

    #[test]
    fn test_mark_error_only_touches_running_stage() {
        let mut machine = StageMachine::started();
        machine.complete_stage(StageKey::Classification, StageFields::new());
        assert_eq!(machine.mark_error("rate limited"), Some(StageKey::Experience));

        assert_eq!(machine.status(StageKey::Classification), StageStatus::Completed);
        assert_eq!(machine.status(StageKey::Experience), StageStatus::Error);
        assert_eq!(
            machine.stage(StageKey::Experience).unwrap().content.as_deref(),
            Some("rate limited")
        );
        assert_eq!(machine.status(StageKey::Profile), StageStatus::Pending);
        assert_eq!(machine.status(StageKey::Review), StageStatus::Pending);
        assert!(machine.is_halted());
    }

    #[test]
    fn test_halt_blocks_further_progress() {
        let mut machine = StageMachine::started();
        machine.mark_error("boom");
        assert!(!machine.complete_stage(StageKey::Classification, StageFields::new()));
        assert!(!machine.apply_summary(BTreeMap::new()));
        assert!(!machine.activate(StageKey::Experience));
        assert_eq!(machine.status(StageKey::Classification), StageStatus::Error);
        assert_eq!(machine.status(StageKey::Experience), StageStatus::Pending);

        machine.reset();
        assert!(!machine.is_halted());
        assert_eq!(machine.status(StageKey::Classification), StageStatus::InProgress);
    }

    #[test]
    fn test_skipped_stage_is_completed_implicitly() {
        let mut machine = StageMachine::started();
        machine.complete_stage(StageKey::Profile, StageFields::new());

        assert_eq!(machine.status(StageKey::Classification), StageStatus::Completed);
        assert_eq!(machine.status(StageKey::Experience), StageStatus::Completed);
        assert_eq!(machine.status(StageKey::Review), StageStatus::InProgress);
        assert_eq!(in_progress_count(&machine), 1);
    }

    #[test]
    fn test_apply_summary_fills_missing_stages() {
        let mut machine = StageMachine::started();
        let mut summary = BTreeMap::new();
        summary.insert(StageKey::Review, StageFields::new().with_content("final"));
        assert!(machine.apply_summary(summary));

        assert!(machine.is_complete());
        assert_eq!(machine.active_stage(), StageKey::Review);
        assert_eq!(machine.stage(StageKey::Experience).unwrap().content, None);
        assert_eq!(
            machine.stage(StageKey::Review).unwrap().content.as_deref(),
            Some("final")
        );
    }

    #[test]
    fn test_stream_content_only_for_running_stage() {
        let mut machine = StageMachine::started();
        assert!(machine.append_stream_content(StageKey::Classification, "{\"role"));
        assert!(machine.append_stream_content(StageKey::Classification, "\":1}"));
        assert!(!machine.append_stream_content(StageKey::Review, "x"));
        assert_eq!(
            machine
                .stage(StageKey::Classification)
                .unwrap()
                .streaming_content
                .as_deref(),
            Some("{\"role\":1}")
        );
    }

    #[test]
    fn test_activate_respects_single_in_progress() {
        let mut machine = StageMachine::new();
        assert!(machine.activate(StageKey::Classification));
        assert!(!machine.activate(StageKey::Classification));
        assert!(!machine.activate(StageKey::Experience));
    }

    #[test]
    fn test_recorded_summary_only_includes_completed() {
        let mut machine = StageMachine::started();
        machine.complete_stage(StageKey::Classification, StageFields::new().with_content("c"));
        let summary = machine.recorded_summary();
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[&StageKey::Classification].content.as_deref(), Some("c"));
    }

    #[test]
    fn test_status_is_monotonic_over_random_sequences() {
        // Deterministic pseudo-random operation sequences.
        let mut seed: u64 = 0x9e37_79b9_7f4a_7c15;
        for _ in 0..200 {
            let mut machine = StageMachine::started();
            let mut last: Vec<u8> = StageKey::ALL.iter().map(|k| machine.status(*k).rank()).collect();
            for _ in 0..12 {
                seed ^= seed << 13;
                seed ^= seed >> 7;
                seed ^= seed << 17;
                let key = StageKey::ALL[(seed % 4) as usize];
                match (seed >> 8) % 5 {
                    0 | 1 => {
                        machine.complete_stage(key, StageFields::new());
                    }
                    2 => {
                        machine.activate(key);
                    }
                    3 => {
                        machine.append_stream_content(key, "x");
                    }
                    _ => {
                        machine.mark_error("err");
                    }
                }
                for (i, k) in StageKey::ALL.iter().enumerate() {
                    let rank = machine.status(*k).rank();
                    assert!(rank >= last[i], "stage {k} went backwards");
                    last[i] = rank;
                }
                if !machine.is_halted() {
                    assert!(in_progress_count(&machine) <= 1);
                }
            }
        }
    }
}
