// src/classifier.rs
//
// Maps raw detections onto the fines table and suppresses re-detections of
// the same violation type inside the cooldown window. Cooldown timestamps
// update at acceptance time (before validation), so suppression is keyed on
// attempted detections rather than committed records.

use crate::types::{RawDetection, ViolationCandidate};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Per-type last-fired timers for one pipeline run. Owned by the driver;
/// starts empty and is never shared across runs.
#[derive(Debug, Default)]
pub struct CooldownState {
    last_fired: HashMap<String, f64>,
}

impl CooldownState {
    pub fn new() -> Self {
        Self::default()
    }

    fn last_fired(&self, violation_type: &str) -> f64 {
        self.last_fired
            .get(violation_type)
            .copied()
            .unwrap_or(f64::NEG_INFINITY)
    }
}

pub struct ClassifierGate {
    fines: HashMap<String, i64>,
    cooldown_sec: f64,
}

impl ClassifierGate {
    pub fn new(fines: HashMap<String, i64>, cooldown_sec: f64) -> Self {
        Self { fines, cooldown_sec }
    }

    /// Classify one frame's detections (union across adapters, in adapter
    /// order) and apply the cooldown gate. When a frame carries several
    /// detections of the same type, only the first processed one fires; the
    /// rest are duplicates of the same physical event.
    pub fn classify_and_gate(
        &self,
        state: &mut CooldownState,
        detections: &[RawDetection],
        now: f64,
    ) -> Vec<ViolationCandidate> {
        let mut candidates = Vec::new();
        let mut fired_this_frame: HashSet<&str> = HashSet::new();

        for detection in detections {
            let Some(&fine) = self.fines.get(&detection.class_label) else {
                // Not a tracked violation
                continue;
            };

            if fired_this_frame.contains(detection.class_label.as_str()) {
                debug!("Duplicate '{}' in same frame, suppressed", detection.class_label);
                continue;
            }

            let elapsed = now - state.last_fired(&detection.class_label);
            if elapsed < self.cooldown_sec {
                debug!(
                    "'{}' still cooling down ({:.1}s < {:.1}s), suppressed",
                    detection.class_label, elapsed, self.cooldown_sec
                );
                continue;
            }

            state
                .last_fired
                .insert(detection.class_label.clone(), now);
            fired_this_frame.insert(detection.class_label.as_str());

            candidates.push(ViolationCandidate {
                violation_type: detection.class_label.clone(),
                fine_amount: fine,
                bbox: detection.bbox,
                frame_timestamp: now,
            });
        }

        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate(cooldown_sec: f64) -> ClassifierGate {
        let mut fines = HashMap::new();
        fines.insert("no_helmet".to_string(), 500);
        fines.insert("no_seatbelt".to_string(), 500);
        ClassifierGate::new(fines, cooldown_sec)
    }

    fn raw(label: &str) -> RawDetection {
        RawDetection {
            class_label: label.to_string(),
            confidence: 0.9,
            bbox: [10.0, 20.0, 30.0, 40.0],
        }
    }

    #[test]
    fn test_unknown_class_is_discarded() {
        let gate = gate(5.0);
        let mut state = CooldownState::new();
        let out = gate.classify_and_gate(&mut state, &[raw("car")], 0.0);
        assert!(out.is_empty());
    }

    #[test]
    fn test_candidate_carries_fine_and_bbox() {
        let gate = gate(5.0);
        let mut state = CooldownState::new();
        let out = gate.classify_and_gate(&mut state, &[raw("no_helmet")], 1.5);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].violation_type, "no_helmet");
        assert_eq!(out[0].fine_amount, 500);
        assert_eq!(out[0].bbox, [10.0, 20.0, 30.0, 40.0]);
        assert_eq!(out[0].frame_timestamp, 1.5);
    }

    #[test]
    fn test_second_detection_inside_window_is_suppressed() {
        let gate = gate(5.0);
        let mut state = CooldownState::new();

        assert_eq!(gate.classify_and_gate(&mut state, &[raw("no_helmet")], 0.0).len(), 1);
        assert_eq!(gate.classify_and_gate(&mut state, &[raw("no_helmet")], 3.0).len(), 0);
    }

    #[test]
    fn test_detection_at_or_past_interval_fires_again() {
        let gate = gate(5.0);
        let mut state = CooldownState::new();

        assert_eq!(gate.classify_and_gate(&mut state, &[raw("no_helmet")], 0.0).len(), 1);
        // elapsed == interval counts as cooled down
        assert_eq!(gate.classify_and_gate(&mut state, &[raw("no_helmet")], 5.0).len(), 1);
    }

    #[test]
    fn test_helmet_hits_at_t0_t3_t6_fire_twice() {
        // fines {no_helmet: 500}, cooldown 5s; hits at t=0, 3, 6
        let gate = gate(5.0);
        let mut state = CooldownState::new();

        assert_eq!(gate.classify_and_gate(&mut state, &[raw("no_helmet")], 0.0).len(), 1);
        assert_eq!(gate.classify_and_gate(&mut state, &[raw("no_helmet")], 3.0).len(), 0);
        // t=6 is 6s after the *accepted* t=0 candidate, past the window
        assert_eq!(gate.classify_and_gate(&mut state, &[raw("no_helmet")], 6.0).len(), 1);
    }

    #[test]
    fn test_suppressed_attempt_does_not_refresh_timer() {
        let gate = gate(5.0);
        let mut state = CooldownState::new();

        gate.classify_and_gate(&mut state, &[raw("no_helmet")], 0.0);
        gate.classify_and_gate(&mut state, &[raw("no_helmet")], 4.0);
        // window measured from t=0, not from the suppressed t=4 attempt
        assert_eq!(gate.classify_and_gate(&mut state, &[raw("no_helmet")], 5.5).len(), 1);
    }

    #[test]
    fn test_same_frame_same_type_emits_only_first() {
        let gate = gate(5.0);
        let mut state = CooldownState::new();

        let mut first = raw("no_helmet");
        first.confidence = 0.7;
        let detections = vec![first, raw("no_helmet"), raw("no_helmet")];

        let out = gate.classify_and_gate(&mut state, &detections, 0.0);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].frame_timestamp, 0.0);
    }

    #[test]
    fn test_same_frame_tie_break_holds_with_zero_cooldown() {
        let gate = gate(0.0);
        let mut state = CooldownState::new();

        let out = gate.classify_and_gate(&mut state, &[raw("no_helmet"), raw("no_helmet")], 0.0);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_types_cool_down_independently() {
        let gate = gate(5.0);
        let mut state = CooldownState::new();

        let out = gate.classify_and_gate(&mut state, &[raw("no_helmet"), raw("no_seatbelt")], 0.0);
        assert_eq!(out.len(), 2);

        // no_helmet suppressed, no_seatbelt past its window would still be
        // suppressed at t=3 as well
        let out = gate.classify_and_gate(&mut state, &[raw("no_helmet"), raw("no_seatbelt")], 3.0);
        assert!(out.is_empty());
    }

    #[test]
    fn test_detection_order_is_preserved_in_output() {
        let gate = gate(5.0);
        let mut state = CooldownState::new();

        let out = gate.classify_and_gate(&mut state, &[raw("no_seatbelt"), raw("no_helmet")], 0.0);
        assert_eq!(out[0].violation_type, "no_seatbelt");
        assert_eq!(out[1].violation_type, "no_helmet");
    }
}
