// src/pipeline.rs
//
// The frame loop. Per frame: fan out to every detector adapter in
// declaration order, classify and cooldown-gate the union, and only when
// candidates survive write the shared artifact and walk each candidate
// through the validation gate to the store. Stream exhaustion is the
// normal exit; the committed-violation count is the run's result.

use crate::artifact::ArtifactWriter;
use crate::classifier::{ClassifierGate, CooldownState};
use crate::detector::Detector;
use crate::frame_source::FrameSource;
use crate::store::ViolationStore;
use crate::types::{RawDetection, VerdictStatus};
use crate::validation::Validator;
use anyhow::Result;
use tracing::{info, warn};

#[derive(Debug, Default)]
pub struct RunStats {
    pub frames_processed: u64,
    pub candidates_emitted: u64,
    pub violations_committed: u64,
    pub verdicts_rejected: u64,
    pub artifacts_written: u64,
}

pub async fn run(
    source: &mut dyn FrameSource,
    detectors: &mut [Box<dyn Detector>],
    gate: &ClassifierGate,
    artifacts: &mut ArtifactWriter,
    validator: &dyn Validator,
    store: &ViolationStore,
) -> Result<RunStats> {
    // Cooldown timers live exactly as long as this run and are never
    // shared across concurrent runs.
    let mut cooldown = CooldownState::new();
    let mut stats = RunStats::default();

    while let Some(frame) = source.next_frame()? {
        stats.frames_processed += 1;

        let mut raw: Vec<RawDetection> = Vec::new();
        for detector in detectors.iter_mut() {
            match detector.detect(&frame) {
                Ok(detections) => raw.extend(detections),
                Err(e) => {
                    // Inference hiccups on one frame do not end the run
                    warn!("Detector '{}' failed on frame: {:#}", detector.name(), e);
                }
            }
        }

        let candidates = gate.classify_and_gate(&mut cooldown, &raw, frame.timestamp);
        if candidates.is_empty() {
            continue;
        }
        stats.candidates_emitted += candidates.len() as u64;

        // One artifact per frame-with-candidates, shared by all of them
        let artifact_path = match artifacts.write_artifact(&frame, &candidates) {
            Ok(path) => path,
            Err(e) => {
                warn!("Dropping {} candidate(s), artifact write failed: {:#}", candidates.len(), e);
                continue;
            }
        };
        stats.artifacts_written += 1;

        for candidate in &candidates {
            let verdict = validator
                .validate(&artifact_path, &candidate.violation_type)
                .await;

            match verdict.status {
                VerdictStatus::Correct => {
                    match store.insert(
                        &artifact_path.to_string_lossy(),
                        &candidate.violation_type,
                        candidate.fine_amount,
                    ) {
                        Ok(id) => {
                            stats.violations_committed += 1;
                            info!(
                                "Committed violation #{}: {} (fine {})",
                                id, candidate.violation_type, candidate.fine_amount
                            );
                        }
                        Err(e) => {
                            // Store trouble is surfaced but never halts the run
                            warn!("Failed to commit '{}': {:#}", candidate.violation_type, e);
                        }
                    }
                }
                VerdictStatus::Incorrect => {
                    stats.verdicts_rejected += 1;
                    info!(
                        "Rejected '{}' at t={:.1}s: {}",
                        candidate.violation_type, candidate.frame_timestamp, verdict.reason
                    );
                }
            }
        }
    }

    info!(
        "Stream exhausted: {} frames, {} candidates, {} committed, {} rejected",
        stats.frames_processed,
        stats.candidates_emitted,
        stats.violations_committed,
        stats.verdicts_rejected
    );

    Ok(stats)
}
