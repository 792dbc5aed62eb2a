//! Debouncing of per-frame face matches into confirmed identities.
//!
//! Each call to [`IdentityAggregator::observe`] carries the faces seen in
//! one frame. Every face is matched against the enrolled identities; a call
//! with at least one face closer than the tolerance adds one to that
//! identity's tally, however many of its faces the frame holds, and an
//! identity is confirmed once its tally strictly exceeds the confirmation
//! threshold. Frames with no faces count toward an absence streak instead;
//! a streak longer than the absence threshold raises one absence timeout.
//!
//! The aggregator is plain owned state. It belongs to the recognition loop
//! and is never shared.

use std::collections::HashMap;
use std::sync::Arc;

use facegate_core::constants::{
    DEFAULT_ABSENCE_THRESHOLD, DEFAULT_CONFIRMATION_THRESHOLD, DEFAULT_TOLERANCE,
};
use facegate_core::{Embedding, Identity, MatchResult, Observation};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Aggregator thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AggregatorConfig {
    /// Faces strictly closer than this count as the matched identity.
    pub tolerance: f32,

    /// Confirmation fires when a tally exceeds this value.
    pub confirmation_threshold: u32,

    /// Absence timeout fires when the empty-call streak exceeds this value.
    pub absence_threshold: u32,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            confirmation_threshold: DEFAULT_CONFIRMATION_THRESHOLD,
            absence_threshold: DEFAULT_ABSENCE_THRESHOLD,
        }
    }
}

/// Label assigned to one observed face.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FaceLabel {
    Known(String),
    Unknown,
}

impl FaceLabel {
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Known(name) => Some(name),
            Self::Unknown => None,
        }
    }
}

/// One observed face after matching.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledFace {
    pub label: FaceLabel,

    /// Distance to the nearest enrolled identity (infinite when none compare).
    pub distance: f32,

    /// Whether this face confirmed its identity.
    pub confirmed: bool,
}

/// Result of one [`IdentityAggregator::observe`] call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregatorOutcome {
    /// One entry per observation, in input order.
    pub labels: Vec<LabeledFace>,

    /// Whether this call ended an absence streak.
    pub absence_timeout: bool,
}

impl AggregatorOutcome {
    /// Names confirmed in this call.
    pub fn confirmed(&self) -> impl Iterator<Item = &str> {
        self.labels
            .iter()
            .filter(|face| face.confirmed)
            .filter_map(|face| face.label.name())
    }
}

/// Nearest enrolled identity to `embedding`, with no tolerance applied.
///
/// Identities whose embedding dimension differs from `embedding` are
/// skipped. Exact ties go to the identity enrolled first. With nothing to
/// compare against, the result is unknown at infinite distance.
pub fn best_match(embedding: &Embedding, identities: &[Arc<Identity>]) -> MatchResult {
    let mut best: Option<(&Arc<Identity>, f32)> = None;
    for identity in identities {
        let Some(distance) = embedding.distance(identity.embedding()) else {
            continue;
        };
        if best.is_none_or(|(_, nearest)| distance < nearest) {
            best = Some((identity, distance));
        }
    }

    match best {
        Some((identity, distance)) => MatchResult {
            identity: Some(Arc::clone(identity)),
            distance,
        },
        None => MatchResult::unknown(f32::INFINITY),
    }
}

/// Stateful debouncer turning per-frame matches into confirmations.
#[derive(Debug, Clone, Default)]
pub struct IdentityAggregator {
    config: AggregatorConfig,
    tallies: HashMap<String, u32>,
    absence: u32,
    absence_reported: bool,
}

impl IdentityAggregator {
    pub fn new(config: AggregatorConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Match `embedding`, applying the tolerance.
    ///
    /// The identity is only set when the nearest distance is strictly below
    /// the tolerance.
    pub fn classify(&self, embedding: &Embedding, identities: &[Arc<Identity>]) -> MatchResult {
        let nearest = best_match(embedding, identities);
        if nearest.distance < self.config.tolerance {
            nearest
        } else {
            MatchResult::unknown(nearest.distance)
        }
    }

    /// Feed the faces seen in one frame.
    pub fn observe(
        &mut self,
        observations: &[Observation],
        identities: &[Arc<Identity>],
    ) -> AggregatorOutcome {
        if observations.is_empty() {
            return self.observe_absence();
        }

        self.absence = 0;
        self.absence_reported = false;

        let mut labels: Vec<LabeledFace> = observations
            .iter()
            .map(|observation| {
                let matched = self.classify(&observation.embedding, identities);
                let label = match matched.identity {
                    Some(identity) => FaceLabel::Known(identity.name().to_string()),
                    None => FaceLabel::Unknown,
                };
                trace!(label = ?label, distance = matched.distance, "Face matched");
                LabeledFace {
                    label,
                    distance: matched.distance,
                    confirmed: false,
                }
            })
            .collect();

        // A tally counts calls, so several faces of one identity in the same
        // frame add one. Names are visited in order of first appearance.
        let mut seen: Vec<usize> = Vec::new();
        for (index, face) in labels.iter().enumerate() {
            if let Some(name) = face.label.name()
                && !seen.iter().any(|&i| labels[i].label.name() == Some(name))
            {
                seen.push(index);
            }
        }

        for index in seen {
            let Some(name) = labels[index].label.name() else {
                continue;
            };
            let tally = self.tallies.entry(name.to_string()).or_insert(0);
            *tally = tally.saturating_add(1);
            trace!(name = %name, tally = *tally, "Identity tallied");

            if *tally > self.config.confirmation_threshold {
                debug!(name = %name, distance = labels[index].distance, "Identity confirmed");
                self.tallies.clear();
                labels[index].confirmed = true;
                // First to cross wins; the rest of this call starts from zero.
                break;
            }
        }

        AggregatorOutcome {
            labels,
            absence_timeout: false,
        }
    }

    fn observe_absence(&mut self) -> AggregatorOutcome {
        self.absence = self.absence.saturating_add(1);
        let timeout = self.absence > self.config.absence_threshold && !self.absence_reported;
        if timeout {
            debug!(empty_calls = self.absence, "Absence timeout");
            self.absence_reported = true;
            self.tallies.clear();
        }
        AggregatorOutcome {
            labels: Vec::new(),
            absence_timeout: timeout,
        }
    }

    /// Current tally for `name` (zero when absent).
    pub fn tally(&self, name: &str) -> u32 {
        self.tallies.get(name).copied().unwrap_or(0)
    }

    /// Length of the current empty-call streak.
    pub fn absence_count(&self) -> u32 {
        self.absence
    }

    /// Forget all tallies and the absence streak.
    pub fn reset(&mut self) {
        self.tallies.clear();
        self.absence = 0;
        self.absence_reported = false;
    }
}
