use serde::{Deserialize, Serialize};
use vismem_core::{Condition, ConfigurationError};

use crate::generator::{MAX_CHOICES, MAX_SEGMENTS, MIN_SEGMENTS};
use crate::sequencer::distribute;

pub const MAX_DELAY_MS: u64 = 20_000;

/// Session parameters. The settings layer is expected to hand over a
/// [`normalized`](SessionConfig::normalized) value; the controller still
/// [`validate`](SessionConfig::validate)s it before running anything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub fixation_duration_ms: u64,
    pub sample_duration_ms: u64,
    pub feedback_duration_ms: u64,
    pub delay_ms_list: Vec<u64>,
    pub segment_count: usize,
    pub shared_quadrants: usize,
    pub practice_trials_total: usize,
    pub main_trials_total: usize,
    pub n_choices: usize,
    pub give_feedback: bool,
    /// `None` means no deadline.
    pub response_deadline_ms: Option<u64>,
    pub seed: Option<u32>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            fixation_duration_ms: 500,
            sample_duration_ms: 2000,
            feedback_duration_ms: 700,
            delay_ms_list: vec![0, 4000, 12000],
            segment_count: 4,
            shared_quadrants: 1,
            practice_trials_total: 4,
            main_trials_total: 24,
            n_choices: 4,
            give_feedback: true,
            response_deadline_ms: None,
            seed: None,
        }
    }
}

impl SessionConfig {
    /// Applies the settings-screen limits: out-of-range values are clamped,
    /// delays are deduplicated and sorted, an empty delay list falls back to
    /// the defaults.
    pub fn normalized(&self) -> Self {
        let defaults = Self::default();
        let segment_count = self.segment_count.clamp(2, MAX_SEGMENTS);
        let max_shared = segment_count.saturating_sub(1).max(1);

        let mut delays: Vec<u64> = Vec::new();
        for delay in self.delay_ms_list.iter().map(|d| (*d).min(MAX_DELAY_MS)) {
            if !delays.contains(&delay) {
                delays.push(delay);
            }
        }
        if delays.is_empty() {
            delays = defaults.delay_ms_list.clone();
        }
        delays.sort_unstable();

        Self {
            fixation_duration_ms: self.fixation_duration_ms,
            sample_duration_ms: self.sample_duration_ms.clamp(300, 15_000),
            feedback_duration_ms: self.feedback_duration_ms,
            delay_ms_list: delays,
            segment_count,
            shared_quadrants: self.shared_quadrants.clamp(1, max_shared),
            practice_trials_total: self.practice_trials_total.min(200),
            main_trials_total: self.main_trials_total.clamp(1, 200),
            n_choices: self.n_choices.clamp(1, MAX_CHOICES),
            give_feedback: self.give_feedback,
            response_deadline_ms: self.response_deadline_ms.map(|d| d.clamp(500, 30_000)),
            seed: self.seed,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if !(1..=MAX_CHOICES).contains(&self.n_choices) {
            return Err(ConfigurationError::InvalidChoiceCount(self.n_choices));
        }
        if !(MIN_SEGMENTS..=MAX_SEGMENTS).contains(&self.segment_count) {
            return Err(ConfigurationError::InvalidSegmentCount(self.segment_count));
        }
        if self.shared_quadrants == 0 || self.shared_quadrants >= self.segment_count {
            return Err(ConfigurationError::InvalidSharedQuadrants {
                shared: self.shared_quadrants,
                segment_count: self.segment_count,
            });
        }
        if self.delay_ms_list.is_empty() {
            return Err(ConfigurationError::NoConditions);
        }
        Ok(())
    }

    /// One condition per distinct delay, in configured order.
    pub fn conditions(&self) -> Vec<Condition> {
        let mut seen: Vec<u64> = Vec::with_capacity(self.delay_ms_list.len());
        self.delay_ms_list
            .iter()
            .filter(|d| {
                if seen.contains(d) {
                    false
                } else {
                    seen.push(**d);
                    true
                }
            })
            .map(|&d| Condition::from_delay(d))
            .collect()
    }

    pub fn practice_distribution(&self) -> Vec<usize> {
        distribute(self.practice_trials_total, self.conditions().len())
    }

    pub fn main_distribution(&self) -> Vec<usize> {
        distribute(self.main_trials_total, self.conditions().len())
    }

    /// Flat copy stored with each session for export.
    pub fn snapshot(&self) -> ConfigSnapshot {
        ConfigSnapshot {
            n_choices: self.n_choices,
            sample_duration_ms: self.sample_duration_ms,
            delay_ms_list: self
                .delay_ms_list
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("|"),
            response_deadline_ms: self.response_deadline_ms,
            give_feedback: self.give_feedback,
            practice_trials_total: self.practice_trials_total,
            main_trials_total: self.main_trials_total,
            segment_count: self.segment_count,
            shared_quadrants: self.shared_quadrants,
            seed: self.seed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub n_choices: usize,
    pub sample_duration_ms: u64,
    pub delay_ms_list: String,
    pub response_deadline_ms: Option<u64>,
    pub give_feedback: bool,
    pub practice_trials_total: usize,
    pub main_trials_total: usize,
    pub segment_count: usize,
    pub shared_quadrants: usize,
    pub seed: Option<u32>,
}
