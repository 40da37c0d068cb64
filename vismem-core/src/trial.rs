use serde::{Deserialize, Serialize};

use crate::pattern::{MatchTrialSpec, Pattern};
use crate::phase::SessionMode;

/// One delay block. A zero delay shows sample and choices together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub name: String,
    pub delay_ms: u64,
    pub simultaneous: bool,
}

impl Condition {
    pub fn from_delay(delay_ms: u64) -> Self {
        let name = if delay_ms == 0 {
            "SIMULTANEOUS".to_string()
        } else {
            format!("DELAY {delay_ms}ms")
        };
        Self {
            name,
            delay_ms,
            simultaneous: delay_ms == 0,
        }
    }
}

/// A scheduled trial. Stimuli are generated lazily, when the trial is shown.
#[derive(Debug, Clone)]
pub struct TrialSlot {
    pub is_practice: bool,
    pub condition_name: String,
    pub delay_ms: u64,
    pub simultaneous: bool,
    pub spec: Option<MatchTrialSpec>,
}

impl TrialSlot {
    pub fn new(is_practice: bool, condition: &Condition) -> Self {
        Self {
            is_practice,
            condition_name: condition.name.clone(),
            delay_ms: condition.delay_ms,
            simultaneous: condition.simultaneous,
            spec: None,
        }
    }
}

/// A single response submission within a trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceEvent {
    pub attempt: u32,
    pub chosen_index: usize,
    pub correct: bool,
    /// Measured from the moment the choices became interactive.
    pub reaction_time_ms: f64,
    /// Relative to session start.
    pub absolute_time_ms: f64,
}

/// Finalized result of one trial. Emitted once and never changed.
///
/// `correct` is first-choice correctness; `correct_on_any_try` is eventual
/// correctness. All `*_ms` times other than reaction times are relative to the
/// session start; `*_epoch_ms` are the same instants on the wall clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub trial_index: usize,
    pub mode: SessionMode,
    pub participant_id: String,
    pub is_practice: bool,
    pub condition_name: String,
    pub delay_ms: u64,
    pub simultaneous: bool,

    pub sample_id: u64,
    pub sample_template_id: usize,
    pub sample_segment_count: usize,
    pub sample_colors: String,
    pub sample_pattern: Pattern,
    pub choice_patterns: Vec<Pattern>,
    pub n_choices: usize,
    pub correct_index: usize,
    pub shared_quadrants: usize,

    pub chosen_index: Option<usize>,
    pub correct: bool,
    pub correct_on_any_try: bool,
    pub first_choice_correct: Option<bool>,
    pub choice_number_correct: Option<u32>,
    pub n_responses: u32,
    pub rt_ms: Option<f64>,
    pub rt_first_choice_ms: Option<f64>,
    pub rt_correct_choice_ms: Option<f64>,
    pub timed_out: bool,
    pub response_deadline_ms: Option<u64>,
    pub choice_events: Vec<ChoiceEvent>,

    pub visibility_hidden: bool,

    pub absolute_time_ms: f64,
    pub trial_start_ms: f64,
    pub trial_end_ms: f64,
    pub trial_start_epoch_ms: f64,
    pub trial_end_epoch_ms: f64,
    pub elapsed_ms: f64,
}

impl TrialRecord {
    /// Trials during which the page was hidden are kept but excluded from
    /// analysis.
    pub fn is_valid(&self) -> bool {
        !self.visibility_hidden
    }
}
