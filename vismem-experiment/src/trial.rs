use vismem_core::ChoiceEvent;

use crate::config::SessionConfig;

/// State of the trial currently on screen. Owned by the controller and
/// dropped when the next trial starts.
#[derive(Debug, Clone)]
pub struct Trial<T> {
    pub index: usize,
    pub durations: TrialDurations,
    pub timestamps: TrialTimestamps<T>,
    pub responses: ResponseTracker,
    pub visibility_hidden: bool,
    /// Set once the trial is scored; every later response or timeout is a no-op.
    pub locked: bool,
}

impl<T: Copy> Trial<T> {
    pub fn new(index: usize, durations: TrialDurations, start: T) -> Self {
        Self {
            index,
            durations,
            timestamps: TrialTimestamps {
                start,
                choices_start: None,
            },
            responses: ResponseTracker::default(),
            visibility_hidden: false,
            locked: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrialDurations {
    pub fixation_ms: u64,
    pub sample_ms: u64,
    pub delay_ms: u64,
    pub feedback_ms: Option<u64>,
    pub response_deadline_ms: Option<u64>,
}

impl TrialDurations {
    pub fn from_config(config: &SessionConfig, delay_ms: u64) -> Self {
        Self {
            fixation_ms: config.fixation_duration_ms,
            sample_ms: config.sample_duration_ms,
            delay_ms,
            feedback_ms: config
                .give_feedback
                .then_some(config.feedback_duration_ms),
            response_deadline_ms: config.response_deadline_ms,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrialTimestamps<T> {
    pub start: T,
    /// The instant the choices became interactive; reaction times count from here.
    pub choices_start: Option<T>,
}

/// Attempt bookkeeping for one trial.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseTracker {
    pub events: Vec<ChoiceEvent>,
    pub first_choice_correct: Option<bool>,
    pub rt_first_choice_ms: Option<f64>,
    pub rt_correct_choice_ms: Option<f64>,
    pub choice_number_correct: Option<u32>,
    rejected: Vec<usize>,
}

impl ResponseTracker {
    pub fn attempts(&self) -> u32 {
        self.events.len() as u32
    }

    pub fn is_rejected(&self, index: usize) -> bool {
        self.rejected.contains(&index)
    }

    pub fn rejected(&self) -> &[usize] {
        &self.rejected
    }

    /// Logs one attempt and returns its 1-based number.
    pub fn record(
        &mut self,
        chosen_index: usize,
        correct: bool,
        reaction_time_ms: f64,
        absolute_time_ms: f64,
    ) -> u32 {
        let attempt = self.attempts() + 1;
        self.events.push(ChoiceEvent {
            attempt,
            chosen_index,
            correct,
            reaction_time_ms,
            absolute_time_ms,
        });

        if self.first_choice_correct.is_none() {
            self.first_choice_correct = Some(correct);
            self.rt_first_choice_ms = Some(reaction_time_ms);
        }

        if correct {
            self.rt_correct_choice_ms.get_or_insert(reaction_time_ms);
            self.choice_number_correct.get_or_insert(attempt);
        } else {
            self.rejected.push(chosen_index);
        }
        attempt
    }
}
