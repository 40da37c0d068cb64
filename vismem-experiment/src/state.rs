use std::time::Duration;

use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;
use vismem_core::{
    ConfigurationError, MatchTrialSpec, SessionMode, TrialPhase, TrialRecord, TrialSlot,
};
use vismem_timing::{SessionClock, Timer, ns_to_ms};

use super::config::SessionConfig;
use super::generator::PatternGenerator;
use super::presenter::{PhaseEvent, Presenter};
use super::random::RandomSource;
use super::sequencer::build_trials;
use super::session::ResponseContext;
use super::sink::{SessionEnd, SessionInfo, TrialSink};
use super::trial::{Trial, TrialDurations};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartOptions {
    pub mode: SessionMode,
    pub participant_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseOutcome {
    /// Wrong phase, trial already scored, unknown or already rejected option.
    Ignored,
    Incorrect { attempt: u32 },
    Correct { attempt: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    ShowSample,
    ShowDelay,
    ShowChoices,
    ChoicesInteractive,
    NextTrial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Scheduled {
    due_ns: u64,
    step: Step,
}

/// How a trial ended.
struct Outcome {
    correct: bool,
    correct_on_any_try: bool,
    timed_out: bool,
    chosen_index: Option<usize>,
    rt_ms: Option<f64>,
    end_ns: u64,
}

/// Drives the delayed-matching session one phase at a time.
///
/// The controller never blocks. Phase advances and the response deadline are
/// stored as absolute due times on the monotonic timer and fired by
/// [`update`](Self::update); the host calls it whenever
/// [`next_due`](Self::next_due) has passed. At most one advance and one
/// deadline are pending, and entering a phase replaces whatever was pending.
pub struct TrialController<T, P, L>
where
    T: Timer<Timestamp = u64>,
    P: Presenter,
    L: TrialSink,
{
    config: SessionConfig,
    timer: T,
    presenter: P,
    sink: L,
    generator: PatternGenerator,
    sequence_rng: RandomSource,
    phase: TrialPhase,
    mode: SessionMode,
    participant_id: String,
    clock: Option<SessionClock>,
    slots: Vec<TrialSlot>,
    trial_number: usize,
    current: Option<Trial<u64>>,
    advance: Option<Scheduled>,
    deadline_ns: Option<u64>,
    records: Vec<TrialRecord>,
    on_finish: Option<Box<dyn FnOnce()>>,
}

impl<T, P, L> TrialController<T, P, L>
where
    T: Timer<Timestamp = u64>,
    P: Presenter,
    L: TrialSink,
{
    pub fn new(
        config: SessionConfig,
        timer: T,
        presenter: P,
        sink: L,
    ) -> Result<Self, ConfigurationError> {
        config.validate()?;

        let generator = PatternGenerator::new(config.segment_count, RandomSource::new(config.seed));
        let sequence_rng = RandomSource::for_sequencing(config.seed);

        Ok(Self {
            config,
            timer,
            presenter,
            sink,
            generator,
            sequence_rng,
            phase: TrialPhase::Idle,
            mode: SessionMode::default(),
            participant_id: String::new(),
            clock: None,
            slots: Vec::new(),
            trial_number: 0,
            current: None,
            advance: None,
            deadline_ns: None,
            records: Vec::new(),
            on_finish: None,
        })
    }

    /// Sequences the trials for `options.mode` and shows the first fixation.
    /// `on_finish` runs exactly once, when the session reaches END.
    pub fn start(&mut self, on_finish: impl FnOnce() + 'static, options: StartOptions) {
        if self.phase != TrialPhase::Idle {
            warn!(phase = %self.phase, "start ignored, session already started");
            return;
        }

        self.on_finish = Some(Box::new(on_finish));
        self.mode = options.mode;
        self.participant_id = options.participant_id;

        let practice = self.mode.is_practice();
        self.slots = build_trials(&self.config, &mut self.sequence_rng)
            .into_iter()
            .filter(|slot| slot.is_practice == practice)
            .collect();
        self.trial_number = 0;
        self.records.clear();

        let clock = SessionClock::start(&self.timer);
        let session = SessionInfo {
            session_id: Uuid::new_v4(),
            started_at: clock.started_at_iso(),
            start_epoch_ms: clock.start_epoch_ms(),
            mode: self.mode,
            participant_id: self.participant_id.clone(),
            config: self.config.snapshot(),
        };
        self.clock = Some(clock);

        info!(
            session_id = %session.session_id,
            mode = %self.mode,
            participant = %self.participant_id,
            trials = self.slots.len(),
            "session started"
        );
        self.sink.start_session(&session);
        self.run_next_trial();
    }

    /// Fires the earliest due transition, if any. Returns whether one fired;
    /// call again until it returns `false`.
    pub fn update(&mut self) -> bool {
        let now = self.timer.now();

        if let Some(scheduled) = self.advance {
            if now >= scheduled.due_ns {
                self.advance = None;
                self.fire(scheduled.step);
                return true;
            }
        }

        if let Some(due) = self.deadline_ns {
            if now >= due {
                self.deadline_ns = None;
                self.handle_timeout();
                return true;
            }
        }

        false
    }

    /// Earliest pending due time on the controller's timer.
    pub fn next_due(&self) -> Option<u64> {
        match (self.advance.map(|s| s.due_ns), self.deadline_ns) {
            (Some(a), Some(d)) => Some(a.min(d)),
            (a, d) => a.or(d),
        }
    }

    /// A participant selected choice `index`.
    pub fn respond(&mut self, index: usize) -> ResponseOutcome {
        if !self.phase.allows_input() {
            warn!(index, phase = %self.phase, "response outside the choice phase ignored");
            return ResponseOutcome::Ignored;
        }
        let Some(correct_index) = self.current_spec().map(|s| s.correct_index) else {
            return ResponseOutcome::Ignored;
        };
        let n_choices = self.current_spec().map_or(0, MatchTrialSpec::n_choices);
        let now = self.timer.now();
        let absolute_ms = self.relative_ms(now);

        let Some(trial) = self.current.as_mut() else {
            return ResponseOutcome::Ignored;
        };
        if trial.locked {
            return ResponseOutcome::Ignored;
        }
        if index >= n_choices || trial.responses.is_rejected(index) {
            warn!(index, n_choices, "response to unavailable option ignored");
            return ResponseOutcome::Ignored;
        }

        let choices_start = trial.timestamps.choices_start.unwrap_or(now);
        let rt_ms = ns_to_ms(now.saturating_sub(choices_start));
        let correct = index == correct_index;
        let attempt = trial.responses.record(index, correct, rt_ms, absolute_ms);
        trace!(trial = trial.index, attempt, index, correct, rt_ms, "response");

        if !correct {
            self.presenter.present(PhaseEvent::ChoiceRejected { index });
            return ResponseOutcome::Incorrect { attempt };
        }

        trial.locked = true;
        self.deadline_ns = None;
        self.finish_trial(Outcome {
            correct: attempt == 1,
            correct_on_any_try: true,
            timed_out: false,
            chosen_index: Some(index),
            rt_ms: Some(rt_ms),
            end_ns: now,
        });
        ResponseOutcome::Correct { attempt }
    }

    /// The host page lost visibility. Marks the current trial invalid when it
    /// happens during the choice phase.
    pub fn on_hidden(&mut self) {
        if self.phase != TrialPhase::Choices {
            return;
        }
        if let Some(trial) = self.current.as_mut() {
            if !trial.visibility_hidden {
                debug!(trial = trial.index, "visibility lost during choices");
            }
            trial.visibility_hidden = true;
        }
    }

    pub fn phase(&self) -> TrialPhase {
        self.phase
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn is_finished(&self) -> bool {
        self.phase.is_finished()
    }

    pub fn records(&self) -> &[TrialRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<TrialRecord> {
        self.records
    }

    pub fn slots(&self) -> &[TrialSlot] {
        &self.slots
    }

    /// Stimuli of the trial on screen, once generated.
    pub fn current_spec(&self) -> Option<&MatchTrialSpec> {
        self.slots
            .get(self.trial_number)
            .and_then(|slot| slot.spec.as_ref())
    }

    /// What a respondent sees while the choices are interactive.
    pub fn response_context(&self) -> Option<ResponseContext<'_>> {
        if self.phase != TrialPhase::Choices {
            return None;
        }
        let spec = self.current_spec()?;
        let trial = self.current.as_ref()?;
        let choices_start = trial.timestamps.choices_start?;
        Some(ResponseContext {
            trial_index: trial.index,
            spec,
            rejected: trial.responses.rejected(),
            attempts: trial.responses.attempts(),
            elapsed_ms: ns_to_ms(self.timer.now().saturating_sub(choices_start)),
        })
    }

    /// `(1-based trial, total)` while the session runs.
    pub fn trial_progress(&self) -> Option<(usize, usize)> {
        self.phase
            .is_running()
            .then(|| (self.trial_number + 1, self.slots.len()))
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    pub fn sink(&self) -> &L {
        &self.sink
    }

    fn fire(&mut self, step: Step) {
        match step {
            Step::ShowSample => self.show_sample(),
            Step::ShowDelay => self.show_delay(),
            Step::ShowChoices => self.show_choices(false),
            Step::ChoicesInteractive => self.open_choices(),
            Step::NextTrial => {
                self.trial_number += 1;
                self.run_next_trial();
            }
        }
    }

    fn schedule(&mut self, after_ms: u64, step: Step) {
        let due_ns = self
            .timer
            .now()
            .saturating_add(Duration::from_millis(after_ms).as_nanos() as u64);
        self.advance = Some(Scheduled { due_ns, step });
    }

    fn clear_timers(&mut self) {
        self.advance = None;
        self.deadline_ns = None;
    }

    fn enter(&mut self, phase: TrialPhase) {
        debug!(trial = self.trial_number, from = %self.phase, to = %phase, "phase");
        self.phase = phase;
    }

    fn relative_ms(&self, ts_ns: u64) -> f64 {
        self.clock.map_or(0.0, |c| c.relative_ms(ts_ns))
    }

    fn run_next_trial(&mut self) {
        self.clear_timers();
        let Some(slot) = self.slots.get(self.trial_number) else {
            self.end_session();
            return;
        };

        let durations = TrialDurations::from_config(&self.config, slot.delay_ms);
        let fixation_ms = durations.fixation_ms;
        self.current = Some(Trial::new(self.trial_number, durations, self.timer.now()));

        self.enter(TrialPhase::Fixation);
        self.presenter.present(PhaseEvent::Fixation {
            trial_index: self.trial_number,
        });
        self.schedule(fixation_ms, Step::ShowSample);
    }

    fn show_sample(&mut self) {
        self.clear_timers();
        let spec = match self
            .generator
            .generate_match_trial(self.config.n_choices, self.config.shared_quadrants)
        {
            Ok(spec) => spec,
            Err(err) => {
                error!(%err, "stimulus generation rejected validated configuration");
                self.end_session();
                return;
            }
        };

        let Some(slot) = self.slots.get_mut(self.trial_number) else {
            return;
        };
        slot.spec = Some(spec);
        let simultaneous = slot.simultaneous;

        self.enter(TrialPhase::Sample);
        if simultaneous {
            self.show_choices(true);
            return;
        }

        if let Some(spec) = self
            .slots
            .get(self.trial_number)
            .and_then(|slot| slot.spec.as_ref())
        {
            self.presenter.present(PhaseEvent::Sample {
                sample: spec.sample.as_ref(),
            });
        }
        let sample_ms = self.current.as_ref().map_or(0, |t| t.durations.sample_ms);
        self.schedule(sample_ms, Step::ShowDelay);
    }

    fn show_delay(&mut self) {
        self.clear_timers();
        let delay_ms = self.current.as_ref().map_or(0, |t| t.durations.delay_ms);
        self.enter(TrialPhase::Delay);
        self.presenter.present(PhaseEvent::Delay { delay_ms });
        self.schedule(delay_ms, Step::ShowChoices);
    }

    fn show_choices(&mut self, with_sample: bool) {
        self.clear_timers();
        self.enter(TrialPhase::ChoicesPrerender);
        if let Some(spec) = self
            .slots
            .get(self.trial_number)
            .and_then(|slot| slot.spec.as_ref())
        {
            self.presenter
                .present(PhaseEvent::Choices { spec, with_sample });
        }
        // Interactive from the next poll, after the host has drawn the choices.
        self.schedule(0, Step::ChoicesInteractive);
    }

    fn open_choices(&mut self) {
        self.clear_timers();
        let now = self.timer.now();
        let deadline_ms = match self.current.as_mut() {
            Some(trial) => {
                trial.timestamps.choices_start = Some(now);
                trial.durations.response_deadline_ms
            }
            None => None,
        };
        self.enter(TrialPhase::Choices);
        if let Some(ms) = deadline_ms {
            self.deadline_ns =
                Some(now.saturating_add(Duration::from_millis(ms).as_nanos() as u64));
        }
    }

    fn handle_timeout(&mut self) {
        if self.phase != TrialPhase::Choices {
            return;
        }
        let Some(trial) = self.current.as_mut() else {
            return;
        };
        if trial.locked {
            return;
        }
        trial.locked = true;
        let deadline_ms = trial.durations.response_deadline_ms;
        let index = trial.index;
        let attempts = trial.responses.attempts();

        self.enter(TrialPhase::Timeout);
        debug!(trial = index, attempts, "response deadline elapsed");
        let now = self.timer.now();
        self.finish_trial(Outcome {
            correct: false,
            correct_on_any_try: false,
            timed_out: true,
            chosen_index: None,
            rt_ms: deadline_ms.map(|ms| ms as f64),
            end_ns: now,
        });
    }

    fn finish_trial(&mut self, outcome: Outcome) {
        self.clear_timers();
        self.enter(TrialPhase::Feedback);

        let Some(trial) = self.current.as_ref() else {
            return;
        };
        let Some(slot) = self.slots.get(self.trial_number) else {
            return;
        };
        let Some(spec) = slot.spec.as_ref() else {
            warn!(trial = trial.index, "trial finished without stimuli, no record emitted");
            return;
        };

        let (start_ms, end_ms, start_epoch_ms, end_epoch_ms) = match self.clock {
            Some(clock) => {
                let start = clock.relative_ms(trial.timestamps.start);
                let end = clock.relative_ms(outcome.end_ns);
                (start, end, clock.epoch_ms(start), clock.epoch_ms(end))
            }
            None => (0.0, 0.0, 0.0, 0.0),
        };
        let responses = &trial.responses;
        let sample = spec.sample.as_ref();

        let record = TrialRecord {
            trial_index: trial.index,
            mode: self.mode,
            participant_id: self.participant_id.clone(),
            is_practice: slot.is_practice,
            condition_name: slot.condition_name.clone(),
            delay_ms: slot.delay_ms,
            simultaneous: slot.simultaneous,
            sample_id: sample.id(),
            sample_template_id: sample.template_id(),
            sample_segment_count: sample.segment_count(),
            sample_colors: sample.color_signature(),
            sample_pattern: sample.clone(),
            choice_patterns: spec.choice_snapshots(),
            n_choices: spec.n_choices(),
            correct_index: spec.correct_index,
            shared_quadrants: self.config.shared_quadrants,
            chosen_index: outcome.chosen_index,
            correct: outcome.correct,
            correct_on_any_try: outcome.correct_on_any_try,
            first_choice_correct: responses.first_choice_correct,
            choice_number_correct: responses.choice_number_correct,
            n_responses: responses.attempts(),
            rt_ms: outcome.rt_ms,
            rt_first_choice_ms: responses.rt_first_choice_ms,
            rt_correct_choice_ms: if outcome.correct_on_any_try {
                responses.rt_correct_choice_ms
            } else {
                None
            },
            timed_out: outcome.timed_out,
            response_deadline_ms: self.config.response_deadline_ms,
            choice_events: responses.events.clone(),
            visibility_hidden: trial.visibility_hidden,
            absolute_time_ms: end_ms,
            trial_start_ms: start_ms,
            trial_end_ms: end_ms,
            trial_start_epoch_ms: start_epoch_ms,
            trial_end_epoch_ms: end_epoch_ms,
            elapsed_ms: end_ms - start_ms,
        };
        let feedback_ms = trial.durations.feedback_ms;

        debug!(
            trial = record.trial_index,
            condition = %record.condition_name,
            correct = record.correct,
            correct_on_any_try = record.correct_on_any_try,
            timed_out = record.timed_out,
            responses = record.n_responses,
            "trial finished"
        );
        self.sink.log_trial(&record);
        self.records.push(record);

        match feedback_ms {
            Some(ms) => {
                self.presenter.present(PhaseEvent::Feedback {
                    correct: outcome.correct_on_any_try,
                    timed_out: outcome.timed_out,
                });
                self.schedule(ms, Step::NextTrial);
            }
            None => {
                self.trial_number += 1;
                self.run_next_trial();
            }
        }
    }

    fn end_session(&mut self) {
        self.clear_timers();
        self.current = None;
        self.enter(TrialPhase::End);

        let now = self.timer.now();
        let end_ms = self.relative_ms(now);
        let end = SessionEnd {
            end_ms,
            end_epoch_ms: self.clock.map_or(0.0, |c| c.epoch_ms(end_ms)),
            n_trials: self.records.len(),
        };
        self.sink.end_session(&end);
        self.presenter.present(PhaseEvent::End);
        info!(trials = end.n_trials, duration_ms = end_ms, "session finished");

        if let Some(on_finish) = self.on_finish.take() {
            on_finish();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presenter::{NullPresenter, PhaseLog};
    use crate::sink::DataLogger;
    use std::cell::Cell;
    use std::rc::Rc;
    use vismem_timing::ManualTimer;

    fn config() -> SessionConfig {
        SessionConfig {
            delay_ms_list: vec![4000],
            practice_trials_total: 0,
            main_trials_total: 2,
            seed: Some(11),
            ..SessionConfig::default()
        }
    }

    fn drain<T, P, L>(controller: &mut TrialController<T, P, L>)
    where
        T: Timer<Timestamp = u64>,
        P: Presenter,
        L: TrialSink,
    {
        while controller.update() {}
    }

    fn run_to_choices<P: Presenter, L: TrialSink>(
        timer: &ManualTimer,
        controller: &mut TrialController<ManualTimer, P, L>,
    ) {
        while controller.phase() != TrialPhase::Choices {
            let Some(due) = controller.next_due() else {
                break;
            };
            timer.set_ns(due.max(timer.now()));
            controller.update();
        }
    }

    #[test]
    fn rejects_invalid_configuration() {
        let bad = SessionConfig {
            shared_quadrants: 4,
            ..config()
        };
        let result = TrialController::new(bad, ManualTimer::new(), NullPresenter, DataLogger::new());
        assert!(matches!(
            result,
            Err(ConfigurationError::InvalidSharedQuadrants { .. })
        ));
    }

    #[test]
    fn phases_follow_the_configured_durations() {
        let timer = ManualTimer::new();
        let mut controller =
            TrialController::new(config(), timer.clone(), PhaseLog::default(), DataLogger::new())
                .unwrap();
        assert_eq!(controller.phase(), TrialPhase::Idle);

        controller.start(|| {}, StartOptions::default());
        assert_eq!(controller.phase(), TrialPhase::Fixation);
        assert_eq!(controller.next_due(), Some(500_000_000));

        timer.advance_ms(499);
        assert!(!controller.update());
        timer.advance_ms(1);
        assert!(controller.update());
        assert_eq!(controller.phase(), TrialPhase::Sample);
        assert!(controller.current_spec().is_some());

        timer.advance_ms(2000);
        drain(&mut controller);
        assert_eq!(controller.phase(), TrialPhase::Delay);

        timer.advance_ms(4000);
        assert!(controller.update());
        assert_eq!(controller.phase(), TrialPhase::ChoicesPrerender);
        assert!(controller.update());
        assert_eq!(controller.phase(), TrialPhase::Choices);
        assert_eq!(controller.next_due(), None);

        assert_eq!(
            controller.presenter().entries,
            vec!["FIXATION 0", "SAMPLE", "DELAY 4000", "CHOICES"]
        );
    }

    #[test]
    fn responses_outside_choices_are_ignored() {
        let timer = ManualTimer::new();
        let mut controller =
            TrialController::new(config(), timer.clone(), NullPresenter, DataLogger::new())
                .unwrap();
        assert_eq!(controller.respond(0), ResponseOutcome::Ignored);
        controller.start(|| {}, StartOptions::default());
        assert_eq!(controller.respond(0), ResponseOutcome::Ignored);
        assert!(controller.records().is_empty());
    }

    #[test]
    fn out_of_range_and_repeated_wrong_choices_are_ignored() {
        let timer = ManualTimer::new();
        let mut controller =
            TrialController::new(config(), timer.clone(), NullPresenter, DataLogger::new())
                .unwrap();
        controller.start(|| {}, StartOptions::default());
        run_to_choices(&timer, &mut controller);
        assert_eq!(controller.phase(), TrialPhase::Choices);

        let correct = controller.current_spec().unwrap().correct_index;
        let wrong = (correct + 1) % 4;
        assert_eq!(controller.respond(9), ResponseOutcome::Ignored);
        assert_eq!(
            controller.respond(wrong),
            ResponseOutcome::Incorrect { attempt: 1 }
        );
        assert_eq!(controller.respond(wrong), ResponseOutcome::Ignored);
        assert_eq!(controller.phase(), TrialPhase::Choices);
        assert_eq!(
            controller.respond(correct),
            ResponseOutcome::Correct { attempt: 2 }
        );
        assert_eq!(controller.respond(correct), ResponseOutcome::Ignored);
        assert_eq!(controller.records().len(), 1);
    }

    #[test]
    fn on_finish_runs_once_at_end() {
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let timer = ManualTimer::new();
        let mut controller = TrialController::new(
            SessionConfig {
                practice_trials_total: 0,
                ..config()
            },
            timer.clone(),
            NullPresenter,
            DataLogger::new(),
        )
        .unwrap();

        // Practice mode with zero practice trials ends immediately.
        controller.start(
            move || counter.set(counter.get() + 1),
            StartOptions {
                mode: SessionMode::Practice,
                participant_id: "p01".into(),
            },
        );
        assert!(controller.is_finished());
        assert_eq!(calls.get(), 1);

        controller.start(|| {}, StartOptions::default());
        assert!(!controller.update());
        assert_eq!(calls.get(), 1);
        assert_eq!(controller.sink().end.as_ref().map(|e| e.n_trials), Some(0));
    }
}
