use std::io::{self, Write};

use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;
use vismem_core::{SessionMode, TrialRecord};

use crate::config::ConfigSnapshot;

/// Written once when a session starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: Uuid,
    pub started_at: String,
    pub start_epoch_ms: f64,
    pub mode: SessionMode,
    pub participant_id: String,
    pub config: ConfigSnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEnd {
    /// Relative to session start.
    pub end_ms: f64,
    pub end_epoch_ms: f64,
    pub n_trials: usize,
}

/// Receives every finalized record, in trial order, as soon as it exists.
pub trait TrialSink {
    fn start_session(&mut self, info: &SessionInfo);
    fn log_trial(&mut self, record: &TrialRecord);
    fn end_session(&mut self, end: &SessionEnd);
}

impl<S: TrialSink + ?Sized> TrialSink for &mut S {
    fn start_session(&mut self, info: &SessionInfo) {
        (**self).start_session(info)
    }
    fn log_trial(&mut self, record: &TrialRecord) {
        (**self).log_trial(record)
    }
    fn end_session(&mut self, end: &SessionEnd) {
        (**self).end_session(end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub total: usize,
    pub n_correct: usize,
    /// Percent of first-choice-correct trials.
    pub accuracy: f64,
    /// Mean RT over first-choice-correct trials.
    pub mean_rt_ms: f64,
    pub timeouts: usize,
    pub eventual_correct: usize,
    pub mean_choices_to_correct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionSummary {
    pub condition: String,
    pub delay_ms: u64,
    pub total: usize,
    pub correct: usize,
    /// Rounded percent.
    pub accuracy: u32,
    /// Rounded mean RT of first-choice-correct trials.
    pub mean_rt_correct_ms: u64,
    pub timeouts: usize,
    pub eventual_correct: usize,
    pub mean_choices_to_correct: f64,
}

#[derive(Default)]
struct ConditionTally {
    total: usize,
    correct: usize,
    correct_on_any_try: usize,
    rt_sum: f64,
    rt_count: usize,
    timeouts: usize,
    choices_sum: u64,
    choices_count: usize,
}

/// Keeps the whole session in memory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataLogger {
    pub session: Option<SessionInfo>,
    pub end: Option<SessionEnd>,
    pub trials: Vec<TrialRecord>,
}

impl DataLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trials(&self) -> &[TrialRecord] {
        &self.trials
    }

    pub fn summary(&self) -> SessionSummary {
        let total = self.trials.len();
        let correct: Vec<&TrialRecord> = self.trials.iter().filter(|t| t.correct).collect();
        let rts: Vec<f64> = correct.iter().filter_map(|t| t.rt_ms).collect();
        let choices: Vec<u32> = self
            .trials
            .iter()
            .filter_map(|t| t.choice_number_correct)
            .collect();

        SessionSummary {
            total,
            n_correct: correct.len(),
            accuracy: if total > 0 {
                correct.len() as f64 / total as f64 * 100.0
            } else {
                0.0
            },
            mean_rt_ms: mean(rts.iter().copied()),
            timeouts: self.trials.iter().filter(|t| t.timed_out).count(),
            eventual_correct: self.trials.iter().filter(|t| t.correct_on_any_try).count(),
            mean_choices_to_correct: mean(choices.iter().map(|c| f64::from(*c))),
        }
    }

    /// Per-condition figures, in order of first appearance.
    pub fn condition_breakdown(&self) -> Vec<ConditionSummary> {
        let mut keys: Vec<(String, u64)> = Vec::new();
        let mut tallies: Vec<ConditionTally> = Vec::new();

        for trial in &self.trials {
            let slot = match keys.iter().position(|(name, _)| *name == trial.condition_name) {
                Some(i) => i,
                None => {
                    keys.push((trial.condition_name.clone(), trial.delay_ms));
                    tallies.push(ConditionTally::default());
                    keys.len() - 1
                }
            };
            let tally = &mut tallies[slot];
            tally.total += 1;
            if trial.correct {
                tally.correct += 1;
                if let Some(rt) = trial.rt_ms {
                    tally.rt_sum += rt;
                    tally.rt_count += 1;
                }
            }
            if trial.correct_on_any_try {
                tally.correct_on_any_try += 1;
            }
            if trial.timed_out {
                tally.timeouts += 1;
            }
            if let Some(n) = trial.choice_number_correct {
                tally.choices_sum += u64::from(n);
                tally.choices_count += 1;
            }
        }

        keys.into_iter()
            .zip(tallies)
            .map(|((condition, delay_ms), t)| ConditionSummary {
                condition,
                delay_ms,
                total: t.total,
                correct: t.correct,
                accuracy: if t.total > 0 {
                    (t.correct as f64 / t.total as f64 * 100.0).round() as u32
                } else {
                    0
                },
                mean_rt_correct_ms: if t.rt_count > 0 {
                    (t.rt_sum / t.rt_count as f64).round() as u64
                } else {
                    0
                },
                timeouts: t.timeouts,
                eventual_correct: t.correct_on_any_try,
                mean_choices_to_correct: if t.choices_count > 0 {
                    t.choices_sum as f64 / t.choices_count as f64
                } else {
                    0.0
                },
            })
            .collect()
    }
}

impl TrialSink for DataLogger {
    fn start_session(&mut self, info: &SessionInfo) {
        self.session = Some(info.clone());
        self.end = None;
        self.trials.clear();
    }

    fn log_trial(&mut self, record: &TrialRecord) {
        self.trials.push(record.clone());
    }

    fn end_session(&mut self, end: &SessionEnd) {
        self.end = Some(end.clone());
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 { 0.0 } else { sum / n as f64 }
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Line<'a> {
    Session(&'a SessionInfo),
    Trial(&'a TrialRecord),
    End(&'a SessionEnd),
}

/// Streams the session as JSON lines: one `session` line, one `trial` line per
/// record, one `end` line. Write errors are kept and reported by
/// [`finish`](JsonLinesSink::finish); later lines are skipped.
pub struct JsonLinesSink<W: Write> {
    writer: W,
    error: Option<io::Error>,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            error: None,
        }
    }

    pub fn finish(mut self) -> io::Result<W> {
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        self.writer.flush()?;
        Ok(self.writer)
    }

    fn write_line(&mut self, line: Line<'_>) {
        if self.error.is_some() {
            return;
        }
        let result = serde_json::to_writer(&mut self.writer, &line)
            .map_err(io::Error::from)
            .and_then(|()| self.writer.write_all(b"\n"));
        if let Err(err) = result {
            warn!(%err, "trial export failed, dropping further lines");
            self.error = Some(err);
        }
    }
}

impl<W: Write> TrialSink for JsonLinesSink<W> {
    fn start_session(&mut self, info: &SessionInfo) {
        self.write_line(Line::Session(info));
    }

    fn log_trial(&mut self, record: &TrialRecord) {
        self.write_line(Line::Trial(record));
    }

    fn end_session(&mut self, end: &SessionEnd) {
        self.write_line(Line::End(end));
    }
}

/// Fans every call out to two sinks.
pub struct Tee<A, B>(pub A, pub B);

impl<A: TrialSink, B: TrialSink> TrialSink for Tee<A, B> {
    fn start_session(&mut self, info: &SessionInfo) {
        self.0.start_session(info);
        self.1.start_session(info);
    }

    fn log_trial(&mut self, record: &TrialRecord) {
        self.0.log_trial(record);
        self.1.log_trial(record);
    }

    fn end_session(&mut self, end: &SessionEnd) {
        self.0.end_session(end);
        self.1.end_session(end);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use vismem_core::{Color, Pattern, Segment, Texture};

    fn record(index: usize, condition: &str, attempts: &[bool], timed_out: bool) -> TrialRecord {
        let pattern = Pattern::new(1, 0, vec![Segment::new(Texture::Holes, Color::from_hue(0))]);
        let correct_at = attempts.iter().position(|c| *c).map(|i| i as u32 + 1);
        TrialRecord {
            trial_index: index,
            mode: SessionMode::Main,
            participant_id: "p".into(),
            is_practice: false,
            condition_name: condition.into(),
            delay_ms: 0,
            simultaneous: true,
            sample_id: 1,
            sample_template_id: 0,
            sample_segment_count: 1,
            sample_colors: pattern.color_signature(),
            sample_pattern: pattern.clone(),
            choice_patterns: vec![pattern],
            n_choices: 1,
            correct_index: 0,
            shared_quadrants: 1,
            chosen_index: correct_at.map(|_| 0),
            correct: correct_at == Some(1),
            correct_on_any_try: correct_at.is_some(),
            first_choice_correct: attempts.first().copied(),
            choice_number_correct: correct_at,
            n_responses: attempts.len() as u32,
            rt_ms: correct_at.map(|n| 400.0 * f64::from(n)),
            rt_first_choice_ms: attempts.first().map(|_| 400.0),
            rt_correct_choice_ms: correct_at.map(|n| 400.0 * f64::from(n)),
            timed_out,
            response_deadline_ms: None,
            choice_events: Vec::new(),
            visibility_hidden: false,
            absolute_time_ms: 0.0,
            trial_start_ms: 0.0,
            trial_end_ms: 0.0,
            trial_start_epoch_ms: 0.0,
            trial_end_epoch_ms: 0.0,
            elapsed_ms: 0.0,
        }
    }

    #[test]
    fn summary_separates_first_and_eventual_correctness() {
        let mut logger = DataLogger::new();
        logger.log_trial(&record(1, "SIMULTANEOUS", &[true], false));
        logger.log_trial(&record(2, "SIMULTANEOUS", &[false, true], false));
        logger.log_trial(&record(3, "DELAY 4000ms", &[false], true));
        logger.log_trial(&record(4, "DELAY 4000ms", &[true], false));

        let summary = logger.summary();
        assert_eq!(summary.total, 4);
        assert_eq!(summary.n_correct, 2);
        assert_eq!(summary.accuracy, 50.0);
        assert_eq!(summary.mean_rt_ms, 400.0);
        assert_eq!(summary.timeouts, 1);
        assert_eq!(summary.eventual_correct, 3);
        assert!((summary.mean_choices_to_correct - 4.0 / 3.0).abs() < 1e-9);

        let breakdown = logger.condition_breakdown();
        assert_eq!(breakdown.len(), 2);
        assert_eq!(breakdown[0].condition, "SIMULTANEOUS");
        assert_eq!(breakdown[0].accuracy, 50);
        assert_eq!(breakdown[0].eventual_correct, 2);
        assert_eq!(breakdown[1].timeouts, 1);
        assert_eq!(breakdown[1].mean_rt_correct_ms, 400);
    }

    #[test]
    fn empty_logger_reports_zeros() {
        let summary = DataLogger::new().summary();
        assert_eq!(summary.total, 0);
        assert_eq!(summary.accuracy, 0.0);
        assert!(DataLogger::new().condition_breakdown().is_empty());
    }

    #[test]
    fn json_lines_are_tagged_by_kind() {
        let mut sink = JsonLinesSink::new(Vec::new());
        sink.start_session(&SessionInfo {
            session_id: Uuid::nil(),
            started_at: "2024-05-01T12:00:00.000Z".into(),
            start_epoch_ms: 0.0,
            mode: SessionMode::Main,
            participant_id: "p".into(),
            config: SessionConfig::default().snapshot(),
        });
        sink.log_trial(&record(1, "SIMULTANEOUS", &[true], false));
        sink.end_session(&SessionEnd {
            end_ms: 10.0,
            end_epoch_ms: 10.0,
            n_trials: 1,
        });

        let bytes = sink.finish().unwrap();
        let kinds: Vec<String> = String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(|line| {
                let value: serde_json::Value = serde_json::from_str(line).unwrap();
                value["kind"].as_str().unwrap().to_string()
            })
            .collect();
        assert_eq!(kinds, ["session", "trial", "end"]);
    }

    struct Broken;

    impl Write for Broken {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::other("disk full"))
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn write_errors_surface_on_finish() {
        let mut sink = JsonLinesSink::new(Broken);
        sink.log_trial(&record(1, "SIMULTANEOUS", &[true], false));
        sink.log_trial(&record(2, "SIMULTANEOUS", &[true], false));
        assert!(sink.finish().is_err());
    }
}
