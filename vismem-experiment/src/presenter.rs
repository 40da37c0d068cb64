use vismem_core::{MatchTrialSpec, Pattern, TrialPhase};

/// What the host should put on screen after a phase change.
#[derive(Debug, Clone, Copy)]
pub enum PhaseEvent<'a> {
    Fixation { trial_index: usize },
    Sample { sample: &'a Pattern },
    /// Blank screen while the sample is held in memory.
    Delay { delay_ms: u64 },
    /// `with_sample` is set for simultaneous trials.
    Choices {
        spec: &'a MatchTrialSpec,
        with_sample: bool,
    },
    ChoiceRejected { index: usize },
    Feedback { correct: bool, timed_out: bool },
    End,
}

impl PhaseEvent<'_> {
    pub fn phase(&self) -> Option<TrialPhase> {
        match self {
            PhaseEvent::Fixation { .. } => Some(TrialPhase::Fixation),
            PhaseEvent::Sample { .. } => Some(TrialPhase::Sample),
            PhaseEvent::Delay { .. } => Some(TrialPhase::Delay),
            PhaseEvent::Choices { .. } => Some(TrialPhase::ChoicesPrerender),
            PhaseEvent::ChoiceRejected { .. } => None,
            PhaseEvent::Feedback { .. } => Some(TrialPhase::Feedback),
            PhaseEvent::End => Some(TrialPhase::End),
        }
    }
}

/// Phase-change hook. Called synchronously from the controller; it must not
/// call back into it.
pub trait Presenter {
    fn present(&mut self, event: PhaseEvent<'_>);
}

impl<P: Presenter + ?Sized> Presenter for &mut P {
    fn present(&mut self, event: PhaseEvent<'_>) {
        (**self).present(event)
    }
}

/// Presenter for headless runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPresenter;

impl Presenter for NullPresenter {
    fn present(&mut self, _event: PhaseEvent<'_>) {}
}

/// Records the phase sequence, one entry per event. Useful for asserting
/// transition order.
#[derive(Debug, Default, Clone)]
pub struct PhaseLog {
    pub entries: Vec<String>,
}

impl Presenter for PhaseLog {
    fn present(&mut self, event: PhaseEvent<'_>) {
        let entry = match event {
            PhaseEvent::Fixation { trial_index } => format!("FIXATION {trial_index}"),
            PhaseEvent::Sample { .. } => "SAMPLE".to_string(),
            PhaseEvent::Delay { delay_ms } => format!("DELAY {delay_ms}"),
            PhaseEvent::Choices { with_sample, .. } => {
                if with_sample {
                    "CHOICES+SAMPLE".to_string()
                } else {
                    "CHOICES".to_string()
                }
            }
            PhaseEvent::ChoiceRejected { index } => format!("REJECTED {index}"),
            PhaseEvent::Feedback { correct, timed_out } => {
                format!("FEEDBACK correct={correct} timed_out={timed_out}")
            }
            PhaseEvent::End => "END".to_string(),
        };
        self.entries.push(entry);
    }
}
