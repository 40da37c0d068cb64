use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};
use vismem_core::{ConfigurationError, MatchTrialSpec, TrialPhase, TrialRecord};
use vismem_timing::{Timer, ns_to_ms};

use crate::config::SessionConfig;
use crate::presenter::Presenter;
use crate::sink::TrialSink;
use crate::state::{ResponseOutcome, StartOptions, TrialController};

/// What a respondent does on one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Choose(usize),
    /// The host page went to the background.
    Hide,
}

/// Snapshot of the interactive choice screen.
#[derive(Debug, Clone, Copy)]
pub struct ResponseContext<'a> {
    pub trial_index: usize,
    pub spec: &'a MatchTrialSpec,
    /// Options already answered wrongly; they no longer accept input.
    pub rejected: &'a [usize],
    pub attempts: u32,
    /// Since the choices became interactive.
    pub elapsed_ms: f64,
}

impl ResponseContext<'_> {
    pub fn available(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.spec.n_choices()).filter(|i| !self.rejected.contains(i))
    }
}

/// Source of responses, polled once per frame while choices are interactive.
pub trait Respondent {
    fn poll(&mut self, ctx: &ResponseContext<'_>) -> Option<Action>;
}

impl<R: Respondent + ?Sized> Respondent for &mut R {
    fn poll(&mut self, ctx: &ResponseContext<'_>) -> Option<Action> {
        (**self).poll(ctx)
    }
}

/// Never answers.
#[derive(Debug, Default, Clone, Copy)]
pub struct Silent;

impl Respondent for Silent {
    fn poll(&mut self, _ctx: &ResponseContext<'_>) -> Option<Action> {
        None
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("session stalled in {phase} for {waited_ms:.0} ms with nothing scheduled")]
    Stalled { phase: TrialPhase, waited_ms: f64 },
}

pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_micros(16_667);
pub const DEFAULT_STALL_LIMIT: Duration = Duration::from_secs(600);

/// Runs one whole session on a timer: polls the controller, feeds it
/// responses, and sleeps until the next due time or frame.
#[derive(Debug, Clone)]
pub struct SessionRunner<T> {
    timer: T,
    frame_interval: Duration,
    stall_limit: Duration,
}

impl<T: Timer<Timestamp = u64>> SessionRunner<T> {
    pub fn new(timer: T) -> Self {
        Self {
            timer,
            frame_interval: DEFAULT_FRAME_INTERVAL,
            stall_limit: DEFAULT_STALL_LIMIT,
        }
    }

    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval.max(Duration::from_micros(100));
        self
    }

    /// Upper bound on time without any transition or accepted response. Only
    /// reachable when there is no response deadline.
    pub fn with_stall_limit(mut self, limit: Duration) -> Self {
        self.stall_limit = limit;
        self
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }

    /// Runs the practice or main block of `config` to completion and returns
    /// its records in trial order.
    pub fn run<P, L, R>(
        &self,
        config: &SessionConfig,
        options: StartOptions,
        presenter: P,
        sink: L,
        mut respondent: R,
    ) -> Result<Vec<TrialRecord>, RunError>
    where
        P: Presenter,
        L: TrialSink,
        R: Respondent,
    {
        let mut controller =
            TrialController::new(config.clone(), self.timer.clone(), presenter, sink)?;
        controller.start(|| debug!("session end reached"), options);

        let stall_ns = self.stall_limit.as_nanos() as u64;
        let frame_ns = self.frame_interval.as_nanos() as u64;
        let mut last_progress = self.timer.now();

        while !controller.is_finished() {
            if controller.update() {
                last_progress = self.timer.now();
                continue;
            }

            let action = controller
                .response_context()
                .and_then(|ctx| respondent.poll(&ctx));
            match action {
                Some(Action::Choose(index)) => {
                    if controller.respond(index) != ResponseOutcome::Ignored {
                        last_progress = self.timer.now();
                        continue;
                    }
                }
                Some(Action::Hide) => controller.on_hidden(),
                None => {}
            }

            let now = self.timer.now();
            let idle = now.saturating_sub(last_progress);
            if idle > stall_ns {
                warn!(phase = %controller.phase(), "no progress, giving up");
                return Err(RunError::Stalled {
                    phase: controller.phase(),
                    waited_ms: ns_to_ms(idle),
                });
            }

            let wait = controller
                .next_due()
                .map_or(frame_ns, |due| due.saturating_sub(now).min(frame_ns));
            self.timer.sleep(Duration::from_nanos(wait));
        }

        Ok(controller.into_records())
    }
}
