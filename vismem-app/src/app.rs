use std::fs::File;
use std::io::{self, BufWriter, Write};

use anyhow::{Context, Result, bail};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use tracing::{debug, info, warn};
use vismem_core::{SessionMode, TrialRecord};
use vismem_experiment::{
    DataLogger, JsonLinesSink, ParticipantProfile, PatternGenerator, PhaseEvent, Presenter,
    RandomSource, SessionConfig, SessionRunner, SimulatedParticipant, StartOptions, Tee,
    build_trials,
};
use vismem_render::PatternRenderer;
use vismem_timing::{HighPrecisionTimer, ManualTimer, Timer};

use crate::cli::{Cli, Command, PlanArgs, PreviewArgs, RunArgs};
use crate::settings;

pub struct App {
    command: Command,
    config: SessionConfig,
}

impl App {
    pub fn new(cli: Cli) -> Result<Self> {
        let config = settings::load(cli.config.as_deref())?;
        debug!(?config, "session settings");
        Ok(Self {
            command: cli.command,
            config,
        })
    }

    pub fn run(self) -> Result<()> {
        match &self.command {
            Command::Run(args) => self.run_session(args),
            Command::Plan(args) => self.plan(args),
            Command::Preview(args) => self.preview(args),
        }
    }

    fn run_session(&self, args: &RunArgs) -> Result<()> {
        let mut config = self.config.clone();
        if args.seed.is_some() {
            config.seed = args.seed;
        }
        if args.silent && config.response_deadline_ms.is_none() {
            bail!("a silent participant needs response_deadline_ms, or the session never ends");
        }

        let profile = ParticipantProfile {
            accuracy: args.accuracy,
            rt_min_ms: args.rt_min_ms,
            rt_max_ms: args.rt_max_ms,
            retry: !args.no_retry,
            responds: !args.silent,
            hide_probability: args.hide_probability,
        };
        let rng = match args.participant_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let participant = SimulatedParticipant::new(profile, rng);

        let writer: Box<dyn Write> = match &args.out {
            Some(path) => Box::new(BufWriter::new(
                File::create(path).with_context(|| format!("creating {}", path.display()))?,
            )),
            None => Box::new(BufWriter::new(io::stdout().lock())),
        };
        let mut sink = Tee(DataLogger::new(), JsonLinesSink::new(writer));

        let options = StartOptions {
            mode: args.mode,
            participant_id: args.participant.clone(),
        };
        let records = if args.realtime {
            info!("running on the wall clock");
            simulate(HighPrecisionTimer::new(), &config, options, &mut sink, participant)?
        } else {
            simulate(ManualTimer::new(), &config, options, &mut sink, participant)?
        };

        let Tee(logger, export) = sink;
        export.finish().context("writing trial export")?;
        if let Some(path) = &args.out {
            info!(path = %path.display(), trials = records.len(), "trial export written");
        }
        report(&logger);
        Ok(())
    }

    fn plan(&self, args: &PlanArgs) -> Result<()> {
        let seed = args.seed.or(self.config.seed);
        let mut rng = RandomSource::for_sequencing(seed);
        let slots = build_trials(&self.config, &mut rng);

        let stdout = io::stdout();
        let mut out = stdout.lock();
        let mut index = 0;
        for slot in &slots {
            let mode = if slot.is_practice {
                SessionMode::Practice
            } else {
                SessionMode::Main
            };
            if args.mode.is_some_and(|m| m != mode) {
                continue;
            }
            index += 1;
            let row = PlanRow {
                index,
                mode,
                condition: &slot.condition_name,
                delay_ms: slot.delay_ms,
                simultaneous: slot.simultaneous,
            };
            if args.json {
                serde_json::to_writer(&mut out, &row)?;
                writeln!(out)?;
            } else {
                writeln!(
                    out,
                    "{:>4}  {:<8}  {:<16}  {:>6}",
                    row.index,
                    row.mode.as_str(),
                    row.condition,
                    row.delay_ms
                )?;
            }
        }
        if seed.is_none() {
            warn!("no seed set, the order above will not repeat");
        }
        Ok(())
    }

    fn preview(&self, args: &PreviewArgs) -> Result<()> {
        let segments = args.segments.unwrap_or(self.config.segment_count);
        let mut generator = PatternGenerator::new(segments, RandomSource::new(args.seed));
        let renderer = PatternRenderer::default();

        let pixmap = if args.trial {
            let spec = generator
                .generate_match_trial(self.config.n_choices, self.config.shared_quadrants)
                .context("generating preview trial")?;
            info!(
                sample = spec.sample.id(),
                correct_index = spec.correct_index,
                choices = spec.n_choices(),
                "rendering trial"
            );
            renderer.render_trial(&spec, args.size, true)?
        } else {
            let pattern = generator.generate_pattern(generator.segment_count());
            info!(
                id = pattern.id(),
                template = pattern.template_id(),
                colors = %pattern.color_signature(),
                "rendering pattern"
            );
            renderer.render(&pattern, args.size, args.size)?
        };

        renderer.save_png(&pixmap, &args.out)?;
        info!(path = %args.out.display(), "preview written");
        Ok(())
    }
}

#[derive(Serialize)]
struct PlanRow<'a> {
    index: usize,
    mode: SessionMode,
    condition: &'a str,
    delay_ms: u64,
    simultaneous: bool,
}

/// Logs every phase change; the headless stand-in for a display.
#[derive(Debug, Default)]
struct TracePresenter;

impl Presenter for TracePresenter {
    fn present(&mut self, event: PhaseEvent<'_>) {
        match event {
            PhaseEvent::Fixation { trial_index } => debug!(trial = trial_index, "fixation"),
            PhaseEvent::Sample { sample } => debug!(sample = sample.id(), "sample"),
            PhaseEvent::Delay { delay_ms } => debug!(delay_ms, "delay"),
            PhaseEvent::Choices { spec, with_sample } => {
                debug!(choices = spec.n_choices(), with_sample, "choices")
            }
            PhaseEvent::ChoiceRejected { index } => debug!(index, "choice rejected"),
            PhaseEvent::Feedback { correct, timed_out } => {
                debug!(correct, timed_out, "feedback")
            }
            PhaseEvent::End => debug!("end"),
        }
    }
}

fn simulate<T, R>(
    timer: T,
    config: &SessionConfig,
    options: StartOptions,
    sink: &mut Tee<DataLogger, JsonLinesSink<Box<dyn Write>>>,
    participant: SimulatedParticipant<R>,
) -> Result<Vec<TrialRecord>>
where
    T: Timer<Timestamp = u64>,
    R: rand::Rng,
{
    let runner = SessionRunner::new(timer);
    let records = runner.run(config, options, TracePresenter, sink, participant)?;
    Ok(records)
}

fn report(logger: &DataLogger) {
    let summary = logger.summary();
    info!(
        trials = summary.total,
        correct = summary.n_correct,
        accuracy = format_args!("{:.1}%", summary.accuracy),
        mean_rt_ms = format_args!("{:.0}", summary.mean_rt_ms),
        timeouts = summary.timeouts,
        eventual_correct = summary.eventual_correct,
        mean_choices_to_correct = format_args!("{:.2}", summary.mean_choices_to_correct),
        "session summary"
    );
    for row in logger.condition_breakdown() {
        info!(
            condition = %row.condition,
            trials = row.total,
            correct = row.correct,
            accuracy = row.accuracy,
            mean_rt_correct_ms = row.mean_rt_correct_ms,
            timeouts = row.timeouts,
            "condition"
        );
    }
    let hidden = logger.trials().iter().filter(|t| !t.is_valid()).count();
    if hidden > 0 {
        warn!(hidden, "trials with the page hidden are flagged invalid");
    }
}
