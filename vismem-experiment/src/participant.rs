use rand::Rng;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::session::{Action, ResponseContext, Respondent};

/// Behaviour of a [`SimulatedParticipant`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticipantProfile {
    /// Probability that an attempt picks the correct option.
    pub accuracy: f64,
    pub rt_min_ms: f64,
    pub rt_max_ms: f64,
    /// Keep choosing among remaining options after a wrong answer.
    pub retry: bool,
    /// `false` never answers; with a deadline every trial times out.
    pub responds: bool,
    /// Chance per trial of switching away from the page before answering.
    pub hide_probability: f64,
}

impl Default for ParticipantProfile {
    fn default() -> Self {
        Self {
            accuracy: 0.8,
            rt_min_ms: 450.0,
            rt_max_ms: 1800.0,
            retry: true,
            responds: true,
            hide_probability: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Plan {
    trial_index: usize,
    attempts: u32,
    due_ms: f64,
    hide_pending: bool,
}

/// Scripted respondent for dry runs and tests.
pub struct SimulatedParticipant<R> {
    profile: ParticipantProfile,
    rng: R,
    plan: Option<Plan>,
}

impl<R: Rng> SimulatedParticipant<R> {
    pub fn new(profile: ParticipantProfile, rng: R) -> Self {
        let mut profile = profile;
        profile.accuracy = profile.accuracy.clamp(0.0, 1.0);
        profile.hide_probability = profile.hide_probability.clamp(0.0, 1.0);
        profile.rt_min_ms = profile.rt_min_ms.max(0.0);
        if profile.rt_max_ms < profile.rt_min_ms {
            profile.rt_max_ms = profile.rt_min_ms;
        }
        Self {
            profile,
            rng,
            plan: None,
        }
    }

    pub fn profile(&self) -> &ParticipantProfile {
        &self.profile
    }

    fn plan_for(&mut self, ctx: &ResponseContext<'_>) -> Plan {
        match self.plan {
            Some(plan) if plan.trial_index == ctx.trial_index && plan.attempts == ctx.attempts => {
                plan
            }
            _ => {
                let rt = self
                    .rng
                    .random_range(self.profile.rt_min_ms..=self.profile.rt_max_ms);
                let hide_pending =
                    ctx.attempts == 0 && self.rng.random_bool(self.profile.hide_probability);
                Plan {
                    trial_index: ctx.trial_index,
                    attempts: ctx.attempts,
                    due_ms: ctx.elapsed_ms + rt,
                    hide_pending,
                }
            }
        }
    }

    fn pick(&mut self, ctx: &ResponseContext<'_>) -> usize {
        let correct = ctx.spec.correct_index;
        if self.rng.random_bool(self.profile.accuracy) {
            return correct;
        }
        let wrong: Vec<usize> = ctx.available().filter(|i| *i != correct).collect();
        wrong.choose(&mut self.rng).copied().unwrap_or(correct)
    }
}

impl<R: Rng> Respondent for SimulatedParticipant<R> {
    fn poll(&mut self, ctx: &ResponseContext<'_>) -> Option<Action> {
        if !self.profile.responds || (ctx.attempts > 0 && !self.profile.retry) {
            return None;
        }

        let mut plan = self.plan_for(ctx);
        if plan.hide_pending {
            plan.hide_pending = false;
            self.plan = Some(plan);
            return Some(Action::Hide);
        }
        self.plan = Some(plan);
        if ctx.elapsed_ms < plan.due_ms {
            return None;
        }

        let index = self.pick(ctx);
        trace!(trial = ctx.trial_index, attempt = ctx.attempts + 1, index, "simulated response");
        Some(Action::Choose(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::PatternGenerator;
    use crate::random::RandomSource;

    #[test]
    fn waits_for_the_planned_reaction_time() {
        let spec = PatternGenerator::seeded(4, 3).generate_match_trial(4, 1).unwrap();
        let profile = ParticipantProfile {
            accuracy: 1.0,
            rt_min_ms: 500.0,
            rt_max_ms: 500.0,
            ..ParticipantProfile::default()
        };
        let mut participant = SimulatedParticipant::new(profile, RandomSource::seeded(1));
        let ctx = |elapsed_ms| ResponseContext {
            trial_index: 0,
            spec: &spec,
            rejected: &[],
            attempts: 0,
            elapsed_ms,
        };

        assert_eq!(participant.poll(&ctx(0.0)), None);
        assert_eq!(participant.poll(&ctx(499.0)), None);
        assert_eq!(
            participant.poll(&ctx(500.0)),
            Some(Action::Choose(spec.correct_index))
        );
    }

    #[test]
    fn wrong_answers_avoid_rejected_options() {
        let spec = PatternGenerator::seeded(4, 8).generate_match_trial(3, 1).unwrap();
        let correct = spec.correct_index;
        let rejected: Vec<usize> = (0..3).filter(|i| *i != correct).take(1).collect();
        let remaining_wrong = (0..3).find(|i| *i != correct && !rejected.contains(i));

        let profile = ParticipantProfile {
            accuracy: 0.0,
            rt_min_ms: 0.0,
            rt_max_ms: 0.0,
            ..ParticipantProfile::default()
        };
        let mut participant = SimulatedParticipant::new(profile, RandomSource::seeded(2));
        let ctx = ResponseContext {
            trial_index: 0,
            spec: &spec,
            rejected: &rejected,
            attempts: 1,
            elapsed_ms: 10.0,
        };
        assert_eq!(participant.poll(&ctx), remaining_wrong.map(Action::Choose));
    }

    #[test]
    fn hides_before_answering_and_respects_retry() {
        let spec = PatternGenerator::seeded(4, 5).generate_match_trial(4, 1).unwrap();
        let profile = ParticipantProfile {
            rt_min_ms: 0.0,
            rt_max_ms: 0.0,
            retry: false,
            hide_probability: 1.0,
            ..ParticipantProfile::default()
        };
        let mut participant = SimulatedParticipant::new(profile, RandomSource::seeded(4));
        let first = ResponseContext {
            trial_index: 2,
            spec: &spec,
            rejected: &[],
            attempts: 0,
            elapsed_ms: 0.0,
        };
        assert_eq!(participant.poll(&first), Some(Action::Hide));
        assert!(matches!(participant.poll(&first), Some(Action::Choose(_))));

        let after_wrong = ResponseContext {
            attempts: 1,
            ..first
        };
        assert_eq!(participant.poll(&after_wrong), None);
    }

    #[test]
    fn silent_profile_never_answers() {
        let spec = PatternGenerator::seeded(4, 6).generate_match_trial(2, 1).unwrap();
        let profile = ParticipantProfile {
            responds: false,
            ..ParticipantProfile::default()
        };
        let mut participant = SimulatedParticipant::new(profile, RandomSource::seeded(9));
        let ctx = ResponseContext {
            trial_index: 0,
            spec: &spec,
            rejected: &[],
            attempts: 0,
            elapsed_ms: 60_000.0,
        };
        assert_eq!(participant.poll(&ctx), None);
    }
}
