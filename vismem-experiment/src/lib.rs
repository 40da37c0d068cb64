pub mod catalog;
pub mod config;
pub mod generator;
pub mod participant;
pub mod presenter;
pub mod random;
pub mod sequencer;
pub mod session;
pub mod sink;
pub mod state;
pub mod trial;
pub use config::{ConfigSnapshot, SessionConfig};
pub use generator::PatternGenerator;
pub use participant::{ParticipantProfile, SimulatedParticipant};
pub use presenter::{NullPresenter, PhaseEvent, PhaseLog, Presenter};
pub use random::RandomSource;
pub use sequencer::{build_trials, distribute};
pub use session::{Action, Respondent, ResponseContext, RunError, SessionRunner, Silent};
pub use sink::{
    ConditionSummary, DataLogger, JsonLinesSink, SessionEnd, SessionInfo, SessionSummary, Tee,
    TrialSink,
};
pub use state::{ResponseOutcome, StartOptions, TrialController};
pub use trial::{ResponseTracker, Trial, TrialDurations, TrialTimestamps};
