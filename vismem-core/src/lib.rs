pub mod error;
pub mod pattern;
pub mod phase;
pub mod trial;

pub use error::ConfigurationError;
pub use pattern::{Color, Dot, Layout, MatchTrialSpec, Pattern, Segment, SegmentDetail, Texture};
pub use phase::{SessionMode, TrialPhase};
pub use trial::{ChoiceEvent, Condition, TrialRecord, TrialSlot};
