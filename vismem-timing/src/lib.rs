pub mod clock;
pub mod timer;

pub use clock::SessionClock;
pub use timer::{HighPrecisionTimer, ManualTimer, Timer, ns_to_ms};
