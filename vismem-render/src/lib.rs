mod render;
pub use render::{PatternRenderer, RenderOptions};
