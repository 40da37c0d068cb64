use vismem_core::{Color, Texture};

/// Per-slot texture layout a pattern is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Template {
    pub id: usize,
    pub slots: [Texture; 4],
}

use Texture::{Checker, Cross, Diag, Dots, Holes, Stripes};

// Slot order: top-left, top-right, bottom-left, bottom-right.
pub const TEMPLATES: [Template; 16] = [
    Template { id: 0, slots: [Diag, Stripes, Holes, Checker] },
    Template { id: 1, slots: [Stripes, Diag, Checker, Holes] },
    Template { id: 2, slots: [Holes, Checker, Diag, Stripes] },
    Template { id: 3, slots: [Checker, Holes, Stripes, Diag] },
    Template { id: 4, slots: [Diag, Diag, Stripes, Holes] },
    Template { id: 5, slots: [Stripes, Holes, Diag, Checker] },
    Template { id: 6, slots: [Dots, Stripes, Holes, Checker] },
    Template { id: 7, slots: [Diag, Dots, Diag, Checker] },
    Template { id: 8, slots: [Cross, Diag, Holes, Diag] },
    Template { id: 9, slots: [Dots, Cross, Stripes, Holes] },
    Template { id: 10, slots: [Checker, Diag, Dots, Diag] },
    Template { id: 11, slots: [Diag, Cross, Diag, Dots] },
    Template { id: 12, slots: [Diag, Stripes, Dots, Holes] },
    Template { id: 13, slots: [Holes, Dots, Cross, Checker] },
    Template { id: 14, slots: [Stripes, Checker, Diag, Dots] },
    Template { id: 15, slots: [Cross, Diag, Checker, Diag] },
];

pub const PALETTE: [Color; 9] = [
    Color::from_hue(0),
    Color::from_hue(40),
    Color::from_hue(80),
    Color::from_hue(120),
    Color::from_hue(160),
    Color::from_hue(200),
    Color::from_hue(240),
    Color::from_hue(280),
    Color::from_hue(320),
];

pub fn template(id: usize) -> Option<&'static Template> {
    TEMPLATES.iter().find(|t| t.id == id)
}
