use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Fill texture of a single pattern segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Texture {
    /// Diagonal hatching. Legacy "solid" template slots are drawn this way.
    Diag,
    Stripes,
    Holes,
    Checker,
    Dots,
    Cross,
}

impl Texture {
    /// Replacement order used when a segment has to be re-textured.
    pub const ALL: [Texture; 6] = [
        Texture::Stripes,
        Texture::Holes,
        Texture::Checker,
        Texture::Dots,
        Texture::Diag,
        Texture::Cross,
    ];

    /// Whether segments with this texture carry seeded sub-geometry.
    pub fn needs_detail(&self) -> bool {
        matches!(self, Texture::Dots)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Texture::Diag => "diag",
            Texture::Stripes => "stripes",
            Texture::Holes => "holes",
            Texture::Checker => "checker",
            Texture::Dots => "dots",
            Texture::Cross => "cross",
        }
    }
}

impl fmt::Display for Texture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Palette color, identified by its hue in degrees. Saturation and lightness
/// are fixed for every stimulus color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Color(u16);

impl Color {
    pub const SATURATION: f32 = 0.70;
    pub const LIGHTNESS: f32 = 0.55;

    pub const fn from_hue(hue: u16) -> Self {
        Self(hue % 360)
    }

    pub fn hue(&self) -> u16 {
        self.0
    }

    /// Straight (non-premultiplied) RGBA.
    pub fn to_rgba8(&self) -> [u8; 4] {
        let h = self.0 as f32 / 60.0;
        let c = (1.0 - (2.0 * Self::LIGHTNESS - 1.0).abs()) * Self::SATURATION;
        let x = c * (1.0 - (h % 2.0 - 1.0).abs());
        let m = Self::LIGHTNESS - c / 2.0;
        let (r, g, b) = match h as u32 {
            0 => (c, x, 0.0),
            1 => (x, c, 0.0),
            2 => (0.0, c, x),
            3 => (0.0, x, c),
            4 => (x, 0.0, c),
            _ => (c, 0.0, x),
        };
        let to_u8 = |v: f32| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
        [to_u8(r), to_u8(g), to_u8(b), 255]
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hsl({}, {}%, {}%)",
            self.0,
            (Self::SATURATION * 100.0).round() as u32,
            (Self::LIGHTNESS * 100.0).round() as u32
        )
    }
}

/// One dot of a `dots` texture, in coordinates normalised to the segment cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dot {
    pub x: f32,
    pub y: f32,
    pub r: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentDetail {
    pub seed: u32,
    pub dots: Vec<Dot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub texture: Texture,
    pub color: Color,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<SegmentDetail>,
}

impl Segment {
    pub fn new(texture: Texture, color: Color) -> Self {
        Self {
            texture,
            color,
            detail: None,
        }
    }

    /// Two segments look the same when texture and color agree; sub-geometry
    /// does not count.
    pub fn looks_like(&self, other: &Segment) -> bool {
        self.texture == other.texture && self.color == other.color
    }
}

/// Grid the segments are laid out in, filled row by row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layout {
    pub rows: usize,
    pub cols: usize,
}

impl Layout {
    /// Smallest grid with `cols = ceil(sqrt(count))` that holds `count` cells.
    pub fn for_count(count: usize) -> Self {
        let count = count.max(1);
        let mut cols = 1;
        while cols * cols < count {
            cols += 1;
        }
        let rows = count.div_ceil(cols);
        Self { rows, cols }
    }

    pub fn cell(&self, index: usize) -> (usize, usize) {
        (index / self.cols, index % self.cols)
    }
}

/// A generated stimulus. Immutable once built; copies are structural.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    id: u64,
    template_id: usize,
    segment_count: usize,
    layout: Layout,
    colors: Vec<Color>,
    segments: Vec<Segment>,
}

impl Pattern {
    pub fn new(id: u64, template_id: usize, segments: Vec<Segment>) -> Self {
        let segment_count = segments.len();
        Self {
            id,
            template_id,
            segment_count,
            layout: Layout::for_count(segment_count),
            colors: segments.iter().map(|s| s.color).collect(),
            segments,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn template_id(&self) -> usize {
        self.template_id
    }

    pub fn segment_count(&self) -> usize {
        self.segment_count
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Segment colors in position order.
    pub fn colors(&self) -> &[Color] {
        &self.colors
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Number of positions where both patterns show the same texture and color,
    /// compared up to the shorter of the two.
    pub fn shared_positions(&self, other: &Pattern) -> usize {
        self.segments
            .iter()
            .zip(&other.segments)
            .filter(|(a, b)| a.looks_like(b))
            .count()
    }

    /// True when no two segments share a (texture, color) pair.
    pub fn has_unique_segments(&self) -> bool {
        self.segments.iter().enumerate().all(|(i, a)| {
            self.segments[i + 1..]
                .iter()
                .all(|b| !a.looks_like(b))
        })
    }

    /// `|`-joined color list, as used in exported trial rows.
    pub fn color_signature(&self) -> String {
        self.colors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("|")
    }
}

/// One matching problem: the sample and the options it must be picked from.
/// `choices[correct_index]` is the very same allocation as `sample`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchTrialSpec {
    pub sample: Arc<Pattern>,
    pub choices: Vec<Arc<Pattern>>,
    pub correct_index: usize,
}

impl MatchTrialSpec {
    pub fn n_choices(&self) -> usize {
        self.choices.len()
    }

    pub fn is_correct(&self, index: usize) -> bool {
        index == self.correct_index
    }

    /// Deep copies of the choices, for records that outlive the trial.
    pub fn choice_snapshots(&self) -> Vec<Pattern> {
        self.choices.iter().map(|p| Pattern::clone(p)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(texture: Texture, hue: u16) -> Segment {
        Segment::new(texture, Color::from_hue(hue))
    }

    #[test]
    fn layout_keeps_cells_roughly_square() {
        let expected = [(1, 1, 1), (2, 1, 2), (3, 2, 2), (4, 2, 2), (5, 2, 3), (6, 2, 3)];
        for (count, rows, cols) in expected {
            assert_eq!(Layout::for_count(count), Layout { rows, cols }, "count {count}");
        }
    }

    #[test]
    fn colors_follow_segments() {
        let p = Pattern::new(
            7,
            3,
            vec![seg(Texture::Diag, 0), seg(Texture::Holes, 120)],
        );
        assert_eq!(p.colors(), &[Color::from_hue(0), Color::from_hue(120)]);
        assert_eq!(p.segment_count(), 2);
        assert_eq!(p.layout(), Layout { rows: 1, cols: 2 });
        assert_eq!(p.color_signature(), "hsl(0, 70%, 55%)|hsl(120, 70%, 55%)");
    }

    #[test]
    fn duplicate_pairs_are_detected() {
        let dup = Pattern::new(
            1,
            0,
            vec![seg(Texture::Dots, 40), seg(Texture::Dots, 40)],
        );
        assert!(!dup.has_unique_segments());

        let ok = Pattern::new(
            2,
            0,
            vec![seg(Texture::Dots, 40), seg(Texture::Dots, 80)],
        );
        assert!(ok.has_unique_segments());
    }

    #[test]
    fn shared_positions_compare_position_wise() {
        let a = Pattern::new(
            1,
            0,
            vec![seg(Texture::Diag, 0), seg(Texture::Cross, 40), seg(Texture::Holes, 80)],
        );
        let b = Pattern::new(2, 1, vec![seg(Texture::Cross, 40), seg(Texture::Cross, 40)]);
        assert_eq!(a.shared_positions(&b), 1);
        assert_eq!(a.shared_positions(&a), 3);
    }

    #[test]
    fn palette_colors_convert_to_rgb() {
        assert_eq!(Color::from_hue(0).to_rgba8(), [221, 60, 60, 255]);
        assert_eq!(Color::from_hue(120).to_rgba8(), [60, 221, 60, 255]);
        assert_eq!(Color::from_hue(240).to_rgba8(), [60, 60, 221, 255]);
    }

    #[test]
    fn textures_serialize_lowercase() {
        let json = serde_json::to_string(&seg(Texture::Checker, 200)).unwrap();
        assert_eq!(json, r#"{"texture":"checker","color":200}"#);
    }
}
