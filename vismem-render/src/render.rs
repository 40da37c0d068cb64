use std::path::Path;

use anyhow::{Context, Result, anyhow};
use tiny_skia::{
    Color, FillRule, Mask, Paint, PathBuilder, Pixmap, PixmapPaint, Rect, Stroke, Transform,
};
use vismem_core::{Dot, MatchTrialSpec, Pattern, Segment, Texture};

const HOLE_GRID: usize = 4;
const STRIPE_COUNT: usize = 12;
const CHECKER_GRID: usize = 5;
const DIAG_STEPS: f32 = 8.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderOptions {
    /// Shows through the texture cut-outs.
    pub background: [u8; 4],
    /// Space between the pattern edge and its grid.
    pub margin: f32,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            background: [0, 0, 0, 255],
            margin: 16.0,
        }
    }
}

/// Draws patterns: each segment is filled with its color, then the texture is
/// cut out of it in the background color.
#[derive(Debug, Clone, Default)]
pub struct PatternRenderer {
    options: RenderOptions,
}

impl PatternRenderer {
    pub fn new(options: RenderOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    pub fn render(&self, pattern: &Pattern, width: u32, height: u32) -> Result<Pixmap> {
        let mut pixmap = Pixmap::new(width, height)
            .with_context(|| format!("cannot allocate {width}x{height} pixmap"))?;
        pixmap.fill(self.background());
        self.draw(&mut pixmap, pattern, 0.0, 0.0, width as f32, height as f32);
        Ok(pixmap)
    }

    /// One row of choices, with the sample centered above when `with_sample`
    /// is set.
    pub fn render_trial(
        &self,
        spec: &MatchTrialSpec,
        cell_px: u32,
        with_sample: bool,
    ) -> Result<Pixmap> {
        let n = spec.n_choices().max(1) as u32;
        let rows = if with_sample { 2 } else { 1 };
        let mut sheet = Pixmap::new(cell_px * n, cell_px * rows)
            .ok_or_else(|| anyhow!("cannot allocate sheet for {n} choices at {cell_px}px"))?;
        sheet.fill(self.background());

        let mut y = 0;
        if with_sample {
            let tile = self.render(&spec.sample, cell_px, cell_px)?;
            let x = (cell_px * n - cell_px) / 2;
            sheet.draw_pixmap(
                x as i32,
                0,
                tile.as_ref(),
                &PixmapPaint::default(),
                Transform::identity(),
                None,
            );
            y = cell_px;
        }

        for (i, choice) in spec.choices.iter().enumerate() {
            let tile = self.render(choice, cell_px, cell_px)?;
            sheet.draw_pixmap(
                (i as u32 * cell_px) as i32,
                y as i32,
                tile.as_ref(),
                &PixmapPaint::default(),
                Transform::identity(),
                None,
            );
        }
        Ok(sheet)
    }

    pub fn save_png(&self, pixmap: &Pixmap, path: &Path) -> Result<()> {
        pixmap
            .save_png(path)
            .with_context(|| format!("writing {}", path.display()))
    }

    /// Draws `pattern` into the `w`x`h` box at (`x`, `y`).
    pub fn draw(&self, pixmap: &mut Pixmap, pattern: &Pattern, x: f32, y: f32, w: f32, h: f32) {
        let layout = pattern.layout();
        let margin = self.options.margin;
        let cell_w = (w - 2.0 * margin) / layout.cols.max(1) as f32;
        let cell_h = (h - 2.0 * margin) / layout.rows.max(1) as f32;
        if cell_w <= 0.0 || cell_h <= 0.0 {
            return;
        }

        for (index, segment) in pattern.segments().iter().enumerate() {
            let (row, col) = layout.cell(index);
            let cell = Cell {
                x: x + margin + col as f32 * cell_w,
                y: y + margin + row as f32 * cell_h,
                w: cell_w,
                h: cell_h,
            };
            self.draw_segment(pixmap, segment, cell);
        }
    }

    fn background(&self) -> Color {
        let [r, g, b, a] = self.options.background;
        Color::from_rgba8(r, g, b, a)
    }

    fn draw_segment(&self, pixmap: &mut Pixmap, segment: &Segment, cell: Cell) {
        let [r, g, b, a] = segment.color.to_rgba8();
        let mut paint = Paint::default();
        paint.set_color_rgba8(r, g, b, a);
        paint.anti_alias = false;
        fill_rect(pixmap, cell.x, cell.y, cell.w, cell.h, &paint);

        // Axis-aligned cuts stay hard-edged; only circles and hatching blend.
        let mut cut = Paint::default();
        cut.set_color(self.background());
        cut.anti_alias = false;
        let mut smooth_cut = cut.clone();
        smooth_cut.anti_alias = true;

        match segment.texture {
            Texture::Holes => holes(pixmap, cell, &cut),
            Texture::Stripes => stripes(pixmap, cell, &cut),
            Texture::Checker => checker(pixmap, cell, &cut),
            Texture::Dots => {
                let dots = segment
                    .detail
                    .as_ref()
                    .map(|d| d.dots.as_slice())
                    .unwrap_or_default();
                dots_texture(pixmap, cell, dots, &smooth_cut)
            }
            Texture::Diag => diag(pixmap, cell, &smooth_cut),
            Texture::Cross => cross(pixmap, cell, &cut),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Cell {
    x: f32,
    y: f32,
    w: f32,
    h: f32,
}

fn fill_rect(pixmap: &mut Pixmap, x: f32, y: f32, w: f32, h: f32, paint: &Paint) {
    if let Some(rect) = Rect::from_xywh(x, y, w, h) {
        pixmap.fill_rect(rect, paint, Transform::identity(), None);
    }
}

fn holes(pixmap: &mut Pixmap, cell: Cell, paint: &Paint) {
    let step_w = cell.w / HOLE_GRID as f32;
    let step_h = cell.h / HOLE_GRID as f32;
    let (hole_w, hole_h) = (step_w * 0.5, step_h * 0.5);
    for r in 0..HOLE_GRID {
        for c in 0..HOLE_GRID {
            let x = cell.x + c as f32 * step_w + (step_w - hole_w) / 2.0;
            let y = cell.y + r as f32 * step_h + (step_h - hole_h) / 2.0;
            fill_rect(pixmap, x, y, hole_w, hole_h, paint);
        }
    }
}

fn stripes(pixmap: &mut Pixmap, cell: Cell, paint: &Paint) {
    let step = cell.w / STRIPE_COUNT as f32;
    let width = step * 0.45;
    for i in (0..STRIPE_COUNT).step_by(2) {
        let x = cell.x + i as f32 * step + (step - width) / 2.0;
        fill_rect(pixmap, x, cell.y, width, cell.h, paint);
    }
}

fn checker(pixmap: &mut Pixmap, cell: Cell, paint: &Paint) {
    let step_w = cell.w / CHECKER_GRID as f32;
    let step_h = cell.h / CHECKER_GRID as f32;
    for r in 0..CHECKER_GRID {
        for c in 0..CHECKER_GRID {
            if (r + c) % 2 == 0 {
                continue;
            }
            let x = cell.x + c as f32 * step_w;
            let y = cell.y + r as f32 * step_h;
            fill_rect(pixmap, x, y, step_w, step_h, paint);
        }
    }
}

fn dots_texture(pixmap: &mut Pixmap, cell: Cell, dots: &[Dot], paint: &Paint) {
    let min_side = cell.w.min(cell.h);
    for dot in dots {
        let cx = cell.x + dot.x * cell.w;
        let cy = cell.y + dot.y * cell.h;
        if let Some(path) = PathBuilder::from_circle(cx, cy, dot.r * min_side) {
            pixmap.fill_path(&path, paint, FillRule::Winding, Transform::identity(), None);
        }
    }
}

/// Hatching runs past the cell edges, so it is clipped to the cell.
fn diag(pixmap: &mut Pixmap, cell: Cell, paint: &Paint) {
    let Some(mut clip) = Mask::new(pixmap.width(), pixmap.height()) else {
        return;
    };
    let Some(rect) = Rect::from_xywh(cell.x, cell.y, cell.w, cell.h) else {
        return;
    };
    clip.fill_path(
        &PathBuilder::from_rect(rect),
        FillRule::Winding,
        false,
        Transform::identity(),
    );

    let stroke = Stroke {
        width: (cell.w / 22.0).max(1.5),
        ..Stroke::default()
    };
    let step = cell.w / DIAG_STEPS;
    let mut pb = PathBuilder::new();
    let mut d = -cell.w;
    while d < cell.w * 2.0 {
        pb.move_to(cell.x + d, cell.y);
        pb.line_to(cell.x + d - cell.h, cell.y + cell.h);
        d += step;
    }
    if let Some(path) = pb.finish() {
        pixmap.stroke_path(&path, paint, &stroke, Transform::identity(), Some(&clip));
    }
}

fn cross(pixmap: &mut Pixmap, cell: Cell, paint: &Paint) {
    let bar_w = cell.w / 5.0;
    let bar_h = cell.h / 5.0;
    let cx = cell.x + cell.w / 2.0 - bar_w / 2.0;
    fill_rect(pixmap, cx, cell.y + cell.h * 0.1, bar_w, cell.h * 0.8, paint);
    let cy = cell.y + cell.h / 2.0 - bar_h / 2.0;
    fill_rect(pixmap, cell.x + cell.w * 0.1, cy, cell.w * 0.8, bar_h, paint);
}

#[cfg(test)]
mod tests {
    use super::*;
    use vismem_core::{Color as Hue, Pattern, Segment};
    use vismem_experiment::PatternGenerator;

    fn pixel(pixmap: &Pixmap, x: u32, y: u32) -> [u8; 4] {
        let p = pixmap.pixel(x, y).unwrap().demultiply();
        [p.red(), p.green(), p.blue(), p.alpha()]
    }

    fn single(texture: Texture) -> Pattern {
        Pattern::new(1, 0, vec![Segment::new(texture, Hue::from_hue(0))])
    }

    #[test]
    fn margin_stays_background() {
        let pattern = PatternGenerator::seeded(4, 1).generate_pattern(4);
        let pixmap = PatternRenderer::default().render(&pattern, 140, 140).unwrap();
        assert_eq!(pixel(&pixmap, 2, 2), [0, 0, 0, 255]);
        assert_eq!(pixel(&pixmap, 137, 137), [0, 0, 0, 255]);
    }

    #[test]
    fn checker_cuts_alternate_cells() {
        // 100px box, 10px margin: one 80px cell, 16px checker squares.
        let renderer = PatternRenderer::new(RenderOptions {
            margin: 10.0,
            ..RenderOptions::default()
        });
        let pixmap = renderer.render(&single(Texture::Checker), 100, 100).unwrap();
        assert_eq!(pixel(&pixmap, 18, 18), Hue::from_hue(0).to_rgba8());
        assert_eq!(pixel(&pixmap, 34, 18), [0, 0, 0, 255]);
    }

    #[test]
    fn cross_leaves_corners_colored() {
        let renderer = PatternRenderer::new(RenderOptions {
            margin: 0.0,
            ..RenderOptions::default()
        });
        let pixmap = renderer.render(&single(Texture::Cross), 100, 100).unwrap();
        assert_eq!(pixel(&pixmap, 50, 50), [0, 0, 0, 255]);
        assert_eq!(pixel(&pixmap, 5, 5), Hue::from_hue(0).to_rgba8());
    }

    #[test]
    fn every_texture_renders() {
        for texture in Texture::ALL {
            let pattern = single(texture);
            let pixmap = PatternRenderer::default().render(&pattern, 64, 64).unwrap();
            assert_eq!(pixmap.width(), 64);
        }
    }

    #[test]
    fn thin_rect_textures_have_hard_edges() {
        let color = Hue::from_hue(0).to_rgba8();
        for texture in [Texture::Stripes, Texture::Holes, Texture::Checker, Texture::Cross] {
            for size in [24, 40, 64] {
                let pixmap = PatternRenderer::default()
                    .render(&single(texture), size, size)
                    .unwrap();
                for y in 0..size {
                    for x in 0..size {
                        let p = pixel(&pixmap, x, y);
                        assert!(
                            p == color || p == [0, 0, 0, 255],
                            "{texture} at {size}px: blended pixel {p:?} at ({x}, {y})"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn trial_sheet_holds_every_choice() {
        let spec = PatternGenerator::seeded(4, 9).generate_match_trial(5, 1).unwrap();
        let sheet = PatternRenderer::default().render_trial(&spec, 120, true).unwrap();
        assert_eq!(sheet.width(), 600);
        assert_eq!(sheet.height(), 240);
    }

    #[test]
    fn zero_sized_pixmap_is_an_error() {
        let pattern = single(Texture::Stripes);
        assert!(PatternRenderer::default().render(&pattern, 0, 10).is_err());
    }
}
