//! Procedural stimulus generation.
//!
//! A matching trial is one sample pattern plus a set of choices. Every choice
//! shares a fixed number of segment positions (same texture and color) with
//! the sample, so no option can be rejected at a glance, and exactly one
//! choice is the sample itself.

use std::collections::VecDeque;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};
use vismem_core::{
    Color, ConfigurationError, Dot, MatchTrialSpec, Pattern, Segment, SegmentDetail, Texture,
};

use crate::catalog::{PALETTE, TEMPLATES, Template};
use crate::random::RandomSource;

pub const MIN_SEGMENTS: usize = 1;
pub const MAX_SEGMENTS: usize = 6;
pub const MAX_CHOICES: usize = 6;

const RECENT_TEMPLATE_MEMORY: usize = 4;
const MAX_CANDIDATE_ATTEMPTS: usize = 8;
const DOTS_PER_SEGMENT: usize = 14;
const DOT_BASE_RADIUS: f32 = 1.0 / 12.0;

/// A candidate choice could not be made to share exactly the forced positions.
/// Handled inside the generator; callers never see it.
#[derive(Debug, Error)]
#[error("template {template_id}: expected {expected} shared positions, got {actual}")]
struct GenerationExhausted {
    template_id: usize,
    expected: usize,
    actual: usize,
}

/// Pattern under construction. Frozen into an immutable [`Pattern`].
#[derive(Debug, Clone)]
struct Draft {
    id: u64,
    template_id: usize,
    segments: Vec<Segment>,
}

impl Draft {
    fn freeze(self) -> Pattern {
        Pattern::new(self.id, self.template_id, self.segments)
    }
}

/// Non-sample choice together with the positions forced to match the sample.
#[derive(Debug)]
struct Candidate {
    draft: Draft,
    forced: Vec<usize>,
}

pub fn clamp_segment_count(count: usize) -> usize {
    count.clamp(MIN_SEGMENTS, MAX_SEGMENTS)
}

pub struct PatternGenerator {
    rng: RandomSource,
    segment_count: usize,
    next_id: u64,
    recent_templates: VecDeque<usize>,
}

impl PatternGenerator {
    pub fn new(segment_count: usize, rng: RandomSource) -> Self {
        Self {
            rng,
            segment_count: clamp_segment_count(segment_count),
            next_id: 1,
            recent_templates: VecDeque::with_capacity(RECENT_TEMPLATE_MEMORY),
        }
    }

    pub fn seeded(segment_count: usize, seed: u32) -> Self {
        Self::new(segment_count, RandomSource::seeded(seed))
    }

    pub fn segment_count(&self) -> usize {
        self.segment_count
    }

    pub fn set_segment_count(&mut self, count: usize) {
        self.segment_count = clamp_segment_count(count);
    }

    /// Builds a standalone pattern, e.g. for instructions or previews.
    pub fn generate_pattern(&mut self, segment_count: usize) -> Pattern {
        let count = clamp_segment_count(segment_count);
        let template = self.pick_template(&[]);
        let colors = self.pick_color_set(count);
        self.make_draft(template, &colors, count).freeze()
    }

    /// Builds one sample and `n_choices` options, each sharing
    /// `shared_quadrants` positions with the sample (clamped to the segment
    /// count).
    pub fn generate_match_trial(
        &mut self,
        n_choices: usize,
        shared_quadrants: usize,
    ) -> Result<MatchTrialSpec, ConfigurationError> {
        if !(1..=MAX_CHOICES).contains(&n_choices) {
            return Err(ConfigurationError::InvalidChoiceCount(n_choices));
        }
        let count = self.segment_count;
        let shared = shared_quadrants.clamp(1, count);

        let sample_template = self.pick_template(&[]);
        let sample_colors = self.pick_color_set(count);
        let mut sample = self.make_draft(sample_template, &sample_colors, count);
        self.dedupe_textures(&mut sample.segments, &[]);
        let sample = Arc::new(sample.freeze());

        let distractor_template = self.pick_template(&[sample_template.id]);
        let distractor_colors = self.pick_color_set(count);
        let novel_template = self.pick_template(&[sample_template.id, distractor_template.id]);
        let novel_colors = self.pick_color_set(count);

        // Index 0 of the shared sets belongs to the sample itself.
        let sets = self.shared_index_sets(4, shared, count);
        let mut others = vec![
            self.build_candidate(&sample, novel_template, &novel_colors, &sets[1]),
            self.build_candidate(&sample, sample_template, &distractor_colors, &sets[2]),
            self.build_candidate(&sample, distractor_template, &sample_colors, &sets[3]),
        ];
        self.break_uniformity(&sample, &mut others);

        if n_choices > others.len() + 1 {
            while others.len() + 1 < n_choices {
                let template = self.pick_template(&[sample_template.id]);
                let colors = self.pick_color_set(count);
                let forced = self.shared_index_sets(1, shared, count).remove(0);
                let extra = self.build_candidate(&sample, template, &colors, &forced);
                others.push(extra);
            }
            self.break_uniformity(&sample, &mut others);
        }

        // Any decoy kind may survive a cut below four choices.
        self.shuffle(&mut others);
        others.truncate(n_choices - 1);

        let mut choices: Vec<Arc<Pattern>> = Vec::with_capacity(n_choices);
        choices.push(Arc::clone(&sample));
        choices.extend(others.into_iter().map(|c| Arc::new(c.draft.freeze())));
        self.shuffle(&mut choices);

        let correct_index = match choices.iter().position(|c| Arc::ptr_eq(c, &sample)) {
            Some(index) => index,
            None => {
                warn!(sample_id = sample.id(), "sample missing from choices, forcing slot 0");
                choices[0] = Arc::clone(&sample);
                0
            }
        };

        Ok(MatchTrialSpec {
            sample,
            choices,
            correct_index,
        })
    }

    fn build_candidate(
        &mut self,
        sample: &Pattern,
        template: &'static Template,
        colors: &[Color],
        forced: &[usize],
    ) -> Candidate {
        for attempt in 1..=MAX_CANDIDATE_ATTEMPTS {
            match self.try_candidate(sample, template, colors, forced) {
                Ok(draft) => {
                    return Candidate {
                        draft,
                        forced: forced.to_vec(),
                    };
                }
                Err(err) => debug!(attempt, %err, "rebuilding choice candidate"),
            }
        }
        debug!(
            sample_id = sample.id(),
            "candidate attempts exhausted, deriving choice from sample"
        );
        Candidate {
            draft: self.sample_variant(sample, forced),
            forced: forced.to_vec(),
        }
    }

    fn try_candidate(
        &mut self,
        sample: &Pattern,
        template: &'static Template,
        colors: &[Color],
        forced: &[usize],
    ) -> Result<Draft, GenerationExhausted> {
        let mut draft = self.make_draft(template, colors, sample.segment_count());
        for &idx in forced {
            if let (Some(seg), Some(src)) = (draft.segments.get_mut(idx), sample.segments().get(idx))
            {
                *seg = src.clone();
            }
        }
        self.dedupe_textures(&mut draft.segments, forced);
        self.break_accidental_matches(&mut draft, sample, forced);

        let actual = draft
            .segments
            .iter()
            .zip(sample.segments())
            .filter(|(a, b)| a.looks_like(b))
            .count();
        let unique = draft.segments.iter().enumerate().all(|(i, a)| {
            draft.segments[i + 1..].iter().all(|b| !a.looks_like(b))
        });
        if actual != forced.len() || !unique {
            return Err(GenerationExhausted {
                template_id: template.id,
                expected: forced.len(),
                actual,
            });
        }
        Ok(draft)
    }

    /// Deterministic fallback: the sample with every non-forced segment recolored.
    fn sample_variant(&mut self, sample: &Pattern, forced: &[usize]) -> Draft {
        let id = self.take_id();
        let mut segments = sample.segments().to_vec();
        for (idx, seg) in segments.iter_mut().enumerate() {
            if !forced.contains(&idx) {
                seg.color = self.other_color(seg.color);
            }
        }
        Draft {
            id,
            template_id: sample.template_id(),
            segments,
        }
    }

    fn make_draft(&mut self, template: &Template, colors: &[Color], count: usize) -> Draft {
        let id = self.take_id();
        let colors = if colors.is_empty() { &PALETTE[..1] } else { colors };
        let texture_offset = self.rng.below(template.slots.len());
        let color_offset = self.rng.below(colors.len());

        let mut segments: Vec<Segment> = Vec::with_capacity(count);
        for i in 0..count {
            let texture = template.slots[(texture_offset + i) % template.slots.len()];
            let mut color = colors[(color_offset + i) % colors.len()];
            let taken = |c: Color, segs: &[Segment]| {
                segs.iter().any(|s| s.texture == texture && s.color == c)
            };
            if taken(color, &segments) {
                if let Some(&alt) = PALETTE.iter().find(|&&c| !taken(c, &segments)) {
                    color = alt;
                }
            }
            let mut segment = Segment::new(texture, color);
            if texture.needs_detail() {
                segment.detail = Some(dots_detail((id as u32).wrapping_mul(10).wrapping_add(i as u32)));
            }
            segments.push(segment);
        }

        Draft {
            id,
            template_id: template.id,
            segments,
        }
    }

    /// Re-textures unprotected segments whose texture already occurs, so every
    /// texture appears at most once.
    fn dedupe_textures(&mut self, segments: &mut [Segment], protected: &[usize]) {
        let mut seen: Vec<Texture> = protected
            .iter()
            .filter_map(|&i| segments.get(i).map(|s| s.texture))
            .collect();

        for idx in 0..segments.len() {
            if protected.contains(&idx) {
                continue;
            }
            let texture = segments[idx].texture;
            if !seen.contains(&texture) {
                seen.push(texture);
                continue;
            }
            let Some(&available) = Texture::ALL.iter().find(|t| !seen.contains(t)) else {
                continue;
            };
            let color = self.other_color(segments[idx].color);
            let detail = available.needs_detail().then(|| {
                let seed = idx as u32 + 1 + self.rng.below(1000) as u32;
                dots_detail(seed)
            });
            segments[idx] = Segment {
                texture: available,
                color,
                detail,
            };
            seen.push(available);
        }
    }

    /// Recolors unforced positions that happen to equal the sample.
    fn break_accidental_matches(&mut self, draft: &mut Draft, sample: &Pattern, forced: &[usize]) {
        for (idx, sample_seg) in sample.segments().iter().enumerate() {
            if forced.contains(&idx) {
                continue;
            }
            let Some(current) = draft.segments.get(idx) else {
                break;
            };
            if !current.looks_like(sample_seg) {
                continue;
            }
            let texture = current.texture;
            let options: Vec<Color> = PALETTE
                .iter()
                .copied()
                .filter(|&c| c != sample_seg.color)
                .filter(|&c| {
                    !draft
                        .segments
                        .iter()
                        .any(|s| s.texture == texture && s.color == c)
                })
                .collect();
            if !options.is_empty() {
                draft.segments[idx].color = options[self.rng.below(options.len())];
            }
        }
    }

    /// Best effort: where every choice (sample included) shows the same
    /// segment, recolor one choice for which that position is not forced.
    /// Forced positions are left alone so shared counts stay exact.
    fn break_uniformity(&mut self, sample: &Pattern, others: &mut [Candidate]) {
        if others.is_empty() {
            return;
        }
        let length = others
            .iter()
            .map(|c| c.draft.segments.len())
            .min()
            .unwrap_or(0)
            .min(sample.segment_count());

        for idx in 0..length {
            let reference = &sample.segments()[idx];
            if !others.iter().all(|c| c.draft.segments[idx].looks_like(reference)) {
                continue;
            }
            let Some(target) = others.iter_mut().find(|c| !c.forced.contains(&idx)) else {
                debug!(position = idx, "position identical across all choices");
                continue;
            };
            let current = target.draft.segments[idx].color;
            let texture = target.draft.segments[idx].texture;
            let replacement = PALETTE.iter().copied().find(|&c| {
                c != current
                    && !target
                        .draft
                        .segments
                        .iter()
                        .any(|s| s.texture == texture && s.color == c)
            });
            if let Some(color) = replacement {
                target.draft.segments[idx].color = color;
            }
        }
    }

    /// Rotating windows of `shared` positions, one per choice, so different
    /// choices generally share different positions.
    fn shared_index_sets(&mut self, total: usize, shared: usize, count: usize) -> Vec<Vec<usize>> {
        let count = count.max(1);
        let limit = shared.clamp(1, count);
        let start = self.rng.below(count);
        (0..total)
            .map(|c| {
                let offset = (start + c) % count;
                (0..limit).map(|i| (offset + i) % count).collect()
            })
            .collect()
    }

    fn pick_template(&mut self, exclude: &[usize]) -> &'static Template {
        let allowed: Vec<&'static Template> =
            TEMPLATES.iter().filter(|t| !exclude.contains(&t.id)).collect();
        let fresh: Vec<&'static Template> = allowed
            .iter()
            .copied()
            .filter(|t| !self.recent_templates.contains(&t.id))
            .collect();

        let pool = if !fresh.is_empty() {
            fresh
        } else if !allowed.is_empty() {
            allowed
        } else {
            TEMPLATES.iter().collect()
        };
        let template = pool[self.rng.below(pool.len())];

        if self.recent_templates.len() == RECENT_TEMPLATE_MEMORY {
            self.recent_templates.pop_front();
        }
        self.recent_templates.push_back(template.id);
        template
    }

    fn pick_color_set(&mut self, count: usize) -> Vec<Color> {
        let desired = count.clamp(1, PALETTE.len());
        let mut pool = PALETTE.to_vec();
        let mut out = Vec::with_capacity(desired);
        while out.len() < desired && !pool.is_empty() {
            let idx = self.rng.below(pool.len());
            out.push(pool.remove(idx));
        }
        out
    }

    fn other_color(&mut self, current: Color) -> Color {
        let options: Vec<Color> = PALETTE.iter().copied().filter(|&c| c != current).collect();
        options[self.rng.below(options.len())]
    }

    fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.rng.below(i + 1);
            items.swap(i, j);
        }
    }

    fn take_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

/// Dot layout for a `dots` segment, reproducible from its seed.
pub fn dots_detail(seed: u32) -> SegmentDetail {
    let mut rng = RandomSource::seeded(seed);
    let dots = (0..DOTS_PER_SEGMENT)
        .map(|_| {
            let r = DOT_BASE_RADIUS * (0.7 + rng.next_f64() as f32 * 0.6);
            let x = r + rng.next_f64() as f32 * (1.0 - 2.0 * r);
            let y = r + rng.next_f64() as f32 * (1.0 - 2.0 * r);
            Dot { x, y, r }
        })
        .collect();
    SegmentDetail { seed, dots }
}
