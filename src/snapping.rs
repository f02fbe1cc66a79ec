//! Alignment snapping for moved annotations.
//!
//! A moving rect's left/centre/right and top/middle/bottom lines are
//! matched against the same lines of every other annotation and of the
//! image itself. Each axis snaps independently to the closest target
//! strictly inside the threshold.

use egui::{Rect, Vec2};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GuideAxis {
    /// A vertical line at a fixed x.
    Vertical,
    /// A horizontal line at a fixed y.
    Horizontal,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SnapGuide {
    pub axis: GuideAxis,
    pub position: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SnapConfig {
    pub enabled: bool,
    pub threshold: f32,
}

impl Default for SnapConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 5.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SnapResult {
    pub rect: Rect,
    pub offset: Vec2,
    pub guides: Vec<SnapGuide>,
}

impl SnapResult {
    fn unchanged(rect: Rect) -> Self {
        Self {
            rect,
            offset: Vec2::ZERO,
            guides: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
pub struct SnapEngine {
    config: SnapConfig,
}

impl SnapEngine {
    pub fn new(config: SnapConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> SnapConfig {
        self.config
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.config.enabled = enabled;
    }

    /// Corrects `candidate` against `others` and the image frame.
    pub fn snap(
        &self,
        candidate: Rect,
        others: impl IntoIterator<Item = Rect>,
        image_size: Vec2,
    ) -> SnapResult {
        if !self.config.enabled {
            return SnapResult::unchanged(candidate);
        }

        let frame = Rect::from_min_size(egui::Pos2::ZERO, image_size);
        let mut targets_x = vertical_lines(frame).to_vec();
        let mut targets_y = horizontal_lines(frame).to_vec();
        for rect in others {
            targets_x.extend(vertical_lines(rect));
            targets_y.extend(horizontal_lines(rect));
        }

        let dx = closest(&vertical_lines(candidate), &targets_x, self.config.threshold);
        let dy = closest(&horizontal_lines(candidate), &targets_y, self.config.threshold);

        let mut offset = Vec2::ZERO;
        let mut guides = Vec::new();
        if let Some((delta, position)) = dx {
            offset.x = delta;
            guides.push(SnapGuide {
                axis: GuideAxis::Vertical,
                position,
            });
        }
        if let Some((delta, position)) = dy {
            offset.y = delta;
            guides.push(SnapGuide {
                axis: GuideAxis::Horizontal,
                position,
            });
        }

        SnapResult {
            rect: candidate.translate(offset),
            offset,
            guides,
        }
    }
}

fn vertical_lines(rect: Rect) -> [f32; 3] {
    [rect.min.x, rect.center().x, rect.max.x]
}

fn horizontal_lines(rect: Rect) -> [f32; 3] {
    [rect.min.y, rect.center().y, rect.max.y]
}

/// Closest (correction, target) pair with distance strictly below
/// `threshold`. Earlier references win ties.
fn closest(references: &[f32; 3], targets: &[f32], threshold: f32) -> Option<(f32, f32)> {
    let mut best: Option<(f32, f32)> = None;
    for &reference in references {
        for &target in targets {
            let delta = target - reference;
            if delta.abs() >= threshold {
                continue;
            }
            match best {
                Some((current, _)) if current.abs() <= delta.abs() => {}
                _ => best = Some((delta, target)),
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use egui::{pos2, vec2};

    use super::*;

    fn rect(x: f32, y: f32, w: f32, h: f32) -> Rect {
        Rect::from_min_size(pos2(x, y), vec2(w, h))
    }

    #[test]
    fn snaps_right_edge_to_neighbour_left_edge() {
        let engine = SnapEngine::default();
        let b = rect(25.0, 0.0, 20.0, 20.0);
        // A dragged so its right edge sits at 24.
        let candidate = rect(4.0, 0.0, 20.0, 20.0);
        let result = engine.snap(candidate, [b], vec2(200.0, 200.0));
        assert_eq!(result.rect, rect(5.0, 0.0, 20.0, 20.0));
        assert!(result.guides.contains(&SnapGuide {
            axis: GuideAxis::Vertical,
            position: 25.0,
        }));
    }

    #[test]
    fn threshold_boundary_is_strict() {
        let engine = SnapEngine::new(SnapConfig {
            enabled: true,
            threshold: 5.0,
        });
        let target = rect(500.0, 500.0, 40.0, 40.0);
        let eps = 0.01;

        let near = rect(500.0 - 60.0 - (5.0 - eps), 300.0, 60.0, 60.0);
        let snapped = engine.snap(near, [target], vec2(2000.0, 2000.0));
        assert!((snapped.rect.max.x - 500.0).abs() < 1e-3);

        let far = rect(500.0 - 60.0 - (5.0 + eps), 300.0, 60.0, 60.0);
        let unsnapped = engine.snap(far, [target], vec2(2000.0, 2000.0));
        assert_eq!(unsnapped.offset.x, 0.0);
        assert!(unsnapped
            .guides
            .iter()
            .all(|guide| guide.axis != GuideAxis::Vertical));
    }

    #[test]
    fn axes_resolve_independently() {
        let engine = SnapEngine::default();
        let candidate = rect(97.0, 42.0, 10.0, 10.0);
        // Centre x = 102 snaps to image centre 100; y has nothing nearby.
        let result = engine.snap(candidate, std::iter::empty(), vec2(200.0, 300.0));
        assert_eq!(result.offset, vec2(-2.0, 0.0));
        assert_eq!(result.guides.len(), 1);
        assert_eq!(result.guides[0].axis, GuideAxis::Vertical);
        assert_eq!(result.guides[0].position, 100.0);
    }

    #[test]
    fn disabled_engine_passes_through() {
        let mut engine = SnapEngine::default();
        engine.set_enabled(false);
        let candidate = rect(1.0, 1.0, 10.0, 10.0);
        let result = engine.snap(candidate, std::iter::empty(), vec2(100.0, 100.0));
        assert_eq!(result.rect, candidate);
        assert!(result.guides.is_empty());
    }
}
