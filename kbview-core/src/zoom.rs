use std::time::Instant;

use crate::config::ViewerConfig;
use crate::debounce::Debouncer;

/// Fit-to-width base scale, clamped to `[min, max]`.
pub fn fit_scale(container_width: f32, page_width: f32, min: f32, max: f32) -> f32 {
    if !(container_width.is_finite() && page_width.is_finite()) || page_width <= 0.0 {
        return 1.0_f32.clamp(min, max);
    }
    (container_width / page_width).clamp(min, max)
}

/// Base scale used for rasterization plus the interactive visual multiplier.
#[derive(Debug, Clone)]
pub struct ZoomController {
    base_scale: f32,
    multiplier: f32,
    min: f32,
    max: f32,
    step: f32,
    recompute: Debouncer<()>,
}

impl ZoomController {
    pub fn new(base_scale: f32, config: &ViewerConfig) -> Self {
        Self {
            base_scale,
            multiplier: 1.0,
            min: config.min_zoom,
            max: config.max_zoom,
            step: config.zoom_step,
            recompute: Debouncer::new(config.zoom_debounce),
        }
    }

    pub fn base_scale(&self) -> f32 {
        self.base_scale
    }

    pub fn multiplier(&self) -> f32 {
        self.multiplier
    }

    pub fn effective_scale(&self) -> f32 {
        self.base_scale * self.multiplier
    }

    /// Clamps and applies a multiplier; a real change schedules a highlight recompute.
    pub fn set_multiplier(&mut self, value: f32, now: Instant) -> bool {
        let next = value.clamp(self.min, self.max);
        if (next - self.multiplier).abs() <= f32::EPSILON {
            return false;
        }
        self.multiplier = next;
        self.recompute.schedule((), now);
        true
    }

    pub fn zoom_in(&mut self, now: Instant) -> bool {
        self.set_multiplier(self.multiplier + self.step, now)
    }

    pub fn zoom_out(&mut self, now: Instant) -> bool {
        self.set_multiplier(self.multiplier - self.step, now)
    }

    /// Displays at the base scale again.
    pub fn fit(&mut self, now: Instant) -> bool {
        self.set_multiplier(1.0, now)
    }

    #[cfg(test)]
    pub fn recompute_pending(&self) -> bool {
        self.recompute.is_pending()
    }

    pub fn recompute_due(&mut self, now: Instant) -> bool {
        self.recompute.take_due(now).is_some()
    }
}
