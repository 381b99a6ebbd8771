//! Bridge between cached segments and whatever draws them.

use std::collections::BTreeSet;

use crate::cache::{Segment, SegmentCache, SegmentId};

/// A host drawing surface. Segments arrive with pixel bounds already set for
/// the current zoom.
pub trait RenderSurface {
    fn paint(&mut self, segment: &Segment);

    /// Move an already painted segment without touching its pixels.
    fn reposition(&mut self, id: SegmentId, start_pixel: f64, end_pixel: f64);

    fn clear(&mut self);
}

/// Keeps a surface in step with the cache. Without a surface every call is a
/// no-op apart from bookkeeping.
#[derive(Default)]
pub struct PresentationAdapter {
    surface: Option<Box<dyn RenderSurface>>,
    painted: BTreeSet<SegmentId>,
}

impl PresentationAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a surface, replacing any previous one, and bring it up to date.
    pub fn attach(&mut self, mut surface: Box<dyn RenderSurface>, cache: &SegmentCache) {
        surface.clear();
        self.painted.clear();
        for segment in cache.iter() {
            surface.paint(segment);
            self.painted.insert(segment.id());
        }
        self.surface = Some(surface);
    }

    pub fn is_attached(&self) -> bool {
        self.surface.is_some()
    }

    pub fn painted(&self) -> usize {
        self.painted.len()
    }

    pub fn paint(&mut self, segment: &Segment) {
        if let Some(surface) = self.surface.as_mut() {
            surface.paint(segment);
            self.painted.insert(segment.id());
        }
    }

    pub fn reposition_all(&mut self, cache: &SegmentCache) {
        let Some(surface) = self.surface.as_mut() else {
            return;
        };
        for segment in cache.iter().filter(|s| self.painted.contains(&s.id())) {
            surface.reposition(segment.id(), segment.start_pixel(), segment.end_pixel());
        }
    }

    /// Repaint the given segments from cached data.
    pub fn refresh(&mut self, ids: &[SegmentId], cache: &SegmentCache) {
        for &id in ids {
            if let Some(segment) = cache.get(id) {
                self.paint(segment);
            }
        }
    }

    pub fn clear(&mut self) {
        if let Some(surface) = self.surface.as_mut() {
            surface.clear();
        }
        self.painted.clear();
    }
}
