//! Named spans of passes.

use std::ops::{Deref, DerefMut};

use super::FrameGraph;

/// A named range of passes, `begin..end` in pass indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub name: String,
    pub begin: usize,
    /// `None` while the region is still open.
    pub end: Option<usize>,
}

impl Region {
    pub fn is_empty(&self) -> bool {
        self.end.is_some_and(|end| end <= self.begin)
    }
}

/// Scoped region guard returned by [`FrameGraph::region`].
///
/// Passes added through the guard belong to the region. The region is
/// closed when the guard is dropped. Regions only affect debug labels and
/// GPU timing, never scheduling.
pub struct FrameGraphRegion<'g, 'a> {
    graph: &'g mut FrameGraph<'a>,
    index: usize,
}

impl<'g, 'a> FrameGraphRegion<'g, 'a> {
    pub(crate) fn new(graph: &'g mut FrameGraph<'a>, index: usize) -> Self {
        Self { graph, index }
    }
}

impl<'a> Deref for FrameGraphRegion<'_, 'a> {
    type Target = FrameGraph<'a>;

    fn deref(&self) -> &FrameGraph<'a> {
        self.graph
    }
}

impl<'a> DerefMut for FrameGraphRegion<'_, 'a> {
    fn deref_mut(&mut self) -> &mut FrameGraph<'a> {
        self.graph
    }
}

impl Drop for FrameGraphRegion<'_, '_> {
    fn drop(&mut self) {
        let end = self.graph.pass_count();
        self.graph.regions[self.index].end = Some(end);
    }
}
