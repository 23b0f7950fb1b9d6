//! Passes and the context handed to their render callbacks.

use crate::commands::CmdBufferRecorder;
use crate::resources::{Framebuffer, MappedRange, TransientBuffer, TransientImage};
use crate::types::PipelineStage;

use super::frame_resources::FrameResources;
use super::resource::{BufferId, ImageId};

/// Type of a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassKind {
    Graphics,
    Compute,
}

/// How a pass touches one resource. All usages of a resource within a pass
/// are merged into one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassUsage {
    pub stage: PipelineStage,
    pub written: bool,
}

/// Callback recording a pass' commands.
pub type RenderFn<'a> = Box<dyn FnOnce(&mut CmdBufferRecorder, &PassContext<'_>) + 'a>;

/// One scheduled unit of GPU work.
pub struct Pass<'a> {
    pub(crate) index: usize,
    pub(crate) name: String,
    pub(crate) kind: PassKind,
    pub(crate) images: Vec<(ImageId, PassUsage)>,
    pub(crate) buffers: Vec<(BufferId, PassUsage)>,
    pub(crate) colors: Vec<ImageId>,
    pub(crate) depth: Option<ImageId>,
    pub(crate) mapped: Vec<BufferId>,
    pub(crate) render: Option<RenderFn<'a>>,
}

impl<'a> Pass<'a> {
    pub(crate) fn new(index: usize, name: String, kind: PassKind) -> Self {
        Self {
            index,
            name,
            kind,
            images: Vec::new(),
            buffers: Vec::new(),
            colors: Vec::new(),
            depth: None,
            mapped: Vec::new(),
            render: None,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> PassKind {
        self.kind
    }

    /// Images touched by this pass, in registration order.
    pub fn images(&self) -> &[(ImageId, PassUsage)] {
        &self.images
    }

    /// Buffers touched by this pass, in registration order.
    pub fn buffers(&self) -> &[(BufferId, PassUsage)] {
        &self.buffers
    }

    pub fn has_attachments(&self) -> bool {
        !self.colors.is_empty() || self.depth.is_some()
    }

    pub(crate) fn add_image(&mut self, id: ImageId, stage: PipelineStage, written: bool) {
        merge_usage(&mut self.images, id, stage, written);
    }

    pub(crate) fn add_buffer(&mut self, id: BufferId, stage: PipelineStage, written: bool) {
        merge_usage(&mut self.buffers, id, stage, written);
    }
}

fn merge_usage<T: PartialEq>(
    usages: &mut Vec<(T, PassUsage)>,
    id: T,
    stage: PipelineStage,
    written: bool,
) {
    match usages.iter_mut().find(|(existing, _)| *existing == id) {
        Some((_, usage)) => {
            usage.stage |= stage;
            usage.written |= written;
        }
        None => usages.push((id, PassUsage { stage, written })),
    }
}

impl std::fmt::Debug for Pass<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pass")
            .field("index", &self.index)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("images", &self.images)
            .field("buffers", &self.buffers)
            .finish_non_exhaustive()
    }
}

/// What a render callback can see of its pass.
pub struct PassContext<'r> {
    pub(crate) name: &'r str,
    pub(crate) index: usize,
    pub(crate) resources: &'r FrameResources,
    pub(crate) framebuffer: Option<&'r Framebuffer>,
    pub(crate) mapped: &'r [BufferId],
}

impl<'r> PassContext<'r> {
    pub fn name(&self) -> &str {
        self.name
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn image(&self, id: impl Into<ImageId>) -> &'r TransientImage {
        self.resources.image(id.into())
    }

    pub fn buffer(&self, id: impl Into<BufferId>) -> &'r TransientBuffer {
        self.resources.buffer(id.into())
    }

    /// Render targets of the pass.
    ///
    /// # Panics
    ///
    /// Panics if the pass has neither color nor depth outputs.
    pub fn framebuffer(&self) -> &'r Framebuffer {
        match self.framebuffer {
            Some(framebuffer) => framebuffer,
            None => panic!("Pass \"{}\" has no attachments", self.name),
        }
    }

    /// CPU-writable range of a buffer this pass mapped.
    ///
    /// # Panics
    ///
    /// Panics if the buffer was not mapped by this pass.
    pub fn mapped_buffer(&self, id: impl Into<BufferId>) -> MappedRange<'r> {
        let id = id.into();
        assert!(
            self.mapped.contains(&id),
            "Buffer {id:?} was not mapped by pass \"{}\"",
            self.name
        );
        self.resources.mapped_range(id)
    }
}
