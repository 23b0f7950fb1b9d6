//! Pass builders.
//!
//! A builder is returned by [`FrameGraph::add_pass`] and
//! [`FrameGraph::add_compute_pass`]. Each method registers one typed usage of
//! a resource by the pass. Writes require a mutable id.

use crate::commands::CmdBufferRecorder;
use crate::types::{BufferUsage, Extent2d, ImageUsage, PipelineStage, TextureFormat};

use super::FrameGraph;
use super::pass::PassContext;
use super::resource::{BufferId, ImageId, MutableBufferId, MutableImageId};

/// Builder for a graphics pass.
pub struct PassBuilder<'g, 'a> {
    graph: &'g mut FrameGraph<'a>,
    pass: usize,
}

impl<'g, 'a> PassBuilder<'g, 'a> {
    pub(crate) fn new(graph: &'g mut FrameGraph<'a>, pass: usize) -> Self {
        Self { graph, pass }
    }

    /// Index of the pass being built.
    pub fn pass_index(&self) -> usize {
        self.pass
    }

    pub fn declare_image(&mut self, format: TextureFormat, size: impl Into<Extent2d>) -> MutableImageId {
        self.graph.declare_image(format, size)
    }

    pub fn declare_buffer(&mut self, byte_size: u64) -> MutableBufferId {
        self.graph.declare_buffer(byte_size)
    }

    pub fn declare_typed_buffer<T>(&mut self, count: usize) -> MutableBufferId {
        self.graph.declare_typed_buffer::<T>(count)
    }

    /// Declare a new image filled with a copy of `src` before this pass runs.
    ///
    /// If `src` is not used after this pass, the copy reuses its memory and
    /// no copy is recorded.
    pub fn declare_copy(&mut self, src: impl Into<ImageId>) -> MutableImageId {
        let src = src.into();
        let info = *self.graph.image_info(src);
        let dst = self.graph.declare_image(info.format, info.size);
        self.graph.register_image_usage(
            self.pass,
            src,
            ImageUsage::TRANSFER_SRC,
            false,
            PipelineStage::TRANSFER,
        );
        self.graph.register_image_usage(
            self.pass,
            dst.id(),
            ImageUsage::TRANSFER_DST,
            true,
            PipelineStage::TRANSFER,
        );
        self.graph.register_image_copy(dst, src, self.pass);
        dst
    }

    pub fn add_color_output(&mut self, image: MutableImageId) {
        self.graph.register_image_usage(
            self.pass,
            image.id(),
            ImageUsage::COLOR,
            true,
            PipelineStage::COLOR_ATTACHMENT_OUT,
        );
        self.graph.passes[self.pass].colors.push(image.id());
    }

    /// # Panics
    ///
    /// Panics if the pass already has a depth output.
    pub fn add_depth_output(&mut self, image: MutableImageId) {
        assert!(
            self.graph.passes[self.pass].depth.is_none(),
            "Pass already has a depth output"
        );
        self.graph.register_image_usage(
            self.pass,
            image.id(),
            ImageUsage::DEPTH,
            true,
            PipelineStage::DEPTH_ATTACHMENT_OUT,
        );
        self.graph.passes[self.pass].depth = Some(image.id());
    }

    /// Sample `image` from `stage`.
    pub fn add_uniform_input(&mut self, image: impl Into<ImageId>, stage: PipelineStage) {
        self.graph
            .register_image_usage(self.pass, image.into(), ImageUsage::TEXTURE, false, stage);
    }

    pub fn add_storage_input(&mut self, image: impl Into<ImageId>, stage: PipelineStage) {
        self.graph
            .register_image_usage(self.pass, image.into(), ImageUsage::STORAGE, false, stage);
    }

    pub fn add_storage_output(&mut self, image: MutableImageId, stage: PipelineStage) {
        self.graph
            .register_image_usage(self.pass, image.id(), ImageUsage::STORAGE, true, stage);
    }

    pub fn add_uniform_buffer_input(&mut self, buffer: impl Into<BufferId>, stage: PipelineStage) {
        self.graph
            .register_buffer_usage(self.pass, buffer.into(), BufferUsage::UNIFORM, false, stage);
    }

    pub fn add_storage_buffer_input(&mut self, buffer: impl Into<BufferId>, stage: PipelineStage) {
        self.graph
            .register_buffer_usage(self.pass, buffer.into(), BufferUsage::STORAGE, false, stage);
    }

    pub fn add_storage_buffer_output(&mut self, buffer: MutableBufferId, stage: PipelineStage) {
        self.graph
            .register_buffer_usage(self.pass, buffer.id(), BufferUsage::STORAGE, true, stage);
    }

    pub fn add_attrib_input(&mut self, buffer: impl Into<BufferId>) {
        self.graph.register_buffer_usage(
            self.pass,
            buffer.into(),
            BufferUsage::ATTRIBUTE,
            false,
            PipelineStage::VERTEX_INPUT,
        );
    }

    pub fn add_index_input(&mut self, buffer: impl Into<BufferId>) {
        self.graph.register_buffer_usage(
            self.pass,
            buffer.into(),
            BufferUsage::INDEX,
            false,
            PipelineStage::VERTEX_INPUT,
        );
    }

    pub fn add_indirect_input(&mut self, buffer: impl Into<BufferId>) {
        self.graph.register_buffer_usage(
            self.pass,
            buffer.into(),
            BufferUsage::INDIRECT,
            false,
            PipelineStage::DRAW_INDIRECT,
        );
    }

    /// Let the render callback fill `buffer` from the CPU.
    pub fn map_buffer(&mut self, buffer: MutableBufferId) {
        self.graph.map_buffer(self.pass, buffer);
    }

    pub fn set_render_func<F>(&mut self, render: F)
    where
        F: FnOnce(&mut CmdBufferRecorder, &PassContext<'_>) + 'a,
    {
        self.graph.passes[self.pass].render = Some(Box::new(render));
    }
}

/// Builder for a compute pass.
///
/// Same as [`PassBuilder`] minus attachments and vertex inputs. Every shader
/// access happens in the compute stage.
pub struct ComputePassBuilder<'g, 'a> {
    inner: PassBuilder<'g, 'a>,
}

impl<'g, 'a> ComputePassBuilder<'g, 'a> {
    pub(crate) fn new(graph: &'g mut FrameGraph<'a>, pass: usize) -> Self {
        Self {
            inner: PassBuilder::new(graph, pass),
        }
    }

    pub fn pass_index(&self) -> usize {
        self.inner.pass_index()
    }

    pub fn declare_image(&mut self, format: TextureFormat, size: impl Into<Extent2d>) -> MutableImageId {
        self.inner.declare_image(format, size)
    }

    pub fn declare_buffer(&mut self, byte_size: u64) -> MutableBufferId {
        self.inner.declare_buffer(byte_size)
    }

    pub fn declare_typed_buffer<T>(&mut self, count: usize) -> MutableBufferId {
        self.inner.declare_typed_buffer::<T>(count)
    }

    pub fn declare_copy(&mut self, src: impl Into<ImageId>) -> MutableImageId {
        self.inner.declare_copy(src)
    }

    pub fn add_uniform_input(&mut self, image: impl Into<ImageId>) {
        self.inner
            .add_uniform_input(image, PipelineStage::COMPUTE_SHADER);
    }

    pub fn add_storage_input(&mut self, image: impl Into<ImageId>) {
        self.inner
            .add_storage_input(image, PipelineStage::COMPUTE_SHADER);
    }

    pub fn add_storage_output(&mut self, image: MutableImageId) {
        self.inner
            .add_storage_output(image, PipelineStage::COMPUTE_SHADER);
    }

    pub fn add_uniform_buffer_input(&mut self, buffer: impl Into<BufferId>) {
        self.inner
            .add_uniform_buffer_input(buffer, PipelineStage::COMPUTE_SHADER);
    }

    pub fn add_storage_buffer_input(&mut self, buffer: impl Into<BufferId>) {
        self.inner
            .add_storage_buffer_input(buffer, PipelineStage::COMPUTE_SHADER);
    }

    pub fn add_storage_buffer_output(&mut self, buffer: MutableBufferId) {
        self.inner
            .add_storage_buffer_output(buffer, PipelineStage::COMPUTE_SHADER);
    }

    /// Indirect dispatch arguments.
    pub fn add_indirect_input(&mut self, buffer: impl Into<BufferId>) {
        self.inner.add_indirect_input(buffer);
    }

    pub fn map_buffer(&mut self, buffer: MutableBufferId) {
        self.inner.map_buffer(buffer);
    }

    pub fn set_render_func<F>(&mut self, render: F)
    where
        F: FnOnce(&mut CmdBufferRecorder, &PassContext<'_>) + 'a,
    {
        self.inner.set_render_func(render);
    }
}
