//! Frame graph.
//!
//! A [`FrameGraph`] is built once per frame. Rendering code declares
//! transient images and buffers, then adds passes that register how they use
//! them. [`FrameGraph::render`] then:
//!
//! 1. lets images declared as copies reuse the memory of their source when
//!    the two lifetimes don't overlap,
//! 2. allocates everything else from the [`ResourcePool`], in first-use order,
//! 3. records every pass in declaration order, preceded by the barriers its
//!    usages require,
//! 4. uploads CPU-written buffers through one extra submission.
//!
//! # Example
//!
//! ```ignore
//! let mut graph = FrameGraph::new(pool.clone());
//! let color = graph.declare_image(TextureFormat::Rgba8Unorm, (512, 512));
//!
//! {
//!     let mut pass = graph.add_pass("scene");
//!     pass.add_color_output(color);
//!     pass.set_render_func(|recorder, ctx| {
//!         recorder.bind_framebuffer(ctx.framebuffer());
//!         recorder.draw(3, 1);
//!     });
//! }
//! {
//!     let mut pass = graph.add_pass("post");
//!     pass.add_uniform_input(color, PipelineStage::FRAGMENT_SHADER);
//! }
//!
//! let mut recorder = device.create_cmd_buffer()?;
//! graph.render(&mut recorder, None)?;
//! device.submit(recorder)?;
//! ```

mod builder;
mod frame_resources;
mod pass;
mod region;
mod resource;

pub use builder::{ComputePassBuilder, PassBuilder};
pub use frame_resources::FrameResources;
pub use pass::{Pass, PassContext, PassKind, PassUsage, RenderFn};
pub use region::{FrameGraphRegion, Region};
pub use resource::{
    BufferCreateInfo, BufferId, ImageCreateInfo, ImageId, MutableBufferId, MutableImageId,
    UsageRange,
};

use std::collections::HashMap;
use std::sync::Arc;

use crate::commands::{BufferBarrier, CmdBufferRecorder, ImageBarrier};
use crate::device::GraphicsDevice;
use crate::error::GraphicsError;
use crate::pool::ResourcePool;
use crate::resources::Framebuffer;
use crate::timing::CmdTimingRecorder;
use crate::types::{
    BufferUsage, Extent2d, ImageUsage, MemoryType, PipelineStage, TextureFormat,
};
use crate::{profile_function, profile_scope, profile_scope_dynamic};

const FRAME_REGION_COLOR: [f32; 4] = [0.8, 0.3, 0.3, 1.0];
const USER_REGION_COLOR: [f32; 4] = [0.3, 0.6, 0.9, 1.0];
const PASS_REGION_COLOR: [f32; 4] = [0.7, 0.7, 0.7, 1.0];

#[derive(Debug, Clone, Copy)]
struct ImageCopyInfo {
    pass: usize,
    dst: ImageId,
    src: ImageId,
}

/// Single-frame GPU work scheduler.
pub struct FrameGraph<'a> {
    resources: FrameResources,
    images: Vec<ImageCreateInfo>,
    buffers: Vec<BufferCreateInfo>,
    pub(crate) passes: Vec<Pass<'a>>,
    pub(crate) regions: Vec<Region>,
    image_copies: Vec<ImageCopyInfo>,
    image_aliasing: bool,
}

impl<'a> FrameGraph<'a> {
    pub fn new(pool: Arc<ResourcePool>) -> Self {
        Self {
            resources: FrameResources::new(pool),
            images: Vec::new(),
            buffers: Vec::new(),
            passes: Vec::new(),
            regions: Vec::new(),
            image_copies: Vec::new(),
            image_aliasing: true,
        }
    }

    pub fn device(&self) -> &Arc<GraphicsDevice> {
        self.resources.device()
    }

    /// Enable or disable memory reuse between copies and their sources.
    /// Enabled by default.
    pub fn set_image_aliasing(&mut self, enabled: bool) {
        self.image_aliasing = enabled;
    }

    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    pub fn passes(&self) -> &[Pass<'a>] {
        &self.passes
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Declare a transient image.
    ///
    /// # Panics
    ///
    /// Panics if `size` is zero in either dimension.
    pub fn declare_image(&mut self, format: TextureFormat, size: impl Into<Extent2d>) -> MutableImageId {
        let size = size.into();
        assert!(!size.is_empty(), "Image size is zero");
        let id = self.resources.create_image_id();
        debug_assert_eq!(id.id().index(), self.images.len());
        self.images.push(ImageCreateInfo::new(format, size));
        id
    }

    /// Declare a transient buffer.
    ///
    /// # Panics
    ///
    /// Panics if `byte_size` is zero.
    pub fn declare_buffer(&mut self, byte_size: u64) -> MutableBufferId {
        assert!(byte_size > 0, "Buffer size is zero");
        let id = self.resources.create_buffer_id();
        debug_assert_eq!(id.id().index(), self.buffers.len());
        self.buffers.push(BufferCreateInfo::new(byte_size));
        id
    }

    /// Declare a buffer holding `count` values of `T`.
    pub fn declare_typed_buffer<T>(&mut self, count: usize) -> MutableBufferId {
        self.declare_buffer((std::mem::size_of::<T>() * count) as u64)
    }

    /// # Panics
    ///
    /// Panics if `id` was not declared by this graph.
    pub fn image_info(&self, id: impl Into<ImageId>) -> &ImageCreateInfo {
        let id = id.into();
        self.check_image(id);
        &self.images[id.index()]
    }

    /// # Panics
    ///
    /// Panics if `id` was not declared by this graph.
    pub fn buffer_info(&self, id: impl Into<BufferId>) -> &BufferCreateInfo {
        let id = id.into();
        self.check_buffer(id);
        &self.buffers[id.index()]
    }

    /// Add a graphics pass executed after every pass added before it.
    pub fn add_pass(&mut self, name: impl Into<String>) -> PassBuilder<'_, 'a> {
        let index = self.push_pass(name.into(), PassKind::Graphics);
        PassBuilder::new(self, index)
    }

    /// Add a compute pass executed after every pass added before it.
    pub fn add_compute_pass(&mut self, name: impl Into<String>) -> ComputePassBuilder<'_, 'a> {
        let index = self.push_pass(name.into(), PassKind::Compute);
        ComputePassBuilder::new(self, index)
    }

    /// Open a named region. Passes added through the returned guard belong
    /// to it.
    pub fn region(&mut self, name: impl Into<String>) -> FrameGraphRegion<'_, 'a> {
        let index = self.regions.len();
        self.regions.push(Region {
            name: name.into(),
            begin: self.passes.len(),
            end: None,
        });
        FrameGraphRegion::new(self, index)
    }

    /// Allocate resources and record every pass into `recorder`.
    ///
    /// The frame's resources are kept alive by `recorder` and return to the
    /// pool once the device finished executing it.
    ///
    /// # Errors
    ///
    /// Returns an error if a resource could not be allocated, in which case
    /// nothing has been recorded, or if the upload could not be submitted.
    /// The resources stay with `recorder` in the latter case.
    pub fn render(
        mut self,
        recorder: &mut CmdBufferRecorder,
        mut timing: Option<&mut CmdTimingRecorder>,
    ) -> Result<(), GraphicsError> {
        profile_function!();

        self.alloc_resources()?;
        let framebuffers = self.init_framebuffers();

        let FrameGraph {
            resources,
            passes,
            regions,
            mut image_copies,
            ..
        } = self;
        image_copies.sort_by_key(|copy| copy.pass);

        let mut image_pending: HashMap<ImageId, PipelineStage> = HashMap::new();
        let mut buffer_pending: HashMap<BufferId, PipelineStage> = HashMap::new();
        for pass in &passes {
            for id in &pass.mapped {
                buffer_pending.insert(*id, PipelineStage::TRANSFER);
            }
        }

        open_region(recorder, &mut timing, "FrameGraph::render", FRAME_REGION_COLOR);

        let mut copies = image_copies.iter().peekable();
        let mut open_regions: Vec<usize> = Vec::new();

        for (mut pass, framebuffer) in passes.into_iter().zip(framebuffers) {
            while let Some(&top) = open_regions.last() {
                if regions[top].end.is_some_and(|end| end <= pass.index) {
                    close_region(recorder, &mut timing);
                    open_regions.pop();
                } else {
                    break;
                }
            }
            for (index, region) in regions.iter().enumerate() {
                if region.begin == pass.index && !region.is_empty() {
                    open_region(recorder, &mut timing, &region.name, USER_REGION_COLOR);
                    open_regions.push(index);
                }
            }

            profile_scope_dynamic!(&pass.name);
            open_region(recorder, &mut timing, &pass.name, PASS_REGION_COLOR);

            while let Some(copy) = copies.next_if(|copy| copy.pass == pass.index) {
                if resources.are_aliased(copy.src, copy.dst) {
                    if let Some(stage) = image_pending.remove(&copy.src) {
                        image_pending.insert(copy.dst, stage);
                    }
                } else {
                    image_pending.remove(&copy.src);
                    image_pending.remove(&copy.dst);
                    recorder.barriered_copy(resources.image(copy.src), resources.image(copy.dst));
                }
            }

            let (buffer_barriers, image_barriers) =
                build_barriers(&pass, &resources, &mut image_pending, &mut buffer_pending);
            recorder.barriers(&buffer_barriers, &image_barriers);

            match pass.render.take() {
                Some(render) => {
                    let context = PassContext {
                        name: &pass.name,
                        index: pass.index,
                        resources: &resources,
                        framebuffer: framebuffer.as_ref(),
                        mapped: &pass.mapped,
                    };
                    render(recorder, &context);
                }
                None => log::trace!("Pass \"{}\" has no render function", pass.name),
            }

            close_region(recorder, &mut timing);
        }

        for _ in open_regions.drain(..) {
            close_region(recorder, &mut timing);
        }
        close_region(recorder, &mut timing);

        let device = Arc::clone(resources.device());
        let upload = if resources.has_staging() {
            device.create_cmd_buffer().map(|mut upload| {
                resources.flush_mapped_buffers(&mut upload);
                Some(upload)
            })
        } else {
            Ok(None)
        };

        // Recorded commands reference the frame's resources even if the
        // upload fails.
        recorder.keep_alive(resources);
        if let Some(upload) = upload? {
            device.submit(upload)?;
        }
        Ok(())
    }

    fn push_pass(&mut self, name: String, kind: PassKind) -> usize {
        let index = self.passes.len();
        log::trace!("Adding {kind:?} pass #{index} \"{name}\"");
        self.passes.push(Pass::new(index, name, kind));
        index
    }

    fn check_image(&self, id: ImageId) {
        assert!(
            id.is_valid()
                && id.generation() == self.resources.generation()
                && id.index() < self.images.len(),
            "Image {id:?} doesn't exist in this graph"
        );
    }

    fn check_buffer(&self, id: BufferId) {
        assert!(
            id.is_valid()
                && id.generation() == self.resources.generation()
                && id.index() < self.buffers.len(),
            "Buffer {id:?} doesn't exist in this graph"
        );
    }

    pub(crate) fn register_image_usage(
        &mut self,
        pass: usize,
        id: ImageId,
        usage: ImageUsage,
        is_written: bool,
        stage: PipelineStage,
    ) {
        debug_assert!(
            !(is_written && usage.is_read_only()),
            "{usage:?} can not be used as a write"
        );
        debug_assert!(
            is_written || !usage.is_write_only(),
            "{usage:?} can not be used as a read"
        );
        self.check_image(id);

        let info = &mut self.images[id.index()];
        if info.range.is_unused_before(pass) {
            info.last_usage = usage;
        } else {
            info.last_usage |= usage;
        }
        info.usage |= usage;
        info.range.register_use(pass, is_written);
        self.passes[pass].add_image(id, stage, is_written);
    }

    pub(crate) fn register_buffer_usage(
        &mut self,
        pass: usize,
        id: BufferId,
        usage: BufferUsage,
        is_written: bool,
        stage: PipelineStage,
    ) {
        debug_assert!(
            !(is_written && usage.is_read_only()),
            "{usage:?} can not be used as a write"
        );
        debug_assert!(
            is_written || !usage.is_write_only(),
            "{usage:?} can not be used as a read"
        );
        self.check_buffer(id);

        let info = &mut self.buffers[id.index()];
        info.usage |= usage;
        info.range.register_use(pass, is_written);
        self.passes[pass].add_buffer(id, stage, is_written);
    }

    /// # Panics
    ///
    /// Panics if `dst` is already declared as a copy.
    pub(crate) fn register_image_copy(&mut self, dst: MutableImageId, src: ImageId, pass: usize) {
        let dst = dst.id();
        self.check_image(dst);
        self.check_image(src);

        let info = &mut self.images[dst.index()];
        assert!(info.copy_src.is_none(), "Image is already a copy");
        info.copy_src = Some(src);
        self.image_copies.push(ImageCopyInfo { pass, dst, src });
    }

    pub(crate) fn map_buffer(&mut self, pass: usize, id: MutableBufferId) {
        let id = id.id();
        self.check_buffer(id);

        let info = &mut self.buffers[id.index()];
        info.usage |= BufferUsage::TRANSFER_DST;
        info.memory_type = MemoryType::CpuVisible;
        info.range.register_use(pass, true);

        let pass = &mut self.passes[pass];
        if !pass.mapped.contains(&id) {
            pass.mapped.push(id);
        }
    }

    /// Let copies reuse their source's memory when the lifetimes are
    /// disjoint, in copy declaration order.
    fn alias_images(&mut self) {
        for copy in &self.image_copies {
            let dst_info = self.images[copy.dst.index()];
            let Some(src) = dst_info.copy_src else {
                continue;
            };

            let mut root = src;
            while let Some(next) = self.images[root.index()].alias {
                root = next;
            }

            let root_info = &self.images[root.index()];
            let can_alias_on_last = root_info.last_usage == ImageUsage::TRANSFER_SRC;
            let disjoint = match (root_info.range.last_use(), dst_info.range.first_use) {
                (Some(last), Some(first)) => last < first || (last == first && can_alias_on_last),
                _ => false,
            };

            if disjoint {
                log::trace!("Aliasing image {:?} onto {root:?}", copy.dst);
                self.images[root.index()].register_alias(&dst_info);
                let dst = &mut self.images[copy.dst.index()];
                dst.alias = dst.copy_src.take();
            }
        }
    }

    fn alloc_resources(&mut self) -> Result<(), GraphicsError> {
        profile_scope!("alloc_resources");

        if self.image_aliasing {
            self.alias_images();
        }

        let FrameGraph {
            resources,
            images,
            buffers,
            passes,
            ..
        } = self;
        let generation = resources.generation();

        let mut order: Vec<usize> = (0..images.len()).collect();
        order.sort_by_key(|&index| images[index].range.first_use);

        let mut aliased = 0;
        for index in order {
            let id = ImageId::new(index as u32, generation);
            let info = &mut images[index];
            if let Some(src) = info.alias {
                resources.create_alias(id, src);
                aliased += 1;
                continue;
            }

            if !info.usage.has_usage() {
                log::warn!(
                    "Image declared by \"{}\" has no usage",
                    pass_name(passes, info.range.first_use)
                );
                info.usage |= ImageUsage::TEXTURE;
            }
            resources.create_image(id, info.format, info.size, info.usage)?;
        }

        let mut order: Vec<usize> = (0..buffers.len()).collect();
        order.sort_by_key(|&index| buffers[index].range.first_use);

        for index in order {
            let id = BufferId::new(index as u32, generation);
            let info = &mut buffers[index];
            if !info.usage.has_usage() {
                log::warn!(
                    "Buffer declared by \"{}\" has no usage",
                    pass_name(passes, info.range.first_use)
                );
                info.usage |= BufferUsage::STORAGE;
            }
            if let Some(write) = info.range.last_write
                && info.range.last_read.is_none_or(|read| read < write)
            {
                log::warn!(
                    "Buffer written by \"{}\" is never consumed",
                    pass_name(passes, Some(write))
                );
            }
            resources.create_buffer(id, info.byte_size, info.usage, info.memory_type)?;
        }

        resources.init_staging_buffer()?;

        log::debug!(
            "FrameGraph: {} passes, {} images ({} aliased), {} buffers",
            passes.len(),
            images.len(),
            aliased,
            buffers.len()
        );
        Ok(())
    }

    fn init_framebuffers(&self) -> Vec<Option<Framebuffer>> {
        self.passes
            .iter()
            .map(|pass| {
                if !pass.has_attachments() {
                    return None;
                }
                let colors: Vec<_> = pass
                    .colors
                    .iter()
                    .map(|id| self.resources.image(*id))
                    .collect();
                let depth = pass.depth.map(|id| self.resources.image(id));

                let size = colors
                    .first()
                    .copied()
                    .or(depth)
                    .map(|image| image.size())
                    .unwrap_or_default();
                assert!(
                    colors.iter().chain(depth.iter()).all(|image| image.size() == size),
                    "Framebuffer attachments of pass \"{}\" differ in size",
                    pass.name
                );

                Some(Framebuffer::new(
                    colors.iter().map(|image| image.handle()).collect(),
                    depth.map(|image| image.handle()),
                    size,
                ))
            })
            .collect()
    }
}

fn pass_name<'p>(passes: &'p [Pass<'_>], index: Option<usize>) -> &'p str {
    index
        .and_then(|index| passes.get(index))
        .map_or("<unused>", |pass| pass.name.as_str())
}

fn open_region(
    recorder: &mut CmdBufferRecorder,
    timing: &mut Option<&mut CmdTimingRecorder>,
    name: &str,
    color: [f32; 4],
) {
    recorder.begin_region(name, color);
    if let Some(timing) = timing.as_deref_mut() {
        timing.begin_zone(recorder, name);
    }
}

fn close_region(recorder: &mut CmdBufferRecorder, timing: &mut Option<&mut CmdTimingRecorder>) {
    if let Some(timing) = timing.as_deref_mut() {
        timing.end_zone(recorder);
    }
    recorder.end_region();
}

/// Barriers needed before `pass`, given the stage that last wrote each
/// resource. Updates the pending stages with the pass' own writes.
fn build_barriers(
    pass: &Pass<'_>,
    resources: &FrameResources,
    images: &mut HashMap<ImageId, PipelineStage>,
    buffers: &mut HashMap<BufferId, PipelineStage>,
) -> (Vec<BufferBarrier>, Vec<ImageBarrier>) {
    let mut image_barriers = Vec::new();
    for (id, usage) in &pass.images {
        // A read at the write's own stage leaves the write pending.
        if let Some(&src) = images.get(id)
            && src != usage.stage
        {
            image_barriers.push(resources.image_barrier(*id, src, usage.stage));
            images.remove(id);
        }
        if usage.written {
            images.insert(*id, usage.stage);
        }
    }

    let mut buffer_barriers = Vec::new();
    for (id, usage) in &pass.buffers {
        if let Some(&src) = buffers.get(id)
            && src != usage.stage
        {
            buffer_barriers.push(resources.buffer_barrier(*id, src, usage.stage));
            buffers.remove(id);
        }
        if usage.written {
            buffers.insert(*id, usage.stage);
        }
    }

    (buffer_barriers, image_barriers)
}

#[cfg(all(test, feature = "dummy"))]
mod tests {
    use std::cell::{Cell, RefCell};

    use super::*;
    use crate::backend::ImageHandle;
    use crate::backend::dummy::DummyBackend;
    use crate::commands::Command;
    use crate::device::DeviceParameters;

    struct Fixture {
        backend: Arc<DummyBackend>,
        device: Arc<GraphicsDevice>,
        pool: Arc<ResourcePool>,
    }

    fn fixture() -> Fixture {
        let backend = Arc::new(DummyBackend::new());
        let device = GraphicsDevice::with_backend(backend.clone(), DeviceParameters::new());
        let pool = ResourcePool::new(device.clone());
        Fixture {
            backend,
            device,
            pool,
        }
    }

    const SIZE: (u32, u32) = (64, 64);

    fn image_barriers(commands: &[Command]) -> Vec<ImageBarrier> {
        commands
            .iter()
            .filter_map(|command| match command {
                Command::Barriers { images, .. } => Some(images.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    fn buffer_barriers(commands: &[Command]) -> Vec<BufferBarrier> {
        commands
            .iter()
            .filter_map(|command| match command {
                Command::Barriers { buffers, .. } => Some(buffers.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    fn image_copies(commands: &[Command]) -> usize {
        commands
            .iter()
            .filter(|command| matches!(command, Command::CopyImage { .. }))
            .count()
    }

    fn markers(commands: &[Command]) -> Vec<String> {
        commands
            .iter()
            .filter_map(|command| match command {
                Command::BeginRegion { name, .. } => Some(format!("+{name}")),
                Command::EndRegion => Some("-".to_string()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_color_output_then_sampled_read() {
        let f = fixture();
        let order = RefCell::new(Vec::new());
        {
            let mut graph = FrameGraph::new(f.pool.clone());
            let image = graph.declare_image(TextureFormat::Rgba8Unorm, (512, 512));
            {
                let mut pass = graph.add_pass("p1");
                pass.add_color_output(image);
                let order = &order;
                pass.set_render_func(move |recorder, ctx| {
                    order.borrow_mut().push(("p1", image_barriers(recorder.commands()).len()));
                    recorder.bind_framebuffer(ctx.framebuffer());
                    recorder.draw(3, 1);
                });
            }
            {
                let mut pass = graph.add_pass("p2");
                pass.add_uniform_input(image, PipelineStage::FRAGMENT_SHADER);
                let order = &order;
                pass.set_render_func(move |recorder, _ctx| {
                    order.borrow_mut().push(("p2", image_barriers(recorder.commands()).len()));
                    recorder.draw(3, 1);
                });
            }

            let mut recorder = f.device.create_cmd_buffer().unwrap();
            graph.render(&mut recorder, None).unwrap();

            let barriers = image_barriers(recorder.commands());
            assert_eq!(barriers.len(), 1);
            assert_eq!(barriers[0].src_stage, PipelineStage::COLOR_ATTACHMENT_OUT);
            assert_eq!(barriers[0].dst_stage, PipelineStage::FRAGMENT_SHADER);
            let desc = f.backend.image_desc(barriers[0].image).unwrap();
            assert_eq!(desc.size, Extent2d::new(512, 512));
            assert_eq!(desc.usage, ImageUsage::COLOR | ImageUsage::TEXTURE);
            f.device.submit(recorder).unwrap();
        }
        assert_eq!(order.into_inner(), vec![("p1", 0), ("p2", 1)]);
        assert_eq!(f.backend.image_allocations(), 1);
    }

    #[test]
    fn test_unchanged_stage_needs_no_barrier() {
        let f = fixture();
        let mut graph = FrameGraph::new(f.pool.clone());
        let image = graph.declare_image(TextureFormat::Rgba16Float, SIZE);
        graph.add_compute_pass("write").add_storage_output(image);
        graph.add_compute_pass("read").add_storage_input(image);

        let mut recorder = f.device.create_cmd_buffer().unwrap();
        graph.render(&mut recorder, None).unwrap();
        assert!(image_barriers(recorder.commands()).is_empty());
    }

    #[test]
    fn test_second_read_needs_no_barrier() {
        let f = fixture();
        let mut graph = FrameGraph::new(f.pool.clone());
        let image = graph.declare_image(TextureFormat::Rgba8Unorm, SIZE);
        graph.add_pass("write").add_color_output(image);
        graph
            .add_pass("read")
            .add_uniform_input(image, PipelineStage::FRAGMENT_SHADER);
        graph.add_compute_pass("read again").add_uniform_input(image);

        let mut recorder = f.device.create_cmd_buffer().unwrap();
        graph.render(&mut recorder, None).unwrap();
        assert_eq!(image_barriers(recorder.commands()).len(), 1);
    }

    #[test]
    fn test_same_stage_read_keeps_write_pending() {
        let f = fixture();
        let mut graph = FrameGraph::new(f.pool.clone());
        let image = graph.declare_image(TextureFormat::Rgba16Float, SIZE);
        let buffer = graph.declare_buffer(1024);
        {
            let mut pass = graph.add_compute_pass("write");
            pass.add_storage_output(image);
            pass.add_storage_buffer_output(buffer);
        }
        {
            let mut pass = graph.add_compute_pass("read same stage");
            pass.add_storage_input(image);
            pass.add_storage_buffer_input(buffer);
        }
        {
            let mut pass = graph.add_pass("read fragment");
            pass.add_uniform_input(image, PipelineStage::FRAGMENT_SHADER);
            pass.add_storage_buffer_input(buffer, PipelineStage::FRAGMENT_SHADER);
        }

        let mut recorder = f.device.create_cmd_buffer().unwrap();
        graph.render(&mut recorder, None).unwrap();

        let images = image_barriers(recorder.commands());
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].src_stage, PipelineStage::COMPUTE_SHADER);
        assert_eq!(images[0].dst_stage, PipelineStage::FRAGMENT_SHADER);
        let buffers = buffer_barriers(recorder.commands());
        assert_eq!(buffers.len(), 1);
        assert_eq!(buffers[0].src_stage, PipelineStage::COMPUTE_SHADER);
        assert_eq!(buffers[0].dst_stage, PipelineStage::FRAGMENT_SHADER);
    }

    #[test]
    fn test_buffer_written_by_compute_read_as_vertices() {
        let f = fixture();
        let mut graph = FrameGraph::new(f.pool.clone());
        let vertices = graph.declare_typed_buffer::<[f32; 4]>(256);
        graph.add_compute_pass("generate").add_storage_buffer_output(vertices);
        graph.add_pass("draw").add_attrib_input(vertices);

        let mut recorder = f.device.create_cmd_buffer().unwrap();
        graph.render(&mut recorder, None).unwrap();

        let barriers = buffer_barriers(recorder.commands());
        assert_eq!(barriers.len(), 1);
        assert_eq!(barriers[0].size, 4096);
        assert_eq!(barriers[0].src_stage, PipelineStage::COMPUTE_SHADER);
        assert_eq!(barriers[0].dst_stage, PipelineStage::VERTEX_INPUT);
        let desc = f.backend.buffer_desc(barriers[0].buffer).unwrap();
        assert_eq!(desc.usage, BufferUsage::STORAGE | BufferUsage::ATTRIBUTE);
    }

    /// A is used by passes 0..=2 and copied into B by pass 3.
    fn build_copy_graph<'a>(
        graph: &mut FrameGraph<'a>,
        handles: &'a RefCell<Vec<ImageHandle>>,
        read_source_after_copy: bool,
    ) {
        let a = graph.declare_image(TextureFormat::Rgba8Unorm, SIZE);
        graph.add_pass("p0").add_color_output(a);
        graph
            .add_pass("p1")
            .add_uniform_input(a, PipelineStage::FRAGMENT_SHADER);
        graph.add_compute_pass("p2").add_uniform_input(a);

        let mut pass = graph.add_pass("p3");
        let b = pass.declare_copy(a);
        pass.add_color_output(b);
        pass.set_render_func(move |_recorder, ctx| {
            handles.borrow_mut().push(ctx.image(a).handle());
            handles.borrow_mut().push(ctx.image(b).handle());
        });
        drop(pass);

        if read_source_after_copy {
            graph.add_compute_pass("p4").add_uniform_input(a);
        }
    }

    #[test]
    fn test_copy_target_aliases_unused_source() {
        let f = fixture();
        let handles = RefCell::new(Vec::new());
        {
            let mut graph = FrameGraph::new(f.pool.clone());
            build_copy_graph(&mut graph, &handles, false);
            assert!(graph.image_info(ImageId::new(1, graph.resources.generation())).copy_src.is_some());

            let mut recorder = f.device.create_cmd_buffer().unwrap();
            graph.render(&mut recorder, None).unwrap();
            assert_eq!(image_copies(recorder.commands()), 0);
        }
        let handles = handles.into_inner();
        assert_eq!(handles[0], handles[1]);
        assert_eq!(f.backend.image_allocations(), 1);
    }

    #[test]
    fn test_copy_is_recorded_when_source_is_still_used() {
        let f = fixture();
        let handles = RefCell::new(Vec::new());
        {
            let mut graph = FrameGraph::new(f.pool.clone());
            build_copy_graph(&mut graph, &handles, true);
            let mut recorder = f.device.create_cmd_buffer().unwrap();
            graph.render(&mut recorder, None).unwrap();
            assert_eq!(image_copies(recorder.commands()), 1);
        }
        let handles = handles.into_inner();
        assert_ne!(handles[0], handles[1]);
        assert_eq!(f.backend.image_allocations(), 2);
    }

    #[test]
    fn test_copy_is_recorded_when_aliasing_is_disabled() {
        let f = fixture();
        let handles = RefCell::new(Vec::new());
        {
            let mut graph = FrameGraph::new(f.pool.clone());
            graph.set_image_aliasing(false);
            build_copy_graph(&mut graph, &handles, false);
            let mut recorder = f.device.create_cmd_buffer().unwrap();
            graph.render(&mut recorder, None).unwrap();
            assert_eq!(image_copies(recorder.commands()), 1);
        }
        assert_eq!(f.backend.image_allocations(), 2);
    }

    #[test]
    fn test_copy_chain_shares_one_image() {
        let f = fixture();
        let same = Cell::new(false);
        {
            let mut graph = FrameGraph::new(f.pool.clone());
            let a = graph.declare_image(TextureFormat::R32Float, SIZE);
            graph.add_compute_pass("fill").add_storage_output(a);

            let b = {
                let mut pass = graph.add_compute_pass("first copy");
                let b = pass.declare_copy(a);
                pass.add_storage_output(b);
                b
            };

            let mut pass = graph.add_compute_pass("second copy");
            let c = pass.declare_copy(b);
            pass.add_storage_output(c);
            let same = &same;
            pass.set_render_func(move |_recorder, ctx| {
                same.set(ctx.image(a).handle() == ctx.image(c).handle());
            });
            drop(pass);

            let mut recorder = f.device.create_cmd_buffer().unwrap();
            graph.render(&mut recorder, None).unwrap();
            assert_eq!(image_copies(recorder.commands()), 0);
        }
        assert!(same.get());
        assert_eq!(f.backend.image_allocations(), 1);
    }

    #[test]
    fn test_aliased_copy_carries_pending_write() {
        let f = fixture();
        let mut graph = FrameGraph::new(f.pool.clone());
        let a = graph.declare_image(TextureFormat::Rgba8Unorm, SIZE);
        graph.add_pass("draw").add_color_output(a);
        let b = graph.add_compute_pass("copy").declare_copy(a);
        graph.add_compute_pass("read").add_uniform_input(b);

        let mut recorder = f.device.create_cmd_buffer().unwrap();
        graph.render(&mut recorder, None).unwrap();

        let barriers = image_barriers(recorder.commands());
        assert_eq!(barriers.len(), 2);
        assert_eq!(barriers[0].src_stage, PipelineStage::COLOR_ATTACHMENT_OUT);
        assert_eq!(barriers[0].dst_stage, PipelineStage::TRANSFER);
        assert_eq!(barriers[1].src_stage, PipelineStage::TRANSFER);
        assert_eq!(barriers[1].dst_stage, PipelineStage::COMPUTE_SHADER);
        assert_eq!(barriers[0].image, barriers[1].image);
    }

    #[test]
    fn test_graph_regions_wrap_passes() {
        let f = fixture();
        let mut graph = FrameGraph::new(f.pool.clone());
        graph.add_compute_pass("a");
        {
            let mut outer = graph.region("outer");
            outer.add_compute_pass("b");
            {
                let mut inner = outer.region("inner");
                inner.add_compute_pass("c");
            }
            outer.add_compute_pass("d");
        }
        drop(graph.region("empty"));
        graph.add_compute_pass("e");

        assert_eq!(graph.regions()[0].begin, 1);
        assert_eq!(graph.regions()[0].end, Some(4));
        assert!(graph.regions()[2].is_empty());

        let mut recorder = f.device.create_cmd_buffer().unwrap();
        graph.render(&mut recorder, None).unwrap();
        assert_eq!(
            markers(recorder.commands()),
            [
                "+FrameGraph::render",
                "+a",
                "-",
                "+outer",
                "+b",
                "-",
                "+inner",
                "+c",
                "-",
                "-",
                "+d",
                "-",
                "-",
                "+e",
                "-",
                "-",
            ]
        );
    }

    #[test]
    fn test_region_ending_with_last_pass() {
        let f = fixture();
        let mut graph = FrameGraph::new(f.pool.clone());
        {
            let mut region = graph.region("tail");
            region.add_compute_pass("a");
        }
        let mut recorder = f.device.create_cmd_buffer().unwrap();
        graph.render(&mut recorder, None).unwrap();
        assert_eq!(
            markers(recorder.commands()),
            ["+FrameGraph::render", "+tail", "+a", "-", "-", "-"]
        );
    }

    #[test]
    fn test_mapped_buffer_is_uploaded_before_frame() {
        let f = fixture();
        let mut graph = FrameGraph::new(f.pool.clone());
        let uniforms = graph.declare_typed_buffer::<u32>(4);
        {
            let mut pass = graph.add_pass("draw");
            pass.map_buffer(uniforms);
            pass.add_uniform_buffer_input(uniforms, PipelineStage::VERTEX_SHADER);
            pass.set_render_func(move |_recorder, ctx| {
                ctx.mapped_buffer(uniforms).write(&[1u32, 2, 3, 4]).unwrap();
            });
        }
        let mut recorder = f.device.create_cmd_buffer().unwrap();
        graph.render(&mut recorder, None).unwrap();

        let barriers = buffer_barriers(recorder.commands());
        assert_eq!(barriers.len(), 1);
        assert_eq!(barriers[0].src_stage, PipelineStage::TRANSFER);
        assert_eq!(barriers[0].dst_stage, PipelineStage::VERTEX_SHADER);
        let desc = f.backend.buffer_desc(barriers[0].buffer).unwrap();
        assert_eq!(desc.memory_type, MemoryType::DeviceLocal);
        assert_eq!(desc.usage, BufferUsage::TRANSFER_DST | BufferUsage::UNIFORM);

        let submissions = f.backend.submissions();
        assert_eq!(submissions.len(), 1);
        let Command::CopyBuffer { src, dst, size, .. } = submissions[0].commands[0] else {
            panic!("upload doesn't start with a buffer copy");
        };
        assert_eq!(dst, barriers[0].buffer);
        assert_eq!(size, 16);
        let staging = f.backend.buffer_contents(src).unwrap();
        assert_eq!(&staging[..16], bytemuck::cast_slice::<u32, u8>(&[1, 2, 3, 4]));
    }

    #[test]
    fn test_frame_without_mapped_buffers_submits_nothing() {
        let f = fixture();
        let mut graph = FrameGraph::new(f.pool.clone());
        graph.add_compute_pass("empty");
        let mut recorder = f.device.create_cmd_buffer().unwrap();
        graph.render(&mut recorder, None).unwrap();
        assert!(f.backend.submissions().is_empty());
    }

    #[test]
    fn test_buffers_are_allocated_in_first_use_order() {
        let f = fixture();
        let handles = RefCell::new(Vec::new());
        let mut graph = FrameGraph::new(f.pool.clone());
        let late = graph.declare_buffer(256);
        let early = graph.declare_buffer(512);
        graph.add_compute_pass("fill early").add_storage_buffer_output(early);
        {
            let mut pass = graph.add_compute_pass("fill late");
            pass.add_storage_buffer_input(early);
            pass.add_storage_buffer_output(late);
            let handles = &handles;
            pass.set_render_func(move |_recorder, ctx| {
                handles.borrow_mut().push(ctx.buffer(early).handle());
                handles.borrow_mut().push(ctx.buffer(late).handle());
            });
        }
        graph.add_compute_pass("read late").add_storage_buffer_input(late);

        let mut recorder = f.device.create_cmd_buffer().unwrap();
        graph.render(&mut recorder, None).unwrap();
        let handles = handles.into_inner();
        assert_eq!(handles.len(), 2);
        assert!(handles[0] < handles[1]);
    }

    #[test]
    fn test_failed_upload_keeps_resources_with_recorder() {
        let f = fixture();
        let mut graph = FrameGraph::new(f.pool.clone());
        let image = graph.declare_image(TextureFormat::Rgba8Unorm, SIZE);
        let constants = graph.declare_typed_buffer::<u32>(4);
        {
            let mut pass = graph.add_pass("draw");
            pass.map_buffer(constants);
            pass.add_uniform_buffer_input(constants, PipelineStage::VERTEX_SHADER);
            pass.add_color_output(image);
        }

        f.backend.reject_submissions(true);
        let mut recorder = f.device.create_cmd_buffer().unwrap();
        assert!(matches!(
            graph.render(&mut recorder, None),
            Err(GraphicsError::SubmissionFailed(_))
        ));
        f.device.lifetime().collect();
        assert_eq!(f.pool.cached_images(), 0);
        assert_eq!(f.pool.cached_buffers(), 0);

        f.backend.reject_submissions(false);
        f.device.submit(recorder).unwrap();
        f.device.wait_idle();
        assert_eq!(f.pool.cached_images(), 1);
        assert_eq!(f.pool.cached_buffers(), 1);
    }

    #[test]
    fn test_unused_resources_get_default_usage() {
        let f = fixture();
        let mut graph = FrameGraph::new(f.pool.clone());
        graph.declare_image(TextureFormat::Rgba8Unorm, SIZE);
        graph.declare_buffer(64);
        let mut recorder = f.device.create_cmd_buffer().unwrap();
        graph.render(&mut recorder, None).unwrap();
        f.device.submit(recorder).unwrap();

        assert_eq!(f.pool.cached_images(), 1);
        assert_eq!(f.pool.cached_buffers(), 1);
        f.pool
            .create_image(TextureFormat::Rgba8Unorm, Extent2d::from(SIZE), ImageUsage::TEXTURE)
            .unwrap();
        f.pool
            .create_buffer(64, BufferUsage::STORAGE, MemoryType::DontCare)
            .unwrap();
        assert_eq!(f.backend.image_allocations(), 1);
        assert_eq!(f.backend.buffer_allocations(), 1);
    }

    #[test]
    fn test_resources_are_reused_next_frame() {
        let f = fixture();
        for _ in 0..3 {
            let mut graph = FrameGraph::new(f.pool.clone());
            let image = graph.declare_image(TextureFormat::Rgba8Unorm, SIZE);
            graph.add_pass("draw").add_color_output(image);
            graph
                .add_pass("post")
                .add_uniform_input(image, PipelineStage::FRAGMENT_SHADER);
            let mut recorder = f.device.create_cmd_buffer().unwrap();
            graph.render(&mut recorder, None).unwrap();
            f.device.submit(recorder).unwrap();
        }
        assert_eq!(f.backend.image_allocations(), 1);
    }

    #[test]
    #[should_panic(expected = "Image size is zero")]
    fn test_zero_sized_image_panics() {
        let f = fixture();
        let mut graph = FrameGraph::new(f.pool.clone());
        graph.declare_image(TextureFormat::Rgba8Unorm, (0, 16));
    }

    #[test]
    #[should_panic(expected = "Buffer size is zero")]
    fn test_zero_sized_buffer_panics() {
        let f = fixture();
        let mut graph = FrameGraph::new(f.pool.clone());
        graph.declare_buffer(0);
    }

    #[test]
    #[should_panic(expected = "doesn't exist in this graph")]
    fn test_id_from_another_graph_panics() {
        let f = fixture();
        let mut other = FrameGraph::new(f.pool.clone());
        let foreign = other.declare_image(TextureFormat::Rgba8Unorm, SIZE);
        let mut graph = FrameGraph::new(f.pool.clone());
        graph.declare_image(TextureFormat::Rgba8Unorm, SIZE);
        graph.add_pass("draw").add_color_output(foreign);
    }

    #[test]
    #[should_panic(expected = "Pass already has a depth output")]
    fn test_second_depth_output_panics() {
        let f = fixture();
        let mut graph = FrameGraph::new(f.pool.clone());
        let a = graph.declare_image(TextureFormat::Depth32Float, SIZE);
        let b = graph.declare_image(TextureFormat::Depth32Float, SIZE);
        let mut pass = graph.add_pass("depth");
        pass.add_depth_output(a);
        pass.add_depth_output(b);
    }

    #[test]
    #[should_panic(expected = "differ in size")]
    fn test_mismatched_attachments_panic() {
        let f = fixture();
        let mut graph = FrameGraph::new(f.pool.clone());
        let color = graph.declare_image(TextureFormat::Rgba8Unorm, (64, 64));
        let depth = graph.declare_image(TextureFormat::Depth32Float, (32, 32));
        {
            let mut pass = graph.add_pass("draw");
            pass.add_color_output(color);
            pass.add_depth_output(depth);
        }
        let mut recorder = f.device.create_cmd_buffer().unwrap();
        let _ = graph.render(&mut recorder, None);
    }

    #[test]
    #[should_panic(expected = "has no attachments")]
    fn test_framebuffer_of_compute_pass_panics() {
        let f = fixture();
        let mut graph = FrameGraph::new(f.pool.clone());
        graph
            .add_compute_pass("compute")
            .set_render_func(|recorder, ctx| recorder.bind_framebuffer(ctx.framebuffer()));
        let mut recorder = f.device.create_cmd_buffer().unwrap();
        let _ = graph.render(&mut recorder, None);
    }

    #[test]
    #[should_panic(expected = "was not mapped by pass")]
    fn test_unmapped_buffer_access_panics() {
        let f = fixture();
        let mut graph = FrameGraph::new(f.pool.clone());
        let buffer = graph.declare_buffer(16);
        {
            let mut pass = graph.add_pass("upload");
            pass.map_buffer(buffer);
        }
        {
            let mut pass = graph.add_pass("other");
            pass.add_uniform_buffer_input(buffer, PipelineStage::FRAGMENT_SHADER);
            pass.set_render_func(move |_recorder, ctx| {
                let _ = ctx.mapped_buffer(buffer);
            });
        }
        let mut recorder = f.device.create_cmd_buffer().unwrap();
        let _ = graph.render(&mut recorder, None);
    }
}
