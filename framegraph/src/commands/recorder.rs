//! Command recording.

use std::any::Any;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crate::backend::{BufferHandle, QueryPoolHandle};
use crate::device::GraphicsDevice;
use crate::resources::{Framebuffer, TransientImage};
use crate::timing::CmdTimingRecorder;

use super::{BufferBarrier, CmdBufferData, Command, ImageBarrier, ResourceFence};

/// Default debug label color.
pub const DEFAULT_REGION_COLOR: [f32; 4] = [1.0, 1.0, 1.0, 1.0];

/// Records commands into a command buffer.
///
/// Submit it with [`GraphicsDevice::submit`]. A recorder dropped without
/// being submitted gives its command buffer back untouched.
pub struct CmdBufferRecorder {
    device: Arc<GraphicsDevice>,
    data: Option<CmdBufferData>,
    commands: Vec<Command>,
    region_depth: u32,
}

impl CmdBufferRecorder {
    pub(crate) fn new(device: Arc<GraphicsDevice>, data: CmdBufferData) -> Self {
        Self {
            device,
            data: Some(data),
            commands: Vec::new(),
            region_depth: 0,
        }
    }

    pub fn device(&self) -> &Arc<GraphicsDevice> {
        &self.device
    }

    /// Fence tagging the work recorded here.
    pub fn resource_fence(&self) -> ResourceFence {
        self.data().resource_fence()
    }

    /// Commands recorded so far.
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    fn data(&self) -> &CmdBufferData {
        match &self.data {
            Some(data) => data,
            None => unreachable!("recorder used after submission"),
        }
    }

    fn data_mut(&mut self) -> &mut CmdBufferData {
        match &mut self.data {
            Some(data) => data,
            None => unreachable!("recorder used after submission"),
        }
    }

    /// Record pipeline barriers. Nothing is recorded when both lists are empty.
    pub fn barriers(&mut self, buffers: &[BufferBarrier], images: &[ImageBarrier]) {
        if buffers.is_empty() && images.is_empty() {
            return;
        }
        self.commands.push(Command::Barriers {
            buffers: buffers.to_vec(),
            images: images.to_vec(),
        });
    }

    pub fn bind_framebuffer(&mut self, framebuffer: &Framebuffer) {
        self.commands
            .push(Command::BindFramebuffer(framebuffer.clone()));
    }

    pub fn draw(&mut self, vertex_count: u32, instance_count: u32) {
        self.commands.push(Command::Draw {
            vertex_count,
            instance_count,
        });
    }

    pub fn draw_indexed(&mut self, index_buffer: BufferHandle, index_count: u32, instance_count: u32) {
        self.commands.push(Command::DrawIndexed {
            index_buffer,
            index_count,
            instance_count,
        });
    }

    pub fn dispatch(&mut self, groups: [u32; 3]) {
        self.commands.push(Command::Dispatch { groups });
    }

    pub fn copy_buffer(
        &mut self,
        src: BufferHandle,
        src_offset: u64,
        dst: BufferHandle,
        dst_offset: u64,
        size: u64,
    ) {
        self.commands.push(Command::CopyBuffer {
            src,
            src_offset,
            dst,
            dst_offset,
            size,
        });
    }

    /// Copy `src` into `dst`. The backend performs the layout transitions
    /// both images need as part of the copy, so no barrier is recorded.
    ///
    /// # Panics
    ///
    /// Panics if the images differ in size.
    pub fn barriered_copy(&mut self, src: &TransientImage, dst: &TransientImage) {
        assert_eq!(src.size(), dst.size(), "Image copy between images of different sizes");
        self.commands.push(Command::CopyImage {
            src: src.handle(),
            dst: dst.handle(),
            size: src.size(),
        });
    }

    /// Keep `value` alive until the device finished executing this command
    /// buffer.
    pub fn keep_alive<T: Any + Send>(&mut self, value: T) {
        self.data_mut().keep_alive(value);
    }

    pub fn begin_region(&mut self, name: &str, color: [f32; 4]) {
        self.region_depth += 1;
        self.commands.push(Command::BeginRegion {
            name: name.to_string(),
            color,
        });
    }

    /// # Panics
    ///
    /// Panics if no region is open.
    pub fn end_region(&mut self) {
        assert!(self.region_depth > 0, "end_region without matching begin_region");
        self.region_depth -= 1;
        self.commands.push(Command::EndRegion);
    }

    /// Open a debug region closed when the returned guard is dropped. If a
    /// timing recorder is provided, the region is also timed on the GPU.
    pub fn region<'r>(
        &'r mut self,
        name: &str,
        mut timing: Option<&'r mut CmdTimingRecorder>,
        color: [f32; 4],
    ) -> CmdBufferRegion<'r> {
        self.begin_region(name, color);
        if let Some(timing) = timing.as_deref_mut() {
            timing.begin_zone(self, name);
        }
        CmdBufferRegion {
            recorder: self,
            timing,
        }
    }

    pub(crate) fn write_timestamp(&mut self, pool: QueryPoolHandle, index: u32) {
        self.commands.push(Command::WriteTimestamp { pool, index });
    }

    pub(crate) fn into_parts(mut self) -> (CmdBufferData, Vec<Command>) {
        debug_assert_eq!(self.region_depth, 0, "command buffer submitted with open regions");
        let commands = std::mem::take(&mut self.commands);
        match self.data.take() {
            Some(data) => (data, commands),
            None => unreachable!("recorder used after submission"),
        }
    }
}

impl Drop for CmdBufferRecorder {
    fn drop(&mut self) {
        if let Some(mut data) = self.data.take() {
            log::trace!("Dropping unsubmitted command buffer {:?}", data.handle());
            data.set_signaled();
            self.device.lifetime().recycle(data);
        }
    }
}

/// Scoped debug region on a [`CmdBufferRecorder`].
///
/// Dereferences to the recorder so commands can be recorded inside it.
pub struct CmdBufferRegion<'r> {
    recorder: &'r mut CmdBufferRecorder,
    timing: Option<&'r mut CmdTimingRecorder>,
}

impl Deref for CmdBufferRegion<'_> {
    type Target = CmdBufferRecorder;

    fn deref(&self) -> &CmdBufferRecorder {
        self.recorder
    }
}

impl DerefMut for CmdBufferRegion<'_> {
    fn deref_mut(&mut self) -> &mut CmdBufferRecorder {
        self.recorder
    }
}

impl Drop for CmdBufferRegion<'_> {
    fn drop(&mut self) {
        if let Some(timing) = self.timing.as_deref_mut() {
            timing.end_zone(self.recorder);
        }
        self.recorder.end_region();
    }
}
