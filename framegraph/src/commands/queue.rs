//! Submission queue.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::{GpuBackend, Submission};
use crate::device::GraphicsDevice;
use crate::error::GraphicsError;

use super::{CmdBufferRecorder, ResourceFence, TimelineFence};

/// The single in-order queue of a device.
pub struct CmdQueue {
    backend: Arc<dyn GpuBackend>,
    /// Last timeline value handed out. Held across the backend call so
    /// submissions reach the backend in timeline order.
    timeline: Mutex<u64>,
}

impl CmdQueue {
    pub(crate) fn new(backend: Arc<dyn GpuBackend>) -> Self {
        Self {
            backend,
            timeline: Mutex::new(0),
        }
    }

    /// Submit recorded commands.
    ///
    /// The command buffer is handed to the lifetime manager whether or not the
    /// backend accepted it.
    pub fn submit(&self, recorder: CmdBufferRecorder) -> Result<WaitToken, GraphicsError> {
        let device = Arc::clone(recorder.device());
        let (mut data, commands) = recorder.into_parts();
        let resource_fence = data.resource_fence();

        let result = {
            let mut timeline = self.timeline.lock();
            *timeline += 1;
            let value = TimelineFence(*timeline);
            log::trace!(
                "Submitting {} commands on {value} ({resource_fence})",
                commands.len()
            );
            self.backend
                .submit(&Submission {
                    command_buffer: data.handle(),
                    fence: data.fence(),
                    timeline: value,
                    commands: &commands,
                })
                .map(|()| value)
        };

        match result {
            Ok(timeline) => {
                device.lifetime().recycle(data);
                Ok(WaitToken {
                    device,
                    timeline,
                    resource_fence,
                })
            }
            Err(err) => {
                log::warn!("Submission of {resource_fence} failed: {err}");
                data.set_signaled();
                device.lifetime().recycle(data);
                Err(err)
            }
        }
    }

    /// Last timeline value handed out.
    pub fn last_submitted(&self) -> TimelineFence {
        TimelineFence(*self.timeline.lock())
    }
}

/// Completion token returned by [`CmdQueue::submit`].
pub struct WaitToken {
    device: Arc<GraphicsDevice>,
    timeline: TimelineFence,
    resource_fence: ResourceFence,
}

impl WaitToken {
    pub fn timeline(&self) -> TimelineFence {
        self.timeline
    }

    pub fn resource_fence(&self) -> ResourceFence {
        self.resource_fence
    }

    /// Non-blocking completion check.
    pub fn is_ready(&self) -> bool {
        let lifetime = self.device.lifetime();
        if !lifetime.is_complete(self.resource_fence) {
            lifetime.collect();
        }
        lifetime.is_complete(self.resource_fence)
    }

    /// Block until the submission completed. There is no timeout.
    pub fn wait(&self) {
        self.device.lifetime().wait_for(self.resource_fence);
    }
}

impl std::fmt::Debug for WaitToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaitToken")
            .field("timeline", &self.timeline)
            .field("resource_fence", &self.resource_fence)
            .finish()
    }
}
