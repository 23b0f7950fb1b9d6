//! Common utilities for frame graph integration tests.
//!
//! Every test runs on the in-memory dummy backend. Tests that need to
//! observe work in flight use manual fences and complete submissions
//! explicitly.

use std::sync::Arc;

use redlilium_framegraph::backend::dummy::DummyBackend;
use redlilium_framegraph::{
    Command, DeviceParameters, FrameGraph, GraphicsDevice, ImageBarrier, ResourcePool, WaitToken,
};

/// How submissions complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fences {
    /// Submissions complete immediately.
    Automatic,
    /// Submissions complete when the test says so.
    Manual,
}

/// Device, pool and backend shared by a test.
pub struct TestContext {
    pub backend: Arc<DummyBackend>,
    pub device: Arc<GraphicsDevice>,
    pub pool: Arc<ResourcePool>,
}

impl TestContext {
    pub fn new(fences: Fences) -> Self {
        Self::with_parameters(fences, DeviceParameters::new())
    }

    pub fn with_parameters(fences: Fences, params: DeviceParameters) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();

        let backend = Arc::new(match fences {
            Fences::Automatic => DummyBackend::new(),
            Fences::Manual => DummyBackend::with_manual_fences(),
        });
        let device = GraphicsDevice::with_backend(backend.clone(), params);
        let pool = ResourcePool::new(device.clone());
        Self {
            backend,
            device,
            pool,
        }
    }

    /// Build a graph with `build`, render it and submit the result.
    pub fn render_frame<'a, F>(&self, build: F) -> WaitToken
    where
        F: FnOnce(&mut FrameGraph<'a>),
    {
        let mut graph = FrameGraph::new(self.pool.clone());
        build(&mut graph);
        let mut recorder = self
            .device
            .create_cmd_buffer()
            .expect("Failed to create command buffer");
        graph
            .render(&mut recorder, None)
            .expect("Failed to render frame graph");
        self.device.submit(recorder).expect("Failed to submit frame")
    }

    /// Commands of the most recent submission.
    pub fn last_commands(&self) -> Vec<Command> {
        self.backend
            .submissions()
            .pop()
            .map(|submission| submission.commands)
            .unwrap_or_default()
    }
}

/// Every image barrier in `commands`, in recording order.
pub fn image_barriers(commands: &[Command]) -> Vec<ImageBarrier> {
    commands
        .iter()
        .filter_map(|command| match command {
            Command::Barriers { images, .. } => Some(images.clone()),
            _ => None,
        })
        .flatten()
        .collect()
}
