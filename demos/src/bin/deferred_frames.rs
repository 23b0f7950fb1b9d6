//! # Deferred Frames Demo
//!
//! Drives a deferred-shading frame graph for a number of frames on the dummy
//! backend and logs what the graph scheduled.
//!
//! Each frame uploads camera constants, renders a shadow map and a G-buffer,
//! culls lights in a compute pass, resolves lighting and runs a chain of
//! post-processing copies that alias the lit image. Two frames are kept in
//! flight and GPU timings are printed once a frame's timestamps are ready.
//!
//! ```bash
//! RUST_LOG=info cargo run -p redlilium-framegraph-demos --bin deferred_frames -- 10
//! ```

use std::collections::VecDeque;

use redlilium_framegraph::{
    CmdTimingRecorder, DeviceParameters, FrameGraph, GraphicsDevice, GraphicsError, PipelineStage,
    ResourcePool, TextureFormat, WaitToken, frame_mark, profile_scope,
};

const DEFAULT_FRAMES: u32 = 8;
const FRAMES_IN_FLIGHT: usize = 2;
const RESOLUTION: (u32, u32) = (1920, 1080);
const POST_PASSES: usize = 3;

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct CameraUniforms {
    view_proj: [[f32; 4]; 4],
    position: [f32; 4],
    frame: u32,
    _padding: [u32; 3],
}

impl CameraUniforms {
    fn for_frame(frame: u32) -> Self {
        let mut view_proj = [[0.0; 4]; 4];
        for (i, row) in view_proj.iter_mut().enumerate() {
            row[i] = 1.0;
        }
        let angle = frame as f32 * 0.1;
        Self {
            view_proj,
            position: [angle.cos() * 8.0, 3.0, angle.sin() * 8.0, 1.0],
            frame,
            _padding: [0; 3],
        }
    }
}

struct InFlightFrame {
    token: WaitToken,
    timing: CmdTimingRecorder,
    index: u32,
}

fn build_frame(graph: &mut FrameGraph<'_>, frame: u32) {
    let camera = graph.declare_typed_buffer::<CameraUniforms>(1);
    let shadow = graph.declare_image(TextureFormat::Depth32Float, (2048, 2048));
    let albedo = graph.declare_image(TextureFormat::Rgba8UnormSrgb, RESOLUTION);
    let normal = graph.declare_image(TextureFormat::Rgba16Float, RESOLUTION);
    let depth = graph.declare_image(TextureFormat::Depth24PlusStencil8, RESOLUTION);
    let lit = graph.declare_image(TextureFormat::Rgba16Float, RESOLUTION);
    let light_list = graph.declare_buffer(256 * 1024);

    {
        let mut geometry = graph.region("geometry");
        {
            let mut pass = geometry.add_pass("shadow");
            pass.map_buffer(camera);
            pass.add_uniform_buffer_input(camera, PipelineStage::VERTEX_SHADER);
            pass.add_depth_output(shadow);
            pass.set_render_func(move |recorder, pass| {
                if let Err(err) = pass.mapped_buffer(camera).write(&[CameraUniforms::for_frame(frame)]) {
                    log::error!("Failed to write camera uniforms: {err}");
                }
                recorder.bind_framebuffer(pass.framebuffer());
                recorder.draw(36, 64);
            });
        }
        {
            let mut pass = geometry.add_pass("gbuffer");
            pass.add_uniform_buffer_input(camera, PipelineStage::VERTEX_SHADER);
            pass.add_color_output(albedo);
            pass.add_color_output(normal);
            pass.add_depth_output(depth);
            pass.set_render_func(|recorder, pass| {
                recorder.bind_framebuffer(pass.framebuffer());
                recorder.draw(36, 64);
            });
        }
    }

    {
        let mut pass = graph.add_compute_pass("cull lights");
        pass.add_uniform_input(depth);
        pass.add_storage_buffer_output(light_list);
        pass.set_render_func(|recorder, _pass| {
            recorder.dispatch([RESOLUTION.0.div_ceil(16), RESOLUTION.1.div_ceil(16), 1]);
        });
    }

    {
        let mut pass = graph.add_pass("lighting");
        pass.add_uniform_input(shadow, PipelineStage::FRAGMENT_SHADER);
        pass.add_uniform_input(albedo, PipelineStage::FRAGMENT_SHADER);
        pass.add_uniform_input(normal, PipelineStage::FRAGMENT_SHADER);
        pass.add_storage_buffer_input(light_list, PipelineStage::FRAGMENT_SHADER);
        pass.add_color_output(lit);
        pass.set_render_func(|recorder, pass| {
            recorder.bind_framebuffer(pass.framebuffer());
            recorder.draw(3, 1);
        });
    }

    let mut post = graph.region("post");
    let mut current = lit;
    for i in 0..POST_PASSES {
        let mut pass = post.add_compute_pass(format!("post {i}"));
        let next = pass.declare_copy(current);
        pass.add_storage_output(next);
        pass.set_render_func(|recorder, _pass| {
            recorder.dispatch([RESOLUTION.0.div_ceil(8), RESOLUTION.1.div_ceil(8), 1]);
        });
        current = next;
    }
    let mut pass = post.add_pass("present");
    pass.add_uniform_input(current, PipelineStage::FRAGMENT_SHADER);
    pass.set_render_func(|recorder, _pass| recorder.draw(3, 1));
}

fn report(frame: &mut InFlightFrame) -> Result<(), GraphicsError> {
    frame.token.wait();
    if let Some(zones) = frame.timing.resolve()? {
        log::info!("Frame {} GPU timings:", frame.index);
        for zone in zones {
            log::info!(
                "  {:indent$}{}: {:.1} us",
                "",
                zone.name,
                zone.duration_ns / 1000.0,
                indent = zone.depth as usize * 2
            );
        }
    }
    Ok(())
}

fn run(frames: u32) -> Result<(), GraphicsError> {
    redlilium_framegraph::init();

    let device = GraphicsDevice::new(DeviceParameters::new().with_label("deferred demo"))?;
    let pool = ResourcePool::new(device.clone());
    let mut in_flight: VecDeque<InFlightFrame> = VecDeque::new();

    for index in 0..frames {
        profile_scope!("frame");

        if in_flight.len() >= FRAMES_IN_FLIGHT
            && let Some(mut oldest) = in_flight.pop_front()
        {
            report(&mut oldest)?;
        }

        let mut timing = CmdTimingRecorder::new(&device, 32)?;
        let mut graph = FrameGraph::new(pool.clone());
        build_frame(&mut graph, index);
        log::debug!("Frame {index}: {} passes", graph.pass_count());

        let mut recorder = device.create_cmd_buffer()?;
        graph.render(&mut recorder, Some(&mut timing))?;
        let token = device.submit(recorder)?;
        in_flight.push_back(InFlightFrame {
            token,
            timing,
            index,
        });

        frame_mark!();
    }

    for mut frame in in_flight.drain(..) {
        report(&mut frame)?;
    }

    device.wait_idle();
    log::info!(
        "Rendered {frames} frames: {} images and {} buffers cached, {} command buffers created",
        pool.cached_images(),
        pool.cached_buffers(),
        device.cmd_pool().created_count()
    );
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let frames = match std::env::args().nth(1) {
        Some(arg) => match arg.parse() {
            Ok(frames) => frames,
            Err(err) => {
                log::error!("Invalid frame count '{arg}': {err}");
                std::process::exit(2);
            }
        },
        None => DEFAULT_FRAMES,
    };

    if let Err(err) = run(frames) {
        log::error!("Demo failed: {err}");
        std::process::exit(1);
    }
}
