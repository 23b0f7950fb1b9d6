use std::sync::Arc;

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use redlilium_framegraph::backend::dummy::DummyBackend;
use redlilium_framegraph::{
    BufferUsage, DeviceParameters, Extent2d, FrameGraph, GraphicsDevice, ImageUsage, MemoryType,
    PipelineStage, ResourcePool, TextureFormat,
};

fn setup() -> (Arc<GraphicsDevice>, Arc<ResourcePool>) {
    let device = GraphicsDevice::with_backend(Arc::new(DummyBackend::new()), DeviceParameters::new());
    let pool = ResourcePool::new(device.clone());
    (device, pool)
}

/// Shadow, G-buffer, lighting and `post_passes` post-processing passes.
fn build_deferred(graph: &mut FrameGraph<'_>, post_passes: usize) {
    let size = (1280, 720);
    let shadow = graph.declare_image(TextureFormat::Depth32Float, (1024, 1024));
    let albedo = graph.declare_image(TextureFormat::Rgba8Unorm, size);
    let normal = graph.declare_image(TextureFormat::Rgba16Float, size);
    let depth = graph.declare_image(TextureFormat::Depth24PlusStencil8, size);
    let hdr = graph.declare_image(TextureFormat::Rgba16Float, size);
    let lights = graph.declare_buffer(64 * 1024);

    graph.add_pass("shadow").add_depth_output(shadow);
    {
        let mut pass = graph.add_pass("gbuffer");
        pass.add_color_output(albedo);
        pass.add_color_output(normal);
        pass.add_depth_output(depth);
    }
    {
        let mut pass = graph.add_compute_pass("cull lights");
        pass.add_uniform_input(depth);
        pass.add_storage_buffer_output(lights);
    }
    {
        let mut pass = graph.add_pass("lighting");
        pass.add_color_output(hdr);
        pass.add_uniform_input(shadow, PipelineStage::FRAGMENT_SHADER);
        pass.add_uniform_input(albedo, PipelineStage::FRAGMENT_SHADER);
        pass.add_uniform_input(normal, PipelineStage::FRAGMENT_SHADER);
        pass.add_storage_buffer_input(lights, PipelineStage::FRAGMENT_SHADER);
    }

    let mut current = hdr;
    for i in 0..post_passes {
        let mut pass = graph.add_compute_pass(format!("post {i}"));
        let next = pass.declare_copy(current);
        pass.add_storage_output(next);
        current = next;
    }
    graph
        .add_pass("present")
        .add_uniform_input(current, PipelineStage::FRAGMENT_SHADER);
}

// ---------------------------------------------------------------------------
// Frame graph construction
// ---------------------------------------------------------------------------

fn bench_graph_build(c: &mut Criterion) {
    let (_device, pool) = setup();
    c.bench_function("frame_graph_build_deferred_8_post", |b| {
        b.iter(|| {
            let mut graph = FrameGraph::new(pool.clone());
            build_deferred(&mut graph, 8);
            black_box(graph.pass_count());
        });
    });
}

// ---------------------------------------------------------------------------
// Full frames
// ---------------------------------------------------------------------------

fn bench_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_graph_render");
    for post_passes in [0, 8, 32] {
        let (device, pool) = setup();
        group.bench_function(format!("deferred_{post_passes}_post"), |b| {
            b.iter(|| {
                let mut graph = FrameGraph::new(pool.clone());
                build_deferred(&mut graph, post_passes);
                let mut recorder = device.create_cmd_buffer().unwrap();
                graph.render(&mut recorder, None).unwrap();
                black_box(device.submit(recorder).unwrap());
            });
        });
    }
    group.finish();
}

// ---------------------------------------------------------------------------
// Resource pool
// ---------------------------------------------------------------------------

fn bench_pool_churn(c: &mut Criterion) {
    let (_device, pool) = setup();
    let size = Extent2d::new(512, 512);
    c.bench_function("resource_pool_churn_16", |b| {
        b.iter(|| {
            let images: Vec<_> = (0..16)
                .map(|_| {
                    pool.create_image(TextureFormat::Rgba8Unorm, size, ImageUsage::TEXTURE)
                        .unwrap()
                })
                .collect();
            let buffers: Vec<_> = (0..16)
                .map(|i| {
                    pool.create_buffer(256 * (i + 1), BufferUsage::STORAGE, MemoryType::DontCare)
                        .unwrap()
                })
                .collect();
            for image in images {
                pool.release_image(image);
            }
            for buffer in buffers {
                pool.release_buffer(buffer);
            }
            black_box(pool.garbage_collect());
        });
    });
}

criterion_group!(benches, bench_graph_build, bench_render, bench_pool_churn);
criterion_main!(benches);
