// Frame loop on the headless backend: rotation, pacing, resize and uploads

use my_rhi::backend::headless::{BarrierEntry, HeadlessBackend, HeadlessCommand, HeadlessSurface};
use my_rhi::renderer::BufferSource;
use my_rhi::rhi::*;
use my_rhi::{DrawItem, FrameStatus, Renderer, RendererDesc, FRAME_ROTATION};

fn renderer(image_count: u32) -> Renderer<HeadlessBackend> {
    let device = Device::new(HeadlessBackend::new(), PoolCapacities::uniform(64));
    let desc = RendererDesc {
        swapchain: SwapChainDesc {
            extent: Extent2D::new(1280, 720),
            image_count,
            format: Format::B8G8R8A8Srgb,
            present_mode: PresentMode::Fifo,
        },
        clear_color: [0.1, 0.2, 0.8, 1.0],
    };
    Renderer::new(device, HeadlessSurface::new(), &desc).unwrap()
}

fn commands(renderer: &Renderer<HeadlessBackend>, slot: usize) -> Vec<HeadlessCommand> {
    renderer.frame_commands(slot).raw().commands().to_vec()
}

#[test]
fn two_image_swapchain_over_three_frames() {
    let mut renderer = renderer(2);
    assert_eq!(renderer.swapchain().image_count(), 2);

    let mut indices = Vec::new();
    for frame in 1..=3u64 {
        let before = renderer.device().backend().stats();
        match renderer.render_frame().unwrap() {
            FrameStatus::Presented { image_index } => indices.push(image_index),
            status => panic!("frame {} not presented: {:?}", frame, status),
        }
        let after = renderer.device().backend().stats();
        assert!(after.fence_waits - before.fence_waits <= 1);
        assert_eq!(after.submissions, frame);
        assert_eq!(after.presents, frame);
    }
    assert_eq!(indices, vec![0, 1, 0]);

    // Nothing to render: clear between the two swapchain transitions
    let recorded = commands(&renderer, 0);
    assert!(matches!(
        recorded.as_slice(),
        [
            HeadlessCommand::Barrier(_),
            HeadlessCommand::ClearColor {
                layout: ImageLayout::TransferDst,
                ..
            },
            HeadlessCommand::Barrier(_),
        ]
    ));

    drop(renderer.destroy());
}

#[test]
fn pacing_stays_balanced_across_many_frames() {
    let mut renderer = renderer(3);
    let frames = 3 * FRAME_ROTATION as u64 + 1;
    for _ in 0..frames {
        renderer.render_frame().unwrap();
        assert!(renderer.pacing().is_balanced());
    }

    let pacing = *renderer.pacing();
    assert_eq!(pacing.total_submits(), frames);
    // The first use of each slot has nothing to wait for
    assert_eq!(pacing.total_fence_waits(), frames - FRAME_ROTATION as u64);
    assert_eq!(pacing.submits, [4, 3, 3]);
    assert_eq!(pacing.fence_waits, [3, 2, 2]);
    assert_eq!(renderer.device().backend().stats().fence_waits, pacing.total_fence_waits());

    assert_eq!(renderer.timeline_value(), frames);
    assert_eq!(renderer.completed_timeline_value().unwrap(), frames);
    assert_eq!(renderer.frame_index(), (frames % FRAME_ROTATION as u64) as usize);

    drop(renderer.destroy());
}

#[test]
fn resize_rebuilds_and_zero_size_skips() {
    let mut renderer = renderer(2);
    renderer.render_frame().unwrap();

    renderer.resize(800, 600);
    assert!(renderer.swapchain().is_resized());
    assert!(matches!(renderer.render_frame().unwrap(), FrameStatus::Presented { .. }));
    assert_eq!(renderer.swapchain().extent(), Extent2D::new(800, 600));
    assert!(!renderer.swapchain().is_resized());

    renderer.resize(0, 0);
    assert!(renderer.is_minimized());
    let submissions = renderer.device().backend().stats().submissions;
    assert_eq!(renderer.render_frame().unwrap(), FrameStatus::Skipped);
    assert_eq!(renderer.device().backend().stats().submissions, submissions);

    renderer.resize(640, 480);
    assert!(matches!(renderer.render_frame().unwrap(), FrameStatus::Presented { .. }));
    assert_eq!(renderer.swapchain().extent(), Extent2D::new(640, 480));

    drop(renderer.destroy());
}

#[test]
fn out_of_date_swapchain_recovers_next_frame() {
    let mut renderer = renderer(2);
    renderer.render_frame().unwrap();

    renderer.device().backend().invalidate_swapchains();
    assert_eq!(renderer.render_frame().unwrap(), FrameStatus::Resized);
    assert!(renderer.swapchain().is_resized());

    assert_eq!(
        renderer.render_frame().unwrap(),
        FrameStatus::Presented { image_index: 0 }
    );
    assert!(renderer.pacing().is_balanced());

    drop(renderer.destroy());
}

#[test]
fn suboptimal_swapchain_presents_then_rebuilds() {
    let mut renderer = renderer(2);
    renderer.render_frame().unwrap();

    renderer.device().backend().mark_swapchains_suboptimal();
    assert_eq!(
        renderer.render_frame().unwrap(),
        FrameStatus::Presented { image_index: 1 }
    );
    assert!(renderer.swapchain().is_resized());
    assert_eq!(renderer.device().backend().stats().presents, 2);

    // Rebuilt before acquiring, so the fresh chain starts over
    assert_eq!(
        renderer.render_frame().unwrap(),
        FrameStatus::Presented { image_index: 0 }
    );
    assert!(!renderer.swapchain().is_resized());
    assert!(renderer.pacing().is_balanced());

    drop(renderer.destroy());
}

#[test]
fn static_upload_is_copied_once_and_staging_retired() {
    let mut renderer = renderer(2);
    let vertices: [f32; 6] = [0.0, -0.5, 0.5, 0.5, -0.5, 0.5];
    let buffer = renderer
        .upload_static(bytemuck::cast_slice(&vertices), BufferUsage::VERTEX, "vertices")
        .unwrap();
    assert_eq!(renderer.device().buffer(buffer).size(), 24);

    renderer.render_frame().unwrap();
    assert_eq!(renderer.staging_in_flight(), 1);

    let recorded = commands(&renderer, 0);
    let HeadlessCommand::CopyBuffer { regions, .. } = &recorded[0] else {
        panic!("expected the upload copy first, got {:?}", recorded[0]);
    };
    assert_eq!(regions[0].size, 24);
    let HeadlessCommand::Barrier(entries) = &recorded[1] else {
        panic!("expected the upload barrier, got {:?}", recorded[1]);
    };
    assert_eq!(entries.len(), 1);
    assert!(matches!(entries[0], BarrierEntry::Buffer { .. }));

    // The first frame's timeline value has been reached by the time the next
    // frame starts
    renderer.render_frame().unwrap();
    assert_eq!(renderer.staging_in_flight(), 0);
    assert!(!commands(&renderer, 1)
        .iter()
        .any(|c| matches!(c, HeadlessCommand::CopyBuffer { .. })));

    drop(renderer.destroy());
}

#[test]
fn draws_render_inside_a_rendering_scope() {
    let mut renderer = renderer(2);
    let format = renderer.swapchain().format();

    let device = renderer.device_mut();
    let vert = device
        .create_shader_module(&ShaderModuleDesc {
            code: vec![0x0723_0203],
            entry_point: "main".to_string(),
            stage: ShaderStages::VERTEX,
        })
        .unwrap();
    let pipeline = device
        .create_pipeline(&PipelineDesc::Graphics(GraphicsPipelineDesc {
            shaders: vec![vert],
            color_formats: vec![format],
            ..Default::default()
        }))
        .unwrap();

    let instances = renderer
        .create_dynamic_buffer(64, BufferUsage::VERTEX, "instances")
        .unwrap();
    renderer.write_dynamic(instances, &[1u8; 32]).unwrap();
    assert!(renderer.write_dynamic(instances, &[0u8; 65]).is_err());

    renderer.set_draws(vec![DrawItem {
        vertex_buffer: Some(BufferSource::Dynamic(instances)),
        ..DrawItem::new(pipeline, 3)
    }]);
    renderer.render_frame().unwrap();

    let recorded = commands(&renderer, 0);
    let begin = recorded
        .iter()
        .position(|c| matches!(c, HeadlessCommand::BeginRendering { .. }))
        .unwrap();
    let draw = recorded
        .iter()
        .position(|c| {
            *c == HeadlessCommand::Draw {
                vertex_count: 3,
                instance_count: 1,
            }
        })
        .unwrap();
    let end = recorded
        .iter()
        .position(|c| *c == HeadlessCommand::EndRendering)
        .unwrap();
    assert!(begin < draw && draw < end);

    // Host writes and the swapchain transition share one barrier call
    let HeadlessCommand::Barrier(entries) = &recorded[0] else {
        panic!("expected a barrier first, got {:?}", recorded[0]);
    };
    assert!(entries.contains(&BarrierEntry::Memory));
    assert!(entries.iter().any(|e| matches!(
        e,
        BarrierEntry::Image {
            old: ImageLayout::Undefined,
            new: ImageLayout::ColorAttachment,
            ..
        }
    )));

    // Each slot reads its own copy
    let copies = renderer.dynamic_buffers(instances);
    assert_ne!(copies[0], copies[1]);
    assert_eq!(renderer.dynamic_buffer(instances), copies[1]);

    drop(renderer.destroy());
}

#[test]
fn push_constants_name_the_pipeline_stages() {
    let mut renderer = renderer(2);
    let format = renderer.swapchain().format();

    let device = renderer.device_mut();
    let vert = device
        .create_shader_module(&ShaderModuleDesc {
            code: vec![0x0723_0203],
            entry_point: "main".to_string(),
            stage: ShaderStages::VERTEX,
        })
        .unwrap();
    let pipeline = device
        .create_pipeline(&PipelineDesc::Graphics(GraphicsPipelineDesc {
            shaders: vec![vert],
            color_formats: vec![format],
            push_constant_size: 64,
            ..Default::default()
        }))
        .unwrap();
    // Modules may go away once the pipeline exists
    device.delete_shader_module(vert);

    renderer.set_draws(vec![DrawItem {
        push_constants: vec![0u8; 64],
        ..DrawItem::new(pipeline, 3)
    }]);
    renderer.render_frame().unwrap();

    let pushes: Vec<_> = commands(&renderer, 0)
        .into_iter()
        .filter(|c| matches!(c, HeadlessCommand::PushConstants { .. }))
        .collect();
    assert_eq!(
        pushes,
        vec![HeadlessCommand::PushConstants {
            stages: ShaderStages::VERTEX,
            offset: 0,
            size: 64,
        }]
    );

    drop(renderer.destroy());
}
