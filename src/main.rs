// =============================================================================
// MY-RHI DEMO - spinning triangle on the Vulkan backend
// =============================================================================
//
// ARCHITECTURE OVERVIEW:
// ┌─────────────────────────────────────────────────────────────────┐
// │  winit event loop (window, input, resize)                       │
// │    └── Renderer (3-slot frame rotation)                         │
// │          └── Device + SwapChain (handles into resource pools)   │
// │                └── VulkanBackend (ash + gpu-allocator)          │
// └─────────────────────────────────────────────────────────────────┘
//
// If the triangle shaders can't be compiled or loaded, the demo keeps
// running and only clears the screen.
//
// =============================================================================

use anyhow::{Context, Result};
use glam::Mat4;
use my_rhi::backend::VulkanBackend;
use my_rhi::renderer::BufferSource;
use my_rhi::rhi::*;
use my_rhi::shader::{ShaderCompiler, ShaderWatcher};
use my_rhi::{Config, DrawItem, FrameStatus, Renderer, RendererDesc};
use raw_window_handle::HasDisplayHandle;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Fullscreen, Window, WindowAttributes},
};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    // Load configuration from config.toml
    let config = Config::load();

    // Initialize logging
    init_logging(&config)?;
    log::info!("Starting my-rhi demo");
    log::info!(
        "Window: {}x{} ({})",
        config.window.width,
        config.window.height,
        if config.window.fullscreen { "fullscreen" } else { "windowed" }
    );
    log::info!("Present mode: {:?}", config.present_mode());

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;
    Ok(())
}

/// Initialize logging, optionally into the configured log file
fn init_logging(config: &Config) -> Result<()> {
    use env_logger::{Builder, Target};
    use log::LevelFilter;

    let mut builder = Builder::new();
    builder.filter_level(LevelFilter::Info);
    builder.parse_default_env();

    if config.debug.log_to_file {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&config.debug.log_file)
            .with_context(|| format!("Failed to open log file {:?}", config.debug.log_file))?;
        writeln!(file, "=== my-rhi log ===")?;
        writeln!(file, "Started: {:?}", std::time::SystemTime::now())?;
        writeln!(file)?;
        builder.target(Target::Pipe(Box::new(file)));
    }

    builder.init();
    Ok(())
}

// =============================================================================
// DEMO SCENE
// =============================================================================

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct Vertex {
    position: [f32; 2],
    color: [f32; 3],
}

const TRIANGLE: [Vertex; 3] = [
    Vertex {
        position: [0.0, -0.6],
        color: [1.0, 0.2, 0.2],
    },
    Vertex {
        position: [0.6, 0.5],
        color: [0.2, 1.0, 0.2],
    },
    Vertex {
        position: [-0.6, 0.5],
        color: [0.2, 0.4, 1.0],
    },
];

struct Scene {
    pipeline: PipelineHandle,
    vertices: BufferHandle,
}

impl Scene {
    fn create(renderer: &mut Renderer<VulkanBackend>, compiler: &ShaderCompiler) -> Result<Self> {
        let vertices = renderer.upload_static(bytemuck::cast_slice(&TRIANGLE), BufferUsage::VERTEX, "triangle")?;
        let pipeline = build_pipeline(renderer, compiler)?;
        Ok(Self { pipeline, vertices })
    }

    fn draw(&self, rotation: Mat4) -> DrawItem {
        DrawItem {
            vertex_buffer: Some(BufferSource::Static(self.vertices)),
            push_constants: bytemuck::bytes_of(&rotation).to_vec(),
            ..DrawItem::new(self.pipeline, TRIANGLE.len() as u32)
        }
    }
}

fn build_pipeline(renderer: &mut Renderer<VulkanBackend>, compiler: &ShaderCompiler) -> Result<PipelineHandle> {
    let vert = compiler.load("triangle.vert", "main")?;
    let frag = compiler.load("triangle.frag", "main")?;
    let color_format = renderer.swapchain().format();

    let device = renderer.device_mut();
    let vert = device.create_shader_module(&vert)?;
    let frag = match device.create_shader_module(&frag) {
        Ok(frag) => frag,
        Err(e) => {
            device.delete_shader_module(vert);
            return Err(e);
        }
    };

    let desc = GraphicsPipelineDesc {
        shaders: vec![vert, frag],
        vertex_layout: VertexLayout {
            bindings: vec![VertexBinding {
                binding: 0,
                stride: std::mem::size_of::<Vertex>() as u32,
                per_instance: false,
            }],
            attributes: vec![
                VertexAttribute {
                    location: 0,
                    binding: 0,
                    format: Format::R32G32Sfloat,
                    offset: 0,
                },
                VertexAttribute {
                    location: 1,
                    binding: 0,
                    format: Format::R32G32B32Sfloat,
                    offset: 8,
                },
            ],
        },
        color_formats: vec![color_format],
        push_constant_size: std::mem::size_of::<Mat4>() as u32,
        ..Default::default()
    };
    let pipeline = device.create_pipeline(&PipelineDesc::Graphics(desc));

    // Modules are only needed while the pipeline is built
    device.delete_shader_module(vert);
    device.delete_shader_module(frag);
    pipeline
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

pub struct App {
    config: Config,

    // ─────────────────────────────────────────────────────────────────────────
    // WINDOW
    // ─────────────────────────────────────────────────────────────────────────
    window: Option<Arc<Window>>,
    is_fullscreen: bool,

    // ─────────────────────────────────────────────────────────────────────────
    // RENDERING
    // ─────────────────────────────────────────────────────────────────────────
    renderer: Option<Renderer<VulkanBackend>>,
    scene: Option<Scene>,
    compiler: ShaderCompiler,
    watcher: Option<ShaderWatcher>,
    start_time: Instant,

    // ─────────────────────────────────────────────────────────────────────────
    // FPS TRACKING
    // ─────────────────────────────────────────────────────────────────────────
    frame_count: u32,
    last_fps_update: Instant,
    last_frame_time: Instant,
}

impl App {
    pub fn new(config: Config) -> Self {
        let is_fullscreen = config.window.fullscreen;
        let compiler = ShaderCompiler::new(config.shaders.compiler.clone(), config.shaders.directory.clone());
        let now = Instant::now();
        Self {
            config,
            window: None,
            is_fullscreen,
            renderer: None,
            scene: None,
            compiler,
            watcher: None,
            start_time: now,
            frame_count: 0,
            last_fps_update: now,
            last_frame_time: now,
        }
    }

    // =========================================================================
    // INITIALIZATION
    // =========================================================================

    fn init_renderer(&mut self, window: &Window) -> Result<()> {
        log::info!("Initializing renderer...");

        // ─────────────────────────────────────────────────────────────────────
        // STEP 1: Create the Vulkan backend and device
        // ─────────────────────────────────────────────────────────────────────
        let display = window.display_handle().context("Failed to get display handle")?.as_raw();
        let backend = VulkanBackend::new(&self.config.window.title, self.config.debug.validation_layers, Some(display))?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 2: Create surface (platform-specific window connection)
        // ─────────────────────────────────────────────────────────────────────
        let surface = backend.create_surface(window)?;
        let device = Device::new(backend, self.config.pools);

        // ─────────────────────────────────────────────────────────────────────
        // STEP 3: Swapchain and frame slots
        // ─────────────────────────────────────────────────────────────────────
        let size = window.inner_size();
        let desc = RendererDesc {
            swapchain: self.config.swapchain_desc(size.width, size.height),
            clear_color: self.config.graphics.clear_color,
        };
        let mut renderer = Renderer::new(device, surface, &desc)?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 4: Demo scene and shader hot reload
        // ─────────────────────────────────────────────────────────────────────
        match Scene::create(&mut renderer, &self.compiler) {
            Ok(scene) => self.scene = Some(scene),
            Err(e) => log::warn!("Triangle unavailable, clearing only: {:#}", e),
        }

        if self.config.shaders.hot_reload {
            match ShaderWatcher::new(self.compiler.directory()) {
                Ok(watcher) => self.watcher = Some(watcher),
                Err(e) => log::warn!("Shader hot reload disabled: {:#}", e),
            }
        }

        self.renderer = Some(renderer);
        log::info!("Renderer initialized successfully!");
        Ok(())
    }

    /// Rebuild the pipeline from changed shader sources
    fn reload_shaders(&mut self) {
        let Some(watcher) = self.watcher.as_ref() else {
            return;
        };
        let changed = watcher.changed_sources();
        if changed.is_empty() {
            return;
        }
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };
        log::info!("Shader sources changed: {:?}", changed);

        if let Err(e) = renderer.device().wait_idle() {
            log::error!("wait_idle failed before shader reload: {:?}", e);
            return;
        }
        match build_pipeline(renderer, &self.compiler) {
            Ok(pipeline) => match self.scene.as_mut() {
                Some(scene) => {
                    renderer.device_mut().delete_pipeline(scene.pipeline);
                    scene.pipeline = pipeline;
                }
                None => match renderer.upload_static(bytemuck::cast_slice(&TRIANGLE), BufferUsage::VERTEX, "triangle") {
                    Ok(vertices) => self.scene = Some(Scene { pipeline, vertices }),
                    Err(e) => {
                        renderer.device_mut().delete_pipeline(pipeline);
                        log::error!("Failed to upload triangle: {:#}", e);
                    }
                },
            },
            Err(e) => log::error!("Shader reload failed, keeping previous pipeline: {:#}", e),
        }
    }

    // =========================================================================
    // RENDER LOOP
    // =========================================================================

    /// Render a single frame. Returns whether an image was presented.
    pub fn render_frame(&mut self) -> Result<bool> {
        self.reload_shaders();

        let Some(renderer) = self.renderer.as_mut() else {
            return Ok(false);
        };

        let time = self.start_time.elapsed().as_secs_f32();
        renderer.set_time(time);
        if let Some(scene) = self.scene.as_ref() {
            renderer.set_draws(vec![scene.draw(Mat4::from_rotation_z(time))]);
        }

        match renderer.render_frame()? {
            FrameStatus::Presented { .. } => Ok(true),
            FrameStatus::Skipped => Ok(false),
            FrameStatus::Resized => {
                log::debug!("Swapchain out of date, rebuilding next frame");
                Ok(false)
            }
        }
    }

    // =========================================================================
    // FULLSCREEN TOGGLE
    // =========================================================================

    fn toggle_fullscreen(&mut self) {
        if let Some(ref window) = self.window {
            self.is_fullscreen = !self.is_fullscreen;

            if self.is_fullscreen {
                // Enter fullscreen (use current monitor)
                window.set_fullscreen(Some(Fullscreen::Borderless(None)));
                log::info!("Entered fullscreen mode");
            } else {
                window.set_fullscreen(None);
                log::info!("Exited fullscreen mode");
            }
        }
    }

    // =========================================================================
    // FPS TRACKING
    // =========================================================================

    pub fn update_fps(&mut self) {
        if !self.config.debug.show_fps {
            return;
        }

        let now = Instant::now();
        let frame_time = now.duration_since(self.last_frame_time).as_secs_f32();
        self.last_frame_time = now;
        self.frame_count += 1;

        // Update title every second
        if now.duration_since(self.last_fps_update).as_secs_f32() >= 1.0 {
            let elapsed = now.duration_since(self.last_fps_update).as_secs_f32();
            let fps = self.frame_count as f32 / elapsed;

            if let Some(ref window) = self.window {
                let mode = if self.is_fullscreen { "fullscreen" } else { "windowed" };
                window.set_title(&format!(
                    "{} - {:.0} FPS ({:.2}ms) [{}]",
                    self.config.window.title,
                    fps,
                    frame_time * 1000.0,
                    mode
                ));
            }

            self.frame_count = 0;
            self.last_fps_update = now;
        }
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    /// Called when the application is ready to create windows.
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        // Create window with settings from config
        let mut window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ));

        if self.config.window.fullscreen {
            window_attributes = window_attributes.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }

        let window = match event_loop.create_window(window_attributes) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                log::error!("Failed to create window: {:?}", e);
                event_loop.exit();
                return;
            }
        };

        if let Err(e) = self.init_renderer(&window) {
            log::error!("Failed to initialize renderer: {:?}", e);
            event_loop.exit();
            return;
        }

        self.window = Some(window);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: winit::window::WindowId, event: WindowEvent) {
        match event {
            // ─────────────────────────────────────────────────────────────────
            // CLOSE REQUEST
            // ─────────────────────────────────────────────────────────────────
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                event_loop.exit();
            }

            // ─────────────────────────────────────────────────────────────────
            // WINDOW RESIZED
            // ─────────────────────────────────────────────────────────────────
            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.resize(size.width, size.height);
                }
            }

            // ─────────────────────────────────────────────────────────────────
            // REDRAW REQUESTED
            // ─────────────────────────────────────────────────────────────────
            WindowEvent::RedrawRequested => match self.render_frame() {
                Ok(true) => self.update_fps(),
                Ok(false) => {}
                Err(e) => {
                    log::error!("Render error: {:?}", e);
                    event_loop.exit();
                }
            },

            // ─────────────────────────────────────────────────────────────────
            // KEYBOARD INPUT
            // ─────────────────────────────────────────────────────────────────
            WindowEvent::KeyboardInput { event, .. } => {
                use winit::keyboard::{KeyCode, PhysicalKey};

                if event.state.is_pressed() {
                    if let PhysicalKey::Code(key) = event.physical_key {
                        match key {
                            KeyCode::Escape => {
                                log::info!("ESC pressed, exiting...");
                                event_loop.exit();
                            }
                            KeyCode::F11 => self.toggle_fullscreen(),
                            _ => {}
                        }
                    }
                }
            }

            _ => {}
        }
    }

    /// Request continuous redraws
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}

// =============================================================================
// CLEANUP
// =============================================================================

impl Drop for App {
    fn drop(&mut self) {
        log::info!("Cleaning up renderer...");
        if let Some(renderer) = self.renderer.take() {
            // Dropping the device releases every pooled resource, then the
            // backend tears down the Vulkan device and instance
            drop(renderer.destroy());
        }
        self.watcher = None;
        log::info!("Cleanup complete");
    }
}
