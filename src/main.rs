// Textured quad renderer
//
// One window, one swapchain, one pre-recorded draw per swapchain image.
// The frame loop updates the camera uniform, acquires an image, submits
// the matching command buffer and presents, waiting the present queue
// idle so a single semaphore pair can be reused every frame. Resizes and
// out-of-date surfaces funnel into recreate_swapchain.

mod backend;
mod config;

use anyhow::{Context, Result};
use ash::vk;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};

use backend::buffer::DepthResource;
use backend::camera::Camera;
use backend::commands::{create_command_pool, record_command_buffers};
use backend::descriptor::{create_descriptor_set_layout, DescriptorResources};
use backend::geometry::QuadMesh;
use backend::pipeline::{create_framebuffers, create_graphics_pipeline, create_render_pass};
use backend::sync::FrameSync;
use backend::texture::Texture;
use backend::{ImageViewPool, Swapchain, VulkanDevice};
use config::Config;

/// Everything Vulkan-side. Swapchain-independent resources (mesh, texture,
/// camera, descriptors, semaphores) are created once; the swapchain and
/// its dependents are Option so recreation can tear them down before the
/// replacements exist.
struct VulkanState {
    device: Arc<VulkanDevice>,
    command_pool: vk::CommandPool,

    mesh: QuadMesh,
    texture: Texture,
    camera: Camera,
    descriptors: DescriptorResources,
    sync: FrameSync,

    swapchain: Option<Swapchain>,
    image_views: Option<ImageViewPool>,
    render_pass: vk::RenderPass,
    pipeline: vk::Pipeline,
    pipeline_layout: vk::PipelineLayout,
    depth: Option<DepthResource>,
    framebuffers: Vec<vk::Framebuffer>,
    command_buffers: Vec<vk::CommandBuffer>,

    vert_shader: PathBuf,
    frag_shader: PathBuf,
    clear_color: [f32; 4],

    window_size: (u32, u32),
    needs_recreate: bool,
}

impl VulkanState {
    fn new(window: &Window, config: &Config) -> Result<Self> {
        let display_handle = window.raw_display_handle();
        let window_handle = window.raw_window_handle();

        let device = VulkanDevice::new(
            &config.window.title,
            config.debug.validation,
            display_handle,
            window_handle,
        )?;

        let size = window.inner_size();
        let swapchain = Swapchain::new(device.clone(), size.width, size.height)?;
        let image_views = ImageViewPool::new(device.clone(), &swapchain)?;

        let render_pass = create_render_pass(&device, swapchain.format)?;
        let descriptor_layout = create_descriptor_set_layout(&device)?;
        let (pipeline, pipeline_layout) = create_graphics_pipeline(
            &device,
            render_pass,
            descriptor_layout,
            swapchain.extent,
            &config.render.vert_shader,
            &config.render.frag_shader,
        )?;

        let command_pool = create_command_pool(&device)?;
        let depth = DepthResource::new(&device, command_pool, swapchain.extent)?;
        let framebuffers = create_framebuffers(
            &device,
            &image_views.views,
            depth.view,
            render_pass,
            swapchain.extent,
        )?;

        let texture = Texture::load(&device, command_pool, &config.render.texture)?;
        let mesh = QuadMesh::new(&device, command_pool)?;

        let mut camera = Camera::new(&device, config.camera.mode)?;
        camera.set_extent(swapchain.extent.width, swapchain.extent.height);

        let descriptors = DescriptorResources::new(&device, descriptor_layout, &camera, &texture)?;

        let command_buffers = record_command_buffers(
            &device,
            command_pool,
            &framebuffers,
            render_pass,
            pipeline,
            pipeline_layout,
            &swapchain,
            &descriptors,
            &mesh,
            config.render.clear_color,
        )?;

        let sync = FrameSync::new(&device)?;

        log::info!("Vulkan initialized");

        Ok(Self {
            device,
            command_pool,
            mesh,
            texture,
            camera,
            descriptors,
            sync,
            swapchain: Some(swapchain),
            image_views: Some(image_views),
            render_pass,
            pipeline,
            pipeline_layout,
            depth: Some(depth),
            framebuffers,
            command_buffers,
            vert_shader: config.render.vert_shader.clone(),
            frag_shader: config.render.frag_shader.clone(),
            clear_color: config.render.clear_color,
            window_size: (size.width, size.height),
            needs_recreate: false,
        })
    }

    /// Tear down everything sized to the swapchain and rebuild it at the
    /// current window size. The descriptor set is untouched: the uniform
    /// buffer and texture it points at survive recreation.
    fn recreate_swapchain(&mut self) -> Result<()> {
        let (width, height) = self.window_size;
        if width == 0 || height == 0 {
            // Minimized; keep the old chain until the window has area again
            return Ok(());
        }

        log::info!("Recreating swapchain at {}x{}", width, height);

        self.device.wait_idle()?;

        if let Some(depth) = self.depth.take() {
            depth.destroy(&self.device.device);
        }
        unsafe {
            for framebuffer in self.framebuffers.drain(..) {
                self.device.device.destroy_framebuffer(framebuffer, None);
            }
            if !self.command_buffers.is_empty() {
                self.device
                    .device
                    .free_command_buffers(self.command_pool, &self.command_buffers);
                self.command_buffers.clear();
            }
            self.device.device.destroy_pipeline(self.pipeline, None);
            self.device
                .device
                .destroy_pipeline_layout(self.pipeline_layout, None);
            self.device.device.destroy_render_pass(self.render_pass, None);
        }
        // Null the raw handles so a failed rebuild cannot double-destroy
        // them in Drop
        self.pipeline = vk::Pipeline::null();
        self.pipeline_layout = vk::PipelineLayout::null();
        self.render_pass = vk::RenderPass::null();
        self.swapchain = None;
        self.image_views = None;

        let swapchain = Swapchain::new(self.device.clone(), width, height)?;
        let image_views = ImageViewPool::new(self.device.clone(), &swapchain)?;

        self.render_pass = create_render_pass(&self.device, swapchain.format)?;
        let (pipeline, pipeline_layout) = create_graphics_pipeline(
            &self.device,
            self.render_pass,
            self.descriptors.layout,
            swapchain.extent,
            &self.vert_shader,
            &self.frag_shader,
        )?;
        self.pipeline = pipeline;
        self.pipeline_layout = pipeline_layout;

        let depth = DepthResource::new(&self.device, self.command_pool, swapchain.extent)?;
        self.framebuffers = create_framebuffers(
            &self.device,
            &image_views.views,
            depth.view,
            self.render_pass,
            swapchain.extent,
        )?;
        self.command_buffers = record_command_buffers(
            &self.device,
            self.command_pool,
            &self.framebuffers,
            self.render_pass,
            self.pipeline,
            self.pipeline_layout,
            &swapchain,
            &self.descriptors,
            &self.mesh,
            self.clear_color,
        )?;

        self.camera
            .set_extent(swapchain.extent.width, swapchain.extent.height);

        self.depth = Some(depth);
        self.swapchain = Some(swapchain);
        self.image_views = Some(image_views);
        self.needs_recreate = false;

        Ok(())
    }

    /// Draw one frame. Returns true when the swapchain must be recreated
    /// before the next frame; any error is fatal.
    fn render_frame(&mut self, time: f32, offset_x: f32) -> Result<bool> {
        let extent = match &self.swapchain {
            Some(swapchain) => swapchain.extent,
            None => return Ok(false),
        };
        self.camera.set_extent(extent.width, extent.height);
        self.camera.update(&self.device, time, offset_x)?;

        let swapchain = match &self.swapchain {
            Some(swapchain) => swapchain,
            None => return Ok(false),
        };

        let (image_index, _) = match swapchain.acquire_next_image(self.sync.image_available)? {
            Some(acquired) => acquired,
            None => return Ok(true),
        };

        let wait_semaphores = [self.sync.image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [self.command_buffers[image_index as usize]];
        let signal_semaphores = [self.sync.render_finished];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device
                .device
                .queue_submit(
                    self.device.graphics_queue,
                    &[submit_info.build()],
                    vk::Fence::null(),
                )
                .context("Failed to submit draw command buffer")?;
        }

        let recreate =
            swapchain.present(self.device.present_queue, image_index, &signal_semaphores)?;

        // Frames are serialized here; reusing one semaphore pair is only
        // safe once the present queue has drained
        unsafe {
            self.device
                .device
                .queue_wait_idle(self.device.present_queue)
                .context("Failed to wait for present queue")?;
        }

        Ok(recreate)
    }
}

impl Drop for VulkanState {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            log::warn!("Device wait failed during teardown: {e}");
        }

        if let Some(depth) = self.depth.take() {
            depth.destroy(&self.device.device);
        }
        unsafe {
            for framebuffer in self.framebuffers.drain(..) {
                self.device.device.destroy_framebuffer(framebuffer, None);
            }
            if !self.command_buffers.is_empty() {
                self.device
                    .device
                    .free_command_buffers(self.command_pool, &self.command_buffers);
                self.command_buffers.clear();
            }
            self.device.device.destroy_pipeline(self.pipeline, None);
            self.device
                .device
                .destroy_pipeline_layout(self.pipeline_layout, None);
            self.device.device.destroy_render_pass(self.render_pass, None);
        }
        self.swapchain = None;
        self.image_views = None;

        self.descriptors.destroy(&self.device.device);
        self.camera.destroy(&self.device.device);
        self.mesh.destroy(&self.device.device);
        self.texture.destroy(&self.device.device);
        self.sync.destroy(&self.device.device);

        unsafe {
            self.device
                .device
                .destroy_command_pool(self.command_pool, None);
        }
        // The Arc<VulkanDevice> drops after this, releasing device,
        // surface and instance in order
    }
}

struct App {
    config: Config,
    start: Instant,
    // Key input accumulated since the last tick, consumed by the camera
    pan_offset: f32,
    window: Option<Arc<Window>>,
    vulkan: Option<VulkanState>,
    error: Option<anyhow::Error>,
}

impl App {
    fn new(config: Config) -> Self {
        Self {
            config,
            start: Instant::now(),
            pan_offset: 0.0,
            window: None,
            vulkan: None,
            error: None,
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let attrs = Window::default_attributes()
            .with_title(&self.config.window.title)
            .with_inner_size(PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ));

        let window = Arc::new(
            event_loop
                .create_window(attrs)
                .context("Failed to create window")?,
        );

        self.vulkan = Some(VulkanState::new(&window, &self.config)?);
        self.window = Some(window);

        Ok(())
    }

    fn tick(&mut self) -> Result<()> {
        let time = self.start.elapsed().as_secs_f32();
        let offset = std::mem::take(&mut self.pan_offset);

        let vulkan = match self.vulkan.as_mut() {
            Some(vulkan) => vulkan,
            None => return Ok(()),
        };

        if vulkan.window_size.0 == 0 || vulkan.window_size.1 == 0 {
            return Ok(());
        }

        if vulkan.needs_recreate {
            vulkan.recreate_swapchain()?;
        }

        // The pan step grows with elapsed time, matching the uniform
        // update contract this renderer ships with
        if vulkan.render_frame(time, offset * time)? {
            vulkan.recreate_swapchain()?;
        }

        // Crude pacing; keeps the loop from spinning flat out
        std::thread::sleep(Duration::from_millis(10));

        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("Fatal: {error:#}");
        self.error = Some(error);
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(e) = self.init(event_loop) {
            self.fail(event_loop, e);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(vulkan) = self.vulkan.as_mut() {
                    vulkan.window_size = (size.width, size.height);
                    vulkan.needs_recreate = true;
                }
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(code),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => match code {
                KeyCode::Escape => event_loop.exit(),
                KeyCode::ArrowLeft => self.pan_offset -= self.config.camera.pan_step,
                KeyCode::ArrowRight => self.pan_offset += self.config.camera.pan_step,
                _ => {}
            },
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.tick() {
                    self.fail(event_loop, e);
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::load();

    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop
        .run_app(&mut app)
        .context("Event loop terminated abnormally")?;

    match app.error.take() {
        Some(error) => Err(error),
        None => Ok(()),
    }
}
