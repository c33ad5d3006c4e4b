//! lumen - demo driver for the frame-execution core.
//!
//! The winit event loop owns the window on the main thread. Rendering runs
//! on a dedicated thread that owns the device and the renderer, and learns
//! about resizes and shutdown through the window's extent signal.
//!
//! Usage: `lumen [config.toml]`

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, error, info};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

use lumen_core::{FrameClock, RendererConfig};
use lumen_platform::{Window, WindowSurface};
use lumen_renderer::shaders::SpirvFrontEnd;
use lumen_renderer::{FrameStatus, Renderer};
use lumen_rhi::RhiError;
use lumen_rhi::device::Device;
use lumen_rhi::diagnostics::TracingSink;
use lumen_rhi::instance::{Instance, InstanceDesc};
use lumen_rhi::physical_device::select_physical_device;

/// How often the event loop checks whether the render thread has exited.
const RENDER_THREAD_POLL: Duration = Duration::from_millis(100);

/// Frames between FPS log lines.
const FPS_LOG_INTERVAL: u64 = 600;

struct App {
    config: RendererConfig,
    window: Option<Window>,
    render_thread: Option<JoinHandle<Result<()>>>,
}

impl App {
    fn new(config: RendererConfig) -> Self {
        Self {
            config,
            window: None,
            render_thread: None,
        }
    }

    fn start(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = Window::new(event_loop, &self.config.window)?;

        let instance = Arc::new(Instance::new(
            &InstanceDesc {
                app_name: &self.config.app_name,
                enable_validation: self.config.enable_validation,
                surface_extensions: window.required_extensions()?,
            },
            Arc::new(TracingSink),
        )?);
        let surface = Arc::new(window.create_surface(instance)?);

        let config = self.config.clone();
        let render_thread = thread::Builder::new()
            .name("render".to_string())
            .spawn(move || run_renderer(&config, surface))
            .context("Failed to spawn render thread")?;

        self.window = Some(window);
        self.render_thread = Some(render_thread);
        Ok(())
    }

    /// Close the window signal and wait for the render thread to finish.
    fn stop(&mut self) {
        if let Some(window) = &self.window {
            window.close();
        }
        if let Some(handle) = self.render_thread.take() {
            match handle.join() {
                Ok(Ok(())) => info!("Render thread finished"),
                Ok(Err(e)) => error!("Render thread failed: {e:#}"),
                Err(_) => error!("Render thread panicked"),
            }
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(e) = self.start(event_loop) {
            error!("Failed to start: {e:#}");
            event_loop.exit();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                self.stop();
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(window) = &self.window {
                    window.resize(size.width, size.height);
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let finished = self
            .render_thread
            .as_ref()
            .is_some_and(JoinHandle::is_finished);
        if finished {
            self.stop();
            event_loop.exit();
            return;
        }
        event_loop.set_control_flow(ControlFlow::WaitUntil(Instant::now() + RENDER_THREAD_POLL));
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.stop();
    }
}

/// Device bootstrap and the frame loop. Runs until the window closes or a
/// frame fails.
fn run_renderer(config: &RendererConfig, surface: Arc<WindowSurface>) -> Result<()> {
    let instance = surface.vulkan_surface().instance().clone();
    let physical_device = select_physical_device(
        instance.handle(),
        surface.vulkan_surface().handle(),
        surface.vulkan_surface().loader(),
    )?;
    let device = Device::new(instance, &physical_device)?;

    let front_end = SpirvFrontEnd::new(device.clone(), &config.shaders.directory);
    let mut renderer = Renderer::initialize(device.clone(), surface.clone(), config, &front_end)?;
    let signal = surface.extent_signal().clone();
    let mut clock = FrameClock::new();

    info!("Initialization complete, entering frame loop");

    while !signal.is_closed() {
        if let Some(extent) = signal.take_resize() {
            match renderer.notify_resized(extent) {
                Ok(()) => {}
                Err(RhiError::SurfaceClosed) => break,
                Err(e) => return Err(e.into()),
            }
        }

        let frame = clock.tick();
        match renderer.render_frame(frame.elapsed) {
            Ok(FrameStatus::Presented { .. }) => {}
            Ok(FrameStatus::Skipped(reason)) => debug!("Frame skipped: {reason:?}"),
            Err(RhiError::SurfaceClosed) => break,
            Err(e) => {
                error!("Frame {} failed: {e}", frame.frame_index);
                return Err(e.into());
            }
        }

        if frame.frame_index > 0 && frame.frame_index % FPS_LOG_INTERVAL == 0 {
            debug!("{:.1} fps", clock.fps());
        }
    }

    renderer.shutdown()?;
    Ok(())
}

fn main() -> Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => RendererConfig::load(&path)
            .with_context(|| format!("Failed to load configuration from {path}"))?,
        None => RendererConfig::default(),
    };

    match config.log_filter.as_deref() {
        Some(filter) => lumen_core::init_logging_with(filter),
        None => lumen_core::init_logging(),
    }
    info!("Starting {}", config.app_name);

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    Ok(())
}
