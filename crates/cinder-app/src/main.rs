// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use anyhow::Result;
use clap::Parser;
use cinder_core::init_tracing;
use cinder_platform::{signal_for_occlusion, signal_for_resize, WindowSignal};
use cinder_render::{RenderSize, Renderer};
use cinder_render_vk::VkRenderer;
use tracing::{debug, error, info};

use cinder_platform::winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{ElementState, KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{Key, NamedKey},
    window::{Window, WindowId},
};

mod config;
mod control;

use config::{load_cfg, AppCfg, Args};
use control::{LoopControl, Tick};

struct App {
    cfg: AppCfg,
    // Field order: the renderer must go before the window it draws into.
    renderer: Option<VkRenderer>,
    window: Option<Window>,
    control: LoopControl,
    failure: Option<anyhow::Error>,
}

impl App {
    fn new(cfg: AppCfg) -> Self {
        let control = LoopControl::new(cfg.paused_sleep());
        App {
            cfg,
            renderer: None,
            window: None,
            control,
            failure: None,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        error!("{err:#}");
        self.failure = Some(err);
        self.shutdown(event_loop);
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        self.control.apply(WindowSignal::Quit);
        self.renderer = None;
        self.window = None;
        event_loop.exit();
    }

    fn create_window_and_renderer(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let want = self.cfg.window_size();
        let attrs = Window::default_attributes()
            .with_title(self.cfg.window.title.clone())
            .with_inner_size(PhysicalSize::new(want.width, want.height));
        let window = event_loop.create_window(attrs)?;

        let size = window.inner_size();
        let render_size = RenderSize {
            width: size.width.max(1),
            height: size.height.max(1),
        };

        let renderer = VkRenderer::new(&window, &window, render_size, self.cfg.render_settings())?;
        info!("window {}x{}", render_size.width, render_size.height);

        self.window = Some(window);
        self.renderer = Some(renderer);
        Ok(())
    }

    fn on_key(&mut self, event_loop: &ActiveEventLoop, event: KeyEvent) {
        if event.state != ElementState::Pressed || event.repeat {
            return;
        }
        match event.logical_key {
            Key::Named(NamedKey::Escape) => {
                info!("Escape pressed");
                self.shutdown(event_loop);
            }
            Key::Named(NamedKey::Space) => {
                let frame = self.renderer.as_ref().map_or(0, |r| r.frame_number());
                info!("space pressed at frame {frame}");
            }
            _ => {}
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            if let Err(e) = self.create_window_and_renderer(event_loop) {
                self.fail(event_loop, e.context("startup"));
                return;
            }
        }
        event_loop.set_control_flow(ControlFlow::Poll);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if let Some(window) = &self.window {
            if window_id != window.id() {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("CloseRequested");
                self.shutdown(event_loop);
            }

            WindowEvent::KeyboardInput { event, .. } => self.on_key(event_loop, event),

            WindowEvent::Resized(new_size) => {
                let signal = signal_for_resize(new_size);
                debug!("Resized → {}x{} ({:?})", new_size.width, new_size.height, signal);
                self.control.apply(signal);

                if let WindowSignal::Resized { width, height } = signal {
                    if let Some(renderer) = &mut self.renderer {
                        if let Err(e) = renderer.resize(RenderSize { width, height }) {
                            self.fail(event_loop, e);
                        }
                    }
                }
            }

            WindowEvent::Occluded(occluded) => {
                // Un-occluding a window that is still zero-sized keeps it paused.
                let zero_sized = self
                    .window
                    .as_ref()
                    .map(|w| w.inner_size())
                    .is_some_and(|s| s.width == 0 || s.height == 0);
                if !occluded && zero_sized {
                    return;
                }
                self.control.apply(signal_for_occlusion(occluded));
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };

        let now = std::time::Instant::now();
        match self.control.tick(now, || renderer.render()) {
            Ok(Tick::Paused { wake_at }) => {
                event_loop.set_control_flow(ControlFlow::WaitUntil(wake_at));
            }
            Ok(Tick::Drew(report)) => {
                if let Some(r) = report {
                    debug!(frame = r.frame, slot = r.slot, image = r.image_index, "presented");
                }
                event_loop.set_control_flow(ControlFlow::Poll);
            }
            Ok(Tick::Quit) => self.shutdown(event_loop),
            Err(e) => self.fail(event_loop, anyhow::Error::new(e).context("frame loop")),
        }
    }
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let mut cfg = load_cfg(&args.config);
    cfg.apply_args(&args);

    let event_loop: EventLoop<()> = EventLoop::new()?;
    let mut app = App::new(cfg);
    event_loop.run_app(&mut app)?;

    match app.failure.take() {
        Some(e) => Err(e),
        None => {
            info!("clean shutdown");
            Ok(())
        }
    }
}
