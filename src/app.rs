//! Window, render loop and input.

use std::sync::Arc;
use winit::{
    application::ApplicationHandler,
    event::{ElementState, KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

use crate::capture::FrameSource;
use crate::config::SceneConfig;
use crate::error::SimulationError;
use crate::gesture::{Classifier, GestureIngestController};
use crate::gpu::GpuState;
use crate::scene::{status_line, Scene};
use crate::time::FrameClock;

const TITLE: &str = "Evergreen";

/// Application builder.
///
/// ```ignore
/// Evergreen::new(SceneConfig::default())
///     .with_classifier(classifier)
///     .with_frame_source(frames)
///     .run()?;
/// ```
pub struct Evergreen {
    config: SceneConfig,
    classifier: Option<Arc<dyn Classifier>>,
    frames: Option<Box<dyn FrameSource>>,
}

impl Evergreen {
    pub fn new(config: SceneConfig) -> Self {
        Self {
            config,
            classifier: None,
            frames: None,
        }
    }

    /// Gesture classifier. Gesture input needs a frame source as well.
    pub fn with_classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn with_frame_source<F: FrameSource + 'static>(mut self, frames: F) -> Self {
        self.frames = Some(Box::new(frames));
        self
    }

    /// Open the window and run until it is closed.
    pub fn run(self) -> Result<(), SimulationError> {
        let scene = Scene::new(self.config)?;

        let ingest = match (self.classifier, self.frames.is_some()) {
            (Some(classifier), true) => {
                let params = scene.config().ingest.params();
                Some(GestureIngestController::new(classifier, params))
            }
            (Some(_), false) => {
                tracing::warn!("classifier configured without a frame source; gesture input off");
                None
            }
            (None, _) => None,
        };

        let event_loop = EventLoop::new()?;
        event_loop.set_control_flow(ControlFlow::Poll);

        let mut app = App::new(scene, ingest, self.frames);
        event_loop.run_app(&mut app)?;

        match app.error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

struct App {
    window: Option<Arc<Window>>,
    gpu_state: Option<GpuState>,
    scene: Scene,
    clock: FrameClock,
    ingest: Option<GestureIngestController>,
    frames: Option<Box<dyn FrameSource>>,
    title: String,
    error: Option<SimulationError>,
}

impl App {
    fn new(scene: Scene, ingest: Option<GestureIngestController>, frames: Option<Box<dyn FrameSource>>) -> Self {
        let clock = FrameClock::new(scene.config().transition.max_delta);
        Self {
            window: None,
            gpu_state: None,
            scene,
            clock,
            ingest,
            frames,
            title: String::new(),
            error: None,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: SimulationError) {
        tracing::error!("{err}");
        self.error = Some(err);
        event_loop.exit();
    }

    fn handle_key(&mut self, event_loop: &ActiveEventLoop, event: &KeyEvent) {
        if event.state != ElementState::Pressed || event.repeat {
            return;
        }
        match event.physical_key {
            PhysicalKey::Code(KeyCode::Space) => {
                let state = self.scene.toggle_state();
                tracing::info!("tree {} (keyboard)", state.label());
            }
            PhysicalKey::Code(KeyCode::KeyR) => {
                if let Err(err) = self.scene.regenerate() {
                    self.fail(event_loop, err.into());
                }
            }
            PhysicalKey::Code(KeyCode::Escape) => event_loop.exit(),
            _ => {}
        }
    }

    /// Apply finished classifications, then offer the next frame.
    fn pump_gestures(&mut self) {
        let (Some(ingest), Some(frames)) = (self.ingest.as_mut(), self.frames.as_mut()) else {
            return;
        };
        let now = self.clock.session_time();
        for outcome in ingest.drain(now) {
            self.scene.apply(&outcome);
        }
        ingest.poll(now, &mut **frames);
    }

    fn update_title(&mut self) {
        let capture = match &self.ingest {
            Some(ingest) => ingest.status(),
            None => "Gesture input off",
        };
        let last = self.ingest.as_ref().and_then(|i| i.last_sample());
        let title = format!("{TITLE} - {}", status_line(capture, last, self.scene.state()));
        if title != self.title {
            if let Some(window) = &self.window {
                window.set_title(&title);
            }
            self.title = title;
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        let [width, height] = self.scene.config().window_size;
        let window_attrs = Window::default_attributes()
            .with_title(TITLE)
            .with_inner_size(winit::dpi::LogicalSize::new(width, height));

        let window = match event_loop.create_window(window_attrs) {
            Ok(window) => Arc::new(window),
            Err(err) => return self.fail(event_loop, err.into()),
        };
        self.window = Some(window.clone());

        match pollster::block_on(GpuState::new(window, &self.scene)) {
            Ok(gpu_state) => self.gpu_state = Some(gpu_state),
            Err(err) => return self.fail(event_loop, err.into()),
        }
        self.clock.reset();
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::Resized(physical_size) => {
                if let Some(gpu_state) = &mut self.gpu_state {
                    gpu_state.resize(physical_size);
                }
            }
            WindowEvent::KeyboardInput { event, .. } => self.handle_key(event_loop, &event),
            WindowEvent::RedrawRequested => {
                let (elapsed, dt) = self.clock.update();
                self.pump_gestures();
                self.scene.tick(dt, elapsed);

                if let Some(gpu_state) = &mut self.gpu_state {
                    match gpu_state.render(&mut self.scene) {
                        Ok(_) => {}
                        Err(wgpu::SurfaceError::Lost) => gpu_state.resize(winit::dpi::PhysicalSize {
                            width: gpu_state.config.width,
                            height: gpu_state.config.height,
                        }),
                        Err(wgpu::SurfaceError::OutOfMemory) => event_loop.exit(),
                        Err(e) => tracing::warn!("render error: {e:?}"),
                    }
                }
                self.update_title();
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            _ => {}
        }
    }
}
