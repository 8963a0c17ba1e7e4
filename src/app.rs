use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::ActiveEventLoop;
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

use crate::config::{
    CIRCLE_RADIUS_STEP, DISPLAY_HEIGHT, DISPLAY_PIXELS_PER_UNIT, DISPLAY_WIDTH,
    INITIAL_SCALE_FACTOR, KERNEL_SIZE_STEP, MAX_KERNEL_TAPS, MAX_SAMPLE_COUNT, MAX_SCALE_FACTOR,
    MAX_TRIANGLE_COUNT, MIN_SAMPLE_COUNT, MIN_SCALE_FACTOR, MIN_TRIANGLE_COUNT, PATTERN_COUNT,
    PERIMETER_ALPHA_STEP, SCALE_FACTOR_STEP, SIGMA_STEP, THRESHOLD_STEP,
};
use crate::gpu::{GpuContext, WgpuBackend};
use crate::pipeline::{Channel, PipelineController};
use crate::render::Extent;
use crate::simulation::{ParticleField, ParticleSource};

/// Application state
pub struct App {
    window: Option<Arc<Window>>,
    backend: Option<WgpuBackend>,
    controller: Option<PipelineController>,
    field: ParticleField,
    paused: bool,
    captures: u32,
    fps_counter: FpsCounter,
}

fn nudge(value: f32, delta: f32) -> f32 {
    (value + delta).clamp(0.0, 1.0)
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "ON"
    } else {
        "OFF"
    }
}

impl App {
    pub fn new() -> Self {
        Self {
            window: None,
            backend: None,
            controller: None,
            field: ParticleField::new_default(DISPLAY_PIXELS_PER_UNIT * INITIAL_SCALE_FACTOR),
            paused: false,
            captures: 0,
            fps_counter: FpsCounter::new(),
        }
    }

    fn init(&mut self, window: Arc<Window>) -> Result<(), Box<dyn std::error::Error>> {
        log::info!("Creating GPU context...");
        let gpu = pollster::block_on(GpuContext::new(window.clone()))?;

        log::info!("Building programs...");
        let mut backend = WgpuBackend::new(gpu)?;

        let display = Extent::new(DISPLAY_WIDTH, DISPLAY_HEIGHT);
        let mut controller = PipelineController::new(&mut backend, display, INITIAL_SCALE_FACTOR)?;

        let size = window.inner_size();
        controller.set_display_size(
            &mut backend,
            &mut self.field,
            Extent::new(size.width, size.height),
        );

        self.window = Some(window);
        self.backend = Some(backend);
        self.controller = Some(controller);
        Ok(())
    }

    fn render(&mut self) {
        let (Some(backend), Some(controller)) = (self.backend.as_mut(), self.controller.as_mut())
        else {
            return;
        };

        if !self.paused {
            self.field.step();
        }

        if let Err(e) = controller.render_frame(backend, &self.field) {
            log::error!("Frame failed: {}", e);
        }

        // Update and display FPS
        if let Some(fps) = self.fps_counter.tick() {
            if let Some(window) = &self.window {
                let channel = Channel::from_selector(controller.config.output_channel)
                    .map(|c| c.label())
                    .unwrap_or("?");
                window.set_title(&format!(
                    "Fluid Composite - {:.0} FPS - {} - scale {:.2}{}",
                    fps,
                    channel,
                    controller.scale_factor(),
                    if self.paused { " [Paused]" } else { "" }
                ));
            }
        }
    }

    fn handle_key(&mut self, key_code: KeyCode) {
        let (Some(backend), Some(controller)) = (self.backend.as_mut(), self.controller.as_mut())
        else {
            return;
        };

        match key_code {
            KeyCode::Space => {
                self.paused = !self.paused;
                log::info!("Simulation {}", if self.paused { "paused" } else { "resumed" });
            }

            // Output channel
            KeyCode::Digit1 | KeyCode::Digit2 => {
                let channel = if key_code == KeyCode::Digit1 {
                    Channel::Body
                } else {
                    Channel::Pattern
                };
                controller.config.output_channel = channel.selector();
                log::info!("Showing {} channel", channel.label());
            }

            // Stage toggles
            KeyCode::KeyG => {
                let toggles = controller.config.toggles_mut(Channel::Body);
                toggles.draw = !toggles.draw;
                log::info!("Body draw: {}", on_off(toggles.draw));
            }
            KeyCode::KeyU => {
                let toggles = controller.config.toggles_mut(Channel::Pattern);
                toggles.draw = !toggles.draw;
                log::info!("Pattern draw: {}", on_off(toggles.draw));
            }
            KeyCode::KeyB => {
                let enabled = !controller.config.body.blur;
                controller.config.body.blur = enabled;
                controller.config.pattern.blur = enabled;
                log::info!("Blur: {}", on_off(enabled));
            }
            KeyCode::KeyT => {
                controller.config.threshold = !controller.config.threshold;
                log::info!("Threshold: {}", on_off(controller.config.threshold));
            }

            // Kernel
            KeyCode::BracketLeft | KeyCode::BracketRight => {
                let delta = if key_code == KeyCode::BracketLeft {
                    -SIGMA_STEP
                } else {
                    SIGMA_STEP
                };
                controller.kernel.sigma = (controller.kernel.sigma + delta).max(SIGMA_STEP);
                log::info!("Sigma: {:.1}", controller.kernel.sigma);
            }
            KeyCode::Semicolon => {
                controller.kernel.kernel_size =
                    controller.kernel.kernel_size.saturating_sub(KERNEL_SIZE_STEP).max(1);
                log::info!("Kernel size: {}", controller.kernel.kernel_size);
            }
            KeyCode::Quote => {
                controller.kernel.kernel_size =
                    (controller.kernel.kernel_size + KERNEL_SIZE_STEP).min(MAX_KERNEL_TAPS);
                log::info!("Kernel size: {}", controller.kernel.kernel_size);
            }
            KeyCode::KeyJ => {
                controller.kernel.sample_count =
                    (controller.kernel.sample_count / 2).max(MIN_SAMPLE_COUNT);
                log::info!("Kernel samples: {}", controller.kernel.sample_count);
            }
            KeyCode::KeyI => {
                controller.kernel.sample_count =
                    (controller.kernel.sample_count * 2).min(MAX_SAMPLE_COUNT);
                log::info!("Kernel samples: {}", controller.kernel.sample_count);
            }

            // Compute resolution
            KeyCode::Minus | KeyCode::Equal => {
                let step = if key_code == KeyCode::Minus {
                    -SCALE_FACTOR_STEP
                } else {
                    SCALE_FACTOR_STEP
                };
                let scale =
                    (controller.scale_factor() + step).clamp(MIN_SCALE_FACTOR, MAX_SCALE_FACTOR);
                match controller.set_scale_factor(backend, &mut self.field, scale) {
                    Ok(()) => log::info!("Scale factor: {:.2}", controller.scale_factor()),
                    Err(e) => log::error!("Scale change rejected: {}", e),
                }
            }

            // Thresholds
            KeyCode::KeyZ | KeyCode::KeyX | KeyCode::KeyC | KeyCode::KeyV | KeyCode::KeyN
            | KeyCode::KeyM => {
                let t = &mut controller.threshold;
                let (value, delta) = match key_code {
                    KeyCode::KeyZ => (&mut t.surface_threshold, -THRESHOLD_STEP),
                    KeyCode::KeyX => (&mut t.surface_threshold, THRESHOLD_STEP),
                    KeyCode::KeyC => (&mut t.content_threshold, -THRESHOLD_STEP),
                    KeyCode::KeyV => (&mut t.content_threshold, THRESHOLD_STEP),
                    KeyCode::KeyN => (&mut t.uv_threshold, -THRESHOLD_STEP),
                    _ => (&mut t.uv_threshold, THRESHOLD_STEP),
                };
                *value = nudge(*value, delta);
                log::info!(
                    "Thresholds: surface {:.2} content {:.2} uv {:.2}",
                    t.surface_threshold,
                    t.content_threshold,
                    t.uv_threshold
                );
            }
            KeyCode::KeyP => {
                controller.threshold.pattern_index =
                    (controller.threshold.pattern_index + 1) % PATTERN_COUNT;
                log::info!("Pattern: {}", controller.threshold.pattern_index);
            }

            // Glyph geometry
            KeyCode::KeyO | KeyCode::KeyL => {
                let delta = if key_code == KeyCode::KeyO {
                    -CIRCLE_RADIUS_STEP
                } else {
                    CIRCLE_RADIUS_STEP
                };
                controller.geometry.circle_radius =
                    (controller.geometry.circle_radius + delta).max(CIRCLE_RADIUS_STEP);
                log::info!("Circle radius: {:.2}", controller.geometry.circle_radius);
            }
            KeyCode::Comma | KeyCode::Period => {
                let count = controller.geometry.triangle_count;
                let count = if key_code == KeyCode::Comma {
                    count.saturating_sub(1)
                } else {
                    count + 1
                };
                controller.geometry.triangle_count =
                    count.clamp(MIN_TRIANGLE_COUNT, MAX_TRIANGLE_COUNT);
                log::info!("Triangles: {}", controller.geometry.triangle_count);
            }
            KeyCode::KeyY | KeyCode::KeyH => {
                let delta = if key_code == KeyCode::KeyH {
                    -PERIMETER_ALPHA_STEP
                } else {
                    PERIMETER_ALPHA_STEP
                };
                controller.geometry.perimeter_alpha =
                    nudge(controller.geometry.perimeter_alpha, delta);
                log::info!("Perimeter alpha: {:.1}", controller.geometry.perimeter_alpha);
            }
            KeyCode::KeyK => {
                let geometry = &mut controller.geometry;
                geometry.uv_red_green_parity = !geometry.uv_red_green_parity;
                log::info!("UV parity swap: {}", on_off(geometry.uv_red_green_parity));
            }

            // Capture the presented frame
            KeyCode::KeyE | KeyCode::F12 => {
                let path = PathBuf::from(format!("capture-{:04}.png", self.captures));
                match controller.export(backend, &path) {
                    Ok(()) => self.captures += 1,
                    Err(e) => log::error!("Export failed: {}", e),
                }
            }

            // Reset particles and tunables
            KeyCode::KeyR => {
                self.field = ParticleField::new_default(self.field.pixels_per_unit());
                controller.kernel = Default::default();
                controller.geometry = Default::default();
                controller.threshold = Default::default();
                controller.config = Default::default();
                log::info!("Reset");
            }

            _ => {}
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        log::info!("Initializing Fluid Composite...");

        let window_attrs = Window::default_attributes()
            .with_title("Fluid Composite - Initializing...")
            .with_inner_size(winit::dpi::PhysicalSize::new(DISPLAY_WIDTH, DISPLAY_HEIGHT));

        let window = match event_loop.create_window(window_attrs) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("Failed to create window: {}", e);
                event_loop.exit();
                return;
            }
        };

        if let Err(e) = self.init(window) {
            log::error!("Initialization failed: {}", e);
            event_loop.exit();
            return;
        }

        log::info!("Initialization complete!");
        log::info!("Controls:");
        log::info!("  Space: Pause/resume simulation");
        log::info!("  1/2: Show body/pattern channel");
        log::info!("  G/U: Toggle body/pattern draw, B: blur, T: threshold");
        log::info!("  [/]: Sigma, ;/': kernel size, J/I: kernel samples");
        log::info!("  -/=: Compute resolution scale");
        log::info!("  Z/X, C/V, N/M: Surface, content, uv thresholds; P: pattern");
        log::info!("  O/L: Radius, ,/.: triangles, H/Y: perimeter alpha, K: uv parity");
        log::info!("  E/F12: Export PNG, R: reset, Escape: quit");

        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, exiting...");
                event_loop.exit();
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state.is_pressed() {
                    if let PhysicalKey::Code(key_code) = event.physical_key {
                        if key_code == KeyCode::Escape {
                            log::info!("Escape pressed, exiting...");
                            event_loop.exit();
                        } else {
                            self.handle_key(key_code);
                        }
                    }
                }
            }
            WindowEvent::Resized(new_size) => {
                if let (Some(backend), Some(controller)) =
                    (self.backend.as_mut(), self.controller.as_mut())
                {
                    log::info!("Window resized to {}x{}", new_size.width, new_size.height);
                    backend.context.resize(new_size);
                    if new_size.width > 0 && new_size.height > 0 {
                        controller.set_display_size(
                            backend,
                            &mut self.field,
                            Extent::new(new_size.width, new_size.height),
                        );
                    }
                }
            }
            WindowEvent::RedrawRequested => {
                self.render();
                // Request another frame immediately
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            _ => {}
        }
    }
}

/// Simple FPS counter
struct FpsCounter {
    last_update: Instant,
    frame_count: u32,
}

impl FpsCounter {
    fn new() -> Self {
        Self {
            last_update: Instant::now(),
            frame_count: 0,
        }
    }

    /// Tick the counter, returns Some(fps) every second
    fn tick(&mut self) -> Option<f64> {
        self.frame_count += 1;
        let elapsed = self.last_update.elapsed();

        if elapsed.as_secs_f64() >= 1.0 {
            let fps = self.frame_count as f64 / elapsed.as_secs_f64();
            self.frame_count = 0;
            self.last_update = Instant::now();
            Some(fps)
        } else {
            None
        }
    }
}
