mod app;
mod config;
mod error;
mod gpu;
mod headless;
mod kernel;
mod pipeline;
mod render;
mod simulation;

use winit::event_loop::{ControlFlow, EventLoop};

use crate::app::App;
use crate::headless::HeadlessOptions;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Some(options) = HeadlessOptions::from_env() {
        if let Err(e) = headless::run(&options) {
            log::error!("Headless run failed: {}", e);
            std::process::exit(1);
        }
        return;
    }

    let event_loop = match EventLoop::new() {
        Ok(event_loop) => event_loop,
        Err(e) => {
            log::error!("Failed to create event loop: {}", e);
            std::process::exit(1);
        }
    };
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new();
    if let Err(e) = event_loop.run_app(&mut app) {
        log::error!("Event loop error: {}", e);
    }
}
