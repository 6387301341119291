//! Desktop application: state, handlers and the egui window

mod gui;
mod state;

pub use gui::run;
pub use state::{AppState, Capture, RecordVisual, Rgb};
