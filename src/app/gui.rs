//! egui front end
//!
//! One window: connection and recording controls on the left, the waveform
//! of the last capture on the right, status line at the bottom.

use super::state::{AppState, Rgb};
use crate::config::{MAX_DURATION_SECS, MIN_DURATION_SECS};
use eframe::egui;
use egui::{Color32, RichText, Rounding, Vec2};
use egui_plot::{Line, Plot, PlotPoints};
use std::time::{Duration, Instant};

const TITLE: &str = "XIAO MG24 Sense - Audio GUI";
const HEADING: Color32 = Color32::from_rgb(149, 182, 255);
const SUBTITLE: Color32 = Color32::from_rgb(190, 205, 230);
const PLOT_LINE: Color32 = Color32::from_rgb(110, 190, 255);

/// Repaint interval for the indicator animations
const FRAME_INTERVAL: Duration = Duration::from_millis(33);

/// Opens the window and runs until it is closed
pub fn run(state: AppState) -> eframe::Result<()> {
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title(TITLE)
            .with_inner_size([1180.0, 760.0])
            .with_min_inner_size([980.0, 640.0]),
        ..Default::default()
    };

    eframe::run_native(
        TITLE,
        options,
        Box::new(|cc| {
            apply_theme(&cc.egui_ctx);
            Ok(Box::new(RecorderApp { state }))
        }),
    )
}

struct RecorderApp {
    state: AppState,
}

fn color(rgb: Rgb) -> Color32 {
    Color32::from_rgb(rgb[0], rgb[1], rgb[2])
}

fn apply_theme(ctx: &egui::Context) {
    let mut visuals = egui::Visuals::dark();
    visuals.override_text_color = Some(Color32::from_rgb(230, 235, 245));
    visuals.window_fill = Color32::from_rgb(28, 32, 40);
    visuals.panel_fill = Color32::from_rgb(28, 32, 40);
    visuals.extreme_bg_color = Color32::from_rgb(22, 26, 34);
    visuals.faint_bg_color = Color32::from_rgb(36, 40, 52);
    visuals.window_rounding = Rounding::same(8.0);

    let widgets = &mut visuals.widgets;
    widgets.inactive.bg_fill = Color32::from_rgb(45, 55, 72);
    widgets.inactive.weak_bg_fill = Color32::from_rgb(65, 90, 140);
    widgets.hovered.bg_fill = Color32::from_rgb(65, 90, 140);
    widgets.hovered.weak_bg_fill = Color32::from_rgb(90, 120, 180);
    widgets.active.bg_fill = Color32::from_rgb(80, 110, 165);
    widgets.active.weak_bg_fill = Color32::from_rgb(110, 150, 210);
    for widget in [
        &mut widgets.inactive,
        &mut widgets.hovered,
        &mut widgets.active,
        &mut widgets.noninteractive,
    ] {
        widget.rounding = Rounding::same(6.0);
    }
    ctx.set_visuals(visuals);

    ctx.style_mut(|style| {
        style.spacing.item_spacing = Vec2::new(12.0, 8.0);
        style.spacing.button_padding = Vec2::new(10.0, 6.0);
    });
}

impl RecorderApp {
    fn header(&mut self, ui: &mut egui::Ui, now: Instant) {
        ui.label(RichText::new("Capture audio from the XIAO MG24 Sense in style.").color(SUBTITLE));
        ui.add_space(6.0);

        ui.horizontal(|ui| {
            ui.vertical(|ui| {
                ui.label(RichText::new("Device").color(HEADING));
                ui.horizontal(|ui| {
                    ui.colored_label(color(self.state.connection_indicator()), "●");
                    ui.label(self.state.connection_label());
                });
            });
            ui.add_space(32.0);
            ui.vertical(|ui| {
                ui.label(RichText::new("Session").color(HEADING));
                ui.horizontal(|ui| {
                    if self.state.is_recording() {
                        ui.add(egui::Spinner::new().size(11.0));
                    }
                    ui.label(self.state.record_visual().label());
                    ui.colored_label(color(self.state.record_indicator(now)), "●");
                });
                if let Some(progress) = self.state.record_progress(now) {
                    ui.add(
                        egui::ProgressBar::new(progress)
                            .desired_width(260.0)
                            .text(format!("{:.0}%", progress * 100.0)),
                    );
                }
            });
        });
    }

    fn controls(&mut self, ui: &mut egui::Ui) {
        ui.label(RichText::new("Connection").color(HEADING));
        ui.separator();

        let selected_text = self
            .state
            .selected_port
            .and_then(|idx| self.state.ports().get(idx))
            .map(|port| port.label())
            .unwrap_or_default();
        let mut selected = self.state.selected_port;
        egui::ComboBox::from_label("Serial port")
            .selected_text(selected_text)
            .width(ui.available_width() - 90.0)
            .show_ui(ui, |ui| {
                for (idx, port) in self.state.ports().iter().enumerate() {
                    ui.selectable_value(&mut selected, Some(idx), port.label());
                }
            });
        self.state.selected_port = selected;

        let half = Vec2::new(150.0, 0.0);
        ui.horizontal(|ui| {
            if ui.add(egui::Button::new("Refresh").min_size(half)).clicked() {
                self.state.refresh_ports();
            }
            if ui.add(egui::Button::new("Connect").min_size(half)).clicked() {
                self.state.connect();
            }
        });
        let full = Vec2::new(ui.available_width(), 0.0);
        if ui.add(egui::Button::new("Disconnect").min_size(full)).clicked() {
            self.state.disconnect();
        }

        ui.add_space(10.0);
        ui.label(RichText::new("Recording").color(HEADING));
        ui.separator();

        ui.horizontal(|ui| {
            ui.add(
                egui::DragValue::new(&mut self.state.sample_rate_input)
                    .speed(10)
                    .suffix(" Hz"),
            );
            ui.label("Sample rate");
        });
        ui.horizontal(|ui| {
            ui.add(
                egui::DragValue::new(&mut self.state.duration_input)
                    .speed(0.05)
                    .range(MIN_DURATION_SECS..=MAX_DURATION_SECS)
                    .fixed_decimals(2)
                    .suffix(" s"),
            );
            ui.label("Duration");
        });

        let recording = self.state.is_recording();
        if ui
            .add_enabled(!recording, egui::Button::new("Record").min_size(full))
            .clicked()
        {
            self.state.record(Instant::now());
        }
    }

    fn waveform(&mut self, ui: &mut egui::Ui) {
        ui.label(RichText::new("Waveform").color(HEADING));
        ui.separator();

        let plot_height = (ui.available_height() - 48.0).max(120.0);
        Plot::new("waveform")
            .height(plot_height)
            .x_axis_label("Time (s)")
            .y_axis_label("Amplitude")
            .show(ui, |plot_ui| {
                if let Some(capture) = self.state.capture() {
                    plot_ui.line(Line::new(PlotPoints::from(capture.plot.clone())).color(PLOT_LINE));
                }
            });

        ui.add_space(6.0);
        ui.horizontal(|ui| {
            if ui.add(egui::Button::new("Play").min_size(Vec2::new(100.0, 0.0))).clicked() {
                self.state.play();
            }
            if ui.add(egui::Button::new("Save WAV").min_size(Vec2::new(120.0, 0.0))).clicked() {
                self.state.save();
            }
            if ui.add(egui::Button::new("Clear").min_size(Vec2::new(100.0, 0.0))).clicked() {
                self.state.clear();
            }
            if self.state.is_playing() {
                ui.label(RichText::new("Playing…").color(SUBTITLE));
            }
            if let Some(capture) = self.state.capture() {
                ui.label(
                    RichText::new(format!(
                        "{} samples at {} Hz, peak {}",
                        capture.samples.len(),
                        capture.sample_rate,
                        capture.peak
                    ))
                    .color(SUBTITLE),
                );
            }
        });
    }
}

impl eframe::App for RecorderApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let now = Instant::now();
        self.state.tick(now);

        egui::TopBottomPanel::bottom("status")
            .min_height(90.0)
            .show(ctx, |ui| {
                ui.label(RichText::new("Status").color(HEADING));
                ui.separator();
                ui.label(self.state.status());
            });

        egui::SidePanel::left("controls")
            .exact_width(340.0)
            .resizable(false)
            .show(ctx, |ui| {
                self.controls(ui);
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            self.header(ui, now);
            ui.add_space(10.0);
            self.waveform(ui);
        });

        ctx.request_repaint_after(FRAME_INTERVAL);
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        self.state.persist();
    }
}
