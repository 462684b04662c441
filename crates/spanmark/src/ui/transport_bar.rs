use std::path::PathBuf;

use egui::{RichText, Ui};

use super::theme::{self, SMALL_SIZE};
use crate::app::file_label;

/// Something the user asked the player to do, from the transport bar or the keyboard.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlayerAction {
    TogglePause,
    Step { forward: bool },
    /// Offset in seconds from the live position.
    SeekRelative(f64),
    SeekTo(f64),
    SeekToStart,
    SeekToEnd,
    OpenFile,
    /// Index into the recent-videos list, newest first.
    OpenRecent(usize),
    ToggleDarkMode,
}

/// Snapshot of the session, collected before the UI borrow.
pub struct TransportInfo<'a> {
    pub file_name: &'a str,
    pub position: f64,
    pub duration: f64,
    pub paused: bool,
    pub end_of_stream: bool,
    pub width: u32,
    pub height: u32,
}

/// Position slider drag state. While dragging, the slider shows the dragged
/// value instead of the playback position, which lags behind the seek.
#[derive(Debug, Default)]
pub struct ScrubState {
    target: Option<f64>,
}

impl ScrubState {
    pub fn display_value(&self, position: f64) -> f64 {
        self.target.unwrap_or(position)
    }

    pub fn is_scrubbing(&self) -> bool {
        self.target.is_some()
    }

    /// Record this frame's slider interaction. Returns the seek target if the value moved.
    pub fn on_slider(&mut self, value: f64, changed: bool, dragging: bool) -> Option<f64> {
        self.target = dragging.then_some(value);
        changed.then_some(value)
    }
}

#[derive(Default)]
pub struct TransportBar {
    scrub: ScrubState,
}

impl TransportBar {
    pub fn show(
        &mut self,
        ui: &mut Ui,
        info: Option<&TransportInfo<'_>>,
        recent: &[PathBuf],
        dark_mode: bool,
    ) -> Vec<PlayerAction> {
        let mut actions = Vec::new();
        let dim = theme::text_secondary(dark_mode);

        ui.horizontal(|ui| {
            if ui.button("Open…").clicked() {
                actions.push(PlayerAction::OpenFile);
            }
            ui.add_enabled_ui(!recent.is_empty(), |ui| {
                ui.menu_button("Recent", |ui| {
                    if let Some(index) = recent_menu(ui, recent) {
                        actions.push(PlayerAction::OpenRecent(index));
                        ui.close();
                    }
                });
            });
            let theme_label = if dark_mode { "Light" } else { "Dark" };
            if ui.button(RichText::new(theme_label).size(SMALL_SIZE)).clicked() {
                actions.push(PlayerAction::ToggleDarkMode);
            }

            let Some(info) = info else {
                ui.label(RichText::new("No video loaded (Ctrl+O)").color(dim));
                return;
            };
            ui.separator();
            ui.label(info.file_name);
            ui.label(
                RichText::new(format!("{}x{}", info.width, info.height))
                    .size(SMALL_SIZE)
                    .color(dim),
            );
            if info.end_of_stream {
                ui.label(RichText::new("end").size(SMALL_SIZE).color(dim));
            }
        });

        let Some(info) = info else {
            return actions;
        };

        ui.horizontal(|ui| {
            if ui.button("|<").on_hover_text("Start (Home)").clicked() {
                actions.push(PlayerAction::SeekToStart);
            }
            if ui.button("<").on_hover_text("Previous frame (Left)").clicked() {
                actions.push(PlayerAction::Step { forward: false });
            }
            let play_label = if info.paused { "Play" } else { "Pause" };
            if ui.button(play_label).on_hover_text("Space").clicked() {
                actions.push(PlayerAction::TogglePause);
            }
            if ui.button(">").on_hover_text("Next frame (Right)").clicked() {
                actions.push(PlayerAction::Step { forward: true });
            }
            if ui.button(">|").on_hover_text("End (End)").clicked() {
                actions.push(PlayerAction::SeekToEnd);
            }

            let shown = self.scrub.display_value(info.position);
            let mut timestamp = RichText::new(format!(
                "{} / {}",
                format_timestamp(shown),
                format_timestamp(info.duration)
            ))
            .monospace();
            // The drag target, not yet the decoded position.
            if self.scrub.is_scrubbing() {
                timestamp = timestamp.color(theme::accent(dark_mode));
            }
            ui.label(timestamp);

            let mut value = shown;
            ui.spacing_mut().slider_width = (ui.available_width() - 16.0).max(80.0);
            let response = ui.add(
                egui::Slider::new(&mut value, 0.0..=info.duration.max(0.0))
                    .show_value(false),
            );
            if let Some(target) = self.scrub.on_slider(value, response.changed(), response.dragged()) {
                actions.push(PlayerAction::SeekTo(target));
            }
        });

        actions
    }
}

fn recent_menu(ui: &mut Ui, recent: &[PathBuf]) -> Option<usize> {
    let mut picked = None;
    for (index, path) in recent.iter().enumerate() {
        if ui
            .button(file_label(path))
            .on_hover_text(path.display().to_string())
            .clicked()
        {
            picked = Some(index);
        }
    }
    picked
}

/// `m:ss.mmm`, or `h:mm:ss.mmm` past an hour.
pub fn format_timestamp(secs: f64) -> String {
    let total_ms = (secs.max(0.0) * 1000.0).round() as u64;
    let ms = total_ms % 1000;
    let total_secs = total_ms / 1000;
    let (h, m, s) = (total_secs / 3600, (total_secs / 60) % 60, total_secs % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}.{ms:03}")
    } else {
        format!("{m}:{s:02}.{ms:03}")
    }
}
