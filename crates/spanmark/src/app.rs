use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use winit::keyboard::{KeyCode, ModifiersState};
use winit::window::Window;

use crate::gpu::GpuContext;
use crate::media::PlaybackSession;
use crate::settings::SettingsConfig;
use crate::ui::{EguiOverlay, PlayerAction, TransportBar, TransportInfo, VideoView};

pub struct App {
    pub gpu: GpuContext,
    pub egui_overlay: EguiOverlay,
    pub window: Arc<Window>,
    pub settings: SettingsConfig,
    pub session: Option<PlaybackSession>,
    pub transport: TransportBar,
    pub video_view: VideoView,
    /// Last open failure, shown until the next successful open.
    pub open_error: Option<String>,
    /// Set by the transport bar; the event loop owns the file dialog.
    pub open_dialog_requested: bool,
    pub quit_requested: bool,
}

impl App {
    pub fn new(window: Arc<Window>, settings: SettingsConfig) -> Result<Self> {
        let gpu = GpuContext::new(window.clone())?;
        let egui_overlay = EguiOverlay::new(&gpu.device, gpu.format, &window, settings.dark_mode);

        Ok(Self {
            gpu,
            egui_overlay,
            window,
            settings,
            session: None,
            transport: TransportBar::default(),
            video_view: VideoView::default(),
            open_error: None,
            open_dialog_requested: false,
            quit_requested: false,
        })
    }

    /// Replace the current session with one for `path`.
    pub fn open_video(&mut self, path: PathBuf) {
        // Only one decoder runs at a time.
        self.close_video();

        match PlaybackSession::open(&path, &self.gpu.share(), self.settings.pipeline_options()) {
            Ok(session) => {
                log::debug!("Session duration {:.3}s", session.duration());
                self.window.set_title(&format!("Spanmark - {}", file_label(&path)));
                self.settings.add_recent_video(&path);
                self.settings.save();
                self.open_error = None;
                self.session = Some(session);
            }
            Err(e) => {
                self.open_error = Some(e.to_string());
            }
        }
    }

    pub fn close_video(&mut self) {
        if self.session.take().is_some() {
            self.video_view.release(&mut self.egui_overlay.renderer);
            self.window.set_title("Spanmark");
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.gpu.resize(width, height);
        self.egui_overlay
            .resize(width, height, self.window.scale_factor() as f32);
        if width > 0 && height > 0 {
            let logical = winit::dpi::PhysicalSize::new(width, height)
                .to_logical::<u32>(self.window.scale_factor());
            self.settings.window_width = logical.width;
            self.settings.window_height = logical.height;
        }
    }

    /// Advance playback. Exactly once per redraw.
    pub fn update(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.update();
            self.video_view.sync(
                &mut self.egui_overlay.renderer,
                &self.gpu.device,
                session.texture_handle(),
                session.texture_view(),
            );
        }
    }

    pub fn apply(&mut self, action: PlayerAction) {
        match action {
            PlayerAction::OpenFile => {
                self.open_dialog_requested = true;
                return;
            }
            PlayerAction::OpenRecent(index) => {
                if let Some(path) = self.settings.recent_video(index).map(Path::to_path_buf) {
                    self.open_video(path);
                }
                return;
            }
            PlayerAction::ToggleDarkMode => {
                self.settings.dark_mode = !self.settings.dark_mode;
                self.egui_overlay.set_dark_mode(self.settings.dark_mode);
                self.settings.save();
                return;
            }
            _ => {}
        }

        let seek_step = self.settings.seek_step();
        let Some(session) = self.session.as_mut() else {
            return;
        };
        match action {
            PlayerAction::TogglePause => {
                let paused = session.is_paused();
                session.pause(!paused);
            }
            PlayerAction::Step { forward } => {
                session.pause(true);
                session.step(forward);
            }
            PlayerAction::SeekRelative(offset) => {
                session.pause(true);
                session.seek_relative(offset * seek_step);
            }
            PlayerAction::SeekTo(position) => session.seek(position),
            PlayerAction::SeekToStart => session.seek(0.0),
            PlayerAction::SeekToEnd => {
                let end = session.duration();
                session.seek(end);
            }
            PlayerAction::OpenFile | PlayerAction::OpenRecent(_) | PlayerAction::ToggleDarkMode => {}
        }
    }

    /// Build this frame's UI and apply whatever the user clicked.
    pub fn draw_ui(&mut self) {
        self.egui_overlay.begin_frame(&self.window);
        let ctx = self.egui_overlay.context();
        let dark_mode = self.egui_overlay.dark_mode();

        let file_name = self
            .session
            .as_ref()
            .map(|s| file_label(s.path()))
            .unwrap_or_default();
        let info = self.session.as_ref().map(|s| TransportInfo {
            file_name: &file_name,
            position: s.position(),
            duration: s.duration(),
            paused: s.is_paused(),
            end_of_stream: s.is_end_of_stream(),
            width: s.width(),
            height: s.height(),
        });

        let mut actions = Vec::new();
        egui::TopBottomPanel::bottom("transport").show(&ctx, |ui| {
            if let Some(error) = &self.open_error {
                ui.colored_label(egui::Color32::from_rgb(0xE0, 0x60, 0x60), error);
            }
            actions = self.transport.show(
                ui,
                info.as_ref(),
                &self.settings.recent_videos,
                dark_mode,
            );
        });
        let media_size = info.as_ref().map_or((1, 1), |i| (i.width, i.height));
        egui::CentralPanel::default()
            .frame(egui::Frame::NONE)
            .show(&ctx, |ui| self.video_view.show(ui, media_size));

        self.egui_overlay.end_frame(&self.window);

        for action in actions {
            self.apply(action);
        }
    }

    pub fn render(&mut self) -> Result<(), wgpu::SurfaceError> {
        let output = self.gpu.surface.get_current_texture()?;
        let surface_view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder =
            self.gpu
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("spanmark-encoder"),
                });

        self.egui_overlay.render(
            &self.gpu.device,
            &self.gpu.queue,
            &mut encoder,
            &surface_view,
            wgpu::Color::BLACK,
        );

        self.gpu.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        Ok(())
    }

    /// Persist settings and stop playback before the window goes away.
    pub fn shutdown(&mut self) {
        self.close_video();
        self.settings.save();
    }
}

pub fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Keyboard bindings for the player.
pub fn key_action(key: KeyCode, modifiers: ModifiersState) -> Option<PlayerAction> {
    let shift = modifiers.shift_key();
    let ctrl = modifiers.control_key() || modifiers.super_key();
    match key {
        KeyCode::Space => Some(PlayerAction::TogglePause),
        KeyCode::ArrowLeft if shift => Some(PlayerAction::SeekRelative(-1.0)),
        KeyCode::ArrowRight if shift => Some(PlayerAction::SeekRelative(1.0)),
        KeyCode::ArrowLeft => Some(PlayerAction::Step { forward: false }),
        KeyCode::ArrowRight => Some(PlayerAction::Step { forward: true }),
        KeyCode::Home => Some(PlayerAction::SeekToStart),
        KeyCode::End => Some(PlayerAction::SeekToEnd),
        KeyCode::KeyO if ctrl => Some(PlayerAction::OpenFile),
        _ => None,
    }
}
