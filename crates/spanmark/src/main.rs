mod app;
mod gpu;
mod media;
mod settings;
mod ui;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use crossbeam_channel::Receiver;
use winit::application::ApplicationHandler;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{KeyCode, ModifiersState, PhysicalKey};
use winit::window::{Fullscreen, Window, WindowAttributes, WindowId};

use app::App;
use settings::SettingsConfig;

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "mkv", "avi", "webm", "m4v", "mpg", "mpeg"];

struct SpanmarkApp {
    app: Option<App>,
    window: Option<Arc<Window>>,
    modifiers: ModifiersState,
    file_dialog_rx: Option<Receiver<PathBuf>>,
    /// Video to open once the window exists (CLI argument or last session).
    initial_video: Option<PathBuf>,
}

impl SpanmarkApp {
    fn new(initial_video: Option<PathBuf>) -> Self {
        Self {
            app: None,
            window: None,
            modifiers: ModifiersState::empty(),
            file_dialog_rx: None,
            initial_video,
        }
    }

    fn spawn_file_dialog(&mut self) {
        if self.file_dialog_rx.is_some() {
            return;
        }
        let (tx, rx) = crossbeam_channel::bounded(1);
        self.file_dialog_rx = Some(rx);
        let spawned = std::thread::Builder::new()
            .name("file-dialog".into())
            .spawn(move || {
                let dialog = rfd::FileDialog::new()
                    .set_title("Open video")
                    .add_filter("Video", VIDEO_EXTENSIONS)
                    .add_filter("All files", &["*"]);
                if let Some(path) = dialog.pick_file() {
                    let _ = tx.send(path);
                }
            });
        if let Err(e) = spawned {
            log::error!("Failed to open file dialog: {e}");
            self.file_dialog_rx = None;
        }
    }

    /// Non-blocking check for a picked file.
    fn poll_file_dialog(&mut self) -> Option<PathBuf> {
        let rx = self.file_dialog_rx.as_ref()?;
        match rx.try_recv() {
            Ok(path) => {
                self.file_dialog_rx = None;
                Some(path)
            }
            Err(crossbeam_channel::TryRecvError::Disconnected) => {
                // Cancelled: sender dropped without sending
                self.file_dialog_rx = None;
                None
            }
            Err(crossbeam_channel::TryRecvError::Empty) => None,
        }
    }
}

impl ApplicationHandler for SpanmarkApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let settings = SettingsConfig::load();
        let attrs = WindowAttributes::default()
            .with_title("Spanmark")
            .with_inner_size(winit::dpi::LogicalSize::new(
                settings.window_width.max(320),
                settings.window_height.max(240),
            ));

        let window = match event_loop.create_window(attrs) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("Failed to create window: {e}");
                event_loop.exit();
                return;
            }
        };
        self.window = Some(window.clone());

        match App::new(window, settings) {
            Ok(mut app) => {
                log::info!("Spanmark initialized");
                if let Some(path) = self.initial_video.take() {
                    app.open_video(path);
                }
                self.app = Some(app);
            }
            Err(e) => {
                log::error!("Failed to initialize app: {e:#}");
                event_loop.exit();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(app) = self.app.as_mut() else {
            return;
        };

        let egui_consumed = app.egui_overlay.handle_event(&app.window, &event);
        let mut open_dialog = false;

        match event {
            WindowEvent::CloseRequested => {
                app.quit_requested = true;
            }
            WindowEvent::Resized(size) => {
                app.resize(size.width, size.height);
            }
            WindowEvent::ModifiersChanged(modifiers) => {
                self.modifiers = modifiers.state();
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(key),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } if !egui_consumed || !app.egui_overlay.wants_keyboard() => match key {
                KeyCode::Escape => app.quit_requested = true,
                KeyCode::KeyF => {
                    let window = &app.window;
                    if window.fullscreen().is_some() {
                        window.set_fullscreen(None);
                    } else {
                        window.set_fullscreen(Some(Fullscreen::Borderless(None)));
                    }
                }
                _ => {
                    if let Some(action) = app::key_action(key, self.modifiers) {
                        app.apply(action);
                    }
                }
            },
            WindowEvent::RedrawRequested => {
                app.update();
                app.draw_ui();

                open_dialog = std::mem::take(&mut app.open_dialog_requested);

                match app.render() {
                    Ok(()) => {}
                    Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                        app.gpu.reconfigure();
                    }
                    Err(wgpu::SurfaceError::OutOfMemory) => {
                        log::error!("Out of GPU memory");
                        event_loop.exit();
                    }
                    Err(e) => {
                        log::warn!("Surface error: {e}");
                    }
                }

                app.window.request_redraw();
            }
            _ => {}
        }

        if open_dialog {
            self.spawn_file_dialog();
        }
        if let Some(path) = self.poll_file_dialog() {
            if let Some(app) = self.app.as_mut() {
                app.open_video(path);
            }
        }

        if let Some(app) = self.app.as_mut() {
            if app.quit_requested {
                app.shutdown();
                event_loop.exit();
            }
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let initial_video = std::env::args_os().nth(1).map(PathBuf::from).or_else(|| {
        SettingsConfig::load()
            .most_recent_video()
            .filter(|p| p.is_file())
            .map(PathBuf::from)
    });

    if !media::video::ffmpeg_available() {
        log::warn!("ffmpeg/ffprobe not found on PATH; videos will fail to open");
    }

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(winit::event_loop::ControlFlow::Poll);

    let mut app = SpanmarkApp::new(initial_video);
    event_loop.run_app(&mut app)?;

    Ok(())
}
