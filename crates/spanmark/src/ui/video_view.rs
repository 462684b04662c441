use egui::{Color32, Rect, Ui, Vec2};

use crate::media::types::TextureHandle;

/// Keeps the session's current frame texture registered with the egui renderer.
#[derive(Default)]
pub struct VideoView {
    texture_id: Option<egui::TextureId>,
    bound: TextureHandle,
}

impl VideoView {
    /// Point the egui texture at `view` whenever the session switches textures.
    /// A copy-backed session keeps one texture, so this rebinds only on resize.
    pub fn sync(
        &mut self,
        renderer: &mut egui_wgpu::Renderer,
        device: &wgpu::Device,
        handle: TextureHandle,
        view: Option<&wgpu::TextureView>,
    ) {
        let Some(view) = view else {
            return;
        };
        if handle == self.bound && self.texture_id.is_some() {
            return;
        }
        match self.texture_id {
            Some(id) => {
                renderer.update_egui_texture_from_wgpu_texture(
                    device,
                    view,
                    wgpu::FilterMode::Linear,
                    id,
                );
            }
            None => {
                self.texture_id =
                    Some(renderer.register_native_texture(device, view, wgpu::FilterMode::Linear));
                log::debug!("Registered video texture with egui");
            }
        }
        self.bound = handle;
    }

    /// Drop the registration when the session closes.
    pub fn release(&mut self, renderer: &mut egui_wgpu::Renderer) {
        if let Some(id) = self.texture_id.take() {
            renderer.free_texture(&id);
        }
        self.bound = TextureHandle::NONE;
    }

    /// Paint the frame letterboxed into the available space.
    pub fn show(&self, ui: &mut Ui, media_size: (u32, u32)) {
        let available = ui.available_rect_before_wrap();
        let Some(id) = self.texture_id.filter(|_| !self.bound.is_none()) else {
            ui.painter().rect_filled(available, 0.0, Color32::BLACK);
            return;
        };
        let size = fit_size(media_size, available.size());
        let rect = Rect::from_center_size(available.center(), size);
        ui.painter().rect_filled(available, 0.0, Color32::BLACK);
        ui.painter().image(
            id,
            rect,
            Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
            Color32::WHITE,
        );
    }
}

/// Largest size with the media's aspect ratio that fits in `available`.
pub fn fit_size(media_size: (u32, u32), available: Vec2) -> Vec2 {
    let (w, h) = (media_size.0.max(1) as f32, media_size.1.max(1) as f32);
    let scale = (available.x / w).min(available.y / h).max(0.0);
    Vec2::new(w * scale, h * scale)
}
