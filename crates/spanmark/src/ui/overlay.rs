//! The player's whole UI is one egui pass per redraw, painted straight onto
//! the swapchain image. There is no separate video pass: the decoded frame is
//! an egui texture inside the central panel.

use egui::{ClippedPrimitive, Context, TexturesDelta};
use egui_wgpu::ScreenDescriptor;
use winit::event::WindowEvent;
use winit::window::Window;

use super::theme;

/// Output of the last `end_frame`, waiting for `render`.
#[derive(Default)]
struct PendingPaint {
    primitives: Vec<ClippedPrimitive>,
    textures: TexturesDelta,
}

pub struct EguiOverlay {
    pub state: egui_winit::State,
    /// Also used by the video view to register decoded-frame textures.
    pub renderer: egui_wgpu::Renderer,
    dark_mode: bool,
    pending: PendingPaint,
    screen: ScreenDescriptor,
}

impl EguiOverlay {
    pub fn new(
        device: &wgpu::Device,
        format: wgpu::TextureFormat,
        window: &Window,
        dark_mode: bool,
    ) -> Self {
        let ctx = Context::default();
        theme::apply_style(&ctx, dark_mode);
        let viewport = ctx.viewport_id();

        let size = window.inner_size();
        Self {
            state: egui_winit::State::new(ctx, viewport, window, None, None, None),
            renderer: egui_wgpu::Renderer::new(
                device,
                format,
                egui_wgpu::RendererOptions {
                    msaa_samples: 1,
                    ..Default::default()
                },
            ),
            dark_mode,
            pending: PendingPaint::default(),
            screen: ScreenDescriptor {
                size_in_pixels: [size.width, size.height],
                pixels_per_point: window.scale_factor() as f32,
            },
        }
    }

    pub fn dark_mode(&self) -> bool {
        self.dark_mode
    }

    pub fn set_dark_mode(&mut self, dark_mode: bool) {
        self.dark_mode = dark_mode;
        self.state.egui_ctx().set_visuals(theme::visuals(dark_mode));
    }

    /// Feed a window event to egui. True if egui used it.
    pub fn handle_event(&mut self, window: &Window, event: &WindowEvent) -> bool {
        self.state.on_window_event(window, event).consumed
    }

    /// A text field has focus; player shortcuts should stay quiet.
    pub fn wants_keyboard(&self) -> bool {
        self.state.egui_ctx().wants_keyboard_input()
    }

    pub fn context(&self) -> Context {
        self.state.egui_ctx().clone()
    }

    pub fn resize(&mut self, width: u32, height: u32, pixels_per_point: f32) {
        self.screen.size_in_pixels = [width, height];
        self.screen.pixels_per_point = pixels_per_point;
    }

    pub fn begin_frame(&mut self, window: &Window) {
        let input = self.state.take_egui_input(window);
        self.state.egui_ctx().begin_pass(input);
    }

    /// Close the pass and keep its tessellated output for `render`.
    pub fn end_frame(&mut self, window: &Window) {
        let ctx = self.state.egui_ctx().clone();
        let output = ctx.end_pass();
        self.state.handle_platform_output(window, output.platform_output);
        self.pending.primitives = ctx.tessellate(output.shapes, output.pixels_per_point);
        // Texture updates from a frame that never rendered must still land.
        self.pending.textures.append(output.textures_delta);
    }

    /// Draw the pending UI into `view`, clearing it to `clear` first.
    pub fn render(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        view: &wgpu::TextureView,
        clear: wgpu::Color,
    ) {
        let PendingPaint { primitives, textures } = std::mem::take(&mut self.pending);

        for (id, delta) in &textures.set {
            self.renderer.update_texture(device, queue, *id, delta);
        }
        self.renderer
            .update_buffers(device, queue, encoder, &primitives, &self.screen);

        let mut pass = encoder
            .begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("spanmark-ui"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(clear),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            })
            .forget_lifetime();
        self.renderer.render(&mut pass, &primitives, &self.screen);
        drop(pass);

        // Freed only after the pass that may still sample them.
        for id in &textures.free {
            self.renderer.free_texture(id);
        }
    }
}
