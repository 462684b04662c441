use egui::{Color32, CornerRadius, Stroke, Visuals};

pub const DARK_CANVAS: Color32 = Color32::from_rgb(0x12, 0x12, 0x12);
pub const DARK_PANEL: Color32 = Color32::from_rgb(0x1E, 0x1E, 0x1E);
pub const DARK_TEXT_PRIMARY: Color32 = Color32::from_rgb(0xE8, 0xE8, 0xE8);
pub const DARK_TEXT_SECONDARY: Color32 = Color32::from_rgb(0xA0, 0xA0, 0xA0);
pub const DARK_ACCENT: Color32 = Color32::from_rgb(0x4D, 0xA8, 0xDA);
pub const DARK_WIDGET_BG: Color32 = Color32::from_rgb(0x2A, 0x2A, 0x2A);
pub const DARK_SEPARATOR: Color32 = Color32::from_rgb(0x3A, 0x3A, 0x3A);

pub const LIGHT_CANVAS: Color32 = Color32::from_rgb(0xF5, 0xF5, 0xF5);
pub const LIGHT_PANEL: Color32 = Color32::from_rgb(0xFF, 0xFF, 0xFF);
pub const LIGHT_TEXT_PRIMARY: Color32 = Color32::from_rgb(0x1A, 0x1A, 0x1A);
pub const LIGHT_TEXT_SECONDARY: Color32 = Color32::from_rgb(0x5A, 0x5A, 0x5A);
pub const LIGHT_ACCENT: Color32 = Color32::from_rgb(0x09, 0x69, 0xA8);
pub const LIGHT_WIDGET_BG: Color32 = Color32::from_rgb(0xE8, 0xE8, 0xE8);
pub const LIGHT_SEPARATOR: Color32 = Color32::from_rgb(0xD5, 0xD5, 0xD5);

pub const WIDGET_ROUNDING: u8 = 4;
pub const SPACING: f32 = 8.0;
pub const BODY_SIZE: f32 = 14.0;
pub const SMALL_SIZE: f32 = 12.0;
pub const MONO_SIZE: f32 = 13.0;

struct Palette {
    canvas: Color32,
    panel: Color32,
    text: Color32,
    text_dim: Color32,
    accent: Color32,
    widget: Color32,
    separator: Color32,
}

const DARK: Palette = Palette {
    canvas: DARK_CANVAS,
    panel: DARK_PANEL,
    text: DARK_TEXT_PRIMARY,
    text_dim: DARK_TEXT_SECONDARY,
    accent: DARK_ACCENT,
    widget: DARK_WIDGET_BG,
    separator: DARK_SEPARATOR,
};

const LIGHT: Palette = Palette {
    canvas: LIGHT_CANVAS,
    panel: LIGHT_PANEL,
    text: LIGHT_TEXT_PRIMARY,
    text_dim: LIGHT_TEXT_SECONDARY,
    accent: LIGHT_ACCENT,
    widget: LIGHT_WIDGET_BG,
    separator: LIGHT_SEPARATOR,
};

pub fn visuals(dark_mode: bool) -> Visuals {
    let (mut v, p) = if dark_mode {
        (Visuals::dark(), &DARK)
    } else {
        (Visuals::light(), &LIGHT)
    };

    v.panel_fill = p.panel;
    v.window_fill = p.panel;
    v.extreme_bg_color = p.canvas;
    v.override_text_color = Some(p.text);
    v.selection.bg_fill = p.accent.gamma_multiply(0.4);
    v.selection.stroke = Stroke::new(1.0, p.accent);
    v.slider_trailing_fill = true;

    let rounding = CornerRadius::same(WIDGET_ROUNDING);
    v.widgets.noninteractive.bg_fill = p.panel;
    v.widgets.noninteractive.fg_stroke = Stroke::new(1.0, p.text_dim);
    v.widgets.noninteractive.bg_stroke = Stroke::new(0.5, p.separator);
    for w in [&mut v.widgets.inactive, &mut v.widgets.hovered, &mut v.widgets.active] {
        w.bg_fill = p.widget;
        w.weak_bg_fill = p.widget;
        w.fg_stroke = Stroke::new(1.0, p.text);
        w.corner_radius = rounding;
    }
    v.widgets.hovered.bg_stroke = Stroke::new(1.0, p.accent);
    v.widgets.active.bg_stroke = Stroke::new(1.0, p.accent);

    v
}

/// Color for secondary labels (timestamps, dimensions).
pub fn text_secondary(dark_mode: bool) -> Color32 {
    if dark_mode { DARK.text_dim } else { LIGHT.text_dim }
}

pub fn accent(dark_mode: bool) -> Color32 {
    if dark_mode { DARK.accent } else { LIGHT.accent }
}

pub fn apply_style(ctx: &egui::Context, dark_mode: bool) {
    ctx.set_visuals(visuals(dark_mode));
    let mut style = (*ctx.style()).clone();
    style.spacing.item_spacing = egui::vec2(SPACING, 4.0);
    style.spacing.button_padding = egui::vec2(6.0, 2.0);
    style
        .text_styles
        .insert(egui::TextStyle::Body, egui::FontId::proportional(BODY_SIZE));
    style
        .text_styles
        .insert(egui::TextStyle::Small, egui::FontId::proportional(SMALL_SIZE));
    style
        .text_styles
        .insert(egui::TextStyle::Monospace, egui::FontId::monospace(MONO_SIZE));
    ctx.set_style(style);
}
