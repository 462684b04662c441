use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Pixel layout of a decoded frame. The decode pipeline always converts to RGBA8.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgba8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            PixelFormat::Rgba8 => 4,
        }
    }
}

/// Where a pipeline backend leaves decoded pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameMemory {
    /// Host memory; the texture bridge must upload.
    Host,
    /// Already resident in a GPU texture.
    Gpu,
}

/// Opaque id of the texture currently showing the newest frame. `0` means none yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TextureHandle(pub u32);

impl TextureHandle {
    pub const NONE: TextureHandle = TextureHandle(0);

    /// Allocate a fresh non-zero texture name, unique per process.
    pub fn allocate() -> Self {
        static NEXT: AtomicU32 = AtomicU32::new(1);
        TextureHandle(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

struct GpuSurfaceInner {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    name: TextureHandle,
}

/// A GPU texture owned by the decode pipeline's upload pool.
#[derive(Clone)]
pub struct GpuSurface(Arc<GpuSurfaceInner>);

impl GpuSurface {
    pub fn new(texture: wgpu::Texture) -> Self {
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self(Arc::new(GpuSurfaceInner {
            texture,
            view,
            name: TextureHandle::allocate(),
        }))
    }

    pub fn texture(&self) -> &wgpu::Texture {
        &self.0.texture
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.0.view
    }

    pub fn name(&self) -> TextureHandle {
        self.0.name
    }

    /// True while any frame (or the pool's caller) still references this surface
    /// besides the pool itself.
    pub fn in_use(&self) -> bool {
        Arc::strong_count(&self.0) > 1
    }
}

/// Pixel payload of a decoded frame.
pub enum FramePixels {
    /// Tightly packed rows in host memory.
    Host(Vec<u8>),
    Gpu(GpuSurface),
}

impl FramePixels {
    pub fn memory(&self) -> FrameMemory {
        match self {
            FramePixels::Host(_) => FrameMemory::Host,
            FramePixels::Gpu(_) => FrameMemory::Gpu,
        }
    }
}

struct FrameInner {
    width: u32,
    height: u32,
    format: PixelFormat,
    pts: Duration,
    pixels: FramePixels,
}

/// Reference-counted handle to one decoded image plus its metadata.
///
/// Cloning takes another owned reference; dropping the last clone releases
/// the pixel payload (and returns a GPU surface to its pool).
#[derive(Clone)]
pub struct DecodedFrame(Arc<FrameInner>);

impl DecodedFrame {
    pub fn new(width: u32, height: u32, pts: Duration, pixels: FramePixels) -> Self {
        Self(Arc::new(FrameInner {
            width,
            height,
            format: PixelFormat::Rgba8,
            pts,
            pixels,
        }))
    }

    pub fn width(&self) -> u32 {
        self.0.width
    }

    pub fn height(&self) -> u32 {
        self.0.height
    }

    pub fn format(&self) -> PixelFormat {
        self.0.format
    }

    /// Presentation timestamp relative to the start of the stream.
    pub fn pts(&self) -> Duration {
        self.0.pts
    }

    pub fn pixels(&self) -> &FramePixels {
        &self.0.pixels
    }

    /// Number of live references to this frame, including `self`.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }
}

impl std::fmt::Debug for DecodedFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodedFrame")
            .field("width", &self.0.width)
            .field("height", &self.0.height)
            .field("pts", &self.0.pts)
            .field("memory", &self.0.pixels.memory())
            .finish()
    }
}
