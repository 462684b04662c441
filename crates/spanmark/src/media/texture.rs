//! Hands the newest decoded frame to the GPU as a sampleable 2D texture.

use wgpu::{Device, Queue};

use super::error::BridgeError;
use super::pipeline::{ContextKind, SharedContext};
use super::types::{DecodedFrame, FrameMemory, FramePixels, TextureHandle};

/// Format of every texture the bridge exposes.
pub const FRAME_TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

pub trait TextureBridge {
    /// Make `frame` the displayed image and return the texture showing it.
    fn upload(&mut self, frame: &DecodedFrame) -> Result<TextureHandle, BridgeError>;

    /// View of the texture returned by the last successful `upload`.
    fn view(&self) -> Option<&wgpu::TextureView>;

    /// Answer a pipeline's request for shared GPU state.
    fn provide_context(&mut self, _kind: ContextKind) -> Option<SharedContext> {
        None
    }

    fn begin_context_negotiation(&mut self) {}

    fn end_context_negotiation(&mut self) {}
}

/// Device and queue clones shared with the decode side.
#[derive(Clone)]
pub struct GpuShare {
    pub device: Device,
    pub queue: Queue,
}

/// Pick the bridge matching where the pipeline leaves its pixels.
pub fn bridge_for(memory: FrameMemory, gpu: &GpuShare) -> Box<dyn TextureBridge> {
    match memory {
        FrameMemory::Host => Box::new(CopyBridge::new(gpu.clone())),
        FrameMemory::Gpu => Box::new(ZeroCopyBridge::new(gpu.clone())),
    }
}

struct PersistentTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
    name: TextureHandle,
}

/// Uploads host-memory frames into one long-lived texture.
pub struct CopyBridge {
    gpu: GpuShare,
    target: Option<PersistentTexture>,
}

impl CopyBridge {
    pub fn new(gpu: GpuShare) -> Self {
        Self { gpu, target: None }
    }

    fn target_for(&mut self, width: u32, height: u32) -> &PersistentTexture {
        let stale = self
            .target
            .as_ref()
            .is_some_and(|t| t.width != width || t.height != height);
        if stale {
            log::info!("Frame size changed to {width}x{height}, reallocating texture");
            self.target = None;
        }

        self.target.get_or_insert_with(|| {
            let texture = self.gpu.device.create_texture(&wgpu::TextureDescriptor {
                label: Some("video-frame"),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: FRAME_TEXTURE_FORMAT,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            });
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            PersistentTexture {
                texture,
                view,
                width,
                height,
                name: TextureHandle::allocate(),
            }
        })
    }
}

impl TextureBridge for CopyBridge {
    fn upload(&mut self, frame: &DecodedFrame) -> Result<TextureHandle, BridgeError> {
        let FramePixels::Host(data) = frame.pixels() else {
            return Err(BridgeError::UnsupportedMemory(frame.pixels().memory()));
        };
        let (width, height) = (frame.width(), frame.height());
        let bytes_per_row = width * frame.format().bytes_per_pixel();
        let expected = bytes_per_row as usize * height as usize;
        if data.len() != expected {
            return Err(BridgeError::SizeMismatch {
                expected,
                actual: data.len(),
            });
        }

        let queue = self.gpu.queue.clone();
        let target = self.target_for(width, height);
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &target.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_row),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        Ok(target.name)
    }

    fn view(&self) -> Option<&wgpu::TextureView> {
        self.target.as_ref().map(|t| &t.view)
    }
}

/// Displays frames that the pipeline already uploaded into its own textures.
pub struct ZeroCopyBridge {
    gpu: GpuShare,
    current: Option<(wgpu::TextureView, TextureHandle)>,
    negotiating: bool,
}

impl ZeroCopyBridge {
    pub fn new(gpu: GpuShare) -> Self {
        Self {
            gpu,
            current: None,
            negotiating: false,
        }
    }
}

impl TextureBridge for ZeroCopyBridge {
    fn upload(&mut self, frame: &DecodedFrame) -> Result<TextureHandle, BridgeError> {
        let FramePixels::Gpu(surface) = frame.pixels() else {
            return Err(BridgeError::UnsupportedMemory(frame.pixels().memory()));
        };
        // Flush the pipeline's pending writes to this surface before sampling it.
        self.gpu.queue.submit(std::iter::empty());
        self.current = Some((surface.view().clone(), surface.name()));
        Ok(surface.name())
    }

    fn view(&self) -> Option<&wgpu::TextureView> {
        self.current.as_ref().map(|(view, _)| view)
    }

    fn provide_context(&mut self, kind: ContextKind) -> Option<SharedContext> {
        if !self.negotiating {
            log::warn!("Pipeline asked for {kind:?} context outside of negotiation");
            return None;
        }
        log::debug!("Sharing {kind:?} context with decode pipeline");
        Some(match kind {
            ContextKind::Device => SharedContext::Device(self.gpu.device.clone()),
            ContextKind::Queue => SharedContext::Queue(self.gpu.queue.clone()),
        })
    }

    fn begin_context_negotiation(&mut self) {
        self.negotiating = true;
    }

    fn end_context_negotiation(&mut self) {
        self.negotiating = false;
    }
}
