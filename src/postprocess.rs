//! Compute post-processing over rendered color targets.
//!
//! A [`PostProcess`] runs against a [`ComputeBackend`]: it resolves compute programs,
//! allocates scratch textures, records a copy plus dispatches into one encoder and
//! submits it once. Backends record work first and only touch the destination at
//! submit time, so any error raised while building the pass leaves it unmodified.

use std::sync::Arc;

use crate::{
    error::{PostProcessError, ScratchRole},
    kernel::BlurKernel,
};

pub mod blur_clip;
pub mod cpu;
#[cfg(feature = "gpu")]
pub mod gpu;
pub mod library;

pub use blur_clip::BlurClip;
pub use cpu::{CpuBackend, CpuImage, CpuTexture};
#[cfg(feature = "gpu")]
pub use gpu::WgpuBackend;
pub use library::{ProgramLibrary, ProgramModule};

/// Side length of a square compute workgroup.
pub const WORKGROUP_SIZE: u32 = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Rgba8Unorm,
    Bgra8Unorm,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> u32 {
        4
    }

    /// Storage texel format name in WGSL.
    pub fn wgsl_name(self) -> &'static str {
        match self {
            Self::Rgba8Unorm => "rgba8unorm",
            Self::Bgra8Unorm => "bgra8unorm",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

impl TextureDesc {
    pub fn byte_len(&self) -> usize {
        (self.width as usize)
            .saturating_mul(self.height as usize)
            .saturating_mul(self.format.bytes_per_pixel() as usize)
    }
}

/// The three programs of the blur-clip pipeline. Entry-point names are shared with the
/// shader sources and must not change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ComputeProgram {
    HorizontalBlur,
    VerticalBlur,
    AlphaMask,
}

impl ComputeProgram {
    pub const ALL: [ComputeProgram; 3] = [
        ComputeProgram::HorizontalBlur,
        ComputeProgram::VerticalBlur,
        ComputeProgram::AlphaMask,
    ];

    pub fn entry_point(self) -> &'static str {
        match self {
            Self::HorizontalBlur => "horizontalGaussianBlur",
            Self::VerticalBlur => "verticalGaussianBlur",
            Self::AlphaMask => "alphaMask",
        }
    }

    /// Texture bindings the program expects, in binding order.
    pub fn texture_count(self) -> usize {
        match self {
            Self::HorizontalBlur | Self::VerticalBlur => 2,
            Self::AlphaMask => 3,
        }
    }

    pub fn uses_kernel(self) -> bool {
        !matches!(self, Self::AlphaMask)
    }
}

/// Workgroup grid for a dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkgroupCount {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl WorkgroupCount {
    /// `ceil(width / 8) x ceil(height / 8) x 1`.
    pub fn for_extent(width: u32, height: u32) -> Self {
        Self {
            x: width.div_ceil(WORKGROUP_SIZE),
            y: height.div_ceil(WORKGROUP_SIZE),
            z: 1,
        }
    }
}

/// One compute dispatch: textures are bound in slice order, the last one is written.
pub struct Dispatch<'a, T, P> {
    pub program: ComputeProgram,
    pub pipeline: &'a P,
    pub textures: &'a [&'a T],
    pub kernel: Option<&'a BlurKernel>,
    pub groups: WorkgroupCount,
}

/// Called once submitted work finishes; `Some` carries an error detected after
/// submission. May run on another thread.
pub type CompletionNotifier = Arc<dyn Fn(Option<String>) + Send + Sync>;

pub fn log_completion() -> CompletionNotifier {
    Arc::new(|fault: Option<String>| {
        if let Some(msg) = fault {
            tracing::error!(error = %msg, "post-process command buffer failed");
        }
    })
}

/// Device capabilities a post-process needs.
pub trait ComputeBackend {
    type Texture;
    type Program;
    type Encoder;

    fn describe(&self, texture: &Self::Texture) -> Result<TextureDesc, PostProcessError>;

    /// Compiled program for `format`. Backends may cache the result.
    fn resolve_program(
        &mut self,
        program: ComputeProgram,
        format: PixelFormat,
    ) -> Result<Self::Program, PostProcessError>;

    fn create_texture(
        &mut self,
        desc: &TextureDesc,
        role: ScratchRole,
    ) -> Result<Self::Texture, PostProcessError>;

    fn begin_commands(&mut self) -> Self::Encoder;

    fn encode_copy(
        &mut self,
        encoder: &mut Self::Encoder,
        src: &Self::Texture,
        dst: &Self::Texture,
    ) -> Result<(), PostProcessError>;

    fn encode_dispatch(
        &mut self,
        encoder: &mut Self::Encoder,
        dispatch: Dispatch<'_, Self::Texture, Self::Program>,
    ) -> Result<(), PostProcessError>;

    /// Submit recorded work. Does not wait for completion.
    fn submit(&mut self, encoder: Self::Encoder, notify: CompletionNotifier);
}

/// Post-render hook run against the frame's color target.
pub trait PostProcess<B: ComputeBackend> {
    fn apply(&self, backend: &mut B, source: Option<&B::Texture>) -> Result<(), PostProcessError>;
}
