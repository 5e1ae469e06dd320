#![forbid(unsafe_code)]

pub mod foundation {
    pub mod core;
    pub mod error;
}

pub mod artboard;
pub mod config;
pub mod draw;
pub mod kernel;
pub mod layout;
pub mod postprocess;
pub mod render_cpu;
pub mod repeat_draw;
pub mod view;

pub use foundation::{core, error};

pub use artboard::{
    Artboard, ArtboardModel, ModelLoader, Shape, ShapeArtboard, ShapeDocument, ShapeEntry,
    ShapeFileLoader,
};
pub use config::{BlurClipConfig, FxConfig, StressConfig};
pub use crate::core::{Affine, BezPath, Point, Rect, Rgba8Premul, Size, Vec2};
pub use draw::{DrawCommand, DrawContext, Painter, RecordingPainter, SceneContext};
pub use crate::error::{EncoderKind, FxError, FxResult, PostProcessError, ScratchRole};
pub use kernel::{BlurKernel, DEFAULT_BLUR_RADIUS};
pub use layout::{Alignment, Fit, align_transform};
pub use postprocess::{
    BlurClip, ComputeBackend, ComputeProgram, CpuBackend, CpuImage, CpuTexture, PixelFormat,
    PostProcess, ProgramLibrary, TextureDesc,
};
#[cfg(feature = "gpu")]
pub use postprocess::WgpuBackend;
pub use render_cpu::{CpuCanvas, render_view, render_view_texture};
pub use repeat_draw::{DrawStrategy, RepeatCount, RepeatDraw, SingleDraw, grid_offsets};
pub use view::{ArtboardView, FrameHost};
