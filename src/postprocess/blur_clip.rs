use crate::{
    error::{PostProcessError, ScratchRole},
    kernel::{BlurKernel, DEFAULT_BLUR_RADIUS},
};

use super::{
    CompletionNotifier, ComputeBackend, ComputeProgram, Dispatch, PostProcess, TextureDesc,
    WorkgroupCount, log_completion,
};

/// Blurs the alpha of a rendered frame and uses it to mask the frame in place, giving
/// it soft edges.
///
/// Stages, recorded into one encoder and submitted once:
/// 1. copy source -> original
/// 2. `horizontalGaussianBlur`: original -> horizontal
/// 3. `verticalGaussianBlur`: horizontal -> blurred
/// 4. `alphaMask`: (blurred, original, source), writes source
#[derive(Clone)]
pub struct BlurClip {
    radius: u32,
    notify: CompletionNotifier,
}

impl BlurClip {
    pub fn new(radius: u32) -> Self {
        Self {
            radius,
            notify: log_completion(),
        }
    }

    pub fn with_notifier(mut self, notify: CompletionNotifier) -> Self {
        self.notify = notify;
        self
    }

    pub fn radius(&self) -> u32 {
        self.radius
    }

    /// Run the pass, logging instead of returning any failure. The source is left
    /// unchanged when the pass cannot be built.
    pub fn run<B: ComputeBackend>(&self, backend: &mut B, source: Option<&B::Texture>) -> bool {
        match self.apply(backend, source) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, radius = self.radius, "blur-clip post-process failed");
                false
            }
        }
    }
}

impl Default for BlurClip {
    fn default() -> Self {
        Self::new(DEFAULT_BLUR_RADIUS)
    }
}

impl std::fmt::Debug for BlurClip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlurClip")
            .field("radius", &self.radius)
            .finish_non_exhaustive()
    }
}

fn check_matches<B: ComputeBackend>(
    backend: &B,
    texture: &B::Texture,
    expected: &TextureDesc,
    role: ScratchRole,
) -> Result<(), PostProcessError> {
    let got = backend.describe(texture)?;
    if got != *expected {
        return Err(PostProcessError::TargetMismatch(format!(
            "{role} texture is {}x{} {:?}, source is {}x{} {:?}",
            got.width, got.height, got.format, expected.width, expected.height, expected.format
        )));
    }
    Ok(())
}

impl<B: ComputeBackend> PostProcess<B> for BlurClip {
    #[tracing::instrument(level = "debug", skip_all, fields(radius = self.radius))]
    fn apply(&self, backend: &mut B, source: Option<&B::Texture>) -> Result<(), PostProcessError> {
        let source = source.ok_or(PostProcessError::MissingSourceTexture)?;
        let desc = backend.describe(source)?;
        if desc.width == 0 || desc.height == 0 {
            return Err(PostProcessError::TargetMismatch(format!(
                "source has empty extent {}x{}",
                desc.width, desc.height
            )));
        }

        let kernel = BlurKernel::gaussian(self.radius)?;

        let horizontal = backend.resolve_program(ComputeProgram::HorizontalBlur, desc.format)?;
        let vertical = backend.resolve_program(ComputeProgram::VerticalBlur, desc.format)?;
        let alpha_mask = backend.resolve_program(ComputeProgram::AlphaMask, desc.format)?;

        let original = backend.create_texture(&desc, ScratchRole::Original)?;
        let horizontal_out = backend.create_texture(&desc, ScratchRole::HorizontalBlur)?;
        let blurred = backend.create_texture(&desc, ScratchRole::Blurred)?;
        check_matches(backend, &original, &desc, ScratchRole::Original)?;
        check_matches(backend, &horizontal_out, &desc, ScratchRole::HorizontalBlur)?;
        check_matches(backend, &blurred, &desc, ScratchRole::Blurred)?;

        let groups = WorkgroupCount::for_extent(desc.width, desc.height);
        let mut encoder = backend.begin_commands();

        backend.encode_copy(&mut encoder, source, &original)?;
        backend.encode_dispatch(
            &mut encoder,
            Dispatch {
                program: ComputeProgram::HorizontalBlur,
                pipeline: &horizontal,
                textures: &[&original, &horizontal_out],
                kernel: Some(&kernel),
                groups,
            },
        )?;
        backend.encode_dispatch(
            &mut encoder,
            Dispatch {
                program: ComputeProgram::VerticalBlur,
                pipeline: &vertical,
                textures: &[&horizontal_out, &blurred],
                kernel: Some(&kernel),
                groups,
            },
        )?;
        backend.encode_dispatch(
            &mut encoder,
            Dispatch {
                program: ComputeProgram::AlphaMask,
                pipeline: &alpha_mask,
                textures: &[&blurred, &original, source],
                kernel: None,
                groups,
            },
        )?;

        backend.submit(encoder, self.notify.clone());
        tracing::debug!(
            width = desc.width,
            height = desc.height,
            groups_x = groups.x,
            groups_y = groups.y,
            "blur-clip submitted"
        );
        Ok(())
    }
}
