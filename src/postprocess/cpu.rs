use std::{
    collections::HashMap,
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use rayon::prelude::*;

use crate::{
    error::{EncoderKind, FxError, FxResult, PostProcessError, ScratchRole},
    kernel::BlurKernel,
};

use super::{
    CompletionNotifier, ComputeBackend, ComputeProgram, Dispatch, PixelFormat, ProgramLibrary,
    TextureDesc, WORKGROUP_SIZE, WorkgroupCount,
};

/// Largest texture side the CPU backend will allocate.
pub const CPU_MAX_TEXTURE_DIMENSION: u32 = 16384;

/// Premultiplied 8-bit image owned by a [`CpuTexture`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CpuImage {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Vec<u8>,
}

impl CpuImage {
    pub fn desc(&self) -> TextureDesc {
        TextureDesc {
            width: self.width,
            height: self.height,
            format: self.format,
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = ((y as usize) * (self.width as usize) + (x as usize)) * 4;
        [
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ]
    }
}

/// Shared handle to a CPU-side texture. Clones alias the same pixels.
#[derive(Clone, Debug)]
pub struct CpuTexture(Arc<RwLock<CpuImage>>);

impl CpuTexture {
    pub fn new(desc: TextureDesc) -> Self {
        Self::from_image(CpuImage {
            width: desc.width,
            height: desc.height,
            format: desc.format,
            data: vec![0u8; desc.byte_len()],
        })
    }

    pub fn from_image(image: CpuImage) -> Self {
        Self(Arc::new(RwLock::new(image)))
    }

    pub fn from_pixels(
        width: u32,
        height: u32,
        format: PixelFormat,
        data: Vec<u8>,
    ) -> FxResult<Self> {
        let expected_len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(4))
            .ok_or_else(|| FxError::validation("texture buffer size overflow"))?;
        if data.len() != expected_len {
            return Err(FxError::validation(format!(
                "texture data is {} bytes, expected {expected_len} for {width}x{height}",
                data.len()
            )));
        }
        Ok(Self::from_image(CpuImage {
            width,
            height,
            format,
            data,
        }))
    }

    pub fn desc(&self) -> TextureDesc {
        self.read().desc()
    }

    /// Copy of the current pixels.
    pub fn snapshot(&self) -> CpuImage {
        self.read().clone()
    }

    fn read(&self) -> RwLockReadGuard<'_, CpuImage> {
        self.0.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, CpuImage> {
        self.0.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CpuProgram {
    program: ComputeProgram,
    format: PixelFormat,
}

#[derive(Clone, Debug)]
enum CpuCommand {
    Copy {
        src: CpuTexture,
        dst: CpuTexture,
    },
    Dispatch {
        program: CpuProgram,
        textures: Vec<CpuTexture>,
        weights: Option<Vec<f32>>,
        groups: WorkgroupCount,
    },
}

/// Recorded work; nothing runs until [`ComputeBackend::submit`].
#[derive(Debug, Default)]
pub struct CpuEncoder {
    commands: Vec<CpuCommand>,
}

impl CpuEncoder {
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CpuBackendStats {
    pub programs_compiled: u64,
    pub program_cache_hits: u64,
    pub textures_allocated: u64,
    pub submissions: u64,
}

/// Reference compute backend running the blur-clip programs on the CPU.
///
/// Work executes on the submitting thread when [`ComputeBackend::submit`] is called;
/// the completion notifier runs right after.
pub struct CpuBackend {
    library: Option<ProgramLibrary>,
    programs: HashMap<(ComputeProgram, PixelFormat), CpuProgram>,
    max_texture_dimension: u32,
    command_limit: Option<usize>,
    stats: CpuBackendStats,
}

impl CpuBackend {
    pub fn new() -> Self {
        Self::with_library(Some(ProgramLibrary::builtin()))
    }

    pub fn with_library(library: Option<ProgramLibrary>) -> Self {
        Self {
            library,
            programs: HashMap::new(),
            max_texture_dimension: CPU_MAX_TEXTURE_DIMENSION,
            command_limit: None,
            stats: CpuBackendStats::default(),
        }
    }

    pub fn with_max_texture_dimension(mut self, max: u32) -> Self {
        self.max_texture_dimension = max;
        self
    }

    /// Cap the number of commands one encoder may hold. Recording past the cap fails
    /// with [`PostProcessError::EncoderAllocation`].
    pub fn with_command_limit(mut self, limit: usize) -> Self {
        self.command_limit = Some(limit);
        self
    }

    fn reserve_command(
        &self,
        encoder: &CpuEncoder,
        kind: EncoderKind,
    ) -> Result<(), PostProcessError> {
        match self.command_limit {
            Some(limit) if encoder.len() >= limit => {
                Err(PostProcessError::EncoderAllocation { kind })
            }
            _ => Ok(()),
        }
    }

    /// Swap the program library. Cached programs are dropped.
    pub fn reload_library(&mut self, library: Option<ProgramLibrary>) {
        self.library = library;
        self.programs.clear();
    }

    pub fn stats(&self) -> CpuBackendStats {
        self.stats
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ComputeBackend for CpuBackend {
    type Texture = CpuTexture;
    type Program = CpuProgram;
    type Encoder = CpuEncoder;

    fn describe(&self, texture: &CpuTexture) -> Result<TextureDesc, PostProcessError> {
        Ok(texture.desc())
    }

    fn resolve_program(
        &mut self,
        program: ComputeProgram,
        format: PixelFormat,
    ) -> Result<CpuProgram, PostProcessError> {
        let library = self
            .library
            .as_ref()
            .ok_or(PostProcessError::MissingProgramLibrary)?;

        if let Some(p) = self.programs.get(&(program, format)) {
            self.stats.program_cache_hits += 1;
            return Ok(*p);
        }

        if library.find(program.entry_point()).is_none() {
            return Err(PostProcessError::ProgramResolution {
                entry_point: program.entry_point(),
                reason: format!("not exported by library '{}'", library.label()),
            });
        }

        let compiled = CpuProgram { program, format };
        self.programs.insert((program, format), compiled);
        self.stats.programs_compiled += 1;
        tracing::debug!(entry_point = program.entry_point(), ?format, "cpu program ready");
        Ok(compiled)
    }

    fn create_texture(
        &mut self,
        desc: &TextureDesc,
        role: ScratchRole,
    ) -> Result<CpuTexture, PostProcessError> {
        if desc.width == 0
            || desc.height == 0
            || desc.width > self.max_texture_dimension
            || desc.height > self.max_texture_dimension
        {
            return Err(PostProcessError::TextureAllocation {
                role,
                width: desc.width,
                height: desc.height,
            });
        }
        self.stats.textures_allocated += 1;
        Ok(CpuTexture::new(*desc))
    }

    fn begin_commands(&mut self) -> CpuEncoder {
        CpuEncoder::default()
    }

    fn encode_copy(
        &mut self,
        encoder: &mut CpuEncoder,
        src: &CpuTexture,
        dst: &CpuTexture,
    ) -> Result<(), PostProcessError> {
        self.reserve_command(encoder, EncoderKind::Blit)?;
        let (s, d) = (src.desc(), dst.desc());
        if s != d {
            return Err(PostProcessError::TargetMismatch(format!(
                "copy source {}x{} {:?} does not match destination {}x{} {:?}",
                s.width, s.height, s.format, d.width, d.height, d.format
            )));
        }
        encoder.commands.push(CpuCommand::Copy {
            src: src.clone(),
            dst: dst.clone(),
        });
        Ok(())
    }

    fn encode_dispatch(
        &mut self,
        encoder: &mut CpuEncoder,
        dispatch: Dispatch<'_, CpuTexture, CpuProgram>,
    ) -> Result<(), PostProcessError> {
        self.reserve_command(encoder, EncoderKind::Compute)?;
        let expected = dispatch.program.texture_count();
        if dispatch.textures.len() != expected {
            return Err(PostProcessError::TargetMismatch(format!(
                "{} binds {expected} textures, got {}",
                dispatch.program.entry_point(),
                dispatch.textures.len()
            )));
        }
        if dispatch.pipeline.program != dispatch.program {
            return Err(PostProcessError::ProgramResolution {
                entry_point: dispatch.program.entry_point(),
                reason: format!(
                    "pipeline was compiled for {}",
                    dispatch.pipeline.program.entry_point()
                ),
            });
        }
        let weights = match (dispatch.program.uses_kernel(), dispatch.kernel) {
            (true, Some(k)) => Some(k.weights().to_vec()),
            (true, None) => {
                return Err(PostProcessError::ProgramResolution {
                    entry_point: dispatch.program.entry_point(),
                    reason: "blur dispatch without a kernel".to_string(),
                });
            }
            (false, _) => None,
        };

        encoder.commands.push(CpuCommand::Dispatch {
            program: *dispatch.pipeline,
            textures: dispatch.textures.iter().map(|&t| t.clone()).collect(),
            weights,
            groups: dispatch.groups,
        });
        Ok(())
    }

    fn submit(&mut self, encoder: CpuEncoder, notify: CompletionNotifier) {
        self.stats.submissions += 1;
        let fault = execute(&encoder.commands).err();
        notify(fault);
    }
}

fn execute(commands: &[CpuCommand]) -> Result<(), String> {
    for cmd in commands {
        match cmd {
            CpuCommand::Copy { src, dst } => {
                let data = src.read().data.clone();
                let mut d = dst.write();
                if d.data.len() != data.len() {
                    return Err("copy size changed after encoding".to_string());
                }
                d.data.copy_from_slice(&data);
            }
            CpuCommand::Dispatch {
                program,
                textures,
                weights,
                groups,
            } => run_dispatch(program.program, textures, weights.as_deref(), *groups)?,
        }
    }
    Ok(())
}

fn run_dispatch(
    program: ComputeProgram,
    textures: &[CpuTexture],
    weights: Option<&[f32]>,
    groups: WorkgroupCount,
) -> Result<(), String> {
    let Some((output, inputs)) = textures.split_last() else {
        return Err(format!("{} dispatched without textures", program.entry_point()));
    };
    // Inputs are snapshotted first so an output that aliases an input cannot deadlock.
    let inputs: Vec<CpuImage> = inputs.iter().map(CpuTexture::snapshot).collect();
    let mut out = output.write();

    let width = out.width.min(groups.x.saturating_mul(WORKGROUP_SIZE));
    let height = out.height.min(groups.y.saturating_mul(WORKGROUP_SIZE));
    if groups.z == 0 || width == 0 || height == 0 {
        return Ok(());
    }
    if inputs.iter().any(|i| i.width != out.width || i.height != out.height) {
        return Err(format!("{} bound textures of different sizes", program.entry_point()));
    }

    match (program, inputs.as_slice(), weights) {
        (ComputeProgram::HorizontalBlur, [src], Some(k)) => {
            horizontal_pass(&src.data, &mut out.data, src.width, width, height, k);
        }
        (ComputeProgram::VerticalBlur, [src], Some(k)) => {
            vertical_pass(&src.data, &mut out.data, src.width, src.height, width, height, k);
        }
        (ComputeProgram::AlphaMask, [mask, color], _) => {
            alpha_mask_pass(&mask.data, &color.data, &mut out.data, mask.width, width, height);
        }
        _ => return Err(format!("{} has invalid bindings", program.entry_point())),
    }
    Ok(())
}

fn horizontal_pass(
    src: &[u8],
    dst: &mut [u8],
    stride: u32,
    width: u32,
    height: u32,
    k: &[f32],
) {
    let radius = (k.len() / 2) as i32;
    let w = stride as i32;
    let row_bytes = stride as usize * 4;
    dst.par_chunks_mut(row_bytes)
        .take(height as usize)
        .enumerate()
        .for_each(|(y, row)| {
            let y = y as i32;
            for x in 0..width as i32 {
                let mut acc = [0f32; 4];
                for (ki, &kw) in k.iter().enumerate() {
                    let sx = (x + ki as i32 - radius).clamp(0, w - 1);
                    let idx = ((y * w + sx) as usize) * 4;
                    for c in 0..4 {
                        acc[c] += kw * f32::from(src[idx + c]);
                    }
                }
                let out_idx = (x as usize) * 4;
                for c in 0..4 {
                    row[out_idx + c] = f32_to_u8(acc[c]);
                }
            }
        });
}

fn vertical_pass(
    src: &[u8],
    dst: &mut [u8],
    stride: u32,
    full_height: u32,
    width: u32,
    height: u32,
    k: &[f32],
) {
    let radius = (k.len() / 2) as i32;
    let w = stride as i32;
    let h = full_height as i32;
    let row_bytes = stride as usize * 4;
    dst.par_chunks_mut(row_bytes)
        .take(height as usize)
        .enumerate()
        .for_each(|(y, row)| {
            let y = y as i32;
            for x in 0..width as i32 {
                let mut acc = [0f32; 4];
                for (ki, &kw) in k.iter().enumerate() {
                    let sy = (y + ki as i32 - radius).clamp(0, h - 1);
                    let idx = ((sy * w + x) as usize) * 4;
                    for c in 0..4 {
                        acc[c] += kw * f32::from(src[idx + c]);
                    }
                }
                let out_idx = (x as usize) * 4;
                for c in 0..4 {
                    row[out_idx + c] = f32_to_u8(acc[c]);
                }
            }
        });
}

fn alpha_mask_pass(
    mask: &[u8],
    color: &[u8],
    dst: &mut [u8],
    stride: u32,
    width: u32,
    height: u32,
) {
    let row_bytes = stride as usize * 4;
    dst.par_chunks_mut(row_bytes)
        .take(height as usize)
        .enumerate()
        .for_each(|(y, row)| {
            let base = y * row_bytes;
            for x in 0..width as usize {
                let i = x * 4;
                let a = u16::from(mask[base + i + 3]);
                for c in 0..4 {
                    row[i + c] = mul_div255(u16::from(color[base + i + c]), a);
                }
            }
        });
}

fn f32_to_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

fn mul_div255(x: u16, y: u16) -> u8 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u8
}

/// Blur an RGBA8 buffer with the separable Gaussian used by the blur-clip passes
/// (clamp-to-edge borders).
pub fn blur_rgba8(src: &[u8], width: u32, height: u32, radius: u32) -> FxResult<Vec<u8>> {
    let expected_len = (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(4))
        .ok_or_else(|| FxError::validation("blur buffer size overflow"))?;
    if src.len() != expected_len {
        return Err(FxError::validation(
            "blur_rgba8 expects src matching width*height*4",
        ));
    }
    if width == 0 || height == 0 {
        return Ok(Vec::new());
    }

    let kernel = BlurKernel::gaussian(radius)?;
    let mut tmp = vec![0u8; expected_len];
    let mut out = vec![0u8; expected_len];
    horizontal_pass(src, &mut tmp, width, width, height, kernel.weights());
    vertical_pass(&tmp, &mut out, width, height, width, height, kernel.weights());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn radius_wider_than_the_image_keeps_a_flat_fill() {
        // Every tap past the border clamps back onto the same texel.
        let (w, h) = (3u32, 2u32);
        let px = [10u8, 20u8, 30u8, 40u8];
        let src = px.repeat((w * h) as usize);
        let out = blur_rgba8(&src, w, h, 9).unwrap();
        assert_eq!(out, src);
    }

    #[test]
    fn impulse_spreads_by_the_kernel_weights() {
        let (w, h, radius) = (9u32, 1u32, 2u32);
        let mut src = vec![0u8; (w * h * 4) as usize];
        src[16..20].copy_from_slice(&[255, 255, 255, 255]);

        let out = blur_rgba8(&src, w, h, radius).unwrap();

        let k = BlurKernel::gaussian(radius).unwrap();
        let alphas: Vec<u8> = out.chunks_exact(4).map(|px| px[3]).collect();
        let want: Vec<u8> = (0..w as usize)
            .map(|x| match x {
                2..=6 => f32_to_u8(255.0 * k.weights()[x - 2]),
                _ => 0,
            })
            .collect();
        assert_eq!(alphas, want);
        assert!(alphas[4] > alphas[3] && alphas[3] > alphas[2]);
    }

    #[test]
    fn translucent_fill_is_scaled_by_its_own_alpha() {
        use crate::postprocess::{BlurClip, PostProcess};

        let tex = CpuTexture::from_pixels(
            9,
            9,
            PixelFormat::Rgba8Unorm,
            [10u8, 20, 30, 40].repeat(81),
        )
        .unwrap();
        BlurClip::new(3)
            .apply(&mut CpuBackend::new(), Some(&tex))
            .unwrap();
        // c * 40 / 255, rounded.
        assert_eq!(tex.snapshot().data, [2u8, 3, 5, 6].repeat(81));
    }

    #[test]
    fn blur_clamps_at_edges() {
        // Left half opaque, right half clear: the leftmost column stays fully opaque
        // because samples past the edge repeat the edge texel.
        let (w, h) = (8u32, 1u32);
        let mut src = Vec::new();
        for x in 0..w {
            let a = if x < 4 { 255 } else { 0 };
            src.extend_from_slice(&[a, a, a, a]);
        }
        let out = blur_rgba8(&src, w, h, 2).unwrap();
        assert_eq!(out[3], 255);
        assert!(out[3 * 4 + 3] < 255);
        assert!(out[4 * 4 + 3] > 0);
    }

    #[test]
    fn alpha_mask_scales_all_channels() {
        let mask = [0u8, 0, 0, 128, 0, 0, 0, 255];
        let color = [200u8, 100, 50, 255, 10, 20, 30, 40];
        let mut out = [0u8; 8];
        alpha_mask_pass(&mask, &color, &mut out, 2, 2, 1);
        assert_eq!(out, [100, 50, 25, 128, 10, 20, 30, 40]);
    }

    #[test]
    fn texture_rejects_wrong_length() {
        assert!(CpuTexture::from_pixels(2, 2, PixelFormat::Rgba8Unorm, vec![0; 15]).is_err());
        let t = CpuTexture::from_pixels(2, 1, PixelFormat::Bgra8Unorm, vec![1; 8]).unwrap();
        assert_eq!(t.snapshot().pixel(1, 0), [1, 1, 1, 1]);
    }

    #[test]
    fn programs_are_cached_until_reload() {
        let mut b = CpuBackend::new();
        b.resolve_program(ComputeProgram::AlphaMask, PixelFormat::Rgba8Unorm)
            .unwrap();
        b.resolve_program(ComputeProgram::AlphaMask, PixelFormat::Rgba8Unorm)
            .unwrap();
        assert_eq!(b.stats().programs_compiled, 1);
        assert_eq!(b.stats().program_cache_hits, 1);

        b.reload_library(None);
        assert_eq!(
            b.resolve_program(ComputeProgram::AlphaMask, PixelFormat::Rgba8Unorm),
            Err(PostProcessError::MissingProgramLibrary)
        );
    }
}
