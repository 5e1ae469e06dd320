use std::{collections::HashMap, sync::Arc};

use wgpu::util::DeviceExt as _;

use crate::{
    error::{FxError, FxResult, PostProcessError, ScratchRole},
    kernel::BlurKernel,
};

use super::{
    CompletionNotifier, ComputeBackend, ComputeProgram, Dispatch, PixelFormat, ProgramLibrary,
    TextureDesc, WorkgroupCount,
};

/// Usages a post-process source must carry: it is copied from and written by `alphaMask`.
pub const SOURCE_USAGE: wgpu::TextureUsages =
    wgpu::TextureUsages::COPY_SRC.union(wgpu::TextureUsages::STORAGE_BINDING);

/// Usages of textures this backend allocates: scratch textures and uploads.
pub const SCRATCH_USAGE: wgpu::TextureUsages = wgpu::TextureUsages::TEXTURE_BINDING
    .union(wgpu::TextureUsages::STORAGE_BINDING)
    .union(wgpu::TextureUsages::COPY_SRC)
    .union(wgpu::TextureUsages::COPY_DST);

#[derive(Clone, Debug)]
pub struct GpuProgram {
    program: ComputeProgram,
    pipeline: Arc<wgpu::ComputePipeline>,
}

enum GpuOp {
    Copy {
        src: wgpu::Texture,
        dst: wgpu::Texture,
    },
    Dispatch {
        program: GpuProgram,
        textures: Vec<wgpu::Texture>,
        kernel: Option<BlurKernel>,
        groups: WorkgroupCount,
    },
}

/// Work recorded for one submission. Encoding into a real command encoder happens in
/// [`ComputeBackend::submit`], inside a validation error scope.
#[derive(Default)]
pub struct GpuEncoder {
    ops: Vec<GpuOp>,
}

/// Compute backend on a `wgpu` device.
///
/// Compiled pipelines are cached per (program, format) and live until the program
/// library is replaced.
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    library: Option<ProgramLibrary>,
    pipelines: HashMap<(ComputeProgram, PixelFormat), Arc<wgpu::ComputePipeline>>,
}

impl WgpuBackend {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self {
            device,
            queue,
            library: Some(ProgramLibrary::builtin()),
            pipelines: HashMap::new(),
        }
    }

    /// Headless device on the default high-performance adapter.
    pub fn request() -> FxResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| match e {
            wgpu::RequestAdapterError::NotFound { .. } => {
                FxError::render("no gpu adapter available")
            }
            other => FxError::render(format!("wgpu request_adapter failed: {other:?}")),
        })?;

        let required_features = adapter.features() & wgpu::Features::BGRA8UNORM_STORAGE;
        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("rivefx_device"),
            required_features,
            required_limits: wgpu::Limits::default(),
            experimental_features: wgpu::ExperimentalFeatures::default(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::Off,
        }))
        .map_err(|e| FxError::render(format!("wgpu request_device failed: {e:?}")))?;

        tracing::debug!(adapter = ?adapter.get_info().name, "gpu post-process device ready");
        Ok(Self::new(device, queue))
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Swap the program library. Cached pipelines are dropped.
    pub fn reload_library(&mut self, library: Option<ProgramLibrary>) {
        self.library = library;
        self.pipelines.clear();
    }

    pub fn cached_pipelines(&self) -> usize {
        self.pipelines.len()
    }

    /// Texture usable as a blur-clip source, filled with `data`.
    pub fn upload(&self, desc: &TextureDesc, data: &[u8]) -> FxResult<wgpu::Texture> {
        if data.len() != desc.byte_len() {
            return Err(FxError::validation(format!(
                "upload expects {} bytes, got {}",
                desc.byte_len(),
                data.len()
            )));
        }
        let texture = self.device.create_texture(&texture_descriptor(desc, "rivefx_source"));
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(desc.width * desc.format.bytes_per_pixel()),
                rows_per_image: Some(desc.height),
            },
            extent(desc),
        );
        Ok(texture)
    }

    /// Blocking readback of a texture's pixels, rows tightly packed.
    pub fn read_pixels(&self, texture: &wgpu::Texture) -> FxResult<Vec<u8>> {
        let desc = self.describe(texture)?;
        let row_bytes = desc.width * desc.format.bytes_per_pixel();
        let padded_row_bytes = align_to(row_bytes, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
        let readback = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("rivefx_readback"),
            size: u64::from(padded_row_bytes) * u64::from(desc.height),
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("rivefx_readback_encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row_bytes),
                    rows_per_image: Some(desc.height),
                },
            },
            extent(&desc),
        );
        self.queue.submit(Some(encoder.finish()));

        let slice = readback.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |res| {
            let _ = tx.send(res);
        });
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| FxError::render(format!("wgpu poll failed: {e:?}")))?;
        rx.recv()
            .map_err(|_| FxError::render("readback channel closed"))?
            .map_err(|e| FxError::render(format!("readback map failed: {e:?}")))?;

        let mapped = slice.get_mapped_range();
        let mut out = Vec::with_capacity(desc.byte_len());
        for row in 0..desc.height as usize {
            let start = row * padded_row_bytes as usize;
            out.extend_from_slice(&mapped[start..start + row_bytes as usize]);
        }
        drop(mapped);
        readback.unmap();
        Ok(out)
    }

    fn compile(
        &self,
        program: ComputeProgram,
        format: PixelFormat,
    ) -> Result<wgpu::ComputePipeline, PostProcessError> {
        let library = self
            .library
            .as_ref()
            .ok_or(PostProcessError::MissingProgramLibrary)?;
        let module_src = library.find(program.entry_point()).ok_or_else(|| {
            PostProcessError::ProgramResolution {
                entry_point: program.entry_point(),
                reason: format!("not exported by library '{}'", library.label()),
            }
        })?;

        if format == PixelFormat::Bgra8Unorm
            && !self
                .device
                .features()
                .contains(wgpu::Features::BGRA8UNORM_STORAGE)
        {
            return Err(PostProcessError::UnsupportedFormat(
                "bgra8unorm storage textures are not supported by this device".to_string(),
            ));
        }

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(module_src.name.as_str()),
                source: wgpu::ShaderSource::Wgsl(module_src.specialize(format).into()),
            });
        let pipeline = self
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(program.entry_point()),
                layout: None,
                module: &module,
                entry_point: Some(program.entry_point()),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                cache: None,
            });
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(PostProcessError::ProgramResolution {
                entry_point: program.entry_point(),
                reason: err.to_string(),
            });
        }
        Ok(pipeline)
    }
}

impl ComputeBackend for WgpuBackend {
    type Texture = wgpu::Texture;
    type Program = GpuProgram;
    type Encoder = GpuEncoder;

    fn describe(&self, texture: &wgpu::Texture) -> Result<TextureDesc, PostProcessError> {
        let format = match texture.format() {
            wgpu::TextureFormat::Rgba8Unorm => PixelFormat::Rgba8Unorm,
            wgpu::TextureFormat::Bgra8Unorm => PixelFormat::Bgra8Unorm,
            other => return Err(PostProcessError::UnsupportedFormat(format!("{other:?}"))),
        };
        require_usage(texture, SOURCE_USAGE)?;
        Ok(TextureDesc {
            width: texture.width(),
            height: texture.height(),
            format,
        })
    }

    fn resolve_program(
        &mut self,
        program: ComputeProgram,
        format: PixelFormat,
    ) -> Result<GpuProgram, PostProcessError> {
        if self.library.is_none() {
            return Err(PostProcessError::MissingProgramLibrary);
        }
        if let Some(p) = self.pipelines.get(&(program, format)) {
            return Ok(GpuProgram {
                program,
                pipeline: Arc::clone(p),
            });
        }

        let pipeline = Arc::new(self.compile(program, format)?);
        self.pipelines.insert((program, format), Arc::clone(&pipeline));
        tracing::debug!(entry_point = program.entry_point(), ?format, "compiled compute pipeline");
        Ok(GpuProgram { program, pipeline })
    }

    fn create_texture(
        &mut self,
        desc: &TextureDesc,
        role: ScratchRole,
    ) -> Result<wgpu::Texture, PostProcessError> {
        let max = self.device.limits().max_texture_dimension_2d;
        let alloc_err = || PostProcessError::TextureAllocation {
            role,
            width: desc.width,
            height: desc.height,
        };
        if desc.width == 0 || desc.height == 0 || desc.width > max || desc.height > max {
            return Err(alloc_err());
        }

        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let texture = self
            .device
            .create_texture(&texture_descriptor(desc, "rivefx_scratch"));
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            tracing::debug!(%role, error = %err, "scratch texture allocation failed");
            return Err(alloc_err());
        }
        Ok(texture)
    }

    fn begin_commands(&mut self) -> GpuEncoder {
        GpuEncoder::default()
    }

    fn encode_copy(
        &mut self,
        encoder: &mut GpuEncoder,
        src: &wgpu::Texture,
        dst: &wgpu::Texture,
    ) -> Result<(), PostProcessError> {
        let (s, d) = (self.describe(src)?, self.describe(dst)?);
        require_usage(dst, wgpu::TextureUsages::COPY_DST)?;
        if s != d {
            return Err(PostProcessError::TargetMismatch(format!(
                "copy source {}x{} {:?} does not match destination {}x{} {:?}",
                s.width, s.height, s.format, d.width, d.height, d.format
            )));
        }
        encoder.ops.push(GpuOp::Copy {
            src: src.clone(),
            dst: dst.clone(),
        });
        Ok(())
    }

    fn encode_dispatch(
        &mut self,
        encoder: &mut GpuEncoder,
        dispatch: Dispatch<'_, wgpu::Texture, GpuProgram>,
    ) -> Result<(), PostProcessError> {
        let expected = dispatch.program.texture_count();
        if dispatch.textures.len() != expected || dispatch.pipeline.program != dispatch.program {
            return Err(PostProcessError::TargetMismatch(format!(
                "{} expects {expected} textures and its own pipeline",
                dispatch.program.entry_point()
            )));
        }
        if let Some((_, inputs)) = dispatch.textures.split_last() {
            for t in inputs {
                require_usage(t, wgpu::TextureUsages::TEXTURE_BINDING)?;
            }
        }
        if dispatch.program.uses_kernel() && dispatch.kernel.is_none() {
            return Err(PostProcessError::ProgramResolution {
                entry_point: dispatch.program.entry_point(),
                reason: "blur dispatch without a kernel".to_string(),
            });
        }
        encoder.ops.push(GpuOp::Dispatch {
            program: dispatch.pipeline.clone(),
            textures: dispatch.textures.iter().map(|&t| t.clone()).collect(),
            kernel: dispatch.kernel.cloned(),
            groups: dispatch.groups,
        });
        Ok(())
    }

    fn submit(&mut self, encoder: GpuEncoder, notify: CompletionNotifier) {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let mut cmd = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("rivefx_postprocess"),
            });
        for op in &encoder.ops {
            match op {
                GpuOp::Copy { src, dst } => {
                    cmd.copy_texture_to_texture(
                        src.as_image_copy(),
                        dst.as_image_copy(),
                        src.size(),
                    );
                }
                GpuOp::Dispatch {
                    program,
                    textures,
                    kernel,
                    groups,
                } => {
                    let bind_group = self.bind_group(program, textures, kernel.as_ref());
                    let mut pass = cmd.begin_compute_pass(&wgpu::ComputePassDescriptor {
                        label: Some(program.program.entry_point()),
                        timestamp_writes: None,
                    });
                    pass.set_pipeline(&program.pipeline);
                    pass.set_bind_group(0, &bind_group, &[]);
                    pass.dispatch_workgroups(groups.x, groups.y, groups.z);
                }
            }
        }
        self.queue.submit(Some(cmd.finish()));

        let fault = pollster::block_on(self.device.pop_error_scope()).map(|e| e.to_string());
        self.queue.on_submitted_work_done(move || notify(fault));
    }
}

impl WgpuBackend {
    fn bind_group(
        &self,
        program: &GpuProgram,
        textures: &[wgpu::Texture],
        kernel: Option<&BlurKernel>,
    ) -> wgpu::BindGroup {
        let views: Vec<wgpu::TextureView> = textures
            .iter()
            .map(|t| t.create_view(&wgpu::TextureViewDescriptor::default()))
            .collect();
        let layout = program.pipeline.get_bind_group_layout(0);

        let buffers = kernel.map(|k| {
            let mut params = [0u8; 16];
            params[0..4].copy_from_slice(&k.radius().to_le_bytes());
            let params = self
                .device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("rivefx_blur_params"),
                    contents: &params,
                    usage: wgpu::BufferUsages::UNIFORM,
                });
            let weights = self
                .device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("rivefx_blur_weights"),
                    contents: &k.to_le_bytes(),
                    usage: wgpu::BufferUsages::STORAGE,
                });
            (params, weights)
        });
        let mut entries: Vec<wgpu::BindGroupEntry<'_>> = views
            .iter()
            .enumerate()
            .map(|(i, v)| wgpu::BindGroupEntry {
                binding: i as u32,
                resource: wgpu::BindingResource::TextureView(v),
            })
            .collect();

        if let Some((params, weights)) = &buffers {
            entries.push(wgpu::BindGroupEntry {
                binding: 2,
                resource: params.as_entire_binding(),
            });
            entries.push(wgpu::BindGroupEntry {
                binding: 3,
                resource: weights.as_entire_binding(),
            });
        }

        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("rivefx_postprocess_bg"),
            layout: &layout,
            entries: &entries,
        })
    }
}

fn texture_descriptor<'a>(desc: &TextureDesc, label: &'a str) -> wgpu::TextureDescriptor<'a> {
    wgpu::TextureDescriptor {
        label: Some(label),
        size: extent(desc),
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: match desc.format {
            PixelFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
            PixelFormat::Bgra8Unorm => wgpu::TextureFormat::Bgra8Unorm,
        },
        usage: SCRATCH_USAGE,
        view_formats: &[],
    }
}

fn require_usage(
    texture: &wgpu::Texture,
    usage: wgpu::TextureUsages,
) -> Result<(), PostProcessError> {
    if texture.usage().contains(usage) {
        return Ok(());
    }
    Err(PostProcessError::TargetMismatch(format!(
        "texture usage {:?} lacks {:?}",
        texture.usage(),
        usage
    )))
}

fn extent(desc: &TextureDesc) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: desc.width,
        height: desc.height,
        depth_or_array_layers: 1,
    }
}

fn align_to(value: u32, alignment: u32) -> u32 {
    let mask = alignment - 1;
    (value + mask) & !mask
}
