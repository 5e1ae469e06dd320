use std::sync::{Arc, Mutex};

use rivefx::{
    BlurClip, ComputeBackend, ComputeProgram, EncoderKind, PixelFormat, PostProcess,
    PostProcessError, ScratchRole, TextureDesc,
    postprocess::{CompletionNotifier, Dispatch, WorkgroupCount},
};

#[derive(Clone, Debug)]
struct MockTexture {
    id: usize,
    desc: TextureDesc,
    writes: Arc<Mutex<u32>>,
}

impl MockTexture {
    fn writes(&self) -> u32 {
        *self.writes.lock().unwrap()
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Call {
    Resolve(ComputeProgram),
    Create(ScratchRole),
    Begin,
    Copy {
        src: usize,
        dst: usize,
    },
    Dispatch {
        program: ComputeProgram,
        textures: Vec<usize>,
        kernel_taps: Option<usize>,
        groups: WorkgroupCount,
    },
    Submit,
}

#[derive(Clone, Copy, Debug)]
enum Fault {
    NoLibrary,
    MissingProgram(ComputeProgram),
    Texture(ScratchRole),
    WrongScratchSize(ScratchRole),
    Encoder(EncoderKind),
}

#[derive(Default)]
struct MockBackend {
    calls: Vec<Call>,
    fault: Option<Fault>,
    next_id: usize,
}

#[derive(Default)]
struct MockEncoder {
    outputs: Vec<MockTexture>,
}

impl MockBackend {
    fn failing(fault: Fault) -> Self {
        Self {
            fault: Some(fault),
            ..Self::default()
        }
    }

    fn source(&mut self, width: u32, height: u32) -> MockTexture {
        self.next_id += 1;
        MockTexture {
            id: 0,
            desc: TextureDesc {
                width,
                height,
                format: PixelFormat::Bgra8Unorm,
            },
            writes: Arc::default(),
        }
    }

    fn dispatched(&self) -> Vec<ComputeProgram> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Dispatch { program, .. } => Some(*program),
                _ => None,
            })
            .collect()
    }
}

impl ComputeBackend for MockBackend {
    type Texture = MockTexture;
    type Program = ComputeProgram;
    type Encoder = MockEncoder;

    fn describe(&self, texture: &MockTexture) -> Result<TextureDesc, PostProcessError> {
        Ok(texture.desc)
    }

    fn resolve_program(
        &mut self,
        program: ComputeProgram,
        _format: PixelFormat,
    ) -> Result<ComputeProgram, PostProcessError> {
        self.calls.push(Call::Resolve(program));
        match self.fault {
            Some(Fault::NoLibrary) => Err(PostProcessError::MissingProgramLibrary),
            Some(Fault::MissingProgram(p)) if p == program => {
                Err(PostProcessError::ProgramResolution {
                    entry_point: program.entry_point(),
                    reason: "not exported".to_string(),
                })
            }
            _ => Ok(program),
        }
    }

    fn create_texture(
        &mut self,
        desc: &TextureDesc,
        role: ScratchRole,
    ) -> Result<MockTexture, PostProcessError> {
        self.calls.push(Call::Create(role));
        let mut desc = *desc;
        match self.fault {
            Some(Fault::Texture(r)) if r == role => {
                return Err(PostProcessError::TextureAllocation {
                    role,
                    width: desc.width,
                    height: desc.height,
                });
            }
            Some(Fault::WrongScratchSize(r)) if r == role => desc.width += 1,
            _ => {}
        }
        self.next_id += 1;
        Ok(MockTexture {
            id: self.next_id - 1,
            desc,
            writes: Arc::default(),
        })
    }

    fn begin_commands(&mut self) -> MockEncoder {
        self.calls.push(Call::Begin);
        MockEncoder::default()
    }

    fn encode_copy(
        &mut self,
        encoder: &mut MockEncoder,
        src: &MockTexture,
        dst: &MockTexture,
    ) -> Result<(), PostProcessError> {
        if let Some(Fault::Encoder(EncoderKind::Blit)) = self.fault {
            return Err(PostProcessError::EncoderAllocation {
                kind: EncoderKind::Blit,
            });
        }
        self.calls.push(Call::Copy {
            src: src.id,
            dst: dst.id,
        });
        encoder.outputs.push(dst.clone());
        Ok(())
    }

    fn encode_dispatch(
        &mut self,
        encoder: &mut MockEncoder,
        dispatch: Dispatch<'_, MockTexture, ComputeProgram>,
    ) -> Result<(), PostProcessError> {
        if let Some(Fault::Encoder(EncoderKind::Compute)) = self.fault {
            return Err(PostProcessError::EncoderAllocation {
                kind: EncoderKind::Compute,
            });
        }
        assert_eq!(*dispatch.pipeline, dispatch.program);
        self.calls.push(Call::Dispatch {
            program: dispatch.program,
            textures: dispatch.textures.iter().map(|t| t.id).collect(),
            kernel_taps: dispatch.kernel.map(|k| k.len()),
            groups: dispatch.groups,
        });
        if let Some(out) = dispatch.textures.last() {
            encoder.outputs.push((*out).clone());
        }
        Ok(())
    }

    fn submit(&mut self, encoder: MockEncoder, notify: CompletionNotifier) {
        self.calls.push(Call::Submit);
        for t in encoder.outputs {
            *t.writes.lock().unwrap() += 1;
        }
        notify(None);
    }
}

#[test]
fn stages_run_in_order_with_fixed_bindings() {
    let mut backend = MockBackend::default();
    let source = backend.source(100, 30);
    let notified = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&notified);
    let pass = BlurClip::new(25).with_notifier(Arc::new(move |fault: Option<String>| {
        sink.lock().unwrap().push(fault);
    }));

    pass.apply(&mut backend, Some(&source)).unwrap();

    let groups = WorkgroupCount { x: 13, y: 4, z: 1 };
    assert_eq!(
        backend.calls,
        vec![
            Call::Resolve(ComputeProgram::HorizontalBlur),
            Call::Resolve(ComputeProgram::VerticalBlur),
            Call::Resolve(ComputeProgram::AlphaMask),
            Call::Create(ScratchRole::Original),
            Call::Create(ScratchRole::HorizontalBlur),
            Call::Create(ScratchRole::Blurred),
            Call::Begin,
            Call::Copy { src: 0, dst: 1 },
            Call::Dispatch {
                program: ComputeProgram::HorizontalBlur,
                textures: vec![1, 2],
                kernel_taps: Some(51),
                groups,
            },
            Call::Dispatch {
                program: ComputeProgram::VerticalBlur,
                textures: vec![2, 3],
                kernel_taps: Some(51),
                groups,
            },
            Call::Dispatch {
                program: ComputeProgram::AlphaMask,
                textures: vec![3, 1, 0],
                kernel_taps: None,
                groups,
            },
            Call::Submit,
        ]
    );
    assert_eq!(source.writes(), 1);
    assert_eq!(*notified.lock().unwrap(), vec![None]);
}

#[test]
fn each_program_dispatches_exactly_once() {
    let mut backend = MockBackend::default();
    let source = backend.source(8, 8);
    BlurClip::default().apply(&mut backend, Some(&source)).unwrap();
    assert_eq!(backend.dispatched(), ComputeProgram::ALL.to_vec());
}

#[test]
fn missing_source_fails_before_any_device_work() {
    let mut backend = MockBackend::default();
    let err = BlurClip::default().apply(&mut backend, None).unwrap_err();
    assert_eq!(err, PostProcessError::MissingSourceTexture);
    assert!(backend.calls.is_empty());
}

#[test]
fn every_failure_is_distinct_and_leaves_the_source_alone() {
    let cases: Vec<(Fault, PostProcessError)> = vec![
        (Fault::NoLibrary, PostProcessError::MissingProgramLibrary),
        (
            Fault::MissingProgram(ComputeProgram::VerticalBlur),
            PostProcessError::ProgramResolution {
                entry_point: "verticalGaussianBlur",
                reason: "not exported".to_string(),
            },
        ),
        (
            Fault::Texture(ScratchRole::Blurred),
            PostProcessError::TextureAllocation {
                role: ScratchRole::Blurred,
                width: 16,
                height: 16,
            },
        ),
        (
            Fault::Encoder(EncoderKind::Blit),
            PostProcessError::EncoderAllocation {
                kind: EncoderKind::Blit,
            },
        ),
        (
            Fault::Encoder(EncoderKind::Compute),
            PostProcessError::EncoderAllocation {
                kind: EncoderKind::Compute,
            },
        ),
    ];

    for (fault, expected) in cases {
        let mut backend = MockBackend::failing(fault);
        let source = backend.source(16, 16);
        let err = BlurClip::default()
            .apply(&mut backend, Some(&source))
            .unwrap_err();
        assert_eq!(err, expected, "{fault:?}");
        assert_eq!(source.writes(), 0, "{fault:?}");
        assert!(!backend.calls.contains(&Call::Submit), "{fault:?}");
    }
}

#[test]
fn missing_program_stops_resolution_early() {
    let mut backend = MockBackend::failing(Fault::MissingProgram(ComputeProgram::HorizontalBlur));
    let source = backend.source(4, 4);
    assert!(BlurClip::default().apply(&mut backend, Some(&source)).is_err());
    assert_eq!(
        backend.calls,
        vec![Call::Resolve(ComputeProgram::HorizontalBlur)]
    );
}

#[test]
fn scratch_with_wrong_extent_is_rejected_before_encoding() {
    let mut backend = MockBackend::failing(Fault::WrongScratchSize(ScratchRole::HorizontalBlur));
    let source = backend.source(4, 4);
    let err = BlurClip::default()
        .apply(&mut backend, Some(&source))
        .unwrap_err();
    assert!(matches!(err, PostProcessError::TargetMismatch(_)));
    assert!(!backend.calls.contains(&Call::Begin));
    assert_eq!(source.writes(), 0);
}

#[test]
fn zero_radius_is_rejected() {
    let mut backend = MockBackend::default();
    let source = backend.source(4, 4);
    let err = BlurClip::new(0).apply(&mut backend, Some(&source)).unwrap_err();
    assert_eq!(err, PostProcessError::InvalidRadius(0));
    assert!(backend.calls.is_empty());
}

#[test]
fn run_swallows_failures() {
    let mut backend = MockBackend::failing(Fault::NoLibrary);
    let source = backend.source(4, 4);
    assert!(!BlurClip::default().run(&mut backend, Some(&source)));
    assert_eq!(source.writes(), 0);

    let mut backend = MockBackend::default();
    let source = backend.source(4, 4);
    assert!(BlurClip::default().run(&mut backend, Some(&source)));
    assert_eq!(source.writes(), 1);
}
