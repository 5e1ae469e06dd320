use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use rivefx::{
    ArtboardModel, ArtboardView, BlurClip, CpuBackend, CpuImage, CpuTexture, FrameHost,
    FxConfig, ModelLoader, PixelFormat, PostProcess, ShapeFileLoader,
    postprocess::CompletionNotifier,
    render_cpu::{premultiply_rgba8_in_place, unpremultiply_rgba8_in_place},
};

#[derive(Parser, Debug)]
#[command(name = "rivefx", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Draw an artboard repeatedly in a grid and write one frame as a PNG.
    Grid(GridArgs),
    /// Apply the blur-clip post-process to a PNG.
    BlurClip(BlurClipArgs),
}

#[derive(Parser, Debug)]
struct GridArgs {
    /// Shape artboard JSON.
    #[arg(long)]
    artboard: PathBuf,

    /// Number of copies to draw (overrides the config).
    #[arg(long)]
    repeat: Option<u32>,

    /// Simulated taps; each adds the configured tap increment to the repeat count.
    #[arg(long, default_value_t = 0)]
    taps: u32,

    /// Grid pitch in artboard units (overrides the config).
    #[arg(long)]
    spacing: Option<f64>,

    #[arg(long, default_value_t = 512)]
    width: u32,

    #[arg(long, default_value_t = 512)]
    height: u32,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,

    /// Run blur-clip on the rendered frame.
    #[arg(long)]
    blur_clip: bool,

    /// Blur radius in pixels (overrides the config).
    #[arg(long)]
    radius: Option<u32>,

    #[arg(long, value_enum, default_value_t = BackendChoice::Cpu)]
    backend: BackendChoice,

    /// Optional JSON config file.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct BlurClipArgs {
    /// Input PNG path.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,

    /// Blur radius in pixels (overrides the config).
    #[arg(long)]
    radius: Option<u32>,

    #[arg(long, value_enum, default_value_t = BackendChoice::Cpu)]
    backend: BackendChoice,

    /// Optional JSON config file.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BackendChoice {
    Cpu,
    Gpu,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Grid(args) => cmd_grid(args),
        Command::BlurClip(args) => cmd_blur_clip(args),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<FxConfig> {
    match path {
        Some(p) => FxConfig::from_json_path(p)
            .with_context(|| format!("load config '{}'", p.display())),
        None => Ok(FxConfig::default()),
    }
}

fn load_model(path: &Path) -> anyhow::Result<Arc<ArtboardModel>> {
    let root = path.parent().unwrap_or_else(|| Path::new("."));
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .with_context(|| format!("artboard path '{}' has no file name", path.display()))?;
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("");

    let model = Arc::new(ArtboardModel::empty());
    let loader: Arc<dyn ModelLoader> = Arc::new(ShapeFileLoader::new(root));
    model
        .load_in_background(loader, name, ext)
        .join()
        .map_err(|_| anyhow::anyhow!("artboard loader thread panicked"))?
        .with_context(|| format!("load artboard '{}'", path.display()))?;
    Ok(model)
}

/// Blur-clip pass whose completion fault is captured for the caller.
fn blur_clip_with_fault_slot(radius: u32) -> (BlurClip, Arc<Mutex<Option<String>>>) {
    let slot = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&slot);
    let notify: CompletionNotifier = Arc::new(move |fault: Option<String>| {
        if let Some(msg) = fault {
            tracing::error!(error = %msg, "blur-clip command buffer failed");
            *sink.lock().unwrap_or_else(|p| p.into_inner()) = Some(msg);
        }
    });
    (BlurClip::new(radius).with_notifier(notify), slot)
}

fn check_fault(slot: &Mutex<Option<String>>) -> anyhow::Result<()> {
    if let Some(msg) = slot.lock().unwrap_or_else(|p| p.into_inner()).take() {
        anyhow::bail!("blur-clip failed on the device: {msg}");
    }
    Ok(())
}

fn cmd_grid(args: GridArgs) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(r) = args.repeat {
        config.stress.repeat = r;
    }
    if let Some(s) = args.spacing {
        config.stress.spacing = s;
    }
    if let Some(r) = args.radius {
        config.blur_clip.radius = r;
    }
    config.validate()?;

    let model = load_model(&args.artboard)?;
    let strategy = config.stress.strategy();
    let count = strategy.count();
    if args.taps > 0 {
        let n = config.stress.apply_taps(&count, args.taps);
        tracing::info!(repeat = n, taps = args.taps, "applied taps");
    }

    let mut view = ArtboardView::with_strategy(model, Box::new(strategy));
    view.fit = config.stress.fit;
    view.alignment = config.stress.alignment;

    let image = match args.backend {
        BackendChoice::Cpu => grid_cpu(view, &config, &args)?,
        BackendChoice::Gpu => grid_gpu(view, &config, &args)?,
    };

    write_png(&args.out, image)?;
    eprintln!("wrote {} ({} copies)", args.out.display(), count.get());
    Ok(())
}

fn grid_cpu(view: ArtboardView, config: &FxConfig, args: &GridArgs) -> anyhow::Result<CpuImage> {
    let mut host = FrameHost::<CpuBackend>::new(view);
    let mut fault = None;
    if args.blur_clip {
        let (pass, slot) = blur_clip_with_fault_slot(config.blur_clip.radius);
        host = host.with_post_process(Box::new(pass));
        fault = Some(slot);
    }

    let target = rivefx::render_view_texture(&host.view, args.width, args.height, None)?;
    let mut backend = CpuBackend::new();
    host.postprocess(&mut backend, Some(&target));
    if let Some(slot) = fault {
        check_fault(&slot)?;
    }
    Ok(target.snapshot())
}

#[cfg(feature = "gpu")]
fn grid_gpu(view: ArtboardView, config: &FxConfig, args: &GridArgs) -> anyhow::Result<CpuImage> {
    use rivefx::WgpuBackend;

    let mut host = FrameHost::<WgpuBackend>::new(view);
    let mut fault = None;
    if args.blur_clip {
        let (pass, slot) = blur_clip_with_fault_slot(config.blur_clip.radius);
        host = host.with_post_process(Box::new(pass));
        fault = Some(slot);
    }

    let frame = rivefx::render_view(&host.view, args.width, args.height, None)?;
    let mut backend = WgpuBackend::request()?;
    let target = backend.upload(&frame.desc(), &frame.data)?;
    host.postprocess(&mut backend, Some(&target));
    let data = backend.read_pixels(&target)?;
    if let Some(slot) = fault {
        check_fault(&slot)?;
    }
    Ok(CpuImage { data, ..frame })
}

#[cfg(not(feature = "gpu"))]
fn grid_gpu(_view: ArtboardView, _config: &FxConfig, _args: &GridArgs) -> anyhow::Result<CpuImage> {
    anyhow::bail!("rivefx was built without the `gpu` feature")
}

fn cmd_blur_clip(args: BlurClipArgs) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(r) = args.radius {
        config.blur_clip.radius = r;
    }
    config.validate()?;

    let image = read_png(&args.in_path)?;
    let (pass, slot) = blur_clip_with_fault_slot(config.blur_clip.radius);

    let out = match args.backend {
        BackendChoice::Cpu => {
            let target = CpuTexture::from_image(image);
            pass.apply(&mut CpuBackend::new(), Some(&target))?;
            target.snapshot()
        }
        BackendChoice::Gpu => blur_clip_gpu(&pass, image)?,
    };
    check_fault(&slot)?;

    write_png(&args.out, out)?;
    eprintln!("wrote {}", args.out.display());
    Ok(())
}

#[cfg(feature = "gpu")]
fn blur_clip_gpu(pass: &BlurClip, image: CpuImage) -> anyhow::Result<CpuImage> {
    let mut backend = rivefx::WgpuBackend::request()?;
    let target = backend.upload(&image.desc(), &image.data)?;
    pass.apply(&mut backend, Some(&target))?;
    let data = backend.read_pixels(&target)?;
    Ok(CpuImage { data, ..image })
}

#[cfg(not(feature = "gpu"))]
fn blur_clip_gpu(_pass: &BlurClip, _image: CpuImage) -> anyhow::Result<CpuImage> {
    anyhow::bail!("rivefx was built without the `gpu` feature")
}

fn read_png(path: &Path) -> anyhow::Result<CpuImage> {
    let img = image::open(path)
        .with_context(|| format!("read image '{}'", path.display()))?
        .to_rgba8();
    let (width, height) = img.dimensions();
    let mut data = img.into_raw();
    premultiply_rgba8_in_place(&mut data);
    Ok(CpuImage {
        width,
        height,
        format: PixelFormat::Rgba8Unorm,
        data,
    })
}

fn write_png(path: &Path, mut image: CpuImage) -> anyhow::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }

    unpremultiply_rgba8_in_place(&mut image.data);
    image::save_buffer_with_format(
        path,
        &image.data,
        image.width,
        image.height,
        image::ColorType::Rgba8,
        image::ImageFormat::Png,
    )
    .with_context(|| format!("write png '{}'", path.display()))?;
    Ok(())
}
