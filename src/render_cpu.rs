use crate::{
    core::{Affine, BezPath, Point, Rgba8Premul, Size},
    draw::{Painter, SceneContext},
    error::{FxError, FxResult},
    postprocess::{CpuImage, CpuTexture, PixelFormat},
    view::ArtboardView,
};

/// [`Painter`] that rasterizes fills with `vello_cpu`.
pub struct CpuCanvas {
    ctx: vello_cpu::RenderContext,
    width: u16,
    height: u16,
    fills: usize,
}

impl CpuCanvas {
    /// Canvas of `width` x `height` pixels, optionally flood-filled with `background`.
    pub fn new(width: u32, height: u32, background: Option<Rgba8Premul>) -> FxResult<Self> {
        if width == 0 || height == 0 {
            return Err(FxError::validation("canvas width/height must be > 0"));
        }
        let w: u16 = width
            .try_into()
            .map_err(|_| FxError::validation("canvas width exceeds u16"))?;
        let h: u16 = height
            .try_into()
            .map_err(|_| FxError::validation("canvas height exceeds u16"))?;

        let mut ctx = vello_cpu::RenderContext::new(w, h);
        ctx.set_paint_transform(vello_cpu::kurbo::Affine::IDENTITY);
        if let Some(bg) = background
            && bg.a > 0
        {
            let [r, g, b, a] = bg.to_straight_rgba();
            ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
            ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(r, g, b, a));
            ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
                0.0,
                0.0,
                f64::from(w),
                f64::from(h),
            ));
        }

        Ok(Self {
            ctx,
            width: w,
            height: h,
            fills: 0,
        })
    }

    pub fn width(&self) -> u32 {
        u32::from(self.width)
    }

    pub fn height(&self) -> u32 {
        u32::from(self.height)
    }

    /// Paths filled so far, background excluded.
    pub fn fill_count(&self) -> usize {
        self.fills
    }

    /// Flush pending fills and return the premultiplied RGBA8 pixels.
    pub fn finish(mut self) -> CpuImage {
        let mut pixmap = vello_cpu::Pixmap::new(self.width, self.height);
        self.ctx.flush();
        self.ctx.render_to_pixmap(&mut pixmap);
        CpuImage {
            width: u32::from(self.width),
            height: u32::from(self.height),
            format: PixelFormat::Rgba8Unorm,
            data: pixmap.data_as_u8_slice().to_vec(),
        }
    }
}

impl Painter for CpuCanvas {
    fn fill_path(&mut self, path: &BezPath, transform: Affine, color: Rgba8Premul) {
        if color.a == 0 {
            return;
        }
        let [r, g, b, a] = color.to_straight_rgba();
        self.ctx.set_transform(affine_to_cpu(transform));
        self.ctx
            .set_paint(vello_cpu::peniko::Color::from_rgba8(r, g, b, a));
        self.ctx.fill_path(&bezpath_to_cpu(path));
        self.fills += 1;
    }
}

/// Draw one frame of `view` at the canvas origin and return the rendered pixels.
#[tracing::instrument(level = "debug", skip(view, background))]
pub fn render_view(
    view: &ArtboardView,
    width: u32,
    height: u32,
    background: Option<Rgba8Premul>,
) -> FxResult<CpuImage> {
    let canvas = CpuCanvas::new(width, height, background)?;
    let mut ctx = SceneContext::new(canvas);
    let draws = view.draw_frame(
        &mut ctx,
        Point::ZERO,
        Size::new(f64::from(width), f64::from(height)),
    );
    let canvas = ctx.into_painter();
    tracing::debug!(draws, fills = canvas.fill_count(), "frame rasterized");
    Ok(canvas.finish())
}

/// Same as [`render_view`] but wrapped as a texture the CPU compute backend can process.
pub fn render_view_texture(
    view: &ArtboardView,
    width: u32,
    height: u32,
    background: Option<Rgba8Premul>,
) -> FxResult<CpuTexture> {
    render_view(view, width, height, background).map(CpuTexture::from_image)
}

/// Straight-alpha RGBA8 (as stored in PNG files) to premultiplied, in place.
pub fn premultiply_rgba8_in_place(data: &mut [u8]) {
    for px in data.chunks_exact_mut(4) {
        let c = Rgba8Premul::from_straight_rgba(px[0], px[1], px[2], px[3]);
        px.copy_from_slice(&c.to_array());
    }
}

/// Premultiplied RGBA8 back to straight alpha, in place.
pub fn unpremultiply_rgba8_in_place(data: &mut [u8]) {
    for px in data.chunks_exact_mut(4) {
        let c = Rgba8Premul {
            r: px[0],
            g: px[1],
            b: px[2],
            a: px[3],
        };
        px.copy_from_slice(&c.to_straight_rgba());
    }
}

fn affine_to_cpu(a: Affine) -> vello_cpu::kurbo::Affine {
    vello_cpu::kurbo::Affine::new(a.as_coeffs())
}

fn point_to_cpu(p: Point) -> vello_cpu::kurbo::Point {
    vello_cpu::kurbo::Point::new(p.x, p.y)
}

fn bezpath_to_cpu(path: &BezPath) -> vello_cpu::kurbo::BezPath {
    use kurbo::PathEl;

    let mut out = vello_cpu::kurbo::BezPath::new();
    for &el in path.elements() {
        match el {
            PathEl::MoveTo(p) => out.move_to(point_to_cpu(p)),
            PathEl::LineTo(p) => out.line_to(point_to_cpu(p)),
            PathEl::QuadTo(p1, p2) => out.quad_to(point_to_cpu(p1), point_to_cpu(p2)),
            PathEl::CurveTo(p1, p2, p3) => {
                out.curve_to(point_to_cpu(p1), point_to_cpu(p2), point_to_cpu(p3));
            }
            PathEl::ClosePath => out.close_path(),
        }
    }
    out
}
