use crate::{
    artboard::Artboard,
    core::{Affine, BezPath, Rect, Rgba8Premul},
    layout::{Alignment, Fit, align_transform},
};

/// Sink for the primitive fills an [`Artboard`] emits.
pub trait Painter {
    fn fill_path(&mut self, path: &BezPath, transform: Affine, color: Rgba8Premul);
}

/// Stateful drawing surface a frame hook draws into.
///
/// `transform` post-multiplies the current matrix, so later transforms are expressed in
/// the coordinate space established by earlier ones.
pub trait DrawContext {
    fn align(&mut self, frame: Rect, content: Rect, alignment: Alignment, fit: Fit);
    fn save(&mut self);
    fn restore(&mut self);
    fn transform(&mut self, m: Affine);
    fn draw_artboard(&mut self, artboard: &dyn Artboard);
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DrawCommand {
    Align {
        frame: Rect,
        content: Rect,
        alignment: Alignment,
        fit: Fit,
    },
    Save,
    Restore,
    Transform(Affine),
    DrawArtboard,
}

/// Number of `DrawArtboard` commands in a command list.
pub fn draw_count(commands: &[DrawCommand]) -> usize {
    commands
        .iter()
        .filter(|c| matches!(c, DrawCommand::DrawArtboard))
        .count()
}

pub fn replay(commands: &[DrawCommand], artboard: &dyn Artboard, ctx: &mut dyn DrawContext) {
    for cmd in commands {
        match *cmd {
            DrawCommand::Align {
                frame,
                content,
                alignment,
                fit,
            } => ctx.align(frame, content, alignment, fit),
            DrawCommand::Save => ctx.save(),
            DrawCommand::Restore => ctx.restore(),
            DrawCommand::Transform(m) => ctx.transform(m),
            DrawCommand::DrawArtboard => ctx.draw_artboard(artboard),
        }
    }
}

/// [`DrawContext`] with a save/restore matrix stack that forwards artboard draws to a
/// [`Painter`].
pub struct SceneContext<P> {
    painter: P,
    current: Affine,
    stack: Vec<Affine>,
}

impl<P: Painter> SceneContext<P> {
    pub fn new(painter: P) -> Self {
        Self {
            painter,
            current: Affine::IDENTITY,
            stack: Vec::new(),
        }
    }

    pub fn current_transform(&self) -> Affine {
        self.current
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn painter(&self) -> &P {
        &self.painter
    }

    pub fn into_painter(self) -> P {
        self.painter
    }
}

impl<P: Painter> DrawContext for SceneContext<P> {
    fn align(&mut self, frame: Rect, content: Rect, alignment: Alignment, fit: Fit) {
        self.current *= align_transform(frame, content, fit, alignment);
    }

    fn save(&mut self) {
        self.stack.push(self.current);
    }

    fn restore(&mut self) {
        match self.stack.pop() {
            Some(m) => self.current = m,
            None => tracing::debug!("restore without matching save ignored"),
        }
    }

    fn transform(&mut self, m: Affine) {
        self.current *= m;
    }

    fn draw_artboard(&mut self, artboard: &dyn Artboard) {
        artboard.draw(&mut self.painter, self.current);
    }
}

/// Painter that records every fill; useful for inspecting what a frame produced.
#[derive(Clone, Debug, Default)]
pub struct RecordingPainter {
    pub fills: Vec<(BezPath, Affine, Rgba8Premul)>,
}

impl Painter for RecordingPainter {
    fn fill_path(&mut self, path: &BezPath, transform: Affine, color: Rgba8Premul) {
        self.fills.push((path.clone(), transform, color));
    }
}
