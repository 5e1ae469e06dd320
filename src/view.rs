use std::sync::Arc;

use crate::{
    artboard::ArtboardModel,
    core::{Point, Size, frame_rect},
    draw::{DrawContext, replay},
    layout::{Alignment, Fit},
    postprocess::{ComputeBackend, PostProcess},
    repeat_draw::{DrawStrategy, SingleDraw},
};

/// Host-side view: draws the model's artboard through a [`DrawStrategy`].
pub struct ArtboardView {
    model: Arc<ArtboardModel>,
    strategy: Box<dyn DrawStrategy>,
    pub fit: Fit,
    pub alignment: Alignment,
}

impl ArtboardView {
    pub fn new(model: Arc<ArtboardModel>) -> Self {
        Self::with_strategy(model, Box::new(SingleDraw))
    }

    pub fn with_strategy(model: Arc<ArtboardModel>, strategy: Box<dyn DrawStrategy>) -> Self {
        Self {
            model,
            strategy,
            fit: Fit::Contain,
            alignment: Alignment::Center,
        }
    }

    pub fn model(&self) -> &Arc<ArtboardModel> {
        &self.model
    }

    /// Per-frame draw hook. Returns the number of artboard draws issued; zero when the
    /// artboard is not loaded yet.
    #[tracing::instrument(level = "trace", skip(self, ctx))]
    pub fn draw_frame(&self, ctx: &mut dyn DrawContext, origin: Point, size: Size) -> usize {
        let Some(artboard) = self.model.artboard() else {
            return 0;
        };

        let dest = frame_rect(origin, size);
        let commands = self
            .strategy
            .render_frame(dest, artboard.bounds(), self.alignment, self.fit);
        replay(&commands, artboard.as_ref(), ctx);
        crate::draw::draw_count(&commands)
    }
}

/// A view plus an optional post-process run after each frame's draw.
pub struct FrameHost<B: ComputeBackend> {
    pub view: ArtboardView,
    post: Option<Box<dyn PostProcess<B>>>,
}

impl<B: ComputeBackend> FrameHost<B> {
    pub fn new(view: ArtboardView) -> Self {
        Self { view, post: None }
    }

    pub fn with_post_process(mut self, post: Box<dyn PostProcess<B>>) -> Self {
        self.post = Some(post);
        self
    }

    pub fn has_post_process(&self) -> bool {
        self.post.is_some()
    }

    /// Post-render hook. Failures are logged and the source is left untouched.
    pub fn postprocess(&self, backend: &mut B, source: Option<&B::Texture>) {
        if let Some(post) = &self.post
            && let Err(e) = post.apply(backend, source)
        {
            tracing::warn!(error = %e, "post-process skipped");
        }
    }

    /// Draw into `ctx`, then post-process `target`.
    pub fn frame(
        &self,
        ctx: &mut dyn DrawContext,
        origin: Point,
        size: Size,
        backend: &mut B,
        target: Option<&B::Texture>,
    ) -> usize {
        let draws = self.view.draw_frame(ctx, origin, size);
        self.postprocess(backend, target);
        draws
    }
}
