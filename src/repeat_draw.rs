use std::sync::{
    Arc,
    atomic::{AtomicU32, Ordering},
};

use crate::{
    core::{Affine, Rect, Vec2},
    draw::DrawCommand,
    layout::{Alignment, Fit},
};

/// Cells per grid row.
pub const ROW_WIDTH: u32 = 8;

/// Default distance between grid cells, in artboard units.
pub const DEFAULT_SPACING: f64 = 100.0;

pub const DEFAULT_REPEAT: u32 = 10;

/// Shared repeat counter. Written from input handling, read once per frame by the
/// render thread. Never drops below 1.
#[derive(Clone, Debug)]
pub struct RepeatCount(Arc<AtomicU32>);

impl RepeatCount {
    pub fn new(value: u32) -> Self {
        Self(Arc::new(AtomicU32::new(value.max(1))))
    }

    pub fn get(&self) -> u32 {
        self.0.load(Ordering::Acquire).max(1)
    }

    pub fn set(&self, value: u32) {
        self.0.store(value.max(1), Ordering::Release);
    }

    /// Add `delta` and return the new value. Saturates at `u32::MAX`.
    pub fn add(&self, delta: u32) -> u32 {
        let prev = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
                Some(v.saturating_add(delta).max(1))
            })
            .unwrap_or_else(|v| v);
        prev.saturating_add(delta).max(1)
    }
}

impl Default for RepeatCount {
    fn default() -> Self {
        Self::new(DEFAULT_REPEAT)
    }
}

/// Translation offsets for `repeat` draws laid out on a grid of at most
/// [`ROW_WIDTH`] columns.
///
/// Rows break when the 1-based draw index is a multiple of 8, so the first row holds
/// draws 1..=7 and every later row up to 8. The grid starts four rows above the origin
/// and grows downward without bound.
pub fn grid_offsets(repeat: u32, spacing: f64) -> Vec<Vec2> {
    let r = repeat.min(ROW_WIDTH);
    let x0 = -(f64::from(r) - 1.0) * 0.5 * spacing;
    let mut x = x0;
    let mut y = -spacing * 4.0;

    let mut out = Vec::with_capacity(repeat as usize);
    for i in 1..=repeat {
        if i % ROW_WIDTH == 0 {
            y += spacing;
            x = x0;
        }
        out.push(Vec2::new(x, y));
        x += spacing;
    }
    out
}

/// Produces the draw commands for one frame.
pub trait DrawStrategy: Send + Sync {
    /// `content` is the artboard's bounds; `dest` the frame's destination rect.
    fn render_frame(
        &self,
        dest: Rect,
        content: Rect,
        alignment: Alignment,
        fit: Fit,
    ) -> Vec<DrawCommand>;
}

/// One aligned draw per frame.
#[derive(Clone, Copy, Debug, Default)]
pub struct SingleDraw;

impl DrawStrategy for SingleDraw {
    fn render_frame(
        &self,
        dest: Rect,
        content: Rect,
        alignment: Alignment,
        fit: Fit,
    ) -> Vec<DrawCommand> {
        vec![
            DrawCommand::Align {
                frame: dest,
                content,
                alignment,
                fit,
            },
            DrawCommand::DrawArtboard,
        ]
    }
}

/// Draws the artboard `count` times per frame on a grid, each draw under its own
/// save/restore scope.
#[derive(Clone, Debug)]
pub struct RepeatDraw {
    count: RepeatCount,
    spacing: f64,
}

impl RepeatDraw {
    pub fn new(count: RepeatCount, spacing: f64) -> Self {
        Self { count, spacing }
    }

    /// Handle for adjusting the count from another thread.
    pub fn count(&self) -> RepeatCount {
        self.count.clone()
    }

    pub fn spacing(&self) -> f64 {
        self.spacing
    }
}

impl Default for RepeatDraw {
    fn default() -> Self {
        Self::new(RepeatCount::default(), DEFAULT_SPACING)
    }
}

impl DrawStrategy for RepeatDraw {
    fn render_frame(
        &self,
        dest: Rect,
        content: Rect,
        alignment: Alignment,
        fit: Fit,
    ) -> Vec<DrawCommand> {
        let repeat = self.count.get();
        let offsets = grid_offsets(repeat, self.spacing);

        let mut out = Vec::with_capacity(1 + offsets.len() * 4);
        out.push(DrawCommand::Align {
            frame: dest,
            content,
            alignment,
            fit,
        });
        for off in offsets {
            out.push(DrawCommand::Save);
            out.push(DrawCommand::Transform(Affine::translate(off)));
            out.push(DrawCommand::DrawArtboard);
            out.push(DrawCommand::Restore);
        }
        out
    }
}
