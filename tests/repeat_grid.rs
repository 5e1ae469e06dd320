use std::sync::Arc;

use rivefx::{
    Affine, Alignment, ArtboardModel, ArtboardView, BezPath, DrawCommand, DrawStrategy, Fit,
    Point, RecordingPainter, Rect, RepeatCount, RepeatDraw, Rgba8Premul, SceneContext, Shape,
    ShapeArtboard, Size, Vec2, align_transform, grid_offsets,
};

const P: f64 = 100.0;

fn distinct_rows(offsets: &[Vec2]) -> Vec<f64> {
    let mut rows: Vec<f64> = Vec::new();
    for o in offsets {
        if rows.last() != Some(&o.y) {
            rows.push(o.y);
        }
    }
    rows
}

#[test]
fn single_copy_sits_at_grid_origin() {
    let offsets = grid_offsets(1, P);
    assert_eq!(offsets, vec![Vec2::new(0.0, -4.0 * P)]);
}

#[test]
fn draw_count_always_matches_repeat() {
    for r in [1u32, 2, 7, 8, 9, 15, 16, 17, 40] {
        assert_eq!(grid_offsets(r, P).len(), r as usize, "repeat {r}");
    }
}

#[test]
fn row_count_follows_one_based_break() {
    // (repeat, rows)
    for (r, rows) in [(1u32, 1usize), (7, 1), (8, 2), (9, 2), (16, 3), (17, 3)] {
        let offsets = grid_offsets(r, P);
        assert_eq!(distinct_rows(&offsets).len(), rows, "repeat {r}");
    }
}

#[test]
fn x_increases_within_a_row_and_resets_between_rows() {
    let offsets = grid_offsets(17, P);
    let x0 = -3.5 * P;

    assert_eq!(offsets[0], Vec2::new(x0, -4.0 * P));
    for w in offsets.windows(2) {
        let (a, b) = (w[0], w[1]);
        if a.y == b.y {
            assert_eq!(b.x - a.x, P);
        } else {
            assert_eq!(b.y - a.y, P);
            assert_eq!(b.x, x0);
        }
    }

    // First row holds draws 1..=7, then rows of 8.
    assert!(offsets[..7].iter().all(|o| o.y == -4.0 * P));
    assert!(offsets[7..15].iter().all(|o| o.y == -3.0 * P));
    assert!(offsets[15..].iter().all(|o| o.y == -2.0 * P));
}

#[test]
fn row_is_centered_on_the_first_min_r_8_copies() {
    let offsets = grid_offsets(5, P);
    let first = offsets.first().unwrap().x;
    let last = offsets.last().unwrap().x;
    assert_eq!(first, -2.0 * P);
    assert_eq!(last, 2.0 * P);
    assert_eq!(first + last, 0.0);
}

#[test]
fn frame_commands_are_balanced_and_ordered() {
    let draw = RepeatDraw::new(RepeatCount::new(9), P);
    let dest = Rect::new(0.0, 0.0, 300.0, 200.0);
    let content = Rect::new(0.0, 0.0, 50.0, 50.0);
    let cmds = draw.render_frame(dest, content, Alignment::Center, Fit::Contain);

    assert_eq!(cmds.len(), 1 + 9 * 4);
    assert_eq!(
        cmds[0],
        DrawCommand::Align {
            frame: dest,
            content,
            alignment: Alignment::Center,
            fit: Fit::Contain,
        }
    );
    for (chunk, off) in cmds[1..].chunks(4).zip(grid_offsets(9, P)) {
        assert_eq!(
            chunk,
            &[
                DrawCommand::Save,
                DrawCommand::Transform(Affine::translate(off)),
                DrawCommand::DrawArtboard,
                DrawCommand::Restore,
            ]
        );
    }
}

#[test]
fn each_copy_is_drawn_under_align_then_offset() {
    let mut path = BezPath::new();
    path.move_to((0.0, 0.0));
    path.line_to((50.0, 0.0));
    path.line_to((50.0, 50.0));
    path.close_path();
    let content = Rect::new(0.0, 0.0, 50.0, 50.0);
    let artboard = ShapeArtboard::new(
        "tri",
        content,
        vec![Shape {
            path,
            color: Rgba8Premul::from_straight_rgba(255, 255, 255, 255),
        }],
    );

    let strategy = RepeatDraw::new(RepeatCount::new(10), P);
    let view = ArtboardView::with_strategy(
        Arc::new(ArtboardModel::with_artboard(Arc::new(artboard))),
        Box::new(strategy),
    );

    let mut ctx = SceneContext::new(RecordingPainter::default());
    let origin = Point::new(0.0, 0.0);
    let size = Size::new(400.0, 400.0);
    assert_eq!(view.draw_frame(&mut ctx, origin, size), 10);
    assert_eq!(ctx.depth(), 0);

    let base = align_transform(
        Rect::from_origin_size(origin, size),
        content,
        Fit::Contain,
        Alignment::Center,
    );
    let fills = &ctx.painter().fills;
    assert_eq!(fills.len(), 10);
    for ((_, transform, _), off) in fills.iter().zip(grid_offsets(10, P)) {
        assert_eq!(*transform, base * Affine::translate(off));
    }
}

#[test]
fn count_changes_from_another_thread_show_up_next_frame() {
    let strategy = RepeatDraw::new(RepeatCount::new(1), P);
    let count = strategy.count();
    let dest = Rect::new(0.0, 0.0, 10.0, 10.0);

    let before = strategy.render_frame(dest, dest, Alignment::Center, Fit::Contain);
    std::thread::spawn(move || {
        count.add(3);
    })
    .join()
    .unwrap();
    let after = strategy.render_frame(dest, dest, Alignment::Center, Fit::Contain);

    assert_eq!(rivefx::draw::draw_count(&before), 1);
    assert_eq!(rivefx::draw::draw_count(&after), 4);
}

#[test]
fn count_never_drops_below_one() {
    let count = RepeatCount::new(0);
    assert_eq!(count.get(), 1);
    count.set(0);
    assert_eq!(count.get(), 1);
    assert_eq!(grid_offsets(count.get(), P).len(), 1);
}
