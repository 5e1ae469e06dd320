use crate::core::{Affine, Rect, Vec2};

/// How artboard content is scaled into a destination frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fit {
    /// Stretch both axes independently to fill the frame.
    Fill,
    /// Largest uniform scale that keeps all content visible.
    #[default]
    Contain,
    /// Smallest uniform scale that covers the whole frame.
    Cover,
    FitWidth,
    FitHeight,
    /// Like `Contain`, but never scales up.
    ScaleDown,
    /// Keep content at its natural size.
    None,
}

/// Anchor of the content inside the frame, as normalized coordinates in `[-1, 1]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alignment {
    TopLeft,
    TopCenter,
    TopRight,
    CenterLeft,
    #[default]
    Center,
    CenterRight,
    BottomLeft,
    BottomCenter,
    BottomRight,
}

impl Alignment {
    pub fn factors(self) -> Vec2 {
        match self {
            Self::TopLeft => Vec2::new(-1.0, -1.0),
            Self::TopCenter => Vec2::new(0.0, -1.0),
            Self::TopRight => Vec2::new(1.0, -1.0),
            Self::CenterLeft => Vec2::new(-1.0, 0.0),
            Self::Center => Vec2::new(0.0, 0.0),
            Self::CenterRight => Vec2::new(1.0, 0.0),
            Self::BottomLeft => Vec2::new(-1.0, 1.0),
            Self::BottomCenter => Vec2::new(0.0, 1.0),
            Self::BottomRight => Vec2::new(1.0, 1.0),
        }
    }
}

/// Transform that places `content` inside `frame` according to `fit` and `alignment`.
///
/// The content anchor point (picked by `alignment`) is mapped onto the matching anchor
/// of the frame, and the content is scaled around it. Degenerate content extents keep a
/// scale of 1 on that axis.
pub fn align_transform(frame: Rect, content: Rect, fit: Fit, alignment: Alignment) -> Affine {
    let a = alignment.factors();
    let cw = content.width();
    let ch = content.height();
    let fw = frame.width();
    let fh = frame.height();

    let ratio = |f: f64, c: f64| if c > 0.0 { f / c } else { 1.0 };
    let rx = ratio(fw, cw);
    let ry = ratio(fh, ch);

    let (sx, sy) = match fit {
        Fit::Fill => (rx, ry),
        Fit::Contain => {
            let s = rx.min(ry);
            (s, s)
        }
        Fit::Cover => {
            let s = rx.max(ry);
            (s, s)
        }
        Fit::FitWidth => (rx, rx),
        Fit::FitHeight => (ry, ry),
        Fit::ScaleDown => {
            let s = rx.min(ry).min(1.0);
            (s, s)
        }
        Fit::None => (1.0, 1.0),
    };

    let content_anchor = Vec2::new(
        content.x0 + cw * 0.5 + a.x * cw * 0.5,
        content.y0 + ch * 0.5 + a.y * ch * 0.5,
    );
    let frame_anchor = Vec2::new(
        frame.x0 + fw * 0.5 + a.x * fw * 0.5,
        frame.y0 + fh * 0.5 + a.y * fh * 0.5,
    );

    Affine::translate(frame_anchor)
        * Affine::scale_non_uniform(sx, sy)
        * Affine::translate(-content_anchor)
}
