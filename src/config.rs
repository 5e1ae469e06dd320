use std::path::Path;

use crate::{
    error::{FxError, FxResult},
    kernel::DEFAULT_BLUR_RADIUS,
    layout::{Alignment, Fit},
    repeat_draw::{DEFAULT_REPEAT, DEFAULT_SPACING, RepeatCount, RepeatDraw},
};

/// Tap increment applied by the stress view's tap handler.
pub const DEFAULT_TAP_INCREMENT: u32 = 3;

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FxConfig {
    pub stress: StressConfig,
    pub blur_clip: BlurClipConfig,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StressConfig {
    pub repeat: u32,
    pub spacing: f64,
    pub tap_increment: u32,
    pub fit: Fit,
    pub alignment: Alignment,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            repeat: DEFAULT_REPEAT,
            spacing: DEFAULT_SPACING,
            tap_increment: DEFAULT_TAP_INCREMENT,
            fit: Fit::default(),
            alignment: Alignment::default(),
        }
    }
}

impl StressConfig {
    /// Repeat strategy seeded from this section.
    pub fn strategy(&self) -> RepeatDraw {
        RepeatDraw::new(RepeatCount::new(self.repeat), self.spacing)
    }

    /// Apply `taps` tap gestures to `count`, returning the new value.
    pub fn apply_taps(&self, count: &RepeatCount, taps: u32) -> u32 {
        count.add(self.tap_increment.saturating_mul(taps))
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BlurClipConfig {
    pub radius: u32,
}

impl Default for BlurClipConfig {
    fn default() -> Self {
        Self {
            radius: DEFAULT_BLUR_RADIUS,
        }
    }
}

impl FxConfig {
    pub fn from_json_str(s: &str) -> FxResult<Self> {
        let cfg: Self = serde_json::from_str(s)
            .map_err(|e| FxError::serde(format!("parse config JSON: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_json_path(path: &Path) -> FxResult<Self> {
        let s = std::fs::read_to_string(path)
            .map_err(|e| FxError::load(format!("read config '{}': {e}", path.display())))?;
        Self::from_json_str(&s)
    }

    pub fn validate(&self) -> FxResult<()> {
        if self.stress.repeat == 0 {
            return Err(FxError::validation("stress.repeat must be >= 1"));
        }
        if !self.stress.spacing.is_finite() || self.stress.spacing <= 0.0 {
            return Err(FxError::validation(
                "stress.spacing must be finite and > 0",
            ));
        }
        if self.stress.tap_increment == 0 {
            return Err(FxError::validation("stress.tap_increment must be >= 1"));
        }
        if self.blur_clip.radius == 0 {
            return Err(FxError::validation("blur_clip.radius must be >= 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_gives_defaults() {
        let cfg = FxConfig::from_json_str("{}").unwrap();
        assert_eq!(cfg, FxConfig::default());
        assert_eq!(cfg.stress.repeat, 10);
        assert_eq!(cfg.stress.spacing, 100.0);
        assert_eq!(cfg.stress.tap_increment, 3);
        assert_eq!(cfg.blur_clip.radius, 25);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = FxConfig::from_json_str(
            r#"{ "stress": { "repeat": 17, "fit": "fill", "alignment": "top_left" } }"#,
        )
        .unwrap();
        assert_eq!(cfg.stress.repeat, 17);
        assert_eq!(cfg.stress.fit, Fit::Fill);
        assert_eq!(cfg.stress.alignment, Alignment::TopLeft);
        assert_eq!(cfg.stress.spacing, 100.0);
        assert_eq!(cfg.blur_clip.radius, 25);
    }

    #[test]
    fn invalid_values_are_rejected() {
        for s in [
            r#"{ "stress": { "repeat": 0 } }"#,
            r#"{ "stress": { "spacing": -1.0 } }"#,
            r#"{ "stress": { "tap_increment": 0 } }"#,
            r#"{ "blur_clip": { "radius": 0 } }"#,
        ] {
            assert!(
                matches!(FxConfig::from_json_str(s), Err(FxError::Validation(_))),
                "{s}"
            );
        }
    }

    #[test]
    fn taps_grow_the_strategy_count() {
        let stress = StressConfig::default();
        let strategy = stress.strategy();
        assert_eq!(strategy.count().get(), 10);
        assert_eq!(stress.apply_taps(&strategy.count(), 2), 16);
        assert_eq!(strategy.count().get(), 16);
    }

    #[test]
    fn unknown_keys_are_serde_errors() {
        let err = FxConfig::from_json_str(r#"{ "stres": {} }"#).unwrap_err();
        assert!(matches!(err, FxError::Serde(_)));
    }
}
