use std::borrow::Cow;

use super::{ComputeProgram, PixelFormat};

const GAUSSIAN_BLUR_WGSL: &str = include_str!("shaders/gaussian_blur.wgsl");
const ALPHA_MASK_WGSL: &str = include_str!("shaders/alpha_mask.wgsl");

/// Placeholder replaced with the storage texel format when a module is specialized.
pub const STORAGE_FORMAT_TOKEN: &str = "STORAGE_FORMAT";

/// One shader module and the entry points it exports.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProgramModule {
    pub name: String,
    pub wgsl: Cow<'static, str>,
    pub entry_points: Vec<String>,
}

impl ProgramModule {
    pub fn new(
        name: impl Into<String>,
        wgsl: impl Into<Cow<'static, str>>,
        entry_points: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            wgsl: wgsl.into(),
            entry_points: entry_points.into_iter().map(Into::into).collect(),
        }
    }

    pub fn exports(&self, entry_point: &str) -> bool {
        self.entry_points.iter().any(|e| e == entry_point)
    }

    /// Module source with the storage format placeholder filled in.
    pub fn specialize(&self, format: PixelFormat) -> String {
        self.wgsl.replace(STORAGE_FORMAT_TOKEN, format.wgsl_name())
    }
}

/// Named collection of compute modules that programs are resolved from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProgramLibrary {
    label: String,
    modules: Vec<ProgramModule>,
}

impl ProgramLibrary {
    pub fn new(label: impl Into<String>, modules: Vec<ProgramModule>) -> Self {
        Self {
            label: label.into(),
            modules,
        }
    }

    /// The library shipped with the crate, exporting all three blur-clip programs.
    pub fn builtin() -> Self {
        Self::new(
            "rivefx_builtin",
            vec![
                ProgramModule::new(
                    "gaussian_blur",
                    GAUSSIAN_BLUR_WGSL,
                    [
                        ComputeProgram::HorizontalBlur.entry_point(),
                        ComputeProgram::VerticalBlur.entry_point(),
                    ],
                ),
                ProgramModule::new(
                    "alpha_mask",
                    ALPHA_MASK_WGSL,
                    [ComputeProgram::AlphaMask.entry_point()],
                ),
            ],
        )
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Module exporting `entry_point`, if any.
    pub fn find(&self, entry_point: &str) -> Option<&ProgramModule> {
        self.modules.iter().find(|m| m.exports(entry_point))
    }

    /// Copy of this library with `entry_point` no longer exported.
    pub fn without_entry_point(&self, entry_point: &str) -> Self {
        let modules = self
            .modules
            .iter()
            .map(|m| ProgramModule {
                entry_points: m
                    .entry_points
                    .iter()
                    .filter(|e| e.as_str() != entry_point)
                    .cloned()
                    .collect(),
                ..m.clone()
            })
            .collect();
        Self::new(self.label.clone(), modules)
    }
}

impl Default for ProgramLibrary {
    fn default() -> Self {
        Self::builtin()
    }
}
