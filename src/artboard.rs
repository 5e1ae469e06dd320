use std::{
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
    thread::JoinHandle,
};

use crate::{
    core::{Affine, BezPath, Rect, Rgba8Premul},
    draw::Painter,
    error::{FxError, FxResult},
};

/// A renderable scene whose contents are opaque to this crate.
pub trait Artboard: Send + Sync {
    fn name(&self) -> &str;

    /// Content bounds in artboard space.
    fn bounds(&self) -> Rect;

    /// Emit the artboard's content through `painter` with `transform` applied.
    fn draw(&self, painter: &mut dyn Painter, transform: Affine);
}

#[derive(Clone, Debug)]
pub struct Shape {
    pub path: BezPath,
    pub color: Rgba8Premul,
}

/// Stand-in artboard made of filled paths.
#[derive(Clone, Debug)]
pub struct ShapeArtboard {
    name: String,
    bounds: Rect,
    shapes: Vec<Shape>,
}

impl ShapeArtboard {
    pub fn new(name: impl Into<String>, bounds: Rect, shapes: Vec<Shape>) -> Self {
        Self {
            name: name.into(),
            bounds,
            shapes,
        }
    }

    pub fn shapes(&self) -> &[Shape] {
        &self.shapes
    }

    pub fn from_document(doc: &ShapeDocument) -> FxResult<Self> {
        if !(doc.width.is_finite() && doc.width > 0.0 && doc.height.is_finite() && doc.height > 0.0)
        {
            return Err(FxError::validation(format!(
                "artboard '{}' must have positive finite width and height",
                doc.name
            )));
        }

        let mut shapes = Vec::with_capacity(doc.shapes.len());
        for (i, s) in doc.shapes.iter().enumerate() {
            let path = BezPath::from_svg(&s.path).map_err(|e| {
                FxError::validation(format!(
                    "artboard '{}' shape {i}: invalid svg path: {e}",
                    doc.name
                ))
            })?;
            let [r, g, b, a] = s.color;
            shapes.push(Shape {
                path,
                color: Rgba8Premul::from_straight_rgba(r, g, b, a),
            });
        }

        Ok(Self::new(
            doc.name.clone(),
            Rect::new(0.0, 0.0, doc.width, doc.height),
            shapes,
        ))
    }
}

impl Artboard for ShapeArtboard {
    fn name(&self) -> &str {
        &self.name
    }

    fn bounds(&self) -> Rect {
        self.bounds
    }

    fn draw(&self, painter: &mut dyn Painter, transform: Affine) {
        for s in &self.shapes {
            painter.fill_path(&s.path, transform, s.color);
        }
    }
}

/// On-disk description of a [`ShapeArtboard`]. Colors are straight (non-premultiplied) RGBA.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ShapeDocument {
    pub name: String,
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub shapes: Vec<ShapeEntry>,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ShapeEntry {
    pub path: String,
    pub color: [u8; 4],
}

/// Resolves artboards from a named resource plus file extension.
pub trait ModelLoader: Send + Sync {
    fn load(&self, file_name: &str, extension: &str) -> FxResult<Arc<dyn Artboard>>;
}

/// Loads [`ShapeDocument`] JSON files from a directory.
#[derive(Clone, Debug)]
pub struct ShapeFileLoader {
    root: PathBuf,
}

impl ShapeFileLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, file_name: &str, extension: &str) -> PathBuf {
        let ext = extension.trim_start_matches('.');
        if ext.is_empty() {
            self.root.join(file_name)
        } else {
            self.root.join(format!("{file_name}.{ext}"))
        }
    }

    pub fn load_path(path: &Path) -> FxResult<ShapeArtboard> {
        let bytes = std::fs::read(path)
            .map_err(|e| FxError::load(format!("read '{}': {e}", path.display())))?;
        let doc: ShapeDocument = serde_json::from_slice(&bytes)
            .map_err(|e| FxError::serde(format!("parse '{}': {e}", path.display())))?;
        ShapeArtboard::from_document(&doc)
    }
}

impl ModelLoader for ShapeFileLoader {
    fn load(&self, file_name: &str, extension: &str) -> FxResult<Arc<dyn Artboard>> {
        let path = self.path_for(file_name, extension);
        let artboard = Self::load_path(&path)?;
        tracing::debug!(path = %path.display(), shapes = artboard.shapes().len(), "loaded artboard");
        Ok(Arc::new(artboard))
    }
}

/// Slot holding the artboard a view draws. Empty while loading.
#[derive(Default)]
pub struct ArtboardModel {
    artboard: RwLock<Option<Arc<dyn Artboard>>>,
}

impl ArtboardModel {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_artboard(artboard: Arc<dyn Artboard>) -> Self {
        Self {
            artboard: RwLock::new(Some(artboard)),
        }
    }

    pub fn artboard(&self) -> Option<Arc<dyn Artboard>> {
        self.artboard
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn set_artboard(&self, artboard: Option<Arc<dyn Artboard>>) {
        *self
            .artboard
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = artboard;
    }

    pub fn load(&self, loader: &dyn ModelLoader, file_name: &str, extension: &str) -> FxResult<()> {
        let artboard = loader.load(file_name, extension)?;
        self.set_artboard(Some(artboard));
        Ok(())
    }

    /// Load on a worker thread. The slot stays empty until loading succeeds.
    pub fn load_in_background(
        self: &Arc<Self>,
        loader: Arc<dyn ModelLoader>,
        file_name: impl Into<String>,
        extension: impl Into<String>,
    ) -> JoinHandle<FxResult<()>> {
        let model = Arc::clone(self);
        let file_name = file_name.into();
        let extension = extension.into();
        std::thread::spawn(move || {
            let res = model.load(loader.as_ref(), &file_name, &extension);
            if let Err(e) = &res {
                tracing::warn!(file = %file_name, error = %e, "artboard load failed");
            }
            res
        })
    }
}

impl std::fmt::Debug for ArtboardModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = self.artboard().map(|a| a.name().to_string());
        f.debug_struct("ArtboardModel")
            .field("artboard", &name)
            .finish()
    }
}
