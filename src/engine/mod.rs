//! External design engine contract.
//!
//! The renderer, scene graph, undo history and binary design importer all
//! live in a third-party engine. This module pins the surface the rest of
//! the crate is allowed to use: a closed set of block kinds, permission
//! scopes and typed properties instead of the engine's string identifiers.
//! Everything that needs the current state of a design asks the engine;
//! nothing here keeps a copy of the scene.

pub mod importer;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::color::Rgba;
use crate::export::{ExportFormat, ExportOptions};

pub use importer::{DesignImporter, ImportMessage, ImportReport, LayerDocumentImporter};
pub use memory::{MemoryEngine, MemoryEngineFactory};

/// Engine versions this crate was written against.
pub const ENGINE_CONTRACT: &str = ">=1.0.0, <2.0.0";

/// Metadata key marking an image element as swappable in simple mode.
pub const REPLACEABLE_IMAGE_KEY: &str = "replaceableImage";

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine has been disposed")]
    Disposed,

    #[error("invalid block {0}")]
    InvalidBlock(BlockId),

    #[error("{kind:?} block {block} does not support {what}")]
    Unsupported {
        block: BlockId,
        kind: BlockKind,
        what: String,
    },

    #[error("no scene exists")]
    NoScene,

    #[error("engine initialization failed: {0}")]
    Init(String),

    #[error("import failed: {0}")]
    Import(String),

    #[error("export failed: {0}")]
    Export(String),
}

/// Handle of a block inside the engine's scene graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(pub u32);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    Scene,
    Page,
    Text,
    Graphic,
    Group,
}

impl BlockKind {
    /// The engine's own type identifier, for log output.
    pub fn type_uri(self) -> &'static str {
        match self {
            BlockKind::Scene => "//ly.img.ubq/scene",
            BlockKind::Page => "//ly.img.ubq/page",
            BlockKind::Text => "//ly.img.ubq/text",
            BlockKind::Graphic => "//ly.img.ubq/graphic",
            BlockKind::Group => "//ly.img.ubq/group",
        }
    }

    pub fn supports_fill(self) -> bool {
        matches!(self, BlockKind::Page | BlockKind::Graphic)
    }
}

/// Per-block editing permissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Scope {
    TextEdit,
    FillChange,
    EditorSelect,
    LayerMove,
    LayerResize,
    LayerRotate,
}

impl Scope {
    pub const ALL: [Scope; 6] = [
        Scope::TextEdit,
        Scope::FillChange,
        Scope::EditorSelect,
        Scope::LayerMove,
        Scope::LayerResize,
        Scope::LayerRotate,
    ];

    /// Scopes that let a user change where an element sits.
    pub const TRANSFORM: [Scope; 3] = [Scope::LayerMove, Scope::LayerResize, Scope::LayerRotate];

    pub fn as_str(self) -> &'static str {
        match self {
            Scope::TextEdit => "text/edit",
            Scope::FillChange => "fill/change",
            Scope::EditorSelect => "editor/select",
            Scope::LayerMove => "layer/move",
            Scope::LayerResize => "layer/resize",
            Scope::LayerRotate => "layer/rotate",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontWeight {
    Normal,
    Bold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    Left,
    Center,
    Right,
}

/// Typed block properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Property {
    Text(String),
    FontSize(f32),
    FontWeight(FontWeight),
    Alignment(TextAlign),
    TextColor(Rgba),
    Visible(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyKey {
    Text,
    FontSize,
    FontWeight,
    Alignment,
    TextColor,
    Visible,
}

impl Property {
    pub fn key(&self) -> PropertyKey {
        match self {
            Property::Text(_) => PropertyKey::Text,
            Property::FontSize(_) => PropertyKey::FontSize,
            Property::FontWeight(_) => PropertyKey::FontWeight,
            Property::Alignment(_) => PropertyKey::Alignment,
            Property::TextColor(_) => PropertyKey::TextColor,
            Property::Visible(_) => PropertyKey::Visible,
        }
    }
}

impl PropertyKey {
    /// Whether a block of `kind` carries this property.
    pub fn applies_to(self, kind: BlockKind) -> bool {
        match self {
            PropertyKey::Visible => true,
            _ => kind == BlockKind::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GradientStop {
    pub color: Rgba,
    pub stop: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Fill {
    Color { color: Rgba },
    Image { uri: String },
    Gradient { stops: Vec<GradientStop> },
}

impl Fill {
    pub fn color(color: Rgba) -> Self {
        Fill::Color { color }
    }

    pub fn image(uri: impl Into<String>) -> Self {
        Fill::Image { uri: uri.into() }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, Fill::Image { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const ORIGIN: Point = Point { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance_to(self, other: Point) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// Settings passed to the engine's initialization call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSettings {
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub base_asset_url: Option<String>,
}

/// The object surface of the external engine.
///
/// Synchronous methods mirror the engine's block API; the async ones may
/// suspend until the engine answers.
#[async_trait]
pub trait DesignEngine: Send + Sync {
    fn version(&self) -> semver::Version;

    /// False once the engine has been torn down.
    fn is_alive(&self) -> bool;

    fn dispose(&mut self);

    async fn create_scene(&mut self) -> EngineResult<BlockId>;

    fn scene(&self) -> EngineResult<Option<BlockId>>;

    fn pages(&self) -> EngineResult<Vec<BlockId>>;

    fn create_block(&mut self, kind: BlockKind) -> EngineResult<BlockId>;

    /// Destroys the block and everything below it.
    fn destroy(&mut self, block: BlockId) -> EngineResult<()>;

    fn is_valid(&self, block: BlockId) -> bool;

    fn kind(&self, block: BlockId) -> EngineResult<BlockKind>;

    fn append_child(&mut self, parent: BlockId, child: BlockId) -> EngineResult<()>;

    fn children(&self, block: BlockId) -> EngineResult<Vec<BlockId>>;

    fn find_all(&self) -> EngineResult<Vec<BlockId>>;

    fn find_by_kind(&self, kind: BlockKind) -> EngineResult<Vec<BlockId>>;

    fn set_name(&mut self, block: BlockId, name: &str) -> EngineResult<()>;

    fn name(&self, block: BlockId) -> EngineResult<Option<String>>;

    fn set_position(&mut self, block: BlockId, at: Point) -> EngineResult<()>;

    fn position(&self, block: BlockId) -> EngineResult<Point>;

    fn set_size(&mut self, block: BlockId, size: Size) -> EngineResult<()>;

    fn size(&self, block: BlockId) -> EngineResult<Size>;

    fn set_property(&mut self, block: BlockId, property: Property) -> EngineResult<()>;

    fn property(&self, block: BlockId, key: PropertyKey) -> EngineResult<Option<Property>>;

    fn set_fill(&mut self, block: BlockId, fill: Option<Fill>) -> EngineResult<()>;

    fn fill(&self, block: BlockId) -> EngineResult<Option<Fill>>;

    fn set_scope_enabled(&mut self, block: BlockId, scope: Scope, enabled: bool)
        -> EngineResult<()>;

    fn is_scope_enabled(&self, block: BlockId, scope: Scope) -> EngineResult<bool>;

    fn set_metadata(&mut self, block: BlockId, key: &str, value: &str) -> EngineResult<()>;

    fn metadata(&self, block: BlockId, key: &str) -> EngineResult<Option<String>>;

    async fn export(
        &self,
        block: BlockId,
        format: ExportFormat,
        options: &ExportOptions,
    ) -> EngineResult<Vec<u8>>;

    /// Current text content, or an empty string for blocks without text.
    fn text(&self, block: BlockId) -> EngineResult<String> {
        match self.property(block, PropertyKey::Text)? {
            Some(Property::Text(s)) => Ok(s),
            _ => Ok(String::new()),
        }
    }

    fn set_text(&mut self, block: BlockId, text: &str) -> EngineResult<()> {
        self.set_property(block, Property::Text(text.to_string()))
    }

    fn set_transform_locked(&mut self, block: BlockId, locked: bool) -> EngineResult<()> {
        for scope in Scope::TRANSFORM {
            self.set_scope_enabled(block, scope, !locked)?;
        }
        Ok(())
    }
}

/// Constructs engine instances.
#[async_trait]
pub trait EngineFactory: Send + Sync {
    async fn init(&self, settings: &EngineSettings) -> EngineResult<Box<dyn DesignEngine>>;
}

/// Check an engine version against [`ENGINE_CONTRACT`].
pub fn check_contract(version: &semver::Version) -> EngineResult<()> {
    let req = semver::VersionReq::parse(ENGINE_CONTRACT)
        .map_err(|e| EngineError::Init(format!("bad contract requirement: {e}")))?;
    if req.matches(version) {
        Ok(())
    } else {
        Err(EngineError::Init(format!(
            "engine {version} does not satisfy {ENGINE_CONTRACT}"
        )))
    }
}
