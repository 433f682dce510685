//! Design-file importers.
//!
//! The production importer for layered binary design files is part of the
//! external engine package; [`DesignImporter`] is the seam it plugs into.
//! [`LayerDocumentImporter`] reads a JSON layer document, which is how
//! pre-made designs are authored for headless use and in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{BlockKind, DesignEngine, EngineError, EngineResult, Fill, Point, Property, Size};
use crate::color::Rgba;

/// Signature at the start of a layered binary design file.
pub const BINARY_DESIGN_SIGNATURE: &[u8; 4] = b"8BPS";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageLevel {
    Info,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportMessage {
    pub level: MessageLevel,
    pub text: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportReport {
    pub messages: Vec<ImportMessage>,
}

impl ImportReport {
    fn info(&mut self, text: impl Into<String>) {
        self.messages.push(ImportMessage {
            level: MessageLevel::Info,
            text: text.into(),
        });
    }

    fn warn(&mut self, text: impl Into<String>) {
        self.messages.push(ImportMessage {
            level: MessageLevel::Warning,
            text: text.into(),
        });
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ImportMessage> {
        self.messages
            .iter()
            .filter(|m| m.level == MessageLevel::Warning)
    }
}

/// Turns a design file into pages of the engine's current scene.
#[async_trait]
pub trait DesignImporter: Send + Sync {
    async fn import(
        &self,
        engine: &mut dyn DesignEngine,
        bytes: &[u8],
    ) -> EngineResult<ImportReport>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerDocument {
    pub width: f32,
    pub height: f32,
    #[serde(default)]
    pub layers: Vec<Layer>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LayerContent {
    Text {
        text: String,
        #[serde(default, rename = "fontSize")]
        font_size: Option<f32>,
        #[serde(default)]
        color: Option<String>,
    },
    Image {
        uri: String,
    },
    Shape {
        #[serde(default)]
        color: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layer {
    #[serde(default)]
    pub name: Option<String>,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    #[serde(flatten)]
    pub content: LayerContent,
}

/// Imports [`LayerDocument`] JSON onto a fresh page.
#[derive(Debug, Clone, Default)]
pub struct LayerDocumentImporter;

impl LayerDocumentImporter {
    fn parse(bytes: &[u8]) -> EngineResult<LayerDocument> {
        if bytes.starts_with(BINARY_DESIGN_SIGNATURE) {
            return Err(EngineError::Import(
                "binary layered design files need the engine's native importer".into(),
            ));
        }
        serde_json::from_slice(bytes)
            .map_err(|e| EngineError::Import(format!("malformed layer document: {e}")))
    }
}

#[async_trait]
impl DesignImporter for LayerDocumentImporter {
    async fn import(
        &self,
        engine: &mut dyn DesignEngine,
        bytes: &[u8],
    ) -> EngineResult<ImportReport> {
        let doc = Self::parse(bytes)?;
        let scene = match engine.scene()? {
            Some(scene) => scene,
            None => engine.create_scene().await?,
        };
        let mut report = ImportReport::default();

        let page = engine.create_block(BlockKind::Page)?;
        engine.set_size(page, Size::new(doc.width, doc.height))?;
        engine.append_child(scene, page)?;

        for (i, layer) in doc.layers.iter().enumerate() {
            let block = match &layer.content {
                LayerContent::Text {
                    text,
                    font_size,
                    color,
                } => {
                    let block = engine.create_block(BlockKind::Text)?;
                    engine.set_property(block, Property::Text(text.clone()))?;
                    if let Some(size) = font_size {
                        engine.set_property(block, Property::FontSize(*size))?;
                    }
                    if let Some(hex) = color {
                        match Rgba::from_hex(hex) {
                            Ok(c) => engine.set_property(block, Property::TextColor(c))?,
                            Err(e) => report.warn(format!("layer {i}: {e}")),
                        }
                    }
                    block
                }
                LayerContent::Image { uri } => {
                    let block = engine.create_block(BlockKind::Graphic)?;
                    engine.set_fill(block, Some(Fill::image(uri.clone())))?;
                    block
                }
                LayerContent::Shape { color } => {
                    let block = engine.create_block(BlockKind::Graphic)?;
                    let fill = match color.as_deref().map(Rgba::from_hex) {
                        Some(Ok(c)) => Some(Fill::color(c)),
                        Some(Err(e)) => {
                            report.warn(format!("layer {i}: {e}"));
                            None
                        }
                        None => None,
                    };
                    engine.set_fill(block, fill)?;
                    block
                }
            };
            if let Some(name) = &layer.name {
                engine.set_name(block, name)?;
            }
            engine.set_position(block, Point::new(layer.x, layer.y))?;
            engine.set_size(block, Size::new(layer.width, layer.height))?;
            engine.append_child(page, block)?;
        }

        report.info(format!("imported {} layers", doc.layers.len()));
        Ok(report)
    }
}
