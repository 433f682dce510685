//! In-process engine used for headless builds and tests.
//!
//! Implements the [`DesignEngine`] contract over a plain block table. It
//! does not rasterize; exports produce minimal well-formed containers so
//! callers can exercise the full export path.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};

use super::{
    BlockId, BlockKind, DesignEngine, EngineError, EngineFactory, EngineResult, EngineSettings,
    Fill, Point, Property, PropertyKey, Scope, Size,
};
use crate::color::Rgba;
use crate::export::{ExportFormat, ExportOptions};

pub const MEMORY_ENGINE_VERSION: semver::Version = semver::Version::new(1, 54, 0);

/// Page size used when a scene is created, in inches.
pub const DEFAULT_PAGE_SIZE: Size = Size {
    width: 5.3,
    height: 7.5,
};

// 1x1 transparent PNG.
const PNG_STUB: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
    0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0A, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00,
    0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49,
    0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
];

#[derive(Debug, Clone)]
struct Block {
    kind: BlockKind,
    parent: Option<BlockId>,
    children: Vec<BlockId>,
    name: Option<String>,
    position: Point,
    size: Size,
    properties: HashMap<PropertyKey, Property>,
    fill: Option<Fill>,
    scopes: HashMap<Scope, bool>,
    metadata: BTreeMap<String, String>,
}

impl Block {
    fn new(kind: BlockKind) -> Self {
        let fill = (kind == BlockKind::Page).then(|| Fill::color(Rgba::WHITE));
        Self {
            kind,
            parent: None,
            children: Vec::new(),
            name: None,
            position: Point::ORIGIN,
            size: Size::default(),
            properties: HashMap::new(),
            fill,
            scopes: HashMap::new(),
            metadata: BTreeMap::new(),
        }
    }
}

#[derive(Debug)]
pub struct MemoryEngine {
    version: semver::Version,
    alive: bool,
    next_id: u32,
    scene: Option<BlockId>,
    blocks: BTreeMap<BlockId, Block>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::with_version(MEMORY_ENGINE_VERSION)
    }

    pub fn with_version(version: semver::Version) -> Self {
        Self {
            version,
            alive: true,
            next_id: 1,
            scene: None,
            blocks: BTreeMap::new(),
        }
    }

    fn ensure_alive(&self) -> EngineResult<()> {
        if self.alive {
            Ok(())
        } else {
            Err(EngineError::Disposed)
        }
    }

    fn block(&self, id: BlockId) -> EngineResult<&Block> {
        self.ensure_alive()?;
        self.blocks.get(&id).ok_or(EngineError::InvalidBlock(id))
    }

    fn block_mut(&mut self, id: BlockId) -> EngineResult<&mut Block> {
        self.ensure_alive()?;
        self.blocks.get_mut(&id).ok_or(EngineError::InvalidBlock(id))
    }

    fn insert(&mut self, kind: BlockKind) -> BlockId {
        let id = BlockId(self.next_id);
        self.next_id += 1;
        self.blocks.insert(id, Block::new(kind));
        id
    }

    fn descendants(&self, root: BlockId) -> Vec<BlockId> {
        let mut out = vec![root];
        let mut i = 0;
        while i < out.len() {
            if let Some(b) = self.blocks.get(&out[i]) {
                out.extend(b.children.iter().copied());
            }
            i += 1;
        }
        out
    }

    fn unsupported(&self, block: BlockId, what: impl Into<String>) -> EngineError {
        EngineError::Unsupported {
            block,
            kind: self.blocks.get(&block).map_or(BlockKind::Group, |b| b.kind),
            what: what.into(),
        }
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DesignEngine for MemoryEngine {
    fn version(&self) -> semver::Version {
        self.version.clone()
    }

    fn is_alive(&self) -> bool {
        self.alive
    }

    fn dispose(&mut self) {
        self.alive = false;
        self.scene = None;
        self.blocks.clear();
    }

    async fn create_scene(&mut self) -> EngineResult<BlockId> {
        self.ensure_alive()?;
        if let Some(old) = self.scene.take() {
            for id in self.descendants(old) {
                self.blocks.remove(&id);
            }
        }
        let scene = self.insert(BlockKind::Scene);
        let page = self.insert(BlockKind::Page);
        self.append_child(scene, page)?;
        self.set_size(page, DEFAULT_PAGE_SIZE)?;
        self.scene = Some(scene);
        Ok(scene)
    }

    fn scene(&self) -> EngineResult<Option<BlockId>> {
        self.ensure_alive()?;
        Ok(self.scene)
    }

    fn pages(&self) -> EngineResult<Vec<BlockId>> {
        let Some(scene) = self.scene()? else {
            return Ok(Vec::new());
        };
        Ok(self
            .block(scene)?
            .children
            .iter()
            .copied()
            .filter(|c| self.blocks.get(c).is_some_and(|b| b.kind == BlockKind::Page))
            .collect())
    }

    fn create_block(&mut self, kind: BlockKind) -> EngineResult<BlockId> {
        self.ensure_alive()?;
        if kind == BlockKind::Scene {
            return Err(EngineError::Unsupported {
                block: BlockId(0),
                kind,
                what: "create_block (use create_scene)".into(),
            });
        }
        Ok(self.insert(kind))
    }

    fn destroy(&mut self, block: BlockId) -> EngineResult<()> {
        let parent = self.block(block)?.parent;
        if let Some(p) = parent.and_then(|p| self.blocks.get_mut(&p)) {
            p.children.retain(|c| *c != block);
        }
        for id in self.descendants(block) {
            self.blocks.remove(&id);
        }
        if self.scene == Some(block) {
            self.scene = None;
        }
        Ok(())
    }

    fn is_valid(&self, block: BlockId) -> bool {
        self.alive && self.blocks.contains_key(&block)
    }

    fn kind(&self, block: BlockId) -> EngineResult<BlockKind> {
        Ok(self.block(block)?.kind)
    }

    fn append_child(&mut self, parent: BlockId, child: BlockId) -> EngineResult<()> {
        self.block(parent)?;
        if parent == child || self.descendants(child).contains(&parent) {
            return Err(self.unsupported(child, format!("append under {parent}")));
        }
        let old_parent = self.block(child)?.parent;
        if let Some(p) = old_parent.and_then(|p| self.blocks.get_mut(&p)) {
            p.children.retain(|c| *c != child);
        }
        self.block_mut(child)?.parent = Some(parent);
        self.block_mut(parent)?.children.push(child);
        Ok(())
    }

    fn children(&self, block: BlockId) -> EngineResult<Vec<BlockId>> {
        Ok(self.block(block)?.children.clone())
    }

    fn find_all(&self) -> EngineResult<Vec<BlockId>> {
        self.ensure_alive()?;
        Ok(self.blocks.keys().copied().collect())
    }

    fn find_by_kind(&self, kind: BlockKind) -> EngineResult<Vec<BlockId>> {
        self.ensure_alive()?;
        Ok(self
            .blocks
            .iter()
            .filter(|(_, b)| b.kind == kind)
            .map(|(id, _)| *id)
            .collect())
    }

    fn set_name(&mut self, block: BlockId, name: &str) -> EngineResult<()> {
        self.block_mut(block)?.name = Some(name.to_string());
        Ok(())
    }

    fn name(&self, block: BlockId) -> EngineResult<Option<String>> {
        Ok(self.block(block)?.name.clone())
    }

    fn set_position(&mut self, block: BlockId, at: Point) -> EngineResult<()> {
        self.block_mut(block)?.position = at;
        Ok(())
    }

    fn position(&self, block: BlockId) -> EngineResult<Point> {
        Ok(self.block(block)?.position)
    }

    fn set_size(&mut self, block: BlockId, size: Size) -> EngineResult<()> {
        self.block_mut(block)?.size = size;
        Ok(())
    }

    fn size(&self, block: BlockId) -> EngineResult<Size> {
        Ok(self.block(block)?.size)
    }

    fn set_property(&mut self, block: BlockId, property: Property) -> EngineResult<()> {
        let key = property.key();
        if !key.applies_to(self.block(block)?.kind) {
            return Err(self.unsupported(block, format!("{key:?}")));
        }
        self.block_mut(block)?.properties.insert(key, property);
        Ok(())
    }

    fn property(&self, block: BlockId, key: PropertyKey) -> EngineResult<Option<Property>> {
        let b = self.block(block)?;
        if !key.applies_to(b.kind) {
            return Err(self.unsupported(block, format!("{key:?}")));
        }
        Ok(b.properties.get(&key).cloned())
    }

    fn set_fill(&mut self, block: BlockId, fill: Option<Fill>) -> EngineResult<()> {
        if !self.block(block)?.kind.supports_fill() {
            return Err(self.unsupported(block, "fill"));
        }
        self.block_mut(block)?.fill = fill;
        Ok(())
    }

    fn fill(&self, block: BlockId) -> EngineResult<Option<Fill>> {
        Ok(self.block(block)?.fill.clone())
    }

    fn set_scope_enabled(
        &mut self,
        block: BlockId,
        scope: Scope,
        enabled: bool,
    ) -> EngineResult<()> {
        self.block_mut(block)?.scopes.insert(scope, enabled);
        Ok(())
    }

    fn is_scope_enabled(&self, block: BlockId, scope: Scope) -> EngineResult<bool> {
        Ok(self.block(block)?.scopes.get(&scope).copied().unwrap_or(true))
    }

    fn set_metadata(&mut self, block: BlockId, key: &str, value: &str) -> EngineResult<()> {
        self.block_mut(block)?
            .metadata
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn metadata(&self, block: BlockId, key: &str) -> EngineResult<Option<String>> {
        Ok(self.block(block)?.metadata.get(key).cloned())
    }

    async fn export(
        &self,
        block: BlockId,
        format: ExportFormat,
        options: &ExportOptions,
    ) -> EngineResult<Vec<u8>> {
        let kind = self.block(block)?.kind;
        if !matches!(kind, BlockKind::Scene | BlockKind::Page) {
            return Err(EngineError::Export(format!(
                "{kind:?} block {block} cannot be exported"
            )));
        }
        let count = self.descendants(block).len();
        Ok(match format {
            ExportFormat::Pdf => format!(
                "%PDF-1.4\n% block {block} ({count} elements) at {} dpi\n%%EOF\n",
                options.dpi
            )
            .into_bytes(),
            ExportFormat::Png => PNG_STUB.to_vec(),
            ExportFormat::Jpeg => vec![0xFF, 0xD8, 0xFF, 0xE0, 0xFF, 0xD9],
        })
    }
}

/// Hands out fresh [`MemoryEngine`]s.
#[derive(Debug, Clone)]
pub struct MemoryEngineFactory {
    pub version: semver::Version,
}

impl Default for MemoryEngineFactory {
    fn default() -> Self {
        Self {
            version: MEMORY_ENGINE_VERSION,
        }
    }
}

#[async_trait]
impl EngineFactory for MemoryEngineFactory {
    async fn init(&self, settings: &EngineSettings) -> EngineResult<Box<dyn DesignEngine>> {
        tracing::debug!(
            licensed = settings.license.is_some(),
            assets = settings.base_asset_url.as_deref().unwrap_or("-"),
            "initializing in-memory engine"
        );
        Ok(Box::new(MemoryEngine::with_version(self.version.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_scene_yields_one_sized_page() {
        let mut engine = MemoryEngine::new();
        let scene = engine.create_scene().await.unwrap();
        let pages = engine.pages().unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(engine.children(scene).unwrap(), pages);
        assert_eq!(engine.size(pages[0]).unwrap(), DEFAULT_PAGE_SIZE);
        assert_eq!(engine.fill(pages[0]).unwrap(), Some(Fill::color(Rgba::WHITE)));
    }

    #[tokio::test]
    async fn destroy_removes_subtree() {
        let mut engine = MemoryEngine::new();
        engine.create_scene().await.unwrap();
        let page = engine.pages().unwrap()[0];
        let text = engine.create_block(BlockKind::Text).unwrap();
        engine.append_child(page, text).unwrap();

        engine.destroy(page).unwrap();
        assert!(!engine.is_valid(text));
        assert!(engine.pages().unwrap().is_empty());
    }

    #[tokio::test]
    async fn disposed_engine_rejects_calls() {
        let mut engine = MemoryEngine::new();
        engine.create_scene().await.unwrap();
        engine.dispose();
        assert!(matches!(engine.pages(), Err(EngineError::Disposed)));
        assert!(matches!(
            engine.create_block(BlockKind::Text),
            Err(EngineError::Disposed)
        ));
    }

    #[test]
    fn text_properties_rejected_on_graphics() {
        let mut engine = MemoryEngine::new();
        let g = engine.create_block(BlockKind::Graphic).unwrap();
        let err = engine
            .set_property(g, Property::Text("x".into()))
            .unwrap_err();
        assert!(matches!(err, EngineError::Unsupported { .. }));
        assert!(engine.set_fill(g, Some(Fill::image("a.jpg"))).is_ok());
    }

    #[test]
    fn append_child_refuses_cycles() {
        let mut engine = MemoryEngine::new();
        let a = engine.create_block(BlockKind::Group).unwrap();
        let b = engine.create_block(BlockKind::Group).unwrap();
        engine.append_child(a, b).unwrap();
        assert!(engine.append_child(b, a).is_err());
    }

    #[test]
    fn scopes_default_to_enabled() {
        let mut engine = MemoryEngine::new();
        let t = engine.create_block(BlockKind::Text).unwrap();
        assert!(engine.is_scope_enabled(t, Scope::TextEdit).unwrap());
        engine.set_transform_locked(t, true).unwrap();
        assert!(!engine.is_scope_enabled(t, Scope::LayerMove).unwrap());
        assert!(engine.is_scope_enabled(t, Scope::EditorSelect).unwrap());
    }
}
