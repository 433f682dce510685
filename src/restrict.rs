//! Simple-mode content restriction.
//!
//! After a design is loaded, only a curated set of elements stays
//! selectable: text the engine allows editing, and image-filled graphics
//! whose fill may change. The side panel is derived from that set every
//! time; all writes go straight to the engine.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::color::Rgba;
use crate::engine::{
    BlockId, BlockKind, DesignEngine, EngineError, EngineResult, Fill, Point, Scope,
};

/// Texts longer than this get a multi-line input.
const TEXTAREA_THRESHOLD: usize = 40;

/// Elements a simple-mode user may touch, each list in presentation order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EditableSet {
    pub texts: Vec<BlockId>,
    pub images: Vec<BlockId>,
}

impl EditableSet {
    pub fn len(&self) -> usize {
        self.texts.len() + self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, block: BlockId) -> bool {
        self.texts.contains(&block) || self.images.contains(&block)
    }
}

/// Sort by distance of each block's position from the page origin.
///
/// Ties keep their incoming order. Blocks whose position cannot be read
/// sort last.
pub fn order_by_distance(engine: &dyn DesignEngine, blocks: &mut [BlockId]) {
    let distance = |b: BlockId| {
        engine
            .position(b)
            .map(|p| p.distance_to(Point::ORIGIN))
            .unwrap_or(f32::INFINITY)
    };
    blocks.sort_by(|a, b| distance(*a).total_cmp(&distance(*b)));
}

fn is_editable_text(engine: &dyn DesignEngine, block: BlockId) -> EngineResult<bool> {
    engine.is_scope_enabled(block, Scope::TextEdit)
}

fn is_editable_image(engine: &dyn DesignEngine, block: BlockId) -> EngineResult<bool> {
    if !engine.kind(block)?.supports_fill() {
        return Ok(false);
    }
    let has_image = engine.fill(block)?.is_some_and(|f| f.is_image());
    Ok(has_image && engine.is_scope_enabled(block, Scope::FillChange)?)
}

fn collect(
    engine: &dyn DesignEngine,
    kind: BlockKind,
    keep: fn(&dyn DesignEngine, BlockId) -> EngineResult<bool>,
) -> EngineResult<Vec<BlockId>> {
    let mut out = vec![];
    for block in engine.find_by_kind(kind)? {
        if !engine.is_valid(block) {
            continue;
        }
        match keep(engine, block) {
            Ok(true) => out.push(block),
            Ok(false) => {}
            Err(e) => tracing::warn!(block = %block, error = %e, "skipping element"),
        }
    }
    order_by_distance(engine, &mut out);
    Ok(out)
}

/// Compute the editable set from the live scene.
pub fn editable_set(engine: &dyn DesignEngine) -> EngineResult<EditableSet> {
    Ok(EditableSet {
        texts: collect(engine, BlockKind::Text, is_editable_text)?,
        images: collect(engine, BlockKind::Graphic, is_editable_image)?,
    })
}

/// Make only the editable set selectable.
///
/// Editable elements stay selectable but cannot be moved, resized or
/// rotated; pages and every other element lose selection.
pub fn apply_selection_permissions(
    engine: &mut dyn DesignEngine,
    set: &EditableSet,
) -> EngineResult<()> {
    let mut locked = 0usize;
    for block in engine.find_all()? {
        let page = engine.kind(block)? == BlockKind::Page;
        if !page && set.contains(block) {
            engine.set_scope_enabled(block, Scope::EditorSelect, true)?;
            engine.set_transform_locked(block, true)?;
        } else {
            engine.set_scope_enabled(block, Scope::EditorSelect, false)?;
            locked += 1;
        }
    }
    tracing::info!(
        editable = set.len(),
        unselectable = locked,
        "applied simple-mode selection"
    );
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    Text,
    Textarea,
}

/// One form input bound to every block sharing a name.
#[derive(Debug, Clone, Serialize)]
pub struct TextField {
    pub name: String,
    pub blocks: Vec<BlockId>,
    pub value: String,
    pub input: InputKind,
}

impl TextField {
    pub fn label(&self) -> String {
        let n = self.blocks.len();
        format!("{} ({} block{})", self.name, n, if n == 1 { "" } else { "s" })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageSlot {
    pub name: String,
    pub block: BlockId,
    pub uri: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ColorSwatch {
    pub color: Rgba,
    pub blocks: Vec<BlockId>,
}

fn display_name(engine: &dyn DesignEngine, block: BlockId) -> String {
    engine
        .name(block)
        .ok()
        .flatten()
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| format!("Block {}", block.0))
}

/// Group blocks by display name, keeping first-seen order.
pub fn group_by_name(engine: &dyn DesignEngine, blocks: &[BlockId]) -> Vec<(String, Vec<BlockId>)> {
    let mut groups: Vec<(String, Vec<BlockId>)> = vec![];
    for &block in blocks {
        let name = display_name(engine, block);
        match groups.iter_mut().find(|(n, _)| *n == name) {
            Some((_, members)) => members.push(block),
            None => groups.push((name, vec![block])),
        }
    }
    groups
}

/// Non-text blocks with a recolorable solid fill, grouped by opaque color.
///
/// Blocks whose fill is locked stay out of the palette.
pub fn collect_colors(engine: &dyn DesignEngine) -> EngineResult<Vec<ColorSwatch>> {
    let mut by_hex: BTreeMap<String, ColorSwatch> = BTreeMap::new();
    for block in engine.find_all()? {
        let kind = engine.kind(block)?;
        if kind == BlockKind::Text || !kind.supports_fill() {
            continue;
        }
        if !engine.is_scope_enabled(block, Scope::FillChange)? {
            continue;
        }
        if let Some(Fill::Color { color }) = engine.fill(block)? {
            let opaque = color.with_alpha(1.0);
            by_hex
                .entry(opaque.to_hex())
                .or_insert_with(|| ColorSwatch {
                    color: opaque,
                    blocks: vec![],
                })
                .blocks
                .push(block);
        }
    }
    Ok(by_hex.into_values().collect())
}

/// Form-style panel for simple mode.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SimplePanel {
    pub texts: Vec<TextField>,
    pub images: Vec<ImageSlot>,
    pub colors: Vec<ColorSwatch>,
}

impl SimplePanel {
    pub fn build(engine: &dyn DesignEngine, set: &EditableSet) -> EngineResult<Self> {
        let mut texts = vec![];
        for (name, blocks) in group_by_name(engine, &set.texts) {
            if blocks.len() > 1 {
                tracing::debug!(%name, blocks = blocks.len(), "text group edits several blocks");
            }
            let value = engine.text(blocks[0]).unwrap_or_default();
            let input = if value.contains('\n') || value.chars().count() > TEXTAREA_THRESHOLD {
                InputKind::Textarea
            } else {
                InputKind::Text
            };
            texts.push(TextField {
                name,
                blocks,
                value,
                input,
            });
        }

        let images = set
            .images
            .iter()
            .map(|&block| ImageSlot {
                name: display_name(engine, block),
                block,
                uri: match engine.fill(block) {
                    Ok(Some(Fill::Image { uri })) => Some(uri),
                    _ => None,
                },
            })
            .collect();

        Ok(Self {
            texts,
            images,
            colors: collect_colors(engine)?,
        })
    }

    pub fn field(&self, name: &str) -> Option<&TextField> {
        self.texts.iter().find(|f| f.name == name)
    }

    /// Write `value` to every block in the named group.
    ///
    /// Returns how many blocks took the write; failing blocks are logged
    /// and skipped.
    pub fn set_text(
        &mut self,
        engine: &mut dyn DesignEngine,
        name: &str,
        value: &str,
    ) -> Option<usize> {
        let field = self.texts.iter_mut().find(|f| f.name == name)?;
        let mut updated = 0;
        for &block in &field.blocks {
            match engine.set_text(block, value) {
                Ok(()) => updated += 1,
                Err(e) => tracing::warn!(block = %block, error = %e, "text update skipped"),
            }
        }
        field.value = value.to_string();
        Some(updated)
    }

    /// Swap the image shown by a replaceable block.
    pub fn replace_image(
        &mut self,
        engine: &mut dyn DesignEngine,
        block: BlockId,
        uri: &str,
    ) -> Result<(), EngineError> {
        let slot = self
            .images
            .iter_mut()
            .find(|s| s.block == block)
            .ok_or(EngineError::InvalidBlock(block))?;
        engine.set_fill(block, Some(Fill::image(uri)))?;
        slot.uri = Some(uri.to_string());
        Ok(())
    }

    /// Recolor every block of the swatch at `index`; returns blocks updated.
    pub fn set_color(&mut self, engine: &mut dyn DesignEngine, index: usize, color: Rgba) -> usize {
        let Some(swatch) = self.colors.get_mut(index) else {
            return 0;
        };
        let mut updated = 0;
        for &block in &swatch.blocks {
            match engine.set_fill(block, Some(Fill::color(color))) {
                Ok(()) => updated += 1,
                Err(e) => tracing::warn!(block = %block, error = %e, "color update skipped"),
            }
        }
        swatch.color = color;
        updated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MemoryEngine;

    #[tokio::test]
    async fn distance_ordering_from_origin() {
        let mut engine = MemoryEngine::new();
        engine.create_scene().await.unwrap();
        let mut blocks = vec![];
        for (x, y) in [(0.0, 5.0), (3.0, 0.0), (1.0, 1.0)] {
            let b = engine.create_block(BlockKind::Text).unwrap();
            engine.set_position(b, Point::new(x, y)).unwrap();
            blocks.push(b);
        }
        let (far, mid, near) = (blocks[0], blocks[1], blocks[2]);
        order_by_distance(&engine, &mut blocks);
        assert_eq!(blocks, vec![near, mid, far]);
    }

    #[test]
    fn group_keeps_first_seen_order() {
        let mut engine = MemoryEngine::new();
        let a = engine.create_block(BlockKind::Text).unwrap();
        let b = engine.create_block(BlockKind::Text).unwrap();
        let c = engine.create_block(BlockKind::Text).unwrap();
        engine.set_name(a, "heading").unwrap();
        engine.set_name(c, "heading").unwrap();
        let groups = group_by_name(&engine, &[a, b, c]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0], ("heading".to_string(), vec![a, c]));
        assert_eq!(groups[1].0, format!("Block {}", b.0));
    }

    #[tokio::test]
    async fn palette_skips_locked_fills_and_ignores_alpha() {
        let mut engine = MemoryEngine::new();
        engine.create_scene().await.unwrap();
        let page = engine.pages().unwrap()[0];
        engine.set_scope_enabled(page, Scope::FillChange, false).unwrap();

        let red = Rgba::from_hex("#E74C3C").unwrap();
        let solid = engine.create_block(BlockKind::Graphic).unwrap();
        engine.set_fill(solid, Some(Fill::color(red))).unwrap();
        let faded = engine.create_block(BlockKind::Graphic).unwrap();
        engine.set_fill(faded, Some(Fill::color(red.with_alpha(0.4)))).unwrap();
        let locked = engine.create_block(BlockKind::Graphic).unwrap();
        engine.set_fill(locked, Some(Fill::color(Rgba::BLACK))).unwrap();
        engine.set_scope_enabled(locked, Scope::FillChange, false).unwrap();

        let colors = collect_colors(&engine).unwrap();
        assert_eq!(colors.len(), 1);
        assert_eq!(colors[0].blocks, vec![solid, faded]);
        assert_eq!(colors[0].color, red);

        let mut panel = SimplePanel {
            colors,
            ..Default::default()
        };
        assert_eq!(panel.set_color(&mut engine, 0, Rgba::WHITE), 2);
        assert_eq!(engine.fill(solid).unwrap(), Some(Fill::color(Rgba::WHITE)));
        assert_eq!(engine.fill(locked).unwrap(), Some(Fill::color(Rgba::BLACK)));
        assert_eq!(panel.set_color(&mut engine, 5, Rgba::WHITE), 0);
    }

    #[test]
    fn label_pluralizes() {
        let field = TextField {
            name: "heading".into(),
            blocks: vec![BlockId(1), BlockId(2)],
            value: String::new(),
            input: InputKind::Text,
        };
        assert_eq!(field.label(), "heading (2 blocks)");
    }
}
