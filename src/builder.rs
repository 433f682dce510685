//! Template Content Builder
//!
//! Lays out a programmatic postcard on the first page of the current scene.
//! Every element sits at a literal position tuned for a 5.3 × 7.5 inch
//! canvas and is created in a fixed order: background, header band,
//! heading, subheading, optional image, services or offer, call to action,
//! contact line.

use serde::Serialize;
use thiserror::Error;

use crate::color::Rgba;
use crate::engine::{
    BlockId, BlockKind, DesignEngine, EngineError, Fill, FontWeight, Point, Property, Scope,
    Size, TextAlign, REPLACEABLE_IMAGE_KEY,
};
use crate::templates::{BusinessData, DimensionUnit, Template};

pub const CANVAS: Size = Size {
    width: 5.3,
    height: 7.5,
};

/// Services beyond this count are not rendered.
pub const MAX_SERVICES: usize = 4;
pub const SERVICE_LADDER_TOP: f32 = 2.8;
pub const SERVICE_LADDER_STEP: f32 = 0.5;

pub const OFFER_AMOUNT_Y: f32 = 3.5;
pub const OFFER_DESCRIPTION_Y: f32 = 4.2;

const PLACEHOLDER_IMAGE: &str = "https://img.ly/static/ubq_samples/sample_1_1024x683.jpg";
const DEFAULT_BACKGROUND: Rgba = Rgba::rgba(240.0 / 255.0, 242.0 / 255.0, 248.0 / 255.0, 1.0);
const INK: Rgba = Rgba::rgba(0.17, 0.24, 0.31, 1.0);
const OFFER_RED: Rgba = Rgba::rgba(0.91, 0.30, 0.24, 1.0);

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Invalid template: {0}")]
    InvalidTemplate(String),

    #[error("Scene has no page to build on")]
    NoPage,

    #[error(transparent)]
    Engine(#[from] EngineError),
}

#[derive(Debug, Clone, Serialize)]
pub struct BuiltElement {
    pub name: String,
    pub block: BlockId,
    pub kind: BlockKind,
}

/// What the builder put on the page, in creation order.
#[derive(Debug, Clone, Serialize)]
pub struct BuiltLayout {
    pub page: BlockId,
    pub elements: Vec<BuiltElement>,
}

impl BuiltLayout {
    pub fn get(&self, name: &str) -> Option<BlockId> {
        self.elements.iter().find(|e| e.name == name).map(|e| e.block)
    }

    pub fn names_with_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a BuiltElement> {
        self.elements.iter().filter(move |e| e.name.starts_with(prefix))
    }
}

#[derive(Debug, Clone, Copy)]
struct TextStyle {
    font_size: f32,
    weight: FontWeight,
    color: Rgba,
}

impl TextStyle {
    const fn new(font_size: f32, weight: FontWeight, color: Rgba) -> Self {
        Self { font_size, weight, color }
    }
}

fn default_value(key: &str) -> &'static str {
    match key {
        "businessName" => "YOUR BUSINESS NAME",
        "headline" => "Professional Services You Can Trust",
        "callToAction" => "Call Today!",
        "phone" => "(555) 123-4567",
        "website" => "www.yourbusiness.com",
        _ => "",
    }
}

/// Replace every `{{key}}` in `pattern` from `data`, falling back to defaults.
pub fn fill_placeholders(pattern: &str, data: &BusinessData) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut rest = pattern;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let key = after[..end].trim();
                match data.lookup(key) {
                    Some(v) => out.push_str(&v),
                    None => out.push_str(default_value(key)),
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

struct PageWriter<'a> {
    engine: &'a mut dyn DesignEngine,
    page: BlockId,
    width: f32,
    elements: Vec<BuiltElement>,
}

impl PageWriter<'_> {
    fn place(
        &mut self,
        kind: BlockKind,
        name: &str,
        at: Point,
        size: Size,
    ) -> Result<BlockId, EngineError> {
        let block = self.engine.create_block(kind)?;
        self.engine.set_name(block, name)?;
        self.engine.set_position(block, at)?;
        self.engine.set_size(block, size)?;
        self.engine.append_child(self.page, block)?;
        tracing::debug!(name, block = %block, x = at.x, y = at.y, "placed element");
        self.elements.push(BuiltElement {
            name: name.to_string(),
            block,
            kind,
        });
        Ok(block)
    }

    fn shape(
        &mut self,
        name: &str,
        at: Point,
        size: Size,
        fill: Option<Fill>,
    ) -> Result<BlockId, EngineError> {
        let block = self.place(BlockKind::Graphic, name, at, size)?;
        self.engine.set_fill(block, fill)?;
        Ok(block)
    }

    /// Centered text spanning the page with a 0.25 inch margin.
    fn text(
        &mut self,
        name: &str,
        y: f32,
        height: f32,
        content: String,
        style: TextStyle,
    ) -> Result<BlockId, EngineError> {
        let at = Point::new(0.25, y);
        let size = Size::new(self.width - 0.5, height);
        let block = self.place(BlockKind::Text, name, at, size)?;
        self.engine.set_property(block, Property::Text(content))?;
        self.engine.set_property(block, Property::FontSize(style.font_size))?;
        self.engine.set_property(block, Property::FontWeight(style.weight))?;
        self.engine.set_property(block, Property::Alignment(TextAlign::Center))?;
        self.engine.set_property(block, Property::TextColor(style.color))?;
        Ok(block)
    }
}

fn canvas_for(template: &Template) -> Size {
    match template.dimensions {
        Some(d) if d.unit == DimensionUnit::Inch && d.width > 0.0 && d.height > 0.0 => {
            Size::new(d.width, d.height)
        }
        _ => CANVAS,
    }
}

/// Resolve the background color: absent → default, malformed → none.
fn background_fill(template: &Template) -> Option<Fill> {
    match template.primary_color.as_deref() {
        None => Some(Fill::color(DEFAULT_BACKGROUND)),
        Some(hex) => match Rgba::from_hex(hex) {
            Ok(color) => Some(Fill::color(color)),
            Err(e) => {
                tracing::warn!(template = %template.id, error = %e, "skipping background color");
                None
            }
        },
    }
}

/// Build `template` filled with `data` on the first page of the scene.
pub fn build_template(
    engine: &mut dyn DesignEngine,
    template: &Template,
    data: &BusinessData,
) -> Result<BuiltLayout, BuildError> {
    if template.name.trim().is_empty() {
        return Err(BuildError::InvalidTemplate("template name is empty".into()));
    }
    let page = engine.pages()?.first().copied().ok_or(BuildError::NoPage)?;
    let canvas = canvas_for(template);
    engine.set_size(page, canvas)?;

    let mut w = PageWriter {
        engine,
        page,
        width: canvas.width,
        elements: Vec::new(),
    };

    w.shape("background", Point::ORIGIN, canvas, background_fill(template))?;
    w.shape(
        "headerBand",
        Point::ORIGIN,
        Size::new(canvas.width, 2.4),
        Some(Fill::color(Rgba::BLACK.with_alpha(0.25))),
    )?;

    let heading = TextStyle::new(0.36, FontWeight::Bold, Rgba::WHITE);
    w.text("heading", 0.5, 0.6, fill_placeholders("{{businessName}}", data), heading)?;
    let sub = TextStyle::new(0.2, FontWeight::Normal, Rgba::WHITE.with_alpha(0.9));
    w.text("subheading", 1.3, 0.5, fill_placeholders("{{headline}}", data), sub)?;

    if template.has_feature("Image Areas") || template.has_feature("Photo Area") {
        let image = w.shape(
            "mainImage",
            Point::new(0.4, 4.75),
            Size::new(canvas.width - 0.8, 0.65),
            Some(Fill::image(PLACEHOLDER_IMAGE)),
        )?;
        w.engine.set_metadata(image, REPLACEABLE_IMAGE_KEY, "true")?;
        w.engine.set_scope_enabled(image, Scope::FillChange, true)?;
    }

    if let Some(services) = &data.services {
        if services.len() > MAX_SERVICES {
            tracing::debug!(dropped = services.len() - MAX_SERVICES, "too many services");
        }
        let style = TextStyle::new(0.16, FontWeight::Normal, INK);
        for (i, service) in services.iter().take(MAX_SERVICES).enumerate() {
            let y = SERVICE_LADDER_TOP + SERVICE_LADDER_STEP * i as f32;
            w.text(&format!("service{}", i + 1), y, 0.4, service.label(), style)?;
        }
    } else if let Some(amount) = data.lookup("offerAmount") {
        let big = TextStyle::new(0.6, FontWeight::Bold, OFFER_RED);
        w.text("offerAmount", OFFER_AMOUNT_Y, 0.7, amount, big)?;
        if let Some(desc) = data.lookup("offerDescription") {
            let style = TextStyle::new(0.2, FontWeight::Normal, INK);
            w.text("offerDescription", OFFER_DESCRIPTION_Y, 0.4, desc, style)?;
        }
    }

    let cta = TextStyle::new(0.22, FontWeight::Bold, INK);
    w.text("callToAction", 5.5, 0.4, fill_placeholders("{{callToAction}}", data), cta)?;
    let contact = TextStyle::new(0.16, FontWeight::Normal, INK);
    w.text("contact", 6.5, 0.3, contact_line(data), contact)?;

    let layout = BuiltLayout {
        page,
        elements: w.elements,
    };
    lock_layout(w.engine, template, &layout)?;
    tracing::info!(
        template = %template.id,
        elements = layout.elements.len(),
        "built template layout"
    );
    Ok(layout)
}

fn contact_line(data: &BusinessData) -> String {
    let parts: Vec<String> = ["phone", "website"]
        .into_iter()
        .map(|k| data.lookup(k).unwrap_or_else(|| default_value(k).to_string()))
        .collect();
    parts.join(" • ")
}

/// Text stays editable in place; everything but replaceable images is pinned.
fn lock_layout(
    engine: &mut dyn DesignEngine,
    template: &Template,
    layout: &BuiltLayout,
) -> Result<(), EngineError> {
    for element in &layout.elements {
        if element.kind == BlockKind::Text {
            let editable = template.editable_elements.is_empty()
                || template.editable_elements.iter().any(|n| *n == element.name);
            engine.set_scope_enabled(element.block, Scope::TextEdit, editable)?;
            engine.set_transform_locked(element.block, true)?;
        } else if engine
            .metadata(element.block, REPLACEABLE_IMAGE_KEY)?
            .as_deref()
            != Some("true")
        {
            engine.set_transform_locked(element.block, true)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_fall_back_to_defaults() {
        let data = BusinessData {
            business_name: Some("ABC Cleaning".into()),
            ..Default::default()
        };
        assert_eq!(fill_placeholders("{{businessName}}!", &data), "ABC Cleaning!");
        assert_eq!(fill_placeholders("{{ phone }}", &data), "(555) 123-4567");
        assert_eq!(fill_placeholders("a{{unknown}}b", &data), "ab");
        assert_eq!(fill_placeholders("open {{brace", &data), "open {{brace");
    }

    #[test]
    fn contact_line_joins_phone_and_website() {
        let data = BusinessData {
            phone: Some("555-1234".into()),
            ..Default::default()
        };
        assert_eq!(contact_line(&data), "555-1234 • www.yourbusiness.com");
    }
}
