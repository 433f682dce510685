//! Composition Invariant Tests
//!
//! These tests verify the layout and restriction guarantees.

use postcard_studio::{
    builder::{build_template, OFFER_AMOUNT_Y},
    engine::{BlockKind, DesignEngine, Fill, MemoryEngine, Point, Scope},
    restrict::{apply_selection_permissions, editable_set},
    templates::{BusinessData, ServiceEntry, Template},
    Rgba,
};

fn create_test_template(primary_color: Option<&str>) -> Template {
    Template {
        id: "test-postcard".to_string(),
        name: "Test Postcard".to_string(),
        description: "Test template".to_string(),
        category: "services".to_string(),
        primary_color: primary_color.map(str::to_string),
        features: vec![],
        design_file: None,
        design_file_size: None,
        available: true,
        unavailable_reason: None,
        dimensions: None,
        editable_elements: vec![],
    }
}

fn services(n: usize) -> BusinessData {
    BusinessData {
        services: Some(
            (1..=n)
                .map(|i| ServiceEntry::Plain(format!("Service {i}")))
                .collect(),
        ),
        ..Default::default()
    }
}

async fn fresh_engine() -> MemoryEngine {
    let mut engine = MemoryEngine::new();
    engine.create_scene().await.unwrap();
    engine
}

#[tokio::test]
async fn invariant_one_service_element_per_entry() {
    for n in 0..=4 {
        let mut engine = fresh_engine().await;
        let layout = build_template(&mut engine, &create_test_template(None), &services(n)).unwrap();

        let ys: Vec<f32> = layout
            .names_with_prefix("service")
            .map(|e| engine.position(e.block).unwrap().y)
            .collect();
        assert_eq!(ys.len(), n, "services = {n}");
        assert!(ys.windows(2).all(|w| w[0] < w[1]), "ladder must descend: {ys:?}");
        assert!(layout.get("offerAmount").is_none());
    }
}

#[tokio::test]
async fn invariant_services_capped_at_four() {
    let mut engine = fresh_engine().await;
    let layout = build_template(&mut engine, &create_test_template(None), &services(7)).unwrap();
    assert_eq!(layout.names_with_prefix("service").count(), 4);
}

#[tokio::test]
async fn invariant_offer_block_without_services() {
    let mut engine = fresh_engine().await;
    let data = BusinessData {
        offer_amount: Some("20% OFF".into()),
        offer_description: Some("Your first visit".into()),
        ..Default::default()
    };
    let layout = build_template(&mut engine, &create_test_template(None), &data).unwrap();

    assert_eq!(layout.names_with_prefix("offerAmount").count(), 1);
    assert_eq!(layout.names_with_prefix("offerDescription").count(), 1);
    let amount = layout.get("offerAmount").unwrap();
    let desc = layout.get("offerDescription").unwrap();
    assert_eq!(engine.position(amount).unwrap().y, OFFER_AMOUNT_Y);
    assert!(engine.position(desc).unwrap().y > engine.position(amount).unwrap().y);
    assert_eq!(engine.text(amount).unwrap(), "20% OFF");
}

#[tokio::test]
async fn invariant_non_array_services_fall_through_to_offer() {
    let mut engine = fresh_engine().await;
    let data: BusinessData =
        serde_json::from_str(r#"{"services": "Windows", "offerAmount": 50}"#).unwrap();
    let layout = build_template(&mut engine, &create_test_template(None), &data).unwrap();

    assert_eq!(layout.names_with_prefix("service").count(), 0);
    let amount = layout.get("offerAmount").unwrap();
    assert_eq!(engine.text(amount).unwrap(), "50");
}

#[tokio::test]
async fn invariant_offer_description_needs_amount() {
    let mut engine = fresh_engine().await;
    let data = BusinessData {
        offer_description: Some("orphan".into()),
        ..Default::default()
    };
    let layout = build_template(&mut engine, &create_test_template(None), &data).unwrap();
    assert!(layout.get("offerAmount").is_none());
    assert!(layout.get("offerDescription").is_none());
}

#[tokio::test]
async fn invariant_malformed_color_skips_background() {
    for bad in ["#12345", "blue", "#GGGGGG", "1234567"] {
        let mut engine = fresh_engine().await;
        let layout = build_template(&mut engine, &create_test_template(Some(bad)), &BusinessData::default())
            .unwrap();
        let background = layout.get("background").unwrap();
        assert_eq!(engine.fill(background).unwrap(), None, "color {bad:?}");
    }
}

#[tokio::test]
async fn invariant_valid_color_sets_background() {
    let mut engine = fresh_engine().await;
    let layout = build_template(&mut engine, &create_test_template(Some("#E74C3C")), &BusinessData::default())
        .unwrap();
    let background = layout.get("background").unwrap();
    assert_eq!(
        engine.fill(background).unwrap(),
        Some(Fill::color(Rgba::from_hex("E74C3C").unwrap()))
    );
}

#[tokio::test]
async fn invariant_fixed_creation_order() {
    let mut engine = fresh_engine().await;
    let mut template = create_test_template(None);
    template.features.push("Image Areas".into());
    let layout = build_template(&mut engine, &template, &services(2)).unwrap();
    let names: Vec<&str> = layout.elements.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(
        names,
        [
            "background",
            "headerBand",
            "heading",
            "subheading",
            "mainImage",
            "service1",
            "service2",
            "callToAction",
            "contact"
        ]
    );
    assert_eq!(engine.children(layout.page).unwrap().len(), names.len());
}

#[tokio::test]
async fn invariant_empty_template_name_rejected() {
    let mut engine = fresh_engine().await;
    let mut template = create_test_template(None);
    template.name = "  ".into();
    assert!(build_template(&mut engine, &template, &BusinessData::default()).is_err());
}

#[tokio::test]
async fn invariant_simple_mode_editable_set_is_m_plus_j() {
    let mut engine = fresh_engine().await;
    let page = engine.pages().unwrap()[0];

    // N = 5 texts, M = 3 editable.
    let mut editable_texts = vec![];
    for i in 0..5 {
        let t = engine.create_block(BlockKind::Text).unwrap();
        engine.append_child(page, t).unwrap();
        engine.set_position(t, Point::new(i as f32, 0.5)).unwrap();
        let editable = i % 2 == 0;
        engine.set_scope_enabled(t, Scope::TextEdit, editable).unwrap();
        if editable {
            editable_texts.push(t);
        }
    }

    // K = 4 graphics: image + fill-change, image without fill-change,
    // solid color, and a second replaceable image. J = 2.
    let specs = [
        (Some(Fill::image("a.jpg")), true),
        (Some(Fill::image("b.jpg")), false),
        (Some(Fill::color(Rgba::BLACK)), true),
        (Some(Fill::image("c.jpg")), true),
    ];
    for (fill, change) in specs {
        let g = engine.create_block(BlockKind::Graphic).unwrap();
        engine.append_child(page, g).unwrap();
        engine.set_fill(g, fill).unwrap();
        engine.set_scope_enabled(g, Scope::FillChange, change).unwrap();
    }

    let set = editable_set(&engine).unwrap();
    assert_eq!(set.texts.len(), 3);
    assert_eq!(set.images.len(), 2);
    assert_eq!(set.len(), 5);
    for t in &editable_texts {
        assert!(set.contains(*t));
    }

    apply_selection_permissions(&mut engine, &set).unwrap();
    for block in engine.find_all().unwrap() {
        let selectable = engine.is_scope_enabled(block, Scope::EditorSelect).unwrap();
        assert_eq!(selectable, set.contains(block), "block {block}");
        if set.contains(block) {
            assert!(!engine.is_scope_enabled(block, Scope::LayerMove).unwrap());
        }
    }
    assert!(!engine.is_scope_enabled(page, Scope::EditorSelect).unwrap());
}

#[tokio::test]
async fn invariant_editable_set_ordered_by_distance() {
    let mut engine = fresh_engine().await;
    let page = engine.pages().unwrap()[0];
    let mut blocks = vec![];
    for (x, y) in [(0.0, 5.0), (3.0, 0.0), (1.0, 1.0)] {
        let t = engine.create_block(BlockKind::Text).unwrap();
        engine.append_child(page, t).unwrap();
        engine.set_position(t, Point::new(x, y)).unwrap();
        blocks.push(t);
    }
    let set = editable_set(&engine).unwrap();
    assert_eq!(set.texts, vec![blocks[2], blocks[1], blocks[0]]);
}
