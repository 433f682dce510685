//! Design-File Loader
//!
//! Fetches a layered design file, clears the engine's scene, runs the
//! external importer and prepares the imported page for editing.
//!
//! Stages run `Fetching → Parsing → PostProcessing → Complete`; any stage
//! can fail into `Error`, and the failure carries the stage it happened in.
//! A failed load is reported whole; nothing is retried.

use async_trait::async_trait;
use base64::Engine as _;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::engine::{
    BlockId, BlockKind, DesignEngine, DesignImporter, EngineError, ImportMessage, Property,
    Scope, REPLACEABLE_IMAGE_KEY,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadStage {
    Fetching,
    Parsing,
    PostProcessing,
    Complete,
    Error,
}

impl fmt::Display for LoadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoadStage::Fetching => "fetching",
            LoadStage::Parsing => "parsing",
            LoadStage::PostProcessing => "post-processing",
            LoadStage::Complete => "complete",
            LoadStage::Error => "error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadProgress {
    pub stage: LoadStage,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Failed to fetch design file: HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Failed to fetch design file: {0}")]
    Transport(String),

    #[error("Malformed data URL: {0}")]
    DataUrl(String),

    #[error("Failed to read design file: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Design file load failed while {stage}: {source}")]
    Fetch {
        stage: LoadStage,
        #[source]
        source: FetchError,
    },

    #[error("Design file load failed while {stage}: {source}")]
    Engine {
        stage: LoadStage,
        #[source]
        source: EngineError,
    },

    #[error("Design file is empty")]
    Empty,

    #[error("No pages found after import")]
    NoPages,
}

impl LoadError {
    pub fn stage(&self) -> LoadStage {
        match self {
            LoadError::Fetch { stage, .. } | LoadError::Engine { stage, .. } => *stage,
            LoadError::Empty => LoadStage::Fetching,
            LoadError::NoPages => LoadStage::Parsing,
        }
    }
}

/// Where design bytes come from.
#[derive(Debug, Clone)]
pub enum DesignSource {
    /// `http(s)://…` or a `data:…;base64,…` URL.
    Url(String),
    /// A file picked from local disk; opened and released per load.
    LocalFile(PathBuf),
    Bytes(Vec<u8>),
}

/// Retrieves design files over the network.
#[async_trait]
pub trait DesignFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// [`DesignFetcher`] backed by `reqwest`.
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DesignFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(body.to_vec())
    }
}

/// Decode a base64 `data:` URL.
pub fn decode_data_url(url: &str) -> Result<Vec<u8>, FetchError> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| FetchError::DataUrl("missing data: prefix".into()))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| FetchError::DataUrl("missing ',' separator".into()))?;
    if !meta.ends_with(";base64") {
        return Err(FetchError::DataUrl("only base64 payloads are supported".into()));
    }
    base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| FetchError::DataUrl(e.to_string()))
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadOutcome {
    pub page: BlockId,
    pub messages: Vec<ImportMessage>,
    pub replaceable_images: Vec<BlockId>,
    pub editable_texts: Vec<BlockId>,
}

pub type ProgressFn<'a> = &'a (dyn Fn(&LoadProgress) + Send + Sync);

pub struct DesignLoader<'a> {
    importer: &'a dyn DesignImporter,
    fetcher: &'a dyn DesignFetcher,
    progress: Option<ProgressFn<'a>>,
}

impl<'a> DesignLoader<'a> {
    pub fn new(importer: &'a dyn DesignImporter, fetcher: &'a dyn DesignFetcher) -> Self {
        Self {
            importer,
            fetcher,
            progress: None,
        }
    }

    pub fn on_progress(mut self, progress: ProgressFn<'a>) -> Self {
        self.progress = Some(progress);
        self
    }

    fn report(&self, stage: LoadStage, message: &str) {
        tracing::info!(%stage, detail = message, "design load");
        if let Some(cb) = self.progress {
            cb(&LoadProgress {
                stage,
                message: message.to_string(),
            });
        }
    }

    pub async fn load(
        &self,
        engine: &mut dyn DesignEngine,
        source: DesignSource,
    ) -> Result<LoadOutcome, LoadError> {
        let result = self.run(engine, source).await;
        if let Err(e) = &result {
            tracing::warn!(stage = %e.stage(), error = %e, "design load failed");
            self.report(LoadStage::Error, &e.to_string());
        }
        result
    }

    async fn run(
        &self,
        engine: &mut dyn DesignEngine,
        source: DesignSource,
    ) -> Result<LoadOutcome, LoadError> {
        self.report(LoadStage::Fetching, "Loading design file...");
        let bytes = self
            .read_source(source)
            .await
            .map_err(|source| LoadError::Fetch {
                stage: LoadStage::Fetching,
                source,
            })?;
        if bytes.is_empty() {
            return Err(LoadError::Empty);
        }
        tracing::debug!(size = bytes.len(), "design file fetched");

        self.report(LoadStage::Parsing, "Parsing design layers...");
        let parsing = |source: EngineError| LoadError::Engine {
            stage: LoadStage::Parsing,
            source,
        };
        ensure_alive(engine).map_err(parsing)?;
        clear_scene(engine).await.map_err(parsing)?;
        let report = self.importer.import(engine, &bytes).await.map_err(parsing)?;
        ensure_alive(engine).map_err(parsing)?;

        // The importer appends its page to the cleared scene.
        let page = engine
            .pages()
            .map_err(parsing)?
            .last()
            .copied()
            .ok_or(LoadError::NoPages)?;

        self.report(LoadStage::PostProcessing, "Preparing elements for editing...");
        let (replaceable_images, editable_texts) =
            prepare_page(engine, page).map_err(|source| LoadError::Engine {
                stage: LoadStage::PostProcessing,
                source,
            })?;

        self.report(LoadStage::Complete, "Design file loaded");
        Ok(LoadOutcome {
            page,
            messages: report.messages,
            replaceable_images,
            editable_texts,
        })
    }

    async fn read_source(&self, source: DesignSource) -> Result<Vec<u8>, FetchError> {
        match source {
            DesignSource::Bytes(bytes) => Ok(bytes),
            DesignSource::Url(url) if url.starts_with("data:") => decode_data_url(&url),
            DesignSource::Url(url) => self.fetcher.fetch(&url).await,
            DesignSource::LocalFile(path) => Ok(tokio::fs::read(&path).await?),
        }
    }
}

fn ensure_alive(engine: &dyn DesignEngine) -> Result<(), EngineError> {
    if engine.is_alive() {
        Ok(())
    } else {
        Err(EngineError::Disposed)
    }
}

/// Destroy every page of the current scene, creating a scene if none exists.
async fn clear_scene(engine: &mut dyn DesignEngine) -> Result<(), EngineError> {
    let stale = match engine.scene()? {
        Some(scene) if engine.is_valid(scene) => engine.pages()?,
        _ => {
            engine.create_scene().await?;
            engine.pages()?
        }
    };
    for page in stale {
        engine.destroy(page)?;
    }
    Ok(())
}

/// Tag images as replaceable and let text change content but not placement.
///
/// Returns the replaceable images and the editable texts.
fn prepare_page(
    engine: &mut dyn DesignEngine,
    page: BlockId,
) -> Result<(Vec<BlockId>, Vec<BlockId>), EngineError> {
    engine.set_property(page, Property::Visible(true))?;
    let mut images = vec![];
    let mut texts = vec![];
    for child in engine.children(page)? {
        if !engine.is_valid(child) {
            continue;
        }
        let kind = engine.kind(child)?;
        engine.set_property(child, Property::Visible(true))?;
        match kind {
            BlockKind::Graphic => {
                engine.set_metadata(child, REPLACEABLE_IMAGE_KEY, "true")?;
                engine.set_scope_enabled(child, Scope::FillChange, true)?;
                images.push(child);
            }
            BlockKind::Text => {
                engine.set_scope_enabled(child, Scope::TextEdit, true)?;
                engine.set_scope_enabled(child, Scope::EditorSelect, true)?;
                engine.set_transform_locked(child, true)?;
                texts.push(child);
            }
            _ => {}
        }
    }
    tracing::debug!(images = images.len(), texts = texts.len(), "prepared imported page");
    Ok((images, texts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{LayerDocumentImporter, MemoryEngine};
    use std::sync::Mutex;

    const DOC: &str = r##"{
        "width": 6.0, "height": 4.0,
        "layers": [
            {"name": "bg", "x": 0, "y": 0, "width": 6, "height": 4, "kind": "shape", "color": "#FFFFFF"},
            {"name": "photo", "x": 0.5, "y": 1.5, "width": 3, "height": 2, "kind": "image", "uri": "photo.jpg"},
            {"name": "title", "x": 0.5, "y": 0.5, "width": 5, "height": 1, "kind": "text", "text": "Hello"}
        ]
    }"##;

    struct Offline;

    #[async_trait]
    impl DesignFetcher for Offline {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            Err(FetchError::Transport(format!("offline: {url}")))
        }
    }

    fn doc() -> DesignSource {
        DesignSource::Bytes(DOC.as_bytes().to_vec())
    }

    #[tokio::test]
    async fn prepares_imported_layers_for_editing() {
        let mut engine = MemoryEngine::new();
        let outcome = DesignLoader::new(&LayerDocumentImporter, &Offline)
            .load(&mut engine, doc())
            .await
            .unwrap();

        assert_eq!(outcome.replaceable_images.len(), 2);
        for &image in &outcome.replaceable_images {
            assert_eq!(
                engine.metadata(image, REPLACEABLE_IMAGE_KEY).unwrap().as_deref(),
                Some("true")
            );
            assert!(engine.is_scope_enabled(image, Scope::FillChange).unwrap());
        }

        assert_eq!(outcome.editable_texts.len(), 1);
        let title = outcome.editable_texts[0];
        assert!(engine.is_scope_enabled(title, Scope::TextEdit).unwrap());
        assert!(engine.is_scope_enabled(title, Scope::EditorSelect).unwrap());
        for scope in [Scope::LayerMove, Scope::LayerResize, Scope::LayerRotate] {
            assert!(!engine.is_scope_enabled(title, scope).unwrap(), "{scope:?}");
        }
    }

    #[tokio::test]
    async fn replaces_existing_pages() {
        let mut engine = MemoryEngine::new();
        engine.create_scene().await.unwrap();
        let scene = engine.scene().unwrap().unwrap();
        let old = engine.pages().unwrap()[0];
        let extra = engine.create_block(BlockKind::Page).unwrap();
        engine.append_child(scene, extra).unwrap();

        let outcome = DesignLoader::new(&LayerDocumentImporter, &Offline)
            .load(&mut engine, doc())
            .await
            .unwrap();

        assert_eq!(engine.pages().unwrap(), vec![outcome.page]);
        assert!(!engine.is_valid(old));
        assert!(!engine.is_valid(extra));
        assert_eq!(engine.children(outcome.page).unwrap().len(), 3);
    }

    #[tokio::test]
    async fn disposed_engine_fails_while_parsing() {
        let mut engine = MemoryEngine::new();
        engine.dispose();
        let err = DesignLoader::new(&LayerDocumentImporter, &Offline)
            .load(&mut engine, doc())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LoadError::Engine {
                stage: LoadStage::Parsing,
                source: EngineError::Disposed
            }
        ));
    }

    #[tokio::test]
    async fn progress_follows_stages() {
        let stages = Mutex::new(Vec::new());
        let record = |p: &LoadProgress| stages.lock().unwrap().push(p.stage);

        let mut engine = MemoryEngine::new();
        DesignLoader::new(&LayerDocumentImporter, &Offline)
            .on_progress(&record)
            .load(&mut engine, doc())
            .await
            .unwrap();
        assert_eq!(
            std::mem::take(&mut *stages.lock().unwrap()),
            [
                LoadStage::Fetching,
                LoadStage::Parsing,
                LoadStage::PostProcessing,
                LoadStage::Complete
            ]
        );

        let err = DesignLoader::new(&LayerDocumentImporter, &Offline)
            .on_progress(&record)
            .load(&mut engine, DesignSource::Url("http://localhost:3001/psd/a.psd".into()))
            .await
            .unwrap_err();
        assert_eq!(err.stage(), LoadStage::Fetching);
        assert_eq!(
            *stages.lock().unwrap(),
            [LoadStage::Fetching, LoadStage::Error]
        );
    }

    #[test]
    fn decodes_base64_data_urls() {
        let bytes = decode_data_url("data:application/octet-stream;base64,aGVsbG8=").unwrap();
        assert_eq!(bytes, b"hello");
        assert!(decode_data_url("data:text/plain,hello").is_err());
        assert!(decode_data_url("data:;base64").is_err());
        assert!(decode_data_url("http://x").is_err());
    }

    #[test]
    fn error_carries_stage() {
        let e = LoadError::Engine {
            stage: LoadStage::PostProcessing,
            source: EngineError::Disposed,
        };
        assert_eq!(e.stage(), LoadStage::PostProcessing);
        assert_eq!(
            e.to_string(),
            "Design file load failed while post-processing: engine has been disposed"
        );
    }
}
