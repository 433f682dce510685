//! Editor Session - Single Entry Point
//!
//! One configurable editor replaces every per-screen variant: the mode
//! picks simple or advanced editing, the source picks a programmatic
//! template build or a design-file import. Opening runs under a wall-clock
//! bound; nothing is retried automatically.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::Instrument;
use uuid::Uuid;

use crate::builder::{build_template, BuildError, BuiltLayout};
use crate::color::Rgba;
use crate::config::ClientConfig;
use crate::engine::{
    check_contract, BlockId, BlockKind, DesignEngine, DesignImporter, EngineError,
    EngineFactory, EngineSettings, Scope,
};
use crate::export::{export_design, ExportError, ExportFormat, ExportOptions, ExportedDesign};
use crate::loader::{DesignFetcher, DesignLoader, DesignSource, LoadError, LoadOutcome};
use crate::restrict::{apply_selection_permissions, editable_set, SimplePanel};
use crate::templates::{BusinessData, Template};

pub const DEFAULT_INIT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditorMode {
    #[default]
    Simple,
    Advanced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContentSource {
    #[default]
    Template,
    DesignFile,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorConfig {
    pub mode: EditorMode,
    pub source: ContentSource,
    #[serde(with = "duration_secs")]
    pub init_timeout: Duration,
    pub file_server_url: String,
    #[serde(default)]
    pub engine: EngineSettings,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self::with_client(ClientConfig::default())
    }
}

impl EditorConfig {
    /// Defaults with the file server URL taken from the environment.
    pub fn from_env() -> Self {
        Self::with_client(ClientConfig::from_env())
    }

    fn with_client(client: ClientConfig) -> Self {
        Self {
            mode: EditorMode::default(),
            source: ContentSource::default(),
            init_timeout: DEFAULT_INIT_TIMEOUT,
            file_server_url: client.file_server_url,
            engine: EngineSettings::default(),
        }
    }

    pub fn design_url(&self, file_name: &str) -> String {
        ClientConfig {
            file_server_url: self.file_server_url.trim_end_matches('/').to_string(),
        }
        .design_url(file_name)
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Editor initialization failed: {0}")]
    Initialization(String),

    #[error("Editor initialization timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Import(#[from] LoadError),

    #[error("Element update failed: {0}")]
    Mutation(#[source] EngineError),

    #[error(transparent)]
    Export(#[from] ExportError),
}

impl SessionError {
    /// Whether a full re-open is worth offering.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SessionError::Initialization(_) | SessionError::Timeout(_) | SessionError::Export(_)
        )
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            SessionError::Initialization(_) => "The editor could not start. Try again.",
            SessionError::Timeout(_) => "The editor took too long to start. Try again.",
            SessionError::Import(_) => {
                "This design file could not be loaded. Pick another template."
            }
            SessionError::Mutation(_) => "That change could not be applied.",
            SessionError::Export(_) => "Export failed. Please try again.",
        }
    }
}

impl From<BuildError> for SessionError {
    fn from(e: BuildError) -> Self {
        SessionError::Initialization(e.to_string())
    }
}

/// What populated the page.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "source", rename_all = "kebab-case")]
pub enum SessionContent {
    Template(BuiltLayout),
    DesignFile(LoadOutcome),
}

impl SessionContent {
    pub fn page(&self) -> BlockId {
        match self {
            SessionContent::Template(layout) => layout.page,
            SessionContent::DesignFile(outcome) => outcome.page,
        }
    }
}

pub struct EditorSession {
    id: Uuid,
    span: tracing::Span,
    mode: EditorMode,
    design_name: String,
    engine: Box<dyn DesignEngine>,
    content: SessionContent,
    panel: Option<SimplePanel>,
}

impl std::fmt::Debug for EditorSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditorSession")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .field("design_name", &self.design_name)
            .field("alive", &self.engine.is_alive())
            .finish()
    }
}

impl EditorSession {
    /// Start an engine and populate it from `template`.
    pub async fn open(
        factory: &dyn EngineFactory,
        importer: &dyn DesignImporter,
        fetcher: &dyn DesignFetcher,
        config: &EditorConfig,
        template: &Template,
        data: &BusinessData,
    ) -> Result<Self, SessionError> {
        let id = Uuid::new_v4();
        let span = tracing::info_span!("editor_session", session = %id, template = %template.id);
        let start = Self::start(factory, importer, fetcher, config, template, data);
        let (engine, content) = tokio::time::timeout(config.init_timeout, start)
            .instrument(span.clone())
            .await
            .map_err(|_| {
                tracing::warn!(parent: &span, timeout = ?config.init_timeout, "editor start timed out");
                SessionError::Timeout(config.init_timeout)
            })??;

        let mut session = Self {
            id,
            span,
            mode: EditorMode::Advanced,
            design_name: template.name.clone(),
            engine,
            content,
            panel: None,
        };
        session.set_mode(config.mode)?;
        tracing::info!(parent: &session.span, mode = ?session.mode, "editor session ready");
        Ok(session)
    }

    async fn start(
        factory: &dyn EngineFactory,
        importer: &dyn DesignImporter,
        fetcher: &dyn DesignFetcher,
        config: &EditorConfig,
        template: &Template,
        data: &BusinessData,
    ) -> Result<(Box<dyn DesignEngine>, SessionContent), SessionError> {
        let init = |e: EngineError| SessionError::Initialization(e.to_string());
        let mut engine = factory.init(&config.engine).await.map_err(init)?;
        let version = engine.version();
        check_contract(&version).map_err(init)?;
        tracing::debug!(%version, "engine initialized");
        engine.create_scene().await.map_err(init)?;

        let design_file = match (config.source, template.design_file.as_deref()) {
            (ContentSource::DesignFile, Some(file)) => {
                let availability = template.availability();
                if availability.is_valid {
                    Some(file)
                } else {
                    tracing::warn!(
                        reason = %availability.reason,
                        "design file unavailable, building from template"
                    );
                    None
                }
            }
            (ContentSource::DesignFile, None) => {
                tracing::info!("template has no design file, building from template");
                None
            }
            (ContentSource::Template, _) => None,
        };

        let content = match design_file {
            Some(file) => {
                let url = config.design_url(file);
                let loader = DesignLoader::new(importer, fetcher);
                let outcome = loader.load(engine.as_mut(), DesignSource::Url(url)).await?;
                SessionContent::DesignFile(outcome)
            }
            None => SessionContent::Template(build_template(engine.as_mut(), template, data)?),
        };
        Ok((engine, content))
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn mode(&self) -> EditorMode {
        self.mode
    }

    pub fn content(&self) -> &SessionContent {
        &self.content
    }

    pub fn engine(&self) -> &dyn DesignEngine {
        self.engine.as_ref()
    }

    pub fn engine_mut(&mut self) -> &mut dyn DesignEngine {
        self.engine.as_mut()
    }

    /// The simple-mode panel; `None` in advanced mode.
    pub fn panel(&self) -> Option<&SimplePanel> {
        self.panel.as_ref()
    }

    fn ensure_alive(&self) -> Result<(), EngineError> {
        if self.engine.is_alive() {
            Ok(())
        } else {
            Err(EngineError::Disposed)
        }
    }

    /// Switch between restricted and full editing.
    pub fn set_mode(&mut self, mode: EditorMode) -> Result<(), SessionError> {
        let _guard = self.span.enter();
        self.ensure_alive().map_err(SessionError::Mutation)?;
        match mode {
            EditorMode::Simple => {
                let set = editable_set(self.engine.as_ref()).map_err(SessionError::Mutation)?;
                apply_selection_permissions(self.engine.as_mut(), &set)
                    .map_err(SessionError::Mutation)?;
                self.panel = Some(
                    SimplePanel::build(self.engine.as_ref(), &set)
                        .map_err(SessionError::Mutation)?,
                );
            }
            EditorMode::Advanced => {
                for block in self.engine.find_all().map_err(SessionError::Mutation)? {
                    if let Err(e) = self.engine.set_scope_enabled(block, Scope::EditorSelect, true) {
                        tracing::warn!(block = %block, error = %e, "could not restore selection");
                    }
                }
                self.panel = None;
            }
        }
        tracing::debug!(from = ?self.mode, to = ?mode, "editor mode set");
        self.mode = mode;
        Ok(())
    }

    /// Re-derive the panel from the live scene.
    pub fn refresh_panel(&mut self) -> Result<(), SessionError> {
        if self.mode == EditorMode::Simple {
            self.set_mode(EditorMode::Simple)?;
        }
        Ok(())
    }

    fn panel_mut(&mut self) -> Result<(&mut SimplePanel, &mut dyn DesignEngine), SessionError> {
        self.ensure_alive().map_err(SessionError::Mutation)?;
        match self.panel.as_mut() {
            Some(panel) => Ok((panel, self.engine.as_mut())),
            None => Err(SessionError::Mutation(EngineError::Unsupported {
                block: self.content.page(),
                kind: BlockKind::Page,
                what: "form editing outside simple mode".into(),
            })),
        }
    }

    /// Write a text group; returns how many blocks took the value.
    pub fn set_text(&mut self, name: &str, value: &str) -> Result<usize, SessionError> {
        let (panel, engine) = self.panel_mut()?;
        Ok(panel.set_text(engine, name, value).unwrap_or_else(|| {
            tracing::debug!(%name, "no text field with that name");
            0
        }))
    }

    pub fn replace_image(&mut self, block: BlockId, uri: &str) -> Result<(), SessionError> {
        let (panel, engine) = self.panel_mut()?;
        panel
            .replace_image(engine, block, uri)
            .map_err(SessionError::Mutation)
    }

    pub fn set_color(&mut self, index: usize, color: Rgba) -> Result<usize, SessionError> {
        let (panel, engine) = self.panel_mut()?;
        Ok(panel.set_color(engine, index, color))
    }

    /// Export the first page.
    pub async fn export(
        &self,
        format: ExportFormat,
        options: &ExportOptions,
    ) -> Result<ExportedDesign, SessionError> {
        self.ensure_alive().map_err(ExportError::from)?;
        let page = self
            .engine
            .pages()
            .map_err(ExportError::from)?
            .first()
            .copied()
            .ok_or(ExportError::Engine(EngineError::NoScene))?;
        export_design(self.engine.as_ref(), page, format, options, &self.design_name)
            .instrument(self.span.clone())
            .await
            .map_err(|e| {
                tracing::warn!(parent: &self.span, error = %e, "export failed");
                SessionError::from(e)
            })
    }

    pub fn is_alive(&self) -> bool {
        self.engine.is_alive()
    }

    /// Tear the engine down. Further calls are no-ops.
    pub fn dispose(&mut self) {
        if self.engine.is_alive() {
            tracing::info!(parent: &self.span, "disposing editor session");
            self.engine.dispose();
        }
        self.panel = None;
    }
}

impl Drop for EditorSession {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_policy_follows_taxonomy() {
        assert!(SessionError::Timeout(DEFAULT_INIT_TIMEOUT).is_retryable());
        assert!(SessionError::Initialization("x".into()).is_retryable());
        assert!(!SessionError::Import(LoadError::Empty).is_retryable());
        assert!(!SessionError::Mutation(EngineError::Disposed).is_retryable());
    }

    #[test]
    fn config_round_trips_timeout_as_seconds() {
        let json = r#"{"mode":"advanced","source":"design-file","initTimeout":2.5,"fileServerUrl":"http://files:3001/"}"#;
        let cfg: EditorConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.mode, EditorMode::Advanced);
        assert_eq!(cfg.source, ContentSource::DesignFile);
        assert_eq!(cfg.init_timeout, Duration::from_millis(2500));
        assert_eq!(cfg.design_url("a.psd"), "http://files:3001/psd/a.psd");
    }

    #[test]
    fn out_of_range_timeout_is_rejected() {
        for timeout in ["-1", "1e30"] {
            let json = format!(
                r#"{{"mode":"simple","source":"template","initTimeout":{timeout},"fileServerUrl":"x"}}"#
            );
            assert!(serde_json::from_str::<EditorConfig>(&json).is_err(), "{timeout}");
        }
    }
}
