//! Postcard Studio - Composition Layer
//!
//! Everything here drives an external design engine through a typed
//! contract: templates are built into pages, layered design files are
//! imported and prepared, and simple mode narrows editing to a curated set
//! of elements. The design-file server hands out an allowlisted set of
//! files to clients.

pub mod color;
pub mod engine;
pub mod templates;
pub mod validation;
pub mod builder;
pub mod loader;
pub mod restrict;
pub mod export;
pub mod session;
pub mod config;
pub mod server;

pub use color::Rgba;
pub use engine::{BlockId, BlockKind, DesignEngine, EngineError, EngineFactory, Fill, Property, Scope};
pub use templates::{BusinessData, Template, TemplateCatalog, TemplateId};
pub use validation::{ValidationResult, ValidationRule, ValidationViolation, Validator, ViolationSeverity};
pub use builder::{build_template, BuildError, BuiltLayout};
pub use loader::{DesignLoader, DesignSource, LoadError, LoadStage};
pub use restrict::{EditableSet, SimplePanel};
pub use export::{ExportFormat, ExportOptions, ExportedDesign};
pub use session::{ContentSource, EditorConfig, EditorMode, EditorSession, SessionError};
pub use config::{ClientConfig, FileServerConfig};

pub const STUDIO_VERSION: &str = env!("CARGO_PKG_VERSION");
