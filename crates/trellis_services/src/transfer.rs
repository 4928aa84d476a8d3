//! Canvas documents: JSON round-trip, SVG rendering and merging imports.
//!
//! JSON export writes a [`CanvasDocument`] and is lossless: importing it into
//! an empty canvas reproduces the same nodes, connections and viewport. SVG is
//! render-only. Raster formats, PDF, XML and CSV belong to external renderers
//! and parsers and are reported as [`codes::UNSUPPORTED_FORMAT`].
//!
//! Merging imports rename colliding node and connection ids, and rewrite
//! connection endpoints to follow renamed nodes.

use core::fmt;
use core::str::FromStr;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use trellis_core::canvas::Viewport;
use trellis_core::clock::Clock;
use trellis_core::geometry::Rectangle;
use trellis_core::{Connection, ConnectionId, ErrorCode, Graph, Node, NodeId, codes};
use trellis_events::event::TransferEventData;
use trellis_events::{CanvasEvent, CanvasEventType, EventPayload};
use trellis_graph::{GraphStore, StoreError};
use trellis_validation::ValidationIssue;

const SOURCE: &str = "transfer";

/// Version written into every exported document.
pub const DOCUMENT_VERSION: &str = "1.0";

/// Padding around SVG content when none is requested.
pub const DEFAULT_SVG_PADDING: f64 = 20.0;

// ─────────────────────────────────────────────────────────────────────────────
// Formats
// ─────────────────────────────────────────────────────────────────────────────

/// Export target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Lossless canvas document.
    Json,
    /// Vector rendering.
    Svg,
    /// Raster image; rendered externally.
    Png,
    /// Raster image; rendered externally.
    Jpeg,
    /// Print document; rendered externally.
    Pdf,
}

impl ExportFormat {
    /// Formats the engine writes itself.
    pub const SUPPORTED: [ExportFormat; 2] = [ExportFormat::Json, ExportFormat::Svg];

    /// Wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Svg => "svg",
            ExportFormat::Png => "png",
            ExportFormat::Jpeg => "jpeg",
            ExportFormat::Pdf => "pdf",
        }
    }

    /// Returns true if the engine can write this format.
    #[must_use]
    pub fn is_supported(self) -> bool {
        Self::SUPPORTED.contains(&self)
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = TransferError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(ExportFormat::Json),
            "svg" => Ok(ExportFormat::Svg),
            "png" => Ok(ExportFormat::Png),
            "jpeg" | "jpg" => Ok(ExportFormat::Jpeg),
            "pdf" => Ok(ExportFormat::Pdf),
            other => Err(TransferError::UnknownFormat(other.to_owned())),
        }
    }
}

/// Import source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportFormat {
    /// Canvas document.
    #[default]
    Json,
    /// Parsed externally.
    Xml,
    /// Parsed externally.
    Csv,
}

impl ImportFormat {
    /// Formats the engine reads itself.
    pub const SUPPORTED: [ImportFormat; 1] = [ImportFormat::Json];

    /// Wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ImportFormat::Json => "json",
            ImportFormat::Xml => "xml",
            ImportFormat::Csv => "csv",
        }
    }

    /// Returns true if the engine can read this format.
    #[must_use]
    pub fn is_supported(self) -> bool {
        Self::SUPPORTED.contains(&self)
    }
}

impl fmt::Display for ImportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImportFormat {
    type Err = TransferError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(ImportFormat::Json),
            "xml" => Ok(ImportFormat::Xml),
            "csv" => Ok(ImportFormat::Csv),
            other => Err(TransferError::UnknownFormat(other.to_owned())),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Options
// ─────────────────────────────────────────────────────────────────────────────

/// How to export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportOptions {
    /// Target format.
    pub format: ExportFormat,
    /// Raster quality in `0..=1`; passed through to external renderers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<f64>,
    /// Output scale factor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,
    /// Background fill.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
    /// Space around the content, in canvas units.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub padding: Option<f64>,
    /// Whether JSON documents carry a metadata block.
    #[serde(default)]
    pub include_metadata: bool,
}

impl ExportOptions {
    /// Options for `format` with everything else unset.
    #[must_use]
    pub fn new(format: ExportFormat) -> Self {
        Self {
            format,
            quality: None,
            scale: None,
            background: None,
            padding: None,
            include_metadata: false,
        }
    }

    /// JSON export.
    #[must_use]
    pub fn json() -> Self {
        Self::new(ExportFormat::Json)
    }

    /// SVG export.
    #[must_use]
    pub fn svg() -> Self {
        Self::new(ExportFormat::Svg)
    }

    /// Sets the scale factor.
    #[must_use]
    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = Some(scale);
        self
    }

    /// Sets the padding.
    #[must_use]
    pub fn with_padding(mut self, padding: f64) -> Self {
        self.padding = Some(padding);
        self
    }

    /// Sets the background fill.
    #[must_use]
    pub fn with_background(mut self, background: impl Into<String>) -> Self {
        self.background = Some(background.into());
        self
    }

    /// Adds the metadata block to JSON documents.
    #[must_use]
    pub fn with_metadata(mut self) -> Self {
        self.include_metadata = true;
        self
    }
}

/// Hook applied to the raw JSON value before it is parsed.
pub type Transform = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// How to import.
#[derive(Clone)]
pub struct ImportOptions {
    /// Source format.
    pub format: ImportFormat,
    /// Add to the current canvas instead of replacing it.
    pub merge: bool,
    /// Reject documents whose resulting graph has blocking findings.
    pub validate: bool,
    /// Optional rewrite of the raw document.
    pub transform: Option<Transform>,
}

impl fmt::Debug for ImportOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportOptions")
            .field("format", &self.format)
            .field("merge", &self.merge)
            .field("validate", &self.validate)
            .field("transform", &self.transform.is_some())
            .finish()
    }
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            format: ImportFormat::Json,
            merge: false,
            validate: true,
            transform: None,
        }
    }
}

impl ImportOptions {
    /// Validated, replacing import of `format`.
    #[must_use]
    pub fn new(format: ImportFormat) -> Self {
        Self {
            format,
            ..Self::default()
        }
    }

    /// Validated, replacing JSON import.
    #[must_use]
    pub fn json() -> Self {
        Self::default()
    }

    /// Switches to merging.
    #[must_use]
    pub fn merged(mut self) -> Self {
        self.merge = true;
        self
    }

    /// Skips the whole-graph validation pass. Structural checks still apply.
    #[must_use]
    pub fn without_validation(mut self) -> Self {
        self.validate = false;
        self
    }

    /// Installs a transform hook.
    #[must_use]
    pub fn with_transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.transform = Some(Arc::new(transform));
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Why an import or export failed.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The format is known but handled outside the engine.
    #[error("{direction} format '{format}' is not supported")]
    UnsupportedFormat {
        /// `"export"` or `"import"`.
        direction: &'static str,
        /// Format name.
        format: String,
    },
    /// The format name is not recognised at all.
    #[error("unknown format '{0}'")]
    UnknownFormat(String),
    /// The document is not valid JSON or not a canvas document.
    #[error("malformed canvas document: {0}")]
    Parse(#[from] serde_json::Error),
    /// A node to export does not exist.
    #[error("node '{0}' not found")]
    NodeNotFound(NodeId),
    /// A connection to export does not exist.
    #[error("connection '{0}' not found")]
    ConnectionNotFound(ConnectionId),
    /// The imported graph has blocking findings.
    #[error("imported canvas failed validation: {}", summarize(.0))]
    Invalid(Vec<ValidationIssue>),
    /// The store refused the import.
    #[error(transparent)]
    Store(#[from] StoreError),
}

fn summarize(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(|issue| issue.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

impl ErrorCode for TransferError {
    fn code(&self) -> &'static str {
        match self {
            TransferError::UnsupportedFormat { .. } | TransferError::UnknownFormat(_) => {
                codes::UNSUPPORTED_FORMAT
            }
            TransferError::Parse(_) => codes::SERIALIZATION_ERROR,
            TransferError::NodeNotFound(_) => codes::NODE_NOT_FOUND,
            TransferError::ConnectionNotFound(_) => codes::CONNECTION_NOT_FOUND,
            TransferError::Invalid(_) => codes::VALIDATION_FAILED,
            TransferError::Store(err) => err.code(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Document
// ─────────────────────────────────────────────────────────────────────────────

/// Optional provenance block of an exported document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    /// Export time in epoch milliseconds.
    pub exported_at: u64,
    /// Number of nodes in the document.
    pub node_count: usize,
    /// Number of connections in the document.
    pub connection_count: usize,
    /// Writer name and version.
    pub generator: String,
}

/// The JSON exchange format.
///
/// ```json
/// { "version": "1.0", "nodes": [...], "connections": [...], "viewport": {...} }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasDocument {
    /// Format version.
    #[serde(default = "default_version")]
    pub version: String,
    /// Provenance, when requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<DocumentMetadata>,
    /// Nodes and connections.
    #[serde(flatten)]
    pub graph: Graph,
    /// Viewport; absent in partial exports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewport: Option<Viewport>,
}

fn default_version() -> String {
    DOCUMENT_VERSION.to_owned()
}

impl CanvasDocument {
    /// A document without metadata.
    #[must_use]
    pub fn new(graph: Graph, viewport: Option<Viewport>) -> Self {
        Self {
            version: default_version(),
            metadata: None,
            graph,
            viewport,
        }
    }

    /// Adds the metadata block.
    #[must_use]
    pub fn with_metadata(mut self, exported_at: u64) -> Self {
        self.metadata = Some(DocumentMetadata {
            exported_at,
            node_count: self.graph.nodes.len(),
            connection_count: self.graph.connections.len(),
            generator: concat!("trellis ", env!("CARGO_PKG_VERSION")).to_owned(),
        });
        self
    }

    /// Pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::Parse`] if a payload value cannot be written.
    pub fn to_json(&self) -> Result<String, TransferError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parses `text`, running `transform` on the raw value first.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::Parse`] for malformed JSON, a wrong shape or
    /// repeated ids.
    pub fn from_json(text: &str, transform: Option<&Transform>) -> Result<Self, TransferError> {
        let mut value: Value = serde_json::from_str(text)?;
        if let Some(transform) = transform {
            value = transform(value);
        }
        Ok(serde_json::from_value(value)?)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SVG
// ─────────────────────────────────────────────────────────────────────────────

/// Renders nodes as labelled rectangles and connections as straight lines
/// between node centers.
#[must_use]
pub fn render_svg(graph: &Graph, options: &ExportOptions) -> String {
    let padding = options
        .padding
        .filter(|p| p.is_finite() && *p >= 0.0)
        .unwrap_or(DEFAULT_SVG_PADDING);
    let scale = options.scale.filter(|s| s.is_finite() && *s > 0.0).unwrap_or(1.0);
    let bounds = graph.bounds().unwrap_or(Rectangle::new(0.0, 0.0, 0.0, 0.0));
    let width = (bounds.width + 2.0 * padding) * scale;
    let height = (bounds.height + 2.0 * padding) * scale;

    let mut svg = format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{width}\" height=\"{height}\" viewBox=\"0 0 {width} {height}\">\n"
    );
    if let Some(background) = &options.background {
        svg.push_str(&format!(
            "  <rect width=\"100%\" height=\"100%\" fill=\"{}\"/>\n",
            escape_xml(background)
        ));
    }
    svg.push_str(&format!(
        "  <g transform=\"scale({scale}) translate({} {})\">\n",
        padding - bounds.x,
        padding - bounds.y
    ));

    for connection in graph.connections.values() {
        let (Some(source), Some(target)) = (graph.node(&connection.source), graph.node(&connection.target))
        else {
            continue;
        };
        let (from, to) = (source.bounds().center(), target.bounds().center());
        let style = connection.style.as_ref();
        let stroke = style.and_then(|s| s.stroke.as_deref()).unwrap_or("#999999");
        let stroke_width = style.and_then(|s| s.stroke_width).unwrap_or(2.0);
        let dash = style
            .and_then(|s| s.stroke_dasharray.as_deref())
            .map(|d| format!(" stroke-dasharray=\"{}\"", escape_xml(d)))
            .unwrap_or_default();
        svg.push_str(&format!(
            "    <line data-id=\"{}\" x1=\"{}\" y1=\"{}\" x2=\"{}\" y2=\"{}\" stroke=\"{}\" stroke-width=\"{stroke_width}\"{dash}/>\n",
            escape_xml(connection.id.as_str()),
            from.x,
            from.y,
            to.x,
            to.y,
            escape_xml(stroke),
        ));
    }

    for node in graph.nodes.values() {
        let rect = node.bounds();
        let style = node.style.as_ref();
        let fill = style.and_then(|s| s.fill.as_deref()).unwrap_or("#ffffff");
        let stroke = style.and_then(|s| s.stroke.as_deref()).unwrap_or("#5b8ff9");
        let radius = style.and_then(|s| s.border_radius).unwrap_or(6.0);
        let label = node.label.as_deref().unwrap_or(node.kind.as_str());
        let center = rect.center();
        svg.push_str(&format!(
            "    <rect data-id=\"{}\" x=\"{}\" y=\"{}\" width=\"{}\" height=\"{}\" rx=\"{radius}\" fill=\"{}\" stroke=\"{}\"/>\n",
            escape_xml(node.id.as_str()),
            rect.x,
            rect.y,
            rect.width,
            rect.height,
            escape_xml(fill),
            escape_xml(stroke),
        ));
        svg.push_str(&format!(
            "    <text x=\"{}\" y=\"{}\" text-anchor=\"middle\" dominant-baseline=\"middle\">{}</text>\n",
            center.x,
            center.y,
            escape_xml(label)
        ));
    }
    svg.push_str("  </g>\n</svg>\n");
    svg
}

fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            c => escaped.push(c),
        }
    }
    escaped
}

// ─────────────────────────────────────────────────────────────────────────────
// Id remapping
// ─────────────────────────────────────────────────────────────────────────────

/// Ids renamed by [`remap_ids`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Renames {
    /// Original to new node id.
    pub nodes: IndexMap<NodeId, NodeId>,
    /// Original to new connection id.
    pub connections: IndexMap<ConnectionId, ConnectionId>,
}

impl Renames {
    /// Returns true if nothing was renamed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.connections.is_empty()
    }
}

/// Gives every incoming node or connection whose id is taken in `existing`
/// a fresh id. Connection endpoints follow their renamed nodes.
#[must_use]
pub fn remap_ids(incoming: Graph, existing: &Graph) -> (Graph, Renames) {
    let mut renames = Renames::default();
    let nodes: Vec<Node> = incoming
        .nodes
        .into_values()
        .map(|mut node| {
            if existing.nodes.contains_key(&node.id) {
                let fresh = NodeId::generate();
                renames.nodes.insert(node.id.clone(), fresh.clone());
                node.id = fresh;
            }
            node
        })
        .collect();
    let connections: Vec<Connection> = incoming
        .connections
        .into_values()
        .map(|mut connection| {
            if existing.connections.contains_key(&connection.id) {
                let fresh = ConnectionId::generate();
                renames.connections.insert(connection.id.clone(), fresh.clone());
                connection.id = fresh;
            }
            if let Some(source) = renames.nodes.get(&connection.source) {
                connection.source = source.clone();
            }
            if let Some(target) = renames.nodes.get(&connection.target) {
                connection.target = target.clone();
            }
            connection
        })
        .collect();
    (Graph::from_parts(nodes, connections), renames)
}

// ─────────────────────────────────────────────────────────────────────────────
// TransferManager
// ─────────────────────────────────────────────────────────────────────────────

/// What an import added.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportReport {
    /// Nodes now in the store, with their final ids.
    pub nodes: Vec<Node>,
    /// Connections now in the store, with their final ids.
    pub connections: Vec<Connection>,
    /// Ids renamed to avoid collisions.
    pub renames: Renames,
}

/// Import and export for one store.
#[derive(Debug, Clone)]
pub struct TransferManager {
    store: Arc<GraphStore>,
}

impl TransferManager {
    /// Creates a manager over `store`.
    #[must_use]
    pub fn new(store: Arc<GraphStore>) -> Self {
        Self { store }
    }

    /// Formats [`export_canvas`](Self::export_canvas) can write.
    #[must_use]
    pub fn supported_export_formats(&self) -> Vec<ExportFormat> {
        ExportFormat::SUPPORTED.to_vec()
    }

    /// Formats [`import_canvas`](Self::import_canvas) can read.
    #[must_use]
    pub fn supported_import_formats(&self) -> Vec<ImportFormat> {
        ImportFormat::SUPPORTED.to_vec()
    }

    /// Exports the whole canvas, viewport included.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::UnsupportedFormat`] for formats rendered
    /// outside the engine.
    pub async fn export_canvas(&self, options: &ExportOptions) -> Result<String, TransferError> {
        let graph = self.store.graph();
        let viewport = self.store.viewport();
        self.export(options, graph, Some(viewport)).await
    }

    /// Exports the given nodes and the connections running between them.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::NodeNotFound`] for unknown ids, before
    /// anything is emitted.
    pub async fn export_nodes(&self, ids: &[NodeId], options: &ExportOptions) -> Result<String, TransferError> {
        let graph = self.store.with_graph(|graph| {
            let nodes = ids
                .iter()
                .map(|id| {
                    graph
                        .node(id)
                        .cloned()
                        .ok_or_else(|| TransferError::NodeNotFound(id.clone()))
                })
                .collect::<Result<Vec<_>, _>>()?;
            let connections: Vec<Connection> = graph
                .connections
                .values()
                .filter(|c| ids.contains(&c.source) && ids.contains(&c.target))
                .cloned()
                .collect();
            Ok::<_, TransferError>(Graph::from_parts(nodes, connections))
        })?;
        self.export(options, graph, None).await
    }

    /// Exports the given connections only.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::ConnectionNotFound`] for unknown ids.
    pub async fn export_connections(
        &self,
        ids: &[ConnectionId],
        options: &ExportOptions,
    ) -> Result<String, TransferError> {
        let graph = self.store.with_graph(|graph| {
            let connections = ids
                .iter()
                .map(|id| {
                    graph
                        .connection(id)
                        .cloned()
                        .ok_or_else(|| TransferError::ConnectionNotFound(id.clone()))
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok::<_, TransferError>(Graph::from_parts([], connections))
        })?;
        self.export(options, graph, None).await
    }

    async fn export(
        &self,
        options: &ExportOptions,
        graph: Graph,
        viewport: Option<Viewport>,
    ) -> Result<String, TransferError> {
        let format = options.format.as_str();
        let started = self.store.clock().now_millis();
        self.emit(CanvasEventType::ExportStart, format, None, None, None).await;
        let output = match options.format {
            ExportFormat::Json => {
                let mut document = CanvasDocument::new(graph, viewport);
                if options.include_metadata {
                    document = document.with_metadata(started);
                }
                document.to_json()
            }
            ExportFormat::Svg => Ok(render_svg(&graph, options)),
            ExportFormat::Png | ExportFormat::Jpeg | ExportFormat::Pdf => Err(TransferError::UnsupportedFormat {
                direction: "export",
                format: format.to_owned(),
            }),
        };
        let elapsed = self.elapsed_since(started);
        match &output {
            Ok(text) => {
                tracing::debug!(format, bytes = text.len(), "canvas exported");
                self.emit(CanvasEventType::ExportEnd, format, Some(text.len()), Some(elapsed), None)
                    .await;
            }
            Err(err) => {
                tracing::warn!(format, code = err.code(), error = %err, "export failed");
                self.emit(CanvasEventType::ExportError, format, None, Some(elapsed), Some(err.to_string()))
                    .await;
            }
        }
        output
    }

    /// Imports a document. Replaces the canvas unless `options.merge`.
    ///
    /// # Errors
    ///
    /// Fails on unsupported formats, malformed documents, blocking
    /// validation findings (with `options.validate`) or store refusals. A
    /// failed import leaves the canvas unchanged.
    pub async fn import_canvas(&self, text: &str, options: &ImportOptions) -> Result<ImportReport, TransferError> {
        self.import(text, options, |this, document| async move {
            let viewport = document.viewport;
            if options.merge {
                this.merge(document.graph, options.validate).await
            } else {
                this.check(&document.graph, options.validate)?;
                let report = ImportReport {
                    nodes: document.graph.nodes.values().cloned().collect(),
                    connections: document.graph.connections.values().cloned().collect(),
                    renames: Renames::default(),
                };
                this.store.replace_graph(document.graph, viewport).await?;
                Ok(report)
            }
        })
        .await
    }

    /// Adds the nodes of a document, renaming colliding ids. Connections in
    /// the document are ignored.
    ///
    /// # Errors
    ///
    /// See [`import_canvas`](Self::import_canvas).
    pub async fn import_nodes(&self, text: &str, options: &ImportOptions) -> Result<Vec<Node>, TransferError> {
        let report = self
            .import(text, options, |this, document| async move {
                let nodes = Graph::from_parts(document.graph.nodes.into_values(), []);
                this.merge(nodes, options.validate).await
            })
            .await?;
        Ok(report.nodes)
    }

    /// Adds the connections of a document between existing nodes, renaming
    /// colliding ids. Nodes in the document are ignored.
    ///
    /// # Errors
    ///
    /// See [`import_canvas`](Self::import_canvas). Connections whose
    /// endpoints do not exist fail structural validation.
    pub async fn import_connections(
        &self,
        text: &str,
        options: &ImportOptions,
    ) -> Result<Vec<Connection>, TransferError> {
        let report = self
            .import(text, options, |this, document| async move {
                let connections = Graph::from_parts([], document.graph.connections.into_values());
                this.merge(connections, options.validate).await
            })
            .await?;
        Ok(report.connections)
    }

    async fn import<'a, F, Fut>(
        &'a self,
        text: &str,
        options: &'a ImportOptions,
        apply: F,
    ) -> Result<ImportReport, TransferError>
    where
        F: FnOnce(&'a Self, CanvasDocument) -> Fut,
        Fut: Future<Output = Result<ImportReport, TransferError>>,
    {
        let format = options.format.as_str();
        let started = self.store.clock().now_millis();
        self.emit(CanvasEventType::ImportStart, format, Some(text.len()), None, None)
            .await;
        let outcome = match options.format {
            ImportFormat::Json => match CanvasDocument::from_json(text, options.transform.as_ref()) {
                Ok(document) => apply(self, document).await,
                Err(err) => Err(err),
            },
            ImportFormat::Xml | ImportFormat::Csv => Err(TransferError::UnsupportedFormat {
                direction: "import",
                format: format.to_owned(),
            }),
        };
        let elapsed = self.elapsed_since(started);
        match &outcome {
            Ok(report) => {
                tracing::debug!(
                    format,
                    nodes = report.nodes.len(),
                    connections = report.connections.len(),
                    renamed = report.renames.nodes.len() + report.renames.connections.len(),
                    "canvas imported"
                );
                self.emit(CanvasEventType::ImportEnd, format, Some(text.len()), Some(elapsed), None)
                    .await;
            }
            Err(err) => {
                tracing::warn!(format, code = err.code(), error = %err, "import failed");
                self.emit(CanvasEventType::ImportError, format, Some(text.len()), Some(elapsed), Some(err.to_string()))
                    .await;
            }
        }
        outcome
    }

    async fn merge(&self, incoming: Graph, validate: bool) -> Result<ImportReport, TransferError> {
        let (incoming, renames, combined) = self.store.with_graph(|current| {
            let (incoming, renames) = remap_ids(incoming, current);
            let mut combined = current.clone();
            combined.nodes.extend(incoming.nodes.clone());
            combined.connections.extend(incoming.connections.clone());
            (incoming, renames, combined)
        });
        self.check(&combined, validate)?;
        let nodes: Vec<Node> = incoming.nodes.into_values().collect();
        let connections: Vec<Connection> = incoming.connections.into_values().collect();
        self.store
            .add_entities(nodes.clone(), connections.clone())
            .await?;
        Ok(ImportReport {
            nodes,
            connections,
            renames,
        })
    }

    fn check(&self, graph: &Graph, validate: bool) -> Result<(), TransferError> {
        if !validate {
            return Ok(());
        }
        let validator = self.store.validator();
        let result = validator.validate_graph(graph);
        let blocking: Vec<ValidationIssue> = result
            .blocking(validator.is_strict())
            .into_iter()
            .cloned()
            .collect();
        if blocking.is_empty() {
            Ok(())
        } else {
            Err(TransferError::Invalid(blocking))
        }
    }

    fn elapsed_since(&self, started: u64) -> f64 {
        self.store.clock().now_millis().saturating_sub(started) as f64
    }

    async fn emit(
        &self,
        kind: CanvasEventType,
        format: &str,
        size: Option<usize>,
        duration_ms: Option<f64>,
        error: Option<String>,
    ) {
        let data = TransferEventData {
            format: format.to_owned(),
            size,
            duration_ms,
            error,
        };
        let event = CanvasEvent::new(kind, EventPayload::Transfer(data)).from_source(SOURCE);
        self.store.bus().emit(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::NodeKind;

    fn graph() -> Graph {
        Graph::from_parts(
            [
                Node::new("a", NodeKind::Start, 0.0, 0.0),
                Node::new("b", NodeKind::Sms, 200.0, 0.0),
            ],
            [Connection::new("ab", "a", "b")],
        )
    }

    #[test]
    fn formats_parse_and_report_support() {
        assert_eq!("jpg".parse::<ExportFormat>().unwrap(), ExportFormat::Jpeg);
        assert!(ExportFormat::Svg.is_supported());
        assert!(!ExportFormat::Pdf.is_supported());
        assert!(!ImportFormat::Csv.is_supported());
        let err = "bmp".parse::<ExportFormat>().unwrap_err();
        assert_eq!(err.code(), codes::UNSUPPORTED_FORMAT);
    }

    #[test]
    fn document_keeps_graph_and_viewport() {
        let document = CanvasDocument::new(graph(), Some(Viewport::default())).with_metadata(42);
        let text = document.to_json().unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["version"], DOCUMENT_VERSION);
        assert_eq!(value["metadata"]["nodeCount"], 2);
        assert_eq!(value["connections"][0]["id"], "ab");
        assert_eq!(CanvasDocument::from_json(&text, None).unwrap(), document);
    }

    #[test]
    fn repeated_ids_are_rejected_on_parse() {
        let text = r#"{"nodes":[{"id":"a","type":"sms","x":0,"y":0},{"id":"a","type":"sms","x":1,"y":1}]}"#;
        let err = CanvasDocument::from_json(text, None).unwrap_err();
        assert_eq!(err.code(), codes::SERIALIZATION_ERROR);
    }

    #[test]
    fn transform_runs_before_parsing() {
        let transform: Transform = Arc::new(|mut value: Value| {
            value["nodes"][0]["label"] = Value::from("renamed");
            value
        });
        let text = CanvasDocument::new(graph(), None).to_json().unwrap();
        let document = CanvasDocument::from_json(&text, Some(&transform)).unwrap();
        assert_eq!(document.graph.nodes[0].label.as_deref(), Some("renamed"));
    }

    #[test]
    fn remap_renames_collisions_and_follows_endpoints() {
        let existing = Graph::from_parts([Node::new("a", NodeKind::Sms, 0.0, 0.0)], []);
        let (remapped, renames) = remap_ids(graph(), &existing);
        let fresh = &renames.nodes[&NodeId::from("a")];
        assert_ne!(fresh.as_str(), "a");
        assert!(remapped.nodes.contains_key(fresh));
        assert!(remapped.nodes.contains_key(&NodeId::from("b")));
        let connection = &remapped.connections[&ConnectionId::from("ab")];
        assert_eq!(&connection.source, fresh);
        assert!(renames.connections.is_empty());
    }

    #[test]
    fn svg_escapes_labels_and_applies_padding() {
        let mut g = graph();
        g.nodes[0].label = Some("<Start & go>".into());
        let svg = render_svg(&g, &ExportOptions::svg().with_padding(10.0).with_background("#fff"));
        assert!(svg.starts_with("<svg"));
        assert!(svg.contains("&lt;Start &amp; go&gt;"));
        assert!(svg.contains("width=\"340\""));
        assert!(svg.contains("fill=\"#fff\""));
        assert_eq!(svg.matches("<line").count(), 1);
    }
}
