//! The page side of the protocol.
//!
//! A [`Tab`] owns the current document, the session's ref table and the
//! console buffer, and turns decoded [`Command`]s into results. Interactions
//! are split in two ([`Tab::begin`] then [`Tab::finish`]) so the caller can
//! await [`SETTLE_DELAY`](crate::interact::SETTLE_DELAY) in between without
//! this crate knowing about async runtimes.

use std::collections::VecDeque;
use std::path::PathBuf;

use serde_json::Value;

use crate::aria::Classifier;
use crate::dom::{html, Document};
use crate::error::ApiError;
use crate::interact;
use crate::protocol::{
    Command, ConsoleEntry, ConsoleLevel, ConsoleResult, InteractParams, InteractResult,
    NavigateResult,
};
use crate::refs::RefTable;
use crate::selector::Resolver;
use crate::snapshot::{take_snapshot, AriaSnapshot};

/// Console entries kept; older ones are dropped first.
pub const CONSOLE_CAPACITY: usize = 1000;

/// A freshly loaded page plus anything worth telling the console about.
#[derive(Debug)]
pub struct LoadedPage {
    pub document: Document,
    pub warnings: Vec<String>,
}

/// Produces documents for URLs.
pub trait PageLoader: Send {
    fn load(&self, url: &str) -> Result<LoadedPage, ApiError>;
}

/// Loads `about:blank`, `data:text/html,…` and `file://` URLs.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinLoader;

impl PageLoader for BuiltinLoader {
    fn load(&self, raw: &str) -> Result<LoadedPage, ApiError> {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("about:blank") {
            return Ok(LoadedPage {
                document: Document::new("about:blank"),
                warnings: Vec::new(),
            });
        }

        let parsed = url::Url::parse(raw).map_err(|e| ApiError::navigation_failed(raw, e))?;
        let source = match parsed.scheme() {
            "data" => data_url_body(raw)?,
            "file" => {
                let path: PathBuf = parsed
                    .to_file_path()
                    .map_err(|_| ApiError::navigation_failed(raw, "not a local file path"))?;
                std::fs::read_to_string(&path).map_err(|e| {
                    ApiError::navigation_failed(raw, format!("{}: {}", path.display(), e))
                })?
            }
            other => {
                return Err(ApiError::navigation_failed(
                    raw,
                    format!("scheme '{}' is not supported", other),
                ))
            }
        };

        let document = html::parse(raw, &source).map_err(|e| ApiError::navigation_failed(raw, e))?;
        let scripts = document
            .descendants(document.root())
            .into_iter()
            .filter(|&n| document.tag(n) == Some("script"))
            .count();
        let mut warnings = Vec::new();
        if scripts > 0 {
            warnings.push(format!("{} script element(s) were not executed", scripts));
        }
        Ok(LoadedPage { document, warnings })
    }
}

/// Body of a `data:` URL with an HTML (or unspecified) media type.
fn data_url_body(raw: &str) -> Result<String, ApiError> {
    let rest = &raw["data:".len()..];
    let (meta, body) = rest
        .split_once(',')
        .ok_or_else(|| ApiError::navigation_failed(raw, "data URL has no ','"))?;
    let meta = meta.to_ascii_lowercase();
    if meta.split(';').any(|part| part.trim() == "base64") {
        return Err(ApiError::navigation_failed(raw, "base64 data URLs are not supported"));
    }
    let media_type = meta.split(';').next().unwrap_or("").trim();
    if !media_type.is_empty() && media_type != "text/html" {
        return Err(ApiError::navigation_failed(
            raw,
            format!("media type '{}' is not HTML", media_type),
        ));
    }
    urlencoding::decode(body)
        .map(|decoded| decoded.into_owned())
        .map_err(|e| ApiError::navigation_failed(raw, e))
}

/// An action that has been applied and is waiting out its settle delay.
#[derive(Debug)]
#[must_use = "finish the interaction to build its result"]
pub struct PendingInteraction {
    with_snapshot: bool,
}

/// What [`Tab::begin`] produced.
#[derive(Debug)]
pub enum Step {
    Done(Value),
    Settle(PendingInteraction),
}

pub struct Tab {
    document: Document,
    refs: RefTable,
    classifier: Classifier,
    console: VecDeque<ConsoleEntry>,
    loader: Box<dyn PageLoader>,
}

impl Tab {
    pub fn new(loader: Box<dyn PageLoader>) -> Self {
        Self::with_document(Document::new("about:blank"), loader)
    }

    pub fn with_document(document: Document, loader: Box<dyn PageLoader>) -> Self {
        Self {
            document,
            refs: RefTable::new(),
            classifier: Classifier::default(),
            console: VecDeque::new(),
            loader,
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    /// Start executing a command.
    pub fn begin(&mut self, command: Command) -> Result<Step, ApiError> {
        let value = match command {
            Command::Snapshot => to_value(self.snapshot())?,
            Command::Navigate(params) => to_value(self.navigate(&params.url)?)?,
            Command::Console => to_value(self.console())?,
            Command::Interact(params) => return self.interact(&params).map(Step::Settle),
        };
        Ok(Step::Done(value))
    }

    /// Complete an interaction after its settle delay.
    pub fn finish(&mut self, pending: PendingInteraction) -> Value {
        let elements = pending
            .with_snapshot
            .then(|| self.snapshot().elements);
        let result = InteractResult {
            success: true,
            url: self.document.url().to_string(),
            title: self.document.title(),
            elements,
        };
        serde_json::to_value(result).unwrap_or(Value::Null)
    }

    pub fn snapshot(&mut self) -> AriaSnapshot {
        take_snapshot(&self.document, &self.classifier, &mut self.refs)
    }

    pub fn navigate(&mut self, url: &str) -> Result<NavigateResult, ApiError> {
        let loaded = match self.loader.load(url) {
            Ok(loaded) => loaded,
            Err(e) => {
                self.log(ConsoleLevel::Error, e.message.clone());
                return Err(e);
            }
        };
        self.document = loaded.document;
        tracing::info!(url = self.document.url(), "navigated");
        self.log(ConsoleLevel::Info, format!("Navigated to {}", self.document.url()));
        for warning in loaded.warnings {
            self.log(ConsoleLevel::Warn, warning);
        }
        Ok(NavigateResult {
            url: self.document.url().to_string(),
            title: self.document.title(),
        })
    }

    pub fn interact(&mut self, params: &InteractParams) -> Result<PendingInteraction, ApiError> {
        let action_params = params.action_params();
        interact::validate(params.action, &action_params, params.element.is_some())?;

        let target = match &params.element {
            Some(selector) => Some(
                Resolver {
                    doc: &self.document,
                    classifier: &self.classifier,
                    refs: &self.refs,
                }
                .resolve(selector)?,
            ),
            None => None,
        };

        let outcome = interact::perform(&mut self.document, target, params.action, &action_params)?;
        if let Some(url) = outcome.navigate_to {
            // A failed link navigation leaves the page in place; the error
            // is already in the console.
            if let Err(e) = self.navigate(&url) {
                tracing::warn!(%url, error = %e, "link navigation failed");
            }
        }
        Ok(PendingInteraction {
            with_snapshot: params.snapshot,
        })
    }

    pub fn console(&self) -> ConsoleResult {
        ConsoleResult {
            logs: self.console.iter().cloned().collect(),
        }
    }

    pub fn log(&mut self, level: ConsoleLevel, text: impl Into<String>) {
        if self.console.len() == CONSOLE_CAPACITY {
            self.console.pop_front();
        }
        self.console.push_back(ConsoleEntry {
            level,
            ts: chrono::Utc::now().timestamp_millis(),
            text: text.into(),
        });
    }
}

fn to_value<T: serde::Serialize>(value: T) -> Result<Value, ApiError> {
    serde_json::to_value(value).map_err(|e| ApiError::internal(format!("failed to encode result: {}", e)))
}
