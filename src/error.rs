//! Error types for locating, loading and configuring enhanced fields.
//!
//! None of these ever escape the [`Enhancer`](crate::controller::Enhancer):
//! a failing field is logged and skipped, the rest of the page keeps working.

use thiserror::Error;

/// Why a field could not be found in a form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocateError {
    /// No `<label>` in the form matched the configured text.
    #[error("no label matching '{label}'")]
    LabelNotFound { label: String },

    /// The label was found but no ancestor within the walk bound holds a control.
    #[error("no field wrapper around label '{label}'")]
    WrapperNotFound { label: String },

    /// The wrapper holds no usable control.
    #[error("no carrier control inside the field wrapper")]
    CarrierNotFound,

    /// A configured selector matched nothing inside the form.
    #[error("selector '{selector}' matched nothing")]
    SelectorNotMatched { selector: String },
}

/// Why a dataset could not be loaded.
///
/// `Clone` because one failed load is handed to every field sharing the
/// source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// The server answered with a non-success status.
    #[error("fetch failed for {url}: HTTP {status}")]
    Status { url: String, status: u16 },

    /// The request never produced a response.
    #[error("network error for {url}: {message}")]
    Network { url: String, message: String },

    /// The injected script failed to load or never called back.
    #[error("script load failed for {url}")]
    Script { url: String },

    /// The body was not valid JSON.
    #[error("invalid JSON from {url}: {message}")]
    Decode { url: String, message: String },

    /// The data URL could not be parsed.
    #[error("invalid data URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },
}

/// A selector string the CSS parser rejects.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectorError {
    /// The selector is blank.
    #[error("empty selector")]
    Empty,

    /// The CSS parser rejected the selector.
    #[error("invalid selector '{selector}': {message}")]
    Invalid { selector: String, message: String },
}

/// Invalid initialization options.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The options JSON did not match the expected shape.
    #[error("invalid options JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A field names neither a label nor selectors.
    #[error("field #{index} has neither targetLabel nor selectors")]
    MissingTarget { index: usize },

    /// A field names both inline data and a data URL.
    #[error("field '{key}' has both data and dataUrl")]
    AmbiguousSource { key: String },

    /// A configured selector does not parse.
    #[error("field '{key}': {source}")]
    Selector {
        key: String,
        #[source]
        source: SelectorError,
    },
}
