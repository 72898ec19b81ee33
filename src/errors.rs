use thiserror::Error;
use uuid::Uuid;

/// A defect that makes a whole parse call fail. The in-memory document the
/// caller already holds is never touched by a failed parse.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid XML: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("missing root element <{0}>")]
    MissingRoot(&'static str),
    #[error("invalid KML: {0}")]
    Kml(#[from] kml::Error),
}

/// A recoverable, all-or-nothing failure of a single operation. No partial
/// mutation is ever left behind.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("split index {index} must be strictly interior to a segment of {len} points")]
    InvalidSplitIndex { index: usize, len: usize },
    #[error("no item with id {0}")]
    UnknownItem(Uuid),
    #[error("operation needs at least {required} points, got {actual}")]
    TooFewPoints { required: usize, actual: usize },
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}
