use wasm_bindgen::JsValue;

/// Why a GPX document produced no usable points.
#[derive(Debug)]
pub enum GpxError {
    Malformed(quick_xml::Error),
    Structure(String),
    NoUsableData,
}

impl GpxError {
    /// True for syntax-level failures, false for a well-formed but empty document.
    pub fn is_malformed(&self) -> bool {
        !matches!(self, Self::NoUsableData)
    }

    /// Short code handed to the JS side.
    pub fn code(&self) -> &'static str {
        if self.is_malformed() {
            "invalidFormat"
        } else {
            "noData"
        }
    }

    pub fn user_message(&self) -> &'static str {
        if self.is_malformed() {
            "Error: Invalid GPX file format"
        } else {
            "Error: No track points or waypoints found in GPX file"
        }
    }
}

impl std::fmt::Display for GpxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed(e) => write!(f, "XML parse error: {e}"),
            Self::Structure(msg) => write!(f, "Ill-formed GPX document: {msg}"),
            Self::NoUsableData => write!(f, "No track points or waypoints found"),
        }
    }
}

impl std::error::Error for GpxError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Malformed(e) => Some(e),
            _ => None,
        }
    }
}

impl From<quick_xml::Error> for GpxError {
    fn from(e: quick_xml::Error) -> Self {
        Self::Malformed(e)
    }
}

impl From<quick_xml::events::attributes::AttrError> for GpxError {
    fn from(e: quick_xml::events::attributes::AttrError) -> Self {
        Self::Malformed(e.into())
    }
}

/// A single coordinate pair could not be reprojected.
#[derive(Debug, Clone, PartialEq)]
pub enum ConversionError {
    NonFinite,
    NoConvergence,
    OutOfRange { lng: f64, lat: f64 },
    InvalidDefinition(String),
}

impl std::fmt::Display for ConversionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonFinite => write!(f, "Reprojection produced a non-finite coordinate"),
            Self::NoConvergence => write!(f, "Inverse projection did not converge"),
            Self::OutOfRange { lng, lat } => {
                write!(f, "Reprojected coordinate ({lng}, {lat}) is outside geographic bounds")
            }
            Self::InvalidDefinition(msg) => write!(f, "Invalid projection definition: {msg}"),
        }
    }
}

impl std::error::Error for ConversionError {}

/// Catalog documents that could not be read.
#[derive(Debug)]
pub enum CatalogError {
    Json(serde_json::Error),
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json(e) => write!(f, "Catalog JSON error: {e}"),
        }
    }
}

impl std::error::Error for CatalogError {}

impl From<serde_json::Error> for CatalogError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

/// Terminal failure of a GPX load operation.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadError {
    InvalidFormat,
    NoData,
    AllMethodsFailed(String),
}

impl LoadError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::InvalidFormat => "Error: Invalid GPX file format",
            Self::NoData => "Error: No track points or waypoints found in GPX file",
            Self::AllMethodsFailed(_) => "Error: Could not load GPX file with any method",
        }
    }
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidFormat => write!(f, "GPX document is not well-formed XML"),
            Self::NoData => write!(f, "GPX document has no usable points"),
            Self::AllMethodsFailed(cause) => write!(f, "Fallback rendering failed: {cause}"),
        }
    }
}

impl std::error::Error for LoadError {}

impl From<&GpxError> for LoadError {
    fn from(e: &GpxError) -> Self {
        if e.is_malformed() {
            Self::InvalidFormat
        } else {
            Self::NoData
        }
    }
}

impl From<GpxError> for JsValue {
    fn from(e: GpxError) -> Self {
        JsValue::from_str(&e.to_string())
    }
}

impl From<ConversionError> for JsValue {
    fn from(e: ConversionError) -> Self {
        JsValue::from_str(&e.to_string())
    }
}

impl From<CatalogError> for JsValue {
    fn from(e: CatalogError) -> Self {
        JsValue::from_str(&e.to_string())
    }
}

/// A drawing primitive of the map collaborator failed.
#[derive(Debug, Clone, PartialEq)]
pub struct MapError(pub String);

impl std::fmt::Display for MapError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Map error: {}", self.0)
    }
}

impl std::error::Error for MapError {}

impl From<MapError> for LoadError {
    fn from(e: MapError) -> Self {
        Self::AllMethodsFailed(e.0)
    }
}
