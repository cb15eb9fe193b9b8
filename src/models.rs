pub mod error;
pub use error::{AppError, ArchiveError, Result};

use geo_types::Rect;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

impl Severity {
    pub fn marker(&self) -> &'static str {
        match self {
            Severity::Error => "ERROR",
            Severity::Warning => "WARNING",
        }
    }
}

/// Closed set of finding categories. Adding a variant forces every match in
/// the rule engine and report to handle it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Category {
    #[serde(rename = "missing-file")]
    MissingFile,
    #[serde(rename = "missing-core-file")]
    MissingCoreFile,
    #[serde(rename = "archive-structure")]
    ArchiveStructure,
    #[serde(rename = "unreadable-dataset")]
    UnreadableDataset,
    #[serde(rename = "wrong-crs")]
    WrongCrs,
    #[serde(rename = "wrong-units")]
    WrongUnits,
    #[serde(rename = "non-2d-geometry")]
    Non2dGeometry,
    #[serde(rename = "coordinate-range")]
    CoordinateRange,
    #[serde(rename = "empty-dataset")]
    EmptyDataset,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::MissingFile => "missing-file",
            Category::MissingCoreFile => "missing-core-file",
            Category::ArchiveStructure => "archive-structure",
            Category::UnreadableDataset => "unreadable-dataset",
            Category::WrongCrs => "wrong-crs",
            Category::WrongUnits => "wrong-units",
            Category::Non2dGeometry => "non-2d-geometry",
            Category::CoordinateRange => "coordinate-range",
            Category::EmptyDataset => "empty-dataset",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "scope", content = "name", rename_all = "lowercase")]
pub enum Scope {
    Archive,
    Dataset(String),
}

impl Scope {
    pub fn dataset(name: &str) -> Self {
        Scope::Dataset(name.to_string())
    }
}

/// One validation fact. Built once and never changed afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Finding {
    severity: Severity,
    category: Category,
    scope: Scope,
    message: String,
}

impl Finding {
    pub fn error(category: Category, scope: Scope, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            category,
            scope,
            message: message.into(),
        }
    }

    pub fn warning(category: Category, scope: Scope, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            category,
            scope,
            message: message.into(),
        }
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// The four files a publishable shapefile must ship with.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ShapefilePart {
    Shp,
    Shx,
    Dbf,
    Prj,
}

impl ShapefilePart {
    pub const REQUIRED: [ShapefilePart; 4] = [
        ShapefilePart::Shp,
        ShapefilePart::Shx,
        ShapefilePart::Dbf,
        ShapefilePart::Prj,
    ];

    /// Case-insensitive lookup, with or without the leading dot.
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.strip_prefix('.').unwrap_or(ext);
        Self::REQUIRED
            .into_iter()
            .find(|part| part.extension().eq_ignore_ascii_case(ext))
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ShapefilePart::Shp => "shp",
            ShapefilePart::Shx => "shx",
            ShapefilePart::Dbf => "dbf",
            ShapefilePart::Prj => "prj",
        }
    }
}

impl fmt::Display for ShapefilePart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ".{}", self.extension())
    }
}

/// Members sharing one base name, suspected to form a shapefile.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateDataset {
    pub name: String,
    /// Workspace-relative paths, keyed by part.
    pub parts: BTreeMap<ShapefilePart, PathBuf>,
}

impl CandidateDataset {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parts: BTreeMap::new(),
        }
    }

    pub fn has(&self, part: ShapefilePart) -> bool {
        self.parts.contains_key(&part)
    }

    pub fn path(&self, part: ShapefilePart) -> Option<&Path> {
        self.parts.get(&part).map(PathBuf::as_path)
    }

    pub fn missing(&self) -> Vec<ShapefilePart> {
        ShapefilePart::REQUIRED
            .into_iter()
            .filter(|part| !self.has(*part))
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing().is_empty()
    }
}

/// Shape types from the shapefile header table.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum GeometryType {
    Null,
    Point,
    PolyLine,
    Polygon,
    MultiPoint,
    PointZ,
    PolyLineZ,
    PolygonZ,
    MultiPointZ,
    PointM,
    PolyLineM,
    PolygonM,
    MultiPointM,
    MultiPatch,
}

impl GeometryType {
    pub fn from_code(code: i32) -> Option<Self> {
        let geometry_type = match code {
            0 => GeometryType::Null,
            1 => GeometryType::Point,
            3 => GeometryType::PolyLine,
            5 => GeometryType::Polygon,
            8 => GeometryType::MultiPoint,
            11 => GeometryType::PointZ,
            13 => GeometryType::PolyLineZ,
            15 => GeometryType::PolygonZ,
            18 => GeometryType::MultiPointZ,
            21 => GeometryType::PointM,
            23 => GeometryType::PolyLineM,
            25 => GeometryType::PolygonM,
            28 => GeometryType::MultiPointM,
            31 => GeometryType::MultiPatch,
            _ => return None,
        };
        Some(geometry_type)
    }

    pub fn name(&self) -> &'static str {
        match self {
            GeometryType::Null => "Null",
            GeometryType::Point => "Point",
            GeometryType::PolyLine => "PolyLine",
            GeometryType::Polygon => "Polygon",
            GeometryType::MultiPoint => "MultiPoint",
            GeometryType::PointZ => "PointZ",
            GeometryType::PolyLineZ => "PolyLineZ",
            GeometryType::PolygonZ => "PolygonZ",
            GeometryType::MultiPointZ => "MultiPointZ",
            GeometryType::PointM => "PointM",
            GeometryType::PolyLineM => "PolyLineM",
            GeometryType::PolygonM => "PolygonM",
            GeometryType::MultiPointM => "MultiPointM",
            GeometryType::MultiPatch => "MultiPatch",
        }
    }

    pub fn has_z(&self) -> bool {
        matches!(
            self,
            GeometryType::PointZ
                | GeometryType::PolyLineZ
                | GeometryType::PolygonZ
                | GeometryType::MultiPointZ
                | GeometryType::MultiPatch
        )
    }

    /// True for the measured-only family. Z types may also carry measures,
    /// which only the header's M range can reveal.
    pub fn is_measured(&self) -> bool {
        matches!(
            self,
            GeometryType::PointM
                | GeometryType::PolyLineM
                | GeometryType::PolygonM
                | GeometryType::MultiPointM
        )
    }
}

impl fmt::Display for GeometryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Dimensionality {
    pub has_z: bool,
    pub has_m: bool,
}

impl Dimensionality {
    pub fn is_2d(&self) -> bool {
        !self.has_z && !self.has_m
    }

    pub fn label(&self) -> &'static str {
        match (self.has_z, self.has_m) {
            (false, false) => "2D",
            (true, false) => "3D (Z)",
            (false, true) => "measured (M)",
            (true, true) => "3D measured (ZM)",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum UnitKind {
    Angular,
    Linear,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Unit {
    pub name: String,
    /// Radians per unit for angular units, metres per unit for linear ones.
    pub factor: f64,
    pub kind: UnitKind,
}

impl Unit {
    pub const DEGREE_IN_RADIANS: f64 = std::f64::consts::PI / 180.0;

    pub fn is_decimal_degree(&self) -> bool {
        self.kind == UnitKind::Angular
            && ((self.factor - Self::DEGREE_IN_RADIANS).abs() < 1e-10
                || (self.factor == 0.0 && self.name.to_ascii_lowercase().starts_with("degree")))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum CrsKind {
    Geographic,
    Projected,
    Geocentric,
    Compound,
    Unrecognized(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Crs {
    pub kind: CrsKind,
    pub name: String,
    pub epsg: Option<u32>,
    pub unit: Option<Unit>,
}

impl Crs {
    pub fn identifier(&self) -> String {
        match self.epsg {
            Some(code) => format!("EPSG:{}", code),
            None => self.name.clone(),
        }
    }

    pub fn describe(&self) -> String {
        match self.epsg {
            Some(code) => format!("{} (EPSG:{})", self.name, code),
            None => format!("{} (no EPSG code)", self.name),
        }
    }
}

/// What the `.prj` file told us.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum CrsStatus {
    Absent,
    Unknown(String),
    Parsed(Crs),
}

impl CrsStatus {
    pub fn identifier(&self) -> String {
        match self {
            CrsStatus::Absent => "absent".to_string(),
            CrsStatus::Unknown(_) => "unknown".to_string(),
            CrsStatus::Parsed(crs) => crs.identifier(),
        }
    }

    pub fn epsg(&self) -> Option<u32> {
        match self {
            CrsStatus::Parsed(crs) => crs.epsg,
            _ => None,
        }
    }
}

/// A candidate whose geometry layer opened; input to the rule engine.
#[derive(Debug, Clone, PartialEq)]
pub struct InspectedDataset {
    pub name: String,
    pub geometry_type: GeometryType,
    pub dimensionality: Dimensionality,
    pub crs: CrsStatus,
    pub feature_count: u32,
    pub extent: Option<Rect<f64>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ValidationResult {
    pub valid: bool,
    pub report: String,
    pub shapefiles: Vec<String>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    #[serde(skip)]
    pub findings: Vec<Finding>,
}

impl ValidationResult {
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }

    pub fn has_category(&self, category: Category) -> bool {
        self.findings.iter().any(|f| f.category() == category)
    }
}
