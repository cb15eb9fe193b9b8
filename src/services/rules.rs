use crate::models::{
    Category, CrsKind, CrsStatus, Finding, InspectedDataset, Scope, Severity, UnitKind,
};
use crate::services::inspector::InspectError;

const WGS84_EPSG: u32 = 4326;
const LONGITUDE_LIMIT: f64 = 180.0;
const LATITUDE_LIMIT: f64 = 90.0;

/// The fixed publishing checklist applied to every dataset that opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    CrsIdentity,
    CoordinateUnits,
    Dimensionality,
    GeometryPresence,
    CoordinateRange,
}

/// Evaluation order; it is also the order findings appear in the report.
pub const RULES: [Rule; 5] = [
    Rule::CrsIdentity,
    Rule::CoordinateUnits,
    Rule::Dimensionality,
    Rule::GeometryPresence,
    Rule::CoordinateRange,
];

impl Rule {
    pub fn category(&self) -> Category {
        match self {
            Rule::CrsIdentity => Category::WrongCrs,
            Rule::CoordinateUnits => Category::WrongUnits,
            Rule::Dimensionality => Category::Non2dGeometry,
            Rule::GeometryPresence => Category::EmptyDataset,
            Rule::CoordinateRange => Category::CoordinateRange,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Rule::GeometryPresence => Severity::Warning,
            Rule::CrsIdentity
            | Rule::CoordinateUnits
            | Rule::Dimensionality
            | Rule::CoordinateRange => Severity::Error,
        }
    }

    /// Checks one rule; `None` means the dataset complies.
    pub fn evaluate(&self, dataset: &InspectedDataset) -> Option<Finding> {
        let message = match self {
            Rule::CrsIdentity => check_crs_identity(dataset),
            Rule::CoordinateUnits => check_units(dataset),
            Rule::Dimensionality => check_dimensionality(dataset),
            Rule::GeometryPresence => check_presence(dataset),
            Rule::CoordinateRange => check_range(dataset),
        }?;

        let scope = Scope::dataset(&dataset.name);
        Some(match self.severity() {
            Severity::Error => Finding::error(self.category(), scope, message),
            Severity::Warning => Finding::warning(self.category(), scope, message),
        })
    }
}

/// Runs every rule independently; one failure never hides another.
pub fn apply_rules(dataset: &InspectedDataset) -> Vec<Finding> {
    RULES
        .iter()
        .filter_map(|rule| rule.evaluate(dataset))
        .collect()
}

/// The single finding for a dataset whose layer could not be opened.
pub fn unreadable_dataset(name: &str, err: &InspectError) -> Finding {
    Finding::error(
        Category::UnreadableDataset,
        Scope::dataset(name),
        format!("{}: dataset could not be opened: {}", name, err),
    )
}

// Absent and unparseable CRS fail closed here.
fn check_crs_identity(dataset: &InspectedDataset) -> Option<String> {
    let name = &dataset.name;
    match &dataset.crs {
        CrsStatus::Absent => Some(format!(
            "{}.prj is empty; coordinate system cannot be confirmed as WGS84 (EPSG:{})",
            name, WGS84_EPSG
        )),
        CrsStatus::Unknown(reason) => Some(format!(
            "{}.prj could not be parsed ({}); coordinate system cannot be confirmed as WGS84 (EPSG:{})",
            name, reason, WGS84_EPSG
        )),
        CrsStatus::Parsed(crs) if crs.kind == CrsKind::Geographic && crs.epsg == Some(WGS84_EPSG) => {
            None
        }
        CrsStatus::Parsed(crs) => Some(format!(
            "{}: coordinate system is not WGS84 (EPSG:{}); found {}",
            name,
            WGS84_EPSG,
            crs.describe()
        )),
    }
}

fn check_units(dataset: &InspectedDataset) -> Option<String> {
    let CrsStatus::Parsed(crs) = &dataset.crs else {
        return None;
    };

    match &crs.unit {
        None => Some(format!(
            "{}: coordinate system {} declares no units; decimal degrees are required",
            dataset.name,
            crs.describe()
        )),
        Some(unit) if unit.is_decimal_degree() => None,
        Some(unit) => {
            let kind = match unit.kind {
                UnitKind::Angular => "angular",
                UnitKind::Linear => "projected linear",
            };
            Some(format!(
                "{}: coordinates use {} units ({}); decimal degrees are required",
                dataset.name, kind, unit.name
            ))
        }
    }
}

fn check_dimensionality(dataset: &InspectedDataset) -> Option<String> {
    let dims = dataset.dimensionality;
    if dims.is_2d() {
        return None;
    }
    Some(format!(
        "{}: {} geometry detected ({}); only 2D geometry is accepted",
        dataset.name,
        dims.label(),
        dataset.geometry_type
    ))
}

fn check_presence(dataset: &InspectedDataset) -> Option<String> {
    (dataset.feature_count == 0).then(|| format!("{}: dataset contains no features", dataset.name))
}

fn check_range(dataset: &InspectedDataset) -> Option<String> {
    if dataset.feature_count == 0 {
        return None;
    }
    let extent = dataset.extent?;
    let (min, max) = (extent.min(), extent.max());

    let mut problems = Vec::new();
    if min.x < -LONGITUDE_LIMIT || max.x > LONGITUDE_LIMIT {
        problems.push(format!(
            "longitude values outside valid range: {:.6} to {:.6}",
            min.x, max.x
        ));
    }
    if min.y < -LATITUDE_LIMIT || max.y > LATITUDE_LIMIT {
        problems.push(format!(
            "latitude values outside valid range: {:.6} to {:.6}",
            min.y, max.y
        ));
    }

    if problems.is_empty() {
        None
    } else {
        Some(format!("{}: {}", dataset.name, problems.join("; ")))
    }
}
