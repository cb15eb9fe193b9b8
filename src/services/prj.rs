//! Coordinate reference system detection from `.prj` content.
//!
//! `.prj` files hold OGC WKT, usually the ESRI flavour of WKT1 and
//! occasionally WKT2. The text is parsed into a keyword tree and then
//! interpreted: only the root-level authority identifies the CRS, since
//! datums, spheroids and units carry their own nested authorities.

use crate::models::{Crs, CrsKind, CrsStatus, Unit, UnitKind};
use regex::Regex;
use std::sync::OnceLock;

const WGS84_EPSG: u32 = 4326;
/// Real CRS definitions nest well under ten levels.
const MAX_WKT_DEPTH: usize = 32;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Text(String),
    Word(String),
    Number(f64),
    Open,
    Close,
    Comma,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WktValue {
    Text(String),
    Word(String),
    Number(f64),
    Node(WktNode),
}

#[derive(Debug, Clone, PartialEq)]
pub struct WktNode {
    /// Upper-cased keyword, e.g. `GEOGCS`.
    pub keyword: String,
    pub args: Vec<WktValue>,
}

impl WktNode {
    pub fn name(&self) -> Option<&str> {
        self.args.iter().find_map(|arg| match arg {
            WktValue::Text(text) => Some(text.as_str()),
            _ => None,
        })
    }

    pub fn number_at(&self, position: usize) -> Option<f64> {
        match self.args.get(position)? {
            WktValue::Number(value) => Some(*value),
            WktValue::Text(text) => text.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn children(&self) -> impl Iterator<Item = &WktNode> {
        self.args.iter().filter_map(|arg| match arg {
            WktValue::Node(node) => Some(node),
            _ => None,
        })
    }

    pub fn child(&self, keywords: &[&str]) -> Option<&WktNode> {
        self.children()
            .find(|node| keywords.contains(&node.keyword.as_str()))
    }
}

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r#"^\s*(?:"((?:[^"]|"")*)"|([A-Za-z_][A-Za-z0-9_]*)|([-+]?(?:\d+(?:\.\d*)?|\.\d+)(?:[eE][-+]?\d+)?)|([\[\]\(\),]))"#,
        )
        .expect("WKT token pattern is valid")
    })
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let pattern = token_pattern();
    let mut tokens = Vec::new();
    let mut rest = input;

    while !rest.trim_start().is_empty() {
        let caps = pattern.captures(rest).ok_or_else(|| {
            let offset = input.len() - rest.trim_start().len();
            format!("unexpected character at offset {}", offset)
        })?;

        let token = if let Some(text) = caps.get(1) {
            Token::Text(text.as_str().replace("\"\"", "\""))
        } else if let Some(word) = caps.get(2) {
            Token::Word(word.as_str().to_string())
        } else if let Some(number) = caps.get(3) {
            let value = number
                .as_str()
                .parse::<f64>()
                .map_err(|e| format!("bad number {}: {}", number.as_str(), e))?;
            Token::Number(value)
        } else {
            match caps.get(4).map(|m| m.as_str()) {
                Some("[") | Some("(") => Token::Open,
                Some("]") | Some(")") => Token::Close,
                _ => Token::Comma,
            }
        };

        tokens.push(token);
        rest = &rest[caps.get(0).map(|m| m.end()).unwrap_or(rest.len())..];
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    position: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        self.position += 1;
        token
    }

    fn node(&mut self) -> Result<WktNode, String> {
        self.depth += 1;
        if self.depth > MAX_WKT_DEPTH {
            return Err("WKT nesting too deep".to_string());
        }

        let keyword = match self.next() {
            Some(Token::Word(word)) => word.to_ascii_uppercase(),
            other => return Err(format!("expected keyword, found {:?}", other)),
        };
        match self.next() {
            Some(Token::Open) => {}
            other => return Err(format!("expected '[' after {}, found {:?}", keyword, other)),
        }

        let mut args = Vec::new();
        loop {
            args.push(self.value()?);
            match self.next() {
                Some(Token::Comma) => continue,
                Some(Token::Close) => break,
                other => {
                    return Err(format!(
                        "expected ',' or ']' in {}, found {:?}",
                        keyword, other
                    ))
                }
            }
        }

        self.depth -= 1;
        Ok(WktNode { keyword, args })
    }

    fn value(&mut self) -> Result<WktValue, String> {
        let starts_node = matches!(self.peek(), Some(Token::Word(_)))
            && self.tokens.get(self.position + 1) == Some(&Token::Open);
        if starts_node {
            return Ok(WktValue::Node(self.node()?));
        }

        match self.next() {
            Some(Token::Word(word)) => Ok(WktValue::Word(word)),
            Some(Token::Text(text)) => Ok(WktValue::Text(text)),
            Some(Token::Number(value)) => Ok(WktValue::Number(value)),
            other => Err(format!("unexpected token {:?}", other)),
        }
    }
}

/// Parses WKT text into its root node.
pub fn parse_wkt(input: &str) -> Result<WktNode, String> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err("no WKT content".to_string());
    }

    let mut parser = Parser {
        tokens,
        position: 0,
        depth: 0,
    };
    let root = parser.node()?;
    if parser.position < parser.tokens.len() {
        return Err("trailing content after WKT definition".to_string());
    }
    Ok(root)
}

/// Reads the CRS from `.prj` content.
pub fn detect_crs(content: &str) -> CrsStatus {
    let content = content.trim_start_matches('\u{feff}').trim();
    if content.is_empty() {
        return CrsStatus::Absent;
    }

    match parse_wkt(content) {
        Ok(root) => match interpret(&root) {
            Some(crs) => CrsStatus::Parsed(crs),
            None => CrsStatus::Unknown(format!("{} is not a coordinate system", root.keyword)),
        },
        Err(reason) => CrsStatus::Unknown(reason),
    }
}

fn interpret(root: &WktNode) -> Option<Crs> {
    let kind = match root.keyword.as_str() {
        "GEOGCS" | "GEOGCRS" | "GEOGRAPHICCRS" => CrsKind::Geographic,
        "GEODCRS" | "GEODETICCRS" => {
            let cartesian = root
                .child(&["CS"])
                .and_then(|cs| cs.args.first())
                .map(|arg| matches!(arg, WktValue::Word(w) if w.eq_ignore_ascii_case("cartesian")))
                .unwrap_or(false);
            if cartesian {
                CrsKind::Geocentric
            } else {
                CrsKind::Geographic
            }
        }
        "PROJCS" | "PROJCRS" | "PROJECTEDCRS" => CrsKind::Projected,
        "GEOCCS" => CrsKind::Geocentric,
        "COMPD_CS" | "COMPOUNDCRS" => CrsKind::Compound,
        "DATUM" | "SPHEROID" | "ELLIPSOID" | "PRIMEM" | "UNIT" | "AUTHORITY" | "ID" => {
            return None
        }
        other => CrsKind::Unrecognized(other.to_string()),
    };

    let unit = match kind {
        CrsKind::Compound => root.children().find_map(|sub| interpret(sub)?.unit),
        _ => crs_unit(root, &kind),
    };

    let mut crs = Crs {
        name: root.name().unwrap_or("unnamed").to_string(),
        epsg: root_epsg(root),
        unit,
        kind,
    };

    if crs.epsg.is_none() && is_wgs84_geographic(root, &crs) {
        crs.epsg = Some(WGS84_EPSG);
    }

    Some(crs)
}

fn root_epsg(root: &WktNode) -> Option<u32> {
    let authority = root.child(&["AUTHORITY", "ID"])?;
    let issuer = authority.name()?;
    if !issuer.eq_ignore_ascii_case("EPSG") {
        return None;
    }
    match authority.args.get(1)? {
        WktValue::Number(code) if *code >= 0.0 && code.fract() == 0.0 => Some(*code as u32),
        WktValue::Text(code) => code.trim().parse().ok(),
        _ => None,
    }
}

fn crs_unit(root: &WktNode, kind: &CrsKind) -> Option<Unit> {
    let default_kind = match kind {
        CrsKind::Geographic => UnitKind::Angular,
        _ => UnitKind::Linear,
    };

    let node = root
        .child(&["UNIT", "ANGLEUNIT", "LENGTHUNIT"])
        .or_else(|| {
            root.children()
                .filter(|child| child.keyword == "AXIS")
                .find_map(|axis| axis.child(&["UNIT", "ANGLEUNIT", "LENGTHUNIT"]))
        })?;

    let kind = match node.keyword.as_str() {
        "ANGLEUNIT" => UnitKind::Angular,
        "LENGTHUNIT" => UnitKind::Linear,
        _ => default_kind,
    };

    Some(Unit {
        name: node.name().unwrap_or("unnamed").to_string(),
        factor: node.number_at(1).unwrap_or(0.0),
        kind,
    })
}

/// ESRI writes WGS 84 without an authority; recognise it by its parts.
fn is_wgs84_geographic(root: &WktNode, crs: &Crs) -> bool {
    if crs.kind != CrsKind::Geographic {
        return false;
    }

    let datum = root
        .child(&["DATUM", "GEODETICDATUM", "TRF", "ENSEMBLE"])
        .and_then(|datum| datum.name())
        .map(normalize_name);
    let wgs84_datum = matches!(
        datum.as_deref(),
        Some(name) if name == "wgs1984" || name == "wgs84" || name.starts_with("worldgeodeticsystem1984")
    );

    let greenwich = root
        .child(&["PRIMEM", "PRIMEMERIDIAN"])
        .map(|primem| primem.number_at(1).map(|v| v == 0.0).unwrap_or(false))
        .unwrap_or(true);

    let degrees = crs
        .unit
        .as_ref()
        .map(Unit::is_decimal_degree)
        .unwrap_or(false);

    wgs84_datum && greenwich && degrees
}

fn normalize_name(name: &str) -> String {
    let lower = name.to_ascii_lowercase();
    let trimmed = lower.strip_prefix("d_").unwrap_or(&lower);
    trimmed.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSG_4326: &str = r#"GEOGCS["WGS 84",DATUM["WGS_1984",SPHEROID["WGS 84",6378137,298.257223563,AUTHORITY["EPSG","7030"]],AUTHORITY["EPSG","6326"]],PRIMEM["Greenwich",0,AUTHORITY["EPSG","8901"]],UNIT["degree",0.0174532925199433,AUTHORITY["EPSG","9122"]],AUTHORITY["EPSG","4326"]]"#;
    const ESRI_WGS84: &str = r#"GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]]"#;
    const WEB_MERCATOR: &str = r#"PROJCS["WGS 84 / Pseudo-Mercator",GEOGCS["WGS 84",DATUM["WGS_1984",SPHEROID["WGS 84",6378137,298.257223563,AUTHORITY["EPSG","7030"]],AUTHORITY["EPSG","6326"]],PRIMEM["Greenwich",0,AUTHORITY["EPSG","8901"]],UNIT["degree",0.0174532925199433,AUTHORITY["EPSG","9122"]],AUTHORITY["EPSG","4326"]],PROJECTION["Mercator_1SP"],PARAMETER["central_meridian",0],PARAMETER["scale_factor",1],PARAMETER["false_easting",0],PARAMETER["false_northing",0],UNIT["metre",1,AUTHORITY["EPSG","9001"]],AXIS["Easting",EAST],AXIS["Northing",NORTH],AUTHORITY["EPSG","3857"]]"#;
    const ESRI_UTM: &str = r#"PROJCS["NAD_1983_UTM_Zone_10N",GEOGCS["GCS_North_American_1983",DATUM["D_North_American_1983",SPHEROID["GRS_1980",6378137.0,298.257222101]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]],PROJECTION["Transverse_Mercator"],PARAMETER["False_Easting",500000.0],PARAMETER["Central_Meridian",-123.0],UNIT["Meter",1.0]]"#;
    const NAD83: &str = r#"GEOGCS["GCS_North_American_1983",DATUM["D_North_American_1983",SPHEROID["GRS_1980",6378137.0,298.257222101]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]]"#;
    const WKT2_4326: &str = r#"GEOGCRS["WGS 84",ENSEMBLE["World Geodetic System 1984 ensemble",MEMBER["World Geodetic System 1984 (G2139)"],ELLIPSOID["WGS 84",6378137,298.257223563,LENGTHUNIT["metre",1]]],PRIMEM["Greenwich",0,ANGLEUNIT["degree",0.0174532925199433]],CS[ellipsoidal,2],AXIS["geodetic latitude (Lat)",north,ORDER[1],ANGLEUNIT["degree",0.0174532925199433]],AXIS["geodetic longitude (Lon)",east,ORDER[2],ANGLEUNIT["degree",0.0174532925199433]],ID["EPSG",4326]]"#;

    fn parsed(content: &str) -> Crs {
        match detect_crs(content) {
            CrsStatus::Parsed(crs) => crs,
            other => panic!("expected parsed CRS, got {:?}", other),
        }
    }

    #[test]
    fn root_authority_wins_over_nested_ones() {
        let crs = parsed(EPSG_4326);
        assert_eq!(crs.epsg, Some(4326));
        assert_eq!(crs.kind, CrsKind::Geographic);
        assert!(crs.unit.unwrap().is_decimal_degree());

        let crs = parsed(WEB_MERCATOR);
        assert_eq!(crs.epsg, Some(3857));
        assert_eq!(crs.kind, CrsKind::Projected);
        let unit = crs.unit.unwrap();
        assert_eq!(unit.kind, UnitKind::Linear);
        assert_eq!(unit.name, "metre");
    }

    #[test]
    fn esri_wgs84_without_authority_is_identified() {
        let crs = parsed(ESRI_WGS84);
        assert_eq!(crs.epsg, Some(4326));
        assert_eq!(crs.name, "GCS_WGS_1984");
        assert_eq!(crs.identifier(), "EPSG:4326");
    }

    #[test]
    fn other_datums_stay_unidentified() {
        let crs = parsed(NAD83);
        assert_eq!(crs.epsg, None);
        assert_eq!(crs.kind, CrsKind::Geographic);

        let crs = parsed(ESRI_UTM);
        assert_eq!(crs.epsg, None);
        assert_eq!(crs.kind, CrsKind::Projected);
        assert_eq!(crs.unit.unwrap().kind, UnitKind::Linear);
    }

    #[test]
    fn wkt2_is_understood() {
        let crs = parsed(WKT2_4326);
        assert_eq!(crs.epsg, Some(4326));
        assert_eq!(crs.kind, CrsKind::Geographic);
        assert_eq!(crs.unit.unwrap().kind, UnitKind::Angular);
    }

    #[test]
    fn empty_and_garbage_content() {
        assert_eq!(detect_crs("  \n"), CrsStatus::Absent);
        assert_eq!(detect_crs("\u{feff}"), CrsStatus::Absent);
        assert!(matches!(detect_crs("EPSG:4326"), CrsStatus::Unknown(_)));
        assert!(matches!(detect_crs("GEOGCS[\"x\""), CrsStatus::Unknown(_)));
        assert!(matches!(detect_crs("GEOGCS[\"x\"]]"), CrsStatus::Unknown(_)));
        assert_eq!(detect_crs("%%%").identifier(), "unknown");
    }

    #[test]
    fn deeply_nested_content_is_rejected_not_recursed() {
        let nested = format!("{}1{}", "A[".repeat(100_000), "]".repeat(100_000));
        assert_eq!(
            detect_crs(&nested),
            CrsStatus::Unknown("WKT nesting too deep".to_string())
        );

        let shallow = format!("{}1{}", "A[".repeat(MAX_WKT_DEPTH), "]".repeat(MAX_WKT_DEPTH));
        assert!(parse_wkt(&shallow).is_ok());
    }

    #[test]
    fn parser_handles_parentheses_and_escaped_quotes() {
        let root = parse_wkt(r#"GEOGCS("My ""quoted"" CRS", UNIT("degree", 0.0174532925199433))"#).unwrap();
        assert_eq!(root.keyword, "GEOGCS");
        assert_eq!(root.name(), Some("My \"quoted\" CRS"));
        assert_eq!(root.child(&["UNIT"]).and_then(|u| u.number_at(1)), Some(0.0174532925199433));
    }
}
