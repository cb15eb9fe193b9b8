#![allow(dead_code)]

use shapecheck::{EngineConfig, ValidationService};
use std::io::{Cursor, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

pub const WGS84_PRJ: &str = r#"GEOGCS["WGS 84",DATUM["WGS_1984",SPHEROID["WGS 84",6378137,298.257223563,AUTHORITY["EPSG","7030"]],AUTHORITY["EPSG","6326"]],PRIMEM["Greenwich",0,AUTHORITY["EPSG","8901"]],UNIT["degree",0.0174532925199433,AUTHORITY["EPSG","9122"]],AUTHORITY["EPSG","4326"]]"#;

pub const ESRI_WGS84_PRJ: &str = r#"GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]]"#;

pub const WEB_MERCATOR_PRJ: &str = r#"PROJCS["WGS 84 / Pseudo-Mercator",GEOGCS["WGS 84",DATUM["WGS_1984",SPHEROID["WGS 84",6378137,298.257223563,AUTHORITY["EPSG","7030"]],AUTHORITY["EPSG","6326"]],PRIMEM["Greenwich",0,AUTHORITY["EPSG","8901"]],UNIT["degree",0.0174532925199433,AUTHORITY["EPSG","9122"]],AUTHORITY["EPSG","4326"]],PROJECTION["Mercator_1SP"],PARAMETER["central_meridian",0],PARAMETER["scale_factor",1],PARAMETER["false_easting",0],PARAMETER["false_northing",0],UNIT["metre",1,AUTHORITY["EPSG","9001"]],AXIS["X",EAST],AXIS["Y",NORTH],AUTHORITY["EPSG","3857"]]"#;

pub const POINT: i32 = 1;
pub const POINT_Z: i32 = 11;
pub const POINT_M: i32 = 21;

/// A point layer written as real `.shp`, `.shx` and `.dbf` bytes.
#[derive(Debug, Clone)]
pub struct Layer {
    shape_type: i32,
    points: Vec<(f64, f64)>,
}

impl Layer {
    pub fn points(points: &[(f64, f64)]) -> Self {
        Self {
            shape_type: POINT,
            points: points.to_vec(),
        }
    }

    pub fn empty() -> Self {
        Self::points(&[])
    }

    pub fn with_shape_type(mut self, shape_type: i32) -> Self {
        self.shape_type = shape_type;
        self
    }

    fn bbox(&self) -> [f64; 4] {
        if self.points.is_empty() {
            return [0.0; 4];
        }
        self.points.iter().fold(
            [f64::MAX, f64::MAX, f64::MIN, f64::MIN],
            |[xmin, ymin, xmax, ymax], (x, y)| [xmin.min(*x), ymin.min(*y), xmax.max(*x), ymax.max(*y)],
        )
    }

    fn header(&self, file_len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; 100];
        buf[0..4].copy_from_slice(&9994i32.to_be_bytes());
        buf[24..28].copy_from_slice(&((file_len / 2) as i32).to_be_bytes());
        buf[28..32].copy_from_slice(&1000i32.to_le_bytes());
        buf[32..36].copy_from_slice(&self.shape_type.to_le_bytes());
        for (i, value) in self.bbox().iter().enumerate() {
            buf[36 + i * 8..44 + i * 8].copy_from_slice(&value.to_le_bytes());
        }
        buf
    }

    pub fn shp(&self) -> Vec<u8> {
        let content_len = 20usize;
        let mut shp = self.header(100 + self.points.len() * (8 + content_len));
        for (i, (x, y)) in self.points.iter().enumerate() {
            shp.extend_from_slice(&((i + 1) as i32).to_be_bytes());
            shp.extend_from_slice(&((content_len / 2) as i32).to_be_bytes());
            shp.extend_from_slice(&self.shape_type.to_le_bytes());
            shp.extend_from_slice(&x.to_le_bytes());
            shp.extend_from_slice(&y.to_le_bytes());
        }
        shp
    }

    pub fn shx(&self) -> Vec<u8> {
        let mut shx = self.header(100 + self.points.len() * 8);
        for i in 0..self.points.len() {
            let offset = 100 + i * 28;
            shx.extend_from_slice(&((offset / 2) as i32).to_be_bytes());
            shx.extend_from_slice(&10i32.to_be_bytes());
        }
        shx
    }

    pub fn dbf(&self) -> Vec<u8> {
        dbf_with_records(self.points.len())
    }
}

pub fn dbf_with_records(records: usize) -> Vec<u8> {
    let mut dbf = vec![0u8; 33];
    dbf[0] = 3;
    dbf[4..8].copy_from_slice(&(records as u32).to_le_bytes());
    dbf[8..10].copy_from_slice(&33u16.to_le_bytes());
    dbf[10..12].copy_from_slice(&1u16.to_le_bytes());
    dbf[32] = 0x0d;
    dbf.extend(std::iter::repeat(b' ').take(records));
    dbf
}

/// Builds ZIP archives entry by entry, in insertion order.
#[derive(Debug, Default)]
pub struct ArchiveBuilder {
    entries: Vec<(String, Vec<u8>)>,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds all four parts of a dataset named `name`.
    pub fn dataset(self, name: &str, layer: &Layer, prj: &str) -> Self {
        self.file(&format!("{name}.shp"), layer.shp())
            .file(&format!("{name}.shx"), layer.shx())
            .file(&format!("{name}.dbf"), layer.dbf())
            .file(&format!("{name}.prj"), prj.as_bytes().to_vec())
    }

    pub fn file(mut self, name: &str, bytes: Vec<u8>) -> Self {
        self.entries.push((name.to_string(), bytes));
        self
    }

    pub fn without(mut self, name: &str) -> Self {
        self.entries.retain(|(entry, _)| entry != name);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        for (name, bytes) in &self.entries {
            zip.start_file(name.as_str(), options).expect("start zip entry");
            zip.write_all(bytes).expect("write zip entry");
        }
        zip.finish().expect("finish zip").into_inner()
    }
}

pub fn valid_points() -> Layer {
    Layer::points(&[(-73.98, 40.75), (2.35, 48.85), (139.69, 35.68)])
}

pub fn engine(workspace_root: &Path) -> ValidationService {
    ValidationService::new(EngineConfig::default().with_workspace_root(workspace_root))
}
