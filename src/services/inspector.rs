use crate::models::{
    CandidateDataset, CrsStatus, Dimensionality, GeometryType, InspectedDataset, ShapefilePart,
};
use crate::services::prj::detect_crs;
use crate::services::workspace::Workspace;
use geo_types::{coord, Rect};
use std::fs::{self, File};
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;

const FILE_CODE: i32 = 9994;
const FILE_VERSION: i32 = 1000;
const HEADER_LEN: u64 = 100;
const INDEX_RECORD_LEN: u64 = 8;
const DBF_HEADER_LEN: usize = 32;
/// Measures below this are "no data" per the shapefile format.
const NO_DATA_MEASURE: f64 = -1e38;

#[derive(Debug, Error)]
pub enum InspectError {
    #[error("{file} could not be read: {reason}")]
    Io { file: String, reason: String },

    #[error("{file} is malformed: {reason}")]
    Malformed { file: String, reason: String },

    #[error("{0}")]
    Mismatch(String),
}

#[derive(Debug, Clone, Copy)]
struct MainHeader {
    file_length: u64,
    shape_type: i32,
    bbox: [f64; 4],
    m_range: [f64; 2],
}

/// Opens one complete candidate and gathers the facts the rules need.
///
/// A dataset that fails here yields exactly one error and is not inspected
/// any further.
pub fn inspect(
    workspace: &Workspace,
    candidate: &CandidateDataset,
) -> Result<InspectedDataset, InspectError> {
    let shp_label = label(candidate, ShapefilePart::Shp);
    let shx_label = label(candidate, ShapefilePart::Shx);
    let dbf_label = label(candidate, ShapefilePart::Dbf);

    let shp_path = part_path(workspace, candidate, ShapefilePart::Shp)?;
    let shx_path = part_path(workspace, candidate, ShapefilePart::Shx)?;
    let dbf_path = part_path(workspace, candidate, ShapefilePart::Dbf)?;
    let prj_path = part_path(workspace, candidate, ShapefilePart::Prj)?;

    let shp_file = File::open(&shp_path).map_err(|e| io_error(&shp_label, e))?;
    let shp_size = shp_file
        .metadata()
        .map_err(|e| io_error(&shp_label, e))?
        .len();
    let mut shp = BufReader::new(shp_file);
    let header = read_main_header(&mut shp, &shp_label)?;

    if header.file_length != shp_size {
        return Err(InspectError::Mismatch(format!(
            "{} declares {} bytes but holds {}",
            shp_label, header.file_length, shp_size
        )));
    }

    let geometry_type =
        GeometryType::from_code(header.shape_type).ok_or_else(|| InspectError::Malformed {
            file: shp_label.clone(),
            reason: format!("unsupported shape type {}", header.shape_type),
        })?;

    let index = fs::read(&shx_path).map_err(|e| io_error(&shx_label, e))?;
    let index_header = read_main_header(&mut index.as_slice(), &shx_label)?;
    if index_header.shape_type != header.shape_type {
        return Err(InspectError::Mismatch(format!(
            "{} has shape type {} but {} has {}",
            shx_label, index_header.shape_type, shp_label, header.shape_type
        )));
    }
    let index_size = index.len() as u64;
    if index_header.file_length != index_size
        || (index_size - HEADER_LEN) % INDEX_RECORD_LEN != 0
    {
        return Err(InspectError::Malformed {
            file: shx_label,
            reason: format!("length {} does not fit whole index records", index_size),
        });
    }
    let record_count = (index_size - HEADER_LEN) / INDEX_RECORD_LEN;

    check_records(&mut shp, shp_size, &index, &header, candidate)?;

    let dbf_count = read_dbf_record_count(&dbf_path, &dbf_label)?;
    if dbf_count != record_count {
        return Err(InspectError::Mismatch(format!(
            "{} holds {} record(s) but {} indexes {}",
            dbf_label, dbf_count, shx_label, record_count
        )));
    }

    let prj = fs::read(&prj_path).map_err(|e| io_error(&label(candidate, ShapefilePart::Prj), e))?;
    let crs = detect_crs(&String::from_utf8_lossy(&prj));

    let dimensionality = Dimensionality {
        has_z: geometry_type.has_z(),
        has_m: geometry_type.is_measured()
            || (geometry_type.has_z() && has_real_measures(header.m_range)),
    };

    let feature_count = u32::try_from(record_count).map_err(|_| InspectError::Malformed {
        file: shx_label.clone(),
        reason: format!("{} records exceeds the supported count", record_count),
    })?;

    let extent = if feature_count > 0 && geometry_type != GeometryType::Null {
        bbox_rect(header.bbox)
    } else {
        None
    };

    debug!(
        "Inspected {}: {} {} feature(s), CRS {}",
        candidate.name,
        geometry_type,
        feature_count,
        crs_label(&crs)
    );

    Ok(InspectedDataset {
        name: candidate.name.clone(),
        geometry_type,
        dimensionality,
        crs,
        feature_count,
        extent,
    })
}

/// Walks the index and confirms each entry lands on a matching record.
fn check_records<R: Read + Seek>(
    shp: &mut R,
    shp_size: u64,
    index: &[u8],
    header: &MainHeader,
    candidate: &CandidateDataset,
) -> Result<(), InspectError> {
    let shp_label = label(candidate, ShapefilePart::Shp);
    let shx_label = label(candidate, ShapefilePart::Shx);

    for (position, entry) in index[HEADER_LEN as usize..]
        .chunks_exact(INDEX_RECORD_LEN as usize)
        .enumerate()
    {
        let offset = u64::from(be_u32(entry, 0)) * 2;
        let content_words = be_u32(entry, 4);
        let content_len = u64::from(content_words) * 2;

        if offset < HEADER_LEN || offset + 8 + content_len > shp_size {
            return Err(InspectError::Mismatch(format!(
                "{} entry {} points outside {}",
                shx_label,
                position + 1,
                shp_label
            )));
        }

        let mut record = [0u8; 12];
        let wanted = if content_len >= 4 { 12 } else { 8 };
        shp.seek(SeekFrom::Start(offset))
            .and_then(|_| shp.read_exact(&mut record[..wanted]))
            .map_err(|e| io_error(&shp_label, e))?;

        if be_u32(&record, 4) != content_words {
            return Err(InspectError::Mismatch(format!(
                "{} record {} length disagrees with {}",
                shp_label,
                position + 1,
                shx_label
            )));
        }

        if wanted == 12 {
            let record_type = le_i32(&record, 8);
            if record_type != 0 && record_type != header.shape_type {
                return Err(InspectError::Malformed {
                    file: shp_label,
                    reason: format!(
                        "record {} has shape type {} in a layer of type {}",
                        position + 1,
                        record_type,
                        header.shape_type
                    ),
                });
            }
        }
    }

    Ok(())
}

fn read_main_header<R: Read>(reader: &mut R, file: &str) -> Result<MainHeader, InspectError> {
    let mut buf = [0u8; HEADER_LEN as usize];
    reader.read_exact(&mut buf).map_err(|_| InspectError::Malformed {
        file: file.to_string(),
        reason: "shorter than the 100-byte header".to_string(),
    })?;

    let code = be_i32(&buf, 0);
    if code != FILE_CODE {
        return Err(InspectError::Malformed {
            file: file.to_string(),
            reason: format!("unexpected file code {}", code),
        });
    }

    let version = le_i32(&buf, 28);
    if version != FILE_VERSION {
        return Err(InspectError::Malformed {
            file: file.to_string(),
            reason: format!("unsupported version {}", version),
        });
    }

    Ok(MainHeader {
        file_length: u64::from(be_u32(&buf, 24)) * 2,
        shape_type: le_i32(&buf, 32),
        bbox: [
            le_f64(&buf, 36),
            le_f64(&buf, 44),
            le_f64(&buf, 52),
            le_f64(&buf, 60),
        ],
        m_range: [le_f64(&buf, 84), le_f64(&buf, 92)],
    })
}

fn read_dbf_record_count(path: &PathBuf, file: &str) -> Result<u64, InspectError> {
    let mut dbf = File::open(path).map_err(|e| io_error(file, e))?;
    let size = dbf.metadata().map_err(|e| io_error(file, e))?.len();

    let mut buf = [0u8; DBF_HEADER_LEN];
    dbf.read_exact(&mut buf).map_err(|_| InspectError::Malformed {
        file: file.to_string(),
        reason: "shorter than the 32-byte header".to_string(),
    })?;

    let records = u64::from(u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]));
    let header_len = u64::from(u16::from_le_bytes([buf[8], buf[9]]));
    let record_len = u64::from(u16::from_le_bytes([buf[10], buf[11]]));

    if header_len < DBF_HEADER_LEN as u64 + 1 || record_len == 0 {
        return Err(InspectError::Malformed {
            file: file.to_string(),
            reason: format!(
                "invalid header (header length {}, record length {})",
                header_len, record_len
            ),
        });
    }

    let needed = header_len.saturating_add(records.saturating_mul(record_len));
    if needed > size {
        return Err(InspectError::Malformed {
            file: file.to_string(),
            reason: format!("{} record(s) declared but file is truncated", records),
        });
    }

    Ok(records)
}

fn has_real_measures(m_range: [f64; 2]) -> bool {
    m_range
        .iter()
        .all(|m| m.is_finite() && *m > NO_DATA_MEASURE)
        && m_range.iter().any(|m| *m != 0.0)
}

fn bbox_rect(bbox: [f64; 4]) -> Option<Rect<f64>> {
    if !bbox.iter().all(|v| v.is_finite()) {
        return None;
    }
    let [xmin, ymin, xmax, ymax] = bbox;
    Some(Rect::new(coord! { x: xmin, y: ymin }, coord! { x: xmax, y: ymax }))
}

fn part_path(
    workspace: &Workspace,
    candidate: &CandidateDataset,
    part: ShapefilePart,
) -> Result<PathBuf, InspectError> {
    candidate
        .path(part)
        .map(|relative| workspace.resolve(relative))
        .ok_or_else(|| InspectError::Io {
            file: label(candidate, part),
            reason: "not present".to_string(),
        })
}

fn label(candidate: &CandidateDataset, part: ShapefilePart) -> String {
    format!("{}{}", candidate.name, part)
}

fn io_error(file: &str, err: std::io::Error) -> InspectError {
    InspectError::Io {
        file: file.to_string(),
        reason: err.to_string(),
    }
}

fn crs_label(crs: &CrsStatus) -> String {
    crs.identifier()
}

fn be_i32(buf: &[u8], at: usize) -> i32 {
    i32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn be_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn le_i32(buf: &[u8], at: usize) -> i32 {
    i32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn le_f64(buf: &[u8], at: usize) -> f64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[at..at + 8]);
    f64::from_le_bytes(bytes)
}
