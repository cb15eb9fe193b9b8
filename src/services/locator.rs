use crate::models::{CandidateDataset, Category, Finding, Scope, ShapefilePart};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Candidates and the completeness findings raised while grouping.
#[derive(Debug, Default)]
pub struct LocatedDatasets {
    /// Every candidate with a `.shp`, in discovery order.
    pub candidates: Vec<CandidateDataset>,
    /// Names of candidates and reported fragments, in discovery order.
    pub discovered: Vec<String>,
    pub findings: Vec<Finding>,
}

/// Groups extracted files by case-insensitive base name.
pub fn locate(files: &[PathBuf]) -> LocatedDatasets {
    let mut groups: Vec<CandidateDataset> = Vec::new();
    let mut duplicates: Vec<Vec<Finding>> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut findings = Vec::new();

    for file in files {
        let Some(part) = file
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(ShapefilePart::from_extension)
        else {
            continue;
        };
        let Some(name) = dataset_name(file) else {
            continue;
        };

        let key = name.to_lowercase();
        let slot = *index.entry(key).or_insert_with(|| {
            groups.push(CandidateDataset::new(name.clone()));
            duplicates.push(Vec::new());
            groups.len() - 1
        });
        let candidate = &mut groups[slot];

        if let Some(existing) = candidate.path(part) {
            duplicates[slot].push(Finding::warning(
                Category::ArchiveStructure,
                Scope::dataset(&candidate.name),
                format!(
                    "{} appears more than once ({} and {}); using the first",
                    file_label(&candidate.name, part),
                    existing.display(),
                    file.display()
                ),
            ));
            continue;
        }
        candidate.parts.insert(part, file.clone());
    }

    let mut located = LocatedDatasets::default();
    for (candidate, duplicate_findings) in groups.into_iter().zip(duplicates) {
        if !candidate.has(ShapefilePart::Shp) {
            if candidate.has(ShapefilePart::Dbf) || candidate.has(ShapefilePart::Shx) {
                findings.extend(duplicate_findings);
                let present = present_extensions(&candidate);
                findings.push(Finding::error(
                    Category::MissingCoreFile,
                    Scope::dataset(&candidate.name),
                    format!(
                        "{} is missing (found {} without geometry)",
                        file_label(&candidate.name, ShapefilePart::Shp),
                        present
                    ),
                ));
                located.discovered.push(candidate.name.clone());
            } else {
                debug!("Ignoring stray file(s) for {}", candidate.name);
            }
            continue;
        }

        findings.extend(duplicate_findings);
        for part in candidate.missing() {
            findings.push(Finding::error(
                Category::MissingFile,
                Scope::dataset(&candidate.name),
                format!("{} is missing", file_label(&candidate.name, part)),
            ));
        }
        located.discovered.push(candidate.name.clone());
        located.candidates.push(candidate);
    }

    let reported_fragment = findings
        .iter()
        .any(|f| f.category() == Category::MissingCoreFile);
    if located.candidates.is_empty() && !reported_fragment {
        findings.push(Finding::error(
            Category::ArchiveStructure,
            Scope::Archive,
            "No shapefile (.shp) found in archive",
        ));
    }

    located.findings = findings;
    located
}

/// Relative path without its extension, using `/` separators.
fn dataset_name(file: &Path) -> Option<String> {
    let stem = file.file_stem()?.to_str()?;
    let name = match file.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => {
            let parent = parent
                .components()
                .filter_map(|c| c.as_os_str().to_str())
                .collect::<Vec<_>>()
                .join("/");
            format!("{}/{}", parent, stem)
        }
        None => stem.to_string(),
    };
    Some(name)
}

fn file_label(name: &str, part: ShapefilePart) -> String {
    format!("{}{}", name, part)
}

fn present_extensions(candidate: &CandidateDataset) -> String {
    candidate
        .parts
        .keys()
        .map(|part| part.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
