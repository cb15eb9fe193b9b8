use crate::config::EngineConfig;
use crate::models::{ArchiveError, ValidationResult};
use crate::services::archive::{ArchiveInput, ArchiveInspector};
use crate::services::inspector::inspect;
use crate::services::locator::locate;
use crate::services::report::aggregate;
use crate::services::rules::{apply_rules, unreadable_dataset};
use crate::services::workspace::Workspace;
use tracing::{debug, info, warn};

/// Runs archive inspection, dataset location, inspection, rules and
/// aggregation for one archive at a time.
///
/// Holds no state between runs; concurrent calls each get their own
/// workspace.
#[derive(Debug, Clone)]
pub struct ValidationService {
    config: EngineConfig,
    archive: ArchiveInspector,
}

impl ValidationService {
    pub fn new(config: EngineConfig) -> Self {
        let archive = ArchiveInspector::new(&config);
        Self { config, archive }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Validates one archive. Blocks until done; async callers should run
    /// it on a blocking thread.
    pub fn validate(
        &self,
        input: impl Into<ArchiveInput>,
    ) -> Result<ValidationResult, ArchiveError> {
        let input = input.into();
        let workspace = Workspace::create_in(&self.config.workspace_root)?;

        let files = self.archive.extract(&input, &workspace)?;
        let located = locate(&files);
        info!(
            "Located {} candidate dataset(s) among {} file(s)",
            located.candidates.len(),
            files.len()
        );

        let mut findings = located.findings;
        let mut shapefiles = Vec::new();

        for candidate in located.candidates.iter().filter(|c| c.is_complete()) {
            match inspect(&workspace, candidate) {
                Ok(dataset) => {
                    findings.extend(apply_rules(&dataset));
                    shapefiles.push(dataset.name);
                }
                Err(e) => {
                    warn!("Dataset {} could not be opened: {}", candidate.name, e);
                    findings.push(unreadable_dataset(&candidate.name, &e));
                }
            }
        }

        let result = aggregate(findings, &located.discovered, shapefiles);
        debug!("{}", result.report);
        info!(
            "Validation {}: {} shapefile(s), {} error(s), {} warning(s)",
            if result.valid { "passed" } else { "failed" },
            result.shapefiles.len(),
            result.error_count(),
            result.warning_count()
        );

        Ok(result)
    }
}
