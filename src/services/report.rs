use crate::models::{Finding, Scope, Severity, ValidationResult};

/// Merges all findings of a run into the final verdict.
///
/// `discovered` fixes the dataset order; `shapefiles` lists the datasets that
/// reached the rule engine.
pub fn aggregate(
    mut findings: Vec<Finding>,
    discovered: &[String],
    shapefiles: Vec<String>,
) -> ValidationResult {
    // Stable: findings of one dataset keep the order they were raised in.
    findings.sort_by_key(|finding| match finding.scope() {
        Scope::Archive => 0,
        Scope::Dataset(name) => discovered
            .iter()
            .position(|known| known == name)
            .map_or(usize::MAX, |position| position + 1),
    });

    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    for finding in &findings {
        match finding.severity() {
            Severity::Error => errors.push(finding.message().to_string()),
            Severity::Warning => warnings.push(finding.message().to_string()),
        }
    }

    let valid = errors.is_empty();
    let report = render_report(valid, shapefiles.len(), &errors, &warnings, &findings);

    ValidationResult {
        valid,
        report,
        shapefiles,
        errors,
        warnings,
        findings,
    }
}

pub fn summary_line(valid: bool, checked: usize, errors: usize, warnings: usize) -> String {
    format!(
        "Validation {}: {} shapefile(s) checked, {} error(s), {} warning(s)",
        if valid { "PASSED" } else { "FAILED" },
        checked,
        errors,
        warnings
    )
}

fn render_report(
    valid: bool,
    checked: usize,
    errors: &[String],
    warnings: &[String],
    findings: &[Finding],
) -> String {
    let mut lines = vec![summary_line(valid, checked, errors.len(), warnings.len())];
    lines.extend(findings.iter().map(|finding| {
        format!(
            "{} [{}] {}",
            finding.severity().marker(),
            finding.category(),
            finding.message()
        )
    }));
    lines.join("\n")
}
