//! Minimal SARIF 2.1.0 report: one run, one result per analyzer rejection,
//! each with its rule id and a physical location carrying start line and
//! column. Only the slice of the format we emit is modeled.

use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::analysis::Diagnostic;
use crate::{Error, Result};

const SARIF_VERSION: &str = "2.1.0";
const SARIF_SCHEMA: &str =
    "https://raw.githubusercontent.com/oasis-tcs/sarif-spec/master/Schemata/sarif-schema-2.1.0.json";

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    #[serde(rename = "$schema")]
    schema: &'static str,
    version: &'static str,
    runs: Vec<Run>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Run {
    tool: Tool,
    results: Vec<SarifResult>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Tool {
    driver: Driver,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Driver {
    name: &'static str,
    information_uri: &'static str,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct SarifResult {
    rule_id: String,
    level: &'static str,
    message: Message,
    locations: Vec<Location>,
}

#[derive(Serialize, Debug)]
struct Message {
    text: String,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Location {
    physical_location: PhysicalLocation,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct PhysicalLocation {
    artifact_location: ArtifactLocation,
    region: Region,
}

#[derive(Serialize, Debug)]
struct ArtifactLocation {
    uri: String,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Region {
    start_line: u32,
    start_column: u32,
}

impl Report {
    pub fn new() -> Report {
        Report {
            schema: SARIF_SCHEMA,
            version: SARIF_VERSION,
            runs: vec![Run {
                tool: Tool {
                    driver: Driver {
                        name: "parloop",
                        information_uri: "https://github.com/parloop/parloop",
                    },
                },
                results: Vec::new(),
            }],
        }
    }

    pub fn add_diagnostic(&mut self, file_uri: &str, diag: &Diagnostic) {
        self.runs[0].results.push(SarifResult {
            rule_id: diag.rule.as_str().to_owned(),
            level: match diag.severity {
                crate::analysis::Severity::Warning => "warning",
                crate::analysis::Severity::Error => "error",
            },
            message: Message {
                text: diag.message.clone(),
            },
            locations: vec![Location {
                physical_location: PhysicalLocation {
                    artifact_location: ArtifactLocation {
                        uri: file_uri.to_owned(),
                    },
                    region: Region {
                        start_line: diag.line,
                        start_column: diag.column,
                    },
                },
            }],
        });
    }

    pub fn result_count(&self) -> usize {
        self.runs[0].results.len()
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| Error::io(path, std::io::Error::other(e)))?;
        fs::write(path, json).map_err(|e| Error::io(path, e))
    }
}

impl Default for Report {
    fn default() -> Report {
        Report::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::analysis::{Diagnostic, RuleId, Severity};

    #[test]
    fn report_shape_round_trips_through_json() {
        let mut report = Report::new();
        report.add_diagnostic(
            "main.go",
            &Diagnostic {
                rule: RuleId::R012,
                line: 7,
                column: 2,
                message: "cannot make loop concurrent because it writes to 'j' declared outside the loop".to_owned(),
                severity: Severity::Warning,
            },
        );
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["version"], "2.1.0");
        let result = &json["runs"][0]["results"][0];
        assert_eq!(result["ruleId"], "R012");
        assert_eq!(result["level"], "warning");
        assert_eq!(
            result["locations"][0]["physicalLocation"]["region"]["startLine"],
            7
        );
        assert_eq!(
            result["locations"][0]["physicalLocation"]["artifactLocation"]["uri"],
            "main.go"
        );
    }
}
