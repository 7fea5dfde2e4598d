use crate::table::FileFormat;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::{fs, path::Path};

/// Full job configuration, deserialized from a YAML file.
///
/// Field mapping is strict in both directions: a missing key and an
/// unrecognized key both fail deserialization before any storage I/O runs.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobConfig {
    pub storage: StorageConfig,
    pub source: SourceConfig,
    pub target: TargetConfig,
}

/// Where the job reads from and writes to, as storage URLs
/// (`gs://bucket` or `file:///dir`).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    pub src_bucket: String,
    pub trg_bucket: String,
}

/// Shape of the source data.
///
/// `src_columns` is the ordered set of columns the report keeps; it must be a
/// subset of the raw file schema and contain the four named columns below.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    pub src_columns: Vec<String>,
    pub src_col_year: String,
    pub src_col_industry_aggregation: String,
    pub src_col_industry_code: String,
    pub src_col_value: String,
    /// Inclusive lower bound on the year column; rows below it are dropped.
    pub src_col_year_filter: String,
    pub src_files_prefix: String,
    pub src_format: FileFormat,
}

/// Shape and naming of the report written to the target.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetConfig {
    pub trg_columns: Vec<String>,
    pub trg_col_year: String,
    pub trg_col_industry_aggregation: String,
    pub trg_col_industry_code: String,
    pub trg_col_min_value: String,
    pub trg_col_max_value: String,
    pub trg_key: String,
    pub trg_key_date_format: String,
    pub trg_format: FileFormat,
}

impl JobConfig {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading config file `{}`", path.display()))?;
        serde_yaml::from_str(&raw)
            .with_context(|| format!("parsing config file `{}`", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const FULL_CONFIG: &str = r#"
storage:
  src_bucket: gs://survey-raw
  trg_bucket: gs://survey-reports
source:
  src_columns: [Year, Industry_aggregation_NZSIOC, Industry_code_NZSIOC, Value]
  src_col_year: Year
  src_col_industry_aggregation: Industry_aggregation_NZSIOC
  src_col_industry_code: Industry_code_NZSIOC
  src_col_value: Value
  src_col_year_filter: "2015"
  src_files_prefix: "annual_survey_"
  src_format: csv
target:
  trg_columns: [year, industry_aggregation, industry_code, min_value, max_value]
  trg_col_year: year
  trg_col_industry_aggregation: industry_aggregation
  trg_col_industry_code: industry_code
  trg_col_min_value: min_value
  trg_col_max_value: max_value
  trg_key: report1_
  trg_key_date_format: "%Y%m%d"
  trg_format: parquet
"#;

    #[test]
    fn parses_full_config() {
        let config: JobConfig = serde_yaml::from_str(FULL_CONFIG).unwrap();
        assert_eq!(config.storage.src_bucket, "gs://survey-raw");
        assert_eq!(config.source.src_columns.len(), 4);
        assert_eq!(config.source.src_format, FileFormat::Csv);
        assert_eq!(config.source.src_col_year_filter, "2015");
        assert_eq!(config.target.trg_key, "report1_");
        assert_eq!(config.target.trg_format, FileFormat::Parquet);
    }

    #[test]
    fn rejects_unknown_source_key() {
        let doc = FULL_CONFIG.replace("  src_format: csv", "  src_format: csv\n  src_extra: 1");
        let err = serde_yaml::from_str::<JobConfig>(&doc).unwrap_err();
        assert!(err.to_string().contains("src_extra"), "{err}");
    }

    #[test]
    fn rejects_missing_target_key() {
        let doc = FULL_CONFIG.replace("  trg_key: report1_\n", "");
        assert!(serde_yaml::from_str::<JobConfig>(&doc).is_err());
    }

    #[test]
    fn rejects_dead_meta_section() {
        // The job carries no meta-file tracking; a config still declaring the
        // section is rejected rather than silently ignored.
        let doc = format!("{FULL_CONFIG}meta:\n  meta_key: meta.csv\n");
        let err = serde_yaml::from_str::<JobConfig>(&doc).unwrap_err();
        assert!(err.to_string().contains("meta"), "{err}");
    }

    #[test]
    fn rejects_unknown_format_tag() {
        let doc = FULL_CONFIG.replace("src_format: csv", "src_format: xlsx");
        assert!(serde_yaml::from_str::<JobConfig>(&doc).is_err());
    }

    #[test]
    fn loads_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(FULL_CONFIG.as_bytes()).unwrap();
        let config = JobConfig::from_yaml_file(file.path()).unwrap();
        assert_eq!(config.storage.trg_bucket, "gs://survey-reports");
    }

    #[test]
    fn missing_file_reports_path() {
        let err = JobConfig::from_yaml_file("/nonexistent/job.yaml").unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/job.yaml"));
    }
}
