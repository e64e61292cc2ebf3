use crate::error::{Result, ReviewError};
use crate::navigator::NavigatorPolicy;
use crate::writer::SheetLayout;
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file picked up from the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "adjudicator.json";

/// Credentials shown on the Login Info tab. Display only; nothing checks them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginInfo {
    pub username: String,
    pub password: String,
}

impl Default for LoginInfo {
    fn default() -> Self {
        LoginInfo {
            username: "rpxuser".to_string(),
            password: "PpD4u2RK".to_string(),
        }
    }
}

/// Application configuration
///
/// Every field has a default, so an empty JSON object is a valid config.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    /// Address the web server listens on.
    pub bind: String,

    /// Directory scanned for review workbooks.
    pub workflow_dir: PathBuf,

    /// Glob (`*`, `?`) selecting workbooks inside `workflow_dir`.
    pub file_pattern: String,

    /// Name of the case sheet, matched ignoring case and whitespace.
    pub case_sheet: String,

    /// Name of the bookkeeping sheet.
    pub index_sheet: String,

    /// Log file; `None` logs to stderr.
    pub log_file: Option<PathBuf>,

    /// Idle lifetime of a review session, in minutes.
    pub session_minutes: u64,

    /// Navigation policies. `persistence` applies to workbooks opened from
    /// the workflow directory; uploads are always download-only.
    pub navigator: NavigatorPolicy,

    pub login_info: LoginInfo,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        ReviewConfig {
            bind: "127.0.0.1:8501".to_string(),
            workflow_dir: PathBuf::from("."),
            file_pattern: "High_Confidence_Review_ICH_C_Spine_*.xlsx".to_string(),
            case_sheet: "Case Data".to_string(),
            index_sheet: "index".to_string(),
            log_file: Some(PathBuf::from("adjudicator.log")),
            session_minutes: 12 * 60,
            navigator: NavigatorPolicy::default(),
            login_info: LoginInfo::default(),
        }
    }
}

impl ReviewConfig {
    /// Loads `path`, or `adjudicator.json` from the working directory when it
    /// exists, or the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => ReviewConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path).map_err(|e| {
            ReviewError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config = Self::from_json(&data)
            .map_err(|e| ReviewError::Config(format!("{}: {}", path.display(), e)))?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_json(data: &str) -> Result<Self> {
        serde_json::from_str(data).map_err(|e| ReviewError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.case_sheet.trim().is_empty() {
            return Err(ReviewError::Config("case_sheet must not be empty".into()));
        }
        if self.index_sheet.trim().is_empty() {
            return Err(ReviewError::Config("index_sheet must not be empty".into()));
        }
        if crate::table::normalize_name(&self.case_sheet)
            == crate::table::normalize_name(&self.index_sheet)
        {
            return Err(ReviewError::Config(
                "case_sheet and index_sheet must differ".into(),
            ));
        }
        if self.file_pattern.trim().is_empty() {
            return Err(ReviewError::Config("file_pattern must not be empty".into()));
        }
        if self.session_minutes == 0 {
            return Err(ReviewError::Config("session_minutes must be positive".into()));
        }
        Ok(())
    }

    pub fn layout(&self) -> SheetLayout {
        SheetLayout::new(self.case_sheet.clone(), self.index_sheet.clone())
    }

    pub fn session_lifetime(&self) -> Duration {
        Duration::from_secs(self.session_minutes * 60)
    }
}
