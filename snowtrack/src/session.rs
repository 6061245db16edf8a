//! Completed session records and their persistence seam.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::SnowError;

/// An immutable record of one completed recording.
///
/// Built once by the recorder on stop; ownership passes to the store and the
/// recorder keeps no reference.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SkiSession {
    pub id: String,
    pub start_at_ms: u64,
    pub end_at_ms: u64,
    /// Wall-clock duration in whole seconds.
    pub duration_sec: u32,
    pub distance_km: f64,
    pub top_speed_kmh: f64,
    pub avg_speed_kmh: f64,
    /// Cumulative descent in whole meters.
    pub vertical_drop_m: u32,
    /// Optional reference to a resort/venue record.
    pub resort_id: Option<i64>,
}

impl SkiSession {
    /// Duration as `h:mm:ss`, or `mm:ss` under an hour.
    pub fn formatted_duration(&self) -> String {
        let h = self.duration_sec / 3600;
        let m = (self.duration_sec % 3600) / 60;
        let s = self.duration_sec % 60;
        if h > 0 {
            format!("{}:{:02}:{:02}", h, m, s)
        } else {
            format!("{:02}:{:02}", m, s)
        }
    }
}

/// Persistence collaborator for completed sessions.
pub trait SessionStore {
    fn save_session(&mut self, session: &SkiSession) -> Result<(), SnowError>;
    fn load_sessions(&self) -> Result<Vec<SkiSession>, SnowError>;
}

/// Session store backed by a single JSON file holding an array of records.
///
/// A missing file reads as an empty history; saves rewrite the whole file.
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SessionStore for FileSessionStore {
    fn save_session(&mut self, session: &SkiSession) -> Result<(), SnowError> {
        let mut sessions = self.load_sessions()?;
        sessions.push(session.clone());
        let data = serde_json::to_string_pretty(&sessions)
            .map_err(|e| SnowError::Store(e.to_string()))?;
        fs::write(&self.path, data).map_err(|e| SnowError::Store(e.to_string()))
    }

    fn load_sessions(&self) -> Result<Vec<SkiSession>, SnowError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let data =
            fs::read_to_string(&self.path).map_err(|e| SnowError::Store(e.to_string()))?;
        serde_json::from_str(&data).map_err(|e| SnowError::Store(e.to_string()))
    }
}
