//! Durable iteration store.
//!
//! Single-file SQLite database. Each record lives in one row: a few
//! denormalized columns for indexing plus the full record as an opaque JSON
//! document. Updates replace the whole document, so a partial outcome can
//! never leave a half-updated row.

use std::path::Path;

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use printforge_slicer::{Dimensions, SlicingParameterSet};
use printforge_vision::DefectKind;

use crate::{IterationRecord, IterationStatus};

/// Store errors. `NotFound` is the only expected one in normal operation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Iteration not found: {0}")]
    NotFound(String),
}

/// Fields for creating a new iteration.
#[derive(Debug, Clone, Default)]
pub struct NewIteration {
    pub model_name: String,
    pub model_path: String,
    pub scale_factor: Option<f64>,
    pub original_dimensions: Option<Dimensions>,
    pub scaled_dimensions: Option<Dimensions>,
    pub parameters: Option<SlicingParameterSet>,
    pub preset_name: Option<String>,
}

/// Outcome fields recorded when a print finishes.
#[derive(Debug, Clone)]
pub struct OutcomeUpdate {
    pub status: IterationStatus,
    pub quality_score: Option<f64>,
    pub defects: Vec<String>,
    pub notes: String,
    pub print_time_minutes: Option<u32>,
}

/// Aggregate statistics for one model's print history.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ModelStatistics {
    pub model_name: String,
    pub total_attempts: u32,
    pub completed: u32,
    pub failed: u32,

    /// Percentage of attempts that completed, one decimal
    pub success_rate: f64,

    pub average_quality: Option<f64>,
    pub best_quality: Option<f64>,

    /// Up to five most frequent defects with their counts
    pub common_defects: Vec<(String, u32)>,

    pub latest: Option<IterationRecord>,
}

/// Durable keyed store of print iterations.
///
/// Reads are free; writes are serialized behind a store-level lock so
/// concurrent read-modify-write cycles on the same id cannot lose fields.
pub struct IterationStore {
    pool: SqlitePool,
    write_lock: Mutex<()>,
}

impl IterationStore {
    /// Opens (creating if needed) the database at `path`.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS iterations (
                iteration_id TEXT PRIMARY KEY,
                model_name   TEXT NOT NULL,
                model_path   TEXT,
                created_at   TEXT NOT NULL,
                data         TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_model_name ON iterations(model_name)")
            .execute(&pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_created_at ON iterations(created_at)")
            .execute(&pool)
            .await?;

        info!(db = %path.display(), "iteration store ready");
        Ok(Self {
            pool,
            write_lock: Mutex::new(()),
        })
    }

    /// Creates a new iteration with a fresh id and `pending` status.
    /// The row is durable before this returns.
    pub async fn create(&self, new: NewIteration) -> Result<IterationRecord, StoreError> {
        let record = IterationRecord {
            iteration_id: Uuid::new_v4().simple().to_string()[..8].to_string(),
            model_name: new.model_name,
            model_path: new.model_path,
            created_at: Utc::now(),
            scale_factor: new.scale_factor,
            original_dimensions: new.original_dimensions,
            scaled_dimensions: new.scaled_dimensions,
            parameters: new.parameters,
            preset_name: new.preset_name,
            status: IterationStatus::Pending,
            started_at: None,
            completed_at: None,
            print_time_minutes: None,
            quality_score: None,
            defects_detected: Vec::new(),
            notes: String::new(),
            improvement_suggestions: Vec::new(),
        };

        let _guard = self.write_lock.lock().await;
        sqlx::query(
            "INSERT INTO iterations (iteration_id, model_name, model_path, created_at, data)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&record.iteration_id)
        .bind(&record.model_name)
        .bind(&record.model_path)
        .bind(record.created_at.to_rfc3339())
        .bind(serde_json::to_string(&record)?)
        .execute(&self.pool)
        .await?;

        debug!(id = %record.iteration_id, model = %record.model_name, "iteration created");
        Ok(record)
    }

    /// Atomically replaces the stored document for a record.
    pub async fn update(&self, record: &IterationRecord) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        self.update_locked(record).await
    }

    async fn update_locked(&self, record: &IterationRecord) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE iterations SET data = ? WHERE iteration_id = ?")
            .bind(serde_json::to_string(record)?)
            .bind(&record.iteration_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(record.iteration_id.clone()));
        }
        Ok(())
    }

    /// Fetches a record by id.
    pub async fn get(&self, iteration_id: &str) -> Result<Option<IterationRecord>, StoreError> {
        let row = sqlx::query("SELECT data FROM iterations WHERE iteration_id = ?")
            .bind(iteration_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let data: String = row.get("data");
                Ok(Some(serde_json::from_str(&data)?))
            }
            None => Ok(None),
        }
    }

    /// Iterations for one model, newest first.
    pub async fn list_for_model(
        &self,
        model_name: &str,
        limit: u32,
    ) -> Result<Vec<IterationRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT data FROM iterations WHERE model_name = ?
             ORDER BY created_at DESC LIMIT ?",
        )
        .bind(model_name)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let data: String = row.get("data");
                serde_json::from_str(&data).map_err(StoreError::from)
            })
            .collect()
    }

    /// Most recent iterations across all models, newest first.
    pub async fn list_recent(&self, limit: u32) -> Result<Vec<IterationRecord>, StoreError> {
        let rows = sqlx::query("SELECT data FROM iterations ORDER BY created_at DESC LIMIT ?")
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| {
                let data: String = row.get("data");
                serde_json::from_str(&data).map_err(StoreError::from)
            })
            .collect()
    }

    /// Records the outcome of a print attempt.
    ///
    /// The whole read-modify-write runs under the write lock, so two
    /// concurrent outcome updates cannot lose fields. Improvement
    /// suggestions are derived from the observed defects and stored with the
    /// record.
    pub async fn record_outcome(
        &self,
        iteration_id: &str,
        outcome: OutcomeUpdate,
    ) -> Result<IterationRecord, StoreError> {
        let _guard = self.write_lock.lock().await;

        let mut record = self
            .get(iteration_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(iteration_id.to_string()))?;

        record.status = outcome.status;
        record.completed_at = Some(Utc::now());
        record.quality_score = outcome.quality_score;
        record.defects_detected = outcome.defects;
        record.notes = outcome.notes;
        record.print_time_minutes = outcome.print_time_minutes;
        record.improvement_suggestions = improvement_suggestions(&record.defects_detected);

        self.update_locked(&record).await?;
        Ok(record)
    }

    /// Aggregate statistics for one model.
    pub async fn statistics(&self, model_name: &str) -> Result<ModelStatistics, StoreError> {
        let iterations = self.list_for_model(model_name, 100).await?;

        let completed: Vec<&IterationRecord> = iterations
            .iter()
            .filter(|i| i.status == IterationStatus::Completed)
            .collect();
        let failed = iterations
            .iter()
            .filter(|i| i.status == IterationStatus::Failed)
            .count() as u32;

        let quality_scores: Vec<f64> =
            completed.iter().filter_map(|i| i.quality_score).collect();
        let average_quality = if quality_scores.is_empty() {
            None
        } else {
            Some(quality_scores.iter().sum::<f64>() / quality_scores.len() as f64)
        };
        let best_quality = quality_scores.iter().cloned().fold(None, |best, q| {
            Some(best.map_or(q, |b: f64| b.max(q)))
        });

        let mut defect_counts: Vec<(String, u32)> = Vec::new();
        for iteration in &iterations {
            for defect in &iteration.defects_detected {
                match defect_counts.iter_mut().find(|(name, _)| name == defect) {
                    Some((_, count)) => *count += 1,
                    None => defect_counts.push((defect.clone(), 1)),
                }
            }
        }
        defect_counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        defect_counts.truncate(5);

        let total = iterations.len() as u32;
        let success_rate = if total == 0 {
            0.0
        } else {
            (completed.len() as f64 / total as f64 * 1000.0).round() / 10.0
        };

        Ok(ModelStatistics {
            model_name: model_name.to_string(),
            total_attempts: total,
            completed: completed.len() as u32,
            failed,
            success_rate,
            average_quality,
            best_quality,
            common_defects: defect_counts,
            latest: iterations.into_iter().next(),
        })
    }
}

/// Textual improvement suggestions per observed defect family.
pub fn improvement_suggestions(defects: &[String]) -> Vec<String> {
    let mut suggestions = Vec::new();
    let mut seen_kinds = Vec::new();

    for defect in defects {
        let Some(kind) = DefectKind::parse(defect) else {
            continue;
        };
        if seen_kinds.contains(&kind) {
            continue;
        }
        seen_kinds.push(kind);

        let family: &[&str] = match kind {
            DefectKind::LayerShift => &[
                "Check belt tension and mechanical stability",
                "Reduce print speed",
                "Make sure the printer sits on a stable surface",
                "Reduce travel speed to soften direction changes",
                "Check that the build plate is seated correctly",
            ],
            DefectKind::Stringing => &[
                "Increase retraction distance (try +0.5mm)",
                "Increase retraction speed (try +10mm/s)",
                "Lower nozzle temperature (try -5°C)",
                "Dry the filament before printing",
                "Enable z-hop so travels clear printed walls",
            ],
            DefectKind::Warping => &[
                "Increase bed temperature (try +5°C)",
                "Add or widen the brim",
                "Shield the printer from drafts",
                "Slow down the first layer",
                "Clean the plate to restore adhesion",
            ],
            DefectKind::Blob => &[
                "Enable coasting in the slicer",
                "Reduce the extrusion multiplier slightly",
                "Adjust the seam position",
                "Increase retraction at layer change",
                "Lower nozzle temperature a few degrees",
            ],
            DefectKind::Spaghetti => &[
                "Check bed adhesion: clean and re-level the plate",
                "Increase the first layer height",
                "Slow down the first layer significantly",
                "Use a brim or raft for a wider footprint",
                "Watch the first layers before walking away",
            ],
            DefectKind::UnderExtrusion => &[
                "Increase the flow rate / extrusion multiplier",
                "Check for a partially clogged nozzle",
                "Increase nozzle temperature",
                "Slow down infill so the hot end keeps up",
                "Check the spool path for drag",
            ],
            DefectKind::OverExtrusion => &[
                "Decrease the flow rate / extrusion multiplier",
                "Calibrate extruder steps",
                "Lower nozzle temperature slightly",
                "Verify the filament diameter setting",
                "Reduce the line width if over-filled",
            ],
            DefectKind::PoorAdhesion => &[
                "Clean the plate with dish soap and water",
                "Raise the initial bed temperature (try +10°C)",
                "Thicken the first layer slightly",
                "Slow down the first layer",
                "Add a brim for a wider footprint",
            ],
            DefectKind::NozzleClog => &[
                "Run a cold pull to clear the nozzle",
                "Raise nozzle temperature and purge",
                "Check for heat creep in the hot end",
                "Dry the filament; moisture pops cause jams",
                "Replace the nozzle if wear is visible",
            ],
            DefectKind::LayerSeparation => &[
                "Raise nozzle temperature for better bonding",
                "Reduce cooling fan speed",
                "Shield the printer from drafts",
                "Reduce layer height relative to the nozzle",
                "Slow down outer walls",
            ],
        };
        suggestions.extend(family.iter().map(|s| s.to_string()));
    }

    suggestions
}
