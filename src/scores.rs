//! Bulk upload of scores assigned to LLM answers by an automatic judge.

use std::{fs::File, io::Read, path::Path};

use anyhow::Context;
use log::{info, warn};
use serde::Deserialize;

use crate::backend::Backend;

/// One entry of a scoring output file. Entries missing either field are skipped on upload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScoreEntry {
    #[serde(default)]
    pub id: Option<i64>,

    #[serde(default)]
    pub score: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadReport {
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub fn read_entries(file: &mut impl Read) -> anyhow::Result<Vec<ScoreEntry>> {
    let mut contents = String::new();
    file.read_to_string(&mut contents)
        .context("Failed to read score file")?;

    let entries = serde_json::from_str(&contents).context("Failed to parse score file")?;
    Ok(entries)
}

pub fn read_entries_path(path: impl AsRef<Path>) -> anyhow::Result<Vec<ScoreEntry>> {
    let mut file = File::open(path).context("Failed to open score file")?;
    read_entries(&mut file)
}

/// Stores every complete entry. Failures are logged and counted; they do not stop the upload.
pub async fn upload(backend: &impl Backend, entries: &[ScoreEntry]) -> UploadReport {
    let mut report = UploadReport::default();
    for entry in entries {
        let (Some(task_id), Some(score)) = (entry.id, entry.score) else {
            warn!("Skipping entry with missing id or score: {entry:?}");
            report.skipped += 1;
            continue;
        };
        match backend.record_llm_score(task_id, score).await {
            Ok(()) => {
                info!("Updated task {task_id} with score {score}");
                report.updated += 1;
            }
            Err(err) => {
                log::error!("Failed to update task {task_id}: {err:?}");
                report.failed += 1;
            }
        }
    }
    report
}
