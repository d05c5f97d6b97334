//! Bulk indexing job lifecycle.
//!
//! A bulk (re)index runs as a detached background task with its own store
//! handles, reporting progress only through the persisted [`IndexingJob`]
//! record. Per-note failures accumulate in the job's error list without
//! failing the job; only a job-level startup failure or cancellation marks
//! it `Failed`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::RagError;
use crate::indexer::NoteIndexer;
use crate::store::JobStore;
use crate::types::Note;

/// Job state machine: `Pending -> Running -> {Completed, Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    /// Pending and Running jobs count against the one-active-job-per-user
    /// invariant.
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Running)
    }
}

/// A bulk indexing job record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingJob {
    pub id: String,
    pub user_id: String,
    pub status: JobStatus,
    pub total_notes: usize,
    pub processed_notes: usize,
    pub total_chunks: usize,
    pub processed_chunks: usize,
    pub errors: Vec<String>,
    pub embedding_provider: String,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl IndexingJob {
    /// Create a new Pending job.
    pub fn new(user_id: &str, embedding_provider: &str, total_notes: usize) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            status: JobStatus::Pending,
            total_notes,
            processed_notes: 0,
            total_chunks: 0,
            processed_chunks: 0,
            errors: Vec::new(),
            embedding_provider: embedding_provider.to_string(),
            started_at: None,
            completed_at: None,
        }
    }
}

/// Manages bulk indexing job lifecycle.
pub struct IndexingJobTracker {
    store: Arc<dyn JobStore>,
    indexer: Arc<NoteIndexer>,
}

impl IndexingJobTracker {
    pub fn new(store: Arc<dyn JobStore>, indexer: Arc<NoteIndexer>) -> Self {
        Self { store, indexer }
    }

    /// Submit a bulk indexing job for the given notes and return its
    /// initial Pending snapshot. The work itself runs on a detached task;
    /// poll [`IndexingJobTracker::get_job`] for progress.
    ///
    /// At most one active (Pending/Running) job per user is enforced by a
    /// check-then-create against the job store. The check is not atomic:
    /// two racing submissions can both pass it. A store that needs hard
    /// enforcement can reject the second `create` with a uniqueness
    /// constraint.
    pub async fn start_bulk_index(
        &self,
        user_id: &str,
        notes: Vec<Note>,
        cancel: CancellationToken,
    ) -> Result<IndexingJob, RagError> {
        if let Some(active) = self.store.find_active_for_user(user_id).await? {
            return Err(RagError::Job(format!(
                "user {} already has an active indexing job ({})",
                user_id, active.id
            )));
        }

        let provider_name = self.indexer.embeddings().provider_name().to_string();
        let job = IndexingJob::new(user_id, &provider_name, notes.len());
        self.store.create(&job).await?;

        info!(job_id = %job.id, notes = notes.len(), "Bulk indexing job submitted");

        let store = Arc::clone(&self.store);
        let indexer = Arc::clone(&self.indexer);
        let worker_job = job.clone();
        tokio::spawn(async move {
            run_job(store, indexer, worker_job, notes, cancel).await;
        });

        Ok(job)
    }

    /// Fetch a job's current state for status polling.
    pub async fn get_job(&self, job_id: &str) -> Result<Option<IndexingJob>, RagError> {
        self.store.get(job_id).await
    }
}

/// The background worker loop. Never returns an error: every failure ends
/// up in the persisted job record.
async fn run_job(
    store: Arc<dyn JobStore>,
    indexer: Arc<NoteIndexer>,
    mut job: IndexingJob,
    notes: Vec<Note>,
    cancel: CancellationToken,
) {
    // Startup check: a fully unavailable provider fails the job before any
    // note is touched.
    if !indexer.embeddings().is_enabled() {
        job.status = JobStatus::Failed;
        job.errors.push(format!(
            "embedding provider '{}' is disabled",
            job.embedding_provider
        ));
        job.completed_at = Some(Utc::now());
        persist(&store, &job).await;
        return;
    }

    job.status = JobStatus::Running;
    job.started_at = Some(Utc::now());
    persist(&store, &job).await;

    for note in &notes {
        if cancel.is_cancelled() {
            job.status = JobStatus::Failed;
            job.errors.push("job cancelled".to_string());
            job.completed_at = Some(Utc::now());
            persist(&store, &job).await;
            info!(job_id = %job.id, "Bulk indexing job cancelled");
            return;
        }

        match indexer.reindex_note(note, &cancel).await {
            Ok(chunks) => {
                job.processed_chunks += chunks;
                job.total_chunks += chunks;
            }
            Err(e) => {
                if cancel.is_cancelled() {
                    job.status = JobStatus::Failed;
                    job.errors.push("job cancelled".to_string());
                    job.completed_at = Some(Utc::now());
                    persist(&store, &job).await;
                    return;
                }
                // Per-note failure: record and move on.
                warn!(job_id = %job.id, note_id = %note.id, error = %e, "Note failed to index");
                job.errors.push(format!("note {}: {}", note.id, e));
            }
        }

        job.processed_notes += 1;
        persist(&store, &job).await;
    }

    job.status = JobStatus::Completed;
    job.completed_at = Some(Utc::now());
    persist(&store, &job).await;
    info!(
        job_id = %job.id,
        notes = job.processed_notes,
        chunks = job.processed_chunks,
        errors = job.errors.len(),
        "Bulk indexing job completed"
    );
}

async fn persist(store: &Arc<dyn JobStore>, job: &IndexingJob) {
    if let Err(e) = store.update(job).await {
        warn!(job_id = %job.id, error = %e, "Failed to persist job state");
    }
}
