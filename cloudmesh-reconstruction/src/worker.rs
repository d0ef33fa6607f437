//! Off-thread pipeline execution
//!
//! A [`PipelineWorker`] owns one thread and a job queue. Jobs carry their own
//! point set, so workers share nothing mutable; several workers can process
//! independent clouds at the same time.

use crate::pipeline::{PipelineConfig, PipelineOutput, StageEvent, SurfacePipeline};
use crate::poisson::{panic_detail, ReconstructionEngine};
use cloudmesh_core::{Error, PointSet, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Final state of a job
#[derive(Debug)]
pub enum JobOutcome {
    Ok(Box<PipelineOutput>),
    Err(Error),
    Cancelled,
}

impl JobOutcome {
    pub fn into_result(self) -> Result<PipelineOutput> {
        match self {
            JobOutcome::Ok(output) => Ok(*output),
            JobOutcome::Err(e) => Err(e),
            JobOutcome::Cancelled => Err(Error::Cancelled),
        }
    }
}

struct Job {
    points: Arc<PointSet>,
    events: Sender<StageEvent>,
    outcome: Sender<JobOutcome>,
    cancelled: Arc<AtomicBool>,
}

/// Caller's side of a submitted job. Dropping the handle cancels the job.
#[derive(Debug)]
pub struct JobHandle {
    events: Receiver<StageEvent>,
    outcome: Receiver<JobOutcome>,
    cancelled: Arc<AtomicBool>,
}

impl JobHandle {
    /// Stage start and completion signals, in order
    pub fn events(&self) -> &Receiver<StageEvent> {
        &self.events
    }

    /// Abandon the job. Takes effect before the next stage starts; a result
    /// already being computed is discarded.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Block until the job finishes
    pub fn wait(self) -> JobOutcome {
        match self.outcome.recv() {
            Ok(outcome) => outcome,
            // The worker went away without answering
            Err(_) => JobOutcome::Cancelled,
        }
    }

    /// The outcome, if the job has finished
    pub fn try_outcome(&self) -> Option<JobOutcome> {
        self.outcome.try_recv().ok()
    }
}

impl Drop for JobHandle {
    fn drop(&mut self) {
        // Nobody is left to read the result
        self.cancel();
    }
}

/// A dedicated thread running pipeline jobs one after another
pub struct PipelineWorker {
    jobs: Option<Sender<Job>>,
    thread: Option<JoinHandle<()>>,
}

impl PipelineWorker {
    pub fn spawn(config: PipelineConfig, engine: Arc<dyn ReconstructionEngine>) -> Result<Self> {
        let (tx, rx) = unbounded();
        let thread = std::thread::Builder::new()
            .name("cloudmesh-pipeline".to_string())
            .spawn(move || worker_thread(SurfacePipeline::new(config), engine, rx))
            .map_err(|e| Error::Algorithm(format!("could not start pipeline worker: {}", e)))?;

        Ok(Self {
            jobs: Some(tx),
            thread: Some(thread),
        })
    }

    /// Queue a point set for processing
    pub fn submit(&self, points: Arc<PointSet>) -> Result<JobHandle> {
        let (events_tx, events_rx) = unbounded();
        let (outcome_tx, outcome_rx) = unbounded();
        let cancelled = Arc::new(AtomicBool::new(false));

        let job = Job {
            points,
            events: events_tx,
            outcome: outcome_tx,
            cancelled: cancelled.clone(),
        };
        self.jobs
            .as_ref()
            .ok_or(Error::Cancelled)?
            .send(job)
            .map_err(|_| Error::Algorithm("pipeline worker has stopped".to_string()))?;

        Ok(JobHandle {
            events: events_rx,
            outcome: outcome_rx,
            cancelled,
        })
    }
}

impl Drop for PipelineWorker {
    fn drop(&mut self) {
        // Closing the queue ends the thread once queued jobs are done
        self.jobs.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("pipeline worker thread panicked");
            }
        }
    }
}

fn worker_thread(pipeline: SurfacePipeline, engine: Arc<dyn ReconstructionEngine>, rx: Receiver<Job>) {
    while let Ok(job) = rx.recv() {
        // A panicking stage fails its job; the thread keeps serving the queue
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| run_job(&pipeline, engine.as_ref(), &job)))
            .unwrap_or_else(|payload| {
                JobOutcome::Err(Error::Algorithm(format!("pipeline job panicked: {}", panic_detail(payload.as_ref()))))
            });
        log::debug!("pipeline worker finished job: {}", outcome_label(&outcome));
        // The caller may have dropped its handle
        let _ = job.outcome.send(outcome);
    }
    log::debug!("pipeline worker queue closed");
}

fn run_job(pipeline: &SurfacePipeline, engine: &dyn ReconstructionEngine, job: &Job) -> JobOutcome {
    let is_cancelled = || job.cancelled.load(Ordering::SeqCst);
    if is_cancelled() {
        return JobOutcome::Cancelled;
    }

    let result = pipeline.run_observed(&job.points, engine, &mut |event| {
        if let StageEvent::Started(_) = event {
            if is_cancelled() {
                return Err(Error::Cancelled);
            }
        }
        let _ = job.events.send(event);
        Ok(())
    });

    match result {
        _ if is_cancelled() => JobOutcome::Cancelled,
        Ok(output) => JobOutcome::Ok(Box::new(output)),
        Err(Error::Cancelled) => JobOutcome::Cancelled,
        Err(e) => JobOutcome::Err(e),
    }
}

fn outcome_label(outcome: &JobOutcome) -> String {
    match outcome {
        JobOutcome::Ok(output) => format!("{} faces", output.mesh.face_count()),
        JobOutcome::Err(e) => e.to_string(),
        JobOutcome::Cancelled => "cancelled".to_string(),
    }
}
