// tisdk-common/src/progress.rs
//! Task sequencing and progress reporting shared by the download, extract and install steps.

use serde::{Deserialize, Serialize};

/// Smallest progress increase that is reported without forcing.
const PROGRESS_STEP: f64 = 0.01;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ProgressEvent {
    Tasks {
        tasks: Vec<String>,
    },
    TaskStart {
        task: usize,
        #[serde(rename = "hasProgress")]
        has_progress: bool,
    },
    TaskProgress {
        task: usize,
        progress: f64,
    },
    TaskEnd {
        task: usize,
    },
}

pub type ProgressCallback = Box<dyn FnMut(ProgressEvent) + Send>;

/// Walks an ordered task list, emitting [`ProgressEvent`]s to an optional callback.
///
/// Tasks are numbered from 1. The tracker only moves forward.
pub struct ProgressTracker {
    callback: Option<ProgressCallback>,
    tasks: Vec<String>,
    current_task: usize,
    current_progress: f64,
    sent_tasks: bool,
}

impl std::fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("tasks", &self.tasks)
            .field("current_task", &self.current_task)
            .field("current_progress", &self.current_progress)
            .finish()
    }
}

impl ProgressTracker {
    pub fn new(callback: Option<ProgressCallback>, tasks: Vec<String>) -> Self {
        Self {
            callback,
            tasks,
            current_task: 1,
            current_progress: 0.0,
            sent_tasks: false,
        }
    }

    pub fn tasks(&self) -> &[String] {
        &self.tasks
    }

    pub fn current_task(&self) -> usize {
        self.current_task
    }

    pub fn current_progress(&self) -> f64 {
        self.current_progress
    }

    fn emit(&mut self, event: ProgressEvent) {
        if let Some(cb) = self.callback.as_mut() {
            cb(event);
        }
    }

    /// Announces the task list on first use, then marks the current task active.
    pub fn start_task(&mut self, has_progress: bool) {
        if !self.sent_tasks {
            self.sent_tasks = true;
            let tasks = self.tasks.clone();
            self.emit(ProgressEvent::Tasks { tasks });
        }
        let task = self.current_task;
        self.emit(ProgressEvent::TaskStart { task, has_progress });
    }

    /// Reports fractional completion of the current task. Values are clamped to
    /// `[0, 1]`; only increases larger than one percent are reported.
    pub fn progress(&mut self, value: f64) {
        self.report(value, false);
    }

    fn report(&mut self, value: f64, force: bool) {
        let value = if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) };
        if value < self.current_progress {
            return;
        }
        if force || value - self.current_progress > PROGRESS_STEP {
            self.current_progress = value;
            let task = self.current_task;
            self.emit(ProgressEvent::TaskProgress { task, progress: value });
        }
    }

    /// Flushes 100% if it was not reported yet, ends the task and moves to the next.
    pub fn end_task(&mut self) {
        if self.current_progress < 1.0 {
            self.report(1.0, true);
        }
        let task = self.current_task;
        self.emit(ProgressEvent::TaskEnd { task });
        self.current_task += 1;
        self.current_progress = 0.0;
    }
}
