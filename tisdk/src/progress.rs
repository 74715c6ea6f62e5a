// tisdk/src/progress.rs
//! Renders install progress events as terminal progress bars.

use std::time::Duration;

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use tisdk_common::progress::{ProgressCallback, ProgressEvent};

const BAR_LENGTH: u64 = 100;

#[derive(Default)]
struct Renderer {
    tasks: Vec<String>,
    bar: Option<ProgressBar>,
}

impl Renderer {
    fn label(&self, task: usize) -> String {
        let name = self
            .tasks
            .get(task.saturating_sub(1))
            .map(String::as_str)
            .unwrap_or("Working");
        format!("[{}/{}] {}", task, self.tasks.len(), name)
    }

    fn handle(&mut self, event: ProgressEvent) {
        match event {
            ProgressEvent::Tasks { tasks } => self.tasks = tasks,
            ProgressEvent::TaskStart { task, has_progress } => {
                let bar = if has_progress {
                    let bar = ProgressBar::new(BAR_LENGTH);
                    bar.set_style(
                        ProgressStyle::default_bar()
                            .template("{spinner:.green} [{bar:40.cyan/blue}] {percent:>3}% {msg}")
                            .unwrap_or_else(|_| ProgressStyle::default_bar())
                            .progress_chars("#>-"),
                    );
                    bar
                } else {
                    let bar = ProgressBar::new_spinner();
                    bar.set_style(
                        ProgressStyle::default_spinner()
                            .template("{spinner:.green} {msg}")
                            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                    );
                    bar
                };
                bar.set_message(self.label(task));
                bar.enable_steady_tick(Duration::from_millis(100));
                if let Some(previous) = self.bar.replace(bar) {
                    previous.finish_and_clear();
                }
            }
            ProgressEvent::TaskProgress { progress, .. } => {
                if let Some(bar) = &self.bar {
                    bar.set_position((progress * BAR_LENGTH as f64).round() as u64);
                }
            }
            ProgressEvent::TaskEnd { task } => {
                if let Some(bar) = self.bar.take() {
                    bar.finish_and_clear();
                }
                eprintln!("{} {}", "✓".green(), self.label(task));
            }
        }
    }
}

/// A progress callback that draws one bar per task, or a spinner when the task reports
/// no fractional progress.
pub fn terminal_progress() -> ProgressCallback {
    let mut renderer = Renderer::default();
    Box::new(move |event| renderer.handle(event))
}
