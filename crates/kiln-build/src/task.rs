//! Composable build tasks.
//!
//! A [`Task`] is either an atomic step or a group of tasks run in order
//! ([`Task::series`]) or concurrently ([`Task::parallel`]). Steps run on the
//! blocking thread pool, so file I/O never stalls the async runtime.

use std::borrow::Cow;
use std::future::Future;
use std::ops::AddAssign;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use kiln_convert::{ConvertInput, Converter};
use rayon::prelude::*;
use tokio::task::JoinSet;

use crate::error::BuildError;

/// Work counters accumulated across a task tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepReport {
    /// Output files written
    pub outputs: usize,

    /// Inputs a converter failed on (logged, not fatal)
    pub failures: usize,
}

impl AddAssign for StepReport {
    fn add_assign(&mut self, rhs: Self) {
        self.outputs += rhs.outputs;
        self.failures += rhs.failures;
    }
}

type StepFn = Arc<dyn Fn() -> Result<StepReport, BuildError> + Send + Sync>;

/// Boxed future returned by [`Task::run`].
pub type TaskFuture = Pin<Box<dyn Future<Output = Result<StepReport, BuildError>> + Send>>;

/// A named, composable unit of build work.
#[derive(Clone)]
pub enum Task {
    /// Atomic step
    Step {
        name: Cow<'static, str>,
        run: StepFn,
    },

    /// Run in order; stop at the first error
    Series(Vec<Task>),

    /// Run concurrently; wait for every branch
    Parallel(Vec<Task>),
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Task::Step { name, .. } => f.debug_tuple("Step").field(name).finish(),
            Task::Series(tasks) => f.debug_tuple("Series").field(tasks).finish(),
            Task::Parallel(tasks) => f.debug_tuple("Parallel").field(tasks).finish(),
        }
    }
}

impl Task {
    /// An atomic step running `f` on the blocking pool.
    pub fn step<F>(name: impl Into<Cow<'static, str>>, f: F) -> Self
    where
        F: Fn() -> Result<StepReport, BuildError> + Send + Sync + 'static,
    {
        Task::Step {
            name: name.into(),
            run: Arc::new(f),
        }
    }

    /// Tasks run one after another.
    pub fn series(tasks: Vec<Task>) -> Self {
        Task::Series(tasks)
    }

    /// Tasks started together; complete when all of them are.
    pub fn parallel(tasks: Vec<Task>) -> Self {
        Task::Parallel(tasks)
    }

    /// A converter step that never fails because of its inputs.
    ///
    /// `jobs` is evaluated when the step runs, so it sees the source tree as
    /// it is then. Each job is converted independently; a failing job is
    /// logged with its source path and counted, and the others carry on.
    pub fn resilient<J>(
        name: impl Into<Cow<'static, str>>,
        converter: Arc<dyn Converter>,
        jobs: J,
    ) -> Self
    where
        J: Fn() -> Vec<ConvertInput> + Send + Sync + 'static,
    {
        Task::step(name, move || {
            let jobs = jobs();

            let results: Vec<_> = jobs
                .par_iter()
                .map(|job| (job, converter.convert(job)))
                .collect();

            let mut report = StepReport::default();
            for (job, result) in results {
                match result {
                    Ok(outputs) => {
                        for output in &outputs {
                            tracing::debug!(
                                "[{}] {} -> {}",
                                converter.name(),
                                job.source.display(),
                                output.display()
                            );
                        }
                        report.outputs += outputs.len();
                    }
                    Err(e) => {
                        tracing::warn!("[{}] {}", converter.name(), e);
                        report.failures += 1;
                    }
                }
            }

            Ok(report)
        })
    }

    /// Human-readable name, used in logs.
    pub fn name(&self) -> String {
        match self {
            Task::Step { name, .. } => name.to_string(),
            Task::Series(tasks) => format!(
                "series({})",
                tasks.iter().map(Task::name).collect::<Vec<_>>().join(", ")
            ),
            Task::Parallel(tasks) => format!(
                "parallel({})",
                tasks.iter().map(Task::name).collect::<Vec<_>>().join(", ")
            ),
        }
    }

    /// Run the task tree.
    pub fn run(self) -> TaskFuture {
        Box::pin(async move {
            match self {
                Task::Step { name, run } => run_step(name, run).await,

                Task::Series(tasks) => {
                    let mut total = StepReport::default();
                    for task in tasks {
                        total += task.run().await?;
                    }
                    Ok(total)
                }

                Task::Parallel(tasks) => {
                    let mut set = JoinSet::new();
                    for task in tasks {
                        set.spawn(task.run());
                    }

                    let mut total = StepReport::default();
                    let mut first_error = None;

                    while let Some(joined) = set.join_next().await {
                        let result = joined.unwrap_or_else(|e| {
                            Err(BuildError::Task {
                                task: "parallel branch".to_string(),
                                message: e.to_string(),
                            })
                        });

                        match result {
                            Ok(report) => total += report,
                            Err(e) => {
                                tracing::error!("{}", e);
                                first_error.get_or_insert(e);
                            }
                        }
                    }

                    match first_error {
                        Some(e) => Err(e),
                        None => Ok(total),
                    }
                }
            }
        })
    }
}

async fn run_step(name: Cow<'static, str>, run: StepFn) -> Result<StepReport, BuildError> {
    tracing::debug!("Starting '{}'", name);
    let start = Instant::now();

    let report = tokio::task::spawn_blocking(move || run())
        .await
        .map_err(|e| BuildError::Task {
            task: name.to_string(),
            message: e.to_string(),
        })??;

    if report.failures > 0 {
        tracing::warn!(
            "Finished '{}' in {}ms: {} outputs, {} failed",
            name,
            start.elapsed().as_millis(),
            report.outputs,
            report.failures
        );
    } else {
        tracing::info!(
            "Finished '{}' in {}ms: {} outputs",
            name,
            start.elapsed().as_millis(),
            report.outputs
        );
    }

    Ok(report)
}
