//! Watch coordinator.
//!
//! One loop owns the rebuild state of every category. File changes and
//! rebuild completions arrive as messages; nothing else mutates the state.
//!
//! ```text
//!            change                 deadline               done
//!   Idle ───────────▶ Pending ───────────────▶ Running ──────────▶ Idle
//!                      ▲  │ change (deadline        │ change
//!                      │  └─ pushed back)         ▼
//!                      └──────────── done ◀── Running (rerun due)
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use kiln_build::{BuildError, Category, Pipeline, Plan, SiteLayout};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::watcher::FsChange;
use crate::websocket::ReloadHub;

/// Default quiet period after the last change before a rebuild runs.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// Runs rebuild plans for the coordinator.
pub trait PlanRunner: Send + Sync + 'static {
    fn run(&self, plan: Plan) -> impl Future<Output = Result<(), BuildError>> + Send;
}

impl PlanRunner for Pipeline {
    fn run(&self, plan: Plan) -> impl Future<Output = Result<(), BuildError>> + Send {
        let task = self.plan_task(&plan);
        async move { task.run().await.map(|_| ()) }
    }
}

/// Rebuild state of one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Nothing to do
    Idle,

    /// Work queued; runs once `deadline` passes without further changes
    Pending { deadline: Instant },

    /// A rebuild is in flight. `rerun_at` is set when changes arrived
    /// meanwhile.
    Running { rerun_at: Option<Instant> },
}

#[derive(Debug)]
struct Slot {
    state: SlotState,
    plan: Plan,
}

impl Default for Slot {
    fn default() -> Self {
        Self {
            state: SlotState::Idle,
            plan: Plan::new(),
        }
    }
}

/// Per-category rebuild state machine.
///
/// Pure bookkeeping: no I/O, no clocks of its own. Callers pass `now`.
#[derive(Debug)]
pub struct WatchState {
    debounce: Duration,
    slots: HashMap<Category, Slot>,
}

impl WatchState {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            slots: HashMap::new(),
        }
    }

    /// The slot a category's work runs in.
    ///
    /// Every template category writes page outputs, so they share the
    /// pages slot and never rebuild concurrently.
    pub fn slot_for(category: Category) -> Category {
        match category {
            Category::Partials | Category::PageTree => Category::Pages,
            other => other,
        }
    }

    /// Current state of a category's slot.
    pub fn state(&self, category: Category) -> SlotState {
        self.slots
            .get(&Self::slot_for(category))
            .map(|s| s.state)
            .unwrap_or(SlotState::Idle)
    }

    /// Work accumulated for a category but not yet started.
    pub fn pending_plan(&self, category: Category) -> Option<&Plan> {
        self.slots.get(&Self::slot_for(category)).map(|s| &s.plan)
    }

    /// Record a change. A running rebuild is never interrupted; the work is
    /// held until it finishes.
    pub fn on_change(&mut self, category: Category, plan: Plan, now: Instant) {
        let deadline = now + self.debounce;
        let slot = self.slots.entry(Self::slot_for(category)).or_default();
        slot.plan.merge(plan);

        slot.state = match slot.state {
            SlotState::Idle | SlotState::Pending { .. } => SlotState::Pending { deadline },
            SlotState::Running { .. } => SlotState::Running {
                rerun_at: Some(deadline),
            },
        };
    }

    /// Start every slot whose quiet period has elapsed.
    ///
    /// Returns the plans to run keyed by slot; those slots are now `Running`.
    pub fn take_due(&mut self, now: Instant) -> Vec<(Category, Plan)> {
        let mut due = Vec::new();

        for category in Category::ALL {
            let Some(slot) = self.slots.get_mut(&category) else {
                continue;
            };

            if let SlotState::Pending { deadline } = slot.state {
                if deadline <= now {
                    slot.state = SlotState::Running { rerun_at: None };
                    due.push((category, std::mem::take(&mut slot.plan)));
                }
            }
        }

        due
    }

    /// Record that a category's rebuild finished.
    pub fn on_complete(&mut self, category: Category) {
        let Some(slot) = self.slots.get_mut(&Self::slot_for(category)) else {
            return;
        };

        slot.state = match slot.state {
            SlotState::Running {
                rerun_at: Some(deadline),
            } => SlotState::Pending { deadline },
            _ => SlotState::Idle,
        };
    }

    /// Earliest pending deadline, if anything is waiting.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.slots
            .values()
            .filter_map(|slot| match slot.state {
                SlotState::Pending { deadline } => Some(deadline),
                _ => None,
            })
            .min()
    }

    /// Whether no category is pending or running.
    pub fn is_idle(&self) -> bool {
        self.slots
            .values()
            .all(|slot| slot.state == SlotState::Idle)
    }
}

/// Drives rebuilds and browser reloads from file changes.
pub struct WatchCoordinator<R> {
    layout: Arc<SiteLayout>,
    runner: Arc<R>,
    hub: ReloadHub,
    debounce: Duration,
    state: WatchState,
    last_reload: Option<Instant>,
    output_changed_at: Option<Instant>,
}

impl<R: PlanRunner> WatchCoordinator<R> {
    pub fn new(layout: Arc<SiteLayout>, runner: Arc<R>, hub: ReloadHub, debounce: Duration) -> Self {
        Self {
            layout,
            runner,
            hub,
            debounce,
            state: WatchState::new(debounce),
            last_reload: None,
            output_changed_at: None,
        }
    }

    /// Run until the change channel closes and all queued work is done.
    pub async fn run(mut self, mut changes: mpsc::Receiver<FsChange>) {
        let (done_tx, mut done_rx) = mpsc::channel::<(Category, Result<(), BuildError>)>(16);
        let mut closed = false;

        loop {
            if closed && self.state.is_idle() {
                break;
            }

            let deadline = self.state.next_deadline();

            tokio::select! {
                change = changes.recv(), if !closed => match change {
                    Some(change) => self.handle_change(change),
                    None => closed = true,
                },

                Some((category, result)) = done_rx.recv() => {
                    self.finish(category, result);
                }

                _ = sleep_until(deadline) => {
                    for (category, plan) in self.state.take_due(Instant::now()) {
                        self.spawn_run(category, plan, done_tx.clone());
                    }
                }
            }
        }

        tracing::debug!("Watch coordinator stopped");
    }

    fn handle_change(&mut self, change: FsChange) {
        let Some(category) = self.layout.classify(&change.path) else {
            return;
        };
        let Some(plan) = Plan::for_change(category, &change.path, change.kind) else {
            return;
        };

        tracing::debug!(
            "{} {} ({})",
            change.kind.label(),
            change.path.display(),
            category
        );

        let now = Instant::now();
        if category == Category::Output {
            self.output_changed_at.get_or_insert(now);
        }
        self.state.on_change(category, plan, now);
    }

    fn spawn_run(
        &self,
        category: Category,
        plan: Plan,
        done: mpsc::Sender<(Category, Result<(), BuildError>)>,
    ) {
        tracing::debug!("Rebuilding {} ({} actions)", category, plan.len());
        let runner = Arc::clone(&self.runner);

        tokio::spawn(async move {
            let result = runner.run(plan).await;
            let _ = done.send((category, result)).await;
        });
    }

    fn finish(&mut self, category: Category, result: Result<(), BuildError>) {
        self.state.on_complete(category);
        let output_changed_at = if category == Category::Output {
            self.output_changed_at.take()
        } else {
            None
        };

        match result {
            Ok(()) if category == Category::Styles => {
                for path in self.layout.style_urls() {
                    self.hub.inject_css(path);
                }
            }
            // Deleting a page fires an output removal too; that one is
            // already covered by the reload the page slot just sent.
            Ok(())
                if category == Category::Output
                    && self.reloaded_since(output_changed_at) =>
            {
                tracing::debug!("Output change already reloaded");
            }
            Ok(()) => {
                self.hub.reload();
                self.last_reload = Some(Instant::now());
            }
            Err(e) => tracing::error!("Rebuild of {} failed: {}", category, e),
        }
    }
}

impl<R> WatchCoordinator<R> {
    /// Whether a reload went out no more than one debounce window before
    /// `changed_at`, or any time after it.
    fn reloaded_since(&self, changed_at: Option<Instant>) -> bool {
        match (self.last_reload, changed_at) {
            (Some(reloaded), Some(changed)) => reloaded + self.debounce >= changed,
            _ => false,
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
