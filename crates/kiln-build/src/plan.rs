//! Rebuild plans derived from file changes.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::layout::Category;

/// Kind of file-system change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Created,
    Modified,
    Removed,
}

impl ChangeKind {
    /// Short label for logs.
    pub fn label(self) -> &'static str {
        match self {
            ChangeKind::Created => "created",
            ChangeKind::Modified => "modified",
            ChangeKind::Removed => "removed",
        }
    }
}

/// A single rebuild step.
///
/// The declaration order is the execution order: the include index is
/// regenerated before any page is compiled, and stale outputs are removed
/// before new ones are written.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Action {
    RegenerateIndex,
    RemovePage(PathBuf),
    RemovePageTree(PathBuf),
    CompileAllPages,
    CompilePage(PathBuf),
    CompileStyles,
    ProcessScripts,
    OptimizeImages,
    CopyAssets,
}

/// An ordered, de-duplicated set of actions.
///
/// An empty plan is meaningful: it does no work but still completes, which
/// the watch loop turns into a reload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    actions: BTreeSet<Action>,
}

impl Plan {
    /// Create an empty plan.
    pub fn new() -> Self {
        Self::default()
    }

    /// The rebuild a single change calls for, or `None` if it needs nothing.
    pub fn for_change(category: Category, path: &Path, kind: ChangeKind) -> Option<Plan> {
        use ChangeKind::*;

        let actions: Vec<Action> = match (category, kind) {
            (Category::Pages, Created | Modified) => vec![Action::CompilePage(path.to_path_buf())],
            (Category::Pages, Removed) => vec![Action::RemovePage(path.to_path_buf())],

            // A directory moved in brings pages nobody reported individually.
            (Category::PageTree, Created) => vec![Action::CompileAllPages],
            (Category::PageTree, Removed) => vec![Action::RemovePageTree(path.to_path_buf())],

            // Content edits never touch the index; only membership changes do.
            (Category::Partials, Modified) => vec![Action::CompileAllPages],
            (Category::Partials, Created) => {
                vec![Action::RegenerateIndex, Action::CompileAllPages]
            }
            (Category::Partials, Removed) => vec![Action::RegenerateIndex],

            (Category::Styles, Created | Modified) => vec![Action::CompileStyles],
            (Category::Scripts, Created | Modified) => vec![Action::ProcessScripts],
            (Category::Images, Created | Modified) => vec![Action::OptimizeImages],
            (Category::Assets, Created | Modified) => vec![Action::CopyAssets],

            // Usually our own page removal; the coordinator folds the
            // resulting reload into the one it already sent.
            (Category::Output, Removed) => Vec::new(),

            (Category::Styles, Removed)
            | (Category::Scripts, Removed)
            | (Category::Images, Removed)
            | (Category::Assets, Removed)
            | (Category::PageTree, Modified)
            | (Category::Output, Created | Modified) => return None,
        };

        let mut plan = Plan::new();
        for action in actions {
            plan.push(action);
        }
        Some(plan)
    }

    /// Add an action, keeping the plan normalized.
    ///
    /// - compiling all pages subsumes compiling any single page;
    /// - compiling and removing the same page cancel out, latest wins.
    pub fn push(&mut self, action: Action) {
        match &action {
            Action::CompileAllPages => {
                self.actions
                    .retain(|a| !matches!(a, Action::CompilePage(_)));
            }
            Action::CompilePage(path) => {
                self.actions.remove(&Action::RemovePage(path.clone()));
                if self.actions.contains(&Action::CompileAllPages) {
                    return;
                }
            }
            Action::RemovePage(path) => {
                self.actions.remove(&Action::CompilePage(path.clone()));
            }
            _ => {}
        }
        self.actions.insert(action);
    }

    /// Fold another plan into this one, as if its actions came later.
    pub fn merge(&mut self, other: Plan) {
        for action in other.actions {
            self.push(action);
        }
    }

    /// Actions in execution order.
    pub fn actions(&self) -> impl Iterator<Item = &Action> {
        self.actions.iter()
    }

    /// Whether the plan does no work.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Number of actions.
    pub fn len(&self) -> usize {
        self.actions.len()
    }
}

impl FromIterator<Action> for Plan {
    fn from_iter<I: IntoIterator<Item = Action>>(iter: I) -> Self {
        let mut plan = Plan::new();
        for action in iter {
            plan.push(action);
        }
        plan
    }
}
