//! Cycle detection for recursive resolutions.

use crate::error::{CompileError, CompileResult};

const MAX_DEPTH: usize = 1024;

#[cfg(feature = "smallvec")]
type PathStack = smallvec::SmallVec<[String; 8]>;
#[cfg(not(feature = "smallvec"))]
type PathStack = Vec<String>;

/// Ids currently being resolved, outermost first.
///
/// Used by resolutions that recurse through ids (parent chains, alias
/// chains, decorator stacks, inlining): entering an id already on the path
/// is a circular reference.
#[derive(Debug, Default)]
pub(crate) struct ResolutionPath {
    stack: PathStack,
}

impl ResolutionPath {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Pushes `id`, failing with the full cycle if it is already on the path.
    pub(crate) fn enter(&mut self, id: &str) -> CompileResult<()> {
        if self.contains(id) {
            let mut path = self.to_vec();
            path.push(id.to_string());
            return Err(CompileError::circular(id, path));
        }
        if self.stack.len() >= MAX_DEPTH {
            return Err(CompileError::runtime(format!(
                "Maximum resolution depth of {} exceeded while resolving \"{}\".",
                MAX_DEPTH, id
            )));
        }
        self.stack.push(id.to_string());
        Ok(())
    }

    pub(crate) fn leave(&mut self) {
        self.stack.pop();
    }

    pub(crate) fn contains(&self, id: &str) -> bool {
        self.stack.iter().any(|entry| entry == id)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub(crate) fn to_vec(&self) -> Vec<String> {
        self.stack.iter().cloned().collect()
    }
}
