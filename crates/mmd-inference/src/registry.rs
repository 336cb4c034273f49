//! Indexed kernel slots with a committed value and a scratch trial value.
//!
//! Selection policies try a candidate by writing it to the scratch side of a
//! slot; [`KernelRegistry::restore`] drops the trial so the committed kernel is
//! visible again.

use mmd_core::Kernel;
use std::sync::Arc;

#[derive(Clone, Default)]
struct Slot {
    committed: Option<Arc<dyn Kernel>>,
    scratch: Option<Arc<dyn Kernel>>,
}

/// Ordered collection of kernel slots.
#[derive(Clone, Default)]
pub struct KernelRegistry {
    slots: Vec<Slot>,
}

impl std::fmt::Debug for KernelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<Option<String>> =
            (0..self.slots.len()).map(|i| self.at(i).map(|k| k.name())).collect();
        f.debug_struct("KernelRegistry").field("slots", &names).finish()
    }
}

impl KernelRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `n` unset slots.
    pub fn with_empty_slots(n: usize) -> Self {
        Self { slots: vec![Slot::default(); n] }
    }

    /// Append a committed kernel.
    pub fn push(&mut self, kernel: Arc<dyn Kernel>) {
        self.slots.push(Slot { committed: Some(kernel), scratch: None });
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True if there are no slots.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Kernel visible at `index`: the trial value if set, else the committed one.
    pub fn at(&self, index: usize) -> Option<Arc<dyn Kernel>> {
        let slot = self.slots.get(index)?;
        slot.scratch.clone().or_else(|| slot.committed.clone())
    }

    /// Place `kernel` on the scratch side of slot `index`.
    pub fn trial(&mut self, index: usize, kernel: Arc<dyn Kernel>) {
        if let Some(slot) = self.slots.get_mut(index) {
            slot.scratch = Some(kernel);
        }
    }

    /// Overwrite the committed value of slot `index`.
    pub fn commit(&mut self, index: usize, kernel: Arc<dyn Kernel>) {
        if let Some(slot) = self.slots.get_mut(index) {
            slot.committed = Some(kernel);
        }
    }

    /// Drop any trial value in slot `index`.
    pub fn restore(&mut self, index: usize) {
        if let Some(slot) = self.slots.get_mut(index) {
            slot.scratch = None;
        }
    }

    /// Drop every trial value.
    pub fn restore_all(&mut self) {
        for slot in &mut self.slots {
            slot.scratch = None;
        }
    }

    /// Visible kernels, skipping unset slots.
    pub fn current(&self) -> Vec<Arc<dyn Kernel>> {
        (0..self.slots.len()).filter_map(|i| self.at(i)).collect()
    }
}
