//! Aliasing and state validation for the dummy backend.
//!
//! Tracks which placed resource currently owns each byte range of every
//! heap. A placed resource becomes the owner of its range when an aliasing
//! barrier activates it; any later activation of an overlapping resource
//! evicts it. Using a placed resource that is not the current owner of its
//! memory, or transitioning a resource from a state it is not in, is
//! reported as a validation error.

use std::collections::HashMap;
use std::ops::Range;

use super::memory::DummyResource;
use crate::types::ResourceState;

#[derive(Debug, Clone)]
struct ActiveRange {
    range: Range<u64>,
    resource: u64,
}

#[derive(Debug, Default)]
pub(super) struct Validator {
    active: HashMap<u64, Vec<ActiveRange>>,
    errors: Vec<String>,
}

impl Validator {
    /// Make `resource` the owner of its memory range.
    pub fn activate(&mut self, resource: &DummyResource) {
        let Some((heap, range)) = resource.placement() else {
            return;
        };
        let ranges = self.active.entry(heap).or_default();
        ranges.retain(|active| active.range.end <= range.start || active.range.start >= range.end);
        ranges.push(ActiveRange {
            range,
            resource: resource.id(),
        });
    }

    /// Check that `resource` may be accessed by `command`.
    pub fn check_use(&mut self, resource: &DummyResource, command: &str) {
        let Some((heap, range)) = resource.placement() else {
            return;
        };
        let owned = self.active.get(&heap).is_some_and(|ranges| {
            ranges
                .iter()
                .any(|active| active.resource == resource.id() && active.range == range)
        });
        if !owned {
            self.report(format!(
                "{command}: placed resource {} ({}) used without owning heap {} range {:?}",
                resource.id(),
                resource.descriptor().label().unwrap_or("unlabeled"),
                heap,
                range
            ));
        }
    }

    /// Check that `resource` is in `expected` before `command` runs.
    pub fn check_state(&mut self, resource: &DummyResource, expected: ResourceState, command: &str) {
        let actual = resource.state();
        if actual != expected {
            self.report(format!(
                "{command}: resource {} ({}) is in state {:?}, expected {:?}",
                resource.id(),
                resource.descriptor().label().unwrap_or("unlabeled"),
                actual,
                expected
            ));
        }
    }

    pub fn report(&mut self, message: String) {
        log::error!("DummyBackend validation: {}", message);
        self.errors.push(message);
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn clear_errors(&mut self) {
        self.errors.clear();
    }
}
