//! Dependency resolution — turns a step list into an execution order.
//!
//! Rules enforced:
//! 1. Step IDs must be unique within the pipeline.
//! 2. Every step comes after all of its dependencies.
//! 3. The dependency graph must be acyclic.
//!
//! A dependency on an ID that is not in the step list is ignored: it names
//! work done outside the pipeline and counts as already satisfied.
//!
//! Ordering is a post-order depth-first walk in declaration order, so steps
//! with no dependency relationship keep their declared order.

use std::collections::{HashMap, HashSet};

use crate::{models::Step, EngineError};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    /// On the current DFS path.
    Visiting,
    /// Already appended to the output.
    Done,
}

struct Walk<'a> {
    index: HashMap<&'a str, &'a Step>,
    marks: HashMap<&'a str, Mark>,
    path: Vec<&'a str>,
    order: Vec<String>,
}

impl<'a> Walk<'a> {
    fn visit(&mut self, id: &'a str) -> Result<(), EngineError> {
        match self.marks.get(id) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                let start = self.path.iter().position(|p| *p == id).unwrap_or(0);
                let mut cycle: Vec<String> =
                    self.path[start..].iter().map(|s| (*s).to_owned()).collect();
                cycle.push(id.to_owned());
                return Err(EngineError::CyclicDependency { cycle });
            }
            None => {}
        }

        let Some(step) = self.index.get(id).copied() else {
            return Ok(());
        };

        self.marks.insert(id, Mark::Visiting);
        self.path.push(id);

        for dep in &step.dependencies {
            if self.index.contains_key(dep.as_str()) {
                self.visit(dep.as_str())?;
            }
        }

        self.path.pop();
        self.marks.insert(id, Mark::Done);
        self.order.push(id.to_owned());
        Ok(())
    }
}

/// Return step IDs in an order where every dependency precedes its dependents.
///
/// # Errors
/// - [`EngineError::DuplicateStepId`] if two steps share an ID.
/// - [`EngineError::CyclicDependency`] if the dependency graph has a cycle.
pub fn resolve_order(steps: &[Step]) -> Result<Vec<String>, EngineError> {
    let mut seen_ids: HashSet<&str> = HashSet::new();
    for step in steps {
        if !seen_ids.insert(step.id.as_str()) {
            return Err(EngineError::DuplicateStepId(step.id.clone()));
        }
    }

    let mut walk = Walk {
        index: steps.iter().map(|s| (s.id.as_str(), s)).collect(),
        marks: HashMap::new(),
        path: Vec::new(),
        order: Vec::with_capacity(steps.len()),
    };

    for step in steps {
        walk.visit(step.id.as_str())?;
    }

    Ok(walk.order)
}
