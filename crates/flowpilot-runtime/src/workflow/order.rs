//! Linearization of a workflow step graph.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::warn;

use flowpilot_protocols::workflow::{WorkflowDefinition, WorkflowStep};

/// Build the order in which steps run.
///
/// The walk starts at `first_step_id`, or at every step nothing points to
/// when it is absent. A step's successors are visited before the step is
/// placed at the front of the sequence. Steps on the current path are skipped
/// with a warning, and steps never reached are walked afterwards. Ids that do
/// not name a step are left out.
pub fn build_execution_order(definition: &WorkflowDefinition) -> Vec<String> {
    let mut walk = Traversal::new(definition);

    match definition.first_step_id.as_deref() {
        Some(first) if !first.is_empty() => walk.visit(first),
        _ => {
            let targets: HashSet<&str> = definition
                .steps
                .iter()
                .flat_map(WorkflowStep::successors)
                .collect();
            for step in &definition.steps {
                if !targets.contains(step.id.as_str()) {
                    walk.visit(&step.id);
                }
            }
        }
    }

    for step in &definition.steps {
        walk.visit(&step.id);
    }

    walk.order.into()
}

struct Traversal<'a> {
    steps: HashMap<&'a str, &'a WorkflowStep>,
    visited: HashSet<&'a str>,
    visiting: HashSet<&'a str>,
    order: VecDeque<String>,
}

impl<'a> Traversal<'a> {
    fn new(definition: &'a WorkflowDefinition) -> Self {
        Self {
            steps: definition
                .steps
                .iter()
                .map(|s| (s.id.as_str(), s))
                .collect(),
            visited: HashSet::new(),
            visiting: HashSet::new(),
            order: VecDeque::new(),
        }
    }

    fn visit(&mut self, id: &'a str) {
        if self.visited.contains(id) {
            return;
        }
        if self.visiting.contains(id) {
            warn!(step_id = %id, "Circular dependency detected at step");
            return;
        }
        let Some(step) = self.steps.get(id).copied() else {
            warn!(step_id = %id, "Step referenced but not defined, skipping");
            return;
        };

        self.visiting.insert(id);
        for next in step.successors() {
            self.visit(next);
        }
        self.visiting.remove(id);
        self.visited.insert(id);
        self.order.push_front(id.to_string());
    }
}
