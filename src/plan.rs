//! Execution planning
//!
//! Turns a declared step list into a topologically ordered plan. Edges come
//! from explicit `dependsOn` declarations; a step that declares none is
//! chained to the step immediately before it in the list, so the
//! author-visible sequence survives while explicit dependencies allow
//! fan-out. The order is stable: among unconstrained steps the declared
//! order wins.

use crate::error::{EngineError, EngineResult};
use crate::hook::Step;
use std::collections::HashMap;

/// Topologically ordered steps of one pipeline
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub steps: Vec<Step>,
}

impl ExecutionPlan {
    /// Plan a pipeline's declared step list
    pub fn from_steps(declared: &[Step]) -> EngineResult<Self> {
        let mut index_of: HashMap<&str, usize> = HashMap::new();
        for (i, step) in declared.iter().enumerate() {
            if index_of.insert(step.id.as_str(), i).is_some() {
                return Err(EngineError::InvalidPlan(format!(
                    "duplicate step id {}",
                    step.id
                )));
            }
        }

        // predecessors[i] = indices that must run before step i
        let mut predecessors: Vec<Vec<usize>> = vec![Vec::new(); declared.len()];
        for (i, step) in declared.iter().enumerate() {
            if step.depends_on.is_empty() {
                if i > 0 {
                    predecessors[i].push(i - 1);
                }
            } else {
                for dep in &step.depends_on {
                    let &dep_index = index_of.get(dep.as_str()).ok_or_else(|| {
                        EngineError::InvalidPlan(format!(
                            "step {} depends on unknown step {}",
                            step.id, dep
                        ))
                    })?;
                    if dep_index == i {
                        return Err(EngineError::InvalidPlan(format!(
                            "step {} depends on itself",
                            step.id
                        )));
                    }
                    predecessors[i].push(dep_index);
                }
            }
        }

        let mut indegree: Vec<usize> = predecessors.iter().map(Vec::len).collect();
        let mut successors: Vec<Vec<usize>> = vec![Vec::new(); declared.len()];
        for (i, preds) in predecessors.iter().enumerate() {
            for &p in preds {
                successors[p].push(i);
            }
        }

        // Kahn's algorithm; the ready set is drained in ascending declared
        // index, which keeps sibling order stable
        let mut ready: Vec<usize> = indegree
            .iter()
            .enumerate()
            .filter(|(_, &d)| d == 0)
            .map(|(i, _)| i)
            .collect();
        let mut order = Vec::with_capacity(declared.len());
        while !ready.is_empty() {
            ready.sort_unstable();
            let next = ready.remove(0);
            order.push(next);
            for &succ in &successors[next] {
                indegree[succ] -= 1;
                if indegree[succ] == 0 {
                    ready.push(succ);
                }
            }
        }

        if order.len() != declared.len() {
            let stuck: Vec<&str> = indegree
                .iter()
                .enumerate()
                .filter(|(_, &d)| d > 0)
                .map(|(i, _)| declared[i].id.as_str())
                .collect();
            return Err(EngineError::InvalidPlan(format!(
                "dependency cycle involving steps: {}",
                stuck.join(", ")
            )));
        }

        Ok(Self {
            steps: order.into_iter().map(|i| declared[i].clone()).collect(),
        })
    }
}
