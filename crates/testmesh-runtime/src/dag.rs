//! Dependency-respecting execution of a flow's top-level step list, a
//! generalization of the teacher's `ScenarioExecutor::execute_scenario_definition`
//! progress loop (`deps_satisfied` / `executed_steps` / circular-dependency
//! detection) from a flat scenario step list to a DAG of named steps.

use std::collections::HashSet;
use testmesh_domain::Step;
use testmesh_foundation::{Error, Result};

/// Validate that `steps` form a DAG: no duplicate ids, no dependency on an
/// unknown sibling, no cycle. Mirrors the teacher's
/// `RequestChainRegistry::validate_chain` duplicate/cycle checks.
pub fn validate(steps: &[Step]) -> Result<()> {
    let ids: HashSet<&str> = steps.iter().map(|s| s.id.as_str()).collect();
    if ids.len() != steps.len() {
        return Err(Error::config_invalid("duplicate step id in flow definition"));
    }
    for step in steps {
        for dep in &step.depends_on {
            if !ids.contains(dep.as_str()) {
                return Err(Error::config_invalid(format!(
                    "step {} depends on unknown step {dep}",
                    step.id
                )));
            }
        }
    }

    let mut visited = HashSet::new();
    let mut stack = HashSet::new();
    for step in steps {
        if !visited.contains(step.id.as_str()) {
            detect_cycle(step.id.as_str(), steps, &mut visited, &mut stack)?;
        }
    }
    Ok(())
}

fn detect_cycle<'a>(
    id: &'a str,
    steps: &'a [Step],
    visited: &mut HashSet<&'a str>,
    stack: &mut HashSet<&'a str>,
) -> Result<()> {
    visited.insert(id);
    stack.insert(id);
    if let Some(step) = steps.iter().find(|s| s.id == id) {
        for dep in &step.depends_on {
            if stack.contains(dep.as_str()) {
                return Err(Error::config_invalid(format!(
                    "circular dependency involving step {dep}"
                )));
            }
            if !visited.contains(dep.as_str()) {
                detect_cycle(dep.as_str(), steps, visited, stack)?;
            }
        }
    }
    stack.remove(id);
    Ok(())
}

/// Return the next batch of step ids whose dependencies are all in
/// `completed`, excluding ids already in `completed` or `in_flight`.
pub fn ready_steps<'a>(
    steps: &'a [Step],
    completed: &HashSet<String>,
    in_flight: &HashSet<String>,
) -> Vec<&'a Step> {
    steps
        .iter()
        .filter(|s| !completed.contains(&s.id) && !in_flight.contains(&s.id))
        .filter(|s| s.depends_on.iter().all(|d| completed.contains(d)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use testmesh_domain::StepBody;
    use std::collections::BTreeMap;

    fn step(id: &str, deps: &[&str]) -> Step {
        Step {
            id: id.to_string(),
            name: id.to_string(),
            depends_on: deps.iter().map(|s| s.to_string()).collect(),
            when: None,
            body: StepBody::Action {
                action: "log".to_string(),
                params: BTreeMap::new(),
            },
            assert: Vec::new(),
            output: BTreeMap::new(),
            retry: None,
            timeout_ms: None,
        }
    }

    #[test]
    fn detects_cycle() {
        let steps = vec![step("a", &["b"]), step("b", &["a"])];
        assert!(validate(&steps).is_err());
    }

    #[test]
    fn detects_unknown_dependency() {
        let steps = vec![step("a", &["ghost"])];
        assert!(validate(&steps).is_err());
    }

    #[test]
    fn ready_steps_respects_completion() {
        let steps = vec![step("a", &[]), step("b", &["a"])];
        let completed = HashSet::new();
        let in_flight = HashSet::new();
        let ready = ready_steps(&steps, &completed, &in_flight);
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].id, "a");
    }
}
