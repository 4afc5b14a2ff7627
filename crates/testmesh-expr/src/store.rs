//! The scoped, hierarchical Variable Store (spec §4.1): "a stack of layers,
//! innermost wins".

use std::collections::HashMap;
use std::sync::Arc;
use testmesh_domain::Value;
use testmesh_foundation::BuiltinSource;

/// The named scopes a write must target explicitly (spec §4.1), ordered
/// outermost-first. `LoopFrame` scopes are pushed/popped dynamically on top
/// of this fixed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    WorkspaceEnv,
    FlowInitial,
    ExecutionOverride,
    StepOutput,
    LoopFrame,
}

#[derive(Debug, Clone, Default)]
struct Frame {
    kind: Option<ScopeKind>,
    values: HashMap<String, Value>,
}

/// A layered map from dotted paths to [`Value`]s. `get` walks the scope
/// stack innermost-first; `builtin` (`NOW`, `RANDOM_ID`, `UUID`) is computed
/// lazily per read rather than stored as a frame.
#[derive(Clone)]
pub struct VariableStore {
    builtins: Arc<dyn BuiltinSource>,
    // Fixed scopes in outer-to-inner order, followed by any pushed loop/branch frames.
    frames: Vec<Frame>,
}

impl VariableStore {
    pub fn new(builtins: Arc<dyn BuiltinSource>) -> Self {
        Self {
            builtins,
            frames: vec![
                Frame {
                    kind: Some(ScopeKind::WorkspaceEnv),
                    values: HashMap::new(),
                },
                Frame {
                    kind: Some(ScopeKind::FlowInitial),
                    values: HashMap::new(),
                },
                Frame {
                    kind: Some(ScopeKind::ExecutionOverride),
                    values: HashMap::new(),
                },
                Frame {
                    kind: Some(ScopeKind::StepOutput),
                    values: HashMap::new(),
                },
            ],
        }
    }

    /// Seed a fixed scope's top-level entries in one go (used when creating
    /// the store from a flow's `variables` map, or an execution's overrides).
    pub fn seed(&mut self, scope: ScopeKind, entries: impl IntoIterator<Item = (String, Value)>) {
        if let Some(frame) = self.frames.iter_mut().find(|f| f.kind == Some(scope)) {
            frame.values.extend(entries);
        }
    }

    pub fn set(&mut self, scope: ScopeKind, name: impl Into<String>, value: Value) {
        if let Some(frame) = self.frames.iter_mut().rev().find(|f| f.kind == Some(scope)) {
            frame.values.insert(name.into(), value);
        }
    }

    /// Push a new innermost frame, used entering a `loop_frame`/branch scope
    /// (a `for_each` iteration or a `parallel` branch).
    pub fn push_frame(&mut self) {
        self.frames.push(Frame {
            kind: Some(ScopeKind::LoopFrame),
            values: HashMap::new(),
        });
    }

    pub fn pop_frame(&mut self) {
        if self.frames.last().map(|f| f.kind) == Some(Some(ScopeKind::LoopFrame)) {
            self.frames.pop();
        }
    }

    /// Binds `name` in the current innermost frame — used for a `for_each`
    /// loop's `item_var`.
    pub fn bind_in_current_frame(&mut self, name: impl Into<String>, value: Value) {
        if let Some(frame) = self.frames.last_mut() {
            frame.values.insert(name.into(), value);
        }
    }

    /// An independent copy for a concurrent `parallel`/`for_each` branch
    /// (spec §5: "per-frame copies across parallel branches").
    pub fn fork(&self) -> Self {
        self.clone()
    }

    /// Flatten every frame into one map, innermost-wins, for callers that
    /// need the store's full state (an Execution's final `variables`
    /// snapshot, or a `run_flow` child store's outputs merged into the
    /// caller).
    pub fn snapshot(&self) -> HashMap<String, Value> {
        let mut merged = HashMap::new();
        for frame in &self.frames {
            merged.extend(frame.values.clone());
        }
        merged
    }

    /// Resolve a dotted path (`path.id`, `step_id.output.field`) by walking
    /// the scope stack innermost-first, then navigating into the found
    /// value via [`Value::get_path`]. `builtin.*` paths are computed lazily.
    pub fn get(&self, path: &str) -> Option<Value> {
        let mut segments = path.splitn(2, '.');
        let head = segments.next()?;
        let rest = segments.next();

        if head == "builtin" || head == "NOW" || head == "RANDOM_ID" || head == "UUID" {
            return self.get_builtin(head, rest);
        }

        for frame in self.frames.iter().rev() {
            if let Some(value) = frame.values.get(head) {
                return match rest {
                    Some(rest) => value.get_path(rest).cloned(),
                    None => Some(value.clone()),
                };
            }
        }
        None
    }

    fn get_builtin(&self, head: &str, rest: Option<&str>) -> Option<Value> {
        let name = if head == "builtin" {
            rest?.splitn(2, '.').next()?
        } else {
            head
        };
        let rest_after_name = if head == "builtin" {
            rest?.splitn(2, '.').nth(1)
        } else {
            rest
        };
        let value = match name {
            "NOW" => Value::Str(self.builtins.now().to_rfc3339()),
            "RANDOM_ID" => Value::Str(self.builtins.random_id()),
            "UUID" => Value::Str(self.builtins.uuid()),
            _ => return None,
        };
        match rest_after_name {
            Some(rest) => value.get_path(rest).cloned(),
            None => Some(value),
        }
    }

    pub fn exists(&self, path: &str) -> bool {
        self.get(path).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use testmesh_foundation::SystemClock;

    fn store() -> VariableStore {
        VariableStore::new(Arc::new(SystemClock))
    }

    #[test]
    fn innermost_frame_shadows_outer() {
        let mut s = store();
        s.set(ScopeKind::FlowInitial, "name", Value::Str("outer".into()));
        s.set(
            ScopeKind::ExecutionOverride,
            "name",
            Value::Str("inner".into()),
        );
        assert_eq!(s.get("name").and_then(|v| v.as_str().map(str::to_string)), Some("inner".to_string()));
    }

    #[test]
    fn loop_frame_pops_cleanly() {
        let mut s = store();
        s.set(ScopeKind::FlowInitial, "x", Value::Num(1.0));
        s.push_frame();
        s.bind_in_current_frame("x", Value::Num(2.0));
        assert_eq!(s.get("x").and_then(|v| v.as_f64()), Some(2.0));
        s.pop_frame();
        assert_eq!(s.get("x").and_then(|v| v.as_f64()), Some(1.0));
    }

    #[test]
    fn builtin_random_id_is_fresh_each_read() {
        let s = store();
        let a = s.get("RANDOM_ID");
        let b = s.get("RANDOM_ID");
        assert_ne!(a, b);
    }

    #[test]
    fn nested_path_navigates_into_stored_object() {
        let mut s = store();
        let obj = Value::Object(
            [("field".to_string(), Value::Num(42.0))]
                .into_iter()
                .collect(),
        );
        s.set(ScopeKind::StepOutput, "step1", obj);
        assert_eq!(s.get("step1.field").and_then(|v| v.as_f64()), Some(42.0));
    }

    #[test]
    fn missing_path_returns_none() {
        let s = store();
        assert!(s.get("does.not.exist").is_none());
    }
}
