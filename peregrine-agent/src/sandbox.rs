//! Script execution sandbox backed by the Rhai interpreter.
//!
//! Each run gets a fresh engine and scope seeded with three bindings:
//! `nodeId` (this worker's id), `output` (an array scripts append
//! progress lines to) and `data` (a scratch map). A migrated script
//! arriving with captured state is instead re-run from the top with its
//! saved variables pre-loaded into scope.
//!
//! After a successful run the final scope is snapshotted into an
//! execution context keyed by code id. Only JSON-representable values
//! (strings, numbers, booleans, arrays, maps) survive the snapshot;
//! anything else is dropped silently. A failed run stores no context at
//! all, so a later capture finds nothing rather than a half-written
//! state.

use peregrine_proto::{CodePackage, CodeState};
use rhai::{Dynamic, Engine, Scope};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Scope bindings injected by the sandbox, excluded from state capture.
const NODE_ID_BINDING: &str = "nodeId";

/// Outcome of a single script run. `status` on the wire is derived from
/// `error`: empty means completed.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub result: String,
    pub error: String,
    pub console_output: String,
    pub execution_time_ms: u64,
}

impl ExecutionOutcome {
    pub fn status(&self) -> &'static str {
        if self.error.is_empty() {
            "completed"
        } else {
            "error"
        }
    }
}

/// Variable snapshot kept after a successful run, the source material for
/// strong-mobility captures.
#[derive(Debug, Clone, Default)]
struct ExecutionContext {
    variables: HashMap<String, Value>,
    output: String,
}

pub struct Sandbox {
    node_id: String,
    contexts: Arc<Mutex<HashMap<String, ExecutionContext>>>,
}

impl Sandbox {
    pub fn new(node_id: String) -> Self {
        Self { node_id, contexts: Arc::new(Mutex::new(HashMap::new())) }
    }

    /// Run a package's script to completion on a blocking thread. Uses
    /// the package's attached state when present (strong migration),
    /// otherwise starts from the standard bindings.
    pub async fn execute(&self, package: &CodePackage) -> ExecutionOutcome {
        let node_id = self.node_id.clone();
        let code = package.code.clone();
        let state = package.state.clone();
        let code_id = package.id.clone();
        let with_state = state.is_some();

        info!(code_id = %code_id, with_state, "executing script");

        let run = tokio::task::spawn_blocking(move || run_script(&node_id, &code, state)).await;

        match run {
            Ok((outcome, variables)) => {
                if outcome.error.is_empty() {
                    self.contexts.lock().unwrap().insert(
                        code_id.clone(),
                        ExecutionContext {
                            variables,
                            output: outcome.console_output.clone(),
                        },
                    );
                    debug!(code_id = %code_id, "execution context stored");
                } else {
                    warn!(code_id = %code_id, error = %outcome.error, "script failed, no context stored");
                }
                outcome
            }
            Err(e) => ExecutionOutcome {
                result: String::new(),
                error: format!("execution task panicked: {e}"),
                console_output: String::new(),
                execution_time_ms: 0,
            },
        }
    }

    /// Snapshot of the last successful run for a code id, if any.
    /// `execution_point` is always 0: resumption re-runs the whole script
    /// with variables pre-loaded, there is no instruction-level restart.
    pub fn get_state(&self, code_id: &str) -> Option<CodeState> {
        self.contexts.lock().unwrap().get(code_id).map(|ctx| CodeState {
            variables: ctx.variables.clone(),
            execution_point: 0,
            output: ctx.output.clone(),
        })
    }

    /// Forgets the context for a code id. An in-flight run is not
    /// interrupted; its context will simply never be stored under a
    /// tracked id again... unless it finishes after this call, in which
    /// case the stale context is overwritten harmlessly on next receive.
    pub fn stop(&self, code_id: &str) -> bool {
        self.contexts.lock().unwrap().remove(code_id).is_some()
    }
}

/// Blocking body: engine and scope never leave this thread.
fn run_script(
    node_id: &str,
    code: &str,
    state: Option<CodeState>,
) -> (ExecutionOutcome, HashMap<String, Value>) {
    let console: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

    let mut engine = Engine::new();
    let sink = console.clone();
    engine.on_print(move |line| {
        sink.lock().unwrap().push(line.to_string());
    });
    let sink = console.clone();
    engine.on_debug(move |line, _, _| {
        sink.lock().unwrap().push(line.to_string());
    });

    let mut scope = Scope::new();
    scope.push(NODE_ID_BINDING, node_id.to_string());

    match state {
        // Strong resumption: saved variables pre-loaded, script re-runs
        // from the top and finds them in scope.
        Some(saved) => {
            for (name, value) in saved.variables {
                // the platform binding always wins over a wire-supplied one
                if name == NODE_ID_BINDING {
                    continue;
                }
                match rhai::serde::to_dynamic(&value) {
                    Ok(d) => {
                        scope.push_dynamic(name, d);
                    }
                    Err(e) => warn!(variable = %name, "state variable not restorable: {e}"),
                }
            }
            // Standard bindings only when the snapshot did not carry them
            if !scope.contains("output") {
                scope.push("output", rhai::Array::new());
            }
            if !scope.contains("data") {
                scope.push("data", rhai::Map::new());
            }
        }
        None => {
            scope.push("output", rhai::Array::new());
            scope.push("data", rhai::Map::new());
        }
    }

    let started = std::time::Instant::now();
    let eval = engine.eval_with_scope::<Dynamic>(&mut scope, code);
    let execution_time_ms = started.elapsed().as_millis() as u64;
    let console_output = console.lock().unwrap().join("\n");

    match eval {
        Ok(value) => {
            let result = if value.is_unit() { String::new() } else { value.to_string() };
            let variables = snapshot_scope(&scope);
            (
                ExecutionOutcome {
                    result,
                    error: String::new(),
                    console_output,
                    execution_time_ms,
                },
                variables,
            )
        }
        Err(e) => (
            ExecutionOutcome {
                result: String::new(),
                error: e.to_string(),
                console_output,
                execution_time_ms,
            },
            HashMap::new(),
        ),
    }
}

/// Converts every scope variable to JSON, dropping the injected node id
/// and anything not representable (functions, opaque types).
fn snapshot_scope(scope: &Scope) -> HashMap<String, Value> {
    scope
        .iter()
        .filter(|(name, _, _)| *name != NODE_ID_BINDING)
        .filter_map(|(name, _, value)| {
            rhai::serde::from_dynamic::<Value>(&value).ok().map(|v| (name.to_string(), v))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn package(id: &str, code: &str) -> CodePackage {
        CodePackage {
            id: id.into(),
            name: "test".into(),
            code: code.into(),
            entry_point: "run".into(),
            current_node_id: Some("node-1".into()),
            state: None,
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn successful_run_stores_context() {
        let sandbox = Sandbox::new("node-1".into());
        let outcome = sandbox
            .execute(&package("c1", "let counter = 40 + 2; print(`counter=${counter}`); counter"))
            .await;

        assert_eq!(outcome.status(), "completed");
        assert_eq!(outcome.result, "42");
        assert_eq!(outcome.console_output, "counter=42");

        let state = sandbox.get_state("c1").unwrap();
        assert_eq!(state.variables["counter"], 42);
        assert_eq!(state.execution_point, 0);
    }

    #[tokio::test]
    async fn node_id_is_visible_but_never_captured() {
        let sandbox = Sandbox::new("node-7".into());
        let outcome = sandbox.execute(&package("c1", "let who = nodeId; who")).await;

        assert_eq!(outcome.result, "node-7");
        let state = sandbox.get_state("c1").unwrap();
        assert_eq!(state.variables["who"], "node-7");
        assert!(!state.variables.contains_key("nodeId"));
    }

    #[tokio::test]
    async fn failed_run_stores_no_context() {
        let sandbox = Sandbox::new("node-1".into());
        let outcome = sandbox.execute(&package("c1", "let x = ; broken")).await;

        assert_eq!(outcome.status(), "error");
        assert!(!outcome.error.is_empty());
        assert!(sandbox.get_state("c1").is_none());
    }

    #[tokio::test]
    async fn resumption_preloads_saved_variables() {
        let sandbox = Sandbox::new("node-2".into());
        let mut pkg = package("c1", "counter += 10; counter");
        pkg.state = Some(CodeState {
            variables: HashMap::from([("counter".to_string(), serde_json::json!(32))]),
            execution_point: 0,
            output: String::new(),
        });

        let outcome = sandbox.execute(&pkg).await;
        assert_eq!(outcome.status(), "completed");
        assert_eq!(outcome.result, "42");
        assert_eq!(sandbox.get_state("c1").unwrap().variables["counter"], 42);
    }

    #[tokio::test]
    async fn restored_state_cannot_override_node_id() {
        let sandbox = Sandbox::new("node-2".into());
        let mut pkg = package("c1", "nodeId");
        pkg.state = Some(CodeState {
            variables: HashMap::from([("nodeId".to_string(), serde_json::json!("node-9"))]),
            execution_point: 0,
            output: String::new(),
        });

        let outcome = sandbox.execute(&pkg).await;
        assert_eq!(outcome.result, "node-2");
    }

    #[tokio::test]
    async fn output_array_survives_the_snapshot() {
        let sandbox = Sandbox::new("node-1".into());
        sandbox
            .execute(&package("c1", r#"output.push("step 1"); output.push("step 2");"#))
            .await;

        let state = sandbox.get_state("c1").unwrap();
        assert_eq!(state.variables["output"], serde_json::json!(["step 1", "step 2"]));
    }

    #[tokio::test]
    async fn stop_forgets_the_context() {
        let sandbox = Sandbox::new("node-1".into());
        sandbox.execute(&package("c1", "let x = 1;")).await;
        assert!(sandbox.stop("c1"));
        assert!(sandbox.get_state("c1").is_none());
        // stopping again is a no-op
        assert!(!sandbox.stop("c1"));
    }
}
