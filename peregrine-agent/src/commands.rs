//! Handlers for coordinator commands received over the bus.
//!
//! One handler per command topic. Every execute request answers with an
//! execution-complete message, success or failure, so the coordinator
//! never has to infer an outcome from silence. Likewise capture-state
//! always gets a reply, an explicitly empty one when this node holds no
//! context for the code.

use crate::sandbox::Sandbox;
use peregrine_proto::{
    now_millis, topics, CaptureStateCommand, CodePackage, EventBus, ExecuteCommand,
    ExecutionComplete, StateCaptured, StopCommand,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

pub struct CommandContext {
    node_id: String,
    packages: Mutex<HashMap<String, CodePackage>>,
    sandbox: Sandbox,
    bus: Arc<dyn EventBus>,
}

impl CommandContext {
    pub fn new(node_id: String, bus: Arc<dyn EventBus>) -> Self {
        Self {
            node_id: node_id.clone(),
            packages: Mutex::new(HashMap::new()),
            sandbox: Sandbox::new(node_id),
            bus,
        }
    }

    /// Incoming package from a migration. Stored as-is, attached state
    /// included; execution waits for the explicit execute command.
    pub fn on_receive(&self, package: CodePackage) {
        info!(
            code_id = %package.id,
            with_state = package.state.is_some(),
            "received code package"
        );
        self.packages.lock().unwrap().insert(package.id.clone(), package);
    }

    /// Runs a stored package and reports the outcome. An unknown code id
    /// is reported the same way, as a failed execution.
    pub async fn on_execute(&self, cmd: ExecuteCommand) {
        let package = self.packages.lock().unwrap().get(&cmd.code_id).cloned();
        match package {
            Some(pkg) => self.run_and_report(pkg).await,
            None => {
                warn!(code_id = %cmd.code_id, "execute for unknown package");
                self.publish_completion(&cmd.code_id, ExecutionFailure::unknown_package(&cmd.code_id))
                    .await;
            }
        }
    }

    /// Quiesce: the context is dropped so a later capture finds nothing
    /// here. The package itself stays stored.
    pub fn on_stop(&self, cmd: StopCommand) {
        let had_context = self.sandbox.stop(&cmd.code_id);
        info!(code_id = %cmd.code_id, had_context, "stop requested");
    }

    /// State capture for a strong migration. A node without a context
    /// replies with an empty state rather than staying silent.
    pub async fn on_capture_state(&self, cmd: CaptureStateCommand) {
        let state = self.sandbox.get_state(&cmd.code_id).unwrap_or_default();
        info!(
            code_id = %cmd.code_id,
            variables = state.variables.len(),
            "capturing state"
        );
        let msg = StateCaptured {
            node_id: self.node_id.clone(),
            code_id: cmd.code_id,
            variables: state.variables,
            execution_point: state.execution_point,
            output: state.output,
            timestamp: now_millis(),
        };
        self.bus.publish(topics::STATE_CAPTURED, json!(msg)).await;
    }

    /// Fresh upload assigned to this node: store it and run it right
    /// away, no separate execute command follows.
    pub async fn on_code_uploaded(&self, package: CodePackage) {
        info!(code_id = %package.id, name = %package.name, "code uploaded to this node");
        self.packages.lock().unwrap().insert(package.id.clone(), package.clone());
        self.run_and_report(package).await;
    }

    async fn run_and_report(&self, package: CodePackage) {
        let code_id = package.id.clone();
        let outcome = self.sandbox.execute(&package).await;
        info!(
            code_id = %code_id,
            status = outcome.status(),
            elapsed_ms = outcome.execution_time_ms,
            "execution finished"
        );
        let status = outcome.status().to_string();
        let msg = ExecutionComplete {
            node_id: self.node_id.clone(),
            code_id,
            result: outcome.result,
            error: outcome.error,
            console_output: outcome.console_output,
            status,
            timestamp: now_millis(),
        };
        self.bus.publish(topics::EXECUTION_COMPLETE, json!(msg)).await;
    }

    async fn publish_completion(&self, code_id: &str, failure: ExecutionFailure) {
        let msg = ExecutionComplete {
            node_id: self.node_id.clone(),
            code_id: code_id.to_string(),
            result: String::new(),
            error: failure.0,
            console_output: String::new(),
            status: "error".to_string(),
            timestamp: now_millis(),
        };
        self.bus.publish(topics::EXECUTION_COMPLETE, json!(msg)).await;
    }
}

struct ExecutionFailure(String);

impl ExecutionFailure {
    fn unknown_package(code_id: &str) -> Self {
        Self(format!("code package {code_id} not found on this node"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use peregrine_devkit::MockBus;
    use peregrine_proto::CodeState;

    fn context(bus: &MockBus) -> CommandContext {
        CommandContext::new("node-1".into(), Arc::new(bus.clone()))
    }

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
    async fn uploaded_code_runs_immediately_and_reports() {
        let bus = MockBus::new();
        let ctx = context(&bus);
        ctx.on_code_uploaded(package("c1", "let total = 2 + 3; total")).await;

        let reports = bus.find_by_topic(topics::EXECUTION_COMPLETE);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0]["status"], "completed");
        assert_eq!(reports[0]["result"], "5");
        assert_eq!(reports[0]["nodeId"], "node-1");
    }

    #[tokio::test]
    async fn execute_unknown_package_reports_error() {
        let bus = MockBus::new();
        let ctx = context(&bus);
        ctx.on_execute(ExecuteCommand { code_id: "ghost".into() }).await;

        let reports = bus.find_by_topic(topics::EXECUTION_COMPLETE);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0]["status"], "error");
        assert!(reports[0]["error"].as_str().unwrap().contains("ghost"));
    }

    #[tokio::test]
    async fn received_package_with_state_resumes_on_execute() {
        let bus = MockBus::new();
        let ctx = context(&bus);
        let mut pkg = package("c1", "counter += 1; counter");
        pkg.state = Some(CodeState {
            variables: HashMap::from([("counter".to_string(), json!(9))]),
            execution_point: 0,
            output: String::new(),
        });

        ctx.on_receive(pkg);
        ctx.on_execute(ExecuteCommand { code_id: "c1".into() }).await;

        let reports = bus.find_by_topic(topics::EXECUTION_COMPLETE);
        assert_eq!(reports[0]["result"], "10");
    }

    #[tokio::test]
    async fn capture_without_context_replies_empty() {
        let bus = MockBus::new();
        let ctx = context(&bus);
        ctx.on_capture_state(CaptureStateCommand { code_id: "c1".into() }).await;

        let replies = bus.find_by_topic(topics::STATE_CAPTURED);
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0]["codeId"], "c1");
        assert_eq!(replies[0]["variables"], json!({}));
    }

    #[tokio::test]
    async fn capture_after_run_carries_variables() {
        let bus = MockBus::new();
        let ctx = context(&bus);
        ctx.on_code_uploaded(package("c1", "let counter = 7;")).await;
        ctx.on_capture_state(CaptureStateCommand { code_id: "c1".into() }).await;

        let replies = bus.find_by_topic(topics::STATE_CAPTURED);
        assert_eq!(replies[0]["variables"]["counter"], 7);
        assert_eq!(replies[0]["nodeId"], "node-1");
    }

    #[tokio::test]
    async fn stop_then_capture_finds_nothing() {
        let bus = MockBus::new();
        let ctx = context(&bus);
        ctx.on_code_uploaded(package("c1", "let counter = 7;")).await;
        ctx.on_stop(StopCommand { code_id: "c1".into() });
        ctx.on_capture_state(CaptureStateCommand { code_id: "c1".into() }).await;

        let replies = bus.find_by_topic(topics::STATE_CAPTURED);
        assert_eq!(replies[0]["variables"], json!({}));
    }
}
