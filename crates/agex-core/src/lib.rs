//! AGEX core library.
//!
//! Dependency-aware execution of tool invocations and sandboxed code on
//! behalf of an automated agent: a step graph, a capability registry with
//! builtin tools, an isolated code sandbox, a recovery controller, and the
//! orchestration loop tying them together.

pub mod artifact;
pub mod config;
pub mod domain;
pub mod metrics;
pub mod obs;
pub mod orchestrator;
pub mod plan;
pub mod planner;
pub mod recovery;
pub mod sandbox;
pub mod telemetry;
pub mod tooling;

pub use artifact::{read_result_artifact, write_result_artifact};
pub use config::{ExecutionMode, ExecutorConfig};
pub use domain::{
    AgexError, ExecutionResult, ExecutionStep, Params, Result, Step, StepId, StepStatus,
    TaskOutcome,
};
pub use orchestrator::{AgenticExecutor, StepCallback, SANDBOX_TOOL};
pub use plan::{ExecutionPlan, PlanError, PlanProgress};
pub use planner::{classify_task, TaskKind, TaskPlanner};
pub use recovery::{
    classify_failure, FailureClass, RecoveryAction, RecoveryController, RecoveryDecision,
    RecoveryPolicy,
};
pub use sandbox::{
    CodeSandbox, Interpreter, SandboxConfig, SandboxError, SandboxResult, SandboxStatus, WrapMode,
};
pub use tooling::{
    Capability, CapabilityRegistry, ParamSpec, ParamType, RegistryError, ShellConfig, ToolResult,
    ToolStatus, ToolsConfig,
};
