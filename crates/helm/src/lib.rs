//! Helm — resilient task routing and sandboxed execution for model workers.
//!
//! This library assigns each incoming task to the best available worker
//! (a local subprocess or a remote API), executes mutating actions under an
//! automatic snapshot/rollback guarantee, and enforces output quality with a
//! bounded generate-validate-critique loop.
//!
//! # Architecture
//!
//! ```text
//! caller
//!   └─ RoutingEngine.route(task)            strategy chain + ternary tree
//!        └─ CircuitRegistry                 per-worker failure state machine
//!   └─ ExecutionDispatcher.invoke(...)      preconditions + local→cloud fallback
//!        └─ WorkerBackend                   subprocess | HTTP, uniform contract
//!        └─ Sandbox.execute(command)        snapshot → run → rollback
//!   └─ AdversarialLoop.generate_validated   generate → validate → critique
//! ```
//!
//! Routing and circuit state are in-memory and single-process; the only
//! persisted state is the rolling performance history.

#![allow(clippy::uninlined_format_args)]

pub mod adversarial;
pub mod breaker;
pub mod classifier;
pub mod collaborators;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod perf;
pub mod plan;
pub mod router;
pub mod sandbox;
pub mod task;
pub mod ternary;
pub mod validation;
pub mod worker;

// Re-export the surface most callers need.
pub use adversarial::{AdversarialConfig, AdversarialLoop, Critique};
pub use breaker::{CircuitRegistry, CircuitState};
pub use classifier::{Classify, RegexClassifier, TaskCategory, TaskProfile};
pub use collaborators::{
    FileContextProvider, LessonRecord, LessonStore, NoopFileContext, NoopLessonStore,
};
pub use config::EngineConfig;
pub use dispatch::{
    DiskGauge, ExecutionDispatcher, HttpApiBackend, LocalProcessBackend, WorkerBackend,
};
pub use error::{BackendError, EngineError, SandboxError};
pub use perf::{PerformanceLog, PerformanceRecord};
pub use plan::{ExecutionPlan, PlanRunner, PlanStep, StepAction, StepOutcome};
pub use router::{
    ComplexityTreeStrategy, Condition, FallbackStrategy, OverrideStrategy, RouteContext,
    RoutingDecision, RoutingEngine, RoutingStrategy, TreeNode,
};
pub use sandbox::{CommandOutcome, Sandbox, Snapshot, SnapshotMethod};
pub use task::{FunctionCall, TaskRequest, ToolSpec, WorkerReply};
pub use ternary::Ternary;
pub use validation::{
    LayerImportValidator, LayerManifest, PlaceholderValidator, ValidationContext,
    ValidationFailure, ValidationPipeline, Validator,
};
pub use worker::{
    AlwaysAvailable, AvailabilityProbe, WorkerCatalog, WorkerDescriptor, WorkerHealth, WorkerId,
    WorkerKind,
};
