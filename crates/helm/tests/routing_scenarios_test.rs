//! End-to-end routing scenarios: classifier → strategy chain → circuit
//! breaker substitution.

use std::sync::Arc;

use helm::{
    CircuitRegistry, CircuitState, EngineError, RoutingEngine, TaskRequest, WorkerCatalog,
    WorkerId,
};

fn engine_with(registry: Arc<CircuitRegistry>) -> RoutingEngine {
    RoutingEngine::new(WorkerCatalog::builtin(), registry)
}

#[test]
fn syntax_fix_routes_to_fast_worker() {
    let registry = Arc::new(CircuitRegistry::new(3, 60));
    let task = TaskRequest::new("fix syntax error in hello.ts").with_file("hello.ts");
    let decision = engine_with(registry).route(&task).unwrap();
    assert_eq!(decision.worker, WorkerId::GeminiFlash);
    assert!(decision.confidence > 0.9);
}

#[test]
fn long_architecture_prompt_routes_to_top_tier() {
    let registry = Arc::new(CircuitRegistry::new(3, 60));
    let prompt = format!(
        "design a microservices architecture for an order management platform \
         with a clean event-driven pattern {}",
        "covering ingestion, billing, fulfillment, and reporting concerns ".repeat(10)
    );
    let decision = engine_with(registry).route(&TaskRequest::new(prompt)).unwrap();
    assert_eq!(decision.worker, WorkerId::GeminiPro);
}

#[test]
fn three_failures_substitute_configured_fallback() {
    let registry = Arc::new(CircuitRegistry::new(3, 9999));
    for _ in 0..3 {
        registry.record_failure(WorkerId::GeminiFlash);
    }
    let decision = engine_with(registry)
        .route(&TaskRequest::new("fix syntax error in hello.ts"))
        .unwrap();
    assert_eq!(decision.worker, WorkerId::QwenCoder7b);
}

#[test]
fn two_failures_keep_the_worker() {
    let registry = Arc::new(CircuitRegistry::new(3, 9999));
    registry.record_failure(WorkerId::GeminiFlash);
    registry.record_failure(WorkerId::GeminiFlash);
    let decision = engine_with(registry.clone())
        .route(&TaskRequest::new("fix syntax error in hello.ts"))
        .unwrap();
    assert_eq!(decision.worker, WorkerId::GeminiFlash);
    assert_eq!(registry.state(WorkerId::GeminiFlash), CircuitState::Closed);
}

#[test]
fn elapsed_cooldown_probes_half_open_on_next_route() {
    let registry = Arc::new(CircuitRegistry::new(3, 0));
    for _ in 0..3 {
        registry.record_failure(WorkerId::GeminiFlash);
    }
    let decision = engine_with(registry.clone())
        .route(&TaskRequest::new("fix syntax error in hello.ts"))
        .unwrap();
    assert_eq!(decision.worker, WorkerId::GeminiFlash);
    assert_eq!(registry.state(WorkerId::GeminiFlash), CircuitState::HalfOpen);
}

#[test]
fn short_status_prompt_overrides_to_cheapest() {
    let registry = Arc::new(CircuitRegistry::new(3, 60));
    let decision = engine_with(registry)
        .route(&TaskRequest::new("quick health status"))
        .unwrap();
    assert_eq!(decision.worker, WorkerId::GeminiFlash);
    assert!((decision.confidence - 1.0).abs() < 1e-9);
    assert!(decision.reasons[0].contains("override"));
}

#[test]
fn open_circuit_with_no_alternatives_is_an_error() {
    let registry = Arc::new(CircuitRegistry::new(1, 9999));
    // Open every circuit in the catalog.
    for &worker in WorkerId::all() {
        registry.record_failure(worker);
    }
    let result = engine_with(registry).route(&TaskRequest::new("fix syntax error"));
    assert!(matches!(
        result,
        Err(EngineError::CircuitOpen { .. })
    ));
}
