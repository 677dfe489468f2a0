//! The execution pipeline.

use forge_admission::{AdmissionController, AdmissionError};
use forge_audit::AuditLedger;
use forge_catalog::{verify_tool_digest, CapabilityCatalog};
use forge_gates::{GateEvaluator, GateManifest, GateSubject};
use forge_policy::PolicyEngine;
use forge_types::{
    AuditEvent, AuditStage, CapabilitySpec, CoreError, CorrelationId, Envelope, ExecutionContext,
    GateId, OperationId, SimulationCheck, StepKind, StepStatus, Workflow, WorkflowState,
    WorkflowStep,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::adapter::ToolAdapter;
use crate::run::{RunRegistry, RunShared, RunStatus};

#[derive(Clone)]
pub struct ExecutorConfig {
    /// Per-attempt ceiling for invoke steps without their own timeout
    pub default_step_timeout: Duration,
    pub gate_manifest: GateManifest,
    /// Verify tool content digests before admitting an operation
    pub verify_tool_digests: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            default_step_timeout: Duration::from_secs(60),
            gate_manifest: GateManifest::default(),
            verify_tool_digests: true,
        }
    }
}

/// A failure on its way to an error envelope.
struct Failure {
    error: CoreError,
    details: Value,
}

impl Failure {
    fn new(error: CoreError) -> Self {
        Self {
            error,
            details: Value::Null,
        }
    }

    fn with_details(error: CoreError, details: Value) -> Self {
        Self { error, details }
    }

    fn state(&self) -> WorkflowState {
        match self.error {
            CoreError::Cancelled => WorkflowState::Cancelled,
            _ => WorkflowState::Failed,
        }
    }
}

impl From<CoreError> for Failure {
    fn from(error: CoreError) -> Self {
        Self::new(error)
    }
}

enum StepEnd {
    Completed(Value),
    /// Step failed but its policy was `continue`
    ContinuedAfterFailure,
    Abort(String),
    Cancelled,
}

pub struct WorkflowExecutor {
    catalog: Arc<CapabilityCatalog>,
    admission: Arc<AdmissionController>,
    ledger: Arc<AuditLedger>,
    adapter: Arc<dyn ToolAdapter>,
    runs: RunRegistry,
    config: ExecutorConfig,
}

impl WorkflowExecutor {
    pub fn new(
        catalog: Arc<CapabilityCatalog>,
        admission: Arc<AdmissionController>,
        ledger: Arc<AuditLedger>,
        adapter: Arc<dyn ToolAdapter>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            catalog,
            admission,
            ledger,
            adapter,
            runs: RunRegistry::default(),
            config,
        }
    }

    /// Run a workflow end to end and wrap the outcome in an envelope.
    pub async fn execute(
        &self,
        workflow: &Workflow,
        ctx: &ExecutionContext,
        correlation: Option<CorrelationId>,
    ) -> Envelope {
        let operation = OperationId::generate();
        let started = Instant::now();

        let mut envelope = match self.run(&operation, workflow, ctx).await {
            Ok(data) => Envelope::success(operation, data),
            Err(failure) => {
                warn!(
                    capability = %workflow.capability,
                    code = %failure.error.code(),
                    "operation did not complete"
                );
                Envelope::failure(operation, failure.state(), &failure.error)
                    .with_error_details(failure.details)
            }
        };

        envelope = envelope
            .with_capability(workflow.capability.as_str())
            .with_duration_ms(started.elapsed().as_millis() as u64);
        if let Some(correlation) = correlation {
            envelope = envelope.with_correlation(correlation);
        }
        envelope
    }

    /// Dry-run the admission-independent checks: resolution, policy, gates.
    /// No slot is taken, no audit records are written, no tool is invoked.
    pub fn simulate(&self, workflow: &Workflow, ctx: &ExecutionContext) -> Envelope {
        let operation = OperationId::generate();
        let snapshot = self.catalog.snapshot();

        let spec = match snapshot.resolve(&workflow.capability) {
            Ok(spec) => spec.clone(),
            Err(_) => {
                let error = CoreError::UnknownCapability(workflow.capability.to_string());
                return Envelope::failure(operation, WorkflowState::Failed, &error)
                    .with_capability(workflow.capability.as_str());
            }
        };

        let mut checks = vec![SimulationCheck::new("capability_resolution", true)];

        let engine = PolicyEngine::new(snapshot.policy_rules().to_vec(), snapshot.policy_default());
        let decision = engine.evaluate(ctx.role, &spec);
        checks.push(SimulationCheck::new("policy", decision.allowed).with_detail(&decision.reason));

        let required = required_gates(workflow, &spec);
        let evaluator = GateEvaluator::new(Arc::clone(&snapshot), self.config.gate_manifest.clone());
        let subject = GateSubject {
            capability: spec.id.clone(),
            tool: spec.required_tool.clone(),
        };
        let report = evaluator.evaluate(&required, &subject, ctx);
        for check in &report.results {
            let mut sim = SimulationCheck::new(check.gate.as_str(), check.passed);
            if let Some(detail) = &check.detail {
                sim = sim.with_detail(detail);
            }
            checks.push(sim);
        }

        let would_succeed = decision.allowed && report.all_passed;
        Envelope::success(
            operation,
            json!({"would_succeed": would_succeed, "checks": checks}),
        )
        .with_capability(workflow.capability.as_str())
    }

    /// Progress of an in-flight run.
    pub fn status(&self, operation: &OperationId) -> Option<RunStatus> {
        self.runs.get(operation).map(|run| run.status())
    }

    /// Deliver the input a prompt step is waiting on. Returns false if the
    /// operation is not in flight.
    pub fn provide_input(
        &self,
        operation: &OperationId,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> bool {
        let Some(run) = self.runs.get(operation) else {
            return false;
        };
        run.lock().inputs.insert(key.into(), value.into());
        // notify_one leaves a permit behind, so an input that lands just
        // before the run suspends is never lost
        run.notify.notify_one();
        true
    }

    /// Request cancellation. Takes effect between steps, or immediately if
    /// the run is suspended waiting for user input.
    pub fn cancel(&self, operation: &OperationId) -> bool {
        let Some(run) = self.runs.get(operation) else {
            return false;
        };
        run.lock().cancel_requested = true;
        run.notify.notify_one();
        true
    }

    async fn run(
        &self,
        operation: &OperationId,
        workflow: &Workflow,
        ctx: &ExecutionContext,
    ) -> Result<Value, Failure> {
        validate(workflow, ctx)?;

        let snapshot = self.catalog.snapshot();
        let spec = snapshot
            .resolve(&workflow.capability)
            .map_err(|e| CoreError::UnknownCapability(e.to_string()))?
            .clone();
        let shadow = spec.risk.shadow_logged();

        let engine = PolicyEngine::new(snapshot.policy_rules().to_vec(), snapshot.policy_default());
        let decision = engine.evaluate(ctx.role, &spec);
        if !decision.allowed {
            self.audit(
                self.event(AuditStage::OperationFailed, operation, ctx, &spec)
                    .with_detail(json!({"denied_by": "policy", "reason": decision.reason})),
                shadow,
            )?;
            return Err(Failure::with_details(
                CoreError::PolicyDenied(decision.reason.clone()),
                json!({"matched_rule": decision.matched_rule, "requirements": decision.requirements}),
            ));
        }

        let required = required_gates(workflow, &spec);
        let evaluator = GateEvaluator::new(Arc::clone(&snapshot), self.config.gate_manifest.clone());
        let subject = GateSubject {
            capability: spec.id.clone(),
            tool: spec.required_tool.clone(),
        };
        let report = evaluator.evaluate(&required, &subject, ctx);
        if !report.all_passed {
            let reason = report
                .blocked_reason
                .clone()
                .unwrap_or_else(|| "required gates unsatisfied".to_string());
            self.audit(
                self.event(AuditStage::OperationFailed, operation, ctx, &spec)
                    .with_detail(json!({"denied_by": "gates", "reason": reason})),
                shadow,
            )?;
            let details = serde_json::to_value(&report).unwrap_or(Value::Null);
            return Err(Failure::with_details(CoreError::GateFailed(reason), details));
        }

        if self.config.verify_tool_digests {
            if let Ok(tool) = snapshot.tool(&spec.required_tool) {
                verify_tool_digest(tool).map_err(|e| CoreError::Integrity(e.to_string()))?;
            }
        }

        self.admission
            .acquire(operation, spec.category.as_str())
            .await
            .map_err(|e| match e {
                AdmissionError::BacklogFull => CoreError::ResourceExhausted(e.to_string()),
                AdmissionError::QueueClosed => CoreError::Internal(e.to_string()),
            })?;

        let shared = RunShared::new(
            operation.clone(),
            workflow
                .steps
                .iter()
                .map(|s| forge_types::StepRecord::pending(&s.id))
                .collect(),
        );
        shared.lock().inputs = ctx.prompt_inputs.clone();
        self.runs.register(Arc::clone(&shared));

        let result = self
            .run_steps(operation, workflow, &spec, ctx, &shared, shadow)
            .await;

        self.admission.release(operation);
        self.runs.remove(operation);
        result
    }

    async fn run_steps(
        &self,
        operation: &OperationId,
        workflow: &Workflow,
        spec: &CapabilitySpec,
        ctx: &ExecutionContext,
        shared: &Arc<RunShared>,
        shadow: bool,
    ) -> Result<Value, Failure> {
        self.audit(
            self.event(AuditStage::OperationStarted, operation, ctx, spec)
                .with_detail(json!({"workflow": workflow.id, "risk": spec.risk})),
            shadow,
        )?;
        self.audit(
            self.event(AuditStage::PolicyEvaluated, operation, ctx, spec)
                .with_detail(json!({"allowed": true})),
            shadow,
        )?;
        self.audit(
            self.event(AuditStage::GatesEvaluated, operation, ctx, spec)
                .with_detail(json!({"all_passed": true})),
            shadow,
        )?;
        shared.lock().state = WorkflowState::Running;
        info!(operation = %operation.short(), capability = %spec.id, "operation started");

        let mut outputs = serde_json::Map::new();
        for (index, step) in workflow.steps.iter().enumerate() {
            if shared.lock().cancel_requested {
                return self.cancelled(operation, ctx, spec, shared, shadow);
            }

            match self.run_step(operation, step, index, spec, ctx, shared, shadow).await? {
                StepEnd::Completed(value) => {
                    if !value.is_null() {
                        outputs.insert(step.id.clone(), value);
                    }
                }
                StepEnd::ContinuedAfterFailure => {}
                StepEnd::Cancelled => {
                    return self.cancelled(operation, ctx, spec, shared, shadow);
                }
                StepEnd::Abort(error) => {
                    self.skip_remaining(operation, workflow, index + 1, ctx, spec, shared, shadow)?;
                    shared.lock().state = WorkflowState::Failed;
                    self.audit(
                        self.event(AuditStage::OperationFailed, operation, ctx, spec)
                            .with_step(&step.id)
                            .with_detail(json!({"error": error})),
                        shadow,
                    )?;
                    return Err(Failure::new(CoreError::ToolExecution(error)));
                }
            }
        }

        shared.lock().state = WorkflowState::Completed;
        self.audit(
            self.event(AuditStage::OperationCompleted, operation, ctx, spec),
            shadow,
        )?;
        info!(operation = %operation.short(), capability = %spec.id, "operation completed");

        let steps = shared.status().steps;
        Ok(json!({"steps": steps, "outputs": Value::Object(outputs)}))
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_step(
        &self,
        operation: &OperationId,
        step: &WorkflowStep,
        index: usize,
        spec: &CapabilitySpec,
        ctx: &ExecutionContext,
        shared: &Arc<RunShared>,
        shadow: bool,
    ) -> Result<StepEnd, Failure> {
        match &step.kind {
            StepKind::Wait { duration } => {
                self.step_started(operation, step, index, 1, ctx, spec, shared, shadow)?;
                tokio::time::sleep(*duration).await;
                self.step_completed(operation, step, index, ctx, spec, shared, shadow)?;
                Ok(StepEnd::Completed(Value::Null))
            }
            StepKind::Prompt { key, message } => {
                self.run_prompt(operation, step, index, key, message, ctx, spec, shared, shadow)
                    .await
            }
            StepKind::Invoke { capability, params } => {
                self.run_invoke(operation, step, index, capability, params, ctx, spec, shared, shadow)
                    .await
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_invoke(
        &self,
        operation: &OperationId,
        step: &WorkflowStep,
        index: usize,
        capability: &forge_types::CapabilityId,
        params: &Value,
        ctx: &ExecutionContext,
        spec: &CapabilitySpec,
        shared: &Arc<RunShared>,
        shadow: bool,
    ) -> Result<StepEnd, Failure> {
        let (max_attempts, delay) = match step.on_failure {
            forge_types::FailurePolicy::Retry { attempts, delay } => (1 + attempts, delay),
            _ => (1, None),
        };
        let base_timeout = step.timeout.unwrap_or(self.config.default_step_timeout);

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            if attempt > 1 {
                self.audit(
                    self.event(AuditStage::StepRetried, operation, ctx, spec)
                        .with_step(&step.id)
                        .with_detail(json!({"attempt": attempt})),
                    shadow,
                )?;
            }
            self.step_started(operation, step, index, attempt, ctx, spec, shared, shadow)?;

            let timeout = self.admission.adjusted_timeout(base_timeout);
            let outcome = match tokio::time::timeout(timeout, self.adapter.invoke(capability, params))
                .await
            {
                Err(_) => Err(format!("timed out after {}ms", timeout.as_millis())),
                Ok(Err(e)) => Err(e.to_string()),
                Ok(Ok(value)) => Ok(value),
            };

            match outcome {
                Ok(value) => {
                    self.step_completed(operation, step, index, ctx, spec, shared, shadow)?;
                    return Ok(StepEnd::Completed(value));
                }
                Err(error) => {
                    self.audit(
                        self.event(AuditStage::StepFailed, operation, ctx, spec)
                            .with_step(&step.id)
                            .with_detail(json!({"attempt": attempt, "error": error})),
                        shadow,
                    )?;
                    if attempt < max_attempts {
                        if let Some(delay) = delay {
                            tokio::time::sleep(delay).await;
                        }
                        continue;
                    }
                    {
                        let mut inner = shared.lock();
                        let record = &mut inner.steps[index];
                        record.status = StepStatus::Failed;
                        record.error = Some(error.clone());
                    }
                    return match step.on_failure {
                        forge_types::FailurePolicy::Continue => Ok(StepEnd::ContinuedAfterFailure),
                        _ => Ok(StepEnd::Abort(error)),
                    };
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_prompt(
        &self,
        operation: &OperationId,
        step: &WorkflowStep,
        index: usize,
        key: &str,
        message: &str,
        ctx: &ExecutionContext,
        spec: &CapabilitySpec,
        shared: &Arc<RunShared>,
        shadow: bool,
    ) -> Result<StepEnd, Failure> {
        self.step_started(operation, step, index, 1, ctx, spec, shared, shadow)?;

        let mut requested = false;
        loop {
            {
                let mut inner = shared.lock();
                if inner.cancel_requested {
                    inner.pending_prompt = None;
                    return Ok(StepEnd::Cancelled);
                }
                if let Some(value) = inner.inputs.get(key).cloned() {
                    inner.pending_prompt = None;
                    inner.state = WorkflowState::Running;
                    drop(inner);
                    self.audit(
                        self.event(AuditStage::PromptAnswered, operation, ctx, spec)
                            .with_step(&step.id)
                            .with_detail(json!({"key": key})),
                        shadow,
                    )?;
                    self.step_completed(operation, step, index, ctx, spec, shared, shadow)?;
                    return Ok(StepEnd::Completed(json!({ key: value })));
                }
                inner.pending_prompt = Some(key.to_string());
                inner.state = WorkflowState::WaitingForUser;
            }
            if !requested {
                requested = true;
                self.audit(
                    self.event(AuditStage::PromptRequested, operation, ctx, spec)
                        .with_step(&step.id)
                        .with_detail(json!({"key": key, "message": message})),
                    shadow,
                )?;
            }
            // Indefinite suspension; only input or cancellation resumes it
            shared.notify.notified().await;
        }
    }

    fn cancelled(
        &self,
        operation: &OperationId,
        ctx: &ExecutionContext,
        spec: &CapabilitySpec,
        shared: &Arc<RunShared>,
        shadow: bool,
    ) -> Result<Value, Failure> {
        shared.lock().state = WorkflowState::Cancelled;
        self.audit(
            self.event(AuditStage::OperationCancelled, operation, ctx, spec),
            shadow,
        )?;
        info!(operation = %operation.short(), "operation cancelled");
        Err(Failure::new(CoreError::Cancelled))
    }

    fn skip_remaining(
        &self,
        operation: &OperationId,
        workflow: &Workflow,
        from: usize,
        ctx: &ExecutionContext,
        spec: &CapabilitySpec,
        shared: &Arc<RunShared>,
        shadow: bool,
    ) -> Result<(), Failure> {
        for step in &workflow.steps[from..] {
            self.audit(
                self.event(AuditStage::StepSkipped, operation, ctx, spec).with_step(&step.id),
                shadow,
            )?;
        }
        let mut inner = shared.lock();
        for record in &mut inner.steps[from..] {
            record.status = StepStatus::Skipped;
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn step_started(
        &self,
        operation: &OperationId,
        step: &WorkflowStep,
        index: usize,
        attempt: u32,
        ctx: &ExecutionContext,
        spec: &CapabilitySpec,
        shared: &Arc<RunShared>,
        shadow: bool,
    ) -> Result<(), Failure> {
        {
            let mut inner = shared.lock();
            let record = &mut inner.steps[index];
            record.status = StepStatus::Running;
            record.attempts = attempt;
            record.retried_attempts = attempt.saturating_sub(1);
        }
        self.audit(
            self.event(AuditStage::StepStarted, operation, ctx, spec)
                .with_step(&step.id)
                .with_detail(json!({"attempt": attempt})),
            shadow,
        )
    }

    fn step_completed(
        &self,
        operation: &OperationId,
        step: &WorkflowStep,
        index: usize,
        ctx: &ExecutionContext,
        spec: &CapabilitySpec,
        shared: &Arc<RunShared>,
        shadow: bool,
    ) -> Result<(), Failure> {
        shared.lock().steps[index].status = StepStatus::Completed;
        self.audit(
            self.event(AuditStage::StepCompleted, operation, ctx, spec).with_step(&step.id),
            shadow,
        )
    }

    fn event(
        &self,
        stage: AuditStage,
        operation: &OperationId,
        ctx: &ExecutionContext,
        spec: &CapabilitySpec,
    ) -> AuditEvent {
        AuditEvent::new(stage, operation.clone(), &ctx.case_id, &ctx.user_id, ctx.role)
            .with_capability(spec.id.clone())
    }

    /// Public write always; shadow write for high/destructive risk. Both
    /// are durable before the caller proceeds.
    fn audit(&self, event: AuditEvent, shadow: bool) -> Result<(), Failure> {
        self.ledger
            .append_public(&event)
            .map_err(|e| CoreError::Internal(format!("public audit append failed: {e}")))?;
        if shadow {
            self.ledger
                .append_shadow(&event)
                .map_err(|e| CoreError::Internal(format!("shadow audit append failed: {e}")))?;
        }
        Ok(())
    }
}

fn validate(workflow: &Workflow, ctx: &ExecutionContext) -> Result<(), Failure> {
    if workflow.steps.is_empty() {
        return Err(CoreError::Validation("workflow has no steps".to_string()).into());
    }
    if ctx.case_id.trim().is_empty() {
        return Err(CoreError::Validation("case_id is required".to_string()).into());
    }
    if ctx.user_id.trim().is_empty() {
        return Err(CoreError::Validation("user_id is required".to_string()).into());
    }
    Ok(())
}

/// Capability gates first, then workflow extras, deduplicated in order.
fn required_gates(workflow: &Workflow, spec: &CapabilitySpec) -> Vec<GateId> {
    let mut gates = spec.required_gates.clone();
    for gate in &workflow.required_gates {
        if !gates.contains(gate) {
            gates.push(gate.clone());
        }
    }
    gates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::ToolError;
    use async_trait::async_trait;
    use forge_admission::AdmissionConfig;
    use forge_audit::{ShadowEntry, ShadowKey};
    use forge_catalog::builtin_document;
    use forge_types::{
        CapabilityId, ConfirmationSet, FailurePolicy, ReasonCode, Role, WorkflowId,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails the first `failures` invocations, then succeeds.
    struct ScriptedAdapter {
        failures: usize,
        calls: AtomicUsize,
    }

    impl ScriptedAdapter {
        fn new(failures: usize) -> Self {
            Self {
                failures,
                calls: AtomicUsize::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ToolAdapter for ScriptedAdapter {
        async fn invoke(
            &self,
            capability: &CapabilityId,
            _params: &Value,
        ) -> Result<Value, ToolError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(ToolError::Failed("device not in download mode".to_string()))
            } else {
                Ok(json!({"capability": capability.as_str(), "exit_code": 0}))
            }
        }
    }

    struct Fixture {
        executor: Arc<WorkflowExecutor>,
        adapter: Arc<ScriptedAdapter>,
        admission: Arc<AdmissionController>,
        ledger: Arc<AuditLedger>,
        _dir: tempfile::TempDir,
    }

    fn fixture(failures: usize, admission_config: AdmissionConfig) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Arc::new(CapabilityCatalog::from_document(builtin_document()).unwrap());
        let admission = Arc::new(AdmissionController::new(admission_config));
        let ledger = Arc::new(AuditLedger::new(dir.path(), ShadowKey::generate()).unwrap());
        let adapter = Arc::new(ScriptedAdapter::new(failures));
        let executor = Arc::new(WorkflowExecutor::new(
            catalog,
            Arc::clone(&admission),
            Arc::clone(&ledger),
            adapter.clone() as Arc<dyn ToolAdapter>,
            ExecutorConfig::default(),
        ));
        Fixture {
            executor,
            adapter,
            admission,
            ledger,
            _dir: dir,
        }
    }

    fn senior_ctx() -> ExecutionContext {
        ExecutionContext::new("case-77", "tech-4", Role::SeniorTechnician)
            .with_device("R58M1234")
            .with_confirmations(ConfirmationSet {
                ownership_acknowledged: true,
                ownership_phrase: Some("I confirm the customer owns this device".to_string()),
                device_authorized: true,
                destructive_phrase: Some("ERASE_AND_RESTORE".to_string()),
            })
    }

    fn frp_workflow(steps: Vec<WorkflowStep>) -> Workflow {
        Workflow {
            id: WorkflowId::new("frp-standard"),
            name: "FRP bypass".to_string(),
            capability: CapabilityId::new("frp_bypass"),
            required_gates: Vec::new(),
            steps,
        }
    }

    fn invoke_step(id: &str) -> WorkflowStep {
        WorkflowStep::invoke(id, CapabilityId::new("frp_bypass"))
    }

    fn today() -> chrono::NaiveDate {
        chrono::Utc::now().date_naive()
    }

    fn stages(ledger: &AuditLedger) -> Vec<AuditStage> {
        ledger
            .read_public(today())
            .unwrap()
            .into_iter()
            .map(|e| e.stage)
            .collect()
    }

    fn count(stages: &[AuditStage], stage: AuditStage) -> usize {
        stages.iter().filter(|s| **s == stage).count()
    }

    #[tokio::test]
    async fn successful_run_completes_audits_and_releases_the_slot() {
        let fx = fixture(0, AdmissionConfig::default());
        let envelope = fx
            .executor
            .execute(&frp_workflow(vec![invoke_step("bypass")]), &senior_ctx(), None)
            .await;

        assert!(envelope.ok, "{:?}", envelope.error);
        assert_eq!(envelope.operation.status, WorkflowState::Completed);
        assert_eq!(fx.adapter.call_count(), 1);
        assert_eq!(fx.admission.active_count(), 0);

        let stages = stages(&fx.ledger);
        assert_eq!(count(&stages, AuditStage::OperationStarted), 1);
        assert_eq!(count(&stages, AuditStage::StepStarted), 1);
        assert_eq!(count(&stages, AuditStage::StepCompleted), 1);
        assert_eq!(count(&stages, AuditStage::OperationCompleted), 1);

        // High risk work is mirrored into the shadow channel
        let shadow = fx.ledger.read_shadow(today()).unwrap();
        assert!(!shadow.is_empty());
        assert!(shadow.iter().all(|e| matches!(e, ShadowEntry::Intact(_))));
    }

    #[tokio::test]
    async fn failing_gates_block_without_touching_the_adapter() {
        let fx = fixture(0, AdmissionConfig::default());
        let ctx = ExecutionContext::new("case-77", "tech-4", Role::SeniorTechnician);
        let envelope = fx
            .executor
            .execute(&frp_workflow(vec![invoke_step("bypass")]), &ctx, None)
            .await;

        assert!(!envelope.ok);
        let error = envelope.error.unwrap();
        assert_eq!(error.code, ReasonCode::GateFailed);
        assert!(error.details["results"].is_array());
        assert_eq!(fx.adapter.call_count(), 0);
        assert_eq!(fx.admission.active_count(), 0);
    }

    #[tokio::test]
    async fn unknown_capability_fails_closed() {
        let fx = fixture(0, AdmissionConfig::default());
        let mut workflow = frp_workflow(vec![invoke_step("bypass")]);
        workflow.capability = CapabilityId::new("warranty_scrub");
        let envelope = fx.executor.execute(&workflow, &senior_ctx(), None).await;
        assert_eq!(envelope.error.unwrap().code, ReasonCode::UnknownCapability);
        assert_eq!(fx.adapter.call_count(), 0);
    }

    #[tokio::test]
    async fn technician_is_denied_destructive_work_by_policy() {
        let fx = fixture(0, AdmissionConfig::default());
        let mut ctx = senior_ctx();
        ctx.role = Role::Technician;
        let mut workflow = frp_workflow(vec![invoke_step("wipe")]);
        workflow.capability = CapabilityId::new("data_wipe");

        let envelope = fx.executor.execute(&workflow, &ctx, None).await;
        assert_eq!(envelope.error.unwrap().code, ReasonCode::PolicyDenied);
        assert_eq!(fx.adapter.call_count(), 0);
    }

    #[tokio::test]
    async fn empty_workflow_is_a_validation_error() {
        let fx = fixture(0, AdmissionConfig::default());
        let envelope = fx
            .executor
            .execute(&frp_workflow(Vec::new()), &senior_ctx(), None)
            .await;
        assert_eq!(envelope.error.unwrap().code, ReasonCode::ValidationError);
    }

    #[tokio::test]
    async fn retry_policy_audits_every_attempt_and_each_retry() {
        let fx = fixture(2, AdmissionConfig::default());
        let step = invoke_step("bypass").with_on_failure(FailurePolicy::Retry {
            attempts: 2,
            delay: None,
        });
        let envelope = fx
            .executor
            .execute(&frp_workflow(vec![step]), &senior_ctx(), None)
            .await;

        assert!(envelope.ok, "{:?}", envelope.error);
        assert_eq!(fx.adapter.call_count(), 3);

        let data = envelope.data.unwrap();
        assert_eq!(data["steps"][0]["attempts"], 3);
        assert_eq!(data["steps"][0]["retried_attempts"], 2);

        let stages = stages(&fx.ledger);
        assert_eq!(count(&stages, AuditStage::StepStarted), 3);
        assert_eq!(count(&stages, AuditStage::StepRetried), 2);
        assert_eq!(count(&stages, AuditStage::StepFailed), 2);
        assert_eq!(count(&stages, AuditStage::StepCompleted), 1);
    }

    #[tokio::test]
    async fn exhausted_retries_fail_the_operation() {
        let fx = fixture(10, AdmissionConfig::default());
        let step = invoke_step("bypass").with_on_failure(FailurePolicy::Retry {
            attempts: 1,
            delay: None,
        });
        let envelope = fx
            .executor
            .execute(&frp_workflow(vec![step]), &senior_ctx(), None)
            .await;

        assert_eq!(envelope.error.unwrap().code, ReasonCode::ToolExecutionError);
        assert_eq!(fx.adapter.call_count(), 2);
        assert_eq!(fx.admission.active_count(), 0);
    }

    #[tokio::test]
    async fn abort_marks_remaining_steps_skipped() {
        let fx = fixture(10, AdmissionConfig::default());
        let workflow = frp_workflow(vec![invoke_step("first"), invoke_step("second")]);
        let envelope = fx.executor.execute(&workflow, &senior_ctx(), None).await;

        assert!(!envelope.ok);
        assert_eq!(envelope.operation.status, WorkflowState::Failed);
        let stages = stages(&fx.ledger);
        assert_eq!(count(&stages, AuditStage::StepSkipped), 1);
        assert_eq!(count(&stages, AuditStage::OperationFailed), 1);
    }

    #[tokio::test]
    async fn continue_policy_records_the_failure_and_proceeds() {
        let fx = fixture(1, AdmissionConfig::default());
        let workflow = frp_workflow(vec![
            invoke_step("flaky").with_on_failure(FailurePolicy::Continue),
            invoke_step("second"),
        ]);
        let envelope = fx.executor.execute(&workflow, &senior_ctx(), None).await;

        assert!(envelope.ok, "{:?}", envelope.error);
        let data = envelope.data.unwrap();
        assert_eq!(data["steps"][0]["status"], "failed");
        assert_eq!(data["steps"][1]["status"], "completed");
    }

    #[tokio::test]
    async fn full_backlog_is_resource_exhausted() {
        let fx = fixture(0, AdmissionConfig {
            baseline: 1,
            max_queue: 0,
            ..Default::default()
        });
        // Occupy the only slot out of band
        fx.admission
            .acquire(&OperationId::new("holder"), "unlock")
            .await
            .unwrap();

        let envelope = fx
            .executor
            .execute(&frp_workflow(vec![invoke_step("bypass")]), &senior_ctx(), None)
            .await;
        assert_eq!(envelope.error.unwrap().code, ReasonCode::ResourceExhausted);
        assert_eq!(fx.adapter.call_count(), 0);
    }

    #[tokio::test]
    async fn prompt_step_suspends_until_input_arrives() {
        let fx = fixture(0, AdmissionConfig::default());
        let workflow = frp_workflow(vec![
            WorkflowStep::prompt("confirm-imei", "imei_tail", "Enter the last 4 IMEI digits"),
            invoke_step("bypass"),
        ]);

        let executor = Arc::clone(&fx.executor);
        let ctx = senior_ctx();
        let task = tokio::spawn(async move { executor.execute(&workflow, &ctx, None).await });

        // Wait for the run to surface and suspend
        let operation = loop {
            tokio::time::sleep(Duration::from_millis(5)).await;
            let waiting = fx.ledger.read_public(today()).unwrap().into_iter().find(|e| {
                e.stage == AuditStage::PromptRequested
            });
            if let Some(event) = waiting {
                break event.operation_id;
            }
        };
        let status = fx.executor.status(&operation).unwrap();
        assert_eq!(status.state, WorkflowState::WaitingForUser);
        assert_eq!(status.pending_prompt.as_deref(), Some("imei_tail"));

        assert!(fx.executor.provide_input(&operation, "imei_tail", "4821"));
        let envelope = task.await.unwrap();
        assert!(envelope.ok, "{:?}", envelope.error);

        let data = envelope.data.unwrap();
        assert_eq!(data["outputs"]["confirm-imei"]["imei_tail"], "4821");
        let stages = stages(&fx.ledger);
        assert_eq!(count(&stages, AuditStage::PromptRequested), 1);
        assert_eq!(count(&stages, AuditStage::PromptAnswered), 1);
    }

    #[tokio::test]
    async fn prompt_input_supplied_up_front_never_suspends() {
        let fx = fixture(0, AdmissionConfig::default());
        let workflow = frp_workflow(vec![WorkflowStep::prompt(
            "confirm-imei",
            "imei_tail",
            "Enter the last 4 IMEI digits",
        )]);
        let ctx = senior_ctx().with_prompt_input("imei_tail", "9977");
        let envelope = fx.executor.execute(&workflow, &ctx, None).await;
        assert!(envelope.ok, "{:?}", envelope.error);
        let stages = stages(&fx.ledger);
        assert_eq!(count(&stages, AuditStage::PromptRequested), 0);
    }

    #[tokio::test]
    async fn cancelling_a_waiting_run_releases_its_slot() {
        let fx = fixture(0, AdmissionConfig::default());
        let workflow = frp_workflow(vec![
            WorkflowStep::prompt("confirm-imei", "imei_tail", "Enter the last 4 IMEI digits"),
            invoke_step("bypass"),
        ]);

        let executor = Arc::clone(&fx.executor);
        let ctx = senior_ctx();
        let task = tokio::spawn(async move { executor.execute(&workflow, &ctx, None).await });

        let operation = loop {
            tokio::time::sleep(Duration::from_millis(5)).await;
            if let Some(event) = fx
                .ledger
                .read_public(today())
                .unwrap()
                .into_iter()
                .find(|e| e.stage == AuditStage::PromptRequested)
            {
                break event.operation_id;
            }
        };
        assert!(fx.executor.cancel(&operation));

        let envelope = task.await.unwrap();
        assert!(!envelope.ok);
        assert_eq!(envelope.operation.status, WorkflowState::Cancelled);
        assert_eq!(fx.adapter.call_count(), 0);
        assert_eq!(fx.admission.active_count(), 0);
        let stages = stages(&fx.ledger);
        assert_eq!(count(&stages, AuditStage::OperationCancelled), 1);
    }

    #[tokio::test]
    async fn simulate_reports_checks_without_side_effects() {
        let fx = fixture(0, AdmissionConfig::default());
        let ctx = ExecutionContext::new("case-77", "tech-4", Role::SeniorTechnician);
        let envelope = fx
            .executor
            .simulate(&frp_workflow(vec![invoke_step("bypass")]), &ctx);

        assert!(envelope.ok);
        let data = envelope.data.unwrap();
        assert_eq!(data["would_succeed"], false);
        let checks = data["checks"].as_array().unwrap();
        assert!(checks.iter().any(|c| c["check"] == "ownership_attestation"
            && c["passed"] == false));

        assert_eq!(fx.adapter.call_count(), 0);
        assert_eq!(fx.admission.active_count(), 0);
        assert!(fx.ledger.read_public(today()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn mismatched_tool_digest_is_an_integrity_error() {
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let mut binary = tempfile::NamedTempFile::new().unwrap();
        binary.write_all(b"not the bytes the catalog expects").unwrap();
        binary.flush().unwrap();

        let mut doc = builtin_document();
        for tool in &mut doc.tools {
            if tool.id.as_str() == "adb" {
                tool.path = Some(binary.path().to_path_buf());
                tool.digest = Some(blake3::hash(b"the blessed adb build").to_hex().to_string());
            }
        }
        let catalog = Arc::new(CapabilityCatalog::from_document(doc).unwrap());
        let admission = Arc::new(AdmissionController::new(AdmissionConfig::default()));
        let ledger = Arc::new(AuditLedger::new(dir.path(), ShadowKey::generate()).unwrap());
        let adapter = Arc::new(ScriptedAdapter::new(0));
        let executor = WorkflowExecutor::new(
            catalog,
            admission,
            ledger,
            adapter.clone() as Arc<dyn ToolAdapter>,
            ExecutorConfig::default(),
        );

        let envelope = executor
            .execute(&frp_workflow(vec![invoke_step("bypass")]), &senior_ctx(), None)
            .await;
        assert_eq!(envelope.error.unwrap().code, ReasonCode::IntegrityError);
        assert_eq!(adapter.call_count(), 0);
    }
}
