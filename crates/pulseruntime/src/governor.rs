use crate::ExecutionStore;
use chrono::{NaiveDate, Utc};
use pulsecore::{
    RejectReason, TenantId, VarMap, WorkflowExecution, WorkflowId,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Snapshot of the limits that shaped an admission decision, mirrored to
/// the external API layer alongside the HTTP-style status mapping.
#[derive(Debug, Clone, Copy)]
pub struct AdmissionLimits {
    pub max_concurrent: u32,
    pub max_daily: u32,
    pub current_running: u32,
    pub current_today: u32,
}

/// Outcome of the gatekeeping decision on whether a new run may start.
#[derive(Debug)]
pub struct AdmissionDecision {
    pub allowed: bool,
    pub reason: Option<RejectReason>,
    pub limits: AdmissionLimits,
    /// The Pending execution record, created atomically with the counter
    /// reservation. Present exactly when `allowed`.
    pub execution: Option<WorkflowExecution>,
}

impl AdmissionDecision {
    fn rejected(reason: RejectReason, limits: AdmissionLimits) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
            limits,
            execution: None,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct TenantCounters {
    running: u32,
    day: Option<NaiveDate>,
    started_today: u32,
}

impl TenantCounters {
    fn roll_day(&mut self, today: NaiveDate) {
        if self.day != Some(today) {
            self.day = Some(today);
            self.started_today = 0;
        }
    }
}

/// Enforces per-tenant concurrency ceilings and daily quotas before a run
/// record exists, so one tenant cannot starve shared execution capacity.
///
/// The counters are the only state shared across concurrent runs of a
/// tenant. Check-and-reserve happens under one mutex guard: K+1 racing
/// admissions against a ceiling of K can never all pass, which a naive
/// read-then-write pattern would allow.
pub struct IsolationGovernor {
    store: Arc<dyn ExecutionStore>,
    counters: Mutex<HashMap<TenantId, TenantCounters>>,
}

impl IsolationGovernor {
    pub fn new(store: Arc<dyn ExecutionStore>) -> Self {
        Self {
            store,
            counters: Mutex::new(HashMap::new()),
        }
    }

    /// Decide whether `tenant_id` may start a run of `workflow_id`.
    ///
    /// Checks, in order: the workflow exists and belongs to the tenant,
    /// the tenant is under its concurrency ceiling, and the tenant is under
    /// its UTC daily quota. On success the Pending execution record is
    /// created as part of the same reservation; a rejection leaves no
    /// record behind and is never retried by the engine.
    pub async fn admit(
        &self,
        tenant_id: TenantId,
        workflow_id: WorkflowId,
        input_data: VarMap,
    ) -> AdmissionDecision {
        let definition = match self.store.workflow(workflow_id).await {
            Ok(definition) => definition,
            Err(_) => {
                tracing::warn!(%tenant_id, %workflow_id, "admission rejected: unknown workflow");
                return AdmissionDecision::rejected(
                    RejectReason::UnknownWorkflow,
                    self.snapshot(tenant_id, 0, 0),
                );
            }
        };

        let max_concurrent = definition.limits.max_concurrent_executions;
        let max_daily = definition.limits.max_daily_executions;

        // Tenant-isolation invariant: enforced here, never violated after.
        if definition.tenant_id != tenant_id {
            tracing::warn!(%tenant_id, %workflow_id, "admission rejected: cross-tenant");
            let snapshot = self.snapshot(tenant_id, max_concurrent, max_daily);
            return AdmissionDecision::rejected(RejectReason::CrossTenant, snapshot);
        }
        if !definition.is_active {
            let snapshot = self.snapshot(tenant_id, max_concurrent, max_daily);
            return AdmissionDecision::rejected(RejectReason::Inactive, snapshot);
        }

        // Atomic increment-and-check: both ceilings are inspected and the
        // slots reserved under a single lock acquisition.
        let limits = {
            let mut counters = self
                .counters
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let entry = counters.entry(tenant_id).or_default();
            entry.roll_day(Utc::now().date_naive());

            let limits = AdmissionLimits {
                max_concurrent,
                max_daily,
                current_running: entry.running,
                current_today: entry.started_today,
            };
            if entry.running >= max_concurrent {
                tracing::warn!(%tenant_id, %workflow_id, running = entry.running, "admission rejected: concurrency limit");
                return AdmissionDecision::rejected(RejectReason::ConcurrencyLimit, limits);
            }
            if entry.started_today >= max_daily {
                tracing::warn!(%tenant_id, %workflow_id, today = entry.started_today, "admission rejected: daily quota exceeded");
                return AdmissionDecision::rejected(RejectReason::DailyQuota, limits);
            }
            entry.running += 1;
            entry.started_today += 1;
            AdmissionLimits {
                current_running: entry.running,
                current_today: entry.started_today,
                ..limits
            }
        };

        let execution = WorkflowExecution::new(workflow_id, tenant_id, input_data);
        if let Err(e) = self.store.insert_execution(execution.clone()).await {
            // Reservation taken but the record cannot exist: hand the slot back.
            tracing::error!(%tenant_id, %workflow_id, error = %e, "failed to create execution record");
            self.release(tenant_id);
            return AdmissionDecision::rejected(RejectReason::UnknownWorkflow, limits);
        }

        tracing::debug!(
            %tenant_id,
            %workflow_id,
            execution_id = %execution.id,
            running = limits.current_running,
            today = limits.current_today,
            "admission granted"
        );
        AdmissionDecision {
            allowed: true,
            reason: None,
            limits,
            execution: Some(execution),
        }
    }

    /// Return a concurrency slot when a run reaches a terminal status.
    pub fn release(&self, tenant_id: TenantId) {
        let mut counters = self
            .counters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(entry) = counters.get_mut(&tenant_id) {
            entry.running = entry.running.saturating_sub(1);
        }
    }

    fn snapshot(&self, tenant_id: TenantId, max_concurrent: u32, max_daily: u32) -> AdmissionLimits {
        let mut counters = self
            .counters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let entry = counters.entry(tenant_id).or_default();
        entry.roll_day(Utc::now().date_naive());
        AdmissionLimits {
            max_concurrent,
            max_daily,
            current_running: entry.running,
            current_today: entry.started_today,
        }
    }
}
