use std::fmt::Write;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Kind of provider mutation performed by a reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Add,
    Remove,
    Update,
}

impl Op {
    pub const ALL: [Op; 3] = [Op::Add, Op::Remove, Op::Update];

    pub fn as_str(self) -> &'static str {
        match self {
            Op::Add => "add",
            Op::Remove => "remove",
            Op::Update => "update",
        }
    }

    fn index(self) -> usize {
        match self {
            Op::Add => 0,
            Op::Remove => 1,
            Op::Update => 2,
        }
    }
}

impl std::fmt::Display for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Thread-safe reconciliation counters, rendered in Prometheus text exposition format.
///
/// Written by the scheduler loop, read by the healthcheck server.
#[derive(Default)]
pub struct ReconcileMetrics {
    passes: AtomicU64,
    passes_skipped: AtomicU64,
    passes_failed: AtomicU64,
    op_success: [AtomicU64; 3],
    op_failure: [AtomicU64; 3],
    dns_failures: AtomicU64,
    owned_endpoints: AtomicI64,
}

impl ReconcileMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pass_completed(&self) {
        self.passes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn pass_skipped(&self) {
        self.passes_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn pass_failed(&self) {
        self.passes_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn op_succeeded(&self, op: Op) {
        self.op_success[op.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn op_failed(&self, op: Op) {
        self.op_failure[op.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn dns_registration_failed(&self) {
        self.dns_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_owned_endpoints(&self, count: usize) {
        self.owned_endpoints
            .store(i64::try_from(count).unwrap_or(i64::MAX), Ordering::Relaxed);
    }

    pub fn passes(&self) -> u64 {
        self.passes.load(Ordering::Relaxed)
    }

    pub fn passes_skipped(&self) -> u64 {
        self.passes_skipped.load(Ordering::Relaxed)
    }

    pub fn passes_failed(&self) -> u64 {
        self.passes_failed.load(Ordering::Relaxed)
    }

    pub fn op_successes(&self, op: Op) -> u64 {
        self.op_success[op.index()].load(Ordering::Relaxed)
    }

    pub fn op_failures(&self, op: Op) -> u64 {
        self.op_failure[op.index()].load(Ordering::Relaxed)
    }

    /// Render all metrics in Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut out = String::new();

        counter(
            &mut out,
            "external_lb_reconcile_passes_total",
            "Reconciliation passes that ran to completion.",
            self.passes(),
        );
        counter(
            &mut out,
            "external_lb_reconcile_passes_skipped_total",
            "Triggered passes skipped because desired state was unchanged.",
            self.passes_skipped(),
        );
        counter(
            &mut out,
            "external_lb_reconcile_passes_failed_total",
            "Passes aborted by a metadata or provider read failure.",
            self.passes_failed(),
        );

        let _ = writeln!(
            out,
            "# HELP external_lb_provider_ops_total Provider mutations by operation and result."
        );
        let _ = writeln!(out, "# TYPE external_lb_provider_ops_total counter");
        for op in Op::ALL {
            let _ = writeln!(
                out,
                "external_lb_provider_ops_total{{op=\"{}\",result=\"success\"}} {}",
                op,
                self.op_successes(op)
            );
            let _ = writeln!(
                out,
                "external_lb_provider_ops_total{{op=\"{}\",result=\"failure\"}} {}",
                op,
                self.op_failures(op)
            );
        }

        counter(
            &mut out,
            "external_lb_dns_registration_failures_total",
            "FQDN registrations rejected by the DNS collaborator.",
            self.dns_failures.load(Ordering::Relaxed),
        );

        let _ = writeln!(
            out,
            "# HELP external_lb_owned_endpoints Endpoints owned by this controller at the last pass."
        );
        let _ = writeln!(out, "# TYPE external_lb_owned_endpoints gauge");
        let _ = writeln!(
            out,
            "external_lb_owned_endpoints {}",
            self.owned_endpoints.load(Ordering::Relaxed)
        );

        out
    }
}

fn counter(out: &mut String, name: &str, help: &str, value: u64) {
    let _ = writeln!(out, "# HELP {} {}", name, help);
    let _ = writeln!(out, "# TYPE {} counter", name);
    let _ = writeln!(out, "{} {}", name, value);
}
