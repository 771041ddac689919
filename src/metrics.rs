use std::fmt::Write as _;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};

pub struct Metrics {
    // Repository
    pub project_reads_total: AtomicU64,
    pub project_writes_total: AtomicU64,
    pub project_conflicts_total: AtomicU64,

    // Service
    pub conflict_retries_total: AtomicU64,
    pub ledger_rejections_total: AtomicU64,

    // Ledger
    pub plots_inserted_total: AtomicU64,
    pub plots_replaced_total: AtomicU64,
    pub bulk_batches_total: AtomicU64,
    pub payments_appended_total: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            project_reads_total: AtomicU64::new(0),
            project_writes_total: AtomicU64::new(0),
            project_conflicts_total: AtomicU64::new(0),
            conflict_retries_total: AtomicU64::new(0),
            ledger_rejections_total: AtomicU64::new(0),
            plots_inserted_total: AtomicU64::new(0),
            plots_replaced_total: AtomicU64::new(0),
            bulk_batches_total: AtomicU64::new(0),
            payments_appended_total: AtomicU64::new(0),
        }
    }
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

pub fn metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::default)
}

fn bump(counter: &AtomicU64, by: u64) {
    counter.fetch_add(by, Ordering::Relaxed);
}

pub fn record_project_read() {
    bump(&metrics().project_reads_total, 1);
}

pub fn record_project_write() {
    bump(&metrics().project_writes_total, 1);
}

pub fn record_project_conflict() {
    bump(&metrics().project_conflicts_total, 1);
}

pub fn record_conflict_retry() {
    bump(&metrics().conflict_retries_total, 1);
}

pub fn record_ledger_rejection() {
    bump(&metrics().ledger_rejections_total, 1);
}

pub fn record_plots_inserted(count: u64) {
    bump(&metrics().plots_inserted_total, count);
}

pub fn record_plot_replaced() {
    bump(&metrics().plots_replaced_total, 1);
}

pub fn record_bulk_batch() {
    bump(&metrics().bulk_batches_total, 1);
}

pub fn record_payment_appended() {
    bump(&metrics().payments_appended_total, 1);
}

pub fn render_prometheus() -> String {
    let m = metrics();
    let mut s = String::new();
    let counters = [
        ("project_reads_total", &m.project_reads_total),
        ("project_writes_total", &m.project_writes_total),
        ("project_conflicts_total", &m.project_conflicts_total),
        ("conflict_retries_total", &m.conflict_retries_total),
        ("ledger_rejections_total", &m.ledger_rejections_total),
        ("plots_inserted_total", &m.plots_inserted_total),
        ("plots_replaced_total", &m.plots_replaced_total),
        ("bulk_batches_total", &m.bulk_batches_total),
        ("payments_appended_total", &m.payments_appended_total),
    ];
    for (name, value) in counters {
        let _ = writeln!(
            s,
            "# TYPE {name} counter\n{name} {}",
            value.load(Ordering::Relaxed)
        );
    }
    s
}
