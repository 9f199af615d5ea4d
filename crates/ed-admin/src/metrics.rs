//! Prometheus指标
//!
//! 计数器由 Web 层在操作成功后根据返回的报告累加。

use anyhow::Result;
use ed_core::VisitOutcome;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

/// 业务指标
#[derive(Debug, Clone)]
pub struct EdMetrics {
    registry: Registry,
    visits_closed_total: IntCounterVec,
    orders_cancelled_total: IntCounter,
    dispense_requests_total: IntCounter,
    stock_reversals_total: IntCounter,
    http_requests_total: IntCounter,
}

impl EdMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let visits_closed_total = IntCounterVec::new(
            Opts::new("ed_visits_closed_total", "Visit folders closed, by outcome"),
            &["outcome"],
        )?;

        let orders_cancelled_total = IntCounter::with_opts(Opts::new(
            "ed_orders_cancelled_total",
            "Pending orders cancelled by visit closure",
        ))?;

        let dispense_requests_total = IntCounter::with_opts(Opts::new(
            "ed_dispense_requests_total",
            "Dispense requests created",
        ))?;

        let stock_reversals_total = IntCounter::with_opts(Opts::new(
            "ed_stock_reversals_total",
            "Compensating stock entries for reverted dispenses",
        ))?;

        let http_requests_total = IntCounter::with_opts(Opts::new(
            "ed_http_requests_total",
            "Total number of HTTP requests",
        ))?;

        registry.register(Box::new(visits_closed_total.clone()))?;
        registry.register(Box::new(orders_cancelled_total.clone()))?;
        registry.register(Box::new(dispense_requests_total.clone()))?;
        registry.register(Box::new(stock_reversals_total.clone()))?;
        registry.register(Box::new(http_requests_total.clone()))?;

        Ok(Self {
            registry,
            visits_closed_total,
            orders_cancelled_total,
            dispense_requests_total,
            stock_reversals_total,
            http_requests_total,
        })
    }

    /// 记录一次档案关闭
    pub fn visit_closed(&self, outcome: VisitOutcome, cancelled_orders: usize, reversals: usize) {
        self.visits_closed_total
            .with_label_values(&[outcome.as_str()])
            .inc();
        self.orders_cancelled_total.inc_by(cancelled_orders as u64);
        self.stock_reversals_total.inc_by(reversals as u64);
    }

    pub fn dispense_requested(&self) {
        self.dispense_requests_total.inc();
    }

    pub fn stock_reverted(&self, count: usize) {
        self.stock_reversals_total.inc_by(count as u64);
    }

    pub fn http_request(&self) {
        self.http_requests_total.inc();
    }

    /// 文本格式导出
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;

        Ok(String::from_utf8(buffer)?)
    }
}
