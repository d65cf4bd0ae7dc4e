//! AccrualWorker: reconciles non-terminal orders with the accrual service
//!
//! Every `poll_interval` the worker scans all `NEW`/`PROCESSING` orders and
//! asks the accrual service about each one in turn:
//!
//! - no content: the order becomes `INVALID`
//! - a report: the order moves forward to the reported status, and a
//!   `PROCESSED` report with an amount credits the owner once
//! - any failure: logged, the order is retried next cycle
//!
//! Terminal orders drop out of the scan. The store re-checks the transition
//! under a row lock, so a stale scan cannot move an order backward or credit
//! it twice.

use std::sync::Arc;
use std::time::Duration;

use shared::models::{Order, OrderStatus};
use tokio_util::sync::CancellationToken;

use super::{AccrualClient, AccrualError, AccrualLookup};
use crate::db::{ApplyOutcome, Store};
use crate::error::ServiceError;

/// What one reconciliation pass did
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Non-terminal orders found at the start of the cycle
    pub scanned: usize,
    /// Orders whose status moved forward
    pub updated: usize,
    /// Orders whose owner was credited
    pub credited: usize,
    /// Orders the accrual service reported without a forward transition
    pub unchanged: usize,
    /// Orders that failed this cycle and will be retried
    pub skipped: usize,
    /// Of `skipped`, lookups the accrual service answered with 429
    pub rate_limited: usize,
}

enum OrderFailure {
    Accrual(AccrualError),
    Store(ServiceError),
    Cancelled,
}

pub struct AccrualWorker {
    store: Arc<dyn Store>,
    client: Arc<dyn AccrualClient>,
    poll_interval: Duration,
    request_timeout: Duration,
    shutdown: CancellationToken,
}

impl AccrualWorker {
    pub fn new(
        store: Arc<dyn Store>,
        client: Arc<dyn AccrualClient>,
        poll_interval: Duration,
        request_timeout: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            store,
            client,
            poll_interval,
            request_timeout,
            shutdown,
        }
    }

    /// Main loop. Returns once the shutdown token is cancelled, abandoning
    /// the current wait or in-flight cycle.
    pub async fn run(self) {
        tracing::info!(
            poll_interval_secs = self.poll_interval.as_secs(),
            request_timeout_secs = self.request_timeout.as_secs(),
            "AccrualWorker started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }

            let report = self.run_cycle().await;
            if self.shutdown.is_cancelled() {
                break;
            }

            if report.scanned > 0 {
                tracing::debug!(
                    scanned = report.scanned,
                    updated = report.updated,
                    credited = report.credited,
                    unchanged = report.unchanged,
                    skipped = report.skipped,
                    rate_limited = report.rate_limited,
                    "Accrual cycle finished"
                );
            }
        }

        tracing::info!("AccrualWorker stopped");
    }

    /// One pass over all non-terminal orders
    pub async fn run_cycle(&self) -> CycleReport {
        let orders = match self.store.list_non_terminal_orders().await {
            Ok(orders) => orders,
            Err(e) => {
                tracing::error!(error = %e, "Failed to list non-terminal orders");
                return CycleReport::default();
            }
        };

        let mut report = CycleReport {
            scanned: orders.len(),
            ..Default::default()
        };

        for order in &orders {
            if self.shutdown.is_cancelled() {
                break;
            }

            match self.reconcile(order).await {
                Ok(ApplyOutcome::Applied { status, credited }) => {
                    report.updated += 1;
                    if credited.is_some() {
                        report.credited += 1;
                    }
                    tracing::info!(
                        order_number = %order.number,
                        user_id = order.user_id,
                        from = %order.status,
                        status = %status,
                        accrual = ?credited,
                        "Order status updated"
                    );
                }
                Ok(ApplyOutcome::Skipped { current }) => {
                    report.unchanged += 1;
                    tracing::debug!(
                        order_number = %order.number,
                        status = %current,
                        "No status change"
                    );
                }
                Err(OrderFailure::Cancelled) => break,
                Err(OrderFailure::Accrual(AccrualError::RateLimited { retry_after })) => {
                    tracing::warn!(
                        order_number = %order.number,
                        retry_after = ?retry_after,
                        "Accrual service rate limited, retrying next cycle"
                    );
                    report.skipped += 1;
                    report.rate_limited += 1;
                }
                Err(OrderFailure::Accrual(e)) => {
                    tracing::warn!(
                        order_number = %order.number,
                        error = %e,
                        "Accrual lookup failed, retrying next cycle"
                    );
                    report.skipped += 1;
                }
                Err(OrderFailure::Store(e)) => {
                    tracing::error!(
                        order_number = %order.number,
                        error = %e,
                        "Failed to apply accrual"
                    );
                    report.skipped += 1;
                }
            }
        }

        report
    }

    async fn reconcile(&self, order: &Order) -> Result<ApplyOutcome, OrderFailure> {
        // The call (and its response body) is scoped to this order
        let lookup = tokio::select! {
            _ = self.shutdown.cancelled() => return Err(OrderFailure::Cancelled),
            result = tokio::time::timeout(
                self.request_timeout,
                self.client.fetch_accrual_status(&order.number),
            ) => match result {
                Ok(lookup) => lookup.map_err(OrderFailure::Accrual)?,
                Err(_) => return Err(OrderFailure::Accrual(AccrualError::Timeout)),
            },
        };

        let (next, accrual) = match lookup {
            AccrualLookup::NotRegistered => (OrderStatus::Invalid, None),
            AccrualLookup::Registered(report) => {
                if report.order != order.number {
                    tracing::debug!(
                        order_number = %order.number,
                        reported = %report.order,
                        "Accrual report names a different order"
                    );
                }
                (report.status, report.accrual)
            }
        };

        if !order.status.can_advance_to(next) {
            return Ok(ApplyOutcome::Skipped {
                current: order.status,
            });
        }

        self.store
            .apply_accrual(order.id, next, accrual, shared::util::now_millis())
            .await
            .map_err(OrderFailure::Store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accrual::mock::{MockAccrual, Script};
    use crate::db::memory::MemoryStore;
    use rust_decimal::Decimal;
    use shared::models::LedgerEntryType;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    struct Harness {
        store: Arc<MemoryStore>,
        accrual: Arc<MockAccrual>,
        shutdown: CancellationToken,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                store: Arc::new(MemoryStore::new()),
                accrual: Arc::new(MockAccrual::new()),
                shutdown: CancellationToken::new(),
            }
        }

        fn worker(&self, poll_interval: Duration, request_timeout: Duration) -> AccrualWorker {
            AccrualWorker::new(
                self.store.clone(),
                self.accrual.clone(),
                poll_interval,
                request_timeout,
                self.shutdown.clone(),
            )
        }

        fn default_worker(&self) -> AccrualWorker {
            self.worker(Duration::from_secs(10), Duration::from_millis(200))
        }

        async fn order(&self, user_id: i64, number: &str) {
            self.store.create_order(user_id, number, 1).await.unwrap();
        }

        async fn status(&self, number: &str) -> OrderStatus {
            self.store.order(number).await.unwrap().status
        }
    }

    #[tokio::test]
    async fn test_processed_order_is_credited_exactly_once() {
        let h = Harness::new();
        h.order(7, "79927398713").await;
        h.accrual.processed("79927398713", Some(dec("500")));
        let worker = h.default_worker();

        let report = worker.run_cycle().await;
        assert_eq!(report.scanned, 1);
        assert_eq!(report.updated, 1);
        assert_eq!(report.credited, 1);
        assert_eq!(h.status("79927398713").await, OrderStatus::Processed);
        assert_eq!(
            h.store.get_user_balance(7).await.unwrap().current(),
            dec("500")
        );

        let report = worker.run_cycle().await;
        assert_eq!(report, CycleReport::default());
        assert_eq!(h.accrual.calls().len(), 1);
        assert_eq!(
            h.store.get_user_balance(7).await.unwrap().current(),
            dec("500")
        );
    }

    #[tokio::test]
    async fn test_unknown_order_becomes_invalid_without_credit() {
        let h = Harness::new();
        h.order(7, "2377225624").await;

        let report = h.default_worker().run_cycle().await;
        assert_eq!(report.updated, 1);
        assert_eq!(report.credited, 0);
        assert_eq!(h.status("2377225624").await, OrderStatus::Invalid);
        assert!(h.store.entries().await.is_empty());
    }

    #[tokio::test]
    async fn test_failure_on_one_order_does_not_stall_others() {
        let h = Harness::new();
        h.order(1, "79927398713").await;
        h.order(2, "2377225624").await;
        h.order(3, "12345678903").await;
        h.accrual
            .set("79927398713", Script::Fail(|| AccrualError::UnexpectedStatus(500)));
        h.accrual.set(
            "2377225624",
            Script::Fail(|| AccrualError::Decode("garbage".into())),
        );
        h.accrual.processed("12345678903", Some(dec("12.34")));

        let report = h.default_worker().run_cycle().await;
        assert_eq!(report.scanned, 3);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.updated, 1);
        assert_eq!(h.status("79927398713").await, OrderStatus::New);
        assert_eq!(h.status("2377225624").await, OrderStatus::New);
        assert_eq!(h.status("12345678903").await, OrderStatus::Processed);
        assert_eq!(
            h.store.get_user_balance(3).await.unwrap().current(),
            dec("12.34")
        );
    }

    #[tokio::test]
    async fn test_slow_call_times_out_and_is_retried() {
        let h = Harness::new();
        h.order(1, "79927398713").await;
        h.order(2, "12345678903").await;
        h.accrual.set("79927398713", Script::Hang);
        h.accrual.processed("12345678903", None);
        let worker = h.worker(Duration::from_secs(10), Duration::from_millis(50));

        let report = worker.run_cycle().await;
        assert_eq!(report.skipped, 1);
        assert_eq!(report.updated, 1);
        assert_eq!(h.status("79927398713").await, OrderStatus::New);
        assert_eq!(h.status("12345678903").await, OrderStatus::Processed);

        h.accrual.processed("79927398713", Some(dec("1")));
        let report = worker.run_cycle().await;
        assert_eq!(report.scanned, 1);
        assert_eq!(h.status("79927398713").await, OrderStatus::Processed);
    }

    #[tokio::test]
    async fn test_backward_and_repeated_statuses_are_ignored() {
        let h = Harness::new();
        h.order(1, "79927398713").await;
        h.accrual
            .report("79927398713", OrderStatus::Processing, None);
        let worker = h.default_worker();

        assert_eq!(worker.run_cycle().await.updated, 1);
        assert_eq!(h.status("79927398713").await, OrderStatus::Processing);

        // same status again
        let report = worker.run_cycle().await;
        assert_eq!(report.unchanged, 1);

        // REGISTERED/NEW after PROCESSING
        h.accrual.report("79927398713", OrderStatus::New, None);
        let report = worker.run_cycle().await;
        assert_eq!(report.unchanged, 1);
        assert_eq!(h.status("79927398713").await, OrderStatus::Processing);

        h.accrual.processed("79927398713", Some(dec("20")));
        assert_eq!(worker.run_cycle().await.credited, 1);
    }

    #[tokio::test]
    async fn test_processed_without_accrual_writes_no_entry() {
        let h = Harness::new();
        h.order(1, "79927398713").await;
        h.accrual.processed("79927398713", None);

        let report = h.default_worker().run_cycle().await;
        assert_eq!(report.updated, 1);
        assert_eq!(report.credited, 0);
        assert!(h.store.entries().await.is_empty());
    }

    #[tokio::test]
    async fn test_rate_limited_order_is_skipped_and_cycle_continues() {
        let h = Harness::new();
        h.order(1, "79927398713").await;
        h.order(2, "12345678903").await;
        h.accrual.set(
            "79927398713",
            Script::Fail(|| AccrualError::RateLimited {
                retry_after: Some(Duration::from_secs(60)),
            }),
        );
        h.accrual.processed("12345678903", Some(dec("5")));

        let report = h.default_worker().run_cycle().await;
        assert_eq!(report.scanned, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.rate_limited, 1);
        assert_eq!(report.updated, 1);
        assert_eq!(h.accrual.calls().len(), 2);
        assert_eq!(h.status("79927398713").await, OrderStatus::New);
        assert_eq!(h.status("12345678903").await, OrderStatus::Processed);
        assert_eq!(
            h.store.get_user_balance(2).await.unwrap().current(),
            dec("5")
        );
    }

    #[tokio::test]
    async fn test_retry_after_does_not_delay_next_tick() {
        let h = Harness::new();
        h.order(1, "79927398713").await;
        h.accrual.set(
            "79927398713",
            Script::Fail(|| AccrualError::RateLimited {
                retry_after: Some(Duration::from_secs(3600)),
            }),
        );
        let worker = h.worker(Duration::from_millis(20), Duration::from_secs(1));
        let handle = tokio::spawn(worker.run());

        tokio::time::sleep(Duration::from_millis(200)).await;
        h.shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("worker should stop promptly")
            .unwrap();
        assert!(h.accrual.calls().len() >= 2);
    }

    #[tokio::test]
    async fn test_withdrawal_orders_are_polled_too() {
        let h = Harness::new();
        let user = h.store.create_user("u", "h", 1).await.unwrap().unwrap();
        h.store
            .seed_entry(user.id, None, dec("10"), LedgerEntryType::Accrual)
            .await;
        h.store
            .withdraw(user.id, "2377225624", dec("4"), 2)
            .await
            .unwrap();

        let report = h.default_worker().run_cycle().await;
        assert_eq!(report.scanned, 1);
        assert_eq!(h.status("2377225624").await, OrderStatus::Invalid);
        assert_eq!(
            h.store.get_user_balance(user.id).await.unwrap().current(),
            dec("6")
        );
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown_while_waiting() {
        let h = Harness::new();
        let worker = h.worker(Duration::from_secs(3600), Duration::from_secs(5));
        let handle = tokio::spawn(worker.run());

        h.shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("worker should stop promptly")
            .unwrap();
    }

    #[tokio::test]
    async fn test_run_abandons_in_flight_call_on_shutdown() {
        let h = Harness::new();
        h.order(1, "79927398713").await;
        h.accrual.set("79927398713", Script::Hang);
        let worker = h.worker(Duration::from_millis(10), Duration::from_secs(3600));
        let handle = tokio::spawn(worker.run());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(h.accrual.calls().len(), 1);
        h.shutdown.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("worker should stop promptly")
            .unwrap();
        assert_eq!(h.status("79927398713").await, OrderStatus::New);
    }
}
