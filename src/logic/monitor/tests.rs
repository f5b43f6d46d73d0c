use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::*;
use crate::details;
use crate::logic::store::{MemoryEventStore, StoreError};

fn monitor() -> (Arc<SecurityMonitor>, Arc<MemoryEventStore>) {
    let store = Arc::new(MemoryEventStore::default());
    let monitor = Arc::new(SecurityMonitor::new(MonitorConfig::default(), store.clone()));
    (monitor, store)
}

fn aged(event_type: SecurityEventType, severity: Severity, age: chrono::Duration) -> SecurityEvent {
    let mut e = SecurityEvent::new(
        event_type,
        details!(),
        EventOptions::new().severity(severity).user("u1").ip("10.0.0.1"),
    );
    e.timestamp = Utc::now() - age;
    e
}

struct BrokenStore;

#[async_trait]
impl EventStore for BrokenStore {
    async fn append(&self, _events: &[SecurityEvent]) -> StoreResult<()> {
        Err(StoreError::Unavailable("disk full".into()))
    }
    async fn load_since(&self, _cutoff: DateTime<Utc>) -> StoreResult<Vec<SecurityEvent>> {
        Ok(Vec::new())
    }
    async fn purge_before(&self, _cutoff: DateTime<Utc>) -> StoreResult<usize> {
        Err(StoreError::Unavailable("disk full".into()))
    }
    async fn count(&self) -> StoreResult<usize> {
        Ok(0)
    }
}

#[test]
fn test_log_event_defaults() {
    let (monitor, _) = monitor();
    let e = monitor.log_event(
        SecurityEventType::AuthLoginFailure,
        details!("attempts" => 1),
        EventOptions::new().user("alice"),
    );
    assert_eq!(e.severity, Severity::Medium);
    assert_eq!(e.source, "application");
    assert_eq!(monitor.buffer_len(), 1);
    assert_eq!(monitor.status().pending_flush, 1);
}

#[test]
fn test_wrappers_fix_source() {
    let (monitor, _) = monitor();
    let auth = monitor.log_auth_event(SecurityEventType::AuthLogout, details!(), EventOptions::new());
    let rate = monitor.log_rate_limit_event(SecurityEventType::RateLimitExceeded, details!(), EventOptions::new());
    let authz = monitor.log_authz_event(SecurityEventType::AuthzAccessDenied, details!(), EventOptions::new());
    let data = monitor.log_data_event(SecurityEventType::DataExport, details!(), EventOptions::new());
    assert_eq!(auth.source, "auth");
    assert_eq!(rate.source, "rate_limiter");
    assert_eq!(authz.source, "authorization");
    assert_eq!(data.source, "data_access");
}

#[test]
fn test_payment_events_forced_high() {
    let (monitor, _) = monitor();
    let e = monitor.log_payment_event(
        SecurityEventType::PaymentAmountMismatch,
        details!("expected" => 100, "received" => 1),
        EventOptions::new().severity(Severity::Low),
    );
    assert_eq!(e.severity, Severity::High);
    assert_eq!(e.source, "payment");
}

#[test]
fn test_immediate_alert_rules() {
    let (monitor, _) = monitor();
    let check = |t, d, o| {
        let e = SecurityEvent::new(t, d, o);
        monitor.check_immediate_alert(&e)
    };

    assert_eq!(
        check(SecurityEventType::SystemError, details!(), EventOptions::new().severity(Severity::Critical)),
        Some(ImmediateAlertReason::CriticalSeverity)
    );
    assert_eq!(check(SecurityEventType::AuthLoginFailure, details!("attempts" => 5), EventOptions::new()), None);
    assert_eq!(
        check(SecurityEventType::AuthLoginFailure, details!("attempts" => 6), EventOptions::new()),
        Some(ImmediateAlertReason::RepeatedLoginFailures { attempts: 6 })
    );
    assert_eq!(
        check(SecurityEventType::RateLimitIpBlocked, details!(), EventOptions::new()),
        Some(ImmediateAlertReason::IpAutoBlocked)
    );
    assert_eq!(
        check(SecurityEventType::PaymentFraudSuspected, details!(), EventOptions::new().severity(Severity::High)),
        Some(ImmediateAlertReason::PaymentFraudSuspected)
    );
    assert_eq!(check(SecurityEventType::AuthLoginSuccess, details!(), EventOptions::new()), None);
}

#[test]
fn test_recent_events_order_and_filter() {
    let (monitor, _) = monitor();
    monitor.record_event(aged(SecurityEventType::AuthLoginFailure, Severity::Medium, chrono::Duration::minutes(30)));
    monitor.record_event(aged(SecurityEventType::AuthLoginFailure, Severity::High, chrono::Duration::minutes(10)));
    monitor.record_event(aged(SecurityEventType::DataExport, Severity::Low, chrono::Duration::minutes(20)));
    monitor.record_event(aged(SecurityEventType::DataExport, Severity::Low, chrono::Duration::hours(3)));

    let all = monitor.get_recent_events(10, None);
    assert_eq!(all.len(), 4);
    assert!(all.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));

    let limited = monitor.get_recent_events(2, None);
    assert_eq!(limited[0].severity, Severity::High);
    assert_eq!(limited.len(), 2);

    let exports = monitor.get_recent_events(
        10,
        Some(&EventFilter::new().event_type(SecurityEventType::DataExport).timeframe(Duration::from_secs(3600))),
    );
    assert_eq!(exports.len(), 1);

    let nobody = monitor.get_recent_events(10, Some(&EventFilter::new().user("bob")));
    assert!(nobody.is_empty());
}

#[test]
fn test_statistics_window() {
    let (monitor, _) = monitor();
    for i in 0..10 {
        let sev = if i % 2 == 0 { Severity::Low } else { Severity::High };
        monitor.record_event(aged(SecurityEventType::AuthLoginFailure, sev, chrono::Duration::minutes(i * 5)));
    }
    for i in 0..5 {
        monitor.record_event(aged(SecurityEventType::DataExport, Severity::Medium, chrono::Duration::hours(25 + i)));
    }

    let stats = monitor.get_statistics(Duration::from_secs(24 * 3600));
    assert_eq!(stats.total_events, 10);
    assert_eq!(stats.by_severity.values().sum::<usize>(), 10);
    assert_eq!(stats.by_severity.get(&Severity::Low), Some(&5));
    assert_eq!(stats.by_severity.get(&Severity::Medium), None);
    assert_eq!(stats.by_type.get("data.export"), None);
    assert_eq!(stats.unique_users, 1);
    assert_eq!(stats.unique_ips, 1);
}

#[tokio::test]
async fn test_cleanup_is_idempotent() {
    let (monitor, store) = monitor();
    monitor.record_event(aged(SecurityEventType::AuthLogout, Severity::Low, chrono::Duration::days(40)));
    monitor.record_event(aged(SecurityEventType::AuthLogout, Severity::Low, chrono::Duration::days(1)));
    monitor.flush().await.unwrap();
    assert_eq!(store.len(), 2);

    // one from the buffer, one from the store
    assert_eq!(monitor.cleanup_old_events().await, 2);
    assert_eq!(monitor.cleanup_old_events().await, 0);
    assert_eq!(monitor.buffer_len(), 1);
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_cleanup_enforces_buffer_cap() {
    let config = MonitorConfig { max_event_buffer: 3, ..Default::default() };
    let monitor = SecurityMonitor::new(config, Arc::new(MemoryEventStore::default()));
    for _ in 0..5 {
        monitor.log_event(SecurityEventType::AuthLogout, details!(), EventOptions::new());
    }
    // eviction happens at cleanup, not inline
    assert_eq!(monitor.buffer_len(), 5);
    assert_eq!(monitor.cleanup_old_events().await, 2);
    assert_eq!(monitor.buffer_len(), 3);
}

#[tokio::test]
async fn test_flush_moves_pending() {
    let (monitor, store) = monitor();
    monitor.log_event(SecurityEventType::AuthLogout, details!(), EventOptions::new());
    monitor.log_event(SecurityEventType::AuthLogout, details!(), EventOptions::new());

    assert_eq!(monitor.flush().await.unwrap(), 2);
    assert_eq!(monitor.flush().await.unwrap(), 0);
    assert_eq!(store.len(), 2);
    assert!(monitor.status().last_flush.is_some());
}

#[tokio::test]
async fn test_failed_flush_requeues() {
    let monitor = SecurityMonitor::new(MonitorConfig::default(), Arc::new(BrokenStore));
    monitor.log_event(SecurityEventType::AuthLogout, details!(), EventOptions::new());
    assert!(monitor.flush().await.is_err());
    assert_eq!(monitor.status().pending_flush, 1);

    // purge failure is logged, not fatal
    monitor.record_event(aged(SecurityEventType::AuthLogout, Severity::Low, chrono::Duration::days(60)));
    assert_eq!(monitor.cleanup_old_events().await, 1);
}

#[tokio::test]
async fn test_shutdown_flushes_and_is_idempotent() {
    let (monitor, store) = monitor();
    monitor.start();
    monitor.start();
    assert!(monitor.is_running());

    monitor.log_event(SecurityEventType::AuthLoginSuccess, details!(), EventOptions::new());
    monitor.shutdown().await;
    assert!(!monitor.is_running());
    assert_eq!(store.len(), 1);

    monitor.log_event(SecurityEventType::AuthLoginSuccess, details!(), EventOptions::new());
    monitor.shutdown().await;
    assert_eq!(store.len(), 1);

    // a stopped monitor does not restart
    monitor.start();
    assert!(!monitor.is_running());
}

#[tokio::test]
async fn test_periodic_flush() {
    let store = Arc::new(MemoryEventStore::default());
    let config = MonitorConfig { flush_interval_secs: 1, ..Default::default() };
    let monitor = Arc::new(SecurityMonitor::new(config, store.clone()));
    monitor.start();

    monitor.log_event(SecurityEventType::AuthLogout, details!(), EventOptions::new());
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(store.len(), 1);

    monitor.shutdown().await;
}

#[tokio::test]
async fn test_restore_after_restart() {
    let store = Arc::new(MemoryEventStore::default());
    let expired = aged(SecurityEventType::AuthLoginFailure, Severity::Medium, chrono::Duration::days(40));
    let older = aged(SecurityEventType::AuthLoginFailure, Severity::Medium, chrono::Duration::hours(5));
    let newer = aged(SecurityEventType::RateLimitExceeded, Severity::High, chrono::Duration::hours(1));
    store.append(&[expired, older.clone(), newer.clone()]).await.unwrap();

    let monitor = SecurityMonitor::new(MonitorConfig::default(), store.clone());
    monitor.record_event(newer.clone());

    assert_eq!(monitor.restore_from_store().await.unwrap(), 1);
    assert_eq!(monitor.restore_from_store().await.unwrap(), 0);
    assert_eq!(monitor.buffer_len(), 2);
    assert_eq!(monitor.status().pending_flush, 1);

    let recent = monitor.get_recent_events(10, None);
    assert_eq!(recent[0].id, newer.id);
    assert_eq!(recent[1].id, older.id);
    assert_eq!(monitor.related_events(Some("u1"), None, 10).len(), 2);
    assert_eq!(monitor.get_statistics(Duration::from_secs(24 * 3600)).total_events, 2);
}

#[tokio::test]
async fn test_restore_respects_buffer_cap() {
    let store = Arc::new(MemoryEventStore::default());
    let events: Vec<_> = (1..=3)
        .map(|h| aged(SecurityEventType::AuthLogout, Severity::Low, chrono::Duration::hours(h)))
        .collect();
    store.append(&events).await.unwrap();

    let config = MonitorConfig { max_event_buffer: 2, ..MonitorConfig::default() };
    let monitor = SecurityMonitor::new(config, store);
    assert_eq!(monitor.restore_from_store().await.unwrap(), 2);

    let ids: Vec<String> = monitor.get_recent_events(10, None).into_iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![events[0].id.clone(), events[1].id.clone()]);
}
