//! Long-lived reachability watch on the catalog host.
//!
//! `ReachabilityMonitor::start` spawns a task that probes the host with a TCP
//! connect every interval and publishes transitions on the `EventBus`. The
//! task lives exactly as long as the monitor: `stop()` or dropping it aborts
//! the probe loop.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::events::{CatalogEvent, EventBus};

/// Upper bound on a single connect probe.
const PROBE_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Reachability {
    /// No probe has completed yet.
    Unknown = 0,
    Reachable = 1,
    Unreachable = 2,
}

impl From<u8> for Reachability {
    fn from(v: u8) -> Self {
        match v {
            1 => Reachability::Reachable,
            2 => Reachability::Unreachable,
            _ => Reachability::Unknown,
        }
    }
}

impl Reachability {
    /// Event to publish when moving from `self` to `next`, if any.
    pub fn transition(self, next: Reachability) -> Option<CatalogEvent> {
        match (self, next) {
            (Reachability::Unreachable, Reachability::Unreachable) => None,
            (_, Reachability::Unreachable) => Some(CatalogEvent::ConnectivityLost),
            (Reachability::Unreachable, Reachability::Reachable) => {
                Some(CatalogEvent::ConnectivityRestored)
            }
            _ => None,
        }
    }
}

pub struct ReachabilityMonitor {
    host: String,
    state: Arc<AtomicU8>,
    handle: Option<JoinHandle<()>>,
}

impl ReachabilityMonitor {
    /// Start watching `host:port`. Must be called inside a tokio runtime.
    pub fn start(host: impl Into<String>, port: u16, interval: Duration, events: EventBus) -> Self {
        let host = host.into();
        let state = Arc::new(AtomicU8::new(Reachability::Unknown as u8));
        let interval = interval.max(Duration::from_millis(10));

        info!(host = %host, port, ?interval, "Starting reachability monitor");

        let task_state = Arc::clone(&state);
        let task_host = host.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let next = probe(&task_host, port).await;
                let prev = Reachability::from(task_state.swap(next as u8, Ordering::SeqCst));
                if prev != next {
                    debug!(host = %task_host, ?prev, ?next, "Reachability changed");
                }
                if let Some(event) = prev.transition(next) {
                    if event == CatalogEvent::ConnectivityLost {
                        warn!(host = %task_host, "Catalog host unreachable");
                    }
                    events.emit(event);
                }
            }
        });

        Self {
            host,
            state,
            handle: Some(handle),
        }
    }

    /// Last observed status.
    pub fn status(&self) -> Reachability {
        Reachability::from(self.state.load(Ordering::SeqCst))
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop probing. Idempotent.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            info!(host = %self.host, "Reachability monitor stopped");
        }
    }
}

impl Drop for ReachabilityMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn probe(host: &str, port: u16) -> Reachability {
    let connect = TcpStream::connect((host, port));
    match tokio::time::timeout(Duration::from_secs(PROBE_TIMEOUT_SECS), connect).await {
        Ok(Ok(_)) => Reachability::Reachable,
        Ok(Err(e)) => {
            debug!(host, port, error = %e, "Reachability probe failed");
            Reachability::Unreachable
        }
        Err(_) => {
            debug!(host, port, "Reachability probe timed out");
            Reachability::Unreachable
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_transitions() {
        use Reachability::*;
        assert_eq!(Unknown.transition(Unreachable), Some(CatalogEvent::ConnectivityLost));
        assert_eq!(Reachable.transition(Unreachable), Some(CatalogEvent::ConnectivityLost));
        assert_eq!(Unreachable.transition(Unreachable), None);
        assert_eq!(Unreachable.transition(Reachable), Some(CatalogEvent::ConnectivityRestored));
        assert_eq!(Unknown.transition(Reachable), None);
        assert_eq!(Reachable.transition(Reachable), None);
    }

    #[test]
    fn test_from_u8() {
        assert_eq!(Reachability::from(1), Reachability::Reachable);
        assert_eq!(Reachability::from(2), Reachability::Unreachable);
        assert_eq!(Reachability::from(9), Reachability::Unknown);
    }

    #[tokio::test]
    async fn test_monitor_reports_lost_connectivity() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let mut monitor =
            ReachabilityMonitor::start("127.0.0.1", port, Duration::from_millis(20), bus.clone());

        tokio::time::timeout(Duration::from_secs(2), async {
            while monitor.status() != Reachability::Reachable {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("host should be reachable while listening");

        drop(listener);

        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("no event before timeout")
            .unwrap();
        assert_eq!(event, CatalogEvent::ConnectivityLost);
        assert_eq!(monitor.status(), Reachability::Unreachable);

        monitor.stop();
        monitor.stop();
        assert!(!monitor.is_running());
    }
}
