use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::Client;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::error::PublishError;
use super::event::ResourceStateEvent;

/// Sink for lifecycle events.
///
/// `publish` is called from inside state transitions and must not block on
/// the network; implementations that deliver remotely hand the work off.
pub trait EventDistributor: Send + Sync {
    fn publish(&self, event: ResourceStateEvent) -> Result<(), PublishError>;
}

/// Looks up the distributor to publish to, for listeners that bind it
/// lazily.
pub trait DistributorProvider: Send + Sync {
    fn event_distributor(&self) -> Option<Arc<dyn EventDistributor>>;
}

impl<F> DistributorProvider for F
where
    F: Fn() -> Option<Arc<dyn EventDistributor>> + Send + Sync,
{
    fn event_distributor(&self) -> Option<Arc<dyn EventDistributor>> {
        self()
    }
}

const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out of events to any number of subscribers.
pub struct EventBus {
    sender: broadcast::Sender<ResourceStateEvent>,
}

impl EventBus {
    /// When the buffer is full the oldest events are dropped and slow
    /// receivers observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ResourceStateEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventDistributor for EventBus {
    fn publish(&self, event: ResourceStateEvent) -> Result<(), PublishError> {
        // A send error only means nobody is subscribed.
        let _ = self.sender.send(event);
        Ok(())
    }
}

/// Delivers events as JSON `POST`s to an HTTP endpoint.
///
/// `publish` spawns the request on the current tokio runtime and returns
/// immediately; delivery failures are logged by the spawned task. Spawned
/// deliveries are tracked so [`flush`](Self::flush) can wait for them
/// before the runtime goes away.
#[derive(Debug, Clone)]
pub struct WebhookDistributor {
    client: Client,
    url: String,
    deliveries: Arc<Mutex<JoinSet<()>>>,
}

impl WebhookDistributor {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, PublishError> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
            deliveries: Arc::new(Mutex::new(JoinSet::new())),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Deliveries spawned by `publish` that have not been reaped yet.
    pub fn pending(&self) -> usize {
        self.deliveries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Deliver one event and wait for the endpoint's answer.
    pub async fn send(&self, event: &ResourceStateEvent) -> Result<(), PublishError> {
        let response = self.client.post(&self.url).json(event).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(PublishError::Status {
                status: status.as_u16(),
                body,
            });
        }
        debug!(url = %self.url, resource = %event.resource_uuid, "event delivered");
        Ok(())
    }

    /// Wait up to `timeout` for every spawned delivery. Deliveries still in
    /// flight afterwards are aborted and logged; their count is returned.
    pub async fn flush(&self, timeout: Duration) -> usize {
        let mut in_flight = std::mem::take(
            &mut *self.deliveries.lock().unwrap_or_else(|e| e.into_inner()),
        );
        let drained = tokio::time::timeout(timeout, async {
            while in_flight.join_next().await.is_some() {}
        })
        .await;
        if drained.is_ok() {
            return 0;
        }

        let undelivered = in_flight.len();
        in_flight.abort_all();
        warn!(
            url = %self.url,
            undelivered,
            "dropping resource state events still in flight"
        );
        undelivered
    }
}

impl EventDistributor for WebhookDistributor {
    fn publish(&self, event: ResourceStateEvent) -> Result<(), PublishError> {
        let handle = Handle::try_current().map_err(|_| PublishError::NoRuntime)?;
        let distributor = self.clone();

        let mut deliveries = self.deliveries.lock().unwrap_or_else(|e| e.into_inner());
        while deliveries.try_join_next().is_some() {}
        deliveries.spawn_on(
            async move {
                if let Err(err) = distributor.send(&event).await {
                    warn!(
                        url = %distributor.url,
                        event_type = %event.event_type,
                        resource = %event.resource_uuid,
                        "failed to deliver resource state event: {err}"
                    );
                }
            },
            &handle,
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::events::TransitionPhase;

    fn event() -> ResourceStateEvent {
        ResourceStateEvent::state_change(
            "CreateRequested",
            "Snapshot",
            "snap-1",
            "Allocated",
            "Creating",
            TransitionPhase::PostStateTransitionEvent,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn bus_fans_out_to_subscribers() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(event()).unwrap();

        assert_eq!(rx1.recv().await.unwrap().resource_uuid, "snap-1");
        assert_eq!(rx2.recv().await.unwrap().new_state(), Some("Creating"));
    }

    #[test]
    fn bus_without_subscribers_accepts_events() {
        let bus = EventBus::new(4);
        assert!(bus.publish(event()).is_ok());
    }

    #[tokio::test]
    async fn provider_closure_returns_distributor() {
        let bus: Arc<dyn EventDistributor> = Arc::new(EventBus::default());
        let provider = move || Some(bus.clone());
        assert!(provider.event_distributor().is_some());
    }

    #[tokio::test]
    async fn webhook_posts_event_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/events"))
            .and(header("content-type", "application/json"))
            .and(body_partial_json(serde_json::json!({
                "resource_type": "Snapshot",
                "event_type": "CreateRequested",
                "phase": "postStateTransitionEvent",
            })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let webhook =
            WebhookDistributor::new(format!("{}/events", server.uri()), Duration::from_secs(5))
                .unwrap();
        webhook.send(&event()).await.unwrap();
    }

    #[tokio::test]
    async fn webhook_reports_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("bus down"))
            .mount(&server)
            .await;

        let webhook = WebhookDistributor::new(server.uri(), Duration::from_secs(5)).unwrap();
        let err = webhook.send(&event()).await.unwrap_err();
        assert!(matches!(err, PublishError::Status { status: 503, ref body } if body == "bus down"));
    }

    #[tokio::test]
    async fn webhook_publish_delivers_in_background() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let webhook = WebhookDistributor::new(server.uri(), Duration::from_secs(5)).unwrap();
        webhook.publish(event()).unwrap();

        let mut delivered = 0;
        for _ in 0..50 {
            delivered = server.received_requests().await.map_or(0, |r| r.len());
            if delivered > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(delivered, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn flush_waits_for_every_delivery() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(50)))
            .mount(&server)
            .await;

        let webhook = WebhookDistributor::new(server.uri(), Duration::from_secs(5)).unwrap();
        for _ in 0..20 {
            webhook.publish(event()).unwrap();
        }
        assert!(webhook.pending() > 0);

        assert_eq!(webhook.flush(Duration::from_secs(5)).await, 0);
        assert_eq!(webhook.pending(), 0);
        assert_eq!(server.received_requests().await.unwrap().len(), 20);
    }

    #[tokio::test]
    async fn flush_gives_up_on_slow_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(10)))
            .mount(&server)
            .await;

        let webhook = WebhookDistributor::new(server.uri(), Duration::from_secs(30)).unwrap();
        webhook.publish(event()).unwrap();
        webhook.publish(event()).unwrap();

        assert_eq!(webhook.flush(Duration::from_millis(100)).await, 2);
        assert_eq!(webhook.pending(), 0);
    }

    #[test]
    fn webhook_publish_needs_a_runtime() {
        let webhook =
            WebhookDistributor::new("http://127.0.0.1:9/events", Duration::from_secs(1)).unwrap();
        assert!(matches!(
            webhook.publish(event()),
            Err(PublishError::NoRuntime)
        ));
    }
}
