//! SSE-backed change-notification subscription.
//!
//! The handler boundary lives here: every received payload is decoded
//! inside [`SseEventSubscription::next_event`], and a payload that fails to
//! decode is logged, counted, and skipped — the subscription keeps
//! delivering later events. Only a transport-level failure surfaces as an
//! error, at which point the coordinator drops the subscription and asks
//! the bus for a fresh one.

use async_trait::async_trait;
use eventsource_stream::Eventsource as _;
use futures_util::{Stream, StreamExt as _};
use gatesync_types::{ChangeEvent, EventBus, EventSubscription, SyncError, error::Result};
use std::pin::Pin;
use std::time::Duration;

type DataStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// An [`EventBus`] that consumes a server-sent-events endpoint.
pub struct SseEventBus {
    events_url: String,
    channel: String,
    http: reqwest::Client,
}

impl SseEventBus {
    /// Creates a bus client for the given SSE endpoint.
    ///
    /// Only the connection attempt is bounded by `connect_timeout`; the
    /// established stream is long-lived and must not carry a total request
    /// timeout.
    #[must_use]
    pub fn new(
        events_url: impl Into<String>,
        channel: impl Into<String>,
        connect_timeout: Duration,
    ) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            events_url: events_url.into(),
            channel: channel.into(),
            http,
        }
    }
}

#[async_trait]
impl EventBus for SseEventBus {
    async fn subscribe(&self) -> Result<Box<dyn EventSubscription>> {
        let response = self
            .http
            .get(&self.events_url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| SyncError::Bus(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Bus(format!(
                "event endpoint returned status {status}"
            )));
        }

        let data = response
            .bytes_stream()
            .eventsource()
            .map(|item| match item {
                Ok(event) => Ok(event.data),
                Err(e) => Err(SyncError::Bus(e.to_string())),
            });

        tracing::info!(url = self.events_url.as_str(), channel = self.channel.as_str(), "subscribed to change notifications");
        Ok(Box::new(SseEventSubscription::new(data)))
    }

    fn channel(&self) -> &str {
        &self.channel
    }
}

/// A live subscription decoding SSE data payloads into [`ChangeEvent`]s.
pub struct SseEventSubscription {
    data: DataStream,
}

impl SseEventSubscription {
    /// Wraps a stream of raw SSE data payloads.
    pub fn new(data: impl Stream<Item = Result<String>> + Send + 'static) -> Self {
        Self {
            data: Box::pin(data),
        }
    }
}

#[async_trait]
impl EventSubscription for SseEventSubscription {
    async fn next_event(&mut self) -> Result<Option<ChangeEvent>> {
        loop {
            match self.data.next().await {
                Some(Ok(payload)) => match serde_json::from_str::<ChangeEvent>(&payload) {
                    Ok(event) => return Ok(Some(event)),
                    Err(e) => {
                        // One bad message never stops delivery.
                        tracing::warn!(error = %e, payload = payload.as_str(), "discarding malformed change notification");
                        metrics::counter!("gatesync_refresh_events_discarded_total").increment(1);
                    }
                },
                Some(Err(e)) => return Err(e),
                None => return Ok(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use gatesync_types::{ChangeEventType, ChangeOperation};

    fn event_json(event_type: &str) -> String {
        format!(
            r#"{{
                "eventId": "8f5a0f36-7d3c-4ab1-9c60-1f2d3e4a5b6c",
                "timestamp": "2025-11-04T10:15:30Z",
                "eventType": "{event_type}",
                "operation": "UPDATE"
            }}"#
        )
    }

    #[tokio::test]
    async fn test_decodes_events_in_order() {
        let mut sub = SseEventSubscription::new(stream::iter(vec![
            Ok(event_json("ACCESS_CONFIG")),
            Ok(event_json("KEY_CONFIG")),
        ]));
        let first = sub.next_event().await.unwrap().unwrap();
        assert_eq!(first.event_type, ChangeEventType::AccessConfig);
        let second = sub.next_event().await.unwrap().unwrap();
        assert_eq!(second.event_type, ChangeEventType::KeyConfig);
        assert!(sub.next_event().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_malformed_payload_skipped_not_fatal() {
        let mut sub = SseEventSubscription::new(stream::iter(vec![
            Ok("{ not json".to_string()),
            Ok("{\"wrong\": \"shape\"}".to_string()),
            Ok(event_json("ROUTE_CONFIG")),
        ]));
        // Both bad payloads are skipped; the good one still arrives.
        let event = sub.next_event().await.unwrap().unwrap();
        assert_eq!(event.event_type, ChangeEventType::RouteConfig);
        assert_eq!(event.operation, ChangeOperation::Update);
    }

    #[tokio::test]
    async fn test_transport_error_surfaces() {
        let mut sub = SseEventSubscription::new(stream::iter(vec![
            Ok(event_json("FULL")),
            Err(SyncError::Bus("connection reset".into())),
        ]));
        assert!(sub.next_event().await.unwrap().is_some());
        let err = sub.next_event().await.unwrap_err();
        assert!(matches!(err, SyncError::Bus(_)));
    }

    #[tokio::test]
    async fn test_clean_close_yields_none() {
        let mut sub = SseEventSubscription::new(stream::iter(Vec::<Result<String>>::new()));
        assert!(sub.next_event().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_bus_error() {
        let bus = SseEventBus::new(
            "http://127.0.0.1:1/events",
            "gateway-config",
            Duration::from_millis(250),
        );
        let err = bus.subscribe().await.err().unwrap();
        assert!(matches!(err, SyncError::Bus(_)));
        assert!(err.is_retryable());
        assert_eq!(bus.channel(), "gateway-config");
    }
}
