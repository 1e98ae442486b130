use crate::error::EngineError;
use crate::transport::{SubscriptionToken, TriggerTransport};
use nodedeck_core::TriggerPayload;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::info;

/// Event name the tray publishes node triggers under.
pub const TRIGGER_EVENT: &str = "trigger-action";

/// Subscription lifecycle for external trigger events:
/// `Unsubscribed → Subscribed → Unsubscribed`, terminal on teardown.
///
/// The listener does not touch engine state itself. Payloads surface on
/// the returned receiver and are applied by whoever owns the engine, so
/// trigger processing stays on the single-writer path. Teardown is
/// idempotent and also runs on drop; once it has begun, the transport no
/// longer delivers into the channel.
#[derive(Debug)]
pub struct TriggerListener {
    token: Option<SubscriptionToken>,
}

impl TriggerListener {
    /// Subscribe to `event` on the transport. A subscription failure is
    /// fatal to engine setup and propagates to the constructor's caller.
    pub fn subscribe(
        transport: &dyn TriggerTransport,
        event: &str,
    ) -> Result<(Self, UnboundedReceiver<TriggerPayload>), EngineError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let token = transport
            .subscribe(event, tx)
            .map_err(|err| EngineError::Subscription {
                message: err.to_string(),
            })?;
        info!(event, "trigger listener subscribed");
        Ok((Self { token: Some(token) }, rx))
    }

    pub fn is_subscribed(&self) -> bool {
        self.token.as_ref().is_some_and(SubscriptionToken::is_active)
    }

    /// Unsubscribe exactly once; safe to call again after teardown or if
    /// the subscription already failed.
    pub fn teardown(&mut self) {
        if let Some(mut token) = self.token.take() {
            token.unsubscribe();
            info!("trigger listener torn down");
        }
    }
}

impl Drop for TriggerListener {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{LocalTrayTransport, SubscribeError};
    use nodedeck_core::{TraySection, TrayVerb};
    use tokio::sync::mpsc::UnboundedSender;

    struct RefusingTransport;

    impl TriggerTransport for RefusingTransport {
        fn subscribe(
            &self,
            _event: &str,
            _sink: UnboundedSender<TriggerPayload>,
        ) -> Result<SubscriptionToken, SubscribeError> {
            Err(SubscribeError("tray bridge offline".to_string()))
        }
    }

    fn payload(node: &str) -> TriggerPayload {
        TriggerPayload {
            node_name: node.to_string(),
            section: TraySection::Controls,
            action: TrayVerb::Start,
        }
    }

    #[test]
    fn subscription_failure_is_fatal_and_surfaced() {
        let result = TriggerListener::subscribe(&RefusingTransport, TRIGGER_EVENT);
        match result {
            Err(EngineError::Subscription { message }) => {
                assert!(message.contains("tray bridge offline"));
            }
            other => panic!("expected subscription failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn payloads_flow_in_order_until_teardown() {
        let transport = LocalTrayTransport::new();
        let (mut listener, mut rx) =
            TriggerListener::subscribe(&transport, TRIGGER_EVENT).expect("subscribe");
        assert!(listener.is_subscribed());

        transport.emit(TRIGGER_EVENT, payload("alpha"));
        transport.emit(TRIGGER_EVENT, payload("beta"));
        listener.teardown();
        // Emitted after teardown began: must not reach the channel.
        transport.emit(TRIGGER_EVENT, payload("gamma"));

        let mut seen = Vec::new();
        while let Some(received) = rx.recv().await {
            seen.push(received.node_name);
        }
        assert_eq!(seen, vec!["alpha", "beta"]);
        assert!(!listener.is_subscribed());
    }

    #[test]
    fn teardown_twice_is_safe() {
        let transport = LocalTrayTransport::new();
        let (mut listener, _rx) =
            TriggerListener::subscribe(&transport, TRIGGER_EVENT).expect("subscribe");

        listener.teardown();
        listener.teardown();
        assert!(!listener.is_subscribed());
        assert_eq!(transport.emit(TRIGGER_EVENT, payload("alpha")), 0);
    }

    #[test]
    fn drop_releases_the_subscription() {
        let transport = LocalTrayTransport::new();
        {
            let (_listener, _rx) =
                TriggerListener::subscribe(&transport, TRIGGER_EVENT).expect("subscribe");
        }
        assert_eq!(transport.emit(TRIGGER_EVENT, payload("alpha")), 0);
    }
}
