//! Native WebSocket transport using tokio-tungstenite.

use std::time::Duration;

use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures_util::{SinkExt, StreamExt};
use tokio::task::AbortHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use super::{ChannelId, Transport, TransportError, TransportEvent, TransportFactory, TransportSink};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// One socket at a time, driven by a task on the current `LocalSet`.
#[derive(Default)]
pub struct WsTransport {
    outbound: Option<UnboundedSender<Message>>,
    task: Option<AbortHandle>,
}

impl WsTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transport for WsTransport {
    fn open(&mut self, url: &str, sink: TransportSink) {
        self.outbound = None;
        if let Some(task) = self.task.take() {
            task.abort();
        }

        let (sender, receiver) = unbounded();
        self.outbound = Some(sender);
        let handle = tokio::task::spawn_local(run_connection(url.to_string(), receiver, sink));
        self.task = Some(handle.abort_handle());
    }

    fn send(&mut self, frame: String) -> Result<(), TransportError> {
        let Some(sender) = self.outbound.as_ref() else {
            return Err(TransportError::NotOpen);
        };
        sender
            .unbounded_send(Message::Text(frame.into()))
            .map_err(|e| TransportError::Io(format!("connection task stopped: {e}")))
    }

    fn close(&mut self) {
        // The connection task sees the queue end, sends a close frame and reports `Closed`.
        self.outbound = None;
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Creates a [`WsTransport`] per channel.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsTransportFactory;

impl TransportFactory for WsTransportFactory {
    fn create(&self, _id: &ChannelId) -> Box<dyn Transport> {
        Box::new(WsTransport::new())
    }
}

async fn run_connection(
    url: String,
    mut outbound: UnboundedReceiver<Message>,
    sink: TransportSink,
) {
    let stream = match tokio::time::timeout(CONNECT_TIMEOUT, connect_async(url.as_str())).await {
        Ok(Ok((stream, _response))) => stream,
        Ok(Err(e)) => {
            sink.deliver(TransportEvent::Error(e.to_string()));
            return;
        }
        Err(_) => {
            sink.deliver(TransportEvent::Error(format!(
                "timed out after {}s connecting to {url}",
                CONNECT_TIMEOUT.as_secs()
            )));
            return;
        }
    };
    sink.deliver(TransportEvent::Opened);

    let (mut write, mut read) = stream.split();
    let outcome = loop {
        tokio::select! {
            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    sink.deliver(TransportEvent::Frame(text.as_str().to_string()));
                }
                Some(Ok(Message::Close(frame))) => {
                    break TransportEvent::Closed {
                        reason: frame.map(|f| f.reason.as_str().to_string()),
                    };
                }
                Some(Ok(Message::Ping(data))) => {
                    // Pong is handled automatically by tungstenite
                    tracing::trace!("received ping: {:?}", data);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => break TransportEvent::Error(e.to_string()),
                None => break TransportEvent::Closed { reason: None },
            },
            queued = outbound.next() => match queued {
                Some(message) => {
                    if let Err(e) = write.send(message).await {
                        break TransportEvent::Error(e.to_string());
                    }
                }
                None => {
                    if let Err(e) = write.close().await {
                        tracing::debug!("close handshake failed: {e}");
                    }
                    break TransportEvent::Closed {
                        reason: Some("closed by client".to_string()),
                    };
                }
            },
        }
    };
    sink.deliver(outcome);
}
