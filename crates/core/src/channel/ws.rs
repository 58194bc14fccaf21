//! Websocket legs backed by `tokio-tungstenite`.

use super::{
    ABNORMAL_CLOSURE, ChannelError, ChannelEvent, ChannelHandle, ChannelSink, CloseEvent,
    Connector, Frame, Leg,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        client::IntoClientRequest,
        protocol::{CloseFrame, Message as WsMessage, frame::coding::CloseCode},
    },
};
use tracing::{Instrument, debug, info, info_span, warn};

/// Opens each leg as its own websocket connection.
///
/// Connections are not retried: a dropped socket surfaces as a `Close`
/// event and the owning session closes with it.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

enum Outgoing {
    Frame(Frame),
    Close,
}

struct WsSink {
    leg: Leg,
    tx: mpsc::UnboundedSender<Outgoing>,
}

impl ChannelSink for WsSink {
    fn send(&self, frame: Frame) -> Result<(), ChannelError> {
        self.tx
            .send(Outgoing::Frame(frame))
            .map_err(|_| ChannelError::Closed(self.leg))
    }

    fn close(&self) {
        let _ = self.tx.send(Outgoing::Close);
    }
}

impl Connector for WsConnector {
    fn connect(&self, leg: Leg, endpoint: &str) -> ChannelHandle {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let endpoint = endpoint.to_string();

        let span = info_span!("ws_leg", %leg);
        tokio::spawn(run_leg(endpoint, out_rx, event_tx).instrument(span));

        ChannelHandle {
            sink: Box::new(WsSink { leg, tx: out_tx }),
            events: event_rx,
        }
    }
}

/// Connects, then shuttles frames both ways until either side closes.
async fn run_leg(
    endpoint: String,
    mut out_rx: mpsc::UnboundedReceiver<Outgoing>,
    events: mpsc::UnboundedSender<ChannelEvent>,
) {
    let request = match endpoint.as_str().into_client_request() {
        Ok(request) => request,
        Err(e) => {
            let _ = events.send(ChannelEvent::Error(format!("invalid endpoint: {}", e)));
            let _ = events.send(ChannelEvent::Close(CloseEvent::abnormal("invalid endpoint")));
            return;
        }
    };

    // Frames queued before the socket is up stay in `out_rx` until the loop starts.
    let ws_stream = match connect_async(request).await {
        Ok((ws_stream, _)) => ws_stream,
        Err(e) => {
            warn!(error = %e, "Failed to connect websocket");
            let _ = events.send(ChannelEvent::Error(e.to_string()));
            let _ = events.send(ChannelEvent::Close(CloseEvent::abnormal("connect failed")));
            return;
        }
    };
    info!(%endpoint, "Websocket connected.");
    let _ = events.send(ChannelEvent::Open);

    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    loop {
        tokio::select! {
            outgoing = out_rx.recv() => match outgoing {
                Some(Outgoing::Frame(frame)) => {
                    let msg = match frame {
                        Frame::Text(text) => WsMessage::Text(text.into()),
                        Frame::Binary(data) => WsMessage::Binary(data.into()),
                    };
                    if let Err(e) = ws_tx.send(msg).await {
                        let _ = events.send(ChannelEvent::Error(e.to_string()));
                    }
                }
                Some(Outgoing::Close) | None => {
                    let close = CloseFrame { code: CloseCode::Normal, reason: "".into() };
                    let _ = ws_tx.send(WsMessage::Close(Some(close))).await;
                    let _ = ws_tx.close().await;
                    let _ = events.send(ChannelEvent::Close(CloseEvent::normal()));
                    break;
                }
            },
            incoming = ws_rx.next() => match incoming {
                Some(Ok(WsMessage::Text(text))) => {
                    let _ = events.send(ChannelEvent::Message(Frame::Text(text.to_string())));
                }
                Some(Ok(WsMessage::Binary(data))) => {
                    let _ = events.send(ChannelEvent::Message(Frame::Binary(data.to_vec())));
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    let close = frame
                        .map(|f| CloseEvent { code: u16::from(f.code), reason: f.reason.to_string() })
                        .unwrap_or_else(|| CloseEvent { code: 1005, reason: String::new() });
                    info!(code = close.code, reason = %close.reason, "Websocket closed by server.");
                    let _ = events.send(ChannelEvent::Close(close));
                    break;
                }
                // Pings are answered by tungstenite itself.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "Error reading from websocket");
                    let _ = events.send(ChannelEvent::Error(e.to_string()));
                    let _ = events.send(ChannelEvent::Close(CloseEvent {
                        code: ABNORMAL_CLOSURE,
                        reason: e.to_string(),
                    }));
                    break;
                }
                None => {
                    debug!("Websocket stream ended without a close frame.");
                    let _ = events.send(ChannelEvent::Close(CloseEvent::abnormal("stream ended")));
                    break;
                }
            },
        }
    }
}
