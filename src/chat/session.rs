use super::ChatState;
use crate::{
    event::unix_millis, Connection, Event, EventKind, EventPayload, FrameReader, FrameWriter,
    HandlerCtx, Message, MessageStore, PublicEvent, Token,
};
use std::{
    sync::atomic::AtomicU32,
    time::{Duration, SystemTime},
};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, instrument, warn, Instrument};
use uuid::Uuid;

/// How long a stopped writer may take to finish its current write before it
/// is aborted.
const WRITER_GRACE: Duration = Duration::from_secs(1);

/// One client's chat session, started by the chatting handshake.
///
/// The session owns the connection. Its reader runs on the connection task
/// and its writer on a task spawned on the connection's task set. Once the
/// session starts, the writer is the only task that writes to the socket.
#[derive(Debug)]
pub(super) struct ChatSession<S> {
    state: ChatState<S>,
    token: Token,
    ctx: HandlerCtx,
}

impl<S> ChatSession<S>
where
    S: MessageStore + Clone,
{
    pub(super) const fn new(state: ChatState<S>, token: Token, ctx: HandlerCtx) -> Self {
        Self { state, token, ctx }
    }

    /// Relay events until the client disconnects or the server shuts down.
    #[instrument(skip_all, fields(conn_id = conn.id(), user_id = self.token.user_id))]
    pub(super) async fn run(self, conn: Connection) {
        let (mut reader, writer) = conn.into_split();
        let (subscription, events) = self
            .state
            .bus
            .subscription(EventKind::NewMessage, self.state.buffer);
        info!(slot_id = subscription.slot_id(), "new subscriber");

        let (stop_tx, stop_rx) = oneshot::channel();
        let writer = self
            .ctx
            .spawn(write_events(writer, events, stop_rx).in_current_span());

        self.read_events(&mut reader).await;

        let _ = stop_tx.send(());
        subscription.unsubscribe();

        // a peer that stopped reading can leave the writer blocked on a full socket
        let abort = writer.abort_handle();
        match tokio::time::timeout(WRITER_GRACE, writer).await {
            Ok(Ok(_)) => {}
            Ok(Err(err)) => error!(%err, "event writer failed"),
            Err(_) => {
                warn!("event writer stalled, aborting");
                abort.abort();
            }
        }
    }

    async fn read_events(&self, reader: &mut FrameReader) {
        let received = AtomicU32::new(0);
        loop {
            let frame = match reader.read_frame().await {
                Ok(frame) => frame,
                Err(err) if err.is_eof() => {
                    info!("client disconnected");
                    break;
                }
                Err(err) => {
                    error!(%err, "error to read frame");
                    break;
                }
            };
            message_event!(@received, counter: received, bytes: frame.len(), );

            match PublicEvent::decode(&frame).and_then(Event::try_from) {
                Ok(event) => self.handle_event(event).await,
                Err(err) => warn!(%err, "rejected event"),
            }
        }
    }

    /// Persist the event if it creates a message, then publish it.
    async fn handle_event(&self, mut event: Event) {
        match &mut event.payload {
            EventPayload::NewMessage(msg) => {
                let now = unix_millis(SystemTime::now());
                msg.sender_id = self.token.user_id;
                msg.created_at = now;
                msg.updated_at = now;

                let stored = Message {
                    id: Uuid::nil(),
                    sender_id: msg.sender_id,
                    message_kind: msg.message_kind,
                    message: msg.message.clone(),
                    created_at: now,
                    updated_at: now,
                };
                match self.state.store.create_message(stored).await {
                    Ok(id) => msg.id = id.to_string(),
                    Err(err) => {
                        error!(%err, "failed to create message");
                        return;
                    }
                }
            }
        }

        let delivered = self.state.bus.publish(&event);
        debug!(event_id = %event.id, kind = %event.kind(), delivered, "published event");
    }
}

async fn write_events(
    mut writer: FrameWriter,
    mut events: mpsc::Receiver<Event>,
    mut stop: oneshot::Receiver<()>,
) {
    let sent = AtomicU32::new(0);
    loop {
        let event = tokio::select! {
            biased;
            _ = &mut stop => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        let frame = match event.to_frame() {
            Ok(frame) => frame,
            Err(err) => {
                error!(%err, event_id = %event.id, "failed to serialize event");
                continue;
            }
        };
        message_event!(@sent, counter: sent, bytes: frame.len(), );

        if let Err(err) = writer.write_frame(frame).await {
            debug!(%err, "failed to write event");
            break;
        }
    }

    if let Err(err) = writer.close().await {
        debug!(%err, "failed to close connection");
    }
}
