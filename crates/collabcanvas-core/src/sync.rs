//! Blocking WebSocket transport for native clients.
//!
//! [`NativeWebSocket::connect`] performs the handshake on the calling thread,
//! so a refused connection is an ordinary error. The open socket is then
//! owned by a worker thread that writes queued frames and reads server
//! frames between short read timeouts. The UI loop calls
//! [`NativeWebSocket::pump`] once per frame to exchange traffic with a
//! [`CollaborationManager`] without ever blocking on the network.
//!
//! There is no reconnect: once closed, connect again and the server treats
//! the client as a new participant.

use crate::collaboration::{ClientEvent, CollaborationManager};
use crate::error::{SyncError, SyncResult};
use crate::protocol::ServerMessage;
use crate::replay::Surface;

/// Whether the worker still owns a live socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Open,
    Closed,
}

/// Something the worker observed.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// A parsed server frame.
    Message(ServerMessage),
    /// The socket is gone, with the transport error if it did not close
    /// cleanly.
    Closed { error: Option<String> },
}

#[cfg(not(target_arch = "wasm32"))]
mod native {
    use super::*;
    use std::net::TcpStream;
    use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
    use std::thread::{self, JoinHandle};
    use std::time::Duration;
    use tungstenite::stream::MaybeTlsStream;
    use tungstenite::{Message, WebSocket};
    use url::Url;

    /// Longest a worker blocks in `read` before servicing outgoing frames.
    const POLL_INTERVAL: Duration = Duration::from_millis(20);

    type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

    enum Outgoing {
        Frame(String),
        Close,
    }

    /// Owns the socket on the worker thread.
    struct Worker {
        socket: Socket,
        outgoing: Receiver<Outgoing>,
        events: Sender<SyncEvent>,
    }

    impl Worker {
        fn run(mut self) {
            let error = self.pump().err().map(|e| e.to_string());
            if let Some(e) = &error {
                log::warn!("websocket worker stopped: {e}");
            }
            let _ = self.events.send(SyncEvent::Closed { error });
        }

        fn pump(&mut self) -> Result<(), tungstenite::Error> {
            loop {
                if !self.flush_outgoing()? {
                    let _ = self.socket.close(None);
                    let _ = self.socket.flush();
                    return Ok(());
                }
                match self.socket.read() {
                    Ok(Message::Text(text)) => self.forward(&text),
                    Ok(Message::Close(_)) => {
                        // Sends the queued close reply.
                        let _ = self.socket.flush();
                        return Ok(());
                    }
                    Err(tungstenite::Error::ConnectionClosed) => return Ok(()),
                    // Pings are answered by tungstenite on the next flush.
                    Ok(_) => {}
                    Err(tungstenite::Error::Io(e))
                        if matches!(
                            e.kind(),
                            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                        ) => {}
                    Err(e) => return Err(e),
                }
            }
        }

        /// Write every queued frame. `false` once the owner asked to close or
        /// went away.
        fn flush_outgoing(&mut self) -> Result<bool, tungstenite::Error> {
            loop {
                match self.outgoing.try_recv() {
                    Ok(Outgoing::Frame(text)) => self.socket.write(Message::Text(text))?,
                    Ok(Outgoing::Close) | Err(TryRecvError::Disconnected) => return Ok(false),
                    Err(TryRecvError::Empty) => {
                        self.socket.flush()?;
                        return Ok(true);
                    }
                }
            }
        }

        fn forward(&self, text: &str) {
            match ServerMessage::from_json(text) {
                Ok(msg) => {
                    let _ = self.events.send(SyncEvent::Message(msg));
                }
                Err(e) => log::warn!("ignoring unreadable server frame: {e}"),
            }
        }
    }

    fn set_poll_interval(stream: &mut MaybeTlsStream<TcpStream>) -> std::io::Result<()> {
        match stream {
            MaybeTlsStream::Plain(tcp) => tcp.set_read_timeout(Some(POLL_INTERVAL)),
            #[allow(unreachable_patterns)]
            _ => Ok(()),
        }
    }

    fn transport(e: impl std::fmt::Display) -> SyncError {
        SyncError::Transport(e.to_string())
    }

    /// A connected client socket.
    pub struct NativeWebSocket {
        outgoing: Sender<Outgoing>,
        events: Receiver<SyncEvent>,
        state: ConnectionState,
        worker: Option<JoinHandle<()>>,
    }

    impl NativeWebSocket {
        /// Open a `ws://` or `wss://` connection.
        pub fn connect(url: &str) -> SyncResult<Self> {
            let url = Url::parse(url).map_err(|e| SyncError::Transport(format!("invalid url {url:?}: {e}")))?;
            if !matches!(url.scheme(), "ws" | "wss") {
                return Err(SyncError::Transport(format!(
                    "not a websocket url: {url}"
                )));
            }

            let (mut socket, response) = tungstenite::connect(url.as_str()).map_err(transport)?;
            log::info!("connected to {url} ({})", response.status());
            set_poll_interval(socket.get_mut()).map_err(transport)?;

            let (outgoing_tx, outgoing_rx) = mpsc::channel();
            let (events_tx, events_rx) = mpsc::channel();
            let worker = Worker {
                socket,
                outgoing: outgoing_rx,
                events: events_tx,
            };
            let handle = thread::Builder::new()
                .name("collabcanvas-ws".into())
                .spawn(move || worker.run())
                .map_err(transport)?;

            Ok(Self {
                outgoing: outgoing_tx,
                events: events_rx,
                state: ConnectionState::Open,
                worker: Some(handle),
            })
        }

        /// Queue a text frame for the worker. Delivery is not acknowledged.
        pub fn send(&self, frame: impl Into<String>) -> SyncResult<()> {
            if self.state == ConnectionState::Closed {
                return Err(SyncError::Transport("connection closed".into()));
            }
            self.outgoing
                .send(Outgoing::Frame(frame.into()))
                .map_err(|_| SyncError::Transport("connection closed".into()))
        }

        /// Take everything the worker observed since the last call.
        pub fn poll(&mut self) -> Vec<SyncEvent> {
            let events: Vec<SyncEvent> = self.events.try_iter().collect();
            if events.iter().any(|e| matches!(e, SyncEvent::Closed { .. })) {
                self.state = ConnectionState::Closed;
            }
            events
        }

        /// Send the manager's queued frames and apply whatever arrived.
        ///
        /// Returns the changes the incoming frames made, in arrival order.
        pub fn pump<S: Surface>(&mut self, manager: &mut CollaborationManager<S>) -> SyncResult<Vec<ClientEvent>> {
            let mut changes = Vec::new();
            for event in self.poll() {
                match event {
                    SyncEvent::Message(msg) => changes.push(manager.handle_server_message(msg)),
                    SyncEvent::Closed { error: Some(e) } => return Err(SyncError::Transport(e)),
                    SyncEvent::Closed { error: None } => {}
                }
            }
            for frame in manager.take_outgoing() {
                self.send(frame)?;
            }
            Ok(changes)
        }

        pub fn state(&self) -> ConnectionState {
            self.state
        }

        pub fn is_open(&self) -> bool {
            self.state == ConnectionState::Open
        }

        /// Send a close frame and wait for the worker to finish.
        pub fn close(&mut self) {
            let _ = self.outgoing.send(Outgoing::Close);
            if let Some(worker) = self.worker.take() {
                if worker.join().is_err() {
                    log::error!("websocket worker panicked");
                }
            }
            self.state = ConnectionState::Closed;
        }
    }

    impl Drop for NativeWebSocket {
        fn drop(&mut self) {
            self.close();
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub use native::NativeWebSocket;
