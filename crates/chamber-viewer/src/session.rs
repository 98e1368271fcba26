// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Session socket client: a background reader thread feeding an mpsc
//! channel, and a writer handle for fire-and-forget invocation requests.

use std::io::Write;
use std::os::unix::net::UnixStream;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;

use chamber_proto::{wire, ClientMessage, InvocationRequest, ServerMessage};
use chamber_scene::SessionPort;
use tracing::{info, warn};

pub struct SessionClient {
    rx: Option<Receiver<ServerMessage>>,
    writer: Option<UnixStream>,
}

impl SessionClient {
    /// Connect to the session hub and start streaming messages. On failure
    /// the client stays disconnected; sends are dropped with a warning.
    pub fn connect(path: &str) -> Self {
        let stream = match UnixStream::connect(path) {
            Ok(s) => s,
            Err(err) => {
                warn!(path, %err, "session connect failed");
                return Self {
                    rx: None,
                    writer: None,
                };
            }
        };
        let writer = stream.try_clone().ok();
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let mut stream = stream;
            loop {
                match wire::read_message::<ServerMessage, _>(&mut stream) {
                    Ok(Some(msg)) => {
                        if tx.send(msg).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        info!("session stream closed");
                        break;
                    }
                    Err(err) => {
                        warn!(%err, "session stream error, dropping connection");
                        break;
                    }
                }
            }
        });
        info!(path, "session connected");
        Self {
            rx: Some(rx),
            writer,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.writer.is_some()
    }
}

impl SessionPort for SessionClient {
    fn drain_messages(&mut self, max: usize) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        if let Some(rx) = &self.rx {
            for _ in 0..max {
                match rx.try_recv() {
                    Ok(msg) => out.push(msg),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        self.rx = None;
                        break;
                    }
                }
            }
        }
        out
    }

    fn send_invocation(&mut self, req: &InvocationRequest) -> bool {
        let Some(writer) = self.writer.as_mut() else {
            return false;
        };
        let frame = match wire::encode(&ClientMessage::Invoke(req.clone())) {
            Ok(f) => f,
            Err(err) => {
                warn!(%err, "invocation encode failed");
                return false;
            }
        };
        if let Err(err) = writer.write_all(&frame) {
            warn!(%err, "session write failed, disconnecting");
            self.writer = None;
            return false;
        }
        true
    }
}
