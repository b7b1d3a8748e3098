//! Scripted push-channel doubles shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use codegraph_viewer::backend::{PushConnector, PushSocket};
use codegraph_viewer::{Result, ViewerError};
use tokio::sync::mpsc;
use tokio::time::Instant;

/// What the next `connect` call does. Once the script runs out, connecting never completes.
pub enum Attempt {
    Refuse,
    Accept(FakeSocket),
}

pub struct FakeSocket {
    frames: mpsc::UnboundedReceiver<String>,
    sent: Arc<Mutex<Vec<String>>>,
}

/// Test-side end of a [`FakeSocket`]. Dropping it closes the socket from the peer side.
pub struct SocketHandle {
    pub frames: mpsc::UnboundedSender<String>,
    sent: Arc<Mutex<Vec<String>>>,
}

impl SocketHandle {
    pub fn push(&self, frame: &str) {
        self.frames.send(frame.to_owned()).unwrap();
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

pub fn open_socket() -> (FakeSocket, SocketHandle) {
    let (frames_tx, frames) = mpsc::unbounded_channel();
    let sent = Arc::new(Mutex::new(Vec::new()));
    (
        FakeSocket {
            frames,
            sent: Arc::clone(&sent),
        },
        SocketHandle {
            frames: frames_tx,
            sent,
        },
    )
}

impl PushSocket for FakeSocket {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.sent.lock().unwrap().push(text);
        Ok(())
    }

    async fn next_text(&mut self) -> Option<Result<String>> {
        self.frames.recv().await.map(Ok)
    }

    async fn close(&mut self) {}
}

pub struct FakeConnector {
    attempts: Arc<Mutex<VecDeque<Attempt>>>,
    connects: Arc<Mutex<Vec<Instant>>>,
}

/// Records when each connect call happened.
#[derive(Clone)]
pub struct ConnectorProbe {
    connects: Arc<Mutex<Vec<Instant>>>,
}

impl ConnectorProbe {
    pub fn connect_times(&self) -> Vec<Instant> {
        self.connects.lock().unwrap().clone()
    }

    pub fn connect_count(&self) -> usize {
        self.connects.lock().unwrap().len()
    }
}

pub fn scripted_connector(attempts: Vec<Attempt>) -> (FakeConnector, ConnectorProbe) {
    let connects = Arc::new(Mutex::new(Vec::new()));
    (
        FakeConnector {
            attempts: Arc::new(Mutex::new(attempts.into())),
            connects: Arc::clone(&connects),
        },
        ConnectorProbe { connects },
    )
}

impl PushConnector for FakeConnector {
    type Socket = FakeSocket;

    async fn connect(&self) -> Result<FakeSocket> {
        self.connects.lock().unwrap().push(Instant::now());
        let next = self.attempts.lock().unwrap().pop_front();
        match next {
            Some(Attempt::Refuse) => Err(ViewerError::Transport("connection refused".to_owned())),
            Some(Attempt::Accept(socket)) => Ok(socket),
            None => std::future::pending().await,
        }
    }
}
