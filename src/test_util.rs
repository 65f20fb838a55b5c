//! Loopback HTTP peer for exercising the API and storage clients.

use std::collections::VecDeque;
use std::sync::{
    Arc,
    Mutex,
};
use std::thread::JoinHandle;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{
    header,
    HeaderMap,
    Method,
    StatusCode,
    Uri,
};
use axum::response::{
    IntoResponse,
    Response,
};
use axum::Router;
use tokio::sync::oneshot;

pub(crate) struct Reply {
    status: u16,
    body: Vec<u8>,
}

impl Reply {
    pub(crate) fn ok(body: Vec<u8>) -> Self {
        Reply::status(200, body)
    }

    pub(crate) fn status(status: u16, body: Vec<u8>) -> Self {
        Reply { status, body }
    }
}

/// A request as the server saw it.
#[derive(Debug)]
pub(crate) struct Recorded {
    pub method: Method,
    /// Path and query.
    pub uri: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl Recorded {
    pub(crate) fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

#[derive(Default)]
struct Exchange {
    replies: VecDeque<Reply>,
    requests: Vec<Recorded>,
}

type Shared = Arc<Mutex<Exchange>>;

async fn record(
    State(shared): State<Shared>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mut exchange = shared.lock().unwrap();
    exchange.requests.push(Recorded {
        method,
        uri: uri.path_and_query().map(|p| p.as_str().to_owned()).unwrap_or_default(),
        headers,
        body: body.to_vec(),
    });

    match exchange.replies.pop_front() {
        Some(reply) => (
            StatusCode::from_u16(reply.status).unwrap(),
            [(header::CONNECTION, "close")],
            reply.body,
        )
            .into_response(),
        None => (StatusCode::GONE, "no reply left").into_response(),
    }
}

/// Answers requests with the given replies, in order, and records them.
pub(crate) struct FakeServer {
    host: String,
    shared: Shared,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl FakeServer {
    pub(crate) fn start(replies: Vec<Reply>) -> Self {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        let host = format!("http://{}", listener.local_addr().unwrap());

        let shared = Arc::new(Mutex::new(Exchange {
            replies: replies.into(),
            requests: Vec::new(),
        }));
        let app = Router::new().fallback(record).with_state(shared.clone());
        let (shutdown, stopped) = oneshot::channel::<()>();

        let handle = std::thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::from_std(listener).unwrap();
                axum::serve(listener, app)
                    .with_graceful_shutdown(async {
                        stopped.await.ok();
                    })
                    .await
                    .unwrap();
            });
        });

        FakeServer {
            host,
            shared,
            shutdown,
            handle,
        }
    }

    pub(crate) fn host(&self) -> String {
        self.host.clone()
    }

    /// Stop the server and return the recorded requests.
    pub(crate) fn finish(self) -> Vec<Recorded> {
        self.shutdown.send(()).ok();
        self.handle.join().unwrap();

        let mut exchange = self.shared.lock().unwrap();
        std::mem::take(&mut exchange.requests)
    }
}
