//! The protocol dispatcher: one sequential reader, unbounded task fan-out,
//! and a single exclusive writer on the response stream.
//!
//! Responses are correlated by ID only and may be written in any order. The
//! sole ordering guarantee is the close barrier: every previously dispatched
//! operation completes and has its response written before the close
//! acknowledgement, and nothing is read afterwards.

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use remcache_core::protocol::{read_request, write_response, Command, Request, Response};
use remcache_core::Result;
use tokio::io::{AsyncBufRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::store::{ArtifactHit, Store};

/// Exclusive writer for the response stream.
///
/// Every producer (handshake, concurrent completions, close ack) goes through
/// [`ResponseWriter::send`], which holds the lock across encode, write, and
/// flush. The atomic unit is one complete record line.
pub struct ResponseWriter<W> {
    inner: Mutex<W>,
}

impl<W> ResponseWriter<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(writer: W) -> Self {
        ResponseWriter {
            inner: Mutex::new(writer),
        }
    }

    pub async fn send(&self, response: &Response) -> Result<()> {
        let mut writer = self.inner.lock().await;
        write_response(&mut *writer, response).await
    }
}

/// The request-dispatch engine.
pub struct Server<R, W> {
    store: Arc<Store>,
    reader: R,
    writer: Arc<ResponseWriter<W>>,
}

impl<R, W> Server<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(store: Store, reader: R, writer: W) -> Self {
        Server {
            store: Arc::new(store),
            reader,
            writer: Arc::new(ResponseWriter::new(writer)),
        }
    }

    /// Serves until a close request or clean end-of-stream.
    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Serves until `shutdown` resolves, a close request, or end-of-stream.
    ///
    /// An external shutdown aborts outstanding operations instead of draining
    /// them; the close barrier applies only to the protocol's own close.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let Server {
            store,
            mut reader,
            writer,
        } = self;
        tokio::pin!(shutdown);

        writer.send(&Response::handshake()).await?;
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!(outstanding = tasks.len(), "shutdown requested, aborting outstanding requests");
                    tasks.shutdown().await;
                    return Ok(());
                }
                next = read_request(&mut reader) => match next? {
                    Some(request) => {
                        debug!(id = request.id, command = ?request.command, "request received");
                        match request.command {
                            Command::Get => {
                                let store = Arc::clone(&store);
                                spawn_response(&mut tasks, &writer, request.id, async move {
                                    execute_get(&store, request).await
                                });
                            }
                            Command::Put => {
                                let store = Arc::clone(&store);
                                spawn_response(&mut tasks, &writer, request.id, async move {
                                    execute_put(&store, request).await
                                });
                            }
                            Command::Close => {
                                debug!(id = request.id, outstanding = tasks.len(), "close received, draining");
                                drain(&mut tasks).await;
                                writer.send(&Response::ack(request.id)).await?;
                                info!(stats = ?store.stats(), "session closed");
                                return Ok(());
                            }
                        }
                    }
                    None => {
                        debug!(outstanding = tasks.len(), "request stream ended without close");
                        drain(&mut tasks).await;
                        info!(stats = ?store.stats(), "session ended at end of stream");
                        return Ok(());
                    }
                },
            }
        }
    }
}

fn spawn_response<W, Fut>(
    tasks: &mut JoinSet<()>,
    writer: &Arc<ResponseWriter<W>>,
    id: i64,
    operation: Fut,
) where
    W: AsyncWrite + Unpin + Send + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    let writer = Arc::clone(writer);
    tasks.spawn(async move {
        let response = operation.await;
        if let Err(error) = writer.send(&response).await {
            warn!(id, %error, "failed to write response");
        }
    });
}

async fn execute_get(store: &Store, request: Request) -> Response {
    let id = request.id;
    let Some(action_id) = request.action_id else {
        return Response::error(id, "get request missing ActionID");
    };
    match store.get(&action_id).await {
        Ok(Some(hit)) => hit_response(id, hit),
        Ok(None) => Response::miss(id),
        Err(error) => Response::error(id, error),
    }
}

async fn execute_put(store: &Store, request: Request) -> Response {
    let id = request.id;
    let Some(action_id) = request.action_id else {
        return Response::error(id, "put request missing ActionID");
    };
    let Some(output_id) = request.output_id else {
        return Response::error(id, "put request missing OutputID");
    };
    let body = Bytes::from(request.body.unwrap_or_default());

    match store.put(&action_id, &output_id, body).await {
        Ok(path) => Response {
            id,
            disk_path: Some(path.display().to_string()),
            ..Response::default()
        },
        Err(error) => Response::error(id, error),
    }
}

fn hit_response(id: i64, hit: ArtifactHit) -> Response {
    Response {
        id,
        output_id: Some(hit.output_id),
        size: Some(hit.size),
        time: hit.time,
        disk_path: Some(hit.disk_path.display().to_string()),
        ..Response::default()
    }
}

async fn drain(tasks: &mut JoinSet<()>) {
    while let Some(result) = tasks.join_next().await {
        if let Err(error) = result {
            warn!(%error, "request task failed");
        }
    }
}
