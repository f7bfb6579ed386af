use facematch_core::{build_gallery, recognize, EncodeError, FaceEncoder, Gallery, MatchResult, RecognizeError};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Recognize(#[from] RecognizeError),
    #[error("encoder error: {0}")]
    Encoder(#[from] EncodeError),
    #[error("Recognition timed out after {}s", .0.as_secs_f32())]
    Timeout(Duration),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Messages sent from HTTP handlers to the engine threads.
enum EngineRequest {
    Recognize {
        image: Vec<u8>,
        gallery: Arc<Gallery>,
        threshold: f32,
        reply: oneshot::Sender<Result<MatchResult, RecognizeError>>,
    },
    BuildGallery {
        dir: PathBuf,
        reply: oneshot::Sender<Gallery>,
    },
}

/// Clone-safe handle to the engine threads.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    workers: usize,
}

impl EngineHandle {
    /// Identify the face in `image` against a gallery snapshot.
    ///
    /// `timeout` bounds queueing plus extraction. An expired request is not
    /// retried; its late result is discarded by the worker.
    pub async fn recognize(
        &self,
        image: Vec<u8>,
        gallery: Arc<Gallery>,
        threshold: f32,
        timeout: Duration,
    ) -> Result<MatchResult, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let round_trip = async {
            self.tx
                .send(EngineRequest::Recognize {
                    image,
                    gallery,
                    threshold,
                    reply: reply_tx,
                })
                .await
                .map_err(|_| EngineError::ChannelClosed)?;
            Ok::<_, EngineError>(reply_rx.await.map_err(|_| EngineError::ChannelClosed)??)
        };

        tokio::time::timeout(timeout, round_trip)
            .await
            .map_err(|_| EngineError::Timeout(timeout))?
    }

    /// Build a new gallery from `dir` on an engine thread.
    pub async fn build_gallery(&self, dir: PathBuf) -> Result<Gallery, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::BuildGallery {
                dir,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    pub fn workers(&self) -> usize {
        self.workers
    }
}

/// Spawn `workers` engine threads, each owning an encoder from `make_encoder`.
///
/// All encoders are created before any thread starts, so a missing model
/// fails startup instead of the first request. Workers share one queue.
pub fn spawn_engine<E, F>(workers: usize, mut make_encoder: F) -> Result<EngineHandle, EngineError>
where
    E: FaceEncoder + Send + 'static,
    F: FnMut(usize) -> Result<E, EncodeError>,
{
    let workers = workers.max(1);
    let encoders = (0..workers)
        .map(&mut make_encoder)
        .collect::<Result<Vec<_>, _>>()?;

    let (tx, rx) = mpsc::channel::<EngineRequest>(workers * 4);
    let rx = Arc::new(Mutex::new(rx));

    for (id, encoder) in encoders.into_iter().enumerate() {
        let rx = Arc::clone(&rx);
        std::thread::Builder::new()
            .name(format!("facematch-engine-{id}"))
            .spawn(move || run_worker(id, encoder, rx))?;
    }

    tracing::info!(workers, "engine started");
    Ok(EngineHandle { tx, workers })
}

fn run_worker<E: FaceEncoder>(
    id: usize,
    mut encoder: E,
    rx: Arc<Mutex<mpsc::Receiver<EngineRequest>>>,
) {
    tracing::info!(worker = id, "engine thread started");
    loop {
        // Idle workers queue on the lock; whoever holds it takes the next request.
        let next = match rx.lock() {
            Ok(mut queue) => queue.blocking_recv(),
            Err(_) => None,
        };
        let Some(request) = next else {
            break;
        };

        match request {
            EngineRequest::Recognize {
                image,
                gallery,
                threshold,
                reply,
            } => {
                if reply.is_closed() {
                    tracing::debug!(worker = id, "caller gave up before extraction; skipping");
                    continue;
                }
                let result = recognize(&mut encoder, &image, &gallery, threshold);
                if reply.send(result).is_err() {
                    tracing::debug!(worker = id, "caller gave up; result dropped");
                }
            }
            EngineRequest::BuildGallery { dir, reply } => {
                let gallery = build_gallery(&dir, &mut encoder);
                let _ = reply.send(gallery);
            }
        }
    }
    tracing::info!(worker = id, "engine thread exiting");
}
