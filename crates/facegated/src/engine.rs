use facegate_core::preprocess::{decode, preprocess};
use facegate_core::{Embedding, EmbeddingExtractor, FaceAnalyzer, PreprocessError};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("unreadable image: {0}")]
    Preprocess(#[from] PreprocessError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("photo processing panicked: {0}")]
    Panicked(String),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Messages sent from HTTP handlers to the engine thread.
enum EngineRequest {
    Extract {
        photo: Vec<u8>,
        reply: oneshot::Sender<Result<Option<Embedding>, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Decode, preprocess and embed an uploaded photo.
    ///
    /// `Ok(None)` means the image was readable but no usable face was found.
    pub async fn extract(&self, photo: Vec<u8>) -> Result<Option<Embedding>, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Extract {
                photo,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

/// Spawn the engine on a dedicated OS thread that owns `analyzer`.
///
/// Requests are handled one at a time in arrival order. The thread exits
/// once every [`EngineHandle`] has been dropped.
pub fn spawn_engine<A>(analyzer: A) -> Result<EngineHandle, EngineError>
where
    A: FaceAnalyzer + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(8);
    let mut extractor = EmbeddingExtractor::new(analyzer);

    std::thread::Builder::new()
        .name("facegate-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Extract { photo, reply } => {
                        let result = contained(|| run_extract(&mut extractor, &photo));
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx })
}

/// Run one request, turning a panic into an error so the engine thread
/// keeps serving.
fn contained<T>(f: impl FnOnce() -> Result<T, EngineError>) -> Result<T, EngineError> {
    panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        let msg = panic_message(payload.as_ref());
        tracing::error!(panic = %msg, "photo processing panicked");
        Err(EngineError::Panicked(msg))
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

fn run_extract<A: FaceAnalyzer>(
    extractor: &mut EmbeddingExtractor<A>,
    photo: &[u8],
) -> Result<Option<Embedding>, EngineError> {
    let started = Instant::now();
    let decoded = decode(photo)?;
    let image = preprocess(&decoded)?;
    tracing::debug!(
        width = image.width,
        height = image.height,
        bytes = photo.len(),
        "photo preprocessed"
    );

    let embedding = extractor.extract(&image);
    tracing::debug!(
        found = embedding.is_some(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "extraction finished"
    );
    Ok(embedding)
}

#[cfg(test)]
mod tests {
    use super::*;
    use facegate_core::{AnalyzerError, BoundingBox, CanonicalImage, Detection};
    use std::io::Cursor;

    struct FixedAnalyzer(Option<Vec<f32>>);

    impl FaceAnalyzer for FixedAnalyzer {
        fn analyze(&mut self, _image: &CanonicalImage) -> Result<Vec<Detection>, AnalyzerError> {
            Ok(self
                .0
                .iter()
                .map(|values| Detection {
                    bbox: BoundingBox { x1: 0.0, y1: 0.0, x2: 10.0, y2: 10.0 },
                    det_score: 0.9,
                    normed_embedding: values.clone(),
                })
                .collect())
        }
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([120, 90, 60]));
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut out, image::ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[tokio::test]
    async fn test_extract_returns_unit_embedding() {
        let engine = spawn_engine(FixedAnalyzer(Some(vec![3.0, 4.0]))).unwrap();
        let embedding = engine.extract(png(32, 24)).await.unwrap().unwrap();
        assert_eq!(embedding.values.len(), 2);
        assert!((embedding.values[0] - 0.6).abs() < 1e-6);
        assert!((embedding.values[1] - 0.8).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_no_face_is_none() {
        let engine = spawn_engine(FixedAnalyzer(None)).unwrap();
        assert!(engine.extract(png(16, 16)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_garbage_bytes_are_preprocess_error() {
        let engine = spawn_engine(FixedAnalyzer(None)).unwrap();
        let err = engine.extract(b"definitely not an image".to_vec()).await.unwrap_err();
        assert!(matches!(err, EngineError::Preprocess(PreprocessError::Decode(_))));
    }

    #[test]
    fn test_contained_turns_panic_into_error() {
        let result: Result<(), EngineError> = contained(|| panic!("corrupt scanline"));
        match result {
            Err(EngineError::Panicked(msg)) => assert_eq!(msg, "corrupt scanline"),
            other => panic!("expected Panicked, got {other:?}"),
        }
    }

    #[test]
    fn test_contained_passes_results_through() {
        assert_eq!(contained(|| Ok(7)).unwrap(), 7);
        assert!(matches!(
            contained::<()>(|| Err(EngineError::ChannelClosed)),
            Err(EngineError::ChannelClosed)
        ));
    }

    #[tokio::test]
    async fn test_engine_survives_failed_request() {
        let engine = spawn_engine(FixedAnalyzer(Some(vec![1.0, 0.0]))).unwrap();
        assert!(engine.extract(Vec::new()).await.is_err());
        assert!(engine.extract(png(16, 16)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_handle_is_shared_across_tasks() {
        let engine = spawn_engine(FixedAnalyzer(Some(vec![1.0, 0.0]))).unwrap();
        let mut tasks = Vec::new();
        for _ in 0..4 {
            let engine = engine.clone();
            tasks.push(tokio::spawn(async move { engine.extract(png(16, 16)).await }));
        }
        for t in tasks {
            assert!(t.await.unwrap().unwrap().is_some());
        }
    }
}
