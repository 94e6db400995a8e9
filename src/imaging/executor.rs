//! Pipeline execution.
//!
//! Stages run strictly in order, each consuming the handle the previous one
//! produced. The first backend error aborts the run; whichever handle was in
//! flight is dropped on the way out, so nothing leaks on the error path.

use super::backend::{BackendError, ImageBackend, ImageHandle};
use super::pipeline::{Pipeline, PipelineStage};
use super::secondary::SecondaryGate;
use axum::http::HeaderMap;
use tracing::debug;

/// Runs pipelines against a backend.
pub struct PipelineExecutor<'a> {
    backend: &'a dyn ImageBackend,
    gate: &'a SecondaryGate,
}

impl<'a> PipelineExecutor<'a> {
    pub fn new(backend: &'a dyn ImageBackend, gate: &'a SecondaryGate) -> Self {
        Self { backend, gate }
    }

    /// Apply every stage of `pipeline` to `image` and return the result.
    ///
    /// `headers` are the inbound request's headers, forwarded on secondary
    /// image fetches.
    pub async fn execute(
        &self,
        image: ImageHandle,
        pipeline: &Pipeline,
        headers: &HeaderMap,
    ) -> Result<ImageHandle, BackendError> {
        let mut current = image;
        for stage in pipeline.stages() {
            debug!(%stage, "applying stage");
            current = self.apply(current, stage, headers).await?;
        }
        Ok(current)
    }

    async fn apply(
        &self,
        image: ImageHandle,
        stage: &PipelineStage,
        headers: &HeaderMap,
    ) -> Result<ImageHandle, BackendError> {
        match stage {
            PipelineStage::Resize {
                width,
                height,
                filter,
            } => self.backend.resize(image, *width, *height, *filter),
            PipelineStage::Crop(region) => self.backend.crop(image, *region),
            PipelineStage::Blend { source, mode } => {
                let mut image = image;
                if let Some(layer) = self.gate.acquire(source, headers, self.backend).await? {
                    self.backend.blend(&mut image, &layer, *mode)?;
                }
                Ok(image)
            }
            PipelineStage::Watermark { source, x, y } => {
                let mut image = image;
                if let Some(mark) = self.gate.acquire(source, headers, self.backend).await? {
                    self.backend.watermark(&mut image, &mark, *x, *y)?;
                }
                Ok(image)
            }
        }
    }
}
