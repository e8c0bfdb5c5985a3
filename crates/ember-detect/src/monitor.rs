use parking_lot::Mutex;

use crate::camera::Camera;
use crate::config::PolicyConfig;
use crate::error::CameraError;
use crate::policy::{Classifier, FrameOutcome, SamplingPolicy};
use crate::state::{DetectionCell, DetectionSnapshot};
use crate::status::StatusReport;

/// Ties a classifier to the sampling policy and the shared detection state.
///
/// `predict` calls are serialized by the classifier lock. Status reads never
/// take that lock, so they return the last published result immediately.
#[derive(Debug)]
pub struct Monitor<C> {
    classifier: Mutex<C>,
    policy: SamplingPolicy,
    cell: DetectionCell,
}

impl<C: Classifier> Monitor<C> {
    pub fn new(classifier: C, config: PolicyConfig) -> Self {
        Self {
            classifier: Mutex::new(classifier),
            policy: SamplingPolicy::new(config),
            cell: DetectionCell::new(),
        }
    }

    /// Runs one policy evaluation for a frame.
    ///
    /// Skipped frames never touch the classifier lock. A classified frame
    /// publishes before the lock is released, so results land in the order
    /// the classifier produced them.
    pub fn on_frame(&self, jpeg: &[u8]) -> FrameOutcome {
        let (index, due) = self.policy.admit();
        if !due {
            return FrameOutcome::Skipped { index };
        }
        let mut classifier = self.classifier.lock();
        let score = classifier.predict(jpeg);
        self.policy.record(&self.cell, index, score)
    }

    pub fn snapshot(&self) -> DetectionSnapshot {
        self.cell.read()
    }

    pub fn status(&self) -> StatusReport {
        StatusReport::from(self.cell.read())
    }

    pub fn policy(&self) -> &SamplingPolicy {
        &self.policy
    }

    /// Serves one captured frame.
    ///
    /// Acquires a frame, runs one policy evaluation on it, passes the
    /// unmodified bytes to `respond` and returns the frame to the camera
    /// before returning.
    pub fn serve_capture<Cam, R>(
        &self,
        camera: &mut Cam,
        respond: impl FnOnce(&[u8]) -> R,
    ) -> Result<R, CameraError>
    where
        Cam: Camera,
    {
        let frame = camera.acquire()?;
        self.on_frame(&frame);
        let response = respond(&frame);
        drop(frame);
        Ok(response)
    }

    /// Runs `f` with exclusive access to the classifier.
    pub fn with_classifier<R>(&self, f: impl FnOnce(&mut C) -> R) -> R {
        f(&mut self.classifier.lock())
    }

    pub fn into_classifier(self) -> C {
        self.classifier.into_inner()
    }
}
