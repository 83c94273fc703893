use ndarray::ArrayView3;

use crate::detection::domain::backend_factory::BackendFactory;
use crate::detection::domain::backend_mode::{BackendEvent, BackendMode};
use crate::detection::domain::detection_outcome::DetectionOutcome;
use crate::detection::domain::face_detector::FaceDetector;
use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::Frame;

/// Owns the backend choice and the lazily built backend handles.
///
/// Prefers the neural backend. The first time it cannot be built, or the
/// first time it errors during inference, the selector switches to the
/// cascade backend for the rest of its life; the neural path is never
/// retried. A fresh selector starts over.
pub struct DetectorSelector {
    mode: BackendMode,
    neural_factory: Box<dyn BackendFactory>,
    classical_factory: Box<dyn BackendFactory>,
    neural: Option<Box<dyn FaceDetector>>,
    classical: Option<Box<dyn FaceDetector>>,
}

impl DetectorSelector {
    pub fn new(
        neural_factory: Box<dyn BackendFactory>,
        classical_factory: Box<dyn BackendFactory>,
    ) -> Self {
        Self {
            mode: BackendMode::Uninitialized,
            neural_factory,
            classical_factory,
            neural: None,
            classical: None,
        }
    }

    pub fn mode(&self) -> BackendMode {
        self.mode
    }

    /// Detect faces in an `H x W x 3` RGB image.
    ///
    /// Never fails: a missing or broken backend yields an empty list.
    pub fn detect_faces(&mut self, image: ArrayView3<'_, u8>) -> Vec<BoundingBox> {
        self.detect(image).into_boxes()
    }

    pub fn detect(&mut self, image: ArrayView3<'_, u8>) -> DetectionOutcome {
        let frame = Frame::from_view(image);
        self.detect_frame(&frame)
    }

    pub fn detect_frame(&mut self, frame: &Frame<'_>) -> DetectionOutcome {
        if self.mode.prefers_neural() && self.ensure_neural() {
            if let Some(neural) = self.neural.as_mut() {
                match neural.detect(frame) {
                    Ok(boxes) => {
                        log::debug!("{} found {} face(s)", self.neural_factory.name(), boxes.len());
                        return DetectionOutcome::Detected(boxes);
                    }
                    Err(e) => {
                        log::error!(
                            "{} detection failed: {e}. Falling back to {}.",
                            self.neural_factory.name(),
                            self.classical_factory.name()
                        );
                        self.downgrade();
                    }
                }
            }
        }
        self.run_classical(frame)
    }

    /// Build the neural backend if needed. Returns `false` (after
    /// downgrading) when it cannot be built.
    fn ensure_neural(&mut self) -> bool {
        if self.neural.is_some() {
            return true;
        }
        match self.neural_factory.create() {
            Ok(detector) => {
                log::info!("{} loaded successfully.", self.neural_factory.name());
                self.neural = Some(detector);
                self.mode = self.mode.transition(BackendEvent::NeuralReady);
                true
            }
            Err(e) => {
                log::error!(
                    "Failed to load {}: {e}. Falling back to {}.",
                    self.neural_factory.name(),
                    self.classical_factory.name()
                );
                self.downgrade();
                false
            }
        }
    }

    fn downgrade(&mut self) {
        self.neural = None;
        self.mode = self.mode.transition(BackendEvent::NeuralFailed);
    }

    fn run_classical(&mut self, frame: &Frame<'_>) -> DetectionOutcome {
        if self.classical.is_none() {
            match self.classical_factory.create() {
                Ok(detector) => {
                    log::info!("{} loaded successfully.", self.classical_factory.name());
                    self.classical = Some(detector);
                    self.mode = self.mode.transition(BackendEvent::ClassicalReady);
                }
                Err(e) => {
                    log::error!("Failed to load {}: {e}", self.classical_factory.name());
                    self.mode = self.mode.transition(BackendEvent::ClassicalUnavailable);
                    return DetectionOutcome::BackendUnavailable;
                }
            }
        }

        let Some(classical) = self.classical.as_mut() else {
            return DetectionOutcome::BackendUnavailable;
        };
        match classical.detect(frame) {
            Ok(boxes) => {
                log::debug!("{} found {} face(s)", self.classical_factory.name(), boxes.len());
                DetectionOutcome::Detected(boxes)
            }
            Err(e) => {
                log::error!("{} detection failed: {e}", self.classical_factory.name());
                DetectionOutcome::BackendFailed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::backend_error::BackendError;
    use ndarray::Array3;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    // --- Fakes ---

    #[derive(Clone, Copy)]
    enum Behaviour {
        Detect,
        FailInference,
    }

    struct FakeDetector {
        boxes: Vec<BoundingBox>,
        behaviour: Behaviour,
        calls: Arc<AtomicUsize>,
    }

    impl FaceDetector for FakeDetector {
        fn detect(&mut self, _frame: &Frame<'_>) -> Result<Vec<BoundingBox>, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behaviour {
                Behaviour::Detect => Ok(self.boxes.clone()),
                Behaviour::FailInference => Err(BackendError::Inference("runtime crashed".into())),
            }
        }
    }

    struct FakeFactory {
        name: &'static str,
        available: bool,
        behaviour: Behaviour,
        boxes: Vec<BoundingBox>,
        constructions: Arc<AtomicUsize>,
        detections: Arc<AtomicUsize>,
    }

    impl FakeFactory {
        fn new(name: &'static str, boxes: Vec<BoundingBox>) -> Self {
            Self {
                name,
                available: true,
                behaviour: Behaviour::Detect,
                boxes,
                constructions: Arc::new(AtomicUsize::new(0)),
                detections: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn missing(name: &'static str) -> Self {
            Self {
                available: false,
                ..Self::new(name, vec![])
            }
        }

        fn failing_inference(name: &'static str) -> Self {
            Self {
                behaviour: Behaviour::FailInference,
                ..Self::new(name, vec![])
            }
        }

        fn counters(&self) -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
            (self.constructions.clone(), self.detections.clone())
        }
    }

    impl BackendFactory for FakeFactory {
        fn name(&self) -> &str {
            self.name
        }

        fn create(&self) -> Result<Box<dyn FaceDetector>, BackendError> {
            self.constructions.fetch_add(1, Ordering::SeqCst);
            if !self.available {
                return Err(BackendError::AssetMissing {
                    path: PathBuf::from(format!("models/{}", self.name)),
                });
            }
            Ok(Box::new(FakeDetector {
                boxes: self.boxes.clone(),
                behaviour: self.behaviour,
                calls: self.detections.clone(),
            }))
        }
    }

    fn neural_box() -> BoundingBox {
        BoundingBox::from_xywh(10, 20, 30, 40)
    }

    fn cascade_box() -> BoundingBox {
        BoundingBox::from_xywh(50, 60, 35, 35)
    }

    fn image() -> Array3<u8> {
        Array3::zeros((64, 64, 3))
    }

    fn count(c: &Arc<AtomicUsize>) -> usize {
        c.load(Ordering::SeqCst)
    }

    // --- Selection ---

    #[test]
    fn test_starts_uninitialized() {
        let selector = DetectorSelector::new(
            Box::new(FakeFactory::new("neural", vec![])),
            Box::new(FakeFactory::new("cascade", vec![])),
        );
        assert_eq!(selector.mode(), BackendMode::Uninitialized);
    }

    #[test]
    fn test_prefers_neural_when_available() {
        let neural = FakeFactory::new("neural", vec![neural_box()]);
        let cascade = FakeFactory::new("cascade", vec![cascade_box()]);
        let (cascade_built, _) = cascade.counters();
        let mut selector = DetectorSelector::new(Box::new(neural), Box::new(cascade));

        let boxes = selector.detect_faces(image().view());

        assert_eq!(boxes, vec![neural_box()]);
        assert_eq!(selector.mode(), BackendMode::Neural);
        assert_eq!(count(&cascade_built), 0);
    }

    #[test]
    fn test_missing_neural_asset_falls_back_to_cascade() {
        let neural = FakeFactory::missing("neural");
        let cascade = FakeFactory::new("cascade", vec![cascade_box()]);
        let mut selector = DetectorSelector::new(Box::new(neural), Box::new(cascade));

        let boxes = selector.detect_faces(image().view());

        assert_eq!(boxes, vec![cascade_box()]);
        assert_eq!(selector.mode(), BackendMode::Classical);
    }

    #[test]
    fn test_construction_failure_is_never_retried() {
        let neural = FakeFactory::missing("neural");
        let (neural_built, _) = neural.counters();
        let cascade = FakeFactory::new("cascade", vec![]);
        let mut selector = DetectorSelector::new(Box::new(neural), Box::new(cascade));

        for _ in 0..5 {
            selector.detect_faces(image().view());
            assert_eq!(selector.mode(), BackendMode::Classical);
        }

        assert_eq!(count(&neural_built), 1);
    }

    #[test]
    fn test_inference_failure_downgrades_and_retries_in_same_call() {
        let neural = FakeFactory::failing_inference("neural");
        let (neural_built, neural_runs) = neural.counters();
        let cascade = FakeFactory::new("cascade", vec![cascade_box()]);
        let (_, cascade_runs) = cascade.counters();
        let mut selector = DetectorSelector::new(Box::new(neural), Box::new(cascade));

        let first = selector.detect_faces(image().view());

        assert_eq!(first, vec![cascade_box()]);
        assert_eq!(selector.mode(), BackendMode::Classical);
        assert_eq!(count(&neural_runs), 1);
        assert_eq!(count(&cascade_runs), 1);

        let second = selector.detect_faces(image().view());

        assert_eq!(second, vec![cascade_box()]);
        assert_eq!(count(&neural_built), 1);
        assert_eq!(count(&neural_runs), 1);
        assert_eq!(count(&cascade_runs), 2);
    }

    #[test]
    fn test_backends_are_constructed_at_most_once() {
        let neural = FakeFactory::new("neural", vec![neural_box()]);
        let (neural_built, neural_runs) = neural.counters();
        let cascade = FakeFactory::new("cascade", vec![]);
        let mut selector = DetectorSelector::new(Box::new(neural), Box::new(cascade));

        for _ in 0..10 {
            selector.detect_faces(image().view());
        }

        assert_eq!(count(&neural_built), 1);
        assert_eq!(count(&neural_runs), 10);
    }

    #[test]
    fn test_cascade_constructed_once_after_downgrade() {
        let neural = FakeFactory::missing("neural");
        let cascade = FakeFactory::new("cascade", vec![]);
        let (cascade_built, cascade_runs) = cascade.counters();
        let mut selector = DetectorSelector::new(Box::new(neural), Box::new(cascade));

        for _ in 0..4 {
            selector.detect_faces(image().view());
        }

        assert_eq!(count(&cascade_built), 1);
        assert_eq!(count(&cascade_runs), 4);
    }

    // --- Nothing available ---

    #[test]
    fn test_no_backend_returns_empty_list() {
        let mut selector = DetectorSelector::new(
            Box::new(FakeFactory::missing("neural")),
            Box::new(FakeFactory::missing("cascade")),
        );

        assert!(selector.detect_faces(image().view()).is_empty());
        assert_eq!(selector.mode(), BackendMode::NoneAvailable);
    }

    #[test]
    fn test_no_backend_reports_unavailable_outcome() {
        let mut selector = DetectorSelector::new(
            Box::new(FakeFactory::missing("neural")),
            Box::new(FakeFactory::missing("cascade")),
        );

        assert_eq!(
            selector.detect(image().view()),
            DetectionOutcome::BackendUnavailable
        );
    }

    #[test]
    fn test_none_available_keeps_checking_for_cascade_but_not_neural() {
        let neural = FakeFactory::missing("neural");
        let (neural_built, _) = neural.counters();
        let cascade = FakeFactory::missing("cascade");
        let (cascade_built, _) = cascade.counters();
        let mut selector = DetectorSelector::new(Box::new(neural), Box::new(cascade));

        selector.detect_faces(image().view());
        selector.detect_faces(image().view());

        assert_eq!(count(&neural_built), 1);
        assert_eq!(count(&cascade_built), 2);
        assert_eq!(selector.mode(), BackendMode::NoneAvailable);
    }

    #[test]
    fn test_cascade_inference_failure_reports_failed_outcome() {
        let mut selector = DetectorSelector::new(
            Box::new(FakeFactory::missing("neural")),
            Box::new(FakeFactory::failing_inference("cascade")),
        );

        let outcome = selector.detect(image().view());

        assert!(matches!(outcome, DetectionOutcome::BackendFailed(_)));
        assert_eq!(selector.mode(), BackendMode::Classical);
        assert!(selector.detect_faces(image().view()).is_empty());
    }

    // --- Inputs ---

    #[test]
    fn test_zero_sized_image_is_passed_through() {
        let neural = FakeFactory::new("neural", vec![]);
        let (_, neural_runs) = neural.counters();
        let mut selector =
            DetectorSelector::new(Box::new(neural), Box::new(FakeFactory::new("cascade", vec![])));

        let empty = Array3::<u8>::zeros((0, 0, 3));
        assert!(selector.detect_faces(empty.view()).is_empty());
        assert_eq!(count(&neural_runs), 1);
    }

    #[test]
    fn test_non_contiguous_image_is_accepted() {
        let mut selector = DetectorSelector::new(
            Box::new(FakeFactory::new("neural", vec![neural_box()])),
            Box::new(FakeFactory::new("cascade", vec![])),
        );
        let img = image();
        let transposed = img.view().permuted_axes([1, 0, 2]);

        assert_eq!(selector.detect_faces(transposed), vec![neural_box()]);
    }

    #[test]
    fn test_selector_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<DetectorSelector>();
    }
}
