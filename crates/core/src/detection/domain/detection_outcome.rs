use crate::shared::bounding_box::BoundingBox;

/// Result of one selector run, before it is flattened into a box list.
#[derive(Clone, Debug, PartialEq)]
pub enum DetectionOutcome {
    Detected(Vec<BoundingBox>),
    /// No backend could be constructed.
    BackendUnavailable,
    /// The last remaining backend errored while running.
    BackendFailed(String),
}

impl DetectionOutcome {
    /// Boxes found, treating every non-detection as "no faces".
    pub fn into_boxes(self) -> Vec<BoundingBox> {
        match self {
            DetectionOutcome::Detected(boxes) => boxes,
            DetectionOutcome::BackendUnavailable | DetectionOutcome::BackendFailed(_) => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_boxes_keeps_detections() {
        let boxes = vec![BoundingBox::from_xywh(1, 2, 3, 4)];
        assert_eq!(DetectionOutcome::Detected(boxes.clone()).into_boxes(), boxes);
    }

    #[test]
    fn test_into_boxes_empty_for_failures() {
        assert!(DetectionOutcome::BackendUnavailable.into_boxes().is_empty());
        assert!(DetectionOutcome::BackendFailed("boom".into())
            .into_boxes()
            .is_empty());
    }
}
