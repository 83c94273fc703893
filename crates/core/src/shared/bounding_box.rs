use serde::{Deserialize, Serialize};

/// An axis-aligned face box in `(top, right, bottom, left)` order.
///
/// The field order is part of the caller contract and differs from the usual
/// `(x, y, w, h)` layout. Serializes as a bare `[top, right, bottom, left]`
/// array so consumers that unpack tuples keep working.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[i32; 4]", into = "[i32; 4]")]
pub struct BoundingBox {
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
    pub left: i32,
}

impl BoundingBox {
    pub fn new(top: i32, right: i32, bottom: i32, left: i32) -> Self {
        Self {
            top,
            right,
            bottom,
            left,
        }
    }

    /// Converts a backend's `(x, y, width, height)` detection.
    pub fn from_xywh(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            top: y,
            right: x + width,
            bottom: y + height,
            left: x,
        }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    /// True when `other` lies entirely inside this box (edges inclusive).
    pub fn contains(&self, other: &BoundingBox) -> bool {
        self.left <= other.left
            && self.top <= other.top
            && self.right >= other.right
            && self.bottom >= other.bottom
    }
}

impl From<[i32; 4]> for BoundingBox {
    fn from([top, right, bottom, left]: [i32; 4]) -> Self {
        Self::new(top, right, bottom, left)
    }
}

impl From<BoundingBox> for [i32; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.top, b.right, b.bottom, b.left]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_from_xywh_field_order() {
        let b = BoundingBox::from_xywh(10, 20, 30, 40);
        assert_eq!(<[i32; 4]>::from(b), [20, 40, 60, 10]);
    }

    #[rstest]
    #[case(0, 0, 1, 1)]
    #[case(5, 7, 30, 30)]
    #[case(100, 3, 64, 48)]
    fn test_from_xywh_right_and_bottom_exceed_origin(
        #[case] x: i32,
        #[case] y: i32,
        #[case] w: i32,
        #[case] h: i32,
    ) {
        let b = BoundingBox::from_xywh(x, y, w, h);
        assert!(b.right > b.left);
        assert!(b.bottom > b.top);
        assert_eq!(b.width(), w);
        assert_eq!(b.height(), h);
    }

    #[test]
    fn test_serializes_as_array() {
        let b = BoundingBox::new(1, 2, 3, 4);
        let json = serde_json::to_string(&b).unwrap();
        assert_eq!(json, "[1,2,3,4]");
        let back: BoundingBox = serde_json::from_str(&json).unwrap();
        assert_eq!(back, b);
    }

    #[test]
    fn test_contains() {
        let outer = BoundingBox::from_xywh(0, 0, 100, 100);
        let inner = BoundingBox::from_xywh(10, 10, 20, 20);
        assert!(outer.contains(&inner));
        assert!(!inner.contains(&outer));
        assert!(outer.contains(&outer));
    }
}
