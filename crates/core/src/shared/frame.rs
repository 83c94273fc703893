use std::borrow::Cow;

use image::{GrayImage, Luma};
use ndarray::{ArrayView3, Axis};

/// An RGB image whose pixels are guaranteed contiguous in row-major order.
///
/// Built from a caller's `H x W x C` view: a standard-layout view is
/// borrowed as-is, anything else (transposed, sliced with a step, ...) is
/// copied into a fresh contiguous buffer first.
#[derive(Clone, Debug)]
pub struct Frame<'a> {
    data: Cow<'a, [u8]>,
    width: u32,
    height: u32,
    channels: u8,
}

impl Frame<'static> {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (channels as usize),
            "data length must equal width * height * channels"
        );
        Frame {
            data: Cow::Owned(data),
            width,
            height,
            channels,
        }
    }
}

impl<'a> Frame<'a> {
    pub fn from_view(view: ArrayView3<'a, u8>) -> Self {
        let height = view.len_of(Axis(0)) as u32;
        let width = view.len_of(Axis(1)) as u32;
        let channels = view.len_of(Axis(2)) as u8;
        let data = match view.to_slice() {
            Some(slice) => Cow::Borrowed(slice),
            None => Cow::Owned(view.iter().copied().collect()),
        };
        Self {
            data,
            width,
            height,
            channels,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(self.shape(), &self.data)
            .expect("Frame data length must match dimensions")
    }

    /// BT.601 luma image, or `None` when the frame does not carry three
    /// channels.
    ///
    /// Uses OpenCV's 14-bit fixed-point RGB-to-gray weights so the result
    /// matches the gray images Haar cascades are trained on.
    pub fn to_grayscale(&self) -> Option<GrayImage> {
        if self.channels != 3 {
            return None;
        }
        let data = self.data();
        let width = self.width as usize;
        Some(GrayImage::from_fn(self.width, self.height, |x, y| {
            let i = (y as usize * width + x as usize) * 3;
            Luma([bt601_luma(data[i], data[i + 1], data[i + 2])])
        }))
    }

    fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.channels as usize,
        )
    }
}

fn bt601_luma(r: u8, g: u8, b: u8) -> u8 {
    ((r as u32 * 4899 + g as u32 * 9617 + b as u32 * 1868 + 8192) >> 14) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{s, Array3};
    use rstest::rstest;

    #[test]
    fn test_construction_and_accessors() {
        let data = vec![0u8; 12]; // 2x2x3
        let frame = Frame::new(data.clone(), 2, 2, 3);
        assert_eq!(frame.width(), 2);
        assert_eq!(frame.height(), 2);
        assert_eq!(frame.channels(), 3);
        assert_eq!(frame.data(), &data[..]);
    }

    #[test]
    #[should_panic(expected = "data length must equal width * height * channels")]
    fn test_mismatched_data_length_panics_in_debug() {
        let data = vec![0u8; 10];
        Frame::new(data, 2, 2, 3);
    }

    #[test]
    fn test_from_standard_layout_view_borrows() {
        let arr = Array3::<u8>::zeros((4, 5, 3));
        let frame = Frame::from_view(arr.view());
        assert!(matches!(frame.data, Cow::Borrowed(_)));
        assert_eq!(frame.width(), 5);
        assert_eq!(frame.height(), 4);
    }

    #[test]
    fn test_from_non_contiguous_view_copies_in_row_major_order() {
        // 3x4 RGB where each pixel's red channel encodes (row * 10 + col)
        let mut arr = Array3::<u8>::zeros((3, 4, 3));
        for r in 0..3 {
            for c in 0..4 {
                arr[[r, c, 0]] = (r * 10 + c) as u8;
            }
        }
        // Every other column: a strided, non-contiguous view
        let strided = arr.slice(s![.., ..;2, ..]);
        assert!(!strided.is_standard_layout());

        let frame = Frame::from_view(strided);
        assert!(!matches!(frame.data, Cow::Borrowed(_)));
        assert_eq!(frame.width(), 2);
        assert_eq!(frame.height(), 3);

        let view = frame.as_ndarray();
        assert_eq!(view[[0, 1, 0]], 2);
        assert_eq!(view[[2, 0, 0]], 20);
        assert_eq!(view[[2, 1, 0]], 22);
    }

    #[test]
    fn test_from_transposed_view_copies() {
        let arr = Array3::<u8>::zeros((3, 4, 3));
        let transposed = arr.view().permuted_axes([1, 0, 2]);
        let frame = Frame::from_view(transposed);
        assert!(!matches!(frame.data, Cow::Borrowed(_)));
        assert_eq!(frame.height(), 4);
        assert_eq!(frame.width(), 3);
        assert_eq!(frame.data().len(), 36);
    }

    #[test]
    fn test_is_empty() {
        assert!(Frame::new(vec![], 0, 10, 3).is_empty());
        assert!(!Frame::new(vec![0; 3], 1, 1, 3).is_empty());
    }

    #[rstest]
    #[case::red([255, 0, 0], 76)]
    #[case::green([0, 255, 0], 150)]
    #[case::blue([0, 0, 255], 29)]
    #[case::white([255, 255, 255], 255)]
    #[case::black([0, 0, 0], 0)]
    #[case::gray([128, 128, 128], 128)]
    fn test_to_grayscale_uses_bt601_weights(#[case] rgb: [u8; 3], #[case] expected: u8) {
        let frame = Frame::new(rgb.to_vec(), 1, 1, 3);
        let gray = frame.to_grayscale().unwrap();
        assert_eq!(gray.get_pixel(0, 0)[0], expected);
    }

    #[test]
    fn test_to_grayscale_keeps_pixel_positions() {
        // Red, green on the first row; blue, white on the second
        let frame = Frame::new(
            vec![255, 0, 0, 0, 255, 0, 0, 0, 255, 255, 255, 255],
            2,
            2,
            3,
        );
        let gray = frame.to_grayscale().unwrap();
        assert_eq!(gray.dimensions(), (2, 2));
        assert_eq!(gray.get_pixel(0, 0)[0], 76);
        assert_eq!(gray.get_pixel(1, 0)[0], 150);
        assert_eq!(gray.get_pixel(0, 1)[0], 29);
        assert_eq!(gray.get_pixel(1, 1)[0], 255);
    }

    #[test]
    fn test_to_grayscale_from_strided_view() {
        let mut arr = Array3::<u8>::zeros((2, 4, 3));
        arr[[1, 2, 1]] = 255;
        let frame = Frame::from_view(arr.slice(s![.., ..;2, ..]));
        let gray = frame.to_grayscale().unwrap();
        assert_eq!(gray.dimensions(), (2, 2));
        assert_eq!(gray.get_pixel(1, 1)[0], 150);
        assert_eq!(gray.get_pixel(0, 1)[0], 0);
    }

    #[test]
    fn test_to_grayscale_rejects_non_rgb() {
        let frame = Frame::new(vec![0; 4], 2, 2, 1);
        assert!(frame.to_grayscale().is_none());
    }
}
