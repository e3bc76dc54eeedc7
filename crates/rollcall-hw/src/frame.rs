//! Captured frame type and pixel format helpers.

/// A captured grayscale camera frame.
#[derive(Clone)]
pub struct Frame {
    /// Grayscale pixel data, row-major `width * height` bytes.
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub sequence: u32,
}

impl Frame {
    /// Cut a rectangular region, clamped to the frame bounds.
    ///
    /// Returns `None` when the clamped region is empty.
    pub fn crop(&self, x: i64, y: i64, width: u32, height: u32) -> Option<Frame> {
        let x0 = x.clamp(0, self.width as i64) as u32;
        let y0 = y.clamp(0, self.height as i64) as u32;
        let x1 = (x + width as i64).clamp(0, self.width as i64) as u32;
        let y1 = (y + height as i64).clamp(0, self.height as i64) as u32;
        if x1 <= x0 || y1 <= y0 {
            return None;
        }

        let (w, h) = (x1 - x0, y1 - y0);
        let mut data = Vec::with_capacity((w * h) as usize);
        for row in y0..y1 {
            let start = (row * self.width + x0) as usize;
            data.extend_from_slice(&self.data[start..start + w as usize]);
        }

        Some(Frame {
            data,
            width: w,
            height: h,
            sequence: self.sequence,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid YUYV length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

/// Convert packed YUYV (4:2:2) to grayscale by extracting the Y channel.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V]; grayscale is every
/// even-indexed byte.
pub fn yuyv_to_grayscale(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height * 2) as usize;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }
    Ok(yuyv[..expected].iter().step_by(2).copied().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_4x4() -> Frame {
        Frame {
            data: (0..16).collect(),
            width: 4,
            height: 4,
            sequence: 7,
        }
    }

    #[test]
    fn yuyv_extracts_y_channel() {
        let yuyv = vec![100, 128, 200, 128];
        assert_eq!(yuyv_to_grayscale(&yuyv, 2, 1).unwrap(), vec![100, 200]);
    }

    #[test]
    fn yuyv_rejects_short_buffer() {
        assert!(yuyv_to_grayscale(&[100, 128], 2, 1).is_err());
    }

    #[test]
    fn crop_inner_region() {
        let crop = frame_4x4().crop(1, 1, 2, 2).unwrap();
        assert_eq!(crop.width, 2);
        assert_eq!(crop.height, 2);
        assert_eq!(crop.data, vec![5, 6, 9, 10]);
    }

    #[test]
    fn crop_clamps_to_bounds() {
        let crop = frame_4x4().crop(-2, -2, 4, 4).unwrap();
        assert_eq!(crop.width, 2);
        assert_eq!(crop.height, 2);
        assert_eq!(crop.data, vec![0, 1, 4, 5]);
    }

    #[test]
    fn crop_outside_is_none() {
        assert!(frame_4x4().crop(10, 10, 2, 2).is_none());
        assert!(frame_4x4().crop(0, 0, 0, 2).is_none());
    }
}
