//! Conversions from `image` buffers into OpenCV matrices.

use anyhow::{anyhow, Result};
use image::{GrayImage, RgbImage};
use opencv::core::{self, Mat, Scalar};
use opencv::prelude::*;

pub(crate) fn gray_mat(img: &GrayImage) -> Result<Mat> {
    mat_from_bytes(img.width(), img.height(), core::CV_8UC1, img.as_raw())
}

/// Channels stay in RGB order.
pub(crate) fn rgb_mat(img: &RgbImage) -> Result<Mat> {
    mat_from_bytes(img.width(), img.height(), core::CV_8UC3, img.as_raw())
}

fn mat_from_bytes(width: u32, height: u32, typ: i32, bytes: &[u8]) -> Result<Mat> {
    let rows = i32::try_from(height).map_err(|_| anyhow!("image height {} too large", height))?;
    let cols = i32::try_from(width).map_err(|_| anyhow!("image width {} too large", width))?;
    let mut mat = Mat::new_rows_cols_with_default(rows, cols, typ, Scalar::all(0.0))?;
    let data = mat.data_bytes_mut()?;
    if data.len() != bytes.len() {
        return Err(anyhow!(
            "matrix holds {} bytes, image has {}",
            data.len(),
            bytes.len()
        ));
    }
    data.copy_from_slice(bytes);
    Ok(mat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};

    #[test]
    fn pixels_survive_conversion() -> Result<()> {
        let gray = GrayImage::from_fn(7, 5, |x, y| Luma([(x * 10 + y) as u8]));
        let mat = gray_mat(&gray)?;
        assert_eq!((mat.rows(), mat.cols()), (5, 7));
        assert_eq!(*mat.at_2d::<u8>(3, 4)?, 43);

        let rgb = RgbImage::from_pixel(4, 3, Rgb([1, 2, 3]));
        let mat = rgb_mat(&rgb)?;
        assert_eq!(mat.channels(), 3);
        assert_eq!(mat.at_2d::<core::Vec3b>(2, 3)?.0, [1, 2, 3]);
        Ok(())
    }
}
