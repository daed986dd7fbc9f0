// THEORY:
// The `FrameProcessor` is the only stage that touches raw color data. It turns a
// full RGB frame into an "occupancy mask": a binary image in which foreground
// pixels mark texture that is likely to belong to a vehicle (edges, shadows,
// windscreens) as opposed to flat asphalt.
//
// The chain is fixed and runs in this order, with no branching:
// 1.  **Luminance**: Rec. 601 luma, the same weighting the `Pixel` heuristics use.
// 2.  **Gaussian blur** (3x3, sigma 1): suppresses sensor noise before thresholding.
// 3.  **Adaptive threshold** (Gaussian-weighted 25x25 local mean, bias 16,
//     inverted): a pixel is foreground when it is clearly darker than its
//     neighbourhood, which keeps the mask stable under uneven lighting.
// 4.  **Median filter** (5x5): removes salt-and-pepper speckle left by step 3.
// 5.  **Dilation** (3x3 square, 1 pass): closes small gaps so a parked car
//     registers as a solid block rather than a sparse outline.
//
// Steps 4 and 5 come straight from `imageproc`. Steps 2 and 3 need explicit
// kernel sizes and border rules, so they share a small separable convolution.

use image::{GrayImage, Luma, RgbImage};
use imageproc::distance_transform::Norm;
use imageproc::filter::median_filter;
use imageproc::morphology::dilate;

/// The binary image produced by the filter chain. Foreground pixels are 255.
pub type OccupancyMask = GrayImage;

pub const FOREGROUND: u8 = 255;

/// Tunable parameters of the filter chain. `Default` reproduces the tuned values.
#[derive(Debug, Clone)]
pub struct FilterSettings {
    /// Side length of the pre-threshold Gaussian blur kernel.
    pub blur_kernel_size: usize,
    pub blur_sigma: f32,
    /// Side length of the neighbourhood used for the adaptive threshold's local mean.
    pub threshold_block_size: usize,
    /// How much darker than its local mean a pixel must be to count as foreground.
    pub threshold_bias: i32,
    /// Side length of the median filter window.
    pub median_window: u32,
    /// Chebyshev radius of the dilation (1 == 3x3 all-ones element).
    pub dilation_radius: u8,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            blur_kernel_size: 3,
            blur_sigma: 1.0,
            threshold_block_size: 25,
            threshold_bias: 16,
            median_window: 5,
            dilation_radius: 1,
        }
    }
}

/// Pixels outside the image are synthesised from pixels inside it.
#[derive(Debug, Clone, Copy)]
enum Border {
    /// `dcb|abcd|cba`
    Reflect101,
    /// `aaa|abcd|ddd`
    Replicate,
}

impl Border {
    fn resolve(self, index: isize, len: usize) -> usize {
        let last = len as isize - 1;
        match self {
            Border::Replicate => index.clamp(0, last) as usize,
            Border::Reflect101 => {
                if last == 0 {
                    return 0;
                }
                let mut i = index;
                loop {
                    if i < 0 {
                        i = -i;
                    } else if i > last {
                        i = 2 * last - i;
                    } else {
                        return i as usize;
                    }
                }
            }
        }
    }
}

/// Converts raw frames into occupancy masks.
pub struct FrameProcessor {
    settings: FilterSettings,
    /// Pre-computed 1D weights for the noise blur.
    blur_kernel: Vec<f32>,
    /// Pre-computed 1D weights for the adaptive threshold's local mean.
    threshold_kernel: Vec<f32>,
}

impl FrameProcessor {
    pub fn new(settings: FilterSettings) -> Self {
        let blur_kernel = gaussian_kernel(settings.blur_kernel_size, settings.blur_sigma);
        // A non-positive sigma asks for the block-size-derived default.
        let threshold_kernel = gaussian_kernel(settings.threshold_block_size, 0.0);
        Self {
            settings,
            blur_kernel,
            threshold_kernel,
        }
    }

    /// Runs the full filter chain. The mask has the same dimensions as `frame`.
    pub fn process(&self, frame: &RgbImage) -> OccupancyMask {
        let (width, height) = frame.dimensions();
        if width == 0 || height == 0 {
            return GrayImage::new(width, height);
        }
        let (w, h) = (width as usize, height as usize);

        // --- 1. Luminance ---
        let gray: Vec<f32> = frame
            .pixels()
            .map(|p| {
                let [r, g, b] = p.0;
                round_to_byte(0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32)
            })
            .collect();

        // --- 2. Gaussian blur ---
        let blurred: Vec<f32> = convolve_separable(&gray, w, h, &self.blur_kernel, Border::Reflect101)
            .into_iter()
            .map(round_to_byte)
            .collect();

        // --- 3. Adaptive threshold (inverted) ---
        let local_mean = convolve_separable(&blurred, w, h, &self.threshold_kernel, Border::Replicate);
        let bias = self.settings.threshold_bias;
        let thresholded = GrayImage::from_fn(width, height, |x, y| {
            let i = y as usize * w + x as usize;
            let value = blurred[i] as i32;
            let mean = round_to_byte(local_mean[i]) as i32;
            if value - mean <= -bias {
                Luma([FOREGROUND])
            } else {
                Luma([0])
            }
        });

        // --- 4. Median filter ---
        let radius = self.settings.median_window / 2;
        let despeckled = median_filter(&thresholded, radius, radius);

        // --- 5. Dilation ---
        dilate(&despeckled, Norm::LInf, self.settings.dilation_radius)
    }
}

impl Default for FrameProcessor {
    fn default() -> Self {
        Self::new(FilterSettings::default())
    }
}

fn round_to_byte(value: f32) -> f32 {
    value.round().clamp(0.0, 255.0)
}

/// Normalised 1D Gaussian weights of the given odd `size`.
/// A non-positive `sigma` is derived from the size as `0.3 * ((size - 1) * 0.5 - 1) + 0.8`.
fn gaussian_kernel(size: usize, sigma: f32) -> Vec<f32> {
    let size = size.max(1);
    let sigma = if sigma > 0.0 {
        sigma
    } else {
        0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8
    };
    let center = (size as f32 - 1.0) / 2.0;
    let denom = 2.0 * sigma * sigma;
    let mut weights: Vec<f32> = (0..size)
        .map(|i| {
            let d = i as f32 - center;
            (-(d * d) / denom).exp()
        })
        .collect();
    let sum: f32 = weights.iter().sum();
    for w in &mut weights {
        *w /= sum;
    }
    weights
}

/// Applies `kernel` horizontally then vertically over a row-major plane.
fn convolve_separable(plane: &[f32], width: usize, height: usize, kernel: &[f32], border: Border) -> Vec<f32> {
    let radius = (kernel.len() / 2) as isize;
    let mut horizontal = vec![0.0f32; plane.len()];
    for y in 0..height {
        let row = &plane[y * width..(y + 1) * width];
        for x in 0..width {
            let mut acc = 0.0;
            for (k, weight) in kernel.iter().enumerate() {
                let sx = border.resolve(x as isize + k as isize - radius, width);
                acc += weight * row[sx];
            }
            horizontal[y * width + x] = acc;
        }
    }

    let mut output = vec![0.0f32; plane.len()];
    for y in 0..height {
        for x in 0..width {
            let mut acc = 0.0;
            for (k, weight) in kernel.iter().enumerate() {
                let sy = border.resolve(y as isize + k as isize - radius, height);
                acc += weight * horizontal[sy * width + x];
            }
            output[y * width + x] = acc;
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn bright_frame(width: u32, height: u32) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb([200, 200, 200]))
    }

    fn paint(frame: &mut RgbImage, x0: u32, y0: u32, w: u32, h: u32, color: [u8; 3]) {
        for y in y0..y0 + h {
            for x in x0..x0 + w {
                frame.put_pixel(x, y, Rgb(color));
            }
        }
    }

    #[test]
    fn gaussian_kernel_is_normalised_and_symmetric() {
        let kernel = gaussian_kernel(25, 0.0);
        assert_eq!(kernel.len(), 25);
        let sum: f32 = kernel.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        for i in 0..12 {
            assert!((kernel[i] - kernel[24 - i]).abs() < 1e-7);
        }
        assert!(kernel[12] > kernel[11]);
    }

    #[test]
    fn reflect101_border_mirrors_without_repeating_the_edge() {
        assert_eq!(Border::Reflect101.resolve(-1, 5), 1);
        assert_eq!(Border::Reflect101.resolve(-2, 5), 2);
        assert_eq!(Border::Reflect101.resolve(5, 5), 3);
        assert_eq!(Border::Reflect101.resolve(3, 1), 0);
        assert_eq!(Border::Replicate.resolve(-4, 5), 0);
        assert_eq!(Border::Replicate.resolve(9, 5), 4);
    }

    #[test]
    fn mask_keeps_frame_dimensions() {
        let processor = FrameProcessor::default();
        let mask = processor.process(&bright_frame(64, 40));
        assert_eq!(mask.dimensions(), (64, 40));
    }

    #[test]
    fn uniform_frame_has_no_foreground() {
        let processor = FrameProcessor::default();
        let mask = processor.process(&bright_frame(60, 60));
        assert!(mask.pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn dark_block_on_bright_ground_becomes_foreground() {
        let processor = FrameProcessor::default();
        let mut frame = bright_frame(80, 80);
        paint(&mut frame, 34, 34, 12, 12, [20, 20, 20]);

        let mask = processor.process(&frame);

        assert_eq!(mask.get_pixel(40, 40).0[0], FOREGROUND);
        assert_eq!(mask.get_pixel(5, 5).0[0], 0);
        assert_eq!(mask.get_pixel(75, 75).0[0], 0);
    }

    #[test]
    fn isolated_speckle_is_removed() {
        let processor = FrameProcessor::default();
        let mut frame = bright_frame(60, 60);
        paint(&mut frame, 30, 30, 1, 1, [0, 0, 0]);

        let mask = processor.process(&frame);

        assert!(mask.pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn empty_frame_yields_empty_mask() {
        let processor = FrameProcessor::default();
        let mask = processor.process(&RgbImage::new(0, 0));
        assert_eq!(mask.dimensions(), (0, 0));
    }
}
