//! ImageNet pixel normalization.
//!
//! Networks trained with torchvision expect `(x / 255 - mean[c]) / std[c]`.
//! The exported graph applies the affine form `x * scale + bias[c]` directly on
//! raw 0-255 pixels, with a single channel-averaged scale and per-channel biases.

pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];
/// Channel-averaged standard deviation, used for the uniform scale.
pub const UNIFORM_STD: f32 = 0.226;
pub const PIXEL_RANGE: f32 = 255.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ImageNormalization {
    pub scale: f32,
    pub red_scale: f32,
    pub green_scale: f32,
    pub blue_scale: f32,
    pub red_bias: f32,
    pub green_bias: f32,
    pub blue_bias: f32,
}

impl ImageNormalization {
    pub fn from_mean_std(mean: [f32; 3], std: [f32; 3], uniform_std: f32) -> ImageNormalization {
        let scale = 1.0 / (uniform_std * PIXEL_RANGE);
        let red_scale = 1.0 / (std[0] * PIXEL_RANGE);
        let green_scale = 1.0 / (std[1] * PIXEL_RANGE);
        let blue_scale = 1.0 / (std[2] * PIXEL_RANGE);
        ImageNormalization {
            scale,
            red_scale,
            green_scale,
            blue_scale,
            red_bias: -(mean[0] * PIXEL_RANGE) * red_scale,
            green_bias: -(mean[1] * PIXEL_RANGE) * green_scale,
            blue_bias: -(mean[2] * PIXEL_RANGE) * blue_scale,
        }
    }

    pub fn imagenet() -> ImageNormalization {
        Self::from_mean_std(IMAGENET_MEAN, IMAGENET_STD, UNIFORM_STD)
    }

    /// Biases in RGB channel order.
    pub fn bias(&self) -> [f32; 3] {
        [self.red_bias, self.green_bias, self.blue_bias]
    }

    pub fn channel_scales(&self) -> [f32; 3] {
        [self.red_scale, self.green_scale, self.blue_scale]
    }

    /// Apply the embedded transform to a single raw pixel value.
    pub fn apply(&self, channel: usize, pixel: f32) -> f32 {
        pixel * self.scale + self.bias()[channel]
    }
}

impl Default for ImageNormalization {
    fn default() -> ImageNormalization {
        ImageNormalization::imagenet()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coefficients_follow_mean_and_std() {
        let n = ImageNormalization::imagenet();
        assert_eq!(n.scale, 1.0 / (0.226f32 * 255.0));
        assert_eq!(n.red_scale, 1.0 / (0.229f32 * 255.0));
        assert_eq!(n.green_scale, 1.0 / (0.224f32 * 255.0));
        assert_eq!(n.blue_scale, 1.0 / (0.225f32 * 255.0));
        assert_eq!(n.red_bias, -(0.485f32 * 255.0) * n.red_scale);
        assert_eq!(n.green_bias, -(0.456f32 * 255.0) * n.green_scale);
        assert_eq!(n.blue_bias, -(0.406f32 * 255.0) * n.blue_scale);
    }

    #[test]
    fn mean_pixel_maps_near_zero() {
        let n = ImageNormalization::imagenet();
        for c in 0..3 {
            let mean_pixel = IMAGENET_MEAN[c] * PIXEL_RANGE;
            // uniform scale vs per-channel std: only the bias is exact
            assert!(n.apply(c, mean_pixel).abs() < 0.05);
        }
    }

    #[test]
    fn bias_is_rgb_ordered() {
        let n = ImageNormalization::imagenet();
        assert_eq!(n.bias(), [n.red_bias, n.green_bias, n.blue_bias]);
        assert!(n.bias().iter().all(|b| *b < 0.0));
    }
}
