use rand::Rng;

use super::cifar::{IMAGE_BYTES, IMAGE_CHANNELS, IMAGE_SIDE};

/// Per-channel mean of the CIFAR-10 training images.
pub const CIFAR_MEAN: [f32; 3] = [0.491_399_7, 0.482_158_3, 0.446_531_2];
/// Per-channel standard deviation of the CIFAR-10 training images.
pub const CIFAR_STD: [f32; 3] = [0.247_032_3, 0.243_485_05, 0.261_587_7];

/// Zero padding added around the image before a random crop.
const CROP_PADDING: usize = 4;

/// How raw image bytes turn into network input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    /// Scale to `[0, 1]` and normalize.
    Test,
    /// Random padded crop and horizontal flip, normalize, then optionally cut out a square.
    Train { cutout: Option<usize> },
}

impl Transform {
    /// Applies the transform to one image.
    ///
    /// # Arguments
    /// * `image` - `IMAGE_BYTES` bytes in channel-major order.
    /// * `rng` - Source of the augmentation randomness; unused by `Transform::Test`.
    ///
    /// # Returns
    /// The normalized image as `IMAGE_BYTES` floats in the same layout.
    pub fn apply<R: Rng>(&self, image: &[u8], rng: &mut R) -> Vec<f32> {
        match *self {
            Transform::Test => image
                .chunks_exact(IMAGE_SIDE * IMAGE_SIDE)
                .enumerate()
                .flat_map(|(c, plane)| plane.iter().map(move |&p| normalize(p, c)))
                .collect(),
            Transform::Train { cutout } => {
                let mut out = augment(image, rng);
                if let Some(length) = cutout {
                    cut_out(&mut out, length, rng);
                }
                out
            }
        }
    }
}

#[inline]
fn normalize(pixel: u8, channel: usize) -> f32 {
    (pixel as f32 / 255. - CIFAR_MEAN[channel]) / CIFAR_STD[channel]
}

/// Random crop of the zero padded image followed by a random horizontal flip.
fn augment<R: Rng>(image: &[u8], rng: &mut R) -> Vec<f32> {
    let top = rng.random_range(0..=2 * CROP_PADDING);
    let left = rng.random_range(0..=2 * CROP_PADDING);
    let flip = rng.random_bool(0.5);

    let side = IMAGE_SIDE as isize;
    let mut out = Vec::with_capacity(IMAGE_BYTES);
    for c in 0..IMAGE_CHANNELS {
        let plane = &image[c * IMAGE_SIDE * IMAGE_SIDE..(c + 1) * IMAGE_SIDE * IMAGE_SIDE];
        for y in 0..IMAGE_SIDE {
            for x in 0..IMAGE_SIDE {
                let x = if flip { IMAGE_SIDE - 1 - x } else { x };
                let src_y = (y + top) as isize - CROP_PADDING as isize;
                let src_x = (x + left) as isize - CROP_PADDING as isize;

                let inside = (0..side).contains(&src_y) && (0..side).contains(&src_x);
                let pixel = if inside {
                    plane[src_y as usize * IMAGE_SIDE + src_x as usize]
                } else {
                    0
                };
                out.push(normalize(pixel, c));
            }
        }
    }

    out
}

/// Zeroes a `length` square centered at a random pixel, clipped to the image, on every channel.
fn cut_out<R: Rng>(image: &mut [f32], length: usize, rng: &mut R) {
    let cy = rng.random_range(0..IMAGE_SIDE);
    let cx = rng.random_range(0..IMAGE_SIDE);
    let half = length / 2;

    let (y1, y2) = (cy.saturating_sub(half), (cy + half).min(IMAGE_SIDE));
    let (x1, x2) = (cx.saturating_sub(half), (cx + half).min(IMAGE_SIDE));

    for plane in image.chunks_exact_mut(IMAGE_SIDE * IMAGE_SIDE) {
        for y in y1..y2 {
            plane[y * IMAGE_SIDE + x1..y * IMAGE_SIDE + x2].fill(0.);
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn gradient() -> Vec<u8> {
        (0..IMAGE_BYTES).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn test_transform_normalizes_per_channel() {
        let image = vec![255u8; IMAGE_BYTES];
        let out = Transform::Test.apply(&image, &mut StdRng::seed_from_u64(0));

        assert_eq!(out.len(), IMAGE_BYTES);
        for c in 0..IMAGE_CHANNELS {
            let expected = (1. - CIFAR_MEAN[c]) / CIFAR_STD[c];
            assert!((out[c * IMAGE_SIDE * IMAGE_SIDE] - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn train_transform_is_reproducible_from_the_seed() {
        let image = gradient();
        let transform = Transform::Train { cutout: Some(16) };

        let a = transform.apply(&image, &mut StdRng::seed_from_u64(7));
        let b = transform.apply(&image, &mut StdRng::seed_from_u64(7));
        assert_eq!(a, b);
        assert_eq!(a.len(), IMAGE_BYTES);
    }

    #[test]
    fn cutout_zeroes_a_clipped_square() {
        let mut image = vec![1f32; IMAGE_BYTES];
        cut_out(&mut image, 16, &mut StdRng::seed_from_u64(3));

        let zeroed = image.iter().filter(|&&v| v == 0.).count();
        assert!(zeroed > 0);
        assert!(zeroed <= IMAGE_CHANNELS * 16 * 16);
        assert_eq!(zeroed % IMAGE_CHANNELS, 0);
    }

    #[test]
    fn crop_pads_with_normalized_black() {
        let image = vec![255u8; IMAGE_BYTES];
        let black = normalize(0, 0);
        let white = normalize(255, 0);

        // Across seeds every value of the first plane is either padding or image.
        for seed in 0..8 {
            let out = Transform::Train { cutout: None }.apply(&image, &mut StdRng::seed_from_u64(seed));
            assert!(out[..IMAGE_SIDE * IMAGE_SIDE].iter().all(|&v| v == black || v == white));
        }
    }
}
