use crate::error::PostProcessError;

/// Radius used by the blur-clip post-process unless configured otherwise.
pub const DEFAULT_BLUR_RADIUS: u32 = 25;

/// Normalized 1-D Gaussian weights, `2 * radius + 1` taps, peak at the center.
#[derive(Clone, Debug, PartialEq)]
pub struct BlurKernel {
    radius: u32,
    sigma: f32,
    weights: Vec<f32>,
}

impl BlurKernel {
    /// `sigma = 0.3 * (radius - 1) + 0.8`, the usual rule of thumb for a kernel of this
    /// size.
    pub fn gaussian(radius: u32) -> Result<Self, PostProcessError> {
        if radius == 0 {
            return Err(PostProcessError::InvalidRadius(radius));
        }

        let sigma = 0.3 * (radius as f32 - 1.0) + 0.8;
        let r = radius as i64;
        let denom = 2.0 * f64::from(sigma) * f64::from(sigma);

        let mut raw = Vec::<f64>::with_capacity((2 * r + 1) as usize);
        let mut sum = 0.0f64;
        for i in -r..=r {
            let x = i as f64;
            let w = (-x * x / denom).exp();
            raw.push(w);
            sum += w;
        }

        let weights = raw.iter().map(|&w| (w / sum) as f32).collect();
        Ok(Self {
            radius,
            sigma,
            weights,
        })
    }

    pub fn radius(&self) -> u32 {
        self.radius
    }

    pub fn sigma(&self) -> f32 {
        self.sigma
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Little-endian `f32` bytes, as uploaded to a GPU storage buffer.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.weights.iter().flat_map(|w| w.to_le_bytes()).collect()
    }
}
