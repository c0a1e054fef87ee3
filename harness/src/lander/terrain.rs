//! Random terrain with a flat helipad in the middle.

use rand::Rng;
use serde::{Deserialize, Serialize};

pub const CHUNKS: usize = 11;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Terrain {
    /// Chunk boundaries, evenly spaced over the viewport width
    xs: Vec<f64>,
    heights: Vec<f64>,
    helipad_x1: f64,
    helipad_x2: f64,
    helipad_y: f64,
}

impl Terrain {
    /// Smoothed random heights in `[0, height / 2]`, with the chunks
    /// around the centre held at `helipad_y`
    pub fn generate<R: Rng>(rng: &mut R, width: f64, height: f64, helipad_y: f64) -> Self {
        let step = width / (CHUNKS - 1) as f64;
        let xs: Vec<f64> = (0..CHUNKS).map(|i| i as f64 * step).collect();

        let mut raw: Vec<f64> = (0..=CHUNKS)
            .map(|_| rng.gen_range(0.0..height / 2.0))
            .collect();
        for h in &mut raw[CHUNKS / 2 - 2..=CHUNKS / 2 + 2] {
            *h = helipad_y;
        }

        let mut heights: Vec<f64> = (0..CHUNKS)
            .map(|i| {
                let prev = raw[(i + CHUNKS) % (CHUNKS + 1)];
                0.33 * (prev + raw[i] + raw[i + 1])
            })
            .collect();
        for h in &mut heights[CHUNKS / 2 - 1..=CHUNKS / 2 + 1] {
            *h = helipad_y;
        }

        Self {
            helipad_x1: xs[CHUNKS / 2 - 1],
            helipad_x2: xs[CHUNKS / 2 + 1],
            xs,
            heights,
            helipad_y,
        }
    }

    /// Completely flat terrain at `level`
    pub fn flat(width: f64, level: f64) -> Self {
        let step = width / (CHUNKS - 1) as f64;
        let xs: Vec<f64> = (0..CHUNKS).map(|i| i as f64 * step).collect();
        Self {
            helipad_x1: xs[CHUNKS / 2 - 1],
            helipad_x2: xs[CHUNKS / 2 + 1],
            xs,
            heights: vec![level; CHUNKS],
            helipad_y: level,
        }
    }

    /// Ground height under `x`, clamped to the outermost chunks
    pub fn height_at(&self, x: f64) -> f64 {
        let last = self.xs.len() - 1;
        if x <= self.xs[0] {
            return self.heights[0];
        }
        if x >= self.xs[last] {
            return self.heights[last];
        }
        let i = self.xs.partition_point(|&cx| cx <= x) - 1;
        let t = (x - self.xs[i]) / (self.xs[i + 1] - self.xs[i]);
        self.heights[i] + t * (self.heights[i + 1] - self.heights[i])
    }

    pub fn helipad(&self) -> (f64, f64) {
        (self.helipad_x1, self.helipad_x2)
    }

    pub fn helipad_y(&self) -> f64 {
        self.helipad_y
    }

    pub fn is_over_helipad(&self, x: f64) -> bool {
        (self.helipad_x1..=self.helipad_x2).contains(&x)
    }
}
