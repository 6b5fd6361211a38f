#![allow(dead_code)]
use depthcomp::{DepthImage, ImageSize};
use std::time::Duration;

/// Abort the process if the test doesn't finish in time. A participant that
/// never enters a collective call would otherwise block its peers forever.
pub fn set_timelimit_default() {
    std::thread::spawn(|| {
        std::thread::sleep(Duration::from_secs(60));
        eprintln!("!!! Time limit exceeed.");
        std::process::abort();
    });
}

pub fn try_init_logger_for_default_harness() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub struct Xorshift32(pub u32);

impl Iterator for Xorshift32 {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 17;
        self.0 ^= self.0 << 5;
        Some(self.0)
    }
}

/// Generate a partial image whose depths are distinct across `seed`s with
/// high probability.
pub fn random_image(size: ImageSize, seed: u32) -> DepthImage {
    let count = size.pixel_count();
    let mut rng = Xorshift32(seed.wrapping_mul(0x9e3779b9) | 1);
    let depth = (&mut rng).take(count).map(|x| x as f32).collect();
    let value = rng.take(count).map(|x| (x % 1000) as f32).collect();
    DepthImage::new(size, depth, value).unwrap()
}

pub fn bits(x: &[f32]) -> Vec<u32> {
    x.iter().map(|x| x.to_bits()).collect()
}
