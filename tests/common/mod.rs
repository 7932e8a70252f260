#![allow(dead_code)]

use image::{DynamicImage, Rgb, RgbImage};
use imgtier::cache::budget::GIB;
use imgtier::{CacheConfig, Image, ImageCache};
use std::path::Path;

/// Config for a high-class device with no sweep at open.
pub fn config_in(dir: &Path) -> CacheConfig {
    CacheConfig {
        physical_memory_bytes: Some(4 * GIB),
        expiry_sweep_on_open: false,
        ..CacheConfig::in_dir(dir)
    }
}

pub fn open(dir: &Path) -> ImageCache {
    ImageCache::open(config_in(dir)).unwrap()
}

/// A solid-colour RGB image; decoded cost is `w * h * 3` bytes.
pub fn solid(w: u32, h: u32, shade: u8) -> Image {
    Image::new(DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([shade, shade, shade]))))
}

pub fn disk_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|rd| rd.flatten().filter_map(|e| e.file_name().into_string().ok()).collect())
        .unwrap_or_default();
    names.retain(|n| !n.starts_with('.'));
    names.sort();
    names
}
