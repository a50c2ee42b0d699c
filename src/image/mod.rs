//! Cloud image download and verification

pub mod checksum;
pub mod fetch;

pub use fetch::{AcquiredImage, ImageFetcher, ImageSource, image_filename};
