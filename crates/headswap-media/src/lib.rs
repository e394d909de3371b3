//! headswap-media: image input, output and preview.
//!
//! Loads photos (taking the first frame of animated GIFs), saves results in
//! colour or greyscale, and hands finished images to the desktop viewer.

pub mod image_io;
pub mod viewer;

pub use image_io::{open_image, save_image, MediaError};
pub use viewer::show;
