// src/frame_source.rs
//
// The "produces frames in order" boundary. The pipeline only sees the
// FrameSource trait; the shipped implementation walks a directory of
// extracted frame images in filename order, decoding each via the image
// crate. A frame that fails to decode is skipped with a warning; end of
// stream is the normal termination signal, not an error.

use crate::types::Frame;
use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

pub trait FrameSource {
    /// Next frame in arrival order, or None when the stream is exhausted.
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

pub struct ImageSequenceSource {
    files: Vec<PathBuf>,
    next_index: usize,
    fps: f64,
}

impl ImageSequenceSource {
    const FRAME_EXTENSIONS: [&'static str; 4] = ["jpg", "jpeg", "png", "bmp"];

    /// Fails fast if the directory is missing or holds no frame images
    /// (the driver treats this as fatal before entering the loop).
    pub fn open(dir: &Path, fps: f64) -> Result<Self> {
        if !dir.is_dir() {
            anyhow::bail!("frame source is not a directory: {}", dir.display());
        }

        let mut files: Vec<PathBuf> = WalkDir::new(dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .filter(|p| {
                p.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| Self::FRAME_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();

        if files.is_empty() {
            anyhow::bail!("no frame images found in {}", dir.display());
        }

        info!("Opened frame source: {} ({} frames)", dir.display(), files.len());

        Ok(Self {
            files,
            next_index: 0,
            fps,
        })
    }

    pub fn frame_count(&self) -> usize {
        self.files.len()
    }
}

impl FrameSource for ImageSequenceSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        while self.next_index < self.files.len() {
            let path = &self.files[self.next_index];
            let timestamp = self.next_index as f64 / self.fps;
            self.next_index += 1;

            match image::open(path) {
                Ok(img) => {
                    let rgb = img.to_rgb8();
                    return Ok(Some(Frame {
                        width: rgb.width() as usize,
                        height: rgb.height() as usize,
                        data: rgb.into_raw(),
                        timestamp,
                    }));
                }
                Err(e) => {
                    warn!("Skipping undecodable frame {}: {}", path.display(), e);
                }
            }
        }
        Ok(None)
    }
}
