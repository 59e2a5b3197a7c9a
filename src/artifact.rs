// src/artifact.rs
//
// Renders evidence images: one annotated JPEG per frame that produced at
// least one surviving candidate, shared by every candidate of that frame.
// Filenames carry the epoch-millisecond stamp plus a process-monotonic
// sequence number so same-millisecond bursts cannot collide.

use crate::types::{Frame, ViolationCandidate};
use anyhow::{Context, Result};
use image::{ImageBuffer, Rgb, RgbImage};
use std::path::{Path, PathBuf};
use tracing::debug;

const BOX_THICKNESS: u32 = 3;
const LABEL_BAND_HEIGHT: u32 = 14;

pub struct ArtifactWriter {
    out_dir: PathBuf,
    prefix: String,
    jpeg_quality: u8,
    seq: u64,
}

impl ArtifactWriter {
    pub fn new(out_dir: &Path, prefix: &str, jpeg_quality: u8) -> Result<Self> {
        std::fs::create_dir_all(out_dir)
            .with_context(|| format!("creating artifact directory {}", out_dir.display()))?;
        Ok(Self {
            out_dir: out_dir.to_path_buf(),
            prefix: prefix.to_string(),
            jpeg_quality,
            seq: 0,
        })
    }

    /// Draw every candidate's box onto a copy of the frame and write it
    /// once. Returns the path shared by all candidates of this frame.
    pub fn write_artifact(
        &mut self,
        frame: &Frame,
        candidates: &[ViolationCandidate],
    ) -> Result<PathBuf> {
        let mut img: RgbImage =
            ImageBuffer::from_raw(frame.width as u32, frame.height as u32, frame.data.clone())
                .context("frame buffer does not match declared dimensions")?;

        for candidate in candidates {
            let color = color_for(&candidate.violation_type);
            draw_labeled_box(&mut img, candidate.bbox, color, &candidate.violation_type);
        }

        let path = self.next_path();
        let mut buf = std::io::Cursor::new(Vec::new());
        let encoder =
            image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, self.jpeg_quality);
        img.write_with_encoder(encoder)
            .context("encoding artifact JPEG")?;
        std::fs::write(&path, buf.into_inner())
            .with_context(|| format!("writing artifact {}", path.display()))?;

        debug!("Wrote artifact {} ({} candidates)", path.display(), candidates.len());
        Ok(path)
    }

    fn next_path(&mut self) -> PathBuf {
        let millis = chrono::Utc::now().timestamp_millis();
        self.seq += 1;
        self.out_dir
            .join(format!("{}_{}_{}.jpg", self.prefix, millis, self.seq))
    }
}

/// Stable per-type color so the same violation always renders the same
/// (purely cosmetic).
fn color_for(violation_type: &str) -> Rgb<u8> {
    const PALETTE: [Rgb<u8>; 5] = [
        Rgb([220, 40, 40]),
        Rgb([40, 170, 40]),
        Rgb([40, 80, 220]),
        Rgb([220, 160, 30]),
        Rgb([170, 40, 170]),
    ];
    let hash: usize = violation_type.bytes().map(usize::from).sum();
    PALETTE[hash % PALETTE.len()]
}

fn draw_labeled_box(img: &mut RgbImage, bbox: [f32; 4], color: Rgb<u8>, label: &str) {
    let (w, h) = (img.width() as i64, img.height() as i64);

    let x1 = (bbox[0] as i64).clamp(0, w.saturating_sub(1));
    let y1 = (bbox[1] as i64).clamp(0, h.saturating_sub(1));
    let x2 = (bbox[2] as i64).clamp(0, w.saturating_sub(1));
    let y2 = (bbox[3] as i64).clamp(0, h.saturating_sub(1));
    if x2 <= x1 || y2 <= y1 {
        return;
    }

    let t = BOX_THICKNESS as i64;
    for y in y1..=y2 {
        for x in x1..=x2 {
            let on_edge = x - x1 < t || x2 - x < t || y - y1 < t || y2 - y < t;
            if on_edge {
                img.put_pixel(x as u32, y as u32, color);
            }
        }
    }

    // Filled band above the top edge standing in for the label text; width
    // scales with the label so types are distinguishable at a glance.
    let band_w = ((label.len() as i64) * 8).min(x2 - x1);
    let band_y1 = (y1 - LABEL_BAND_HEIGHT as i64).max(0);
    for y in band_y1..y1 {
        for x in x1..(x1 + band_w).min(w) {
            img.put_pixel(x as u32, y as u32, color);
        }
    }
}
