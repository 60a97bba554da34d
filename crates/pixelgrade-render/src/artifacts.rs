//! PNG encoding and the on-disk screenshot artefact store.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::{ImageFormat, RgbaImage};

use pixelgrade_core::diff::Frame;
use pixelgrade_core::results::ScreenshotRefs;

/// Decode PNG bytes into an RGBA frame.
pub fn decode_png(bytes: &[u8]) -> Result<Frame> {
    let image = image::load_from_memory_with_format(bytes, ImageFormat::Png)
        .context("failed to decode PNG screenshot")?
        .to_rgba8();
    let (width, height) = image.dimensions();
    Frame::from_raw(width, height, image.into_raw())
}

/// Encode an RGBA frame as PNG bytes.
pub fn encode_png(frame: &Frame) -> Result<Vec<u8>> {
    let image = RgbaImage::from_raw(frame.width, frame.height, frame.data.clone())
        .context("frame buffer does not match its dimensions")?;
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, ImageFormat::Png)
        .context("failed to encode PNG")?;
    Ok(out.into_inner())
}

/// Writes candidate, expected and diff screenshots under one directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write the three screenshots for `run_id` and return their paths.
    pub async fn write(
        &self,
        run_id: &str,
        candidate_png: &[u8],
        expected_png: &[u8],
        diff: &Frame,
    ) -> Result<ScreenshotRefs> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("failed to create {}", self.dir.display()))?;

        let stem = sanitize(run_id);
        let candidate = self.dir.join(format!("{stem}-candidate.png"));
        let expected = self.dir.join(format!("{stem}-expected.png"));
        let diff_path = self.dir.join(format!("{stem}-diff.png"));

        write_file(&candidate, candidate_png).await?;
        write_file(&expected, expected_png).await?;
        write_file(&diff_path, &encode_png(diff)?).await?;

        Ok(ScreenshotRefs {
            candidate: candidate.to_string_lossy().into_owned(),
            expected: expected.to_string_lossy().into_owned(),
            diff: diff_path.to_string_lossy().into_owned(),
        })
    }
}

async fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    tokio::fs::write(path, bytes)
        .await
        .with_context(|| format!("failed to write {}", path.display()))
}

/// Restrict a run id to characters that are safe in a file name.
fn sanitize(run_id: &str) -> String {
    let cleaned: String = run_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "run".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn png_round_trip_keeps_pixels() {
        let mut frame = Frame::solid(3, 2, [255, 255, 255, 255]);
        frame.put_pixel(1, 1, [10, 20, 30, 255]);
        let decoded = decode_png(&encode_png(&frame).unwrap()).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode_png(b"not a png").is_err());
    }

    #[test]
    fn sanitize_run_ids() {
        assert_eq!(sanitize("sub-1_a"), "sub-1_a");
        assert_eq!(sanitize("../etc/passwd"), "___etc_passwd");
        assert_eq!(sanitize(""), "run");
    }

    #[tokio::test]
    async fn write_creates_three_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("shots"));
        let frame = Frame::solid(2, 2, [0, 0, 0, 255]);
        let png = encode_png(&frame).unwrap();

        let refs = store.write("sub-1", &png, &png, &frame).await.unwrap();
        for path in [&refs.candidate, &refs.expected, &refs.diff] {
            assert!(Path::new(path).is_file(), "{path} missing");
        }
        assert!(refs.diff.ends_with("sub-1-diff.png"));
        let diff = decode_png(&std::fs::read(&refs.diff).unwrap()).unwrap();
        assert_eq!(diff, frame);
    }
}
