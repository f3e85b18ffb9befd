//! Video decode/encode and audio extraction via FFmpeg subprocesses.
//!
//! Frames cross the process boundary as raw RGB24 over pipes; container
//! formats, codecs, and resampling stay FFmpeg's problem. Still images are
//! accepted as single-frame "videos" for dubbing a photo.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tracing::{debug, info};

use crate::error::{MediaError, MediaResult};
use crate::frame::Frame;
use crate::probe::probe_video;

/// Extensions treated as still images rather than videos.
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp"];

/// Whether the source path is a still image input.
pub fn is_still_image(path: impl AsRef<Path>) -> bool {
    path.as_ref()
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Decode the source into an ordered frame sequence, returning the frames
/// and the frame rate.
///
/// Videos are optionally downscaled by an integer `resize_factor` before
/// decoding; still images load as one frame at `fps_for_still`.
pub async fn decode_frames(
    path: impl AsRef<Path>,
    resize_factor: u32,
    fps_for_still: f64,
) -> MediaResult<(Vec<Frame>, f64)> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(MediaError::MissingInput(path.to_path_buf()));
    }

    if is_still_image(path) {
        let img = image::open(path)
            .map_err(|e| MediaError::InvalidVideo(format!("cannot read image: {e}")))?
            .to_rgb8();
        return Ok((vec![Frame::new(img)], fps_for_still));
    }

    let info = probe_video(path).await?;
    if info.width == 0 || info.height == 0 {
        return Err(MediaError::InvalidVideo(format!(
            "source reports {}x{}",
            info.width, info.height
        )));
    }

    let factor = resize_factor.max(1);
    let width = (info.width / factor).max(1);
    let height = (info.height / factor).max(1);

    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

    let mut cmd = Command::new("ffmpeg");
    cmd.args(["-v", "error", "-i"])
        .arg(path)
        .args(["-f", "rawvideo", "-pix_fmt", "rgb24"]);
    if factor > 1 {
        cmd.args(["-vf", &format!("scale={width}:{height}")]);
    }
    cmd.arg("pipe:1")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    debug!("Decoding frames: {:?}", cmd);
    let output = cmd.output().await?;
    if !output.status.success() {
        return Err(MediaError::ffmpeg_failed(
            "FFmpeg frame decode failed",
            Some(String::from_utf8_lossy(&output.stderr).to_string()),
            output.status.code(),
        ));
    }

    let frame_bytes = width as usize * height as usize * 3;
    if output.stdout.len() % frame_bytes != 0 {
        return Err(MediaError::InvalidVideo(format!(
            "decoded stream is {} bytes, not a multiple of the {}-byte frame",
            output.stdout.len(),
            frame_bytes
        )));
    }

    let frames: Vec<Frame> = output
        .stdout
        .chunks_exact(frame_bytes)
        .map(|chunk| Frame::from_raw(width, height, chunk.to_vec()))
        .collect::<MediaResult<_>>()?;

    if frames.is_empty() {
        return Err(MediaError::InvalidVideo(
            "source contains no decodable frames".to_string(),
        ));
    }

    info!(
        frames = frames.len(),
        width, height, fps = info.fps, "decoded source frames"
    );
    Ok((frames, info.fps))
}

/// Transcode the audio source to 16 kHz mono WAV at `wav_out`.
///
/// Always transcodes: this is also where arbitrary input sample rates get
/// resampled to what the mel extractor expects.
pub async fn extract_audio(src: impl AsRef<Path>, wav_out: impl AsRef<Path>) -> MediaResult<()> {
    let src = src.as_ref();
    let wav_out = wav_out.as_ref();
    if !src.exists() {
        return Err(MediaError::MissingInput(src.to_path_buf()));
    }
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

    let output = Command::new("ffmpeg")
        .args(["-y", "-v", "error", "-i"])
        .arg(src)
        .args(["-vn", "-acodec", "pcm_s16le", "-ar", "16000", "-ac", "1"])
        .arg(wav_out)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::ffmpeg_failed(
            "FFmpeg audio extraction failed",
            Some(String::from_utf8_lossy(&output.stderr).to_string()),
            output.status.code(),
        ));
    }
    Ok(())
}

/// Streams composited frames into FFmpeg and muxes them with the original
/// audio track.
pub struct VideoEncoder {
    child: Child,
    stdin: ChildStdin,
    output_path: PathBuf,
    width: u32,
    height: u32,
}

impl VideoEncoder {
    /// Spawn the encoder. Frames written must match `width`x`height`.
    pub async fn new(
        output_path: impl AsRef<Path>,
        width: u32,
        height: u32,
        fps: f64,
        audio_path: impl AsRef<Path>,
    ) -> MediaResult<Self> {
        let output_path = output_path.as_ref().to_path_buf();
        which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

        if let Some(parent) = output_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut child = Command::new("ffmpeg")
            .args([
                "-y",
                "-v",
                "error",
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgb24",
                "-s",
                &format!("{width}x{height}"),
                "-r",
                &format!("{fps:.3}"),
                "-i",
                "pipe:0",
                "-i",
            ])
            .arg(audio_path.as_ref())
            .args([
                "-c:v",
                "libx264",
                "-preset",
                "medium",
                "-crf",
                "18",
                "-pix_fmt",
                "yuv420p",
                "-c:a",
                "aac",
                "-b:a",
                "128k",
            ])
            .arg(&output_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdin = child.stdin.take().expect("stdin not captured");

        Ok(Self {
            child,
            stdin,
            output_path,
            width,
            height,
        })
    }

    /// Write one frame to the encoder.
    pub async fn write_frame(&mut self, frame: &Frame) -> MediaResult<()> {
        if frame.width() != self.width || frame.height() != self.height {
            return Err(MediaError::encoding_failure(format!(
                "frame is {}x{}, encoder expects {}x{}",
                frame.width(),
                frame.height(),
                self.width,
                self.height
            )));
        }
        self.stdin.write_all(frame.as_raw()).await?;
        Ok(())
    }

    /// Close the stream, reap FFmpeg, and verify the output file.
    ///
    /// Returns the output file size in bytes.
    pub async fn finish(mut self) -> MediaResult<u64> {
        self.stdin.shutdown().await?;
        drop(self.stdin);

        let output = self.child.wait_with_output().await?;
        if !output.status.success() {
            return Err(MediaError::encoding_failure(format!(
                "FFmpeg exited with {:?}: {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        let metadata = tokio::fs::metadata(&self.output_path).await.map_err(|_| {
            MediaError::encoding_failure(format!(
                "output file was not produced: {}",
                self.output_path.display()
            ))
        })?;
        if metadata.len() == 0 {
            return Err(MediaError::encoding_failure(format!(
                "output file is empty: {}",
                self.output_path.display()
            )));
        }
        Ok(metadata.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_still_image() {
        assert!(is_still_image("face.JPG"));
        assert!(is_still_image("/tmp/a/b/portrait.png"));
        assert!(!is_still_image("clip.mp4"));
        assert!(!is_still_image("noext"));
    }

    #[tokio::test]
    async fn test_decode_missing_input() {
        let err = decode_frames("/nonexistent/clip.mp4", 1, 25.0)
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::MissingInput(_)));
    }

    #[tokio::test]
    async fn test_extract_audio_missing_input() {
        let err = extract_audio("/nonexistent/track.mp3", "/tmp/out.wav")
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::MissingInput(_)));
    }
}
