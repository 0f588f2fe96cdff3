//! Streaming video encoders.
//!
//! An [`EncoderRuntime`] knows which codecs it can produce and opens a
//! [`FrameWriter`] that accepts raw RGBA frames one at a time. The production
//! runtime pipes frames into an `ffmpeg` child process.

use std::collections::HashSet;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use image::RgbaImage;
use slidereel_common::config::EncoderConfig;
use slidereel_common::error::{ReelError, ReelResult};

/// Output container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    WebM,
    Mp4,
}

impl Container {
    /// File extension, without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            Self::WebM => "webm",
            Self::Mp4 => "mp4",
        }
    }

    /// Muxer name passed to `ffmpeg -f`.
    pub fn muxer(self) -> &'static str {
        match self {
            Self::WebM => "webm",
            Self::Mp4 => "mp4",
        }
    }
}

/// One container/codec combination the exporter may try.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecCandidate {
    /// MIME type of the resulting file.
    pub mime_type: &'static str,
    pub container: Container,
    /// ffmpeg encoder name.
    pub encoder: &'static str,
    /// Encoder-specific arguments placed after `-c:v`.
    pub extra_args: &'static [&'static str],
}

impl CodecCandidate {
    pub fn extension(&self) -> &'static str {
        self.container.extension()
    }
}

/// Candidates in preference order: VP9 WebM, VP8 WebM, then H.264 MP4.
pub const DEFAULT_CANDIDATES: [CodecCandidate; 3] = [
    CodecCandidate {
        mime_type: "video/webm;codecs=vp9",
        container: Container::WebM,
        encoder: "libvpx-vp9",
        extra_args: &["-deadline", "realtime", "-cpu-used", "8", "-row-mt", "1"],
    },
    CodecCandidate {
        mime_type: "video/webm;codecs=vp8",
        container: Container::WebM,
        encoder: "libvpx",
        extra_args: &["-deadline", "realtime", "-cpu-used", "8"],
    },
    CodecCandidate {
        mime_type: "video/mp4",
        container: Container::Mp4,
        encoder: "libx264",
        extra_args: &["-preset", "veryfast", "-profile:v", "high", "-movflags", "+faststart"],
    },
];

/// Target video bitrate.
pub const DEFAULT_BITRATE_KBPS: u32 = 8000;

/// Shape of the stream handed to a writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSpec {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub bitrate_kbps: u32,
}

impl StreamSpec {
    /// Size in bytes of one raw RGBA frame.
    pub fn frame_bytes(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

/// Accepts frames for one output file.
pub trait FrameWriter: Send {
    /// Append one frame. Frames must match the opened stream's dimensions.
    fn write_frame(&mut self, frame: &RgbaImage) -> ReelResult<()>;

    /// Flush, close, and return the encoded file contents.
    fn finish(self: Box<Self>) -> ReelResult<Vec<u8>>;
}

/// Something that can encode video.
pub trait EncoderRuntime: Send + Sync {
    fn name(&self) -> &str;

    /// Whether `candidate` can be produced by this runtime.
    fn supports(&self, candidate: &CodecCandidate) -> bool;

    /// Start a new output stream.
    fn open(&self, candidate: &CodecCandidate, spec: &StreamSpec)
        -> ReelResult<Box<dyn FrameWriter>>;
}

/// Pick the first candidate the runtime supports.
pub fn negotiate(
    runtime: &dyn EncoderRuntime,
    candidates: &[CodecCandidate],
) -> ReelResult<CodecCandidate> {
    for candidate in candidates {
        if runtime.supports(candidate) {
            tracing::debug!(
                runtime = runtime.name(),
                mime_type = candidate.mime_type,
                encoder = candidate.encoder,
                "Selected codec"
            );
            return Ok(*candidate);
        }
        tracing::debug!(
            runtime = runtime.name(),
            encoder = candidate.encoder,
            "Codec not available"
        );
    }

    let tried: Vec<&str> = candidates.iter().map(|c| c.mime_type).collect();
    Err(ReelError::encoder_init(format!(
        "{} supports none of: {}",
        runtime.name(),
        tried.join(", ")
    )))
}

/// Encodes through an external `ffmpeg` binary.
#[derive(Debug)]
pub struct FfmpegRuntime {
    binary: String,
    scratch_dir: PathBuf,
    encoders: OnceLock<HashSet<String>>,
}

impl FfmpegRuntime {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            scratch_dir: std::env::temp_dir(),
            encoders: OnceLock::new(),
        }
    }

    pub fn from_config(config: &EncoderConfig) -> Self {
        Self::new(config.ffmpeg_path.clone())
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Whether the binary could be run at all.
    pub fn is_available(&self) -> bool {
        !self.available_encoders().is_empty()
    }

    /// Encoder names reported by `ffmpeg -encoders`, probed once.
    pub fn available_encoders(&self) -> &HashSet<String> {
        self.encoders.get_or_init(|| probe_encoders(&self.binary))
    }

    fn scratch_path(&self, candidate: &CodecCandidate) -> PathBuf {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        let n = NEXT.fetch_add(1, Ordering::Relaxed);
        self.scratch_dir.join(format!(
            "slidereel-{}-{n}.{}",
            std::process::id(),
            candidate.extension()
        ))
    }
}

impl EncoderRuntime for FfmpegRuntime {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn supports(&self, candidate: &CodecCandidate) -> bool {
        self.available_encoders().contains(candidate.encoder)
    }

    fn open(
        &self,
        candidate: &CodecCandidate,
        spec: &StreamSpec,
    ) -> ReelResult<Box<dyn FrameWriter>> {
        let output = self.scratch_path(candidate);
        let args = ffmpeg_args(candidate, spec, &output);
        tracing::debug!(binary = %self.binary, args = ?args, "Starting ffmpeg");

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ReelError::encoder_init(format!("Failed to start {}: {e}", self.binary)))?;

        let stdin = child.stdin.take();
        let stderr = child.stderr.take();
        let (Some(stdin), Some(stderr)) = (stdin, stderr) else {
            child.kill().ok();
            child.wait().ok();
            return Err(ReelError::encoder_init("Failed to capture ffmpeg pipes"));
        };

        // ffmpeg blocks once its stderr pipe fills, so drain it on the side.
        let stderr_task = std::thread::spawn(move || -> String {
            let mut reader = BufReader::new(stderr);
            let mut output = String::new();
            match reader.read_to_string(&mut output) {
                Ok(_) => output,
                Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
            }
        });

        tracing::info!(
            pid = child.id(),
            encoder = candidate.encoder,
            width = spec.width,
            height = spec.height,
            fps = spec.frame_rate,
            "ffmpeg process started"
        );

        Ok(Box::new(FfmpegWriter {
            child: Some(child),
            stdin: Some(BufWriter::with_capacity(spec.frame_bytes(), stdin)),
            stderr_task: Some(stderr_task),
            output,
            expected: (spec.width, spec.height),
            frames: 0,
        }))
    }
}

/// Full ffmpeg argument list for one stream.
///
/// Raw RGBA frames arrive on stdin at the stream's frame rate; the encoder is
/// held to a constant bitrate.
pub fn ffmpeg_args(candidate: &CodecCandidate, spec: &StreamSpec, output: &Path) -> Vec<String> {
    let bitrate = format!("{}k", spec.bitrate_kbps.max(1));
    let bufsize = format!("{}k", spec.bitrate_kbps.max(1) * 2);

    let mut args: Vec<String> = [
        "-hide_banner",
        "-loglevel",
        "error",
        "-y",
        "-f",
        "rawvideo",
        "-pix_fmt",
        "rgba",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    args.extend([
        "-s".to_string(),
        format!("{}x{}", spec.width, spec.height),
        "-r".to_string(),
        spec.frame_rate.to_string(),
        "-i".to_string(),
        "-".to_string(),
        "-an".to_string(),
        "-c:v".to_string(),
        candidate.encoder.to_string(),
    ]);
    args.extend(candidate.extra_args.iter().map(|s| s.to_string()));
    args.extend([
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-b:v".to_string(),
        bitrate.clone(),
        "-minrate".to_string(),
        bitrate.clone(),
        "-maxrate".to_string(),
        bitrate,
        "-bufsize".to_string(),
        bufsize,
        "-f".to_string(),
        candidate.container.muxer().to_string(),
        output.display().to_string(),
    ]);
    args
}

fn probe_encoders(binary: &str) -> HashSet<String> {
    let output = match Command::new(binary)
        .args(["-hide_banner", "-encoders"])
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
    {
        Ok(output) if output.status.success() => output,
        Ok(output) => {
            tracing::warn!(binary, status = %output.status, "ffmpeg encoder probe failed");
            return HashSet::new();
        }
        Err(err) => {
            tracing::warn!(binary, error = %err, "ffmpeg not found");
            return HashSet::new();
        }
    };

    let encoders = parse_encoder_list(&String::from_utf8_lossy(&output.stdout));
    tracing::debug!(binary, count = encoders.len(), "Probed ffmpeg encoders");
    encoders
}

/// Parse the table printed by `ffmpeg -encoders`.
///
/// Entries follow a ` ------` separator line and look like
/// ` V....D libx264   libx264 H.264 ...`.
pub fn parse_encoder_list(text: &str) -> HashSet<String> {
    text.lines()
        .skip_while(|line| !line.trim_start().starts_with("---"))
        .skip(1)
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let flags = parts.next()?;
            let name = parts.next()?;
            flags.starts_with('V').then(|| name.to_string())
        })
        .collect()
}

struct FfmpegWriter {
    child: Option<Child>,
    stdin: Option<BufWriter<ChildStdin>>,
    stderr_task: Option<std::thread::JoinHandle<String>>,
    output: PathBuf,
    expected: (u32, u32),
    frames: u64,
}

impl FfmpegWriter {
    fn stderr_output(&mut self) -> String {
        self.stderr_task
            .take()
            .map(|task| {
                task.join()
                    .unwrap_or_else(|_| "<failed to join stderr reader>".to_string())
            })
            .unwrap_or_default()
    }
}

impl FrameWriter for FfmpegWriter {
    fn write_frame(&mut self, frame: &RgbaImage) -> ReelResult<()> {
        if frame.dimensions() != self.expected {
            return Err(ReelError::encode_runtime(format!(
                "frame is {}x{}, stream is {}x{}",
                frame.width(),
                frame.height(),
                self.expected.0,
                self.expected.1
            )));
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| ReelError::encode_runtime("ffmpeg input already closed"))?;
        if let Err(err) = stdin.write_all(frame.as_raw()) {
            let stderr = {
                self.stdin = None;
                if let Some(child) = self.child.as_mut() {
                    child.kill().ok();
                    child.wait().ok();
                }
                self.stderr_output()
            };
            return Err(ReelError::encode_runtime(format!(
                "ffmpeg stopped accepting frames after {}: {err} {}",
                self.frames,
                stderr.trim()
            )));
        }
        self.frames += 1;
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> ReelResult<Vec<u8>> {
        if let Some(mut stdin) = self.stdin.take() {
            stdin.flush().map_err(|e| {
                ReelError::encode_runtime(format!("Failed to flush ffmpeg input: {e}"))
            })?;
        }

        let status = match self.child.take() {
            Some(mut child) => child
                .wait()
                .map_err(|e| ReelError::encode_runtime(format!("Failed to wait on ffmpeg: {e}")))?,
            None => return Err(ReelError::encode_runtime("ffmpeg already exited")),
        };
        let stderr = self.stderr_output();

        if !status.success() {
            return Err(ReelError::encode_runtime(format!(
                "ffmpeg exited with {status}: {}",
                stderr.trim()
            )));
        }

        let data = std::fs::read(&self.output)
            .map_err(|e| ReelError::encode_runtime(format!("Failed to read encoded output: {e}")))?;
        tracing::info!(
            frames = self.frames,
            bytes = data.len(),
            path = %self.output.display(),
            "ffmpeg finished"
        );
        Ok(data)
    }
}

impl Drop for FfmpegWriter {
    fn drop(&mut self) {
        self.stdin = None;
        if let Some(mut child) = self.child.take() {
            child.kill().ok();
            child.wait().ok();
        }
        self.stderr_output();
        if self.output.exists() {
            std::fs::remove_file(&self.output).ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeRuntime;

    fn spec() -> StreamSpec {
        StreamSpec {
            width: 1920,
            height: 1080,
            frame_rate: 30,
            bitrate_kbps: DEFAULT_BITRATE_KBPS,
        }
    }

    fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .map(String::as_str)
    }

    #[test]
    fn test_negotiate_prefers_vp9() {
        let runtime = FakeRuntime::supporting(&["libx264", "libvpx", "libvpx-vp9"]);
        let chosen = negotiate(&runtime, &DEFAULT_CANDIDATES).unwrap();
        assert_eq!(chosen.mime_type, "video/webm;codecs=vp9");
    }

    #[test]
    fn test_negotiate_falls_back_in_order() {
        let runtime = FakeRuntime::supporting(&["libx264", "libvpx"]);
        assert_eq!(
            negotiate(&runtime, &DEFAULT_CANDIDATES).unwrap().encoder,
            "libvpx"
        );

        let runtime = FakeRuntime::supporting(&["libx264"]);
        let chosen = negotiate(&runtime, &DEFAULT_CANDIDATES).unwrap();
        assert_eq!(chosen.container, Container::Mp4);
        assert_eq!(chosen.extension(), "mp4");
    }

    #[test]
    fn test_negotiate_nothing_supported() {
        let runtime = FakeRuntime::supporting(&[]);
        let err = negotiate(&runtime, &DEFAULT_CANDIDATES).unwrap_err();
        assert!(matches!(err, ReelError::EncoderInitFailed { .. }));
    }

    #[test]
    fn test_ffmpeg_args_constant_bitrate() {
        let args = ffmpeg_args(&DEFAULT_CANDIDATES[0], &spec(), Path::new("/tmp/out.webm"));
        assert_eq!(value_after(&args, "-b:v"), Some("8000k"));
        assert_eq!(value_after(&args, "-minrate"), Some("8000k"));
        assert_eq!(value_after(&args, "-maxrate"), Some("8000k"));
        assert_eq!(value_after(&args, "-bufsize"), Some("16000k"));
        assert_eq!(value_after(&args, "-c:v"), Some("libvpx-vp9"));
        assert_eq!(value_after(&args, "-s"), Some("1920x1080"));
        assert_eq!(value_after(&args, "-r"), Some("30"));
        assert_eq!(value_after(&args, "-i"), Some("-"));
        assert_eq!(args.last().map(String::as_str), Some("/tmp/out.webm"));
    }

    #[test]
    fn test_ffmpeg_args_mp4_faststart() {
        let args = ffmpeg_args(&DEFAULT_CANDIDATES[2], &spec(), Path::new("out.mp4"));
        assert_eq!(value_after(&args, "-movflags"), Some("+faststart"));
        assert!(args.windows(2).any(|w| w[0] == "-f" && w[1] == "mp4"));
    }

    #[test]
    fn test_parse_encoder_list() {
        let text = "Encoders:\n V..... = Video\n A..... = Audio\n ------\n \
                    V....D libx264              libx264 H.264 / AVC\n \
                    V....D libvpx-vp9           libvpx VP9 (codec vp9)\n \
                    A....D libopus              libopus Opus\n";
        let encoders = parse_encoder_list(text);
        assert!(encoders.contains("libx264"));
        assert!(encoders.contains("libvpx-vp9"));
        assert!(!encoders.contains("libopus"));
        assert!(!encoders.contains("="));
    }

    #[test]
    fn test_missing_binary_supports_nothing() {
        let runtime = FfmpegRuntime::new("/nonexistent/slidereel-ffmpeg");
        assert!(!runtime.is_available());
        let err = negotiate(&runtime, &DEFAULT_CANDIDATES).unwrap_err();
        assert!(matches!(err, ReelError::EncoderInitFailed { .. }));
    }

    #[test]
    fn test_frame_bytes() {
        assert_eq!(spec().frame_bytes(), 1920 * 1080 * 4);
    }
}
