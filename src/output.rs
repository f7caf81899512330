// 该文件是 DarkPlate 项目的一部分。
// src/output.rs - 视频输出定义
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::{fmt, path::PathBuf, str::FromStr};

use image::RgbImage;
use thiserror::Error;

use crate::{geometry::Size, input::VideoBackend};

pub mod draw;

#[cfg(feature = "ffmpeg_video")]
mod ffmpeg_video_output;
#[cfg(feature = "ffmpeg_video")]
pub use self::ffmpeg_video_output::FfmpegVideoOutput;

#[cfg(feature = "gstreamer_video")]
mod gstreamer_video_output;
#[cfg(feature = "gstreamer_video")]
pub use self::gstreamer_video_output::{GStreamerVideoOutput, GStreamerVideoOutputError};

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("视频编码错误: {0}")]
  Encoding(String),
  #[error("帧尺寸 {actual} 与输出尺寸 {expected} 不一致")]
  FrameSizeMismatch { expected: Size, actual: Size },
  #[error("视频后端 {0} 未启用")]
  BackendUnavailable(VideoBackend),
  #[cfg(feature = "gstreamer_video")]
  #[error("GStreamer 视频输出错误: {0}")]
  GStreamer(#[from] GStreamerVideoOutputError),
}

/// 按源顺序接收帧的视频输出
pub trait VideoSink {
  fn write_frame(&mut self, frame: &RgbImage) -> Result<(), OutputError>;

  /// 结束编码；从未写入过帧时什么也不做
  fn finish(&mut self) -> Result<(), OutputError>;
}

impl<S: VideoSink + ?Sized> VideoSink for Box<S> {
  fn write_frame(&mut self, frame: &RgbImage) -> Result<(), OutputError> {
    (**self).write_frame(frame)
  }

  fn finish(&mut self) -> Result<(), OutputError> {
    (**self).finish()
  }
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("FourCC 必须是 4 个 ASCII 字符: '{0}'")]
pub struct InvalidFourCc(String);

/// 四字符编码标记，如 `mp4v`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FourCc([u8; 4]);

impl FourCc {
  pub const MP4V: FourCc = FourCc(*b"mp4v");

  pub fn as_str(&self) -> &str {
    std::str::from_utf8(&self.0).unwrap_or("????")
  }

  fn lowercase(&self) -> [u8; 4] {
    self.0.map(|c| c.to_ascii_lowercase())
  }

  /// ffmpeg 编码参数
  pub fn ffmpeg_codec(&self) -> &'static [&'static str] {
    match &self.lowercase() {
      b"mp4v" => &["-c:v", "mpeg4", "-vtag", "mp4v", "-pix_fmt", "yuv420p"],
      b"avc1" | b"h264" | b"x264" => &["-c:v", "libx264", "-pix_fmt", "yuv420p"],
      b"mjpg" => &["-c:v", "mjpeg"],
      _ => &["-c:v", "mpeg4", "-pix_fmt", "yuv420p"],
    }
  }

  /// GStreamer 编码与封装元素
  pub fn gstreamer_encoder(&self) -> &'static str {
    match &self.lowercase() {
      b"avc1" | b"h264" | b"x264" => {
        "video/x-raw,format=I420 ! x264enc speed-preset=fast ! h264parse ! mp4mux"
      }
      b"mjpg" => "jpegenc ! qtmux",
      _ => "video/x-raw,format=I420 ! avenc_mpeg4 ! mpeg4videoparse ! mp4mux",
    }
  }
}

impl Default for FourCc {
  fn default() -> Self {
    Self::MP4V
  }
}

impl FromStr for FourCc {
  type Err = InvalidFourCc;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let bytes: [u8; 4] = s
      .as_bytes()
      .try_into()
      .map_err(|_| InvalidFourCc(s.to_string()))?;
    if !bytes.iter().all(|c| c.is_ascii_graphic()) {
      return Err(InvalidFourCc(s.to_string()));
    }
    Ok(Self(bytes))
  }
}

impl fmt::Display for FourCc {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

/// 输出参数，与输入视频保持一致
#[derive(Debug, Clone, PartialEq)]
pub struct SinkSettings {
  pub path: PathBuf,
  pub fourcc: FourCc,
  pub fps: f64,
  pub size: Size,
}

impl SinkSettings {
  /// 帧率未知时按 25 fps 编码
  pub fn encoding_fps(&self) -> f64 {
    if self.fps > 0.0 { self.fps } else { 25.0 }
  }

  pub(crate) fn check_frame(&self, frame: &RgbImage) -> Result<(), OutputError> {
    let actual = Size::new(frame.width() as i32, frame.height() as i32);
    if actual != self.size {
      return Err(OutputError::FrameSizeMismatch {
        expected: self.size,
        actual,
      });
    }
    Ok(())
  }
}

pub fn open_video_sink(
  backend: VideoBackend,
  settings: SinkSettings,
) -> Result<Box<dyn VideoSink>, OutputError> {
  match backend {
    #[cfg(feature = "ffmpeg_video")]
    VideoBackend::Ffmpeg => Ok(Box::new(FfmpegVideoOutput::new(settings))),
    #[cfg(feature = "gstreamer_video")]
    VideoBackend::GStreamer => Ok(Box::new(GStreamerVideoOutput::new(settings)?)),
    #[allow(unreachable_patterns)]
    other => {
      let _ = settings;
      Err(OutputError::BackendUnavailable(other))
    }
  }
}
