// 该文件是 DarkPlate 项目的一部分。
// src/input.rs - 视频输入
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

use std::path::{Path, PathBuf};

use image::RgbImage;
use thiserror::Error;

use crate::{frame::FrameError, geometry::Size};

#[cfg(feature = "ffmpeg_video")]
mod ffmpeg_input;
#[cfg(feature = "ffmpeg_video")]
pub use self::ffmpeg_input::FfmpegInput;

#[cfg(feature = "gstreamer_video")]
mod gstreamer_input;
#[cfg(feature = "gstreamer_video")]
pub use self::gstreamer_input::{GStreamerInput, GStreamerInputError};

#[derive(Error, Debug)]
pub enum InputError {
  #[error("无效的视频源 {}: {reason}", .path.display())]
  InvalidSource { path: PathBuf, reason: String },
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("帧错误: {0}")]
  Frame(#[from] FrameError),
  #[error("视频后端 {0} 未启用")]
  BackendUnavailable(VideoBackend),
  #[cfg(feature = "gstreamer_video")]
  #[error("GStreamer 输入错误: {0}")]
  GStreamer(#[from] GStreamerInputError),
}

/// 视频编解码后端
#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VideoBackend {
  /// 调用 ffprobe/ffmpeg 命令行工具
  #[default]
  Ffmpeg,
  /// GStreamer 管道（需要 `gstreamer_video` 特性）
  #[value(name = "gstreamer")]
  GStreamer,
}

impl std::fmt::Display for VideoBackend {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      VideoBackend::Ffmpeg => write!(f, "ffmpeg"),
      VideoBackend::GStreamer => write!(f, "gstreamer"),
    }
  }
}

/// 视频源的基本参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoInfo {
  pub width: u32,
  pub height: u32,
  /// 容器报告的帧数，可能为 0 或不准确
  pub frame_count: u64,
  pub fps: f64,
}

impl VideoInfo {
  pub fn size(&self) -> Size {
    Size::new(self.width as i32, self.height as i32)
  }

  /// 四舍五入后的时长（秒），帧率为 0 时为 0
  pub fn duration_seconds(&self) -> u64 {
    if self.fps > 0.0 {
      (self.frame_count as f64 / self.fps).round() as u64
    } else {
      0
    }
  }
}

/// 有限且只能顺序读取一次的帧序列
pub trait VideoSource {
  fn info(&self) -> VideoInfo;

  /// 读取下一帧，`None` 表示流结束
  fn next_frame(&mut self) -> Result<Option<RgbImage>, InputError>;
}

impl<S: VideoSource + ?Sized> VideoSource for Box<S> {
  fn info(&self) -> VideoInfo {
    (**self).info()
  }

  fn next_frame(&mut self) -> Result<Option<RgbImage>, InputError> {
    (**self).next_frame()
  }
}

pub fn open_video_source(
  backend: VideoBackend,
  path: &Path,
) -> Result<Box<dyn VideoSource>, InputError> {
  if !path.is_file() {
    return Err(InputError::InvalidSource {
      path: path.to_path_buf(),
      reason: "not a file".to_string(),
    });
  }

  match backend {
    #[cfg(feature = "ffmpeg_video")]
    VideoBackend::Ffmpeg => Ok(Box::new(FfmpegInput::open(path)?)),
    #[cfg(feature = "gstreamer_video")]
    VideoBackend::GStreamer => Ok(Box::new(GStreamerInput::open(path)?)),
    #[allow(unreachable_patterns)]
    other => Err(InputError::BackendUnavailable(other)),
  }
}
