// 该文件是 DarkPlate 项目的一部分。
// src/input/ffmpeg_input.rs - 基于 ffmpeg 命令行的视频输入
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

//! 视频文件输入
//!
//! 先用 `ffprobe` 读取宽高、帧率与帧数，再由 `ffmpeg` 把视频解码为 `rgb24`
//! 原始数据写到管道上，每次读取一帧。
//!
//! # 依赖
//!
//! 此模块需要系统安装 ffmpeg 与 ffprobe 命令行工具。

use std::{
  io::Read,
  path::{Path, PathBuf},
  process::{Child, ChildStdout, Command, Stdio},
};

use image::RgbImage;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
  frame,
  input::{InputError, VideoInfo, VideoSource},
};

pub struct FfmpegInput {
  path: PathBuf,
  info: VideoInfo,
  child: Child,
  stdout: Option<ChildStdout>,
  frame_bytes: usize,
}

impl FfmpegInput {
  pub fn open(path: &Path) -> Result<Self, InputError> {
    let info = probe(path)?;
    if info.width == 0 || info.height == 0 {
      return Err(invalid(path, "no video stream"));
    }
    info!(
      "打开视频 {}: {}x{} @ {:.3} fps, {} 帧",
      path.display(),
      info.width,
      info.height,
      info.fps,
      info.frame_count
    );

    let mut child = Command::new("ffmpeg")
      .arg("-nostdin")
      .arg("-loglevel")
      .arg("error")
      .arg("-i")
      .arg(path)
      .arg("-f")
      .arg("rawvideo")
      .arg("-pix_fmt")
      .arg("rgb24")
      .arg("-")
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::inherit())
      .spawn()?;
    let stdout = child.stdout.take();

    Ok(Self {
      path: path.to_path_buf(),
      frame_bytes: info.width as usize * info.height as usize * 3,
      info,
      child,
      stdout,
    })
  }

  /// 读满一帧；返回实际读到的字节数
  fn fill(stdout: &mut ChildStdout, buffer: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
      match stdout.read(&mut buffer[filled..]) {
        Ok(0) => break,
        Ok(n) => filled += n,
        Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
        Err(e) => return Err(e),
      }
    }
    Ok(filled)
  }

  fn close(&mut self) {
    self.stdout = None;
    match self.child.wait() {
      Ok(status) if !status.success() => warn!("ffmpeg 解码 {} 退出: {}", self.path.display(), status),
      Ok(_) => debug!("ffmpeg 解码完成: {}", self.path.display()),
      Err(e) => warn!("等待 ffmpeg 退出失败: {}", e),
    }
  }
}

impl VideoSource for FfmpegInput {
  fn info(&self) -> VideoInfo {
    self.info
  }

  fn next_frame(&mut self) -> Result<Option<RgbImage>, InputError> {
    let Some(stdout) = self.stdout.as_mut() else {
      return Ok(None);
    };

    let mut buffer = vec![0u8; self.frame_bytes];
    let filled = Self::fill(stdout, &mut buffer)?;
    if filled < self.frame_bytes {
      if filled > 0 {
        warn!("丢弃不完整的末帧: {} / {} 字节", filled, self.frame_bytes);
      }
      self.close();
      return Ok(None);
    }

    Ok(Some(frame::from_rgb24(
      self.info.width,
      self.info.height,
      &buffer,
    )?))
  }
}

impl Drop for FfmpegInput {
  fn drop(&mut self) {
    if self.stdout.take().is_some() {
      // 提前结束时不必等 ffmpeg 解码完剩余部分
      let _ = self.child.kill();
      let _ = self.child.wait();
    }
  }
}

fn invalid(path: &Path, reason: impl Into<String>) -> InputError {
  InputError::InvalidSource {
    path: path.to_path_buf(),
    reason: reason.into(),
  }
}

fn probe(path: &Path) -> Result<VideoInfo, InputError> {
  let output = Command::new("ffprobe")
    .arg("-v")
    .arg("error")
    .arg("-select_streams")
    .arg("v:0")
    .arg("-show_streams")
    .arg("-show_format")
    .arg("-of")
    .arg("json")
    .arg(path)
    .stdin(Stdio::null())
    .output()?;

  if !output.status.success() {
    let stderr = String::from_utf8_lossy(&output.stderr);
    return Err(invalid(path, stderr.trim().to_string()));
  }

  let text = String::from_utf8_lossy(&output.stdout);
  parse_probe(&text).map_err(|reason| invalid(path, reason))
}

/// 解析 `ffprobe -of json` 的输出
fn parse_probe(json: &str) -> Result<VideoInfo, String> {
  let root: Value = serde_json::from_str(json).map_err(|e| e.to_string())?;
  let stream = root
    .get("streams")
    .and_then(|s| s.get(0))
    .ok_or_else(|| "no video stream".to_string())?;

  let width = stream.get("width").and_then(Value::as_u64).unwrap_or(0) as u32;
  let height = stream.get("height").and_then(Value::as_u64).unwrap_or(0) as u32;
  // ffmpeg 解码时会按旋转信息自动转正，竖拍视频的输出帧宽高互换
  let (width, height) = if rotation(stream).rem_euclid(180) == 90 {
    (height, width)
  } else {
    (width, height)
  };

  let fps = ["avg_frame_rate", "r_frame_rate"]
    .iter()
    .filter_map(|key| stream.get(*key).and_then(Value::as_str))
    .filter_map(parse_rate)
    .find(|fps| *fps > 0.0)
    .unwrap_or(0.0);

  let duration = stream
    .get("duration")
    .or_else(|| root.get("format").and_then(|f| f.get("duration")))
    .and_then(as_f64);

  let frame_count = match stream.get("nb_frames").and_then(as_f64) {
    Some(n) => n as u64,
    None => duration.map(|d| (d * fps).round() as u64).unwrap_or(0),
  };

  Ok(VideoInfo {
    width,
    height,
    frame_count,
    fps,
  })
}

/// 视频流的旋转角度：新版 ffprobe 放在显示矩阵的 side data 中，旧版放在 `rotate` 标签里
fn rotation(stream: &Value) -> i64 {
  let from_side_data = stream
    .get("side_data_list")
    .and_then(Value::as_array)
    .and_then(|list| list.iter().find_map(|data| data.get("rotation").and_then(as_f64)));
  let from_tags = || {
    stream
      .get("tags")
      .and_then(|tags| tags.get("rotate"))
      .and_then(as_f64)
  };

  from_side_data
    .or_else(from_tags)
    .map(|degrees| degrees.round() as i64)
    .unwrap_or(0)
}

/// ffprobe 的数值字段通常是字符串
fn as_f64(value: &Value) -> Option<f64> {
  match value {
    Value::String(s) => s.parse().ok(),
    other => other.as_f64(),
  }
}

/// `30000/1001` 形式的帧率
fn parse_rate(rate: &str) -> Option<f64> {
  match rate.split_once('/') {
    Some((num, den)) => {
      let num: f64 = num.trim().parse().ok()?;
      let den: f64 = den.trim().parse().ok()?;
      if den == 0.0 { None } else { Some(num / den) }
    }
    None => rate.trim().parse().ok(),
  }
}
