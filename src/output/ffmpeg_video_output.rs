// 该文件是 DarkPlate 项目的一部分。
// src/output/ffmpeg_video_output.rs - 基于 ffmpeg 命令行的视频输出
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

//! 视频文件输出
//!
//! 帧以 `rgb24` 原始数据写入 `ffmpeg` 的标准输入，编码器在收到第一帧时才启动，
//! 所以没有帧的视频不会产生输出文件，也不会报错。
//!
//! # 依赖
//!
//! 此模块需要系统安装 ffmpeg 命令行工具来编码视频。

use std::{
  io::{Read, Write},
  path::Path,
  process::{Child, ChildStdin, Command, Stdio},
  thread::{self, JoinHandle},
};

use image::RgbImage;
use tracing::{error, info};

use crate::output::{OutputError, SinkSettings, VideoSink};

struct Encoder {
  child: Child,
  stdin: Option<ChildStdin>,
  /// 持续读取 ffmpeg 的标准错误，避免管道写满后阻塞编码
  stderr: Option<JoinHandle<String>>,
}

pub struct FfmpegVideoOutput {
  settings: SinkSettings,
  encoder: Option<Encoder>,
  frames: u64,
}

impl FfmpegVideoOutput {
  pub fn new(settings: SinkSettings) -> Self {
    Self {
      settings,
      encoder: None,
      frames: 0,
    }
  }

  pub fn frames(&self) -> u64 {
    self.frames
  }

  fn spawn(&self) -> Result<Encoder, OutputError> {
    let settings = &self.settings;
    if let Some(parent) = Path::new(&settings.path).parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    info!(
      "开始编码视频: {} @ {:.3} fps ({}) -> {}",
      settings.size,
      settings.encoding_fps(),
      settings.fourcc,
      settings.path.display()
    );

    let mut child = Command::new("ffmpeg")
      .arg("-y") // 覆盖已存在的文件
      .arg("-loglevel")
      .arg("error")
      .arg("-f")
      .arg("rawvideo")
      .arg("-pix_fmt")
      .arg("rgb24")
      .arg("-s")
      .arg(format!("{}x{}", settings.size.width, settings.size.height))
      .arg("-r")
      .arg(format!("{}", settings.encoding_fps()))
      .arg("-i")
      .arg("-")
      .args(settings.fourcc.ffmpeg_codec())
      .arg(&settings.path)
      .stdin(Stdio::piped())
      .stdout(Stdio::null())
      .stderr(Stdio::piped())
      .spawn()
      .map_err(|e| OutputError::Encoding(format!("无法执行 ffmpeg (请确保已安装): {}", e)))?;
    let stdin = child.stdin.take();
    let stderr = child.stderr.take().map(collect_diagnostics);

    Ok(Encoder {
      child,
      stdin,
      stderr,
    })
  }
}

/// 在后台线程里把 `pipe` 读到结束
fn collect_diagnostics<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<String> {
  thread::spawn(move || {
    let mut bytes = Vec::new();
    let _ = pipe.read_to_end(&mut bytes);
    String::from_utf8_lossy(&bytes).into_owned()
  })
}

impl VideoSink for FfmpegVideoOutput {
  fn write_frame(&mut self, frame: &RgbImage) -> Result<(), OutputError> {
    self.settings.check_frame(frame)?;

    if self.encoder.is_none() {
      self.encoder = Some(self.spawn()?);
    }
    let stdin = self
      .encoder
      .as_mut()
      .and_then(|encoder| encoder.stdin.as_mut())
      .ok_or_else(|| OutputError::Encoding("编码器已关闭".to_string()))?;

    stdin.write_all(frame.as_raw())?;
    self.frames += 1;
    Ok(())
  }

  fn finish(&mut self) -> Result<(), OutputError> {
    let Some(mut encoder) = self.encoder.take() else {
      info!("没有帧可以编码为视频，跳过编码过程");
      return Ok(());
    };

    // 关闭标准输入让 ffmpeg 结束编码
    drop(encoder.stdin.take());
    let status = encoder.child.wait()?;
    let stderr = encoder
      .stderr
      .take()
      .and_then(|reader| reader.join().ok())
      .unwrap_or_default();
    if status.success() {
      info!(
        "视频编码成功: {} 帧 -> {}",
        self.frames,
        self.settings.path.display()
      );
      Ok(())
    } else {
      error!("ffmpeg 错误: {}", stderr.trim());
      Err(OutputError::Encoding(format!(
        "ffmpeg 失败 ({}): {}",
        status,
        stderr.trim()
      )))
    }
  }
}

impl Drop for FfmpegVideoOutput {
  fn drop(&mut self) {
    if self.encoder.is_some()
      && let Err(e) = self.finish()
    {
      error!("编码视频时出错: {}", e);
    }
  }
}
