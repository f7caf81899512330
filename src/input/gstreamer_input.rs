// 该文件是 DarkPlate 项目的一部分。
// src/input/gstreamer_input.rs - GStreamer 视频文件输入
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

//! # GStreamer 视频输入
//!
//! 管道为 `filesrc ! decodebin ! videoconvert ! video/x-raw,format=RGB ! appsink`。
//! 打开时先进入 PAUSED 状态完成预滚，从预滚样本的 caps 读取宽高与帧率，
//! 再通过时长查询估算帧数。
//!
//! ## 系统依赖
//!
//! **Ubuntu/Debian:**
//! ```bash
//! sudo apt-get install libgstreamer1.0-dev libgstreamer-plugins-base1.0-dev
//! ```

use std::path::Path;

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use image::RgbImage;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::{
  frame,
  input::{InputError, VideoInfo, VideoSource},
};

const PREROLL_TIMEOUT_SECONDS: u64 = 10;

/// GStreamer 输入错误类型
#[derive(Error, Debug)]
pub enum GStreamerInputError {
  /// GStreamer 库错误
  #[error("GStreamer error: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  /// GStreamer 布尔操作错误
  #[error("GStreamer boolean error: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  /// 无法获取 appsink 元素
  #[error("Failed to get appsink element")]
  AppSinkNotFound,
  /// 无法从 caps 获取视频信息
  #[error("Failed to get video info from caps")]
  VideoInfoError,
  /// 不支持的视频格式
  #[error("Unsupported video format")]
  UnsupportedFormat,
  /// 管道错误
  #[error("Pipeline error: {0}")]
  PipelineError(String),
  /// 状态改变错误
  #[error("State change error: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
}

pub struct GStreamerInput {
  pipeline: gst::Pipeline,
  appsink: gst_app::AppSink,
  info: VideoInfo,
}

impl GStreamerInput {
  pub fn open(path: &Path) -> Result<Self, InputError> {
    gst::init().map_err(GStreamerInputError::from)?;

    let location = path.display().to_string().replace('"', "\\\"");
    let pipeline_desc = format!(
      "filesrc location=\"{}\" ! decodebin ! videoconvert ! video/x-raw,format=RGB ! appsink name=sink sync=false",
      location
    );
    info!("Creating video input pipeline: {}", pipeline_desc);

    let pipeline = gst::parse::launch(&pipeline_desc)
      .map_err(GStreamerInputError::from)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| GStreamerInputError::PipelineError("Failed to create pipeline".to_string()))?;
    let appsink = pipeline
      .by_name("sink")
      .and_then(|e| e.downcast::<gst_app::AppSink>().ok())
      .ok_or(GStreamerInputError::AppSinkNotFound)?;

    // 预滚失败说明文件无法解码
    pipeline
      .set_state(gst::State::Paused)
      .map_err(GStreamerInputError::from)?;
    let (result, _, _) = pipeline.state(gst::ClockTime::from_seconds(PREROLL_TIMEOUT_SECONDS));
    if let Err(e) = result {
      let _ = pipeline.set_state(gst::State::Null);
      return Err(InputError::InvalidSource {
        path: path.to_path_buf(),
        reason: e.to_string(),
      });
    }

    let preroll = appsink
      .pull_preroll()
      .map_err(GStreamerInputError::from)?;
    let caps = preroll
      .caps()
      .ok_or_else(|| GStreamerInputError::PipelineError("No caps in sample".to_string()))?;
    let video_info =
      gst_video::VideoInfo::from_caps(caps).map_err(|_| GStreamerInputError::VideoInfoError)?;

    let rate = video_info.fps();
    let fps = if rate.denom() != 0 {
      rate.numer() as f64 / rate.denom() as f64
    } else {
      0.0
    };
    let frame_count = pipeline
      .query_duration::<gst::ClockTime>()
      .map(|d| (d.nseconds() as f64 / 1e9 * fps).round() as u64)
      .unwrap_or(0);

    pipeline
      .set_state(gst::State::Playing)
      .map_err(GStreamerInputError::from)?;

    Ok(Self {
      info: VideoInfo {
        width: video_info.width(),
        height: video_info.height(),
        frame_count,
        fps,
      },
      pipeline,
      appsink,
    })
  }
}

impl Drop for GStreamerInput {
  fn drop(&mut self) {
    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("Failed to stop GStreamer pipeline: {}", e);
    }
  }
}

impl VideoSource for GStreamerInput {
  fn info(&self) -> VideoInfo {
    self.info
  }

  fn next_frame(&mut self) -> Result<Option<RgbImage>, InputError> {
    match self.appsink.pull_sample() {
      Ok(sample) => Ok(Some(convert_sample(&sample)?)),
      Err(_) if self.appsink.is_eos() => Ok(None),
      Err(e) => {
        error!("Failed to pull sample: {}", e);
        Err(GStreamerInputError::from(e).into())
      }
    }
  }
}

fn convert_sample(sample: &gst::Sample) -> Result<RgbImage, InputError> {
  let buffer = sample
    .buffer()
    .ok_or_else(|| GStreamerInputError::PipelineError("No buffer in sample".to_string()))?;
  let caps = sample
    .caps()
    .ok_or_else(|| GStreamerInputError::PipelineError("No caps in sample".to_string()))?;
  let video_info =
    gst_video::VideoInfo::from_caps(caps).map_err(|_| GStreamerInputError::VideoInfoError)?;

  let width = video_info.width();
  let height = video_info.height();
  let stride = video_info.stride()[0] as usize;
  let row = width as usize * 3;

  let map = buffer.map_readable().map_err(|e| {
    GStreamerInputError::PipelineError(format!("Failed to map buffer for reading: {}", e))
  })?;
  let data = map.as_slice();

  // 去掉行尾对齐填充
  let packed: Vec<u8>;
  let data = if stride == row {
    data
  } else {
    packed = data
      .chunks(stride)
      .take(height as usize)
      .flat_map(|line| &line[..row.min(line.len())])
      .copied()
      .collect();
    &packed
  };

  let image = match video_info.format() {
    gst_video::VideoFormat::Rgb => frame::from_rgb24(width, height, data)?,
    gst_video::VideoFormat::Bgr => frame::from_bgr24(width, height, data)?,
    _ => return Err(GStreamerInputError::UnsupportedFormat.into()),
  };
  Ok(image)
}
