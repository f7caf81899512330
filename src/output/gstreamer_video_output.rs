// 该文件是 DarkPlate 项目的一部分。
// src/output/gstreamer_video_output.rs - GStreamer 视频文件输出
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

//! # GStreamer 视频文件输出
//!
//! 管道为 `appsrc ! videoconvert ! <编码器> ! <封装> ! filesink`，编码器由 FourCC 决定。
//! 管道在第一帧到来时才创建；结束时发送 EOS 并等待它流到 filesink，
//! 保证封装格式的尾部被写入。RGB 帧的每行按 GStreamer 的默认步长（4 字节对齐）填充。

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use image::RgbImage;
use thiserror::Error;
use tracing::{info, warn};

use crate::{
  frame,
  output::{OutputError, SinkSettings, VideoSink},
};

const EOS_TIMEOUT_SECONDS: u64 = 30;

/// GStreamer 视频输出错误类型
#[derive(Error, Debug)]
pub enum GStreamerVideoOutputError {
  /// GStreamer 库错误
  #[error("GStreamer error: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  /// GStreamer 布尔操作错误
  #[error("GStreamer boolean error: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  /// 无法获取 appsrc 元素
  #[error("Failed to get appsrc element")]
  AppSrcNotFound,
  /// 管道错误
  #[error("Pipeline error: {0}")]
  PipelineError(String),
  /// 状态改变错误
  #[error("State change error: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
  /// 缓冲区创建错误
  #[error("Buffer creation error")]
  BufferCreationError,
  /// 视频信息错误
  #[error("Video info error")]
  VideoInfoError,
}

struct Running {
  pipeline: gst::Pipeline,
  appsrc: gst_app::AppSrc,
  stride: usize,
}

pub struct GStreamerVideoOutput {
  settings: SinkSettings,
  running: Option<Running>,
  frame_count: u64,
}

impl GStreamerVideoOutput {
  pub fn new(settings: SinkSettings) -> Result<Self, GStreamerVideoOutputError> {
    // 重复初始化是安全的
    gst::init()?;
    Ok(Self {
      settings,
      running: None,
      frame_count: 0,
    })
  }

  fn start(&self) -> Result<Running, GStreamerVideoOutputError> {
    let settings = &self.settings;
    let location = settings.path.display().to_string().replace('"', "\\\"");
    let pipeline_desc = format!(
      "appsrc name=src ! videoconvert ! {} ! filesink location=\"{}\"",
      settings.fourcc.gstreamer_encoder(),
      location
    );
    info!("Creating video output pipeline: {}", pipeline_desc);

    let pipeline = gst::parse::launch(&pipeline_desc)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| {
        GStreamerVideoOutputError::PipelineError("Failed to create pipeline".to_string())
      })?;
    let appsrc = pipeline
      .by_name("src")
      .and_then(|e| e.downcast::<gst_app::AppSrc>().ok())
      .ok_or(GStreamerVideoOutputError::AppSrcNotFound)?;

    let framerate =
      gst::Fraction::approximate_f64(settings.encoding_fps()).unwrap_or(gst::Fraction::new(25, 1));
    let video_info = gst_video::VideoInfo::builder(
      gst_video::VideoFormat::Rgb,
      settings.size.width as u32,
      settings.size.height as u32,
    )
    .fps(framerate)
    .build()
    .map_err(|_| GStreamerVideoOutputError::VideoInfoError)?;
    let caps = video_info
      .to_caps()
      .map_err(|_| GStreamerVideoOutputError::VideoInfoError)?;
    let stride = video_info.stride()[0] as usize;
    appsrc.set_caps(Some(&caps));
    appsrc.set_format(gst::Format::Time);

    pipeline.set_state(gst::State::Playing)?;
    info!(
      "Video output initialized: {} @ {} fps -> {}",
      settings.size,
      settings.encoding_fps(),
      settings.path.display()
    );

    Ok(Running {
      pipeline,
      appsrc,
      stride,
    })
  }

  fn push_frame(&mut self, image: &RgbImage) -> Result<(), GStreamerVideoOutputError> {
    let frame_duration = (1e9 / self.settings.encoding_fps()) as u64;
    let timestamp = self.frame_count * frame_duration;

    let running = self
      .running
      .as_ref()
      .ok_or_else(|| GStreamerVideoOutputError::PipelineError("Pipeline not running".to_string()))?;

    let mut buffer = gst::Buffer::from_slice(frame::to_strided_rgb24(image, running.stride));
    {
      let buffer_ref = buffer
        .get_mut()
        .ok_or(GStreamerVideoOutputError::BufferCreationError)?;
      buffer_ref.set_pts(gst::ClockTime::from_nseconds(timestamp));
      buffer_ref.set_duration(gst::ClockTime::from_nseconds(frame_duration));
    }

    running.appsrc.push_buffer(buffer).map_err(|e| {
      GStreamerVideoOutputError::PipelineError(format!("Failed to push buffer: {:?}", e))
    })?;
    self.frame_count += 1;

    Ok(())
  }

  fn drain(running: Running) -> Result<(), GStreamerVideoOutputError> {
    running.appsrc.end_of_stream().map_err(|e| {
      GStreamerVideoOutputError::PipelineError(format!("Failed to send EOS: {:?}", e))
    })?;

    let mut result = Ok(());
    if let Some(bus) = running.pipeline.bus() {
      let message = bus.timed_pop_filtered(
        gst::ClockTime::from_seconds(EOS_TIMEOUT_SECONDS),
        &[gst::MessageType::Eos, gst::MessageType::Error],
      );
      match message.as_ref().map(|m| m.view()) {
        Some(gst::MessageView::Eos(..)) => {}
        Some(gst::MessageView::Error(err)) => {
          result = Err(GStreamerVideoOutputError::PipelineError(err.error().to_string()));
        }
        _ => warn!("Timed out waiting for EOS on video output pipeline"),
      }
    }

    running.pipeline.set_state(gst::State::Null)?;
    result
  }
}

impl VideoSink for GStreamerVideoOutput {
  fn write_frame(&mut self, frame: &RgbImage) -> Result<(), OutputError> {
    self.settings.check_frame(frame)?;
    if self.running.is_none() {
      self.running = Some(self.start()?);
    }
    self.push_frame(frame)?;
    Ok(())
  }

  fn finish(&mut self) -> Result<(), OutputError> {
    let Some(running) = self.running.take() else {
      info!("没有帧可以编码为视频，跳过编码过程");
      return Ok(());
    };
    Self::drain(running)?;
    info!(
      "Video output closed. Total frames written: {}",
      self.frame_count
    );
    Ok(())
  }
}

impl Drop for GStreamerVideoOutput {
  fn drop(&mut self) {
    if let Some(running) = self.running.take()
      && let Err(e) = Self::drain(running)
    {
      warn!("Failed to stop GStreamer video output pipeline: {}", e);
    }
  }
}
