// 该文件是 DarkPlate 项目的一部分。
// src/pipeline.rs - 单帧两阶段识别流程
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

//! 单帧处理：整帧检测车牌，对每个车牌截取网络尺寸的 ROI 再检测字符，
//! 拼装后把标注画回输出帧。
//!
//! 检测始终读取未修改的原始帧，标注只写入输出帧，避免第二阶段检测读到
//! 之前画上去的内容。

use image::RgbImage;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
  assembly::{PlateAssembly, assemble},
  frame::{self, FrameError, frame_size},
  geometry::{Rect, Size, derive_roi},
  model::Detector,
  output::draw::Annotator,
};

#[derive(Error, Debug)]
pub enum PipelineError {
  #[error("检测器错误: {0}")]
  Detector(#[source] Box<dyn std::error::Error + Send + Sync>),
  #[error("帧错误: {0}")]
  Frame(#[from] FrameError),
}

/// 流程配置，构造时确定，处理过程中不变
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
  pub network_size: Size,
  pub plate_class: usize,
}

/// 一个成功识别的车牌
#[derive(Debug, Clone, PartialEq)]
pub struct PlateReport {
  /// 在整帧坐标系中的 ROI
  pub roi: Rect,
  pub assembly: PlateAssembly,
}

#[derive(Debug, Clone)]
pub struct FrameOutcome {
  pub output: RgbImage,
  pub plates: Vec<PlateReport>,
}

pub struct FramePipeline<D> {
  detector: D,
  config: PipelineConfig,
  annotator: Annotator,
}

impl<D: Detector> FramePipeline<D> {
  /// 网络尺寸从检测器读取一次
  pub fn new(detector: D, plate_class: usize, annotator: Annotator) -> Self {
    let config = PipelineConfig {
      network_size: detector.network_size(),
      plate_class,
    };
    Self::with_config(detector, config, annotator)
  }

  pub fn with_config(detector: D, config: PipelineConfig, annotator: Annotator) -> Self {
    Self {
      detector,
      config,
      annotator,
    }
  }

  pub fn config(&self) -> PipelineConfig {
    self.config
  }

  pub fn annotator(&self) -> &Annotator {
    &self.annotator
  }

  pub fn detector(&self) -> &D {
    &self.detector
  }

  pub fn process_frame(&mut self, frame: &RgbImage) -> Result<FrameOutcome, PipelineError> {
    let mut output = frame.clone();
    let mut plates = Vec::new();

    let plate_class = self.config.plate_class;
    let detections = self.detect(frame)?;
    for detection in detections.iter().filter(|d| d.best_class == plate_class) {
      if let Some(report) = self.process_plate(frame, detection.rect, &mut output)? {
        plates.push(report);
      }
    }

    Ok(FrameOutcome { output, plates })
  }

  /// 处理单个车牌；被拒绝或没有识别结果时返回 `None`
  fn process_plate(
    &mut self,
    frame: &RgbImage,
    plate: Rect,
    output: &mut RgbImage,
  ) -> Result<Option<PlateReport>, PipelineError> {
    let roi = match derive_roi(plate, frame_size(frame), self.config.network_size) {
      Ok(roi) => roi,
      Err(rejection) => {
        info!("-> {}", rejection);
        return Ok(None);
      }
    };
    debug!("plate {} -> roi {}", plate, roi);

    let plate_image = frame::crop(frame, roi)?;
    let results = self.detect(&plate_image)?;
    if results.is_empty() {
      debug!("-> failed to find a plate in this RoI ({})", roi);
      return Ok(None);
    }

    let names = self.detector.class_names();
    let Some(assembly) = assemble(&results, self.config.plate_class, |d| {
      names.get(d.best_class).unwrap_or("?")
    }) else {
      debug!("-> no characters recognized in RoI ({})", roi);
      return Ok(None);
    };

    info!("-> license plate: {}", assembly.describe());

    let mut region = frame::crop(output, roi)?;
    self
      .annotator
      .draw_detections(&mut region, &assembly.sorted, names);
    self
      .annotator
      .draw_label(&assembly.label, &mut region, assembly.top_left, 1.0);
    frame::paste(output, &region, roi.top_left());

    Ok(Some(PlateReport { roi, assembly }))
  }

  fn detect(&mut self, image: &RgbImage) -> Result<Vec<crate::model::Detection>, PipelineError> {
    self
      .detector
      .detect(image)
      .map_err(|e| PipelineError::Detector(Box::new(e)))
  }
}
