// 该文件是 DarkPlate 项目的一部分。
// src/model/onnx.rs - ONNX Runtime 检测器
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

use image::RgbImage;
use ort::{
  session::{Session, builder::GraphOptimizationLevel},
  value::Tensor,
};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
  config::{DetectorSettings, NetworkFiles},
  frame::to_nchw_tensor,
  geometry::{Rect, Size},
  model::{ClassNames, Detection, Detector},
};

#[derive(Error, Debug)]
pub enum OnnxDetectorError {
  #[error("ONNX Runtime 错误: {0}")]
  Ort(#[from] ort::Error),
  #[error("模型没有输出")]
  MissingOutput,
  #[error("模型输出形状 {shape:?} 与 {classes} 个类别不匹配")]
  UnexpectedShape { shape: Vec<i64>, classes: usize },
}

/// 基于 ONNX Runtime 的 YOLO 风格检测器。
///
/// 输出按 `[1, 4 + nc, N]` 或 `[1, N, 4 + nc]` 解码，前四个分量为网络像素坐标下的
/// 中心点与宽高，其余为各类别分数。
pub struct OnnxDetector {
  session: Session,
  names: ClassNames,
  network: Size,
  settings: DetectorSettings,
}

impl OnnxDetector {
  pub fn load(
    files: &NetworkFiles,
    names: ClassNames,
    network: Size,
    settings: DetectorSettings,
  ) -> Result<Self, OnnxDetectorError> {
    info!("加载模型文件: {}", files.weights.display());
    let session = Session::builder()?
      .with_optimization_level(GraphOptimizationLevel::Level3)?
      .commit_from_file(&files.weights)?;
    info!(
      "模型加载完成: 网络尺寸 {}, {} 个类别, 阈值 {}",
      network,
      names.len(),
      settings.threshold
    );

    Ok(Self {
      session,
      names,
      network,
      settings,
    })
  }
}

impl Detector for OnnxDetector {
  type Error = OnnxDetectorError;

  fn network_size(&self) -> Size {
    self.network
  }

  fn class_names(&self) -> &ClassNames {
    &self.names
  }

  fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>, Self::Error> {
    let input = Tensor::from_array(to_nchw_tensor(image, self.network))?;
    let outputs = self.session.run(ort::inputs![input])?;
    if outputs.len() == 0 {
      return Err(OnnxDetectorError::MissingOutput);
    }

    let (shape, data) = outputs[0].try_extract_tensor::<f32>()?;
    let layout = OutputLayout::from_shape(shape, self.names.len())?;
    let candidates = decode(
      data,
      layout,
      self.settings.threshold,
      (
        image.width() as f32 / self.network.width as f32,
        image.height() as f32 / self.network.height as f32,
      ),
    );
    let detections = non_max_suppression(candidates, self.settings.nms_threshold);
    debug!("检测到 {} 个目标", detections.len());

    Ok(detections)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OutputLayout {
  attributes: usize,
  predictions: usize,
  /// `[1, attributes, predictions]`
  channel_first: bool,
}

impl OutputLayout {
  fn from_shape(shape: &[i64], classes: usize) -> Result<Self, OnnxDetectorError> {
    let attributes = 4 + classes;
    let mismatch = || OnnxDetectorError::UnexpectedShape {
      shape: shape.to_vec(),
      classes,
    };

    let [_, a, b] = shape else {
      return Err(mismatch());
    };
    let (a, b) = (*a as usize, *b as usize);

    if a == attributes {
      Ok(Self {
        attributes,
        predictions: b,
        channel_first: true,
      })
    } else if b == attributes {
      Ok(Self {
        attributes,
        predictions: a,
        channel_first: false,
      })
    } else {
      Err(mismatch())
    }
  }

  fn at(&self, data: &[f32], prediction: usize, attribute: usize) -> f32 {
    if self.channel_first {
      data[attribute * self.predictions + prediction]
    } else {
      data[prediction * self.attributes + attribute]
    }
  }
}

fn decode(data: &[f32], layout: OutputLayout, threshold: f32, scale: (f32, f32)) -> Vec<Detection> {
  let (scale_x, scale_y) = scale;
  let mut detections = Vec::new();

  for i in 0..layout.predictions {
    let mut best_class = 0;
    let mut best_score = f32::MIN;
    for class in 0..layout.attributes - 4 {
      let score = layout.at(data, i, 4 + class);
      if score > best_score {
        best_score = score;
        best_class = class;
      }
    }

    if best_score < threshold {
      continue;
    }

    let cx = layout.at(data, i, 0) * scale_x;
    let cy = layout.at(data, i, 1) * scale_y;
    let w = layout.at(data, i, 2) * scale_x;
    let h = layout.at(data, i, 3) * scale_y;

    let rect = Rect::new(
      (cx - w / 2.0).round() as i32,
      (cy - h / 2.0).round() as i32,
      w.round() as i32,
      h.round() as i32,
    );
    let mut detection = Detection::new(rect, best_class, best_score);
    detection.center.x = cx;
    detection.center.y = cy;
    detections.push(detection);
  }

  detections
}

fn iou(a: &Rect, b: &Rect) -> f32 {
  let x1 = a.x.max(b.x);
  let y1 = a.y.max(b.y);
  let x2 = a.right().min(b.right());
  let y2 = a.bottom().min(b.bottom());

  let intersection = if x2 > x1 && y2 > y1 {
    ((x2 - x1) * (y2 - y1)) as f32
  } else {
    0.0
  };
  let union = (a.width * a.height + b.width * b.height) as f32 - intersection;

  if union > 0.0 { intersection / union } else { 0.0 }
}

/// 按类别做非极大值抑制
fn non_max_suppression(mut candidates: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
  candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

  let mut keep: Vec<Detection> = Vec::new();
  for candidate in candidates {
    let suppressed = keep.iter().any(|kept| {
      kept.best_class == candidate.best_class && iou(&kept.rect, &candidate.rect) > iou_threshold
    });
    if !suppressed {
      keep.push(candidate);
    }
  }
  keep
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn layout_accepts_both_orientations() {
    let first = OutputLayout::from_shape(&[1, 6, 100], 2).unwrap();
    assert!(first.channel_first);
    assert_eq!(first.predictions, 100);

    let last = OutputLayout::from_shape(&[1, 100, 6], 2).unwrap();
    assert!(!last.channel_first);
    assert_eq!(last.predictions, 100);

    assert!(OutputLayout::from_shape(&[1, 7, 100], 2).is_err());
    assert!(OutputLayout::from_shape(&[6, 100], 2).is_err());
  }

  #[test]
  fn decode_scales_to_image_pixels_and_filters() {
    // 两个预测，channel-first: cx, cy, w, h, s0, s1
    let data = [
      50.0, 10.0, // cx
      20.0, 10.0, // cy
      10.0, 4.0, // w
      8.0, 4.0, // h
      0.1, 0.05, // class 0
      0.9, 0.1, // class 1
    ];
    let layout = OutputLayout::from_shape(&[1, 6, 2], 2).unwrap();
    let detections = decode(&data, layout, 0.25, (2.0, 2.0));
    assert_eq!(detections.len(), 1);
    assert_eq!(detections[0].best_class, 1);
    assert_eq!(detections[0].rect, Rect::new(90, 32, 20, 16));
    assert_eq!(detections[0].center.x, 100.0);
  }

  #[test]
  fn nms_keeps_best_overlapping_box_per_class() {
    let candidates = vec![
      Detection::new(Rect::new(0, 0, 10, 10), 1, 0.6),
      Detection::new(Rect::new(1, 1, 10, 10), 1, 0.9),
      Detection::new(Rect::new(1, 1, 10, 10), 2, 0.5),
      Detection::new(Rect::new(50, 50, 10, 10), 1, 0.4),
    ];
    let kept = non_max_suppression(candidates, 0.45);
    let summary: Vec<(usize, f32)> = kept.iter().map(|d| (d.best_class, d.confidence)).collect();
    assert_eq!(summary, vec![(1, 0.9), (2, 0.5), (1, 0.4)]);
  }
}
