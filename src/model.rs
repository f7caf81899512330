// 该文件是 DarkPlate 项目的一部分。
// src/model.rs - 检测模型
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

use crate::geometry::{Rect, Size};

/// 目标检测器
///
/// 同一个检测器既用于整帧（找车牌），也用于裁剪后的 ROI（找字符）。
pub trait Detector {
  type Error: std::error::Error + Send + Sync + 'static;

  /// 网络输入尺寸，初始化后不再变化
  fn network_size(&self) -> Size;

  fn class_names(&self) -> &ClassNames;

  /// 返回的矩形位于 `image` 的像素坐标系内，顺序不做保证
  fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>, Self::Error>;
}

/// 检测框中心点，用于从左到右排序
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CenterPoint {
  pub x: f32,
  pub y: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
  pub rect: Rect,
  pub best_class: usize,
  pub confidence: f32,
  pub center: CenterPoint,
}

impl Detection {
  /// 以矩形中心作为排序中心点
  pub fn new(rect: Rect, best_class: usize, confidence: f32) -> Self {
    let center = CenterPoint {
      x: rect.x as f32 + rect.width as f32 / 2.0,
      y: rect.y as f32 + rect.height as f32 / 2.0,
    };
    Self {
      rect,
      best_class,
      confidence,
      center,
    }
  }

  pub fn percentage(&self) -> u32 {
    (100.0 * self.confidence).round() as u32
  }
}

/// 类别名称表，下标即类别编号
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassNames {
  names: Vec<String>,
}

impl ClassNames {
  /// 每行一个名称，忽略空行
  pub fn parse(content: &str) -> Self {
    let names = content
      .lines()
      .map(str::trim)
      .filter(|line| !line.is_empty())
      .map(String::from)
      .collect();
    Self { names }
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  pub fn get(&self, class: usize) -> Option<&str> {
    self.names.get(class).map(String::as_str)
  }

  /// 找不到的类别显示为 `class_<N>`
  pub fn display(&self, class: usize) -> String {
    match self.get(class) {
      Some(name) => name.to_string(),
      None => format!("class_{}", class),
    }
  }
}

impl<S: Into<String>> FromIterator<S> for ClassNames {
  fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
    Self {
      names: iter.into_iter().map(Into::into).collect(),
    }
  }
}

#[cfg(feature = "onnx_detector")]
mod onnx;
#[cfg(feature = "onnx_detector")]
pub use self::onnx::{OnnxDetector, OnnxDetectorError};
