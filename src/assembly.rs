// 该文件是 DarkPlate 项目的一部分。
// src/assembly.rs - 车牌字符拼装
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

//! 把第二阶段的检测结果按从左到右的顺序拼成车牌字符串。
//!
//! 只支持单行车牌：字符按中心点横坐标排序。

use std::cmp::Ordering;

use crate::{geometry::Point, model::Detection};

/// 一个识别出的字符，`detection` 是它在 [`PlateAssembly::sorted`] 中的下标
#[derive(Debug, Clone, PartialEq)]
pub struct RecognizedChar {
  pub text: String,
  pub detection: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlateAssembly {
  /// 排序后的全部检测，车牌类在前
  pub sorted: Vec<Detection>,
  pub characters: Vec<RecognizedChar>,
  pub label: String,
  /// 所有检测（包括车牌类本身）置信度的算术平均
  pub confidence: f32,
  /// 覆盖全部检测框的最小左上角
  pub top_left: Point,
}

impl PlateAssembly {
  pub fn percentage(&self) -> u32 {
    (100.0 * self.confidence).round() as u32
  }

  /// `ABC123 [87%]`
  pub fn describe(&self) -> String {
    format!("{} [{}%]", self.label, self.percentage())
  }
}

/// 排序键：车牌类排在最前，其余按中心点横坐标升序
pub fn sort_key(detection: &Detection, plate_class: usize) -> (u8, f32) {
  let rank = if detection.best_class == plate_class { 0 } else { 1 };
  (rank, detection.center.x)
}

pub fn compare(lhs: &Detection, rhs: &Detection, plate_class: usize) -> Ordering {
  let (lhs_rank, lhs_x) = sort_key(lhs, plate_class);
  let (rhs_rank, rhs_x) = sort_key(rhs, plate_class);
  lhs_rank.cmp(&rhs_rank).then(lhs_x.total_cmp(&rhs_x))
}

/// 拼装一个 ROI 内的检测结果。
///
/// `label_of` 给出每个检测的显示名称。检测集为空，或者只有车牌类检测
/// （拼出的字符串为空）时返回 `None`。
pub fn assemble<'n, F>(
  detections: &[Detection],
  plate_class: usize,
  label_of: F,
) -> Option<PlateAssembly>
where
  F: Fn(&Detection) -> &'n str,
{
  if detections.is_empty() {
    return None;
  }

  let mut sorted = detections.to_vec();
  sorted.sort_by(|lhs, rhs| compare(lhs, rhs, plate_class));

  let mut label = String::new();
  let mut characters = Vec::new();
  let mut top_left = sorted[0].rect.top_left();
  let mut total = 0.0f32;

  for (index, detection) in sorted.iter().enumerate() {
    top_left.x = top_left.x.min(detection.rect.x);
    top_left.y = top_left.y.min(detection.rect.y);
    total += detection.confidence;

    if detection.best_class == plate_class {
      continue;
    }

    let text = label_of(detection);
    label.push_str(text);
    characters.push(RecognizedChar {
      text: text.to_string(),
      detection: index,
    });
  }

  if label.is_empty() {
    return None;
  }

  let confidence = total / sorted.len() as f32;

  Some(PlateAssembly {
    sorted,
    characters,
    label,
    confidence,
    top_left,
  })
}
