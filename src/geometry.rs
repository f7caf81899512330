// 该文件是 DarkPlate 项目的一部分。
// src/geometry.rs - 矩形几何与感兴趣区域计算
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

//! 像素坐标系下的点、尺寸与矩形。
//!
//! 第二阶段检测要求输入图像与网络输入尺寸完全一致，因此车牌框需要先扩展到
//! 网络尺寸，再平移到画面之内。标签背景框的摆放也用同一个平移原语
//! [`Rect::fit_within`]。

use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Point {
  pub x: i32,
  pub y: i32,
}

impl Point {
  pub const fn new(x: i32, y: i32) -> Self {
    Self { x, y }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Size {
  pub width: i32,
  pub height: i32,
}

impl Size {
  pub const fn new(width: i32, height: i32) -> Self {
    Self { width, height }
  }

  /// 在两个方向上都能放下 `other`
  pub fn contains_size(&self, other: Size) -> bool {
    other.width <= self.width && other.height <= self.height
  }
}

impl fmt::Display for Size {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}x{}", self.width, self.height)
  }
}

/// 整数像素矩形，`(x, y)` 为左上角。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Rect {
  pub x: i32,
  pub y: i32,
  pub width: i32,
  pub height: i32,
}

impl Rect {
  pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
    Self {
      x,
      y,
      width,
      height,
    }
  }

  pub fn top_left(&self) -> Point {
    Point::new(self.x, self.y)
  }

  pub fn size(&self) -> Size {
    Size::new(self.width, self.height)
  }

  pub fn right(&self) -> i32 {
    self.x + self.width
  }

  pub fn bottom(&self) -> i32 {
    self.y + self.height
  }

  pub fn is_empty(&self) -> bool {
    self.width <= 0 || self.height <= 0
  }

  /// 矩形完全位于 `[0, bounds)` 之内
  pub fn is_inside(&self, bounds: Size) -> bool {
    self.x >= 0 && self.y >= 0 && self.right() <= bounds.width && self.bottom() <= bounds.height
  }

  /// 平移（从不缩放）矩形使其落在 `[0, bounds)` 之内。
  ///
  /// 先处理右/下边越界（向左/上拉回），再处理左/上边越界（向右/下推回）。
  /// 矩形比边界还大时左/上边优先，此时结果仍会越过右/下边界，
  /// 需要调用方再做 [`Rect::intersect`]。
  pub fn fit_within(self, bounds: Size) -> Rect {
    let mut r = self;
    if r.right() > bounds.width {
      r.x = bounds.width - r.width;
    }
    if r.bottom() > bounds.height {
      r.y = bounds.height - r.height;
    }
    if r.x < 0 {
      r.x = 0;
    }
    if r.y < 0 {
      r.y = 0;
    }
    r
  }

  /// 与 `[0, bounds)` 求交，没有交集时返回空矩形。
  pub fn intersect(self, bounds: Size) -> Rect {
    let x0 = self.x.max(0);
    let y0 = self.y.max(0);
    let x1 = self.right().min(bounds.width);
    let y1 = self.bottom().min(bounds.height);
    if x1 <= x0 || y1 <= y0 {
      return Rect::new(x0, y0, 0, 0);
    }
    Rect::new(x0, y0, x1 - x0, y1 - y0)
  }
}

impl fmt::Display for Rect {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "x={} y={} w={} h={}",
      self.x, self.y, self.width, self.height
    )
  }
}

/// 车牌框无法转换为第二阶段 ROI 的原因
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoiRejection {
  #[error("ignoring impossibly small plate ({0})")]
  Degenerate(Rect),
  #[error("ignoring too-big plate ({rect}), network size is {network}")]
  Oversized { rect: Rect, network: Size },
  #[error("frame {frame} is smaller than network size {network}")]
  FrameTooSmall { frame: Size, network: Size },
}

/// 以检测框为中心扩展到网络输入尺寸，并平移到画面之内。
///
/// 成功时返回的矩形尺寸恰好等于 `network`，且完全位于 `frame` 之内。
pub fn derive_roi(rect: Rect, frame: Size, network: Size) -> Result<Rect, RoiRejection> {
  if rect.width < 1 || rect.height < 1 {
    return Err(RoiRejection::Degenerate(rect));
  }

  if rect.width >= network.width || rect.height >= network.height {
    return Err(RoiRejection::Oversized { rect, network });
  }

  if !frame.contains_size(network) {
    return Err(RoiRejection::FrameTooSmall { frame, network });
  }

  // 奇数差值时低侧取 floor，高侧取 ceil
  let pad_w = network.width - rect.width;
  let pad_h = network.height - rect.height;

  let expanded = Rect::new(
    rect.x - pad_w / 2,
    rect.y - pad_h / 2,
    rect.width + pad_w,
    rect.height + pad_h,
  );

  Ok(expanded.fit_within(frame))
}

#[cfg(test)]
mod tests {
  use super::*;

  const NETWORK: Size = Size::new(160, 60);
  const FRAME: Size = Size::new(1920, 1080);

  #[test]
  fn roi_is_centered_on_plate() {
    let roi = derive_roi(Rect::new(100, 100, 80, 30), FRAME, NETWORK).unwrap();
    assert_eq!(roi, Rect::new(60, 85, 160, 60));
  }

  #[test]
  fn odd_padding_puts_extra_pixel_on_high_edge() {
    let roi = derive_roi(Rect::new(500, 500, 81, 31), FRAME, NETWORK).unwrap();
    // 79 / 2 = 39 向左，40 向右
    assert_eq!(roi.x, 461);
    assert_eq!(roi.right(), 500 + 81 + 40);
    assert_eq!(roi.y, 486);
    assert_eq!(roi.bottom(), 500 + 31 + 15);
    assert_eq!(roi.size(), NETWORK);
  }

  #[test]
  fn roi_near_corners_is_translated_not_shrunk() {
    let top_left = derive_roi(Rect::new(0, 0, 10, 10), FRAME, NETWORK).unwrap();
    assert_eq!(top_left, Rect::new(0, 0, 160, 60));

    let bottom_right = derive_roi(Rect::new(1915, 1075, 5, 5), FRAME, NETWORK).unwrap();
    assert_eq!(bottom_right, Rect::new(1760, 1020, 160, 60));
  }

  #[test]
  fn roi_always_has_network_size_and_stays_inside() {
    let frame = Size::new(200, 90);
    for w in 1..NETWORK.width {
      for h in (1..NETWORK.height).step_by(7) {
        for x in (-w..frame.width).step_by(13) {
          for y in (-h..frame.height).step_by(11) {
            let roi = derive_roi(Rect::new(x, y, w, h), frame, NETWORK).unwrap();
            assert_eq!(roi.size(), NETWORK, "rect {x},{y},{w},{h}");
            assert!(roi.is_inside(frame), "roi {roi} outside {frame}");
          }
        }
      }
    }
  }

  #[test]
  fn degenerate_plates_are_rejected() {
    assert_eq!(
      derive_roi(Rect::new(10, 10, 0, 20), FRAME, NETWORK),
      Err(RoiRejection::Degenerate(Rect::new(10, 10, 0, 20)))
    );
    assert!(matches!(
      derive_roi(Rect::new(10, 10, 20, -3), FRAME, NETWORK),
      Err(RoiRejection::Degenerate(_))
    ));
  }

  #[test]
  fn plates_as_large_as_the_network_are_rejected() {
    assert!(matches!(
      derive_roi(Rect::new(10, 10, 160, 20), FRAME, NETWORK),
      Err(RoiRejection::Oversized { .. })
    ));
    assert!(matches!(
      derive_roi(Rect::new(10, 10, 20, 61), FRAME, NETWORK),
      Err(RoiRejection::Oversized { .. })
    ));
  }

  #[test]
  fn frame_smaller_than_network_is_rejected() {
    assert!(matches!(
      derive_roi(Rect::new(0, 0, 20, 20), Size::new(100, 100), NETWORK),
      Err(RoiRejection::FrameTooSmall { .. })
    ));
  }

  #[test]
  fn fit_within_is_idempotent() {
    let bounds = Size::new(640, 480);
    for rect in [
      Rect::new(-30, -30, 100, 50),
      Rect::new(600, 470, 100, 50),
      Rect::new(20, 20, 100, 50),
      Rect::new(-5, 460, 100, 50),
    ] {
      let once = rect.fit_within(bounds);
      assert!(once.is_inside(bounds));
      assert_eq!(once.fit_within(bounds), once);
      assert_eq!(once.size(), rect.size());
    }
  }

  #[test]
  fn fit_within_prefers_low_edge_when_too_large() {
    let r = Rect::new(50, 50, 800, 20).fit_within(Size::new(640, 480));
    assert_eq!(r.x, 0);
    assert_eq!(r.intersect(Size::new(640, 480)), Rect::new(0, 50, 640, 20));
  }
}
