// 该文件是 DarkPlate 项目的一部分。
// src/output/draw.rs - 检测结果与车牌标签绘制
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

use ab_glyph::{Font, FontArc, PxScale, ScaleFont};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use thiserror::Error;

use crate::{
  frame::{self, frame_size},
  geometry::{Point, Rect},
  model::{ClassNames, Detection},
};

// 标签文本渲染常量
const LABEL_FONT_SIZE: f32 = 42.0;
const LABEL_BORDER: f32 = 10.0;
const LABEL_THICKNESS: f32 = 2.0;
const LABEL_LIGHTEN: u8 = 125;
const LABEL_TEXT_COLOR: [u8; 3] = [0, 0, 0];

// 检测框常量
const BOX_THICKNESS: i32 = 2;
const BOX_FONT_SIZE: f32 = 14.0;
const BOX_LABEL_PADDING: i32 = 2;
const BOX_TEXT_COLOR: [u8; 3] = [255, 255, 255];
const PALETTE_SIZE: usize = 36;
// 相邻类别的色相按黄金分割角错开
const GOLDEN_RATIO_CONJUGATE: f32 = 0.618_034;

#[derive(Error, Debug)]
pub enum DrawError {
  #[error("字体加载错误: {0}")]
  FontLoad(#[from] ab_glyph::InvalidFont),
}

/// 标签样式：字号、边距与笔画粗细，按 `factor` 整体缩放
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelStyle {
  pub font_size: f32,
  pub border: f32,
  pub thickness: f32,
}

impl Default for LabelStyle {
  fn default() -> Self {
    Self {
      font_size: LABEL_FONT_SIZE,
      border: LABEL_BORDER,
      thickness: LABEL_THICKNESS,
    }
  }
}

impl LabelStyle {
  pub fn scaled(&self, factor: f32) -> Self {
    Self {
      font_size: self.font_size * factor,
      border: self.border * factor,
      thickness: (self.thickness * factor).max(1.0),
    }
  }
}

pub struct Annotator {
  font: FontArc,
  style: LabelStyle,
  colors: Vec<Rgb<u8>>,
}

impl Annotator {
  /// 使用内置字体
  pub fn new() -> Result<Self, DrawError> {
    let font_data = include_bytes!("../../assets/DejaVuSans.ttf");
    let font = FontArc::try_from_slice(font_data)?;
    Ok(Self::with_font(font))
  }

  pub fn with_font(font: FontArc) -> Self {
    let colors = (0..PALETTE_SIZE)
      .map(|i| {
        let hue = (i as f32 * GOLDEN_RATIO_CONJUGATE).fract() * 360.0;
        hsv_to_rgb(hue, 0.8, 0.9)
      })
      .collect();

    Self {
      font,
      style: LabelStyle::default(),
      colors,
    }
  }

  pub fn class_color(&self, class: usize) -> Rgb<u8> {
    self.colors[class % self.colors.len()]
  }

  /// 标签背景框：锚点左上方，文本尺寸外加四周边距，平移到图像之内
  pub fn backdrop_rect(&self, text: &str, image: &RgbImage, anchor: Point, factor: f32) -> Rect {
    let style = self.style.scaled(factor);
    let (text_w, text_h) = text_size(PxScale::from(style.font_size), &self.font, text);
    let border = style.border.round() as i32;

    let rect = Rect::new(
      anchor.x,
      anchor.y - text_h as i32 - border * 3,
      text_w as i32 + border * 2,
      text_h as i32 + border * 2,
    );

    let bounds = frame_size(image);
    rect.fit_within(bounds).intersect(bounds)
  }

  /// 在图像上绘制一段保证可读的文本。
  ///
  /// 背景框区域被整体提亮，再用深色写入文本；背景框以外的像素保持不变。
  pub fn draw_label(&self, text: &str, image: &mut RgbImage, anchor: Point, factor: f32) {
    let rect = self.backdrop_rect(text, image, anchor, factor);
    if rect.is_empty() {
      return;
    }

    let Ok(mut region) = frame::crop(image, rect) else {
      return;
    };

    for px in region.pixels_mut() {
      for channel in px.0.iter_mut() {
        *channel = channel.saturating_add(LABEL_LIGHTEN);
      }
    }

    let style = self.style.scaled(factor);
    let scale = PxScale::from(style.font_size);
    let border = style.border.round() as i32;
    let ascent = self.font.as_scaled(scale).ascent().round() as i32;

    // 基线位于背景框底边向上 border 处
    let x = border;
    let y = rect.height - border - ascent;
    let strokes = style.thickness.round().max(1.0) as i32;
    for dx in 0..strokes {
      draw_text_mut(
        &mut region,
        Rgb(LABEL_TEXT_COLOR),
        x + dx,
        y,
        scale,
        &self.font,
        text,
      );
    }

    frame::paste(image, &region, rect.top_left());
  }

  /// 按给定顺序绘制检测框，后绘制的覆盖先绘制的
  pub fn draw_detections(&self, image: &mut RgbImage, detections: &[Detection], names: &ClassNames) {
    for detection in detections {
      let label = format!(
        "{} {}%",
        names.display(detection.best_class),
        detection.percentage()
      );
      self.draw_bbox_with_label(
        image,
        detection.rect,
        &label,
        self.class_color(detection.best_class),
      );
    }
  }

  fn draw_bbox_with_label(&self, image: &mut RgbImage, bbox: Rect, label: &str, color: Rgb<u8>) {
    let bounds = frame_size(image);
    let clipped = bbox.intersect(bounds);
    if clipped.width < 2 || clipped.height < 2 {
      return;
    }

    for t in 0..BOX_THICKNESS {
      let inner = Rect::new(
        clipped.x + t,
        clipped.y + t,
        clipped.width - 2 * t,
        clipped.height - 2 * t,
      );
      if inner.is_empty() {
        break;
      }
      draw_hollow_rect_mut(image, to_imageproc(inner), color);
    }

    let scale = PxScale::from(BOX_FONT_SIZE);
    let (text_w, text_h) = text_size(scale, &self.font, label);
    let tab = Rect::new(
      clipped.x,
      clipped.y - text_h as i32 - 2 * BOX_LABEL_PADDING,
      text_w as i32 + 2 * BOX_LABEL_PADDING,
      text_h as i32 + 2 * BOX_LABEL_PADDING,
    )
    .fit_within(bounds)
    .intersect(bounds);

    if tab.is_empty() {
      return;
    }

    draw_filled_rect_mut(image, to_imageproc(tab), color);
    let ascent = self.font.as_scaled(scale).ascent().round() as i32;
    draw_text_mut(
      image,
      Rgb(BOX_TEXT_COLOR),
      tab.x + BOX_LABEL_PADDING,
      tab.bottom() - BOX_LABEL_PADDING - ascent,
      scale,
      &self.font,
      label,
    );
  }
}

fn to_imageproc(rect: Rect) -> imageproc::rect::Rect {
  imageproc::rect::Rect::at(rect.x, rect.y).of_size(rect.width as u32, rect.height as u32)
}

/// HSV 转 RGB
fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb<u8> {
  let c = v * s;
  let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
  let m = v - c;

  let (r, g, b) = match h as u32 {
    0..=59 => (c, x, 0.0),
    60..=119 => (x, c, 0.0),
    120..=179 => (0.0, c, x),
    180..=239 => (0.0, x, c),
    240..=299 => (x, 0.0, c),
    _ => (c, 0.0, x),
  };

  Rgb([
    ((r + m) * 255.0) as u8,
    ((g + m) * 255.0) as u8,
    ((b + m) * 255.0) as u8,
  ])
}

/// 处理耗时的可读字符串
pub fn format_duration(duration: std::time::Duration) -> String {
  let micros = duration.as_micros();
  if micros < 1_000 {
    format!("{} microseconds", micros)
  } else if micros < 1_000_000 {
    format!("{} milliseconds", duration.as_millis())
  } else {
    format!("{:.3} seconds", duration.as_secs_f64())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::Duration;

  fn annotator() -> Annotator {
    Annotator::new().unwrap()
  }

  #[test]
  fn backdrop_stays_inside_for_corner_anchors() {
    let annotator = annotator();
    let image = RgbImage::new(320, 240);
    let bounds = frame_size(&image);
    for anchor in [
      Point::new(0, 0),
      Point::new(319, 239),
      Point::new(319, 0),
      Point::new(0, 239),
      Point::new(-50, -50),
      Point::new(1000, 1000),
    ] {
      for factor in [0.5, 1.0] {
        let rect = annotator.backdrop_rect("ABC123", &image, anchor, factor);
        assert!(!rect.is_empty());
        assert!(rect.is_inside(bounds), "anchor {:?} gave {}", anchor, rect);
      }
    }
  }

  #[test]
  fn backdrop_never_exceeds_a_tiny_image() {
    let annotator = annotator();
    let image = RgbImage::new(20, 10);
    let rect = annotator.backdrop_rect("WAY TOO LONG FOR THIS", &image, Point::new(5, 5), 1.0);
    assert!(rect.is_inside(frame_size(&image)));
  }

  #[test]
  fn label_only_touches_backdrop_pixels() {
    let annotator = annotator();
    let mut image = RgbImage::from_pixel(400, 200, Rgb([30, 30, 30]));
    let anchor = Point::new(100, 150);
    let rect = annotator.backdrop_rect("XYZ", &image, anchor, 1.0);

    annotator.draw_label("XYZ", &mut image, anchor, 1.0);

    let mut lightened = 0;
    for (x, y, px) in image.enumerate_pixels() {
      let inside = (x as i32) >= rect.x
        && (x as i32) < rect.right()
        && (y as i32) >= rect.y
        && (y as i32) < rect.bottom();
      if !inside {
        assert_eq!(px, &Rgb([30, 30, 30]), "pixel {x},{y} outside backdrop changed");
      } else if px == &Rgb([155, 155, 155]) {
        lightened += 1;
      }
    }
    assert!(lightened > 0);
    // 文本像素比背景暗
    let darkest = (rect.x..rect.right())
      .flat_map(|x| (rect.y..rect.bottom()).map(move |y| (x, y)))
      .map(|(x, y)| image.get_pixel(x as u32, y as u32)[0])
      .min()
      .unwrap();
    assert!(darkest < 155);
  }

  #[test]
  fn empty_label_only_lightens_border_box() {
    let annotator = annotator();
    let mut image = RgbImage::from_pixel(200, 200, Rgb([0, 0, 0]));
    annotator.draw_label("", &mut image, Point::new(50, 100), 1.0);
    let rect = annotator.backdrop_rect("", &image, Point::new(50, 100), 1.0);
    assert_eq!(rect.width, 20);
    for (x, y, px) in image.enumerate_pixels() {
      let inside = (x as i32) >= rect.x
        && (x as i32) < rect.right()
        && (y as i32) >= rect.y
        && (y as i32) < rect.bottom();
      let expected = if inside { Rgb([125, 125, 125]) } else { Rgb([0, 0, 0]) };
      assert_eq!(px, &expected);
    }
  }

  #[test]
  fn detection_boxes_are_drawn_in_class_color() {
    let annotator = annotator();
    let mut image = RgbImage::new(200, 100);
    let names: ClassNames = ["plate", "A"].into_iter().collect();
    let detection = Detection::new(Rect::new(20, 40, 50, 30), 1, 0.9);
    annotator.draw_detections(&mut image, &[detection], &names);

    let color = annotator.class_color(1);
    assert_eq!(image.get_pixel(20, 69), &color);
    assert_eq!(image.get_pixel(69, 55), &color);
    assert_eq!(image.get_pixel(45, 55), &Rgb([0, 0, 0]));
  }

  #[test]
  fn later_detections_are_drawn_on_top() {
    let annotator = annotator();
    let mut image = RgbImage::new(200, 100);
    let names: ClassNames = ["plate", "A"].into_iter().collect();
    let plate = Detection::new(Rect::new(20, 40, 50, 30), 0, 0.9);
    let character = Detection::new(Rect::new(20, 40, 20, 30), 1, 0.8);

    annotator.draw_detections(&mut image, &[plate, character], &names);

    // 共用的左边与底边
    assert_eq!(image.get_pixel(20, 55), &annotator.class_color(1));
    assert_eq!(image.get_pixel(30, 69), &annotator.class_color(1));
    assert_eq!(image.get_pixel(69, 55), &annotator.class_color(0));
  }

  #[test]
  fn neighbouring_classes_have_distinct_colors() {
    let annotator = annotator();
    for class in 0..PALETTE_SIZE {
      let a = annotator.class_color(class);
      let b = annotator.class_color(class + 1);
      let distance: u32 = a
        .0
        .iter()
        .zip(b.0.iter())
        .map(|(x, y)| x.abs_diff(*y) as u32)
        .sum();
      assert!(distance > 200, "class {} {:?} vs {:?}", class, a, b);
    }
  }

  #[test]
  fn boxes_outside_the_image_are_ignored() {
    let annotator = annotator();
    let mut image = RgbImage::new(50, 50);
    let names = ClassNames::default();
    annotator.draw_detections(&mut image, &[Detection::new(Rect::new(80, 80, 10, 10), 0, 0.5)], &names);
    assert!(image.pixels().all(|px| px == &Rgb([0, 0, 0])));
  }

  #[test]
  fn durations_are_human_readable() {
    assert_eq!(format_duration(Duration::from_micros(640)), "640 microseconds");
    assert_eq!(format_duration(Duration::from_millis(37)), "37 milliseconds");
    assert_eq!(format_duration(Duration::from_millis(1250)), "1.250 seconds");
  }
}
