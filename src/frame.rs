// 该文件是 DarkPlate 项目的一部分。
// src/frame.rs - 帧缓冲转换
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

use image::{RgbImage, imageops};
use ndarray::Array4;
use thiserror::Error;

use crate::geometry::{Point, Rect, Size};

const RGB_CHANNELS: usize = 3;

#[derive(Error, Debug)]
pub enum FrameError {
  #[error("Buffer size mismatch: expected {expected} bytes, got {actual} bytes")]
  BufferSizeMismatch { expected: usize, actual: usize },
  #[error("Region {rect} is outside of frame {frame}")]
  RegionOutside { rect: Rect, frame: Size },
}

pub fn frame_size(image: &RgbImage) -> Size {
  Size::new(image.width() as i32, image.height() as i32)
}

fn expected_len(width: u32, height: u32) -> usize {
  RGB_CHANNELS * width as usize * height as usize
}

/// 从紧密排列的 RGB24（HWC）缓冲区构造图像，多余的尾部字节被忽略
pub fn from_rgb24(width: u32, height: u32, data: &[u8]) -> Result<RgbImage, FrameError> {
  let expected = expected_len(width, height);
  if data.len() < expected {
    return Err(FrameError::BufferSizeMismatch {
      expected,
      actual: data.len(),
    });
  }

  RgbImage::from_raw(width, height, data[..expected].to_vec()).ok_or(
    FrameError::BufferSizeMismatch {
      expected,
      actual: data.len(),
    },
  )
}

/// BGR24 转 RGB，保持 HWC 布局
pub fn from_bgr24(width: u32, height: u32, data: &[u8]) -> Result<RgbImage, FrameError> {
  let expected = expected_len(width, height);
  if data.len() < expected {
    return Err(FrameError::BufferSizeMismatch {
      expected,
      actual: data.len(),
    });
  }

  let mut swapped = Vec::with_capacity(expected);
  for px in data[..expected].chunks_exact(RGB_CHANNELS) {
    swapped.extend_from_slice(&[px[2], px[1], px[0]]);
  }

  from_rgb24(width, height, &swapped)
}

/// 按每行 `stride` 字节重新排列 RGB24 数据，行尾以 0 填充
pub fn to_strided_rgb24(image: &RgbImage, stride: usize) -> Vec<u8> {
  let row = RGB_CHANNELS * image.width() as usize;
  if row == 0 || stride <= row {
    return image.as_raw().clone();
  }

  let mut data = vec![0u8; stride * image.height() as usize];
  for (line, target) in image.as_raw().chunks(row).zip(data.chunks_mut(stride)) {
    target[..row].copy_from_slice(line);
  }
  data
}

/// 裁剪出 `rect` 区域的副本，`rect` 必须位于图像之内
pub fn crop(image: &RgbImage, rect: Rect) -> Result<RgbImage, FrameError> {
  let frame = frame_size(image);
  if rect.is_empty() || !rect.is_inside(frame) {
    return Err(FrameError::RegionOutside { rect, frame });
  }

  Ok(
    imageops::crop_imm(
      image,
      rect.x as u32,
      rect.y as u32,
      rect.width as u32,
      rect.height as u32,
    )
    .to_image(),
  )
}

/// 把 `region` 拷贝回 `target` 的 `at` 位置
pub fn paste(target: &mut RgbImage, region: &RgbImage, at: Point) {
  imageops::replace(target, region, at.x as i64, at.y as i64);
}

/// 缩放到网络尺寸并转成归一化的 NCHW 张量 `[1, 3, H, W]`
pub fn to_nchw_tensor(image: &RgbImage, network: Size) -> Array4<f32> {
  let (width, height) = (network.width as u32, network.height as u32);

  let resized;
  let source = if image.dimensions() == (width, height) {
    image
  } else {
    resized = imageops::resize(image, width, height, imageops::FilterType::Triangle);
    &resized
  };

  let mut tensor = Array4::<f32>::zeros((1, RGB_CHANNELS, height as usize, width as usize));
  for (x, y, pixel) in source.enumerate_pixels() {
    for c in 0..RGB_CHANNELS {
      tensor[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
    }
  }
  tensor
}
