// 该文件是 Lingyan （灵眼） 项目的一部分。
// src/frame.rs - RGBA 帧定义
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

use thiserror::Error;

pub const RGBA_CHANNELS: usize = 4;

#[derive(Error, Debug)]
pub enum FrameError {
  #[error("数据长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
  SizeMismatch { expected: usize, actual: usize },
}

/// RGBA 帧，按行排列，每像素 4 通道各 8 位。
///
/// 帧数据在其生命周期内由调用方独占所有，流水线只读。
#[derive(Debug, Clone)]
pub struct RgbaFrame {
  width: u32,
  height: u32,
  data: Box<[u8]>,
}

impl RgbaFrame {
  pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self, FrameError> {
    let expected = (width as usize) * (height as usize) * RGBA_CHANNELS;
    if data.len() != expected {
      return Err(FrameError::SizeMismatch {
        expected,
        actual: data.len(),
      });
    }

    Ok(Self {
      width,
      height,
      data: data.into_boxed_slice(),
    })
  }

  /// 以纯色填充构造一帧，用于桩输入与测试。
  pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
    let pixels = (width as usize) * (height as usize);
    let mut data = Vec::with_capacity(pixels * RGBA_CHANNELS);
    for _ in 0..pixels {
      data.extend_from_slice(&rgba);
    }

    Self {
      width,
      height,
      data: data.into_boxed_slice(),
    }
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn as_rgba(&self) -> &[u8] {
    &self.data
  }

  pub fn pixel(&self, x: u32, y: u32) -> [u8; RGBA_CHANNELS] {
    let idx = ((y as usize) * (self.width as usize) + (x as usize)) * RGBA_CHANNELS;
    [
      self.data[idx],
      self.data[idx + 1],
      self.data[idx + 2],
      self.data[idx + 3],
    ]
  }
}

#[cfg(feature = "image")]
impl From<image::RgbaImage> for RgbaFrame {
  fn from(image: image::RgbaImage) -> Self {
    let (width, height) = image.dimensions();
    Self {
      width,
      height,
      data: image.into_raw().into_boxed_slice(),
    }
  }
}

#[cfg(feature = "image")]
impl RgbaFrame {
  /// 丢弃 alpha 通道转为 RGB 图像，供绘制与保存使用。
  pub fn to_rgb_image(&self) -> image::RgbImage {
    image::ImageBuffer::from_fn(self.width, self.height, |x, y| {
      let [r, g, b, _] = self.pixel(x, y);
      image::Rgb([r, g, b])
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn new_checks_buffer_length() {
    let frame = RgbaFrame::new(2, 2, vec![0u8; 16]);
    assert!(frame.is_ok());

    let err = RgbaFrame::new(2, 2, vec![0u8; 15]).unwrap_err();
    match err {
      FrameError::SizeMismatch { expected, actual } => {
        assert_eq!(expected, 16);
        assert_eq!(actual, 15);
      }
    }
  }

  #[test]
  fn pixel_indexes_row_major() {
    let mut data = vec![0u8; 2 * 2 * RGBA_CHANNELS];
    // 第二行第一个像素
    data[2 * RGBA_CHANNELS] = 7;
    let frame = RgbaFrame::new(2, 2, data).unwrap();
    assert_eq!(frame.pixel(0, 1)[0], 7);
    assert_eq!(frame.pixel(1, 0)[0], 0);
  }
}
