// 该文件是 Lingyan （灵眼） 项目的一部分。
// src/letterbox.rs - 帧预处理（信箱式缩放）
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

use crate::frame::{RGBA_CHANNELS, RgbaFrame};

#[derive(Error, Debug)]
pub enum LetterboxError {
  #[error("无效帧: 尺寸 {width}x{height}")]
  InvalidFrame { width: u32, height: u32 },
}

/// 信箱式缩放的仿射映射参数。
///
/// 不变量: `scale = min(S / w, S / h)`；缩放后的尺寸加上两侧偏移
/// 在补边轴上恰好等于 S。该映射逐帧确定且可逆。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxMapping {
  /// 统一缩放系数
  pub scale: f32,
  /// 水平补边偏移
  pub offset_x: f32,
  /// 垂直补边偏移
  pub offset_y: f32,
  /// 目标方形边长
  pub target_size: u32,
}

impl LetterboxMapping {
  pub fn compute(width: u32, height: u32, target_size: u32) -> Result<Self, LetterboxError> {
    if width == 0 || height == 0 {
      return Err(LetterboxError::InvalidFrame { width, height });
    }

    let target = target_size as f32;
    let scale = (target / width as f32).min(target / height as f32);
    let new_w = width as f32 * scale;
    let new_h = height as f32 * scale;

    Ok(Self {
      scale,
      offset_x: (target - new_w) / 2.0,
      offset_y: (target - new_h) / 2.0,
      target_size,
    })
  }

  /// 模型空间坐标映射回源帧空间。
  pub fn model_to_source(&self, x: f32, y: f32) -> (f32, f32) {
    (
      (x - self.offset_x) / self.scale,
      (y - self.offset_y) / self.scale,
    )
  }

  /// 源帧空间坐标映射到模型空间。
  pub fn source_to_model(&self, x: f32, y: f32) -> (f32, f32) {
    (
      x * self.scale + self.offset_x,
      y * self.scale + self.offset_y,
    )
  }
}

/// 把任意宽高比的帧信箱式缩放进 `target_size` 方形缓冲。
///
/// 重采样为双线性（与解码后的框边缘行为相关，保持一致），
/// 背景填充不透明黑色，缩放后的内容居中。输出写入 `out` 以便跨帧复用。
///
/// 重采样是手写的而不是走 `image::imageops::resize`：信箱化在核心
/// 路径上，必须在 `image` 特性关闭时可用，且要直接写进复用缓冲。
pub fn letterbox_into(
  frame: &RgbaFrame,
  target_size: u32,
  out: &mut Vec<u8>,
) -> Result<LetterboxMapping, LetterboxError> {
  let mapping = LetterboxMapping::compute(frame.width(), frame.height(), target_size)?;

  let size = target_size as usize;
  out.clear();
  out.resize(size * size * RGBA_CHANNELS, 0);
  for px in out.chunks_exact_mut(RGBA_CHANNELS) {
    px[3] = 255;
  }

  let new_w = frame.width() as f32 * mapping.scale;
  let new_h = frame.height() as f32 * mapping.scale;
  let x0 = mapping.offset_x.floor().max(0.0) as usize;
  let y0 = mapping.offset_y.floor().max(0.0) as usize;
  let x1 = (((mapping.offset_x + new_w).ceil()) as usize).min(size);
  let y1 = (((mapping.offset_y + new_h).ceil()) as usize).min(size);

  let src = frame.as_rgba();
  let src_w = frame.width() as usize;
  let src_h = frame.height() as usize;

  for ty in y0..y1 {
    let sy = (ty as f32 + 0.5 - mapping.offset_y) / mapping.scale - 0.5;
    let sy0 = sy.floor();
    let fy = sy - sy0;
    let r0 = (sy0 as i64).clamp(0, src_h as i64 - 1) as usize;
    let r1 = ((sy0 as i64) + 1).clamp(0, src_h as i64 - 1) as usize;

    for tx in x0..x1 {
      let sx = (tx as f32 + 0.5 - mapping.offset_x) / mapping.scale - 0.5;
      let sx0 = sx.floor();
      let fx = sx - sx0;
      let c0 = (sx0 as i64).clamp(0, src_w as i64 - 1) as usize;
      let c1 = ((sx0 as i64) + 1).clamp(0, src_w as i64 - 1) as usize;

      let dst = (ty * size + tx) * RGBA_CHANNELS;
      for ch in 0..RGBA_CHANNELS {
        let p00 = src[(r0 * src_w + c0) * RGBA_CHANNELS + ch] as f32;
        let p01 = src[(r0 * src_w + c1) * RGBA_CHANNELS + ch] as f32;
        let p10 = src[(r1 * src_w + c0) * RGBA_CHANNELS + ch] as f32;
        let p11 = src[(r1 * src_w + c1) * RGBA_CHANNELS + ch] as f32;
        let top = p00 + (p01 - p00) * fx;
        let bottom = p10 + (p11 - p10) * fx;
        out[dst + ch] = (top + (bottom - top) * fy).round().clamp(0.0, 255.0) as u8;
      }
    }
  }

  Ok(mapping)
}
