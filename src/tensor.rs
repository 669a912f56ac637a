// 该文件是 Lingyan （灵眼） 项目的一部分。
// src/tensor.rs - 张量编码
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

use crate::frame::RGBA_CHANNELS;

#[derive(Error, Debug)]
pub enum TensorError {
  #[error("像素缓冲长度不匹配: 期望 {expected}, 实际 {actual}")]
  SizeMismatch { expected: usize, actual: usize },
}

/// 通道顺序。不同导出方式的模型可能期望 BGR。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelOrder {
  #[default]
  Rgb,
  Bgr,
}

/// 张量内存布局。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TensorLayout {
  /// 平面布局，通道优先：所有 R，然后所有 G，再所有 B
  #[default]
  Nchw,
  /// 按像素交织布局
  Nhwc,
}

/// 推理引擎的输入布局描述符。
///
/// 布局与通道顺序必须与引擎的输入契约一致，这里是配置点而非硬编码假设。
#[derive(Debug, Clone, Copy, Default)]
pub struct TensorDesc {
  pub order: ChannelOrder,
  pub layout: TensorLayout,
}

/// 引擎输入张量，数据为借用的扁平缓冲加形状描述。
#[derive(Debug, Clone, Copy)]
pub struct InputTensor<'a> {
  pub data: &'a [f32],
  pub shape: [usize; 4],
}

/// 引擎输出张量。形状元数据由引擎尽力提供，解码不依赖它。
#[derive(Debug, Clone)]
pub struct OutputTensor {
  pub data: Vec<f32>,
  pub shape: Option<Vec<usize>>,
}

/// 把信箱化的 RGBA 缓冲编码为 `[0,1]` 归一化浮点张量，丢弃 alpha 通道。
///
/// 纯变换，无副作用。输出写入 `data` 以便跨帧复用，返回形状描述。
pub fn encode_into(
  rgba: &[u8],
  size: usize,
  desc: TensorDesc,
  data: &mut Vec<f32>,
) -> Result<[usize; 4], TensorError> {
  let expected = size * size * RGBA_CHANNELS;
  if rgba.len() != expected {
    return Err(TensorError::SizeMismatch {
      expected,
      actual: rgba.len(),
    });
  }

  let plane = size * size;
  data.clear();
  data.resize(plane * 3, 0.0);

  for (i, px) in rgba.chunks_exact(RGBA_CHANNELS).enumerate() {
    let (c0, c1, c2) = match desc.order {
      ChannelOrder::Rgb => (px[0], px[1], px[2]),
      ChannelOrder::Bgr => (px[2], px[1], px[0]),
    };

    match desc.layout {
      TensorLayout::Nchw => {
        data[i] = c0 as f32 / 255.0;
        data[plane + i] = c1 as f32 / 255.0;
        data[2 * plane + i] = c2 as f32 / 255.0;
      }
      TensorLayout::Nhwc => {
        let off = i * 3;
        data[off] = c0 as f32 / 255.0;
        data[off + 1] = c1 as f32 / 255.0;
        data[off + 2] = c2 as f32 / 255.0;
      }
    }
  }

  Ok(match desc.layout {
    TensorLayout::Nchw => [1, 3, size, size],
    TensorLayout::Nhwc => [1, size, size, 3],
  })
}
