// 该文件是 Lingyan （灵眼） 项目的一部分。
// src/model/decode.rs - 原始输出解码
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use thiserror::Error;
use tracing::debug;

use crate::letterbox::LetterboxMapping;

/// 候选框打分下限，仅用于限制抑制阶段的工作量，
/// 不是面向用户的置信度阈值。
pub const CANDIDATE_FLOOR: f32 = 0.001;

/// 候选检测，在单帧内产生并消费。
#[derive(Debug, Clone)]
pub struct Candidate {
  /// 源帧像素坐标 [x1, y1, x2, y2]
  pub bbox: [f32; 4],
  /// objectness × 最高类别分数
  pub score: f32,
  pub class_id: usize,
}

#[derive(Error, Debug)]
pub enum DecodeError {
  #[error("输出张量长度 {len} 不是步长 {stride} 的整数倍")]
  MalformedOutput { len: usize, stride: usize },
}

/// 把原始输出缓冲解码为候选检测。
///
/// 行格式为 `[cx, cy, w, h, objectness, class_0 .. class_{C-1}]`，
/// 单位是模型空间像素，步长 `5 + C`。逻辑形状可能是 `[N, stride]`
/// 或 `[1, N, stride]`；批次维为 1 时不产生额外偏移，因此统一按
/// 扁平缓冲以长度推导 N。框先在模型空间转为角点式，再经逆信箱映射
/// 回源帧空间并夹取到帧边界内。
pub fn decode_output(
  raw: &[f32],
  class_num: usize,
  mapping: &LetterboxMapping,
  frame_width: u32,
  frame_height: u32,
) -> Result<Vec<Candidate>, DecodeError> {
  let stride = 5 + class_num;
  if raw.len() % stride != 0 {
    return Err(DecodeError::MalformedOutput {
      len: raw.len(),
      stride,
    });
  }

  let rows = raw.len() / stride;
  let frame_w = frame_width as f32;
  let frame_h = frame_height as f32;
  let mut candidates = Vec::new();

  for row in raw.chunks_exact(stride) {
    let cx = row[0];
    let cy = row[1];
    let w = row[2];
    let h = row[3];
    let objectness = row[4];

    // 严格 argmax，得分相同时保留更小的类别索引
    let mut class_id = 0usize;
    let mut best = 0.0f32;
    for (c, &s) in row[5..].iter().enumerate() {
      if s > best {
        best = s;
        class_id = c;
      }
    }

    let score = objectness * best;
    if score < CANDIDATE_FLOOR {
      continue;
    }

    // 中心式转角点式仍在模型空间，随后应用逆信箱映射
    let (x1, y1) = mapping.model_to_source(cx - w / 2.0, cy - h / 2.0);
    let (x2, y2) = mapping.model_to_source(cx + w / 2.0, cy + h / 2.0);

    candidates.push(Candidate {
      bbox: [
        x1.clamp(0.0, frame_w),
        y1.clamp(0.0, frame_h),
        x2.clamp(0.0, frame_w),
        y2.clamp(0.0, frame_h),
      ],
      score,
      class_id,
    });
  }

  debug!("解码 {} 行，保留 {} 个候选", rows, candidates.len());
  Ok(candidates)
}

#[cfg(test)]
mod tests {
  use super::*;

  // 640x640 帧进 640 目标，映射为恒等
  fn identity_mapping() -> LetterboxMapping {
    LetterboxMapping::compute(640, 640, 640).unwrap()
  }

  #[test]
  fn empty_buffer_yields_no_candidates() {
    let out = decode_output(&[], 1, &identity_mapping(), 640, 640).unwrap();
    assert!(out.is_empty());
  }

  #[test]
  fn non_multiple_length_is_malformed() {
    let err = decode_output(&[0.0; 7], 1, &identity_mapping(), 640, 640).unwrap_err();
    match err {
      DecodeError::MalformedOutput { len, stride } => {
        assert_eq!(len, 7);
        assert_eq!(stride, 6);
      }
    }
  }

  #[test]
  fn decodes_center_box_to_corners() {
    // C=2, 行: cx=320, cy=320, w=100, h=50, obj=0.8, cls=[0.25, 0.75]
    let raw = [320.0, 320.0, 100.0, 50.0, 0.8, 0.25, 0.75];
    let out = decode_output(&raw, 2, &identity_mapping(), 640, 640).unwrap();
    assert_eq!(out.len(), 1);
    let c = &out[0];
    assert_eq!(c.class_id, 1);
    assert!((c.score - 0.6).abs() < 1e-6);
    assert!((c.bbox[0] - 270.0).abs() < 1e-3);
    assert!((c.bbox[1] - 295.0).abs() < 1e-3);
    assert!((c.bbox[2] - 370.0).abs() < 1e-3);
    assert!((c.bbox[3] - 345.0).abs() < 1e-3);
  }

  #[test]
  fn low_score_rows_are_floored() {
    let raw = [320.0, 320.0, 10.0, 10.0, 0.01, 0.05];
    let out = decode_output(&raw, 1, &identity_mapping(), 640, 640).unwrap();
    assert!(out.is_empty());
  }

  #[test]
  fn argmax_tie_breaks_to_lowest_class() {
    let raw = [320.0, 320.0, 10.0, 10.0, 1.0, 0.5, 0.5, 0.4];
    let out = decode_output(&raw, 3, &identity_mapping(), 640, 640).unwrap();
    assert_eq!(out[0].class_id, 0);
  }

  #[test]
  fn boxes_are_clamped_to_frame_bounds() {
    // 1280x720 帧，框越过信箱内容区域左上角
    let mapping = LetterboxMapping::compute(1280, 720, 640).unwrap();
    let raw = [10.0, 145.0, 100.0, 100.0, 1.0, 1.0];
    let out = decode_output(&raw, 1, &mapping, 1280, 720).unwrap();
    let b = &out[0].bbox;
    assert!((b[0] - 0.0).abs() < 1e-3);
    assert!((b[1] - 0.0).abs() < 1e-3);
    assert!(b[2] <= 1280.0);
    assert!(b[3] <= 720.0);
  }
}
