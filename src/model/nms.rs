// 该文件是 Lingyan （灵眼） 项目的一部分。
// src/model/nms.rs - 非极大值抑制
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use super::decode::Candidate;

// IoU 分母下限，零面积退化框不致除零
const IOU_EPS: f32 = 1e-6;

/// 计算两个角点式框的交并比。
pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let x1 = a[0].max(b[0]);
  let y1 = a[1].max(b[1]);
  let x2 = a[2].min(b[2]);
  let y2 = a[3].min(b[3]);

  let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let area_a = (a[2] - a[0]) * (a[3] - a[1]);
  let area_b = (b[2] - b[0]) * (b[3] - b[1]);

  inter / (area_a + area_b - inter).max(IOU_EPS)
}

/// 贪心非极大值抑制，返回保留候选的索引，按得分降序。
///
/// 反复取剩余候选中得分最高者保留，丢弃与之 IoU 超过阈值的其余候选。
/// `class_aware` 为真时只在同类别之间比较；默认跨类别抑制。
/// 复杂度 O(K²)；候选经解码阶段的下限过滤后 K 通常只有几十，
/// 若类别或候选规模大幅增长需要重新评估。
pub fn nms(candidates: &[Candidate], iou_threshold: f32, class_aware: bool) -> Vec<usize> {
  let mut order: Vec<usize> = (0..candidates.len()).collect();
  order.sort_by(|&a, &b| candidates[b].score.total_cmp(&candidates[a].score));

  let mut keep = Vec::new();
  while let Some(best) = order.first().copied() {
    keep.push(best);
    order.retain(|&i| {
      if i == best {
        return false;
      }
      if class_aware && candidates[i].class_id != candidates[best].class_id {
        return true;
      }
      iou(&candidates[best].bbox, &candidates[i].bbox) <= iou_threshold
    });
  }

  keep
}

#[cfg(test)]
mod tests {
  use super::*;

  fn candidate(bbox: [f32; 4], score: f32, class_id: usize) -> Candidate {
    Candidate {
      bbox,
      score,
      class_id,
    }
  }

  #[test]
  fn iou_of_identical_boxes_is_one() {
    let b = [10.0, 10.0, 50.0, 50.0];
    assert!((iou(&b, &b) - 1.0).abs() < 1e-6);
  }

  #[test]
  fn iou_of_disjoint_boxes_is_zero() {
    let a = [0.0, 0.0, 10.0, 10.0];
    let b = [20.0, 20.0, 30.0, 30.0];
    assert_eq!(iou(&a, &b), 0.0);
  }

  #[test]
  fn iou_of_contained_box_is_area_ratio() {
    let outer = [0.0, 0.0, 100.0, 100.0];
    let inner = [25.0, 25.0, 75.0, 75.0];
    assert!((iou(&outer, &inner) - 0.25).abs() < 1e-6);
  }

  #[test]
  fn iou_of_degenerate_boxes_is_finite() {
    let zero = [10.0, 10.0, 10.0, 10.0];
    assert_eq!(iou(&zero, &zero), 0.0);
  }

  #[test]
  fn higher_score_suppresses_identical_box() {
    let cands = vec![
      candidate([0.0, 0.0, 100.0, 100.0], 0.8, 0),
      candidate([0.0, 0.0, 100.0, 100.0], 0.9, 0),
    ];
    let keep = nms(&cands, 0.45, false);
    assert_eq!(keep, vec![1]);
  }

  #[test]
  fn class_agnostic_suppresses_across_classes() {
    let cands = vec![
      candidate([0.0, 0.0, 100.0, 100.0], 0.9, 0),
      candidate([0.0, 0.0, 100.0, 100.0], 0.8, 1),
    ];
    assert_eq!(nms(&cands, 0.45, false), vec![0]);
    // 按类别分组时不同类别互不抑制
    assert_eq!(nms(&cands, 0.45, true), vec![0, 1]);
  }

  #[test]
  fn nms_is_idempotent() {
    let cands = vec![
      candidate([0.0, 0.0, 100.0, 100.0], 0.9, 0),
      candidate([10.0, 10.0, 110.0, 110.0], 0.8, 0),
      candidate([200.0, 200.0, 300.0, 300.0], 0.7, 0),
      candidate([205.0, 205.0, 305.0, 305.0], 0.6, 0),
    ];
    let keep = nms(&cands, 0.45, false);
    let kept: Vec<Candidate> = keep.iter().map(|&i| cands[i].clone()).collect();
    let again = nms(&kept, 0.45, false);
    assert_eq!(again.len(), kept.len());
    // 保留集中任意两框都不应互相抑制
    for (i, a) in kept.iter().enumerate() {
      for b in kept.iter().skip(i + 1) {
        assert!(iou(&a.bbox, &b.bbox) <= 0.45);
      }
    }
  }
}
