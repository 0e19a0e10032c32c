// 该文件是 Kanjian （看见） 项目的一部分。
// src/model/nms.rs - 非极大值抑制
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

use std::{cmp::Ordering, collections::BTreeMap};

use crate::model::Detection;

/// 计算两个 `[x0, y0, x1, y1]` 边界框的 IoU；并集为零时返回 0
pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let x1 = a[0].max(b[0]);
  let y1 = a[1].max(b[1]);
  let x2 = a[2].min(b[2]);
  let y2 = a[3].min(b[3]);

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let area_a = (a[2] - a[0]) * (a[3] - a[1]);
  let area_b = (b[2] - b[0]) * (b[3] - b[1]);
  let union = area_a + area_b - intersection;

  if union > 0.0 {
    (intersection / union).clamp(0.0, 1.0)
  } else {
    0.0
  }
}

fn by_score_desc(a: &Detection, b: &Detection) -> Ordering {
  b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal)
}

/// 按类别分组的贪心 NMS。
///
/// 不同类别互不抑制。每组按置信度降序（稳定排序，并列时保持插入顺序）
/// 依次保留未被抑制的框，并抑制其后 IoU 超过阈值的同类框。
/// 结果跨类别合并后再按置信度降序稳定排序。
pub fn nms(detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
  let mut groups: BTreeMap<u32, Vec<Detection>> = BTreeMap::new();
  for det in detections {
    groups.entry(det.class_id).or_default().push(det);
  }

  let mut result = Vec::new();
  for (_, mut group) in groups {
    group.sort_by(by_score_desc);

    let mut suppressed = vec![false; group.len()];
    for i in 0..group.len() {
      if suppressed[i] {
        continue;
      }
      for j in (i + 1)..group.len() {
        if !suppressed[j] && iou(&group[i].bbox, &group[j].bbox) > iou_threshold {
          suppressed[j] = true;
        }
      }
    }

    result.extend(
      group
        .into_iter()
        .zip(suppressed)
        .filter_map(|(det, suppressed)| (!suppressed).then_some(det)),
    );
  }

  result.sort_by(by_score_desc);
  result
}

#[cfg(test)]
mod tests {
  use super::*;

  fn det(class_id: u32, score: f32, bbox: [f32; 4]) -> Detection {
    Detection {
      class_id,
      class_name: format!("class-{}", class_id),
      score,
      bbox,
    }
  }

  #[test]
  fn iou_bounds() {
    let a = [10.0, 10.0, 50.0, 50.0];
    let b = [12.0, 12.0, 52.0, 52.0];
    let far = [100.0, 100.0, 120.0, 120.0];
    let touching = [50.0, 10.0, 90.0, 50.0];

    assert_eq!(iou(&a, &a), 1.0);
    assert_eq!(iou(&a, &far), 0.0);
    assert_eq!(iou(&a, &touching), 0.0);
    let v = iou(&a, &b);
    assert!((0.0..=1.0).contains(&v));
    assert!((v - 0.8223).abs() < 1e-3, "iou = {}", v);
    assert_eq!(iou(&a, &b), iou(&b, &a));
  }

  #[test]
  fn degenerate_boxes_have_zero_iou() {
    let point = [5.0, 5.0, 5.0, 5.0];
    assert_eq!(iou(&point, &point), 0.0);
  }

  #[test]
  fn suppresses_overlapping_same_class() {
    let detections = vec![
      det(3, 0.8, [12.0, 12.0, 52.0, 52.0]),
      det(3, 0.9, [10.0, 10.0, 50.0, 50.0]),
    ];
    let kept = nms(detections, 0.45);
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].score, 0.9);
    assert_eq!(kept[0].bbox, [10.0, 10.0, 50.0, 50.0]);
  }

  #[test]
  fn classes_never_suppress_each_other() {
    let detections = vec![
      det(1, 0.9, [10.0, 10.0, 50.0, 50.0]),
      det(2, 0.8, [10.0, 10.0, 50.0, 50.0]),
    ];
    let kept = nms(detections, 0.0);
    assert_eq!(kept.len(), 2);
  }

  #[test]
  fn empty_input_is_empty_output() {
    assert!(nms(Vec::new(), 0.45).is_empty());
  }

  #[test]
  fn ties_keep_insertion_order() {
    let detections = vec![
      det(0, 0.5, [0.0, 0.0, 10.0, 10.0]),
      det(0, 0.5, [1.0, 1.0, 11.0, 11.0]),
    ];
    let kept = nms(detections, 0.3);
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].bbox, [0.0, 0.0, 10.0, 10.0]);
  }

  #[test]
  fn chain_is_resolved_greedily() {
    // b 被 a 抑制后不再抑制 c
    let detections = vec![
      det(0, 0.9, [0.0, 0.0, 10.0, 10.0]),
      det(0, 0.8, [4.0, 0.0, 14.0, 10.0]),
      det(0, 0.7, [8.0, 0.0, 18.0, 10.0]),
    ];
    let kept = nms(detections, 0.3);
    let scores: Vec<f32> = kept.iter().map(|d| d.score).collect();
    assert_eq!(scores, vec![0.9, 0.7]);
  }

  #[test]
  fn applying_twice_is_identity() {
    let mut detections = Vec::new();
    for i in 0..40u32 {
      let offset = (i % 7) as f32 * 6.0;
      let score = 1.0 - i as f32 / 50.0;
      detections.push(det(i % 3, score, [offset, offset, offset + 30.0, offset + 30.0]));
    }
    let once = nms(detections, 0.45);
    let twice = nms(once.clone(), 0.45);
    assert_eq!(once, twice);
  }
}
