// 该文件是 Kanjian （看见） 项目的一部分。
// src/model/filter.rs - 置信度过滤
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

use tracing::debug;

use crate::{
  model::{
    Detection,
    decode::{Candidate, CandidateRows, DecodeConvention},
    labels::ClassList,
  },
  preprocess::LetterboxParams,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceFilter {
  pub threshold: f32,
}

impl ConfidenceFilter {
  pub fn new(threshold: f32) -> Self {
    Self { threshold }
  }

  /// 返回 `(class_id, confidence)`；没有正分类别、置信度低于阈值或为 NaN 时丢弃
  pub fn accept(&self, candidate: &Candidate<'_>) -> Option<(u32, f32)> {
    let (class_id, class_score) = candidate.best_class()?;
    let confidence = candidate.objectness * class_score;
    if confidence.is_nan() || confidence < self.threshold {
      return None;
    }
    Some((class_id as u32, confidence.min(1.0)))
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterStats {
  pub candidates: usize,
  pub malformed: usize,
  pub kept: usize,
}

/// 解码、过滤并映射回原图坐标。畸形候选会被跳过并计数。
pub fn collect_detections(
  rows: &CandidateRows<'_>,
  convention: DecodeConvention,
  labels: &ClassList,
  filter: ConfidenceFilter,
  params: &LetterboxParams,
) -> (Vec<Detection>, FilterStats) {
  let mut stats = FilterStats::default();
  let mut detections = Vec::new();
  let input_width = params.target_width as f32;
  let input_height = params.target_height as f32;

  for row in rows.iter() {
    stats.candidates += 1;
    let candidate = match convention.decode(row, labels.len(), input_width, input_height) {
      Ok(candidate) => candidate,
      Err(e) => {
        if stats.malformed == 0 {
          debug!("跳过畸形候选: {}", e);
        }
        stats.malformed += 1;
        continue;
      }
    };

    let Some((class_id, score)) = filter.accept(&candidate) else {
      continue;
    };
    if !candidate.has_valid_box() {
      if stats.malformed == 0 {
        debug!(
          "跳过畸形候选: 框 ({}, {}, {}, {})",
          candidate.cx, candidate.cy, candidate.w, candidate.h
        );
      }
      stats.malformed += 1;
      continue;
    }

    detections.push(Detection {
      class_id,
      class_name: labels.name(class_id).to_string(),
      score,
      bbox: params.unmap_box(candidate.bbox()),
    });
  }

  stats.kept = detections.len();
  debug!(
    "候选 {} 个, 畸形 {} 个, 通过阈值 {} 个",
    stats.candidates, stats.malformed, stats.kept
  );
  (detections, stats)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::RawOutput;

  fn row_major(rows: &[[f32; 6]]) -> RawOutput {
    // 补齐到 1001 行以满足形状识别
    let mut data: Vec<f32> = rows.iter().flatten().copied().collect();
    data.resize(1001 * 6, 0.0);
    RawOutput::new(vec![1, 1001, 6], data)
  }

  #[test]
  fn accepts_best_class_above_threshold() {
    let row = [10.0, 10.0, 4.0, 4.0, 0.3, 0.6];
    let candidate = DecodeConvention::DirectProbability
      .decode(&row, 2, 640.0, 640.0)
      .unwrap();
    assert_eq!(ConfidenceFilter::new(0.5).accept(&candidate), Some((1, 0.6)));
    assert_eq!(ConfidenceFilter::new(0.6).accept(&candidate), Some((1, 0.6)));
    assert_eq!(ConfidenceFilter::new(0.61).accept(&candidate), None);
  }

  #[test]
  fn objectness_scales_confidence() {
    let candidate = Candidate {
      cx: 0.0,
      cy: 0.0,
      w: 1.0,
      h: 1.0,
      objectness: 0.5,
      scores: vec![0.8].into(),
    };
    assert_eq!(ConfidenceFilter::new(0.4).accept(&candidate), Some((0, 0.4)));
    assert_eq!(ConfidenceFilter::new(0.5).accept(&candidate), None);
  }

  #[test]
  fn maps_survivors_back_to_image_space() {
    let labels = ClassList::from_names(["cat", "dog"]);
    let params = LetterboxParams::compute(1280, 720, 640, 640).unwrap();
    let output = row_major(&[[320.0, 320.0, 100.0, 100.0, 0.1, 0.9]]);
    let rows = CandidateRows::from_output(&output).unwrap();

    let (detections, stats) = collect_detections(
      &rows,
      DecodeConvention::DirectProbability,
      &labels,
      ConfidenceFilter::new(0.25),
      &params,
    );

    assert_eq!(stats.candidates, 1001);
    assert_eq!(stats.kept, 1);
    assert_eq!(detections[0].class_name, "dog");
    assert_eq!(detections[0].bbox, [540.0, 260.0, 740.0, 460.0]);
  }

  #[test]
  fn short_rows_are_counted_not_fatal() {
    let labels = ClassList::from_names(["a", "b", "c"]);
    let params = LetterboxParams::compute(640, 640, 640, 640).unwrap();
    let output = row_major(&[[1.0; 6]]);
    let rows = CandidateRows::from_output(&output).unwrap();

    let (detections, stats) = collect_detections(
      &rows,
      DecodeConvention::SigmoidObjectness,
      &labels,
      ConfidenceFilter::new(0.1),
      &params,
    );
    assert!(detections.is_empty());
    assert_eq!(stats.malformed, 1001);
  }

  #[test]
  fn nan_confidence_is_rejected() {
    let row = [0.0, 0.0, 0.0, 0.0, f32::NAN, 5.0];
    let candidate = DecodeConvention::SigmoidObjectness
      .decode(&row, 1, 640.0, 640.0)
      .unwrap();
    assert!(candidate.objectness.is_nan());
    assert_eq!(ConfidenceFilter::new(0.5).accept(&candidate), None);
    assert_eq!(ConfidenceFilter::new(0.0).accept(&candidate), None);
  }

  #[test]
  fn confidence_is_capped_at_one() {
    let row = [10.0, 10.0, 4.0, 4.0, 3.5];
    let candidate = DecodeConvention::DirectProbability
      .decode(&row, 1, 640.0, 640.0)
      .unwrap();
    assert_eq!(ConfidenceFilter::new(0.5).accept(&candidate), Some((0, 1.0)));
  }

  #[test]
  fn degenerate_boxes_are_counted_as_malformed() {
    let labels = ClassList::from_names(["a", "b"]);
    let params = LetterboxParams::compute(640, 640, 640, 640).unwrap();
    let output = row_major(&[
      [300.0, 300.0, -100.0, -100.0, 0.9, 0.0],
      [300.0, 300.0, 0.0, 50.0, 0.9, 0.0],
      [f32::NAN, 300.0, 50.0, 50.0, 0.9, 0.0],
      [300.0, 300.0, 100.0, 60.0, 0.0, 0.8],
    ]);
    let rows = CandidateRows::from_output(&output).unwrap();

    let (detections, stats) = collect_detections(
      &rows,
      DecodeConvention::DirectProbability,
      &labels,
      ConfidenceFilter::new(0.25),
      &params,
    );
    assert_eq!(stats.malformed, 3);
    assert_eq!(detections.len(), 1);
    let [x0, y0, x1, y1] = detections[0].bbox;
    assert!(x0 <= x1 && y0 <= y1);
    assert_eq!(detections[0].bbox, [250.0, 270.0, 350.0, 330.0]);
  }

  #[test]
  fn raising_threshold_never_adds_survivors() {
    let labels = ClassList::from_names(["a", "b"]);
    let params = LetterboxParams::compute(640, 640, 640, 640).unwrap();
    let rows: Vec<[f32; 6]> = (0..50)
      .map(|i| {
        let s = i as f32 / 50.0;
        [100.0, 100.0, 20.0, 20.0, s, 1.0 - s]
      })
      .collect();
    let output = row_major(&rows);
    let rows = CandidateRows::from_output(&output).unwrap();

    let mut previous = usize::MAX;
    for step in 0..=20 {
      let threshold = step as f32 / 20.0;
      let (detections, _) = collect_detections(
        &rows,
        DecodeConvention::DirectProbability,
        &labels,
        ConfidenceFilter::new(threshold),
        &params,
      );
      assert!(detections.len() <= previous);
      previous = detections.len();
    }
  }
}
