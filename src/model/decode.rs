// 该文件是 Kanjian （看见） 项目的一部分。
// src/model/decode.rs - 模型输出解码
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

use std::{borrow::Cow, fmt, str::FromStr};

use thiserror::Error;
use tracing::debug;

use crate::model::RawOutput;

/// 候选数量超过该值的轴被视为候选轴
const CANDIDATE_AXIS_MIN: usize = 1000;
/// 每个候选至少包含 cx, cy, w, h
const BOX_FEATURES: usize = 4;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
  #[error("不支持的输出形状: {0:?}")]
  UnsupportedOutputShape(Vec<usize>),
  #[error("输出数据长度与形状 {shape:?} 不符: 期望 {expected}, 实际 {actual}")]
  DataLength {
    shape: Vec<usize>,
    expected: usize,
    actual: usize,
  },
  #[error("候选元素数量不足: 需要 {required}, 实际 {actual}")]
  MalformedCandidate { required: usize, actual: usize },
}

/// 输出张量的轴顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputLayout {
  /// `[1, K, N]`，需要转置为 `[N, K]`（YOLOv8/v11）
  Transposed { features: usize, candidates: usize },
  /// `[1, N, K]`，可直接逐行读取（YOLOv5/v7）
  RowMajor { candidates: usize, features: usize },
}

impl OutputLayout {
  pub fn classify(shape: &[usize]) -> Result<Self, DecodeError> {
    let &[_, dim1, dim2] = shape else {
      return Err(DecodeError::UnsupportedOutputShape(shape.to_vec()));
    };

    if dim1 >= BOX_FEATURES && dim2 > CANDIDATE_AXIS_MIN {
      Ok(OutputLayout::Transposed {
        features: dim1,
        candidates: dim2,
      })
    } else if dim2 >= BOX_FEATURES && dim1 > CANDIDATE_AXIS_MIN {
      Ok(OutputLayout::RowMajor {
        candidates: dim1,
        features: dim2,
      })
    } else {
      Err(DecodeError::UnsupportedOutputShape(shape.to_vec()))
    }
  }

  pub fn features(&self) -> usize {
    match *self {
      OutputLayout::Transposed { features, .. } | OutputLayout::RowMajor { features, .. } => {
        features
      }
    }
  }

  pub fn candidates(&self) -> usize {
    match *self {
      OutputLayout::Transposed { candidates, .. } | OutputLayout::RowMajor { candidates, .. } => {
        candidates
      }
    }
  }
}

/// 候选向量的语义约定。
///
/// 两种约定不能互换，也无法从形状推断，必须显式指定。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodeConvention {
  /// `[cx, cy, w, h, class0..]`，直接使用，置信度为最大类别分数
  #[default]
  DirectProbability,
  /// `[cx, cy, w, h, obj, class0..]`，全部经过 sigmoid，
  /// 置信度为 `sigmoid(obj) * max(sigmoid(class))`，
  /// 框坐标 sigmoid 后乘以输入宽高
  SigmoidObjectness,
}

impl DecodeConvention {
  fn leading(self) -> usize {
    match self {
      DecodeConvention::DirectProbability => BOX_FEATURES,
      DecodeConvention::SigmoidObjectness => BOX_FEATURES + 1,
    }
  }

  pub fn required_features(self, num_classes: usize) -> usize {
    self.leading() + num_classes
  }

  /// 由每个候选的元素数量推出模型声明的类别数
  pub fn class_width(self, features: usize) -> Option<usize> {
    features.checked_sub(self.leading())
  }

  pub fn decode<'a>(
    self,
    row: &'a [f32],
    num_classes: usize,
    input_width: f32,
    input_height: f32,
  ) -> Result<Candidate<'a>, DecodeError> {
    let required = self.required_features(num_classes);
    if row.len() < required {
      return Err(DecodeError::MalformedCandidate {
        required,
        actual: row.len(),
      });
    }

    let candidate = match self {
      DecodeConvention::DirectProbability => Candidate {
        cx: row[0],
        cy: row[1],
        w: row[2],
        h: row[3],
        objectness: 1.0,
        scores: Cow::Borrowed(&row[BOX_FEATURES..required]),
      },
      DecodeConvention::SigmoidObjectness => Candidate {
        cx: sigmoid(row[0]) * input_width,
        cy: sigmoid(row[1]) * input_height,
        w: sigmoid(row[2]) * input_width,
        h: sigmoid(row[3]) * input_height,
        objectness: sigmoid(row[4]),
        scores: Cow::Owned(row[BOX_FEATURES + 1..required].iter().map(|&v| sigmoid(v)).collect()),
      },
    };
    Ok(candidate)
  }
}

impl FromStr for DecodeConvention {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "direct" | "direct-probability" => Ok(DecodeConvention::DirectProbability),
      "sigmoid" | "sigmoid-objectness" => Ok(DecodeConvention::SigmoidObjectness),
      other => Err(format!("未知的解码约定: {}", other)),
    }
  }
}

impl fmt::Display for DecodeConvention {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      DecodeConvention::DirectProbability => write!(f, "direct-probability"),
      DecodeConvention::SigmoidObjectness => write!(f, "sigmoid-objectness"),
    }
  }
}

/// 模型空间中的一个候选
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate<'a> {
  pub cx: f32,
  pub cy: f32,
  pub w: f32,
  pub h: f32,
  pub objectness: f32,
  pub scores: Cow<'a, [f32]>,
}

impl Candidate<'_> {
  /// 中心点宽高转为 `[x0, y0, x1, y1]`
  pub fn bbox(&self) -> [f32; 4] {
    let (half_w, half_h) = (self.w * 0.5, self.h * 0.5);
    [
      self.cx - half_w,
      self.cy - half_h,
      self.cx + half_w,
      self.cy + half_h,
    ]
  }

  /// 中心有限且宽高为正的有限值
  pub fn has_valid_box(&self) -> bool {
    self.cx.is_finite()
      && self.cy.is_finite()
      && self.w.is_finite()
      && self.h.is_finite()
      && self.w > 0.0
      && self.h > 0.0
  }

  /// 分数最高且大于零的类别；并列时取下标最小者
  pub fn best_class(&self) -> Option<(usize, f32)> {
    let mut best = None;
    let mut best_score = 0.0f32;
    for (class_id, &score) in self.scores.iter().enumerate() {
      if score > best_score {
        best_score = score;
        best = Some(class_id);
      }
    }
    best.map(|class_id| (class_id, best_score))
  }
}

/// 按 `[N, K]` 行主序排列的候选数据
#[derive(Debug, Clone)]
pub struct CandidateRows<'a> {
  layout: OutputLayout,
  rows: Cow<'a, [f32]>,
}

impl<'a> CandidateRows<'a> {
  pub fn from_output(output: &'a RawOutput) -> Result<Self, DecodeError> {
    let layout = OutputLayout::classify(&output.shape)?;
    let expected = output
      .shape
      .iter()
      .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
      .ok_or_else(|| DecodeError::UnsupportedOutputShape(output.shape.clone()))?;
    if output.data.len() != expected {
      return Err(DecodeError::DataLength {
        shape: output.shape.clone(),
        expected,
        actual: output.data.len(),
      });
    }

    // 批次维只取第一张
    let batch = layout.features() * layout.candidates();
    let data = &output.data[..batch];

    let rows = match layout {
      OutputLayout::RowMajor { .. } => Cow::Borrowed(data),
      OutputLayout::Transposed {
        features,
        candidates,
      } => {
        let mut rows = vec![0f32; batch];
        for (j, feature) in data.chunks_exact(candidates).enumerate() {
          for (i, &value) in feature.iter().enumerate() {
            rows[i * features + j] = value;
          }
        }
        Cow::Owned(rows)
      }
    };

    debug!("输出形状 {:?} 识别为 {:?}", output.shape, layout);
    Ok(Self { layout, rows })
  }

  pub fn layout(&self) -> OutputLayout {
    self.layout
  }

  pub fn len(&self) -> usize {
    self.layout.candidates()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn iter(&self) -> impl Iterator<Item = &[f32]> {
    self.rows.chunks_exact(self.layout.features())
  }
}

fn sigmoid(x: f32) -> f32 {
  1.0 / (1.0 + (-x).exp())
}
