// 该文件是 Kanjian （看见） 项目的一部分。
// src/model.rs - 模型
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

use crate::frame::NchwTensor;

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

/// 原图坐标系下的一个检测结果
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
  pub class_id: u32,
  pub class_name: String,
  pub score: f32,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectResult {
  pub items: Box<[Detection]>,
}

impl DetectResult {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn to_json(&self) -> serde_json::Value {
    let items: Vec<serde_json::Value> = self
      .items
      .iter()
      .map(|item| {
        serde_json::json!({
          "class_id": item.class_id,
          "class_name": item.class_name,
          "score": item.score,
          "bbox": item.bbox,
        })
      })
      .collect();
    serde_json::json!({ "count": items.len(), "items": items })
  }
}

impl From<Vec<Detection>> for DetectResult {
  fn from(items: Vec<Detection>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }
}

/// 模型的原始输出：形状与按行主序展开的数据
#[derive(Debug, Clone, PartialEq)]
pub struct RawOutput {
  pub shape: Vec<usize>,
  pub data: Vec<f32>,
}

impl RawOutput {
  pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Self {
    Self { shape, data }
  }
}

#[derive(Error, Debug)]
pub enum InferenceError {
  #[error("模型加载错误: {0}")]
  Load(String),
  #[error("推理失败: {0}")]
  Run(String),
  #[error("模型没有输出")]
  NoOutput,
  #[error("模型输出不是 f32 张量: {0}")]
  OutputType(String),
  #[error("模型路径错误: {0}")]
  ModelPath(String),
}

/// 推理执行器
///
/// 只负责执行：把 `[1, C, H, W]` 张量交给模型，返回第一个输出张量。
/// 形状识别与解码由 [`decode`] 完成。
pub trait InferenceBackend: Send + Sync {
  fn name(&self) -> &str;

  /// 模型声明的第一个输入的名称
  fn input_name(&self) -> &str;

  /// 期望的输入形状 `[1, C, H, W]`
  fn input_shape(&self) -> [usize; 4];

  /// 模型声明的第一个输出形状；未知时返回 `None`
  fn declared_output_shape(&self) -> Option<Vec<usize>> {
    None
  }

  fn run(&self, tensor: &NchwTensor) -> Result<RawOutput, InferenceError>;
}

pub mod decode;
pub mod filter;
pub mod handle;
pub mod labels;
pub mod nms;
pub mod store;
#[cfg(feature = "backend-tract")]
mod tract_backend;

pub use self::decode::{DecodeConvention, DecodeError, OutputLayout};
pub use self::handle::{HandleError, InferenceHandle, Session};
pub use self::labels::ClassList;
pub use self::store::{ModelStore, StoreError};
#[cfg(feature = "backend-tract")]
pub use self::tract_backend::{TractBackend, TractBackendBuilder};
