// 该文件是 Kanjian （看见） 项目的一部分。
// src/model/tract_backend.rs - 基于 tract 的 ONNX 推理后端
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

use std::path::PathBuf;

use tracing::{debug, info};
use tract_onnx::prelude::*;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  config::{DEFAULT_INPUT_HEIGHT, DEFAULT_INPUT_WIDTH},
  frame::NchwTensor,
  model::{InferenceBackend, InferenceError, RawOutput},
};

const ONNX_SCHEME: &str = "onnx";
const INPUT_CHANNELS: usize = 3;

type Plan = TypedRunnableModel<TypedModel>;

fn load_error(e: impl std::fmt::Display) -> InferenceError {
  InferenceError::Load(e.to_string())
}

pub struct TractBackendBuilder {
  model_path: PathBuf,
  input_width: u32,
  input_height: u32,
}

impl FromUrl for TractBackendBuilder {
  type Error = InferenceError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != ONNX_SCHEME {
      return Err(InferenceError::ModelPath(format!(
        "模型路径必须使用 {} 方案",
        ONNX_SCHEME
      )));
    }

    Ok(Self::from_path(url.path()))
  }
}

impl FromUrlWithScheme for TractBackendBuilder {
  const SCHEME: &'static str = ONNX_SCHEME;
}

impl TractBackendBuilder {
  pub fn from_path(path: impl Into<PathBuf>) -> Self {
    Self {
      model_path: path.into(),
      input_width: DEFAULT_INPUT_WIDTH,
      input_height: DEFAULT_INPUT_HEIGHT,
    }
  }

  pub fn input_size(mut self, width: u32, height: u32) -> Self {
    self.input_width = width;
    self.input_height = height;
    self
  }

  pub fn build(self) -> Result<TractBackend, InferenceError> {
    info!("加载模型文件: {}", self.model_path.display());
    let (width, height) = (self.input_width as usize, self.input_height as usize);

    let plan = tract_onnx::onnx()
      .model_for_path(&self.model_path)
      .map_err(load_error)?
      .with_input_fact(
        0,
        InferenceFact::dt_shape(f32::datum_type(), tvec!(1, INPUT_CHANNELS, height, width)),
      )
      .map_err(load_error)?
      .into_optimized()
      .map_err(load_error)?
      .into_runnable()
      .map_err(load_error)?;

    let model = plan.model();
    let input_node = model
      .input_outlets()
      .map_err(load_error)?
      .first()
      .ok_or_else(|| load_error("模型没有输入"))?
      .node;
    let input_name = model.node(input_node).name.clone();
    let output_shape = model
      .output_fact(0)
      .map_err(load_error)?
      .shape
      .as_concrete()
      .map(|dims| dims.to_vec());

    debug!("模型输入: {} [1, {}, {}, {}]", input_name, INPUT_CHANNELS, height, width);
    debug!("模型输出形状: {:?}", output_shape);
    info!("模型加载完成");

    let name = self
      .model_path
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_else(|| "tract".to_string());

    Ok(TractBackend {
      plan,
      name,
      input_name,
      input_shape: [1, INPUT_CHANNELS, height, width],
      output_shape,
    })
  }
}

/// 以 tract 执行 ONNX 模型，输入固定为 `[1, 3, H, W]`
pub struct TractBackend {
  plan: Plan,
  name: String,
  input_name: String,
  input_shape: [usize; 4],
  output_shape: Option<Vec<usize>>,
}

impl InferenceBackend for TractBackend {
  fn name(&self) -> &str {
    &self.name
  }

  fn input_name(&self) -> &str {
    &self.input_name
  }

  fn input_shape(&self) -> [usize; 4] {
    self.input_shape
  }

  fn declared_output_shape(&self) -> Option<Vec<usize>> {
    self.output_shape.clone()
  }

  fn run(&self, tensor: &NchwTensor) -> Result<RawOutput, InferenceError> {
    let shape = tensor.shape();
    if shape != self.input_shape {
      return Err(InferenceError::Run(format!(
        "输入形状 {:?} 与模型输入 {:?} 不符",
        shape, self.input_shape
      )));
    }

    let input = Tensor::from_shape::<f32>(&shape, tensor.as_slice())
      .map_err(|e| InferenceError::Run(e.to_string()))?;
    let outputs = self
      .plan
      .run(tvec!(input.into()))
      .map_err(|e| InferenceError::Run(e.to_string()))?;

    let output = outputs.first().ok_or(InferenceError::NoOutput)?;
    let view = output
      .to_array_view::<f32>()
      .map_err(|e| InferenceError::OutputType(e.to_string()))?;

    Ok(RawOutput::new(
      view.shape().to_vec(),
      view.iter().copied().collect(),
    ))
  }
}
