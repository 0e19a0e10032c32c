// 该文件是 Kanjian （看见） 项目的一部分。
// tests/common/mod.rs - 集成测试公共夹具
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

#![allow(dead_code)]

use std::{
  io::Cursor,
  sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
  },
};

use image::{ImageFormat, Rgb, RgbImage};
use kanjian::{
  frame::NchwTensor,
  model::{InferenceBackend, InferenceError, RawOutput},
};

/// 候选数量，需大于 1000 才能被识别为候选轴
pub const CANDIDATES: usize = 1001;

/// 一个候选：中心、宽高、类别与分数（模型输入坐标）
#[derive(Debug, Clone, Copy)]
pub struct Row {
  pub cx: f32,
  pub cy: f32,
  pub w: f32,
  pub h: f32,
  pub class: usize,
  pub score: f32,
}

/// 构造 `[1, 4 + classes, CANDIDATES]` 的转置输出，其余候选全为零
pub fn transposed(num_classes: usize, rows: &[Row]) -> RawOutput {
  let features = 4 + num_classes;
  let mut data = vec![0f32; features * CANDIDATES];
  for (n, row) in rows.iter().enumerate() {
    data[n] = row.cx;
    data[CANDIDATES + n] = row.cy;
    data[2 * CANDIDATES + n] = row.w;
    data[3 * CANDIDATES + n] = row.h;
    data[(4 + row.class) * CANDIDATES + n] = row.score;
  }
  RawOutput::new(vec![1, features, CANDIDATES], data)
}

/// 按脚本返回固定输出的推理后端
pub struct ScriptedBackend {
  name: String,
  input_shape: [usize; 4],
  output: RawOutput,
  declare_output: bool,
  calls: Arc<AtomicUsize>,
}

impl ScriptedBackend {
  pub fn new(name: &str, width: usize, height: usize, output: RawOutput) -> Self {
    Self {
      name: name.to_string(),
      input_shape: [1, 3, height, width],
      output,
      declare_output: false,
      calls: Arc::new(AtomicUsize::new(0)),
    }
  }

  pub fn declaring_output(mut self) -> Self {
    self.declare_output = true;
    self
  }

  pub fn calls(&self) -> Arc<AtomicUsize> {
    self.calls.clone()
  }
}

impl InferenceBackend for ScriptedBackend {
  fn name(&self) -> &str {
    &self.name
  }

  fn input_name(&self) -> &str {
    "images"
  }

  fn input_shape(&self) -> [usize; 4] {
    self.input_shape
  }

  fn declared_output_shape(&self) -> Option<Vec<usize>> {
    self.declare_output.then(|| self.output.shape.clone())
  }

  fn run(&self, tensor: &NchwTensor) -> Result<RawOutput, InferenceError> {
    if tensor.shape() != self.input_shape {
      return Err(InferenceError::Run(format!(
        "unexpected input shape {:?}",
        tensor.shape()
      )));
    }
    self.calls.fetch_add(1, Ordering::SeqCst);
    Ok(self.output.clone())
  }
}

/// 总是失败的后端
pub struct FailingBackend;

impl InferenceBackend for FailingBackend {
  fn name(&self) -> &str {
    "failing"
  }

  fn input_name(&self) -> &str {
    "images"
  }

  fn input_shape(&self) -> [usize; 4] {
    [1, 3, 640, 640]
  }

  fn run(&self, _tensor: &NchwTensor) -> Result<RawOutput, InferenceError> {
    Err(InferenceError::Run("device lost".to_string()))
  }
}

pub fn png_bytes(width: u32, height: u32, color: Rgb<u8>) -> Vec<u8> {
  let mut bytes = Vec::new();
  RgbImage::from_pixel(width, height, color)
    .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
    .unwrap();
  bytes
}
