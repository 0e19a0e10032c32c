// 该文件是 Kanjian （看见） 项目的一部分。
// src/frame.rs - NCHW 张量定义
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

use std::{fmt, str::FromStr};

use image::RgbImage;
use thiserror::Error;

const RGB_CHANNELS: usize = 3;

/// 张量的通道顺序。
///
/// 必须与加载的模型一致；顺序错误不会报错，只会让精度下降。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelOrder {
  #[default]
  Rgb,
  Bgr,
}

impl ChannelOrder {
  /// 张量第 `plane` 个通道对应的像素分量下标
  fn source_channel(self, plane: usize) -> usize {
    match self {
      ChannelOrder::Rgb => plane,
      ChannelOrder::Bgr => RGB_CHANNELS - 1 - plane,
    }
  }
}

impl FromStr for ChannelOrder {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "rgb" => Ok(ChannelOrder::Rgb),
      "bgr" => Ok(ChannelOrder::Bgr),
      other => Err(format!("未知的通道顺序: {}", other)),
    }
  }
}

impl fmt::Display for ChannelOrder {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ChannelOrder::Rgb => write!(f, "rgb"),
      ChannelOrder::Bgr => write!(f, "bgr"),
    }
  }
}

#[derive(Error, Debug, PartialEq)]
pub enum TensorError {
  #[error("数据长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
  LengthMismatch { expected: usize, actual: usize },
}

/// `[1, C, H, W]` 的归一化浮点张量
#[derive(Debug, Clone, PartialEq)]
pub struct NchwTensor {
  channels: usize,
  height: usize,
  width: usize,
  data: Box<[f32]>,
}

impl NchwTensor {
  pub fn new(
    channels: usize,
    height: usize,
    width: usize,
    data: Vec<f32>,
  ) -> Result<Self, TensorError> {
    let expected = channels * height * width;
    if data.len() != expected {
      return Err(TensorError::LengthMismatch {
        expected,
        actual: data.len(),
      });
    }

    Ok(Self {
      channels,
      height,
      width,
      data: data.into_boxed_slice(),
    })
  }

  /// 将交错排列的 RGB 图像转为平面排列，并除以 255 归一化
  pub fn from_rgb(image: &RgbImage, order: ChannelOrder) -> Self {
    let (width, height) = image.dimensions();
    let (width, height) = (width as usize, height as usize);
    let plane_size = width * height;
    let mut data = vec![0f32; RGB_CHANNELS * plane_size];

    for (x, y, pixel) in image.enumerate_pixels() {
      let idx = (y as usize) * width + (x as usize);
      for c in 0..RGB_CHANNELS {
        data[c * plane_size + idx] = pixel[order.source_channel(c)] as f32 / 255.0;
      }
    }

    Self {
      channels: RGB_CHANNELS,
      height,
      width,
      data: data.into_boxed_slice(),
    }
  }

  pub fn shape(&self) -> [usize; 4] {
    [1, self.channels, self.height, self.width]
  }

  pub fn channels(&self) -> usize {
    self.channels
  }

  pub fn height(&self) -> usize {
    self.height
  }

  pub fn width(&self) -> usize {
    self.width
  }

  pub fn as_slice(&self) -> &[f32] {
    &self.data
  }
}
