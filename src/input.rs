// 该文件是 Kanjian （看见） 项目的一部分。
// src/input.rs - 图像输入
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

use std::path::Path;

use image::RgbImage;
use thiserror::Error;

#[cfg(feature = "read_image_file")]
mod read_image_file;
#[cfg(feature = "read_image_file")]
pub use self::read_image_file::{ImageFileInput, ImageFileInputError};

/// 一张尚未解码的图像：来源名称与原始字节（JPEG/PNG）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
  pub name: String,
  pub bytes: Vec<u8>,
}

impl EncodedImage {
  pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
    Self {
      name: name.into(),
      bytes,
    }
  }

  /// 去掉目录与扩展名的名称，用于生成输出文件名
  pub fn stem(&self) -> &str {
    Path::new(&self.name)
      .file_stem()
      .and_then(|stem| stem.to_str())
      .unwrap_or("image")
  }
}

#[derive(Error, Debug)]
pub enum ImageDecodeError {
  #[error("图像解码失败: {0}")]
  Decode(#[from] image::ImageError),
  #[error("图像尺寸为零: {0}x{1}")]
  EmptyImage(u32, u32),
}

/// 将 JPEG/PNG 字节解码为 RGB 图像；宽或高为零时报错
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, ImageDecodeError> {
  let image = image::load_from_memory(bytes)?.to_rgb8();
  let (width, height) = image.dimensions();
  if width == 0 || height == 0 {
    return Err(ImageDecodeError::EmptyImage(width, height));
  }
  Ok(image)
}
