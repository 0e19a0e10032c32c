// 该文件是 Kanjian （看见） 项目的一部分。
// src/preprocess.rs - letterbox 预处理与坐标反映射
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

use image::{Rgb, RgbImage, imageops::FilterType};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, PartialEq)]
pub enum PreprocessError {
  #[error("图像尺寸无效: {0}x{1}")]
  EmptyImage(u32, u32),
  #[error("目标画布尺寸无效: {0}x{1}")]
  EmptyCanvas(u32, u32),
}

/// letterbox 的逆映射参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxParams {
  /// 两个轴共用的缩放比例
  pub ratio: f32,
  /// 左侧填充
  pub pad_x: f32,
  /// 顶部填充
  pub pad_y: f32,
  pub source_width: u32,
  pub source_height: u32,
  pub target_width: u32,
  pub target_height: u32,
}

impl LetterboxParams {
  /// 计算把 `source` 放入 `target` 画布所需的缩放与填充
  pub fn compute(
    source_width: u32,
    source_height: u32,
    target_width: u32,
    target_height: u32,
  ) -> Result<Self, PreprocessError> {
    if source_width == 0 || source_height == 0 {
      return Err(PreprocessError::EmptyImage(source_width, source_height));
    }
    if target_width == 0 || target_height == 0 {
      return Err(PreprocessError::EmptyCanvas(target_width, target_height));
    }

    let ratio = (target_width as f32 / source_width as f32)
      .min(target_height as f32 / source_height as f32);
    let (new_width, new_height) = scaled_size(
      source_width,
      source_height,
      ratio,
      target_width,
      target_height,
    );

    // 奇数像素的余量放在右侧/底部
    let pad_x = ((target_width - new_width) / 2) as f32;
    let pad_y = ((target_height - new_height) / 2) as f32;

    Ok(Self {
      ratio,
      pad_x,
      pad_y,
      source_width,
      source_height,
      target_width,
      target_height,
    })
  }

  pub fn scaled_size(&self) -> (u32, u32) {
    scaled_size(
      self.source_width,
      self.source_height,
      self.ratio,
      self.target_width,
      self.target_height,
    )
  }

  /// 原图坐标 → 模型输入坐标
  pub fn map_point(&self, x: f32, y: f32) -> (f32, f32) {
    (x * self.ratio + self.pad_x, y * self.ratio + self.pad_y)
  }

  /// 模型输入坐标 → 原图坐标（不截断）
  pub fn unmap_point(&self, x: f32, y: f32) -> (f32, f32) {
    ((x - self.pad_x) / self.ratio, (y - self.pad_y) / self.ratio)
  }

  /// 将模型空间的 `[x0, y0, x1, y1]` 映射回原图，并截断到 `[0, dim - 1]`
  pub fn unmap_box(&self, bbox: [f32; 4]) -> [f32; 4] {
    let max_x = self.source_width.saturating_sub(1) as f32;
    let max_y = self.source_height.saturating_sub(1) as f32;
    let (x0, y0) = self.unmap_point(bbox[0], bbox[1]);
    let (x1, y1) = self.unmap_point(bbox[2], bbox[3]);
    [
      x0.clamp(0.0, max_x),
      y0.clamp(0.0, max_y),
      x1.clamp(0.0, max_x),
      y1.clamp(0.0, max_y),
    ]
  }
}

fn scaled_size(
  source_width: u32,
  source_height: u32,
  ratio: f32,
  target_width: u32,
  target_height: u32,
) -> (u32, u32) {
  let new_width = ((source_width as f32 * ratio).round() as u32).clamp(1, target_width);
  let new_height = ((source_height as f32 * ratio).round() as u32).clamp(1, target_height);
  (new_width, new_height)
}

/// letterbox 结果：填充后的画布和逆映射参数
#[derive(Debug, Clone)]
pub struct Letterbox {
  pub image: RgbImage,
  pub params: LetterboxParams,
}

/// 保持宽高比缩放到 `target_width x target_height`，居中放置并用 `fill` 填充四周
pub fn letterbox(
  image: &RgbImage,
  target_width: u32,
  target_height: u32,
  fill: Rgb<u8>,
) -> Result<Letterbox, PreprocessError> {
  let (source_width, source_height) = image.dimensions();
  let params = LetterboxParams::compute(source_width, source_height, target_width, target_height)?;
  let (new_width, new_height) = params.scaled_size();

  debug!(
    "letterbox: {}x{} -> {}x{}, 缩放比例 {:.4}, 填充 ({}, {})",
    source_width, source_height, new_width, new_height, params.ratio, params.pad_x, params.pad_y
  );

  let mut canvas = RgbImage::from_pixel(target_width, target_height, fill);
  if (new_width, new_height) == (source_width, source_height) {
    image::imageops::replace(&mut canvas, image, params.pad_x as i64, params.pad_y as i64);
  } else {
    let resized = image::imageops::resize(image, new_width, new_height, FilterType::Triangle);
    image::imageops::replace(&mut canvas, &resized, params.pad_x as i64, params.pad_y as i64);
  }

  Ok(Letterbox {
    image: canvas,
    params,
  })
}
