// 该文件是 Kanjian （看见） 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
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

use ab_glyph::{FontRef, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size},
  rect::Rect,
};
use thiserror::Error;

use crate::model::{DetectResult, Detection};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 20.0;
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
const LABEL_TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
/// 标签放在框上方时距画布顶部的最小距离
const LABEL_MIN_TOP: i32 = 10;

const PALETTE: [u32; 30] = [
  0xFF0000, 0x00FF00, 0x0000FF, 0xFFFF00, 0x00FFFF, 0xFF00FF, 0xFFA500, 0xFFC0CB, 0x800080,
  0x008000, 0x808000, 0x008080, 0x800000, 0x000080, 0xC0C0C0, 0x808080, 0xFFD700, 0xFF6347,
  0x4682B4, 0x90EE90, 0xFF7F50, 0xDDA0DD, 0x98FB98, 0xF08080, 0x20B2AA, 0xFFB6C1, 0x87CEFA,
  0x9370DB, 0x3CB371, 0x7B68EE,
];

#[derive(Error, Debug)]
pub enum DrawError {
  #[error("字体加载失败: {0}")]
  Font(String),
}

/// 类别颜色的分配方式，两者都只依赖类别 id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorStrategy {
  /// `k = id + 1`，`(k*37 % 255, k*57 % 255, k*79 % 255)`
  #[default]
  ClassHash,
  /// 循环使用固定的 30 色调色板
  Palette,
}

impl ColorStrategy {
  pub fn color(self, class_id: u32) -> Rgb<u8> {
    match self {
      ColorStrategy::ClassHash => {
        let k = class_id as u64 + 1;
        Rgb([
          (k * 37 % 255) as u8,
          (k * 57 % 255) as u8,
          (k * 79 % 255) as u8,
        ])
      }
      ColorStrategy::Palette => {
        let hex = PALETTE[class_id as usize % PALETTE.len()];
        Rgb([(hex >> 16) as u8, (hex >> 8) as u8, hex as u8])
      }
    }
  }
}

impl FromStr for ColorStrategy {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "hash" | "class-hash" => Ok(ColorStrategy::ClassHash),
      "palette" => Ok(ColorStrategy::Palette),
      other => Err(format!("未知的颜色策略: {}", other)),
    }
  }
}

impl fmt::Display for ColorStrategy {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ColorStrategy::ClassHash => write!(f, "class-hash"),
      ColorStrategy::Palette => write!(f, "palette"),
    }
  }
}

/// 线宽 = max(1, min(w, h) / ratio)
pub fn line_thickness(width: u32, height: u32, ratio: u32) -> u32 {
  (width.min(height) / ratio.max(1)).max(1)
}

/// 标签背景的左上角。默认贴在框的上方；
/// 若上方距画布顶部不足 [`LABEL_MIN_TOP`]，则放到框上边沿的下方。
pub fn label_anchor(x0: i32, y0: i32, label_height: i32) -> (i32, i32) {
  let above = y0 - label_height;
  if above < LABEL_MIN_TOP {
    (x0, y0)
  } else {
    (x0, above)
  }
}

/// 可直接绘制的检测框，坐标为像素整数
#[derive(Debug, Clone, PartialEq)]
pub struct BoundingBox {
  pub x0: i32,
  pub y0: i32,
  pub x1: i32,
  pub y1: i32,
  pub score: f32,
  pub class_id: u32,
  pub label: String,
  pub color: Rgb<u8>,
}

impl BoundingBox {
  pub fn from_detection(detection: &Detection, strategy: ColorStrategy) -> Self {
    let [x0, y0, x1, y1] = detection.bbox;
    Self {
      x0: x0.floor() as i32,
      y0: y0.floor() as i32,
      x1: x1.ceil() as i32,
      y1: y1.ceil() as i32,
      score: detection.score,
      class_id: detection.class_id,
      label: format!("{} {:.2}", detection.class_name, detection.score),
      color: strategy.color(detection.class_id),
    }
  }
}

pub struct Draw<'a> {
  font: FontRef<'a>,
  font_size: f32,
  line_thickness_ratio: u32,
  color_strategy: ColorStrategy,
}

impl<'a> Draw<'a> {
  pub fn new(line_thickness_ratio: u32, color_strategy: ColorStrategy) -> Result<Self, DrawError> {
    let font_data = include_bytes!("../../assets/DejaVuSans.ttf");
    let font = FontRef::try_from_slice(font_data).map_err(|e| DrawError::Font(e.to_string()))?;

    Ok(Self {
      font,
      font_size: LABEL_FONT_SIZE,
      line_thickness_ratio,
      color_strategy,
    })
  }

  pub fn with_font_size(mut self, font_size: f32) -> Self {
    self.font_size = font_size;
    self
  }

  pub fn color_strategy(&self) -> ColorStrategy {
    self.color_strategy
  }

  fn draw_box(&self, image: &mut RgbImage, bbox: &BoundingBox, thickness: u32) {
    let (w, h) = (image.width() as i32, image.height() as i32);
    let x0 = bbox.x0.clamp(0, w - 1);
    let y0 = bbox.y0.clamp(0, h - 1);
    let x1 = bbox.x1.clamp(0, w - 1);
    let y1 = bbox.y1.clamp(0, h - 1);

    if x0 >= x1 || y0 >= y1 {
      return;
    }

    // 由外向内逐层绘制
    for t in 0..thickness as i32 {
      let (left, top) = (x0 + t, y0 + t);
      let (right, bottom) = (x1 - t, y1 - t);
      if left >= right || top >= bottom {
        break;
      }
      let rect = Rect::at(left, top).of_size((right - left + 1) as u32, (bottom - top + 1) as u32);
      draw_hollow_rect_mut(image, rect, bbox.color);
    }

    let scale = PxScale::from(self.font_size);
    let (text_w, text_h) = text_size(scale, &self.font, &bbox.label);
    let label_w = text_w as i32 + 2 * LABEL_TEXT_VERTICAL_PADDING;
    let label_h = text_h as i32 + 2 * LABEL_TEXT_VERTICAL_PADDING;

    let (label_x, label_y) = label_anchor(x0, y0, label_h);
    let label_x = label_x.min((w - label_w).max(0));

    // 仅在标签有空间时绘制
    let visible_w = label_w.min(w - label_x);
    let visible_h = label_h.min(h - label_y);
    if visible_w > 0 && visible_h > 0 {
      let rect = Rect::at(label_x, label_y).of_size(visible_w as u32, visible_h as u32);
      draw_filled_rect_mut(image, rect, bbox.color);
      draw_text_mut(
        image,
        LABEL_TEXT_COLOR,
        label_x + LABEL_TEXT_VERTICAL_PADDING,
        label_y + LABEL_TEXT_VERTICAL_PADDING,
        scale,
        &self.font,
        &bbox.label,
      );
    }
  }

  /// 在原图上绘制所有检测框与标签
  pub fn draw_detections(&self, image: &mut RgbImage, result: &DetectResult) {
    if image.width() == 0 || image.height() == 0 {
      return;
    }
    let thickness = line_thickness(image.width(), image.height(), self.line_thickness_ratio);
    for detection in result.items.iter() {
      let bbox = BoundingBox::from_detection(detection, self.color_strategy);
      self.draw_box(image, &bbox, thickness);
    }
  }
}
