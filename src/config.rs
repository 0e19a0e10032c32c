// 该文件是 Kanjian （看见） 项目的一部分。
// src/config.rs - 检测参数快照
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

use image::Rgb;
use thiserror::Error;

use crate::{frame::ChannelOrder, output::draw::ColorStrategy};

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.25;
pub const DEFAULT_NMS_THRESHOLD: f32 = 0.45;
pub const DEFAULT_INPUT_WIDTH: u32 = 640;
pub const DEFAULT_INPUT_HEIGHT: u32 = 640;
pub const DEFAULT_LINE_THICKNESS_RATIO: u32 = 200;
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
  #[error("置信度阈值必须位于 [0, 1] 区间: {0}")]
  ConfidenceThreshold(f32),
  #[error("NMS 阈值必须位于 [0, 1] 区间: {0}")]
  NmsThreshold(f32),
  #[error("模型输入尺寸不能为零: {0}x{1}")]
  InputSize(u32, u32),
  #[error("线宽比例不能为零")]
  LineThicknessRatio,
  #[error("JPEG 质量必须位于 [1, 100] 区间: {0}")]
  JpegQuality(u8),
  #[error("类别数量与模型输出不一致: 模型声明 {declared} 个类别, 类别表有 {classes} 个")]
  ClassWidth { declared: usize, classes: usize },
}

/// 单次请求使用的检测参数。
///
/// 每个请求开始时克隆一份，之后沿 letterbox → 解码 → 过滤 → NMS → 绘制
/// 全程只读传递，模型重载不会影响进行中的请求。
#[derive(Debug, Clone, PartialEq)]
pub struct DetectConfig {
  /// 置信度阈值
  pub confidence_threshold: f32,
  /// NMS IoU 阈值
  pub nms_threshold: f32,
  /// 模型输入宽度
  pub input_width: u32,
  /// 模型输入高度
  pub input_height: u32,
  /// 线宽 = max(1, min(w, h) / line_thickness_ratio)
  pub line_thickness_ratio: u32,
  /// 输入张量的通道顺序，必须与模型一致
  pub channel_order: ChannelOrder,
  /// 类别颜色策略
  pub color_strategy: ColorStrategy,
  /// letterbox 填充颜色
  pub fill: Rgb<u8>,
  /// 输出 JPEG 质量
  pub jpeg_quality: u8,
  /// NMS 后最多保留的检测数量
  pub max_detections: Option<usize>,
}

impl Default for DetectConfig {
  fn default() -> Self {
    Self {
      confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
      nms_threshold: DEFAULT_NMS_THRESHOLD,
      input_width: DEFAULT_INPUT_WIDTH,
      input_height: DEFAULT_INPUT_HEIGHT,
      line_thickness_ratio: DEFAULT_LINE_THICKNESS_RATIO,
      channel_order: ChannelOrder::default(),
      color_strategy: ColorStrategy::default(),
      fill: Rgb([0, 0, 0]),
      jpeg_quality: DEFAULT_JPEG_QUALITY,
      max_detections: None,
    }
  }
}

impl DetectConfig {
  pub fn validate(&self) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&self.confidence_threshold) {
      return Err(ConfigError::ConfidenceThreshold(self.confidence_threshold));
    }
    if !(0.0..=1.0).contains(&self.nms_threshold) {
      return Err(ConfigError::NmsThreshold(self.nms_threshold));
    }
    if self.input_width == 0 || self.input_height == 0 {
      return Err(ConfigError::InputSize(self.input_width, self.input_height));
    }
    if self.line_thickness_ratio == 0 {
      return Err(ConfigError::LineThicknessRatio);
    }
    if !(1..=100).contains(&self.jpeg_quality) {
      return Err(ConfigError::JpegQuality(self.jpeg_quality));
    }
    Ok(())
  }

  pub fn with_thresholds(mut self, confidence: f32, nms: f32) -> Self {
    self.confidence_threshold = confidence;
    self.nms_threshold = nms;
    self
  }

  pub fn with_input_size(mut self, width: u32, height: u32) -> Self {
    self.input_width = width;
    self.input_height = height;
    self
  }
}
