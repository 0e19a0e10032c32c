// 该文件是 Kanjian （看见） 项目的一部分。
// src/args.rs - 检测参数配置
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

use clap::Args;
use image::Rgb;

use crate::{
  config::{
    DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_INPUT_HEIGHT, DEFAULT_INPUT_WIDTH,
    DEFAULT_JPEG_QUALITY, DEFAULT_LINE_THICKNESS_RATIO, DEFAULT_NMS_THRESHOLD, DetectConfig,
  },
  frame::ChannelOrder,
  model::{ClassList, DecodeConvention, StoreError},
  output::draw::ColorStrategy,
};

/// 检测参数，供各个可执行文件 `#[command(flatten)]` 使用
#[derive(Args, Debug, Clone)]
pub struct DetectArgs {
  /// 类别文件（.names，每行一个类别）；缺省使用 COCO 80 类
  #[arg(long, value_name = "FILE")]
  pub classes: Option<PathBuf>,

  /// 模型输出的解码约定: direct / sigmoid
  #[arg(long, default_value_t = DecodeConvention::DirectProbability, value_name = "CONVENTION")]
  pub convention: DecodeConvention,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = DEFAULT_CONFIDENCE_THRESHOLD, value_name = "THRESHOLD")]
  pub confidence: f32,

  /// NMS IOU 阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = DEFAULT_NMS_THRESHOLD, value_name = "THRESHOLD")]
  pub nms_threshold: f32,

  /// 模型输入宽度
  #[arg(long, default_value_t = DEFAULT_INPUT_WIDTH, value_name = "PIXELS")]
  pub input_width: u32,

  /// 模型输入高度
  #[arg(long, default_value_t = DEFAULT_INPUT_HEIGHT, value_name = "PIXELS")]
  pub input_height: u32,

  /// 线宽比例，线宽 = max(1, min(w, h) / ratio)
  #[arg(long, default_value_t = DEFAULT_LINE_THICKNESS_RATIO, value_name = "RATIO")]
  pub line_ratio: u32,

  /// 输入张量通道顺序: rgb / bgr
  #[arg(long, default_value_t = ChannelOrder::Rgb, value_name = "ORDER")]
  pub channel_order: ChannelOrder,

  /// 类别颜色策略: class-hash / palette
  #[arg(long, default_value_t = ColorStrategy::ClassHash, value_name = "STRATEGY")]
  pub colors: ColorStrategy,

  /// letterbox 填充灰度值
  #[arg(long, default_value_t = 0, value_name = "VALUE")]
  pub fill: u8,

  /// 输出 JPEG 质量 (1 - 100)
  #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY, value_name = "QUALITY")]
  pub jpeg_quality: u8,

  /// 每张图像最多保留的检测数量
  #[arg(long, value_name = "COUNT")]
  pub max_detections: Option<usize>,
}

impl DetectArgs {
  pub fn to_config(&self) -> DetectConfig {
    DetectConfig {
      confidence_threshold: self.confidence,
      nms_threshold: self.nms_threshold,
      input_width: self.input_width,
      input_height: self.input_height,
      line_thickness_ratio: self.line_ratio,
      channel_order: self.channel_order,
      color_strategy: self.colors,
      fill: Rgb([self.fill; 3]),
      jpeg_quality: self.jpeg_quality,
      max_detections: self.max_detections,
    }
  }

  pub fn load_labels(&self) -> Result<ClassList, StoreError> {
    match &self.classes {
      Some(path) => Ok(ClassList::from_path(path)?),
      None => Ok(ClassList::coco()),
    }
  }

  /// 加载 `onnx://` 模型并组装检测器
  #[cfg(feature = "backend-tract")]
  pub fn build_detector(&self, model: &url::Url) -> anyhow::Result<crate::Detector> {
    use std::sync::Arc;

    use crate::{
      FromUrl,
      model::{InferenceHandle, TractBackendBuilder},
    };

    let backend = TractBackendBuilder::from_url(model)?
      .input_size(self.input_width, self.input_height)
      .build()?;
    let labels = self.load_labels()?;
    let handle = InferenceHandle::create(Box::new(backend), labels, self.convention)?;
    Ok(crate::Detector::new(Arc::new(handle), self.to_config())?)
  }
}
