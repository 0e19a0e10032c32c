// 该文件是 Kanjian （看见） 项目的一部分。
// src/bin/simple_batch.rs - 目录批量检测
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

use anyhow::Result;
use clap::Parser;
use url::Url;

use kanjian::{
  FromUrl,
  args::DetectArgs,
  input::ImageFileInput,
  output::OutputWrapper,
  task::{BatchTask, Task},
};
use tracing::info;

/// 检测目录中的所有图像，Ctrl-C 中断
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// ONNX 模型路径
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入目录，例如 image:///data/images
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径，image:///out/ 或 folder:///records?record&always
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  /// 最多处理的图像数量
  #[arg(long, value_name = "COUNT")]
  pub limit: Option<usize>,
  #[command(flatten)]
  pub detect: DetectArgs,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型文件路径: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let input = ImageFileInput::from_url(&args.input)?;
  info!("待处理图像: {} 张", input.remaining());
  let detector = args.detect.build_detector(&args.model)?;
  let output = OutputWrapper::from_url(&args.output)?;

  BatchTask::default()
    .with_limit(args.limit)
    .install_ctrlc()?
    .run_task(input, detector, output)?;

  Ok(())
}
