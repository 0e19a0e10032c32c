// 该文件是 Kanjian （看见） 项目的一部分。
// src/bin/model_store.rs - 模型目录管理
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

use anyhow::Result;
use clap::Parser;

use kanjian::model::ModelStore;
use tracing::info;

/// 列出模型目录中的模型与类别文件，并显示选定模型的信息
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型目录
  #[arg(long, value_name = "DIR")]
  pub dir: PathBuf,
  /// 选定的模型文件名（.onnx）
  #[arg(long, value_name = "MODEL", requires = "classes")]
  pub model: Option<String>,
  /// 选定的类别文件名（.names）
  #[arg(long, value_name = "CLASSES", requires = "model")]
  pub classes: Option<String>,
  /// 加载选定模型并检查类别数量是否一致
  #[cfg(feature = "backend-tract")]
  #[arg(long)]
  pub verify: bool,
  /// 解码约定，仅用于 --verify
  #[cfg(feature = "backend-tract")]
  #[arg(long, default_value_t = kanjian::model::DecodeConvention::DirectProbability)]
  pub convention: kanjian::model::DecodeConvention,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();
  let store = ModelStore::open(&args.dir)?;

  println!("可用模型:");
  for name in store.available_models()? {
    println!("  {}", name);
  }
  println!("可用类别文件:");
  for name in store.available_class_files()? {
    println!("  {}", name);
  }

  let (Some(model), Some(classes)) = (&args.model, &args.classes) else {
    return Ok(());
  };

  let pair = store.resolve(model, classes)?;
  print!("{}", pair.info());

  #[cfg(feature = "backend-tract")]
  if args.verify {
    use kanjian::model::{InferenceHandle, TractBackendBuilder};

    let backend = TractBackendBuilder::from_path(&pair.model).build()?;
    let labels = pair.load_labels()?;
    let handle = InferenceHandle::create(Box::new(backend), labels, args.convention)?;
    let session = handle.snapshot()?;
    info!(
      "模型校验通过: {} 输入 {}, 类别 {} 个",
      session.backend().name(),
      session.backend().input_name(),
      session.labels().len()
    );
    handle.shutdown()?;
  }

  info!("完成");
  Ok(())
}
