// 该文件是 Kanjian （看见） 项目的一部分。
// src/task.rs - 任务驱动
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

use std::{
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
  thread,
  time::{Duration, Instant},
};
use tracing::{error, info, warn};

use crate::{model::Model, output::Render};

/// 计算平均耗时时跳过的预热次数
const WARMUP_RUNS: usize = 2;
const FORCE_EXIT_AFTER: Duration = Duration::from_secs(30);

pub trait Task<I, M, O>: Sized {
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error>;
}

/// 只处理第一张输入
pub struct OneShotTask;

impl<
  F,
  D,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  M: Model<Input = F, Output = D, Error = ME>,
  O: Render<F, D, Error = RE>,
> Task<I, M, O> for OneShotTask
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入图像"))?;
    info!("输入图像获取成功，开始推理...");
    let now = Instant::now();
    let result = model.infer(&frame)?;
    info!("推理完成，耗时: {:.2?}", now.elapsed());
    output.render_result(&frame, &result)?;
    info!("输出完成，耗时: {:.2?}", now.elapsed());

    Ok(())
  }
}

/// 对同一张输入重复推理，用于测速
pub struct RepeatShotTask {
  times: usize,
}

impl RepeatShotTask {
  pub fn new(times: usize) -> Self {
    Self {
      times: times.max(1),
    }
  }
}

impl Default for RepeatShotTask {
  fn default() -> Self {
    Self::new(1000)
  }
}

/// 跳过预热次数后的平均耗时；次数不足时使用全部样本
pub fn average_after_warmup(times: &[Duration]) -> Option<Duration> {
  let samples = if times.len() > WARMUP_RUNS {
    &times[WARMUP_RUNS..]
  } else {
    times
  };
  if samples.is_empty() {
    return None;
  }
  Some(samples.iter().sum::<Duration>() / samples.len() as u32)
}

impl<
  F,
  D,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  M: Model<Input = F, Output = D, Error = ME>,
  O: Render<F, D, Error = RE>,
> Task<I, M, O> for RepeatShotTask
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入图像"))?;
    info!("输入图像获取成功，开始推理...");
    let mut times = Vec::with_capacity(self.times);
    let mut last = None;
    for i in 0..self.times {
      let now = Instant::now();
      let result = model.infer(&frame)?;
      let elapsed = now.elapsed();
      info!("({})推理完成，耗时: {:.2?}", i, elapsed);
      times.push(elapsed);
      last = Some(result);
    }

    if let Some(result) = last {
      output.render_result(&frame, &result)?;
    }
    if let Some(average) = average_after_warmup(&times) {
      warn!("平均推理时间: {:.2?}", average);
    }

    Ok(())
  }
}

/// 处理所有输入，单张失败只记录不中断；收到 Ctrl-C 后在当前图像结束时退出
#[derive(Default, Debug)]
pub struct BatchTask {
  limit: Option<usize>,
  stop: Arc<AtomicBool>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
  pub processed: usize,
  pub failed: usize,
}

impl BatchTask {
  pub fn with_limit(mut self, limit: Option<usize>) -> Self {
    self.limit = limit;
    self
  }

  /// 外部停止标志，置位后任务在处理完当前图像后退出
  pub fn stop_flag(&self) -> Arc<AtomicBool> {
    self.stop.clone()
  }

  /// 安装 Ctrl-C 处理器；收到信号 30 秒后仍未退出则强制结束进程
  pub fn install_ctrlc(self) -> Result<Self, ctrlc::Error> {
    let stop = self.stop.clone();
    ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      stop.store(true, Ordering::SeqCst);
      thread::spawn(|| {
        thread::sleep(FORCE_EXIT_AFTER);
        warn!("强制退出程序");
        std::process::exit(1);
      });
    })?;
    Ok(self)
  }

  pub fn run_batch<F, D, ME, RE, I, M, O>(&self, input: I, model: &M, output: &O) -> BatchReport
  where
    ME: std::error::Error,
    RE: std::error::Error,
    I: Iterator<Item = F>,
    M: Model<Input = F, Output = D, Error = ME>,
    O: Render<F, D, Error = RE>,
  {
    let mut report = BatchReport::default();
    let mut now = Instant::now();
    for frame in input {
      if self.stop.load(Ordering::SeqCst) {
        warn!("中断信号接收，退出任务循环");
        break;
      }
      if self.limit.is_some_and(|n| report.processed + report.failed >= n) {
        info!("达到指定数量 {}, 退出任务循环", report.processed + report.failed);
        break;
      }

      let index = report.processed + report.failed + 1;
      info!("处理第 {} 张图像", index);
      let outcome = model
        .infer(&frame)
        .map_err(|e| e.to_string())
        .and_then(|result| {
          output
            .render_result(&frame, &result)
            .map_err(|e| e.to_string())
        });
      match outcome {
        Ok(()) => report.processed += 1,
        Err(e) => {
          error!("第 {} 张图像处理失败: {}", index, e);
          report.failed += 1;
        }
      }
      info!("耗时: {:.2?}", now.elapsed());
      now = Instant::now();
    }
    report
  }
}

impl<
  F,
  D,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  M: Model<Input = F, Output = D, Error = ME>,
  O: Render<F, D, Error = RE>,
> Task<I, M, O> for BatchTask
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let report = self.run_batch(input, &model, &output);
    info!(
      "任务完成，成功 {} 张，失败 {} 张",
      report.processed, report.failed
    );
    if report.processed == 0 && report.failed > 0 {
      anyhow::bail!("所有图像均处理失败");
    }
    Ok(())
  }
}
