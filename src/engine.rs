// 该文件是 Lingyan （灵眼） 项目的一部分。
// src/engine.rs - 推理引擎边界
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use crate::tensor::{InputTensor, OutputTensor};

/// 不透明推理引擎。
///
/// 引擎接受固定形状的命名输入张量，返回其声明顺序下的输出张量序列；
/// 流水线不关心引擎内部如何加载或优化模型，只约定这个张量契约。
/// 引擎实例在所有帧调用间共享，但同一时刻至多被调用一次。
pub trait InferenceEngine {
  type Error: std::error::Error + Send + Sync + 'static;

  /// 引擎声明的输入名。可为空，表示仅按位置寻址。
  fn input_names(&self) -> &[String];

  /// 引擎声明的输出名。
  fn output_names(&self) -> &[String];

  /// 执行一次推理。
  fn run(
    &self,
    input_name: &str,
    input: &InputTensor<'_>,
  ) -> Result<Vec<OutputTensor>, Self::Error>;
}

mod stub;
pub use self::stub::{StubEngine, StubEngineError};

#[cfg(feature = "engine_tract")]
mod tract;
#[cfg(feature = "engine_tract")]
pub use self::tract::{TractEngine, TractEngineError};
