//! 等待语义模块：统一描述阻塞操作的限期。
//!
//! # 教案式说明
//! - **Why**：发射、排队、方法调用与事件处理都可能阻塞，必须用同一套
//!   "不等 / 永等 / 限时等" 语义约束它们，避免各调用点散落地解释 `Duration`；
//! - **What**：[`Wait`] 是跨模块共享的等待域；`deadline` 将限期折算为单调时钟
//!   上的绝对截止点，供条件变量循环复用；
//! - **How**：内部基于 `std::time::Instant`（宿主提供的单调时钟），不依赖壁钟，
//!   因此对系统时间回拨免疫。

use std::time::{Duration, Instant};

/// 阻塞操作的等待策略。
///
/// # 契约说明（What）
/// - [`Wait::NoWait`]：尝试一次，资格不可得立即失败；
/// - [`Wait::Forever`]：无限期阻塞，直到资格可得；
/// - [`Wait::Timeout`]：最多阻塞给定时长，到期仍不可得则失败；
/// - 限期按"单次操作"计：发射中的每条边、事件处理中的每条记录、方法调用的
///   入队与完成等待各自独立消费同一限期值。
///
/// # 风险提示（Trade-offs）
/// - 基座不提供全局取消令牌；要停掉一个处理线程，应停止发射并让
///   `process` 按限期返回。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Wait {
    /// 尝试一次，不阻塞。
    NoWait,
    /// 无限期阻塞。
    Forever,
    /// 最多阻塞给定时长。
    Timeout(Duration),
}

impl Wait {
    /// 是否为"不等待"策略。
    pub fn is_no_wait(&self) -> bool {
        matches!(self, Wait::NoWait)
    }

    /// 以 `now` 为起点折算绝对截止点。
    ///
    /// - `NoWait` 与 `Forever` 返回 `None`，由调用方分别走"立即失败"与
    ///   "无限等待"分支；
    /// - `Timeout` 使用饱和加法，极大时长不会回绕。
    pub fn deadline(&self, now: Instant) -> Option<Instant> {
        match self {
            Wait::NoWait | Wait::Forever => None,
            Wait::Timeout(duration) => Some(saturating_after(now, *duration)),
        }
    }
}

/// `now + duration` 的饱和版本：`Instant` 上限溢出退化为一个极远的截止点。
pub(crate) fn saturating_after(now: Instant, duration: Duration) -> Instant {
    now.checked_add(duration)
        .unwrap_or_else(|| now + Duration::from_secs(u32::MAX as u64))
}
