//! `wiring_contract` 集成测试：验证静态接线与运行期接线池的登记契约。
//!
//! # 测试目标（Why）
//! - 边表是扇出的权威数据，重复接线、容量上界、回滚语义任何一处回归都会
//!   直接放大为重复投递或泄漏；
//! - 通过外部 crate 视角（integration test）模拟用户接线序列，避免依赖内部
//!   实现细节。
//!
//! # 结构安排（How）
//! - 重复接线、混合（静态 + 运行期）重复、转移型源容量约束各一条用例；
//! - 池槽位耗尽与释放重试覆盖固定容量语义；
//! - 随机接线/拆线序列的集合等价性由 proptest 驱动。

use proptest::prelude::*;
use weave_core::{ConnectionPool, Packet, Sink, Source, WeaveError};

fn noop_sink(name: &'static str) -> Sink {
    Sink::immediate(name, |_packet: &Packet| {})
}

/// 同一 `(源, 汇)` 的第二次静态接线被拒绝，边表长度保持为一。
#[test]
fn duplicate_static_attach_is_rejected() {
    let source = Source::new("telemetry");
    let sink = noop_sink("recorder");
    source.attach(&sink).expect("首次接线应当成功");
    let error = source.attach(&sink).expect_err("重复接线必须被拒绝");
    assert!(matches!(error, WeaveError::AlreadyExists { .. }));
    assert_eq!(source.fan_out(), 1, "重复接线不得改变边表");
}

/// 运行期接线池：重复对拒绝、容量耗尽、释放后重试成功。
///
/// # 契约校验（What）
/// - 前两条不同的边占满容量为 2 的池，第三条报 `NoSpace`；
/// - 释放任意一条后重试第三条成功，槽位计数全程与登记状态一致。
#[test]
fn pool_capacity_and_retry() {
    let pool = ConnectionPool::new(2);
    let source = Source::new("telemetry");
    let sinks = [noop_sink("a"), noop_sink("b"), noop_sink("c")];

    pool.connect(&source, &sinks[0]).expect("第一条边应当入池");
    pool.connect(&source, &sinks[1]).expect("第二条边应当入池");
    let error = pool
        .connect(&source, &sinks[2])
        .expect_err("池满必须拒绝第三条边");
    assert!(matches!(error, WeaveError::NoSpace { .. }));
    assert_eq!(pool.in_use(), 2);

    pool.disconnect(&source, &sinks[0])
        .expect("释放第一条边应当成功");
    pool.connect(&source, &sinks[2])
        .expect("释放槽位后重试应当成功");
    assert_eq!(pool.in_use(), 2);
    assert_eq!(source.fan_out(), 2);
}

/// 运行期重复接线返回 `AlreadyExists`，且只留下一条边。
#[test]
fn duplicate_runtime_connect_is_rejected() {
    let pool = ConnectionPool::new(4);
    let source = Source::new("telemetry");
    let sink = noop_sink("recorder");

    pool.connect(&source, &sink).expect("首次入池应当成功");
    let error = pool
        .connect(&source, &sink)
        .expect_err("重复入池必须被拒绝");
    assert!(matches!(error, WeaveError::AlreadyExists { .. }));
    assert_eq!(source.fan_out(), 1);
    assert_eq!(pool.in_use(), 1);
}

/// 静态接线在先时，运行期同对接线被源边表捕获，预留槽位回滚。
#[test]
fn mixed_duplicate_reverts_pool_slot() {
    let pool = ConnectionPool::new(4);
    let source = Source::new("telemetry");
    let sink = noop_sink("recorder");

    source.attach(&sink).expect("静态接线应当成功");
    let error = pool
        .connect(&source, &sink)
        .expect_err("与静态边重复的入池必须被拒绝");
    assert!(matches!(error, WeaveError::AlreadyExists { .. }));
    assert_eq!(pool.in_use(), 0, "失败路径必须回滚预留槽位");
    assert_eq!(source.fan_out(), 1);
}

/// 拆除不存在的边与释放不在池内的边分别报 `NotFound`。
#[test]
fn missing_edges_report_not_found() {
    let pool = ConnectionPool::new(2);
    let source = Source::new("telemetry");
    let sink = noop_sink("recorder");

    assert!(matches!(
        source.detach(&sink),
        Err(WeaveError::NotFound { .. })
    ));
    assert!(matches!(
        pool.disconnect(&source, &sink),
        Err(WeaveError::NotFound { .. })
    ));
}

/// 转移型源只接受一条出边，第二条在登记期报 `NoSpace`。
#[test]
fn transfer_source_is_single_consumer() {
    let source = Source::transfer("frames");
    let first = noop_sink("owner");
    let second = noop_sink("intruder");

    source.attach(&first).expect("唯一下游应当接线成功");
    let error = source
        .attach(&second)
        .expect_err("转移型源必须拒绝第二条边");
    assert!(matches!(error, WeaveError::NoSpace { .. }));
    assert_eq!(source.fan_out(), 1);
}

proptest! {
    /// 任意接线/拆线交错后，可见边集合等于 (connected − disconnected)。
    ///
    /// - **How**：以布尔模型数组跟踪每个端点的期望接线状态，操作序列同时
    ///   作用于模型与真实源；收敛后先比对边数，再逐一拆除期望存在的边，
    ///   最终边表必须清空。
    #[test]
    fn wiring_set_equivalence(ops in proptest::collection::vec((any::<bool>(), 0usize..4), 1..64)) {
        let source = Source::new("prop");
        let sinks: Vec<Sink> = (0..4)
            .map(|index| Sink::immediate(format!("sink-{index}"), |_packet: &Packet| {}))
            .collect();
        let mut model = [false; 4];

        for (connect, index) in ops {
            if connect {
                match source.attach(&sinks[index]) {
                    Ok(()) => prop_assert!(!model[index], "模型认为该边已存在，真实接线却成功"),
                    Err(WeaveError::AlreadyExists { .. }) => prop_assert!(model[index]),
                    Err(other) => prop_assert!(false, "意外错误: {other:?}"),
                }
                model[index] = true;
            } else {
                match source.detach(&sinks[index]) {
                    Ok(()) => prop_assert!(model[index], "模型认为该边不存在，真实拆线却成功"),
                    Err(WeaveError::NotFound { .. }) => prop_assert!(!model[index]),
                    Err(other) => prop_assert!(false, "意外错误: {other:?}"),
                }
                model[index] = false;
            }
        }

        let expected = model.iter().filter(|wired| **wired).count();
        prop_assert_eq!(source.fan_out(), expected);
        for (index, wired) in model.iter().enumerate() {
            if *wired {
                prop_assert!(source.detach(&sinks[index]).is_ok());
            }
        }
        prop_assert_eq!(source.fan_out(), 0);
    }
}
