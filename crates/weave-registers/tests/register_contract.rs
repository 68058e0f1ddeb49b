//! `register_contract` 集成测试：验证寄存器表对观察量的映射契约。
//!
//! # 测试目标（Why）
//! - 寄存器视角是设置面的外部接口，只读拦截与校验透传任何一处失守都会
//!   绕过设置项的约束；
//! - 偏移编址（对齐、越界）是宿主总线语义的边界条件。
//!
//! # 结构安排（How）
//! - 读写往返验证写路径确实借道观察量（订阅者可见变更）；
//! - 只读、未对齐、越界、不可表示字值各一条失败用例。

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use weave_core::{Observable, WeaveError};
use weave_registers::{Register, RegisterAccess, RegisterBank, RegisterError, REGISTER_STRIDE};

fn sample_bank() -> (RegisterBank, Observable<u32>, Observable<bool>) {
    let rate = Observable::builder("rate", 100u32)
        .validator(|value: &u32| {
            if *value == 0 {
                return Err(WeaveError::invalid_argument("rate must be positive"));
            }
            Ok(())
        })
        .build();
    let enabled = Observable::new("enabled", false);
    let firmware = Observable::new("firmware", 0x0102_0304u32);
    let bank = RegisterBank::new(vec![
        Register::bind("rate", RegisterAccess::ReadWrite, &rate),
        Register::bind("enabled", RegisterAccess::ReadWrite, &enabled),
        Register::bind("firmware", RegisterAccess::ReadOnly, &firmware),
    ]);
    (bank, rate, enabled)
}

/// 写路径借道观察量：订阅者看到变更，读回新值。
#[test]
fn write_flows_through_observable() {
    let (bank, rate, _enabled) = sample_bank();
    let notified = Arc::new(AtomicU32::new(0));
    let notified_in_watcher = Arc::clone(&notified);
    let watcher = Observable::<u32>::watcher("audit", move |value| {
        notified_in_watcher.store(*value, Ordering::SeqCst);
    });
    rate.subscribe(&watcher).expect("订阅应当成功");

    bank.write(0, 250).expect("写可读写寄存器应当成功");
    assert_eq!(bank.read(0).expect("读回"), 250);
    assert_eq!(rate.get(), 250);
    assert_eq!(notified.load(Ordering::SeqCst), 250, "订阅者应看到寄存器写入");
}

/// 校验器的拒绝经寄存器层原样透传，存储不动。
#[test]
fn validator_rejection_passes_through() {
    let (bank, rate, _enabled) = sample_bank();
    let error = bank.write(0, 0).expect_err("零速率必须被拒绝");
    assert!(matches!(
        error,
        RegisterError::Rejected(WeaveError::InvalidArgument { .. })
    ));
    assert_eq!(rate.get(), 100);
}

/// 只读寄存器拒写，读取照常。
#[test]
fn read_only_registers_reject_writes() {
    let (bank, _rate, _enabled) = sample_bank();
    let offset = bank.offset_of("firmware").expect("固件寄存器应当存在");
    assert_eq!(bank.read(offset).expect("读固件版本"), 0x0102_0304);
    assert!(matches!(
        bank.write(offset, 1),
        Err(RegisterError::ReadOnly { .. })
    ));
}

/// 偏移编址的边界：未对齐与越界分别报错。
#[test]
fn offset_addressing_boundaries() {
    let (bank, _rate, _enabled) = sample_bank();
    assert!(matches!(
        bank.read(1),
        Err(RegisterError::MisalignedOffset { .. })
    ));
    assert!(matches!(
        bank.read(3 * REGISTER_STRIDE),
        Err(RegisterError::UnknownOffset { .. })
    ));
    assert!(matches!(
        bank.read_named("missing"),
        Err(RegisterError::UnknownName { .. })
    ));
}

/// 布尔寄存器只接受 0 / 1 字值。
#[test]
fn unrepresentable_words_are_rejected() {
    let (bank, _rate, enabled) = sample_bank();
    let offset = bank.offset_of("enabled").expect("使能寄存器应当存在");
    bank.write(offset, 1).expect("1 应当可表示为 true");
    assert!(enabled.get());
    assert!(matches!(
        bank.write(offset, 2),
        Err(RegisterError::Unrepresentable { .. })
    ));
    assert!(enabled.get(), "拒绝路径不得改写存储");
}
