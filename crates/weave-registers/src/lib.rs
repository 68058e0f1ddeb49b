//! `weave-registers` 把观察量映射为字寻址的设置寄存器表。
//!
//! # 模块定位（Why）
//! - 面向寄存器语义的宿主（调试探针、内存映射设置面）期望以"偏移 + 读写
//!   属性"访问设置项，而设置项本体是 `weave-core` 的观察量；本 crate 充当
//!   两种视角之间的薄适配层，不另存任何状态；
//! - 写路径完整借道 [`Observable::set`]：校验器照常把关，订阅者照常收到
//!   变更通知，寄存器视角不开任何后门。
//!
//! # 设计概要（How）
//! - [`RegisterValue`] 约束可映射为 32 位寄存器字的值类型；
//! - [`Register::bind`] 把一个观察量固化为只读或可读写的寄存器；
//! - [`RegisterBank`] 按声明顺序编址（步长 4 字节），提供按偏移与按名两套
//!   访问入口。

use std::borrow::Cow;
use std::fmt;

use thiserror::Error;
use weave_core::{Observable, WeaveError};

/// 寄存器间距：每个寄存器占一个 32 位字。
pub const REGISTER_STRIDE: usize = 4;

/// 寄存器访问层的错误域。
///
/// # 教案式说明
/// - **意图 (Why)**：偏移寻址引入了织网基座之外的失败形态（未对齐、越界、
///   只读拒写、字值不可表示），集中归档便于宿主侧统一映射回其总线语义；
/// - **契约 (What)**：观察量校验器的拒绝经 [`RegisterError::Rejected`] 原样
///   透传，寄存器层不改写业务错误。
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum RegisterError {
    /// 偏移未按 [`REGISTER_STRIDE`] 对齐。
    #[error("offset {offset:#x} is not word-aligned")]
    MisalignedOffset { offset: usize },

    /// 偏移超出寄存器表范围。
    #[error("offset {offset:#x} is out of range")]
    UnknownOffset { offset: usize },

    /// 按名访问未命中。
    #[error("register `{name}` is not defined")]
    UnknownName { name: String },

    /// 对只读寄存器写入。
    #[error("register `{name}` is read-only")]
    ReadOnly { name: String },

    /// 字值无法表示为寄存器绑定的值类型。
    #[error("word {word:#x} is not representable by register `{name}`")]
    Unrepresentable { name: String, word: u32 },

    /// 观察量侧拒绝（校验器或分发失败），原样透传。
    #[error(transparent)]
    Rejected(#[from] WeaveError),
}

/// 可映射为 32 位寄存器字的值类型。
pub trait RegisterValue: Copy + Send + Sync + 'static {
    /// 编码为寄存器字。
    fn to_word(self) -> u32;

    /// 从寄存器字解码；不可表示的字值返回 `None`，由寄存器层补全上下文。
    fn from_word(word: u32) -> Option<Self>;
}

impl RegisterValue for u32 {
    fn to_word(self) -> u32 {
        self
    }

    fn from_word(word: u32) -> Option<Self> {
        Some(word)
    }
}

impl RegisterValue for u16 {
    fn to_word(self) -> u32 {
        u32::from(self)
    }

    fn from_word(word: u32) -> Option<Self> {
        u16::try_from(word).ok()
    }
}

impl RegisterValue for u8 {
    fn to_word(self) -> u32 {
        u32::from(self)
    }

    fn from_word(word: u32) -> Option<Self> {
        u8::try_from(word).ok()
    }
}

impl RegisterValue for i32 {
    fn to_word(self) -> u32 {
        self as u32
    }

    fn from_word(word: u32) -> Option<Self> {
        Some(word as i32)
    }
}

impl RegisterValue for bool {
    fn to_word(self) -> u32 {
        u32::from(self)
    }

    fn from_word(word: u32) -> Option<Self> {
        match word {
            0 => Some(false),
            1 => Some(true),
            _ => None,
        }
    }
}

/// 寄存器的读写属性。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegisterAccess {
    /// 仅可读。
    ReadOnly,
    /// 可读可写。
    ReadWrite,
}

type ReadFn = dyn Fn() -> u32 + Send + Sync;
type WriteFn = dyn Fn(u32) -> Result<(), RegisterError> + Send + Sync;

/// 绑定到一个观察量的单个寄存器。
pub struct Register {
    name: Cow<'static, str>,
    access: RegisterAccess,
    read: Box<ReadFn>,
    write: Box<WriteFn>,
}

impl Register {
    /// 把观察量固化为寄存器。
    ///
    /// # 契约说明
    /// - 读取走 [`Observable::get`]，返回当前值的字编码；
    /// - 写入走 [`Observable::set`]：校验器与订阅分发全部生效；
    /// - 只读属性在寄存器层拦截，观察量本体不感知访问属性。
    pub fn bind<T: RegisterValue>(
        name: impl Into<Cow<'static, str>>,
        access: RegisterAccess,
        observable: &Observable<T>,
    ) -> Self {
        let name = name.into();
        let read_view = observable.clone();
        let write_view = observable.clone();
        let write_name = name.clone();
        Self {
            name,
            access,
            read: Box::new(move || read_view.get().to_word()),
            write: Box::new(move |word| {
                let Some(value) = T::from_word(word) else {
                    return Err(RegisterError::Unrepresentable {
                        name: write_name.to_string(),
                        word,
                    });
                };
                write_view.set(value)?;
                Ok(())
            }),
        }
    }

    /// 寄存器名。
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 访问属性。
    pub fn access(&self) -> RegisterAccess {
        self.access
    }
}

impl fmt::Debug for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Register")
            .field("name", &self.name)
            .field("access", &self.access)
            .finish()
    }
}

/// 按声明顺序编址的寄存器表。
///
/// # 契约说明（What）
/// - 第 `i` 个寄存器的偏移为 `i * REGISTER_STRIDE`；
/// - 读写均为常数次查找加一次观察量操作，表本身无锁（声明期固化）。
pub struct RegisterBank {
    registers: Vec<Register>,
}

impl RegisterBank {
    /// 以声明顺序固化寄存器表。
    pub fn new(registers: Vec<Register>) -> Self {
        Self { registers }
    }

    /// 寄存器个数。
    pub fn len(&self) -> usize {
        self.registers.len()
    }

    /// 是否为空表。
    pub fn is_empty(&self) -> bool {
        self.registers.is_empty()
    }

    /// 按名查找偏移，宿主可据此生成访问映射。
    pub fn offset_of(&self, name: &str) -> Option<usize> {
        self.registers
            .iter()
            .position(|register| register.name() == name)
            .map(|index| index * REGISTER_STRIDE)
    }

    fn slot(&self, offset: usize) -> Result<&Register, RegisterError> {
        if offset % REGISTER_STRIDE != 0 {
            return Err(RegisterError::MisalignedOffset { offset });
        }
        self.registers
            .get(offset / REGISTER_STRIDE)
            .ok_or(RegisterError::UnknownOffset { offset })
    }

    /// 按偏移读取寄存器字。
    pub fn read(&self, offset: usize) -> Result<u32, RegisterError> {
        Ok((self.slot(offset)?.read)())
    }

    /// 按偏移写入寄存器字；只读寄存器拒写。
    pub fn write(&self, offset: usize, word: u32) -> Result<(), RegisterError> {
        let register = self.slot(offset)?;
        if register.access == RegisterAccess::ReadOnly {
            return Err(RegisterError::ReadOnly {
                name: register.name.to_string(),
            });
        }
        (register.write)(word)
    }

    /// 按名读取寄存器字。
    pub fn read_named(&self, name: &str) -> Result<u32, RegisterError> {
        let offset = self.offset_of(name).ok_or_else(|| RegisterError::UnknownName {
            name: name.to_string(),
        })?;
        self.read(offset)
    }

    /// 按名写入寄存器字。
    pub fn write_named(&self, name: &str, word: u32) -> Result<(), RegisterError> {
        let offset = self.offset_of(name).ok_or_else(|| RegisterError::UnknownName {
            name: name.to_string(),
        })?;
        self.write(offset, word)
    }
}

impl fmt::Debug for RegisterBank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterBank")
            .field("registers", &self.registers.len())
            .finish()
    }
}
