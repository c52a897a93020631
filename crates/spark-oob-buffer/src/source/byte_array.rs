use std::ptr::NonNull;

use bytes::Bytes;
use spin::Mutex;

use crate::descriptor::ViewDescriptor;
use crate::error::{ExportError, ReleaseError};
use crate::exporter::{AccessMode, BufferExporter};

/// 某一时刻仍未归还的导出数量。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExportCounts {
    /// 未归还的只读视图数量。
    pub readers: usize,
    /// 是否存在未归还的可写视图。
    pub writer: bool,
}

impl ExportCounts {
    /// 是否存在任何未归还的视图。
    pub fn any(&self) -> bool {
        self.readers > 0 || self.writer
    }
}

struct ArrayState {
    data: Vec<u8>,
    exports: ExportCounts,
}

/// `ByteArray` 是可写、可扩缩、带导出记账的字节数组。
///
/// # 设计动机（Why）
/// - 零拷贝意味着调用方会长期持有指向内部存储的指针，数组一旦扩容或被并发写入，
///   这些指针就会悬垂或读到撕裂数据。
/// - 因此数组自己记录未归还的导出：存在任何视图时拒绝改变大小；可写视图独占，只读视图共享。
///
/// # 结构设计（How）
/// - `spin::Mutex<ArrayState>` 同时保护数据与记账，签发与归还都在锁内完成；
/// - 签发出去的指针指向 `Vec` 的堆缓冲，只要不扩缩，该地址就保持稳定；
/// - `frozen` 标记构造后即只读的数组，任何可写请求都会得到 `ReadOnly` 拒绝。
///
/// # 契约说明（What）
/// - 冲突的导出请求返回 [`ExportErrorKind::Busy`](crate::ExportErrorKind::Busy)，不会阻塞等待；
/// - 归还一个从未签发过的视图会返回 [`ReleaseError`]，记账保持不变。
pub struct ByteArray {
    state: Mutex<ArrayState>,
    frozen: bool,
}

impl ByteArray {
    /// 创建可写数组。
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            state: Mutex::new(ArrayState {
                data: data.into(),
                exports: ExportCounts::default(),
            }),
            frozen: false,
        }
    }

    /// 创建只读数组，可写请求一律拒绝。
    pub fn frozen(data: impl Into<Vec<u8>>) -> Self {
        Self {
            frozen: true,
            ..Self::new(data)
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// 当前未归还的导出。
    pub fn exports(&self) -> ExportCounts {
        self.state.lock().exports
    }

    /// 复制当前内容；存在可写视图时内容可能正被修改，因此返回 `Busy`。
    pub fn snapshot(&self) -> Result<Bytes, ExportError> {
        let state = self.state.lock();
        if state.exports.writer {
            return Err(ExportError::busy(
                "byte array has an outstanding writable export",
            ));
        }
        Ok(Bytes::copy_from_slice(&state.data))
    }

    /// 调整长度，新增部分以 `value` 填充。
    pub fn resize(&self, new_len: usize, value: u8) -> Result<(), ExportError> {
        self.mutate(|data| data.resize(new_len, value))
    }

    /// 在末尾追加字节。
    pub fn extend_from_slice(&self, extra: &[u8]) -> Result<(), ExportError> {
        self.mutate(|data| data.extend_from_slice(extra))
    }

    fn mutate(&self, apply: impl FnOnce(&mut Vec<u8>)) -> Result<(), ExportError> {
        if self.frozen {
            return Err(ExportError::read_only("byte array is frozen"));
        }
        let mut state = self.state.lock();
        if state.exports.any() {
            return Err(ExportError::busy(
                "byte array has live exports and cannot be resized",
            ));
        }
        apply(&mut state.data);
        Ok(())
    }

    /// 登记一次导出并返回存储首地址与当前长度。
    pub(crate) fn acquire(&self, mode: AccessMode) -> Result<(NonNull<u8>, usize), ExportError> {
        if mode == AccessMode::Writable && self.frozen {
            return Err(ExportError::read_only("byte array is frozen"));
        }
        let mut state = self.state.lock();
        match mode {
            AccessMode::Writable if state.exports.any() => {
                return Err(ExportError::busy(
                    "byte array is already exported; writable access must be exclusive",
                ));
            }
            AccessMode::ReadOnly if state.exports.writer => {
                return Err(ExportError::busy(
                    "byte array has an outstanding writable export",
                ));
            }
            AccessMode::Writable => state.exports.writer = true,
            AccessMode::ReadOnly => state.exports.readers += 1,
        }
        let len = state.data.len();
        let ptr = NonNull::new(state.data.as_mut_ptr()).unwrap_or(NonNull::dangling());
        Ok((ptr, len))
    }

    /// 注销一次导出。
    pub(crate) fn release(&self, writable: bool) -> Result<(), ReleaseError> {
        let mut state = self.state.lock();
        if writable {
            if !state.exports.writer {
                return Err(ReleaseError::new(
                    "byte array has no writable export to release",
                ));
            }
            state.exports.writer = false;
        } else {
            if state.exports.readers == 0 {
                return Err(ReleaseError::new(
                    "byte array has no read-only export to release",
                ));
            }
            state.exports.readers -= 1;
        }
        Ok(())
    }
}

impl std::fmt::Debug for ByteArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ByteArray")
            .field("len", &state.data.len())
            .field("exports", &state.exports)
            .field("frozen", &self.frozen)
            .finish()
    }
}

// SAFETY: 记账保证可写视图独占、只读视图期间无人修改，且存在任何导出时拒绝扩缩，
// 签发出去的堆缓冲地址因此在归还前保持有效。
unsafe impl BufferExporter for ByteArray {
    fn export_view(&self, mode: AccessMode) -> Result<ViewDescriptor, ExportError> {
        let (ptr, len) = self.acquire(mode)?;
        Ok(ViewDescriptor::new(ptr, len, mode == AccessMode::Writable))
    }

    unsafe fn release_view(&self, view: &ViewDescriptor) -> Result<(), ReleaseError> {
        self.release(view.is_writable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ExportErrorKind;

    #[test]
    fn writable_export_is_exclusive() {
        let array = ByteArray::new(b"foo".to_vec());
        let view = array.export_view(AccessMode::Writable).expect("首次可写导出");
        let err = array
            .export_view(AccessMode::ReadOnly)
            .expect_err("可写导出期间不可再导出");
        assert_eq!(err.kind(), ExportErrorKind::Busy);
        unsafe { array.release_view(&view) }.expect("归还可写视图");
        assert!(!array.exports().any());
    }

    #[test]
    fn readers_share_and_block_writers() {
        let array = ByteArray::new(vec![0u8; 4]);
        let a = array.export_view(AccessMode::ReadOnly).expect("只读导出 a");
        let b = array.export_view(AccessMode::ReadOnly).expect("只读导出 b");
        assert_eq!(array.exports().readers, 2);
        assert_eq!(
            array.export_view(AccessMode::Writable).map(|_| ()),
            Err(ExportError::busy(
                "byte array is already exported; writable access must be exclusive"
            ))
        );
        unsafe { array.release_view(&a) }.expect("归还 a");
        unsafe { array.release_view(&b) }.expect("归还 b");
        assert!(array.release(false).is_err(), "多余的归还应报告记账不一致");
        assert_eq!(array.exports(), ExportCounts::default());
    }

    #[test]
    fn resize_is_refused_while_exported() {
        let array = ByteArray::new(vec![1u8, 2]);
        let view = array.export_view(AccessMode::ReadOnly).expect("只读导出");
        assert!(array.resize(16, 0).is_err());
        unsafe { array.release_view(&view) }.expect("归还视图");
        array.resize(16, 0).expect("无导出时允许扩容");
        assert_eq!(array.len(), 16);
    }

    #[test]
    fn frozen_array_rejects_writes() {
        let array = ByteArray::frozen(b"abc".to_vec());
        assert_eq!(
            array
                .export_view(AccessMode::Writable)
                .map(|_| ())
                .map_err(|err| err.kind()),
            Err(ExportErrorKind::ReadOnly)
        );
        assert!(array.extend_from_slice(b"d").is_err());
        assert_eq!(array.snapshot().expect("快照"), Bytes::from_static(b"abc"));
    }
}
