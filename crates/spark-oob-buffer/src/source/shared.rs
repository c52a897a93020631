use std::ptr::NonNull;

use bytes::Bytes;

use crate::descriptor::ViewDescriptor;
use crate::error::{ExportError, ReleaseError};
use crate::exporter::{AccessMode, BufferExporter};

/// 不可变内存的统一导出逻辑：只读请求直接签发，可写请求一律拒绝。
fn export_immutable(
    what: &'static str,
    bytes: &[u8],
    mode: AccessMode,
) -> Result<ViewDescriptor, ExportError> {
    match mode {
        AccessMode::Writable => Err(ExportError::read_only(what)),
        AccessMode::ReadOnly => Ok(ViewDescriptor::new(
            NonNull::new(bytes.as_ptr().cast_mut()).unwrap_or(NonNull::dangling()),
            bytes.len(),
            false,
        )),
    }
}

// SAFETY: `Bytes` 的底层存储不可变且由引用计数保活，句柄持有的 `Arc<Bytes>`
// 保证视图有效期内存储不会被回收。
unsafe impl BufferExporter for Bytes {
    fn export_view(&self, mode: AccessMode) -> Result<ViewDescriptor, ExportError> {
        export_immutable("`Bytes` only exports read-only views", self, mode)
    }

    unsafe fn release_view(&self, _view: &ViewDescriptor) -> Result<(), ReleaseError> {
        Ok(())
    }
}

// SAFETY: 句柄通过 `Arc<Vec<u8>>` 共享所有权，存在共享引用时无法再取得 `&mut Vec<u8>`，
// 因此视图有效期内内容既不会被修改也不会被重新分配。
unsafe impl BufferExporter for Vec<u8> {
    fn export_view(&self, mode: AccessMode) -> Result<ViewDescriptor, ExportError> {
        export_immutable("shared `Vec<u8>` only exports read-only views", self, mode)
    }

    unsafe fn release_view(&self, _view: &ViewDescriptor) -> Result<(), ReleaseError> {
        Ok(())
    }
}
