use std::fmt;
use std::mem;
use std::slice;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tracing::{debug, warn};

use crate::config::{AccessPolicy, HandleOptions};
use crate::descriptor::{ContiguityOrder, ViewDescriptor};
use crate::error::{ExportError, ExportErrorKind, HandleError, ReleaseError, ReleasedError};
use crate::exporter::{AccessMode, BufferExporter};

/// 句柄所处的生命周期阶段。
///
/// 源对象引用与视图只存在于 `Live` 变体中，二者同生同灭，不存在“视图已归还但仍持有源对象”
/// 之类的中间态。
enum HandleState {
    Live {
        source: Arc<dyn BufferExporter>,
        view: ViewDescriptor,
    },
    Released,
}

/// `BufferHandle` 是序列化层用来零拷贝传递带外缓冲的句柄。
///
/// # 设计动机（Why）
/// - 大块二进制数据内联进序列化字节流意味着一次完整拷贝；句柄改为在构造时向导出方借出一个视图，
///   由传输层直接读取原始内存。
/// - 借出的视图必须在导出方失效前归还，因此句柄同时持有源对象的强引用，保证视图存续期间
///   导出方不会被回收。
///
/// # 架构关系（How）
/// - 构造时同步向 [`BufferExporter`] 请求视图（默认先要可写、再退回只读），校验描述符后缓存；
/// - [`view`](Self::view)、[`is_contiguous`](Self::is_contiguous) 只读取缓存的描述符，从不回头询问导出方；
/// - [`release`](Self::release) 恰好一次地归还视图并丢弃源对象引用；`Drop` 在句柄仍存活时兜底释放，
///   并吞掉释放错误，只记录告警日志。
///
/// # 契约说明（What）
/// - **构造**：全有或全无，失败时不产生句柄，也不继续持有源对象；
/// - **释放**：幂等；即使导出方报告 [`ReleaseError`]，句柄也已进入 `Released`；
/// - **释放之后**：所有元数据查询返回 [`ReleasedError`]，内存区间不会再经由本句柄被访问。
///
/// # 风险与取舍（Trade-offs）
/// - 同一导出方可以同时被多个句柄引用，各句柄独立释放；导出方自己负责并发导出所需的加锁。
/// - 句柄实现 `Send + Sync`：共享引用只读内存，可变切片需要 `&mut self` 且视图为可写，
///   而导出方保证可写视图独占。
pub struct BufferHandle {
    state: HandleState,
}

impl BufferHandle {
    /// 以默认选项包装源对象。
    pub fn new<E>(source: Arc<E>) -> Result<Self, ExportError>
    where
        E: BufferExporter + 'static,
    {
        Self::from_shared(source, &HandleOptions::default())
    }

    /// 以指定选项包装源对象。
    pub fn with_options<E>(source: Arc<E>, options: &HandleOptions) -> Result<Self, ExportError>
    where
        E: BufferExporter + 'static,
    {
        Self::from_shared(source, options)
    }

    /// 包装已擦除类型的源对象。
    ///
    /// # 执行步骤（How）
    /// 1. 按 [`AccessPolicy`] 请求视图；
    /// 2. 校验描述符一致性，以及是否满足 `RequireWritable` 与 `require_contiguous`；
    /// 3. 任一校验失败时先把视图归还给导出方，再返回错误，`source` 随之被丢弃。
    pub fn from_shared(
        source: Arc<dyn BufferExporter>,
        options: &HandleOptions,
    ) -> Result<Self, ExportError> {
        let (view, requested) = acquire(source.as_ref(), options.access)?;
        if let Err(err) = check_acquired(&view, requested, options) {
            discard(source.as_ref(), &view, &err);
            return Err(err);
        }
        debug!(
            len = view.len(),
            ndim = view.ndim(),
            itemsize = view.itemsize(),
            writable = view.is_writable(),
            "buffer handle acquired view"
        );
        Ok(Self {
            state: HandleState::Live { source, view },
        })
    }

    /// 返回构造时捕获的视图描述符。
    pub fn view(&self) -> Result<&ViewDescriptor, ReleasedError> {
        self.live_view("view")
    }

    /// 判断视图在给定顺序下是否连续。
    pub fn is_contiguous(&self, order: ContiguityOrder) -> Result<bool, ReleasedError> {
        Ok(self.live_view("is_contiguous")?.is_contiguous(order))
    }

    pub fn is_live(&self) -> bool {
        matches!(self.state, HandleState::Live { .. })
    }

    pub fn is_released(&self) -> bool {
        !self.is_live()
    }

    /// 归还视图并放弃对源对象的引用。
    ///
    /// 已释放时直接成功。导出方报告失败时仍然完成状态迁移，再把错误交给调用方。
    pub fn release(&mut self) -> Result<(), ReleaseError> {
        let HandleState::Live { source, view } =
            mem::replace(&mut self.state, HandleState::Released)
        else {
            return Ok(());
        };
        // SAFETY: `view` 由 `source` 签发，状态已迁移为 `Released`，之后不会再被访问。
        let outcome = unsafe { source.release_view(&view) };
        drop(source);
        match &outcome {
            Ok(()) => debug!(len = view.len(), "buffer handle released view"),
            Err(err) => debug!(code = err.code(), error = %err, "exporter failed to release view"),
        }
        outcome
    }

    /// 以单个字节切片暴露整个视图，要求视图在 C 或 F 顺序下连续。
    pub fn as_slice(&self) -> Result<&[u8], HandleError> {
        let view = self.live_view("as_slice")?;
        if !view.is_contiguous(ContiguityOrder::Any) {
            return Err(HandleError::NotContiguous);
        }
        // SAFETY: 视图连续，因此 `[ptr, ptr + len)` 恰好是它覆盖的内存；句柄存活期间导出方保证
        // 该区间有效且无人并发写入，返回的切片借用 `self`，不会越过释放。
        Ok(unsafe { slice::from_raw_parts(view.as_ptr(), view.len()) })
    }

    /// 以可变字节切片暴露整个视图，要求视图可写且连续。
    pub fn as_mut_slice(&mut self) -> Result<&mut [u8], HandleError> {
        let view = self.live_view("as_mut_slice")?;
        if !view.is_writable() {
            return Err(HandleError::ReadOnly);
        }
        if !view.is_contiguous(ContiguityOrder::Any) {
            return Err(HandleError::NotContiguous);
        }
        // SAFETY: 可写视图由导出方独占签发，`&mut self` 又排除了经由本句柄的其它借用。
        Ok(unsafe { slice::from_raw_parts_mut(view.as_mut_ptr(), view.len()) })
    }

    /// 按 C 顺序复制视图的逻辑内容，对带步长的视图同样适用。
    pub fn to_bytes(&self) -> Result<Bytes, HandleError> {
        let view = self.live_view("to_bytes")?;
        if view.is_c_contiguous() {
            return self.as_slice().map(Bytes::copy_from_slice);
        }
        let itemsize = view.itemsize();
        let mut out = BytesMut::with_capacity(view.len());
        view.for_each_element(|offset| {
            // SAFETY: 偏移由已校验的形状与步长推导，落在导出方签发的区间之内。
            let item = unsafe { slice::from_raw_parts(view.as_ptr().offset(offset), itemsize) };
            out.extend_from_slice(item);
        });
        Ok(out.freeze())
    }

    fn live_view(&self, op: &'static str) -> Result<&ViewDescriptor, ReleasedError> {
        match &self.state {
            HandleState::Live { view, .. } => Ok(view),
            HandleState::Released => Err(ReleasedError::new(op)),
        }
    }
}

impl Drop for BufferHandle {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            warn!(
                code = err.code(),
                error = %err,
                "buffer handle teardown swallowed release failure"
            );
        }
    }
}

impl fmt::Debug for BufferHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.state {
            HandleState::Live { view, .. } => f
                .debug_struct("BufferHandle")
                .field("state", &"live")
                .field("view", view)
                .finish(),
            HandleState::Released => f
                .debug_struct("BufferHandle")
                .field("state", &"released")
                .finish(),
        }
    }
}

fn acquire(
    source: &dyn BufferExporter,
    policy: AccessPolicy,
) -> Result<(ViewDescriptor, AccessMode), ExportError> {
    let export = |mode: AccessMode| source.export_view(mode).map(|view| (view, mode));
    match policy {
        AccessPolicy::ReadOnly => export(AccessMode::ReadOnly),
        AccessPolicy::RequireWritable => export(AccessMode::Writable),
        AccessPolicy::PreferWritable => match export(AccessMode::Writable) {
            Err(err) if matches!(err.kind(), ExportErrorKind::ReadOnly | ExportErrorKind::Busy) => {
                debug!(code = err.code(), "writable export refused, falling back to read-only");
                export(AccessMode::ReadOnly)
            }
            other => other,
        },
    }
}

fn check_acquired(
    view: &ViewDescriptor,
    requested: AccessMode,
    options: &HandleOptions,
) -> Result<(), ExportError> {
    view.validate(requested)?;
    if options.access == AccessPolicy::RequireWritable && !view.is_writable() {
        return Err(ExportError::read_only(
            "exporter returned a read-only view to a writable request",
        ));
    }
    if let Some(order) = options.require_contiguous {
        if !view.is_contiguous(order) {
            return Err(ExportError::new(
                ExportErrorKind::NotContiguous,
                format!("view is not {order:?}-contiguous"),
            ));
        }
    }
    Ok(())
}

/// 归还一个不会交给调用方的视图。
fn discard(source: &dyn BufferExporter, view: &ViewDescriptor, cause: &ExportError) {
    // SAFETY: 被拒绝的视图刚由 `source` 签发，从未交给调用方，只在这里归还一次。
    if let Err(err) = unsafe { source.release_view(view) } {
        warn!(
            code = err.code(),
            error = %err,
            cause = cause.code(),
            "failed to return rejected view to exporter"
        );
    }
}
