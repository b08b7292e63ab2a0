//! 任务结果句柄
//!
//! `submit` 返回的 [`LoopFuture`] 可以阻塞等待（[`LoopFuture::join`]），
//! 也可以作为普通 Future 组合或 `.await`。

use futures::future::BoxFuture;
use futures::task::noop_waker_ref;
use futures::FutureExt;
use orbit_core::{OrbitError, Result};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

/// Loop 任务的结果句柄
#[must_use = "LoopFuture 不等待就无法拿到任务结果"]
pub struct LoopFuture<T> {
    inner: Inner<T>,
}

enum Inner<T> {
    /// 已完成（在 Loop 线程内联执行，或提交即被拒绝）
    Ready(Option<Result<T>>),
    /// 等待 Loop 线程回填
    Pending(oneshot::Receiver<Result<T>>),
    /// 组合出来的 Future
    Composed(BoxFuture<'static, Result<T>>),
}

// 从不对 T 做 pin 投影
impl<T> Unpin for LoopFuture<T> {}

impl<T> LoopFuture<T> {
    /// 已完成的句柄
    pub fn ready(result: Result<T>) -> Self {
        Self {
            inner: Inner::Ready(Some(result)),
        }
    }

    pub(crate) fn pending(rx: oneshot::Receiver<Result<T>>) -> Self {
        Self {
            inner: Inner::Pending(rx),
        }
    }

    /// 结果是否已经可取
    ///
    /// 组合出来的句柄会被推进一次，完成时结果缓存到句柄内。
    pub fn is_done(&mut self) -> bool {
        match &mut self.inner {
            Inner::Ready(_) => true,
            Inner::Pending(rx) => !rx.is_empty() || rx.is_terminated(),
            Inner::Composed(fut) => {
                let mut cx = Context::from_waker(noop_waker_ref());
                match fut.as_mut().poll(&mut cx) {
                    Poll::Ready(result) => {
                        self.inner = Inner::Ready(Some(result));
                        true
                    }
                    Poll::Pending => false,
                }
            }
        }
    }

    /// 非阻塞地取结果，尚未完成时返回 `None`
    pub fn try_take(&mut self) -> Option<Result<T>> {
        match &mut self.inner {
            Inner::Ready(slot) => slot.take(),
            Inner::Pending(rx) => match rx.try_recv() {
                Ok(result) => Some(result),
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Closed) => Some(Err(OrbitError::Cancelled)),
            },
            Inner::Composed(fut) => {
                let mut cx = Context::from_waker(noop_waker_ref());
                match fut.as_mut().poll(&mut cx) {
                    Poll::Ready(result) => {
                        self.inner = Inner::Ready(None);
                        Some(result)
                    }
                    Poll::Pending => None,
                }
            }
        }
    }

    /// 阻塞当前线程直到结果可用
    ///
    /// 不要在 Loop 线程上等待另一个 Loop 的结果，跨 Loop 协作应组合 Future。
    pub fn join(self) -> Result<T> {
        futures::executor::block_on(self)
    }
}

impl<T: Send + 'static> LoopFuture<T> {
    /// 由任意 Future 构造
    pub fn from_future<F>(future: F) -> Self
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        Self {
            inner: Inner::Composed(future.boxed()),
        }
    }

    /// 成功结果映射
    pub fn map<U, F>(self, f: F) -> LoopFuture<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        LoopFuture::from_future(async move { self.await.map(f) })
    }
}

impl<T> Future for LoopFuture<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match &mut this.inner {
            Inner::Ready(slot) => Poll::Ready(slot.take().unwrap_or(Err(OrbitError::Cancelled))),
            Inner::Pending(rx) => Pin::new(rx)
                .poll(cx)
                .map(|received| received.unwrap_or(Err(OrbitError::Cancelled))),
            Inner::Composed(fut) => fut.as_mut().poll(cx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_future() {
        let mut fut = LoopFuture::ready(Ok(7));
        assert!(fut.is_done());
        assert_eq!(fut.try_take().unwrap().unwrap(), 7);
    }

    #[test]
    fn test_pending_future_resolves() {
        let (tx, rx) = oneshot::channel();
        let mut fut = LoopFuture::pending(rx);
        assert!(!fut.is_done());
        assert!(fut.try_take().is_none());

        tx.send(Ok("done")).unwrap();
        assert!(fut.is_done());
        assert_eq!(fut.join().unwrap(), "done");
    }

    #[test]
    fn test_dropped_sender_cancels() {
        let (tx, rx) = oneshot::channel::<Result<u32>>();
        drop(tx);
        let fut = LoopFuture::pending(rx);
        assert!(matches!(fut.join(), Err(OrbitError::Cancelled)));
    }

    #[test]
    fn test_composed_future_reports_done() {
        let (tx, rx) = oneshot::channel();
        let mut fut = LoopFuture::pending(rx).map(|v: u32| v * 2);
        assert!(!fut.is_done());

        tx.send(Ok(21)).unwrap();
        assert!(fut.is_done());
        assert!(fut.is_done());
        assert_eq!(fut.try_take().unwrap().unwrap(), 42);
    }

    #[tokio::test]
    async fn test_map_composes() {
        let fut = LoopFuture::ready(Ok(20)).map(|v| v + 1);
        assert_eq!(fut.await.unwrap(), 21);
    }
}
