//! 后台任务与连接释放

use crate::errors::BusError;
use std::{
    future::Future,
    sync::atomic::{AtomicBool, Ordering},
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// 保证释放动作只执行一次
#[derive(Debug, Default)]
pub(crate) struct CloseOnce(AtomicBool);

impl CloseOnce {
    /// 首次调用时执行 `release`，返回是否执行
    pub(crate) fn close(&self, release: impl FnOnce()) -> bool {
        if self
            .0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            release();
            true
        } else {
            false
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// 一次处理会话：后台任务及其取消令牌
///
/// 会话令牌是调用方令牌的子令牌，任一方取消都会结束任务。
/// 会话结束时令牌随之释放。
pub(crate) struct Session {
    token: CancellationToken,
    task: JoinHandle<Result<(), BusError>>,
}

impl Session {
    /// 在 `parent` 的子令牌下启动后台任务
    pub(crate) fn start<F, Fut>(parent: &CancellationToken, run: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<(), BusError>> + Send + 'static,
    {
        let token = parent.child_token();
        let task = tokio::spawn(run(token.clone()));
        Self { token, task }
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// 只发出取消信号，不等待任务结束
    pub(crate) fn cancel(&self) {
        self.token.cancel();
    }

    /// 取消并等待任务结束
    ///
    /// 取消导致的退出属于正常结束，其它错误只记录日志，不向调用方传播。
    /// 任务因恐慌退出时记录错误日志。
    pub(crate) async fn stop(self) {
        self.token.cancel();
        match self.task.await {
            Ok(Ok(())) => debug!("后台任务已结束"),
            Ok(Err(e)) if e.is_cancelled() => debug!("后台任务已取消"),
            Ok(Err(e)) => warn!("关闭后台任务时捕获意外错误：{e}"),
            Err(e) if e.is_panic() => error!("后台任务因恐慌退出：{e}"),
            Err(e) => warn!("关闭后台任务时捕获意外错误：{e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };
    use tokio::time::{Duration, timeout};

    #[test]
    fn close_once_runs_release_once() {
        let closer = CloseOnce::default();
        let count = AtomicUsize::new(0);
        assert!(!closer.is_closed());
        assert!(closer.close(|| {
            count.fetch_add(1, Ordering::SeqCst);
        }));
        assert!(!closer.close(|| {
            count.fetch_add(1, Ordering::SeqCst);
        }));
        assert!(closer.is_closed());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    async fn until_cancelled(token: CancellationToken) -> Result<(), BusError> {
        token.cancelled().await;
        Err(BusError::Cancelled)
    }

    async fn panicking(_: CancellationToken) -> Result<(), BusError> {
        panic!("故障")
    }

    #[tokio::test]
    async fn stop_cancels_only_session() {
        let parent = CancellationToken::new();
        let session = Session::start(&parent, until_cancelled);
        assert!(!session.is_finished());
        timeout(Duration::from_secs(1), session.stop()).await.unwrap();
        assert!(!parent.is_cancelled());
    }

    #[tokio::test]
    async fn parent_cancel_ends_session() {
        let parent = CancellationToken::new();
        let session = Session::start(&parent, until_cancelled);
        parent.cancel();
        timeout(Duration::from_secs(1), async {
            while !session.is_finished() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        session.stop().await;
    }

    #[tokio::test]
    async fn stop_swallows_faults() {
        let parent = CancellationToken::new();
        let session = Session::start(&parent, |_| async {
            Err(BusError::InvalidState("故障".to_string()))
        });
        session.stop().await;

        let session = Session::start(&parent, panicking);
        session.stop().await;
    }

    #[tokio::test]
    async fn cancel_does_not_wait() {
        let parent = CancellationToken::new();
        let stopped = Arc::new(AtomicUsize::new(0));
        let flag = Arc::clone(&stopped);
        let session = Session::start(&parent, move |token| async move {
            token.cancelled().await;
            flag.fetch_add(1, Ordering::SeqCst);
            Err(BusError::Cancelled)
        });
        session.cancel();
        session.stop().await;
        assert_eq!(stopped.load(Ordering::SeqCst), 1);
    }
}
