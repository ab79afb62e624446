//! 外部协作调用的统一约束：超时 + 取消

use std::future::Future;
use std::time::Duration;

use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::core::CollaboratorError;

/// 在 limit 内等待 call；令牌被取消或超时都转为对应的 CollaboratorError
pub async fn bounded<T, F>(
    call: F,
    limit: Duration,
    cancel: &CancellationToken,
) -> Result<T, CollaboratorError>
where
    F: Future<Output = Result<T, CollaboratorError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(CollaboratorError::Cancelled),
        result = timeout(limit, call) => {
            result.unwrap_or_else(|_| Err(CollaboratorError::Timeout(limit)))
        }
    }
}
