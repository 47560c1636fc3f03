use std::future::Future;

use tokio_util::sync::{CancellationToken, DropGuard};

use crate::error::{MarketClientError, MarketClientResult};

#[derive(Debug)]
/// Время жизни представления: запросы, запущенные через `run`, после закрытия
/// представления завершаются с `Cancelled`, а их результат отбрасывается.
///
/// Удаление `ViewScope` отменяет его токен.
pub struct ViewScope {
    token: CancellationToken,
    _guard: DropGuard,
}

impl Default for ViewScope {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewScope {
    /// Новое корневое представление.
    pub fn new() -> Self {
        Self::from_token(CancellationToken::new())
    }

    fn from_token(token: CancellationToken) -> Self {
        let guard = token.clone().drop_guard();
        Self {
            token,
            _guard: guard,
        }
    }

    /// Вложенное представление: отменяется вместе с родителем.
    pub fn child(&self) -> Self {
        Self::from_token(self.token.child_token())
    }

    /// Закрывает представление явно.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Закрыто ли представление.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Токен для передачи в фоновые задачи.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Выполняет запрос в рамках представления.
    pub async fn run<F, T>(&self, future: F) -> MarketClientResult<T>
    where
        F: Future<Output = MarketClientResult<T>>,
    {
        run_until_cancelled(&self.token, future).await
    }
}

/// Выполняет `future`, пока не отменён `token`.
pub async fn run_until_cancelled<F, T>(
    token: &CancellationToken,
    future: F,
) -> MarketClientResult<T>
where
    F: Future<Output = MarketClientResult<T>>,
{
    if token.is_cancelled() {
        return Err(MarketClientError::Cancelled);
    }
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(MarketClientError::Cancelled),
        result = future => result,
    }
}
