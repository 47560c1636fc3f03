use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{MarketClientError, MarketClientResult};

/// Сколько ждать загрузки объявления, если заранее загруженного нет.
pub const AD_LOAD_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
/// События жизненного цикла объявления.
pub enum AdEvent {
    /// Объявление загружено и готово к показу.
    Loaded,
    /// Загрузка или показ завершились ошибкой.
    Error(String),
    /// Объявление открыто.
    Opened,
    /// Объявление закрыто пользователем.
    Closed,
}

/// Рекламный SDK: загрузка и показ одного полноэкранного объявления.
#[async_trait]
pub trait AdNetwork: Send + Sync {
    /// Запрашивает и загружает объявление.
    async fn load(&self) -> MarketClientResult<()>;
    /// Показывает загруженное объявление; завершается после его закрытия.
    async fn show(&self) -> MarketClientResult<()>;
}

type Observer = Box<dyn Fn(&AdEvent) + Send + Sync>;

/// Держит одно заранее загруженное объявление и перезагружает его после
/// каждого показа или ошибки.
pub struct AdPresenter<N> {
    network: N,
    ready: bool,
    load_timeout: Duration,
    observer: Option<Observer>,
}

impl<N: AdNetwork> AdPresenter<N> {
    /// Создаёт презентер; объявление ещё не загружено.
    pub fn new(network: N) -> Self {
        Self {
            network,
            ready: false,
            load_timeout: AD_LOAD_TIMEOUT,
            observer: None,
        }
    }

    /// Подписывает наблюдателя на события объявления.
    pub fn with_observer(mut self, observer: impl Fn(&AdEvent) + Send + Sync + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Готово ли объявление к немедленному показу.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    fn emit(&self, event: AdEvent) {
        debug!(?event, "ad event");
        if let Some(observer) = &self.observer {
            observer(&event);
        }
    }

    /// Загружает объявление заранее (после старта приложения).
    pub async fn preload(&mut self) -> MarketClientResult<()> {
        match self.load_bounded().await {
            Ok(()) => {
                self.ready = true;
                self.emit(AdEvent::Loaded);
                Ok(())
            }
            Err(err) => {
                self.ready = false;
                self.emit(AdEvent::Error(err.to_string()));
                Err(err)
            }
        }
    }

    async fn load_bounded(&self) -> MarketClientResult<()> {
        match tokio::time::timeout(self.load_timeout, self.network.load()).await {
            Ok(result) => result,
            Err(_) => Err(MarketClientError::AdTimeout),
        }
    }

    async fn reload(&mut self) {
        if let Err(err) = self.preload().await {
            warn!(error = %err, "ad reload failed");
        }
    }

    /// Показывает объявление. Если заранее загруженного нет, загружает его,
    /// ожидая не дольше `AD_LOAD_TIMEOUT`.
    ///
    /// После неудачной загрузки ошибка возвращается сразу, без повторной
    /// попытки: следующую загрузку сделает очередной `show` или `preload`.
    /// Перезагрузка после показа тоже ограничена `AD_LOAD_TIMEOUT`.
    pub async fn show(&mut self) -> MarketClientResult<()> {
        if !self.ready {
            if let Err(err) = self.load_bounded().await {
                self.emit(AdEvent::Error(err.to_string()));
                return Err(err);
            }
            self.emit(AdEvent::Loaded);
        }

        self.ready = false;
        self.emit(AdEvent::Opened);
        let shown = self.network.show().await;
        match &shown {
            Ok(()) => self.emit(AdEvent::Closed),
            Err(err) => self.emit(AdEvent::Error(err.to_string())),
        }
        self.reload().await;
        shown
    }
}
