use std::{fmt, sync::Arc};

use async_trait::async_trait;

use super::RequestContext;

/// Обработчик входящего сообщения.
///
/// Ошибку обработчик кладёт в контекст (`ctx.set_error`), остальные
/// обработчики цепочки всё равно выполняются.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(
        &self,
        ctx: &mut RequestContext,
    );
}

/// Синхронный обработчик-замыкание.
pub struct FnHandler<F> {
    name: &'static str,
    f: F,
}

impl<F> FnHandler<F>
where
    F: Fn(&mut RequestContext) + Send + Sync + 'static,
{
    pub fn new(
        name: &'static str,
        f: F,
    ) -> Self {
        Self { name, f }
    }
}

#[async_trait]
impl<F> Handler for FnHandler<F>
where
    F: Fn(&mut RequestContext) + Send + Sync + 'static,
{
    async fn handle(
        &self,
        ctx: &mut RequestContext,
    ) {
        (self.f)(ctx)
    }
}

impl<F> fmt::Debug for FnHandler<F> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("FnHandler").field("name", &self.name).finish()
    }
}

/// Оборачивает замыкание в `Arc<dyn Handler>`.
pub fn handler_fn<F>(
    name: &'static str,
    f: F,
) -> Arc<dyn Handler>
where
    F: Fn(&mut RequestContext) + Send + Sync + 'static,
{
    Arc::new(FnHandler::new(name, f))
}
