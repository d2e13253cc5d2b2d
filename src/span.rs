use actix::prelude::*;
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::Span;

/// Message with span used for trace logging.
///
/// Actix mailboxes lose the caller's tracing context, so every message sent
/// between actors is wrapped in one of these and the handler future is
/// instrumented with the captured span.
pub struct SpanMessage<I> {
    pub msg: I,
    pub span: Span,
}

impl<M> SpanMessage<M> {
    pub fn new(msg: M) -> Self {
        Self {
            msg,
            span: Span::current(),
        }
    }
}

impl<M, R: 'static> Message for SpanMessage<M>
where
    M: Message<Result = R>,
{
    type Result = R;
}

/// Span-aware async handler for stateless service actors.
#[async_trait]
pub trait AsyncSpanHandler<M>
where
    Self: Actor,
    M: Message,
{
    async fn handle(msg: M) -> <M as Message>::Result;
}

/// Span-aware async handler for the database actor. The pool is cloned out of
/// the actor before the future runs, so queries never borrow actor state.
#[async_trait]
pub trait AsyncDbHandler<M>
where
    Self: Actor,
    M: Message,
{
    async fn handle(pool: PgPool, msg: M) -> <M as Message>::Result;
}

#[macro_export]
macro_rules! async_message_handler_with_span {
    ({ impl AsyncSpanHandler<$M:ident> for $A:ident $t:tt }) => {
        impl Handler<$crate::span::SpanMessage<$M>> for $A {
            type Result = ResponseFuture<<$M as Message>::Result>;

            fn handle(
                &mut self,
                msg: $crate::span::SpanMessage<$M>,
                _ctx: &mut Context<Self>,
            ) -> Self::Result {
                let $crate::span::SpanMessage { msg, span } = msg;
                Box::pin(tracing::Instrument::instrument(
                    <Self as $crate::span::AsyncSpanHandler<$M>>::handle(msg),
                    span,
                ))
            }
        }

        #[async_trait::async_trait]
        impl $crate::span::AsyncSpanHandler<$M> for $A $t
    };
}

#[macro_export]
macro_rules! db_message_handler_with_span {
    ({ impl AsyncDbHandler<$M:ident> for $A:ident $t:tt }) => {
        impl Handler<$crate::span::SpanMessage<$M>> for $A {
            type Result = ResponseFuture<<$M as Message>::Result>;

            fn handle(
                &mut self,
                msg: $crate::span::SpanMessage<$M>,
                _ctx: &mut Context<Self>,
            ) -> Self::Result {
                let $crate::span::SpanMessage { msg, span } = msg;
                let pool = self.pool();
                Box::pin(tracing::Instrument::instrument(
                    <Self as $crate::span::AsyncDbHandler<$M>>::handle(pool, msg),
                    span,
                ))
            }
        }

        #[async_trait::async_trait]
        impl $crate::span::AsyncDbHandler<$M> for $A $t
    };
}
