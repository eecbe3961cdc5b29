use tokio_util::sync::CancellationToken;
use tracing::Span;
use uuid::Uuid;

/// Per-request handle threaded through every call of a resolution.
///
/// Carries the caller's cancellation token and the request-scoped span that
/// all log events of the resolution are recorded under.
#[derive(Debug, Clone)]
pub struct RequestContext {
    request_id: Uuid,
    cancel: CancellationToken,
    span: Span,
}

impl RequestContext {
    pub fn new(cancel: CancellationToken) -> Self {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("weather_request", request_id = %request_id);
        Self {
            request_id,
            cancel,
            span,
        }
    }

    /// Context whose token is cancelled together with `parent`.
    pub fn child_of(parent: &CancellationToken) -> Self {
        Self::new(parent.child_token())
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn span(&self) -> &Span {
        &self.span
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new(CancellationToken::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_context_follows_parent_cancellation() {
        let root = CancellationToken::new();
        let ctx = RequestContext::child_of(&root);
        assert!(!ctx.is_cancelled());

        root.cancel();
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn contexts_get_distinct_ids() {
        assert_ne!(
            RequestContext::default().request_id(),
            RequestContext::default().request_id()
        );
    }
}
