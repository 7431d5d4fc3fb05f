use crate::cooldown::{Cooldown, Decision};
use crate::error::GuardError;
use crate::scope::InvocationContext;
use crate::store::CooldownStore;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tower_layer::Layer;
use tower_service::Service;

/// A request that names the action being invoked and who invoked it.
pub trait Invocation {
    /// Action (command) name.
    fn action(&self) -> &str;
    /// Invocation context used for scope resolution.
    fn context(&self) -> &InvocationContext;
}

/// Plain request carrying an action, its context and a payload for the inner service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRequest<T> {
    /// Action name.
    pub action: String,
    /// Who invoked it and where.
    pub context: InvocationContext,
    /// Request body for the inner service.
    pub payload: T,
}

impl<T> ActionRequest<T> {
    pub fn new(action: impl Into<String>, context: InvocationContext, payload: T) -> Self {
        Self {
            action: action.into(),
            context,
            payload,
        }
    }
}

impl<T> Invocation for ActionRequest<T> {
    fn action(&self) -> &str {
        &self.action
    }

    fn context(&self) -> &InvocationContext {
        &self.context
    }
}

/// A layer that guards a service with registered cooldowns.
#[derive(Clone, Debug)]
pub struct CooldownLayer<S> {
    cooldown: Cooldown<S>,
}

impl<S> CooldownLayer<S> {
    /// Create a new cooldown layer.
    pub fn new(cooldown: Cooldown<S>) -> Self {
        Self { cooldown }
    }
}

impl<Svc, S> Layer<Svc> for CooldownLayer<S> {
    type Service = CooldownService<Svc, S>;

    fn layer(&self, service: Svc) -> Self::Service {
        CooldownService {
            inner: service,
            cooldown: self.cooldown.clone(),
        }
    }
}

/// Middleware service that checks the request's action before calling the inner service.
///
/// Denied requests never reach the inner service.
#[derive(Clone, Debug)]
pub struct CooldownService<Svc, S> {
    inner: Svc,
    cooldown: Cooldown<S>,
}

impl<Svc, S, Req> Service<Req> for CooldownService<Svc, S>
where
    Svc: Service<Req> + Clone + Send + 'static,
    Svc::Future: Send + 'static,
    Svc::Error: Send + 'static,
    Svc::Response: Send + 'static,
    S: CooldownStore + 'static,
    Req: Invocation + Send + Sync + 'static,
{
    type Response = Svc::Response;
    type Error = GuardError<Svc::Error>;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(GuardError::Inner)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let cooldown = self.cooldown.clone();
        // take the service that was driven to readiness
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            match cooldown.check(req.action(), req.context()).await {
                Ok(Decision::Allowed { .. }) => inner.call(req).await.map_err(GuardError::Inner),
                Ok(Decision::Denied(active)) => Err(GuardError::CooldownActive(active)),
                Err(e) => Err(GuardError::Cooldown(e)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CooldownSpec;
    use crate::store::InMemoryCooldownStore;
    use std::convert::Infallible;
    use std::time::Duration;

    #[derive(Clone)]
    struct Echo;

    impl Service<ActionRequest<&'static str>> for Echo {
        type Response = &'static str;
        type Error = Infallible;
        type Future = std::future::Ready<Result<&'static str, Infallible>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, req: ActionRequest<&'static str>) -> Self::Future {
            std::future::ready(Ok(req.payload))
        }
    }

    #[tokio::test]
    async fn passes_then_blocks() {
        let cooldown = Cooldown::builder(InMemoryCooldownStore::new())
            .register(
                CooldownSpec::builder("echo")
                    .rate(1)
                    .per(Duration::from_secs(60))
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap();
        let mut svc = CooldownLayer::new(cooldown).layer(Echo);

        let req = || ActionRequest::new("echo", InvocationContext::user(1), "hi");
        assert_eq!(svc.call(req()).await.unwrap(), "hi");
        let err = svc.call(req()).await.unwrap_err();
        assert!(err.is_cooldown_active());

        let unknown = ActionRequest::new("nope", InvocationContext::user(1), "hi");
        assert!(matches!(svc.call(unknown).await.unwrap_err(), GuardError::Cooldown(_)));
    }
}
