mod common;

use common::test_helpers::{at, facade, rolling};
use scoped_cooldown::{
    ActionRequest, BucketDimension, CooldownLayer, GuardError, InvocationContext,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::{service_fn, Layer, ServiceExt};

#[derive(Debug, thiserror::Error)]
#[error("handler failed")]
struct HandlerError;

#[tokio::test]
async fn denied_requests_never_reach_the_handler() {
    let (cooldown, clock) =
        facade(at(1, 10, 0, 0), [rolling("roll", 1, 30, BucketDimension::User)]);
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = calls.clone();
    let svc = CooldownLayer::new(cooldown).layer(service_fn(move |req: ActionRequest<u32>| {
        let calls = calls_clone.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, HandlerError>(req.payload * 2)
        }
    }));

    let req = || ActionRequest::new("roll", InvocationContext::user(1), 21);
    assert_eq!(svc.clone().oneshot(req()).await.unwrap(), 42);

    match svc.clone().oneshot(req()).await {
        Err(GuardError::CooldownActive(active)) => assert_eq!(active.retry_after_secs(), 30),
        other => panic!("expected cooldown denial, got {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    clock.advance(Duration::from_secs(31));
    assert_eq!(svc.oneshot(req()).await.unwrap(), 42);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn handler_errors_are_wrapped_as_inner() {
    let (cooldown, _) = facade(at(1, 10, 0, 0), [rolling("fail", 5, 30, BucketDimension::User)]);
    let svc = CooldownLayer::new(cooldown)
        .layer(service_fn(|_req: ActionRequest<()>| async { Err::<(), _>(HandlerError) }));

    let err = svc
        .oneshot(ActionRequest::new("fail", InvocationContext::user(1), ()))
        .await
        .unwrap_err();
    assert!(!err.is_cooldown_active());
    assert!(err.into_inner().is_some());
}

#[tokio::test]
async fn unregistered_actions_fail_closed() {
    let (cooldown, _) = facade(at(1, 10, 0, 0), []);
    let svc = CooldownLayer::new(cooldown)
        .layer(service_fn(|_req: ActionRequest<()>| async { Ok::<_, HandlerError>(()) }));
    let err = svc
        .oneshot(ActionRequest::new("ghost", InvocationContext::user(1), ()))
        .await
        .unwrap_err();
    assert!(matches!(err, GuardError::Cooldown(_)));
}
