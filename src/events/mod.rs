//! In-process publish/subscribe.
//!
//! Handlers are registered per concrete event type and run one after another
//! in registration order. A failing handler never stops the ones after it:
//! errors are collected and either logged or returned to the emitter.

pub mod types;

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::utils::error::AppError;

pub use types::*;

pub trait Event: Any + Send + Sync {
    fn name(&self) -> &'static str;
}

#[async_trait]
pub trait EventHandler<E: Event>: Send + Sync {
    async fn handle(&self, event: &E) -> Result<(), AppError>;
}

#[async_trait]
trait ErasedHandler: Send + Sync {
    async fn handle_any(&self, event: &(dyn Any + Send + Sync)) -> Result<(), AppError>;
}

struct TypedHandler<E, H> {
    handler: H,
    _event: PhantomData<fn(E)>,
}

#[async_trait]
impl<E, H> ErasedHandler for TypedHandler<E, H>
where
    E: Event,
    H: EventHandler<E>,
{
    async fn handle_any(&self, event: &(dyn Any + Send + Sync)) -> Result<(), AppError> {
        match event.downcast_ref::<E>() {
            Some(event) => self.handler.handle(event).await,
            None => Ok(()),
        }
    }
}

/// Outcome of a single `emit` call.
#[derive(Debug, Default)]
pub struct EmitReport {
    pub handled: usize,
    pub errors: Vec<AppError>,
}

impl EmitReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Default)]
pub struct EventBus {
    handlers: RwLock<HashMap<TypeId, Vec<Arc<dyn ErasedHandler>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<E, H>(&self, handler: H)
    where
        E: Event,
        H: EventHandler<E> + 'static,
    {
        let erased: Arc<dyn ErasedHandler> = Arc::new(TypedHandler {
            handler,
            _event: PhantomData::<fn(E)>,
        });

        match self.handlers.write() {
            Ok(mut handlers) => handlers.entry(TypeId::of::<E>()).or_default().push(erased),
            Err(poisoned) => poisoned
                .into_inner()
                .entry(TypeId::of::<E>())
                .or_default()
                .push(erased),
        }
    }

    pub fn subscriber_count<E: Event>(&self) -> usize {
        self.snapshot(TypeId::of::<E>()).len()
    }

    /// Runs every handler for `event` in order.
    ///
    /// With `raise_error` the first collected error is returned once all
    /// handlers have finished; otherwise errors are only logged.
    pub async fn emit<E: Event>(&self, event: &E, raise_error: bool) -> Result<EmitReport, AppError> {
        let handlers = self.snapshot(TypeId::of::<E>());
        let mut report = EmitReport::default();

        if handlers.is_empty() {
            log::debug!("No subscribers for event {}", event.name());
            return Ok(report);
        }

        for handler in handlers {
            report.handled += 1;
            if let Err(e) = handler.handle_any(event).await {
                log::warn!("⚠️  Handler for {} failed: {}", event.name(), e);
                report.errors.push(e);
            }
        }

        if raise_error && !report.errors.is_empty() {
            return Err(report.errors.remove(0));
        }

        Ok(report)
    }

    fn snapshot(&self, type_id: TypeId) -> Vec<Arc<dyn ErasedHandler>> {
        let handlers = match self.handlers.read() {
            Ok(handlers) => handlers,
            Err(poisoned) => poisoned.into_inner(),
        };
        handlers.get(&type_id).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Ping(u32);

    impl Event for Ping {
        fn name(&self) -> &'static str {
            "Ping"
        }
    }

    struct Pong;

    impl Event for Pong {
        fn name(&self) -> &'static str {
            "Pong"
        }
    }

    struct Recorder {
        tag: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    #[async_trait]
    impl EventHandler<Ping> for Recorder {
        async fn handle(&self, event: &Ping) -> Result<(), AppError> {
            self.log.lock().unwrap().push(format!("{}:{}", self.tag, event.0));
            if self.fail {
                return Err(AppError::invalid_request(format!("{} failed", self.tag)));
            }
            Ok(())
        }
    }

    fn recorder(tag: &'static str, log: &Arc<Mutex<Vec<String>>>, fail: bool) -> Recorder {
        Recorder {
            tag,
            log: log.clone(),
            fail,
        }
    }

    #[tokio::test]
    async fn test_handlers_run_in_registration_order() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe::<Ping, _>(recorder("a", &log, false));
        bus.subscribe::<Ping, _>(recorder("b", &log, false));

        let report = bus.emit(&Ping(7), true).await.unwrap();

        assert_eq!(report.handled, 2);
        assert!(report.is_ok());
        assert_eq!(*log.lock().unwrap(), vec!["a:7", "b:7"]);
    }

    #[tokio::test]
    async fn test_no_subscribers_is_noop() {
        let bus = EventBus::new();
        let report = bus.emit(&Pong, true).await.unwrap();
        assert_eq!(report.handled, 0);
        assert_eq!(bus.subscriber_count::<Pong>(), 0);
    }

    #[tokio::test]
    async fn test_errors_are_aggregated_without_raise() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe::<Ping, _>(recorder("a", &log, true));
        bus.subscribe::<Ping, _>(recorder("b", &log, true));
        bus.subscribe::<Ping, _>(recorder("c", &log, false));

        let report = bus.emit(&Ping(1), false).await.unwrap();

        assert_eq!(report.handled, 3);
        assert_eq!(report.errors.len(), 2);
        assert_eq!(log.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_raise_returns_first_error_after_all_handlers_ran() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe::<Ping, _>(recorder("first", &log, true));
        bus.subscribe::<Ping, _>(recorder("second", &log, true));
        bus.subscribe::<Ping, _>(recorder("third", &log, false));

        let err = bus.emit(&Ping(2), true).await.unwrap_err();

        assert_eq!(err.to_string(), "first failed");
        assert_eq!(log.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_handlers_are_scoped_to_event_type() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe::<Ping, _>(recorder("a", &log, false));

        bus.emit(&Pong, true).await.unwrap();

        assert!(log.lock().unwrap().is_empty());
        assert_eq!(bus.subscriber_count::<Ping>(), 1);
    }
}
