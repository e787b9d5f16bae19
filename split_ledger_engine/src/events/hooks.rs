use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{
    EventHandler,
    EventProducer,
    EventType,
    Handler,
    SplitCreatedEvent,
    SplitReversedEvent,
    SplitSettledEvent,
};

/// Publishing never blocks the engine. Events are dropped, with a warning, when a handler's channel is full or
/// [`EventHandlers::start_handlers`] has not been called.
#[derive(Default, Clone)]
pub struct EventProducers {
    pub split_created_producer: Vec<EventProducer<SplitCreatedEvent>>,
    pub split_reversed_producer: Vec<EventProducer<SplitReversedEvent>>,
    pub split_settled_producer: Vec<EventProducer<SplitSettledEvent>>,
    /// Receives every event, for sinks that only care about `name` and `payload`
    pub any_event_producer: Vec<EventProducer<EventType>>,
}

impl EventProducers {
    pub fn publish_split_created(&self, event: SplitCreatedEvent) {
        for emitter in &self.split_created_producer {
            emitter.try_publish_event(event.clone());
        }
        for emitter in &self.any_event_producer {
            emitter.try_publish_event(EventType::from(event.clone()));
        }
    }

    pub fn publish_split_reversed(&self, event: SplitReversedEvent) {
        for emitter in &self.split_reversed_producer {
            emitter.try_publish_event(event.clone());
        }
        for emitter in &self.any_event_producer {
            emitter.try_publish_event(EventType::from(event.clone()));
        }
    }

    pub fn publish_split_settled(&self, event: SplitSettledEvent) {
        for emitter in &self.split_settled_producer {
            emitter.try_publish_event(event.clone());
        }
        for emitter in &self.any_event_producer {
            emitter.try_publish_event(EventType::from(event.clone()));
        }
    }
}

pub struct EventHandlers {
    pub on_split_created: Option<EventHandler<SplitCreatedEvent>>,
    pub on_split_reversed: Option<EventHandler<SplitReversedEvent>>,
    pub on_split_settled: Option<EventHandler<SplitSettledEvent>>,
    pub on_event: Option<EventHandler<EventType>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_split_created = hooks.on_split_created.map(|f| EventHandler::new(buffer_size, f));
        let on_split_reversed = hooks.on_split_reversed.map(|f| EventHandler::new(buffer_size, f));
        let on_split_settled = hooks.on_split_settled.map(|f| EventHandler::new(buffer_size, f));
        let on_event = hooks.on_event.map(|f| EventHandler::new(buffer_size, f));
        Self { on_split_created, on_split_reversed, on_split_settled, on_event }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_split_created {
            result.split_created_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_split_reversed {
            result.split_reversed_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_split_settled {
            result.split_settled_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_event {
            result.any_event_producer.push(handler.subscribe());
        }
        result
    }

    /// Spawns a task for each registered handler. Each task ends once every producer for it has been dropped.
    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_split_created {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_split_reversed {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_split_settled {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_event {
            tokio::spawn(handler.start_handler());
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_split_created: Option<Handler<SplitCreatedEvent>>,
    pub on_split_reversed: Option<Handler<SplitReversedEvent>>,
    pub on_split_settled: Option<Handler<SplitSettledEvent>>,
    pub on_event: Option<Handler<EventType>>,
}

impl EventHooks {
    pub fn on_split_created<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(SplitCreatedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_split_created = Some(Arc::new(f));
        self
    }

    pub fn on_split_reversed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(SplitReversedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_split_reversed = Some(Arc::new(f));
        self
    }

    pub fn on_split_settled<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(SplitSettledEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_split_settled = Some(Arc::new(f));
        self
    }

    /// Registers a handler that receives every event the engine publishes.
    pub fn on_event<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(EventType) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_event = Some(Arc::new(f));
        self
    }
}
