use std::{future::Future, pin::Pin, sync::Arc};

use log::*;

use crate::events::{
    EventHandler,
    EventProducer,
    Handler,
    IncidentEvent,
    NotificationEvent,
    OrderFailedEvent,
    OrderPaidEvent,
};

type BoxedHook<E> = dyn (Fn(E) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static;

/// The publishing side of the configured hooks. Cloned into every API object that emits events.
#[derive(Default, Clone)]
pub struct EventProducers {
    pub order_paid_producer: Vec<EventProducer<OrderPaidEvent>>,
    pub order_failed_producer: Vec<EventProducer<OrderFailedEvent>>,
    pub incident_producer: Vec<EventProducer<IncidentEvent>>,
    pub notification_producer: Vec<EventProducer<NotificationEvent>>,
}

impl EventProducers {
    pub async fn publish_order_paid(&self, event: OrderPaidEvent) {
        let notification = NotificationEvent::from(&event);
        for producer in &self.order_paid_producer {
            producer.publish_event(event.clone()).await;
        }
        self.publish_notification(notification);
    }

    pub async fn publish_order_failed(&self, event: OrderFailedEvent) {
        let notification = NotificationEvent::from(&event);
        for producer in &self.order_failed_producer {
            producer.publish_event(event.clone()).await;
        }
        self.publish_notification(notification);
    }

    /// Incidents are never allowed to hold up the request that raised them.
    pub fn publish_incident(&self, event: IncidentEvent) {
        for producer in &self.incident_producer {
            producer.try_publish_event(event.clone());
        }
    }

    fn publish_notification(&self, event: NotificationEvent) {
        for producer in &self.notification_producer {
            producer.try_publish_event(event.clone());
        }
    }
}

pub struct EventHandlers {
    pub on_order_paid: Option<EventHandler<OrderPaidEvent>>,
    pub on_order_failed: Option<EventHandler<OrderFailedEvent>>,
    pub on_incident: Option<EventHandler<IncidentEvent>>,
    pub on_notification: Option<EventHandler<NotificationEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        Self {
            on_order_paid: hooks.on_order_paid.map(|f| EventHandler::new(buffer_size, f)),
            on_order_failed: hooks.on_order_failed.map(|f| EventHandler::new(buffer_size, f)),
            on_incident: hooks.on_incident.map(|f| EventHandler::new(buffer_size, f)),
            on_notification: hooks.on_notification.map(|f| EventHandler::new(buffer_size, f)),
        }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_order_paid {
            result.order_paid_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_order_failed {
            result.order_failed_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_incident {
            result.incident_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_notification {
            result.notification_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        let mut count = 0;
        if let Some(handler) = self.on_order_paid {
            tokio::spawn(handler.start_handler());
            count += 1;
        }
        if let Some(handler) = self.on_order_failed {
            tokio::spawn(handler.start_handler());
            count += 1;
        }
        if let Some(handler) = self.on_incident {
            tokio::spawn(handler.start_handler());
            count += 1;
        }
        if let Some(handler) = self.on_notification {
            tokio::spawn(handler.start_handler());
            count += 1;
        }
        info!("📬️ {count} event handlers started");
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_order_paid: Option<Handler<OrderPaidEvent>>,
    pub on_order_failed: Option<Handler<OrderFailedEvent>>,
    pub on_incident: Option<Handler<IncidentEvent>>,
    pub on_notification: Option<Handler<NotificationEvent>>,
}

impl EventHooks {
    pub fn on_order_paid<F>(&mut self, f: F) -> &mut Self
    where F: Fn(OrderPaidEvent) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync + 'static {
        self.on_order_paid = Some(Arc::new(f) as Arc<BoxedHook<OrderPaidEvent>>);
        self
    }

    pub fn on_order_failed<F>(&mut self, f: F) -> &mut Self
    where F: Fn(OrderFailedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync + 'static {
        self.on_order_failed = Some(Arc::new(f) as Arc<BoxedHook<OrderFailedEvent>>);
        self
    }

    pub fn on_incident<F>(&mut self, f: F) -> &mut Self
    where F: Fn(IncidentEvent) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync + 'static {
        self.on_incident = Some(Arc::new(f) as Arc<BoxedHook<IncidentEvent>>);
        self
    }

    pub fn on_notification<F>(&mut self, f: F) -> &mut Self
    where F: Fn(NotificationEvent) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync + 'static {
        self.on_notification = Some(Arc::new(f) as Arc<BoxedHook<NotificationEvent>>);
        self
    }
}
