//! Publishing and delivering notifications.

mod common;

use common::{ConcurrencyGauge, OrderPlaced, StockChanged, init_tracing, wait_until};
use herald::{
    BoxError, CancellationToken, Mediator, MediatorConfig, Next, NotificationBehavior,
    PublishError, Registry,
    testing::{CountingHandler, ExecutionLog, RecordingBehavior, RecordingHandler, ShortCircuitBehavior},
};
use std::time::Duration;

struct RejectOddOrders;

impl NotificationBehavior<OrderPlaced> for RejectOddOrders {
    async fn handle<'a>(&'a self, order: &'a OrderPlaced, next: Next<'a, ()>) -> Result<(), BoxError> {
        if order.id % 2 == 1 {
            return Err(format!("order {} rejected", order.id).into());
        }
        next.await
    }
}

#[tokio::test]
async fn test_publish_reaches_every_handler() {
    init_tracing();
    let first = RecordingHandler::<OrderPlaced>::new();
    let second = RecordingHandler::<OrderPlaced>::new();
    let registry = Registry::builder()
        .notification_handler::<OrderPlaced, _>(first.clone())
        .notification_handler::<OrderPlaced, _>(second.clone())
        .build()
        .unwrap();
    let mediator = Mediator::builder(registry).start().unwrap();

    mediator.publish(OrderPlaced { id: 1 }).await.unwrap();
    mediator.stop().await.unwrap();

    assert_eq!(first.received(), vec![OrderPlaced { id: 1 }]);
    assert_eq!(second.received(), vec![OrderPlaced { id: 1 }]);
}

#[tokio::test]
async fn test_publish_without_handler_is_a_noop() {
    let stock = CountingHandler::new();
    let registry = Registry::builder()
        .notification_handler::<StockChanged, _>(stock.clone())
        .build()
        .unwrap();
    let mediator = Mediator::builder(registry).start().unwrap();

    mediator.publish(OrderPlaced { id: 1 }).await.unwrap();
    assert_eq!(mediator.queue_depth(), 0);

    mediator.stop().await.unwrap();
    assert_eq!(stock.calls(), 0);
}

#[tokio::test]
async fn test_each_notification_delivered_once() {
    let handler = CountingHandler::new();
    let registry = Registry::builder()
        .notification_handler::<OrderPlaced, _>(handler.clone())
        .build()
        .unwrap();
    let mediator = Mediator::builder(registry)
        .config(MediatorConfig::default().with_queue_capacity(10))
        .start()
        .unwrap();
    assert_eq!(mediator.queue_capacity(), 10);

    for id in 0..5 {
        mediator.publish(OrderPlaced { id }).await.unwrap();
    }
    mediator.stop().await.unwrap();

    assert_eq!(handler.calls(), 5);
    assert_eq!(mediator.queue_depth(), 0);
}

#[tokio::test]
async fn test_publish_behaviors_run_in_registration_order() {
    let log = ExecutionLog::new();
    let handler = RecordingHandler::<OrderPlaced>::new();
    let registry = Registry::builder()
        .notification_handler::<OrderPlaced, _>(handler.clone())
        .notification_behavior::<OrderPlaced, _>(RecordingBehavior::new("outer", log.clone()))
        .notification_behavior::<OrderPlaced, _>(RecordingBehavior::new("inner", log.clone()))
        .build()
        .unwrap();
    let mediator = Mediator::builder(registry).start().unwrap();

    mediator.publish(OrderPlaced { id: 2 }).await.unwrap();
    assert_eq!(
        log.entries(),
        vec!["outer:before", "inner:before", "inner:after", "outer:after"]
    );

    mediator.stop().await.unwrap();
    assert_eq!(handler.count(), 1);
}

#[tokio::test]
async fn test_publish_behavior_can_drop_notification() {
    let handler = CountingHandler::new();
    let registry = Registry::builder()
        .notification_handler::<OrderPlaced, _>(handler.clone())
        .notification_behavior::<OrderPlaced, _>(ShortCircuitBehavior::new())
        .build()
        .unwrap();
    let mediator = Mediator::builder(registry).start().unwrap();

    mediator.publish(OrderPlaced { id: 1 }).await.unwrap();
    mediator.stop().await.unwrap();

    assert_eq!(handler.calls(), 0);
}

#[tokio::test]
async fn test_publish_behavior_error_reaches_publisher() {
    let handler = CountingHandler::new();
    let registry = Registry::builder()
        .notification_handler::<OrderPlaced, _>(handler.clone())
        .notification_behavior::<OrderPlaced, _>(RejectOddOrders)
        .build()
        .unwrap();
    let mediator = Mediator::builder(registry).start().unwrap();

    let err = mediator.publish(OrderPlaced { id: 3 }).await.unwrap_err();
    assert!(matches!(err, PublishError::Behavior(ref source) if source.to_string() == "order 3 rejected"));

    mediator.publish(OrderPlaced { id: 4 }).await.unwrap();
    mediator.stop().await.unwrap();
    assert_eq!(handler.calls(), 1);
}

#[tokio::test]
async fn test_handler_behaviors_wrap_each_delivery() {
    let log = ExecutionLog::new();
    let handler = RecordingHandler::<OrderPlaced>::new().logging("handler", log.clone());
    let registry = Registry::builder()
        .notification_handler::<OrderPlaced, _>(handler)
        .handler_behavior::<OrderPlaced, _>(RecordingBehavior::new("outer", log.clone()))
        .handler_behavior::<OrderPlaced, _>(RecordingBehavior::new("inner", log.clone()))
        .build()
        .unwrap();
    let mediator = Mediator::builder(registry).start().unwrap();

    mediator.publish(OrderPlaced { id: 1 }).await.unwrap();
    mediator.stop().await.unwrap();

    assert_eq!(
        log.entries(),
        vec!["outer:before", "inner:before", "handler", "inner:after", "outer:after"]
    );
}

#[tokio::test]
async fn test_handler_added_after_start_receives_later_publishes() {
    let mediator = Mediator::builder(Registry::new()).start().unwrap();
    mediator.publish(OrderPlaced { id: 1 }).await.unwrap();

    let handler = RecordingHandler::<OrderPlaced>::new();
    mediator
        .registry()
        .add_notification_handler::<OrderPlaced, _>(handler.clone());
    mediator.publish(OrderPlaced { id: 2 }).await.unwrap();
    mediator.stop().await.unwrap();

    assert_eq!(handler.received(), vec![OrderPlaced { id: 2 }]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_publish_with_cancel_while_queue_full() {
    let gauge = ConcurrencyGauge::new(Duration::from_millis(400));
    let registry = Registry::builder()
        .notification_handler::<OrderPlaced, _>(gauge.clone())
        .build()
        .unwrap();
    let mediator = Mediator::builder(registry)
        .config(
            MediatorConfig::default()
                .with_queue_capacity(1)
                .with_max_concurrent_consumers(1),
        )
        .start()
        .unwrap();

    // One running, one waiting for the slot, one filling the queue.
    for id in 0..3 {
        mediator.publish(OrderPlaced { id }).await.unwrap();
    }
    assert!(wait_until(Duration::from_secs(1), || mediator.queue_depth() == 1).await);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = mediator
        .publish_with_cancel(OrderPlaced { id: 3 }, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, PublishError::Cancelled));

    mediator.stop().await.unwrap();
    assert_eq!(gauge.calls(), 3);
}
