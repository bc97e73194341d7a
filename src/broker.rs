//! AMQP consumer for citizen lifecycle events.
//!
//! Declares the topology (topic exchange, work queue with dead-lettering,
//! dead-letter exchange and queue), then feeds every delivery to the
//! [`EventDispatcher`] and acks or dead-letters it according to the returned
//! [`Disposition`].

use crate::{
    config::BrokerConfig,
    services::event_dispatcher::{Disposition, EventDispatcher, EventEnvelope},
};
use anyhow::{Context, Result};
use futures::StreamExt;
use lapin::{
    Channel, Connection, ConnectionProperties, ExchangeKind,
    message::Delivery,
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions,
        ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
    },
    types::{AMQPValue, FieldTable},
};
use std::time::Duration;
use tracing::{debug, error, info, warn};

const CONSUMER_TAG: &str = "citizen-docs";
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

pub const HEADER_USER_ID: &str = "userId";
pub const HEADER_EVENT_TYPE: &str = "eventType";

/// Keep a consumer running, reconnecting after connection loss.
pub async fn supervise(cfg: BrokerConfig, dispatcher: EventDispatcher) {
    loop {
        match consume(&cfg, &dispatcher).await {
            Ok(()) => warn!("AMQP consumer stream closed, reconnecting"),
            Err(err) => error!("AMQP consumer failed: {:#}", err),
        }
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

/// Connect, declare the topology and process deliveries until the stream ends.
pub async fn consume(cfg: &BrokerConfig, dispatcher: &EventDispatcher) -> Result<()> {
    let connection = Connection::connect(&cfg.url, ConnectionProperties::default())
        .await
        .context("connecting to AMQP broker")?;
    let channel = connection
        .create_channel()
        .await
        .context("opening AMQP channel")?;

    declare_topology(&channel, cfg).await?;
    channel
        .basic_qos(cfg.prefetch, BasicQosOptions::default())
        .await
        .context("setting prefetch")?;

    let mut consumer = channel
        .basic_consume(
            &cfg.queue,
            CONSUMER_TAG,
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await
        .with_context(|| format!("consuming from `{}`", cfg.queue))?;

    info!(
        "Consuming exchange: {}, queue: {}, routingKey: {}",
        cfg.exchange, cfg.queue, cfg.routing_key
    );

    while let Some(delivery) = consumer.next().await {
        let delivery = delivery.context("receiving delivery")?;
        settle(dispatcher, delivery).await?;
    }

    Ok(())
}

async fn declare_topology(channel: &Channel, cfg: &BrokerConfig) -> Result<()> {
    let durable_exchange = ExchangeDeclareOptions {
        durable: true,
        ..ExchangeDeclareOptions::default()
    };
    let durable_queue = QueueDeclareOptions {
        durable: true,
        ..QueueDeclareOptions::default()
    };

    channel
        .exchange_declare(
            &cfg.exchange,
            ExchangeKind::Topic,
            durable_exchange,
            FieldTable::default(),
        )
        .await
        .with_context(|| format!("declaring exchange `{}`", cfg.exchange))?;

    channel
        .exchange_declare(
            &cfg.dead_letter_exchange,
            ExchangeKind::Topic,
            durable_exchange,
            FieldTable::default(),
        )
        .await
        .with_context(|| format!("declaring exchange `{}`", cfg.dead_letter_exchange))?;

    let dead_letter_queue = cfg.dead_letter_queue();
    channel
        .queue_declare(&dead_letter_queue, durable_queue, FieldTable::default())
        .await
        .with_context(|| format!("declaring queue `{}`", dead_letter_queue))?;
    channel
        .queue_bind(
            &dead_letter_queue,
            &cfg.dead_letter_exchange,
            &cfg.dead_letter_routing_key,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await
        .with_context(|| format!("binding queue `{}`", dead_letter_queue))?;

    channel
        .queue_declare(&cfg.queue, durable_queue, work_queue_arguments(cfg))
        .await
        .with_context(|| format!("declaring queue `{}`", cfg.queue))?;
    channel
        .queue_bind(
            &cfg.queue,
            &cfg.exchange,
            &cfg.routing_key,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await
        .with_context(|| format!("binding queue `{}`", cfg.queue))?;

    Ok(())
}

fn work_queue_arguments(cfg: &BrokerConfig) -> FieldTable {
    let mut arguments = FieldTable::default();
    arguments.insert(
        "x-dead-letter-exchange".into(),
        AMQPValue::LongString(cfg.dead_letter_exchange.clone().into()),
    );
    arguments.insert(
        "x-dead-letter-routing-key".into(),
        AMQPValue::LongString(cfg.dead_letter_routing_key.clone().into()),
    );
    arguments
}

async fn settle(dispatcher: &EventDispatcher, delivery: Delivery) -> Result<()> {
    let envelope = envelope_from(delivery.properties.headers().as_ref(), &delivery.data);
    match dispatcher.dispatch(&envelope).await {
        Disposition::Ack => {
            delivery
                .ack(BasicAckOptions::default())
                .await
                .context("acking delivery")?;
        }
        Disposition::DeadLetter => {
            debug!("dead-lettering delivery {}", delivery.delivery_tag);
            delivery
                .nack(BasicNackOptions {
                    requeue: false,
                    ..BasicNackOptions::default()
                })
                .await
                .context("nacking delivery")?;
        }
    }
    Ok(())
}

pub fn envelope_from(headers: Option<&FieldTable>, body: &[u8]) -> EventEnvelope {
    let header = |name: &str| {
        headers.and_then(|table| {
            table
                .inner()
                .iter()
                .find(|(key, _)| key.as_str() == name)
                .and_then(|(_, value)| header_text(value))
        })
    };

    EventEnvelope {
        user_id: header(HEADER_USER_ID),
        event_type: header(HEADER_EVENT_TYPE),
        body: body.to_vec(),
    }
}

fn header_text(value: &AMQPValue) -> Option<String> {
    match value {
        AMQPValue::LongString(text) => Some(String::from_utf8_lossy(text.as_bytes()).into_owned()),
        AMQPValue::ShortString(text) => Some(text.as_str().to_string()),
        AMQPValue::ShortInt(n) => Some(n.to_string()),
        AMQPValue::ShortUInt(n) => Some(n.to_string()),
        AMQPValue::LongInt(n) => Some(n.to_string()),
        AMQPValue::LongUInt(n) => Some(n.to_string()),
        AMQPValue::LongLongInt(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_are_read_as_text() {
        let mut table = FieldTable::default();
        table.insert(
            HEADER_EVENT_TYPE.into(),
            AMQPValue::LongString("CREATE".into()),
        );
        table.insert(HEADER_USER_ID.into(), AMQPValue::LongLongInt(42));

        let envelope = envelope_from(Some(&table), br#""00123""#);
        assert_eq!(envelope.event_type.as_deref(), Some("CREATE"));
        assert_eq!(envelope.user_id.as_deref(), Some("42"));
        assert_eq!(envelope.body, br#""00123""#);
    }

    #[test]
    fn missing_headers_yield_none() {
        let envelope = envelope_from(None, b"{}");
        assert!(envelope.event_type.is_none());
        assert!(envelope.user_id.is_none());
    }

    #[test]
    fn work_queue_dead_letters_to_configured_exchange() {
        let cfg = BrokerConfig {
            url: "amqp://localhost".into(),
            exchange: "dobby_requests".into(),
            queue: "document.request.queue".into(),
            routing_key: "document.request".into(),
            dead_letter_exchange: "users_request_dobby_dlx".into(),
            dead_letter_routing_key: "users_request_dobby.failed".into(),
            prefetch: 10,
        };
        let arguments = work_queue_arguments(&cfg);
        let dlx = arguments
            .inner()
            .iter()
            .find(|(key, _)| key.as_str() == "x-dead-letter-exchange")
            .and_then(|(_, value)| header_text(value));
        assert_eq!(dlx.as_deref(), Some("users_request_dobby_dlx"));
        assert_eq!(cfg.dead_letter_queue(), "document.request.queue.dead");
    }
}
