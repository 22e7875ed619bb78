use rdkafka::error::{KafkaError, RDKafkaErrorCode};

use courier_broker::BrokerError;

/// Map an `rdkafka` error onto the broker error taxonomy.
///
/// Connectivity and timeout codes become `Transport` (retryable, and routed
/// back to the original partition when they reach a handler).
pub fn map_kafka_error(err: &KafkaError) -> BrokerError {
    match err {
        KafkaError::Canceled => return BrokerError::Closed,
        KafkaError::ClientConfig(..) | KafkaError::ClientCreation(_) => {
            return BrokerError::client(err.to_string());
        }
        _ => {}
    }

    match err.rdkafka_error_code() {
        Some(
            RDKafkaErrorCode::BrokerTransportFailure
            | RDKafkaErrorCode::AllBrokersDown
            | RDKafkaErrorCode::MessageTimedOut
            | RDKafkaErrorCode::OperationTimedOut
            | RDKafkaErrorCode::RequestTimedOut
            | RDKafkaErrorCode::NetworkException
            | RDKafkaErrorCode::LeaderNotAvailable
            | RDKafkaErrorCode::NotLeaderForPartition
            | RDKafkaErrorCode::QueueFull,
        ) => BrokerError::transport(err.to_string()),
        Some(
            RDKafkaErrorCode::UnknownTopicOrPartition
            | RDKafkaErrorCode::UnknownTopic
            | RDKafkaErrorCode::UnknownPartition,
        ) => BrokerError::UnknownTopicPartition(err.to_string()),
        _ => BrokerError::client(err.to_string()),
    }
}
