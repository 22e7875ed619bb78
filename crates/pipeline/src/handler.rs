//! Message handlers invoked by the pipeline.

use tracing::info;

use courier_core::ConsumedRecord;

use crate::error::HandlerError;

/// Business logic for one record. Called once per attempt.
pub trait MessageHandler: Send + Sync {
    fn handle(&self, record: &ConsumedRecord) -> Result<(), HandlerError>;
}

impl<F> MessageHandler for F
where
    F: Fn(&ConsumedRecord) -> Result<(), HandlerError> + Send + Sync,
{
    fn handle(&self, record: &ConsumedRecord) -> Result<(), HandlerError> {
        self(record)
    }
}

/// Default handler: logs the message and succeeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingHandler;

impl MessageHandler for LoggingHandler {
    fn handle(&self, record: &ConsumedRecord) -> Result<(), HandlerError> {
        let message = record.message();
        info!(
            message_id = message.message_id(),
            message = message.message(),
            date = %message.produced_date(),
            topic = record.topic(),
            partition = record.partition(),
            offset = record.offset(),
            "message received"
        );
        Ok(())
    }
}
