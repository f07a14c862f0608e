//! JSON Feed Codec
//!
//! `FeedCodec` for the Alpaca v2 JSON market data stream. Text frames hold
//! either a single message object or, more commonly, an array of them.
//!
//! Decoding is all-or-nothing per frame: if any quote in a batch fails to
//! parse, the whole frame is reported as malformed.

use serde_json::Value;

use super::messages::{FeedMessage, SubscriptionRequest};
use crate::application::ports::{CodecError, FeedCodec, Frame};
use crate::domain::quote::{Quote, Symbol};

/// JSON codec for quote streams.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonFeedCodec;

impl JsonFeedCodec {
    /// Create a new JSON codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn decode_text(text: &str) -> Result<Vec<Quote>, CodecError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| CodecError::Malformed(e.to_string()))?;

        let items = match value {
            Value::Array(items) => items,
            object @ Value::Object(_) => vec![object],
            other => {
                return Err(CodecError::Malformed(format!(
                    "expected JSON array or object, got {}",
                    json_kind(&other)
                )));
            }
        };

        let mut quotes = Vec::new();
        for item in items {
            let msg_type = item
                .get("T")
                .and_then(Value::as_str)
                .ok_or_else(|| CodecError::Malformed("message without \"T\" field".to_string()))?;

            if !matches!(msg_type, "q" | "success" | "error" | "subscription") {
                tracing::trace!(msg_type, "Skipping non-quote message");
                continue;
            }

            let message: FeedMessage =
                serde_json::from_value(item).map_err(|e| CodecError::Malformed(e.to_string()))?;

            match message {
                FeedMessage::Quote(quote) => quotes.push(Quote::from(quote)),
                FeedMessage::Success(success) => {
                    tracing::info!(msg = %success.msg, "Feed acknowledged");
                }
                FeedMessage::Error(error) => {
                    tracing::warn!(
                        code = error.code,
                        msg = %error.msg,
                        auth = error.is_auth_error(),
                        limit = error.is_limit_error(),
                        "Feed reported error"
                    );
                }
                FeedMessage::Subscription(subscription) => {
                    tracing::info!(
                        quotes = subscription.quotes.len(),
                        "Feed subscription confirmed"
                    );
                }
            }
        }

        Ok(quotes)
    }

    fn encode(request: &SubscriptionRequest) -> Result<Frame, CodecError> {
        serde_json::to_string(request)
            .map(Frame::Text)
            .map_err(|e| CodecError::Encode(e.to_string()))
    }
}

impl FeedCodec for JsonFeedCodec {
    fn decode(&self, frame: &Frame) -> Result<Vec<Quote>, CodecError> {
        match frame {
            Frame::Text(text) => Self::decode_text(text),
            Frame::Binary(_) => Err(CodecError::UnsupportedFrame("binary")),
            Frame::Ping(_) => Err(CodecError::UnsupportedFrame("ping")),
            Frame::Pong(_) => Err(CodecError::UnsupportedFrame("pong")),
            Frame::Close => Err(CodecError::UnsupportedFrame("close")),
        }
    }

    fn encode_subscribe(&self, symbols: &[Symbol]) -> Result<Frame, CodecError> {
        Self::encode(&SubscriptionRequest::subscribe(symbols))
    }

    fn encode_unsubscribe(&self, symbols: &[Symbol]) -> Result<Frame, CodecError> {
        Self::encode(&SubscriptionRequest::unsubscribe(symbols))
    }
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
