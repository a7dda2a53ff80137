//! Billing
//!
//! Token usage of every successful call is reported to a [`BillingSink`]. The
//! gateway spawns the report and never waits on it; a failing sink only
//! produces a warning.

use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

/// Usage of one successful completion
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageRecord {
    pub provider: String,
    pub model: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl UsageRecord {
    pub fn total_tokens(&self) -> u64 {
        u64::from(self.input_tokens) + u64::from(self.output_tokens)
    }
}

#[async_trait]
pub trait BillingSink: Send + Sync {
    async fn record_usage(&self, record: UsageRecord) -> Result<()>;
}

/// Default sink: writes usage to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogBillingSink;

#[async_trait]
impl BillingSink for LogBillingSink {
    async fn record_usage(&self, record: UsageRecord) -> Result<()> {
        info!(
            provider = %record.provider,
            model = %record.model,
            input_tokens = record.input_tokens,
            output_tokens = record.output_tokens,
            "usage"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_sink_accepts_records() {
        let record = UsageRecord {
            provider: "groq".to_string(),
            model: "llama-3.1-8b-instant".to_string(),
            input_tokens: 120,
            output_tokens: 30,
        };
        assert_eq!(record.total_tokens(), 150);
        tokio_test::assert_ok!(LogBillingSink.record_usage(record).await);
    }
}
