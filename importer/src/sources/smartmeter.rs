use std::{pin::Pin, sync::Arc};

use energy_client::{
    domain::{ConsumptionPeriod, ConsumptionRecord},
    smartmeter::{Account, ConsumptionReader},
};
use futures::Stream;

use crate::pipeline::{Envelope, PipelineError, Source};

/// Readings of one metering point for one period.
///
/// A failed fetch yields no records instead of an error; the reader keeps
/// count of those failures.
pub struct SmartMeterSource {
    reader: ConsumptionReader,
    account: Arc<Account>,
    period: ConsumptionPeriod,
}

impl SmartMeterSource {
    pub fn new(reader: ConsumptionReader, account: Account, period: ConsumptionPeriod) -> Self {
        Self {
            reader,
            account: Arc::new(account),
            period,
        }
    }
}

#[async_trait::async_trait]
impl Source<ConsumptionRecord> for SmartMeterSource {
    async fn stream(
        &self,
    ) -> Pin<Box<dyn Stream<Item = Result<Envelope<ConsumptionRecord>, PipelineError>> + Send>> {
        let reader = self.reader.clone();
        let account = Arc::clone(&self.account);
        let period = self.period;

        let s = async_stream::stream! {
            let records = reader.get_consumption(&account, period).await;
            tracing::info!(readings = records.len(), period = %period, "received consumption readings");

            for record in records {
                yield Ok(Envelope::new(record));
            }
        };

        Box::pin(s)
    }
}
