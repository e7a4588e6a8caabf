use std::{pin::Pin, sync::Arc};

use async_stream::try_stream;
use energy_client::{awattar::AwattarClient, domain::PricePoint};
use futures::Stream;
use time::Date;

use crate::pipeline::{Envelope, PipelineError, Source};

/// Day-ahead prices for `[start, end)`. A failed fetch ends the stream with a source error.
pub struct AwattarSource {
    client: Arc<AwattarClient>,
    start: Date,
    end: Date,
}

impl AwattarSource {
    pub fn new(client: Arc<AwattarClient>, start: Date, end: Date) -> Self {
        Self { client, start, end }
    }
}

#[async_trait::async_trait]
impl Source<PricePoint> for AwattarSource {
    async fn stream(
        &self,
    ) -> Pin<Box<dyn Stream<Item = Result<Envelope<PricePoint>, PipelineError>> + Send>> {
        let client = Arc::clone(&self.client);
        let (start, end) = (self.start, self.end);

        let s = try_stream! {
            let prices = client
                .fetch_prices(start, end)
                .await
                .map_err(|e| PipelineError::Source(format!("failed to fetch day-ahead prices: {e}")))?;
            tracing::info!(slots = prices.len(), %start, %end, "received day-ahead prices");

            for price in prices {
                yield Envelope::new(price);
            }
        };

        Box::pin(s)
    }
}
