use std::{
    ops::{RangeFrom, RangeFull, RangeInclusive},
    pin::Pin,
};

use alloy_primitives::{Address, B256};
use alloy_provider::{DynProvider, Provider};
use alloy_rpc_types_eth::{BlockNumberOrTag, Filter, Log};
use async_trait::async_trait;
use buddy_types::{DeployedFilter, DeployedRecord};
use futures::Stream;

use crate::error::BuddyDeployerError;

pub const DEFAULT_QUERY_CHUNK_SIZE: u64 = 2000;

pub type DeployedStream =
    Pin<Box<dyn Stream<Item = Result<DeployedRecord, BuddyDeployerError>> + Send>>;

/// Which blocks a historical query covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryRange {
    /// Inclusive on both ends. Tags are resolved to numbers when the stream is first polled.
    Blocks {
        from: BlockNumberOrTag,
        to: BlockNumberOrTag,
    },
    /// Only the block with this hash
    BlockHash(B256),
}

impl Default for QueryRange {
    fn default() -> Self {
        Self::Blocks {
            from: BlockNumberOrTag::Earliest,
            to: BlockNumberOrTag::Latest,
        }
    }
}

impl QueryRange {
    pub fn blocks(from: impl Into<BlockNumberOrTag>, to: impl Into<BlockNumberOrTag>) -> Self {
        Self::Blocks {
            from: from.into(),
            to: to.into(),
        }
    }
}

impl From<RangeFull> for QueryRange {
    fn from(_: RangeFull) -> Self {
        Self::default()
    }
}

impl From<RangeInclusive<u64>> for QueryRange {
    fn from(range: RangeInclusive<u64>) -> Self {
        Self::blocks(*range.start(), *range.end())
    }
}

impl From<RangeFrom<u64>> for QueryRange {
    fn from(range: RangeFrom<u64>) -> Self {
        Self::blocks(range.start, BlockNumberOrTag::Latest)
    }
}

impl From<B256> for QueryRange {
    fn from(block_hash: B256) -> Self {
        Self::BlockHash(block_hash)
    }
}

/// Where historical logs come from. Implemented for the node provider,
/// and swappable for anything that can answer ranged log queries.
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Only asked about tags other than `earliest` and explicit numbers
    async fn block_number(&self, tag: BlockNumberOrTag) -> Result<u64, BuddyDeployerError>;

    /// Inclusive on both ends
    async fn logs_in_range(
        &self,
        filter: &Filter,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<Log>, BuddyDeployerError>;

    async fn logs_at_block_hash(
        &self,
        filter: &Filter,
        block_hash: B256,
    ) -> Result<Vec<Log>, BuddyDeployerError>;
}

#[async_trait]
impl LogSource for DynProvider {
    async fn block_number(&self, tag: BlockNumberOrTag) -> Result<u64, BuddyDeployerError> {
        match tag {
            BlockNumberOrTag::Number(number) => Ok(number),
            BlockNumberOrTag::Earliest => Ok(0),
            BlockNumberOrTag::Latest | BlockNumberOrTag::Pending => {
                Ok(self.get_block_number().await?)
            }
            tag => self
                .get_block_by_number(tag)
                .await?
                .map(|block| block.header.number)
                .ok_or_else(|| {
                    BuddyDeployerError::Transport(anyhow::anyhow!("node has no {} block", tag))
                }),
        }
    }

    async fn logs_in_range(
        &self,
        filter: &Filter,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<Log>, BuddyDeployerError> {
        let filter = filter.clone().from_block(from_block).to_block(to_block);
        Ok(self.get_logs(&filter).await?)
    }

    async fn logs_at_block_hash(
        &self,
        filter: &Filter,
        block_hash: B256,
    ) -> Result<Vec<Log>, BuddyDeployerError> {
        let filter = filter.clone().at_block_hash(block_hash);
        Ok(self.get_logs(&filter).await?)
    }
}

/// Lazily walks the range, yielding matching `Deployed` records ordered by
/// (block number, log index). Block ranges are fetched in chunks of `chunk_size`.
pub fn query_deployed<S>(
    source: S,
    address: Address,
    filter: DeployedFilter,
    range: QueryRange,
    chunk_size: u64,
) -> DeployedStream
where
    S: LogSource + 'static,
{
    Box::pin(async_stream::try_stream! {
        let rpc_filter = filter.to_rpc_filter(address);

        match range {
            QueryRange::BlockHash(block_hash) => {
                tracing::debug!("Querying Deployed logs in block {}", block_hash);

                let logs = source.logs_at_block_hash(&rpc_filter, block_hash).await?;

                for record in ordered_records(logs, address, &filter)? {
                    yield record;
                }
            }
            QueryRange::Blocks { from, to } => {
                let mut start = resolve_block(&source, from).await?;
                let to_block = resolve_block(&source, to).await?;
                let chunk_size = chunk_size.max(1);

                while start <= to_block {
                    let end = start.saturating_add(chunk_size - 1).min(to_block);

                    tracing::debug!("Querying Deployed logs in blocks {}..={}", start, end);

                    let logs = source.logs_in_range(&rpc_filter, start, end).await?;

                    for record in ordered_records(logs, address, &filter)? {
                        yield record;
                    }

                    if end == u64::MAX {
                        break;
                    }
                    start = end + 1;
                }
            }
        }
    })
}

async fn resolve_block<S: LogSource>(
    source: &S,
    block: BlockNumberOrTag,
) -> Result<u64, BuddyDeployerError> {
    match block {
        BlockNumberOrTag::Number(number) => Ok(number),
        BlockNumberOrTag::Earliest => Ok(0),
        tag => source.block_number(tag).await,
    }
}

/// Drops logs that are removed, foreign, non-matching or lack a position, then sorts the rest.
pub(crate) fn ordered_records(
    logs: Vec<Log>,
    address: Address,
    filter: &DeployedFilter,
) -> Result<Vec<DeployedRecord>, BuddyDeployerError> {
    let mut records = Vec::with_capacity(logs.len());

    for log in logs {
        if log.removed {
            tracing::debug!("Dropping removed log {:?}", log.transaction_hash);
            continue;
        }
        if log.inner.address != address || !filter.matches(&log.inner) {
            continue;
        }

        let record = DeployedRecord::decode(&log).map_err(BuddyDeployerError::Decoding)?;

        match record.position() {
            Ok(position) => records.push((position, record)),
            Err(err) => tracing::debug!("Dropping incomplete log: {}", err),
        }
    }

    records.sort_by_key(|(position, _)| *position);

    Ok(records.into_iter().map(|(_, record)| record).collect())
}
