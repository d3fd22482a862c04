use std::path::PathBuf;

use pallas::ledger::traverse::MultiEraBlock;
use pallas::network::facades::NodeClient;
use pallas::network::miniprotocols::chainsync::NextResponse;
use pallas::network::miniprotocols::Point;
use tracing::debug;

use crate::prelude::*;

use super::UpstreamConfig;

/// On-demand single-block fetch, used by the metadata endpoint. Opens a
/// short-lived session that intersects just below the wanted block and
/// rolls forward until it shows up.
#[derive(Clone)]
pub struct BlockFetcher {
    socket_path: PathBuf,
    network_magic: u64,
}

impl BlockFetcher {
    pub fn new(config: &UpstreamConfig) -> Self {
        Self {
            socket_path: config.socket_path.clone(),
            network_magic: config.network_magic,
        }
    }

    /// Fetches the block at `point`, intersecting at `ancestor` (the
    /// checkpoint right before it, or origin).
    pub async fn fetch_block(
        &self,
        point: &ChainPoint,
        ancestor: Option<ChainPoint>,
    ) -> Result<RawBlock, Error> {
        debug!(%point, "fetching single block");

        let mut client = NodeClient::connect(&self.socket_path, self.network_magic)
            .await
            .map_err(Error::client)?;

        let candidate = ancestor.map(Point::from).unwrap_or(Point::Origin);

        let (found, _) = client
            .chainsync()
            .find_intersect(vec![candidate])
            .await
            .map_err(Error::client)?;

        if found.is_none() {
            client.abort().await;
            return Err(Error::client("producer cannot intersect below the block"));
        }

        let result = self.roll_to(&mut client, point).await;
        client.abort().await;
        result
    }

    async fn roll_to(&self, client: &mut NodeClient, point: &ChainPoint) -> Result<RawBlock, Error> {
        loop {
            let next = if client.chainsync().has_agency() {
                client.chainsync().request_next().await
            } else {
                client.chainsync().recv_while_must_reply().await
            }
            .map_err(Error::client)?;

            match next {
                NextResponse::RollForward(content, _) => {
                    let body = content.0;
                    let (slot, hash) = {
                        let block = MultiEraBlock::decode(&body).map_err(Error::parse)?;
                        (block.slot(), block.hash())
                    };

                    if point.hash() == Some(hash) {
                        return Ok(RawBlock { slot, hash, body });
                    }

                    if slot > point.slot() {
                        return Err(Error::client("producer streamed past the wanted block"));
                    }
                }
                NextResponse::RollBackward(..) => continue,
                NextResponse::Await => {
                    return Err(Error::client("reached tip before the wanted block"));
                }
            }
        }
    }
}
