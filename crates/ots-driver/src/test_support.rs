//! A toy link format for exercising the walker without the tree schema.
//!
//! A blob starting with `links:` lists one hex hash per line after a label
//! line; any other blob is a leaf.

use ots_types::{Bucket, ContentHash};

use crate::error::{DriverError, DriverResult};
use crate::traits::Driver;
use crate::walk::Reachability;

pub(crate) struct LinkPlan;

impl Reachability for LinkPlan {
    type Kind = ();

    fn root_kind(&self) -> Self::Kind {}

    fn children(
        &self,
        _kind: (),
        hash: &ContentHash,
        bytes: &[u8],
    ) -> DriverResult<Vec<((), ContentHash)>> {
        let Ok(text) = std::str::from_utf8(bytes) else {
            return Ok(Vec::new());
        };
        let Some(rest) = text.strip_prefix("links:") else {
            return Ok(Vec::new());
        };
        rest.lines()
            .skip(1)
            .filter(|line| !line.is_empty())
            .map(|line| {
                ContentHash::from_hex(line)
                    .map(|h| ((), h))
                    .map_err(|e| DriverError::CorruptBlob {
                        hash: *hash,
                        reason: e.to_string(),
                    })
            })
            .collect()
    }
}

pub(crate) fn store_links(driver: &dyn Driver, label: &str, links: &[ContentHash]) -> ContentHash {
    let mut text = format!("links:{label}\n");
    for link in links {
        text.push_str(&link.to_hex());
        text.push('\n');
    }
    driver.store(text.as_bytes(), Bucket::A).unwrap()
}
