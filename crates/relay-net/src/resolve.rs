//! Name resolution with address-family grouping and retry shuffling.
//!
//! Resolver output keeps consecutive same-family runs together. The
//! starting group rotates with the retry counter and addresses inside
//! a group are shuffled, so repeated attempts spread the load over
//! the whole result set instead of hammering the first entry.

use std::net::SocketAddr;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::ConnectError;

/// IPv6 usage: disabled (IPv4 only), automatic (whatever resolution
/// yields), or forced (IPv6 only).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFamilyMode {
    Disable,
    Auto,
    Force,
}

pub(crate) async fn resolve_ordered(
    host: &str,
    port: u16,
    family: AddressFamilyMode,
    retry: u32,
) -> Result<Vec<SocketAddr>, ConnectError> {
    let addresses: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| ConnectError::Resolution(e.to_string()))?
        .filter(|address| match family {
            AddressFamilyMode::Disable => address.is_ipv4(),
            AddressFamilyMode::Auto => true,
            AddressFamilyMode::Force => address.is_ipv6(),
        })
        .collect();
    Ok(order_addresses(addresses, retry, &mut rand::thread_rng()))
}

/// Groups consecutive same-family runs, rotates the starting group by
/// `retry % groups`, and shuffles inside each group.
pub(crate) fn order_addresses(
    addresses: Vec<SocketAddr>,
    retry: u32,
    rng: &mut impl Rng,
) -> Vec<SocketAddr> {
    if addresses.is_empty() {
        return addresses;
    }

    let mut groups: Vec<Vec<SocketAddr>> = Vec::new();
    for address in addresses {
        match groups.last_mut() {
            Some(group) if group[0].is_ipv4() == address.is_ipv4() => group.push(address),
            _ => groups.push(vec![address]),
        }
    }

    let start = (retry as usize) % groups.len();
    groups.rotate_left(start);

    let mut out = Vec::new();
    for mut group in groups {
        group.shuffle(rng);
        out.extend(group);
    }
    out
}
