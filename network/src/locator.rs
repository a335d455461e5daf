//! Block locator construction for `getheaders` (§4.3 "Header sync
//! protocol"): best-chain tip, then exponentially sparser ancestors,
//! step doubling after each of the first 10, ending with genesis.

use bitc_core::crypto::hash::Hash256;

/// Builds a locator from a best-chain-ordered ancestor list
/// (`chain[0]` is the tip, `chain.last()` is genesis).
pub fn build_locator(chain_tip_to_genesis: &[Hash256]) -> Vec<Hash256> {
    let mut locator = Vec::new();
    let mut step: usize = 1;
    let mut index: usize = 0;
    let mut steps_taken = 0;

    while index < chain_tip_to_genesis.len() {
        locator.push(chain_tip_to_genesis[index]);
        if index == chain_tip_to_genesis.len() - 1 {
            break;
        }
        steps_taken += 1;
        if steps_taken > 10 {
            step *= 2;
        }
        index += step;
    }

    if locator.last() != chain_tip_to_genesis.last() {
        if let Some(genesis) = chain_tip_to_genesis.last() {
            locator.push(*genesis);
        }
    }

    locator
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(len: usize) -> Vec<Hash256> {
        (0..len).map(|i| [i as u8; 32]).collect()
    }

    #[test]
    fn short_chain_includes_every_hash() {
        let chain = chain(5);
        let locator = build_locator(&chain);
        assert_eq!(locator, chain);
    }

    #[test]
    fn locator_always_ends_with_genesis() {
        let chain = chain(50);
        let locator = build_locator(&chain);
        assert_eq!(locator.last(), chain.last());
    }

    #[test]
    fn long_chain_locator_is_much_shorter_than_the_chain() {
        let chain = chain(100_000);
        let locator = build_locator(&chain);
        assert!(locator.len() < 50);
    }

    #[test]
    fn locator_starts_with_the_tip() {
        let chain = chain(30);
        let locator = build_locator(&chain);
        assert_eq!(locator.first(), chain.first());
    }
}
