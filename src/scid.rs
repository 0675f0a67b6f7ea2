//! Short channel identifier handling.
//!
//! A directed edge carries `<block>x<tx>x<out>` plus a direction suffix. Both
//! directions of a channel collapse onto one [`UndirectedScid`], which is the
//! cache key and, once packed into a `u64`, the external lookup key.

use std::{fmt, str::FromStr};

use crate::errors::CapacityError;

pub const BLOCK_BITS: u32 = 24;
pub const TX_INDEX_BITS: u32 = 24;
pub const OUTPUT_INDEX_BITS: u32 = 16;

const BLOCK_SHIFT: u32 = TX_INDEX_BITS + OUTPUT_INDEX_BITS;
const TX_INDEX_SHIFT: u32 = OUTPUT_INDEX_BITS;
const SUFFIX_LEN: usize = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UndirectedScid {
    pub block: u64,
    pub tx_index: u64,
    pub output_index: u64,
}

impl UndirectedScid {
    pub fn new(block: u64, tx_index: u64, output_index: u64) -> Self {
        Self {
            block,
            tx_index,
            output_index,
        }
    }

    /// Packs the components as `block << 40 | tx_index << 16 | output_index`.
    ///
    /// Components wider than their slot would bleed into the neighbouring
    /// field, so they are rejected instead.
    pub fn pack(&self) -> Result<u64, CapacityError> {
        check_width("block", self.block, BLOCK_BITS)?;
        check_width("tx_index", self.tx_index, TX_INDEX_BITS)?;
        check_width("output_index", self.output_index, OUTPUT_INDEX_BITS)?;
        Ok(self.block << BLOCK_SHIFT | self.tx_index << TX_INDEX_SHIFT | self.output_index)
    }

    pub fn unpack(packed: u64) -> Self {
        Self {
            block: packed >> BLOCK_SHIFT,
            tx_index: (packed >> TX_INDEX_SHIFT) & mask(TX_INDEX_BITS),
            output_index: packed & mask(OUTPUT_INDEX_BITS),
        }
    }
}

impl fmt::Display for UndirectedScid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.block, self.tx_index, self.output_index)
    }
}

impl FromStr for UndirectedScid {
    type Err = CapacityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('x');
        let (Some(block), Some(tx), Some(out), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(CapacityError::malformed_identifier(format!(
                "{s}: expected <block>x<tx>x<output>"
            )));
        };
        Ok(Self {
            block: parse_component(s, block)?,
            tx_index: parse_component(s, tx)?,
            output_index: parse_component(s, out)?,
        })
    }
}

/// Strips the direction suffix from a directed identifier.
///
/// Accepted suffixes: `/<dir>` (`123x4x5/0`), a single trailing letter
/// (`123x4x5a`), or otherwise any two trailing characters (`123x4x5-a`).
pub fn canonicalize(directed: &str) -> Result<String, CapacityError> {
    if !directed.is_ascii() {
        return Err(CapacityError::malformed_identifier(format!(
            "{directed}: identifiers are ascii"
        )));
    }
    if directed.len() < SUFFIX_LEN {
        return Err(CapacityError::malformed_identifier(format!(
            "{directed}: too short to carry a direction suffix"
        )));
    }
    let two_char = &directed[..directed.len() - SUFFIX_LEN];
    let scid: UndirectedScid = if let Some((prefix, _)) = directed.rsplit_once('/') {
        prefix.parse()?
    } else if directed.ends_with(|c: char| c.is_ascii_alphabetic()) {
        // `-a` style tags are two characters wide
        directed[..directed.len() - 1]
            .parse::<UndirectedScid>()
            .or_else(|_| two_char.parse::<UndirectedScid>())?
    } else {
        two_char.parse()?
    };
    Ok(scid.to_string())
}

/// Parses an undirected identifier and packs it for external lookup.
pub fn pack(undirected: &str) -> Result<u64, CapacityError> {
    undirected.parse::<UndirectedScid>()?.pack()
}

fn parse_component(scid: &str, part: &str) -> Result<u64, CapacityError> {
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CapacityError::malformed_identifier(format!(
            "{scid}: component '{part}' is not numeric"
        )));
    }
    part.parse::<u64>().map_err(|_| {
        CapacityError::out_of_range(format!("{scid}: component '{part}' overflows u64"))
    })
}

fn check_width(name: &str, value: u64, bits: u32) -> Result<(), CapacityError> {
    if value > mask(bits) {
        return Err(CapacityError::out_of_range(format!(
            "{name} {value} does not fit in {bits} bits"
        )));
    }
    Ok(())
}

fn mask(bits: u32) -> u64 {
    (1u64 << bits) - 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slash_suffix_is_stripped() {
        assert_eq!(canonicalize("700000x1234x1/0").unwrap(), "700000x1234x1");
        assert_eq!(canonicalize("700000x1234x1/1").unwrap(), "700000x1234x1");
    }

    #[test]
    fn letter_tag_is_stripped() {
        assert_eq!(canonicalize("100x2x0a").unwrap(), "100x2x0");
        assert_eq!(canonicalize("100x2x0b").unwrap(), "100x2x0");
    }

    #[test]
    fn pack_matches_bit_layout() {
        assert_eq!(pack("1x0x0").unwrap(), 1 << 40);
        assert_eq!(pack("0x1x0").unwrap(), 1 << 16);
        assert_eq!(pack("0x0x1").unwrap(), 1);
    }

    #[test]
    fn leading_zeroes_normalize() {
        assert_eq!(canonicalize("0100x02x0/1").unwrap(), "100x2x0");
    }
}
